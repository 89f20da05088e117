//! Final answer assembly.
//!
//! Builds one generation request holding the intent focus, each agent's
//! findings, the full citation list and the fired insights, then formats
//! risk labels and checks the citations in the generated text.

use crate::agent::{GenerationRequest, PromptStore, TextGenerator, ORCHESTRATOR};
use crate::analysis::CitationSet;
use crate::models::{
    truncate_chars, AgentResult, CitationCheck, CorrelationInsight, Diagnostic, DiagnosticKind,
    DocId, PriorityLabel, Query,
};
use crate::routing::{IntentLabel, QueryFacets};
use std::sync::Arc;
use tracing::{debug, warn};

const DEFAULT_SYSTEM_PROMPT: &str =
    "You are an audit intelligence analyst. Answer only from the evidence provided.";

/// Everything the synthesizer needs for one query.
#[derive(Debug, Clone, Copy)]
pub struct SynthesisInput<'a> {
    pub query: &'a Query,
    pub facets: &'a QueryFacets,
    pub intent: IntentLabel,
    /// Successful results in rank order.
    pub results: &'a [AgentResult],
    pub citations: &'a CitationSet,
    pub insights: &'a [CorrelationInsight],
}

impl SynthesisInput<'_> {
    pub fn requires_risk_framing(&self) -> bool {
        self.query.response_type().requires_risk_framing() || self.intent.requires_risk_framing()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Synthesis {
    pub answer: String,
    pub citation_check: CitationCheck,
    pub diagnostics: Vec<Diagnostic>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SynthesisSettings {
    pub temperature: f32,
    pub max_tokens: u32,
    /// Characters of each agent's answer included in the prompt.
    pub excerpt_chars: usize,
}

impl Default for SynthesisSettings {
    fn default() -> Self {
        Self {
            temperature: 0.2,
            max_tokens: 3000,
            excerpt_chars: 500,
        }
    }
}

pub struct ResponseSynthesizer {
    generator: Arc<dyn TextGenerator>,
    system_prompt: String,
    settings: SynthesisSettings,
}

impl ResponseSynthesizer {
    pub fn new(
        generator: Arc<dyn TextGenerator>,
        prompts: &dyn PromptStore,
        settings: SynthesisSettings,
    ) -> Self {
        let system_prompt = prompts
            .system_prompt(ORCHESTRATOR)
            .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string());
        Self {
            generator,
            system_prompt,
            settings,
        }
    }

    pub fn build_request(&self, input: &SynthesisInput<'_>) -> GenerationRequest {
        let response_type = input.query.response_type();

        let mut system = self.system_prompt.clone();
        if let Some(instruction) = response_type.instruction() {
            system.push_str("\n\n");
            system.push_str(instruction);
        }

        GenerationRequest {
            system,
            user: self.build_prompt(input),
            temperature: self.settings.temperature,
            max_tokens: self.settings.max_tokens,
        }
    }

    fn build_prompt(&self, input: &SynthesisInput<'_>) -> String {
        let mut prompt = String::new();

        prompt.push_str(&format!("QUERY: {}\n", input.query.text()));
        prompt.push_str(&format!(
            "INTENT: {} (response type: {})\n",
            input.intent,
            input.query.response_type()
        ));
        prompt.push_str(&format!("FOCUS: {}\n", input.intent.focus()));
        prompt.push_str(&format!(
            "COMPANY: {} | AUDIT TYPE: {} | PERIOD: since {}\n\n",
            input.facets.company_or_default(),
            input.facets.audit_type,
            input.facets.time_period
        ));

        prompt.push_str("AGENT FINDINGS (highest priority first):\n");
        for result in input.results {
            let ids = format_ids(input.citations.ids_for(&result.agent_id));
            prompt.push_str(&format!("\n### {} [{}]\n", result.agent_id, ids));
            prompt.push_str(&truncate_chars(result.text.trim(), self.settings.excerpt_chars));
            prompt.push('\n');
        }

        prompt.push('\n');
        prompt.push_str(&input.citations.instructions);
        prompt.push_str("\n\n");

        let summary = &input.citations.summary;
        prompt.push_str(&format!(
            "DOCUMENT SUMMARY: {} document(s) from {}.",
            summary.total_documents,
            if summary.agents_used.is_empty() {
                "no agent".to_string()
            } else {
                summary.agents_used.join(", ")
            }
        ));
        if !summary.high_relevance.is_empty() {
            let ids: Vec<DocId> = summary.high_relevance.iter().map(|d| d.id).collect();
            prompt.push_str(&format!(" High relevance: {}.", format_ids(&ids)));
        }
        prompt.push('\n');

        if !input.insights.is_empty() {
            prompt.push_str("\nCROSS-AGENT INSIGHTS TO DEVELOP:\n");
            for insight in input.insights {
                prompt.push_str(&format!(
                    "- {} ({}; evidence: {}): {}\n",
                    insight.kind.title(),
                    insight.agents.join(" + "),
                    format_ids(&insight.document_ids()),
                    insight.kind.guidance()
                ));
            }
        }

        if input.requires_risk_framing() {
            prompt.push_str(&format!(
                "\nRISK FRAMING: Start every section or item with {} for critical or major risks, \
                 {} for minor or routine items, or {} for emerging issues to monitor.\n",
                PriorityLabel::Priority.tag(),
                PriorityLabel::Standard.tag(),
                PriorityLabel::Watchlist.tag()
            ));
        }

        prompt
    }

    /// Produces the final answer. Generator failures fall back to a
    /// deterministic digest of the agent findings.
    pub async fn synthesize(&self, input: &SynthesisInput<'_>) -> Synthesis {
        let request = self.build_request(input);
        let mut diagnostics = Vec::new();

        let raw = match self.generator.generate(&request).await {
            Ok(text) => text,
            Err(e) => {
                warn!("Synthesis failed, using fallback answer: {}", e);
                diagnostics.push(Diagnostic::new(
                    DiagnosticKind::SynthesisFallback,
                    format!("text generation failed: {}", e),
                ));
                fallback_answer(input)
            }
        };

        let answer = PriorityLabel::apply_tags(&raw);
        let citation_check = check_citations(&answer, input.citations);
        if !citation_check.unknown.is_empty() {
            debug!("Answer cites unknown ids: {:?}", citation_check.unknown);
            diagnostics.push(Diagnostic::new(
                DiagnosticKind::UnknownCitation,
                format!(
                    "answer references unknown document(s): {}",
                    citation_check.unknown.join(", ")
                ),
            ));
        }

        Synthesis {
            answer,
            citation_check,
            diagnostics,
        }
    }
}

fn format_ids(ids: &[DocId]) -> String {
    if ids.is_empty() {
        return "no documents".to_string();
    }
    ids.iter().map(|id| id.to_string()).collect::<Vec<_>>().join(", ")
}

/// Agent findings in rank order with their DOC ids.
pub fn fallback_answer(input: &SynthesisInput<'_>) -> String {
    let mut text = String::from(
        "Automated synthesis was unavailable. Findings from each agent follow in priority order.\n",
    );

    for result in input.results {
        text.push_str(&format!("\n## {}\n\n{}\n", result.agent_id, result.text.trim()));
        let ids = input.citations.ids_for(&result.agent_id);
        if !ids.is_empty() {
            let cited: Vec<String> = ids.iter().map(|id| format!("[{}]", id)).collect();
            text.push_str(&format!("\nSources: {}\n", cited.join(", ")));
        }
    }

    text
}

/// Finds every `DOC_<digits>` reference in `text`.
pub fn check_citations(text: &str, citations: &CitationSet) -> CitationCheck {
    let mut referenced: Vec<DocId> = Vec::new();
    let mut unknown: Vec<String> = Vec::new();

    for (start, _) in text.match_indices("DOC_") {
        let digits: String = text[start + 4..]
            .chars()
            .take_while(|c| c.is_ascii_digit())
            .collect();
        if digits.is_empty() {
            continue;
        }
        let token = format!("DOC_{}", digits);

        match token.parse::<DocId>() {
            Ok(id) if citations.contains(id) => {
                if !referenced.contains(&id) {
                    referenced.push(id);
                }
            }
            _ => {
                if !unknown.contains(&token) {
                    unknown.push(token);
                }
            }
        }
    }

    referenced.sort();
    CitationCheck {
        referenced,
        unknown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::PromptSet;
    use crate::analysis::{CitationAggregator, CorrelationEngine};
    use crate::error::GenerationError;
    use crate::models::{AgentOutput, ResponseType, SourceDocument};
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct FixedGenerator {
        reply: Result<String, GenerationError>,
        seen: Mutex<Vec<GenerationRequest>>,
    }

    impl FixedGenerator {
        fn ok(text: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: Ok(text.to_string()),
                seen: Mutex::new(Vec::new()),
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                reply: Err(GenerationError::Timeout { seconds: 5 }),
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl TextGenerator for FixedGenerator {
        async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
            self.seen.lock().unwrap().push(request.clone());
            self.reply.clone()
        }
    }

    struct Fixture {
        query: Query,
        facets: QueryFacets,
        results: Vec<AgentResult>,
        citations: CitationSet,
        insights: Vec<CorrelationInsight>,
    }

    impl Fixture {
        fn new(response_type: ResponseType) -> Self {
            let query = Query::new("Generate a checklist for Hovione sterile manufacturing audit")
                .with_response_type(response_type);
            let facets = QueryFacets::extract(&query, &["Hovione".to_string()]);
            let results = vec![
                AgentResult::new(
                    "internal_audit",
                    0,
                    AgentOutput {
                        text: "Check gowning [PRIORITY]".to_string(),
                        documents: vec![SourceDocument::from_path("audit.pdf", 0.9).with_page("1")],
                    },
                ),
                AgentResult::new(
                    "quality_systems",
                    1,
                    AgentOutput {
                        text: "Two open CAPAs".to_string(),
                        documents: vec![SourceDocument::from_path("capa.xlsx", 0.4)],
                    },
                ),
            ];
            let citations = CitationAggregator::default().aggregate(&results);
            let insights = CorrelationEngine::default().correlate(
                IntentLabel::AuditChecklist,
                &results,
                &citations,
            );
            Self {
                query,
                facets,
                results,
                citations,
                insights,
            }
        }

        fn input(&self) -> SynthesisInput<'_> {
            SynthesisInput {
                query: &self.query,
                facets: &self.facets,
                intent: IntentLabel::AuditChecklist,
                results: &self.results,
                citations: &self.citations,
                insights: &self.insights,
            }
        }
    }

    fn synthesizer(generator: Arc<FixedGenerator>) -> ResponseSynthesizer {
        ResponseSynthesizer::new(generator, &PromptSet::defaults(), SynthesisSettings::default())
    }

    #[test]
    fn test_prompt_bundle_is_complete() {
        let fixture = Fixture::new(ResponseType::Checklist);
        let request = synthesizer(FixedGenerator::ok("")).build_request(&fixture.input());

        assert!(request.system.contains("structured checklist"));
        assert!(request.user.contains("INTENT: audit_checklist"));
        assert!(request.user.contains("COMPANY: Hovione"));
        assert!(request.user.contains("### internal_audit [DOC_001]"));
        assert!(request.user.contains("- DOC_002: capa (capa.xlsx) [quality_systems]"));
        assert!(request.user.contains("Quality and audit correlation"));
        assert!(request.user.contains("[WATCHLIST]"));
        assert_eq!(request.max_tokens, 3000);
    }

    #[tokio::test]
    async fn test_labels_and_citations_checked() {
        let fixture = Fixture::new(ResponseType::General);
        let generator = FixedGenerator::ok(
            "[PRIORITY] Gowning gaps [DOC_001]\n[WATCHLIST] CAPA aging [DOC_002] [DOC_009]",
        );
        let synthesis = synthesizer(generator).synthesize(&fixture.input()).await;

        assert!(synthesis.answer.starts_with("🔥 Priority Gowning gaps"));
        assert!(synthesis.answer.contains("⚠️ Watchlist CAPA aging"));
        assert_eq!(
            synthesis.citation_check.referenced,
            vec![DocId::new(1).unwrap(), DocId::new(2).unwrap()]
        );
        assert_eq!(synthesis.citation_check.unknown, vec!["DOC_009"]);
        assert_eq!(synthesis.diagnostics.len(), 1);
        assert_eq!(synthesis.diagnostics[0].kind, DiagnosticKind::UnknownCitation);
    }

    #[tokio::test]
    async fn test_fallback_on_generator_failure() {
        let fixture = Fixture::new(ResponseType::General);
        let synthesis = synthesizer(FixedGenerator::failing())
            .synthesize(&fixture.input())
            .await;

        assert!(synthesis.answer.contains("## internal_audit"));
        assert!(synthesis.answer.contains("Check gowning 🔥 Priority"));
        assert!(synthesis.answer.contains("Sources: [DOC_002]"));
        assert!(synthesis.citation_check.is_clean());
        assert_eq!(synthesis.citation_check.referenced.len(), 2);
        assert_eq!(synthesis.diagnostics[0].kind, DiagnosticKind::SynthesisFallback);
    }

    #[test]
    fn test_check_citations_ignores_placeholders() {
        let fixture = Fixture::new(ResponseType::General);
        let check = check_citations(
            "Use [DOC_XXX] style; see DOC_0001 and DOC_000.",
            &fixture.citations,
        );
        assert_eq!(check.referenced, vec![DocId::new(1).unwrap()]);
        assert_eq!(check.unknown, vec!["DOC_000"]);
    }
}
