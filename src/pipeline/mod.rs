//! Query engine tying routing, dispatch, citation, correlation and
//! synthesis together.
//!
//! One [`QueryEngine::run`] call walks a query through
//! RECEIVED → INTENT_CLASSIFIED → AGENTS_SELECTED → DISPATCHED →
//! RESULTS_COLLECTED → CITATIONS_AGGREGATED → CORRELATED → SYNTHESIZED → DONE.
//! It fails only when no selected agent succeeds or the query is cancelled.
//! All per-query state, including the document counter, lives inside the call.

pub mod synthesizer;

pub use synthesizer::{
    check_citations, fallback_answer, ResponseSynthesizer, Synthesis, SynthesisInput,
    SynthesisSettings,
};

use crate::agent::{AgentContext, AgentMap, PromptStore, TextGenerator};
use crate::analysis::{CitationAggregator, CorrelationEngine};
use crate::config::Config;
use crate::dispatch::{DispatchSettings, Dispatcher};
use crate::error::RouterError;
use crate::models::{
    AgentReport, AgentStatus, AuditResponse, Diagnostic, DiagnosticKind, Query, QueryState,
};
use crate::routing::{
    AgentSelector, CapabilityRegistry, Classification, IntentClassifier, QueryFacets, Selection,
};
use chrono::Utc;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Maximum query length in bytes.
pub const MAX_QUERY_LEN: usize = 10_000;

/// Engine tuning derived from [`Config`].
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub max_agents: usize,
    pub selection_threshold: f64,
    pub agent_timeout: Duration,
    pub high_relevance_threshold: f32,
    pub synthesis: SynthesisSettings,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for EngineConfig {
    fn from(config: &Config) -> Self {
        Self {
            max_agents: config.routing.max_agents,
            selection_threshold: config.routing.selection_threshold,
            agent_timeout: Duration::from_secs(config.dispatch.agent_timeout_seconds),
            high_relevance_threshold: config.citations.high_relevance_threshold,
            synthesis: SynthesisSettings {
                temperature: config.model.temperature,
                max_tokens: config.model.max_tokens,
                excerpt_chars: config.citations.excerpt_chars,
            },
        }
    }
}

/// Ordered trace of lifecycle states with transition checking.
#[derive(Debug, Clone, Default)]
struct Lifecycle {
    states: Vec<QueryState>,
}

impl Lifecycle {
    fn start() -> Self {
        Self {
            states: vec![QueryState::Received],
        }
    }

    fn advance(&mut self, next: QueryState) {
        if let Some(current) = self.states.last() {
            if !current.can_transition_to(next) {
                warn!("Unexpected lifecycle transition {} -> {}", current, next);
            }
        }
        debug!("Query state: {}", next);
        self.states.push(next);
    }

    fn into_states(self) -> Vec<QueryState> {
        self.states
    }
}

/// Routing decisions for a query, made without calling any agent.
#[derive(Debug, Clone)]
pub struct QueryPlan {
    pub query: Query,
    pub facets: QueryFacets,
    pub classification: Classification,
    pub selection: Selection,
    pub diagnostics: Vec<Diagnostic>,
}

pub struct QueryEngine {
    classifier: IntentClassifier,
    registry: CapabilityRegistry,
    selector: AgentSelector,
    dispatcher: Dispatcher,
    aggregator: CitationAggregator,
    correlation: CorrelationEngine,
    synthesizer: ResponseSynthesizer,
    max_concurrency: usize,
    agent_timeout: Duration,
}

impl QueryEngine {
    pub fn new(
        registry: CapabilityRegistry,
        agents: AgentMap,
        generator: Arc<dyn TextGenerator>,
        prompts: &dyn PromptStore,
        config: EngineConfig,
    ) -> Self {
        let settings = DispatchSettings {
            max_concurrency: config.max_agents.max(1),
            agent_timeout: config.agent_timeout,
            aggregate_timeout: None,
        };

        Self {
            classifier: IntentClassifier::new(),
            registry,
            selector: AgentSelector::new(config.selection_threshold, config.max_agents),
            dispatcher: Dispatcher::new(agents, settings),
            aggregator: CitationAggregator::new(config.high_relevance_threshold),
            correlation: CorrelationEngine::default(),
            synthesizer: ResponseSynthesizer::new(generator, prompts, config.synthesis),
            max_concurrency: settings.max_concurrency,
            agent_timeout: settings.agent_timeout,
        }
    }

    /// Replaces the correlation rule table.
    pub fn with_correlation(mut self, correlation: CorrelationEngine) -> Self {
        self.correlation = correlation;
        self
    }

    pub fn registry(&self) -> &CapabilityRegistry {
        &self.registry
    }

    /// Swaps in a new registry and capability map. Needs exclusive access,
    /// so no query can be in flight.
    pub fn reload_registry(&mut self, registry: CapabilityRegistry, agents: AgentMap) {
        info!("Reloading capability registry ({} agent(s))", registry.len());
        self.registry = registry;
        self.dispatcher = Dispatcher::new(
            agents,
            DispatchSettings {
                max_concurrency: self.max_concurrency,
                agent_timeout: self.agent_timeout,
                aggregate_timeout: None,
            },
        );
    }

    fn validate(query: &Query) -> Result<(), RouterError> {
        let text = query.text().trim();
        if text.is_empty() {
            return Err(RouterError::EmptyQuery);
        }
        if query.text().len() > MAX_QUERY_LEN {
            return Err(RouterError::QueryTooLong {
                len: query.text().len(),
                max: MAX_QUERY_LEN,
            });
        }
        Ok(())
    }

    /// Classifies the query and selects agents.
    pub fn plan(&self, query: &Query) -> Result<QueryPlan, RouterError> {
        Self::validate(query)?;

        let mut diagnostics = Vec::new();
        let facets = QueryFacets::extract(query, &self.registry.known_companies());

        let classification = self.classifier.classify(query.text());
        if classification.is_fallback() {
            warn!("No intent pattern matched; using {}", classification.intent);
            diagnostics.push(Diagnostic::new(
                DiagnosticKind::ClassificationAmbiguous,
                format!("no intent pattern matched; fell back to {}", classification.intent),
            ));
        }
        info!(
            "Intent: {} (confidence {:.2})",
            classification.intent, classification.confidence
        );

        let selection = self
            .selector
            .select(&self.registry, query, classification.intent);
        if selection.fallback {
            let best = selection.agent_ids().join(", ");
            warn!("No agent cleared the selection threshold; using {}", best);
            diagnostics.push(Diagnostic::new(
                DiagnosticKind::SelectionEmpty,
                format!(
                    "no agent cleared the selection threshold; selected best-scoring {}",
                    best
                ),
            ));
        }
        info!("Selected agents: {:?}", selection.agent_ids());

        Ok(QueryPlan {
            query: query.clone(),
            facets,
            classification,
            selection,
            diagnostics,
        })
    }

    pub async fn run(&self, query: Query) -> Result<AuditResponse, RouterError> {
        self.run_with_cancel(query, &CancellationToken::new()).await
    }

    /// Runs the full lifecycle. Cancelling `cancel` aborts pending agents and
    /// discards everything collected so far.
    pub async fn run_with_cancel(
        &self,
        query: Query,
        cancel: &CancellationToken,
    ) -> Result<AuditResponse, RouterError> {
        let started = Instant::now();
        let mut lifecycle = Lifecycle::start();

        let plan = self.plan(&query)?;
        lifecycle.advance(QueryState::IntentClassified);
        lifecycle.advance(QueryState::AgentsSelected);

        let QueryPlan {
            facets,
            classification,
            selection,
            mut diagnostics,
            ..
        } = plan;
        let intent = classification.intent;

        let context = AgentContext {
            intent,
            facets: facets.clone(),
        };
        let selected_ids = selection.agent_ids();

        lifecycle.advance(QueryState::Dispatched);
        let dispatched = self
            .dispatcher
            .dispatch(
                &selected_ids,
                query.text(),
                &context,
                query.response_type(),
                cancel,
            )
            .await;
        lifecycle.advance(QueryState::ResultsCollected);

        let outcome = match dispatched {
            Ok(outcome) => outcome,
            Err(err) => {
                if matches!(err, RouterError::NoData { .. }) {
                    lifecycle.advance(QueryState::Failed);
                }
                warn!("Query failed: {}", err);
                return Err(err);
            }
        };

        let tier = outcome.tier();
        info!("{}", tier);
        for failure in &outcome.failures {
            diagnostics.push(Diagnostic::new(
                DiagnosticKind::AgentError,
                failure.reason.clone(),
            ));
        }

        let citations = self.aggregator.aggregate(&outcome.results);
        diagnostics.extend(citations.diagnostics.iter().cloned());
        lifecycle.advance(QueryState::CitationsAggregated);
        info!(
            "Aggregated {} document(s) from {} agent(s)",
            citations.summary.total_documents,
            citations.summary.agents_used.len()
        );

        let insights = self
            .correlation
            .correlate(intent, &outcome.results, &citations);
        lifecycle.advance(QueryState::Correlated);

        let synthesis = self
            .synthesizer
            .synthesize(&SynthesisInput {
                query: &query,
                facets: &facets,
                intent,
                results: &outcome.results,
                citations: &citations,
                insights: &insights,
            })
            .await;
        diagnostics.extend(synthesis.diagnostics);
        lifecycle.advance(QueryState::Synthesized);

        let agent_reports = build_reports(&selection, &outcome.results, &outcome.failures);
        lifecycle.advance(QueryState::Done);

        Ok(AuditResponse {
            query: query.text().to_string(),
            response_type: query.response_type(),
            facets,
            intent,
            intent_confidence: classification.confidence,
            selected_agents: selection.ranked,
            agent_reports,
            tier,
            documents: citations.documents,
            summary: citations.summary,
            insights,
            answer: synthesis.answer,
            citation_check: synthesis.citation_check,
            diagnostics,
            lifecycle: lifecycle.into_states(),
            generated_at: Utc::now(),
            elapsed_ms: started.elapsed().as_millis() as u64,
        })
    }
}

/// One row per registered agent: selected agents in rank order, then the rest.
fn build_reports(
    selection: &Selection,
    results: &[crate::models::AgentResult],
    failures: &[crate::models::AgentFailure],
) -> Vec<AgentReport> {
    let mut reports: Vec<AgentReport> = selection
        .ranked
        .iter()
        .enumerate()
        .map(|(rank, score)| {
            let id = &score.agent_id;
            if let Some(result) = results.iter().find(|r| &r.agent_id == id) {
                AgentReport {
                    agent_id: id.clone(),
                    rank: Some(rank),
                    score: score.score,
                    status: AgentStatus::Succeeded,
                    documents_found: result.documents.len(),
                    relevance_total: result.relevance_total(),
                    elapsed_ms: Some(result.elapsed_ms),
                }
            } else {
                let status = match failures.iter().find(|f| &f.agent_id == id) {
                    Some(f) => AgentStatus::Failed {
                        kind: f.kind,
                        reason: f.reason.clone(),
                    },
                    None => AgentStatus::NotSelected,
                };
                AgentReport {
                    agent_id: id.clone(),
                    rank: Some(rank),
                    score: score.score,
                    status,
                    documents_found: 0,
                    relevance_total: 0.0,
                    elapsed_ms: None,
                }
            }
        })
        .collect();

    for score in &selection.all_scores {
        if selection.ranked.iter().any(|s| s.agent_id == score.agent_id) {
            continue;
        }
        reports.push(AgentReport {
            agent_id: score.agent_id.clone(),
            rank: None,
            score: score.score,
            status: AgentStatus::NotSelected,
            documents_found: 0,
            relevance_total: 0.0,
            elapsed_ms: None,
        });
    }

    reports
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{AgentCapability, GenerationRequest, PromptSet};
    use crate::error::{AgentError, GenerationError};
    use crate::models::{
        AgentOutput, AnalysisTier, DocId, FailureKind, InsightKind, ResponseType, SourceDocument,
    };
    use crate::routing::IntentLabel;
    use async_trait::async_trait;
    use std::collections::HashMap;

    /// Returns fixed documents after an optional delay, or fails.
    struct StubAgent {
        id: String,
        docs: Vec<SourceDocument>,
        delay_ms: u64,
        fail: bool,
    }

    #[async_trait]
    impl AgentCapability for StubAgent {
        fn id(&self) -> &str {
            &self.id
        }

        async fn query(
            &self,
            _text: &str,
            _context: &AgentContext,
            _response_type: ResponseType,
        ) -> Result<AgentOutput, AgentError> {
            tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
            if self.fail {
                return Err(AgentError::Upstream {
                    agent: self.id.clone(),
                    message: "vector index unreachable".to_string(),
                });
            }
            Ok(AgentOutput {
                text: format!("{} findings", self.id),
                documents: self.docs.clone(),
            })
        }
    }

    struct EchoGenerator;

    #[async_trait]
    impl TextGenerator for EchoGenerator {
        async fn generate(&self, _request: &GenerationRequest) -> Result<String, GenerationError> {
            Ok("[PRIORITY] Cleanroom gowning [DOC_001] and CAPA backlog [DOC_003]".to_string())
        }
    }

    fn stub(
        id: &str,
        files: &[(&str, &str)],
        delay_ms: u64,
        fail: bool,
    ) -> (String, Arc<dyn AgentCapability>) {
        let docs = files
            .iter()
            .map(|(f, p)| SourceDocument::from_path(f, 0.8).with_page(*p))
            .collect();
        (
            id.to_string(),
            Arc::new(StubAgent {
                id: id.to_string(),
                docs,
                delay_ms,
                fail,
            }),
        )
    }

    fn engine(agents: Vec<(String, Arc<dyn AgentCapability>)>) -> QueryEngine {
        let map: AgentMap = agents.into_iter().collect::<HashMap<_, _>>();
        let config = EngineConfig {
            agent_timeout: Duration::from_millis(500),
            ..EngineConfig::default()
        };
        QueryEngine::new(
            CapabilityRegistry::with_defaults(),
            map,
            Arc::new(EchoGenerator),
            &PromptSet::defaults(),
            config,
        )
    }

    const CHECKLIST_QUERY: &str = "Generate a checklist for Hovione sterile manufacturing audit";

    #[tokio::test]
    async fn test_checklist_end_to_end() {
        let engine = engine(vec![
            // The slower agent ranks first; numbering must not depend on timing.
            stub("internal_audit", &[("audit_2023.pdf", "1"), ("gowning.pdf", "4")], 40, false),
            stub("quality_systems", &[("capa_log.xlsx", "1"), ("deviations.csv", "1")], 0, false),
        ]);

        let response = engine.run(Query::new(CHECKLIST_QUERY)).await.unwrap();

        assert_eq!(response.intent, IntentLabel::AuditChecklist);
        let selected: Vec<_> = response
            .selected_agents
            .iter()
            .map(|s| s.agent_id.as_str())
            .collect();
        assert_eq!(selected, vec!["internal_audit", "quality_systems"]);
        assert!(response.selected_agents.iter().all(|s| s.score >= 1.0));

        let ids: Vec<String> = response.documents.iter().map(|d| d.id.to_string()).collect();
        assert_eq!(ids, vec!["DOC_001", "DOC_002", "DOC_003", "DOC_004"]);
        assert_eq!(response.documents[0].document.file_name, "audit_2023.pdf");
        assert_eq!(response.summary.total_documents, 4);
        assert_eq!(response.summary.agents_used, vec!["internal_audit", "quality_systems"]);
        assert_eq!(response.tier, AnalysisTier::Full);

        assert_eq!(response.insights.len(), 1);
        assert_eq!(response.insights[0].kind, InsightKind::QualityAuditCorrelation);

        assert!(response.answer.starts_with("🔥 Priority"));
        assert_eq!(
            response.citation_check.referenced,
            vec![DocId::new(1).unwrap(), DocId::new(3).unwrap()]
        );
        assert_eq!(response.facets.company.as_deref(), Some("Hovione"));
        assert_eq!(response.agent_reports.len(), 5);
        assert_eq!(response.agent_reports[2].status, AgentStatus::NotSelected);
        assert_eq!(
            response.lifecycle,
            vec![
                QueryState::Received,
                QueryState::IntentClassified,
                QueryState::AgentsSelected,
                QueryState::Dispatched,
                QueryState::ResultsCollected,
                QueryState::CitationsAggregated,
                QueryState::Correlated,
                QueryState::Synthesized,
                QueryState::Done,
            ]
        );
    }

    #[tokio::test]
    async fn test_shared_document_counted_once() {
        let engine = engine(vec![
            stub("internal_audit", &[("capa.pdf", "3"), ("a.pdf", "1")], 0, false),
            stub("quality_systems", &[("capa.pdf", "3"), ("b.pdf", "1"), ("c.pdf", "1")], 0, false),
        ]);
        let response = engine.run(Query::new(CHECKLIST_QUERY)).await.unwrap();
        assert_eq!(response.documents.len(), 4);
        assert_eq!(
            response.documents[0].agents,
            vec!["internal_audit", "quality_systems"]
        );
    }

    #[tokio::test]
    async fn test_partial_analysis_reported() {
        let engine = engine(vec![
            stub("internal_audit", &[("audit.pdf", "1")], 0, false),
            stub("quality_systems", &[], 0, true),
        ]);
        let response = engine.run(Query::new(CHECKLIST_QUERY)).await.unwrap();

        assert_eq!(response.tier, AnalysisTier::Partial { succeeded: 1, selected: 2 });
        assert!(response.insights.is_empty());
        assert!(response.has_diagnostic(DiagnosticKind::AgentError));
        assert!(matches!(
            response.agent_reports[1].status,
            AgentStatus::Failed { kind: FailureKind::Upstream, .. }
        ));
    }

    #[tokio::test]
    async fn test_all_agents_failing_is_no_data() {
        let engine = engine(vec![
            stub("internal_audit", &[], 0, true),
            stub("quality_systems", &[], 0, true),
        ]);
        let err = engine.run(Query::new(CHECKLIST_QUERY)).await.unwrap_err();
        assert!(matches!(err, RouterError::NoData { attempted: 2, .. }));
    }

    #[tokio::test]
    async fn test_query_validation() {
        let engine = engine(Vec::new());
        assert!(matches!(
            engine.run(Query::new("   ")).await,
            Err(RouterError::EmptyQuery)
        ));
        assert!(matches!(
            engine.run(Query::new("a".repeat(MAX_QUERY_LEN + 1))).await,
            Err(RouterError::QueryTooLong { .. })
        ));
    }

    #[test]
    fn test_plan_records_fallback_diagnostics() {
        let engine = engine(Vec::new());
        let plan = engine.plan(&Query::new("hello")).unwrap();
        assert_eq!(plan.classification.intent, IntentLabel::GeneralAudit);
        assert!(plan
            .diagnostics
            .iter()
            .any(|d| d.kind == DiagnosticKind::ClassificationAmbiguous));
        assert!(!plan.selection.is_empty());
    }

    #[tokio::test]
    async fn test_reload_registry() {
        let mut engine = engine(Vec::new());
        let registry =
            CapabilityRegistry::new(vec![crate::routing::AgentProfile::new("solo", "solo")]);
        let agents = vec![stub("solo", &[("x.pdf", "1")], 0, false)];
        engine.reload_registry(registry, agents.into_iter().collect());

        assert_eq!(engine.registry().agent_ids(), &["solo"]);
        let response = engine.run(Query::new("anything at all")).await.unwrap();
        assert!(response.has_diagnostic(DiagnosticKind::SelectionEmpty));
        assert_eq!(response.documents.len(), 1);
    }

    #[tokio::test]
    async fn test_cancelled_query() {
        let engine = engine(vec![
            stub("internal_audit", &[("a.pdf", "1")], 300, false),
            stub("quality_systems", &[("b.pdf", "1")], 300, false),
        ]);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = engine
            .run_with_cancel(Query::new(CHECKLIST_QUERY), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, RouterError::Cancelled));
    }
}
