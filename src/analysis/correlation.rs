//! Cross-agent correlation.
//!
//! A second pass over the agents that returned evidence: at least one
//! document or a non-blank answer. Each rule names the agents
//! that must all be present (by set containment), an optional minimum agent
//! count and an intent requirement. A kind fires at most once per query.

use super::aggregator::CitationSet;
use crate::models::{AgentEvidence, AgentResult, CorrelationInsight, InsightKind};
use crate::routing::{IntentFamily, IntentLabel};
use std::collections::{BTreeSet, HashSet};
use tracing::info;

/// Intent condition attached to a rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntentRequirement {
    Any,
    Family(IntentFamily),
    Exact(IntentLabel),
}

impl IntentRequirement {
    pub fn matches(&self, intent: IntentLabel) -> bool {
        match self {
            IntentRequirement::Any => true,
            IntentRequirement::Family(family) => family.contains(intent),
            IntentRequirement::Exact(label) => *label == intent,
        }
    }
}

/// `(required agents, minimum count, intent requirement) -> insight kind`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorrelationRule {
    pub kind: InsightKind,
    pub required_agents: Vec<String>,
    pub min_agents: usize,
    pub intent: IntentRequirement,
}

impl CorrelationRule {
    pub fn new(kind: InsightKind) -> Self {
        Self {
            kind,
            required_agents: Vec::new(),
            min_agents: 0,
            intent: IntentRequirement::Any,
        }
    }

    pub fn requires(mut self, agents: &[&str]) -> Self {
        self.required_agents = agents.iter().map(|a| a.to_string()).collect();
        self
    }

    pub fn min_agents(mut self, count: usize) -> Self {
        self.min_agents = count;
        self
    }

    pub fn when(mut self, intent: IntentRequirement) -> Self {
        self.intent = intent;
        self
    }

    pub fn matches(&self, present: &BTreeSet<&str>, intent: IntentLabel) -> bool {
        self.intent.matches(intent)
            && present.len() >= self.min_agents
            && self
                .required_agents
                .iter()
                .all(|a| present.contains(a.as_str()))
    }
}

/// Built-in rule table.
pub fn default_rules() -> Vec<CorrelationRule> {
    use IntentFamily::*;
    use InsightKind::*;

    vec![
        CorrelationRule::new(QualityAuditCorrelation)
            .requires(&["quality_systems", "internal_audit"]),
        CorrelationRule::new(RegulatoryComplianceGaps)
            .requires(&["sop", "web_scraper"])
            .when(IntentRequirement::Family(Regulatory)),
        CorrelationRule::new(SopQualityAlignment)
            .requires(&["sop", "quality_systems"])
            .when(IntentRequirement::Family(Quality)),
        CorrelationRule::new(RiskFactorIdentification)
            .min_agents(3)
            .when(IntentRequirement::Family(Health)),
        CorrelationRule::new(TrendCrossValidation)
            .requires(&["quality_systems", "external_conference"])
            .when(IntentRequirement::Family(Trend)),
    ]
}

#[derive(Debug, Clone)]
pub struct CorrelationEngine {
    rules: Vec<CorrelationRule>,
}

impl Default for CorrelationEngine {
    fn default() -> Self {
        Self::new(default_rules())
    }
}

impl CorrelationEngine {
    pub fn new(rules: Vec<CorrelationRule>) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &[CorrelationRule] {
        &self.rules
    }

    /// Fires every matching rule once, in table order. Agents that succeeded
    /// with neither documents nor text do not count as present.
    pub fn correlate(
        &self,
        intent: IntentLabel,
        results: &[AgentResult],
        citations: &CitationSet,
    ) -> Vec<CorrelationInsight> {
        let mut ranked: Vec<&AgentResult> = results.iter().filter(|r| has_evidence(r)).collect();
        ranked.sort_by(|a, b| a.rank.cmp(&b.rank).then_with(|| a.agent_id.cmp(&b.agent_id)));

        let present: BTreeSet<&str> = ranked.iter().map(|r| r.agent_id.as_str()).collect();
        let mut fired: HashSet<InsightKind> = HashSet::new();
        let mut insights = Vec::new();

        for rule in &self.rules {
            if fired.contains(&rule.kind) || !rule.matches(&present, intent) {
                continue;
            }

            let agents: Vec<String> = ranked
                .iter()
                .map(|r| r.agent_id.clone())
                .filter(|id| rule.required_agents.is_empty() || rule.required_agents.contains(id))
                .fold(Vec::new(), |mut acc, id| {
                    if !acc.contains(&id) {
                        acc.push(id);
                    }
                    acc
                });

            let evidence = agents
                .iter()
                .map(|id| AgentEvidence {
                    agent_id: id.clone(),
                    documents: citations.ids_for(id).to_vec(),
                })
                .collect();

            info!("Insight fired: {} ({})", rule.kind, agents.join(", "));
            fired.insert(rule.kind);
            insights.push(CorrelationInsight {
                kind: rule.kind,
                agents,
                evidence,
            });
        }

        insights
    }
}

fn has_evidence(result: &AgentResult) -> bool {
    !result.documents.is_empty() || !result.text.trim().is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::aggregator::CitationAggregator;
    use crate::models::{AgentOutput, DocId, SourceDocument};

    fn result(agent: &str, rank: usize, files: &[&str]) -> AgentResult {
        AgentResult::new(
            agent,
            rank,
            AgentOutput {
                text: String::new(),
                documents: files
                    .iter()
                    .map(|f| SourceDocument::from_path(f, 0.5).with_page("1"))
                    .collect(),
            },
        )
    }

    fn run(
        engine: &CorrelationEngine,
        intent: IntentLabel,
        results: &[AgentResult],
    ) -> Vec<CorrelationInsight> {
        let citations = CitationAggregator::default().aggregate(results);
        engine.correlate(intent, results, &citations)
    }

    fn kinds(insights: &[CorrelationInsight]) -> Vec<InsightKind> {
        insights.iter().map(|i| i.kind).collect()
    }

    #[test]
    fn test_quality_audit_correlation_any_intent() {
        let results = vec![
            result("internal_audit", 0, &["a.pdf", "b.pdf"]),
            result("quality_systems", 1, &["c.pdf", "d.pdf"]),
        ];
        let insights = run(&CorrelationEngine::default(), IntentLabel::AuditChecklist, &results);

        assert_eq!(kinds(&insights), vec![InsightKind::QualityAuditCorrelation]);
        let insight = &insights[0];
        assert_eq!(insight.agents, vec!["internal_audit", "quality_systems"]);
        assert_eq!(insight.evidence[1].agent_id, "quality_systems");
        assert_eq!(
            insight.evidence[1].documents,
            vec![DocId::new(3).unwrap(), DocId::new(4).unwrap()]
        );
        assert_eq!(insight.document_ids().len(), 4);
    }

    #[test]
    fn test_regulatory_gaps_fire_once() {
        let mut rules = default_rules();
        // A second rule of the same kind that also matches.
        rules.push(
            CorrelationRule::new(InsightKind::RegulatoryComplianceGaps)
                .requires(&["web_scraper"])
                .when(IntentRequirement::Exact(IntentLabel::RegulatoryAudit)),
        );
        let engine = CorrelationEngine::new(rules);

        let results = vec![
            result("web_scraper", 0, &["fda_483.pdf", "wl.html"]),
            result("sop", 1, &["sop_1.pdf", "sop_2.pdf"]),
        ];
        let insights = run(&engine, IntentLabel::RegulatoryAudit, &results);
        assert_eq!(kinds(&insights), vec![InsightKind::RegulatoryComplianceGaps]);
        assert_eq!(insights[0].agents, vec!["web_scraper", "sop"]);
    }

    #[test]
    fn test_regulatory_gaps_need_regulatory_intent() {
        let results = vec![result("sop", 0, &["a.pdf"]), result("web_scraper", 1, &["b.pdf"])];
        let insights = run(&CorrelationEngine::default(), IntentLabel::TrendAnalysis, &results);
        assert!(insights.is_empty());
    }

    #[test]
    fn test_failed_agents_do_not_count() {
        // quality_systems was selected but failed, so only internal_audit is present.
        let results = vec![result("internal_audit", 0, &["a.pdf"])];
        let insights = run(&CorrelationEngine::default(), IntentLabel::AuditChecklist, &results);
        assert!(insights.is_empty());
    }

    #[test]
    fn test_risk_factors_need_three_agents_and_health_intent() {
        let results = vec![
            result("quality_systems", 0, &["q.pdf"]),
            result("web_scraper", 1, &["w.pdf"]),
            result("sop", 2, &["s.pdf"]),
        ];
        let insights = run(&CorrelationEngine::default(), IntentLabel::HealthAssessment, &results);
        assert_eq!(kinds(&insights), vec![InsightKind::RiskFactorIdentification]);
        assert_eq!(insights[0].agents, vec!["quality_systems", "web_scraper", "sop"]);
        assert_eq!(insights[0].evidence[2].documents, vec![DocId::new(3).unwrap()]);

        let two = &results[..2];
        assert!(run(&CorrelationEngine::default(), IntentLabel::HealthAssessment, two).is_empty());
    }

    #[test]
    fn test_empty_agents_are_not_present() {
        // sop succeeded but returned no documents and no text.
        let results = vec![
            result("quality_systems", 0, &["q.pdf"]),
            result("web_scraper", 1, &["w.pdf"]),
            result("sop", 2, &[]),
        ];
        let engine = CorrelationEngine::default();
        assert!(run(&engine, IntentLabel::HealthAssessment, &results).is_empty());

        let regulatory = vec![result("web_scraper", 0, &["fda_483.pdf"]), result("sop", 1, &[])];
        assert!(run(&engine, IntentLabel::RegulatoryAudit, &regulatory).is_empty());
    }

    #[test]
    fn test_text_only_answer_counts_as_evidence() {
        let mut sop = result("sop", 1, &[]);
        sop.text = "SOP-QA-014 was revised in February.".to_string();
        let results = vec![result("web_scraper", 0, &["fda_483.pdf"]), sop];

        let insights = run(&CorrelationEngine::default(), IntentLabel::RegulatoryAudit, &results);
        assert_eq!(kinds(&insights), vec![InsightKind::RegulatoryComplianceGaps]);
        assert!(insights[0].evidence[1].documents.is_empty());
    }

    #[test]
    fn test_multiple_kinds_fire_in_table_order() {
        let results = vec![
            result("quality_systems", 0, &["q.pdf"]),
            result("sop", 1, &["s.pdf"]),
            result("internal_audit", 2, &["i.pdf"]),
        ];
        let insights = run(&CorrelationEngine::default(), IntentLabel::QualityAnalysis, &results);
        assert_eq!(
            kinds(&insights),
            vec![InsightKind::QualityAuditCorrelation, InsightKind::SopQualityAlignment]
        );
    }

    #[test]
    fn test_trend_cross_validation() {
        let results = vec![
            result("external_conference", 0, &["pda_2024.pptx"]),
            result("quality_systems", 1, &["trend.xlsx"]),
        ];
        let insights = run(
            &CorrelationEngine::default(),
            IntentLabel::ConferenceAnalysis,
            &results,
        );
        assert_eq!(kinds(&insights), vec![InsightKind::TrendCrossValidation]);
    }
}
