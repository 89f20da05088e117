//! Intent classification.
//!
//! Each intent owns a list of weighted phrases. A query's score for an
//! intent is the sum of the weights of the phrases it contains; the
//! highest score wins and equal scores resolve by table order.

use super::terms::{contains_term, normalize};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Weight of a single-word pattern.
pub const WORD_WEIGHT: f64 = 1.0;
/// Weight of a multi-word phrase pattern.
pub const PHRASE_WEIGHT: f64 = 1.5;

/// Classified category of a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentLabel {
    AuditChecklist,
    AuditAgenda,
    AuditReport,
    DeltaAnalysis,
    HealthAssessment,
    TrendAnalysis,
    SupplierAudit,
    InternalAudit,
    RegulatoryAudit,
    QualityAnalysis,
    SopReview,
    RegulatoryResearch,
    ConferenceAnalysis,
    GeneralAudit,
}

impl IntentLabel {
    /// Every label in tie-break priority order.
    pub const ALL: [IntentLabel; 14] = [
        IntentLabel::AuditChecklist,
        IntentLabel::AuditAgenda,
        IntentLabel::AuditReport,
        IntentLabel::DeltaAnalysis,
        IntentLabel::HealthAssessment,
        IntentLabel::TrendAnalysis,
        IntentLabel::SupplierAudit,
        IntentLabel::InternalAudit,
        IntentLabel::RegulatoryAudit,
        IntentLabel::QualityAnalysis,
        IntentLabel::SopReview,
        IntentLabel::RegulatoryResearch,
        IntentLabel::ConferenceAnalysis,
        IntentLabel::GeneralAudit,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            IntentLabel::AuditChecklist => "audit_checklist",
            IntentLabel::AuditAgenda => "audit_agenda",
            IntentLabel::AuditReport => "audit_report",
            IntentLabel::DeltaAnalysis => "delta_analysis",
            IntentLabel::HealthAssessment => "health_assessment",
            IntentLabel::TrendAnalysis => "trend_analysis",
            IntentLabel::SupplierAudit => "supplier_audit",
            IntentLabel::InternalAudit => "internal_audit",
            IntentLabel::RegulatoryAudit => "regulatory_audit",
            IntentLabel::QualityAnalysis => "quality_analysis",
            IntentLabel::SopReview => "sop_review",
            IntentLabel::RegulatoryResearch => "regulatory_research",
            IntentLabel::ConferenceAnalysis => "conference_analysis",
            IntentLabel::GeneralAudit => "general_audit",
        }
    }

    /// What the final answer should concentrate on for this intent.
    pub fn focus(&self) -> &'static str {
        match self {
            IntentLabel::AuditChecklist => {
                "Create a risk-based audit checklist covering facilities, systems, processes and documentation, with evidence requirements and regulatory references for each item."
            }
            IntentLabel::AuditAgenda => {
                "Analyze the audit agenda: critical areas needing attention, well-covered areas, items to monitor, and additions suggested by recent changes."
            }
            IntentLabel::AuditReport => {
                "Write an audit report with an executive summary, observations, findings classified by severity, and recommendations."
            }
            IntentLabel::DeltaAnalysis => {
                "Summarize what changed since the reference period across SOPs, quality systems and regulatory status, and the audit impact of each change."
            }
            IntentLabel::HealthAssessment => {
                "Give a 360-degree health assessment: quality performance, regulatory standing, audit history and overall risk."
            }
            IntentLabel::TrendAnalysis => {
                "Identify trends and recurring patterns in the audit and quality data, with supporting metrics."
            }
            IntentLabel::SupplierAudit => {
                "Assess the supplier or CDMO: quality record, regulatory actions and areas to probe during the audit."
            }
            IntentLabel::InternalAudit => {
                "Support the internal site audit: procedures, past findings and open actions."
            }
            IntentLabel::RegulatoryAudit => {
                "Assess regulatory compliance: inspections, observations, warning letters and GMP expectations."
            }
            IntentLabel::QualityAnalysis => {
                "Analyze quality events, deviations, CAPAs and non-conformances, including root causes and effectiveness."
            }
            IntentLabel::SopReview => {
                "Review the SOPs: coverage, recent revisions, gaps against requirements and training implications."
            }
            IntentLabel::RegulatoryResearch => {
                "Research the applicable regulations and guidance, recent updates and their impact on the audit."
            }
            IntentLabel::ConferenceAnalysis => {
                "Summarize conference and industry intelligence relevant to the audit and emerging expectations."
            }
            IntentLabel::GeneralAudit => {
                "Answer the audit question comprehensively using all available evidence."
            }
        }
    }

    /// Whether answers for this intent carry Priority / Standard / Watchlist tags.
    pub fn requires_risk_framing(&self) -> bool {
        matches!(
            self,
            IntentLabel::AuditChecklist
                | IntentLabel::AuditAgenda
                | IntentLabel::DeltaAnalysis
                | IntentLabel::HealthAssessment
                | IntentLabel::TrendAnalysis
        )
    }
}

impl fmt::Display for IntentLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for IntentLabel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        IntentLabel::ALL
            .iter()
            .copied()
            .find(|label| label.as_str() == wanted)
            .ok_or_else(|| format!("unknown intent: {}", s))
    }
}

/// Groups of related intents referenced by correlation rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentFamily {
    Regulatory,
    Quality,
    Health,
    Trend,
}

impl IntentFamily {
    pub fn members(&self) -> &'static [IntentLabel] {
        match self {
            IntentFamily::Regulatory => &[
                IntentLabel::RegulatoryAudit,
                IntentLabel::RegulatoryResearch,
                IntentLabel::SopReview,
            ],
            IntentFamily::Quality => &[
                IntentLabel::QualityAnalysis,
                IntentLabel::SopReview,
                IntentLabel::DeltaAnalysis,
            ],
            IntentFamily::Health => &[IntentLabel::HealthAssessment, IntentLabel::SupplierAudit],
            IntentFamily::Trend => &[IntentLabel::TrendAnalysis, IntentLabel::ConferenceAnalysis],
        }
    }

    pub fn contains(&self, intent: IntentLabel) -> bool {
        self.members().contains(&intent)
    }
}

/// A phrase and the score it adds when present.
#[derive(Debug, Clone, PartialEq)]
pub struct IntentPattern {
    pub phrase: String,
    pub weight: f64,
}

impl IntentPattern {
    /// Words weigh [`WORD_WEIGHT`], phrases [`PHRASE_WEIGHT`].
    pub fn new(phrase: &str) -> Self {
        let phrase = normalize(phrase);
        let weight = if phrase.contains(char::is_whitespace) {
            PHRASE_WEIGHT
        } else {
            WORD_WEIGHT
        };
        Self { phrase, weight }
    }
}

/// Result of classifying one query.
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub intent: IntentLabel,
    /// Winning score divided by the sum of all positive scores, 0 on fallback.
    pub confidence: f64,
    /// Positive scores in table order.
    pub scores: Vec<(IntentLabel, f64)>,
}

impl Classification {
    /// True when no pattern matched and the fallback label was used.
    pub fn is_fallback(&self) -> bool {
        self.scores.is_empty()
    }
}

/// Pure, table-driven intent classifier.
#[derive(Debug, Clone)]
pub struct IntentClassifier {
    table: Vec<(IntentLabel, Vec<IntentPattern>)>,
}

impl Default for IntentClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl IntentClassifier {
    /// Builds the classifier with the default pattern table.
    pub fn new() -> Self {
        let raw: [(IntentLabel, &[&str]); 13] = [
            (
                IntentLabel::AuditChecklist,
                &["checklist", "list", "steps", "procedures", "items to check", "audit items"],
            ),
            (
                IntentLabel::AuditAgenda,
                &["agenda", "schedule", "plan", "timeline", "meeting plan", "audit plan"],
            ),
            (
                IntentLabel::AuditReport,
                &["report", "findings", "observations", "summary", "conclusion", "audit report"],
            ),
            (
                IntentLabel::DeltaAnalysis,
                &[
                    "changed",
                    "delta",
                    "since last",
                    "updates",
                    "what changed",
                    "differences",
                    "modifications",
                ],
            ),
            (
                IntentLabel::HealthAssessment,
                &["health", "status", "360", "overview", "assessment", "evaluation", "condition"],
            ),
            (
                IntentLabel::TrendAnalysis,
                &["insights", "trends", "patterns", "analysis", "statistics", "metrics", "performance"],
            ),
            (
                IntentLabel::SupplierAudit,
                &["supplier", "cdmo", "vendor", "contractor", "external", "third party"],
            ),
            (
                IntentLabel::InternalAudit,
                &["internal", "site", "facility", "own", "company", "in-house"],
            ),
            (
                IntentLabel::RegulatoryAudit,
                &["regulatory", "compliance", "fda", "ema", "gmp", "inspection", "regulatory audit"],
            ),
            (
                IntentLabel::QualityAnalysis,
                &["quality", "deviations", "capas", "non-conformances", "quality issues", "quality events"],
            ),
            (
                IntentLabel::SopReview,
                &["sop", "procedures", "documentation", "policies", "standard operating procedures"],
            ),
            (
                IntentLabel::RegulatoryResearch,
                &["regulations", "guidelines", "fda guidance", "ema guidance", "regulatory updates"],
            ),
            (
                IntentLabel::ConferenceAnalysis,
                &["conference", "meeting", "event", "presentation", "industry", "external engagement"],
            ),
        ];

        let table = raw
            .iter()
            .map(|(label, phrases)| {
                (*label, phrases.iter().map(|p| IntentPattern::new(p)).collect())
            })
            .collect();

        Self { table }
    }

    /// Builds a classifier from a custom table. Row order is the tie-break order.
    pub fn with_table(table: Vec<(IntentLabel, Vec<IntentPattern>)>) -> Self {
        Self { table }
    }

    /// Scores the query against a single intent.
    pub fn score(&self, text: &str, intent: IntentLabel) -> f64 {
        let normalized = normalize(text);
        self.table
            .iter()
            .filter(|(label, _)| *label == intent)
            .map(|(_, patterns)| score_patterns(&normalized, patterns))
            .sum()
    }

    /// Classifies a query. Deterministic for a given text and table.
    pub fn classify(&self, text: &str) -> Classification {
        let normalized = normalize(text);

        let scores: Vec<(IntentLabel, f64)> = self
            .table
            .iter()
            .map(|(label, patterns)| (*label, score_patterns(&normalized, patterns)))
            .filter(|(_, score)| *score > 0.0)
            .collect();

        // Strictly greater keeps the earlier row on ties.
        let mut best: Option<(IntentLabel, f64)> = None;
        for &(label, score) in &scores {
            match best {
                Some((_, top)) if score <= top => {}
                _ => best = Some((label, score)),
            }
        }

        match best {
            Some((intent, top)) => {
                let total: f64 = scores.iter().map(|(_, s)| s).sum();
                Classification {
                    intent,
                    confidence: top / total,
                    scores,
                }
            }
            None => Classification {
                intent: IntentLabel::GeneralAudit,
                confidence: 0.0,
                scores,
            },
        }
    }
}

fn score_patterns(normalized: &str, patterns: &[IntentPattern]) -> f64 {
    patterns
        .iter()
        .filter(|p| contains_term(normalized, &p.phrase))
        .map(|p| p.weight)
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checklist_query() {
        let classifier = IntentClassifier::new();
        let result =
            classifier.classify("Generate a checklist for Hovione sterile manufacturing audit");
        assert_eq!(result.intent, IntentLabel::AuditChecklist);
        assert!(result.confidence > 0.0);
        assert!(!result.is_fallback());
    }

    #[test]
    fn test_fallback_to_general_audit() {
        let classifier = IntentClassifier::new();
        let result = classifier.classify("hello there");
        assert_eq!(result.intent, IntentLabel::GeneralAudit);
        assert_eq!(result.confidence, 0.0);
        assert!(result.is_fallback());
    }

    #[test]
    fn test_phrase_outweighs_word() {
        let classifier = IntentClassifier::new();
        // "what changed" + "changed" + "since last" beat the single "quality".
        let result = classifier.classify("What changed in quality since last audit?");
        assert_eq!(result.intent, IntentLabel::DeltaAnalysis);
        assert_eq!(classifier.score("what changed since last", IntentLabel::DeltaAnalysis), 4.0);
    }

    #[test]
    fn test_tie_breaks_by_table_order() {
        let classifier = IntentClassifier::new();
        // "procedures" scores 1.0 for both audit_checklist and sop_review.
        let result = classifier.classify("procedures");
        assert_eq!(result.intent, IntentLabel::AuditChecklist);
        assert_eq!(result.confidence, 0.5);
    }

    #[test]
    fn test_classification_is_deterministic() {
        let classifier = IntentClassifier::new();
        let query = "FDA regulatory compliance status for Boehringer";
        let first = classifier.classify(query);
        for _ in 0..10 {
            assert_eq!(classifier.classify(query), first);
        }
    }

    #[test]
    fn test_custom_table() {
        let classifier = IntentClassifier::with_table(vec![(
            IntentLabel::SopReview,
            vec![IntentPattern::new("work instruction")],
        )]);
        let result = classifier.classify("Review the work instructions");
        assert_eq!(result.intent, IntentLabel::SopReview);
        assert_eq!(result.confidence, 1.0);
    }

    #[test]
    fn test_label_parse_and_families() {
        assert_eq!("sop_review".parse::<IntentLabel>().unwrap(), IntentLabel::SopReview);
        assert!("sop".parse::<IntentLabel>().is_err());
        assert!(IntentFamily::Regulatory.contains(IntentLabel::SopReview));
        assert!(IntentFamily::Quality.contains(IntentLabel::SopReview));
        assert!(!IntentFamily::Trend.contains(IntentLabel::HealthAssessment));
        assert!(IntentLabel::AuditAgenda.requires_risk_framing());
        assert!(!IntentLabel::SopReview.requires_risk_framing());
    }
}
