//! Data models for the audit router.
//!
//! This module contains the data structures that flow through one query's
//! lifecycle: the query itself, per-agent results and failures, cited
//! documents, correlation insights and the final response.

use crate::error::AgentError;
use crate::routing::{AgentScore, IntentLabel, QueryFacets};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Kind of answer the caller asked for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseType {
    #[default]
    General,
    Report,
    Checklist,
    Insights,
}

impl ResponseType {
    /// Instruction appended to a system prompt for this response type.
    pub fn instruction(&self) -> Option<&'static str> {
        match self {
            ResponseType::General => None,
            ResponseType::Report => Some(
                "Generate a comprehensive audit report with clear sections, findings, and recommendations.",
            ),
            ResponseType::Checklist => Some(
                "Generate a structured checklist or questionnaire with clear items and categories.",
            ),
            ResponseType::Insights => Some(
                "Provide detailed insights and analysis with supporting evidence from the context.",
            ),
        }
    }

    /// Whether answers of this type carry Priority / Standard / Watchlist tags.
    pub fn requires_risk_framing(&self) -> bool {
        matches!(self, ResponseType::Report | ResponseType::Checklist)
    }
}

impl fmt::Display for ResponseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResponseType::General => write!(f, "general"),
            ResponseType::Report => write!(f, "report"),
            ResponseType::Checklist => write!(f, "checklist"),
            ResponseType::Insights => write!(f, "insights"),
        }
    }
}

impl FromStr for ResponseType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "general" => Ok(ResponseType::General),
            "report" => Ok(ResponseType::Report),
            "checklist" => Ok(ResponseType::Checklist),
            "insights" => Ok(ResponseType::Insights),
            other => Err(format!("unknown response type: {}", other)),
        }
    }
}

/// Risk label used to frame sections of an answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PriorityLabel {
    Priority,
    Standard,
    Watchlist,
}

impl PriorityLabel {
    pub const ALL: [PriorityLabel; 3] = [
        PriorityLabel::Priority,
        PriorityLabel::Standard,
        PriorityLabel::Watchlist,
    ];

    /// Maps a free-form risk level to a label. Unknown levels are Standard.
    pub fn from_risk_level(level: &str) -> Self {
        match level.trim().to_lowercase().as_str() {
            "critical" | "major" => PriorityLabel::Priority,
            "watchlist" => PriorityLabel::Watchlist,
            _ => PriorityLabel::Standard,
        }
    }

    /// Display label with emoji.
    pub fn label(&self) -> &'static str {
        match self {
            PriorityLabel::Priority => "🔥 Priority",
            PriorityLabel::Standard => "✅ Standard",
            PriorityLabel::Watchlist => "⚠️ Watchlist",
        }
    }

    /// Tag the generator is asked to emit.
    pub fn tag(&self) -> &'static str {
        match self {
            PriorityLabel::Priority => "[PRIORITY]",
            PriorityLabel::Standard => "[STANDARD]",
            PriorityLabel::Watchlist => "[WATCHLIST]",
        }
    }

    /// Rewrites every raw tag in `text` into its display label.
    pub fn apply_tags(text: &str) -> String {
        let mut out = text.to_string();
        for label in Self::ALL {
            out = out.replace(label.tag(), label.label());
        }
        out
    }
}

impl fmt::Display for PriorityLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// An incoming audit query. Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Query {
    text: String,
    company: Option<String>,
    response_type: ResponseType,
}

impl Query {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            company: None,
            response_type: ResponseType::General,
        }
    }

    /// Attaches a company hint. Blank hints are ignored.
    pub fn with_company(mut self, company: impl Into<String>) -> Self {
        let company = company.into();
        let trimmed = company.trim();
        self.company = if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        };
        self
    }

    pub fn with_response_type(mut self, response_type: ResponseType) -> Self {
        self.response_type = response_type;
        self
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn company(&self) -> Option<&str> {
        self.company.as_deref()
    }

    pub fn response_type(&self) -> ResponseType {
        self.response_type
    }
}

/// A piece of evidence returned by an agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceDocument {
    /// Human-readable title.
    pub title: String,
    /// File name without directories.
    pub file_name: String,
    /// Lowercase extension without the dot, `unknown` when absent.
    pub extension: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
    /// Relevance score in [0, 1].
    pub relevance: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_type: Option<String>,
    /// Text the agent saw for this document.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub excerpt: String,
}

impl SourceDocument {
    /// Creates a document from a file path. The title defaults to the file stem.
    pub fn from_path(path: &str, relevance: f32) -> Self {
        let p = Path::new(path);
        let file_name = p
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.to_string());
        let extension = p
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_else(|| "unknown".to_string());
        let title = p
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| file_name.clone());

        Self {
            title,
            file_name,
            extension,
            page: None,
            section: None,
            relevance: clamp_relevance(relevance),
            company: None,
            date: None,
            source_type: None,
            excerpt: String::new(),
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_page(mut self, page: impl Into<String>) -> Self {
        self.page = Some(page.into());
        self
    }

    pub fn with_section(mut self, section: impl Into<String>) -> Self {
        self.section = Some(section.into());
        self
    }

    pub fn with_company(mut self, company: impl Into<String>) -> Self {
        self.company = Some(company.into());
        self
    }

    pub fn with_date(mut self, date: impl Into<String>) -> Self {
        self.date = Some(date.into());
        self
    }

    pub fn with_source_type(mut self, source_type: impl Into<String>) -> Self {
        self.source_type = Some(source_type.into());
        self
    }

    pub fn with_excerpt(mut self, excerpt: impl Into<String>) -> Self {
        self.excerpt = excerpt.into();
        self
    }

    /// Key under which documents from different agents collapse.
    pub fn dedup_key(&self) -> (String, Option<String>) {
        (
            self.file_name.clone(),
            self.page.as_ref().map(|p| p.trim().to_string()),
        )
    }

    /// Returns `file, p. N` or just the file name.
    pub fn location(&self) -> String {
        match &self.page {
            Some(page) => format!("{}, p. {}", self.file_name, page),
            None => self.file_name.clone(),
        }
    }
}

/// Cuts `text` to at most `max_chars` characters, marking the cut with `...`.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", text[..idx].trim_end()),
        None => text.to_string(),
    }
}

fn clamp_relevance(value: f32) -> f32 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// What an agent capability returns on success.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentOutput {
    pub text: String,
    pub documents: Vec<SourceDocument>,
}

/// A successful agent call, tagged with the agent's selection rank.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentResult {
    pub agent_id: String,
    /// Zero-based position in the selection.
    pub rank: usize,
    pub text: String,
    pub documents: Vec<SourceDocument>,
    pub elapsed_ms: u64,
}

impl AgentResult {
    pub fn new(agent_id: impl Into<String>, rank: usize, output: AgentOutput) -> Self {
        Self {
            agent_id: agent_id.into(),
            rank,
            text: output.text,
            documents: output.documents,
            elapsed_ms: 0,
        }
    }

    /// Sum of the relevance of every returned document.
    pub fn relevance_total(&self) -> f32 {
        self.documents.iter().map(|d| d.relevance).sum()
    }
}

/// Classification of an agent failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Timeout,
    Upstream,
    Generation,
    Unavailable,
    Aborted,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::Timeout => write!(f, "timeout"),
            FailureKind::Upstream => write!(f, "upstream"),
            FailureKind::Generation => write!(f, "generation"),
            FailureKind::Unavailable => write!(f, "unavailable"),
            FailureKind::Aborted => write!(f, "aborted"),
        }
    }
}

impl From<&AgentError> for FailureKind {
    fn from(err: &AgentError) -> Self {
        match err {
            AgentError::Timeout { .. } => FailureKind::Timeout,
            AgentError::Upstream { .. } => FailureKind::Upstream,
            AgentError::Generation { .. } => FailureKind::Generation,
            AgentError::Unavailable { .. } => FailureKind::Unavailable,
            AgentError::Aborted { .. } => FailureKind::Aborted,
        }
    }
}

/// A failed agent call, kept for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentFailure {
    pub agent_id: String,
    pub rank: usize,
    pub kind: FailureKind,
    pub reason: String,
}

impl AgentFailure {
    pub fn from_error(rank: usize, err: &AgentError) -> Self {
        Self {
            agent_id: err.agent().to_string(),
            rank,
            kind: FailureKind::from(err),
            reason: err.to_string(),
        }
    }
}

/// Citation id, rendered as `DOC_001`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DocId(u32);

impl DocId {
    /// Ids are 1-based; zero is rejected.
    pub fn new(seq: u32) -> Option<Self> {
        (seq > 0).then_some(Self(seq))
    }

    /// Id for the document at zero-based position `index`.
    pub fn from_index(index: usize) -> Self {
        Self(index as u32 + 1)
    }

    pub fn seq(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for DocId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DOC_{:03}", self.0)
    }
}

impl FromStr for DocId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s
            .strip_prefix("DOC_")
            .ok_or_else(|| format!("invalid document id: {}", s))?;
        if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
            return Err(format!("invalid document id: {}", s));
        }
        let seq: u32 = digits
            .parse()
            .map_err(|_| format!("invalid document id: {}", s))?;
        DocId::new(seq).ok_or_else(|| format!("invalid document id: {}", s))
    }
}

impl TryFrom<String> for DocId {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<DocId> for String {
    fn from(id: DocId) -> Self {
        id.to_string()
    }
}

/// A deduplicated document with its assigned id and owning agents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CitedDocument {
    pub id: DocId,
    /// Owning agents in the order they were walked.
    pub agents: Vec<String>,
    #[serde(flatten)]
    pub document: SourceDocument,
}

/// Short reference to a cited document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRef {
    pub id: DocId,
    pub title: String,
    pub file_name: String,
    pub relevance: f32,
}

impl From<&CitedDocument> for DocumentRef {
    fn from(doc: &CitedDocument) -> Self {
        Self {
            id: doc.id,
            title: doc.document.title.clone(),
            file_name: doc.document.file_name.clone(),
            relevance: doc.document.relevance,
        }
    }
}

/// Statistics over the deduplicated document set of one query.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentSummary {
    /// Number of distinct DOC ids.
    pub total_documents: usize,
    pub by_extension: BTreeMap<String, usize>,
    /// Agents that contributed at least one document, in rank order.
    pub agents_used: Vec<String>,
    /// Documents above the high-relevance threshold.
    pub high_relevance: Vec<DocumentRef>,
    pub by_source_type: BTreeMap<String, usize>,
    pub by_agent: BTreeMap<String, Vec<DocId>>,
}

/// Fixed set of cross-agent insight kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsightKind {
    QualityAuditCorrelation,
    RegulatoryComplianceGaps,
    SopQualityAlignment,
    TrendCrossValidation,
    RiskFactorIdentification,
}

impl InsightKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            InsightKind::QualityAuditCorrelation => "quality_audit_correlation",
            InsightKind::RegulatoryComplianceGaps => "regulatory_compliance_gaps",
            InsightKind::SopQualityAlignment => "sop_quality_alignment",
            InsightKind::TrendCrossValidation => "trend_cross_validation",
            InsightKind::RiskFactorIdentification => "risk_factor_identification",
        }
    }

    /// Heading used in prompts and reports.
    pub fn title(&self) -> &'static str {
        match self {
            InsightKind::QualityAuditCorrelation => "Quality and audit correlation",
            InsightKind::RegulatoryComplianceGaps => "Regulatory compliance gaps",
            InsightKind::SopQualityAlignment => "SOP and quality alignment",
            InsightKind::TrendCrossValidation => "Trend cross-validation",
            InsightKind::RiskFactorIdentification => "Risk factor identification",
        }
    }

    /// What the generator should look for when narrating this insight.
    pub fn guidance(&self) -> &'static str {
        match self {
            InsightKind::QualityAuditCorrelation => {
                "Correlate quality events and CAPAs with internal audit findings; note recurring areas."
            }
            InsightKind::RegulatoryComplianceGaps => {
                "Compare current SOPs against recent regulatory actions and guidance; list gaps."
            }
            InsightKind::SopQualityAlignment => {
                "Check whether SOP changes address the quality events and deviations observed."
            }
            InsightKind::TrendCrossValidation => {
                "Confirm or contradict internal quality trends with external industry signals."
            }
            InsightKind::RiskFactorIdentification => {
                "Combine signals from every source into a ranked list of risk factors."
            }
        }
    }
}

impl fmt::Display for InsightKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Documents one agent contributed to an insight.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentEvidence {
    pub agent_id: String,
    pub documents: Vec<DocId>,
}

/// A fired cross-agent insight.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorrelationInsight {
    pub kind: InsightKind,
    /// Agents whose joint presence triggered the rule, in rank order.
    pub agents: Vec<String>,
    pub evidence: Vec<AgentEvidence>,
}

impl CorrelationInsight {
    /// Every DOC id backing this insight, ascending and distinct.
    pub fn document_ids(&self) -> Vec<DocId> {
        let mut ids: Vec<DocId> = self
            .evidence
            .iter()
            .flat_map(|e| e.documents.iter().copied())
            .collect();
        ids.sort();
        ids.dedup();
        ids
    }
}

/// How much of the selection produced evidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "tier", rename_all = "snake_case")]
pub enum AnalysisTier {
    Full,
    Partial { succeeded: usize, selected: usize },
}

impl AnalysisTier {
    pub fn from_counts(succeeded: usize, selected: usize) -> Self {
        if succeeded >= selected {
            AnalysisTier::Full
        } else {
            AnalysisTier::Partial {
                succeeded,
                selected,
            }
        }
    }

    pub fn is_partial(&self) -> bool {
        matches!(self, AnalysisTier::Partial { .. })
    }
}

impl fmt::Display for AnalysisTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnalysisTier::Full => write!(f, "Full analysis"),
            AnalysisTier::Partial {
                succeeded,
                selected,
            } => write!(
                f,
                "Partial analysis ({} of {} agents succeeded)",
                succeeded, selected
            ),
        }
    }
}

/// Non-fatal condition recorded during a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    ClassificationAmbiguous,
    SelectionEmpty,
    AgentError,
    CitationInconsistency,
    SynthesisFallback,
    UnknownCitation,
}

impl fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DiagnosticKind::ClassificationAmbiguous => "classification_ambiguous",
            DiagnosticKind::SelectionEmpty => "selection_empty",
            DiagnosticKind::AgentError => "agent_error",
            DiagnosticKind::CitationInconsistency => "citation_inconsistency",
            DiagnosticKind::SynthesisFallback => "synthesis_fallback",
            DiagnosticKind::UnknownCitation => "unknown_citation",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub message: String,
}

impl Diagnostic {
    pub fn new(kind: DiagnosticKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// Outcome of one registered agent for this query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AgentStatus {
    Succeeded,
    Failed { kind: FailureKind, reason: String },
    NotSelected,
}

impl fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AgentStatus::Succeeded => write!(f, "✅ succeeded"),
            AgentStatus::Failed { kind, .. } => write!(f, "❌ failed ({})", kind),
            AgentStatus::NotSelected => write!(f, "not selected"),
        }
    }
}

/// Per-agent diagnostics row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentReport {
    pub agent_id: String,
    /// Selection rank, absent for agents that were not selected.
    pub rank: Option<usize>,
    pub score: f64,
    #[serde(flatten)]
    pub status: AgentStatus,
    pub documents_found: usize,
    pub relevance_total: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub elapsed_ms: Option<u64>,
}

/// Citations found in the synthesized answer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CitationCheck {
    /// Known ids the answer references, ascending.
    pub referenced: Vec<DocId>,
    /// `DOC_XXX` references with no matching document.
    pub unknown: Vec<String>,
}

impl CitationCheck {
    pub fn is_clean(&self) -> bool {
        self.unknown.is_empty()
    }
}

/// Lifecycle states a query passes through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QueryState {
    Received,
    IntentClassified,
    AgentsSelected,
    Dispatched,
    ResultsCollected,
    CitationsAggregated,
    Correlated,
    Synthesized,
    Done,
    Failed,
}

impl QueryState {
    /// Whether `next` may follow `self`.
    pub fn can_transition_to(&self, next: QueryState) -> bool {
        use QueryState::*;
        matches!(
            (self, next),
            (Received, IntentClassified)
                | (IntentClassified, AgentsSelected)
                | (AgentsSelected, Dispatched)
                | (Dispatched, ResultsCollected)
                | (ResultsCollected, CitationsAggregated)
                | (ResultsCollected, Failed)
                | (CitationsAggregated, Correlated)
                | (Correlated, Synthesized)
                | (Synthesized, Done)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, QueryState::Done | QueryState::Failed)
    }
}

impl fmt::Display for QueryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            QueryState::Received => "RECEIVED",
            QueryState::IntentClassified => "INTENT_CLASSIFIED",
            QueryState::AgentsSelected => "AGENTS_SELECTED",
            QueryState::Dispatched => "DISPATCHED",
            QueryState::ResultsCollected => "RESULTS_COLLECTED",
            QueryState::CitationsAggregated => "CITATIONS_AGGREGATED",
            QueryState::Correlated => "CORRELATED",
            QueryState::Synthesized => "SYNTHESIZED",
            QueryState::Done => "DONE",
            QueryState::Failed => "FAILED",
        };
        write!(f, "{}", s)
    }
}

/// Structured result handed to the presentation layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditResponse {
    pub query: String,
    pub response_type: ResponseType,
    pub facets: QueryFacets,
    pub intent: IntentLabel,
    pub intent_confidence: f64,
    /// Selected agents with their scores, in rank order.
    pub selected_agents: Vec<AgentScore>,
    /// Every registered agent, selected ones first in rank order.
    pub agent_reports: Vec<AgentReport>,
    pub tier: AnalysisTier,
    pub documents: Vec<CitedDocument>,
    pub summary: DocumentSummary,
    pub insights: Vec<CorrelationInsight>,
    pub answer: String,
    pub citation_check: CitationCheck,
    pub diagnostics: Vec<Diagnostic>,
    pub lifecycle: Vec<QueryState>,
    pub generated_at: DateTime<Utc>,
    pub elapsed_ms: u64,
}

impl AuditResponse {
    pub fn document(&self, id: DocId) -> Option<&CitedDocument> {
        self.documents.iter().find(|d| d.id == id)
    }

    pub fn has_diagnostic(&self, kind: DiagnosticKind) -> bool {
        self.diagnostics.iter().any(|d| d.kind == kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_doc_id_format_and_parse() {
        let id = DocId::new(7).unwrap();
        assert_eq!(id.to_string(), "DOC_007");
        assert_eq!("DOC_007".parse::<DocId>().unwrap(), id);
        assert_eq!("DOC_1234".parse::<DocId>().unwrap().seq(), 1234);
        assert!("DOC_000".parse::<DocId>().is_err());
        assert!("DOC_".parse::<DocId>().is_err());
        assert!("doc_001".parse::<DocId>().is_err());
        assert!(DocId::new(0).is_none());
    }

    #[test]
    fn test_doc_id_serializes_as_string() {
        let id = DocId::new(12).unwrap();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"DOC_012\"");
        let back: DocId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn test_source_document_from_path() {
        let doc = SourceDocument::from_path("reports/2024/Hovione_Audit.PDF", 1.7);
        assert_eq!(doc.file_name, "Hovione_Audit.PDF");
        assert_eq!(doc.extension, "pdf");
        assert_eq!(doc.title, "Hovione_Audit");
        assert_eq!(doc.relevance, 1.0);

        let doc = SourceDocument::from_path("notes", -0.5);
        assert_eq!(doc.extension, "unknown");
        assert_eq!(doc.relevance, 0.0);
    }

    #[test]
    fn test_dedup_key_uses_file_and_page() {
        let a = SourceDocument::from_path("a/capa.pdf", 0.9).with_page("3");
        let b = SourceDocument::from_path("b/capa.pdf", 0.2).with_page(" 3 ");
        let c = SourceDocument::from_path("capa.pdf", 0.2).with_page("4");
        assert_eq!(a.dedup_key(), b.dedup_key());
        assert_ne!(a.dedup_key(), c.dedup_key());
        assert_eq!(a.location(), "capa.pdf, p. 3");
    }

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("short", 10), "short");
        assert_eq!(truncate_chars("déviation report", 9), "déviation...");
        assert_eq!(truncate_chars("", 3), "");
    }

    #[test]
    fn test_priority_labels() {
        assert_eq!(PriorityLabel::from_risk_level("Critical"), PriorityLabel::Priority);
        assert_eq!(PriorityLabel::from_risk_level("major"), PriorityLabel::Priority);
        assert_eq!(PriorityLabel::from_risk_level("minor"), PriorityLabel::Standard);
        assert_eq!(PriorityLabel::from_risk_level("watchlist"), PriorityLabel::Watchlist);
        assert_eq!(PriorityLabel::from_risk_level("???"), PriorityLabel::Standard);

        let text = "[PRIORITY] Cleanroom\n[WATCHLIST] Supplier\n[STANDARD] Training";
        let out = PriorityLabel::apply_tags(text);
        assert_eq!(
            out,
            "🔥 Priority Cleanroom\n⚠️ Watchlist Supplier\n✅ Standard Training"
        );
    }

    #[test]
    fn test_response_type_parse() {
        assert_eq!("Checklist".parse::<ResponseType>().unwrap(), ResponseType::Checklist);
        assert!("memo".parse::<ResponseType>().is_err());
        assert!(ResponseType::Report.requires_risk_framing());
        assert!(!ResponseType::Insights.requires_risk_framing());
        assert!(ResponseType::General.instruction().is_none());
    }

    #[test]
    fn test_query_company_hint() {
        let q = Query::new("audit prep").with_company("  ");
        assert_eq!(q.company(), None);
        let q = Query::new("audit prep")
            .with_company(" Hovione ")
            .with_response_type(ResponseType::Report);
        assert_eq!(q.company(), Some("Hovione"));
        assert_eq!(q.response_type(), ResponseType::Report);
    }

    #[test]
    fn test_analysis_tier() {
        assert_eq!(AnalysisTier::from_counts(2, 2), AnalysisTier::Full);
        let tier = AnalysisTier::from_counts(1, 3);
        assert!(tier.is_partial());
        assert_eq!(tier.to_string(), "Partial analysis (1 of 3 agents succeeded)");
    }

    #[test]
    fn test_lifecycle_transitions() {
        assert!(QueryState::Received.can_transition_to(QueryState::IntentClassified));
        assert!(QueryState::ResultsCollected.can_transition_to(QueryState::Failed));
        assert!(!QueryState::Dispatched.can_transition_to(QueryState::Failed));
        assert!(!QueryState::Received.can_transition_to(QueryState::Done));
        assert!(QueryState::Failed.is_terminal());
    }

    #[test]
    fn test_failure_from_error() {
        let err = AgentError::Upstream {
            agent: "sop".to_string(),
            message: "index offline".to_string(),
        };
        let failure = AgentFailure::from_error(1, &err);
        assert_eq!(failure.agent_id, "sop");
        assert_eq!(failure.kind, FailureKind::Upstream);
        assert!(failure.reason.contains("index offline"));
    }
}
