//! Markdown and JSON rendering of an [`AuditResponse`].

use crate::models::{AuditResponse, CorrelationInsight, DocumentSummary};
use crate::pipeline::QueryPlan;
use anyhow::{Context, Result};
use std::io::Write;
use std::path::Path;

/// Generate a complete Markdown report.
pub fn generate_markdown_report(response: &AuditResponse) -> String {
    let mut output = String::new();

    output.push_str("# Audit Intelligence Report\n\n");
    output.push_str(&generate_metadata_section(response));
    output.push_str(&generate_agents_section(response));
    output.push_str(&generate_answer_section(response));
    output.push_str(&generate_insights_section(&response.insights));
    output.push_str(&generate_sources_section(response));
    output.push_str(&generate_summary_section(&response.summary));
    output.push_str(&generate_diagnostics_section(response));
    output.push_str(&generate_footer());

    output
}

fn generate_metadata_section(response: &AuditResponse) -> String {
    let mut section = String::new();

    section.push_str("## Query\n\n");
    section.push_str(&format!("> {}\n\n", response.query.trim()));
    section.push_str(&format!(
        "- **Generated:** {}\n",
        response.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    section.push_str(&format!(
        "- **Intent:** `{}` (confidence {:.2})\n",
        response.intent, response.intent_confidence
    ));
    section.push_str(&format!("- **Response type:** {}\n", response.response_type));
    section.push_str(&format!(
        "- **Company:** {}\n",
        response.facets.company_or_default()
    ));
    section.push_str(&format!("- **Audit type:** {}\n", response.facets.audit_type));
    section.push_str(&format!("- **Period:** {}\n", response.facets.time_period));
    section.push_str(&format!("- **Analysis:** {}\n", response.tier));
    section.push_str(&format!(
        "- **Duration:** {:.1}s\n\n",
        response.elapsed_ms as f64 / 1000.0
    ));

    section
}

fn generate_agents_section(response: &AuditResponse) -> String {
    let mut section = String::new();

    section.push_str("## Agents\n\n");
    section.push_str("| Rank | Agent | Score | Status | Documents |\n");
    section.push_str("|:---:|:---|:---:|:---|:---:|\n");

    for report in &response.agent_reports {
        let rank = report
            .rank
            .map(|r| (r + 1).to_string())
            .unwrap_or_else(|| "-".to_string());
        section.push_str(&format!(
            "| {} | `{}` | {:.1} | {} | {} |\n",
            rank, report.agent_id, report.score, report.status, report.documents_found
        ));
    }
    section.push('\n');

    if response.tier.is_partial() {
        section.push_str(&format!("> ⚠️ {}\n\n", response.tier));
    }

    section
}

fn generate_answer_section(response: &AuditResponse) -> String {
    let mut section = String::new();

    section.push_str("## Answer\n\n");
    section.push_str(response.answer.trim());
    section.push_str("\n\n");

    section
}

fn generate_insights_section(insights: &[CorrelationInsight]) -> String {
    if insights.is_empty() {
        return String::new();
    }

    let mut section = String::new();
    section.push_str("## Cross-Agent Insights\n\n");

    for insight in insights {
        section.push_str(&format!("### {}\n\n", insight.kind.title()));
        section.push_str(&format!("{}\n\n", insight.kind.guidance()));
        for evidence in &insight.evidence {
            let ids: Vec<String> = evidence
                .documents
                .iter()
                .map(|id| format!("[{}]", id))
                .collect();
            let ids = if ids.is_empty() {
                "no documents".to_string()
            } else {
                ids.join(" ")
            };
            section.push_str(&format!("- `{}`: {}\n", evidence.agent_id, ids));
        }
        section.push('\n');
    }

    section
}

fn generate_sources_section(response: &AuditResponse) -> String {
    let mut section = String::new();

    section.push_str("## Sources\n\n");

    if response.documents.is_empty() {
        section.push_str("No documents were cited.\n\n");
        return section;
    }

    section.push_str("| ID | File | Page | Agents | Relevance | Company | Date |\n");
    section.push_str("|:---|:---|:---:|:---|:---:|:---|:---|\n");

    for doc in &response.documents {
        let d = &doc.document;
        section.push_str(&format!(
            "| {} | `{}` | {} | {} | {:.2} | {} | {} |\n",
            doc.id,
            d.file_name,
            d.page.as_deref().unwrap_or("-"),
            doc.agents.join(", "),
            d.relevance,
            d.company.as_deref().unwrap_or("-"),
            d.date.as_deref().unwrap_or("-"),
        ));
    }
    section.push('\n');

    section
}

fn generate_summary_section(summary: &DocumentSummary) -> String {
    let mut section = String::new();

    section.push_str("## Document Summary\n\n");
    section.push_str(&format!(
        "- **Total documents:** {}\n- **Agents used:** {}\n\n",
        summary.total_documents,
        if summary.agents_used.is_empty() {
            "none".to_string()
        } else {
            summary.agents_used.join(", ")
        }
    ));

    if !summary.by_extension.is_empty() {
        section.push_str("### By Extension\n\n");
        section.push_str("| Extension | Count |\n");
        section.push_str("|:---|:---:|\n");

        let mut extensions: Vec<_> = summary.by_extension.iter().collect();
        extensions.sort_by_key(|(_, count)| std::cmp::Reverse(**count));
        for (ext, count) in extensions {
            section.push_str(&format!("| {} | {} |\n", ext, count));
        }
        section.push('\n');
    }

    if !summary.by_source_type.is_empty() {
        section.push_str("### By Source Type\n\n");
        section.push_str("| Source type | Count |\n");
        section.push_str("|:---|:---:|\n");
        for (source_type, count) in &summary.by_source_type {
            section.push_str(&format!("| {} | {} |\n", source_type, count));
        }
        section.push('\n');
    }

    if !summary.high_relevance.is_empty() {
        section.push_str("### High Relevance\n\n");
        for doc in &summary.high_relevance {
            section.push_str(&format!(
                "- [{}] {} (`{}`, {:.2})\n",
                doc.id, doc.title, doc.file_name, doc.relevance
            ));
        }
        section.push('\n');
    }

    section
}

fn generate_diagnostics_section(response: &AuditResponse) -> String {
    if response.diagnostics.is_empty() {
        return String::new();
    }

    let mut section = String::new();
    section.push_str("## Diagnostics\n\n");
    for diagnostic in &response.diagnostics {
        section.push_str(&format!("- **{}**: {}\n", diagnostic.kind, diagnostic.message));
    }
    section.push('\n');

    section
}

fn generate_footer() -> String {
    "---\n\n*Report generated by audit-router*\n".to_string()
}

/// Routing decision for `--explain`, without any agent output.
pub fn generate_plan_report(plan: &QueryPlan) -> String {
    let mut output = String::new();

    output.push_str("# Routing Plan\n\n");
    output.push_str(&format!("> {}\n\n", plan.query.text().trim()));
    output.push_str(&format!(
        "- **Intent:** `{}` (confidence {:.2})\n",
        plan.classification.intent, plan.classification.confidence
    ));
    output.push_str(&format!("- **Company:** {}\n", plan.facets.company_or_default()));
    output.push_str(&format!("- **Audit type:** {}\n", plan.facets.audit_type));
    output.push_str(&format!("- **Period:** {}\n\n", plan.facets.time_period));

    if !plan.classification.scores.is_empty() {
        output.push_str("## Intent Scores\n\n");
        output.push_str("| Intent | Score |\n");
        output.push_str("|:---|:---:|\n");
        for (intent, score) in &plan.classification.scores {
            output.push_str(&format!("| `{}` | {:.1} |\n", intent, score));
        }
        output.push('\n');
    }

    output.push_str("## Agent Scores\n\n");
    output.push_str("| Agent | Score | Primary | Secondary | Keywords | Company | Selected |\n");
    output.push_str("|:---|:---:|:---:|:---:|:---|:---:|:---:|\n");
    for score in &plan.selection.all_scores {
        let b = &score.breakdown;
        let selected = plan
            .selection
            .ranked
            .iter()
            .any(|s| s.agent_id == score.agent_id);
        output.push_str(&format!(
            "| `{}` | {:.1} | {} | {} | {} | {} | {} |\n",
            score.agent_id,
            score.score,
            if b.primary_intent { "yes" } else { "-" },
            if b.secondary_intent { "yes" } else { "-" },
            if b.matched_keywords.is_empty() {
                "-".to_string()
            } else {
                b.matched_keywords.join(", ")
            },
            b.matched_company.as_deref().unwrap_or("-"),
            if selected { "✅" } else { "" }
        ));
    }
    output.push('\n');

    for diagnostic in &plan.diagnostics {
        output.push_str(&format!("- **{}**: {}\n", diagnostic.kind, diagnostic.message));
    }

    output
}

/// Generate a JSON report.
pub fn generate_json_report(response: &AuditResponse) -> Result<String> {
    serde_json::to_string_pretty(response).context("Failed to serialize report")
}

/// Write rendered content to a file.
pub fn write_report(content: &str, path: &Path) -> Result<()> {
    let mut file = std::fs::File::create(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    file.write_all(content.as_bytes())
        .with_context(|| format!("Failed to write report to {}", path.display()))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        AgentEvidence, AgentReport, AgentStatus, AnalysisTier, CitationCheck, CitedDocument,
        Diagnostic, DiagnosticKind, DocId, DocumentRef, FailureKind, InsightKind, Query,
        QueryState, ResponseType, SourceDocument,
    };
    use crate::routing::{IntentLabel, QueryFacets};
    use chrono::Utc;
    use std::collections::BTreeMap;

    fn create_test_response() -> AuditResponse {
        let doc = CitedDocument {
            id: DocId::from_index(0),
            agents: vec!["internal_audit".to_string(), "quality_systems".to_string()],
            document: SourceDocument::from_path("audits/hovione_2023.pdf", 0.92)
                .with_page("14")
                .with_company("Hovione")
                .with_date("2023-09-12"),
        };
        let summary = DocumentSummary {
            total_documents: 1,
            by_extension: [("pdf".to_string(), 1)].into_iter().collect(),
            agents_used: vec!["internal_audit".to_string(), "quality_systems".to_string()],
            high_relevance: vec![DocumentRef::from(&doc)],
            by_source_type: BTreeMap::new(),
            by_agent: BTreeMap::new(),
        };

        AuditResponse {
            query: "Generate a checklist for Hovione".to_string(),
            response_type: ResponseType::Checklist,
            facets: QueryFacets::extract(
                &Query::new("Generate a checklist for Hovione"),
                &["Hovione".to_string()],
            ),
            intent: IntentLabel::AuditChecklist,
            intent_confidence: 1.0,
            selected_agents: Vec::new(),
            agent_reports: vec![
                AgentReport {
                    agent_id: "internal_audit".to_string(),
                    rank: Some(0),
                    score: 5.0,
                    status: AgentStatus::Succeeded,
                    documents_found: 1,
                    relevance_total: 0.92,
                    elapsed_ms: Some(1200),
                },
                AgentReport {
                    agent_id: "quality_systems".to_string(),
                    rank: Some(1),
                    score: 3.0,
                    status: AgentStatus::Failed {
                        kind: FailureKind::Timeout,
                        reason: "quality_systems timed out after 90s".to_string(),
                    },
                    documents_found: 0,
                    relevance_total: 0.0,
                    elapsed_ms: None,
                },
            ],
            tier: AnalysisTier::Partial { succeeded: 1, selected: 2 },
            documents: vec![doc.clone()],
            summary,
            insights: vec![CorrelationInsight {
                kind: InsightKind::QualityAuditCorrelation,
                agents: doc.agents.clone(),
                evidence: vec![AgentEvidence {
                    agent_id: "internal_audit".to_string(),
                    documents: vec![doc.id],
                }],
            }],
            answer: "🔥 Priority Gowning [DOC_001]".to_string(),
            citation_check: CitationCheck {
                referenced: vec![doc.id],
                unknown: Vec::new(),
            },
            diagnostics: vec![Diagnostic::new(
                DiagnosticKind::AgentError,
                "quality_systems timed out after 90s",
            )],
            lifecycle: vec![QueryState::Received, QueryState::Done],
            generated_at: Utc::now(),
            elapsed_ms: 2500,
        }
    }

    #[test]
    fn test_generate_markdown_report() {
        let markdown = generate_markdown_report(&create_test_response());

        assert!(markdown.contains("# Audit Intelligence Report"));
        assert!(markdown.contains("`audit_checklist` (confidence 1.00)"));
        assert!(markdown.contains("- **Company:** Hovione"));
        assert!(markdown.contains("Partial analysis (1 of 2 agents succeeded)"));
        assert!(markdown.contains("| 1 | `internal_audit` | 5.0 | ✅ succeeded | 1 |"));
        assert!(markdown.contains("❌ failed (timeout)"));
        assert!(markdown.contains("### Quality and audit correlation"));
        assert!(markdown.contains("- `internal_audit`: [DOC_001]"));
        assert!(markdown.contains(
            "| DOC_001 | `hovione_2023.pdf` | 14 | internal_audit, quality_systems | 0.92 | Hovione | 2023-09-12 |"
        ));
        assert!(markdown.contains("| pdf | 1 |"));
        assert!(markdown.contains("**agent_error**"));
    }

    #[test]
    fn test_full_analysis_has_no_partial_banner() {
        let mut response = create_test_response();
        response.tier = AnalysisTier::Full;
        response.insights.clear();
        response.diagnostics.clear();

        let markdown = generate_markdown_report(&response);
        assert!(!markdown.contains("> ⚠️"));
        assert!(!markdown.contains("## Cross-Agent Insights"));
        assert!(!markdown.contains("## Diagnostics"));
    }

    #[test]
    fn test_generate_json_report() {
        let json = generate_json_report(&create_test_response()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value["intent"], "audit_checklist");
        assert_eq!(value["documents"][0]["id"], "DOC_001");
        assert_eq!(value["documents"][0]["file_name"], "hovione_2023.pdf");
        assert_eq!(value["tier"]["tier"], "partial");
        assert_eq!(value["agent_reports"][1]["status"], "failed");
        assert_eq!(value["lifecycle"][1], "DONE");
    }

    #[test]
    fn test_write_report() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.md");
        write_report("# Report\n", &path).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "# Report\n");
    }
}
