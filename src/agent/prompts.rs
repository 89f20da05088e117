//! System prompts per agent.
//!
//! Compiled-in defaults can be replaced by `<prompt_dir>/<agent_id>.md`.
//! Prompts are only read here; editing them happens outside the router.

use crate::error::StoreError;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tracing::debug;

/// Prompt key used by the response synthesizer.
pub const ORCHESTRATOR: &str = "orchestrator";

/// Source of resolved system-prompt text.
pub trait PromptStore: Send + Sync {
    fn system_prompt(&self, agent_id: &str) -> Option<String>;
}

const INTERNAL_AUDIT_PROMPT: &str = "You are the Internal Audit agent. You work from audit procedures, \
past audit reports and compliance guidelines. You build audit checklists and questionnaires, \
write findings with recommendations, explain audit procedures and interpret compliance requirements. \
Answer with structured, actionable guidance and name the procedure or requirement behind each point.";

const SOP_PROMPT: &str = "You are the SOP agent. You work from standard operating procedures and \
audit protocols. You explain procedures, derive audit protocols from them, track how SOPs changed \
over time and advise on procedure compliance. Answer step by step and cite the specific SOP for each step.";

const QUALITY_SYSTEMS_PROMPT: &str = "You are the Quality Systems agent. You work from supplier \
notifications of change, deviations, CAPAs and other quality events. You track events over time \
for each company, spot patterns and summarize supplier quality trends. Always give the event \
details, the company and when it happened.";

const WEB_SCRAPER_PROMPT: &str = "You are the Regulatory Intelligence agent. You work from due \
diligence reports, FDA warning letters, 483 observations, inspection reports and public guidance. \
You assess manufacturing sites, their regulatory history and operational risks. Quote the relevant \
details, reference the source file and highlight key findings and risks.";

const EXTERNAL_CONFERENCE_PROMPT: &str = "You are the External Conference agent. You work from \
conference material, industry events and engagement notes. You identify companies, topics and \
dates, and relate them to industry trends relevant to an audit. Give specific event names, dates \
and companies when available.";

const ORCHESTRATOR_PROMPT: &str = "You are an audit intelligence analyst combining evidence from \
several specialist agents into one answer for a qualified pharmaceutical auditor. Use only the \
evidence provided, keep claims tied to their sources and state clearly when evidence is missing.";

/// Prompt set with defaults and optional file overrides.
#[derive(Debug, Clone)]
pub struct PromptSet {
    prompts: HashMap<String, String>,
}

impl Default for PromptSet {
    fn default() -> Self {
        Self::defaults()
    }
}

impl PromptSet {
    /// Compiled-in prompts for the built-in agents and the orchestrator.
    pub fn defaults() -> Self {
        let prompts = [
            ("internal_audit", INTERNAL_AUDIT_PROMPT),
            ("sop", SOP_PROMPT),
            ("quality_systems", QUALITY_SYSTEMS_PROMPT),
            ("web_scraper", WEB_SCRAPER_PROMPT),
            ("external_conference", EXTERNAL_CONFERENCE_PROMPT),
            (ORCHESTRATOR, ORCHESTRATOR_PROMPT),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        Self { prompts }
    }

    /// Defaults overridden by every non-empty `*.md` file in `dir`.
    pub fn load(dir: &Path) -> Result<Self, StoreError> {
        let mut set = Self::defaults();

        let entries = fs::read_dir(dir).map_err(|source| StoreError::Io {
            path: dir.to_path_buf(),
            source,
        })?;

        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("md") {
                continue;
            }
            let Some(agent_id) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };

            let text = fs::read_to_string(&path).map_err(|source| StoreError::Io {
                path: path.clone(),
                source,
            })?;
            let text = text.trim();
            if text.is_empty() {
                continue;
            }

            debug!("Prompt override for '{}' from {}", agent_id, path.display());
            set.prompts.insert(agent_id.to_string(), text.to_string());
        }

        Ok(set)
    }
}

impl PromptStore for PromptSet {
    fn system_prompt(&self, agent_id: &str) -> Option<String> {
        self.prompts.get(agent_id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_cover_builtin_agents() {
        let set = PromptSet::defaults();
        for id in [
            "internal_audit",
            "sop",
            "quality_systems",
            "web_scraper",
            "external_conference",
            ORCHESTRATOR,
        ] {
            assert!(set.system_prompt(id).is_some(), "missing prompt for {}", id);
        }
        assert!(set.system_prompt("unknown").is_none());
    }

    #[test]
    fn test_file_overrides() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("sop.md"), "Custom SOP prompt\n").unwrap();
        fs::write(dir.path().join("supplier_portal.md"), "Portal prompt").unwrap();
        fs::write(dir.path().join("web_scraper.md"), "   ").unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let set = PromptSet::load(dir.path()).unwrap();
        assert_eq!(set.system_prompt("sop").as_deref(), Some("Custom SOP prompt"));
        assert_eq!(set.system_prompt("supplier_portal").as_deref(), Some("Portal prompt"));
        assert_eq!(
            set.system_prompt("web_scraper").as_deref(),
            Some(WEB_SCRAPER_PROMPT)
        );
        assert!(set.system_prompt("notes").is_none());
    }

    #[test]
    fn test_missing_dir_is_an_error() {
        let dir = TempDir::new().unwrap();
        assert!(PromptSet::load(&dir.path().join("nope")).is_err());
    }
}
