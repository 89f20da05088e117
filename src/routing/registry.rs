//! Agent capability registry.
//!
//! Built once at startup from the default profiles plus any `[agents.*]`
//! overrides, then only read while queries run.

use super::intent::IntentLabel;
use crate::config::{AgentOverride, Config};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

/// Companies the default registry associates with quality and regulatory agents.
pub const DEFAULT_COMPANIES: [&str; 5] = [
    "Hovione",
    "Boehringer",
    "Thermo Fisher",
    "GRAM",
    "Grand River",
];

/// Declared capabilities of one agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentProfile {
    pub id: String,
    pub description: String,
    pub primary_intents: Vec<IntentLabel>,
    pub secondary_intents: Vec<IntentLabel>,
    /// Lowercase keywords.
    pub keywords: Vec<String>,
    /// Company names in canonical case.
    pub companies: Vec<String>,
    /// Knowledge store namespace searched by this agent.
    pub namespace: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl AgentProfile {
    pub fn new(id: &str, namespace: &str) -> Self {
        Self {
            id: id.to_string(),
            description: String::new(),
            primary_intents: Vec::new(),
            secondary_intents: Vec::new(),
            keywords: Vec::new(),
            companies: Vec::new(),
            namespace: namespace.to_string(),
            temperature: 0.1,
            max_tokens: 1500,
        }
    }

    pub fn describe(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }

    pub fn primary(mut self, intents: &[IntentLabel]) -> Self {
        self.primary_intents = intents.to_vec();
        self
    }

    pub fn secondary(mut self, intents: &[IntentLabel]) -> Self {
        self.secondary_intents = intents.to_vec();
        self
    }

    pub fn keywords(mut self, keywords: &[&str]) -> Self {
        self.keywords = keywords.iter().map(|k| k.to_lowercase()).collect();
        self
    }

    pub fn companies(mut self, companies: &[&str]) -> Self {
        self.companies = companies.iter().map(|c| c.to_string()).collect();
        self
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    fn apply(&mut self, over: &AgentOverride) -> Result<()> {
        if let Some(description) = &over.description {
            self.description = description.clone();
        }
        if let Some(intents) = &over.primary_intents {
            self.primary_intents = parse_intents(intents)?;
        }
        if let Some(intents) = &over.secondary_intents {
            self.secondary_intents = parse_intents(intents)?;
        }
        if let Some(keywords) = &over.keywords {
            self.keywords = keywords.iter().map(|k| k.trim().to_lowercase()).collect();
        }
        if let Some(companies) = &over.companies {
            self.companies = companies.iter().map(|c| c.trim().to_string()).collect();
        }
        if let Some(namespace) = &over.namespace {
            self.namespace = namespace.clone();
        }
        if let Some(temperature) = over.temperature {
            self.temperature = temperature;
        }
        if let Some(max_tokens) = over.max_tokens {
            self.max_tokens = max_tokens;
        }
        Ok(())
    }
}

fn parse_intents(names: &[String]) -> Result<Vec<IntentLabel>> {
    names
        .iter()
        .map(|n| n.parse::<IntentLabel>().map_err(|e| anyhow::anyhow!(e)))
        .collect()
}

/// The five built-in knowledge agents.
pub fn default_profiles() -> Vec<AgentProfile> {
    use IntentLabel::*;

    vec![
        AgentProfile::new("internal_audit", "internal-audit")
            .describe("Internal audit procedures, past findings and audit reports")
            .primary(&[AuditChecklist, AuditAgenda, AuditReport, InternalAudit])
            .secondary(&[HealthAssessment, TrendAnalysis, GeneralAudit])
            .keywords(&["audit", "checklist", "procedures", "compliance", "inspection"])
            .max_tokens(2000),
        AgentProfile::new("sop", "sop")
            .describe("Standard operating procedures and their revisions")
            .primary(&[SopReview, AuditAgenda])
            .secondary(&[DeltaAnalysis, HealthAssessment, QualityAnalysis])
            .keywords(&["sop", "procedures", "documentation", "policies", "standard operating"]),
        AgentProfile::new("quality_systems", "quality-systems")
            .describe("Quality events, deviations, CAPAs and non-conformances")
            .primary(&[QualityAnalysis, HealthAssessment, TrendAnalysis])
            .secondary(&[DeltaAnalysis, AuditReport, SupplierAudit])
            .keywords(&[
                "quality",
                "deviations",
                "capas",
                "non-conformances",
                "quality events",
                "sterile",
                "manufacturing",
            ])
            .companies(&DEFAULT_COMPANIES),
        AgentProfile::new("web_scraper", "web-scraper")
            .describe("FDA warning letters, 483s, EIRs and regulatory guidance")
            .primary(&[RegulatoryResearch, RegulatoryAudit, SupplierAudit])
            .secondary(&[HealthAssessment, DeltaAnalysis, SopReview])
            .keywords(&["fda", "warning", "483", "eir", "regulatory", "guidance", "compliance"])
            .companies(&DEFAULT_COMPANIES),
        AgentProfile::new("external_conference", "external-conference")
            .describe("Conference proceedings and industry engagement notes")
            .primary(&[ConferenceAnalysis, TrendAnalysis])
            .secondary(&[HealthAssessment, DeltaAnalysis])
            .keywords(&["conference", "meeting", "event", "presentation", "industry", "external"]),
    ]
}

/// Read-only lookup from agent id to profile.
#[derive(Debug, Clone, Default)]
pub struct CapabilityRegistry {
    profiles: HashMap<String, AgentProfile>,
    ids: Vec<String>,
}

impl CapabilityRegistry {
    pub fn new(profiles: Vec<AgentProfile>) -> Self {
        let mut map = HashMap::with_capacity(profiles.len());
        for profile in profiles {
            map.insert(profile.id.clone(), profile);
        }
        let mut ids: Vec<String> = map.keys().cloned().collect();
        ids.sort();
        Self { profiles: map, ids }
    }

    pub fn with_defaults() -> Self {
        Self::new(default_profiles())
    }

    /// Defaults with `[agents.*]` overrides applied. Unknown ids add agents.
    pub fn from_config(config: &Config) -> Result<Self> {
        let mut profiles = default_profiles();

        for (id, over) in &config.agents {
            match profiles.iter_mut().find(|p| &p.id == id) {
                Some(profile) => {
                    debug!("Overriding capabilities of agent '{}'", id);
                    profile
                        .apply(over)
                        .with_context(|| format!("Invalid override for agent '{}'", id))?;
                }
                None => {
                    debug!("Registering agent '{}' from config", id);
                    let namespace = id.replace('_', "-");
                    let mut profile = AgentProfile::new(id, &namespace);
                    profile
                        .apply(over)
                        .with_context(|| format!("Invalid definition for agent '{}'", id))?;
                    profiles.push(profile);
                }
            }
        }

        Ok(Self::new(profiles))
    }

    pub fn get(&self, id: &str) -> Option<&AgentProfile> {
        self.profiles.get(id)
    }

    /// Registered ids in lexical order.
    pub fn agent_ids(&self) -> &[String] {
        &self.ids
    }

    /// Profiles in lexical id order.
    pub fn profiles(&self) -> impl Iterator<Item = &AgentProfile> {
        self.ids.iter().filter_map(|id| self.profiles.get(id))
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Every associated company across all agents, first-seen order, distinct.
    pub fn known_companies(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for profile in self.profiles() {
            for company in &profile.companies {
                if !out.iter().any(|c| c.eq_ignore_ascii_case(company)) {
                    out.push(company.clone());
                }
            }
        }
        out
    }
}
