//! Agent selection.
//!
//! Every registered agent is scored against the classified intent and the
//! query text. Agents above the threshold are kept, ordered by descending
//! score with ties broken by id, and capped at the fan-out width.

use super::facets::detect_company;
use super::intent::IntentLabel;
use super::registry::{AgentProfile, CapabilityRegistry};
use super::terms::{matched_terms, normalize};
use crate::models::Query;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use tracing::debug;

pub const PRIMARY_INTENT_WEIGHT: f64 = 3.0;
pub const SECONDARY_INTENT_WEIGHT: f64 = 1.5;
pub const KEYWORD_WEIGHT: f64 = 1.0;
pub const COMPANY_WEIGHT: f64 = 1.0;

/// Signals that contributed to an agent's score.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub primary_intent: bool,
    pub secondary_intent: bool,
    pub matched_keywords: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matched_company: Option<String>,
}

impl ScoreBreakdown {
    pub fn total(&self) -> f64 {
        let mut score = 0.0;
        if self.primary_intent {
            score += PRIMARY_INTENT_WEIGHT;
        }
        if self.secondary_intent {
            score += SECONDARY_INTENT_WEIGHT;
        }
        score += KEYWORD_WEIGHT * self.matched_keywords.len() as f64;
        if self.matched_company.is_some() {
            score += COMPANY_WEIGHT;
        }
        score
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentScore {
    pub agent_id: String,
    pub score: f64,
    pub breakdown: ScoreBreakdown,
}

/// Outcome of selection for one query.
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    /// Selected agents, best first.
    pub ranked: Vec<AgentScore>,
    /// Every registered agent in the same order as `ranked` would sort them.
    pub all_scores: Vec<AgentScore>,
    /// True when nobody cleared the threshold and the best agent was taken.
    pub fallback: bool,
}

impl Selection {
    pub fn agent_ids(&self) -> Vec<String> {
        self.ranked.iter().map(|s| s.agent_id.clone()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.ranked.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct AgentSelector {
    threshold: f64,
    max_agents: usize,
}

impl AgentSelector {
    pub fn new(threshold: f64, max_agents: usize) -> Self {
        Self {
            threshold,
            max_agents: max_agents.max(1),
        }
    }

    /// Scores one profile.
    pub fn score(
        &self,
        profile: &AgentProfile,
        normalized_text: &str,
        intent: IntentLabel,
        company_hint: Option<&str>,
    ) -> AgentScore {
        let mut breakdown = ScoreBreakdown {
            primary_intent: profile.primary_intents.contains(&intent),
            secondary_intent: profile.secondary_intents.contains(&intent),
            matched_keywords: matched_terms(normalized_text, &profile.keywords),
            matched_company: None,
        };

        breakdown.matched_company = match company_hint {
            Some(hint) => profile
                .companies
                .iter()
                .find(|c| c.eq_ignore_ascii_case(hint.trim()))
                .cloned(),
            None => None,
        }
        .or_else(|| detect_company(normalized_text, &profile.companies));

        AgentScore {
            agent_id: profile.id.clone(),
            score: breakdown.total(),
            breakdown,
        }
    }

    /// Selects agents for a classified query. Never empty for a non-empty registry.
    pub fn select(
        &self,
        registry: &CapabilityRegistry,
        query: &Query,
        intent: IntentLabel,
    ) -> Selection {
        let normalized = normalize(query.text());

        let mut all_scores: Vec<AgentScore> = registry
            .profiles()
            .map(|p| self.score(p, &normalized, intent, query.company()))
            .collect();
        all_scores.sort_by(rank_order);

        for s in &all_scores {
            debug!(
                "Agent '{}' scored {:.1} (keywords: {:?})",
                s.agent_id, s.score, s.breakdown.matched_keywords
            );
        }

        let mut ranked: Vec<AgentScore> = all_scores
            .iter()
            .filter(|s| s.score > self.threshold)
            .take(self.max_agents)
            .cloned()
            .collect();

        let fallback = ranked.is_empty() && !all_scores.is_empty();
        if fallback {
            ranked.extend(all_scores.first().cloned());
        }

        Selection {
            ranked,
            all_scores,
            fallback,
        }
    }
}

/// Descending score, then ascending id.
fn rank_order(a: &AgentScore, b: &AgentScore) -> Ordering {
    b.score
        .partial_cmp(&a.score)
        .unwrap_or(Ordering::Equal)
        .then_with(|| a.agent_id.cmp(&b.agent_id))
}
