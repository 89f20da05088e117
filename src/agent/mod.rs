//! Knowledge agents and the collaborators they call.
//!
//! Every agent is reached through [`AgentCapability`]. The built-in
//! implementation, [`KnowledgeAgent`], searches a [`KnowledgeStore`]
//! namespace and asks a [`TextGenerator`] to answer from the hits.

pub mod generator;
pub mod knowledge;
pub mod prompts;
pub mod store;

pub use generator::{GenerationRequest, OllamaGenerator, TextGenerator};
pub use knowledge::KnowledgeAgent;
pub use prompts::{PromptSet, PromptStore, ORCHESTRATOR};
pub use store::{KnowledgeRecord, KnowledgeStore, LocalKnowledgeStore};

use crate::error::AgentError;
use crate::models::{AgentOutput, ResponseType};
use crate::routing::{CapabilityRegistry, IntentLabel, QueryFacets};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

/// Per-query context shared with every dispatched agent.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentContext {
    pub intent: IntentLabel,
    pub facets: QueryFacets,
}

impl AgentContext {
    /// One-line description for prompts.
    pub fn describe(&self) -> String {
        format!(
            "Intent: {}. Company: {}. Audit type: {}. Period: {}.",
            self.intent,
            self.facets.company_or_default(),
            self.facets.audit_type,
            self.facets.time_period
        )
    }
}

/// Uniform interface to a specialist agent.
#[async_trait]
pub trait AgentCapability: Send + Sync {
    fn id(&self) -> &str;

    async fn query(
        &self,
        text: &str,
        context: &AgentContext,
        response_type: ResponseType,
    ) -> Result<AgentOutput, AgentError>;
}

/// Capability map consumed by the dispatcher.
pub type AgentMap = HashMap<String, Arc<dyn AgentCapability>>;

/// Builds one [`KnowledgeAgent`] per registered profile.
pub fn knowledge_agents(
    registry: &CapabilityRegistry,
    store: Arc<dyn KnowledgeStore>,
    generator: Arc<dyn TextGenerator>,
    prompts: &dyn PromptStore,
    top_k: usize,
) -> AgentMap {
    registry
        .profiles()
        .map(|profile| {
            let agent = KnowledgeAgent::new(
                profile.clone(),
                Arc::clone(&store),
                Arc::clone(&generator),
                prompts,
                top_k,
            );
            (profile.id.clone(), Arc::new(agent) as Arc<dyn AgentCapability>)
        })
        .collect()
}
