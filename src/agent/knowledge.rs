//! Retrieval-backed specialist agent.

use super::generator::{GenerationRequest, TextGenerator};
use super::prompts::PromptStore;
use super::store::KnowledgeStore;
use super::{AgentCapability, AgentContext};
use crate::error::AgentError;
use crate::models::{AgentOutput, ResponseType, SourceDocument};
use crate::routing::AgentProfile;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

/// Agent that answers from the top hits of its knowledge namespace.
pub struct KnowledgeAgent {
    profile: AgentProfile,
    store: Arc<dyn KnowledgeStore>,
    generator: Arc<dyn TextGenerator>,
    system_prompt: String,
    top_k: usize,
}

impl KnowledgeAgent {
    pub fn new(
        profile: AgentProfile,
        store: Arc<dyn KnowledgeStore>,
        generator: Arc<dyn TextGenerator>,
        prompts: &dyn PromptStore,
        top_k: usize,
    ) -> Self {
        let system_prompt = prompts
            .system_prompt(&profile.id)
            .unwrap_or_else(|| generic_prompt(&profile));

        Self {
            profile,
            store,
            generator,
            system_prompt,
            top_k,
        }
    }

    pub fn profile(&self) -> &AgentProfile {
        &self.profile
    }

    fn build_system_prompt(&self, response_type: ResponseType) -> String {
        match response_type.instruction() {
            Some(instruction) => format!("{}\n\n{}", self.system_prompt, instruction),
            None => self.system_prompt.clone(),
        }
    }

    fn build_user_prompt(
        &self,
        text: &str,
        context: &AgentContext,
        docs: &[SourceDocument],
    ) -> String {
        let mut prompt = String::new();

        prompt.push_str("Context:\n");
        if docs.is_empty() {
            prompt.push_str("No documents in this knowledge base matched the query.\n");
        } else {
            for (i, doc) in docs.iter().enumerate() {
                prompt.push_str(&format!("[Document {}]: {}\n\n", i + 1, doc.excerpt));
            }

            prompt.push_str("DOCUMENT SOURCES:\n");
            for (i, doc) in docs.iter().enumerate() {
                prompt.push_str(&format!(
                    "- Document {}: {} ({})\n",
                    i + 1,
                    doc.title,
                    doc.location()
                ));
            }
            prompt.push_str(
                "\nWhen you use information from a document, reference it as [Document N].\n",
            );
        }

        prompt.push_str(&format!("\n{}\n\nQuery: {}", context.describe(), text));
        prompt
    }
}

fn generic_prompt(profile: &AgentProfile) -> String {
    let focus = if profile.description.is_empty() {
        format!("the '{}' knowledge base", profile.namespace)
    } else {
        profile.description.clone()
    };
    format!(
        "You are the {} agent, specializing in {}. Answer audit questions using only the \
         provided documents and reference them explicitly.",
        profile.id, focus
    )
}

#[async_trait]
impl AgentCapability for KnowledgeAgent {
    fn id(&self) -> &str {
        &self.profile.id
    }

    async fn query(
        &self,
        text: &str,
        context: &AgentContext,
        response_type: ResponseType,
    ) -> Result<AgentOutput, AgentError> {
        let documents = self
            .store
            .search(&self.profile.namespace, text, self.top_k)
            .await
            .map_err(|e| AgentError::Upstream {
                agent: self.profile.id.clone(),
                message: e.to_string(),
            })?;

        debug!(
            "Agent '{}' retrieved {} document(s) from '{}'",
            self.profile.id,
            documents.len(),
            self.profile.namespace
        );

        let request = GenerationRequest {
            system: self.build_system_prompt(response_type),
            user: self.build_user_prompt(text, context, &documents),
            temperature: self.profile.temperature,
            max_tokens: self.profile.max_tokens,
        };

        let answer = self
            .generator
            .generate(&request)
            .await
            .map_err(|source| AgentError::Generation {
                agent: self.profile.id.clone(),
                source,
            })?;

        Ok(AgentOutput {
            text: answer,
            documents,
        })
    }
}
