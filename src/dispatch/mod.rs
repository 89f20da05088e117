//! Concurrent fan-out of one query to the selected agents.
//!
//! Calls run on a [`JoinSet`] bounded by a semaphore sized to the fan-out
//! width. Each call has its own timeout that starts once it holds a permit.
//! The whole fan-out is bounded by the sum of the per-agent timeouts unless
//! a fixed aggregate bound is configured.
//! Results come back in selection-rank order whatever order the calls
//! finished in.

use crate::agent::{AgentContext, AgentMap};
use crate::error::{AgentError, RouterError};
use crate::models::{AgentFailure, AgentResult, AnalysisTier, ResponseType};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Fan-out limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchSettings {
    pub max_concurrency: usize,
    pub agent_timeout: Duration,
    /// Fixed bound for the whole fan-out. `None` sums the per-agent timeouts.
    pub aggregate_timeout: Option<Duration>,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            max_concurrency: 4,
            agent_timeout: Duration::from_secs(90),
            aggregate_timeout: None,
        }
    }
}

/// Successful results and failures of one fan-out, both in rank order.
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchOutcome {
    pub results: Vec<AgentResult>,
    pub failures: Vec<AgentFailure>,
    pub selected: usize,
}

impl DispatchOutcome {
    pub fn tier(&self) -> AnalysisTier {
        AnalysisTier::from_counts(self.results.len(), self.selected)
    }
}

type CallOutcome = (usize, Result<AgentResult, AgentError>);

pub struct Dispatcher {
    agents: AgentMap,
    settings: DispatchSettings,
}

impl Dispatcher {
    pub fn new(agents: AgentMap, settings: DispatchSettings) -> Self {
        Self { agents, settings }
    }

    pub fn settings(&self) -> DispatchSettings {
        self.settings
    }

    pub fn has_agent(&self, id: &str) -> bool {
        self.agents.contains_key(id)
    }

    /// Upper bound on the whole fan-out for `count` agents.
    pub fn aggregate_timeout(&self, count: usize) -> Duration {
        self.settings
            .aggregate_timeout
            .unwrap_or(self.settings.agent_timeout * count.max(1) as u32)
    }

    /// Runs every selected agent. Fails with [`RouterError::NoData`] when none
    /// succeed and with [`RouterError::Cancelled`] when `cancel` fires first.
    pub async fn dispatch(
        &self,
        selection: &[String],
        text: &str,
        context: &AgentContext,
        response_type: ResponseType,
        cancel: &CancellationToken,
    ) -> Result<DispatchOutcome, RouterError> {
        let selected = selection.len();
        let semaphore = Arc::new(Semaphore::new(self.settings.max_concurrency.max(1)));
        let agent_timeout = self.settings.agent_timeout;

        let mut outcomes: Vec<Option<Result<AgentResult, AgentError>>> = vec![None; selected];
        let mut set: JoinSet<CallOutcome> = JoinSet::new();

        for (rank, agent_id) in selection.iter().enumerate() {
            let Some(agent) = self.agents.get(agent_id).cloned() else {
                warn!("No capability registered for agent '{}'", agent_id);
                outcomes[rank] = Some(Err(AgentError::Unavailable {
                    agent: agent_id.clone(),
                }));
                continue;
            };

            let semaphore = Arc::clone(&semaphore);
            let text = text.to_string();
            let context = context.clone();
            let agent_id = agent_id.clone();

            set.spawn(async move {
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => {
                        let err = AgentError::Aborted {
                            agent: agent_id,
                            message: "dispatcher shut down".to_string(),
                        };
                        return (rank, Err(err));
                    }
                };

                debug!("Agent '{}' started (rank {})", agent_id, rank);
                let started = Instant::now();
                let call = agent.query(&text, &context, response_type);
                let result = match tokio::time::timeout(agent_timeout, call).await {
                    Ok(Ok(output)) => {
                        let mut result = AgentResult::new(agent_id, rank, output);
                        result.elapsed_ms = started.elapsed().as_millis() as u64;
                        Ok(result)
                    }
                    Ok(Err(err)) => Err(err),
                    Err(_) => Err(AgentError::Timeout {
                        agent: agent_id,
                        seconds: agent_timeout.as_secs(),
                    }),
                };
                (rank, result)
            });
        }

        let aggregate = self.aggregate_timeout(set.len());
        let deadline = tokio::time::sleep(aggregate);
        tokio::pin!(deadline);
        let mut deadline_hit = false;

        while !set.is_empty() {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    set.abort_all();
                    warn!("Query cancelled; discarding {} pending agent call(s)", set.len());
                    return Err(RouterError::Cancelled);
                }
                _ = &mut deadline => {
                    warn!("Aggregate timeout of {:?} reached; aborting pending agents", aggregate);
                    set.abort_all();
                    deadline_hit = true;
                    break;
                }
                joined = set.join_next() => {
                    match joined {
                        Some(Ok((rank, result))) => outcomes[rank] = Some(result),
                        Some(Err(e)) => warn!("Agent task failed to complete: {}", e),
                        None => break,
                    }
                }
            }
        }

        let mut results = Vec::new();
        let mut failures = Vec::new();

        for (rank, outcome) in outcomes.into_iter().enumerate() {
            let agent_id = &selection[rank];
            let outcome = outcome.unwrap_or_else(|| {
                Err(if deadline_hit {
                    AgentError::Timeout {
                        agent: agent_id.clone(),
                        seconds: aggregate.as_secs(),
                    }
                } else {
                    AgentError::Aborted {
                        agent: agent_id.clone(),
                        message: "task panicked or was aborted".to_string(),
                    }
                })
            });

            match outcome {
                Ok(result) => {
                    info!(
                        "Agent '{}' returned {} document(s) in {}ms",
                        result.agent_id,
                        result.documents.len(),
                        result.elapsed_ms
                    );
                    results.push(result);
                }
                Err(err) => {
                    warn!("{}", err);
                    failures.push(AgentFailure::from_error(rank, &err));
                }
            }
        }

        if results.is_empty() {
            return Err(RouterError::NoData {
                attempted: selected,
                failures,
            });
        }

        Ok(DispatchOutcome {
            results,
            failures,
            selected,
        })
    }
}
