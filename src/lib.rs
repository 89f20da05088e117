//! audit-router - intent routing, citation aggregation and cross-agent
//! correlation for multi-agent audit intelligence.
//!
//! A query is classified into an audit intent, scored against the capability
//! registry, fanned out to the selected knowledge agents, and the returned
//! evidence is numbered (`DOC_001`, ...), correlated across agents and
//! synthesized into one cited answer. See [`pipeline::QueryEngine`].

pub mod agent;
pub mod analysis;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod report;
pub mod routing;

pub use error::{AgentError, GenerationError, RouterError, StoreError};
pub use pipeline::{EngineConfig, QueryEngine};
