//! Query routing: intent classification, capability lookup and agent selection.

pub mod facets;
pub mod intent;
pub mod registry;
pub mod selector;
pub mod terms;

pub use facets::{AuditType, QueryFacets, TimePeriod};
pub use intent::{Classification, IntentClassifier, IntentFamily, IntentLabel, IntentPattern};
pub use registry::{AgentProfile, CapabilityRegistry};
pub use selector::{AgentScore, AgentSelector, ScoreBreakdown, Selection};
