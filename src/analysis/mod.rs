//! Post-dispatch analysis: citation numbering and cross-agent correlation.

pub mod aggregator;
pub mod correlation;

pub use aggregator::{citation_instructions, CitationAggregator, CitationSet};
pub use correlation::{default_rules, CorrelationEngine, CorrelationRule, IntentRequirement};
