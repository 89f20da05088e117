//! Query facets: company, audit type and time period.

use super::terms::{contains_term, normalize};
use crate::models::Query;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditType {
    Supplier,
    Internal,
    Regulatory,
    Comprehensive,
}

impl AuditType {
    pub fn detect(text: &str) -> Self {
        let normalized = normalize(text);
        let any = |terms: &[&str]| terms.iter().any(|t| contains_term(&normalized, t));

        if any(&["supplier", "cdmo", "vendor"]) {
            AuditType::Supplier
        } else if any(&["internal", "site"]) {
            AuditType::Internal
        } else if any(&["regulatory", "compliance"]) {
            AuditType::Regulatory
        } else {
            AuditType::Comprehensive
        }
    }
}

impl fmt::Display for AuditType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuditType::Supplier => write!(f, "supplier"),
            AuditType::Internal => write!(f, "internal"),
            AuditType::Regulatory => write!(f, "regulatory"),
            AuditType::Comprehensive => write!(f, "comprehensive"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimePeriod {
    LastYear,
    LastSixMonths,
    LastQuarter,
    LastAudit,
}

impl TimePeriod {
    pub fn detect(text: &str) -> Self {
        let normalized = normalize(text);
        if contains_term(&normalized, "last year") {
            TimePeriod::LastYear
        } else if contains_term(&normalized, "last 6 months")
            || contains_term(&normalized, "last six months")
        {
            TimePeriod::LastSixMonths
        } else if contains_term(&normalized, "last quarter") {
            TimePeriod::LastQuarter
        } else {
            TimePeriod::LastAudit
        }
    }
}

impl fmt::Display for TimePeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimePeriod::LastYear => write!(f, "last year"),
            TimePeriod::LastSixMonths => write!(f, "last 6 months"),
            TimePeriod::LastQuarter => write!(f, "last quarter"),
            TimePeriod::LastAudit => write!(f, "last audit"),
        }
    }
}

/// Structured hints extracted from a query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryFacets {
    /// Company hint, or the first known company named in the text.
    pub company: Option<String>,
    pub audit_type: AuditType,
    pub time_period: TimePeriod,
}

impl QueryFacets {
    /// Extracts facets. `known_companies` supplies canonical spellings.
    pub fn extract(query: &Query, known_companies: &[String]) -> Self {
        let company = match query.company() {
            Some(hint) => Some(hint.to_string()),
            None => detect_company(query.text(), known_companies),
        };

        Self {
            company,
            audit_type: AuditType::detect(query.text()),
            time_period: TimePeriod::detect(query.text()),
        }
    }

    /// Company name for prompts, `the company` when unknown.
    pub fn company_or_default(&self) -> &str {
        self.company.as_deref().unwrap_or("the company")
    }
}

/// First company in `known` mentioned in `text`, in canonical case.
pub fn detect_company(text: &str, known: &[String]) -> Option<String> {
    let normalized = normalize(text);
    known
        .iter()
        .find(|name| contains_term(&normalized, &normalize(name)))
        .cloned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn companies() -> Vec<String> {
        vec![
            "Hovione".to_string(),
            "Thermo Fisher".to_string(),
            "GRAM".to_string(),
        ]
    }

    #[test]
    fn test_company_detection() {
        let q = Query::new("Open CAPAs at thermo fisher this year");
        let facets = QueryFacets::extract(&q, &companies());
        assert_eq!(facets.company.as_deref(), Some("Thermo Fisher"));

        // "program" must not match "gram".
        let q = Query::new("Audit program overview");
        assert_eq!(QueryFacets::extract(&q, &companies()).company, None);
    }

    #[test]
    fn test_hint_overrides_detection() {
        let q = Query::new("Hovione audit").with_company("Acme");
        let facets = QueryFacets::extract(&q, &companies());
        assert_eq!(facets.company_or_default(), "Acme");
    }

    #[test]
    fn test_audit_type_and_period() {
        assert_eq!(AuditType::detect("CDMO audit prep"), AuditType::Supplier);
        assert_eq!(AuditType::detect("internal site walk"), AuditType::Internal);
        assert_eq!(AuditType::detect("compliance review"), AuditType::Regulatory);
        assert_eq!(AuditType::detect("anything else"), AuditType::Comprehensive);

        assert_eq!(TimePeriod::detect("changes in the last quarter"), TimePeriod::LastQuarter);
        assert_eq!(TimePeriod::detect("over the last 6 months"), TimePeriod::LastSixMonths);
        assert_eq!(TimePeriod::detect("since when?"), TimePeriod::LastAudit);
    }
}
