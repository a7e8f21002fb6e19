//! Validation outcome types.

use serde::{Deserialize, Serialize};

/// How serious a violated rule is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Never blocks acceptance
    Warning,
    /// Blocks acceptance; triggers the correction loop
    Critical,
}

/// One violated rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Violation {
    /// Stable rule identifier, e.g. `distribution.sum`
    pub rule: String,
    pub severity: Severity,
    pub message: String,
}

impl Violation {
    pub fn critical(rule: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            rule: rule.into(),
            severity: Severity::Critical,
            message: message.into(),
        }
    }

    pub fn warning(rule: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            rule: rule.into(),
            severity: Severity::Warning,
            message: message.into(),
        }
    }

    pub fn is_critical(&self) -> bool {
        self.severity == Severity::Critical
    }
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.rule, self.message)
    }
}

/// Classification of a validated candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    Ok,
    Warning,
    CriticalFailure,
}

/// Result of validating one candidate.
///
/// The classification is derived from the violations, so the two can never
/// disagree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationOutcome {
    pub classification: Classification,
    pub violations: Vec<Violation>,
}

impl ValidationOutcome {
    pub fn from_violations(violations: Vec<Violation>) -> Self {
        let classification = if violations.iter().any(Violation::is_critical) {
            Classification::CriticalFailure
        } else if violations.is_empty() {
            Classification::Ok
        } else {
            Classification::Warning
        };

        Self {
            classification,
            violations,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.classification == Classification::Ok
    }

    pub fn critical(&self) -> impl Iterator<Item = &Violation> {
        self.violations.iter().filter(|v| v.is_critical())
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Violation> {
        self.violations.iter().filter(|v| !v.is_critical())
    }
}
