//! Alert severity and threshold comparison.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ParseError;

/// Severity of an alert, ordered from least to most important.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    #[serde(alias = "warning")]
    Medium,
    #[serde(alias = "error")]
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }

    pub fn all() -> [Severity; 4] {
        [
            Severity::Low,
            Severity::Medium,
            Severity::High,
            Severity::Critical,
        ]
    }
}

impl Default for Severity {
    fn default() -> Self {
        Severity::Medium
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" | "info" => Ok(Severity::Low),
            "medium" | "warning" => Ok(Severity::Medium),
            "high" | "error" => Ok(Severity::High),
            "critical" => Ok(Severity::Critical),
            other => Err(ParseError::UnknownSeverity(other.to_string())),
        }
    }
}

/// Direction of a threshold rule.
///
/// Every rule states its direction explicitly; a "rate of success" metric
/// such as a cache hit ratio uses [`Comparison::LessThan`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Comparison {
    GreaterThan,
    LessThan,
    Equals,
}

impl Comparison {
    /// Evaluate `value <op> threshold`.
    pub fn evaluate(&self, value: f64, threshold: f64) -> bool {
        match self {
            Comparison::GreaterThan => value > threshold,
            Comparison::LessThan => value < threshold,
            Comparison::Equals => value == threshold,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Comparison::GreaterThan => "greater_than",
            Comparison::LessThan => "less_than",
            Comparison::Equals => "equals",
        }
    }
}

impl Default for Comparison {
    fn default() -> Self {
        Comparison::GreaterThan
    }
}

impl fmt::Display for Comparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Comparison {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "greater_than" | "gt" | ">" => Ok(Comparison::GreaterThan),
            "less_than" | "lt" | "<" => Ok(Comparison::LessThan),
            "equals" | "eq" | "==" => Ok(Comparison::Equals),
            other => Err(ParseError::UnknownComparison(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_aliases() {
        assert_eq!("warning".parse::<Severity>().unwrap(), Severity::Medium);
        assert_eq!("ERROR".parse::<Severity>().unwrap(), Severity::High);
        assert!("urgent".parse::<Severity>().is_err());

        let parsed: Severity = serde_json::from_str("\"warning\"").unwrap();
        assert_eq!(parsed, Severity::Medium);
        assert_eq!(serde_json::to_string(&parsed).unwrap(), "\"medium\"");
    }

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Critical > Severity::High);
        assert!(Severity::Low < Severity::Medium);
    }

    #[test]
    fn test_comparison_evaluate() {
        assert!(Comparison::GreaterThan.evaluate(85.0, 80.0));
        assert!(!Comparison::GreaterThan.evaluate(80.0, 80.0));
        assert!(Comparison::LessThan.evaluate(50.0, 60.0));
        assert!(!Comparison::LessThan.evaluate(75.0, 60.0));
        assert!(Comparison::Equals.evaluate(0.0, 0.0));
    }

    #[test]
    fn test_comparison_parse() {
        assert_eq!(">".parse::<Comparison>().unwrap(), Comparison::GreaterThan);
        assert_eq!("less_than".parse::<Comparison>().unwrap(), Comparison::LessThan);
        assert_eq!(
            "between".parse::<Comparison>(),
            Err(ParseError::UnknownComparison("between".to_string()))
        );
    }
}
