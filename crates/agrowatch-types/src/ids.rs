//! Strongly-typed identifiers for alerts and notification channels.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::ParseError;

/// Unique identifier for an alert.
///
/// Rendered as `alert_<32 hex digits>`; unique per process lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AlertId(String);

impl AlertId {
    pub fn generate() -> Self {
        Self(format!("alert_{}", Uuid::new_v4().simple()))
    }

    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AlertId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AlertId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Identifier of a notification channel (`log`, `email`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelId(String);

impl ChannelId {
    /// Channel id of the built-in log channel.
    pub const LOG: &'static str = "log";
    /// Channel id of the built-in email channel.
    pub const EMAIL: &'static str = "email";

    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn log() -> Self {
        Self::new(Self::LOG)
    }

    pub fn email() -> Self {
        Self::new(Self::EMAIL)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ChannelId {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(ParseError::EmptyIdentifier);
        }
        Ok(Self::new(trimmed.to_ascii_lowercase()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alert_id_generation() {
        let id1 = AlertId::generate();
        let id2 = AlertId::generate();
        assert_ne!(id1, id2);
        assert!(id1.as_str().starts_with("alert_"));
    }

    #[test]
    fn test_channel_id_parse() {
        let id: ChannelId = " Email ".parse().unwrap();
        assert_eq!(id, ChannelId::email());
        assert_eq!("".parse::<ChannelId>(), Err(ParseError::EmptyIdentifier));
    }

    #[test]
    fn test_ids_serialize_as_plain_strings() {
        let json = serde_json::to_string(&ChannelId::log()).unwrap();
        assert_eq!(json, "\"log\"");

        let id: AlertId = serde_json::from_str("\"alert_42\"").unwrap();
        assert_eq!(id.to_string(), "alert_42");
    }
}
