//! Verifier configuration.

use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Default bound on how many previous blocks a chain walk may visit.
pub const DEFAULT_MAX_CHAIN_DEPTH: usize = 4096;

/// Default deadline for a single filter evaluation.
pub const DEFAULT_FILTER_TIMEOUT: Duration = Duration::from_secs(2);

/// Resource bounds applied while resolving and verifying artifacts.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default)]
pub struct VerifierConfig {
    /// Maximum number of previous blocks resolved or walked backwards from
    /// any block.
    pub max_chain_depth: usize,

    /// Deadline for a single filter evaluation. Stored as milliseconds.
    #[serde(
        rename = "filter_timeout_ms",
        serialize_with = "serialize_millis",
        deserialize_with = "deserialize_millis"
    )]
    pub filter_timeout: Duration,
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self {
            max_chain_depth: DEFAULT_MAX_CHAIN_DEPTH,
            filter_timeout: DEFAULT_FILTER_TIMEOUT,
        }
    }
}

fn serialize_millis<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_millis().try_into().unwrap_or(u64::MAX))
}

fn deserialize_millis<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
    u64::deserialize(d).map(Duration::from_millis)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_take_defaults() {
        let config: VerifierConfig = serde_json::from_str(r#"{"max_chain_depth": 8}"#).unwrap();

        assert_eq!(config.max_chain_depth, 8);
        assert_eq!(config.filter_timeout, DEFAULT_FILTER_TIMEOUT);
    }

    #[test]
    fn timeout_is_written_in_millis() {
        let config = VerifierConfig {
            filter_timeout: Duration::from_millis(250),
            ..Default::default()
        };
        let json = serde_json::to_value(config).unwrap();

        assert_eq!(json["filter_timeout_ms"], 250);
        assert_eq!(serde_json::from_value::<VerifierConfig>(json).unwrap(), config);
    }
}
