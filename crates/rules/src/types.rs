//! Ruleset data types, deserializable from the YAML rule files.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Top-level rule file wrapper: everything sits under a `ruleset:` key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RulesetFile {
    pub ruleset: Ruleset,
}

/// A named, versioned collection of rules.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ruleset {
    pub id: String,
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub single_message_rules: Vec<SingleMessageRule>,
    #[serde(default)]
    pub sequence_rules: Vec<SequenceRule>,
}

/// Emit an event whenever one message of the given type is seen.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SingleMessageRule {
    pub event_name: String,
    /// Canonical message type, matched by exact string equality.
    pub msg_type: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    #[serde(default)]
    pub event_data: Vec<EventDataExtraction>,
}

/// Emit an event when a first message is followed by a second one for the
/// same subscriber within the time window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SequenceRule {
    pub event_name: String,
    pub first_msg_type: String,
    pub second_msg_type: String,
    #[serde(default = "default_time_window_ms")]
    pub time_window_ms: u64,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    #[serde(default)]
    pub event_data: Vec<EventDataExtraction>,
}

/// Copy a field into an event attribute. `source` is an expression of the
/// form `message.<field>`, `first_message.<field>` or `context.<field>`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventDataExtraction {
    pub target: String,
    pub source: String,
}

fn default_version() -> String {
    "1.0".to_string()
}

fn default_time_window_ms() -> u64 {
    15_000
}
