//! Declarative rule evaluation over canonical messages.
//!
//! Rulesets hold single-message rules (exact message-type match) and
//! two-message sequence rules bounded by a time window. Matches emit
//! events that carry an evidence chain of spool offsets, so every event
//! can be replayed from the log.

pub mod engine;
pub mod loader;
pub mod types;

pub use engine::{RuleEngine, SequenceState};
pub use loader::{load_ruleset_from_yaml, RuleLoadError};
pub use types::{EventDataExtraction, Ruleset, SequenceRule, SingleMessageRule};
