//! Shared data model for the s1scope signalling pipeline.
//!
//! Everything that crosses a subsystem boundary lives here: the raw ingest
//! message, the durable spool record, the decoded canonical message, and the
//! evidence-bearing event emitted by the rule engine.

pub mod hex;
pub mod message;

pub use message::{
    CanonicalMessage, Event, PayloadType, SignalMessage, SpoolOffset, SpoolRecord,
};

/// Current wall-clock time in nanoseconds since the Unix epoch.
pub fn now_ns() -> i64 {
    chrono::Utc::now().timestamp_nanos_opt().unwrap_or(i64::MAX)
}
