//! UE subscriber correlation.
//!
//! The [`store::SubscriberStore`] merges identifiers that arrive over time
//! (IMSI, TMSI, IMEISV, S1AP ids, TEIDs) onto stable subscriber records,
//! resolving reassignment conflicts in favor of the newest association. The
//! [`Correlator`] layers per-UE contexts on top (current cell, handover
//! phase) and derives the subscriber key that the rule engine threads
//! through event emission.

pub mod context;
pub mod correlator;
pub mod store;

pub use context::UeContext;
pub use correlator::{Correlator, CorrelatorConfig};
pub use store::{SubscriberRecord, SubscriberStore};
