//! Partitioned, segmented write-ahead log.
//!
//! Messages are appended to per-partition segment files with a sidecar
//! offset index, read back by offset, and tracked per consumer group. The
//! spool is the system's source of truth: every emitted event's evidence
//! chain points back into it.

mod error;
mod wal;

pub use error::SpoolError;
pub use wal::{Spool, SpoolConfig};
