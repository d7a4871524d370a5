//! The processing pipeline: spool in, events out.
//!
//! A reader pulls records from the spool, the codec turns them into
//! canonical messages, the correlator assigns a subscriber key, the rule
//! engine emits events, and sinks serialize them. Ingest adapters live
//! outside this crate; they only ever call [`s1scope_spool::Spool::append`].

pub mod pipeline;
pub mod sinks;

pub use pipeline::{Pipeline, PipelineConfig};
pub use sinks::{JsonlSink, MemorySink, Sink, StdoutSink};
