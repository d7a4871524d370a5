//! Best-effort S1AP and NAS decoding.
//!
//! The codec turns a raw byte buffer into a [`s1scope_core::CanonicalMessage`].
//! It never returns an error: whenever a field cannot be parsed, decoding of
//! that field stops, raw bytes are preserved, and whatever was already
//! extracted is kept. A message can come back with `decode_failed` set and
//! still carry identifiers.

pub mod decoder;
pub mod erab;
pub mod nas;
pub mod per;
pub mod s1ap;
pub mod sctp;

pub use decoder::decode;
