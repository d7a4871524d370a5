//! Pipeline data model.
//!
//! `SignalMessage` is what transport adapters hand to the spool;
//! `SpoolRecord` is the durable envelope the spool mints on append;
//! `CanonicalMessage` is the codec's decoded view of one S1AP PDU;
//! `Event` is what the rule engine emits, with an evidence chain of
//! `SpoolOffset`s pointing back at the records that caused it.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::hex;

/// Payload kind carried by a [`SignalMessage`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayloadType {
    #[default]
    RawBytes,
}

/// Raw message delivered by a transport adapter. Created by adapters,
/// never mutated afterwards.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SignalMessage {
    /// Capture timestamp (ns since epoch), as reported by the source.
    pub ts_capture_ns: i64,
    /// Ingest timestamp (ns since epoch), stamped at the adapter boundary.
    pub ts_ingest_ns: i64,
    pub source_id: String,
    pub source_sequence: u64,
    /// Opaque transport metadata; PCAP sources put a JSON object with a
    /// `packet_num` field here.
    #[serde(default)]
    pub transport_meta: String,
    #[serde(default)]
    pub payload_type: PayloadType,
    #[serde(with = "serde_bytes_vec")]
    pub raw_payload: Vec<u8>,
}

/// Durable log entry. Created exclusively by the spool on append and
/// immutable thereafter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SpoolRecord {
    pub partition: i32,
    pub offset: i64,
    pub ts_append_ns: i64,
    pub message: SignalMessage,
}

/// One element of an event's evidence chain: the spool location of a
/// source message, plus the capture frame number when known.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SpoolOffset {
    pub partition: i32,
    pub offset: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frame_number: Option<i64>,
}

/// Decoded, normalized view of one S1AP PDU.
///
/// Decoding is best-effort: `decode_failed` may be set while identifiers
/// extracted before the failure are still populated. Raw bytes are always
/// preserved.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CanonicalMessage {
    // Identity references back into the spool.
    pub spool_partition: i32,
    pub spool_offset: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frame_number: Option<i64>,

    // Message classification.
    pub procedure_code: u8,
    pub msg_type: String,

    // UE identifiers, each best-effort.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub imsi: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tmsi: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub imei: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub guti: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mme_ue_s1ap_id: Option<u32>,
    /// 24-bit value stored in 32 bits.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enb_ue_s1ap_id: Option<u32>,

    // Location: 7 raw ECGI bytes = 3-byte PLMN + 28-bit cell id padded to 4.
    #[serde(default, skip_serializing_if = "Vec::is_empty", with = "serde_bytes_vec")]
    pub ecgi: Vec<u8>,
    #[serde(default, skip_serializing_if = "Vec::is_empty", with = "serde_bytes_vec")]
    pub ecgi_plmn_identity: Vec<u8>,
    #[serde(default, skip_serializing_if = "Vec::is_empty", with = "serde_bytes_vec")]
    pub ecgi_cell_id: Vec<u8>,
    #[serde(default, skip_serializing_if = "Vec::is_empty", with = "serde_bytes_vec")]
    pub target_ecgi: Vec<u8>,
    #[serde(default, skip_serializing_if = "Vec::is_empty", with = "serde_bytes_vec")]
    pub target_ecgi_plmn_identity: Vec<u8>,
    #[serde(default, skip_serializing_if = "Vec::is_empty", with = "serde_bytes_vec")]
    pub target_ecgi_cell_id: Vec<u8>,

    /// GTP tunnel identifiers decoded from the E-RAB item lists.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub teids: Vec<u32>,

    // Decode residue.
    #[serde(default, with = "serde_bytes_vec")]
    pub raw_bytes: Vec<u8>,
    #[serde(default)]
    pub decoded_tree: String,
    #[serde(default)]
    pub decode_failed: bool,
}

impl CanonicalMessage {
    /// Lowercase hex rendering of the ECGI, empty when absent.
    pub fn ecgi_hex(&self) -> String {
        hex::encode(&self.ecgi)
    }

    /// Lowercase hex rendering of the target ECGI, empty when absent.
    pub fn target_ecgi_hex(&self) -> String {
        hex::encode(&self.target_ecgi)
    }

    /// True when the message carries at least one subscriber identifier.
    pub fn has_any_identifier(&self) -> bool {
        self.imsi.is_some()
            || self.tmsi.is_some()
            || self.imei.is_some()
            || self.mme_ue_s1ap_id.is_some()
            || self.enb_ue_s1ap_id.is_some()
    }

    /// Evidence-chain element for this message.
    pub fn spool_ref(&self) -> SpoolOffset {
        SpoolOffset {
            partition: self.spool_partition,
            offset: self.spool_offset,
            frame_number: self.frame_number,
        }
    }
}

/// Semantic event produced by the rule engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub name: String,
    pub ts_ns: i64,
    /// Empty when the source message carried no identifier at all.
    #[serde(default)]
    pub subscriber_key: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    /// Spool offsets of the messages that caused this event, in causal order.
    pub evidence: Vec<SpoolOffset>,
    pub ruleset_id: String,
    pub ruleset_version: String,
    /// 1.0 for explicit rule matches.
    pub confidence: f64,
}

/// Compact serde representation for byte vectors: hex strings in JSON.
mod serde_bytes_vec {
    use serde::{Deserialize, Deserializer, Serializer};

    use crate::hex;

    pub fn serialize<S: Serializer>(bytes: &[u8], ser: S) -> Result<S::Ok, S::Error> {
        ser.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(de)?;
        Ok(hex::decode(&s))
    }
}
