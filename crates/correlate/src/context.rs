//! Per-UE context: the higher-level view layered over subscriber records.
//!
//! A context tracks the UE's current cell, an in-flight handover, and the
//! last procedure seen. Contexts expire after a period of inactivity; the
//! underlying subscriber records do not.

use std::time::{Duration, Instant};

use s1scope_core::{hex, CanonicalMessage};

/// Per-UE state, keyed by subscriber key in the correlator.
#[derive(Debug, Clone)]
pub struct UeContext {
    pub imsi: Option<String>,
    pub tmsi: Option<String>,
    pub imei: Option<String>,
    pub guti: Option<String>,
    pub mme_ue_s1ap_id: Option<u32>,
    pub enb_ue_s1ap_id: Option<u32>,

    /// Current cell; raw ECGI bytes.
    pub ecgi: Vec<u8>,
    /// Pre-handover cell.
    pub source_ecgi: Vec<u8>,
    /// Target cell while a handover is in flight.
    pub target_ecgi: Vec<u8>,

    pub last_procedure: String,
    pub handover_in_progress: bool,
    pub handover_start: Option<Instant>,
    pub last_seen: Instant,

    pub subscriber_key: String,
    // Cached composite keys; refreshed whenever identifiers change.
    pub mme_composite_key: String,
    pub enb_composite_key: String,
    pub tmsi_cell_key: String,
}

impl Default for UeContext {
    fn default() -> Self {
        UeContext {
            imsi: None,
            tmsi: None,
            imei: None,
            guti: None,
            mme_ue_s1ap_id: None,
            enb_ue_s1ap_id: None,
            ecgi: Vec::new(),
            source_ecgi: Vec::new(),
            target_ecgi: Vec::new(),
            last_procedure: String::new(),
            handover_in_progress: false,
            handover_start: None,
            last_seen: Instant::now(),
            subscriber_key: String::new(),
            mme_composite_key: String::new(),
            enb_composite_key: String::new(),
            tmsi_cell_key: String::new(),
        }
    }
}

impl UeContext {
    /// Fold one message into the context: identifiers, cell, procedure and
    /// the handover state machine.
    pub fn update(&mut self, msg: &CanonicalMessage) {
        if let Some(ref imsi) = msg.imsi {
            self.imsi = Some(imsi.clone());
        }
        if let Some(ref tmsi) = msg.tmsi {
            self.tmsi = Some(tmsi.clone());
        }
        if let Some(ref imei) = msg.imei {
            self.imei = Some(imei.clone());
        }
        if let Some(ref guti) = msg.guti {
            self.guti = Some(guti.clone());
        }
        if let Some(id) = msg.mme_ue_s1ap_id {
            self.mme_ue_s1ap_id = Some(id);
        }
        if let Some(id) = msg.enb_ue_s1ap_id {
            self.enb_ue_s1ap_id = Some(id);
        }

        if !msg.ecgi.is_empty() {
            self.ecgi = msg.ecgi.clone();
        }
        if !msg.target_ecgi.is_empty() {
            self.target_ecgi = msg.target_ecgi.clone();
        }
        if !msg.msg_type.is_empty() {
            self.last_procedure = msg.msg_type.clone();
        }

        match msg.msg_type.as_str() {
            // Source eNodeB initiates the handover.
            "HandoverRequired" => {
                self.handover_in_progress = true;
                self.handover_start = Some(Instant::now());
                self.source_ecgi = self.ecgi.clone();
                if !self.target_ecgi.is_empty() {
                    self.ecgi = self.target_ecgi.clone();
                }
            }
            // MME commands execution; keep the original start time when the
            // HandoverRequired already armed it.
            "HandoverCommand" => {
                self.handover_in_progress = true;
                if self.handover_start.is_none() {
                    self.handover_start = Some(Instant::now());
                }
                self.source_ecgi = self.ecgi.clone();
                if !self.target_ecgi.is_empty() {
                    self.ecgi = self.target_ecgi.clone();
                }
            }
            // UE arrived at the target cell.
            "HandoverNotify" => {
                if self.handover_in_progress {
                    self.handover_in_progress = false;
                    if !self.target_ecgi.is_empty() {
                        self.ecgi = self.target_ecgi.clone();
                    }
                }
            }
            _ => {}
        }

        self.last_seen = Instant::now();
        self.update_composite_keys();
        self.subscriber_key = self.generate_subscriber_key();
    }

    /// Subscriber key from the best available identifier:
    /// IMSI > TMSI > MME-UE-S1AP-ID > eNB-UE-S1AP-ID. Callers mint a
    /// synthetic `unknown_<n>` key when none is available.
    pub fn generate_subscriber_key(&self) -> String {
        if let Some(ref imsi) = self.imsi {
            return format!("imsi:{}", imsi);
        }
        if let Some(ref tmsi) = self.tmsi {
            return format!("tmsi:{}", tmsi);
        }
        if let Some(id) = self.mme_ue_s1ap_id {
            return format!("mme_ue_s1ap_id:{}", id);
        }
        if let Some(id) = self.enb_ue_s1ap_id {
            return format!("enb_ue_s1ap_id:{}", id);
        }
        String::new()
    }

    pub fn is_expired(&self, max_inactivity: Duration) -> bool {
        self.last_seen.elapsed() > max_inactivity
    }

    /// Refresh the cached composite keys used for cross-message lookups.
    pub fn update_composite_keys(&mut self) {
        self.mme_composite_key = self
            .mme_ue_s1ap_id
            .map(|id| format!("mme:{}", id))
            .unwrap_or_default();
        self.enb_composite_key = self
            .enb_ue_s1ap_id
            .map(|id| format!("enb:{}", id))
            .unwrap_or_default();
        self.tmsi_cell_key = match (&self.tmsi, self.ecgi.is_empty()) {
            (Some(tmsi), false) => format!("{}@{}", tmsi, hex::encode(&self.ecgi)),
            _ => String::new(),
        };
    }

    /// True when the message shares any identifier with this context.
    pub fn matches_message(&self, msg: &CanonicalMessage) -> bool {
        if let (Some(a), Some(b)) = (&msg.imsi, &self.imsi) {
            if a == b {
                return true;
            }
        }
        if let (Some(a), Some(b)) = (&msg.tmsi, &self.tmsi) {
            if a == b {
                return true;
            }
        }
        if let (Some(a), Some(b)) = (msg.mme_ue_s1ap_id, self.mme_ue_s1ap_id) {
            if a == b {
                return true;
            }
        }
        if let (Some(a), Some(b)) = (msg.enb_ue_s1ap_id, self.enb_ue_s1ap_id) {
            if a == b {
                return true;
            }
        }
        if let (Some(a), Some(b)) = (&msg.imei, &self.imei) {
            if a == b {
                return true;
            }
        }
        false
    }
}

/// Rank of a subscriber key for the upgrade policy: lower is better.
pub(crate) fn key_rank(key: &str) -> u8 {
    if key.starts_with("imsi:") {
        0
    } else if key.starts_with("tmsi:") {
        1
    } else if key.starts_with("mme_ue_s1ap_id:") {
        2
    } else if key.starts_with("enb_ue_s1ap_id:") {
        3
    } else {
        4 // unknown_<n> or empty
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(msg_type: &str) -> CanonicalMessage {
        CanonicalMessage {
            msg_type: msg_type.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn handover_required_arms_and_moves_cell() {
        let mut ctx = UeContext::default();
        let mut m = msg("HandoverRequired");
        m.ecgi = vec![1, 2, 3, 4, 5, 6, 7];
        m.target_ecgi = vec![9, 9, 9, 9, 9, 9, 9];
        ctx.update(&m);

        assert!(ctx.handover_in_progress);
        assert!(ctx.handover_start.is_some());
        assert_eq!(ctx.source_ecgi, vec![1, 2, 3, 4, 5, 6, 7]);
        assert_eq!(ctx.ecgi, vec![9, 9, 9, 9, 9, 9, 9]);
    }

    #[test]
    fn handover_command_keeps_existing_start() {
        let mut ctx = UeContext::default();
        ctx.update(&msg("HandoverRequired"));
        let started = ctx.handover_start;

        ctx.update(&msg("HandoverCommand"));
        assert!(ctx.handover_in_progress);
        assert_eq!(ctx.handover_start, started);
    }

    #[test]
    fn handover_notify_commits_target() {
        let mut ctx = UeContext::default();
        let mut required = msg("HandoverRequired");
        required.ecgi = vec![1; 7];
        required.target_ecgi = vec![2; 7];
        ctx.update(&required);

        ctx.update(&msg("HandoverNotify"));
        assert!(!ctx.handover_in_progress);
        assert_eq!(ctx.ecgi, vec![2; 7]);
        assert_eq!(ctx.last_procedure, "HandoverNotify");
    }

    #[test]
    fn other_messages_leave_handover_alone() {
        let mut ctx = UeContext::default();
        ctx.update(&msg("HandoverRequired"));
        ctx.update(&msg("UplinkNASTransport"));
        assert!(ctx.handover_in_progress);
        assert_eq!(ctx.last_procedure, "UplinkNASTransport");
    }

    #[test]
    fn subscriber_key_priority() {
        let mut ctx = UeContext::default();
        ctx.enb_ue_s1ap_id = Some(3);
        assert_eq!(ctx.generate_subscriber_key(), "enb_ue_s1ap_id:3");
        ctx.mme_ue_s1ap_id = Some(2);
        assert_eq!(ctx.generate_subscriber_key(), "mme_ue_s1ap_id:2");
        ctx.tmsi = Some("deadbeef".to_string());
        assert_eq!(ctx.generate_subscriber_key(), "tmsi:deadbeef");
        ctx.imsi = Some("00101".to_string());
        assert_eq!(ctx.generate_subscriber_key(), "imsi:00101");
    }

    #[test]
    fn key_rank_ordering() {
        assert!(key_rank("imsi:1") < key_rank("tmsi:a"));
        assert!(key_rank("tmsi:a") < key_rank("mme_ue_s1ap_id:1"));
        assert!(key_rank("mme_ue_s1ap_id:1") < key_rank("enb_ue_s1ap_id:1"));
        assert!(key_rank("enb_ue_s1ap_id:1") < key_rank("unknown_4"));
    }

    #[test]
    fn expiry_by_inactivity() {
        let ctx = UeContext::default();
        assert!(!ctx.is_expired(Duration::from_secs(300)));
        assert!(ctx.is_expired(Duration::ZERO) || ctx.last_seen.elapsed() == Duration::ZERO);
    }

    #[test]
    fn composite_keys() {
        let mut ctx = UeContext::default();
        ctx.tmsi = Some("deadbeef".to_string());
        ctx.ecgi = vec![0x11, 0x22];
        ctx.mme_ue_s1ap_id = Some(8);
        ctx.update_composite_keys();
        assert_eq!(ctx.tmsi_cell_key, "deadbeef@1122");
        assert_eq!(ctx.mme_composite_key, "mme:8");
        assert_eq!(ctx.enb_composite_key, "");
    }
}
