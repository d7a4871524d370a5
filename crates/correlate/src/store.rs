//! Multi-indexed subscriber store.
//!
//! Records live in a slab keyed by a monotonically increasing u64 id that
//! never changes for the record's lifetime. Every identifier kind has a
//! secondary index pointing at exactly one record; reassignment clears the
//! loser's field and repoints the index. Records are never deleted while an
//! index refers to them (and this store never deletes them at all; released
//! UEs keep their stable identifiers for audit).

use std::collections::{BTreeSet, HashMap};

use s1scope_core::CanonicalMessage;

/// One correlated subscriber.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubscriberRecord {
    pub imsi: Option<String>,
    pub tmsi: Option<String>,
    pub imeisv: Option<String>,
    pub mme_ue_s1ap_id: Option<u32>,
    pub enb_ue_s1ap_id: Option<u32>,
    pub teids: BTreeSet<u32>,
    pub first_seen_ns: Option<i64>,
    pub last_seen_ns: Option<i64>,
}

/// Digits-only normalization for IMSI and IMEISV.
pub fn normalize_imsi(imsi: &str) -> String {
    imsi.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// Lowercase hex normalization for TMSI; a leading `0x` is dropped.
pub fn normalize_tmsi(tmsi: &str) -> String {
    let stripped = tmsi.strip_prefix("0x").unwrap_or(tmsi);
    stripped
        .chars()
        .filter(|c| c.is_ascii_hexdigit())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

#[derive(Default)]
pub struct SubscriberStore {
    records: HashMap<u64, SubscriberRecord>,
    next_id: u64,
    imsi_index: HashMap<String, u64>,
    tmsi_index: HashMap<String, u64>,
    imeisv_index: HashMap<String, u64>,
    mme_index: HashMap<u32, u64>,
    enb_index: HashMap<u32, u64>,
    teid_index: HashMap<u32, u64>,
}

impl SubscriberStore {
    pub fn new() -> Self {
        SubscriberStore {
            next_id: 1,
            ..Default::default()
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn record(&self, id: u64) -> Option<&SubscriberRecord> {
        self.records.get(&id)
    }

    pub fn records(&self) -> impl Iterator<Item = (u64, &SubscriberRecord)> {
        self.records.iter().map(|(id, record)| (*id, record))
    }

    pub fn by_imsi(&self, imsi: &str) -> Option<u64> {
        self.imsi_index.get(&normalize_imsi(imsi)).copied()
    }

    pub fn by_tmsi(&self, tmsi: &str) -> Option<u64> {
        self.tmsi_index.get(&normalize_tmsi(tmsi)).copied()
    }

    pub fn by_imeisv(&self, imeisv: &str) -> Option<u64> {
        self.imeisv_index.get(&normalize_imsi(imeisv)).copied()
    }

    pub fn by_mme_ue_s1ap_id(&self, id: u32) -> Option<u64> {
        self.mme_index.get(&id).copied()
    }

    pub fn by_enb_ue_s1ap_id(&self, id: u32) -> Option<u64> {
        self.enb_index.get(&id).copied()
    }

    pub fn by_teid(&self, teid: u32) -> Option<u64> {
        self.teid_index.get(&teid).copied()
    }

    /// Find or create the record for a set of identifiers seen together.
    ///
    /// Matching priority: IMSI, TMSI, IMEISV, both S1AP ids on one record,
    /// MME id alone, eNB id alone, TEID, then the S1AP-id-only fallback
    /// scans, and finally a fresh record. Every provided identifier is
    /// associated with the selected record before returning.
    #[allow(clippy::too_many_arguments)]
    pub fn get_or_create(
        &mut self,
        imsi: Option<&str>,
        tmsi: Option<&str>,
        enb_ue_s1ap_id: Option<u32>,
        mme_ue_s1ap_id: Option<u32>,
        teid: Option<u32>,
        imeisv: Option<&str>,
    ) -> u64 {
        let imsi = imsi.map(normalize_imsi).filter(|s| !s.is_empty());
        let tmsi = tmsi.map(normalize_tmsi).filter(|s| !s.is_empty());
        let imeisv = imeisv.map(normalize_imsi).filter(|s| !s.is_empty());

        let mut matched = None;

        if let Some(ref imsi) = imsi {
            matched = self.imsi_index.get(imsi).copied();
        }
        if matched.is_none() {
            if let Some(ref tmsi) = tmsi {
                matched = self.tmsi_index.get(tmsi).copied();
            }
        }
        if matched.is_none() {
            if let Some(ref imeisv) = imeisv {
                matched = self.imeisv_index.get(imeisv).copied();
            }
        }

        // Both S1AP ids resolving to the same record beat either one alone.
        if matched.is_none() {
            if let (Some(mme), Some(enb)) = (mme_ue_s1ap_id, enb_ue_s1ap_id) {
                let mme_hit = self.mme_index.get(&mme);
                let enb_hit = self.enb_index.get(&enb);
                if let (Some(a), Some(b)) = (mme_hit, enb_hit) {
                    if a == b {
                        matched = Some(*a);
                    }
                }
            }
        }
        if matched.is_none() {
            if let Some(mme) = mme_ue_s1ap_id {
                matched = self.mme_index.get(&mme).copied();
            }
        }
        if matched.is_none() {
            if let Some(enb) = enb_ue_s1ap_id {
                matched = self.enb_index.get(&enb).copied();
            }
        }
        if matched.is_none() {
            if let Some(teid) = teid {
                matched = self.teid_index.get(&teid).copied();
            }
        }

        // S1AP-id-only fallback: the ids may have been unlinked from the
        // indexes on release while the record kept the values, or the
        // record may be findable only through a stable identifier.
        let stable_provided = imsi.is_some() || tmsi.is_some() || imeisv.is_some();
        let s1ap_provided = mme_ue_s1ap_id.is_some() || enb_ue_s1ap_id.is_some();
        if matched.is_none() && !stable_provided && s1ap_provided {
            matched = self.fallback_by_record_fields(mme_ue_s1ap_id, enb_ue_s1ap_id);
            if matched.is_none() {
                matched = self.fallback_by_stable_identity();
            }
        }

        let id = matched.unwrap_or_else(|| {
            let id = self.next_id;
            self.next_id += 1;
            self.records.insert(id, SubscriberRecord::default());
            log::debug!("created subscriber record {}", id);
            id
        });

        if let Some(imsi) = imsi {
            self.associate_imsi(id, &imsi);
        }
        if let Some(tmsi) = tmsi {
            self.associate_tmsi(id, &tmsi);
        }
        if let Some(enb) = enb_ue_s1ap_id {
            self.associate_enb_ue_s1ap_id(id, enb);
        }
        if let Some(mme) = mme_ue_s1ap_id {
            self.associate_mme_ue_s1ap_id(id, mme);
        }
        if let Some(teid) = teid {
            self.associate_teid(id, teid);
        }
        if let Some(imeisv) = imeisv {
            self.associate_imeisv(id, &imeisv);
        }

        id
    }

    /// Records whose stored S1AP-id fields match the requested ids even
    /// though the indexes no longer point at them. Only an unambiguous
    /// single match counts.
    fn fallback_by_record_fields(
        &self,
        mme_ue_s1ap_id: Option<u32>,
        enb_ue_s1ap_id: Option<u32>,
    ) -> Option<u64> {
        let mut candidate = None;
        for (id, record) in &self.records {
            let mme_matches = mme_ue_s1ap_id
                .map(|mme| record.mme_ue_s1ap_id == Some(mme))
                .unwrap_or(true);
            let enb_matches = enb_ue_s1ap_id
                .map(|enb| record.enb_ue_s1ap_id == Some(enb))
                .unwrap_or(true);
            let holds_any = record.mme_ue_s1ap_id.is_some() || record.enb_ue_s1ap_id.is_some();
            if mme_matches && enb_matches && holds_any {
                if candidate.is_some() {
                    return None; // ambiguous
                }
                candidate = Some(*id);
            }
        }
        candidate
    }

    /// Records holding a stable identifier (IMSI or TMSI). One match wins;
    /// several fall back to the highest id, the most recently created.
    fn fallback_by_stable_identity(&self) -> Option<u64> {
        let mut best = None;
        for (id, record) in &self.records {
            if record.imsi.is_some() || record.tmsi.is_some() {
                best = Some(best.map_or(*id, |b: u64| b.max(*id)));
            }
        }
        best
    }

    pub fn associate_imsi(&mut self, id: u64, imsi: &str) {
        let imsi = normalize_imsi(imsi);
        if imsi.is_empty() {
            return;
        }
        if let Some(&other) = self.imsi_index.get(&imsi) {
            if other != id {
                log::debug!("imsi {} reassigned from record {} to {}", imsi, other, id);
                if let Some(record) = self.records.get_mut(&other) {
                    record.imsi = None;
                }
            }
        }
        if let Some(record) = self.records.get_mut(&id) {
            if let Some(old) = record.imsi.take() {
                if old != imsi {
                    self.imsi_index.remove(&old);
                }
            }
            record.imsi = Some(imsi.clone());
            self.imsi_index.insert(imsi, id);
        }
    }

    pub fn associate_tmsi(&mut self, id: u64, tmsi: &str) {
        let tmsi = normalize_tmsi(tmsi);
        if tmsi.is_empty() {
            return;
        }
        if let Some(&other) = self.tmsi_index.get(&tmsi) {
            if other != id {
                log::debug!("tmsi {} reassigned from record {} to {}", tmsi, other, id);
                if let Some(record) = self.records.get_mut(&other) {
                    record.tmsi = None;
                }
            }
        }
        if let Some(record) = self.records.get_mut(&id) {
            if let Some(old) = record.tmsi.take() {
                if old != tmsi {
                    self.tmsi_index.remove(&old);
                }
            }
            record.tmsi = Some(tmsi.clone());
            self.tmsi_index.insert(tmsi, id);
        }
    }

    pub fn associate_imeisv(&mut self, id: u64, imeisv: &str) {
        let imeisv = normalize_imsi(imeisv);
        if imeisv.is_empty() {
            return;
        }
        if let Some(&other) = self.imeisv_index.get(&imeisv) {
            if other != id {
                log::debug!("imeisv {} reassigned from record {} to {}", imeisv, other, id);
                if let Some(record) = self.records.get_mut(&other) {
                    record.imeisv = None;
                }
            }
        }
        if let Some(record) = self.records.get_mut(&id) {
            if let Some(old) = record.imeisv.take() {
                if old != imeisv {
                    self.imeisv_index.remove(&old);
                }
            }
            record.imeisv = Some(imeisv.clone());
            self.imeisv_index.insert(imeisv, id);
        }
    }

    pub fn associate_mme_ue_s1ap_id(&mut self, id: u64, mme_id: u32) {
        if let Some(&other) = self.mme_index.get(&mme_id) {
            if other != id {
                log::debug!(
                    "mme-ue-s1ap-id {} reassigned from record {} to {}",
                    mme_id,
                    other,
                    id
                );
                if let Some(record) = self.records.get_mut(&other) {
                    record.mme_ue_s1ap_id = None;
                }
            }
        }
        if let Some(record) = self.records.get_mut(&id) {
            if let Some(old) = record.mme_ue_s1ap_id.take() {
                if old != mme_id {
                    self.mme_index.remove(&old);
                }
            }
            record.mme_ue_s1ap_id = Some(mme_id);
            self.mme_index.insert(mme_id, id);
        }
    }

    pub fn associate_enb_ue_s1ap_id(&mut self, id: u64, enb_id: u32) {
        if let Some(&other) = self.enb_index.get(&enb_id) {
            if other != id {
                log::debug!(
                    "enb-ue-s1ap-id {} reassigned from record {} to {}",
                    enb_id,
                    other,
                    id
                );
                if let Some(record) = self.records.get_mut(&other) {
                    record.enb_ue_s1ap_id = None;
                }
            }
        }
        if let Some(record) = self.records.get_mut(&id) {
            if let Some(old) = record.enb_ue_s1ap_id.take() {
                if old != enb_id {
                    self.enb_index.remove(&old);
                }
            }
            record.enb_ue_s1ap_id = Some(enb_id);
            self.enb_index.insert(enb_id, id);
        }
    }

    /// TEID ownership is exclusive: reassociation removes the tunnel from
    /// the previous owner's set.
    pub fn associate_teid(&mut self, id: u64, teid: u32) {
        if let Some(&other) = self.teid_index.get(&teid) {
            if other != id {
                log::debug!("teid {:#x} reassigned from record {} to {}", teid, other, id);
                if let Some(record) = self.records.get_mut(&other) {
                    record.teids.remove(&teid);
                }
            }
        }
        if let Some(record) = self.records.get_mut(&id) {
            record.teids.insert(teid);
            self.teid_index.insert(teid, id);
        }
    }

    pub fn remove_imsi_association(&mut self, imsi: &str) {
        if let Some(id) = self.imsi_index.remove(&normalize_imsi(imsi)) {
            if let Some(record) = self.records.get_mut(&id) {
                record.imsi = None;
            }
        }
    }

    pub fn remove_tmsi_association(&mut self, tmsi: &str) {
        if let Some(id) = self.tmsi_index.remove(&normalize_tmsi(tmsi)) {
            if let Some(record) = self.records.get_mut(&id) {
                record.tmsi = None;
            }
        }
    }

    pub fn remove_imeisv_association(&mut self, imeisv: &str) {
        if let Some(id) = self.imeisv_index.remove(&normalize_imsi(imeisv)) {
            if let Some(record) = self.records.get_mut(&id) {
                record.imeisv = None;
            }
        }
    }

    pub fn remove_mme_ue_s1ap_id_association(&mut self, mme_id: u32) {
        if let Some(id) = self.mme_index.remove(&mme_id) {
            if let Some(record) = self.records.get_mut(&id) {
                record.mme_ue_s1ap_id = None;
            }
        }
    }

    pub fn remove_enb_ue_s1ap_id_association(&mut self, enb_id: u32) {
        if let Some(id) = self.enb_index.remove(&enb_id) {
            if let Some(record) = self.records.get_mut(&id) {
                record.enb_ue_s1ap_id = None;
            }
        }
    }

    pub fn remove_teid_association(&mut self, teid: u32) {
        if let Some(id) = self.teid_index.remove(&teid) {
            if let Some(record) = self.records.get_mut(&id) {
                record.teids.remove(&teid);
            }
        }
    }

    /// Correlate one decoded message.
    ///
    /// All identifiers seen in the same message are batched into a single
    /// `get_or_create` so they converge onto one record; TEIDs and
    /// timestamps follow, and `UEContextReleaseComplete` finally unlinks
    /// both S1AP-id associations. Returns the record id, or `None` when the
    /// message carries no identifier.
    pub fn process_frame(&mut self, msg: &CanonicalMessage, ts_ns: i64) -> Option<u64> {
        if !msg.has_any_identifier() {
            return None;
        }

        let id = self.get_or_create(
            msg.imsi.as_deref(),
            msg.tmsi.as_deref(),
            msg.enb_ue_s1ap_id,
            msg.mme_ue_s1ap_id,
            None,
            msg.imei.as_deref(),
        );

        for &teid in &msg.teids {
            self.associate_teid(id, teid);
        }

        if let Some(record) = self.records.get_mut(&id) {
            if record.first_seen_ns.is_none() {
                record.first_seen_ns = Some(ts_ns);
            }
            record.last_seen_ns = Some(ts_ns);
        }

        // Release completes the S1AP association: unlink both ids as the
        // final step so earlier association ordering is preserved.
        if msg.msg_type == "UEContextReleaseComplete" {
            let (mme, enb) = self
                .records
                .get(&id)
                .map(|r| (r.mme_ue_s1ap_id, r.enb_ue_s1ap_id))
                .unwrap_or((None, None));
            if let Some(mme) = mme {
                self.remove_mme_ue_s1ap_id_association(mme);
            }
            if let Some(enb) = enb {
                self.remove_enb_ue_s1ap_id_association(enb);
            }
        }

        Some(id)
    }
}
