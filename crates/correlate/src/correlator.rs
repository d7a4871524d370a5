//! The correlator: UE contexts layered over the subscriber store.
//!
//! Owned by the pipeline; the rule engine holds a lookup-only handle and
//! derives the subscriber key exactly once per message through
//! [`Correlator::get_or_create_context`].

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

use s1scope_core::{now_ns, CanonicalMessage};

use crate::context::{key_rank, UeContext};
use crate::store::{SubscriberRecord, SubscriberStore};

#[derive(Debug, Clone)]
pub struct CorrelatorConfig {
    /// A context is dropped once inactive for longer than this.
    pub context_expiry: Duration,
}

impl Default for CorrelatorConfig {
    fn default() -> Self {
        CorrelatorConfig {
            context_expiry: Duration::from_secs(300),
        }
    }
}

struct Inner {
    store: SubscriberStore,
    contexts: HashMap<String, UeContext>,
    next_unknown_id: u64,
}

/// Read-mostly map of subscriber_key -> [`UeContext`] over the subscriber
/// store. `get_context` takes the read side; correlation and cleanup take
/// the write side.
pub struct Correlator {
    config: CorrelatorConfig,
    inner: RwLock<Inner>,
}

impl Correlator {
    pub fn new(config: CorrelatorConfig) -> Self {
        Correlator {
            config,
            inner: RwLock::new(Inner {
                store: SubscriberStore::new(),
                contexts: HashMap::new(),
                next_unknown_id: 1,
            }),
        }
    }

    /// Correlate one message and return its subscriber key.
    ///
    /// A message with no usable identifier yields an empty key. Identifiers
    /// held by a matching context are merged into the store call so that
    /// identifiers acquired earlier survive messages carrying only a
    /// subset. This is the single correlation entry point per message;
    /// everything downstream threads the returned key instead of calling
    /// back in.
    pub fn get_or_create_context(&self, msg: &CanonicalMessage) -> String {
        let mut inner = self.inner.write().unwrap();

        let existing_key = inner
            .contexts
            .iter()
            .find(|(_, ctx)| ctx.matches_message(msg))
            .map(|(key, _)| key.clone());

        // Merge identifiers remembered by the context into the message
        // view handed to the store.
        let mut merged = msg.clone();
        if let Some(ref key) = existing_key {
            let ctx = &inner.contexts[key];
            if merged.imsi.is_none() {
                merged.imsi = ctx.imsi.clone();
            }
            if merged.tmsi.is_none() {
                merged.tmsi = ctx.tmsi.clone();
            }
            if merged.imei.is_none() {
                merged.imei = ctx.imei.clone();
            }
            if merged.mme_ue_s1ap_id.is_none() {
                merged.mme_ue_s1ap_id = ctx.mme_ue_s1ap_id;
            }
            if merged.enb_ue_s1ap_id.is_none() {
                merged.enb_ue_s1ap_id = ctx.enb_ue_s1ap_id;
            }
        }

        if !merged.has_any_identifier() {
            return String::new();
        }

        let is_release = msg.msg_type == "UEContextReleaseComplete";
        if is_release && existing_key.is_none() && !self.known_subscriber(&inner.store, &merged)
        {
            // A release for a UE never seen: nothing to update, nothing to
            // create.
            return String::new();
        }

        let Some(record_id) = inner.store.process_frame(&merged, now_ns()) else {
            return String::new();
        };

        let record = inner.store.record(record_id).cloned().unwrap_or_default();
        let subscriber_key = match derive_key(&record) {
            Some(key) => key,
            None => {
                let key = format!("unknown_{}", inner.next_unknown_id);
                inner.next_unknown_id += 1;
                key
            }
        };

        if let Some(existing_key) = existing_key {
            let upgrade = subscriber_key != existing_key
                && key_rank(&subscriber_key) < key_rank(&existing_key);
            if upgrade {
                let mut ctx = inner.contexts.remove(&existing_key).unwrap();
                apply_message(&mut ctx, &merged, &record, is_release);
                ctx.subscriber_key = subscriber_key.clone();
                inner.contexts.insert(subscriber_key.clone(), ctx);
                return subscriber_key;
            }
            if let Some(ctx) = inner.contexts.get_mut(&existing_key) {
                apply_message(ctx, &merged, &record, is_release);
            }
            return existing_key;
        }

        if is_release {
            // No context left behind for a released UE.
            return subscriber_key;
        }

        let mut ctx = UeContext::default();
        apply_message(&mut ctx, &merged, &record, false);
        ctx.subscriber_key = subscriber_key.clone();
        inner.contexts.insert(subscriber_key.clone(), ctx);
        subscriber_key
    }

    /// Fold a message into its context without needing the key back.
    pub fn update_context(&self, msg: &CanonicalMessage) {
        self.get_or_create_context(msg);
    }

    /// Read-only context lookup.
    pub fn get_context(&self, subscriber_key: &str) -> Option<UeContext> {
        let inner = self.inner.read().unwrap();
        inner.contexts.get(subscriber_key).cloned()
    }

    /// Drop contexts idle beyond the configured expiry. Subscriber records
    /// persist for audit.
    pub fn cleanup_expired(&self) {
        let mut inner = self.inner.write().unwrap();
        let expiry = self.config.context_expiry;
        inner.contexts.retain(|_, ctx| !ctx.is_expired(expiry));
    }

    pub fn context_count(&self) -> usize {
        self.inner.read().unwrap().contexts.len()
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.read().unwrap().store.len()
    }

    fn known_subscriber(&self, store: &SubscriberStore, msg: &CanonicalMessage) -> bool {
        if let Some(ref imsi) = msg.imsi {
            if store.by_imsi(imsi).is_some() {
                return true;
            }
        }
        if let Some(ref tmsi) = msg.tmsi {
            if store.by_tmsi(tmsi).is_some() {
                return true;
            }
        }
        if let Some(ref imeisv) = msg.imei {
            if store.by_imeisv(imeisv).is_some() {
                return true;
            }
        }
        if let Some(mme) = msg.mme_ue_s1ap_id {
            if store.by_mme_ue_s1ap_id(mme).is_some() {
                return true;
            }
        }
        if let Some(enb) = msg.enb_ue_s1ap_id {
            if store.by_enb_ue_s1ap_id(enb).is_some() {
                return true;
            }
        }
        false
    }
}

/// Subscriber key from a record: IMSI > TMSI > MME id > eNB id.
fn derive_key(record: &SubscriberRecord) -> Option<String> {
    if let Some(ref imsi) = record.imsi {
        return Some(format!("imsi:{}", imsi));
    }
    if let Some(ref tmsi) = record.tmsi {
        return Some(format!("tmsi:{}", tmsi));
    }
    if let Some(id) = record.mme_ue_s1ap_id {
        return Some(format!("mme_ue_s1ap_id:{}", id));
    }
    if let Some(id) = record.enb_ue_s1ap_id {
        return Some(format!("enb_ue_s1ap_id:{}", id));
    }
    None
}

/// Update a context from the message, sync identifiers from the record,
/// and clear the S1AP ids when the message completed a release.
fn apply_message(
    ctx: &mut UeContext,
    msg: &CanonicalMessage,
    record: &SubscriberRecord,
    is_release: bool,
) {
    ctx.update(msg);

    if record.imsi.is_some() {
        ctx.imsi = record.imsi.clone();
    }
    if record.tmsi.is_some() {
        ctx.tmsi = record.tmsi.clone();
    }
    if record.imeisv.is_some() {
        ctx.imei = record.imeisv.clone();
    }
    if record.mme_ue_s1ap_id.is_some() {
        ctx.mme_ue_s1ap_id = record.mme_ue_s1ap_id;
    }
    if record.enb_ue_s1ap_id.is_some() {
        ctx.enb_ue_s1ap_id = record.enb_ue_s1ap_id;
    }

    if is_release {
        ctx.mme_ue_s1ap_id = None;
        ctx.enb_ue_s1ap_id = None;
    }
    ctx.update_composite_keys();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(
        msg_type: &str,
        imsi: Option<&str>,
        tmsi: Option<&str>,
        mme: Option<u32>,
        enb: Option<u32>,
    ) -> CanonicalMessage {
        CanonicalMessage {
            msg_type: msg_type.to_string(),
            imsi: imsi.map(|s| s.to_string()),
            tmsi: tmsi.map(|s| s.to_string()),
            mme_ue_s1ap_id: mme,
            enb_ue_s1ap_id: enb,
            ..Default::default()
        }
    }

    #[test]
    fn no_identifiers_yield_empty_key() {
        let correlator = Correlator::new(CorrelatorConfig::default());
        let key = correlator.get_or_create_context(&msg("Paging", None, None, None, None));
        assert_eq!(key, "");
        assert_eq!(correlator.context_count(), 0);
    }

    #[test]
    fn key_upgrades_from_enb_to_imsi() {
        let correlator = Correlator::new(CorrelatorConfig::default());

        let key1 =
            correlator.get_or_create_context(&msg("initialUEMessage", None, None, None, Some(5)));
        assert_eq!(key1, "enb_ue_s1ap_id:5");

        let key2 = correlator.get_or_create_context(&msg(
            "UplinkNASTransport",
            Some("001010123456789"),
            None,
            None,
            Some(5),
        ));
        assert_eq!(key2, "imsi:001010123456789");

        // The context moved; the old key is gone.
        assert!(correlator.get_context("enb_ue_s1ap_id:5").is_none());
        let ctx = correlator.get_context(&key2).unwrap();
        assert_eq!(ctx.enb_ue_s1ap_id, Some(5));
        assert_eq!(correlator.context_count(), 1);
    }

    #[test]
    fn context_merge_preserves_earlier_identifiers() {
        let correlator = Correlator::new(CorrelatorConfig::default());

        correlator.get_or_create_context(&msg(
            "initialUEMessage",
            Some("262021234567890"),
            None,
            Some(40),
            None,
        ));
        // Later message carries only the MME id; the stored IMSI still
        // anchors the key.
        let key = correlator.get_or_create_context(&msg(
            "UECapabilityInfoIndication",
            None,
            None,
            Some(40),
            None,
        ));
        assert_eq!(key, "imsi:262021234567890");
        assert_eq!(correlator.subscriber_count(), 1);
    }

    #[test]
    fn release_for_unknown_ue_is_ignored() {
        let correlator = Correlator::new(CorrelatorConfig::default());
        let key = correlator.get_or_create_context(&msg(
            "UEContextReleaseComplete",
            None,
            None,
            Some(9),
            None,
        ));
        assert_eq!(key, "");
        assert_eq!(correlator.subscriber_count(), 0);
    }

    #[test]
    fn release_clears_context_s1ap_ids() {
        let correlator = Correlator::new(CorrelatorConfig::default());
        let key = correlator.get_or_create_context(&msg(
            "initialUEMessage",
            Some("001010123456789"),
            None,
            Some(7),
            Some(8),
        ));

        let release_key = correlator.get_or_create_context(&msg(
            "UEContextReleaseComplete",
            None,
            None,
            Some(7),
            None,
        ));
        assert_eq!(release_key, key);

        let ctx = correlator.get_context(&key).unwrap();
        assert_eq!(ctx.mme_ue_s1ap_id, None);
        assert_eq!(ctx.enb_ue_s1ap_id, None);
        assert_eq!(ctx.imsi.as_deref(), Some("001010123456789"));
    }

    #[test]
    fn cleanup_removes_idle_contexts_only() {
        let correlator = Correlator::new(CorrelatorConfig {
            context_expiry: Duration::ZERO,
        });
        correlator.get_or_create_context(&msg("initialUEMessage", Some("00101"), None, None, None));
        assert_eq!(correlator.context_count(), 1);

        std::thread::sleep(Duration::from_millis(5));
        correlator.cleanup_expired();
        assert_eq!(correlator.context_count(), 0);
        // The subscriber record is untouched by context expiry.
        assert_eq!(correlator.subscriber_count(), 1);
    }

    #[test]
    fn same_tier_key_updates_in_place() {
        let correlator = Correlator::new(CorrelatorConfig::default());
        let key = correlator.get_or_create_context(&msg(
            "initialUEMessage",
            Some("00101"),
            None,
            None,
            None,
        ));
        let again = correlator.get_or_create_context(&msg(
            "UplinkNASTransport",
            Some("00101"),
            None,
            Some(3),
            None,
        ));
        assert_eq!(key, again);
        let ctx = correlator.get_context(&key).unwrap();
        assert_eq!(ctx.mme_ue_s1ap_id, Some(3));
        assert_eq!(ctx.last_procedure, "UplinkNASTransport");
    }
}
