//! Rule evaluation.
//!
//! `process` derives the subscriber key from the correlator exactly once
//! per message, then evaluates every loaded ruleset. Sequence state lives
//! here, keyed by subscriber; states die when consumed, when their window
//! lapses, or at the absolute 60-second cap.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use s1scope_core::{hex, now_ns, CanonicalMessage, Event};
use s1scope_correlate::Correlator;

use crate::types::{Ruleset, SequenceRule, SingleMessageRule};

/// Absolute lifetime cap for an unconsumed sequence state.
const MAX_SEQUENCE_AGE: Duration = Duration::from_secs(60);

/// An armed sequence rule waiting for its second message.
#[derive(Debug, Clone)]
pub struct SequenceState {
    pub subscriber_key: String,
    pub first_msg_type: String,
    /// Second message type of the rule that armed this state. Two rules may
    /// share a first message type with different windows; expiry applies
    /// the arming rule's own window.
    pub second_msg_type: String,
    pub first_message: CanonicalMessage,
    pub first_seen: Instant,
    pub ruleset_id: String,
    pub ruleset_version: String,
}

/// Single-threaded rule engine. Owned by the processing loop; holds a
/// lookup-only handle on the correlator.
pub struct RuleEngine {
    correlator: Arc<Correlator>,
    rulesets: Vec<Ruleset>,
    sequence_states: HashMap<String, Vec<SequenceState>>,
}

impl RuleEngine {
    pub fn new(correlator: Arc<Correlator>) -> Self {
        RuleEngine {
            correlator,
            rulesets: Vec::new(),
            sequence_states: HashMap::new(),
        }
    }

    pub fn load_ruleset(&mut self, ruleset: Ruleset) {
        self.rulesets.push(ruleset);
    }

    pub fn ruleset_count(&self) -> usize {
        self.rulesets.len()
    }

    /// Evaluate one message against every loaded ruleset.
    pub fn process(&mut self, msg: &CanonicalMessage) -> Vec<Event> {
        // The single correlation call for this message; the key is threaded
        // into every rule evaluation below.
        let subscriber_key = self.correlator.get_or_create_context(msg);

        self.cleanup_expired_sequences();

        let mut events = Vec::new();
        let mut states = std::mem::take(&mut self.sequence_states);

        for ruleset in &self.rulesets {
            for rule in &ruleset.single_message_rules {
                if let Some(event) =
                    self.eval_single_rule(rule, ruleset, msg, &subscriber_key)
                {
                    events.push(event);
                }
            }

            let sequences = states.entry(subscriber_key.clone()).or_default();
            for rule in &ruleset.sequence_rules {
                self.eval_sequence_rule(
                    rule,
                    ruleset,
                    msg,
                    &subscriber_key,
                    sequences,
                    &mut events,
                );
            }
        }

        self.sequence_states = states;
        events
    }

    /// Drop sequence states past their rule window or the absolute cap.
    pub fn cleanup_expired_sequences(&mut self) {
        // Windows keyed by the full rule identity: rules in one ruleset may
        // share a first message type with different windows, and each state
        // expires on the window of the rule that armed it.
        let windows: HashMap<(&str, &str, &str), Duration> = self
            .rulesets
            .iter()
            .flat_map(|rs| {
                rs.sequence_rules.iter().map(move |rule| {
                    (
                        (
                            rs.id.as_str(),
                            rule.first_msg_type.as_str(),
                            rule.second_msg_type.as_str(),
                        ),
                        Duration::from_millis(rule.time_window_ms),
                    )
                })
            })
            .collect();

        self.sequence_states.retain(|_, sequences| {
            sequences.retain(|state| {
                let age = state.first_seen.elapsed();
                if age > MAX_SEQUENCE_AGE {
                    return false;
                }
                match windows.get(&(
                    state.ruleset_id.as_str(),
                    state.first_msg_type.as_str(),
                    state.second_msg_type.as_str(),
                )) {
                    Some(window) => age <= *window,
                    None => true,
                }
            });
            !sequences.is_empty()
        });
    }

    fn eval_single_rule(
        &self,
        rule: &SingleMessageRule,
        ruleset: &Ruleset,
        msg: &CanonicalMessage,
        subscriber_key: &str,
    ) -> Option<Event> {
        if msg.msg_type != rule.msg_type {
            return None;
        }

        let mut event =
            self.create_event(&rule.event_name, msg, ruleset, subscriber_key, &rule.attributes);
        for extraction in &rule.event_data {
            if let Some(value) =
                self.extract_value(&extraction.source, msg, None, subscriber_key)
            {
                event.attributes.insert(extraction.target.clone(), value);
            }
        }
        Some(event)
    }

    fn eval_sequence_rule(
        &self,
        rule: &SequenceRule,
        ruleset: &Ruleset,
        msg: &CanonicalMessage,
        subscriber_key: &str,
        sequences: &mut Vec<SequenceState>,
        events: &mut Vec<Event>,
    ) {
        if msg.msg_type == rule.first_msg_type {
            // Arm a new sequence. A message is either a first or a second
            // for a given rule, never both in one pass.
            sequences.push(SequenceState {
                subscriber_key: subscriber_key.to_string(),
                first_msg_type: rule.first_msg_type.clone(),
                second_msg_type: rule.second_msg_type.clone(),
                first_message: msg.clone(),
                first_seen: Instant::now(),
                ruleset_id: ruleset.id.clone(),
                ruleset_version: ruleset.version.clone(),
            });
            return;
        }

        if msg.msg_type != rule.second_msg_type {
            return;
        }

        let window = Duration::from_millis(rule.time_window_ms);
        let mut i = 0;
        while i < sequences.len() {
            if sequences[i].first_msg_type != rule.first_msg_type {
                i += 1;
                continue;
            }
            if sequences[i].first_seen.elapsed() > window {
                // Past the window: left for cleanup_expired_sequences.
                i += 1;
                continue;
            }

            let state = sequences.remove(i);
            let mut event = self.create_event(
                &rule.event_name,
                msg,
                ruleset,
                subscriber_key,
                &rule.attributes,
            );
            for extraction in &rule.event_data {
                if let Some(value) = self.extract_value(
                    &extraction.source,
                    msg,
                    Some(&state.first_message),
                    subscriber_key,
                ) {
                    event.attributes.insert(extraction.target.clone(), value);
                }
            }
            // Evidence in causal order: the first message, then this one.
            event.evidence = vec![state.first_message.spool_ref(), msg.spool_ref()];
            events.push(event);
        }
    }

    fn create_event(
        &self,
        name: &str,
        msg: &CanonicalMessage,
        ruleset: &Ruleset,
        subscriber_key: &str,
        static_attributes: &std::collections::BTreeMap<String, String>,
    ) -> Event {
        let mut event = Event {
            name: name.to_string(),
            ts_ns: now_ns(),
            subscriber_key: subscriber_key.to_string(),
            evidence: vec![msg.spool_ref()],
            ruleset_id: ruleset.id.clone(),
            ruleset_version: ruleset.version.clone(),
            confidence: 1.0,
            ..Default::default()
        };

        for (key, value) in static_attributes {
            event.attributes.insert(key.clone(), value.clone());
        }
        // Derived attributes take precedence over statics of the same name.
        event
            .attributes
            .insert("msg_type".to_string(), msg.msg_type.clone());
        if !msg.ecgi.is_empty() {
            event.attributes.insert("ecgi".to_string(), msg.ecgi_hex());
        }
        event
    }

    /// Evaluate an extraction expression. Unknown sources or fields and
    /// empty values all produce `None`, which skips the attribute.
    fn extract_value(
        &self,
        expression: &str,
        msg: &CanonicalMessage,
        first_message: Option<&CanonicalMessage>,
        subscriber_key: &str,
    ) -> Option<String> {
        let (source, field) = expression.split_once('.')?;

        match source {
            "message" => message_field(msg, field),
            "first_message" => message_field(first_message?, field),
            "context" => {
                let ctx = self.correlator.get_context(subscriber_key)?;
                let value = match field {
                    "ecgi" => hex::encode(&ctx.ecgi),
                    "source_ecgi" => hex::encode(&ctx.source_ecgi),
                    "target_ecgi" => hex::encode(&ctx.target_ecgi),
                    "imsi" => ctx.imsi.unwrap_or_default(),
                    "tmsi" => ctx.tmsi.unwrap_or_default(),
                    "mme_ue_s1ap_id" => {
                        ctx.mme_ue_s1ap_id.map(|v| v.to_string()).unwrap_or_default()
                    }
                    "enb_ue_s1ap_id" => {
                        ctx.enb_ue_s1ap_id.map(|v| v.to_string()).unwrap_or_default()
                    }
                    _ => String::new(),
                };
                (!value.is_empty()).then_some(value)
            }
            _ => None,
        }
    }
}

fn message_field(msg: &CanonicalMessage, field: &str) -> Option<String> {
    let value = match field {
        "msg_type" => msg.msg_type.clone(),
        "ecgi" => msg.ecgi_hex(),
        "target_ecgi" => msg.target_ecgi_hex(),
        "mme_ue_s1ap_id" => msg.mme_ue_s1ap_id.map(|v| v.to_string()).unwrap_or_default(),
        "enb_ue_s1ap_id" => msg.enb_ue_s1ap_id.map(|v| v.to_string()).unwrap_or_default(),
        "imsi" => msg.imsi.clone().unwrap_or_default(),
        "tmsi" => msg.tmsi.clone().unwrap_or_default(),
        _ => String::new(),
    };
    (!value.is_empty()).then_some(value)
}
