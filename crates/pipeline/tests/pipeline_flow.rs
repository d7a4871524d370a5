//! End-to-end pipeline test: append raw S1AP frames to the spool, process a
//! batch, and check the emitted events and their evidence chains.

use std::collections::BTreeMap;
use std::sync::Arc;

use s1scope_core::{PayloadType, SignalMessage};
use s1scope_pipeline::{MemorySink, Pipeline, PipelineConfig};
use s1scope_rules::{Ruleset, SequenceRule, SingleMessageRule};
use s1scope_spool::SpoolConfig;

/// Assemble an S1AP PDU the way the wire encoder would.
fn build_pdu(pdu_index: u8, procedure: u8, ies: &[(u16, Vec<u8>)]) -> Vec<u8> {
    let mut body = vec![0x00];
    body.extend_from_slice(&(ies.len() as u16).to_be_bytes());
    for (id, value) in ies {
        body.extend_from_slice(&id.to_be_bytes());
        body.push(0x40);
        body.push(value.len() as u8);
        body.extend_from_slice(value);
    }
    let mut pdu = vec![pdu_index << 5, procedure, 0x00, body.len() as u8];
    pdu.extend_from_slice(&body);
    pdu
}

/// NAS-PDU IE value carrying an Identity Response with IMSI
/// 001010123456789, length determinant included.
fn nas_pdu_ie_with_imsi() -> Vec<u8> {
    let nas = [
        0x07, 0x56, 0x08, 0x09, 0x10, 0x10, 0x10, 0x32, 0x54, 0x76, 0x98,
    ];
    let mut value = vec![nas.len() as u8];
    value.extend_from_slice(&nas);
    value
}

fn signal(raw_payload: Vec<u8>, seq: u64, packet_num: i64) -> SignalMessage {
    SignalMessage {
        ts_capture_ns: 1_000 + seq as i64,
        ts_ingest_ns: 2_000 + seq as i64,
        source_id: "enb-1".to_string(),
        source_sequence: seq,
        transport_meta: format!(r#"{{"pcap":true,"packet_num":{}}}"#, packet_num),
        payload_type: PayloadType::RawBytes,
        raw_payload,
    }
}

fn pipeline_with(dir: &std::path::Path, ruleset: Ruleset) -> (Pipeline, Arc<MemorySink>) {
    let mut pipeline = Pipeline::new(PipelineConfig {
        spool: SpoolConfig {
            base_dir: dir.to_path_buf(),
            num_partitions: 1,
            ..Default::default()
        },
        ..Default::default()
    })
    .unwrap();
    pipeline.load_ruleset(ruleset);
    let sink = Arc::new(MemorySink::new());
    pipeline.add_sink(sink.clone());
    (pipeline, sink)
}

#[test]
fn handover_sequence_emits_event_with_evidence() {
    let dir = tempfile::tempdir().unwrap();
    let ruleset = Ruleset {
        id: "mobility".to_string(),
        version: "1.0".to_string(),
        single_message_rules: vec![],
        sequence_rules: vec![SequenceRule {
            event_name: "Mobility.Handover.Completed".to_string(),
            first_msg_type: "HandoverRequest".to_string(),
            second_msg_type: "HandoverNotify".to_string(),
            time_window_ms: 15_000,
            attributes: BTreeMap::new(),
            event_data: vec![],
        }],
    };
    let (mut pipeline, sink) = pipeline_with(dir.path(), ruleset);

    // HandoverRequest (procedure 1, initiating), then HandoverNotify
    // (procedure 2, initiating), both tied to the same IMSI via NAS.
    let request = build_pdu(0, 1, &[(26, nas_pdu_ie_with_imsi())]);
    let notify = build_pdu(0, 2, &[(26, nas_pdu_ie_with_imsi())]);

    let (p1, o1) = pipeline.spool().append(&signal(request, 1, 101)).unwrap();
    let (p2, o2) = pipeline.spool().append(&signal(notify, 2, 102)).unwrap();

    let emitted = pipeline.process_batch(100);
    assert_eq!(emitted, 1);

    let events = sink.events();
    assert_eq!(events.len(), 1);
    let event = &events[0];
    assert_eq!(event.name, "Mobility.Handover.Completed");
    assert_eq!(event.subscriber_key, "imsi:001010123456789");
    assert_eq!(event.ruleset_id, "mobility");
    assert_eq!(event.confidence, 1.0);

    let evidence: Vec<(i32, i64, Option<i64>)> = event
        .evidence
        .iter()
        .map(|e| (e.partition, e.offset, e.frame_number))
        .collect();
    assert_eq!(evidence, vec![(p1, o1, Some(101)), (p2, o2, Some(102))]);
}

#[test]
fn committed_offsets_prevent_reprocessing() {
    let dir = tempfile::tempdir().unwrap();
    let ruleset = Ruleset {
        id: "attach".to_string(),
        version: "1.0".to_string(),
        single_message_rules: vec![SingleMessageRule {
            event_name: "Mobility.Attach.Started".to_string(),
            msg_type: "initialUEMessage".to_string(),
            attributes: BTreeMap::new(),
            event_data: vec![],
        }],
        sequence_rules: vec![],
    };
    let (mut pipeline, sink) = pipeline_with(dir.path(), ruleset);

    let initial = build_pdu(0, 12, &[(96, vec![0x00, 0xde, 0xad, 0xbe, 0xef])]);
    pipeline.spool().append(&signal(initial, 1, 1)).unwrap();

    assert_eq!(pipeline.process_batch(100), 1);
    assert_eq!(pipeline.process_batch(100), 0);
    assert_eq!(sink.events().len(), 1);

    // A later append is picked up by the next batch.
    let another = build_pdu(0, 12, &[(96, vec![0x00, 0xca, 0xfe, 0xba, 0xbe])]);
    pipeline.spool().append(&signal(another, 2, 2)).unwrap();
    assert_eq!(pipeline.process_batch(100), 1);
    assert_eq!(sink.events().len(), 2);
}

#[test]
fn malformed_payloads_do_not_stop_the_batch() {
    let dir = tempfile::tempdir().unwrap();
    let ruleset = Ruleset {
        id: "attach".to_string(),
        version: "1.0".to_string(),
        single_message_rules: vec![SingleMessageRule {
            event_name: "Mobility.Attach.Started".to_string(),
            msg_type: "initialUEMessage".to_string(),
            attributes: BTreeMap::new(),
            event_data: vec![],
        }],
        sequence_rules: vec![],
    };
    let (mut pipeline, sink) = pipeline_with(dir.path(), ruleset);

    // Garbage first, then a valid initialUEMessage.
    pipeline.spool().append(&signal(vec![0x60], 1, 1)).unwrap();
    let valid = build_pdu(0, 12, &[(96, vec![0x00, 0xde, 0xad, 0xbe, 0xef])]);
    pipeline.spool().append(&signal(valid, 2, 2)).unwrap();

    assert_eq!(pipeline.process_batch(100), 1);
    let events = sink.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].attributes["msg_type"], "initialUEMessage");
    assert_eq!(events[0].subscriber_key, "tmsi:deadbeef");
}

#[test]
fn single_rule_attributes_and_extraction() {
    let dir = tempfile::tempdir().unwrap();
    let ruleset = Ruleset {
        id: "cells".to_string(),
        version: "3.0".to_string(),
        single_message_rules: vec![SingleMessageRule {
            event_name: "Cell.Observed".to_string(),
            msg_type: "initialUEMessage".to_string(),
            attributes: BTreeMap::from([("category".to_string(), "radio".to_string())]),
            event_data: vec![s1scope_rules::EventDataExtraction {
                target: "cell".to_string(),
                source: "message.ecgi".to_string(),
            }],
        }],
        sequence_rules: vec![],
    };
    let (mut pipeline, sink) = pipeline_with(dir.path(), ruleset);

    let pdu = build_pdu(
        0,
        12,
        &[(100, vec![0x11, 0x22, 0x33, 0xaa, 0xbb, 0xcc, 0xcd])],
    );
    pipeline.spool().append(&signal(pdu, 1, 1)).unwrap();
    pipeline.process_batch(100);

    let events = sink.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].attributes["category"], "radio");
    assert_eq!(events[0].attributes["cell"], "112233aabbcccd");
    assert_eq!(events[0].attributes["ecgi"], "112233aabbcccd");
    assert_eq!(events[0].ruleset_version, "3.0");
}
