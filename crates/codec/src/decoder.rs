//! Canonical-message assembly.
//!
//! Combines SCTP extraction, the generic S1AP walk, the specific IE
//! extractors and the NAS decoder into one best-effort `decode` call.

use s1scope_core::{hex, CanonicalMessage};

use crate::{erab, nas, s1ap, sctp};

/// Decode a raw byte buffer into a canonical message.
///
/// The input may be a full Ethernet frame (SCTP extraction is attempted
/// first) or a bare S1AP PDU. Never fails: an unparseable buffer comes back
/// with `decode_failed` set and the raw bytes preserved.
pub fn decode(raw_bytes: &[u8]) -> CanonicalMessage {
    let mut canonical = CanonicalMessage {
        raw_bytes: raw_bytes.to_vec(),
        ..Default::default()
    };

    if raw_bytes.is_empty() {
        canonical.decode_failed = true;
        return canonical;
    }

    let s1ap_bytes = match sctp::extract_first(raw_bytes) {
        Some(payload) => payload,
        None => raw_bytes.to_vec(),
    };

    let Some(pdu) = s1ap::parse_pdu(&s1ap_bytes) else {
        canonical.decode_failed = true;
        return canonical;
    };

    canonical.procedure_code = pdu.procedure_code;
    canonical.msg_type = s1ap::msg_type(pdu.procedure_code, pdu.pdu_type);

    let (mme_id, enb_id) = s1ap::extract_s1ap_ids(&pdu.ies);
    canonical.mme_ue_s1ap_id = mme_id;
    canonical.enb_ue_s1ap_id = enb_id;

    if let Some(ecgi) = s1ap::extract_ecgi(&pdu.ies) {
        canonical.ecgi = ecgi.raw;
        canonical.ecgi_plmn_identity = ecgi.plmn_identity;
        canonical.ecgi_cell_id = ecgi.cell_id;
    }
    if let Some(target) = s1ap::extract_target_ecgi(&pdu.ies) {
        canonical.target_ecgi = target.raw;
        canonical.target_ecgi_plmn_identity = target.plmn_identity;
        canonical.target_ecgi_cell_id = target.cell_id;
    }

    collect_identities(&mut canonical, &pdu);
    collect_teids(&mut canonical, &pdu);

    canonical.decoded_tree = render_tree(&pdu);
    canonical
}

/// Pull subscriber identities out of the embedded NAS PDUs and the S-TMSI.
fn collect_identities(canonical: &mut CanonicalMessage, pdu: &s1ap::S1apPdu) {
    // Direct S-TMSI path first: present on initialUEMessage.
    if let Some(tmsi) = s1ap::extract_tmsi_from_stmsi(&pdu.ies) {
        canonical.tmsi.get_or_insert(tmsi);
    }

    let mut nas_payloads = Vec::new();
    if let Some(bytes) = s1ap::extract_nas_pdu(&pdu.ies) {
        nas_payloads.push(bytes);
    }
    // InitialContextSetupRequest embeds per-E-RAB NAS PDUs.
    if let Some(list_hex) = pdu.ies.get("E-RABToBeSetupListCtxtSUReq") {
        for item in erab::decode_to_be_setup_list(&hex::decode(list_hex)) {
            if let Some(nas_pdu) = item.nas_pdu {
                nas_payloads.push(nas_pdu);
            }
        }
    }

    for payload in nas_payloads {
        for identity in nas::decode_identities(&payload) {
            match identity.kind {
                nas::IdentityKind::Imsi => {
                    canonical.imsi.get_or_insert(identity.value);
                }
                nas::IdentityKind::Tmsi => {
                    canonical.tmsi.get_or_insert(identity.value);
                }
                nas::IdentityKind::Imei | nas::IdentityKind::Imeisv => {
                    canonical.imei.get_or_insert(identity.value);
                }
            }
        }
    }
}

/// TEIDs come only from the structured E-RAB item decodes.
fn collect_teids(canonical: &mut CanonicalMessage, pdu: &s1ap::S1apPdu) {
    if let Some(list_hex) = pdu.ies.get("E-RABSetupListCtxtSURes") {
        for item in erab::decode_setup_list(&hex::decode(list_hex)) {
            canonical.teids.push(item.gtp_teid);
        }
    }
    if let Some(list_hex) = pdu.ies.get("E-RABToBeSetupListCtxtSUReq") {
        for item in erab::decode_to_be_setup_list(&hex::decode(list_hex)) {
            canonical.teids.push(item.gtp_teid);
        }
    }
}

/// Deterministic JSON rendering of the decoded structure. The IE map is a
/// BTreeMap, so repeated decodes of the same buffer are byte-identical.
fn render_tree(pdu: &s1ap::S1apPdu) -> String {
    let tree = serde_json::json!({
        "procedure_code": pdu.procedure_code,
        "procedure_name": s1ap::procedure_name(pdu.procedure_code),
        "pdu_type": pdu.pdu_type.as_index(),
        "information_elements": pdu.ies,
    });
    tree.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_pdu(pdu_index: u8, procedure: u8, ies: &[(u16, &[u8])]) -> Vec<u8> {
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

    #[test]
    fn empty_buffer_fails_with_raw_preserved() {
        let msg = decode(&[]);
        assert!(msg.decode_failed);
        assert!(msg.raw_bytes.is_empty());
    }

    #[test]
    fn garbage_preserves_raw_bytes() {
        let msg = decode(&[0x60]);
        assert!(msg.decode_failed);
        assert_eq!(msg.raw_bytes, vec![0x60]);
    }

    #[test]
    fn initial_ue_message_with_stmsi_and_ecgi() {
        let bytes = build_pdu(
            0,
            12,
            &[
                (8, &[0x00, 0x01, 0x02]),
                (96, &[0x00, 0xde, 0xad, 0xbe, 0xef]),
                (100, &[0x11, 0x22, 0x33, 0xaa, 0xbb, 0xcc, 0xcd]),
            ],
        );
        let msg = decode(&bytes);
        assert!(!msg.decode_failed);
        assert_eq!(msg.msg_type, "initialUEMessage");
        assert_eq!(msg.tmsi.as_deref(), Some("deadbeef"));
        assert_eq!(msg.enb_ue_s1ap_id, Some(0x0102));
        assert_eq!(msg.ecgi, vec![0x11, 0x22, 0x33, 0xaa, 0xbb, 0xcc, 0xcd]);
        assert_eq!(msg.ecgi_plmn_identity, vec![0x11, 0x22, 0x33]);
        assert_eq!(msg.ecgi_cell_id, vec![0xaa, 0xbb, 0xcc, 0xcd]);
    }

    #[test]
    fn nas_pdu_imsi_flows_through() {
        // Identity response carrying IMSI 001010123456789.
        let nas = [
            0x07, 0x56, 0x08, 0x09, 0x10, 0x10, 0x10, 0x32, 0x54, 0x76, 0x98,
        ];
        let mut ie_value = vec![nas.len() as u8];
        ie_value.extend_from_slice(&nas);
        let bytes = build_pdu(
            0,
            13,
            &[(0, &[0x00, 0x00, 0x00, 0x4d]), (26, &ie_value)],
        );

        let msg = decode(&bytes);
        assert_eq!(msg.msg_type, "UplinkNASTransport");
        assert_eq!(msg.imsi.as_deref(), Some("001010123456789"));
        assert_eq!(msg.mme_ue_s1ap_id, Some(77));
    }

    #[test]
    fn context_setup_response_teids() {
        // One E-RABSetupItemCtxtSURes with TEID 0x00010203.
        let mut item = vec![0x05];
        item.push(32); // transport address bits
        item.extend_from_slice(&[0x0a, 0x00, 0x00, 0x01]);
        item.extend_from_slice(&0x0001_0203u32.to_be_bytes());
        let mut list = vec![0x00, 0x00, 0x32, 0x00];
        list.push(item.len() as u8);
        list.extend_from_slice(&item);

        let bytes = build_pdu(1, 9, &[(51, &list)]);
        let msg = decode(&bytes);
        assert_eq!(msg.msg_type, "InitialContextSetupResponse");
        assert_eq!(msg.teids, vec![0x0001_0203]);
    }

    #[test]
    fn decode_is_idempotent() {
        let bytes = build_pdu(
            0,
            12,
            &[
                (8, &[0x00, 0x00, 0x07]),
                (96, &[0x00, 0xde, 0xad, 0xbe, 0xef]),
            ],
        );
        let first = decode(&bytes);
        let second = decode(&bytes);
        assert_eq!(first, second);
        assert!(!first.decoded_tree.is_empty());
    }

    #[test]
    fn ue_context_release_complete_classification() {
        let bytes = build_pdu(1, 23, &[(99, &[0, 0, 0, 77, 0, 1, 2, 3])]);
        let msg = decode(&bytes);
        assert_eq!(msg.msg_type, "UEContextReleaseComplete");
        assert_eq!(msg.procedure_code, 23);
        assert_eq!(msg.mme_ue_s1ap_id, Some(77));
        assert_eq!(msg.enb_ue_s1ap_id, Some(0x00010203));
    }
}
