//! E-RAB item list decoding.
//!
//! Two IE bodies carry GTP TEIDs: `E-RABSetupListCtxtSURes` (the context
//! setup response) and `E-RABToBeSetupListCtxtSUReq` (the request, whose
//! items additionally embed an optional NAS-PDU). Both are SEQUENCEs of
//! ProtocolIE-SingleContainer with a SIZE(1..maxNrOfE-RABs) count.

use crate::per;

/// One decoded E-RABSetupItemCtxtSURes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErabSetupItem {
    /// E-RAB-ID (0..15), carried in a full byte.
    pub e_rab_id: u8,
    /// TransportLayerAddress BIT STRING, rounded up to bytes.
    pub transport_layer_address: Vec<u8>,
    /// GTP-TEID, fixed 4-byte OCTET STRING, big-endian.
    pub gtp_teid: u32,
    pub has_extensions: bool,
}

/// One decoded E-RABToBeSetupItemCtxtSUReq (the fields this pipeline uses).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErabToBeSetupItem {
    pub e_rab_id: u8,
    pub gtp_teid: u32,
    /// Embedded NAS message, when the optional nAS-PDU field is present.
    pub nas_pdu: Option<Vec<u8>>,
}

/// Decode an `E-RABSetupListCtxtSURes` IE body.
///
/// Item layout: e-RAB-ID byte, transportLayerAddress (bit-length
/// determinant then ceil(bits/8) bytes), gTP-TEID (4 bytes), optional
/// iE-Extensions consuming the remainder of the item value.
pub fn decode_setup_list(bytes: &[u8]) -> Vec<ErabSetupItem> {
    let mut items = Vec::new();
    let Some((num_items, consumed)) = per::read_erab_count(bytes, 0) else {
        return items;
    };
    let mut offset = consumed;

    for _ in 0..num_items {
        // ProtocolIE-SingleContainer: 2-byte id (50), criticality, value.
        if offset + 3 > bytes.len() {
            break;
        }
        let ie_id = u16::from_be_bytes([bytes[offset], bytes[offset + 1]]);
        offset += 3;
        if ie_id != 50 {
            log::debug!("unexpected item id {} in E-RABSetupListCtxtSURes", ie_id);
        }

        let Some((value_len, consumed)) = per::read_length(bytes, offset) else {
            break;
        };
        offset += consumed;
        let item_end = offset + value_len;
        if item_end > bytes.len() {
            break;
        }

        let Some(item) = decode_setup_item(&bytes[offset..item_end]) else {
            break;
        };
        items.push(item);
        offset = item_end;
    }

    items
}

fn decode_setup_item(value: &[u8]) -> Option<ErabSetupItem> {
    let mut offset = 0;
    let e_rab_id = *value.get(offset)?;
    offset += 1;

    let (bit_len, consumed) = per::read_length(value, offset)?;
    offset += consumed;
    let addr_bytes = (bit_len + 7) / 8;
    let transport_layer_address = value.get(offset..offset + addr_bytes)?.to_vec();
    offset += addr_bytes;

    let gtp_teid = per::read_u32_be(value, offset)?;
    offset += 4;

    Some(ErabSetupItem {
        e_rab_id,
        transport_layer_address,
        gtp_teid,
        has_extensions: offset < value.len(),
    })
}

/// Decode an `E-RABToBeSetupListCtxtSUReq` IE body.
///
/// Item layout (id 52): e-RAB-ID byte, e-RABlevelQoSParameters (LV),
/// transportLayerAddress (BIT STRING), gTP-TEID (4 bytes), then the
/// optional nAS-PDU as a length-delimited OCTET STRING.
pub fn decode_to_be_setup_list(bytes: &[u8]) -> Vec<ErabToBeSetupItem> {
    let mut items = Vec::new();
    let Some((num_items, consumed)) = per::read_erab_count(bytes, 0) else {
        return items;
    };
    let mut offset = consumed;

    for _ in 0..num_items {
        if offset + 3 > bytes.len() {
            break;
        }
        let ie_id = u16::from_be_bytes([bytes[offset], bytes[offset + 1]]);
        offset += 3;

        let Some((value_len, consumed)) = per::read_length(bytes, offset) else {
            break;
        };
        offset += consumed;
        let item_end = offset + value_len;
        if item_end > bytes.len() {
            break;
        }

        if ie_id == 52 {
            if let Some(item) = decode_to_be_setup_item(&bytes[offset..item_end]) {
                items.push(item);
            }
        }
        offset = item_end;
    }

    items
}

fn decode_to_be_setup_item(value: &[u8]) -> Option<ErabToBeSetupItem> {
    let mut offset = 0;
    let e_rab_id = *value.get(offset)?;
    offset += 1;

    // e-RABlevelQoSParameters: length-delimited, skipped.
    let (qos_len, consumed) = per::read_length(value, offset)?;
    offset += consumed + qos_len;
    if offset > value.len() {
        return None;
    }

    // transportLayerAddress: bit-length determinant.
    let (bit_len, consumed) = per::read_length(value, offset)?;
    offset += consumed + (bit_len + 7) / 8;
    if offset > value.len() {
        return None;
    }

    let gtp_teid = per::read_u32_be(value, offset)?;
    offset += 4;

    let nas_pdu = if offset < value.len() {
        let (nas_len, consumed) = per::read_length(value, offset)?;
        let start = offset + consumed;
        value.get(start..start + nas_len).map(|b| b.to_vec())
    } else {
        None
    };

    Some(ErabToBeSetupItem {
        e_rab_id,
        gtp_teid,
        nas_pdu,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn container(ie_id: u16, value: &[u8]) -> Vec<u8> {
        let mut out = ie_id.to_be_bytes().to_vec();
        out.push(0x00); // criticality: reject
        out.push(value.len() as u8);
        out.extend_from_slice(value);
        out
    }

    fn setup_item_value(e_rab_id: u8, addr: &[u8], teid: u32) -> Vec<u8> {
        let mut value = vec![e_rab_id];
        value.push((addr.len() * 8) as u8); // bit length, short form
        value.extend_from_slice(addr);
        value.extend_from_slice(&teid.to_be_bytes());
        value
    }

    #[test]
    fn decodes_single_setup_item() {
        let item = setup_item_value(5, &[0x0a, 0x00, 0x00, 0x01], 0x0000_1234);
        let mut list = vec![0x00]; // count - 1 = 0 -> one item
        list.extend(container(50, &item));

        let items = decode_setup_list(&list);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].e_rab_id, 5);
        assert_eq!(items[0].transport_layer_address, vec![0x0a, 0x00, 0x00, 0x01]);
        assert_eq!(items[0].gtp_teid, 0x1234);
        assert!(!items[0].has_extensions);
    }

    #[test]
    fn decodes_multiple_items_and_extensions() {
        let mut item2 = setup_item_value(6, &[0x0a, 0x00, 0x00, 0x02], 77);
        item2.extend_from_slice(&[0xff, 0xff]); // trailing iE-Extensions
        let mut list = vec![0x01]; // two items
        list.extend(container(50, &setup_item_value(5, &[0x0a], 1)));
        list.extend(container(50, &item2));

        let items = decode_setup_list(&list);
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].gtp_teid, 1);
        assert_eq!(items[1].gtp_teid, 77);
        assert!(items[1].has_extensions);
    }

    #[test]
    fn truncated_item_stops_cleanly() {
        let mut list = vec![0x01];
        list.extend(container(50, &setup_item_value(5, &[0x0a], 9)));
        // Second container claims more bytes than remain.
        list.extend_from_slice(&[0x00, 0x32, 0x00, 0x7f, 0x01]);

        let items = decode_setup_list(&list);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].gtp_teid, 9);
    }

    #[test]
    fn to_be_setup_item_with_nas() {
        let nas = [0x07, 0x41, 0x01, 0x08, 0x09, 0x10, 0x10, 0x00, 0x00, 0x00, 0x00];
        let mut value = vec![0x09]; // e-RAB-ID
        value.push(3); // QoS length
        value.extend_from_slice(&[0x45, 0x00, 0x00]);
        value.push(32); // transport address: 32 bits
        value.extend_from_slice(&[0x0a, 0x00, 0x00, 0x03]);
        value.extend_from_slice(&0xcafe_f00du32.to_be_bytes());
        value.push(nas.len() as u8);
        value.extend_from_slice(&nas);

        let mut list = vec![0x00];
        list.extend(container(52, &value));

        let items = decode_to_be_setup_list(&list);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].gtp_teid, 0xcafe_f00d);
        assert_eq!(items[0].nas_pdu.as_deref(), Some(&nas[..]));
    }

    #[test]
    fn to_be_setup_item_without_nas() {
        let mut value = vec![0x01];
        value.push(0); // empty QoS
        value.push(8); // 8-bit transport address
        value.push(0x0a);
        value.extend_from_slice(&7u32.to_be_bytes());

        let mut list = vec![0x00];
        list.extend(container(52, &value));

        let items = decode_to_be_setup_list(&list);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].gtp_teid, 7);
        assert_eq!(items[0].nas_pdu, None);
    }

    #[test]
    fn foreign_item_id_skipped() {
        let mut list = vec![0x00];
        list.extend(container(17, &[0x01, 0x02]));
        assert!(decode_to_be_setup_list(&list).is_empty());
    }

    #[test]
    fn empty_input() {
        assert!(decode_setup_list(&[]).is_empty());
        assert!(decode_to_be_setup_list(&[]).is_empty());
    }
}
