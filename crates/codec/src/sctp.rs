//! SCTP payload extraction.
//!
//! Given a raw Ethernet frame, walks Ethernet (+ optional VLAN tag), IPv4 or
//! IPv6 (+ extension headers) and the SCTP chunk list, returning the payload
//! of every DATA chunk whose payload protocol identifier is 18 (S1AP).

const IP_PROTO_SCTP: u8 = 132;
const SCTP_CHUNK_DATA: u8 = 0;
const S1AP_PPID: u32 = 18;

/// Extract every S1AP payload carried in `packet`, in wire order.
pub fn extract_all(packet: &[u8]) -> Vec<Vec<u8>> {
    let mut payloads = Vec::new();
    let Some(sctp_offset) = locate_sctp(packet) else {
        return payloads;
    };

    // Skip the 12-byte SCTP common header, then walk 4-byte-aligned chunks.
    let mut offset = sctp_offset + 12;
    while offset + 4 <= packet.len() {
        let chunk_type = packet[offset];
        let chunk_len = u16::from_be_bytes([packet[offset + 2], packet[offset + 3]]) as usize;
        if chunk_len < 4 || offset + chunk_len > packet.len() {
            break;
        }

        // DATA chunk: type(1) flags(1) length(2) TSN(4) stream(2) seq(2)
        // PPID(4) then user data.
        if chunk_type == SCTP_CHUNK_DATA && chunk_len >= 16 {
            let ppid = u32::from_be_bytes([
                packet[offset + 12],
                packet[offset + 13],
                packet[offset + 14],
                packet[offset + 15],
            ]);
            if ppid == S1AP_PPID {
                let start = offset + 16;
                let end = offset + chunk_len;
                if end > start && end <= packet.len() {
                    payloads.push(packet[start..end].to_vec());
                }
            }
        }

        let pad = (4 - (chunk_len % 4)) % 4;
        offset += chunk_len + pad;
    }

    payloads
}

/// Convenience for sources that carry one PDU per packet.
pub fn extract_first(packet: &[u8]) -> Option<Vec<u8>> {
    extract_all(packet).into_iter().next()
}

/// Walk the link and network layers; return the offset of the SCTP common
/// header, or `None` when the packet does not carry SCTP.
fn locate_sctp(packet: &[u8]) -> Option<usize> {
    if packet.len() < 14 {
        return None;
    }

    let mut eth_type = u16::from_be_bytes([packet[12], packet[13]]);
    let mut offset = 14;

    // 802.1Q / 802.1ad VLAN tag.
    if (eth_type == 0x8100 || eth_type == 0x88a8) && packet.len() >= offset + 4 {
        eth_type = u16::from_be_bytes([packet[offset + 2], packet[offset + 3]]);
        offset += 4;
    }

    let protocol;
    match eth_type {
        0x0800 => {
            // IPv4: honor the IHL field.
            if packet.len() < offset + 20 || (packet[offset] >> 4) != 4 {
                return None;
            }
            let ihl = ((packet[offset] & 0x0f) as usize) * 4;
            if packet.len() < offset + ihl {
                return None;
            }
            protocol = packet[offset + 9];
            offset += ihl;
        }
        0x86dd => {
            // IPv6 with a bounded extension-header walk.
            if packet.len() < offset + 40 || (packet[offset] >> 4) != 6 {
                return None;
            }
            let mut next_header = packet[offset + 6];
            offset += 40;
            let mut hops = 0;
            while next_header != IP_PROTO_SCTP && hops < 8 && offset < packet.len() {
                match next_header {
                    0 | 43 | 44 | 60 => {
                        if packet.len() < offset + 8 {
                            return None;
                        }
                        let ext_len = (packet[offset + 1] as usize + 1) * 8;
                        if packet.len() < offset + ext_len {
                            return None;
                        }
                        next_header = packet[offset];
                        offset += ext_len;
                        hops += 1;
                    }
                    _ => break,
                }
            }
            protocol = next_header;
        }
        _ => return None,
    }

    if protocol != IP_PROTO_SCTP || packet.len() < offset + 12 {
        return None;
    }
    Some(offset)
}
