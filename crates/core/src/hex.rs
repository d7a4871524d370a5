//! Lowercase hex encoding used throughout the pipeline.
//!
//! IE values, TMSIs and ECGIs all travel as lowercase hex strings; keeping
//! the conversion in one place keeps the rendering consistent.

/// Encode bytes as a lowercase hex string.
pub fn encode(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        out.push_str(&format!("{:02x}", b));
    }
    out
}

/// Decode a hex string into bytes. Whitespace and `:`/`-` separators are
/// tolerated; a trailing lone nibble and invalid pairs are dropped.
pub fn decode(hex: &str) -> Vec<u8> {
    let clean: Vec<u8> = hex
        .bytes()
        .filter(|b| !b.is_ascii_whitespace() && *b != b':' && *b != b'-')
        .collect();
    let mut out = Vec::with_capacity(clean.len() / 2);
    for pair in clean.chunks_exact(2) {
        let hi = (pair[0] as char).to_digit(16);
        let lo = (pair[1] as char).to_digit(16);
        if let (Some(hi), Some(lo)) = (hi, lo) {
            out.push(((hi << 4) | lo) as u8);
        }
    }
    out
}

/// Parse a hex string (optionally `0x`-prefixed) as a big-endian u32.
pub fn parse_u32(hex: &str) -> Option<u32> {
    let trimmed = hex.strip_prefix("0x").unwrap_or(hex);
    if trimmed.is_empty() || trimmed.len() > 8 {
        return None;
    }
    u32::from_str_radix(trimmed, 16).ok()
}
