//! UTF-16LE helpers for the strings Windows hands back in raw buffers.

/// Decodes little-endian UTF-16 bytes, stopping at the first NUL.
///
/// A trailing odd byte is ignored; unpaired surrogates become U+FFFD.
pub fn decode_utf16le(bytes: &[u8]) -> String {
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .take_while(|&unit| unit != 0)
        .collect();
    String::from_utf16_lossy(&units)
}

/// Encodes `s` as little-endian UTF-16 followed by a NUL terminator.
pub fn encode_utf16le_nul(s: &str) -> Vec<u8> {
    s.encode_utf16()
        .chain(std::iter::once(0))
        .flat_map(u16::to_le_bytes)
        .collect()
}

/// NUL-terminated wide string for passing to `*W` APIs.
pub fn to_wide_nul(s: &str) -> Vec<u16> {
    s.encode_utf16().chain(std::iter::once(0)).collect()
}

/// Splits a REG_MULTI_SZ payload into its strings.
///
/// Empty entries (including the final double NUL) are skipped.
pub fn split_multi_sz(bytes: &[u8]) -> Vec<String> {
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .collect();
    units
        .split(|&unit| unit == 0)
        .filter(|s| !s.is_empty())
        .map(String::from_utf16_lossy)
        .collect()
}
