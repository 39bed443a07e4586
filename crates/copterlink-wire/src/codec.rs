use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{Result, WireError};

/// Size of one encoded value on the wire.
pub const VALUE_SIZE: usize = 8;

/// Largest UDP payload over IPv4: 65535 - 8 (UDP header) - 20 (IP header).
pub const MAX_DATAGRAM_SIZE: usize = 65_507;

/// Number of bytes `count` values occupy on the wire.
pub const fn encoded_len(count: usize) -> usize {
    count * VALUE_SIZE
}

/// Largest vector that still fits in a single datagram.
pub const fn max_values() -> usize {
    MAX_DATAGRAM_SIZE / VALUE_SIZE
}

/// Encode a vector of doubles into a new buffer.
///
/// Wire format:
/// ```text
/// ┌──────────────┬──────────────┬─────┬──────────────┐
/// │ value 0      │ value 1      │ ... │ value n-1    │
/// │ (8B f64 LE)  │ (8B f64 LE)  │     │ (8B f64 LE)  │
/// └──────────────┴──────────────┴─────┴──────────────┘
/// ```
///
/// Values are copied bit for bit, so NaN payloads and infinities survive.
pub fn encode(values: &[f64]) -> Bytes {
    let mut dst = BytesMut::with_capacity(encoded_len(values.len()));
    encode_into(values, &mut dst);
    dst.freeze()
}

/// Append the encoding of `values` to `dst`.
pub fn encode_into(values: &[f64], dst: &mut BytesMut) {
    dst.reserve(encoded_len(values.len()));
    for &value in values {
        dst.put_f64_le(value);
    }
}

/// Decode a datagram payload into a new vector.
pub fn decode(src: &[u8]) -> Result<Vec<f64>> {
    let mut values = Vec::with_capacity(src.len() / VALUE_SIZE);
    decode_into(src, &mut values)?;
    Ok(values)
}

/// Decode a datagram payload into `dst`, replacing its contents.
///
/// `dst` is left empty when the payload is malformed.
pub fn decode_into(src: &[u8], dst: &mut Vec<f64>) -> Result<()> {
    dst.clear();
    if src.len() % VALUE_SIZE != 0 {
        return Err(WireError::Framing { len: src.len() });
    }

    dst.reserve(src.len() / VALUE_SIZE);
    let mut buf = src;
    while buf.has_remaining() {
        dst.push(buf.get_f64_le());
    }
    Ok(())
}
