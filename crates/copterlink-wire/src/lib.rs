//! Wire codec for the multicopter control link.
//!
//! Every datagram on the link, in both directions, is a bare sequence of
//! IEEE-754 binary64 values:
//! - 8 bytes per value, little-endian
//! - no header, length prefix or checksum
//!
//! Payload length is therefore always a multiple of [`VALUE_SIZE`].

pub mod codec;
pub mod error;

pub use codec::{
    decode, decode_into, encode, encode_into, encoded_len, max_values, MAX_DATAGRAM_SIZE,
    VALUE_SIZE,
};
pub use error::{Result, WireError};
