/// Errors that can occur while decoding a datagram payload.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WireError {
    /// The payload length is not a whole number of 8-byte values.
    #[error("malformed payload: {len} bytes is not a multiple of 8")]
    Framing { len: usize },
}

pub type Result<T> = std::result::Result<T, WireError>;
