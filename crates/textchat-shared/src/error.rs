use thiserror::Error;

/// A bearer token that cannot be parsed into the expected claims shape.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("Invalid token: expected 3 dot-separated segments, got {0}")]
    SegmentCount(usize),

    #[error("Invalid token: payload segment is not valid base64url")]
    Base64,

    #[error("Invalid token: payload is not a JSON claims object: {0}")]
    Claims(String),

    #[error("Invalid token: missing or non-numeric `exp` claim")]
    MissingExpiry,
}

/// An inbound realtime frame that could not be decoded.
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("Frame is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Binary frames are not supported ({0} bytes)")]
    Binary(usize),
}
