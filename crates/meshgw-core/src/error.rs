//! Error types for packet decoding and advert verification.

use thiserror::Error;

/// Result type alias using [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while decoding or validating MeshCore wire data.
///
/// These never cross the decoder boundary as panics: `decode()` itself
/// returns `Option<Packet>` and logs a `warn` on any of these, per
/// spec.md §4.1 ("Decoder never throws to callers"). The typed error is
/// kept around for callers (tests, the advert verifier) that want the
/// specific reason rather than a bare `None`.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum Error {
    #[error("raw hex frame too short: {len} bytes, need at least {min}")]
    FrameTooShort { len: usize, min: usize },

    #[error("odd-length hex string ({len} chars)")]
    OddLengthHex { len: usize },

    #[error("invalid hex digit in frame")]
    InvalidHex,

    #[error("unsupported payload version {0}")]
    UnsupportedPayloadVersion(u8),

    #[error("path_len {path_len} overruns buffer of {buf_len} bytes at offset {offset}")]
    PathOverrun {
        path_len: usize,
        buf_len: usize,
        offset: usize,
    },

    #[error("advert payload too short: {len} bytes, need at least 101")]
    AdvertTooShort { len: usize },

    #[error("advert signature verification failed")]
    InvalidSignature,

    #[error("advert public key is malformed")]
    InvalidPublicKey,

    #[error("trace payload too short for path hash preamble: {len} bytes, need at least 9")]
    TraceTooShort { len: usize },
}
