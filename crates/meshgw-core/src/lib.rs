//! Pure-computation core of the MeshCore gateway bot: wire-format
//! enumerations, the packet decoder, advert parsing/verification, and
//! packet hashing.
//!
//! No I/O and no `tokio` dependency — everything here is a suspension-free
//! function over bytes, safe to call from any async or sync context
//! (spec.md §5 "Pure parsing ... is non-suspending").
//!
//! # Modules
//!
//! - [`types`]: wire enumerations and decoded record types.
//! - [`decode`]: the packet decoder (`decode`, `try_decode`).
//! - [`advert`]: ADVERT payload parsing and Ed25519 signature verification.
//! - [`hash`]: echo-detection packet hashing.
//! - [`error`]: decode/validation error type.

pub mod advert;
pub mod decode;
pub mod error;
pub mod hash;
pub mod types;

pub use decode::{decode, try_decode};
pub use error::{Error, Result};
pub use types::*;
