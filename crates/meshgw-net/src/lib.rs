//! Radio-facing types for the MeshCore gateway bot.
//!
//! Everything a connected radio device needs to be represented as
//! (spec.md §1 "Radio driver"): the typed event bus, the mutable
//! contact table, and outbound frame encoding. The driver
//! implementation itself (serial/BLE/TCP transport, firmware command
//! codec) is an external collaborator and out of scope.
//!
//! # Modules
//!
//! - [`contact`]: device contact table (`Contact`, `ContactTable`, `PublicKey`).
//! - [`event`]: typed radio event bus (`RadioEvent` and its variants).
//! - [`framing`]: outbound MeshCore v1 frame encoding.
//! - [`transport`]: the `RadioDriver` trait and a test fake.

pub mod contact;
pub mod event;
pub mod framing;
pub mod transport;

pub use contact::{Contact, ContactTable, PublicKey};
pub use event::{ChannelMsgRecv, ContactMsgRecv, NewContactEvent, RadioEvent, RxLogEntry};
pub use framing::OutboundFrame;
pub use transport::{RadioDriver, RadioError, SendOutcome, UnconfiguredDriver};
