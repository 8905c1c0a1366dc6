//! The radio driver interface (spec.md §1 "Radio driver").
//!
//! The driver itself (serial/BLE/TCP transport, firmware command codec)
//! is an external collaborator, out of scope per spec.md's non-goals —
//! this trait names only the surface the gateway daemon depends on: an
//! async connect, the small firmware command set, a mutable contacts
//! table, and `is_connected`. A production implementation lives outside
//! this crate; tests use an in-memory fake.

use async_trait::async_trait;
use thiserror::Error;

use crate::contact::{Contact, ContactTable, PublicKey};
use crate::event::RadioEvent;

#[derive(Debug, Error)]
pub enum RadioError {
    #[error("radio not connected")]
    NotConnected,
    #[error("send timed out")]
    SendTimeout,
    #[error("no event received from device")]
    NoEvent,
    #[error("contact not found: {0}")]
    ContactNotFound(String),
    #[error("transport error: {0}")]
    Transport(String),
}

/// Outcome of a send that may have been retried by the driver
/// (spec.md §4.4 "Replies" — `send_msg_with_retry`).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SendOutcome {
    pub success: bool,
    pub attempts: u32,
}

/// The firmware command set and event bus a connected MeshCore radio
/// exposes (spec.md §1).
#[async_trait]
pub trait RadioDriver: Send + Sync {
    async fn connect(&self) -> Result<(), RadioError>;

    fn is_connected(&self) -> bool;

    /// Subscribe to the typed event bus. Each call yields an independent
    /// receiver (broadcast semantics), matching the Python pub/sub model.
    fn subscribe(&self) -> tokio::sync::broadcast::Receiver<RadioEvent>;

    async fn send_msg(&self, contact: &PublicKey, content: &str) -> Result<bool, RadioError>;

    /// Retry-aware send (spec.md §4.4): retries up to `max_attempts`
    /// total, switching to flood routing after `flood_after` attempts,
    /// capped at `max_flood_attempts` flood retries.
    async fn send_msg_with_retry(
        &self,
        contact: &PublicKey,
        content: &str,
        max_attempts: u32,
        max_flood_attempts: u32,
        flood_after: u32,
    ) -> Result<SendOutcome, RadioError> {
        let mut attempts = 0u32;
        let mut flood_attempts = 0u32;
        loop {
            attempts += 1;
            let use_flood = attempts > flood_after;
            if use_flood {
                flood_attempts += 1;
            }
            match self.send_msg(contact, content).await {
                Ok(true) => return Ok(SendOutcome { success: true, attempts }),
                _ => {
                    let exhausted_direct = attempts >= max_attempts;
                    let exhausted_flood = use_flood && flood_attempts >= max_flood_attempts;
                    if exhausted_direct || exhausted_flood {
                        return Ok(SendOutcome { success: false, attempts });
                    }
                }
            }
        }
    }

    async fn send_chan_msg(&self, channel_index: u8, content: &str) -> Result<bool, RadioError>;

    async fn send_advert(&self, flood: bool) -> Result<bool, RadioError>;

    async fn get_time(&self) -> Result<i64, RadioError>;

    async fn set_time(&self, unix_time: i64) -> Result<(), RadioError>;

    async fn set_name(&self, name: &str) -> Result<(), RadioError>;

    async fn add_contact(&self, contact: Contact) -> Result<(), RadioError>;

    async fn get_contact_by_name(&self, name: &str) -> Option<Contact>;

    /// A mutable view of the device contact table (spec.md §1, §4.8).
    fn contacts(&self) -> &parking_lot::RwLock<ContactTable>;
}

/// A placeholder driver for a `[Connection] type` the running binary
/// has no concrete transport linked for. The serial/BLE/TCP transport
/// and the firmware command codec are named non-goals (spec.md §1
/// "Radio driver"); nothing in this repo fabricates them. `connect()`
/// always fails, which the daemon treats as the spec's fatal "Loss of
/// radio after timeout on connect" condition (spec.md §7 "Fatal
/// conditions") rather than a panic.
pub struct UnconfiguredDriver {
    radio_type: String,
    contacts: parking_lot::RwLock<ContactTable>,
}

impl UnconfiguredDriver {
    pub fn new(radio_type: impl Into<String>) -> Self {
        Self { radio_type: radio_type.into(), contacts: parking_lot::RwLock::new(ContactTable::new()) }
    }
}

#[async_trait]
impl RadioDriver for UnconfiguredDriver {
    async fn connect(&self) -> Result<(), RadioError> {
        Err(RadioError::Transport(format!(
            "no radio driver linked for connection type '{}' — the transport is an external collaborator (spec.md §1)",
            self.radio_type
        )))
    }

    fn is_connected(&self) -> bool {
        false
    }

    fn subscribe(&self) -> tokio::sync::broadcast::Receiver<RadioEvent> {
        tokio::sync::broadcast::channel(1).1
    }

    async fn send_msg(&self, _contact: &PublicKey, _content: &str) -> Result<bool, RadioError> {
        Err(RadioError::NotConnected)
    }

    async fn send_chan_msg(&self, _channel_index: u8, _content: &str) -> Result<bool, RadioError> {
        Err(RadioError::NotConnected)
    }

    async fn send_advert(&self, _flood: bool) -> Result<bool, RadioError> {
        Err(RadioError::NotConnected)
    }

    async fn get_time(&self) -> Result<i64, RadioError> {
        Err(RadioError::NotConnected)
    }

    async fn set_time(&self, _unix_time: i64) -> Result<(), RadioError> {
        Err(RadioError::NotConnected)
    }

    async fn set_name(&self, _name: &str) -> Result<(), RadioError> {
        Err(RadioError::NotConnected)
    }

    async fn add_contact(&self, _contact: Contact) -> Result<(), RadioError> {
        Err(RadioError::NotConnected)
    }

    async fn get_contact_by_name(&self, _name: &str) -> Option<Contact> {
        None
    }

    fn contacts(&self) -> &parking_lot::RwLock<ContactTable> {
        &self.contacts
    }
}

#[cfg(test)]
pub mod fake {
    use super::*;
    use parking_lot::RwLock;
    use tokio::sync::broadcast;

    /// An in-memory fake radio driver for dispatcher/handler tests.
    pub struct FakeRadio {
        connected: std::sync::atomic::AtomicBool,
        tx: broadcast::Sender<RadioEvent>,
        contacts: RwLock<ContactTable>,
        pub sent_dms: RwLock<Vec<(String, String)>>,
        pub sent_channel: RwLock<Vec<(u8, String)>>,
    }

    impl FakeRadio {
        pub fn new() -> Self {
            let (tx, _) = broadcast::channel(256);
            Self {
                connected: std::sync::atomic::AtomicBool::new(true),
                tx,
                contacts: RwLock::new(ContactTable::new()),
                sent_dms: RwLock::new(Vec::new()),
                sent_channel: RwLock::new(Vec::new()),
            }
        }

        pub fn emit(&self, event: RadioEvent) {
            let _ = self.tx.send(event);
        }
    }

    impl Default for FakeRadio {
        fn default() -> Self {
            Self::new()
        }
    }

    #[async_trait]
    impl RadioDriver for FakeRadio {
        async fn connect(&self) -> Result<(), RadioError> {
            self.connected.store(true, std::sync::atomic::Ordering::SeqCst);
            Ok(())
        }

        fn is_connected(&self) -> bool {
            self.connected.load(std::sync::atomic::Ordering::SeqCst)
        }

        fn subscribe(&self) -> broadcast::Receiver<RadioEvent> {
            self.tx.subscribe()
        }

        async fn send_msg(&self, contact: &PublicKey, content: &str) -> Result<bool, RadioError> {
            self.sent_dms.write().push((contact.0.clone(), content.to_string()));
            Ok(true)
        }

        async fn send_chan_msg(&self, channel_index: u8, content: &str) -> Result<bool, RadioError> {
            self.sent_channel.write().push((channel_index, content.to_string()));
            Ok(true)
        }

        async fn send_advert(&self, _flood: bool) -> Result<bool, RadioError> {
            Ok(true)
        }

        async fn get_time(&self) -> Result<i64, RadioError> {
            Ok(0)
        }

        async fn set_time(&self, _unix_time: i64) -> Result<(), RadioError> {
            Ok(())
        }

        async fn set_name(&self, _name: &str) -> Result<(), RadioError> {
            Ok(())
        }

        async fn add_contact(&self, contact: Contact) -> Result<(), RadioError> {
            self.contacts.write().insert(contact);
            Ok(())
        }

        async fn get_contact_by_name(&self, name: &str) -> Option<Contact> {
            self.contacts.read().get_by_name(name).cloned()
        }

        fn contacts(&self) -> &RwLock<ContactTable> {
            &self.contacts
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fake::FakeRadio;
    use super::*;

    #[tokio::test]
    async fn retry_send_stops_after_max_attempts_when_always_failing() {
        struct AlwaysFails(FakeRadio);

        #[async_trait]
        impl RadioDriver for AlwaysFails {
            async fn connect(&self) -> Result<(), RadioError> {
                self.0.connect().await
            }
            fn is_connected(&self) -> bool {
                self.0.is_connected()
            }
            fn subscribe(&self) -> tokio::sync::broadcast::Receiver<RadioEvent> {
                self.0.subscribe()
            }
            async fn send_msg(&self, _c: &PublicKey, _content: &str) -> Result<bool, RadioError> {
                Ok(false)
            }
            async fn send_chan_msg(&self, i: u8, c: &str) -> Result<bool, RadioError> {
                self.0.send_chan_msg(i, c).await
            }
            async fn send_advert(&self, f: bool) -> Result<bool, RadioError> {
                self.0.send_advert(f).await
            }
            async fn get_time(&self) -> Result<i64, RadioError> {
                Ok(0)
            }
            async fn set_time(&self, _t: i64) -> Result<(), RadioError> {
                Ok(())
            }
            async fn set_name(&self, _n: &str) -> Result<(), RadioError> {
                Ok(())
            }
            async fn add_contact(&self, c: Contact) -> Result<(), RadioError> {
                self.0.add_contact(c).await
            }
            async fn get_contact_by_name(&self, n: &str) -> Option<Contact> {
                self.0.get_contact_by_name(n).await
            }
            fn contacts(&self) -> &parking_lot::RwLock<ContactTable> {
                self.0.contacts()
            }
        }

        let radio = AlwaysFails(FakeRadio::new());
        let pk = PublicKey("aa".repeat(32));
        let outcome = radio
            .send_msg_with_retry(&pk, "hi", 3, 1, 2)
            .await
            .unwrap();
        assert!(!outcome.success);
        assert_eq!(outcome.attempts, 3);
    }

    #[tokio::test]
    async fn fake_radio_records_sent_messages() {
        let radio = FakeRadio::new();
        let pk = PublicKey("bb".repeat(32));
        assert!(radio.send_msg(&pk, "hello").await.unwrap());
        assert_eq!(radio.sent_dms.read().len(), 1);
    }
}
