//! Outbound messaging-send abstraction.
//!
//! The verification flow only needs `send(destination, text)`; delivery
//! transport (messaging platform API, SMS gateway) lives behind the trait.
//! Send failures after a verified-state flip are soft: the flip stands and
//! the caller must not retry the mutation.

use anyhow::Result;
use tracing::info;

/// Message delivery abstraction consumed by the verification flow.
pub trait MessageSender: Send + Sync {
    /// Deliver a text to a phone-addressed destination.
    ///
    /// # Errors
    /// Returns an error when delivery fails; callers treat this as retryable
    /// for informational sends and as soft failure after state mutations.
    fn send(&self, destination: &str, text: &str) -> Result<()>;
}

/// Local dev sender that logs instead of calling the platform API.
#[derive(Clone, Debug)]
pub struct LogMessageSender;

impl MessageSender for LogMessageSender {
    fn send(&self, destination: &str, text: &str) -> Result<()> {
        info!(destination = %destination, text = %text, "message send stub");
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::MessageSender;
    use anyhow::Result;
    use std::sync::Mutex;

    /// Records sends so tests can assert on acknowledgement traffic.
    #[derive(Debug, Default)]
    pub struct RecordingSender {
        pub sent: Mutex<Vec<(String, String)>>,
    }

    impl MessageSender for RecordingSender {
        fn send(&self, destination: &str, text: &str) -> Result<()> {
            self.sent
                .lock()
                .expect("sender mutex poisoned")
                .push((destination.to_string(), text.to_string()));
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{LogMessageSender, MessageSender};

    #[test]
    fn log_sender_always_succeeds() {
        let sender = LogMessageSender;
        assert!(sender.send("15551234567", "Your code is X7K2M9").is_ok());
    }
}
