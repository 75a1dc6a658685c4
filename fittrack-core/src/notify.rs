//! User-facing messages.
//!
//! The composition root creates one channel with [`channel`] and hands the
//! [`Notifier`] half to whichever component needs to report something to the
//! user. There is no process-wide message bus.

use serde::Serialize;
use std::fmt;
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageLevel {
    Info,
    Warning,
    Error,
}

impl fmt::Display for MessageLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageLevel::Info => write!(f, "info"),
            MessageLevel::Warning => write!(f, "warning"),
            MessageLevel::Error => write!(f, "error"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserMessage {
    pub level: MessageLevel,
    pub text: String,
}

impl fmt::Display for UserMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.level, self.text)
    }
}

/// Sending half. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Notifier {
    tx: mpsc::UnboundedSender<UserMessage>,
}

/// Receiving half, owned by whatever displays messages.
#[derive(Debug)]
pub struct Notifications {
    rx: mpsc::UnboundedReceiver<UserMessage>,
}

pub fn channel() -> (Notifier, Notifications) {
    let (tx, rx) = mpsc::unbounded_channel();
    (Notifier { tx }, Notifications { rx })
}

impl Notifier {
    pub fn send(&self, level: MessageLevel, text: impl Into<String>) {
        let message = UserMessage {
            level,
            text: text.into(),
        };
        // Nobody listening is fine.
        if self.tx.send(message).is_err() {
            tracing::debug!("Dropped user message, receiver is gone");
        }
    }

    pub fn info(&self, text: impl Into<String>) {
        self.send(MessageLevel::Info, text);
    }

    pub fn warn(&self, text: impl Into<String>) {
        self.send(MessageLevel::Warning, text);
    }

    pub fn error(&self, text: impl Into<String>) {
        self.send(MessageLevel::Error, text);
    }
}

impl Notifications {
    pub async fn recv(&mut self) -> Option<UserMessage> {
        self.rx.recv().await
    }

    /// Everything queued right now, without waiting.
    pub fn drain(&mut self) -> Vec<UserMessage> {
        let mut messages = Vec::new();
        while let Ok(message) = self.rx.try_recv() {
            messages.push(message);
        }
        messages
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drain_returns_messages_in_order() {
        let (notifier, mut notifications) = channel();
        notifier.info("synced");
        notifier.warn("sync failed");

        let messages = notifications.drain();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].level, MessageLevel::Info);
        assert_eq!(messages[1].to_string(), "[warning] sync failed");
        assert!(notifications.drain().is_empty());
    }

    #[test]
    fn test_send_without_receiver_does_not_panic() {
        let (notifier, notifications) = channel();
        drop(notifications);
        notifier.error("nobody hears this");
    }

    #[tokio::test]
    async fn test_recv_from_clone() {
        let (notifier, mut notifications) = channel();
        let clone = notifier.clone();
        clone.info("hello");
        let message = notifications.recv().await.unwrap();
        assert_eq!(message.text, "hello");
    }
}
