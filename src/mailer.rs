//! Outgoing email.

mod memory;
mod smtp;
pub mod templates;

use async_trait::async_trait;
use std::fmt::Debug;
use thiserror::Error;

#[cfg(test)]
pub use memory::RecordingMailer;
pub use memory::LogMailer;
pub use smtp::SmtpMailer;

/// A rendered HTML email.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub html: String,
}

/// What the transport reported for an accepted message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SendReceipt {
    pub message_id: Option<String>,
}

#[derive(Debug, Error)]
pub enum MailError {
    #[error("invalid address {address:?}: {reason}")]
    Address { address: String, reason: String },
    #[error("mailer configuration error: {0}")]
    Config(String),
    #[error("failed to build email: {0}")]
    Build(String),
    #[error("SMTP transport error: {0}")]
    Transport(String),
    #[error("message rejected by server: {0}")]
    Rejected(String),
}

#[async_trait]
pub trait Mailer: Send + Sync + Debug {
    async fn send(&self, message: EmailMessage) -> Result<SendReceipt, MailError>;
}
