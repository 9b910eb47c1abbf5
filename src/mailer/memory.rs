use async_trait::async_trait;
use tracing::info;

use super::{EmailMessage, MailError, Mailer, SendReceipt};

/// Logs emails instead of delivering them.
#[derive(Debug, Clone, Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, message: EmailMessage) -> Result<SendReceipt, MailError> {
        info!(
            to = %message.to,
            subject = %message.subject,
            bytes = message.html.len(),
            "Email not sent, SMTP is not configured"
        );
        Ok(SendReceipt::default())
    }
}

#[cfg(test)]
pub use recording::RecordingMailer;
