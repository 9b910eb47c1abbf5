use async_trait::async_trait;
use lettre::message::{header::ContentType, Mailbox};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Address, AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::{debug, error, info, instrument};

use super::{EmailMessage, MailError, Mailer, SendReceipt};
use crate::config::SmtpSettings;

/// Port on which the relay speaks TLS from the first byte.
const IMPLICIT_TLS_PORT: u16 = 465;

/// Sends email through an authenticated SMTP relay.
#[derive(Clone)]
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    host: String,
}

impl std::fmt::Debug for SmtpMailer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpMailer")
            .field("host", &self.host)
            .field("from", &self.from.to_string())
            .finish()
    }
}

impl SmtpMailer {
    /// Builds the relay transport, or returns `None` when no host is set.
    ///
    /// The sender is the SMTP user, shown as `from_name`.
    pub fn from_settings(settings: &SmtpSettings) -> Result<Option<Self>, MailError> {
        let Some(host) = settings.host.as_deref().map(str::trim).filter(|h| !h.is_empty()) else {
            return Ok(None);
        };
        let user = settings
            .user
            .clone()
            .ok_or_else(|| MailError::Config("SMTP user must be set together with the host".to_string()))?;

        let address: Address = user.parse().map_err(|e: lettre::address::AddressError| MailError::Address {
            address: user.clone(),
            reason: e.to_string(),
        })?;
        let from = Mailbox::new(Some(settings.from_name.clone()), address);

        let builder = if settings.port == IMPLICIT_TLS_PORT {
            AsyncSmtpTransport::<Tokio1Executor>::relay(host)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
        }
        .map_err(|e| MailError::Config(e.to_string()))?
        .port(settings.port);

        let builder = match settings.password.as_ref() {
            Some(password) => builder.credentials(Credentials::new(user.clone(), password.clone())),
            None => builder,
        };

        debug!("Configured SMTP relay {}:{}", host, settings.port);
        Ok(Some(Self {
            transport: builder.build(),
            from,
            host: host.to_string(),
        }))
    }

    pub fn host(&self) -> &str {
        &self.host
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    #[instrument(skip(self, message), fields(to = %message.to, subject = %message.subject))]
    async fn send(&self, message: EmailMessage) -> Result<SendReceipt, MailError> {
        let to: Mailbox = message.to.parse().map_err(|e: lettre::address::AddressError| MailError::Address {
            address: message.to.clone(),
            reason: e.to_string(),
        })?;

        let email = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(message.subject)
            .header(ContentType::TEXT_HTML)
            .body(message.html)
            .map_err(|e| MailError::Build(e.to_string()))?;

        let response = self.transport.send(email).await.map_err(|e| {
            error!("SMTP delivery failed: {}", e);
            MailError::Transport(e.to_string())
        })?;

        if !response.is_positive() {
            return Err(MailError::Rejected(response.code().to_string()));
        }

        let message_id = response.message().next().map(str::to_string);
        info!("Email accepted by {}: {:?}", self.host, message_id);
        Ok(SendReceipt { message_id })
    }
}
