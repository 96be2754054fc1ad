//! SMTP transport adapter.
//!
//! Every outgoing mail shows the list address as both `From` and `To`.
//! The real receivers only appear in the SMTP envelope, so subscribers
//! never see each other's addresses.

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Address, AsyncSmtpTransport, AsyncTransport, Tokio1Executor, address::Envelope};
use maillist_core::{MailSend, Message, SendError};
use tracing::{debug, info};

use crate::config::{Config, Security};

/// Sends list mail through an SMTP relay.
pub struct SmtpSend {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    list_address: Address,
    default_name: String,
}

impl std::fmt::Debug for SmtpSend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpSend")
            .field("list_address", &self.list_address)
            .field("default_name", &self.default_name)
            .finish_non_exhaustive()
    }
}

impl SmtpSend {
    /// Build the transport from the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the list address is invalid or TLS cannot be set
    /// up for the host.
    pub fn from_config(config: &Config) -> Result<Self, SendError> {
        let smtp = &config.smtp;
        let builder = match smtp.security {
            Security::Tls => AsyncSmtpTransport::<Tokio1Executor>::relay(&smtp.host),
            Security::StartTls => AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&smtp.host),
            Security::None => Ok(AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(
                &smtp.host,
            )),
        }
        .map_err(|e| SendError::Transport(e.to_string()))?;

        let mut builder = builder.port(smtp.effective_port());
        if let Some(user) = &smtp.user {
            builder = builder.credentials(Credentials::new(user.clone(), smtp.password.clone()));
        }

        debug!(
            "SMTP transport {}:{} ({})",
            smtp.host,
            smtp.effective_port(),
            smtp.security.display_name()
        );

        Ok(Self {
            transport: builder.build(),
            list_address: parse_address(&config.sender.address)?,
            default_name: config
                .sender
                .name
                .clone()
                .unwrap_or_else(|| config.sender.address.clone()),
        })
    }

    /// Render `message` as it goes over the wire, with its envelope.
    ///
    /// # Errors
    ///
    /// Returns an error if a receiver address is invalid or the message
    /// cannot be assembled.
    pub fn build(&self, message: &Message) -> Result<(Envelope, Vec<u8>), SendError> {
        let receivers = message
            .receivers
            .iter()
            .map(|r| parse_address(r))
            .collect::<Result<Vec<_>, _>>()?;
        let envelope = Envelope::new(Some(self.list_address.clone()), receivers)
            .map_err(|e| SendError::Build(e.to_string()))?;

        let name = if message.sender_name.is_empty() {
            self.default_name.clone()
        } else {
            message.sender_name.clone()
        };
        let mailbox = Mailbox::new(Some(name), self.list_address.clone());

        let email = lettre::Message::builder()
            .from(mailbox.clone())
            .to(mailbox)
            .subject(&message.subject)
            .multipart(body(message)?)
            .map_err(|e| SendError::Build(e.to_string()))?;

        Ok((envelope, email.formatted()))
    }
}

#[async_trait]
impl MailSend for SmtpSend {
    async fn send(&self, message: &Message) -> Result<(), SendError> {
        let (envelope, email) = self.build(message)?;
        self.transport
            .send_raw(&envelope, &email)
            .await
            .map_err(|e| SendError::Transport(e.to_string()))?;
        info!(
            "Sent {:?} to {} receiver(s)",
            message.subject,
            message.receivers.len()
        );
        Ok(())
    }
}

fn parse_address(address: &str) -> Result<Address, SendError> {
    address.trim().parse().map_err(|e: lettre::address::AddressError| SendError::Address {
        address: address.to_string(),
        reason: e.to_string(),
    })
}

/// Text and HTML become `multipart/alternative`, wrapped in
/// `multipart/mixed` together with the attachments.
fn body(message: &Message) -> Result<MultiPart, SendError> {
    let content = match (message.text.is_empty(), message.html.is_empty()) {
        (false, false) => MultiPart::alternative_plain_html(message.text.clone(), message.html.clone()),
        (true, false) => MultiPart::mixed().singlepart(SinglePart::html(message.html.clone())),
        _ => MultiPart::mixed().singlepart(SinglePart::plain(message.text.clone())),
    };

    let mut mixed = MultiPart::mixed().multipart(content);
    for attachment in &message.attachments {
        let content_type = ContentType::parse(&attachment.mimetype)
            .map_err(|e| SendError::Build(format!("{}: {e}", attachment.filename)))?;
        mixed = mixed.singlepart(
            Attachment::new(attachment.filename.clone()).body(attachment.data.clone(), content_type),
        );
    }
    Ok(mixed)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::config::{SenderConfig, SmtpConfig};

    fn sender() -> SmtpSend {
        let config = Config {
            smtp: SmtpConfig {
                host: "localhost".to_string(),
                security: Security::None,
                ..SmtpConfig::default()
            },
            sender: SenderConfig {
                address: "list@example.com".to_string(),
                name: Some("Rust Friends".to_string()),
            },
            ..Config::default()
        };
        SmtpSend::from_config(&config).unwrap()
    }

    fn rendered(message: &Message) -> (Envelope, String) {
        let (envelope, raw) = sender().build(message).unwrap();
        (envelope, String::from_utf8(raw).unwrap())
    }

    fn header<'a>(raw: &'a str, name: &str) -> &'a str {
        raw.lines()
            .find(|line| line.starts_with(&format!("{name}: ")))
            .unwrap()
    }

    #[tokio::test]
    async fn test_receivers_are_blind() {
        let mut message = Message::to("a@example.com", "Hello").text("Hi");
        message.receivers.push("b@example.com".to_string());
        message.sender_name = "Alice".to_string();

        let (envelope, raw) = rendered(&message);

        assert_eq!(envelope.to().len(), 2);
        assert_eq!(envelope.from().unwrap().to_string(), "list@example.com");
        assert!(header(&raw, "From").contains("Alice"));
        assert!(header(&raw, "From").contains("<list@example.com>"));
        assert!(header(&raw, "To").contains("<list@example.com>"));
        assert!(!raw.contains("a@example.com"));
        assert!(!raw.contains("b@example.com"));
    }

    #[tokio::test]
    async fn test_empty_sender_name_uses_configured_name() {
        let message = Message::to("a@example.com", "Welcome!").text("Hi");

        let (_, raw) = rendered(&message);

        let from = header(&raw, "From");
        assert!(from.contains("Rust Friends"));
        assert!(from.contains("<list@example.com>"));
    }

    #[tokio::test]
    async fn test_body_parts_and_attachments() {
        let mut message = Message::to("a@example.com", "Report")
            .text("Plain")
            .html("<p>HTML</p>");
        message.attachments.push(maillist_core::Attachment {
            filename: "report.pdf".to_string(),
            mimetype: "application/pdf".to_string(),
            data: b"%PDF-".to_vec(),
        });

        let (_, raw) = rendered(&message);

        assert!(raw.contains("multipart/mixed"));
        assert!(raw.contains("multipart/alternative"));
        assert!(raw.contains("text/plain"));
        assert!(raw.contains("text/html"));
        assert!(raw.contains("application/pdf"));
        assert!(raw.contains("filename=\"report.pdf\""));
    }

    #[tokio::test]
    async fn test_invalid_receiver_is_rejected() {
        let message = Message::to("not an address", "Hello").text("Hi");

        let err = sender().build(&message).unwrap_err();

        assert!(matches!(err, SendError::Address { .. }));
    }
}
