//! The relay pipeline.
//!
//! [`Relay`] pulls unseen messages from a [`MailFetch`], routes each one
//! through the [`Engine`] and hands confirmations and forwarded posts to a
//! [`MailSend`]. Messages are handled one at a time; a failure on one
//! message is logged and never stops the others.

use async_trait::async_trait;
use tracing::{debug, error, info};

use crate::error::{FetchError, SendError};
use crate::message::{IncomingMessage, Message};
use crate::routing::{Engine, Rejection, RoutingResult};
use crate::templates::Snippets;

/// Source of incoming list mail.
#[async_trait]
pub trait MailFetch: Send {
    /// Fetch every unseen message and mark it seen.
    ///
    /// Messages are marked before they are returned, so a crash while
    /// relaying never processes the same message twice.
    ///
    /// # Errors
    ///
    /// Returns an error if the mailbox cannot be read.
    async fn fetch_unseen(&mut self) -> Result<Vec<IncomingMessage>, FetchError>;
}

/// Outbound mail transport.
#[async_trait]
pub trait MailSend: Send + Sync {
    /// Deliver `message` to all of its receivers.
    ///
    /// # Errors
    ///
    /// Returns an error if the message cannot be built or delivered.
    async fn send(&self, message: &Message) -> Result<(), SendError>;
}

/// What happened to one incoming message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayOutcome {
    /// The post was sent to this many receivers.
    Forwarded {
        /// Number of receivers.
        receivers: usize,
    },
    /// A subscribe or unsubscribe command was applied.
    Command {
        /// Whether the confirmation reached the mail transport.
        confirmed: bool,
    },
    /// An unrecognized command, dropped without effect.
    Ignored,
    /// The post was dropped.
    Rejected(Rejection),
    /// Routing or delivery failed; the message is lost.
    Failed(String),
}

/// Fetches, routes and relays list mail.
#[derive(Debug)]
pub struct Relay<F, S> {
    engine: Engine,
    fetch: F,
    send: S,
}

impl<F: MailFetch, S: MailSend> Relay<F, S> {
    /// Create a relay.
    #[must_use]
    pub const fn new(engine: Engine, fetch: F, send: S) -> Self {
        Self {
            engine,
            fetch,
            send,
        }
    }

    /// The routing engine.
    #[must_use]
    pub const fn engine(&self) -> &Engine {
        &self.engine
    }

    /// The outbound transport.
    #[must_use]
    pub const fn sender(&self) -> &S {
        &self.send
    }

    /// Fetch and process all new messages.
    ///
    /// # Errors
    ///
    /// Returns an error only if fetching fails. Per-message problems are
    /// reported in the returned outcomes.
    pub async fn process_mails(&mut self) -> Result<Vec<RelayOutcome>, FetchError> {
        info!("Processing new messages");

        let messages = self.fetch.fetch_unseen().await?;
        let mut outcomes = Vec::with_capacity(messages.len());
        for message in &messages {
            outcomes.push(self.process_message(message).await);
        }
        Ok(outcomes)
    }

    /// Route and relay a single message.
    pub async fn process_message(&mut self, message: &IncomingMessage) -> RelayOutcome {
        log_message(message);

        let result = match self.engine.check(&message.subject, &message.from_address) {
            Ok(result) => result,
            Err(e) => {
                error!("Failed to route message {}: {e}", message.id);
                return RelayOutcome::Failed(e.to_string());
            }
        };

        if let Some(confirmation) = &result.confirmation {
            let confirmed = match self.send.send(confirmation).await {
                Ok(()) => true,
                Err(e) => {
                    error!("Failed to send confirmation to {}: {e}", message.from_address);
                    false
                }
            };
            return RelayOutcome::Command { confirmed };
        }

        if !result.forward {
            debug!("Message {} is not forwarded", message.id);
            return result
                .rejection
                .map_or(RelayOutcome::Ignored, RelayOutcome::Rejected);
        }

        if let Some(rejection) = &result.rejection {
            info!("Dropping {:?}: {rejection}", message.subject);
            return RelayOutcome::Rejected(rejection.clone());
        }

        let post = forward_message(message, &result, self.engine.snippets());
        match self.send.send(&post).await {
            Ok(()) => {
                info!(
                    "Forwarded {:?} from {} to {} receiver(s)",
                    message.subject,
                    message.from_address,
                    post.receivers.len()
                );
                RelayOutcome::Forwarded {
                    receivers: post.receivers.len(),
                }
            }
            Err(e) => {
                error!("Failed to forward message {}: {e}", message.id);
                RelayOutcome::Failed(e.to_string())
            }
        }
    }
}

/// Build the post sent to the list for an allowed message.
///
/// The footer is appended to each body the sender supplied. A message with
/// no body at all gets the plain text footer alone.
#[must_use]
pub fn forward_message(
    message: &IncomingMessage,
    result: &RoutingResult,
    snippets: &Snippets,
) -> Message {
    let (footer_text, footer_html) = snippets.footers(&result.unsubscribe_tag);

    let mut text = message.text.clone();
    let mut html = message.html.clone();
    if !html.is_empty() {
        html.push_str(&footer_html);
    }
    if !text.is_empty() || html.is_empty() {
        text.push_str(&footer_text);
    }

    Message {
        sender_name: message.from_name.clone(),
        receivers: result.receivers.iter().cloned().collect(),
        subject: message.subject.clone(),
        text,
        html,
        attachments: message.attachments.clone(),
    }
}

fn log_message(message: &IncomingMessage) {
    info!("Processing message {}", message.id);
    info!("From: {} <{}>", message.from_name, message.from_address);
    info!("Subject: {}", message.subject);
    if !message.text.is_empty() {
        debug!("Message text:\n{}", message.text);
    }
    if !message.html.is_empty() {
        debug!("Message HTML:\n{}", message.html);
    }
    for attachment in &message.attachments {
        debug!("Attachment: {} {}", attachment.filename, attachment.mimetype);
    }
}
