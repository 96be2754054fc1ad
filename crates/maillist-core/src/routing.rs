//! Routing decision for incoming messages.

use std::collections::BTreeSet;

use tracing::{debug, warn};

use crate::Result;
use crate::access::resolve_receivers;
use crate::audience::{AudienceKey, TagSet, extract_tags};
use crate::command::{self, COMMAND_PREFIX, Command};
use crate::message::Message;
use crate::store::SubscriptionStore;
use crate::templates::Snippets;

/// Why a forwardable post is not delivered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    /// The sender is not a member of the audience they posted to.
    PolicyViolation {
        /// Offending sender.
        sender: String,
        /// Audience the post was addressed to.
        audience: AudienceKey,
    },
    /// The sender is allowed, but nobody else is in the audience.
    NoReceivers {
        /// Audience the post was addressed to.
        audience: AudienceKey,
    },
}

impl std::fmt::Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PolicyViolation { sender, audience } => {
                write!(f, "{sender} is not subscribed to {audience}")
            }
            Self::NoReceivers { audience } => write!(f, "no other subscribers in {audience}"),
        }
    }
}

/// What to do with one incoming message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingResult {
    /// Whether the message is a post that may be relayed.
    pub forward: bool,
    /// Who receives the post. Empty unless `forward` is set.
    pub receivers: BTreeSet<String>,
    /// Subject a reader sends to leave this post's audience.
    pub unsubscribe_tag: String,
    /// Reply produced by a subscribe/unsubscribe command.
    pub confirmation: Option<Message>,
    /// Set when a post is dropped for policy reasons or lack of receivers.
    pub rejection: Option<Rejection>,
}

impl RoutingResult {
    fn dropped(unsubscribe_tag: String) -> Self {
        Self {
            forward: false,
            receivers: BTreeSet::new(),
            unsubscribe_tag,
            confirmation: None,
            rejection: None,
        }
    }

    /// Returns true if there is a post to send to at least one receiver.
    #[must_use]
    pub fn is_deliverable(&self) -> bool {
        self.forward && !self.receivers.is_empty()
    }
}

/// Subject that unsubscribes from the audience for `tags`.
#[must_use]
pub fn unsubscribe_subject(tags: Option<&TagSet>) -> String {
    let mut subject = format!("{COMMAND_PREFIX}unsubscribe");
    for tag in tags.into_iter().flatten() {
        subject.push(' ');
        subject.push_str(&tag.to_string());
    }
    subject
}

/// The subscription routing engine.
///
/// Owns the subscription store and the list's snippets, and decides for
/// each incoming `(subject, sender)` whether it is a command or a post and
/// who receives it.
#[derive(Debug)]
pub struct Engine {
    store: SubscriptionStore,
    snippets: Snippets,
}

impl Engine {
    /// Create an engine over a loaded store.
    #[must_use]
    pub const fn new(store: SubscriptionStore, snippets: Snippets) -> Self {
        Self { store, snippets }
    }

    /// The subscription store.
    #[must_use]
    pub const fn store(&self) -> &SubscriptionStore {
        &self.store
    }

    /// The list's snippets.
    #[must_use]
    pub const fn snippets(&self) -> &Snippets {
        &self.snippets
    }

    /// Route one message.
    ///
    /// Commands update the store and yield a confirmation; they are never
    /// forwarded. Posts are forwarded only if the sender belongs to the
    /// addressed audience, and never back to the sender.
    ///
    /// # Errors
    ///
    /// Returns an error if a command's store update cannot be persisted.
    pub fn check(&mut self, subject: &str, sender: &str) -> Result<RoutingResult> {
        let tags = extract_tags(subject);
        let unsubscribe_tag = unsubscribe_subject(tags.as_ref());

        let command = Command::parse(subject);
        if !command.is_forwardable() {
            debug!("{subject:?} from {sender} is a command, not forwarding");
            let confirmation = command::execute(&command, sender, &mut self.store, &self.snippets)?;
            return Ok(RoutingResult {
                confirmation,
                ..RoutingResult::dropped(unsubscribe_tag)
            });
        }

        let audience = AudienceKey::derive(tags.as_ref());
        let access = resolve_receivers(&self.store, sender, tags.as_ref());

        if !access.allowed {
            warn!("Sender {sender} tried to post {subject:?} to {audience}, but is no subscriber");
            return Ok(RoutingResult {
                rejection: Some(Rejection::PolicyViolation {
                    sender: sender.to_string(),
                    audience,
                }),
                ..RoutingResult::dropped(unsubscribe_tag)
            });
        }

        let rejection = access
            .receivers
            .is_empty()
            .then(|| Rejection::NoReceivers { audience });

        Ok(RoutingResult {
            forward: true,
            receivers: access.receivers,
            unsubscribe_tag,
            confirmation: None,
            rejection,
        })
    }
}
