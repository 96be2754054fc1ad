//! # maillist-core
//!
//! Subscription routing engine for a mailing list relay.
//!
//! This crate provides:
//! - Hashtag extraction and canonical audience keys
//! - The file-backed subscription store
//! - Access control and receiver resolution
//! - `$>subscribe` / `$>unsubscribe` subject commands
//! - The routing decision for each incoming message
//! - The relay pipeline over pluggable mail fetch and send collaborators

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod access;
pub mod audience;
pub mod command;
mod error;
pub mod message;
pub mod relay;
pub mod routing;
pub mod store;
pub mod templates;

pub use access::{Access, resolve_receivers};
pub use audience::{AudienceKey, GLOBAL_KEY, Tag, TagSet, extract_tags};
pub use command::{COMMAND_PREFIX, Command};
pub use error::{Error, FetchError, Result, SendError};
pub use message::{Attachment, IncomingMessage, Message};
pub use relay::{MailFetch, MailSend, Relay, RelayOutcome};
pub use routing::{Engine, Rejection, RoutingResult, unsubscribe_subject};
pub use store::{SubscriberList, SubscriptionStore};
pub use templates::Snippets;
