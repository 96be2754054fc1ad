//! Subject-line control commands.
//!
//! A subject starting with `$>` is a command. The word right after the
//! prefix selects it, matched case-insensitively by prefix:
//!
//! | Subject                   | Command                          |
//! |---------------------------|----------------------------------|
//! | `$>subscribe`             | join the global audience         |
//! | `$>Subscribe #news #rust` | join the `news#rust` audience    |
//! | `$>unsubscribe #news`     | leave the `news` audience        |
//! | `$>help`                  | unrecognized, ignored            |
//! | `Release notes #rust`     | plain post, forwarded            |
//!
//! Commands are never forwarded to the list.

use tracing::{info, warn};

use crate::Result;
use crate::audience::{TagSet, extract_tags};
use crate::message::Message;
use crate::store::SubscriptionStore;
use crate::templates::Snippets;

/// Prefix that marks a subject as a command.
pub const COMMAND_PREFIX: &str = "$>";

const SUBSCRIBE: &str = "subscribe";
const UNSUBSCRIBE: &str = "unsubscribe";

/// Classification of a subject line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Not a command; the message is a post.
    Plain,
    /// Join the audience for the given tags (`None` = global).
    Subscribe(Option<TagSet>),
    /// Leave the audience for the given tags (`None` = global).
    Unsubscribe(Option<TagSet>),
    /// Starts with the command prefix but names no known command.
    Unrecognized,
}

impl Command {
    /// Classify a subject line.
    #[must_use]
    pub fn parse(subject: &str) -> Self {
        let Some(rest) = subject.trim().strip_prefix(COMMAND_PREFIX) else {
            return Self::Plain;
        };

        let word = rest
            .split(char::is_whitespace)
            .next()
            .unwrap_or_default()
            .to_lowercase();

        if word.starts_with(SUBSCRIBE) {
            Self::Subscribe(extract_tags(subject))
        } else if word.starts_with(UNSUBSCRIBE) {
            Self::Unsubscribe(extract_tags(subject))
        } else {
            Self::Unrecognized
        }
    }

    /// Returns true if a message with this subject should be relayed.
    #[must_use]
    pub const fn is_forwardable(&self) -> bool {
        matches!(self, Self::Plain)
    }
}

/// Carry out a command for `sender`.
///
/// Subscribe and unsubscribe update the store and return the confirmation
/// to send back. The confirmation is produced even when the store did not
/// change (repeated subscribe, unsubscribe of a non-member), so the sender
/// always learns the command was received.
///
/// # Errors
///
/// Returns an error if the store cannot be persisted.
pub fn execute(
    command: &Command,
    sender: &str,
    store: &mut SubscriptionStore,
    snippets: &Snippets,
) -> Result<Option<Message>> {
    match command {
        Command::Subscribe(tags) => {
            info!("Subscribe request from {sender} for {}", describe(tags.as_ref()));
            store.add(sender, tags.as_ref())?;
            Ok(Some(snippets.welcome(sender)))
        }
        Command::Unsubscribe(tags) => {
            info!("Unsubscribe request from {sender} for {}", describe(tags.as_ref()));
            store.remove(sender, tags.as_ref())?;
            Ok(Some(snippets.goodbye(sender)))
        }
        Command::Unrecognized => {
            warn!("Ignoring unrecognized command from {sender}");
            Ok(None)
        }
        Command::Plain => Ok(None),
    }
}

fn describe(tags: Option<&TagSet>) -> String {
    tags.map_or_else(
        || "all posts".to_string(),
        |tags| {
            tags.iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(" ")
        },
    )
}
