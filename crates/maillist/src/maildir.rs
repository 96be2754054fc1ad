//! Maildir mailbox adapter.
//!
//! Unseen messages live in `new/`. Fetching moves each file to `cur/` with
//! the `S` (seen) flag before it is parsed, so a message is handed to the
//! relay at most once even if the daemon crashes mid-cycle.

use std::fs;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use maillist_core::{FetchError, IncomingMessage, MailFetch};
use tracing::{debug, warn};

use crate::parse::parse_message;

/// Info suffix of a seen message.
const SEEN_SUFFIX: &str = ":2,S";

/// Reads unseen mail from a Maildir.
#[derive(Debug, Clone)]
pub struct MaildirFetch {
    root: PathBuf,
}

impl MaildirFetch {
    /// Open the Maildir at `root`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn new_dir(&self) -> PathBuf {
        self.root.join("new")
    }

    fn cur_dir(&self) -> PathBuf {
        self.root.join("cur")
    }

    /// Move `name` from `new/` to `cur/`, flagged seen, and read it.
    fn take(&self, name: &str) -> Result<Vec<u8>, FetchError> {
        let seen = self.cur_dir().join(format!("{name}{SEEN_SUFFIX}"));
        debug!("mark message {name} as seen");
        fs::rename(self.new_dir().join(name), &seen)?;
        Ok(fs::read(&seen)?)
    }

    fn unseen_names(&self) -> Result<Vec<String>, FetchError> {
        let mut names = Vec::new();
        for entry in fs::read_dir(self.new_dir())? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            match entry.file_name().into_string() {
                Ok(name) if !name.starts_with('.') => names.push(name),
                Ok(_) => {}
                Err(name) => warn!("Skipping non UTF-8 file name {name:?}"),
            }
        }
        // Delivery names start with a timestamp, so this is arrival order.
        names.sort();
        Ok(names)
    }
}

#[async_trait]
impl MailFetch for MaildirFetch {
    async fn fetch_unseen(&mut self) -> Result<Vec<IncomingMessage>, FetchError> {
        if !is_maildir(&self.root) {
            return Err(FetchError::Mailbox(format!(
                "{} is not a maildir",
                self.root.display()
            )));
        }

        let mut messages = Vec::new();
        for name in self.unseen_names()? {
            let raw = match self.take(&name) {
                Ok(raw) => raw,
                Err(e) => {
                    warn!("Skipping message {name}: {e}");
                    continue;
                }
            };
            match parse_message(&name, &raw) {
                Ok(message) => messages.push(message),
                Err(e) => warn!("Skipping unparsable message {name}: {e}"),
            }
        }
        debug!("Fetched {} unseen message(s)", messages.len());
        Ok(messages)
    }
}

/// Returns true if `path` looks like a Maildir.
#[must_use]
pub fn is_maildir(path: &Path) -> bool {
    path.join("new").is_dir() && path.join("cur").is_dir()
}
