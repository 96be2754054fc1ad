//! Posting permission and receiver resolution.

use std::collections::BTreeSet;

use crate::audience::TagSet;
use crate::store::SubscriptionStore;

/// Outcome of checking a sender against an audience.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Access {
    /// Whether the sender may post to the audience.
    pub allowed: bool,
    /// Everyone who should get the post. Never contains the sender.
    pub receivers: BTreeSet<String>,
}

impl Access {
    const fn denied() -> Self {
        Self {
            allowed: false,
            receivers: BTreeSet::new(),
        }
    }
}

/// Decide whether `sender` may post to the audience for `tags` and who
/// receives the post.
///
/// Only members of the audience (tag bucket or global bucket) may post.
/// The sender is removed from the receivers, and an address present in
/// several buckets is listed once.
#[must_use]
pub fn resolve_receivers(store: &SubscriptionStore, sender: &str, tags: Option<&TagSet>) -> Access {
    if !store.is_subscribed(sender, tags) {
        return Access::denied();
    }

    let mut receivers = store.subscribers_for(tags);
    receivers.remove(sender);

    Access {
        allowed: true,
        receivers,
    }
}
