//! File-backed subscription store.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use super::model::SubscriberList;
use crate::audience::{AudienceKey, TagSet};
use crate::{Error, Result};

/// Subscriber lists keyed by audience, persisted as one JSON file.
///
/// The file is read once by [`load`](Self::load) and rewritten in full
/// after every mutation. The store assumes it is the only writer of that
/// file; running two relays against the same file is unsupported.
#[derive(Debug)]
pub struct SubscriptionStore {
    path: PathBuf,
    list: SubscriberList,
}

impl SubscriptionStore {
    /// Load the store from `path`.
    ///
    /// If the file does not exist, an empty list with only the global
    /// bucket is created and written immediately.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed,
    /// or if creating the initial file fails.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();

        if !path.exists() {
            info!("Creating empty subscriber list at {}", path.display());
            let store = Self {
                path,
                list: SubscriberList::default(),
            };
            store.save()?;
            return Ok(store);
        }

        let text = fs::read_to_string(&path).map_err(|e| Error::io(&path, e))?;
        let list = SubscriberList::from_json(&path, &text)?;
        debug!(
            "Loaded {} audience bucket(s) from {}",
            list.iter().count(),
            path.display()
        );
        Ok(Self { path, list })
    }

    /// Path of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read-only view of all buckets.
    #[must_use]
    pub const fn list(&self) -> &SubscriberList {
        &self.list
    }

    /// Everyone who receives posts for `tags`: the tag bucket plus the
    /// global bucket, deduplicated.
    #[must_use]
    pub fn subscribers_for(&self, tags: Option<&TagSet>) -> BTreeSet<String> {
        self.list.audience(&AudienceKey::derive(tags))
    }

    /// Check whether `address` belongs to the audience for `tags`.
    #[must_use]
    pub fn is_subscribed(&self, address: &str, tags: Option<&TagSet>) -> bool {
        let key = AudienceKey::derive(tags);
        let global = AudienceKey::global();
        self.list.bucket(&key).iter().any(|a| a == address)
            || self.list.bucket(&global).iter().any(|a| a == address)
    }

    /// Subscribe `address` to the bucket for `tags`.
    ///
    /// Returns false without touching the file if the address is already in
    /// that bucket.
    ///
    /// # Errors
    ///
    /// Returns an error if persisting fails. The in-memory list is rolled
    /// back in that case.
    pub fn add(&mut self, address: &str, tags: Option<&TagSet>) -> Result<bool> {
        let key = AudienceKey::derive(tags);
        if !self.list.insert(&key, address) {
            debug!("{address} already subscribed to {key}");
            return Ok(false);
        }

        if let Err(e) = self.save() {
            self.list.discard(&key, address);
            return Err(e);
        }

        info!(
            "Subscribed {address} to {key}; bucket now has {} address(es)",
            self.list.bucket(&key).len()
        );
        Ok(true)
    }

    /// Unsubscribe `address` from the bucket for `tags`.
    ///
    /// Only that exact bucket is affected; memberships in overlapping
    /// buckets are kept. Returns false if the address was not a member.
    ///
    /// # Errors
    ///
    /// Returns an error if persisting fails. The in-memory list is rolled
    /// back in that case.
    pub fn remove(&mut self, address: &str, tags: Option<&TagSet>) -> Result<bool> {
        let key = AudienceKey::derive(tags);
        let Some(index) = self.list.remove(&key, address) else {
            debug!("{address} is not subscribed to {key}");
            return Ok(false);
        };

        if let Err(e) = self.save() {
            self.list.restore(&key, index, address);
            return Err(e);
        }

        info!(
            "Unsubscribed {address} from {key}; bucket now has {} address(es)",
            self.list.bucket(&key).len()
        );
        Ok(true)
    }

    /// Rewrite the whole file.
    ///
    /// The document is written to a sibling temporary file first and then
    /// renamed over the original, so readers never see a partial write.
    fn save(&self) -> Result<()> {
        let json = self.list.to_json(&self.path)?;

        let mut tmp_name = self.path.file_name().unwrap_or_default().to_os_string();
        tmp_name.push(".tmp");
        let tmp = self.path.with_file_name(tmp_name);

        fs::write(&tmp, json).map_err(|e| Error::io(&tmp, e))?;
        fs::rename(&tmp, &self.path).map_err(|e| Error::io(&self.path, e))?;

        debug!("Saved subscriber list to {}", self.path.display());
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::audience::extract_tags;

    fn store_in(dir: &tempfile::TempDir) -> SubscriptionStore {
        SubscriptionStore::load(dir.path().join("maillist.json")).unwrap()
    }

    fn tags(subject: &str) -> Option<TagSet> {
        extract_tags(subject)
    }

    #[test]
    fn test_load_creates_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("maillist.json");

        let store = SubscriptionStore::load(&path).unwrap();

        assert!(path.exists());
        let on_disk: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(on_disk, serde_json::json!({ "subscribers": [] }));
        assert!(store.subscribers_for(None).is_empty());
    }

    #[test]
    fn test_load_reads_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("maillist.json");
        fs::write(&path, r#"{"subscribers": ["g@x"], "a#b": ["t@x"]}"#).unwrap();

        let store = SubscriptionStore::load(&path).unwrap();

        assert!(store.is_subscribed("t@x", tags("#b #a").as_ref()));
        assert!(store.is_subscribed("g@x", tags("#b #a").as_ref()));
        assert!(!store.is_subscribed("t@x", None));
    }

    #[test]
    fn test_load_fails_on_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("maillist.json");
        fs::write(&path, "{ not json").unwrap();

        let err = SubscriptionStore::load(&path).unwrap_err();
        assert!(matches!(err, Error::Serde { .. }));
    }

    #[test]
    fn test_add_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store_in(&dir);
        let news = tags("#news");

        assert!(store.add("y@x", news.as_ref()).unwrap());
        assert!(!store.add("y@x", news.as_ref()).unwrap());

        let key = AudienceKey::derive(news.as_ref());
        assert_eq!(store.list().bucket(&key), ["y@x".to_string()]);
    }

    #[test]
    fn test_add_persists_immediately() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store_in(&dir);
        store.add("y@x", tags("#News").as_ref()).unwrap();

        let reloaded = SubscriptionStore::load(store.path()).unwrap();
        assert_eq!(reloaded.list(), store.list());
        assert!(reloaded.is_subscribed("y@x", tags("#news").as_ref()));
    }

    #[test]
    fn test_remove_non_member_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store_in(&dir);

        assert!(!store.remove("nobody@x", None).unwrap());
        assert!(!store.remove("nobody@x", tags("#news").as_ref()).unwrap());
    }

    #[test]
    fn test_remove_does_not_cascade() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store_in(&dir);
        store.add("z@x", None).unwrap();
        store.add("z@x", tags("#news").as_ref()).unwrap();

        assert!(store.remove("z@x", None).unwrap());

        assert!(!store.is_subscribed("z@x", None));
        assert!(store.is_subscribed("z@x", tags("#news").as_ref()));
    }

    #[test]
    fn test_subscribers_for_is_union_with_global() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store_in(&dir);
        store.add("g@x", None).unwrap();
        store.add("g@x", tags("#a #b").as_ref()).unwrap();
        store.add("t@x", tags("#a #b").as_ref()).unwrap();
        store.add("other@x", tags("#a").as_ref()).unwrap();

        let audience: Vec<_> = store
            .subscribers_for(tags("#b #a").as_ref())
            .into_iter()
            .collect();
        assert_eq!(audience, vec!["g@x", "t@x"]);

        let global: Vec<_> = store.subscribers_for(None).into_iter().collect();
        assert_eq!(global, vec!["g@x"]);
    }

    #[test]
    fn test_failed_save_rolls_back() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store_in(&dir);
        store.add("keep@x", None).unwrap();
        let before = store.list().clone();

        // Point the store at a directory that no longer exists.
        store.path = dir.path().join("gone").join("maillist.json");

        assert!(store.add("new@x", None).is_err());
        assert_eq!(store.list(), &before);

        assert!(store.remove("keep@x", None).is_err());
        assert_eq!(store.list(), &before);
    }
}
