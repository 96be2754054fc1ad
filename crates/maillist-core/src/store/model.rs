//! In-memory form of the persisted subscriber list.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use crate::audience::AudienceKey;
use crate::{Error, Result};

/// Mapping from audience key to subscriber addresses.
///
/// The global bucket always exists. Tag buckets are created on first
/// subscription and dropped once their last subscriber leaves. Addresses
/// keep insertion order within a bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriberList {
    buckets: BTreeMap<AudienceKey, Vec<String>>,
}

impl Default for SubscriberList {
    fn default() -> Self {
        let mut buckets = BTreeMap::new();
        buckets.insert(AudienceKey::global(), Vec::new());
        Self { buckets }
    }
}

impl SubscriberList {
    /// Parse the JSON document stored at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not a JSON object of string arrays,
    /// or if any key is neither the global key nor a canonical derived key.
    pub fn from_json(path: &Path, text: &str) -> Result<Self> {
        let raw: BTreeMap<String, Vec<String>> =
            serde_json::from_str(text).map_err(|e| Error::serde(path, e))?;

        let mut list = Self::default();
        for (key, addresses) in raw {
            let key = AudienceKey::parse(&key).ok_or_else(|| Error::InvalidKey {
                path: path.to_path_buf(),
                key: key.clone(),
            })?;
            list.buckets.insert(key, addresses);
        }
        Ok(list)
    }

    /// Render the list as a JSON document.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self, path: &Path) -> Result<String> {
        let raw: BTreeMap<&str, &Vec<String>> = self
            .buckets
            .iter()
            .map(|(key, addresses)| (key.as_str(), addresses))
            .collect();
        serde_json::to_string_pretty(&raw).map_err(|e| Error::serde(path, e))
    }

    /// Addresses in one bucket, in insertion order.
    #[must_use]
    pub fn bucket(&self, key: &AudienceKey) -> &[String] {
        self.buckets.get(key).map_or(&[], Vec::as_slice)
    }

    /// Union of a bucket and the global bucket, without duplicates.
    #[must_use]
    pub fn audience(&self, key: &AudienceKey) -> BTreeSet<String> {
        let global = AudienceKey::global();
        self.bucket(key)
            .iter()
            .chain(self.bucket(&global))
            .cloned()
            .collect()
    }

    /// Iterate all buckets in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&AudienceKey, &[String])> {
        self.buckets
            .iter()
            .map(|(key, addresses)| (key, addresses.as_slice()))
    }

    /// Append an address to a bucket unless it is already there.
    ///
    /// Returns true if the list changed.
    pub fn insert(&mut self, key: &AudienceKey, address: &str) -> bool {
        let bucket = self.buckets.entry(key.clone()).or_default();
        if bucket.iter().any(|a| a == address) {
            return false;
        }
        bucket.push(address.to_string());
        true
    }

    /// Remove an address from a bucket.
    ///
    /// Returns the position it occupied, or `None` if it was not a member.
    /// An emptied tag bucket is dropped; the global bucket is kept.
    pub fn remove(&mut self, key: &AudienceKey, address: &str) -> Option<usize> {
        let bucket = self.buckets.get_mut(key)?;
        let index = bucket.iter().position(|a| a == address)?;
        bucket.remove(index);

        if bucket.is_empty() && !key.is_global() {
            self.buckets.remove(key);
        }
        Some(index)
    }

    /// Undo a [`remove`](Self::remove) by putting the address back at `index`.
    pub fn restore(&mut self, key: &AudienceKey, index: usize, address: &str) {
        let bucket = self.buckets.entry(key.clone()).or_default();
        let index = index.min(bucket.len());
        bucket.insert(index, address.to_string());
    }

    /// Undo an [`insert`](Self::insert) of a new address.
    pub(crate) fn discard(&mut self, key: &AudienceKey, address: &str) {
        let _ = self.remove(key, address);
    }
}
