//! Canonical storage keys for audiences.

use super::tag::TagSet;

/// Key of the global (untagged) audience.
pub const GLOBAL_KEY: &str = "subscribers";

/// Separator between tags inside a derived key.
pub const KEY_DELIMITER: char = '#';

/// Canonical, order-independent identifier of an audience bucket.
///
/// Keys are persisted in the subscriber list, so derivation must stay
/// stable across releases.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AudienceKey(String);

impl AudienceKey {
    /// The key of the global audience.
    #[must_use]
    pub fn global() -> Self {
        Self(GLOBAL_KEY.to_string())
    }

    /// Derive the key for a tag set.
    ///
    /// `None` and the empty set both map to the global key. Otherwise the
    /// lowercase tags are joined in ascending order. The single tag
    /// `subscribers` collides with the global key and addresses everyone.
    #[must_use]
    pub fn derive(tags: Option<&TagSet>) -> Self {
        match tags {
            Some(tags) if !tags.is_empty() => {
                let parts: Vec<&str> = tags.iter().map(super::Tag::as_str).collect();
                Self(parts.join(&KEY_DELIMITER.to_string()))
            }
            _ => Self::global(),
        }
    }

    /// Accept a persisted key if it is the global key or a canonical derived key.
    ///
    /// A derived key is canonical when its parts are non-empty, lowercase,
    /// free of whitespace and strictly ascending.
    #[must_use]
    pub fn parse(key: &str) -> Option<Self> {
        if key == GLOBAL_KEY {
            return Some(Self::global());
        }

        let parts: Vec<&str> = key.split(KEY_DELIMITER).collect();
        let well_formed = parts.iter().all(|part| {
            !part.is_empty()
                && !part.contains(char::is_whitespace)
                && part.to_lowercase() == *part
        });
        let ascending = parts.windows(2).all(|pair| pair[0] < pair[1]);

        if well_formed && ascending {
            Some(Self(key.to_string()))
        } else {
            None
        }
    }

    /// Returns true for the global audience key.
    #[must_use]
    pub fn is_global(&self) -> bool {
        self.0 == GLOBAL_KEY
    }

    /// Get the key as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for AudienceKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
