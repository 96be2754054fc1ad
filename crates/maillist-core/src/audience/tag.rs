//! Hashtag extraction from subject lines.

use std::collections::BTreeSet;

/// Marker that starts a hashtag token.
const TAG_MARKER: char = '#';

/// A normalized hashtag.
///
/// Tags are matched case-insensitively, so the stored form is always
/// lowercase and never empty.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Tag(String);

impl Tag {
    /// Create a tag from its text (without the leading `#`).
    ///
    /// Returns `None` if the text is empty or contains whitespace or `#`.
    #[must_use]
    pub fn new(text: &str) -> Option<Self> {
        if text.is_empty() || text.contains(|c: char| c == TAG_MARKER || c.is_whitespace()) {
            None
        } else {
            Some(Self(text.to_lowercase()))
        }
    }

    /// Get the lowercase tag text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Tag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{TAG_MARKER}{}", self.0)
    }
}

/// A set of tags, iterated in ascending order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagSet(BTreeSet<Tag>);

impl TagSet {
    /// Create an empty tag set.
    #[must_use]
    pub const fn new() -> Self {
        Self(BTreeSet::new())
    }

    /// Insert a tag. Returns false if it was already present.
    pub fn insert(&mut self, tag: Tag) -> bool {
        self.0.insert(tag)
    }

    /// Check whether the set contains a tag.
    #[must_use]
    pub fn contains(&self, tag: &Tag) -> bool {
        self.0.contains(tag)
    }

    /// Number of distinct tags.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if the set holds no tags.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate tags in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = &Tag> {
        self.0.iter()
    }
}

impl FromIterator<Tag> for TagSet {
    fn from_iter<I: IntoIterator<Item = Tag>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a TagSet {
    type Item = &'a Tag;
    type IntoIter = std::collections::btree_set::Iter<'a, Tag>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Extract the hashtags from a subject line.
///
/// Every whitespace-separated token that starts with `#` and has at least
/// one character after it contributes the remainder as a tag.
///
/// Chained tokens are the exception: `#rust#async` yields the two tags
/// `rust` and `async`, not the single remainder `rust#async`. A tag
/// therefore never contains the key delimiter, and `#rust#async` addresses
/// the same audience as `#rust #async`.
///
/// Returns `None` when the subject has no tag token, which callers treat as
/// the global audience.
#[must_use]
pub fn extract_tags(subject: &str) -> Option<TagSet> {
    let tags: TagSet = subject
        .split_whitespace()
        .filter_map(|token| token.strip_prefix(TAG_MARKER))
        .flat_map(|rest| rest.split(TAG_MARKER))
        .filter_map(Tag::new)
        .collect();

    if tags.is_empty() { None } else { Some(tags) }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn names(tags: &TagSet) -> Vec<&str> {
        tags.iter().map(Tag::as_str).collect()
    }

    #[test]
    fn test_extract_tags_from_subject() {
        let tags = extract_tags("Hello #a #b").unwrap();
        assert_eq!(names(&tags), vec!["a", "b"]);
    }

    #[test]
    fn test_extract_tags_none_without_hashtags() {
        assert_eq!(extract_tags("Plain post"), None);
        assert_eq!(extract_tags(""), None);
    }

    #[test]
    fn test_bare_marker_is_not_a_tag() {
        assert_eq!(extract_tags("look # here"), None);
        assert_eq!(extract_tags("#"), None);

        let tags = extract_tags("# #x").unwrap();
        assert_eq!(names(&tags), vec!["x"]);
    }

    #[test]
    fn test_marker_inside_token_is_ignored() {
        assert_eq!(extract_tags("issue#42 is fixed"), None);
    }

    #[test]
    fn test_chained_tags_split_into_segments() {
        let tags = extract_tags("#rust#Async ##x#").unwrap();
        assert_eq!(names(&tags), vec!["async", "rust", "x"]);
    }

    #[test]
    fn test_chained_token_matches_separate_tokens() {
        assert_eq!(extract_tags("#rust#async"), extract_tags("#rust #async"));

        let tags = extract_tags("#rust#async").unwrap();
        assert!(names(&tags).iter().all(|name| !name.contains('#')));
    }

    #[test]
    fn test_duplicate_tags_collapse() {
        let tags = extract_tags("#News update #news #NEWS").unwrap();
        assert_eq!(names(&tags), vec!["news"]);
    }

    #[test]
    fn test_any_whitespace_separates_tokens() {
        let tags = extract_tags("  #one\t#two\n#three  ").unwrap();
        assert_eq!(names(&tags), vec!["one", "three", "two"]);
    }

    #[test]
    fn test_tag_display_includes_marker() {
        let tag = Tag::new("Rust").unwrap();
        assert_eq!(tag.as_str(), "rust");
        assert_eq!(tag.to_string(), "#rust");
    }

    #[test]
    fn test_invalid_tag_text_rejected() {
        assert_eq!(Tag::new(""), None);
        assert_eq!(Tag::new("a#b"), None);
        assert_eq!(Tag::new("a b"), None);
    }
}
