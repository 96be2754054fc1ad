//! Audiences: hashtag extraction and canonical bucket keys.
//!
//! A subject such as `"Release notes #Rust #async"` addresses the audience
//! `{async, rust}`, stored under the key `"async#rust"`. A subject without
//! hashtags addresses the global audience, key `"subscribers"`.

mod key;
mod tag;

pub use key::{AudienceKey, GLOBAL_KEY, KEY_DELIMITER};
pub use tag::{Tag, TagSet, extract_tags};
