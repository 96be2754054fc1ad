//! Subscription storage.
//!
//! The persisted document is a single JSON object:
//!
//! ```json
//! {
//!   "subscribers": ["alice@example.com", "bob@example.com"],
//!   "news": ["carol@example.com"],
//!   "news#rust": ["dave@example.com"]
//! }
//! ```
//!
//! `"subscribers"` is the global audience. Every other key is the
//! [`AudienceKey`](crate::AudienceKey) of a tag set.

mod model;
mod repository;

pub use model::SubscriberList;
pub use repository::SubscriptionStore;
