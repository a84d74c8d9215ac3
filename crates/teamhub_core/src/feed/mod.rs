//! In-process change notification feed.
//!
//! # Responsibility
//! - Give repositories a place to announce committed writes per topic.
//! - Give resolvers long-lived subscriptions that are released on drop.
//!
//! # Invariants
//! - Notifications are delivered in publish order per subscription.
//! - A failed topic delivers one terminal event; the subscription then ends.
//! - Dropping a `FeedSubscription` unregisters it; nothing is delivered after.

pub mod change_feed;

pub use change_feed::{ChangeFeed, FeedEvent, FeedPoll, FeedSubscription, FeedTopic};
