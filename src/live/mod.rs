//! Live mirror of the running shift.
//!
//! Frames arrive on the feed connection, are decoded into envelopes, and are
//! folded one at a time into the `LiveView` held by the store. Consumers
//! subscribe to the store's watch channels for the view and the reload flag.

pub mod feed;
pub mod model;
pub mod protocol;
pub mod reducer;
pub mod reload;
pub mod store;

pub use feed::{FeedState, LiveFeed};
pub use reducer::FeedEvent;
pub use store::{LiveStore, SharedStore};
