//! Paginated polling of subreddit listings.
//!
//! - `page` - decoding a `/r/{feed}/new` listing into [`Item`]s and a cursor
//! - `poller` - the per-feed loop: gate, backoff, request, decode, aggregate
//!
//! # Example
//!
//! ```ignore
//! let ctx = Arc::new(PollContext::new(client, settings, auth, gate, seed));
//! let report = FeedPoller::new(ctx, "rust".to_string()).run().await?;
//! ```

mod page;
mod poller;

pub use page::{parse_page, Item, Page};
pub use poller::{Feed, FeedError, FeedPoller, PollContext, PollSettings};
