//! Subreddit tracking over Reddit's rate-limited listing API.
//!
//! Each tracked feed is polled page by page in its own task. All tasks share
//! one bearer token ([`auth::AuthSession`]), one view of the API's
//! request budget ([`ratelimit::RateLimitState`]) and one cap on concurrent
//! requests ([`gate::ConcurrencyGate`]). Items flow into
//! [`aggregate::Aggregator`], which produces a [`aggregate::Report`] (top
//! poster and top post) when a feed runs out of pages.

pub mod aggregate;
pub mod auth;
pub mod config;
pub mod engine;
pub mod feed;
pub mod gate;
pub mod prompt;
pub mod ratelimit;
pub mod util;

pub use aggregate::Report;
pub use engine::{Engine, PollResult};
pub use feed::FeedError;
