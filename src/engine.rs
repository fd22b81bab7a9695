//! Top-level coordinator: one task per tracked feed.
//!
//! The engine owns the shared [`PollContext`] (HTTP client, auth session,
//! rate-limit state, gate and aggregator) and a [`JoinSet`] of feed tasks.
//! Each task reports back a [`PollResult`]; a failure in one feed never
//! reaches another.
use crate::aggregate::Report;
use crate::feed::{FeedError, FeedPoller, PollContext};
use crate::util::validate_feed_name;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::task::JoinSet;

/// Terminal status of one feed.
#[derive(Debug)]
pub struct PollResult {
    pub feed: String,
    /// `Ok(None)` when the feed completed without a single item
    pub result: Result<Option<Report>, FeedError>,
}

type ActiveSet = Arc<Mutex<HashSet<String>>>;

/// Marks a feed name as taken for as long as its task runs.
struct ActiveFeed {
    /// Lowercased name
    key: String,
    active: ActiveSet,
}

impl Drop for ActiveFeed {
    fn drop(&mut self) {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.key);
    }
}

pub struct Engine {
    ctx: Arc<PollContext>,
    active: ActiveSet,
    tasks: JoinSet<PollResult>,
}

impl Engine {
    pub fn new(ctx: PollContext) -> Self {
        Self {
            ctx: Arc::new(ctx),
            active: Arc::new(Mutex::new(HashSet::new())),
            tasks: JoinSet::new(),
        }
    }

    /// Shared state, for inspection (remaining budget, gate occupancy).
    pub fn context(&self) -> &Arc<PollContext> {
        &self.ctx
    }

    /// Start polling `name` in its own task.
    ///
    /// The name is normalized first (`r/rust`, `Rust` and `rust` are the same
    /// feed). Returns the normalized name in the caller's spelling.
    ///
    /// # Errors
    ///
    /// - [`FeedError::InvalidName`] - not a valid subreddit name
    /// - [`FeedError::AlreadyTracked`] - a task for this feed is still running
    pub fn track(&mut self, name: &str) -> Result<String, FeedError> {
        let name = validate_feed_name(name)?;
        // Subreddit names are case-insensitive: `Rust` and `rust` are one listing
        let key = name.to_ascii_lowercase();

        let inserted = self
            .active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.clone());
        if !inserted {
            tracing::info!(feed = %name, "Feed already tracked, ignoring");
            return Err(FeedError::AlreadyTracked(name));
        }

        let guard = ActiveFeed {
            key,
            active: Arc::clone(&self.active),
        };
        let poller = FeedPoller::new(Arc::clone(&self.ctx), name.clone());
        let feed = name.clone();

        self.tasks.spawn(async move {
            let result = poller.run().await;
            // Free the name before the result is observable
            drop(guard);
            PollResult { feed, result }
        });

        tracing::info!(feed = %name, running = self.tasks.len(), "Tracking feed");
        Ok(name)
    }

    /// Whether a task for `name` (already normalized, any case) is still running.
    pub fn is_tracked(&self, name: &str) -> bool {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&name.to_ascii_lowercase())
    }

    /// Number of feed tasks not yet collected.
    pub fn pending(&self) -> usize {
        self.tasks.len()
    }

    /// Wait for the next feed to reach a terminal state.
    ///
    /// Returns `None` once every tracked feed has been collected. Tasks that
    /// panicked are logged and skipped.
    pub async fn next_result(&mut self) -> Option<PollResult> {
        loop {
            match self.tasks.join_next().await? {
                Ok(result) => return Some(result),
                Err(e) => tracing::error!(error = %e, "Feed task failed to complete"),
            }
        }
    }

    /// Wait for every tracked feed, in completion order.
    pub async fn join_all(&mut self) -> Vec<PollResult> {
        let mut results = Vec::with_capacity(self.tasks.len());
        while let Some(result) = self.next_result().await {
            results.push(result);
        }
        results
    }

    /// Track every name in `feeds` and wait for all of them.
    ///
    /// Names rejected by [`Engine::track`] come back as failed results
    /// alongside the polled ones.
    pub async fn run<I, S>(ctx: PollContext, feeds: I) -> Vec<PollResult>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut engine = Self::new(ctx);
        let mut rejected = Vec::new();

        for feed in feeds {
            let feed = feed.as_ref();
            if let Err(e) = engine.track(feed) {
                rejected.push(PollResult {
                    feed: feed.to_string(),
                    result: Err(e),
                });
            }
        }

        let mut results = engine.join_all().await;
        results.extend(rejected);
        results
    }
}
