//! Shared rate-limit budget and the pre-dispatch backoff it implies.
//!
//! Every listing response carries `X-Ratelimit-*` headers describing the
//! caller's remaining request budget. [`RateLimitState`] keeps the most recent
//! values (last writer wins, the API is authoritative per call) together with
//! the number of requests currently in flight, and [`compute_delay`] turns a
//! snapshot of that state into the delay a feed waits before its next request.
//!
//! The state is advisory: races between feeds only ever make one delay
//! slightly stale, never incorrect in a way that matters for correctness.
use reqwest::header::HeaderMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

/// Budget assumed before the first response has been seen.
pub const DEFAULT_REMAINING: i64 = 60;
/// Reset horizon (seconds) assumed before the first response has been seen.
pub const DEFAULT_RESET_SECS: i64 = 600;

/// Lower bound for any non-zero delay, prevents hammering once headroom collapses.
pub const MIN_DELAY_FLOOR: Duration = Duration::from_secs(1);

const REMAINING_HEADER: &str = "x-ratelimit-remaining";
const RESET_HEADER: &str = "x-ratelimit-reset";
const USED_HEADER: &str = "x-ratelimit-used";

/// Rate-limit values reported by a single response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitHeaders {
    pub remaining: i64,
    pub reset_secs: Option<i64>,
    pub used: Option<i64>,
}

impl RateLimitHeaders {
    /// Parse the `X-Ratelimit-*` headers from a response.
    ///
    /// Returns `None` when `X-Ratelimit-Remaining` is absent or unparsable.
    /// The API omits it for listings that do not exist, so callers treat
    /// `None` as "feed not found". The remaining value is sent as a float
    /// (e.g. `"598.0"`) and is truncated toward zero.
    pub fn from_headers(headers: &HeaderMap) -> Option<Self> {
        let remaining = header_str(headers, REMAINING_HEADER)?
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())?;

        Some(Self {
            remaining: remaining.trunc() as i64,
            reset_secs: header_str(headers, RESET_HEADER).and_then(parse_whole_number),
            used: header_str(headers, USED_HEADER).and_then(parse_whole_number),
        })
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name)?.to_str().ok().map(str::trim)
}

// Reset/used are integers in practice, but tolerate "12.0" the same way remaining is.
fn parse_whole_number(value: &str) -> Option<i64> {
    value.parse::<i64>().ok().or_else(|| {
        value
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .map(|v| v.trunc() as i64)
    })
}

/// Point-in-time copy of [`RateLimitState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitSnapshot {
    pub remaining: i64,
    pub reset_secs: i64,
    pub used: i64,
    pub in_flight: i64,
}

impl Default for RateLimitSnapshot {
    fn default() -> Self {
        Self {
            remaining: DEFAULT_REMAINING,
            reset_secs: DEFAULT_RESET_SECS,
            used: 0,
            in_flight: 0,
        }
    }
}

/// Process-wide rate-limit record shared by every feed task.
///
/// All fields are independent atomics. `update` overwrites whatever the last
/// response reported; `in_flight` is maintained exactly through [`InFlight`]
/// guards so every exit path of a request decrements it.
#[derive(Debug)]
pub struct RateLimitState {
    remaining: AtomicI64,
    reset_secs: AtomicI64,
    used: AtomicI64,
    in_flight: AtomicI64,
}

impl Default for RateLimitState {
    fn default() -> Self {
        Self::new(RateLimitSnapshot::default())
    }
}

impl RateLimitState {
    /// Create a state seeded with `seed` (its `in_flight` is ignored).
    pub fn new(seed: RateLimitSnapshot) -> Self {
        Self {
            remaining: AtomicI64::new(seed.remaining),
            reset_secs: AtomicI64::new(seed.reset_secs),
            used: AtomicI64::new(seed.used),
            in_flight: AtomicI64::new(0),
        }
    }

    /// Overwrite the budget with the values from the latest response.
    ///
    /// Reset and used are only replaced when the response carried them.
    pub fn update(&self, headers: &RateLimitHeaders) {
        self.remaining.store(headers.remaining, Ordering::Release);
        if let Some(reset) = headers.reset_secs {
            self.reset_secs.store(reset, Ordering::Release);
        }
        if let Some(used) = headers.used {
            self.used.store(used, Ordering::Release);
        }
    }

    pub fn snapshot(&self) -> RateLimitSnapshot {
        RateLimitSnapshot {
            remaining: self.remaining.load(Ordering::Acquire),
            reset_secs: self.reset_secs.load(Ordering::Acquire),
            used: self.used.load(Ordering::Acquire),
            in_flight: self.in_flight.load(Ordering::Acquire),
        }
    }

    pub fn in_flight(&self) -> i64 {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Mark a request as dispatched. The count drops again when the guard does.
    pub fn begin_request(&self) -> InFlight<'_> {
        self.in_flight.fetch_add(1, Ordering::AcqRel);
        InFlight { state: self }
    }

    /// Delay to apply before the next dispatch, given the current snapshot.
    pub fn compute_delay(&self, min_delay: Duration) -> Duration {
        compute_delay(&self.snapshot(), min_delay)
    }
}

/// Guard for one in-flight request, see [`RateLimitState::begin_request`].
#[derive(Debug)]
pub struct InFlight<'a> {
    state: &'a RateLimitState,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.state.in_flight.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Map a rate-limit snapshot to a pre-dispatch delay.
///
/// With `headroom = remaining - in_flight`:
/// - `headroom > reset_secs`: zero, there is enough slack to burst.
/// - otherwise the reset window is spread evenly over the remaining headroom,
///   `reset_secs / max(headroom, 1)`, but never less than `min_delay`
///   (itself floored at [`MIN_DELAY_FLOOR`]).
///
/// A reset horizon reported as negative is treated as zero.
pub fn compute_delay(snapshot: &RateLimitSnapshot, min_delay: Duration) -> Duration {
    let headroom = snapshot.remaining.saturating_sub(snapshot.in_flight);
    let reset_secs = snapshot.reset_secs.max(0);

    if headroom > reset_secs {
        return Duration::ZERO;
    }

    let spread = Duration::from_secs_f64(reset_secs as f64 / headroom.max(1) as f64);
    spread.max(min_delay.max(MIN_DELAY_FLOOR))
}
