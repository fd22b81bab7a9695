use crate::aggregate::{Aggregator, Report};
use crate::auth::{AccessToken, AuthError, AuthSession};
use crate::feed::page::parse_page;
use crate::gate::ConcurrencyGate;
use crate::ratelimit::{RateLimitHeaders, RateLimitSnapshot, RateLimitState};
use crate::util::ValidationError;
use futures::StreamExt;
use reqwest::header::USER_AGENT;
use reqwest::StatusCode;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Default cap on a listing body.
pub const MAX_PAGE_SIZE: usize = 10 * 1024 * 1024; // 10MB

/// Errors that end a feed's polling.
///
/// Every variant is terminal for the feed that hit it and for nothing else:
/// other feeds and the engine keep running.
#[derive(Debug, Error)]
pub enum FeedError {
    /// No access token could be obtained or refreshed
    #[error("Authentication failed: {0}")]
    Auth(#[from] AuthError),
    /// Response lacked `X-Ratelimit-Remaining`, which the API omits for unknown feeds
    #[error("Feed not found (response carried no rate-limit headers)")]
    NotFound,
    /// HTTP 429. Not retried: the shared budget is already spent
    #[error("Rate limited (HTTP 429)")]
    RateLimited,
    /// Any other non-2xx response
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// Request exceeded the configured timeout
    #[error("Request timed out")]
    Timeout,
    /// Response body exceeded the 10MB size limit
    #[error("Response too large")]
    ResponseTooLarge,
    /// Page body was not a listing
    #[error("Decode error: {0}")]
    Decode(String),
    /// The feed is already being polled
    #[error("Feed {0:?} is already being tracked")]
    AlreadyTracked(String),
    /// The requested name cannot be a feed
    #[error(transparent)]
    InvalidName(#[from] ValidationError),
}

impl FeedError {
    /// Failures caused by the transport or the API's momentary state rather
    /// than by the feed itself; a later run may well succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            FeedError::RateLimited
                | FeedError::HttpStatus(_)
                | FeedError::Network(_)
                | FeedError::Timeout
        )
    }
}

/// Request settings shared by every poller.
#[derive(Debug, Clone)]
pub struct PollSettings {
    /// Listing API root, already validated as http(s)
    pub base_uri: Url,
    pub user_agent: String,
    /// Posts requested per page (`limit`)
    pub page_size: u32,
    /// Floor for any non-zero rate-limit delay
    pub min_delay: Duration,
    pub request_timeout: Duration,
}

impl PollSettings {
    /// `{base_uri}/r/{feed}/new?limit={page_size}&after={cursor}`
    ///
    /// `after` is always sent, empty on the first page.
    pub fn listing_url(&self, feed: &str, cursor: Option<&str>) -> Url {
        let mut url = self.base_uri.clone();
        // http(s) URLs always have path segments
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().extend(["r", feed, "new"]);
        }
        url.query_pairs_mut()
            .clear()
            .append_pair("limit", &self.page_size.to_string())
            .append_pair("after", cursor.unwrap_or(""));
        url
    }
}

/// Collaborators shared by every feed task.
pub struct PollContext {
    pub client: reqwest::Client,
    pub settings: PollSettings,
    pub rate_limit: RateLimitState,
    pub gate: ConcurrencyGate,
    pub auth: AuthSession,
    pub aggregator: Aggregator,
}

impl PollContext {
    pub fn new(
        client: reqwest::Client,
        settings: PollSettings,
        auth: AuthSession,
        gate: ConcurrencyGate,
        rate_limit_seed: RateLimitSnapshot,
    ) -> Self {
        Self {
            client,
            settings,
            rate_limit: RateLimitState::new(rate_limit_seed),
            gate,
            auth,
            aggregator: Aggregator::new(),
        }
    }
}

/// One tracked feed. Only its own poller touches the cursor.
#[derive(Debug, Clone)]
pub struct Feed {
    pub name: String,
    pub cursor: Option<String>,
    pub completed: bool,
}

/// Drives one feed through its pages until they run out or something fails.
pub struct FeedPoller {
    ctx: Arc<PollContext>,
    feed: Feed,
    pages: u32,
    body_limit: usize,
}

impl FeedPoller {
    pub fn new(ctx: Arc<PollContext>, name: String) -> Self {
        Self {
            ctx,
            feed: Feed {
                name,
                cursor: None,
                completed: false,
            },
            pages: 0,
            body_limit: MAX_PAGE_SIZE,
        }
    }

    /// Override the response body cap (default [`MAX_PAGE_SIZE`]).
    pub fn with_body_limit(mut self, limit: usize) -> Self {
        self.body_limit = limit;
        self
    }

    pub fn feed(&self) -> &Feed {
        &self.feed
    }

    /// Poll every page of the feed.
    ///
    /// Returns `Ok(Some(report))` once the last page is in, `Ok(None)` if the
    /// feed had no items at all. On error the feed's partial aggregate is
    /// dropped.
    pub async fn run(mut self) -> Result<Option<Report>, FeedError> {
        let result = self.poll().await;

        match &result {
            Ok(Some(report)) => tracing::info!(
                feed = %self.feed.name,
                pages = self.pages,
                items = report.item_count,
                top_author = %report.top_author,
                "Feed completed"
            ),
            Ok(None) => tracing::info!(
                feed = %self.feed.name,
                pages = self.pages,
                "Feed completed with no items"
            ),
            Err(e) => {
                self.ctx.aggregator.discard(&self.feed.name);
                tracing::warn!(
                    feed = %self.feed.name,
                    pages = self.pages,
                    error = %e,
                    "Feed failed"
                );
            }
        }

        result
    }

    async fn poll(&mut self) -> Result<Option<Report>, FeedError> {
        tracing::debug!(feed = %self.feed.name, "Authenticating");

        loop {
            // Cheap while cached; long paginations can outlive a token
            let token = self.ctx.auth.valid_token().await?;

            self.feed.cursor = self.next_page(&token).await?;

            if self.feed.cursor.is_none() {
                self.feed.completed = true;
                return Ok(self.ctx.aggregator.finalize(&self.feed.name));
            }
        }
    }

    /// Fetch, decode and forward one page; returns the cursor for the next.
    ///
    /// The gate permit is held from before the backoff delay until the
    /// page's items are in the aggregator, and released on every exit path.
    async fn next_page(&mut self, token: &AccessToken) -> Result<Option<String>, FeedError> {
        let ctx = Arc::clone(&self.ctx);
        let settings = &ctx.settings;

        let _permit = ctx.gate.acquire().await;

        let delay = ctx.rate_limit.compute_delay(settings.min_delay);
        if !delay.is_zero() {
            tracing::debug!(
                feed = %self.feed.name,
                delay_ms = delay.as_millis() as u64,
                "Waiting for rate-limit headroom"
            );
            tokio::time::sleep(delay).await;
        }

        let in_flight = ctx.rate_limit.begin_request();
        // One deadline for headers and body alike
        let bytes = tokio::time::timeout(settings.request_timeout, self.fetch(&ctx, token))
            .await
            .map_err(|_| FeedError::Timeout)??;
        drop(in_flight);

        let page =
            parse_page(&bytes, &self.feed.name).map_err(|e| FeedError::Decode(e.to_string()))?;
        self.pages += 1;

        let snapshot = ctx.rate_limit.snapshot();
        tracing::info!(
            feed = %self.feed.name,
            page = self.pages,
            items = page.items.len(),
            remaining = snapshot.remaining,
            reset_secs = snapshot.reset_secs,
            next_delay_ms = ctx.rate_limit.compute_delay(settings.min_delay).as_millis() as u64,
            "Fetched page"
        );

        ctx.aggregator.append(&self.feed.name, page.items);
        Ok(page.next_cursor)
    }

    /// Send the listing request and read its body, checking status and
    /// rate-limit headers in between.
    async fn fetch(&self, ctx: &PollContext, token: &AccessToken) -> Result<Vec<u8>, FeedError> {
        let settings = &ctx.settings;
        let url = settings.listing_url(&self.feed.name, self.feed.cursor.as_deref());
        let response = ctx
            .client
            .get(url)
            .bearer_auth(token.expose())
            .header(USER_AGENT, &settings.user_agent)
            .send()
            .await
            .map_err(network)?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(FeedError::RateLimited);
        }
        if status == StatusCode::UNAUTHORIZED {
            // Token revoked before its expiry; make the next feed re-authenticate
            ctx.auth.invalidate(token).await;
        }
        if !status.is_success() {
            return Err(FeedError::HttpStatus(status.as_u16()));
        }

        let limits = RateLimitHeaders::from_headers(response.headers()).ok_or(FeedError::NotFound)?;
        ctx.rate_limit.update(&limits);

        read_limited_bytes(response, self.body_limit).await
    }
}

/// A client-level timeout surfaces as a reqwest error; report it as one.
fn network(e: reqwest::Error) -> FeedError {
    if e.is_timeout() {
        FeedError::Timeout
    } else {
        FeedError::Network(e)
    }
}

async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, FeedError> {
    // Fast path: check Content-Length header
    if let Some(len) = response.content_length() {
        if len as usize > limit {
            return Err(FeedError::ResponseTooLarge);
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(network)?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(FeedError::ResponseTooLarge);
        }
        bytes.extend_from_slice(&chunk);
    }

    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::StaticToken;
    use secrecy::SecretString;
    use serde_json::json;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn settings(base: &str) -> PollSettings {
        PollSettings {
            base_uri: Url::parse(base).unwrap(),
            user_agent: "subtally-test/0.1".to_string(),
            page_size: 25,
            min_delay: Duration::from_secs(1),
            request_timeout: Duration::from_secs(5),
        }
    }

    fn context(base: &str) -> Arc<PollContext> {
        let token = AccessToken::non_expiring(SecretString::from("tok".to_string()));
        Arc::new(PollContext::new(
            reqwest::Client::new(),
            settings(base),
            AuthSession::new(Arc::new(StaticToken::new(token))),
            ConcurrencyGate::new(2),
            RateLimitSnapshot {
                remaining: 1000,
                reset_secs: 10,
                used: 0,
                in_flight: 0,
            },
        ))
    }

    fn listing(after: Option<&str>) -> serde_json::Value {
        json!({
            "kind": "Listing",
            "data": {
                "after": after,
                "before": null,
                "children": [
                    { "kind": "t3", "data": { "id": "1", "title": "Hello", "author": "a", "ups": 3, "subreddit": "rust" } }
                ]
            }
        })
    }

    fn ok_page(after: Option<&str>) -> ResponseTemplate {
        ResponseTemplate::new(200)
            .insert_header("x-ratelimit-remaining", "598.0")
            .insert_header("x-ratelimit-reset", "240")
            .insert_header("x-ratelimit-used", "2")
            .set_body_json(listing(after))
    }

    #[test]
    fn test_listing_url() {
        let s = settings("https://oauth.reddit.com");
        assert_eq!(
            s.listing_url("rust", None).as_str(),
            "https://oauth.reddit.com/r/rust/new?limit=25&after="
        );
        assert_eq!(
            s.listing_url("rust", Some("t3_abc")).as_str(),
            "https://oauth.reddit.com/r/rust/new?limit=25&after=t3_abc"
        );

        let nested = settings("http://127.0.0.1:9000/api/");
        assert_eq!(
            nested.listing_url("rust", None).as_str(),
            "http://127.0.0.1:9000/api/r/rust/new?limit=25&after="
        );
    }

    #[test]
    fn test_transient_classification() {
        assert!(FeedError::RateLimited.is_transient());
        assert!(FeedError::HttpStatus(503).is_transient());
        assert!(FeedError::Timeout.is_transient());
        assert!(!FeedError::NotFound.is_transient());
        assert!(!FeedError::Decode("bad".into()).is_transient());
    }

    #[tokio::test]
    async fn test_single_page_sends_auth_and_updates_budget() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/r/rust/new"))
            .and(query_param("limit", "25"))
            .and(query_param("after", ""))
            .and(header("authorization", "Bearer tok"))
            .and(header("user-agent", "subtally-test/0.1"))
            .respond_with(ok_page(None))
            .expect(1)
            .mount(&server)
            .await;

        let ctx = context(&server.uri());
        let report = FeedPoller::new(Arc::clone(&ctx), "rust".to_string())
            .run()
            .await
            .unwrap()
            .unwrap();

        assert_eq!(report.top_author, "a");
        assert_eq!(report.top_item_score, 3);

        let snap = ctx.rate_limit.snapshot();
        assert_eq!(snap.remaining, 598);
        assert_eq!(snap.reset_secs, 240);
        assert_eq!(snap.used, 2);
        assert_eq!(snap.in_flight, 0);
        assert_eq!(ctx.gate.available(), 2);
        assert!(ctx.aggregator.is_empty());
    }

    #[tokio::test]
    async fn test_cursor_advances_until_exhausted() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param("after", ""))
            .respond_with(ok_page(Some("t3_p2")))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(query_param("after", "t3_p2"))
            .respond_with(ok_page(Some("t3_p3")))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(query_param("after", "t3_p3"))
            .respond_with(ok_page(Some("")))
            .expect(1)
            .mount(&server)
            .await;

        let ctx = context(&server.uri());
        let report = FeedPoller::new(ctx, "rust".to_string())
            .run()
            .await
            .unwrap()
            .unwrap();

        assert_eq!(report.item_count, 3);
        // Same title on every page: scores add up
        assert_eq!(report.top_item_score, 9);
    }

    #[tokio::test]
    async fn test_missing_remaining_header_is_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("x-ratelimit-reset", "240")
                    .set_body_json(listing(None)),
            )
            .mount(&server)
            .await;

        let ctx = context(&server.uri());
        let result = FeedPoller::new(Arc::clone(&ctx), "nosuchfeed".to_string())
            .run()
            .await;

        assert!(matches!(result, Err(FeedError::NotFound)));
        assert!(!ctx.aggregator.contains("nosuchfeed"));
        assert_eq!(ctx.rate_limit.snapshot().remaining, 1000);
        assert_eq!(ctx.gate.available(), 2);
    }

    #[tokio::test]
    async fn test_429_not_retried_and_budget_untouched() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(429))
            .expect(1)
            .mount(&server)
            .await;

        let ctx = context(&server.uri());
        let result = FeedPoller::new(Arc::clone(&ctx), "rust".to_string()).run().await;

        assert!(matches!(result, Err(FeedError::RateLimited)));
        assert_eq!(ctx.rate_limit.snapshot().remaining, 1000);
        assert_eq!(ctx.rate_limit.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_server_error_fails_feed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .expect(1)
            .mount(&server)
            .await;

        let ctx = context(&server.uri());
        let result = FeedPoller::new(ctx, "rust".to_string()).run().await;
        match result {
            Err(FeedError::HttpStatus(503)) => {}
            other => panic!("Expected HttpStatus(503), got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_decode_error_discards_partial_aggregate() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param("after", ""))
            .respond_with(ok_page(Some("t3_p2")))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(query_param("after", "t3_p2"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("x-ratelimit-remaining", "597")
                    .set_body_string("<html>maintenance</html>"),
            )
            .mount(&server)
            .await;

        let ctx = context(&server.uri());
        let result = FeedPoller::new(Arc::clone(&ctx), "rust".to_string()).run().await;

        assert!(matches!(result, Err(FeedError::Decode(_))));
        assert!(ctx.aggregator.is_empty());
        assert_eq!(ctx.gate.available(), 2);
    }

    #[tokio::test]
    async fn test_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ok_page(None).set_delay(Duration::from_millis(500)))
            .mount(&server)
            .await;

        let mut slow = settings(&server.uri());
        slow.request_timeout = Duration::from_millis(50);
        let token = AccessToken::non_expiring(SecretString::from("tok".to_string()));
        let ctx = Arc::new(PollContext::new(
            reqwest::Client::new(),
            slow,
            AuthSession::new(Arc::new(StaticToken::new(token))),
            ConcurrencyGate::new(1),
            RateLimitSnapshot {
                remaining: 1000,
                reset_secs: 10,
                used: 0,
                in_flight: 0,
            },
        ));

        let result = FeedPoller::new(Arc::clone(&ctx), "rust".to_string()).run().await;
        assert!(matches!(result, Err(FeedError::Timeout)));
        assert_eq!(ctx.rate_limit.in_flight(), 0);
        assert_eq!(ctx.gate.available(), 1);
    }

    #[tokio::test]
    async fn test_unauthorized_invalidates_token() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        struct Counting(AtomicUsize);
        impl crate::auth::TokenSource for Counting {
            fn fetch_token(
                &self,
            ) -> futures::future::BoxFuture<'_, Result<AccessToken, AuthError>> {
                use futures::FutureExt;
                let n = self.0.fetch_add(1, Ordering::SeqCst);
                futures::future::ready(Ok(AccessToken::non_expiring(SecretString::from(
                    format!("tok-{n}"),
                ))))
                .boxed()
            }
        }

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(header("authorization", "Bearer tok-0"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(header("authorization", "Bearer tok-1"))
            .respond_with(ok_page(None))
            .mount(&server)
            .await;

        let ctx = Arc::new(PollContext::new(
            reqwest::Client::new(),
            settings(&server.uri()),
            AuthSession::new(Arc::new(Counting(AtomicUsize::new(0)))),
            ConcurrencyGate::new(1),
            RateLimitSnapshot {
                remaining: 1000,
                reset_secs: 10,
                used: 0,
                in_flight: 0,
            },
        ));

        let first = FeedPoller::new(Arc::clone(&ctx), "rust".to_string()).run().await;
        assert!(matches!(first, Err(FeedError::HttpStatus(401))));

        let second = FeedPoller::new(ctx, "rust".to_string()).run().await;
        assert!(second.unwrap().is_some());
    }

    fn context_with(base: &str, gate: usize, request_timeout: Duration) -> Arc<PollContext> {
        let token = AccessToken::non_expiring(SecretString::from("tok".to_string()));
        let mut settings = settings(base);
        settings.request_timeout = request_timeout;
        Arc::new(PollContext::new(
            reqwest::Client::new(),
            settings,
            AuthSession::new(Arc::new(StaticToken::new(token))),
            ConcurrencyGate::new(gate),
            RateLimitSnapshot {
                remaining: 1000,
                reset_secs: 10,
                used: 0,
                in_flight: 0,
            },
        ))
    }

    /// Loopback server that answers every connection with `response` verbatim
    /// and then keeps the socket open for `hold`.
    async fn raw_server(response: Vec<u8>, hold: Duration) -> String {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let response = response.clone();
                tokio::spawn(async move {
                    let mut request = [0u8; 4096];
                    let _ = socket.read(&mut request).await;
                    let _ = socket.write_all(&response).await;
                    let _ = socket.flush().await;
                    tokio::time::sleep(hold).await;
                });
            }
        });
        format!("http://{addr}")
    }

    fn assert_released(ctx: &PollContext, gate: usize) {
        assert_eq!(ctx.gate.available(), gate);
        assert_eq!(ctx.rate_limit.in_flight(), 0);
        assert!(ctx.aggregator.is_empty());
    }

    #[tokio::test]
    async fn test_stalled_body_times_out_and_frees_gate() {
        // Headers arrive promptly, then only 8 of 1000 promised body bytes
        let response = b"HTTP/1.1 200 OK\r\n\
content-type: application/json\r\n\
content-length: 1000\r\n\
x-ratelimit-remaining: 500\r\n\
x-ratelimit-reset: 100\r\n\
\r\n\
{\"data\":"
            .to_vec();
        let base = raw_server(response, Duration::from_secs(30)).await;
        let ctx = context_with(&base, 1, Duration::from_millis(200));

        let result = tokio::time::timeout(
            Duration::from_secs(3),
            FeedPoller::new(Arc::clone(&ctx), "rust".to_string()).run(),
        )
        .await
        .expect("feed should give up after its request timeout");

        assert!(matches!(result, Err(FeedError::Timeout)));
        assert_released(&ctx, 1);
    }

    #[tokio::test]
    async fn test_declared_length_over_limit_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("x-ratelimit-remaining", "598")
                    .set_body_string("x".repeat(2048)),
            )
            .expect(1)
            .mount(&server)
            .await;

        let ctx = context(&server.uri());
        let result = FeedPoller::new(Arc::clone(&ctx), "rust".to_string())
            .with_body_limit(1024)
            .run()
            .await;

        assert!(matches!(result, Err(FeedError::ResponseTooLarge)));
        assert!(!FeedError::ResponseTooLarge.is_transient());
        assert_released(&ctx, 2);
    }

    #[tokio::test]
    async fn test_streamed_body_over_limit_rejected() {
        // Chunked encoding: no Content-Length, so the cap is enforced while reading
        let chunk = "y".repeat(600);
        let response = format!(
            "HTTP/1.1 200 OK\r\n\
transfer-encoding: chunked\r\n\
x-ratelimit-remaining: 500\r\n\
\r\n\
258\r\n{chunk}\r\n258\r\n{chunk}\r\n0\r\n\r\n"
        )
        .into_bytes();
        let base = raw_server(response, Duration::from_millis(500)).await;
        let ctx = context_with(&base, 2, Duration::from_secs(5));

        let result = FeedPoller::new(Arc::clone(&ctx), "rust".to_string())
            .with_body_limit(1024)
            .run()
            .await;

        assert!(matches!(result, Err(FeedError::ResponseTooLarge)));
        assert_released(&ctx, 2);
    }

    #[tokio::test]
    async fn test_connection_refused_is_network_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let ctx = context_with(&format!("http://{addr}"), 2, Duration::from_secs(5));
        let result = FeedPoller::new(Arc::clone(&ctx), "rust".to_string()).run().await;

        match &result {
            Err(e @ FeedError::Network(_)) => assert!(e.is_transient()),
            other => panic!("Expected Network error, got {:?}", other),
        }
        assert_released(&ctx, 2);
    }

    #[tokio::test]
    async fn test_client_timeout_reported_as_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ok_page(None).set_delay(Duration::from_millis(500)))
            .mount(&server)
            .await;

        let token = AccessToken::non_expiring(SecretString::from("tok".to_string()));
        let ctx = Arc::new(PollContext::new(
            reqwest::Client::builder()
                .timeout(Duration::from_millis(50))
                .build()
                .unwrap(),
            settings(&server.uri()),
            AuthSession::new(Arc::new(StaticToken::new(token))),
            ConcurrencyGate::new(1),
            RateLimitSnapshot {
                remaining: 1000,
                reset_secs: 10,
                used: 0,
                in_flight: 0,
            },
        ));

        let result = FeedPoller::new(Arc::clone(&ctx), "rust".to_string()).run().await;
        assert!(matches!(result, Err(FeedError::Timeout)));
        assert_released(&ctx, 1);
    }
}
