use super::retry::{Backoff, retry_after};
use super::{Connectivity, Payload, RequestOptions, ResponseCache, SingleFlight};
use crate::auth::CredentialProvider;
use crate::config::RequestConfig;
use crate::error::{AppError, Result};
use crate::notify::ErrorReporter;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Method, Response, StatusCode};
use serde_json::Value;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, instrument, warn};

/// Characters of a mutating request's body that take part in its signature.
const BODY_SIGNATURE_PREFIX: usize = 100;

/// Cache and de-duplication key: method, URL and, for mutating calls, a
/// bounded prefix of the body. Headers never take part.
pub fn signature(method: &Method, url: &str, body: Option<&Value>) -> String {
    match (method, body) {
        (&Method::GET, _) | (_, None) => format!("{} {}", method, url),
        (_, Some(body)) => {
            let body: String = body.to_string().chars().take(BODY_SIGNATURE_PREFIX).collect();
            format!("{} {} {}", method, url, body)
        }
    }
}

struct Inner {
    http: reqwest::Client,
    credentials: CredentialProvider,
    cache: ResponseCache,
    flights: SingleFlight<String, Result<Payload>>,
    connectivity: Arc<dyn Connectivity>,
    reporter: ErrorReporter,
    config: RequestConfig,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

/// Outbound HTTP with bearer auth, GET caching, in-flight de-duplication and
/// retry with backoff.
#[derive(Clone)]
pub struct RequestEngine {
    inner: Arc<Inner>,
}

/// A response read in full within the attempt deadline.
struct Reply {
    status: StatusCode,
    retry_after: Option<Duration>,
    is_json: bool,
    body: String,
}

enum Attempt {
    Reply(Reply),
    Network(String),
    TimedOut,
}

/// Where a successful result came from. Stale payloads are never re-cached.
enum Served {
    Fresh(Payload),
    Stale(Payload),
}

impl RequestEngine {
    pub fn new(
        credentials: CredentialProvider,
        config: RequestConfig,
        connectivity: Arc<dyn Connectivity>,
    ) -> Result<Self> {
        let http = reqwest::ClientBuilder::new()
            .build()
            .map_err(|e| AppError::Other(format!("Failed to build reqwest client: {}", e)))?;

        Ok(Self::from_parts(
            http,
            credentials,
            config,
            connectivity,
            ErrorReporter::default(),
        ))
    }

    pub fn from_parts(
        http: reqwest::Client,
        credentials: CredentialProvider,
        config: RequestConfig,
        connectivity: Arc<dyn Connectivity>,
        reporter: ErrorReporter,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                http,
                credentials,
                cache: ResponseCache::new(),
                flights: SingleFlight::new(),
                connectivity,
                reporter,
                config,
                sweeper: Mutex::new(None),
            }),
        }
    }

    pub fn credentials(&self) -> &CredentialProvider {
        &self.inner.credentials
    }

    /// Issue a request. Identical calls made while one is pending share its
    /// result.
    pub async fn request(&self, url: &str, options: RequestOptions) -> Result<Payload> {
        let signature = signature(&options.method, url, options.body.as_ref());
        if self.inner.flights.is_pending(&signature) {
            debug!(%signature, "Joining in-flight request");
        }

        let this = self.clone();
        let url = url.to_string();
        let key = signature.clone();
        self.inner
            .flights
            .run(key, move || async move { this.execute(signature, url, options).await })
            .await
    }

    /// Drop cached GETs for every URL starting with `prefix`.
    pub fn invalidate_prefix(&self, prefix: &str) {
        let removed = self.inner.cache.invalidate_prefix(prefix);
        if removed > 0 {
            debug!(removed, prefix, "Invalidated cached responses");
        }
    }

    /// Periodically drop expired cache entries until [`shutdown`](Self::shutdown).
    pub fn spawn_sweeper(&self) {
        let cache = self.inner.cache.clone();
        let interval = self.inner.config.sweep_interval();
        let handle = tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                cache.sweep();
            }
        });

        let previous = self
            .inner
            .sweeper
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(handle);
        if let Some(previous) = previous {
            previous.abort();
        }
    }

    /// Stop the sweeper and forget every cached response.
    pub fn shutdown(&self) {
        let sweeper = self
            .inner
            .sweeper
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(sweeper) = sweeper {
            sweeper.abort();
        }
        self.inner.cache.clear();
    }

    #[instrument(name = "request", skip_all, fields(method = %options.method, url = %url))]
    async fn execute(&self, signature: String, url: String, options: RequestOptions) -> Result<Payload> {
        let is_get = options.method == Method::GET;

        if is_get && !options.force_refresh {
            if let Some(payload) = self.inner.cache.get(&signature) {
                debug!("Cache hit");
                return Ok(payload);
            }
        }

        match self.with_retries(&signature, &url, &options).await {
            Ok(Served::Fresh(payload)) => {
                if is_get {
                    let ttl = options.cache_ttl.unwrap_or(self.inner.config.cache_ttl());
                    self.inner.cache.insert(signature, payload.clone(), ttl);
                }
                Ok(payload)
            }
            Ok(Served::Stale(payload)) => Ok(payload),
            Err(e) => {
                self.inner
                    .reporter
                    .report(&format!("{} {}", options.method, url), &e);
                Err(e)
            }
        }
    }

    async fn with_retries(&self, signature: &str, url: &str, options: &RequestOptions) -> Result<Served> {
        let is_get = options.method == Method::GET;
        let max_retries = options.max_retries.unwrap_or(self.inner.config.max_retries);
        let mut backoff = Backoff::new(
            options
                .initial_delay
                .unwrap_or(self.inner.config.initial_delay()),
        );
        let mut retries = 0;
        let mut refreshed = false;

        loop {
            if !self.inner.connectivity.is_online() {
                return self.offline_fallback(signature, is_get, "You are offline");
            }

            let credential = self.inner.credentials.acquire(false).await?;

            let reply = match self.attempt(url, options, &credential.token).await {
                Attempt::Reply(reply) => reply,
                Attempt::TimedOut => {
                    return Err(AppError::Timeout(format!(
                        "Request timed out after {:?}",
                        self.inner.config.timeout()
                    )));
                }
                Attempt::Network(message) => {
                    if retries >= max_retries {
                        let message = format!("{} (gave up after {} retries)", message, retries);
                        return self.offline_fallback(signature, is_get, &message);
                    }
                    retries += 1;
                    let wait = backoff.failed();
                    debug!(retries, ?wait, error = %message, "Network failure, retrying");
                    tokio::time::sleep(wait).await;
                    continue;
                }
            };

            let status = reply.status;
            if status.is_success() {
                return read_payload(reply).map(Served::Fresh);
            }

            match status {
                StatusCode::TOO_MANY_REQUESTS => {
                    if retries >= max_retries {
                        return Err(AppError::RateLimit(format!(
                            "HTTP 429 after {} retries",
                            retries
                        )));
                    }
                    retries += 1;
                    let wait = backoff.rate_limited(reply.retry_after);
                    debug!(retries, ?wait, "Rate limited, backing off");
                    tokio::time::sleep(wait).await;
                }
                StatusCode::UNAUTHORIZED => {
                    if refreshed {
                        return Err(AppError::Auth(
                            "Request was rejected after refreshing credentials".to_string(),
                        ));
                    }
                    refreshed = true;
                    debug!("Credential rejected, refreshing once");
                    self.inner.credentials.refresh().await?;
                }
                s if s.is_server_error() => {
                    if retries >= max_retries {
                        return Err(AppError::Server(format!(
                            "HTTP {} after {} retries",
                            s.as_u16(),
                            retries
                        )));
                    }
                    retries += 1;
                    let wait = backoff.failed();
                    debug!(retries, ?wait, status = s.as_u16(), "Server error, retrying");
                    tokio::time::sleep(wait).await;
                }
                _ => return Err(http_error(reply)),
            }
        }
    }

    async fn attempt(&self, url: &str, options: &RequestOptions, token: &str) -> Attempt {
        let mut request = self
            .inner
            .http
            .request(options.method.clone(), url)
            .bearer_auth(token);
        if let Some(body) = &options.body {
            request = request.json(body);
        }

        // The deadline covers the body as well as the headers
        let exchange = async {
            let response = request.send().await?;
            read_reply(response).await
        };

        match tokio::time::timeout(self.inner.config.timeout(), exchange).await {
            Err(_) => Attempt::TimedOut,
            Ok(Err(e)) if e.is_timeout() => Attempt::TimedOut,
            Ok(Err(e)) => Attempt::Network(e.to_string()),
            Ok(Ok(reply)) => Attempt::Reply(reply),
        }
    }

    fn offline_fallback(&self, signature: &str, is_get: bool, reason: &str) -> Result<Served> {
        if is_get {
            if let Some(payload) = self.inner.cache.get_stale(signature) {
                warn!(reason, "Serving cached response");
                return Ok(Served::Stale(payload));
            }
        }
        Err(AppError::Network(reason.to_string()))
    }
}

async fn read_reply(response: Response) -> reqwest::Result<Reply> {
    let status = response.status();
    let retry_after = retry_after(response.headers());
    let is_json = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.contains("json"));
    let body = response.text().await?;

    Ok(Reply {
        status,
        retry_after,
        is_json,
        body,
    })
}

fn read_payload(reply: Reply) -> Result<Payload> {
    if reply.body.trim().is_empty() {
        return Ok(Payload::Json(Value::Null));
    }
    if reply.is_json {
        return Ok(Payload::Json(serde_json::from_str(&reply.body)?));
    }
    Ok(serde_json::from_str(&reply.body)
        .map(Payload::Json)
        .unwrap_or(Payload::Text(reply.body)))
}

fn http_error(reply: Reply) -> AppError {
    let status = reply.status;
    let message = serde_json::from_str::<Value>(&reply.body)
        .ok()
        .and_then(|v| server_message(&v))
        .unwrap_or_else(|| format!("HTTP {}", status.as_u16()));

    AppError::Http {
        status: status.as_u16(),
        message,
    }
}

/// Google APIs wrap failures as `{"error": {"message": ...}}`; some
/// endpoints use `{"error": "...", "error_description": ...}`.
fn server_message(body: &Value) -> Option<String> {
    let error = body.get("error")?;
    error
        .get("message")
        .and_then(Value::as_str)
        .or_else(|| body.get("error_description").and_then(Value::as_str))
        .or_else(|| error.as_str())
        .map(str::to_string)
}
