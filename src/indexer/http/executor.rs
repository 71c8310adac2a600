//! HTTP execution with rate limiting and retries
//!
//! The executor owns policy (spacing, retries, status handling). Putting bytes
//! on the wire is delegated to an [`HttpTransport`], which is `reqwest` in
//! production and a scripted fake in tests.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use backoff::ExponentialBackoff;
use backoff::backoff::Backoff;
use reqwest::redirect::Policy;
use reqwest::{Client, Method};
use tracing::{debug, trace, warn};

use super::rate_limiter::RateLimiterPool;
use super::{HttpMethod, RawResponse, RequestDescriptor};
use crate::config::CoreConfig;
use crate::error::{IndexerError, Result};

/// Sends one request, no retries, no rate limiting
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(&self, request: Arc<RequestDescriptor>, timeout: Duration) -> Result<RawResponse>;
}

/// [`HttpTransport`] backed by reqwest
///
/// Cookies are managed by the session store, so the clients keep no cookie
/// jar of their own.
pub struct ReqwestTransport {
    following: Client,
    non_following: Client,
}

impl ReqwestTransport {
    pub fn new(user_agent: &str, proxy_url: Option<&str>) -> Result<Self> {
        let build = |policy: Policy| -> Result<Client> {
            let mut builder = Client::builder()
                .user_agent(user_agent)
                .redirect(policy)
                .gzip(true);
            if let Some(proxy) = proxy_url {
                let proxy = reqwest::Proxy::all(proxy)
                    .map_err(|e| IndexerError::Config(format!("invalid proxy '{}': {}", proxy, e)))?;
                builder = builder.proxy(proxy);
            }
            builder
                .build()
                .map_err(|e| IndexerError::Config(format!("failed to build HTTP client: {}", e)))
        };

        Ok(Self {
            following: build(Policy::limited(10))?,
            non_following: build(Policy::none())?,
        })
    }

    pub fn from_config(config: &CoreConfig) -> Result<Self> {
        Self::new(&config.user_agent, config.proxy_url.as_deref())
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: Arc<RequestDescriptor>, timeout: Duration) -> Result<RawResponse> {
        let client = if request.allow_redirect {
            &self.following
        } else {
            &self.non_following
        };

        let method = match request.method {
            HttpMethod::Get => Method::GET,
            HttpMethod::Post => Method::POST,
            HttpMethod::Head => Method::HEAD,
        };

        let mut builder = client.request(method, &request.url).timeout(timeout);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(cookie) = request.cookie_header() {
            builder = builder.header(reqwest::header::COOKIE, cookie);
        }
        if !request.keep_alive {
            builder = builder.header(reqwest::header::CONNECTION, "close");
        }
        if let Some(ref body) = request.body {
            builder = builder.body(body.clone());
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let headers: Vec<(String, String)> = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let body = response.bytes().await?;

        let mut raw = RawResponse::new(request, status, body.to_vec());
        for (name, value) in &headers {
            raw = raw.with_header(name, value);
        }
        Ok(raw)
    }
}

/// Retry configuration
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Retries after a network failure
    pub max_retries: u32,
    /// Initial backoff duration
    pub initial_interval: Duration,
    /// Maximum backoff duration
    pub max_interval: Duration,
    /// Multiplier for exponential backoff
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_interval: Duration::from_millis(500),
            max_interval: Duration::from_secs(10),
            multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    pub fn from_config(config: &CoreConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            initial_interval: config.retry_initial_interval,
            max_interval: config.retry_max_interval,
            ..Default::default()
        }
    }

    /// Create an ExponentialBackoff from this config
    pub fn to_backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            initial_interval: self.initial_interval,
            max_interval: self.max_interval,
            multiplier: self.multiplier,
            randomization_factor: 0.1,
            max_elapsed_time: None,
            ..Default::default()
        }
    }
}

/// Rate-limited, retrying request executor shared by all indexers
pub struct HttpExecutor {
    transport: Arc<dyn HttpTransport>,
    limiter: RateLimiterPool,
    retry: RetryConfig,
    default_timeout: Duration,
}

impl HttpExecutor {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        default_rate_limit: Duration,
        retry: RetryConfig,
        default_timeout: Duration,
    ) -> Self {
        Self {
            transport,
            limiter: RateLimiterPool::new(default_rate_limit),
            retry,
            default_timeout,
        }
    }

    pub fn from_config(config: &CoreConfig) -> Result<Self> {
        Ok(Self::with_transport(
            Arc::new(ReqwestTransport::from_config(config)?),
            config,
        ))
    }

    pub fn with_transport(transport: Arc<dyn HttpTransport>, config: &CoreConfig) -> Self {
        Self::new(
            transport,
            config.default_rate_limit,
            RetryConfig::from_config(config),
            config.request_timeout,
        )
    }

    /// Set the minimum interval between requests to `indexer_id`
    pub fn set_rate_limit(&self, indexer_id: &str, interval: Duration) {
        self.limiter.configure(indexer_id, interval);
    }

    pub fn rate_limit(&self, indexer_id: &str) -> Duration {
        self.limiter.interval(indexer_id)
    }

    /// Execute a request on behalf of `indexer_id`.
    ///
    /// Every attempt, retries included, waits for the indexer's rate limit.
    /// Network failures are retried up to `max_retries` times with backoff; a
    /// 5xx response is retried once. Non-2xx responses become
    /// [`IndexerError::HttpStatus`] unless the request suppresses HTTP errors.
    /// Redirects are returned as-is when the request does not follow them.
    pub async fn execute(&self, indexer_id: &str, request: &RequestDescriptor) -> Result<RawResponse> {
        let request = Arc::new(request.clone());
        let timeout = request.timeout.unwrap_or(self.default_timeout);
        let mut backoff = self.retry.to_backoff();
        let mut network_retries = 0;
        let mut server_retried = false;

        loop {
            self.limiter.acquire(indexer_id, request.rate_limit).await?;
            debug!(indexer_id = %indexer_id, "{}", request);

            let response = match self.transport.send(request.clone(), timeout).await {
                Ok(response) => response,
                Err(e) if e.is_transient() && network_retries < self.retry.max_retries => {
                    network_retries += 1;
                    let delay = backoff.next_backoff().unwrap_or(self.retry.max_interval);
                    warn!(
                        indexer_id = %indexer_id,
                        attempt = network_retries,
                        error = %e,
                        retry_in_ms = delay.as_millis() as u64,
                        "Request failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    continue;
                }
                Err(e) => {
                    warn!(indexer_id = %indexer_id, url = %request.url, error = %e, "Request failed");
                    return Err(e);
                }
            };

            debug!(
                indexer_id = %indexer_id,
                status = response.status,
                bytes = response.body.len(),
                "Response received"
            );
            if request.log_response_content {
                trace!(indexer_id = %indexer_id, body = %response.text(), "Response content");
            }

            if response.status >= 500 && !server_retried {
                server_retried = true;
                let delay = backoff.next_backoff().unwrap_or(self.retry.initial_interval);
                warn!(
                    indexer_id = %indexer_id,
                    status = response.status,
                    retry_in_ms = delay.as_millis() as u64,
                    "Server error, retrying once"
                );
                tokio::time::sleep(delay).await;
                continue;
            }

            if response.status >= 400 && !request.suppress_http_error {
                return Err(IndexerError::HttpStatus {
                    status: response.status,
                    url: request.url.clone(),
                });
            }

            return Ok(response);
        }
    }
}
