use crate::error::ResolverError;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Response};
use std::time::Duration;
use tokio::time::{sleep, timeout};

/// Configuration for the HTTP client
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// Request timeout in seconds
    pub timeout_seconds: u64,
    /// Number of retry attempts
    pub retry_attempts: u32,
    /// Initial retry delay in milliseconds
    pub retry_delay_ms: u64,
    /// Maximum retry delay in milliseconds (for exponential backoff cap)
    pub max_retry_delay_ms: u64,
    /// User agent string
    pub user_agent: String,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: 30,
            retry_attempts: 3,
            retry_delay_ms: 1000,
            max_retry_delay_ms: 30000,
            user_agent: format!("xml-resolve/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// Body of a remote document together with the charset its server declared
#[derive(Debug, Clone)]
pub struct FetchedDocument {
    pub data: Vec<u8>,
    pub encoding: Option<String>,
}

/// Async HTTP client for remote catalogs and remote XML resources
#[derive(Clone)]
pub struct AsyncHttpClient {
    client: Client,
    config: HttpClientConfig,
}

impl AsyncHttpClient {
    /// Create a new async HTTP client with the given configuration
    pub fn new(config: HttpClientConfig) -> Result<Self, ResolverError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .user_agent(&config.user_agent)
            .pool_idle_timeout(Duration::from_secs(30))
            .pool_max_idle_per_host(10)
            .build()
            .map_err(ResolverError::from)?;

        Ok(Self { client, config })
    }

    /// Download a document with retry logic and exponential backoff
    pub async fn download(&self, url: &str) -> Result<Vec<u8>, ResolverError> {
        Ok(self.fetch(url).await?.data)
    }

    /// Download a document and keep the charset from its `Content-Type` header
    pub async fn fetch(&self, url: &str) -> Result<FetchedDocument, ResolverError> {
        let response = self.get_response_with_retry(url, 0).await?;
        let encoding = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .and_then(charset_of);
        let bytes = response.bytes().await.map_err(ResolverError::from)?;
        Ok(FetchedDocument {
            data: bytes.to_vec(),
            encoding,
        })
    }

    /// Reachability probe: open a connection, check the status and drop the response
    /// without reading the body. No retries.
    pub async fn probe(&self, url: &str) -> bool {
        match self.make_request(url).await {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }

    /// Get response with retry logic
    async fn get_response_with_retry(
        &self,
        url: &str,
        attempt: u32,
    ) -> Result<Response, ResolverError> {
        // Use a loop instead of recursion to avoid boxing issues
        let mut current_attempt = attempt;

        loop {
            match self.make_request(url).await {
                Ok(response) => {
                    if response.status().is_success() {
                        return Ok(response);
                    } else {
                        let status = response.status();
                        let error = ResolverError::HttpStatus {
                            url: url.to_string(),
                            status: status.as_u16(),
                            message: format!(
                                "HTTP {}: {}",
                                status.as_u16(),
                                status.canonical_reason().unwrap_or("Unknown")
                            ),
                        };

                        // Retry on server errors (5xx) but not client errors (4xx)
                        if status.is_server_error() && current_attempt < self.config.retry_attempts
                        {
                            self.wait_before_retry(current_attempt).await;
                            current_attempt += 1;
                            continue;
                        }

                        return Err(error);
                    }
                }
                Err(error) => {
                    if current_attempt < self.config.retry_attempts
                        && self.is_retryable_error(&error)
                    {
                        self.wait_before_retry(current_attempt).await;
                        current_attempt += 1;
                        continue;
                    }
                    return Err(error);
                }
            }
        }
    }

    /// Make a single HTTP request with timeout
    async fn make_request(&self, url: &str) -> Result<Response, ResolverError> {
        let request_future = self.client.get(url).send();

        timeout(
            Duration::from_secs(self.config.timeout_seconds),
            request_future,
        )
        .await
        .map_err(|_| ResolverError::Timeout {
            url: url.to_string(),
            timeout_seconds: self.config.timeout_seconds,
        })?
        .map_err(ResolverError::from)
    }

    /// Wait before retry with exponential backoff
    async fn wait_before_retry(&self, attempt: u32) {
        sleep(self.retry_delay(attempt)).await;
    }

    fn retry_delay(&self, attempt: u32) -> Duration {
        let delay_ms = self
            .config
            .retry_delay_ms
            .saturating_mul(2_u64.saturating_pow(attempt));
        Duration::from_millis(delay_ms.min(self.config.max_retry_delay_ms))
    }

    /// Check if an error is retryable
    fn is_retryable_error(&self, error: &ResolverError) -> bool {
        match error {
            ResolverError::Http(reqwest_error) => {
                // Retry on network errors, timeouts, but not on invalid URLs or similar
                reqwest_error.is_timeout() || reqwest_error.is_connect()
            }
            ResolverError::Timeout { .. } => true,
            _ => false,
        }
    }

    /// Get the client configuration
    pub fn config(&self) -> &HttpClientConfig {
        &self.config
    }
}

/// Extract the `charset` parameter of a `Content-Type` header value
fn charset_of(content_type: &str) -> Option<String> {
    content_type.split(';').skip(1).find_map(|param| {
        let (name, value) = param.split_once('=')?;
        name.trim()
            .eq_ignore_ascii_case("charset")
            .then(|| value.trim().trim_matches('"').to_string())
            .filter(|value| !value.is_empty())
    })
}
