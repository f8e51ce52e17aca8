//! HTTP client with connection pooling and retry logic

use reqwest::{Client, Response};
use std::time::Duration;
use urpm_errors::{Error, NetworkError};
use urpm_types::IpMode;

/// Network client configuration
#[derive(Debug, Clone)]
pub struct NetConfig {
    /// Per-chunk inactivity timeout; a stream with no data for this long
    /// is considered stalled
    pub inactivity_timeout: Duration,
    pub connect_timeout: Duration,
    pub pool_idle_timeout: Duration,
    pub pool_max_idle_per_host: usize,
    pub retry_count: u32,
    pub retry_delay: Duration,
    pub user_agent: String,
    pub ip_mode: IpMode,
}

impl Default for NetConfig {
    fn default() -> Self {
        Self {
            inactivity_timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(15),
            pool_idle_timeout: Duration::from_secs(90),
            pool_max_idle_per_host: 8,
            retry_count: 3,
            retry_delay: Duration::from_secs(1),
            user_agent: format!("urpm/{}", env!("CARGO_PKG_VERSION")),
            ip_mode: IpMode::Auto,
        }
    }
}

/// HTTP client wrapper with retry logic
#[derive(Clone)]
pub struct NetClient {
    client: Client,
    config: NetConfig,
}

impl NetClient {
    /// Create a new network client
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying HTTP client fails to
    /// initialize.
    pub fn new(config: NetConfig) -> Result<Self, Error> {
        let mut builder = Client::builder()
            .connect_timeout(config.connect_timeout)
            .read_timeout(config.inactivity_timeout)
            .pool_idle_timeout(config.pool_idle_timeout)
            .pool_max_idle_per_host(config.pool_max_idle_per_host)
            .user_agent(&config.user_agent);

        builder = match config.ip_mode {
            IpMode::V4 => builder.local_address("0.0.0.0".parse::<std::net::IpAddr>().ok()),
            IpMode::V6 => builder.local_address("::".parse::<std::net::IpAddr>().ok()),
            IpMode::Auto | IpMode::Dual => builder,
        };

        let client = builder
            .build()
            .map_err(|e| NetworkError::ConnectionRefused(e.to_string()))?;

        Ok(Self { client, config })
    }

    /// Create with default configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn with_defaults() -> Result<Self, Error> {
        Self::new(NetConfig::default())
    }

    /// Execute a GET request with retries
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails after all retry attempts.
    pub async fn get(&self, url: &str) -> Result<Response, Error> {
        self.retry_request(|| self.client.get(url).send(), url).await
    }

    /// GET with a Range header, for resumed downloads
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails after all retry attempts.
    pub async fn get_range(&self, url: &str, from_byte: u64) -> Result<Response, Error> {
        self.retry_request(
            || {
                self.client
                    .get(url)
                    .header(reqwest::header::RANGE, format!("bytes={from_byte}-"))
                    .send()
            },
            url,
        )
        .await
    }

    /// Execute a HEAD request with retries
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails after all retry attempts.
    pub async fn head(&self, url: &str) -> Result<Response, Error> {
        self.retry_request(|| self.client.head(url).send(), url).await
    }

    /// POST a JSON body; no retries (write requests are not idempotent
    /// from our side)
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or times out.
    pub async fn post_json<T: serde::Serialize + ?Sized>(
        &self,
        url: &str,
        body: &T,
        timeout: Duration,
    ) -> Result<Response, Error> {
        self.client
            .post(url)
            .timeout(timeout)
            .json(body)
            .send()
            .await
            .map_err(|e| classify(&e, url))
    }

    /// Direct access for callers that need request-level control
    #[must_use]
    pub fn inner(&self) -> &Client {
        &self.client
    }

    async fn retry_request<F, Fut>(&self, mut make: F, url: &str) -> Result<Response, Error>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = reqwest::Result<Response>>,
    {
        let mut last_err = None;
        for attempt in 0..=self.config.retry_count {
            if attempt > 0 {
                tokio::time::sleep(self.config.retry_delay * attempt).await;
            }
            match make().await {
                Ok(response) => {
                    // Server errors are retryable; client errors are not
                    if response.status().is_server_error()
                        && attempt < self.config.retry_count
                    {
                        last_err = Some(
                            NetworkError::HttpError {
                                status: response.status().as_u16(),
                                message: response.status().to_string(),
                            }
                            .into(),
                        );
                        continue;
                    }
                    return Ok(response);
                }
                Err(e) => last_err = Some(classify(&e, url)),
            }
        }
        Err(last_err.unwrap_or_else(|| {
            NetworkError::DownloadFailed(format!("request to {url} failed")).into()
        }))
    }
}

fn classify(e: &reqwest::Error, url: &str) -> Error {
    if e.is_timeout() {
        NetworkError::Timeout {
            url: url.to_string(),
        }
        .into()
    } else if e.is_connect() {
        NetworkError::ConnectionRefused(e.to_string()).into()
    } else {
        NetworkError::DownloadFailed(e.to_string()).into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_policy() {
        let c = NetConfig::default();
        assert_eq!(c.inactivity_timeout, Duration::from_secs(30));
        assert_eq!(c.retry_count, 3);
        assert!(c.user_agent.starts_with("urpm/"));
    }

    #[test]
    fn client_builds_for_every_ip_mode() {
        for mode in [IpMode::Auto, IpMode::V4, IpMode::V6, IpMode::Dual] {
            let config = NetConfig {
                ip_mode: mode,
                ..NetConfig::default()
            };
            assert!(NetClient::new(config).is_ok());
        }
    }
}
