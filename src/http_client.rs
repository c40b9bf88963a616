use crate::config::NetworkConfig;
use crate::error::ResolveError;
use futures::TryStreamExt;
use reqwest::{Client, Response, StatusCode};
use std::time::Duration;
use tokio::time::timeout;

/// Configuration for the HTTP client
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// Request timeout in seconds
    pub timeout_seconds: u64,
    /// User agent string
    pub user_agent: String,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        NetworkConfig::default().into()
    }
}

impl From<NetworkConfig> for HttpClientConfig {
    fn from(network: NetworkConfig) -> Self {
        Self {
            timeout_seconds: network.timeout_seconds,
            user_agent: network.user_agent,
        }
    }
}

/// Async HTTP client for downloading remote schemas
pub struct AsyncHttpClient {
    client: Client,
    config: HttpClientConfig,
}

impl AsyncHttpClient {
    pub fn new(config: HttpClientConfig) -> Result<Self, ResolveError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .user_agent(&config.user_agent)
            .pool_idle_timeout(Duration::from_secs(30))
            .pool_max_idle_per_host(10)
            .build()?;

        Ok(Self { client, config })
    }

    /// Download a schema. A single attempt; failures are reported, not retried.
    pub async fn download_schema(&self, url: &str) -> Result<Vec<u8>, ResolveError> {
        let response = self.get_response(url).await?;

        let mut buffer = Vec::with_capacity(response.content_length().unwrap_or(0) as usize);
        let mut stream = response.bytes_stream();
        while let Some(chunk) = TryStreamExt::try_next(&mut stream)
            .await
            .map_err(|e| self.map_transport_error(url, e))?
        {
            buffer.extend_from_slice(&chunk);
        }

        Ok(buffer)
    }

    async fn get_response(&self, url: &str) -> Result<Response, ResolveError> {
        let response = self.make_request(url).await?;
        let status = response.status();

        if status.is_success() {
            Ok(response)
        } else if status == StatusCode::NOT_FOUND || status == StatusCode::GONE {
            Err(ResolveError::NotFound {
                url: url.to_string(),
            })
        } else {
            Err(ResolveError::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            })
        }
    }

    /// Make a single HTTP request with timeout
    async fn make_request(&self, url: &str) -> Result<Response, ResolveError> {
        let request_future = self.client.get(url).send();

        timeout(self.timeout(), request_future)
            .await
            .map_err(|_| self.timeout_error(url))?
            .map_err(|e| self.map_transport_error(url, e))
    }

    fn map_transport_error(&self, url: &str, error: reqwest::Error) -> ResolveError {
        if error.is_timeout() {
            self.timeout_error(url)
        } else {
            ResolveError::Http(error)
        }
    }

    fn timeout_error(&self, url: &str) -> ResolveError {
        ResolveError::Timeout {
            url: url.to_string(),
            timeout_seconds: self.config.timeout_seconds,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.config.timeout_seconds)
    }

    pub fn config(&self) -> &HttpClientConfig {
        &self.config
    }
}
