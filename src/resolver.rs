//! Turning schema locators into absolute URLs and bytes.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::timeout;
use url::Url;

use crate::config::NetworkConfig;
use crate::error::{ResolveError, ResolveResult};
use crate::http_client::AsyncHttpClient;
use crate::libxml2::LibXml2Wrapper;

/// Reads the bytes behind an absolute URL
#[async_trait]
pub trait ResourceFetcher: Send + Sync {
    async fn fetch(&self, url: &Url) -> ResolveResult<Vec<u8>>;
}

/// Fetches `file:` URLs from disk and `http(s):` URLs over the network
pub struct DefaultFetcher {
    http: AsyncHttpClient,
    timeout: Duration,
}

impl DefaultFetcher {
    pub fn new(network: &NetworkConfig) -> ResolveResult<Self> {
        Ok(Self {
            http: AsyncHttpClient::new(network.clone().into())?,
            timeout: Duration::from_secs(network.timeout_seconds),
        })
    }

    async fn read_file(&self, url: &Url) -> ResolveResult<Vec<u8>> {
        let path = url.to_file_path().map_err(|_| ResolveError::InvalidLocator {
            locator: url.to_string(),
            reason: "not a local file path".to_string(),
        })?;

        match timeout(self.timeout, tokio::fs::read(&path)).await {
            Err(_) => Err(ResolveError::Timeout {
                url: url.to_string(),
                timeout_seconds: self.timeout.as_secs(),
            }),
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::NotFound => Err(ResolveError::NotFound {
                url: url.to_string(),
            }),
            Ok(Err(source)) => Err(ResolveError::Io {
                url: url.to_string(),
                source,
            }),
            Ok(Ok(bytes)) => Ok(bytes),
        }
    }
}

#[async_trait]
impl ResourceFetcher for DefaultFetcher {
    async fn fetch(&self, url: &Url) -> ResolveResult<Vec<u8>> {
        match url.scheme() {
            "file" => self.read_file(url).await,
            "http" | "https" => self.http.download_schema(url.as_str()).await,
            scheme => Err(ResolveError::UnsupportedScheme {
                scheme: scheme.to_string(),
                url: url.to_string(),
            }),
        }
    }
}

/// Resolves locators against a document's location and fetches what they name
#[derive(Clone)]
pub struct ResourceResolver {
    fetcher: Arc<dyn ResourceFetcher>,
}

impl ResourceResolver {
    pub fn new(fetcher: Arc<dyn ResourceFetcher>) -> Self {
        Self { fetcher }
    }

    /// Resolve `locator` to an absolute URL.
    ///
    /// Absolute URLs and absolute file paths stand alone; anything else needs
    /// `base`, and fails with [`ResolveError::NoBaseLocation`] without one.
    pub fn resolve(locator: &str, base: Option<&Url>) -> ResolveResult<Url> {
        let locator = locator.trim();
        if locator.is_empty() {
            return Err(ResolveError::InvalidLocator {
                locator: locator.to_string(),
                reason: "empty locator".to_string(),
            });
        }

        // A one-letter scheme is a Windows drive letter, not a URL
        match Url::parse(locator) {
            Ok(url) if url.scheme().len() > 1 => return Ok(url),
            _ => {}
        }

        let path = Path::new(locator);
        if path.is_absolute() {
            return Url::from_file_path(path).map_err(|_| ResolveError::InvalidLocator {
                locator: locator.to_string(),
                reason: "not a valid file path".to_string(),
            });
        }

        match base {
            Some(base) => base.join(locator).map_err(|e| ResolveError::InvalidLocator {
                locator: locator.to_string(),
                reason: e.to_string(),
            }),
            None => Err(ResolveError::NoBaseLocation {
                locator: locator.to_string(),
            }),
        }
    }

    /// True when `locator` can only be resolved against a base location
    pub fn is_relative(locator: &str) -> bool {
        matches!(
            Self::resolve(locator, None),
            Err(ResolveError::NoBaseLocation { .. })
        )
    }

    /// Look up a DTD public identifier in the XML catalogs
    pub fn resolve_public_id(&self, public_id: &str) -> Option<Url> {
        let uri = LibXml2Wrapper::new().resolve_public(public_id)?;
        Self::resolve(&uri, None).ok()
    }

    pub async fn fetch(&self, url: &Url) -> ResolveResult<Vec<u8>> {
        self.fetcher.fetch(url).await
    }
}
