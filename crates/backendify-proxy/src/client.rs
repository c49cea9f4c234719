//! Company registry backend client

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client, header};
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

use crate::error::ProxyError;

/// Backend client configuration
#[derive(Clone, Debug)]
pub struct BackendClientConfig {
    /// Upper bound for a single backend round trip
    pub request_timeout: Duration,
    /// Idle keep-alive connections retained per backend host
    pub pool_max_idle_per_host: usize,
}

impl Default for BackendClientConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(5),
            pool_max_idle_per_host: 32,
        }
    }
}

/// Raw response returned by a backend, before any dialect decoding
#[derive(Debug, Clone)]
pub struct BackendResponse {
    pub status: u16,
    /// Declared `Content-Type`, if the backend sent one
    pub content_type: Option<String>,
    pub body: Bytes,
}

impl BackendResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Source of raw company records.
///
/// The fetch engine only talks to backends through this trait, so the HTTP
/// client can be swapped for the mock backend or a scripted test double.
#[async_trait]
pub trait CompanySource: Send + Sync {
    /// Issue one `GET <origin>/companies/<id>`
    async fn get_company(&self, origin: &str, id: &str) -> Result<BackendResponse, ProxyError>;
}

/// HTTP client for company registry backends
pub struct BackendClient {
    config: BackendClientConfig,
    client: Client,
}

impl BackendClient {
    /// Create a new backend client
    pub fn new(config: BackendClientConfig) -> Result<Self, ProxyError> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .pool_max_idle_per_host(config.pool_max_idle_per_host)
            .build()?;

        info!(
            "Created backend client (timeout: {:?}, idle connections per host: {})",
            config.request_timeout, config.pool_max_idle_per_host
        );

        Ok(Self { config, client })
    }
}

/// Build `<origin>/companies/<id>`, percent-encoding the id as a single segment
pub fn company_url(origin: &str, id: &str) -> Result<Url, ProxyError> {
    let mut url = Url::parse(origin).map_err(|e| ProxyError::InvalidOrigin(format!("{origin}: {e}")))?;

    url.path_segments_mut()
        .map_err(|_| ProxyError::InvalidOrigin(origin.to_string()))?
        .pop_if_empty()
        .push("companies")
        .push(id);

    Ok(url)
}

#[async_trait]
impl CompanySource for BackendClient {
    async fn get_company(&self, origin: &str, id: &str) -> Result<BackendResponse, ProxyError> {
        let url = company_url(origin, id)?;
        debug!("Fetching company from backend: {}", url);

        let response = self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                ProxyError::Unavailable(format!(
                    "no answer within {:?}",
                    self.config.request_timeout
                ))
            } else {
                ProxyError::Http(e)
            }
        })?;
        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|h| h.to_str().ok())
            .map(str::to_string);
        let body = response.bytes().await?;

        debug!(
            "Backend answered {} ({} bytes, content-type: {:?})",
            status,
            body.len(),
            content_type
        );

        Ok(BackendResponse {
            status,
            content_type,
            body,
        })
    }
}
