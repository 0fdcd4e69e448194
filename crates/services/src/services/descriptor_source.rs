//! Fetching the published version descriptor.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use reqwest::{
    Client,
    header::{CACHE_CONTROL, PRAGMA},
};
use thiserror::Error;
use url::Url;
use utils::update_url::UrlParams;

use super::{clock::Clock, version_descriptor::VersionDescriptor};

#[derive(Debug, Clone, Error)]
pub enum FetchError {
    #[error("network error: {0}")]
    Transport(String),
    #[error("timeout")]
    Timeout,
    #[error("http {status}")]
    Http { status: u16 },
    #[error("malformed descriptor: {0}")]
    Malformed(String),
}

/// Source of the deployed build's descriptor
#[async_trait]
pub trait DescriptorSource: Send + Sync {
    async fn fetch(&self) -> Result<VersionDescriptor, FetchError>;
}

/// Fetches the descriptor over HTTP, bypassing every cache layer
#[derive(Clone)]
pub struct HttpDescriptorSource {
    http: Client,
    url: Url,
    params: UrlParams,
    clock: Arc<dyn Clock>,
}

impl HttpDescriptorSource {
    const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

    pub fn new(url: Url, params: UrlParams, clock: Arc<dyn Clock>) -> Result<Self, FetchError> {
        let http = Client::builder()
            .timeout(Self::REQUEST_TIMEOUT)
            .user_agent(concat!("update-reconciler/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        Ok(Self {
            http,
            url,
            params,
            clock,
        })
    }
}

#[async_trait]
impl DescriptorSource for HttpDescriptorSource {
    async fn fetch(&self) -> Result<VersionDescriptor, FetchError> {
        let url = self.params.cache_busted(&self.url, self.clock.now_ms());
        let res = self
            .http
            .get(url)
            .header(CACHE_CONTROL, "no-store, no-cache")
            .header(PRAGMA, "no-cache")
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = res.status();
        if !status.is_success() {
            return Err(FetchError::Http {
                status: status.as_u16(),
            });
        }

        let body = res.text().await.map_err(map_reqwest_error)?;
        parse_descriptor(&body)
    }
}

pub fn parse_descriptor(body: &str) -> Result<VersionDescriptor, FetchError> {
    serde_json::from_str(body).map_err(|e| FetchError::Malformed(e.to_string()))
}

fn map_reqwest_error(e: reqwest::Error) -> FetchError {
    if e.is_timeout() {
        FetchError::Timeout
    } else {
        FetchError::Transport(e.to_string())
    }
}
