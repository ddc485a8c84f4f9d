//! HTTP client for the upstream versions endpoint

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tracing::{debug, error, instrument};

use super::parser;
use super::{FetchOutcome, ProtocolFetchError, VersionSource};
use crate::config::UpstreamConfig;

/// Fetches `<base_url>/<product>/versions` and parses the body
///
/// One request per call, no retries: the next poll cycle is the retry.
#[derive(Debug, Clone)]
pub struct ProtocolClient {
    client: Client,
    base_url: String,
}

impl ProtocolClient {
    pub fn new(config: &UpstreamConfig) -> Result<Self, ProtocolFetchError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.fetch_timeout_secs))
            .user_agent(config.user_agent.as_str())
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Client against the public EU endpoint with default timeout and user agent
    pub fn with_defaults() -> Result<Self, ProtocolFetchError> {
        Self::new(&UpstreamConfig::default())
    }

    pub fn versions_url(&self, product: &str) -> String {
        format!("{}/{}/versions", self.base_url, product)
    }

    /// Fetch and parse, classifying the result
    #[instrument(skip(self))]
    pub async fn fetch_outcome(&self, product: &str) -> FetchOutcome {
        match self.request(product).await {
            Ok(Some(body)) => FetchOutcome::Rows(parser::parse(&body)),
            Ok(None) => {
                debug!(product, "Upstream has no versions document for product");
                FetchOutcome::NotFound
            },
            Err(e) => {
                error!(product, error = %e, "Version fetch failed");
                FetchOutcome::Unavailable(e)
            },
        }
    }

    /// Fetch and parse; failures and "not found" both come back empty
    pub async fn fetch(&self, product: &str) -> Vec<crate::models::ParsedFieldRow> {
        self.fetch_outcome(product).await.into_rows()
    }

    /// `Ok(None)` on 404, the decoded body on 2xx
    async fn request(&self, product: &str) -> Result<Option<String>, ProtocolFetchError> {
        let response = self.client.get(self.versions_url(product)).send().await?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(ProtocolFetchError::Status(status.as_u16()));
        }

        let bytes = response.bytes().await?;
        let body = String::from_utf8(bytes.to_vec())?;
        Ok(Some(body))
    }
}

#[async_trait]
impl VersionSource for ProtocolClient {
    async fn fetch_versions(&self, product: &str) -> FetchOutcome {
        self.fetch_outcome(product).await
    }
}
