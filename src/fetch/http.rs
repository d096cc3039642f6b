//! eRegulations JSON API client.
//!
//! Maps each [`EntityKind`] onto its REST endpoint:
//!
//! | Kind           | Endpoint                              |
//! |----------------|---------------------------------------|
//! | `Procedure`    | `Procedures/{id}`                     |
//! | `Steps`        | `Procedures/{id}` (steps from blocks) |
//! | `Requirements` | `Procedures/{id}/ABC/Requirements`    |
//! | `Costs`        | `Procedures/{id}/Totals`              |
//! | `Institution`  | `Institutions/{id}`                   |

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use tracing::debug;

use super::source::EntitySource;
use crate::config::UpstreamConfig;
use crate::types::{EntityKind, FetchKey};
use crate::{ProcedexError, Result, version};

/// HTTP implementation of [`EntitySource`].
#[derive(Clone)]
pub struct HttpSource {
    http: Client,
    base_url: String,
    api_key: Option<String>,
    timeout: Duration,
}

impl HttpSource {
    /// Build a client from upstream configuration.
    pub fn new(config: &UpstreamConfig) -> Result<Self> {
        let timeout = Duration::from_secs(config.request_timeout_secs);
        let http = Client::builder()
            .timeout(timeout)
            .user_agent(version::user_agent())
            .build()
            .map_err(|e| {
                ProcedexError::Configuration(format!("failed to build HTTP client: {e}"))
            })?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key(),
            timeout,
        })
    }

    /// Create a client against a custom base URL (for testing with wiremock).
    pub fn with_base_url(base_url: impl Into<String>) -> Result<Self> {
        Self::new(&UpstreamConfig {
            base_url: base_url.into(),
            ..UpstreamConfig::default()
        })
    }

    /// Attach a bearer token.
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Absolute URL for a key.
    pub fn endpoint(&self, key: FetchKey) -> String {
        let path = match key.kind {
            EntityKind::Procedure | EntityKind::Steps => format!("Procedures/{}", key.id),
            EntityKind::Requirements => format!("Procedures/{}/ABC/Requirements", key.id),
            EntityKind::Costs => format!("Procedures/{}/Totals", key.id),
            EntityKind::Institution => format!("Institutions/{}", key.id),
        };
        format!("{}/{path}", self.base_url)
    }

    fn check_status(response: &reqwest::Response, key: FetchKey) -> Result<()> {
        let status = response.status();

        if status.is_success() {
            return Ok(());
        }

        match status {
            StatusCode::NOT_FOUND => Err(ProcedexError::NotFound(key)),
            StatusCode::TOO_MANY_REQUESTS => {
                let retry_after = response
                    .headers()
                    .get(reqwest::header::RETRY_AFTER)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|s| s.parse::<u64>().ok())
                    .map(Duration::from_secs);
                Err(ProcedexError::RateLimited { retry_after })
            }
            code => Err(ProcedexError::Api {
                status: code.as_u16(),
                message: format!("eRegulations API error for {key}: {code}"),
            }),
        }
    }
}

#[async_trait]
impl EntitySource for HttpSource {
    fn name(&self) -> &str {
        "eregulations-http"
    }

    async fn fetch(&self, key: FetchKey) -> Result<serde_json::Value> {
        let url = self.endpoint(key);
        debug!(%key, %url, "requesting upstream entity");

        let mut request = self
            .http
            .get(&url)
            .header(reqwest::header::ACCEPT, "application/json");
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                ProcedexError::Timeout(self.timeout)
            } else {
                ProcedexError::Http(e.to_string())
            }
        })?;

        Self::check_status(&response, key)?;

        response
            .json::<serde_json::Value>()
            .await
            .map_err(|e| ProcedexError::Corrupt {
                key,
                reason: e.to_string(),
            })
    }
}
