pub mod error;

pub use error::{BrowserlessError, Result};

use std::time::Duration;

use serde::Serialize;
use tracing::debug;

const DEFAULT_RENDER_TIMEOUT: Duration = Duration::from_secs(30);

/// Request body for the `/content` endpoint.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ContentRequest<'a> {
    url: &'a str,
    goto_options: GotoOptions,
    #[serde(skip_serializing_if = "Option::is_none")]
    user_agent: Option<&'a str>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GotoOptions {
    wait_until: &'static str,
    timeout: u64,
}

pub struct BrowserlessClient {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
    render_timeout: Duration,
    user_agent: Option<String>,
}

impl BrowserlessClient {
    pub fn new(base_url: &str, token: Option<&str>) -> Result<Self> {
        Self::with_timeout(base_url, token, DEFAULT_RENDER_TIMEOUT)
    }

    /// Build a client whose page navigation gives up after `render_timeout`.
    /// The HTTP request itself gets a few extra seconds of headroom.
    pub fn with_timeout(base_url: &str, token: Option<&str>, render_timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(render_timeout + Duration::from_secs(5))
            .build()
            .map_err(|e| BrowserlessError::Setup(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.map(String::from),
            render_timeout,
            user_agent: None,
        })
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    fn content_endpoint(&self) -> String {
        match self.token {
            Some(ref token) => format!("{}/content?token={token}", self.base_url),
            None => format!("{}/content", self.base_url),
        }
    }

    /// Fetch fully-rendered HTML content for a URL via Browserless /content endpoint.
    pub async fn content(&self, url: &str) -> Result<String> {
        let timeout_ms = self.render_timeout.as_millis() as u64;
        let body = ContentRequest {
            url,
            goto_options: GotoOptions {
                wait_until: "networkidle2",
                timeout: timeout_ms,
            },
            user_agent: self.user_agent.as_deref(),
        };

        debug!(url, "Browserless render");
        let resp = self
            .client
            .post(self.content_endpoint())
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    BrowserlessError::Timeout(timeout_ms)
                } else {
                    BrowserlessError::from(e)
                }
            })?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(BrowserlessError::Api {
                status: status.as_u16(),
                message,
            });
        }

        Ok(resp.text().await?)
    }
}
