pub mod error;

pub use error::{BrowserlessError, Result};

use std::time::Duration;

use serde::Serialize;
use tracing::debug;

/// How long to let the page settle before the DOM is captured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitCondition {
    /// Wait for the network to go idle (no in-flight requests).
    NetworkIdle,
    /// Wait a fixed number of milliseconds after load.
    Delay(u64),
}

#[derive(Debug, Clone)]
pub struct RenderOptions {
    pub wait: WaitCondition,
    /// Overall render budget, seconds.
    pub timeout_secs: u64,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            wait: WaitCondition::NetworkIdle,
            timeout_secs: 40,
        }
    }
}

pub struct BrowserlessClient {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl BrowserlessClient {
    pub fn new(base_url: &str, token: Option<&str>) -> Self {
        let client = reqwest::Client::builder()
            .build()
            .expect("Failed to build HTTP client");

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.map(String::from),
        }
    }

    /// Fetch fully-rendered HTML for a URL via the /content endpoint.
    pub async fn content(&self, url: &str) -> Result<String> {
        self.content_with(url, &RenderOptions::default()).await
    }

    /// Fetch rendered HTML with an explicit wait condition and timeout.
    pub async fn content_with(&self, url: &str, options: &RenderOptions) -> Result<String> {
        let mut endpoint = format!("{}/content", self.base_url);
        if let Some(ref token) = self.token {
            endpoint.push_str(&format!("?token={token}"));
        }

        let body = ContentRequest {
            url,
            goto_options: GotoOptions {
                wait_until: match options.wait {
                    WaitCondition::NetworkIdle => "networkidle0",
                    WaitCondition::Delay(_) => "load",
                },
                timeout: options.timeout_secs * 1000,
            },
            wait_for_timeout: match options.wait {
                WaitCondition::Delay(ms) => Some(ms),
                WaitCondition::NetworkIdle => None,
            },
        };

        debug!(url, wait = ?options.wait, "Browserless content request");

        let resp = self
            .client
            .post(&endpoint)
            .header("Content-Type", "application/json")
            .timeout(Duration::from_secs(options.timeout_secs))
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    BrowserlessError::Timeout(options.timeout_secs)
                } else {
                    BrowserlessError::Network(e.to_string())
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

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ContentRequest<'a> {
    url: &'a str,
    goto_options: GotoOptions,
    #[serde(skip_serializing_if = "Option::is_none")]
    wait_for_timeout: Option<u64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GotoOptions {
    wait_until: &'static str,
    timeout: u64,
}
