use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use eventscout_common::ScoutError;

/// Conventional browser user-agent. Calendar widgets and government sites
/// routinely refuse requests that identify as a bot.
pub const BROWSER_USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";

const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Fetch collaborator: URL → raw document.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<String, ScoutError>;
}

/// Plain HTTP fetcher.
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .user_agent(BROWSER_USER_AGENT)
            .timeout(FETCH_TIMEOUT)
            .build()
            .expect("Failed to build HTTP client");
        Self { client }
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<String, ScoutError> {
        debug!(url, "Fetching page");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ScoutError::fetch(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ScoutError::fetch(url, format!("status {status}")));
        }

        response.text().await.map_err(|e| ScoutError::fetch(url, e))
    }
}
