use async_trait::async_trait;
use tracing::debug;

use browserless_client::{BrowserlessClient, RenderOptions};
use eventscout_common::ScoutError;

/// Render collaborator: URL → fully-rendered DOM. Element queries happen
/// locally on the returned document.
#[async_trait]
pub trait PageRenderer: Send + Sync {
    async fn render(&self, url: &str) -> Result<String, ScoutError>;
}

/// Renderer backed by a Browserless deployment.
pub struct BrowserlessRenderer {
    client: BrowserlessClient,
    options: RenderOptions,
}

impl BrowserlessRenderer {
    pub fn new(base_url: &str, token: Option<&str>) -> Self {
        Self {
            client: BrowserlessClient::new(base_url, token),
            options: RenderOptions::default(),
        }
    }

    pub fn with_options(mut self, options: RenderOptions) -> Self {
        self.options = options;
        self
    }
}

#[async_trait]
impl PageRenderer for BrowserlessRenderer {
    async fn render(&self, url: &str) -> Result<String, ScoutError> {
        debug!(url, "Rendering page");
        self.client
            .content_with(url, &self.options)
            .await
            .map_err(|e| ScoutError::fetch(url, e))
    }
}
