use std::env;

/// Engine configuration loaded from environment variables.
///
/// The model and renderer backends are optional: when a key is absent the
/// corresponding strategies are skipped rather than failing.
#[derive(Debug, Clone)]
pub struct Config {
    // Model completion backend
    pub openai_api_key: Option<String>,
    pub openai_model: String,
    pub openai_api_url: Option<String>,

    // Render backend
    pub browserless_url: Option<String>,
    pub browserless_token: Option<String>,

    // Pagination failure log (JSONL, append-only)
    pub failure_log_path: String,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            openai_api_key: optional_env("OPENAI_API_KEY"),
            openai_model: env::var("OPENAI_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string()),
            openai_api_url: optional_env("OPENAI_API_URL"),
            browserless_url: optional_env("BROWSERLESS_URL"),
            browserless_token: optional_env("BROWSERLESS_TOKEN"),
            failure_log_path: env::var("PAGINATION_FAILURE_LOG")
                .unwrap_or_else(|_| "pagination_failures.jsonl".to_string()),
        }
    }
}

fn optional_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.is_empty())
}
