pub mod client;
pub mod error;
pub mod schema;

pub use client::{CompletionBackend, OpenAiClient};
pub use error::AiClientError;
pub use schema::StructuredOutput;

/// Run a schema-constrained completion and deserialize the result.
///
/// The schema is derived from `T` and sent as a strict `json_schema`
/// response format; output that does not deserialize into `T` surfaces as
/// [`AiClientError::Malformed`].
pub async fn extract<T>(
    backend: &dyn CompletionBackend,
    system: &str,
    user: &str,
) -> Result<T, AiClientError>
where
    T: StructuredOutput,
{
    let value = backend
        .structured(system, user, &T::output_name(), T::strict_schema())
        .await?;
    serde_json::from_value(value).map_err(|e| AiClientError::Malformed(e.to_string()))
}
