pub mod fake;
pub mod real;

use anyhow::Result;
use async_trait::async_trait;

/// A struct to define what model was used for a request
#[derive(Debug, Clone)]
pub struct ModelRequest {
    pub model_name: String,
    pub prompt: String,
}

/// A trait that abstracts the Gemini `generateContent` call for testing
///
/// Both the HTTP client and the scripted fake implement it, so the summary
/// generator never knows which one it is talking to.
#[async_trait]
pub trait GeminiClientTrait: Send + Sync {
    /// Sends a single-turn prompt to the given model
    ///
    /// # Arguments
    /// * `model` - The model identifier (e.g., "gemini-1.5-flash-latest")
    /// * `prompt` - The full prompt text
    ///
    /// # Returns
    /// The raw text of the first candidate, or an error
    async fn generate_content(
        &self,
        model: &str,
        prompt: &str,
    ) -> Result<String, anyhow::Error>;
}
