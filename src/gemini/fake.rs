use anyhow::Result;
use async_trait::async_trait;
use std::sync::Mutex;

use crate::gemini::{GeminiClientTrait, ModelRequest};

/// A fake implementation of the Gemini client for testing
///
/// Responses (or errors) are returned in the order they were configured.
/// Every call is recorded in `requests` so tests can assert on the model
/// rotation and the prompt that was sent.
///
/// # Example
///
/// ```
/// use case_summaries::gemini::GeminiClientTrait;
/// use case_summaries::gemini::fake::FakeGeminiClient;
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let client = FakeGeminiClient::new()
///         .with_error("quota exceeded")
///         .with_response("[]");
///
///     assert!(client.generate_content("model-a", "hi").await.is_err());
///     assert_eq!(client.generate_content("model-b", "hi").await?, "[]");
///     assert_eq!(client.requested_models(), vec!["model-a", "model-b"]);
///     Ok(())
/// }
/// ```
pub struct FakeGeminiClient {
    responses: Mutex<Vec<Result<String, String>>>,
    // Track requests for verification in tests
    pub requests: Mutex<Vec<ModelRequest>>,
}

impl Default for FakeGeminiClient {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeGeminiClient {
    pub fn new() -> Self {
        Self {
            responses: Mutex::new(vec![]),
            requests: Mutex::new(vec![]),
        }
    }

    /// Add a response to be returned by the fake client
    pub fn with_response(self, response: &str) -> Self {
        self.responses
            .lock()
            .unwrap()
            .push(Ok(response.to_string()));
        self
    }

    /// Add a failed call, as if the transport or the API had errored
    pub fn with_error(self, message: &str) -> Self {
        self.responses
            .lock()
            .unwrap()
            .push(Err(message.to_string()));
        self
    }

    /// Add multiple responses to be returned by the fake client in sequence
    pub fn with_responses(self, responses: Vec<&str>) -> Self {
        for response in responses {
            self.responses
                .lock()
                .unwrap()
                .push(Ok(response.to_string()));
        }
        self
    }

    pub fn requested_models(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|request| request.model_name.clone())
            .collect()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl GeminiClientTrait for FakeGeminiClient {
    async fn generate_content(
        &self,
        model: &str,
        prompt: &str,
    ) -> Result<String, anyhow::Error> {
        // Store the request for later verification
        self.requests.lock().unwrap().push(ModelRequest {
            model_name: model.to_string(),
            prompt: prompt.to_string(),
        });

        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            return Err(anyhow::anyhow!("no fake Gemini responses configured"));
        }
        responses.remove(0).map_err(|message| anyhow::anyhow!(message))
    }
}
