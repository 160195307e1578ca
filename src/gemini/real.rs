use crate::gemini::GeminiClientTrait;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument};
use url::Url;

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

#[derive(Debug, Serialize)]
struct GenerateContentRequest<'a> {
    contents: Vec<RequestContent<'a>>,
}

#[derive(Debug, Serialize)]
struct RequestContent<'a> {
    parts: Vec<RequestPart<'a>>,
}

#[derive(Debug, Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

// A real implementation of the Gemini client
pub struct RealGeminiClient {
    client: reqwest::Client,
    base_url: Url,
    api_key: String,
}

impl RealGeminiClient {
    pub fn new(
        api_key: String,
        base_url: &str,
        timeout: Duration,
    ) -> Result<Self> {
        if api_key.is_empty() {
            return Err(anyhow!("Gemini API key is empty"));
        }
        let base_url = Url::parse(base_url)
            .with_context(|| format!("invalid Gemini base URL '{base_url}'"))?;
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("build Gemini HTTP client")?;
        Ok(Self {
            client,
            base_url,
            api_key,
        })
    }

    /// `{base}/v1beta/models/{model}:generateContent?key=...`; a leading
    /// `models/` on the identifier is dropped.
    pub fn endpoint_url(&self, model: &str) -> Result<Url> {
        let model = model.strip_prefix("models/").unwrap_or(model);
        let action = format!("{model}:generateContent");
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| anyhow!("Gemini base URL cannot be a base"))?
            .pop_if_empty()
            .extend(["v1beta", "models", action.as_str()]);
        url.query_pairs_mut().append_pair("key", &self.api_key);
        Ok(url)
    }
}

/// Pulls `candidates[0].content.parts[0].text` out of a response body.
pub fn extract_candidate_text(body: &str) -> Result<String> {
    let payload: GenerateContentResponse =
        serde_json::from_str(body).context("parse Gemini response body")?;
    payload
        .candidates
        .into_iter()
        .next()
        .and_then(|candidate| candidate.content)
        .and_then(|content| content.parts.into_iter().next())
        .and_then(|part| part.text)
        .ok_or_else(|| anyhow!("missing text content in Gemini response"))
}

#[async_trait]
impl GeminiClientTrait for RealGeminiClient {
    #[instrument(skip(self, prompt), err)]
    async fn generate_content(
        &self,
        model: &str,
        prompt: &str,
    ) -> Result<String, anyhow::Error> {
        let url = self.endpoint_url(model)?;
        let body = GenerateContentRequest {
            contents: vec![RequestContent {
                parts: vec![RequestPart { text: prompt }],
            }],
        };

        debug!("Sending generateContent request to model {}", model);
        let response = self
            .client
            .post(url)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                anyhow!("Gemini request failed for model '{model}': {e}")
            })?;

        let status = response.status();
        let text = response
            .text()
            .await
            .context("read Gemini response body")?;
        if !status.is_success() {
            return Err(anyhow!(
                "Gemini returned {} for model '{}': {}",
                status.as_u16(),
                model,
                text
            ));
        }

        extract_candidate_text(&text)
    }
}

pub fn create_gemini_client(
    api_key: String,
    base_url: &str,
    timeout: Duration,
) -> Result<Arc<dyn GeminiClientTrait>> {
    Ok(Arc::new(RealGeminiClient::new(api_key, base_url, timeout)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    struct CapturedRequest {
        request_line: String,
        content_type: Option<String>,
        body: serde_json::Value,
    }

    /// Serves exactly one HTTP response and hands back what the client sent.
    async fn serve_once(
        status: &'static str,
        response_body: &'static str,
    ) -> (String, JoinHandle<CapturedRequest>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());

        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = Vec::new();
            let mut chunk = [0u8; 4096];
            let header_end = loop {
                let n = socket.read(&mut chunk).await.unwrap();
                assert!(n > 0, "connection closed before headers ended");
                buf.extend_from_slice(&chunk[..n]);
                if let Some(pos) =
                    buf.windows(4).position(|w| w == b"\r\n\r\n")
                {
                    break pos + 4;
                }
            };

            let head = String::from_utf8(buf[..header_end].to_vec()).unwrap();
            let mut lines = head.split("\r\n");
            let request_line = lines.next().unwrap().to_string();
            let mut content_length = 0;
            let mut content_type = None;
            for line in lines {
                if let Some((name, value)) = line.split_once(':') {
                    match name.trim().to_ascii_lowercase().as_str() {
                        "content-length" => {
                            content_length = value.trim().parse().unwrap()
                        }
                        "content-type" => {
                            content_type = Some(value.trim().to_string())
                        }
                        _ => {}
                    }
                }
            }
            while buf.len() < header_end + content_length {
                let n = socket.read(&mut chunk).await.unwrap();
                assert!(n > 0, "connection closed before body ended");
                buf.extend_from_slice(&chunk[..n]);
            }
            let body = serde_json::from_slice(
                &buf[header_end..header_end + content_length],
            )
            .unwrap();

            let reply = format!(
                "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status,
                response_body.len(),
                response_body
            );
            socket.write_all(reply.as_bytes()).await.unwrap();
            socket.shutdown().await.unwrap();

            CapturedRequest {
                request_line,
                content_type,
                body,
            }
        });

        (base, handle)
    }

    fn client(base: &str) -> RealGeminiClient {
        RealGeminiClient::new(
            "secret".to_string(),
            base,
            Duration::from_secs(30),
        )
        .unwrap()
    }

    #[test]
    fn builds_generate_content_url() {
        let url = client(DEFAULT_BASE_URL)
            .endpoint_url("gemini-1.5-flash-latest")
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-1.5-flash-latest:generateContent?key=secret"
        );
    }

    #[test]
    fn drops_models_prefix_and_trailing_slash() {
        let url = client("https://proxy.example.dev/")
            .endpoint_url("models/gemini-1.0-pro-latest")
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://proxy.example.dev/v1beta/models/gemini-1.0-pro-latest:generateContent?key=secret"
        );
    }

    #[test]
    fn rejects_empty_key_and_bad_base() {
        assert!(RealGeminiClient::new(
            String::new(),
            DEFAULT_BASE_URL,
            Duration::from_secs(1)
        )
        .is_err());
        assert!(RealGeminiClient::new(
            "k".to_string(),
            "not a url",
            Duration::from_secs(1)
        )
        .is_err());
    }

    #[test]
    fn extracts_first_candidate_text() {
        let body = r#"{
            "candidates": [
                {"content": {"parts": [{"text": "[{\"lang\":\"zh\"}]"}, {"text": "ignored"}]}},
                {"content": {"parts": [{"text": "second"}]}}
            ]
        }"#;
        assert_eq!(
            extract_candidate_text(body).unwrap(),
            r#"[{"lang":"zh"}]"#
        );
    }

    #[test]
    fn missing_candidates_is_an_error() {
        assert!(extract_candidate_text(r#"{"candidates": []}"#).is_err());
        assert!(extract_candidate_text(r#"{"promptFeedback": {}}"#).is_err());
        assert!(extract_candidate_text(
            r#"{"candidates": [{"finishReason": "SAFETY"}]}"#
        )
        .is_err());
        assert!(extract_candidate_text("not json").is_err());
    }

    #[tokio::test]
    async fn posts_prompt_and_returns_candidate_text() {
        let (base, server) = serve_once(
            "200 OK",
            r#"{"candidates":[{"content":{"parts":[{"text":"[]"}]}}]}"#,
        )
        .await;
        let client = RealGeminiClient::new(
            "k1".to_string(),
            &base,
            Duration::from_secs(5),
        )
        .unwrap();

        let text = client
            .generate_content("models/gemini-x", "héllo")
            .await
            .unwrap();
        assert_eq!(text, "[]");

        let request = server.await.unwrap();
        assert_eq!(
            request.request_line,
            "POST /v1beta/models/gemini-x:generateContent?key=k1 HTTP/1.1"
        );
        assert_eq!(request.content_type.as_deref(), Some("application/json"));
        assert_eq!(
            request.body,
            serde_json::json!({"contents": [{"parts": [{"text": "héllo"}]}]})
        );
    }

    #[tokio::test]
    async fn non_success_status_is_an_error_with_status_and_body() {
        let (base, server) =
            serve_once("429 Too Many Requests", r#"{"error":"quota"}"#).await;
        let client = RealGeminiClient::new(
            "k1".to_string(),
            &base,
            Duration::from_secs(5),
        )
        .unwrap();

        let err = client
            .generate_content("gemini-x", "prompt")
            .await
            .unwrap_err()
            .to_string();
        assert!(err.contains("429"), "unexpected error: {err}");
        assert!(err.contains("gemini-x"), "unexpected error: {err}");
        assert!(err.contains(r#"{"error":"quota"}"#), "unexpected error: {err}");
        server.await.unwrap();
    }

    #[tokio::test]
    async fn server_error_is_an_error() {
        let (base, server) =
            serve_once("500 Internal Server Error", "{}").await;
        let client = RealGeminiClient::new(
            "k1".to_string(),
            &base,
            Duration::from_secs(5),
        )
        .unwrap();

        let err = client
            .generate_content("gemini-y", "prompt")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("500"));
        server.await.unwrap();
    }
}
