use crate::gemini::GeminiClientTrait;
use crate::prompts::build_summary_prompt;
use crate::{LangSummary, SummaryLang};
use anyhow::Result;
use serde::Deserialize;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, instrument, warn};

pub const DEFAULT_MODELS: [&str; 3] = [
    "gemini-1.5-flash-latest",
    "gemini-1.5-pro-latest",
    "gemini-1.0-pro-latest",
];

pub const DEFAULT_MAX_RETRIES: usize = 3;

/// Why a model response did not have the expected shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    Parse(String),
    WrongCount(usize),
    UnknownLanguage(String),
    EmptySummary(SummaryLang),
    DuplicateLanguage(SummaryLang),
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ValidationError::Parse(msg) => {
                write!(f, "response is not a JSON summary array: {}", msg)
            }
            ValidationError::WrongCount(n) => {
                write!(f, "expected 3 summaries, got {}", n)
            }
            ValidationError::UnknownLanguage(lang) => {
                write!(f, "invalid language: {:?}", lang)
            }
            ValidationError::EmptySummary(lang) => {
                write!(f, "empty {} summary", lang)
            }
            ValidationError::DuplicateLanguage(lang) => {
                write!(f, "duplicate {} summary", lang)
            }
        }
    }
}

impl std::error::Error for ValidationError {}

/// Terminal failure after every permitted attempt failed.
#[derive(Debug)]
pub struct GenerationError {
    pub attempted_models: Vec<String>,
    pub last_error: anyhow::Error,
}

impl fmt::Display for GenerationError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "summary generation failed after {} attempt(s) ({}): {}",
            self.attempted_models.len(),
            self.attempted_models.join(", "),
            self.last_error
        )
    }
}

impl std::error::Error for GenerationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        let source: &(dyn std::error::Error + 'static) = &*self.last_error;
        Some(source)
    }
}

#[derive(Debug, Clone)]
pub struct GeneratedSummaries {
    pub model: String,
    pub summaries: Vec<LangSummary>,
}

#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    pub models: Vec<String>,
    pub max_retries: usize,
    pub retry_delay: Duration,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            models: DEFAULT_MODELS.iter().map(|m| m.to_string()).collect(),
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay: Duration::ZERO,
        }
    }
}

// Shape of one entry as the model writes it. Missing keys default to empty
// so they fail validation rather than parsing.
#[derive(Debug, Deserialize)]
struct RawSummary {
    #[serde(default)]
    lang: String,
    #[serde(default)]
    summary: String,
}

/// Drops everything before the first `[` and after the last `]`.
pub fn extract_json_array(text: &str) -> &str {
    let start = text.find('[');
    let end = text.rfind(']');
    match (start, end) {
        (Some(start), Some(end)) if start <= end => &text[start..=end],
        (Some(start), _) => &text[start..],
        (None, Some(end)) => &text[..=end],
        (None, None) => text,
    }
}

/// Turns the raw model text into exactly one summary per language, in
/// response order.
pub fn parse_summaries(
    text: &str,
) -> Result<Vec<LangSummary>, ValidationError> {
    let raw: Vec<RawSummary> = serde_json::from_str(extract_json_array(text))
        .map_err(|e| ValidationError::Parse(e.to_string()))?;

    if raw.len() != SummaryLang::ALL.len() {
        return Err(ValidationError::WrongCount(raw.len()));
    }

    let mut seen = HashSet::new();
    let mut summaries = Vec::with_capacity(raw.len());
    for entry in raw {
        let lang: SummaryLang = entry
            .lang
            .parse()
            .map_err(|_| ValidationError::UnknownLanguage(entry.lang.clone()))?;
        if entry.summary.trim().is_empty() {
            return Err(ValidationError::EmptySummary(lang));
        }
        if !seen.insert(lang) {
            return Err(ValidationError::DuplicateLanguage(lang));
        }
        summaries.push(LangSummary {
            lang,
            summary: entry.summary,
        });
    }

    Ok(summaries)
}

pub struct SummaryGenerator {
    client: Arc<dyn GeminiClientTrait>,
    config: GeneratorConfig,
}

impl SummaryGenerator {
    pub fn new(
        client: Arc<dyn GeminiClientTrait>,
        config: GeneratorConfig,
    ) -> Result<Self> {
        if config.models.is_empty() {
            return Err(anyhow::anyhow!(
                "at least one Gemini model must be configured"
            ));
        }
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    /// Model used by each attempt: attempt `i` takes `models[i % len]`.
    /// At least one attempt is always made.
    pub fn attempt_models(&self) -> Vec<&str> {
        let models = &self.config.models;
        (0..self.config.max_retries.max(1))
            .map(|i| models[i % models.len()].as_str())
            .collect()
    }

    async fn attempt(&self, model: &str, prompt: &str) -> Result<Vec<LangSummary>> {
        let text = self.client.generate_content(model, prompt).await?;
        Ok(parse_summaries(&text)?)
    }

    #[instrument(skip(self, details), fields(details_len = details.len()))]
    pub async fn generate(
        &self,
        details: &str,
    ) -> Result<GeneratedSummaries, GenerationError> {
        let prompt = build_summary_prompt(details);
        let models = self.attempt_models();
        let mut attempted_models = Vec::with_capacity(models.len());

        for (i, model) in models.iter().enumerate() {
            attempted_models.push(model.to_string());
            match self.attempt(model, &prompt).await {
                Ok(summaries) => {
                    info!("Model {} produced {} summaries", model, summaries.len());
                    return Ok(GeneratedSummaries {
                        model: model.to_string(),
                        summaries,
                    });
                }
                Err(e) if i + 1 < models.len() => {
                    warn!(
                        "Model {} failed: {}; retrying with model {}",
                        model,
                        e,
                        models[i + 1]
                    );
                    if !self.config.retry_delay.is_zero() {
                        tokio::time::sleep(self.config.retry_delay).await;
                    }
                }
                Err(e) => {
                    error!("Model {} failed on final attempt: {}", model, e);
                    return Err(GenerationError {
                        attempted_models,
                        last_error: e,
                    });
                }
            }
        }

        // attempt_models() is never empty, so the loop always returns.
        Err(GenerationError {
            attempted_models,
            last_error: anyhow::anyhow!("no generation attempts were made"),
        })
    }
}
