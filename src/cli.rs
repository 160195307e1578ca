use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

use crate::gemini::real::DEFAULT_BASE_URL;
use crate::summary::{GeneratorConfig, DEFAULT_MODELS};

/// Command-line arguments shared by every subcommand
#[derive(Parser, Debug, Clone)]
pub struct CommonArgs {
    /// Path to the case database
    #[arg(long, env = "DB_PATH")]
    pub database: PathBuf,

    /// How long a locked database is retried before giving up
    #[arg(long, env = "DB_BUSY_TIMEOUT_MS", default_value_t = 5000)]
    pub db_busy_timeout_ms: u64,

    /// Gemini API key
    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true)]
    pub gemini_api_key: Option<String>,

    /// Gemini API base URL (a compatible proxy works too)
    #[arg(long, env = "GEMINI_BASE_URL", default_value = DEFAULT_BASE_URL)]
    pub gemini_base_url: String,

    /// Models to rotate through, in order
    #[arg(
        long,
        env = "GEMINI_MODELS",
        value_delimiter = ',',
        default_values_t = DEFAULT_MODELS.map(String::from)
    )]
    pub models: Vec<String>,

    /// Maximum generation attempts per case
    #[arg(long, env = "MAX_RETRIES", default_value_t = 3)]
    pub max_retries: usize,

    /// Pause between generation attempts
    #[arg(long, env = "RETRY_DELAY_MS", default_value_t = 0)]
    pub retry_delay_ms: u64,

    /// Timeout for each HTTP request
    #[arg(long, env = "HTTP_TIMEOUT_SECS", default_value_t = 30)]
    pub http_timeout_secs: u64,
}

impl CommonArgs {
    pub fn generator_config(&self) -> GeneratorConfig {
        GeneratorConfig {
            models: self.models.clone(),
            max_retries: self.max_retries,
            retry_delay: Duration::from_millis(self.retry_delay_ms),
        }
    }

    pub fn db_busy_timeout(&self) -> Duration {
        Duration::from_millis(self.db_busy_timeout_ms)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}
