//! Pushes the entries of a local env file to a Hugging Face Space's secret
//! store. Unrelated to the summary pipeline apart from sharing its `.env`.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde::Serialize;
use std::path::Path;
use std::time::Duration;
use tracing::{error, info, instrument};

pub const DEFAULT_HF_ENDPOINT: &str = "https://huggingface.co";

/// Keys that configure the sync itself or only make sense locally.
pub const SKIPPED_KEYS: [&str; 5] =
    ["HF_TOKEN", "HF_REPO_ID", "PORT", "HOST", "LOG_LEVEL"];

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SyncReport {
    pub succeeded: usize,
    pub failed: usize,
}

fn unquote(value: &str) -> &str {
    for quote in ['"', '\''] {
        if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote)
        {
            return &value[1..value.len() - 1];
        }
    }
    value
}

/// Parses `KEY=VALUE` lines. Blank lines, `#` comments and lines without `=`
/// are ignored; a repeated key keeps its first position and its last value.
pub fn parse_env_file(text: &str) -> Vec<(String, String)> {
    let mut entries: Vec<(String, String)> = Vec::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim().to_string();
        let value = unquote(value.trim()).to_string();
        match entries.iter_mut().find(|(existing, _)| *existing == key) {
            Some(entry) => entry.1 = value,
            None => entries.push((key, value)),
        }
    }
    entries
}

#[async_trait]
pub trait SecretStoreTrait: Send + Sync {
    async fn put_secret(&self, key: &str, value: &str) -> Result<()>;
}

#[derive(Debug, Serialize)]
struct SecretPayload<'a> {
    key: &'a str,
    value: &'a str,
}

pub struct HfSpaceSecrets {
    client: reqwest::Client,
    endpoint: String,
    repo_id: String,
    token: String,
}

impl HfSpaceSecrets {
    pub fn new(
        endpoint: &str,
        repo_id: String,
        token: String,
        timeout: Duration,
    ) -> Result<Self> {
        if token.is_empty() {
            return Err(anyhow!("HF_TOKEN not configured"));
        }
        if repo_id.is_empty() {
            return Err(anyhow!("HF_REPO_ID not configured"));
        }
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("build Hugging Face HTTP client")?;
        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            repo_id,
            token,
        })
    }

    pub fn secrets_url(&self) -> String {
        format!("{}/api/spaces/{}/secrets", self.endpoint, self.repo_id)
    }

    pub fn repo_id(&self) -> &str {
        &self.repo_id
    }
}

#[async_trait]
impl SecretStoreTrait for HfSpaceSecrets {
    async fn put_secret(&self, key: &str, value: &str) -> Result<()> {
        let response = self
            .client
            .post(self.secrets_url())
            .bearer_auth(&self.token)
            .json(&SecretPayload { key, value })
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("server returned {}: {}", status.as_u16(), body));
        }
        Ok(())
    }
}

/// Pushes every non-skipped entry, one request per key. Values never reach
/// the log.
#[instrument(skip_all, fields(entries = entries.len()))]
pub async fn sync_secrets(
    store: &dyn SecretStoreTrait,
    entries: &[(String, String)],
) -> SyncReport {
    let mut report = SyncReport::default();
    let to_sync: Vec<&(String, String)> = entries
        .iter()
        .filter(|(key, _)| !SKIPPED_KEYS.contains(&key.as_str()))
        .collect();
    info!("Syncing {} environment variables", to_sync.len());

    for (key, value) in to_sync {
        match store.put_secret(key, value).await {
            Ok(()) => {
                info!("{} synced", key);
                report.succeeded += 1;
            }
            Err(e) => {
                error!("{} failed to sync: {}", key, e);
                report.failed += 1;
            }
        }
    }

    info!(
        "Sync finished: {} succeeded, {} failed",
        report.succeeded, report.failed
    );
    report
}

pub fn read_env_file(path: &Path) -> Result<Vec<(String, String)>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("read env file {}", path.display()))?;
    Ok(parse_env_file(&text))
}
