use crate::prompts::SEO_SUMMARY_PROMPT;
use anyhow::{Context, Result};
use serde_json::{json, Value};
use std::path::Path;
use tracing::info;

fn source_lines(text: &str) -> Value {
    // nbformat stores cell sources as lines that keep their trailing newline,
    // except the last.
    let lines: Vec<&str> = text.split_inclusive('\n').collect();
    json!(lines)
}

fn markdown_cell(text: &str) -> Value {
    json!({
        "cell_type": "markdown",
        "metadata": {},
        "source": source_lines(text),
    })
}

fn code_cell(text: &str) -> Value {
    json!({
        "cell_type": "code",
        "execution_count": null,
        "metadata": {},
        "outputs": [],
        "source": source_lines(text),
    })
}

/// The fixed notebook: a description of the task, the prompt in use, and
/// cells that drive the `case_summaries` binary.
pub fn build_notebook() -> Value {
    let prompt_cell = format!(
        "## Prompt\n\nEvery pending case is sent with this template; `{{details}}` is the composed case text.\n\n```text\n{}\n```",
        SEO_SUMMARY_PROMPT
    );

    json!({
        "cells": [
            markdown_cell(
                "# Case Summary Task\n\nGenerates zh/en/es SEO summaries for published cases whose summaries are missing or stale, and upserts them into `case_summaries`."
            ),
            markdown_cell(&prompt_cell),
            code_cell(
                "import os\nfrom dotenv import load_dotenv\n\n# Load DB_PATH, GEMINI_API_KEY, MAX_RETRIES, ...\nload_dotenv()\nprint(os.environ.get('DB_PATH'))"
            ),
            code_cell("!case_summaries status"),
            code_cell("!case_summaries run"),
        ],
        "metadata": {
            "kernelspec": {
                "display_name": "Python 3",
                "language": "python",
                "name": "python3"
            },
            "language_info": {
                "codemirror_mode": {
                    "name": "ipython",
                    "version": 3
                },
                "file_extension": ".py",
                "mimetype": "text/x-python",
                "name": "python",
                "nbconvert_exporter": "python",
                "pygments_lexer": "ipython3",
                "version": "3.8.5"
            }
        },
        "nbformat": 4,
        "nbformat_minor": 4
    })
}

pub fn write_notebook(path: &Path) -> Result<()> {
    let notebook = build_notebook();
    let text = serde_json::to_string_pretty(&notebook)
        .context("serialize notebook")?;
    std::fs::write(path, text)
        .with_context(|| format!("write notebook {}", path.display()))?;
    info!("Notebook written to {}", path.display());
    Ok(())
}
