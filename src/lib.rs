use anyhow::Result;
use rusqlite::Connection;
use rusqlite_migration::{Migrations, M};
use serde::Deserialize;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use tracing::info;
use tracing::instrument;

pub mod app;
pub mod cli;
pub mod details;
pub mod gemini;
pub mod notebook;
pub mod prompts;
pub mod runner;
pub mod secrets_sync;
pub mod store;
pub mod summary;
pub mod time_util;

pub mod test_utils;

/// Language of a generated summary. The set is closed: every case gets
/// exactly one summary per variant.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum SummaryLang {
    Zh,
    En,
    Es,
}

impl SummaryLang {
    pub const ALL: [SummaryLang; 3] =
        [SummaryLang::Zh, SummaryLang::En, SummaryLang::Es];

    pub fn as_str(&self) -> &'static str {
        match self {
            SummaryLang::Zh => "zh",
            SummaryLang::En => "en",
            SummaryLang::Es => "es",
        }
    }
}

impl fmt::Display for SummaryLang {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SummaryLang {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "zh" => Ok(SummaryLang::Zh),
            "en" => Ok(SummaryLang::En),
            "es" => Ok(SummaryLang::Es),
            other => Err(anyhow::anyhow!("unsupported language code: {}", other)),
        }
    }
}

// Structures for database records
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct Case {
    pub id: i64,
    pub title: Option<String>,
    pub description: Option<String>,
    pub content: Option<String>,
    pub case_number: Option<String>,
    pub keywords: Option<String>,
    pub address: Option<String>,
    pub district_id: Option<i64>,
    pub city_id: Option<i64>,
    pub province_id: Option<i64>,
    pub country_id: Option<i64>,
    pub status: String,
    pub created_at: i64,
    pub updated_at: i64,
    // From the optional case_details row.
    pub details: Option<String>,
}

/// One validated entry of a model response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LangSummary {
    pub lang: SummaryLang,
    pub summary: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseSummary {
    pub id: i64,
    pub case_id: i64,
    pub lang: SummaryLang,
    pub summary: String,
    pub ai_model: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

fn summaries_migration_steps() -> Vec<M<'static>> {
    vec![
        M::up(
            r#"
            CREATE TABLE IF NOT EXISTS case_summaries (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                case_id INTEGER NOT NULL,
                lang TEXT NOT NULL CHECK (lang IN ('zh', 'en', 'es')),
                summary TEXT NOT NULL CHECK (length(summary) > 0),
                created_at INTEGER NOT NULL,          -- Unix millis of first write
                updated_at INTEGER NOT NULL,          -- Unix millis of last write
                UNIQUE(case_id, lang)
            );
            "#,
        ),
        M::up(
            r#"
            CREATE INDEX IF NOT EXISTS idx_case_summaries_case_updated
                ON case_summaries(case_id, updated_at DESC);
            "#,
        ),
        // Model that produced the text, NULL for rows written before it was tracked.
        M::up(
            r#"
            ALTER TABLE case_summaries ADD COLUMN ai_model TEXT;
            "#,
        ),
    ]
}

fn apply_summaries_migrations(conn: &mut Connection) -> Result<()> {
    let migrations = Migrations::new(summaries_migration_steps());
    migrations.to_latest(conn)?;

    Ok(())
}

// Database initialization
#[instrument(skip(conn))]
pub fn init_summaries_db(conn: &mut Connection) -> Result<()> {
    info!("Initializing case summaries schema");
    apply_summaries_migrations(conn)?;
    Ok(())
}

/// Creates the externally owned case tables. Production databases already
/// have them; tests and local runs need them created.
pub fn init_cases_db_for_testing(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS cases (
            id INTEGER PRIMARY KEY,
            title TEXT,
            description TEXT,
            content TEXT,
            case_number TEXT,
            keywords TEXT,
            address TEXT,
            district_id INTEGER,
            city_id INTEGER,
            province_id INTEGER,
            country_id INTEGER,
            status TEXT NOT NULL DEFAULT 'draft',
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS case_details (
            case_id INTEGER PRIMARY KEY,
            details TEXT,
            FOREIGN KEY (case_id) REFERENCES cases(id) ON DELETE CASCADE
        );",
    )?;

    Ok(())
}
