use crate::time_util::now_millis;
use crate::{Case, CaseSummary, SummaryLang};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::fmt;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

#[derive(Debug)]
pub enum StoreError {
    Open(anyhow::Error),
    Fetch(rusqlite::Error),
    Write {
        case_id: i64,
        lang: SummaryLang,
        source: rusqlite::Error,
    },
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            StoreError::Open(e) => write!(f, "failed to open case store: {}", e),
            StoreError::Fetch(e) => write!(f, "failed to fetch cases: {}", e),
            StoreError::Write {
                case_id,
                lang,
                source,
            } => write!(
                f,
                "failed to save {} summary for case {}: {}",
                lang, case_id, source
            ),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StoreError::Open(e) => {
                let source: &(dyn std::error::Error + 'static) = &**e;
                Some(source)
            }
            StoreError::Fetch(e) => Some(e),
            StoreError::Write { source, .. } => Some(source),
        }
    }
}

const CASE_COLUMNS: &str = "c.id, c.title, c.description, c.content, c.case_number,
    c.keywords, c.address, c.district_id, c.city_id, c.province_id,
    c.country_id, c.status, c.created_at, c.updated_at, cd.details";

// Shared by the pending fetch and count. Summary rows are reduced to one per
// case before the join.
const PENDING_CASES: &str = "FROM cases c
    LEFT JOIN case_details cd ON cd.case_id = c.id
    LEFT JOIN (
        SELECT case_id, MAX(updated_at) AS latest_updated_at
        FROM case_summaries
        GROUP BY case_id
    ) cs ON cs.case_id = c.id
    WHERE c.status = 'published'
      AND (cs.latest_updated_at IS NULL
           OR cs.latest_updated_at < c.updated_at)";

fn case_from_row(row: &Row) -> rusqlite::Result<Case> {
    Ok(Case {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        content: row.get(3)?,
        case_number: row.get(4)?,
        keywords: row.get(5)?,
        address: row.get(6)?,
        district_id: row.get(7)?,
        city_id: row.get(8)?,
        province_id: row.get(9)?,
        country_id: row.get(10)?,
        status: row.get(11)?,
        created_at: row.get(12)?,
        updated_at: row.get(13)?,
        details: row.get(14)?,
    })
}

fn lang_from_column(row: &Row, idx: usize) -> rusqlite::Result<SummaryLang> {
    let code: String = row.get(idx)?;
    code.parse().map_err(|e: anyhow::Error| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            rusqlite::types::Type::Text,
            e.into(),
        )
    })
}

/// Reads cases and owns the `case_summaries` rows, over a single connection.
pub struct CaseStore {
    conn: Connection,
}

impl CaseStore {
    /// Opens the database file and brings the summaries schema up to date.
    #[instrument(skip(busy_timeout))]
    pub fn open(path: &Path, busy_timeout: Duration) -> Result<Self, StoreError> {
        info!("Opening case database");
        let conn = Connection::open(path)
            .map_err(|e| StoreError::Open(e.into()))?;
        Self::from_connection(conn, busy_timeout)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| StoreError::Open(e.into()))?;
        Self::from_connection(conn, Duration::from_secs(5))
    }

    fn from_connection(
        mut conn: Connection,
        busy_timeout: Duration,
    ) -> Result<Self, StoreError> {
        conn.busy_timeout(busy_timeout)
            .map_err(|e| StoreError::Open(e.into()))?;
        crate::init_summaries_db(&mut conn).map_err(StoreError::Open)?;
        Ok(Self { conn })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Published cases with no summary, or whose newest summary predates the
    /// case's last update. Newest cases first, unbounded.
    #[instrument(skip(self), err)]
    pub fn fetch_pending_cases(&self) -> Result<Vec<Case>, StoreError> {
        let query = format!(
            "SELECT {CASE_COLUMNS}
             {PENDING_CASES}
             ORDER BY c.created_at DESC, c.id DESC"
        );
        let mut stmt = self.conn.prepare(&query).map_err(StoreError::Fetch)?;
        let cases = stmt
            .query_map([], case_from_row)
            .map_err(StoreError::Fetch)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(StoreError::Fetch)?;

        info!("Found {} cases to process", cases.len());
        Ok(cases)
    }

    pub fn pending_count(&self) -> Result<usize, StoreError> {
        let query = format!("SELECT COUNT(*) {PENDING_CASES}");
        let count: i64 = self
            .conn
            .query_row(&query, [], |row| row.get(0))
            .map_err(StoreError::Fetch)?;
        Ok(count as usize)
    }

    /// Loads a single case regardless of status.
    pub fn get_case(&self, case_id: i64) -> Result<Option<Case>, StoreError> {
        let query = format!(
            "SELECT {CASE_COLUMNS}
             FROM cases c
             LEFT JOIN case_details cd ON cd.case_id = c.id
             WHERE c.id = ?1"
        );
        self.conn
            .query_row(&query, [case_id], case_from_row)
            .optional()
            .map_err(StoreError::Fetch)
    }

    /// Insert, or overwrite the text and model of the existing
    /// `(case_id, lang)` row. `updated_at` always moves forward, even for two
    /// writes inside the same millisecond.
    #[instrument(skip(self, summary), err)]
    pub fn save_summary(
        &self,
        case_id: i64,
        lang: SummaryLang,
        summary: &str,
        model: &str,
    ) -> Result<i64, StoreError> {
        let now = now_millis();
        let id = self
            .conn
            .query_row(
                "INSERT INTO case_summaries (
                    case_id, lang, summary, ai_model, created_at, updated_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?5)
                ON CONFLICT(case_id, lang)
                DO UPDATE SET
                    summary = excluded.summary,
                    ai_model = excluded.ai_model,
                    updated_at = MAX(excluded.updated_at, case_summaries.updated_at + 1)
                RETURNING id",
                params![case_id, lang.as_str(), summary, model, now],
                |row| row.get(0),
            )
            .map_err(|source| StoreError::Write {
                case_id,
                lang,
                source,
            })?;

        debug!("Saved {} summary row {} for case {}", lang, id, case_id);
        Ok(id)
    }

    pub fn get_summary(
        &self,
        case_id: i64,
        lang: SummaryLang,
    ) -> Result<Option<CaseSummary>, StoreError> {
        self.conn
            .query_row(
                "SELECT id, case_id, lang, summary, ai_model, created_at, updated_at
                 FROM case_summaries
                 WHERE case_id = ?1 AND lang = ?2",
                params![case_id, lang.as_str()],
                |row| {
                    Ok(CaseSummary {
                        id: row.get(0)?,
                        case_id: row.get(1)?,
                        lang: lang_from_column(row, 2)?,
                        summary: row.get(3)?,
                        ai_model: row.get(4)?,
                        created_at: row.get(5)?,
                        updated_at: row.get(6)?,
                    })
                },
            )
            .optional()
            .map_err(StoreError::Fetch)
    }

    /// Row count per language, in `SummaryLang::ALL` order.
    pub fn summary_counts(&self) -> Result<Vec<(SummaryLang, i64)>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT COUNT(*) FROM case_summaries WHERE lang = ?1")
            .map_err(StoreError::Fetch)?;
        SummaryLang::ALL
            .iter()
            .map(|lang| {
                stmt.query_row([lang.as_str()], |row| row.get(0))
                    .map(|count| (*lang, count))
                    .map_err(StoreError::Fetch)
            })
            .collect()
    }

    /// Releases the connection. Consuming `self` makes a second close
    /// impossible.
    pub fn close(self) {
        if let Err((_conn, e)) = self.conn.close() {
            warn!("Error while closing case database: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use pretty_assertions::assert_eq;

    fn store() -> CaseStore {
        let store = CaseStore::open_in_memory().unwrap();
        crate::init_cases_db_for_testing(store.connection()).unwrap();
        store
    }

    fn insert_case(
        store: &CaseStore,
        id: i64,
        status: &str,
        created_at: i64,
        updated_at: i64,
    ) {
        store
            .connection()
            .execute(
                "INSERT INTO cases (id, title, status, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![id, format!("case {}", id), status, created_at, updated_at],
            )
            .unwrap();
    }

    fn insert_summary(store: &CaseStore, case_id: i64, lang: &str, updated_at: i64) {
        store
            .connection()
            .execute(
                "INSERT INTO case_summaries (case_id, lang, summary, created_at, updated_at)
                 VALUES (?1, ?2, 'old', ?3, ?3)",
                params![case_id, lang, updated_at],
            )
            .unwrap();
    }

    fn pending_ids(store: &CaseStore) -> Vec<i64> {
        store
            .fetch_pending_cases()
            .unwrap()
            .iter()
            .map(|case| case.id)
            .collect()
    }

    #[test]
    fn fetches_published_cases_without_summaries_newest_first() {
        let store = store();
        insert_case(&store, 1, "published", 100, 100);
        insert_case(&store, 2, "published", 300, 300);
        insert_case(&store, 3, "draft", 200, 200);

        assert_eq!(pending_ids(&store), vec![2, 1]);
    }

    #[test]
    fn excludes_cases_with_fresh_summaries() {
        let store = store();
        insert_case(&store, 1, "published", 100, 500);
        insert_summary(&store, 1, "zh", 500);
        insert_case(&store, 2, "published", 200, 500);
        insert_summary(&store, 2, "zh", 900);

        assert!(pending_ids(&store).is_empty());
    }

    #[test]
    fn includes_cases_updated_after_newest_summary() {
        let store = store();
        insert_case(&store, 1, "published", 100, 1_000);
        insert_summary(&store, 1, "zh", 400);
        insert_summary(&store, 1, "en", 600);
        insert_summary(&store, 1, "es", 500);

        // One row per case even with several summary rows.
        assert_eq!(pending_ids(&store), vec![1]);
    }

    #[test]
    fn staleness_uses_newest_summary_only() {
        let store = store();
        insert_case(&store, 1, "published", 100, 700);
        insert_summary(&store, 1, "zh", 200);
        insert_summary(&store, 1, "en", 800);

        assert!(pending_ids(&store).is_empty());
    }

    #[test]
    fn pending_count_matches_fetch() -> Result<()> {
        let store = store();
        assert_eq!(store.pending_count()?, 0);

        insert_case(&store, 1, "published", 100, 1_000);
        insert_summary(&store, 1, "zh", 400);
        insert_summary(&store, 1, "en", 600);
        insert_case(&store, 2, "published", 200, 200);
        insert_case(&store, 3, "draft", 300, 300);
        insert_case(&store, 4, "published", 400, 400);
        insert_summary(&store, 4, "zh", 900);

        assert_eq!(store.pending_count()?, 2);
        assert_eq!(store.pending_count()?, store.fetch_pending_cases()?.len());
        Ok(())
    }

    #[test]
    fn pending_count_without_case_tables_is_a_fetch_error() {
        let store = CaseStore::open_in_memory().unwrap();
        assert!(matches!(store.pending_count(), Err(StoreError::Fetch(_))));
    }

    #[test]
    fn fetch_joins_optional_details() -> Result<()> {
        let store = store();
        insert_case(&store, 1, "published", 100, 100);
        insert_case(&store, 2, "published", 200, 200);
        store.connection().execute(
            "INSERT INTO case_details (case_id, details) VALUES (1, '<p>extra</p>')",
            [],
        )?;

        let cases = store.fetch_pending_cases()?;
        assert_eq!(cases[0].id, 2);
        assert_eq!(cases[0].details, None);
        assert_eq!(cases[1].details.as_deref(), Some("<p>extra</p>"));
        Ok(())
    }

    #[test]
    fn fetch_without_case_tables_is_a_fetch_error() {
        let store = CaseStore::open_in_memory().unwrap();
        assert!(matches!(
            store.fetch_pending_cases(),
            Err(StoreError::Fetch(_))
        ));
    }

    #[test]
    fn save_twice_keeps_one_row_with_newer_timestamp() -> Result<()> {
        let store = store();

        store.save_summary(9, SummaryLang::En, "first", "model-a")?;
        let first = store.get_summary(9, SummaryLang::En)?.unwrap();

        store.save_summary(9, SummaryLang::En, "second", "model-b")?;
        let second = store.get_summary(9, SummaryLang::En)?.unwrap();

        let rows: i64 = store.connection().query_row(
            "SELECT COUNT(*) FROM case_summaries WHERE case_id = 9 AND lang = 'en'",
            [],
            |row| row.get(0),
        )?;
        assert_eq!(rows, 1);
        assert_eq!(second.id, first.id);
        assert_eq!(second.summary, "second");
        assert_eq!(second.ai_model.as_deref(), Some("model-b"));
        assert_eq!(second.created_at, first.created_at);
        assert!(second.updated_at > first.updated_at);
        Ok(())
    }

    #[test]
    fn save_rejects_empty_text() {
        let store = store();
        let err = store
            .save_summary(1, SummaryLang::Zh, "", "model-a")
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::Write {
                case_id: 1,
                lang: SummaryLang::Zh,
                ..
            }
        ));
    }

    #[test]
    fn get_case_ignores_status() -> Result<()> {
        let store = store();
        insert_case(&store, 4, "draft", 100, 100);

        let case = store.get_case(4)?.unwrap();
        assert_eq!(case.title.as_deref(), Some("case 4"));
        assert_eq!(case.status, "draft");
        assert!(store.get_case(5)?.is_none());
        Ok(())
    }

    #[test]
    fn counts_summaries_per_language() -> Result<()> {
        let store = store();
        store.save_summary(1, SummaryLang::Zh, "a", "m")?;
        store.save_summary(1, SummaryLang::En, "b", "m")?;
        store.save_summary(2, SummaryLang::Zh, "c", "m")?;

        assert_eq!(
            store.summary_counts()?,
            vec![
                (SummaryLang::Zh, 2),
                (SummaryLang::En, 1),
                (SummaryLang::Es, 0)
            ]
        );
        Ok(())
    }
}
