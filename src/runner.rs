use crate::details::compose;
use crate::store::{CaseStore, StoreError};
use crate::summary::SummaryGenerator;
use crate::Case;
use serde::Serialize;
use tracing::{error, info, instrument, warn};

/// Outcome counts for one pass over the pending cases.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub total: usize,
    pub succeeded: usize,
    pub skipped: usize,
    pub failed: usize,
}

enum CaseOutcome {
    Succeeded,
    Skipped,
    Failed,
}

pub struct SummaryRunner {
    store: CaseStore,
    generator: SummaryGenerator,
}

impl SummaryRunner {
    pub fn new(store: CaseStore, generator: SummaryGenerator) -> Self {
        Self { store, generator }
    }

    /// Processes every pending case in fetch order. Only a failed fetch ends
    /// the run early; per-case problems are logged and counted. The store is
    /// closed before returning on every path.
    pub async fn run(self) -> Result<RunReport, StoreError> {
        let Self { store, generator } = self;
        let result = process_pending(&store, &generator).await;
        store.close();
        info!("Database connection closed");
        result
    }
}

async fn process_pending(
    store: &CaseStore,
    generator: &SummaryGenerator,
) -> Result<RunReport, StoreError> {
    let cases = store.fetch_pending_cases().map_err(|e| {
        error!("Cannot fetch pending cases: {}", e);
        e
    })?;

    let mut report = RunReport {
        total: cases.len(),
        ..Default::default()
    };

    for (i, case) in cases.iter().enumerate() {
        info!("Processing case {}/{}: ID={}", i + 1, cases.len(), case.id);
        match process_case(store, generator, case).await {
            CaseOutcome::Succeeded => report.succeeded += 1,
            CaseOutcome::Skipped => report.skipped += 1,
            CaseOutcome::Failed => report.failed += 1,
        }
    }

    info!(
        "Run finished: {} cases, {} succeeded, {} skipped, {} failed",
        report.total, report.succeeded, report.skipped, report.failed
    );
    Ok(report)
}

#[instrument(skip_all, fields(case_id = case.id))]
async fn process_case(
    store: &CaseStore,
    generator: &SummaryGenerator,
    case: &Case,
) -> CaseOutcome {
    let details = compose(case);
    if details.is_empty() {
        info!("Skipping case {} - no details available", case.id);
        return CaseOutcome::Skipped;
    }

    let generated = match generator.generate(&details).await {
        Ok(generated) => generated,
        Err(e) => {
            error!("Error processing case {}: {}", case.id, e);
            return CaseOutcome::Failed;
        }
    };

    // Every language is attempted even if an earlier one failed to save.
    let mut save_failures = 0;
    for entry in &generated.summaries {
        match store.save_summary(
            case.id,
            entry.lang,
            &entry.summary,
            &generated.model,
        ) {
            Ok(_) => info!("Saved {} summary for case {}", entry.lang, case.id),
            Err(e) => {
                warn!("{}", e);
                save_failures += 1;
            }
        }
    }

    if save_failures > 0 {
        error!(
            "Case {} saved partially: {} of {} summaries failed",
            case.id,
            save_failures,
            generated.summaries.len()
        );
        return CaseOutcome::Failed;
    }

    info!("Successfully processed case {}", case.id);
    CaseOutcome::Succeeded
}
