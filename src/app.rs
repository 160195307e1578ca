use crate::cli::CommonArgs;
use crate::details::compose;
use crate::gemini::real::create_gemini_client;
use crate::prompts::build_summary_prompt;
use crate::runner::SummaryRunner;
use crate::secrets_sync::{
    read_env_file, sync_secrets, HfSpaceSecrets, DEFAULT_HF_ENDPOINT,
};
use crate::store::CaseStore;
use crate::summary::SummaryGenerator;
use crate::{notebook, time_util};
use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::{prelude::*, Registry};
use tracing_tree::HierarchicalLayer;

// Add build-time information
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate summaries for every pending case
    Run {
        #[command(flatten)]
        common: CommonArgs,
    },

    /// Show summary counts and how many cases are pending
    Status {
        #[command(flatten)]
        common: CommonArgs,
    },

    /// Print the composed details and prompt for one case
    Preview {
        #[command(flatten)]
        common: CommonArgs,

        /// Case to preview
        #[arg(long)]
        case_id: i64,
    },

    /// Push a local env file to the Hugging Face Space secret store
    SyncSecrets {
        /// Env file to read
        #[arg(long, default_value = ".env")]
        env_file: PathBuf,

        /// Space repository, as "owner/name"
        #[arg(long, env = "HF_REPO_ID")]
        repo_id: String,

        /// Hugging Face write token
        #[arg(long, env = "HF_TOKEN", hide_env_values = true)]
        hf_token: String,

        /// Hugging Face API endpoint
        #[arg(long, env = "HF_ENDPOINT", default_value = DEFAULT_HF_ENDPOINT)]
        hf_endpoint: String,

        /// Timeout for each HTTP request
        #[arg(long, env = "HTTP_TIMEOUT_SECS", default_value_t = 30)]
        http_timeout_secs: u64,
    },

    /// Write the task notebook
    Notebook {
        /// Where to write the .ipynb file
        #[arg(long, default_value = "case_summaries.ipynb")]
        output: PathBuf,
    },
}

fn get_build_info() -> String {
    let mut parts = vec![format!("Version {}", built_info::PKG_VERSION)];
    parts.push(format!("Built {}", built_info::BUILT_TIME_UTC));
    parts.push(format!("Profile {}", built_info::PROFILE));
    parts.push(format!("Target {}", built_info::TARGET));
    parts.push(format!("Rustc {}", built_info::RUSTC_VERSION));
    parts.join(" • ")
}

fn init_logging() {
    let subscriber = Registry::default()
        .with(
            HierarchicalLayer::new(2)
                .with_targets(true)
                .with_bracketed_fields(true),
        )
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        );

    tracing::subscriber::set_global_default(subscriber)
        .expect("Failed to set tracing subscriber");
}

fn open_store(common: &CommonArgs) -> Result<CaseStore> {
    Ok(CaseStore::open(&common.database, common.db_busy_timeout())?)
}

async fn run_summaries(common: CommonArgs) -> Result<()> {
    let api_key = common.gemini_api_key.clone().ok_or_else(|| {
        anyhow::anyhow!("GEMINI_API_KEY must be set to generate summaries")
    })?;
    let client = create_gemini_client(
        api_key,
        &common.gemini_base_url,
        common.http_timeout(),
    )?;
    let generator =
        SummaryGenerator::new(client, common.generator_config())?;
    info!(
        "Using models {:?} with up to {} attempts per case",
        common.models, common.max_retries
    );

    let store = open_store(&common)?;
    let report = SummaryRunner::new(store, generator).run().await?;
    println!(
        "Processed {} cases: {} succeeded, {} skipped, {} failed",
        report.total, report.succeeded, report.skipped, report.failed
    );
    Ok(())
}

fn show_status(common: &CommonArgs) -> Result<()> {
    let store = open_store(common)?;
    let counts = store.summary_counts()?;
    let total: i64 = counts.iter().map(|(_, count)| count).sum();
    println!("Summaries: {}", total);
    for (lang, count) in &counts {
        println!("  {}: {}", lang, count);
    }
    println!("Pending cases: {}", store.pending_count()?);
    store.close();
    Ok(())
}

fn preview_case(common: &CommonArgs, case_id: i64) -> Result<()> {
    let store = open_store(common)?;
    let case = store
        .get_case(case_id)?
        .ok_or_else(|| anyhow::anyhow!("case {} not found", case_id))?;

    println!(
        "Case {} ({}), updated {}",
        case.id,
        case.status,
        time_util::format_millis(case.updated_at)
    );
    for lang in crate::SummaryLang::ALL {
        if let Some(summary) = store.get_summary(case.id, lang)? {
            println!(
                "  {} summary by {} at {}",
                lang,
                summary.ai_model.as_deref().unwrap_or("unknown model"),
                time_util::format_millis(summary.updated_at)
            );
        }
    }

    let details = compose(&case);
    if details.is_empty() {
        println!("No details available; this case would be skipped.");
    } else {
        println!("\n{}", build_summary_prompt(&details));
    }
    store.close();
    Ok(())
}

async fn run_sync_secrets(
    env_file: PathBuf,
    repo_id: String,
    hf_token: String,
    hf_endpoint: String,
    http_timeout_secs: u64,
) -> Result<()> {
    let secrets = HfSpaceSecrets::new(
        &hf_endpoint,
        repo_id,
        hf_token,
        Duration::from_secs(http_timeout_secs),
    )?;
    let entries = read_env_file(&env_file)?;
    info!(
        "Syncing {} to Space {}",
        env_file.display(),
        secrets.repo_id()
    );

    let report = sync_secrets(&secrets, &entries).await;
    println!(
        "Sync complete: {} succeeded, {} failed",
        report.succeeded, report.failed
    );
    if report.failed > 0 {
        return Err(anyhow::anyhow!("{} secrets failed to sync", report.failed));
    }
    Ok(())
}

pub async fn main() -> Result<()> {
    init_logging();
    info!("{}", get_build_info());

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Run { common } => run_summaries(common).await,
        Commands::Status { common } => show_status(&common),
        Commands::Preview { common, case_id } => preview_case(&common, case_id),
        Commands::SyncSecrets {
            env_file,
            repo_id,
            hf_token,
            hf_endpoint,
            http_timeout_secs,
        } => {
            run_sync_secrets(
                env_file,
                repo_id,
                hf_token,
                hf_endpoint,
                http_timeout_secs,
            )
            .await
        }
        Commands::Notebook { output } => notebook::write_notebook(&output),
    };

    if let Err(e) = &result {
        error!("{:#}", e);
    }
    result
}
