use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use graphcms_migrate::graphcms::{GraphCmsClient, GraphCmsError};
use graphcms_migrate::migrate::{self, MigrateOptions, MigrationReport, Outcome, DEFAULT_ASSET_HOST};
use graphcms_migrate::records;
use graphcms_migrate::retry::RetryPolicy;
use graphcms_migrate::util::env;

#[derive(Parser, Debug)]
#[command(
    name = "graphcms-migrate",
    version,
    about = "Migrate a legacy CMS export into GraphCMS"
)]
struct Cli {
    /// Path to the legacy JSON export (overrides DATA_FILE)
    #[arg(long, global = true)]
    data: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
#[command(rename_all = "kebab-case")]
enum Commands {
    /// Migrate every record in the export
    All {
        /// Query the target for oldId first and skip records that already exist
        #[arg(long, default_value_t = false)]
        skip_existing: bool,
        /// Retries per network call after the initial attempt (overrides MIGRATE_RETRIES)
        #[arg(long)]
        retries: Option<u32>,
        /// Delay between attempts in milliseconds (overrides MIGRATE_RETRY_DELAY_MS)
        #[arg(long)]
        retry_delay_ms: Option<u64>,
        /// Double the delay after each failed attempt
        #[arg(long, default_value_t = false)]
        backoff: bool,
    },
    /// Migrate a single record by its legacy id
    One {
        /// Legacy id (key into the export)
        #[arg(long)]
        old_id: i64,
        /// Query the target for oldId first and skip if it already exists
        #[arg(long, default_value_t = false)]
        skip_existing: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    env::init_env();
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .compact()
        .try_init();

    let cli = Cli::parse();

    env::preflight_check(
        "graphcms-migrate",
        &["GRAPHCMS_URL", "AUTH_TOKEN"],
        &["GRAPHCMS_URL", "AUTH_TOKEN", "LEGACY_ASSET_HOST", "DATA_FILE"],
    )?;

    let endpoint = env::env_req("GRAPHCMS_URL")?;
    url::Url::parse(&endpoint).context("GRAPHCMS_URL is not a valid URL")?;
    let token = env::env_req("AUTH_TOKEN")?;
    let asset_host =
        env::env_opt("LEGACY_ASSET_HOST").unwrap_or_else(|| DEFAULT_ASSET_HOST.to_string());
    let data_path = cli
        .data
        .or_else(|| env::env_opt("DATA_FILE").map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("storage/data.json"));

    let record_set = records::load_records(&data_path)?;
    info!(records = record_set.len(), data = %data_path.display(), "loaded legacy export");

    let client = GraphCmsClient::new(&endpoint, &token)?;

    let result = match cli.command {
        Commands::All {
            skip_existing,
            retries,
            retry_delay_ms,
            backoff,
        } => {
            let mut policy = RetryPolicy::from_env();
            if let Some(n) = retries {
                policy.retries = n;
            }
            if let Some(ms) = retry_delay_ms {
                policy.delay = Duration::from_millis(ms);
            }
            if backoff {
                policy.backoff = true;
            }
            let opts = MigrateOptions {
                skip_existing,
                asset_host,
                retry: Some(policy),
            };
            migrate::migrate_all(&client, &record_set, &opts).await
        }
        Commands::One {
            old_id,
            skip_existing,
        } => {
            let record = record_set
                .get(&old_id.to_string())
                .with_context(|| format!("record {old_id} not found in export"))?;
            let opts = MigrateOptions {
                skip_existing,
                asset_host,
                retry: None,
            };
            migrate::migrate_one(&client, record, &opts)
                .await
                .map(|outcome| {
                    let mut report = MigrationReport {
                        total: 1,
                        ..Default::default()
                    };
                    match outcome {
                        Outcome::Created(_) => report.created = 1,
                        Outcome::Skipped => report.skipped = 1,
                    }
                    report
                })
        }
    };

    match result {
        Ok(report) => {
            info!("{}", report.summary());
            println!("{}", report.summary());
            Ok(())
        }
        Err(err) => {
            log_classified(&err);
            // propagate so the process exits nonzero on a partial run
            Err(err)
        }
    }
}

/// Top-level diagnosis only; nothing here recovers. One variant per error
/// class: GraphQL application errors, transport/HTTP errors, the rest.
fn log_classified(err: &anyhow::Error) {
    match err.chain().find_map(|e| e.downcast_ref::<GraphCmsError>()) {
        Some(GraphCmsError::GraphQl { messages }) => {
            error!(errors = ?messages, "GraphQL error");
        }
        Some(GraphCmsError::Http { status, body }) => {
            error!(status = *status, body = %body, "HTTP error");
        }
        _ => {
            error!(error = ?err, "migration failed");
        }
    }
}
