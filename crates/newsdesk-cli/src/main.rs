use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use newsdesk_client::{ClientConfig, NewsApiClient};
use newsdesk_store::SqliteStore;
use newsdesk_sync::{IngestionPipeline, Scheduler, SyncConfig};
use newsdesk_web::AppState;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "newsdesk")]
#[command(about = "News article sync and retrieval service")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run the retrieval API and the daily sync scheduler.
    Serve {
        #[arg(long)]
        port: Option<u16>,
    },
    /// Run one manual ingestion cycle over an explicit date range.
    Sync {
        /// Earliest publish date, YYYY-MM-DD (defaults to today).
        #[arg(long, value_parser = parse_date)]
        from: Option<NaiveDate>,
        /// Latest publish date, YYYY-MM-DD (defaults to today).
        #[arg(long, value_parser = parse_date)]
        to: Option<NaiveDate>,
    },
    /// Create the database tables.
    Migrate,
}

fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|err| format!("{raw} is not a YYYY-MM-DD date: {err}"))
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
}

async fn open_store(config: &SyncConfig) -> Result<SqliteStore> {
    let store = SqliteStore::connect(&config.database_url)
        .await
        .with_context(|| format!("opening database {}", config.database_url))?;
    store.migrate().await.context("creating tables")?;
    Ok(store)
}

fn build_pipeline(store: Arc<SqliteStore>, config: &SyncConfig) -> Result<IngestionPipeline> {
    let client = NewsApiClient::new(ClientConfig::from_env()?)?;
    Ok(IngestionPipeline::new(
        Arc::new(client),
        store,
        config.search_term.clone(),
        config.window_days,
    ))
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let config = SyncConfig::from_env();

    match cli.command.unwrap_or(Commands::Serve { port: None }) {
        Commands::Serve { port } => {
            let store = Arc::new(open_store(&config).await?);

            let scheduler = if config.scheduler_enabled {
                let pipeline = Arc::new(build_pipeline(store.clone(), &config)?);
                Some(Scheduler::start(pipeline, &config.sync_cron).await?)
            } else {
                None
            };

            let port = port.unwrap_or_else(newsdesk_web::port_from_env);
            let result = newsdesk_web::serve(AppState::new(store), port).await;

            if let Some(scheduler) = scheduler {
                scheduler.shutdown().await?;
            }
            result
        }
        Commands::Sync { from, to } => {
            let today = Utc::now().date_naive();
            let from = from.unwrap_or(today);
            let to = to.unwrap_or(today);

            let store = Arc::new(open_store(&config).await?);
            let pipeline = build_pipeline(store, &config)?;
            let summary = pipeline.run(&config.search_term, from, to, true).await?;
            println!(
                "sync complete: fetched={} inserted={} ids={:?}",
                summary.fetched,
                summary.inserted(),
                summary.inserted_ids
            );
            Ok(())
        }
        Commands::Migrate => {
            open_store(&config).await?;
            println!("database ready at {}", config.database_url);
            Ok(())
        }
    }
}
