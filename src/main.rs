use anyhow::Context;
use background_service::{CommunityFeed, IndexingService};
use clap::{Parser, Subcommand, ValueEnum};
use database::Database;
use engageboard_core::{AppConfig, ErrorExt, ErrorReporter, IndexMode};
use feed_client::{FeedApiClient, MetricsCollector, SnapshotApiClient};
use snapshot_resolver::{
    paint_then_refresh, FallbackResolver, FileCacheStorage, FileStaticSnapshot, Resolution,
    SnapshotCache,
};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str = "engageboard=info,engageboard_core=info,scoring_engine=info,\
feed_client=info,database=info,snapshot_resolver=info,background_service=info";

/// Community engagement leaderboard.
#[derive(Debug, Parser)]
#[command(name = "engageboard", version, about = "Community engagement leaderboard")]
struct CliArgs {
    /// Optional path to a TOML configuration file.
    #[arg(long = "config", env = "ENGAGEBOARD_CONFIG", value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand, Clone)]
enum Command {
    /// Run one indexing pass against the posts API.
    Index {
        #[arg(long, value_enum, default_value_t = ModeArg::Upsert)]
        mode: ModeArg,
    },
    /// Index now and then every polling interval until interrupted.
    Watch {
        #[arg(long, value_enum, default_value_t = ModeArg::Upsert)]
        mode: ModeArg,
    },
    /// Print the snapshot endpoint body built from the local store.
    Snapshot,
    /// Resolve the leaderboard as a viewer would at startup.
    Resolve,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ModeArg {
    Upsert,
    Full,
}

impl From<ModeArg> for IndexMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Upsert => IndexMode::Upsert,
            ModeArg::Full => IndexMode::Full,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let args = CliArgs::parse();
    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: CliArgs) -> anyhow::Result<()> {
    let loaded = AppConfig::load(args.config.as_deref());
    let config = match args.command {
        Command::Resolve => loaded.unwrap_or_else(|e| {
            e.log_warn();
            tracing::warn!("Resolving with default settings");
            AppConfig::default()
        }),
        _ => loaded.context("loading configuration")?,
    };

    match args.command {
        Command::Index { mode } => {
            let service = indexing_service(&config).await?;
            let run = service.run_once(mode.into()).await.map_err(|e| {
                ErrorReporter::new().report_error(&e);
                e
            })?;
            tracing::info!(run_id = %run.run_id, "Indexed {} authors", run.author_count);
        }
        Command::Watch { mode } => {
            let service = indexing_service(&config).await?;
            let shutdown = async {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    tracing::warn!("Could not listen for Ctrl-C: {}", e);
                    std::future::pending::<()>().await;
                }
            };
            let summary = service.run_forever(mode.into(), shutdown).await;
            tracing::info!(
                succeeded = summary.succeeded,
                failed = summary.failed,
                "Watch finished"
            );
        }
        Command::Snapshot => {
            let database = open_database(&config).await?;
            let response = database.snapshot_response().await?;
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        Command::Resolve => {
            resolve(&config).await;
        }
    }

    Ok(())
}

async fn open_database(config: &AppConfig) -> anyhow::Result<Database> {
    let mut database = Database::new(config.database_url.clone());
    if let Err(e) = database.connect().await {
        e.log_error();
        return Err(e.into());
    }
    database.run_migrations().await?;
    Ok(database)
}

async fn indexing_service(config: &AppConfig) -> anyhow::Result<IndexingService<CommunityFeed>> {
    config
        .validate_ingestion()
        .context("ingestion needs posts_api_url and community_id")?;
    let client = FeedApiClient::new(
        &config.posts_api_url,
        config.posts_api_key.clone(),
        &config.user_agent,
        Duration::from_secs(config.remote_timeout_secs),
        MetricsCollector::new(),
    )?;
    let feed = CommunityFeed::new(client, config.community_id.clone(), config.fetch_limit);
    let database = open_database(config).await?;
    Ok(IndexingService::new(
        feed,
        database,
        config.polling_interval_minutes,
    ))
}

/// The read path: every failure degrades to a lower tier, never an exit code.
async fn resolve(config: &AppConfig) -> Resolution {
    let timeout = Duration::from_secs(config.remote_timeout_secs);
    let resolver = FallbackResolver::new(
        snapshot_remote(config, timeout),
        FileStaticSnapshot::new(&config.static_snapshot_path),
        SnapshotCache::new(FileCacheStorage::new(&config.cache_path)),
    )
    .with_remote_timeout(timeout);

    paint_then_refresh(&resolver, print_resolution).await
}

fn snapshot_remote(config: &AppConfig, timeout: Duration) -> Option<SnapshotApiClient> {
    let url = config.snapshot_api_url.as_deref()?;
    match SnapshotApiClient::new(url, &config.user_agent, timeout, MetricsCollector::new()) {
        Ok(client) => Some(client),
        Err(e) => {
            e.log_warn();
            tracing::warn!("Snapshot endpoint disabled, resolving from cache and bundled snapshot");
            None
        }
    }
}

fn print_resolution(resolution: &Resolution) {
    println!("== {} ({} entries)", resolution.status.label(), resolution.entries.len());
    for entry in &resolution.entries {
        println!(
            "{:>3}. {:<24} {:<20} score {:>6}  tweets {:>4}  likes {:>6}  rts {:>5}",
            entry.rank, entry.name, entry.handle, entry.score, entry.tweets, entry.likes, entry.rts
        );
    }
}
