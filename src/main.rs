use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::{info, warn};

use version_service::config::{ServiceConfig, log_path};
use version_service::discovery::{GitLabTags, TagDiscovery};
use version_service::logging;
use version_service::service::{ServiceOptions, VersionService};
use version_service::storage::{DocumentStore, SqliteCache, VersionStore};
use version_service::version::IncrementKind;

#[derive(Parser)]
#[command(name = "version-service")]
#[command(version, about = "Semantic version orchestrator with cache and durable tiers")]
struct Cli {
    /// Config file (defaults to the data directory's config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the current version, creating the record if needed
    Get { identifier: String },
    /// Bump the version
    Increment {
        identifier: String,
        #[arg(long, default_value = "patch")]
        kind: IncrementKind,
    },
    /// Overwrite the version
    Set { identifier: String, version: String },
    /// Print a development build version for a commit
    Dev {
        identifier: String,
        #[arg(long)]
        sha: String,
        #[arg(long)]
        branch: Option<String>,
    },
    /// List records, optionally for one group
    List {
        #[arg(long)]
        group: Option<String>,
    },
    /// Report health of both tiers and write metrics
    Health,
    /// Load the cache and run maintenance tasks until Ctrl-C
    Run,
}

#[derive(Serialize)]
struct VersionOutput<'a> {
    identifier: &'a str,
    version: String,
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn build_service(config: &ServiceConfig) -> anyhow::Result<VersionService> {
    let cache: Arc<dyn VersionStore> = match &config.cache.path {
        Some(path) => {
            if let Some(dir) = path.parent() {
                std::fs::create_dir_all(dir)?;
            }
            Arc::new(SqliteCache::new(path, config.cache.ttl_ms)?)
        }
        None => Arc::new(SqliteCache::in_memory(config.cache.ttl_ms)?),
    };

    let remote = config
        .durable
        .remote
        .as_deref()
        .context("durable.remote is not configured")?;
    let durable = Arc::new(DocumentStore::open(&config.durable.working_copy, remote).await?);

    let tags: Option<Arc<dyn TagDiscovery>> = if config.tag_discovery.enabled {
        let discovery = &config.tag_discovery;
        Some(Arc::new(GitLabTags::new(
            &discovery.base_url,
            discovery.access_token.clone(),
            Duration::from_secs(discovery.timeout_secs),
        )?))
    } else {
        None
    };

    Ok(VersionService::new(
        cache,
        durable,
        tags,
        ServiceOptions::from(config),
    ))
}

async fn execute(service: &VersionService, command: Command) -> anyhow::Result<()> {
    match command {
        Command::Get { identifier } => {
            let record = service.get_version(&identifier).await?;
            print_json(&record)
        }
        Command::Increment { identifier, kind } => {
            let version = service.increment_version(&identifier, kind).await?;
            print_json(&VersionOutput {
                identifier: &identifier,
                version: version.to_string(),
            })
        }
        Command::Set {
            identifier,
            version,
        } => {
            let record = service.set_version(&identifier, &version).await?;
            print_json(&record)
        }
        Command::Dev {
            identifier,
            sha,
            branch,
        } => {
            let version = service
                .dev_version(&identifier, &sha, branch.as_deref())
                .await?;
            print_json(&VersionOutput {
                identifier: &identifier,
                version: version.to_string(),
            })
        }
        Command::List { group } => {
            let records = match group {
                Some(group) => service.list_versions_by_group(&group).await?,
                None => service.list_versions().await?,
            };
            print_json(&records)
        }
        Command::Health => {
            let report = service.health_report().await;
            print_json(&serde_json::json!({
                "health": report,
                "metrics": service.metrics_snapshot(),
            }))
        }
        Command::Run => {
            let maintenance = service.spawn_maintenance();
            info!("Service running, press Ctrl-C to stop");
            tokio::signal::ctrl_c().await?;
            info!("Shutting down");
            maintenance.shutdown().await;
            Ok(())
        }
    }
}

async fn run(config: ServiceConfig, command: Command) -> anyhow::Result<()> {
    let service = build_service(&config).await?;

    if matches!(command, Command::Run) {
        service.initialize().await?;
    }

    let result = execute(&service, command).await;
    service.shutdown().await;

    let report = service.health_report().await;
    if report.push_needed {
        warn!("Some durable writes are committed locally but not pushed");
    }
    result
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = ServiceConfig::load(cli.config.as_deref())?;

    let _guard = logging::init(&log_path(), &config.log_level, config.json_logs)?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(run(config, cli.command))
}
