use anyhow::{Context, Result};
use clap::Parser;
use siva_indexer::config::Config;
use siva_indexer::indexer::{IndexOptions, Indexer};
use std::path::PathBuf;
use std::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::Level;

/// Index rooted repositories into a CSV file of per-repository statistics
#[derive(Parser, Debug)]
#[command(name = "siva-indexer", version = env!("CARGO_PKG_VERSION"))]
#[command(long_version = concat!(env!("CARGO_PKG_VERSION"), " (", env!("GIT_COMMIT_HASH"), ", built ", env!("BUILD_TIMESTAMP"), ")"))]
struct Cli {
    /// Config file, defaults to the platform config directory
    #[arg(long, env = "SIVA_INDEXER_CONFIG")]
    config: Option<PathBuf>,

    /// CSV file path with the results
    #[arg(short = 'o', long)]
    output: Option<PathBuf>,

    /// Repositories processed concurrently
    #[arg(long)]
    workers: Option<usize>,

    /// Max number of repositories to process
    #[arg(long)]
    limit: Option<usize>,

    /// Skip initial n repositories
    #[arg(long)]
    offset: Option<usize>,

    /// Path to a file with a repository per line, only those will be processed
    #[arg(long)]
    repos_file: Option<PathBuf>,

    /// JSON lines file with the repository descriptors
    #[arg(long)]
    repositories: Option<PathBuf>,

    /// File with `owner/name stars` lines
    #[arg(long)]
    stars_file: Option<PathBuf>,

    /// Root repositories directory or store URL
    #[arg(long)]
    root_repositories: Option<String>,

    /// Fill FORK_COUNT once all repositories are processed
    #[arg(long)]
    count_forks: bool,

    /// Show debug logs
    #[arg(long)]
    debug: bool,

    /// Write logs to file
    #[arg(long)]
    logfile: Option<PathBuf>,
}

impl Cli {
    fn load_config(&self) -> Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::from_file(path)?,
            None => Config::load_or_default()?,
        };
        config.apply_env_overrides();

        if let Some(output) = &self.output {
            config.indexing.output = output.clone();
        }
        if let Some(workers) = self.workers {
            config.indexing.workers = workers;
        }
        if let Some(limit) = self.limit {
            config.indexing.limit = limit;
        }
        if let Some(offset) = self.offset {
            config.indexing.offset = offset;
        }
        if let Some(path) = &self.repos_file {
            config.indexing.repos_file = Some(path.clone());
        }
        if let Some(path) = &self.repositories {
            config.indexing.repositories_file = Some(path.clone());
        }
        if let Some(path) = &self.stars_file {
            config.indexing.stars_file = Some(path.clone());
        }
        if let Some(target) = &self.root_repositories {
            config.storage.root_repositories_target = target.clone();
        }
        if self.count_forks {
            config.indexing.count_forks = true;
        }

        config.validate()?;
        Ok(config)
    }
}

fn init_tracing(debug: bool, logfile: Option<&PathBuf>) -> Result<()> {
    let level = if debug { Level::DEBUG } else { Level::INFO };
    let builder = tracing_subscriber::fmt().with_max_level(level);

    match logfile {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("unable to open log file {}", path.display()))?;
            builder.with_ansi(false).with_writer(Mutex::new(file)).init();
        }
        None => builder.init(),
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.debug, cli.logfile.as_ref())?;

    let config = cli.load_config()?;
    let indexer = Indexer::from_config(&config).await?;
    let opts = IndexOptions::from_config(&config)?;

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Received an interrupt signal, stopping");
            on_signal.cancel();
        }
    });

    indexer.index(opts, cancel).await?;
    Ok(())
}
