//! Hospital indexer CLI
//!
//! Rebuilds the hospital search index from the primary store.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use hospital_indexer::{
    error::Result,
    models::{Config, StoreBackend},
    pipeline::{LogProgressSink, NullProgressSink, PipelineDriver, ProgressSink, Shutdown},
    storage::{ElasticIndex, MemoryIndex, SearchIndex, open_store},
};

/// hospital-indexer - Hospital search index rebuilder
#[derive(Parser, Debug)]
#[command(
    name = "hospital-indexer",
    version,
    about = "Incremental bulk reindexing of hospital records"
)]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, global = true, default_value = "config.toml")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Only log warnings and errors; no progress lines
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Reindex every hospital
    Run {
        /// Build documents without writing to the search index
        #[arg(long)]
        dry_run: bool,

        /// Documents per bulk request
        #[arg(long)]
        batch_size: Option<usize>,

        /// Batches indexed concurrently
        #[arg(long)]
        parallelism: Option<usize>,
    },

    /// Validate the configuration
    Validate,

    /// Show store and index status
    Info,

    /// Create the search index and its mapping if missing
    InitIndex,
}

/// Initialize logging based on verbosity flags and the configured level.
fn init_logging(verbose: bool, quiet: bool, configured: &str) {
    let level = if verbose {
        "debug"
    } else if quiet {
        "warn"
    } else {
        configured
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

/// First Ctrl-C stops the driver after the current page; a second one exits.
fn install_interrupt_handler(shutdown: Shutdown) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_err() {
            return;
        }
        log::warn!("Interrupt received, finishing the current page (Ctrl-C again to abort)...");
        shutdown.request();

        if tokio::signal::ctrl_c().await.is_ok() {
            log::error!("Second interrupt received, aborting");
            std::process::exit(130);
        }
    });
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let (mut config, load_error) = match Config::load(&cli.config) {
        Ok(config) => (config, None),
        Err(e) => (Config::default(), Some(e)),
    };
    init_logging(cli.verbose, cli.quiet, &config.logging.level);
    match load_error {
        Some(e) => log::warn!(
            "Config load failed from {}: {}. Using defaults.",
            cli.config.display(),
            e
        ),
        None => log::info!("Loaded configuration from {}", cli.config.display()),
    }
    config.apply_env();

    match cli.command {
        Command::Run {
            dry_run,
            batch_size,
            parallelism,
        } => {
            if let Some(batch_size) = batch_size {
                config.pipeline.batch_size = batch_size;
            }
            if let Some(parallelism) = parallelism {
                config.pipeline.parallelism = parallelism;
            }
            config.validate()?;

            let store = open_store(&config.store);
            let dry_index = Arc::new(MemoryIndex::new());
            let index: Arc<dyn SearchIndex> = if dry_run {
                log::info!("Dry run: documents are kept in memory");
                dry_index.clone()
            } else {
                let elastic = ElasticIndex::from_config(&config.index)?;
                elastic.ensure_index().await?;
                Arc::new(elastic)
            };

            let sink: Box<dyn ProgressSink> = if cli.quiet || !config.logging.show_progress {
                Box::new(NullProgressSink)
            } else {
                Box::new(LogProgressSink)
            };

            let mut driver = PipelineDriver::new(store, index, &config).with_sink(sink);
            install_interrupt_handler(driver.shutdown_handle());
            let summary = driver.run().await?;

            if dry_run {
                log::info!("Dry run built {} documents", dry_index.len());
            }
            if summary.interrupted {
                log::warn!("Reindex interrupted: {}", summary);
            } else {
                log::info!("Reindex complete: {}", summary);
            }
        }

        Command::Validate => {
            log::info!("Validating configuration...");

            if let Err(e) = config.validate() {
                log::error!("Config validation failed: {}", e);
                return Err(e);
            }
            log::info!("✓ Config OK");

            match config.store.backend {
                StoreBackend::Mongo => {
                    log::info!("✓ MongoDB database {}", config.store.database);
                }
                StoreBackend::Snapshot if config.store.data_dir.is_dir() => {
                    log::info!("✓ Data directory {}", config.store.data_dir.display());
                }
                StoreBackend::Snapshot => log::warn!(
                    "Data directory {} does not exist",
                    config.store.data_dir.display()
                ),
            }

            log::info!("All validations passed!");
        }

        Command::Info => {
            let store = open_store(&config.store);
            match store.connect().await {
                Ok(()) => {
                    match store.count_hospitals().await {
                        Ok(count) => log::info!("Hospitals: {}", count),
                        Err(e) => log::warn!("Could not count hospitals: {}", e),
                    }
                    match store.pharmacies_with_position().await {
                        Ok(pharmacies) => {
                            log::info!("Pharmacies with coordinates: {}", pharmacies.len())
                        }
                        Err(e) => log::warn!("Could not read pharmacies: {}", e),
                    }
                    store.disconnect().await?;
                }
                Err(e) => log::warn!("Store unreachable: {}", e),
            }

            log::info!("Search index: {} ({})", config.index.url, config.index.index_name);
            let index = ElasticIndex::from_config(&config.index)?;
            match index.ping().await {
                Ok(()) => match index.count().await {
                    Ok(count) => log::info!("Indexed documents: {}", count),
                    Err(e) => log::warn!("Index {} not readable: {}", index.index_name(), e),
                },
                Err(e) => log::warn!("Search cluster unreachable: {}", e),
            }
        }

        Command::InitIndex => {
            let index = ElasticIndex::from_config(&config.index)?;
            if !index.ensure_index().await? {
                log::info!("Index {} already exists", index.index_name());
            }
        }
    }

    log::info!("Done!");

    Ok(())
}
