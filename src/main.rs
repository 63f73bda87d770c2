//! Binary entrypoint for the MeshCom gateway CLI.
//!
//! Commands:
//! - `start [--port <path>]` - run the gateway (serial logger + UDP relay)
//! - `init` - write a starter `config.toml`
//! - `status` - list stored tables with row counts and columns
//! - `prune` - keep only the newest row of every table
//!
//! See the library crate docs for module-level details: `meshcom_gateway::`.
use anyhow::{anyhow, bail, Result};
use clap::{Parser, Subcommand};
use log::{error, info, warn};
use std::sync::atomic::Ordering;
use tokio::time::{interval, Duration, MissedTickBehavior};

use meshcom_gateway::config::Config;
use meshcom_gateway::frame::processor::FrameProcessor;
use meshcom_gateway::gateway::Gateway;
use meshcom_gateway::metrics;
use meshcom_gateway::relay::UdpRelay;
use meshcom_gateway::serial::SerialLink;
use meshcom_gateway::storage::SchemaStore;

#[derive(Parser)]
#[command(name = "meshcom-gateway")]
#[command(about = "Serial logger and UDP relay for MeshCom mesh nodes")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path (can be used before or after subcommand)
    #[arg(short, long, default_value = "config.toml", global = true)]
    config: String,

    /// Verbose logging (-v, -vv for more; may appear before or after subcommand)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the gateway
    Start {
        /// MeshCom device port (e.g., /dev/ttyUSB0); overrides the config file
        #[arg(short, long)]
        port: Option<String>,
    },
    /// Write a default configuration file
    Init,
    /// Show stored tables, row counts and columns
    Status,
    /// Delete all but the newest row in every table
    Prune,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Init => {
            init_logging(None, cli.verbose);
            if tokio::fs::try_exists(&cli.config).await.unwrap_or(false) {
                bail!("Refusing to overwrite existing config file {}", cli.config);
            }
            Config::create_default(&cli.config).await?;
            info!("Configuration file created at {}", cli.config);
        }
        Commands::Start { port } => {
            let config = Config::load(&cli.config).await?;
            init_logging(Some(&config), cli.verbose);
            info!("Starting meshcom-gateway v{}", env!("CARGO_PKG_VERSION"));
            if let Err(e) = run_gateway(config, port).await {
                error!("{:#}", e);
                return Err(e);
            }
        }
        Commands::Status => {
            let config = Config::load(&cli.config).await?;
            init_logging(Some(&config), cli.verbose);
            let store = open_existing_store(&config)?;
            let summaries = store.table_summaries()?;
            if summaries.is_empty() {
                println!("No tables yet.");
            }
            for summary in summaries {
                println!(
                    "{:<12} {:>8} rows  [{}]",
                    summary.table,
                    summary.rows,
                    summary.columns.join(", ")
                );
            }
        }
        Commands::Prune => {
            let config = Config::load(&cli.config).await?;
            init_logging(Some(&config), cli.verbose);
            let mut store = open_existing_store(&config)?;
            let reports = store.prune_to_newest()?;
            if reports.is_empty() {
                println!("No rows deleted");
            } else {
                let mut total = 0;
                for report in &reports {
                    println!("{}: {} rows deleted", report.table, report.deleted);
                    total += report.deleted;
                }
                println!("Total rows deleted: {}", total);
            }
        }
    }

    Ok(())
}

async fn run_gateway(config: Config, port: Option<String>) -> Result<()> {
    let mut serial_config = config.serial.clone();
    if let Some(cli_port) = port {
        serial_config.port = cli_port;
    }

    let db_path = config.database_path()?;
    let store = SchemaStore::open(&db_path)
        .map_err(|e| anyhow!("Failed to open frame store {}: {}", db_path.display(), e))?;

    // No device, no gateway: this is fatal
    let (reader, writer) = SerialLink::open(&serial_config).await?;
    info!("Connected to MeshCom device on {}", serial_config.port);

    if config.relay.enabled {
        let relay = UdpRelay::bind(&config.relay, writer.clone()).await?;
        tokio::spawn(async move {
            if let Err(e) = relay.run().await {
                error!("UDP relay task failed: {}", e);
            }
        });
    } else {
        info!("UDP relay disabled in config");
    }

    if config.stats.interval_secs > 0 {
        let every = Duration::from_secs(config.stats.interval_secs);
        tokio::spawn(async move {
            let mut ticker = interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                info!("Counters: {}", metrics::snapshot());
            }
        });
    }

    let processor = FrameProcessor::new(store, config.node.callsign.clone());
    let mut gateway = Gateway::new(reader, processor);
    let shutdown = gateway.shutdown_handle();
    let mut loop_task = tokio::task::spawn_blocking(move || gateway.run());
    info!("MeshCom serial logger running");

    let result = tokio::select! {
        joined = &mut loop_task => joined.map_err(|e| anyhow!("Gateway loop task failed: {}", e))?,
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown requested; waiting for the gateway loop");
            shutdown.store(true, Ordering::Relaxed);
            // returns within one serial read timeout
            loop_task.await.map_err(|e| anyhow!("Gateway loop task failed: {}", e))?
        }
    };
    info!("Final counters: {}", metrics::snapshot());
    result
}

fn open_existing_store(config: &Config) -> Result<SchemaStore> {
    let db_path = config.database_path()?;
    if !db_path.is_file() {
        bail!("Database file not found: {}", db_path.display());
    }
    SchemaStore::open(&db_path)
        .map_err(|e| anyhow!("Failed to open frame store {}: {}", db_path.display(), e))
}

fn init_logging(config: Option<&Config>, verbosity: u8) {
    use std::io::Write;
    let mut builder = env_logger::Builder::new();
    // CLI verbosity wins over the configured level
    let base_level = match verbosity {
        0 => config
            .and_then(|c| c.logging.level.parse::<log::LevelFilter>().ok())
            .unwrap_or(log::LevelFilter::Info),
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    builder.filter_level(base_level);

    let log_file = config.and_then(|c| c.logging.file.as_ref());
    let opened = log_file.and_then(|path| {
        match std::fs::OpenOptions::new().create(true).append(true).open(path) {
            Ok(f) => Some(f),
            Err(e) => {
                eprintln!("Cannot open log file {}: {} (logging to console only)", path, e);
                None
            }
        }
    });

    if let Some(file) = opened {
        let file = std::sync::Mutex::new(file);
        // mirror to the console only when someone is watching it
        let is_tty = atty::is(atty::Stream::Stdout);
        builder.format(move |fmt, record| {
            let ts = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
            let line = format!("{} [{}] {}", ts, record.level(), record.args());
            if let Ok(mut guard) = file.lock() {
                let _ = writeln!(guard, "{}", line);
            }
            if is_tty {
                writeln!(fmt, "{}", line)
            } else {
                Ok(())
            }
        });
    } else {
        builder.format(|fmt, record| {
            let ts = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
            writeln!(fmt, "{} [{}] {}", ts, record.level(), record.args())
        });
    }
    if builder.try_init().is_err() {
        warn!("Logger already initialized");
    }
}
