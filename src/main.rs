use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::sync::Mutex;
use tracing_subscriber::EnvFilter;

use buildpool::config::{DispatcherConfig, DEFAULT_PORT};
use buildpool::hosts_file::HostsInfoFile;
use buildpool::inventory::{Inventory, SharedInventory};
use buildpool::server::Dispatcher;
use buildpool::shutdown::install_shutdown_handler;
use buildpool::tasks::{run_stats, run_sweeper};

#[derive(Parser, Debug)]
#[command(name = "buildpool")]
#[command(about = "A distributed compilation-host dispatcher")]
struct Args {
    /// Port to listen on for worker and client requests
    #[arg(short = 'p', long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Log at debug level
    #[arg(short = 'D', long)]
    debug: bool,

    /// Path to the hosts-info file with declared worker capacities
    #[arg(short = 'H', long, default_value = "hosts-info")]
    hosts_info_file: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let filter = if args.debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = DispatcherConfig {
        port: args.port,
        hosts_info_file: args.hosts_info_file,
    };

    tracing::info!(
        port = config.port,
        hosts_info_file = %config.hosts_info_file.display(),
        "Starting buildpool dispatcher"
    );

    let store: SharedInventory = Arc::new(Mutex::new(Inventory::new()));
    let hosts_file = Arc::new(HostsInfoFile::new(config.hosts_info_file.clone()));
    let shutdown = install_shutdown_handler();

    tokio::spawn(run_sweeper(store.clone(), shutdown.clone()));
    tokio::spawn(run_stats(store.clone(), shutdown.clone()));

    let dispatcher = Dispatcher::new(config, store, hosts_file, shutdown);
    dispatcher.run().await?;

    Ok(())
}
