use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use testpool_config::DEFAULT_CFG_PATH;

#[derive(Debug, Parser)]
#[command(name = "testpool", about = "VM/container pool reconciliation engine", version)]
pub struct Cli {
    /// Path to the YAML config file.
    #[arg(long, default_value = DEFAULT_CFG_PATH)]
    pub cfg_file: PathBuf,

    /// Stop after N scheduler iterations instead of running forever.
    #[arg(long)]
    pub count: Option<u64>,

    /// Longest the scheduler will sleep between iterations, in seconds.
    #[arg(long)]
    pub max_sleep_time: Option<u64>,

    /// Shortest the scheduler will sleep before a due action, in seconds.
    #[arg(long)]
    pub min_sleep_time: Option<u64>,

    /// Skip the startup reconciliation (§4.I) and go straight to the loop.
    #[arg(long)]
    pub no_setup: bool,

    /// Increase log verbosity; repeatable (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Durable store backend to use.
    #[arg(long, value_enum, default_value_t = StoreBackend::Redb, env = "TESTPOOL_STORE_BACKEND")]
    pub store_backend: StoreBackend,

    /// File path (redb) or connection URL (postgres); ignored for `memory`.
    #[arg(long, env = "TESTPOOL_STORE_PATH")]
    pub store_path: Option<String>,

    /// Also serve the HTTP surface (§6) in-process at this address.
    #[arg(long, env = "TESTPOOL_HTTP_ADDR")]
    pub http_addr: Option<std::net::SocketAddr>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum StoreBackend {
    Memory,
    Redb,
    Postgres,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Query a running engine's HTTP surface and print pool occupancy.
    Status {
        /// Base URL of the engine's HTTP surface.
        #[arg(long, default_value = "http://127.0.0.1:8080")]
        url: String,
    },
}
