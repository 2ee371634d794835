use std::path::PathBuf;

use clap::{Parser, Subcommand};

use warden_observe::{LoggerFormat, LoggerLevel};

/// Single-service controller.
#[derive(Debug, Parser)]
#[command(name = "warden", version, about)]
pub struct Cli {
    /// Log filter, e.g. `info` or `warden_core=debug,info`.
    #[arg(long, global = true)]
    pub log_level: Option<LoggerLevel>,

    /// Log output format: text, json or journald.
    #[arg(long, global = true)]
    pub log_format: Option<LoggerFormat>,

    /// JSON configuration file.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Create or start the controller and wait until its service is spawned.
    Up {
        #[arg(long)]
        state: PathBuf,
        /// Service definition; required the first time only.
        #[arg(long)]
        definition: Option<PathBuf>,
        #[arg(long)]
        name: Option<String>,
        /// Seconds to wait for the service to be spawned.
        #[arg(long)]
        wait: Option<u64>,
    },
    /// Stop the controller and its service.
    Down {
        #[arg(long)]
        state: PathBuf,
        /// Seconds to wait after the graceful stop request.
        #[arg(long)]
        timeout: Option<u64>,
    },
    /// Print the controller record and derived liveness.
    Status {
        #[arg(long)]
        state: PathBuf,
        #[arg(long)]
        json: bool,
    },
    /// Remove all state of a stopped controller.
    Purge {
        #[arg(long)]
        state: PathBuf,
    },
    /// Stream controller events, one record per line.
    Monitor {
        #[arg(long)]
        state: PathBuf,
        /// Emit TIMEOUT and stop after this many seconds; 0 waits forever.
        #[arg(long, default_value_t = 0)]
        timeout: u64,
        /// Append records to this file instead of stdout.
        #[arg(long)]
        sink: Option<PathBuf>,
        #[arg(long)]
        outer: Option<char>,
        #[arg(long)]
        inner: Option<char>,
    },
    /// Controller loop (spawned by `up`).
    #[command(hide = true)]
    Loop {
        #[arg(long)]
        state: PathBuf,
        #[arg(long)]
        gate: Option<PathBuf>,
    },
    /// Gated service launcher (spawned by the controller loop).
    #[command(hide = true)]
    Shim {
        #[arg(long)]
        gate: PathBuf,
    },
}
