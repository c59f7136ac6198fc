//! Command-line interface definitions using clap.

use clap::{Parser, Subcommand};
use herd::logging::LogFormat;
use std::net::IpAddr;
use std::path::PathBuf;

/// Pre-forking server: one listening socket, many worker processes.
#[derive(Parser, Debug)]
#[command(name = "herd")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output (-v for debug, -vv for trace).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log output format (pretty, compact, json).
    #[arg(long, global = true, env = "HERD_LOG_FORMAT")]
    pub log_format: Option<LogFormat>,

    /// Also write logs to this file, rotated daily.
    #[arg(long, global = true, env = "HERD_LOG_FILE")]
    pub log_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Bind the listener and serve it from a pool of workers.
    Serve(ServeArgs),
}

/// Arguments for the serve command.
#[derive(Parser, Debug)]
pub struct ServeArgs {
    /// Number of worker processes (default: number of CPUs).
    #[arg(short, long, env = "HERD_WORKERS", value_parser = clap::value_parser!(u32).range(1..))]
    pub workers: Option<u32>,

    /// Address to bind.
    #[arg(long, env = "HERD_HOST", default_value = "127.0.0.1")]
    pub host: IpAddr,

    /// Port to listen on (0 picks a free port).
    #[arg(short, long, env = "HERD_PORT", default_value_t = 3000)]
    pub port: u16,

    /// Pending-connection queue length.
    #[arg(long, env = "HERD_BACKLOG", default_value_t = 128, value_parser = clap::value_parser!(i32).range(1..))]
    pub backlog: i32,

    /// Replace workers that exit.
    #[arg(long, env = "HERD_RESPAWN")]
    pub respawn: bool,

    /// Directory for master and worker pid files.
    #[arg(long, env = "HERD_PID_DIR")]
    pub pid_dir: Option<PathBuf>,

    /// Each worker exits after answering this many connections.
    #[arg(long, env = "HERD_MAX_CONNECTIONS", value_parser = clap::value_parser!(u64).range(1..))]
    pub max_connections: Option<u64>,

    /// Seconds workers get to exit on shutdown before being killed.
    #[arg(long, env = "HERD_SHUTDOWN_TIMEOUT", default_value_t = 5.0)]
    pub shutdown_timeout: f64,
}
