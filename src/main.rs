//! herd - pre-forking server binary.

mod cli;

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use herd::logging::{self, LogConfig};
use herd::plugins::{Logger, PidFiles};
use herd::{HelloServer, Master, Role};
use owo_colors::{OwoColorize, Stream::Stderr};

use cli::{Cli, Commands};

fn main() {
    let cli = Cli::parse();

    let mut log_config = LogConfig::from_verbosity(cli.verbose, cli.quiet).with_env_overrides();
    if let Some(format) = cli.log_format {
        log_config = log_config.with_format(format);
    }
    if let Some(path) = &cli.log_file {
        log_config = log_config.with_file(path.clone());
    }
    logging::init(log_config);

    let result = match &cli.command {
        Commands::Serve(args) => cmd_serve(args),
    };

    if let Err(e) = result {
        eprintln!(
            "{}: {}",
            "error"
                .if_supports_color(Stderr, |text| text.red())
                .if_supports_color(Stderr, |text| text.bold()),
            e
        );
        for cause in e.chain().skip(1) {
            eprintln!(
                "  {}: {}",
                "caused by".if_supports_color(Stderr, |text| text.yellow()),
                cause
            );
        }
        std::process::exit(1);
    }
}

/// Run the master, or the worker when re-executed by one.
///
/// Workers parse the same arguments and register the same plugins, so
/// `configure` sees identical options on both sides.
fn cmd_serve(args: &cli::ServeArgs) -> Result<()> {
    let role = Role::detect();
    let worker_id = match role {
        Role::Worker { id, .. } => id,
        Role::Master => None,
    };

    let mut server = HelloServer::new().with_worker_id(worker_id);
    if let Some(max) = args.max_connections {
        let max = usize::try_from(max).context("--max-connections is too large")?;
        server = server.with_max_connections(max);
    }
    let mut master = Master::new(role, server);
    if let Some(n) = args.workers {
        master.set_worker_count(n as usize)?;
    }
    let timeout = Duration::try_from_secs_f64(args.shutdown_timeout)
        .context("--shutdown-timeout must be a non-negative number of seconds")?;
    master
        .set_address(SocketAddr::new(args.host, args.port))?
        .set_backlog(args.backlog)?
        .set_respawn(args.respawn)?
        .set_shutdown_timeout(timeout)?
        .use_plugin(Logger)?;
    if let Some(dir) = &args.pid_dir {
        master.use_plugin(PidFiles::new(dir))?;
    }

    master
        .run()
        .with_context(|| format!("{} failed", master.role()))?;
    Ok(())
}
