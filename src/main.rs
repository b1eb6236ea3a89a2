//! tarantoolup - supervise Tarantool instances on a single host.
//!
//! Commands:
//!
//! - `tarantoolup start [instance]` - launch matching instances as
//!   detached daemons (skipping ones already running)
//! - `tarantoolup stop [instance]` - signal matching instances to stop
//!
//! The instance argument filters the instances declared in the config
//! file: empty selects everything, `app` every instance of one app,
//! `app.instance` exactly one.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use tarantoolup::config::{self, ClusterConfig};
use tarantoolup::liveness::SystemInspector;
use tarantoolup::supervisor::Supervisor;

#[derive(Parser)]
#[command(name = "tarantoolup")]
#[command(version)]
#[command(about = "Supervise Tarantool instances: layered config, pid tracking, detached launch")]
struct Cli {
    /// Configuration file (default: tarantool.ini, .tarantool.ini,
    /// ~/.config/tarantool/tarantool.ini or /etc/tarantool/tarantool.ini)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start instances
    ///
    /// Examples:
    ///   tarantoolup start              # every declared instance
    ///   tarantoolup start myapp        # every instance of myapp
    ///   tarantoolup start myapp.r1     # exactly one instance
    Start {
        /// Attach to the instance console after starting
        #[arg(short, long)]
        attach: bool,
        /// Instance filter: empty, app, or app.instance
        #[arg(default_value = "")]
        instance_name: String,
    },
    /// Stop instances
    Stop {
        /// Instance filter: empty, app, or app.instance
        #[arg(default_value = "")]
        instance_name: String,
    },
}

fn init_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn main() -> Result<()> {
    init_logging();

    let cli = Cli::parse();

    let config_path = cli.config.unwrap_or_else(config::find_config_file);
    let config = if config_path.exists() {
        ClusterConfig::load(&config_path)?
    } else {
        // Recoverable: warn and run against an empty config.
        eprintln!("Can't find config file: {}", config_path.display());
        ClusterConfig::default()
    }
    .with_defaults(config::builtin_defaults());

    let inspector = SystemInspector;
    let supervisor = Supervisor::new(&config, &inspector)?;

    match cli.command {
        Commands::Start {
            attach,
            instance_name,
        } => {
            supervisor.start(&instance_name)?;
            if attach {
                // Console attach needs the control-socket protocol, which
                // the supervisor only provisions paths for.
                eprintln!("--attach is not implemented yet");
            }
        },
        Commands::Stop { instance_name } => {
            supervisor.stop(&instance_name)?;
        },
    }

    Ok(())
}
