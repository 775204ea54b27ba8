//! Sandrun - OCI Runtime CLI
//!
//! Creates sandbox-isolated containers from OCI bundles. Follows the OCI
//! runtime-spec CLI interface like runc/crun for the `create` operation.
//!
//! ## Usage
//!
//! ```sh
//! sandrun [--config <file>] [--log <file>] create <container-id> --bundle <path> \
//!     [--console <path> | --console-socket <path>] [--pid-file <path>] [--detach]
//! sandrun [--config <file>] list
//! ```
//!
//! Logs go to stderr (or `--log`); `RUST_LOG` sets the filter.

use clap::{Parser, Subcommand};
use sandrun::cgroups::{CgroupManager, CgroupsConfig};
use sandrun::console::{open_pty, SocketConsole};
use sandrun::engine::local::LocalEngine;
use sandrun::engine::SandboxEngine;
use sandrun::{CreateRequest, Creator, Error, Phase, RuntimeConfig};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{debug, error};
use tracing_subscriber::EnvFilter;

// =============================================================================
// CLI Parsing
// =============================================================================

#[derive(Parser, Debug)]
#[command(name = "sandrun", version, about = "OCI runtime for sandbox-isolated containers")]
struct Cli {
    /// Runtime configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Write logs to this file instead of stderr
    #[arg(long, global = true)]
    log: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create a container
    Create(CreateArgs),
    /// List sandboxes as JSON
    List,
}

#[derive(Parser, Debug)]
struct CreateArgs {
    /// Path to the bundle directory, containing config.json and root filesystem
    #[arg(short, long, default_value = ".")]
    bundle: PathBuf,

    /// Console device path for the container process
    #[arg(long, conflicts_with = "console_socket")]
    console: Option<String>,

    /// Unix socket that receives the pseudoterminal master
    #[arg(long)]
    console_socket: Option<PathBuf>,

    /// File to write the pid of the created sandbox or container
    #[arg(long)]
    pid_file: Option<PathBuf>,

    /// Detach from the container process
    #[arg(short, long)]
    detach: bool,

    /// Name of the container instance
    #[arg(value_parser = clap::builder::NonEmptyStringValueParser::new(), required = true)]
    container_id: String,
}

// =============================================================================
// Logging
// =============================================================================

fn init_logging(log: Option<&PathBuf>) -> std::io::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);

    match log {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)?;
            builder
                .with_ansi(false)
                .with_writer(std::sync::Mutex::new(file))
                .init();
        }
        None => builder.with_writer(std::io::stderr).init(),
    }
    Ok(())
}

// =============================================================================
// Commands
// =============================================================================

fn load_config(path: Option<&PathBuf>) -> sandrun::Result<RuntimeConfig> {
    let path = RuntimeConfig::locate(path.map(PathBuf::as_path));
    debug!(path = %path.display(), "using runtime configuration");
    RuntimeConfig::load(&path)
}

async fn cmd_create(args: CreateArgs, runtime: RuntimeConfig) -> sandrun::Result<()> {
    let cgroups = match &runtime.runtime.cgroups_root {
        Some(root) => CgroupsConfig::new(root),
        None => CgroupsConfig::detect(),
    };
    let engine = Arc::new(LocalEngine::new(&runtime.runtime.state_root));
    let mut creator = Creator::new(engine, CgroupManager::new(cgroups));

    let mut console = args.console.unwrap_or_default();
    if let Some(socket) = args.console_socket {
        let pty = open_pty().map_err(|e| {
            Error::ConsoleSetupFailed(format!("allocate pseudoterminal: {}", e))
        })?;
        console = pty.slave.to_string_lossy().to_string();
        creator = creator.with_console(Box::new(SocketConsole::new(socket, pty)));
    }

    let request = CreateRequest::new(args.container_id, args.bundle)
        .with_console(console)
        .with_pid_file(args.pid_file.unwrap_or_default())
        .with_detach(args.detach);

    creator.create(&request, &runtime).await
}

async fn cmd_list(runtime: RuntimeConfig) -> sandrun::Result<()> {
    let engine = LocalEngine::new(&runtime.runtime.state_root);
    let sandboxes = engine
        .list_sandboxes()
        .await
        .map_err(|source| Error::Engine {
            phase: Phase::Validating,
            source,
        })?;
    let json = serde_json::to_string_pretty(&sandboxes)
        .map_err(|e| Error::Serialization(e.to_string()))?;
    println!("{}", json);
    Ok(())
}

async fn run(cli: Cli) -> sandrun::Result<()> {
    let runtime = load_config(cli.config.as_ref())?;
    match cli.command {
        Command::Create(args) => cmd_create(args, runtime).await,
        Command::List => cmd_list(runtime).await,
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = init_logging(cli.log.as_ref()) {
        eprintln!("error: cannot open log file: {}", e);
        return ExitCode::FAILURE;
    }

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(phase = %e.phase(), error = %e, "command failed");
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}
