/// Main entry point for the vault MCP server
///
/// This file sets up logging, parses command line arguments, and runs one
/// of three commands: the WebSocket server, the stdio bridge an MCP host
/// launches, or a status probe. Logs always go to stderr so they never
/// mix with the protocol stream on stdout.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing::{error, info};

use vault_mcp::{bridge, shutdown, BridgeConfig, Settings, VaultMcpServer};

/// Command line arguments for the vault MCP server
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Path to a settings file (JSON)
    /// If not provided, the platform config directory is checked
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    /// Enable verbose output (implies debug)
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve a vault to WebSocket MCP clients
    Serve {
        /// Vault directory (defaults to the settings value or the working directory)
        #[arg(long)]
        vault: Option<PathBuf>,

        /// TCP port to listen on
        #[arg(long)]
        port: Option<u16>,
    },
    /// Bridge stdin/stdout to a running server
    Bridge {
        #[arg(long, default_value = "localhost")]
        host: String,

        /// Server port (defaults to the configured server port)
        #[arg(long)]
        port: Option<u16>,

        #[arg(long, default_value = "/")]
        path: String,
    },
    /// Report whether a server is answering
    Status {
        #[arg(long, default_value = "localhost")]
        host: String,

        #[arg(long)]
        port: Option<u16>,
    },
}

fn init_logging(args: &Args, settings: &Settings) {
    let log_level = if args.verbose {
        "debug"
    } else if args.debug {
        "info"
    } else {
        settings.log_level.as_str()
    };

    tracing_subscriber::fmt()
        .with_env_filter(format!("vault_mcp={}", log_level))
        .with_writer(std::io::stderr) // Send logs to stderr, not stdout
        .init();
}

async fn run(args: Args, mut settings: Settings) -> Result<(), Box<dyn std::error::Error>> {
    match args.command {
        Command::Serve { vault, port } => {
            if let Some(port) = port {
                settings.server_port = port;
            }
            if vault.is_some() {
                settings.vault_path = vault;
            }
            if !settings.mcp_server_enabled {
                info!("MCP server is disabled in settings; nothing to do");
                return Ok(());
            }

            let vault_root = settings.vault_root()?;
            let server = VaultMcpServer::new(settings, vault_root)?;
            server.run().await?;
            info!("Vault MCP server shutdown complete");
        }
        Command::Bridge { host, port, path } => {
            let config = BridgeConfig {
                host,
                port: port.unwrap_or(settings.server_port),
                path,
            };
            bridge::run(
                &config,
                tokio::io::stdin(),
                tokio::io::stdout(),
                shutdown::shutdown_signal(),
            )
            .await?;
        }
        Command::Status { host, port } => {
            let config = BridgeConfig {
                host,
                port: port.unwrap_or(settings.server_port),
                path: "/".to_string(),
            };
            match bridge::probe(&config).await {
                Ok(()) => println!("Running ({})", config.url()),
                Err(e) => {
                    info!("Status probe failed: {}", e);
                    println!("Stopped ({})", config.url());
                }
            }
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let settings = match Settings::load(args.config.as_deref()) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    init_logging(&args, &settings);

    match run(args, settings).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
