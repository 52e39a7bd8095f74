use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use supportdesk::config::{LogFormat, SupportConfig};

mod cmd;

#[derive(Parser)]
#[command(name = "supportdesk")]
#[command(version, about = "E-commerce customer support automation")]
pub struct Cli {
    /// Path to the configuration file (default: ./supportdesk.toml if present)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// SQLite database path. Overrides the config file and SUPPORTDESK_DB_PATH.
    #[arg(long, global = true)]
    pub db_path: Option<PathBuf>,

    /// Log level or filter directive (e.g. "debug", "supportdesk=trace")
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Log output format
    #[arg(long, global = true, value_enum)]
    pub log_format: Option<LogFormatArg>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum LogFormatArg {
    Compact,
    Json,
}

impl From<LogFormatArg> for LogFormat {
    fn from(arg: LogFormatArg) -> Self {
        match arg {
            LogFormatArg::Compact => LogFormat::Compact,
            LogFormatArg::Json => LogFormat::Json,
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP API and WebSocket server
    Serve {
        /// Interface to bind
        #[arg(long)]
        host: Option<String>,

        /// Port to serve on
        #[arg(short, long)]
        port: Option<u16>,

        /// Enable a permissive CORS layer
        #[arg(long)]
        cors: bool,

        /// Minimum simulated processing delay in seconds
        #[arg(long)]
        delay_min: Option<u64>,

        /// Maximum simulated processing delay in seconds
        #[arg(long)]
        delay_max: Option<u64>,
    },
    /// Create and seed the database, then print table counts
    InitDb,
    /// Manage registered clients
    Clients {
        #[command(subcommand)]
        command: ClientsCommands,
    },
    /// Run the full pipeline on one message and print the outcome as JSON
    Process {
        /// Sender email (must be a registered client)
        email: String,

        /// Message body
        message: String,

        /// Message subject
        #[arg(short, long, default_value = "")]
        subject: String,
    },
    /// Process every ticket still in the `new` status
    ProcessPending {
        /// Maximum number of tickets to process
        #[arg(short, long, default_value = "50")]
        limit: usize,
    },
    /// Show ticket and shop statistics
    Stats,
    /// Send synthetic customer messages to a running server
    Simulate {
        #[command(subcommand)]
        mode: SimulateMode,

        /// Base URL of the support server
        #[arg(long, global = true, default_value = "http://127.0.0.1:5000")]
        base_url: String,

        /// Use the stored simulation scenarios instead of built-in templates
        #[arg(long, global = true)]
        scenarios: bool,
    },
    /// View or create the configuration file
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Clone)]
pub enum ClientsCommands {
    /// Register a new client
    Add {
        nom: String,
        prenom: String,
        email: String,

        /// Client type
        #[arg(long, default_value = "standard")]
        type_client: String,
    },
    /// List registered clients
    List,
}

#[derive(Subcommand, Clone)]
pub enum SimulateMode {
    /// One message every 60/per-minute seconds for a fixed duration
    Steady {
        /// Duration in minutes
        #[arg(long, default_value = "30")]
        minutes: u64,

        /// Messages per minute
        #[arg(long, default_value = "2")]
        per_minute: u32,
    },
    /// Send messages concurrently
    Burst {
        /// Number of messages
        #[arg(long, default_value = "10")]
        count: usize,
    },
    /// Send a single message
    Once,
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    /// Show the effective configuration with secrets masked
    Show,
    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

fn init_logging(config: &SupportConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);
    let result = match config.logging.format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Compact => builder.compact().try_init(),
    };
    if let Err(e) = result {
        eprintln!("Failed to initialize logging: {}", e);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env is fine.
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let config = match &cli.command {
        // The file may not exist yet.
        Commands::Config {
            command: Some(ConfigCommands::Init { .. }),
        } => SupportConfig::default(),
        _ => SupportConfig::resolve(cli.config.as_deref())
            .context("Failed to load configuration")?,
    };
    let config = config.with_cli_overrides(
        cli.db_path.clone(),
        cli.log_level.clone(),
        cli.log_format.map(LogFormat::from),
    );
    init_logging(&config);

    match &cli.command {
        Commands::Serve {
            host,
            port,
            cors,
            delay_min,
            delay_max,
        } => {
            cmd::cmd_serve(
                config,
                cmd::ServeArgs {
                    host: host.clone(),
                    port: *port,
                    cors: *cors,
                    delay_min: *delay_min,
                    delay_max: *delay_max,
                },
            )
            .await?
        }
        Commands::InitDb => cmd::cmd_init_db(&config)?,
        Commands::Clients { command } => cmd::cmd_clients(&config, command.clone())?,
        Commands::Process {
            email,
            message,
            subject,
        } => cmd::cmd_process(&config, email, subject, message).await?,
        Commands::ProcessPending { limit } => cmd::cmd_process_pending(&config, *limit).await?,
        Commands::Stats => cmd::cmd_stats(&config)?,
        Commands::Simulate {
            mode,
            base_url,
            scenarios,
        } => cmd::cmd_simulate(&config, mode.clone(), base_url, *scenarios).await?,
        Commands::Config { command } => {
            cmd::cmd_config(&config, cli.config.as_deref(), command.clone())?
        }
    }

    Ok(())
}
