//! clipbot CLI: config inspection, environment checks, and a local driver
//! that exercises the session core without a chat transport.

mod config_commands;
mod doctor_commands;
mod driver;

use std::path::PathBuf;

use {
    clap::{Parser, Subcommand},
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

#[derive(Parser)]
#[command(name = "clipbot", about = "clipbot — media clip chat-bot core")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    /// Config file path (overrides standard-location discovery).
    #[arg(long, global = true, env = "CLIPBOT_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the local line-oriented driver (default).
    Run,
    /// Check the environment: config validity and probe availability.
    Doctor,
    /// Config operations.
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Print the effective configuration as TOML.
    Show,
    /// Validate the configuration and print diagnostics.
    Validate,
}

fn init_logging(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    let registry = tracing_subscriber::registry().with(filter);

    if cli.json_logs {
        registry
            .with(fmt::layer().json().with_target(true).with_thread_ids(false))
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_ansi(true),
            )
            .init();
    }
}

fn load_config(cli: &Cli) -> anyhow::Result<clipbot_config::ClipbotConfig> {
    match &cli.config {
        Some(path) => clipbot_config::load_config(path),
        None => Ok(clipbot_config::discover_and_load()),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_logging(&cli);

    let config = load_config(&cli)?;

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => driver::run(config).await,
        Commands::Doctor => doctor_commands::run(&config).await,
        Commands::Config { command } => match command {
            ConfigCommands::Show => config_commands::show(&config),
            ConfigCommands::Validate => config_commands::validate(&config),
        },
    }
}
