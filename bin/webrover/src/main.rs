mod commands;

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "webrover")]
#[command(about = "A web browsing agent driven by a chat model", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the browsing agent
    Agent {
        /// Task to perform (asked for when not provided)
        #[arg(short, long)]
        task: Option<String>,

        /// Model name (overrides agents.defaults.model)
        #[arg(short, long)]
        model: Option<String>,

        /// Context length limit in characters (overrides agents.defaults.contextLengthLimit)
        #[arg(long)]
        limit: Option<usize>,

        /// Run the browser headless: true or false
        #[arg(long)]
        headless: Option<bool>,

        /// Write the full conversation to a transcript after every turn
        #[arg(long)]
        debug: bool,

        /// Marker-based I/O for an external driver; confirmations are skipped
        #[arg(long)]
        autopilot: bool,
    },

    /// Run environment diagnostics
    Doctor,

    /// Manage configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Show the effective configuration as JSON
    Show,
    /// Print the config file location
    Path,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr; stdout belongs to the operator channel.
    let level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    match cli.command {
        Commands::Agent {
            task,
            model,
            limit,
            headless,
            debug,
            autopilot,
        } => {
            let options = commands::agent::AgentOptions {
                task,
                model,
                limit,
                headless,
                debug,
                autopilot,
            };
            commands::agent::run(options).await?;
        }
        Commands::Doctor => {
            commands::doctor::run().await?;
        }
        Commands::Config { command } => match command {
            ConfigCommands::Show => {
                commands::config_cmd::show().await?;
            }
            ConfigCommands::Path => {
                commands::config_cmd::path().await?;
            }
        },
    }

    Ok(())
}
