use anyhow::Result;
use clap::{Parser, Subcommand};

use chat_bootstrap::cli::{init, plan, verify};
use chat_bootstrap::config::Config;
use chat_bootstrap::logging::init_logging;

#[derive(Parser)]
#[command(name = "chat-bootstrap")]
#[command(about = "Provision the chat history database, indexes and application user")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Config file path
    #[arg(short, long, default_value = "chat-bootstrap.yaml")]
    config: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the database, collection, indexes and application user (default)
    Init,

    /// Show what init would do, without connecting
    Plan,

    /// Check an existing deployment against the expected resources
    Verify,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load(&cli.config)?;
    init_logging(&config.logging)?;

    match cli.command.unwrap_or(Commands::Init) {
        Commands::Init => {
            init::run(&config).await?;
        }
        Commands::Plan => {
            plan::run(&config).await?;
        }
        Commands::Verify => {
            if !verify::run(&config).await? {
                std::process::exit(1);
            }
        }
    }

    Ok(())
}
