// Main binary that starts the boot server.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(
    name = "lantern",
    version,
    about = "Declarative network-boot resolver: match boot requests to rendered artifacts"
)]
struct Cli {
    /// Path to the server configuration file (TOML).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the boot server (default).
    Serve,
    /// Load configuration and manifests, report their status, and exit.
    Check,
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).init();

    let cli = Cli::parse();
    let config = lantern_server::ServerConfig::load_or_default(cli.config.as_deref())?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => lantern_server::run(config).await,
        Command::Check => {
            lantern_server::build(&config).await?;
            println!("configuration ok");
            Ok(())
        }
    }
}
