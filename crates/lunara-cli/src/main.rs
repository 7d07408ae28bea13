use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;
mod common;

#[derive(Parser)]
#[command(name = "lunara-cli", version, about = "Lunara CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// User management
    User {
        #[command(subcommand)]
        action: commands::user::UserAction,
    },
    /// Cycle logging and status
    Cycle {
        #[command(subcommand)]
        action: commands::cycle::CycleAction,
    },
    /// Notification preferences and introspection
    Notify {
        #[command(subcommand)]
        action: commands::notify::NotifyAction,
    },
    /// Restore jobs and run the scheduler loop
    Run,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::User { action } => commands::user::run(action),
        Commands::Cycle { action } => commands::cycle::run(action),
        Commands::Notify { action } => commands::notify::run(action).await,
        Commands::Run => commands::run::run().await,
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
