use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;
mod config;
mod db;

use commands::{ActivityCommand, ConfigCommand, MealCommand};
use config::Config;
use db::{init_db, ActivityRepository, NutritionRepository};

#[derive(Parser)]
#[command(name = "fittrack")]
#[command(version)]
#[command(about = "Track daily steps, distance, and meals", long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Daily step and distance tracking
    Activity(ActivityCommand),

    /// Food eaten per meal
    Meal(MealCommand),

    /// Manage configuration
    Config(ConfigCommand),
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fittrack=warn,fittrack_core=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if let Err(e) = run().await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = Config::load(cli.config)?;
    tracing::debug!(
        "Using database {} for user '{}'",
        config.database_path.value.display(),
        config.user_id.value
    );

    match cli.command {
        Some(Commands::Activity(cmd)) => {
            let pool = init_db(&config.database_path.value).await?;
            let repo = Arc::new(ActivityRepository::new(pool, &config.user_id.value));
            cmd.run(repo, &config).await?;
        }
        Some(Commands::Meal(cmd)) => {
            let pool = init_db(&config.database_path.value).await?;
            let repo = NutritionRepository::new(pool, &config.user_id.value);
            cmd.run(&repo).await?;
        }
        Some(Commands::Config(cmd)) => {
            cmd.run(&config)?;
        }
        None => {
            println!("Use --help to see available commands");
        }
    }

    Ok(())
}
