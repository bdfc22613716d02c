use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod cli;
mod config;

use cli::commands::{self, QueryArgs};
use config::Config;

#[derive(Parser)]
#[command(name = "qc")]
#[command(author, version, about = "Querycraft - fluent queries over an entity document store")]
struct Cli {
    /// Path to the project directory
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    /// Path to config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a new project
    Init {
        /// Path to create the project in
        path: PathBuf,
    },

    /// Validate schema.yaml
    Check,

    /// Show entities, or one entity's fields and associations
    Schema {
        entity: Option<String>,
    },

    /// Import JSON document files
    Import {
        /// Directory to scan for *.json files
        dir: PathBuf,
    },

    /// Parse a condition expression and print the result
    Parse {
        expression: String,
    },

    /// Build and run a query
    Query(QueryArgs),

    /// Show index statistics
    Stats,
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log.as_deref().unwrap_or("warn")))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    init_tracing(&config);

    // --root, then the configured root, then the current directory
    let root = match cli.root.or_else(|| config.root.clone()) {
        Some(root) => root,
        None => std::env::current_dir().context("Could not determine project directory")?,
    };
    tracing::debug!(root = %root.display(), "resolved project root");

    match cli.command {
        Commands::Init { path } => commands::init(&path),
        Commands::Check => commands::check(&root),
        Commands::Schema { entity } => commands::schema(&root, entity.as_deref()),
        Commands::Import { dir } => commands::import(&root, &dir),
        Commands::Parse { expression } => commands::parse(&expression),
        Commands::Query(args) => commands::query(&root, &args, &config),
        Commands::Stats => commands::stats(&root),
    }
}
