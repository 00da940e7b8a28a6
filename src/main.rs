use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use phone_book::config::{AppConfig, Backend, StorageMode};
use phone_book::console::Console;
use phone_book::logging::init_logging;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Storage engine
    #[arg(short, long, value_enum)]
    backend: Option<Backend>,

    /// Storage mode; skips the connection menu
    #[arg(short, long, value_enum)]
    storage: Option<StorageMode>,

    /// Database path for file storage
    #[arg(short, long)]
    database: Option<PathBuf>,

    /// Configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long)]
    log_level: Option<String>,

    /// Print the effective configuration as YAML and exit
    #[arg(long)]
    print_config: bool,
}

fn main() -> Result<()> {
    // Parse command line arguments
    let cli = Cli::parse();

    // Load configuration, then apply command line overrides
    let mut config = AppConfig::load(cli.config.as_deref())?;
    if let Some(backend) = cli.backend {
        config.database.backend = backend;
    }
    if let Some(storage) = cli.storage {
        config.database.storage = storage;
    }
    if let Some(database) = &cli.database {
        config.database.path = database.display().to_string();
    }
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }
    config.validate()?;

    if cli.print_config {
        io::stdout().write_all(config.to_yaml()?.as_bytes())?;
        return Ok(());
    }

    // Initialize logging; the guard flushes the file log on exit
    let _guard = init_logging(&config.logging)?;

    info!(backend = ?config.database.backend, path = %config.database.path, "Starting phone book");

    let stdin = io::stdin();
    let mut console = Console::new(stdin.lock(), io::stdout());
    let Some(mut book) = console.connect(&config, cli.storage)? else {
        return Ok(());
    };

    console.run(&mut book, &config.picture)?;
    book.close_database().context("Failed to close database")?;

    info!("Phone book closed");
    Ok(())
}
