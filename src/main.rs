//! Interactive shell: read a query, run it, print the envelope.

use anyhow::Result;
use clap::Parser;
use quiver::{Config, Database};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "quiver", about = "Property-graph database over sparse linear algebra")]
struct Cli {
    /// Path to a configuration file (defaults to config.toml lookup)
    #[arg(short, long)]
    config: Option<String>,

    /// Run a single query and exit
    #[arg(short, long)]
    query: Option<String>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::load().unwrap_or_default(),
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.logging.level.clone())),
        )
        .init();

    let db = Database::new(config);

    if let Some(query) = cli.query {
        run_query(&db, &query);
        return Ok(());
    }

    println!("quiver {} - type a query, or :quit", env!("CARGO_PKG_VERSION"));
    let mut editor = DefaultEditor::new()?;
    loop {
        match editor.readline("quiver> ") {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                if line == ":quit" || line == ":q" {
                    break;
                }
                editor.add_history_entry(line)?;
                run_query(&db, line);
            }
            Err(ReadlineError::Interrupted | ReadlineError::Eof) => break,
            Err(err) => {
                eprintln!("readline error: {err}");
                break;
            }
        }
    }
    Ok(())
}

fn run_query(db: &Database, query: &str) {
    match db.execute(query) {
        Ok(result) => {
            if !result.header().is_empty() {
                println!("{}", result.header().join(", "));
            }
            for row in db.serialize_rows(&result) {
                println!("{row}");
            }
            for line in result.stats_as_strings() {
                println!("{line}");
            }
        }
        Err(err) => eprintln!("{err}"),
    }
}
