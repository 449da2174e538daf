use anyhow::{bail, Context, Result};
use kindle_highlights::config::Config;
use kindle_highlights::db::SqliteStore;
use kindle_highlights::parser::{find_clippings_files, parse_clippings_files, ParseOptions};
use kindle_highlights::sync::{SyncEvent, Synchronizer};
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = match Config::load() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = run(&config) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run(config: &Config) -> Result<()> {
    let files = find_clippings_files(&config.clippings_path);
    if files.is_empty() {
        bail!("no clippings found at {}", config.clippings_path.display());
    }

    let options = ParseOptions {
        include_date: config.enable_highlight_date,
    };
    let report = parse_clippings_files(&files, options)?;
    println!("Found {} notes and highlights.\n", report.total_entries);
    println!(
        "× Passed {} bookmarks or unsupported clippings.\n",
        report.discarded
    );

    let mut store = SqliteStore::open(&config.database_path)
        .with_context(|| format!("opening {}", config.database_path.display()))?;
    let mut sync = Synchronizer::new(&mut store, config.enable_highlight_date)?
        .dry_run(config.dry_run);

    println!("Initiating transfer...\n");
    let stats = sync.sync_library_with(&report.library, |event| match event {
        SyncEvent::Checking(book) => println!("Checking book: {}", book.title),
        SyncEvent::Changing(book) => {
            let title_and_author = format!("{} ({})", book.title, book.author);
            println!("{}", title_and_author);
            println!("{}", "-".repeat(title_and_author.chars().count()));
        }
        SyncEvent::Finished(_, outcome) => {
            if let Some(message) = outcome.message() {
                println!("✓ {}\n", message);
            }
        }
    })?;

    println!(
        "Done: {} created, {} updated, {} unchanged ({} highlights added){}",
        stats.created,
        stats.updated,
        stats.unchanged,
        stats.highlights_added,
        if config.dry_run { " [dry run]" } else { "" }
    );
    Ok(())
}
