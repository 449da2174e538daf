use clap::Parser;
use std::path::PathBuf;

const DEFAULT_CLIPPINGS_PATH: &str = "/Volumes/Kindle/documents/My Clippings.txt";
const DEFAULT_DATABASE_PATH: &str = "./highlights.db";

#[derive(Parser, Debug, Default)]
#[command(name = "kindle-highlights")]
#[command(about = "Sync Kindle clippings into a per-book highlights store")]
pub struct CliArgs {
    /// Path to "My Clippings.txt", or a directory (e.g. a mounted Kindle) to search
    #[arg(short, long)]
    pub clippings: Option<String>,

    /// Path to the SQLite database file
    #[arg(short, long = "database")]
    pub database_path: Option<String>,

    /// Include the "Added on" date of each highlight
    #[arg(long, conflicts_with = "no_highlight_date")]
    pub highlight_date: bool,

    /// Leave out highlight dates
    #[arg(long)]
    pub no_highlight_date: bool,

    /// Report what would change without writing
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub clippings_path: PathBuf,
    pub database_path: PathBuf,
    pub enable_highlight_date: bool,
    pub dry_run: bool,
}

#[derive(Debug, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid boolean for {name}: '{value}'. Expected true/false, yes/no or 1/0")]
    InvalidBoolean { name: String, value: String },
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        let cli = CliArgs::parse();
        Self::from_args(cli, |name| std::env::var(name).ok())
    }

    fn from_args(cli: CliArgs, env: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let clippings_path = cli
            .clippings
            .or_else(|| env("CLIPPINGS_PATH"))
            .unwrap_or_else(|| DEFAULT_CLIPPINGS_PATH.to_string());

        let database_path = cli
            .database_path
            .or_else(|| env("DATABASE_PATH"))
            .unwrap_or_else(|| DEFAULT_DATABASE_PATH.to_string());

        let enable_highlight_date = if cli.highlight_date {
            true
        } else if cli.no_highlight_date {
            false
        } else {
            match env("ENABLE_HIGHLIGHT_DATE") {
                Some(value) => parse_bool("ENABLE_HIGHLIGHT_DATE", &value)?,
                None => true,
            }
        };

        Ok(Config {
            clippings_path: PathBuf::from(clippings_path),
            database_path: PathBuf::from(database_path),
            enable_highlight_date,
            dry_run: cli.dry_run,
        })
    }
}

fn parse_bool(name: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "1" => Ok(true),
        "false" | "no" | "0" => Ok(false),
        _ => Err(ConfigError::InvalidBoolean {
            name: name.to_string(),
            value: value.to_string(),
        }),
    }
}
