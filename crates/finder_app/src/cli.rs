use std::path::PathBuf;

use clap::{Parser, ValueEnum};

pub const DEFAULT_SETTINGS_PATH: &str = "playlist_finder.ron";
pub const DEFAULT_LOG_PATH: &str = "playlist_finder.log";

#[derive(Debug, Parser)]
#[command(name = "playlist_finder")]
#[command(about = "Find playlists by genre and list their owners")]
pub struct Cli {
    /// Genres to search; repeat the flag or separate with commas.
    #[arg(short, long = "genre", value_delimiter = ',')]
    pub genres: Vec<String>,

    /// Settings file (RON). Missing file means defaults.
    #[arg(long, default_value = DEFAULT_SETTINGS_PATH)]
    pub settings: PathBuf,

    /// Write the merged settings back to the settings file.
    #[arg(long)]
    pub save_settings: bool,

    /// Credentials file with client_id and client_secret.
    #[arg(long)]
    pub credentials: Option<PathBuf>,

    /// Print the saved credentials with the secret masked, then exit.
    #[arg(long)]
    pub show_credentials: bool,

    /// Write the given client credentials to the credentials file, then exit.
    #[arg(long, requires_all = ["client_id", "client_secret"], conflicts_with = "show_credentials")]
    pub save_credentials: bool,

    #[arg(long, requires = "save_credentials")]
    pub client_id: Option<String>,

    #[arg(long, requires = "save_credentials")]
    pub client_secret: Option<String>,

    #[arg(long, requires = "save_credentials")]
    pub redirect_uri: Option<String>,

    #[arg(long)]
    pub page_size: Option<u32>,

    /// Courtesy delay after each playlist, in milliseconds.
    #[arg(long)]
    pub delay_ms: Option<u64>,

    #[arg(long)]
    pub max_retries: Option<u32>,

    #[arg(long)]
    pub api_base_url: Option<String>,

    #[arg(long)]
    pub token_url: Option<String>,

    #[arg(long, value_enum, default_value_t = OutputMode::Table)]
    pub output: OutputMode,

    /// Stream every record as a JSON line to this file while the run goes.
    #[arg(long)]
    pub stream_to: Option<PathBuf>,

    /// Export the final table and a manifest into this directory.
    #[arg(long)]
    pub export_dir: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = LogTarget::Terminal)]
    pub log: LogTarget,

    #[arg(long, default_value = DEFAULT_LOG_PATH)]
    pub log_file: PathBuf,

    /// Log at debug level.
    #[arg(short, long)]
    pub verbose: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputMode {
    /// Sorted table once the run ends.
    Table,
    /// One tab-separated line per record as it arrives.
    Text,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogTarget {
    Terminal,
    File,
    Both,
}
