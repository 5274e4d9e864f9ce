use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use finder_engine::{AtomicFileWriter, CatalogSettings, PipelineConfig};
use finder_logging::finder_info;
use serde::{Deserialize, Serialize};

use crate::cli::Cli;

/// Settings persisted in the RON file; command-line flags override them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    pub genres: Vec<String>,
    pub credentials_path: PathBuf,
    pub page_size: u32,
    pub item_delay_ms: u64,
    pub max_retries: u32,
    pub backoff_base_ms: u64,
    /// Longest single retry wait, also bounding a server `Retry-After`.
    pub max_backoff_ms: u64,
    pub max_offset: Option<u32>,
    pub api_base_url: String,
    pub token_url: String,
    pub export_dir: Option<PathBuf>,
}

impl Default for AppSettings {
    fn default() -> Self {
        let pipeline = PipelineConfig::default();
        let catalog = CatalogSettings::default();
        Self {
            genres: Vec::new(),
            credentials_path: PathBuf::from("credentials.json"),
            page_size: pipeline.page_size,
            item_delay_ms: duration_ms(pipeline.item_delay),
            max_retries: pipeline.max_retries,
            backoff_base_ms: duration_ms(pipeline.backoff_base),
            max_backoff_ms: duration_ms(pipeline.max_backoff),
            max_offset: pipeline.max_offset,
            api_base_url: catalog.api_base_url,
            token_url: catalog.token_url,
            export_dir: None,
        }
    }
}

impl AppSettings {
    pub fn apply_cli(&mut self, cli: &Cli) {
        if !cli.genres.is_empty() {
            self.genres = cli.genres.clone();
        }
        if let Some(path) = &cli.credentials {
            self.credentials_path = path.clone();
        }
        if let Some(page_size) = cli.page_size {
            self.page_size = page_size;
        }
        if let Some(delay) = cli.delay_ms {
            self.item_delay_ms = delay;
        }
        if let Some(retries) = cli.max_retries {
            self.max_retries = retries;
        }
        if let Some(url) = &cli.api_base_url {
            self.api_base_url = url.clone();
        }
        if let Some(url) = &cli.token_url {
            self.token_url = url.clone();
        }
        if let Some(dir) = &cli.export_dir {
            self.export_dir = Some(dir.clone());
        }
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            page_size: self.page_size,
            item_delay: Duration::from_millis(self.item_delay_ms),
            max_retries: self.max_retries,
            backoff_base: Duration::from_millis(self.backoff_base_ms),
            max_backoff: Duration::from_millis(self.max_backoff_ms),
            max_offset: self.max_offset,
            ..PipelineConfig::default()
        }
    }

    pub fn catalog_settings(&self) -> CatalogSettings {
        CatalogSettings {
            api_base_url: self.api_base_url.clone(),
            token_url: self.token_url.clone(),
            ..CatalogSettings::default()
        }
    }
}

/// Reads settings from `path`; a missing file yields defaults.
pub fn load(path: &Path) -> anyhow::Result<AppSettings> {
    let content = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            finder_info!("No settings file at {:?}, using defaults", path);
            return Ok(AppSettings::default());
        }
        Err(err) => {
            return Err(err).with_context(|| format!("failed to read settings {:?}", path));
        }
    };

    let settings = ron::from_str(&content)
        .with_context(|| format!("failed to parse settings {:?}", path))?;
    finder_info!("Loaded settings from {:?}", path);
    Ok(settings)
}

pub fn save(path: &Path, settings: &AppSettings) -> anyhow::Result<PathBuf> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let filename = path
        .file_name()
        .and_then(|name| name.to_str())
        .with_context(|| format!("settings path {:?} has no file name", path))?;

    let pretty = ron::ser::PrettyConfig::new();
    let content =
        ron::ser::to_string_pretty(settings, pretty).context("failed to serialize settings")?;

    let written = AtomicFileWriter::new(dir).write(filename, &content)?;
    finder_info!("Saved settings to {:?}", written);
    Ok(written)
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
