use std::path::{Path, PathBuf};

use serde_json::json;

use crate::persist::{AtomicFileWriter, PersistError};
use crate::sink::format_text_line;
use crate::EnrichedRecord;

const TSV_HEADER: &str = "name\tfollowers\towner\tlink\towner_email\tdescription";

#[derive(Debug, Clone)]
pub struct ExportOptions {
    pub output_filename: String,
    pub manifest_filename: Option<String>,
    /// Written into the manifest as-is; callers supply their own clock.
    pub generated_utc: String,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            output_filename: "playlists.tsv".to_string(),
            manifest_filename: Some("manifest.json".to_string()),
            generated_utc: String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportSummary {
    pub record_count: usize,
    pub total_followers: u64,
    pub output_path: PathBuf,
    pub manifest_path: Option<PathBuf>,
}

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("persist error: {0}")]
    Persist(#[from] PersistError),
}

/// Writes the records as a TSV table plus an optional JSON manifest.
///
/// Records are written in the order given.
pub fn export_results(
    output_dir: &Path,
    records: &[EnrichedRecord],
    options: &ExportOptions,
) -> Result<ExportSummary, ExportError> {
    let mut buffer = String::from(TSV_HEADER);
    buffer.push('\n');
    for record in records {
        buffer.push_str(&format_text_line(record));
        buffer.push('\n');
    }
    let total_followers: u64 = records.iter().map(|r| r.follower_count).sum();

    let writer = AtomicFileWriter::new(output_dir.to_path_buf());
    let output_path = writer.write(&options.output_filename, &buffer)?;

    let manifest_path = match &options.manifest_filename {
        Some(name) => {
            let manifest = json!({
                "record_count": records.len(),
                "total_followers": total_followers,
                "generated_utc": options.generated_utc,
                "table": options.output_filename,
            });
            Some(writer.write(name, &manifest.to_string())?)
        }
        None => None,
    };

    Ok(ExportSummary {
        record_count: records.len(),
        total_followers,
        output_path,
        manifest_path,
    })
}
