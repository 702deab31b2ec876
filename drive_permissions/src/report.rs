//! CSV reports and the end-to-end audit run.

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::info;

use crate::client::DriveClient;
use crate::enricher::{EnricherConfig, PermissionEnricher};
use crate::enumerator::{EnumeratorConfig, FileEnumerator};
use crate::error::{DriveError, Result};
use crate::models::FileRecord;
use crate::permissions::FileSummary;

pub const ALL_FILES_CSV: &str = "AllFiles.csv";
pub const PERMISSIONS_CSV: &str = "FilePermissions.csv";

#[derive(Debug, Clone)]
pub struct ReportOptions {
    pub output_dir: PathBuf,
    pub enumerator: EnumeratorConfig,
    pub enricher: EnricherConfig,
}

impl Default for ReportOptions {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("."),
            enumerator: EnumeratorConfig::default(),
            enricher: EnricherConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportOutcome {
    pub files_listed: usize,
    pub rows_written: usize,
    pub all_files_path: PathBuf,
    pub permissions_path: PathBuf,
}

/// Write the raw listing, one row per file.
///
/// Columns are every field returned for any file, in the order each was
/// first seen; a file lacking a field gets an empty cell.
pub fn write_all_files<P: AsRef<Path>>(path: P, files: &[FileRecord]) -> Result<()> {
    let mut columns: Vec<&str> = Vec::new();
    for file in files {
        for key in file.fields().keys() {
            if !columns.contains(&key.as_str()) {
                columns.push(key);
            }
        }
    }

    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(&columns)?;

    for file in files {
        let row = columns
            .iter()
            .map(|column| file.fields().get(*column).map(cell).unwrap_or_default());
        writer.write_record(row)?;
    }

    writer.flush()?;
    Ok(())
}

/// Strings are written as-is, everything else as compact JSON.
fn cell(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Write `FileType, FileName, SharedUsers` rows.
pub fn write_permissions<P: AsRef<Path>>(path: P, summaries: &[FileSummary]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    if summaries.is_empty() {
        writer.write_record(["FileType", "FileName", "SharedUsers"])?;
    }
    for summary in summaries {
        writer.serialize(summary)?;
    }
    writer.flush()?;
    Ok(())
}

/// List every file, write `AllFiles.csv`, then look up permissions and write
/// `FilePermissions.csv`.
///
/// The listing is on disk before enrichment starts, so it survives a failed
/// lookup; the permissions file is only written once every file succeeded.
pub async fn run(client: &DriveClient, options: &ReportOptions) -> Result<ReportOutcome> {
    fs::create_dir_all(&options.output_dir)?;

    let me = client.about_me().await?;
    let current_email = me.email_address.ok_or_else(|| {
        DriveError::AuthenticationError("the account has no email address".to_string())
    })?;
    info!(account = %current_email, "Authenticated");

    let files = FileEnumerator::new(client, options.enumerator)
        .retrieve_all()
        .await?;

    let all_files_path = options.output_dir.join(ALL_FILES_CSV);
    write_all_files(&all_files_path, &files)?;
    println!("All File CSV Created");

    let summaries = PermissionEnricher::new(client, current_email, options.enricher)
        .enrich(&files)
        .await?;

    let permissions_path = options.output_dir.join(PERMISSIONS_CSV);
    write_permissions(&permissions_path, &summaries)?;
    println!("File Permissions CSV Created");

    Ok(ReportOutcome {
        files_listed: files.len(),
        rows_written: summaries.len(),
        all_files_path,
        permissions_path,
    })
}
