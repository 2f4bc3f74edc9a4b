use petcare_flow::FinalReport;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::info;

#[derive(Error, Debug)]
pub enum ReportStoreError {
    #[error("invalid report name: {0}")]
    InvalidName(String),

    #[error("report not found: {0}")]
    NotFound(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Writes finished reports as pretty-printed JSON files into one directory.
#[derive(Debug, Clone)]
pub struct FileReportStore {
    dir: PathBuf,
}

impl FileReportStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Saves `report` as `triage_report_<YYYYmmdd_HHMMSS>.json` and returns the file name.
    /// A numeric suffix is added when that name is already taken.
    pub async fn save(&self, report: &FinalReport) -> Result<String, ReportStoreError> {
        fs::create_dir_all(&self.dir).await?;

        let stem = format!(
            "triage_report_{}",
            report.meta.generated_at.format("%Y%m%d_%H%M%S")
        );
        let body = serde_json::to_vec_pretty(report)?;

        let mut attempt = 0u32;
        loop {
            let name = match attempt {
                0 => format!("{stem}.json"),
                n => format!("{stem}_{n}.json"),
            };
            let opened = fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(self.dir.join(&name))
                .await;

            match opened {
                Ok(mut file) => {
                    file.write_all(&body).await?;
                    file.flush().await?;
                    info!(file = %name, dir = %self.dir.display(), "Report saved");
                    return Ok(name);
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => attempt += 1,
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Loads a report previously written by [`FileReportStore::save`].
    pub async fn load(&self, name: &str) -> Result<FinalReport, ReportStoreError> {
        validate_name(name)?;

        let bytes = match fs::read(self.dir.join(name)).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(ReportStoreError::NotFound(name.to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        Ok(serde_json::from_slice(&bytes)?)
    }
}

/// Only bare `*.json` file names are accepted, never paths.
fn validate_name(name: &str) -> Result<(), ReportStoreError> {
    let valid = name.ends_with(".json")
        && name.len() > ".json".len()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
        && !name.starts_with('.');
    if valid {
        Ok(())
    } else {
        Err(ReportStoreError::InvalidName(name.to_string()))
    }
}
