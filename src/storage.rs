//
// storage.rs
// Dicom-Worklist-rs
//
// Directory-backed store for encoded worklist and instance files, with path sanitization and housekeeping.
//
// Thales Matheus Mendonça Santos - November 2025

use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::config::StorageConfig;

#[derive(Clone)]
pub struct FileStore {
    root: PathBuf,
    prefix: String,
    suffix: String,
}

/// Result of a successful save.
#[derive(Debug, Clone, Serialize)]
pub struct StoredFile {
    pub filename: String,
    pub path: PathBuf,
    pub size: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct FileInfo {
    pub filename: String,
    pub size: u64,
    pub created: Option<DateTime<Utc>>,
    pub modified: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreStats {
    pub total_files: usize,
    pub total_size: u64,
    pub average_size: u64,
    pub oldest_file: Option<String>,
    pub newest_file: Option<String>,
}

impl FileStore {
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)
            .with_context(|| format!("Failed to create storage directory {}", root.display()))?;
        Ok(Self {
            root,
            prefix: String::new(),
            suffix: String::new(),
        })
    }

    pub fn with_naming(mut self, prefix: &str, suffix: &str) -> Self {
        self.prefix = sanitize_filename(prefix);
        self.suffix = sanitize_filename(suffix);
        self
    }

    pub fn worklists(config: &StorageConfig) -> Result<Self> {
        Ok(Self::new(&config.worklist_dir)?.with_naming(&config.filename_prefix, &config.filename_suffix))
    }

    pub fn instances(config: &StorageConfig) -> Result<Self> {
        Ok(Self::new(&config.instance_dir)?.with_naming(&config.filename_prefix, &config.filename_suffix))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Persist `bytes` as `<prefix><accession>_<millis><suffix>.dcm`.
    ///
    /// The final name is reserved first, then the content is written under a hidden temporary name
    /// and renamed over it.
    pub fn save(&self, accession_number: &str, bytes: &[u8]) -> Result<StoredFile> {
        let stem = Some(sanitize_filename(accession_number))
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "dicom".to_string());
        let millis = Utc::now().timestamp_millis();

        let mut filename = format!("{}{}_{}{}.dcm", self.prefix, stem, millis, self.suffix);
        let mut counter = 1;
        // Claim the name atomically; parallel batch workers may share an accession and millisecond.
        let path = loop {
            let candidate = self.root.join(&filename);
            match OpenOptions::new().write(true).create_new(true).open(&candidate) {
                Ok(_) => break candidate,
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    filename = format!("{}{}_{}_{}{}.dcm", self.prefix, stem, millis, counter, self.suffix);
                    counter += 1;
                }
                Err(e) => return Err(e).context("Failed to reserve file name"),
            }
        };
        let temp = self.root.join(format!(".{filename}.tmp"));
        if let Err(e) = fs::write(&temp, bytes) {
            let _ = fs::remove_file(&path);
            return Err(e).context("Failed to write temporary file");
        }
        if let Err(e) = fs::rename(&temp, &path) {
            let _ = fs::remove_file(&temp);
            let _ = fs::remove_file(&path);
            return Err(e).context("Failed to move file into place");
        }

        info!(file = %filename, size = bytes.len(), "stored file");
        Ok(StoredFile {
            filename,
            path,
            size: bytes.len() as u64,
        })
    }

    pub fn resolve(&self, name: &str) -> Result<PathBuf> {
        let candidate = self.root.join(name);
        let canonical_root = self
            .root
            .canonicalize()
            .unwrap_or_else(|_| self.root.clone());
        let canonical = candidate
            .canonicalize()
            .context("Requested file not found")?;
        // Guard against path traversal by enforcing the canonical root prefix.
        if !canonical.starts_with(&canonical_root) {
            bail!("Attempt to access file outside storage root");
        }
        Ok(canonical)
    }

    /// Every completed `.dcm` file, newest first.
    pub fn list(&self) -> Result<Vec<FileInfo>> {
        let mut files = Vec::new();
        for entry in WalkDir::new(&self.root).min_depth(1).max_depth(1) {
            let entry = entry.context("Failed to read storage directory")?;
            let name = entry.file_name().to_string_lossy().to_string();
            if !entry.file_type().is_file() || name.starts_with('.') || !name.ends_with(".dcm") {
                continue;
            }
            let metadata = entry.metadata().context("Failed to read file metadata")?;
            // A zero-length file is a name reserved by an in-flight `save`.
            if metadata.len() == 0 {
                continue;
            }
            files.push(FileInfo {
                filename: name,
                size: metadata.len(),
                created: metadata.created().ok().map(DateTime::<Utc>::from),
                modified: DateTime::<Utc>::from(metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH)),
            });
        }
        files.sort_by(|a, b| b.modified.cmp(&a.modified).then_with(|| b.filename.cmp(&a.filename)));
        Ok(files)
    }

    pub fn delete(&self, name: &str) -> Result<()> {
        let path = self.resolve(name)?;
        fs::remove_file(&path).with_context(|| format!("Failed to delete {name}"))?;
        info!(file = name, "deleted file");
        Ok(())
    }

    /// Delete files last modified more than `days` days ago, returning their names.
    pub fn cleanup(&self, days: u32) -> Result<Vec<String>> {
        let cutoff = SystemTime::now()
            .checked_sub(Duration::from_secs(u64::from(days) * 24 * 60 * 60))
            .unwrap_or(SystemTime::UNIX_EPOCH);
        self.cleanup_before(DateTime::<Utc>::from(cutoff))
    }

    fn cleanup_before(&self, cutoff: DateTime<Utc>) -> Result<Vec<String>> {
        let mut deleted = Vec::new();
        for file in self.list()? {
            if file.modified >= cutoff {
                continue;
            }
            match fs::remove_file(self.root.join(&file.filename)) {
                Ok(()) => {
                    debug!(file = %file.filename, "removed expired file");
                    deleted.push(file.filename);
                }
                Err(e) => warn!(file = %file.filename, error = %e, "could not remove expired file"),
            }
        }
        info!(count = deleted.len(), "cleanup finished");
        Ok(deleted)
    }

    pub fn stats(&self) -> Result<StoreStats> {
        let files = self.list()?;
        let total_size: u64 = files.iter().map(|f| f.size).sum();
        Ok(StoreStats {
            total_files: files.len(),
            total_size,
            average_size: if files.is_empty() { 0 } else { total_size / files.len() as u64 },
            oldest_file: files.last().map(|f| f.filename.clone()),
            newest_file: files.first().map(|f| f.filename.clone()),
        })
    }
}

/// Replace anything but ASCII letters and digits with `_`.
fn sanitize_filename(input: &str) -> String {
    input
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}
