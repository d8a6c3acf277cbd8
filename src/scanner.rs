//! The scanner module walks a library root and runs every enabled audio file through the track
//! processor, one file at a time.
use crate::audiotags::extension_of;
use crate::config::Config;
use crate::error::Result;
use crate::mediaindex::RefreshSet;
use crate::processor::TrackProcessor;
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ScanSummary {
    pub files_seen: usize,
    pub unchanged_files: usize,
    pub tags_written: usize,
    pub error_files: usize,
}

impl ScanSummary {
    fn add(&mut self, other: ScanSummary) {
        self.files_seen += other.files_seen;
        self.unchanged_files += other.unchanged_files;
        self.tags_written += other.tags_written;
        self.error_files += other.error_files;
    }
}

pub struct FolderScanner {
    processor: TrackProcessor,
    extensions: BTreeMap<String, bool>,
}

impl FolderScanner {
    pub fn new(processor: TrackProcessor, extensions: BTreeMap<String, bool>) -> Self {
        Self { processor, extensions }
    }

    pub fn from_config(c: &Config) -> Result<Self> {
        Ok(Self::new(TrackProcessor::from_config(c)?, c.extensions.clone()))
    }

    pub fn processor(&self) -> &TrackProcessor {
        &self.processor
    }

    /// Whether files with this path's extension are processed. Recognized but disabled extensions
    /// and unknown ones both answer false.
    pub fn is_enabled(&self, p: &Path) -> bool {
        extension_of(p).and_then(|ext| self.extensions.get(&ext)).copied().unwrap_or(false)
    }

    /// Process every enabled file under `root`. A failing file is counted and logged; a directory
    /// that cannot be read aborts the scan. Symlinks are not followed into directories, but a linked
    /// file with an enabled extension is processed, and a dangling one counts as a failed file.
    pub fn scan(&self, root: &Path, refresh: &mut RefreshSet) -> Result<ScanSummary> {
        let mut summary = ScanSummary::default();
        for entry in walkdir::WalkDir::new(root) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) if e.depth() > 0 && !e.path().is_some_and(Path::is_dir) => {
                    let p = e.path().map(Path::to_path_buf).unwrap_or_default();
                    if self.is_enabled(&p) {
                        warn!(path = %p.display(), "failed to read file entry: {e}");
                        summary.files_seen += 1;
                        summary.error_files += 1;
                    }
                    continue;
                }
                Err(e) => return Err(io::Error::from(e).into()),
            };
            let p = entry.path();
            let is_file = if entry.path_is_symlink() { fs::metadata(p).map(|m| m.is_file()).unwrap_or(true) } else { entry.file_type().is_file() };
            if !is_file {
                continue;
            }
            if !self.is_enabled(p) {
                debug!(path = %p.display(), "skipping file with unsupported extension");
                continue;
            }
            summary.files_seen += 1;
            match self.processor.process(p, root, refresh) {
                Ok(outcome) if outcome.unchanged => summary.unchanged_files += 1,
                Ok(outcome) => summary.tags_written += outcome.tags_written,
                Err(e) => {
                    warn!(path = %p.display(), "failed to process file: {e}");
                    summary.error_files += 1;
                }
            }
        }
        info!(
            root = %root.display(),
            files_seen = summary.files_seen,
            unchanged_files = summary.unchanged_files,
            tags_written = summary.tags_written,
            error_files = summary.error_files,
            "finished scanning library"
        );
        Ok(summary)
    }

    /// Scan each root in turn, sharing one refresh set, and then run the media-index refresh pass
    /// over it when a media index is configured.
    pub fn scan_libraries(&self, roots: &[PathBuf]) -> Result<(ScanSummary, RefreshSet)> {
        let mut total = ScanSummary::default();
        let mut refresh = RefreshSet::new();
        for root in roots {
            total.add(self.scan(root, &mut refresh)?);
        }
        if let Some(notifier) = self.processor.notifier() {
            if !refresh.is_empty() {
                let report = notifier.refresh_albums(&refresh);
                info!(refreshed = report.refreshed.len(), failed = report.failed.len(), "media index refresh pass complete");
            }
        }
        Ok((total, refresh))
    }

    /// Scan the configured libraries if the config asks for processing at startup.
    pub fn scan_on_startup(&self, c: &Config) -> Result<Option<(ScanSummary, RefreshSet)>> {
        if !c.process_on_startup {
            debug!("startup processing disabled");
            return Ok(None);
        }
        self.scan_libraries(&c.libraries).map(Some)
    }
}
