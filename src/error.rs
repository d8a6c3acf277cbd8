use crate::config::ConfigError;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AutotagError {
    #[error("Autotag error: {0}")]
    Generic(String),
    #[error(transparent)]
    Expected(#[from] AutotagExpectedError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// The inventory lookup that failed during fallback identifier resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionStep {
    PathIdentity,
    Artist,
    TrackFile,
    Track,
    Release,
}

impl fmt::Display for ResolutionStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ResolutionStep::PathIdentity => "path identity",
            ResolutionStep::Artist => "artist",
            ResolutionStep::TrackFile => "track file",
            ResolutionStep::Track => "track",
            ResolutionStep::Release => "release",
        };
        f.write_str(s)
    }
}

#[derive(Error, Debug)]
pub enum AutotagExpectedError {
    #[error("{0}")]
    Generic(String),
    #[error("Unsupported file format: {path}")]
    UnsupportedFormat { path: PathBuf },
    #[error("Failed to read tags from {path}: {reason}")]
    TagRead { path: PathBuf, reason: String },
    #[error("No release/track identifiers available for {path}")]
    IdentifiersUnavailable { path: PathBuf },
    #[error("Inventory resolution failed at {step} step: {reason}")]
    Resolution { step: ResolutionStep, reason: String },
    #[error("Failed to fetch release {release_id}: {reason}")]
    CatalogFetch { release_id: String, reason: String },
    #[error("Track {track_id} not found in release {release_id}")]
    TrackNotFound { track_id: String, release_id: String },
    #[error("Failed to write tags to {path}: {reason}")]
    TagWrite { path: PathBuf, reason: String },
    #[error("Failed to resolve media index entry for album {album}: {reason}")]
    RefreshResolution { album: String, reason: String },
    #[error("Failed to load cache file {path}: {reason}")]
    CacheLoad { path: PathBuf, reason: String },
    #[error("Request to {url} failed: {reason}")]
    Http { url: String, reason: String },
}

pub type Result<T> = std::result::Result<T, AutotagError>;

impl AutotagError {
    pub fn resolution(step: ResolutionStep, reason: impl Into<String>) -> Self {
        AutotagExpectedError::Resolution { step, reason: reason.into() }.into()
    }
}
