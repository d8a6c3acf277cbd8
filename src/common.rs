//! The common module holds the small helpers every component leans on: string canonicalization for
//! cross-service name matching, tag-value normalization, and logging bootstrap.
use crate::error::{AutotagError, Result};
use directories::ProjectDirs;
use std::fs;
use std::sync::Mutex;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, EnvFilter};
use unicode_normalization::UnicodeNormalization;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub const APP_NAME: &str = "autotag-rs";

/// Separator used when fingerprinting multi-valued tags. Never present in real tag content.
pub const VALUE_SEPARATOR: &str = "\u{1f}";

/// Trim then NFC-normalize a tag value.
pub fn normalize_tag_value(s: &str) -> String {
    s.trim().nfc().collect()
}

/// Canonical form used to compare human-readable names across services: NFC, trimmed, lower-cased.
pub fn canon(s: &str) -> String {
    normalize_tag_value(s).to_lowercase()
}

/// Produce an order-insensitive fingerprint of a multi-valued tag. Values are normalized, empties
/// dropped, and duplicates removed case-insensitively before joining. Among spellings that differ only
/// by case the smallest one is kept, so input order never changes the result.
pub fn canonicalize_values(values: &[String]) -> String {
    let mut out: Vec<(String, String)> = values
        .iter()
        .map(|v| normalize_tag_value(v))
        .filter(|n| !n.is_empty())
        .map(|n| (n.to_lowercase(), n))
        .collect();
    out.sort();
    out.dedup_by(|a, b| a.0 == b.0);
    out.into_iter().map(|(_, n)| n).collect::<Vec<_>>().join(VALUE_SEPARATOR)
}

/// Where log lines go.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogOutput {
    Stderr,
    File,
}

static LOGGING_INITIALIZED: Mutex<bool> = Mutex::new(false);

/// Install the global tracing subscriber. `RUST_LOG` wins over `level` when set. For file output the
/// returned guard must be held for the process lifetime, or buffered lines are lost on exit.
pub fn initialize_logging(output: LogOutput, level: &str) -> Result<Option<WorkerGuard>> {
    let mut initialized = LOGGING_INITIALIZED.lock().unwrap_or_else(|e| e.into_inner());
    if *initialized {
        return Ok(None);
    }
    *initialized = true;
    drop(initialized);

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    match output {
        LogOutput::Stderr => {
            let subscriber = fmt::Subscriber::builder().with_env_filter(env_filter).with_writer(std::io::stderr).with_target(true).finish();
            tracing::subscriber::set_global_default(subscriber).map_err(|e| AutotagError::Generic(format!("Failed to install logger: {e}")))?;
            Ok(None)
        }
        LogOutput::File => {
            let proj_dirs = ProjectDirs::from("", "", "autotag").ok_or_else(|| AutotagError::Generic("Failed to get project directories".to_string()))?;
            let log_dir = if cfg!(target_os = "macos") {
                proj_dirs.cache_dir()
            } else {
                proj_dirs.state_dir().unwrap_or(proj_dirs.cache_dir())
            };
            fs::create_dir_all(log_dir)?;

            let file_appender = RollingFileAppender::builder()
                .rotation(Rotation::DAILY)
                .max_log_files(10)
                .filename_prefix("autotag")
                .filename_suffix("log")
                .build(log_dir)
                .map_err(|e| AutotagError::Generic(format!("Failed to open log file: {e}")))?;
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

            let subscriber = fmt::Subscriber::builder()
                .with_env_filter(env_filter)
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_target(true)
                .with_thread_ids(true)
                .with_line_number(true)
                .with_file(true)
                .finish();
            tracing::subscriber::set_global_default(subscriber).map_err(|e| AutotagError::Generic(format!("Failed to install logger: {e}")))?;
            Ok(Some(guard))
        }
    }
}
