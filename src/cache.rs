//! The cache module implements the keyed, expiring, JSON-file-backed store used by every remote-data
//! consumer. Each cache kind is its own `TtlCache` instance with its own file and TTL.
//!
//! The backing file is read lazily on first access and rewritten in full on every `put`. There is no
//! cross-process locking: two processes sharing a file race and the last writer wins.
use crate::error::{AutotagExpectedError, Result};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry<T> {
    pub value: T,
    pub timestamp: DateTime<Utc>,
}

impl<T> CacheEntry<T> {
    pub fn is_fresh(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
        match now.signed_duration_since(self.timestamp).to_std() {
            Ok(age) => age < ttl,
            // Timestamps in the future have a negative age.
            Err(_) => true,
        }
    }
}

/// Result of a cache lookup that found an entry. Stale entries are still returned so callers can
/// decide whether a stale value beats no value.
#[derive(Debug, Clone, PartialEq)]
pub struct Lookup<T> {
    pub value: T,
    pub fresh: bool,
}

type Entries<T> = BTreeMap<String, CacheEntry<T>>;

pub struct TtlCache<T> {
    path: PathBuf,
    ttl: Duration,
    entries: Mutex<Option<Entries<T>>>,
}

impl<T: Clone + Serialize + DeserializeOwned> TtlCache<T> {
    pub fn new(path: impl Into<PathBuf>, ttl: Duration) -> Self {
        Self { path: path.into(), ttl, entries: Mutex::new(None) }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Discard the in-memory map and re-read the backing file.
    pub fn load(&self) -> Result<()> {
        let mut guard = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        *guard = Some(read_entries(&self.path)?);
        Ok(())
    }

    /// Write the full map to the backing file.
    pub fn save(&self) -> Result<()> {
        self.with_entries(|entries| write_entries(&self.path, entries))?
    }

    pub fn get(&self, key: &str) -> Result<Option<Lookup<T>>> {
        self.get_at(key, Utc::now())
    }

    pub fn get_at(&self, key: &str, now: DateTime<Utc>) -> Result<Option<Lookup<T>>> {
        let ttl = self.ttl;
        self.with_entries(|entries| {
            entries.get(key).map(|e| Lookup {
                value: e.value.clone(),
                fresh: e.is_fresh(ttl, now),
            })
        })
    }

    /// The cached value for `key`, only if it has not expired.
    pub fn get_fresh(&self, key: &str) -> Result<Option<T>> {
        Ok(self.get(key)?.filter(|l| l.fresh).map(|l| l.value))
    }

    pub fn put(&self, key: &str, value: T) -> Result<()> {
        self.put_at(key, value, Utc::now())
    }

    pub fn put_at(&self, key: &str, value: T, timestamp: DateTime<Utc>) -> Result<()> {
        self.with_entries(|entries| {
            entries.insert(key.to_string(), CacheEntry { value, timestamp });
            write_entries(&self.path, entries)
        })?
    }

    pub fn len(&self) -> Result<usize> {
        self.with_entries(|entries| entries.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    fn with_entries<R>(&self, f: impl FnOnce(&mut Entries<T>) -> R) -> Result<R> {
        let mut guard = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        if guard.is_none() {
            *guard = Some(read_entries(&self.path)?);
        }
        Ok(f(guard.get_or_insert_with(BTreeMap::new)))
    }
}

fn read_entries<T: DeserializeOwned>(path: &Path) -> Result<Entries<T>> {
    let contents = match fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            debug!(path = %path.display(), "cache file does not exist, starting empty");
            return Ok(BTreeMap::new());
        }
        Err(e) => {
            return Err(AutotagExpectedError::CacheLoad {
                path: path.to_path_buf(),
                reason: e.to_string(),
            }
            .into())
        }
    };
    if contents.trim().is_empty() {
        return Ok(BTreeMap::new());
    }
    let entries: Entries<T> = serde_json::from_str(&contents).map_err(|e| AutotagExpectedError::CacheLoad {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    debug!(path = %path.display(), entries = entries.len(), "loaded cache file");
    Ok(entries)
}

fn write_entries<T: Serialize>(path: &Path, entries: &Entries<T>) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(entries)?;
    fs::write(path, json)?;
    Ok(())
}
