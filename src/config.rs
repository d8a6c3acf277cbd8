//! The config module reads the TOML configuration file. Every key is consumed explicitly so that
//! leftovers can be reported as unrecognized, and every value is validated up front so the rest of
//! the crate can trust what it is handed.
use directories::ProjectDirs;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use toml::{Table, Value};
use tracing::{debug, warn};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found ({0})")]
    NotFound(PathBuf),
    #[error("Failed to decode configuration file: {0}")]
    Decode(String),
    #[error("Missing key {0} in configuration file")]
    MissingKey(String),
    #[error("Invalid value for {key} in configuration file: {message}")]
    InvalidValue { key: String, message: String },
}

type ConfigResult<T> = std::result::Result<T, ConfigError>;

pub const DEFAULT_CATALOG_URL: &str = "https://musicbrainz.org/ws/2";

/// Which name of a credited artist is written to the artist tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ArtistNameSource {
    /// The name as printed on the release (the credit's display name).
    #[default]
    Credited,
    /// The artist's canonical catalog name.
    Artist,
}

/// How an artist-credit list is flattened into one tag value. With no delimiter, each credit's own
/// join phrase is used.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ArtistCreditPolicy {
    pub names: ArtistNameSource,
    pub delimiter: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogConfig {
    pub base_url: String,
    pub contact: Option<String>,
    pub rate_limit: Duration,
    pub timeout: Duration,
    pub release_ttl: Duration,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_CATALOG_URL.to_string(),
            contact: None,
            rate_limit: Duration::from_millis(1000),
            timeout: Duration::from_secs(30),
            release_ttl: Duration::from_secs(7 * 24 * 60 * 60),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InventoryConfig {
    pub url: String,
    pub api_key: String,
    pub cookie: Option<String>,
    pub timeout: Duration,
    pub ttl: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaIndexConfig {
    pub url: String,
    pub token: String,
    pub timeout: Duration,
    pub ttl: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolsConfig {
    pub metaflac: String,
    pub ffmpeg: String,
    pub ffprobe: String,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            metaflac: "metaflac".to_string(),
            ffmpeg: "ffmpeg".to_string(),
            ffprobe: "ffprobe".to_string(),
        }
    }
}

/// Recognized audio extensions (lower-case, no dot) and whether files with them are processed.
pub fn default_extensions() -> BTreeMap<String, bool> {
    [("flac", true), ("mp3", true), ("m4a", false), ("ogg", false), ("wav", false)]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub libraries: Vec<PathBuf>,
    pub cache_dir: PathBuf,
    pub log_level: String,
    pub process_on_startup: bool,
    pub catalog: CatalogConfig,
    pub inventory: Option<InventoryConfig>,
    pub media_index: Option<MediaIndexConfig>,
    pub artist_credit: ArtistCreditPolicy,
    pub tools: ToolsConfig,
    pub extensions: BTreeMap<String, bool>,
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("", "", "autotag")
}

pub fn default_config_path() -> Option<PathBuf> {
    project_dirs().map(|d| d.config_dir().join("config.toml"))
}

impl Config {
    pub fn parse(config_path_override: Option<&Path>) -> ConfigResult<Config> {
        let cfgpath = match config_path_override {
            Some(p) => p.to_path_buf(),
            None => default_config_path().ok_or_else(|| ConfigError::NotFound(PathBuf::from("config.toml")))?,
        };
        debug!(path = %cfgpath.display(), "reading configuration");
        let cfgtext = fs::read_to_string(&cfgpath).map_err(|_| ConfigError::NotFound(cfgpath.clone()))?;
        Self::from_toml_str(&cfgtext)
    }

    pub fn from_toml_str(cfgtext: &str) -> ConfigResult<Config> {
        let table: Table = toml::from_str(cfgtext).map_err(|e| ConfigError::Decode(e.to_string()))?;
        let mut data = Section::root(table);

        let libraries = data.take_path_list("libraries")?.ok_or_else(|| ConfigError::MissingKey("libraries".to_string()))?;
        if libraries.is_empty() {
            return Err(data.invalid("libraries", "must contain at least one library root"));
        }

        let cache_dir = match data.take_path("cache_dir")? {
            Some(p) => p,
            None => project_dirs().map(|d| d.cache_dir().to_path_buf()).ok_or_else(|| ConfigError::MissingKey("cache_dir".to_string()))?,
        };

        let log_level = data.take_str("log_level")?.unwrap_or_else(|| "info".to_string());
        let process_on_startup = data.take_bool("process_on_startup")?.unwrap_or(false);

        let mut catalog = CatalogConfig::default();
        if let Some(mut sec) = data.take_section("catalog")? {
            if let Some(url) = sec.take_str("base_url")? {
                catalog.base_url = url.trim_end_matches('/').to_string();
            }
            catalog.contact = sec.take_str("contact")?;
            if let Some(ms) = sec.take_uint("rate_limit_ms")? {
                catalog.rate_limit = Duration::from_millis(ms);
            }
            if let Some(s) = sec.take_positive("timeout_secs")? {
                catalog.timeout = Duration::from_secs(s);
            }
            if let Some(s) = sec.take_positive("release_ttl_secs")? {
                catalog.release_ttl = Duration::from_secs(s);
            }
            sec.warn_unrecognized();
        }

        let inventory = match data.take_section("inventory")? {
            Some(mut sec) => {
                let url = sec.require_str("url")?.trim_end_matches('/').to_string();
                let api_key = sec.require_str("api_key")?;
                let cookie = sec.take_str("cookie")?;
                let timeout = Duration::from_secs(sec.take_positive("timeout_secs")?.unwrap_or(15));
                let ttl = Duration::from_secs(sec.take_positive("ttl_secs")?.unwrap_or(60 * 60));
                sec.warn_unrecognized();
                Some(InventoryConfig { url, api_key, cookie, timeout, ttl })
            }
            None => None,
        };

        let media_index = match data.take_section("media_index")? {
            Some(mut sec) => {
                let url = sec.require_str("url")?.trim_end_matches('/').to_string();
                let token = sec.require_str("token")?;
                let timeout = Duration::from_secs(sec.take_positive("timeout_secs")?.unwrap_or(10));
                let ttl = Duration::from_secs(sec.take_positive("ttl_secs")?.unwrap_or(60 * 60));
                sec.warn_unrecognized();
                Some(MediaIndexConfig { url, token, timeout, ttl })
            }
            None => None,
        };

        let mut artist_credit = ArtistCreditPolicy::default();
        if let Some(mut sec) = data.take_section("artist_credit")? {
            if let Some(names) = sec.take_str("names")? {
                artist_credit.names = match names.as_str() {
                    "credited" => ArtistNameSource::Credited,
                    "artist" => ArtistNameSource::Artist,
                    other => return Err(sec.invalid("names", &format!("must be one of credited, artist; got {other}"))),
                };
            }
            artist_credit.delimiter = sec.take_str("delimiter")?;
            sec.warn_unrecognized();
        }

        let mut tools = ToolsConfig::default();
        if let Some(mut sec) = data.take_section("tools")? {
            if let Some(v) = sec.take_str("metaflac")? {
                tools.metaflac = v;
            }
            if let Some(v) = sec.take_str("ffmpeg")? {
                tools.ffmpeg = v;
            }
            if let Some(v) = sec.take_str("ffprobe")? {
                tools.ffprobe = v;
            }
            sec.warn_unrecognized();
        }

        let mut extensions = default_extensions();
        if let Some(mut sec) = data.take_section("extensions")? {
            let keys: Vec<String> = sec.table.keys().cloned().collect();
            for k in keys {
                let enabled = sec.take_bool(&k)?.unwrap_or(false);
                extensions.insert(k.trim_start_matches('.').to_lowercase(), enabled);
            }
        }

        data.warn_unrecognized();

        Ok(Config {
            libraries,
            cache_dir,
            log_level,
            process_on_startup,
            catalog,
            inventory,
            media_index,
            artist_credit,
            tools,
            extensions,
        })
    }

    pub fn cache_file(&self, name: &str) -> PathBuf {
        self.cache_dir.join(name)
    }
}

/// A TOML table being consumed key by key. `prefix` is the dotted path used in error messages.
struct Section {
    prefix: String,
    table: Table,
}

impl Section {
    fn root(table: Table) -> Self {
        Section { prefix: String::new(), table }
    }

    fn key(&self, k: &str) -> String {
        if self.prefix.is_empty() {
            k.to_string()
        } else {
            format!("{}.{}", self.prefix, k)
        }
    }

    fn invalid(&self, k: &str, message: &str) -> ConfigError {
        ConfigError::InvalidValue { key: self.key(k), message: message.to_string() }
    }

    fn take_str(&mut self, k: &str) -> ConfigResult<Option<String>> {
        match self.table.remove(k) {
            None => Ok(None),
            Some(Value::String(s)) => Ok(Some(s)),
            Some(other) => Err(self.invalid(k, &format!("must be a string: got {}", other.type_str()))),
        }
    }

    fn require_str(&mut self, k: &str) -> ConfigResult<String> {
        match self.take_str(k)? {
            Some(s) if !s.trim().is_empty() => Ok(s),
            Some(_) => Err(self.invalid(k, "must not be empty")),
            None => Err(ConfigError::MissingKey(self.key(k))),
        }
    }

    fn take_bool(&mut self, k: &str) -> ConfigResult<Option<bool>> {
        match self.table.remove(k) {
            None => Ok(None),
            Some(Value::Boolean(b)) => Ok(Some(b)),
            Some(other) => Err(self.invalid(k, &format!("must be a bool: got {}", other.type_str()))),
        }
    }

    fn take_uint(&mut self, k: &str) -> ConfigResult<Option<u64>> {
        match self.table.remove(k) {
            None => Ok(None),
            Some(Value::Integer(i)) if i >= 0 => Ok(Some(i as u64)),
            Some(Value::Integer(i)) => Err(self.invalid(k, &format!("must be a non-negative int: got {i}"))),
            Some(other) => Err(self.invalid(k, &format!("must be an int: got {}", other.type_str()))),
        }
    }

    fn take_positive(&mut self, k: &str) -> ConfigResult<Option<u64>> {
        match self.take_uint(k)? {
            Some(0) => Err(self.invalid(k, "must be greater than zero")),
            v => Ok(v),
        }
    }

    fn take_path(&mut self, k: &str) -> ConfigResult<Option<PathBuf>> {
        Ok(self.take_str(k)?.map(|s| expand_path(&s)))
    }

    fn take_path_list(&mut self, k: &str) -> ConfigResult<Option<Vec<PathBuf>>> {
        match self.table.remove(k) {
            None => Ok(None),
            Some(Value::Array(items)) => {
                let mut paths = Vec::with_capacity(items.len());
                for (i, item) in items.into_iter().enumerate() {
                    match item {
                        Value::String(s) => paths.push(expand_path(&s)),
                        other => return Err(self.invalid(k, &format!("each library must be a string: got {} in position {i}", other.type_str()))),
                    }
                }
                Ok(Some(paths))
            }
            Some(other) => Err(self.invalid(k, &format!("must be a list of strings: got {}", other.type_str()))),
        }
    }

    fn take_section(&mut self, k: &str) -> ConfigResult<Option<Section>> {
        match self.table.remove(k) {
            None => Ok(None),
            Some(Value::Table(t)) => Ok(Some(Section { prefix: self.key(k), table: t })),
            Some(other) => Err(self.invalid(k, &format!("must be a table: got {}", other.type_str()))),
        }
    }

    fn warn_unrecognized(self) {
        for k in self.table.keys() {
            warn!("Unrecognized config key {} ignored", self.key(k));
        }
    }
}

fn expand_path(s: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(s).into_owned())
}
