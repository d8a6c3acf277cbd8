//! The inventory module recovers catalog identifiers for files that carry none, by matching the
//! file's place in the library tree against what the Lidarr inventory service knows.
//!
//! Local and remote absolute paths rarely agree (different mounts, containers, drive letters), so
//! matching only ever looks at trailing path segments, compared in canonical form.
use crate::cache::TtlCache;
use crate::catalog::user_agent;
use crate::common::{canon, normalize_tag_value};
use crate::config::Config;
use crate::error::{AutotagError, AutotagExpectedError, ResolutionStep, Result};
use crate::filetags::ReleaseIdentifiers;
use crate::http::{parse_url, HttpClient, ReqwestHttpClient};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

pub const ARTIST_CACHE_FILE: &str = "inventory_artists.json";
pub const ALBUM_CACHE_FILE: &str = "inventory_albums.json";
pub const TRACK_CACHE_FILE: &str = "inventory_tracks.json";

/// Where a file sits relative to a library root: `artist/album/file` or
/// `artist/album/medium/file`. Every segment is trimmed and NFC-normalized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathIdentity {
    pub artist: String,
    pub album: String,
    pub medium: Option<String>,
    pub file: String,
}

/// Resolve `.` and `..` without touching the filesystem.
fn lexical_clean(p: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for c in p.components() {
        match c {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

impl PathIdentity {
    pub fn derive(library_root: &Path, file: &Path) -> Result<PathIdentity> {
        let fail = |reason: String| AutotagError::resolution(ResolutionStep::PathIdentity, reason);

        let root = lexical_clean(library_root);
        let full = lexical_clean(file);
        let rel = full
            .strip_prefix(&root)
            .map_err(|_| fail(format!("{} is outside library root {}", file.display(), library_root.display())))?;

        let mut parts = Vec::new();
        for c in rel.components() {
            match c {
                Component::Normal(s) => parts.push(normalize_tag_value(&s.to_string_lossy())),
                _ => return Err(fail(format!("{} is outside library root {}", file.display(), library_root.display()))),
            }
        }
        if parts.is_empty() {
            return Err(fail(format!("{} is the library root itself", file.display())));
        }
        if parts.len() < 3 {
            return Err(fail(format!("{} is not nested as artist/album/file under {}", file.display(), library_root.display())));
        }
        let file_name = &parts[parts.len() - 1];
        if Path::new(file_name).extension().map_or(true, |e| e.is_empty()) {
            return Err(fail(format!("{file_name} has no file extension")));
        }

        Ok(PathIdentity {
            artist: parts[0].clone(),
            album: parts[1].clone(),
            medium: if parts.len() >= 4 { Some(parts[2].clone()) } else { None },
            file: file_name.clone(),
        })
    }
}

/// Split a path as stored by a remote service. Both separators are accepted since the service may
/// run on a different OS.
pub fn stored_path_segments(stored: &str) -> Vec<&str> {
    stored.split(['/', '\\']).filter(|s| !s.trim().is_empty()).collect()
}

/// Whether the last segment of a remote artist path names the local artist folder.
pub fn artist_folder_matches(stored_path: &str, folder: &str) -> bool {
    stored_path_segments(stored_path).last().map_or(false, |last| canon(last) == canon(folder))
}

/// Whether a remote track-file path points at the local file, judged by its last two segments
/// (album folder and basename). For `artist/album/medium/file` layouts the remote parent may be the
/// medium folder, in which case the segment above it must be the album.
pub fn track_file_matches(identity: &PathIdentity, stored_path: &str) -> bool {
    let segs = stored_path_segments(stored_path);
    if segs.len() < 2 {
        return false;
    }
    let n = segs.len();
    if canon(segs[n - 1]) != canon(&identity.file) {
        return false;
    }
    let parent = canon(segs[n - 2]);
    if parent == canon(&identity.album) {
        return true;
    }
    match &identity.medium {
        Some(medium) => n >= 3 && parent == canon(medium) && canon(segs[n - 3]) == canon(&identity.album),
        None => false,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryArtist {
    pub id: i64,
    #[serde(default)]
    pub artist_name: String,
    #[serde(default)]
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryTrackFile {
    pub id: i64,
    #[serde(default)]
    pub path: String,
    pub album_id: i64,
    #[serde(default)]
    pub artist_id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryTrack {
    pub id: i64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub foreign_track_id: String,
    #[serde(default)]
    pub track_file_id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryRelease {
    pub id: i64,
    #[serde(default)]
    pub monitored: bool,
    #[serde(default)]
    pub foreign_release_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryAlbum {
    pub id: i64,
    #[serde(default)]
    pub artist_id: i64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub releases: Vec<InventoryRelease>,
}

impl InventoryAlbum {
    pub fn monitored_release(&self) -> Option<&InventoryRelease> {
        self.releases.iter().find(|r| r.monitored && !r.foreign_release_id.trim().is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryStatus {
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub app_name: String,
}

/// HTTP access to the inventory service's v1 API.
pub struct InventoryClient {
    http: Arc<dyn HttpClient>,
    base_url: String,
    api_key: String,
    cookie: Option<String>,
    user_agent: String,
}

impl InventoryClient {
    pub fn new(http: Arc<dyn HttpClient>, base_url: &str, api_key: &str, cookie: Option<String>) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            cookie,
            user_agent: user_agent(None),
        }
    }

    fn get_json<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> Result<T> {
        let mut url = parse_url(&format!("{}/api/v1{}", self.base_url, path))?;
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query.iter().map(|(k, v)| (*k, v.as_str())));
        }
        let mut headers = vec![("X-Api-Key", self.api_key.as_str()), ("Accept", "application/json"), ("User-Agent", self.user_agent.as_str())];
        if let Some(cookie) = &self.cookie {
            headers.push(("Cookie", cookie.as_str()));
        }
        debug!(path, ?query, "inventory request");
        let resp = self.http.get(&url, &headers)?;
        if resp.status != 200 {
            let body: String = resp.body.trim().chars().take(200).collect();
            return Err(AutotagExpectedError::Http {
                url: format!("inventory {path}"),
                reason: format!("{}: {body}", resp.status_text()),
            }
            .into());
        }
        Ok(serde_json::from_str(&resp.body)?)
    }

    pub fn artists(&self) -> Result<Vec<InventoryArtist>> {
        self.get_json("/artist", &[])
    }

    pub fn track_files(&self, artist_id: i64) -> Result<Vec<InventoryTrackFile>> {
        self.get_json("/trackfile", &[("artistId", artist_id.to_string())])
    }

    pub fn tracks(&self, artist_id: i64, album_id: i64) -> Result<Vec<InventoryTrack>> {
        self.get_json("/track", &[("artistId", artist_id.to_string()), ("albumId", album_id.to_string())])
    }

    pub fn albums(&self, artist_id: i64, album_id: i64) -> Result<Vec<InventoryAlbum>> {
        self.get_json(
            "/album",
            &[
                ("artistId", artist_id.to_string()),
                ("albumIds", album_id.to_string()),
                ("includeAllArtistAlbums", "true".to_string()),
            ],
        )
    }

    pub fn health_check(&self) -> Result<InventoryStatus> {
        self.get_json("/system/status", &[])
    }
}

/// Fallback identifier resolution through the inventory service, with per-kind caches.
pub struct InventoryResolver {
    client: InventoryClient,
    artists: TtlCache<InventoryArtist>,
    albums: TtlCache<InventoryAlbum>,
    tracks: TtlCache<Vec<InventoryTrack>>,
}

impl InventoryResolver {
    pub fn new(client: InventoryClient, artists: TtlCache<InventoryArtist>, albums: TtlCache<InventoryAlbum>, tracks: TtlCache<Vec<InventoryTrack>>) -> Self {
        Self { client, artists, albums, tracks }
    }

    /// `None` when the configuration has no inventory section.
    pub fn from_config(c: &Config) -> Result<Option<Self>> {
        let Some(inv) = &c.inventory else {
            return Ok(None);
        };
        let http = Arc::new(ReqwestHttpClient::new(inv.timeout)?);
        let client = InventoryClient::new(http, &inv.url, &inv.api_key, inv.cookie.clone());
        Ok(Some(Self::new(
            client,
            TtlCache::new(c.cache_file(ARTIST_CACHE_FILE), inv.ttl),
            TtlCache::new(c.cache_file(ALBUM_CACHE_FILE), inv.ttl),
            TtlCache::new(c.cache_file(TRACK_CACHE_FILE), inv.ttl),
        )))
    }

    pub fn client(&self) -> &InventoryClient {
        &self.client
    }

    pub fn resolve(&self, file: &Path, library_root: &Path) -> Result<ReleaseIdentifiers> {
        let identity = PathIdentity::derive(library_root, file)?;
        debug!(path = %file.display(), ?identity, "resolving identifiers through inventory");

        let artist = self.resolve_artist(&identity.artist)?;
        let track_file = self.resolve_track_file(&identity, &artist)?;
        let track_id = self.resolve_track_id(&artist, &track_file)?;
        let release_id = self.resolve_release_id(&artist, &track_file)?;

        info!(path = %file.display(), release_id, track_id, "resolved identifiers through inventory");
        Ok(ReleaseIdentifiers { release_id, track_id })
    }

    fn resolve_artist(&self, folder: &str) -> Result<InventoryArtist> {
        if let Some(artist) = self.artists.get_fresh(folder)? {
            return Ok(artist);
        }
        let artists = self.client.artists().map_err(|e| AutotagError::resolution(ResolutionStep::Artist, e.to_string()))?;
        let artist = artists
            .into_iter()
            .find(|a| artist_folder_matches(&a.path, folder))
            .ok_or_else(|| AutotagError::resolution(ResolutionStep::Artist, format!("no inventory artist stored in a folder named {folder}")))?;
        self.artists.put(folder, artist.clone())?;
        Ok(artist)
    }

    fn resolve_track_file(&self, identity: &PathIdentity, artist: &InventoryArtist) -> Result<InventoryTrackFile> {
        let files = self.client.track_files(artist.id).map_err(|e| AutotagError::resolution(ResolutionStep::TrackFile, e.to_string()))?;
        files.into_iter().find(|f| track_file_matches(identity, &f.path)).ok_or_else(|| {
            AutotagError::resolution(
                ResolutionStep::TrackFile,
                format!("no track file of {} matches {}/{}", artist.artist_name, identity.album, identity.file),
            )
        })
    }

    fn resolve_track_id(&self, artist: &InventoryArtist, track_file: &InventoryTrackFile) -> Result<String> {
        let key = track_file.album_id.to_string();
        let tracks = match self.tracks.get_fresh(&key)? {
            Some(t) => t,
            None => {
                let t = self
                    .client
                    .tracks(artist.id, track_file.album_id)
                    .map_err(|e| AutotagError::resolution(ResolutionStep::Track, e.to_string()))?;
                self.tracks.put(&key, t.clone())?;
                t
            }
        };
        tracks
            .iter()
            .find(|t| t.track_file_id == track_file.id && !t.foreign_track_id.trim().is_empty())
            .map(|t| t.foreign_track_id.trim().to_string())
            .ok_or_else(|| AutotagError::resolution(ResolutionStep::Track, format!("no track references track file {}", track_file.id)))
    }

    fn resolve_release_id(&self, artist: &InventoryArtist, track_file: &InventoryTrackFile) -> Result<String> {
        let key = track_file.album_id.to_string();
        let album = match self.albums.get_fresh(&key)? {
            Some(a) => a,
            None => {
                let albums = self
                    .client
                    .albums(artist.id, track_file.album_id)
                    .map_err(|e| AutotagError::resolution(ResolutionStep::Release, e.to_string()))?;
                let album = albums
                    .into_iter()
                    .find(|a| a.id == track_file.album_id)
                    .ok_or_else(|| AutotagError::resolution(ResolutionStep::Release, format!("inventory has no album {}", track_file.album_id)))?;
                self.albums.put(&key, album.clone())?;
                album
            }
        };
        album
            .monitored_release()
            .map(|r| r.foreign_release_id.trim().to_string())
            .ok_or_else(|| AutotagError::resolution(ResolutionStep::Release, format!("album {} has no monitored release", album.id)))
    }
}
