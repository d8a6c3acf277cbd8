//! The mediaindex module keeps the Plex media index in step with retagged files. Albums whose files
//! changed are located in the index (their keys cached by album title) and gathered into a refresh
//! set; one consolidated refresh pass over that set runs after a scan.
use crate::cache::TtlCache;
use crate::catalog::user_agent;
use crate::common::canon;
use crate::config::Config;
use crate::error::{AutotagError, AutotagExpectedError, Result};
use crate::http::{parse_url, redact, HttpClient, HttpResponse, ReqwestHttpClient};
use reqwest::Url;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const ALBUM_KEY_CACHE_FILE: &str = "media_index_album_keys.json";

const TYPE_ARTIST: &str = "8";
const TYPE_ALBUM: &str = "9";
const TYPE_TRACK: &str = "10";

/// Album title to media-index key, accumulated over a scan.
pub type RefreshSet = BTreeMap<String, String>;

/// One `Directory` or `Track` element of a media container.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexEntry {
    pub key: String,
    pub rating_key: String,
    pub title: String,
    pub kind: String,
    pub parent_title: String,
    pub grandparent_title: String,
    pub parent_key: String,
    pub parent_rating_key: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MediaContainer {
    pub directories: Vec<IndexEntry>,
    pub tracks: Vec<IndexEntry>,
}

fn attr(n: roxmltree::Node<'_, '_>, name: &str) -> String {
    n.attribute(name).unwrap_or_default().to_string()
}

pub fn parse_media_container(xml: &str) -> std::result::Result<MediaContainer, roxmltree::Error> {
    let doc = roxmltree::Document::parse(xml)?;
    let mut out = MediaContainer::default();
    for n in doc.root_element().children().filter(|n| n.is_element()) {
        let entry = IndexEntry {
            key: attr(n, "key"),
            rating_key: attr(n, "ratingKey"),
            title: attr(n, "title"),
            kind: attr(n, "type"),
            parent_title: attr(n, "parentTitle"),
            grandparent_title: attr(n, "grandparentTitle"),
            parent_key: attr(n, "parentKey"),
            parent_rating_key: attr(n, "parentRatingKey"),
        };
        match n.tag_name().name() {
            "Directory" => out.directories.push(entry),
            "Track" => out.tracks.push(entry),
            _ => {}
        }
    }
    Ok(out)
}

/// Album keys from searches point at the album's children listing; refreshes want the album itself.
pub fn normalize_album_key(key: &str) -> String {
    key.trim().trim_end_matches('/').trim_end_matches("/children").to_string()
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexIdentity {
    pub machine_identifier: String,
    pub version: String,
    pub friendly_name: String,
}

pub struct MediaIndexClient {
    http: Arc<dyn HttpClient>,
    base_url: String,
    token: String,
    user_agent: String,
}

impl MediaIndexClient {
    pub fn new(http: Arc<dyn HttpClient>, base_url: &str, token: &str) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
            user_agent: user_agent(None),
        }
    }

    fn url(&self, path: &str, query: &[(&str, &str)]) -> Result<Url> {
        let mut url = parse_url(&format!("{}{}", self.base_url, path))?;
        url.query_pairs_mut().extend_pairs(query.iter().copied()).append_pair("X-Plex-Token", &self.token);
        Ok(url)
    }

    fn headers(&self) -> [(&str, &str); 2] {
        [("Accept", "application/xml"), ("User-Agent", self.user_agent.as_str())]
    }

    fn get_container(&self, path: &str, query: &[(&str, &str)]) -> Result<MediaContainer> {
        let url = self.url(path, query)?;
        let resp = self.http.get(&url, &self.headers())?;
        if resp.status != 200 {
            return Err(AutotagExpectedError::Http {
                url: redact(&url),
                reason: format!("media index returned {}", resp.status_text()),
            }
            .into());
        }
        parse_media_container(&resp.body).map_err(|e| {
            AutotagExpectedError::Http {
                url: redact(&url),
                reason: format!("unparseable media container: {e}"),
            }
            .into()
        })
    }

    /// Key of the first music library section.
    pub fn music_section_id(&self) -> Result<Option<String>> {
        let sections = self.get_container("/library/sections", &[])?;
        Ok(sections.directories.into_iter().find(|d| d.kind.eq_ignore_ascii_case("artist")).map(|d| d.key))
    }

    pub fn find_artist_key(&self, section: &str, artist: &str) -> Result<Option<String>> {
        let found = self.get_container(&format!("/library/sections/{section}/all"), &[("type", TYPE_ARTIST), ("title", artist)])?;
        Ok(found
            .directories
            .into_iter()
            .find(|d| d.kind.eq_ignore_ascii_case("artist") && canon(&d.title) == canon(artist))
            .map(|d| d.key))
    }

    pub fn find_album_key(&self, section: &str, album: &str, artist: &str) -> Result<Option<String>> {
        let found = self.get_container(
            &format!("/library/sections/{section}/all"),
            &[("type", TYPE_ALBUM), ("title", album), ("artist.title", artist)],
        )?;
        Ok(found
            .directories
            .into_iter()
            .find(|d| d.kind.eq_ignore_ascii_case("album") && canon(&d.title) == canon(album) && canon(&d.parent_title) == canon(artist))
            .map(|d| normalize_album_key(&d.key)))
    }

    /// Find the album through one of its tracks, for albums the album search misses.
    pub fn find_album_key_via_tracks(&self, section: &str, album: &str, artist: &str, track: &str) -> Result<Option<String>> {
        let mut query = vec![("type", TYPE_TRACK), ("artist.title", artist), ("album.title", album)];
        if !track.trim().is_empty() {
            query.push(("title", track));
        }
        let found = self.get_container(&format!("/library/sections/{section}/all"), &query)?;
        let hit = found.tracks.into_iter().find(|t| {
            canon(&t.grandparent_title) == canon(artist) && canon(&t.parent_title) == canon(album) && (track.trim().is_empty() || canon(&t.title) == canon(track))
        });
        Ok(hit.and_then(|t| {
            if !t.parent_key.trim().is_empty() {
                Some(normalize_album_key(&t.parent_key))
            } else if !t.parent_rating_key.trim().is_empty() {
                Some(format!("/library/metadata/{}", t.parent_rating_key.trim()))
            } else {
                None
            }
        }))
    }

    /// Ask the index to re-read one album. Servers that reject GET for refresh get a PUT.
    pub fn refresh(&self, album_key: &str) -> Result<()> {
        let url = self.url(&format!("{}/refresh", normalize_album_key(album_key)), &[("force", "1")])?;
        let mut resp: HttpResponse = self.http.get(&url, &self.headers())?;
        if resp.status == 404 || resp.status == 405 {
            debug!(album_key, status = resp.status, "refresh via GET rejected, retrying with PUT");
            resp = self.http.put(&url, &self.headers())?;
        }
        match resp.status {
            200 | 204 => Ok(()),
            _ => Err(AutotagExpectedError::Http {
                url: redact(&url),
                reason: format!("refresh returned {}", resp.status_text()),
            }
            .into()),
        }
    }

    pub fn health_check(&self) -> Result<IndexIdentity> {
        let url = self.url("/identity", &[])?;
        let resp = self.http.get(&url, &self.headers())?;
        if resp.status != 200 {
            return Err(AutotagExpectedError::Http {
                url: redact(&url),
                reason: format!("identity returned {}", resp.status_text()),
            }
            .into());
        }
        let doc = roxmltree::Document::parse(&resp.body).map_err(|e| AutotagExpectedError::Http {
            url: redact(&url),
            reason: format!("unparseable identity: {e}"),
        })?;
        let root = doc.root_element();
        Ok(IndexIdentity {
            machine_identifier: attr(root, "machineIdentifier"),
            version: attr(root, "version"),
            friendly_name: attr(root, "friendlyName"),
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefreshReport {
    pub refreshed: Vec<String>,
    pub failed: Vec<(String, String)>,
}

pub struct RefreshNotifier {
    client: MediaIndexClient,
    album_keys: TtlCache<String>,
}

impl RefreshNotifier {
    pub fn new(client: MediaIndexClient, album_keys: TtlCache<String>) -> Self {
        Self { client, album_keys }
    }

    /// `None` when the configuration has no media index section.
    pub fn from_config(c: &Config) -> Result<Option<Self>> {
        let Some(idx) = &c.media_index else {
            return Ok(None);
        };
        let http = Arc::new(ReqwestHttpClient::new(idx.timeout)?);
        let client = MediaIndexClient::new(http, &idx.url, &idx.token);
        Ok(Some(Self::new(client, TtlCache::new(c.cache_file(ALBUM_KEY_CACHE_FILE), idx.ttl))))
    }

    pub fn client(&self) -> &MediaIndexClient {
        &self.client
    }

    /// Record that an album's files changed. Does nothing unless tags were actually written.
    pub fn note_change(&self, album: &str, release_artist: &str, track_title: &str, unchanged: bool, tags_written: usize, refresh: &mut RefreshSet) -> Result<()> {
        if unchanged || tags_written == 0 {
            return Ok(());
        }
        let key = self.album_key(album, release_artist, track_title).map_err(|e| match e {
            AutotagError::Expected(AutotagExpectedError::RefreshResolution { .. }) => e,
            other => AutotagExpectedError::RefreshResolution {
                album: album.to_string(),
                reason: other.to_string(),
            }
            .into(),
        })?;
        debug!(album, key, "queued album for media index refresh");
        refresh.insert(album.to_string(), key);
        Ok(())
    }

    fn album_key(&self, album: &str, release_artist: &str, track_title: &str) -> Result<String> {
        if let Some(key) = self.album_keys.get_fresh(album)? {
            return Ok(key);
        }
        let miss = |reason: String| -> AutotagError {
            AutotagExpectedError::RefreshResolution {
                album: album.to_string(),
                reason,
            }
            .into()
        };

        let section = self.client.music_section_id()?.ok_or_else(|| miss("no music section in media index".to_string()))?;
        if self.client.find_artist_key(&section, release_artist)?.is_none() {
            return Err(miss(format!("artist {release_artist} not found in media index")));
        }
        let key = match self.client.find_album_key(&section, album, release_artist)? {
            Some(k) => k,
            None => self
                .client
                .find_album_key_via_tracks(&section, album, release_artist, track_title)?
                .ok_or_else(|| miss(format!("album not found for artist {release_artist}")))?,
        };
        self.album_keys.put(album, key.clone())?;
        Ok(key)
    }

    /// Refresh every album in the set. Failures are collected, not fatal.
    pub fn refresh_albums(&self, refresh: &RefreshSet) -> RefreshReport {
        let mut report = RefreshReport::default();
        for (album, key) in refresh {
            match self.client.refresh(key) {
                Ok(()) => {
                    info!(album, key, "refreshed album in media index");
                    report.refreshed.push(album.clone());
                }
                Err(e) => {
                    warn!(album, key, "failed to refresh album in media index: {e}");
                    report.failed.push((album.clone(), e.to_string()));
                }
            }
        }
        report
    }
}
