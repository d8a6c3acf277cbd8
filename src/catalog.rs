//! The catalog module fetches authoritative release documents from the MusicBrainz web service.
//! Requests go through the shared rate limiter and the long-lived release cache.
use crate::cache::TtlCache;
use crate::common::{APP_NAME, VERSION};
use crate::config::{ArtistCreditPolicy, ArtistNameSource, Config};
use crate::error::{AutotagError, AutotagExpectedError, Result};
use crate::http::{parse_url, HttpClient, ReqwestHttpClient};
use crate::ratelimit::RateLimiter;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

pub const RELEASE_CACHE_FILE: &str = "catalog_releases.json";

const RELEASE_INCLUDES: &str = "recordings+labels+artists+genres+tags+release-groups";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditedArtist {
    #[serde(default)]
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtistCredit {
    pub name: String,
    #[serde(default)]
    pub joinphrase: String,
    #[serde(default)]
    pub artist: Option<CreditedArtist>,
}

impl ArtistCredit {
    fn display_name(&self, source: ArtistNameSource) -> &str {
        match (source, &self.artist) {
            (ArtistNameSource::Artist, Some(a)) if !a.name.trim().is_empty() => &a.name,
            _ => &self.name,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseGroup {
    #[serde(default)]
    pub id: String,
    #[serde(rename = "first-release-date", default)]
    pub first_release_date: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recording {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub isrcs: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogTrack {
    pub id: String,
    #[serde(default)]
    pub number: String,
    #[serde(default)]
    pub position: Option<u32>,
    pub title: String,
    #[serde(rename = "artist-credit", default)]
    pub artist_credit: Vec<ArtistCredit>,
    #[serde(default)]
    pub recording: Option<Recording>,
}

impl CatalogTrack {
    /// Track number for tagging: the position within the medium, or the printed number when the
    /// document omits positions.
    pub fn tag_number(&self) -> String {
        match self.position {
            Some(p) => p.to_string(),
            None => self.number.trim().to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Medium {
    #[serde(default)]
    pub position: Option<u32>,
    #[serde(default)]
    pub tracks: Vec<CatalogTrack>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogRelease {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(rename = "artist-credit", default)]
    pub artist_credit: Vec<ArtistCredit>,
    #[serde(rename = "release-group", default)]
    pub release_group: Option<ReleaseGroup>,
    #[serde(default)]
    pub media: Vec<Medium>,
}

/// A track located inside a release, with its medium's 0-based ordinal.
#[derive(Debug, Clone, Copy)]
pub struct TrackLocation<'a> {
    pub medium_index: usize,
    pub medium: &'a Medium,
    pub track: &'a CatalogTrack,
}

impl CatalogRelease {
    pub fn find_track(&self, track_id: &str) -> Option<TrackLocation<'_>> {
        self.media.iter().enumerate().find_map(|(medium_index, medium)| {
            medium.tracks.iter().find(|t| t.id == track_id).map(|track| TrackLocation { medium_index, medium, track })
        })
    }

    /// The first release-level credit, named per the policy.
    pub fn release_artist(&self, policy: &ArtistCreditPolicy) -> Result<String> {
        self.artist_credit
            .first()
            .map(|c| c.display_name(policy.names).to_string())
            .ok_or_else(|| AutotagError::Expected(AutotagExpectedError::CatalogFetch {
                release_id: self.id.clone(),
                reason: "release has no artist credit".to_string(),
            }))
    }
}

/// Flatten an artist-credit list into one string. Without a configured delimiter each credit's own
/// join phrase follows its name; with one, names are joined by the delimiter alone.
pub fn format_artist_credit(credits: &[ArtistCredit], policy: &ArtistCreditPolicy) -> String {
    match &policy.delimiter {
        Some(delim) => credits.iter().map(|c| c.display_name(policy.names)).collect::<Vec<_>>().join(delim),
        None => credits.iter().fold(String::new(), |mut acc, c| {
            acc.push_str(c.display_name(policy.names));
            acc.push_str(&c.joinphrase);
            acc
        }),
    }
}

/// Split an ISO `YYYY-MM-DD` date into (date, year). Partial or malformed dates yield `None`.
pub fn parse_catalog_date(s: &str) -> Option<(String, String)> {
    let date = chrono::NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").ok()?;
    Some((date.format("%Y-%m-%d").to_string(), date.format("%Y").to_string()))
}

pub fn user_agent(contact: Option<&str>) -> String {
    match contact.map(str::trim).filter(|c| !c.is_empty()) {
        Some(c) => format!("{APP_NAME}/{VERSION} ({c})"),
        None => format!("{APP_NAME}/{VERSION}"),
    }
}

pub struct CatalogClient {
    http: Arc<dyn HttpClient>,
    limiter: Arc<RateLimiter>,
    cache: TtlCache<CatalogRelease>,
    base_url: String,
    user_agent: String,
}

impl CatalogClient {
    pub fn new(http: Arc<dyn HttpClient>, limiter: Arc<RateLimiter>, cache: TtlCache<CatalogRelease>, base_url: &str, user_agent: String) -> Self {
        Self {
            http,
            limiter,
            cache,
            base_url: base_url.trim_end_matches('/').to_string(),
            user_agent,
        }
    }

    pub fn from_config(c: &Config, limiter: Arc<RateLimiter>) -> Result<Self> {
        let http = Arc::new(ReqwestHttpClient::new(c.catalog.timeout)?);
        let cache = TtlCache::new(c.cache_file(RELEASE_CACHE_FILE), c.catalog.release_ttl);
        Ok(Self::new(http, limiter, cache, &c.catalog.base_url, user_agent(c.catalog.contact.as_deref())))
    }

    pub fn release_url(&self, release_id: &str) -> String {
        format!("{}/release/{}?inc={}&fmt=json", self.base_url, release_id, RELEASE_INCLUDES)
    }

    pub fn fetch_release(&self, release_id: &str) -> Result<CatalogRelease> {
        let release_id = release_id.trim();
        let fetch_error = |reason: String| -> AutotagError {
            AutotagExpectedError::CatalogFetch {
                release_id: release_id.to_string(),
                reason,
            }
            .into()
        };
        if release_id.is_empty() {
            return Err(fetch_error("empty release id".to_string()));
        }

        if let Some(release) = self.cache.get_fresh(release_id)? {
            debug!(release_id, "release cache hit");
            return Ok(release);
        }

        let url = parse_url(&self.release_url(release_id))?;
        self.limiter.acquire();
        info!(release_id, url = %url, "fetching release from catalog");
        let resp = self
            .http
            .get(&url, &[("User-Agent", self.user_agent.as_str()), ("Accept", "application/json")])
            .map_err(|e| fetch_error(e.to_string()))?;
        if resp.status != 200 {
            return Err(fetch_error(format!("catalog returned status: {}", resp.status_text())));
        }
        let release: CatalogRelease = serde_json::from_str(&resp.body).map_err(|e| fetch_error(format!("failed to parse release document: {e}")))?;

        self.cache.put(release_id, release.clone())?;
        Ok(release)
    }
}
