//! Desired tag values for one track, derived from a catalog release document.
use crate::audiotags::AudioFormat;
use crate::catalog::{format_artist_credit, parse_catalog_date, CatalogRelease, TrackLocation};
use crate::config::ArtistCreditPolicy;
use crate::error::Result;
use crate::tagdiff::DesiredTags;

/// The catalog identifiers that locate a track. Both must be non-empty before a file can be
/// resolved against the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ReleaseIdentifiers {
    pub release_id: String,
    pub track_id: String,
}

impl ReleaseIdentifiers {
    pub fn is_complete(&self) -> bool {
        !self.release_id.trim().is_empty() && !self.track_id.trim().is_empty()
    }
}

/// A `None` field means "do not assert a value", never "clear the tag".
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FileTags {
    pub artist: Option<String>,
    pub album_artist: Option<String>,
    pub genre: Option<String>,
    pub release_date: Option<String>,
    pub release_year: Option<String>,
    pub original_date: Option<String>,
    pub original_year: Option<String>,
    pub album: Option<String>,
    pub title: Option<String>,
    pub isrc: Option<String>,
    pub track_number: Option<String>,
    pub track_total: Option<String>,
    pub disc_number: Option<String>,
    pub disc_total: Option<String>,
}

fn non_empty(s: impl Into<String>) -> Option<String> {
    let s = s.into();
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}

impl FileTags {
    pub fn from_catalog(release: &CatalogRelease, loc: &TrackLocation<'_>, policy: &ArtistCreditPolicy) -> Result<FileTags> {
        let album_artist = release.release_artist(policy)?;
        let (release_date, release_year) = match release.date.as_deref().and_then(parse_catalog_date) {
            Some((d, y)) => (Some(d), Some(y)),
            None => (None, None),
        };
        let (original_date, original_year) = match release.release_group.as_ref().and_then(|g| g.first_release_date.as_deref()).and_then(parse_catalog_date) {
            Some((d, y)) => (Some(d), Some(y)),
            None => (None, None),
        };
        let isrc = loc.track.recording.as_ref().and_then(|r| r.isrcs.iter().find(|i| !i.trim().is_empty())).cloned();

        Ok(FileTags {
            artist: non_empty(format_artist_credit(&loc.track.artist_credit, policy)),
            album_artist: non_empty(album_artist),
            genre: None,
            release_date,
            release_year,
            original_date,
            original_year,
            album: non_empty(release.title.clone()),
            title: non_empty(loc.track.title.clone()),
            isrc,
            track_number: non_empty(loc.track.tag_number()),
            track_total: Some(loc.medium.tracks.len().to_string()),
            disc_number: Some((loc.medium_index + 1).to_string()),
            disc_total: Some(release.media.len().to_string()),
        })
    }

    /// The upper-cased tag keys this track should carry in the given container family.
    pub fn desired(&self, format: AudioFormat) -> DesiredTags {
        let mut fields: Vec<(&str, &Option<String>)> = vec![
            ("ARTIST", &self.artist),
            ("ALBUMARTIST", &self.album_artist),
            ("GENRE", &self.genre),
            ("DATE", &self.release_date),
            ("YEAR", &self.release_year),
            ("ORIGINALDATE", &self.original_date),
            ("ORIGINALYEAR", &self.original_year),
            ("ALBUM", &self.album),
            ("TITLE", &self.title),
            ("TRACKNUMBER", &self.track_number),
            ("TRACKTOTAL", &self.track_total),
            ("DISCNUMBER", &self.disc_number),
            ("DISCTOTAL", &self.disc_total),
            ("ISRC", &self.isrc),
        ];
        if format == AudioFormat::Vorbis {
            fields.push(("RELEASEDATE", &self.release_date));
        }
        fields.into_iter().filter_map(|(k, v)| v.as_ref().map(|v| (k.to_string(), v.clone()))).collect()
    }
}
