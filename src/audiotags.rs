//! The audiotags module reads what is already embedded in a file: the catalog identifiers used to
//! look up a release, and the full current tag map that the diff engine compares against.
//!
//! Two container families are handled. FLAC files carry Vorbis comments, read in-process with
//! `metaflac`. MP3 files carry ID3 frames; identifiers live in user-defined text (TXXX) frames and
//! are read with `id3`, while the general tag map comes from the media prober (see `tagwriter`), so
//! that the values compared are the ones the converter will later overwrite.
use crate::common::normalize_tag_value;
use crate::error::{AutotagExpectedError, Result};
use crate::filetags::ReleaseIdentifiers;
use crate::tagdiff::TagMap;
use id3::{Tag as Id3Tag, TagLike};
use metaflac::Tag as FlacTag;
use std::path::Path;
use tracing::trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioFormat {
    /// FLAC with Vorbis comments.
    Vorbis,
    /// MP3 with ID3v2 frames.
    Frame,
}

/// Lower-cased extension without the dot.
pub fn extension_of(p: &Path) -> Option<String> {
    p.extension().and_then(|s| s.to_str()).map(|s| s.to_lowercase())
}

pub fn audio_format(p: &Path) -> Result<AudioFormat> {
    match extension_of(p).as_deref() {
        Some("flac") => Ok(AudioFormat::Vorbis),
        Some("mp3") => Ok(AudioFormat::Frame),
        _ => Err(AutotagExpectedError::UnsupportedFormat { path: p.to_path_buf() }.into()),
    }
}

/// The catalog identifiers a file may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IdKind {
    Release,
    Track,
    Recording,
    ReleaseGroup,
    Artist,
}

impl IdKind {
    pub const ALL: [IdKind; 5] = [IdKind::Release, IdKind::Track, IdKind::Recording, IdKind::ReleaseGroup, IdKind::Artist];

    pub fn vorbis_key(self) -> &'static str {
        match self {
            IdKind::Release => "MUSICBRAINZ_ALBUMID",
            IdKind::Track => "MUSICBRAINZ_RELEASETRACKID",
            IdKind::Recording => "MUSICBRAINZ_TRACKID",
            IdKind::ReleaseGroup => "MUSICBRAINZ_RELEASEGROUPID",
            IdKind::Artist => "MUSICBRAINZ_ALBUMARTISTID",
        }
    }

    /// TXXX descriptions accepted for this identifier, in priority order.
    pub fn frame_labels(self) -> &'static [&'static str] {
        match self {
            IdKind::Release => &["MusicBrainz Release Id", "MusicBrainz Album Id"],
            IdKind::Track => &["MusicBrainz Track Id", "MusicBrainz Release Track Id"],
            IdKind::Recording => &["MusicBrainz Recording Id"],
            IdKind::ReleaseGroup => &["MusicBrainz Release Group Id"],
            IdKind::Artist => &["MusicBrainz Album Artist Id"],
        }
    }
}

/// Read one identifier. `Ok(None)` means the tag is absent, which is not an error.
pub fn extract_identifier(p: &Path, kind: IdKind) -> Result<Option<String>> {
    match audio_format(p)? {
        AudioFormat::Vorbis => {
            let tags = read_vorbis_tags(p)?;
            Ok(_first_vorbis_value(&tags, kind))
        }
        AudioFormat::Frame => {
            let tag = _read_id3(p)?;
            Ok(tag.as_ref().and_then(|t| _first_txxx_value(t, kind)))
        }
    }
}

/// Read the release and track identifiers with a single file open.
pub fn extract_release_identifiers(p: &Path) -> Result<ReleaseIdentifiers> {
    let (release_id, track_id) = match audio_format(p)? {
        AudioFormat::Vorbis => {
            let tags = read_vorbis_tags(p)?;
            (_first_vorbis_value(&tags, IdKind::Release), _first_vorbis_value(&tags, IdKind::Track))
        }
        AudioFormat::Frame => match _read_id3(p)? {
            Some(tag) => (_first_txxx_value(&tag, IdKind::Release), _first_txxx_value(&tag, IdKind::Track)),
            None => (None, None),
        },
    };
    trace!(path = %p.display(), ?release_id, ?track_id, "extracted embedded identifiers");
    Ok(ReleaseIdentifiers {
        release_id: release_id.unwrap_or_default(),
        track_id: track_id.unwrap_or_default(),
    })
}

/// All Vorbis comments of a FLAC file, keyed by upper-cased field name. A file without a comment
/// block yields an empty map.
pub fn read_vorbis_tags(p: &Path) -> Result<TagMap> {
    let tag = FlacTag::read_from_path(p).map_err(|e| AutotagExpectedError::TagRead {
        path: p.to_path_buf(),
        reason: e.to_string(),
    })?;
    let mut out = TagMap::new();
    if let Some(comments) = tag.vorbis_comments() {
        for (k, values) in &comments.comments {
            out.entry(k.to_uppercase()).or_default().extend(values.iter().cloned());
        }
    }
    Ok(out)
}

fn _first_vorbis_value(tags: &TagMap, kind: IdKind) -> Option<String> {
    tags.get(kind.vorbis_key())?.iter().map(|v| normalize_tag_value(v)).find(|v| !v.is_empty())
}

fn _read_id3(p: &Path) -> Result<Option<Id3Tag>> {
    match Id3Tag::read_from_path(p) {
        Ok(tag) => Ok(Some(tag)),
        Err(e) if matches!(e.kind, id3::ErrorKind::NoTag) => Ok(None),
        Err(e) => Err(AutotagExpectedError::TagRead {
            path: p.to_path_buf(),
            reason: e.to_string(),
        }
        .into()),
    }
}

fn _first_txxx_value(tag: &Id3Tag, kind: IdKind) -> Option<String> {
    for label in kind.frame_labels() {
        for ext in tag.extended_texts() {
            if !ext.description.trim().eq_ignore_ascii_case(label) {
                continue;
            }
            let v = normalize_tag_value(ext.value.trim_end_matches('\0'));
            if !v.is_empty() {
                return Some(v);
            }
        }
    }
    None
}
