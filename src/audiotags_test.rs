use crate::audiotags::*;
use crate::error::{AutotagError, AutotagExpectedError};
use crate::testing;
use std::fs;
use std::path::Path;

#[test]
fn test_audio_format_by_extension() {
    assert_eq!(audio_format(Path::new("/m/a.flac")).unwrap(), AudioFormat::Vorbis);
    assert_eq!(audio_format(Path::new("/m/a.FLAC")).unwrap(), AudioFormat::Vorbis);
    assert_eq!(audio_format(Path::new("/m/a.mp3")).unwrap(), AudioFormat::Frame);
    for p in ["/m/a.m4a", "/m/a.ogg", "/m/noext"] {
        match audio_format(Path::new(p)) {
            Err(AutotagError::Expected(AutotagExpectedError::UnsupportedFormat { .. })) => {}
            other => panic!("{p}: expected UnsupportedFormat, got {other:?}"),
        }
    }
}

#[test]
fn test_extract_identifiers_flac() {
    let temp_dir = testing::init();
    let p = temp_dir.path().join("01.flac");
    testing::write_flac(
        &p,
        &[
            ("MUSICBRAINZ_ALBUMID", "  rel-1 "),
            ("musicbrainz_releasetrackid", "trk-1"),
            ("MUSICBRAINZ_TRACKID", "rec-1"),
            ("TITLE", "Song"),
        ],
    );

    let ids = extract_release_identifiers(&p).unwrap();
    assert_eq!(ids.release_id, "rel-1");
    assert_eq!(ids.track_id, "trk-1");
    assert!(ids.is_complete());
    assert_eq!(extract_identifier(&p, IdKind::Recording).unwrap(), Some("rec-1".to_string()));
    assert_eq!(extract_identifier(&p, IdKind::ReleaseGroup).unwrap(), None);
}

#[test]
fn test_extract_identifiers_flac_skips_empty_values() {
    let temp_dir = testing::init();
    let p = temp_dir.path().join("01.flac");
    testing::write_flac(&p, &[("MUSICBRAINZ_ALBUMID", "   "), ("MUSICBRAINZ_ALBUMID", "rel-2")]);
    assert_eq!(extract_identifier(&p, IdKind::Release).unwrap(), Some("rel-2".to_string()));

    let ids = extract_release_identifiers(&p).unwrap();
    assert_eq!(ids.track_id, "");
    assert!(!ids.is_complete());
}

#[test]
fn test_extract_identifiers_mp3() {
    let temp_dir = testing::init();
    let p = temp_dir.path().join("01.mp3");
    testing::write_mp3_txxx(
        &p,
        &[
            ("MusicBrainz Album Id", "rel-alias"),
            ("musicbrainz release track id", "trk-9"),
            ("MusicBrainz Album Artist Id", "art-1"),
        ],
    );

    let ids = extract_release_identifiers(&p).unwrap();
    assert_eq!(ids.release_id, "rel-alias");
    assert_eq!(ids.track_id, "trk-9");
    assert_eq!(extract_identifier(&p, IdKind::Artist).unwrap(), Some("art-1".to_string()));
    assert_eq!(extract_identifier(&p, IdKind::Recording).unwrap(), None);
}

#[test]
fn test_extract_identifiers_mp3_prefers_primary_label() {
    let temp_dir = testing::init();
    let p = temp_dir.path().join("01.mp3");
    testing::write_mp3_txxx(&p, &[("MusicBrainz Album Id", "rel-alias"), ("MusicBrainz Release Id", "rel-primary")]);
    assert_eq!(extract_identifier(&p, IdKind::Release).unwrap(), Some("rel-primary".to_string()));
}

#[test]
fn test_extract_identifiers_mp3_without_tag() {
    let temp_dir = testing::init();
    let p = temp_dir.path().join("bare.mp3");
    fs::write(&p, [0xff, 0xfb, 0x90, 0x00, 0x00, 0x00]).unwrap();

    let ids = extract_release_identifiers(&p).unwrap();
    assert_eq!(ids.release_id, "");
    assert_eq!(ids.track_id, "");
}

#[test]
fn test_extract_identifiers_unreadable_flac() {
    let temp_dir = testing::init();
    let p = temp_dir.path().join("garbage.flac");
    fs::write(&p, b"definitely not flac").unwrap();
    match extract_release_identifiers(&p) {
        Err(AutotagError::Expected(AutotagExpectedError::TagRead { path, .. })) => assert_eq!(path, p),
        other => panic!("expected TagRead, got {other:?}"),
    }
}

#[test]
fn test_extract_identifiers_unsupported_format() {
    let temp_dir = testing::init();
    let p = temp_dir.path().join("track.m4a");
    fs::write(&p, b"whatever").unwrap();
    assert!(matches!(
        extract_release_identifiers(&p),
        Err(AutotagError::Expected(AutotagExpectedError::UnsupportedFormat { .. }))
    ));
}

#[test]
fn test_read_vorbis_tags_upper_cases_keys() {
    let temp_dir = testing::init();
    let p = temp_dir.path().join("01.flac");
    testing::write_flac(&p, &[("Artist", "A"), ("GENRE", "Rock"), ("genre", "Jazz")]);

    let tags = read_vorbis_tags(&p).unwrap();
    assert_eq!(tags.get("ARTIST"), Some(&vec!["A".to_string()]));
    let mut genres = tags.get("GENRE").cloned().unwrap();
    genres.sort();
    assert_eq!(genres, vec!["Jazz".to_string(), "Rock".to_string()]);
}
