use crate::cache::TtlCache;
use crate::error::{AutotagError, AutotagExpectedError};
use crate::mediaindex::*;
use crate::testing::{self, FakeHttp};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

const BASE: &str = "http://plex.test:32400";

fn notifier(dir: &Path, http: Arc<FakeHttp>) -> RefreshNotifier {
    let client = MediaIndexClient::new(http, BASE, "tok");
    RefreshNotifier::new(client, TtlCache::new(dir.join(ALBUM_KEY_CACHE_FILE), Duration::from_secs(3600)))
}

fn route_sections(http: &FakeHttp, artist_found: bool) {
    http.route(
        "GET",
        &format!("{BASE}/library/sections?X-Plex-Token=tok"),
        200,
        r#"<MediaContainer size="2">
             <Directory key="1" type="movie" title="Movies"/>
             <Directory key="3" type="artist" title="Music"/>
           </MediaContainer>"#,
    );
    let artists = if artist_found {
        r#"<MediaContainer><Directory key="/library/metadata/7/children" type="artist" title="the band"/></MediaContainer>"#
    } else {
        r#"<MediaContainer size="0"/>"#
    };
    http.route("GET", &format!("{BASE}/library/sections/3/all?type=8&title=The Band&X-Plex-Token=tok"), 200, artists);
}

fn album_search_url(album: &str) -> String {
    format!("{BASE}/library/sections/3/all?type=9&title={album}&artist.title=The Band&X-Plex-Token=tok")
}

#[test]
fn test_parse_media_container() {
    let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
        <MediaContainer size="3">
          <Directory ratingKey="42" key="/library/metadata/42/children" type="album" title="Album" parentTitle="The Band"/>
          <Track ratingKey="43" key="/library/metadata/43" type="track" title="Song" parentTitle="Album" grandparentTitle="The Band"
                 parentKey="/library/metadata/42" parentRatingKey="42"/>
          <Hub title="ignored"/>
        </MediaContainer>"#;
    let c = parse_media_container(xml).unwrap();
    assert_eq!(c.directories.len(), 1);
    assert_eq!(c.directories[0].rating_key, "42");
    assert_eq!(c.directories[0].parent_title, "The Band");
    assert_eq!(c.tracks.len(), 1);
    assert_eq!(c.tracks[0].grandparent_title, "The Band");
    assert_eq!(c.tracks[0].parent_key, "/library/metadata/42");

    assert!(parse_media_container("<MediaContainer>").is_err());
}

#[test]
fn test_normalize_album_key() {
    assert_eq!(normalize_album_key("/library/metadata/42/children"), "/library/metadata/42");
    assert_eq!(normalize_album_key(" /library/metadata/42/ "), "/library/metadata/42");
    assert_eq!(normalize_album_key("/library/metadata/42"), "/library/metadata/42");
}

#[test]
fn test_note_change_noop_without_writes() {
    let temp_dir = testing::init();
    let http = Arc::new(FakeHttp::new());
    let n = notifier(temp_dir.path(), http.clone());
    let mut refresh = RefreshSet::new();

    n.note_change("Album", "The Band", "Song", true, 3, &mut refresh).unwrap();
    n.note_change("Album", "The Band", "Song", false, 0, &mut refresh).unwrap();
    assert!(refresh.is_empty());
    assert!(http.requests().is_empty());
}

#[test]
fn test_note_change_resolves_and_caches_album_key() {
    let temp_dir = testing::init();
    let http = Arc::new(FakeHttp::new());
    route_sections(&http, true);
    http.route(
        "GET",
        &album_search_url("Album"),
        200,
        r#"<MediaContainer>
             <Directory key="/library/metadata/50/children" type="album" title="Album" parentTitle="Someone Else"/>
             <Directory key="/library/metadata/42/children" type="album" title="ALBUM" parentTitle="The Band"/>
           </MediaContainer>"#,
    );

    let n = notifier(temp_dir.path(), http.clone());
    let mut refresh = RefreshSet::new();
    n.note_change("Album", "The Band", "Song", false, 2, &mut refresh).unwrap();
    assert_eq!(refresh.get("Album").map(String::as_str), Some("/library/metadata/42"));
    let first = http.requests()[0].clone();
    assert_eq!(first.header("Accept"), Some("application/xml"));
    let calls = http.requests().len();

    // Later changes to the same album, even from a new notifier over the same cache file, reuse the key.
    let n = notifier(temp_dir.path(), http.clone());
    let mut refresh = RefreshSet::new();
    n.note_change("Album", "The Band", "Other Song", false, 1, &mut refresh).unwrap();
    assert_eq!(refresh.get("Album").map(String::as_str), Some("/library/metadata/42"));
    assert_eq!(http.requests().len(), calls);
}

#[test]
fn test_note_change_falls_back_to_track_search() {
    let temp_dir = testing::init();
    let http = Arc::new(FakeHttp::new());
    route_sections(&http, true);
    http.route("GET", &album_search_url("Album"), 200, r#"<MediaContainer size="0"/>"#);
    http.route(
        "GET",
        &format!("{BASE}/library/sections/3/all?type=10&artist.title=The Band&album.title=Album&title=Song&X-Plex-Token=tok"),
        200,
        r#"<MediaContainer>
             <Track key="/library/metadata/43" type="track" title="song" parentTitle="album" grandparentTitle="THE BAND" parentRatingKey="42"/>
           </MediaContainer>"#,
    );

    let n = notifier(temp_dir.path(), http);
    let mut refresh = RefreshSet::new();
    n.note_change("Album", "The Band", "Song", false, 1, &mut refresh).unwrap();
    assert_eq!(refresh.get("Album").map(String::as_str), Some("/library/metadata/42"));
}

#[test]
fn test_note_change_unknown_artist_is_refresh_resolution_failure() {
    let temp_dir = testing::init();
    let http = Arc::new(FakeHttp::new());
    route_sections(&http, false);

    let n = notifier(temp_dir.path(), http);
    let mut refresh = RefreshSet::new();
    match n.note_change("Album", "The Band", "Song", false, 1, &mut refresh) {
        Err(AutotagError::Expected(AutotagExpectedError::RefreshResolution { album, .. })) => assert_eq!(album, "Album"),
        other => panic!("expected RefreshResolution, got {other:?}"),
    }
    assert!(refresh.is_empty());
}

#[test]
fn test_note_change_server_error_is_refresh_resolution_failure() {
    let temp_dir = testing::init();
    let http = Arc::new(FakeHttp::new());
    http.route("GET", &format!("{BASE}/library/sections?X-Plex-Token=tok"), 401, "unauthorized");

    let n = notifier(temp_dir.path(), http);
    let mut refresh = RefreshSet::new();
    assert!(matches!(
        n.note_change("Album", "The Band", "Song", false, 1, &mut refresh),
        Err(AutotagError::Expected(AutotagExpectedError::RefreshResolution { .. }))
    ));
}

#[test]
fn test_refresh_albums() {
    let temp_dir = testing::init();
    let http = Arc::new(FakeHttp::new());
    http.route("GET", &format!("{BASE}/library/metadata/1/refresh?force=1&X-Plex-Token=tok"), 200, "");
    http.route("GET", &format!("{BASE}/library/metadata/2/refresh?force=1&X-Plex-Token=tok"), 405, "");
    http.route("PUT", &format!("{BASE}/library/metadata/2/refresh?force=1&X-Plex-Token=tok"), 204, "");
    http.route("GET", &format!("{BASE}/library/metadata/3/refresh?force=1&X-Plex-Token=tok"), 500, "");

    let n = notifier(temp_dir.path(), http.clone());
    let refresh: RefreshSet = [("A", "/library/metadata/1"), ("B", "/library/metadata/2/children"), ("C", "/library/metadata/3")]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    let report = n.refresh_albums(&refresh);
    assert_eq!(report.refreshed, vec!["A".to_string(), "B".to_string()]);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].0, "C");
    assert_eq!(http.requests().iter().filter(|r| r.method == "PUT").count(), 1);
}

#[test]
fn test_health_check() {
    let temp_dir = testing::init();
    let http = Arc::new(FakeHttp::new());
    http.route(
        "GET",
        &format!("{BASE}/identity?X-Plex-Token=tok"),
        200,
        r#"<MediaContainer size="0" machineIdentifier="abc123" version="1.40.0"/>"#,
    );
    let n = notifier(temp_dir.path(), http);
    let identity = n.client().health_check().unwrap();
    assert_eq!(identity.machine_identifier, "abc123");
    assert_eq!(identity.version, "1.40.0");
    assert_eq!(identity.friendly_name, "");
}
