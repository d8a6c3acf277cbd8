use crate::audiotags::read_vorbis_tags;
use crate::http::{HttpClient, HttpResponse};
use crate::tools::{CommandOutput, CommandRunner};
use reqwest::Url;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, Once};
use tempfile::TempDir;

static INIT: Once = Once::new();

pub fn init() -> TempDir {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("debug")))
            .with_test_writer()
            .try_init();
    });
    TempDir::new().expect("failed to create temp dir")
}

/// A minimal but well-formed FLAC header: STREAMINFO followed by a Vorbis comment block. There are
/// no audio frames, which is all the tag readers need.
pub fn flac_bytes(comments: &[(&str, &str)]) -> Vec<u8> {
    let mut out = b"fLaC".to_vec();

    let mut streaminfo = vec![0u8; 34];
    streaminfo[0..2].copy_from_slice(&4096u16.to_be_bytes());
    streaminfo[2..4].copy_from_slice(&4096u16.to_be_bytes());
    // 20 bits sample rate, 3 bits channels-1, 5 bits bits-per-sample-1, 36 bits total samples.
    let packed: u64 = (44100u64 << 44) | (1u64 << 41) | (15u64 << 36);
    streaminfo[10..18].copy_from_slice(&packed.to_be_bytes());
    out.push(0x00);
    out.extend_from_slice(&(streaminfo.len() as u32).to_be_bytes()[1..]);
    out.extend_from_slice(&streaminfo);

    let mut vc = Vec::new();
    let vendor = b"autotag-test";
    vc.extend_from_slice(&(vendor.len() as u32).to_le_bytes());
    vc.extend_from_slice(vendor);
    vc.extend_from_slice(&(comments.len() as u32).to_le_bytes());
    for (k, v) in comments {
        let c = format!("{k}={v}");
        vc.extend_from_slice(&(c.len() as u32).to_le_bytes());
        vc.extend_from_slice(c.as_bytes());
    }
    out.push(0x80 | 4);
    out.extend_from_slice(&(vc.len() as u32).to_be_bytes()[1..]);
    out.extend_from_slice(&vc);
    out
}

pub fn write_flac(p: &Path, comments: &[(&str, &str)]) {
    if let Some(parent) = p.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(p, flac_bytes(comments)).unwrap();
}

pub fn write_mp3_txxx(p: &Path, frames: &[(&str, &str)]) {
    use id3::frame::ExtendedText;
    use id3::{TagLike, Version};

    if let Some(parent) = p.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    let mut tag = id3::Tag::new();
    for (description, value) in frames {
        tag.add_frame(ExtendedText {
            description: description.to_string(),
            value: value.to_string(),
        });
    }
    let mut buf = Vec::new();
    tag.write_to(&mut buf, Version::Id3v24).unwrap();
    // A few bytes standing in for audio after the tag.
    buf.extend_from_slice(&[0xff, 0xfb, 0x90, 0x00]);
    fs::write(p, buf).unwrap();
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRequest {
    pub method: String,
    pub url: String,
    pub headers: Vec<(String, String)>,
}

impl RecordedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.iter().find(|(k, _)| k.eq_ignore_ascii_case(name)).map(|(_, v)| v.as_str())
    }
}

/// Canned HTTP responses keyed by method, path, and the sorted query pairs.
#[derive(Default)]
pub struct FakeHttp {
    routes: Mutex<HashMap<String, HttpResponse>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

fn route_key(method: &str, url: &Url) -> String {
    let mut pairs: Vec<(String, String)> = url.query_pairs().map(|(k, v)| (k.into_owned(), v.into_owned())).collect();
    pairs.sort();
    let query: Vec<String> = pairs.into_iter().map(|(k, v)| format!("{k}={v}")).collect();
    format!("{} {}://{}{}?{}", method, url.scheme(), url.host_str().unwrap_or(""), url.path(), query.join("&"))
}

impl FakeHttp {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(&self, method: &str, url: &str, status: u16, body: impl Into<String>) {
        let url = Url::parse(url).unwrap();
        self.routes.lock().unwrap().insert(route_key(method, &url), HttpResponse::new(status, body));
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Number of requests whose URL path ends with `suffix`.
    pub fn count(&self, suffix: &str) -> usize {
        self.requests().iter().filter(|r| Url::parse(&r.url).map(|u| u.path().ends_with(suffix)).unwrap_or(false)).count()
    }

    fn respond(&self, method: &str, url: &Url, headers: &[(&str, &str)]) -> HttpResponse {
        self.requests.lock().unwrap().push(RecordedRequest {
            method: method.to_string(),
            url: url.to_string(),
            headers: headers.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
        });
        self.routes
            .lock()
            .unwrap()
            .get(&route_key(method, url))
            .cloned()
            .unwrap_or_else(|| HttpResponse::new(404, format!("no route for {method} {url}")))
    }
}

impl HttpClient for FakeHttp {
    fn get(&self, url: &Url, headers: &[(&str, &str)]) -> crate::Result<HttpResponse> {
        Ok(self.respond("GET", url, headers))
    }

    fn put(&self, url: &Url, headers: &[(&str, &str)]) -> crate::Result<HttpResponse> {
        Ok(self.respond("PUT", url, headers))
    }
}

/// Stands in for `metaflac`, `ffprobe`, and `ffmpeg`. FLAC edits are applied to the real fixture
/// file; MP3 tags live in an in-memory store keyed by the file path, the way ffprobe would report
/// them after ffmpeg wrote them.
#[derive(Default)]
pub struct FakeTools {
    pub calls: Mutex<Vec<(String, Vec<String>)>>,
    pub mp3_tags: Mutex<HashMap<PathBuf, BTreeMap<String, String>>>,
    /// Zero-based index of a call that should fail.
    pub fail_call: Mutex<Option<usize>>,
}

impl FakeTools {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_on_call(&self, n: usize) {
        *self.fail_call.lock().unwrap() = Some(n);
    }

    pub fn set_mp3_tags(&self, p: &Path, tags: &[(&str, &str)]) {
        self.mp3_tags.lock().unwrap().insert(p.to_path_buf(), tags.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect());
    }

    pub fn calls_to(&self, program: &str) -> Vec<Vec<String>> {
        self.calls.lock().unwrap().iter().filter(|(p, _)| p == program).map(|(_, a)| a.clone()).collect()
    }

    fn ok(stdout: String) -> CommandOutput {
        CommandOutput { success: true, code: Some(0), stdout, stderr: String::new() }
    }

    fn metaflac(&self, args: &[String]) -> io::Result<CommandOutput> {
        let p = PathBuf::from(&args[1]);
        let mut tags = read_vorbis_tags(&p).map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?;
        if let Some(key) = args[0].strip_prefix("--remove-tag=") {
            tags.remove(&key.to_uppercase());
        } else if let Some(kv) = args[0].strip_prefix("--set-tag=") {
            let (k, v) = kv.split_once('=').unwrap();
            tags.entry(k.to_uppercase()).or_default().push(v.to_string());
        } else {
            panic!("unexpected metaflac arguments: {args:?}");
        }
        let flat: Vec<(String, String)> = tags.into_iter().flat_map(|(k, vs)| vs.into_iter().map(move |v| (k.clone(), v))).collect();
        let borrowed: Vec<(&str, &str)> = flat.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();
        write_flac(&p, &borrowed);
        Ok(Self::ok(String::new()))
    }

    fn ffprobe(&self, args: &[String]) -> io::Result<CommandOutput> {
        let p = PathBuf::from(args.last().unwrap());
        let tags = self.mp3_tags.lock().unwrap().get(&p).cloned().unwrap_or_default();
        Ok(Self::ok(serde_json::json!({ "format": { "tags": tags } }).to_string()))
    }

    fn ffmpeg(&self, args: &[String]) -> io::Result<CommandOutput> {
        let input = PathBuf::from(&args[1]);
        let output = PathBuf::from(args.last().unwrap());
        fs::copy(&input, &output)?;
        let mut store = self.mp3_tags.lock().unwrap();
        let tags = store.entry(input).or_default();
        let mut it = args.iter();
        while let Some(a) = it.next() {
            if a == "-metadata" {
                let (k, v) = it.next().unwrap().split_once('=').unwrap();
                tags.insert(k.to_string(), v.to_string());
            }
        }
        Ok(Self::ok(String::new()))
    }
}

impl CommandRunner for FakeTools {
    fn run(&self, program: &str, args: &[String]) -> io::Result<CommandOutput> {
        let index = {
            let mut calls = self.calls.lock().unwrap();
            calls.push((program.to_string(), args.to_vec()));
            calls.len() - 1
        };
        if *self.fail_call.lock().unwrap() == Some(index) {
            if program == "ffmpeg" {
                // Leave a partial output behind, like an interrupted conversion would.
                fs::write(args.last().unwrap(), b"partial")?;
            }
            return Ok(CommandOutput { success: false, code: Some(1), stdout: String::new(), stderr: format!("{program} exploded") });
        }
        match program {
            "metaflac" => self.metaflac(args),
            "ffprobe" => self.ffprobe(args),
            "ffmpeg" => self.ffmpeg(args),
            other => panic!("unexpected program {other}"),
        }
    }
}

/// A release document in the catalog's JSON shape. `media` lists, per medium, the (track id, title)
/// pairs in order.
pub fn release_json(id: &str, title: &str, date: &str, artist: &str, media: &[&[(&str, &str)]]) -> String {
    let media: Vec<serde_json::Value> = media
        .iter()
        .enumerate()
        .map(|(mi, tracks)| {
            let tracks: Vec<serde_json::Value> = tracks
                .iter()
                .enumerate()
                .map(|(ti, (tid, ttitle))| {
                    serde_json::json!({
                        "id": tid,
                        "number": (ti + 1).to_string(),
                        "position": ti + 1,
                        "title": ttitle,
                        "artist-credit": [{ "name": artist, "joinphrase": "", "artist": { "id": "a-1", "name": artist } }],
                        "recording": { "id": format!("rec-{tid}"), "title": ttitle, "isrcs": [] },
                    })
                })
                .collect();
            serde_json::json!({ "position": mi + 1, "format": "CD", "tracks": tracks })
        })
        .collect();
    serde_json::json!({
        "id": id,
        "title": title,
        "date": date,
        "status": "Official",
        "artist-credit": [{ "name": artist, "joinphrase": "", "artist": { "id": "a-1", "name": artist } }],
        "release-group": { "id": "rg-1", "first-release-date": date, "primary-type": "Album" },
        "media": media,
    })
    .to_string()
}
