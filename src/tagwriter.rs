//! The tagwriter module applies a change set to a file through an external tool, one adapter per
//! container family.
//!
//! FLAC files are edited in place with `metaflac`: every changed key is removed and then set again,
//! two invocations per key. A failure stops the file where it is; earlier keys stay written.
//!
//! MP3 files are rewritten by `ffmpeg` in a single pass that copies the audio stream and overwrites
//! only the changed metadata, into a temporary sibling that then replaces the original by rename.
//! Current MP3 tags are read back with `ffprobe`, so both sides of the diff see the same field names.
use crate::audiotags::{audio_format, read_vorbis_tags, AudioFormat};
use crate::config::ToolsConfig;
use crate::error::{AutotagExpectedError, Result};
use crate::filetags::FileTags;
use crate::tagdiff::{diff, DesiredTags, TagChangeSet, TagMap};
use crate::tools::CommandRunner;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WriteOutcome {
    pub unchanged: bool,
    pub tags_written: usize,
}

impl WriteOutcome {
    pub fn unchanged() -> Self {
        Self { unchanged: true, tags_written: 0 }
    }
}

pub trait FormatAdapter {
    /// Current tags, keyed by upper-cased field name.
    fn read_existing(&self, p: &Path) -> Result<TagMap>;
    /// Write `changes` and return how many tags were written. `desired` supplies companion values
    /// for composite fields (a changed track number still needs the track total).
    fn apply(&self, p: &Path, changes: &TagChangeSet, desired: &DesiredTags) -> Result<usize>;
}

fn write_error(p: &Path, reason: impl Into<String>) -> AutotagExpectedError {
    AutotagExpectedError::TagWrite { path: p.to_path_buf(), reason: reason.into() }
}

pub struct VorbisAdapter {
    runner: Arc<dyn CommandRunner>,
    metaflac: String,
}

impl VorbisAdapter {
    pub fn new(runner: Arc<dyn CommandRunner>, metaflac: &str) -> Self {
        Self { runner, metaflac: metaflac.to_string() }
    }

    fn metaflac(&self, p: &Path, arg: String) -> Result<()> {
        let args = vec![arg, p.to_string_lossy().into_owned()];
        let out = self.runner.run(&self.metaflac, &args).map_err(|e| write_error(p, format!("failed to run {}: {e}", self.metaflac)))?;
        if !out.success {
            return Err(write_error(p, out.failure_reason(&self.metaflac)).into());
        }
        Ok(())
    }
}

impl FormatAdapter for VorbisAdapter {
    fn read_existing(&self, p: &Path) -> Result<TagMap> {
        read_vorbis_tags(p)
    }

    fn apply(&self, p: &Path, changes: &TagChangeSet, _desired: &DesiredTags) -> Result<usize> {
        let mut written = 0;
        for (key, value) in changes {
            self.metaflac(p, format!("--remove-tag={key}"))?;
            self.metaflac(p, format!("--set-tag={key}={value}"))?;
            debug!(path = %p.display(), key, value, "wrote vorbis comment");
            written += 1;
        }
        Ok(written)
    }
}

/// ffprobe format-tag names (lower-cased) and the tag key each one reports.
static PROBE_KEYS: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("artist", "ARTIST"),
        ("album_artist", "ALBUMARTIST"),
        ("genre", "GENRE"),
        ("date", "DATE"),
        ("tdrc", "DATE"),
        ("year", "YEAR"),
        ("tyer", "YEAR"),
        ("originaldate", "ORIGINALDATE"),
        ("tdor", "ORIGINALDATE"),
        ("tory", "ORIGINALYEAR"),
        ("originalyear", "ORIGINALYEAR"),
        ("original_year", "ORIGINALYEAR"),
        ("album", "ALBUM"),
        ("title", "TITLE"),
        ("isrc", "ISRC"),
        ("tsrc", "ISRC"),
        ("tracktotal", "TRACKTOTAL"),
        ("totaltracks", "TRACKTOTAL"),
        ("disctotal", "DISCTOTAL"),
        ("totaldiscs", "DISCTOTAL"),
    ])
});

/// Plain one-to-one fields and the converter's metadata name for each.
const FRAME_SIMPLE_FIELDS: &[(&str, &str)] = &[
    ("ARTIST", "artist"),
    ("ALBUMARTIST", "album_artist"),
    ("GENRE", "genre"),
    ("DATE", "date"),
    ("YEAR", "year"),
    ("ORIGINALDATE", "originaldate"),
    ("ALBUM", "album"),
    ("TITLE", "title"),
];

static NUMBER_TOTAL_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*([^/]*?)\s*(?:/\s*([^/]*?)\s*)?$").unwrap());

/// Split an ID3 `N/M` value into number and optional total.
pub fn split_number_total(s: &str) -> (String, Option<String>) {
    match NUMBER_TOTAL_REGEX.captures(s) {
        Some(caps) => {
            let number = caps.get(1).map(|m| m.as_str().to_string()).unwrap_or_default();
            let total = caps.get(2).map(|m| m.as_str().to_string()).filter(|t| !t.is_empty());
            (number, total)
        }
        None => (s.trim().to_string(), None),
    }
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    format: ProbeFormat,
}

#[derive(Debug, Default, Deserialize)]
struct ProbeFormat {
    #[serde(default)]
    tags: BTreeMap<String, String>,
}

/// Convert the format tags reported by ffprobe into the diff engine's key space.
pub fn probe_tags_to_map(tags: &BTreeMap<String, String>) -> TagMap {
    let mut out = TagMap::new();
    for (k, v) in tags {
        let k = k.trim().to_lowercase();
        let k = k.strip_prefix("txxx:").unwrap_or(&k);
        match k {
            "track" | "disc" => {
                let (number, total) = split_number_total(v);
                let (nk, tk) = if k == "track" { ("TRACKNUMBER", "TRACKTOTAL") } else { ("DISCNUMBER", "DISCTOTAL") };
                if !number.is_empty() {
                    out.entry(nk.to_string()).or_default().push(number);
                }
                if let Some(total) = total {
                    out.entry(tk.to_string()).or_default().push(total);
                }
            }
            other => {
                if let Some(key) = PROBE_KEYS.get(other) {
                    out.entry(key.to_string()).or_default().push(v.clone());
                }
            }
        }
    }
    out
}

pub struct FrameAdapter {
    runner: Arc<dyn CommandRunner>,
    ffmpeg: String,
    ffprobe: String,
}

impl FrameAdapter {
    pub fn new(runner: Arc<dyn CommandRunner>, ffmpeg: &str, ffprobe: &str) -> Self {
        Self {
            runner,
            ffmpeg: ffmpeg.to_string(),
            ffprobe: ffprobe.to_string(),
        }
    }

    pub fn temp_path(p: &Path) -> PathBuf {
        let mut s = p.as_os_str().to_os_string();
        s.push(".temp.mp3");
        PathBuf::from(s)
    }

    /// Build the converter's `-metadata` arguments for a change set, and count the tags they write.
    pub fn metadata_args(changes: &TagChangeSet, desired: &DesiredTags) -> (Vec<String>, usize) {
        fn push(args: &mut Vec<String>, k: &str, v: &str) {
            args.push("-metadata".to_string());
            args.push(format!("{k}={v}"));
        }

        let mut args = Vec::new();
        let mut count = 0;

        for (key, name) in FRAME_SIMPLE_FIELDS {
            if let Some(v) = changes.get(*key) {
                push(&mut args, name, v);
                count += 1;
            }
        }
        if let Some(v) = changes.get("ORIGINALYEAR") {
            push(&mut args, "TORY", v);
            push(&mut args, "ORIGINALYEAR", v);
            count += 1;
        }
        for (field, nk, tk) in [("track", "TRACKNUMBER", "TRACKTOTAL"), ("disc", "DISCNUMBER", "DISCTOTAL")] {
            let number_changed = changes.contains_key(nk);
            let total_changed = changes.contains_key(tk);
            if !number_changed && !total_changed {
                continue;
            }
            let number = desired.get(nk).map(|s| s.trim()).unwrap_or_default();
            let total = desired.get(tk).map(|s| s.trim()).unwrap_or_default();
            if !number.is_empty() {
                let composite = if total.is_empty() { number.to_string() } else { format!("{number}/{total}") };
                push(&mut args, field, &composite);
            }
            if total_changed {
                push(&mut args, tk, total);
            }
            count += usize::from(number_changed) + usize::from(total_changed);
        }
        if let Some(v) = changes.get("ISRC") {
            push(&mut args, "TSRC", v);
            push(&mut args, "ISRC", v);
            count += 1;
        }
        (args, count)
    }
}

fn remove_if_exists(p: &Path) {
    match fs::remove_file(p) {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => warn!(path = %p.display(), "failed to remove temporary file: {e}"),
    }
}

impl FormatAdapter for FrameAdapter {
    fn read_existing(&self, p: &Path) -> Result<TagMap> {
        let args: Vec<String> = ["-v", "quiet", "-print_format", "json", "-show_format"]
            .iter()
            .map(|s| s.to_string())
            .chain(std::iter::once(p.to_string_lossy().into_owned()))
            .collect();
        let read_error = |reason: String| AutotagExpectedError::TagRead { path: p.to_path_buf(), reason };
        let out = self.runner.run(&self.ffprobe, &args).map_err(|e| read_error(format!("failed to run {}: {e}", self.ffprobe)))?;
        if !out.success {
            return Err(read_error(out.failure_reason(&self.ffprobe)).into());
        }
        let probe: ProbeOutput = serde_json::from_str(&out.stdout).map_err(|e| read_error(format!("unparseable {} output: {e}", self.ffprobe)))?;
        Ok(probe_tags_to_map(&probe.format.tags))
    }

    fn apply(&self, p: &Path, changes: &TagChangeSet, desired: &DesiredTags) -> Result<usize> {
        let (metadata, count) = Self::metadata_args(changes, desired);
        if count == 0 {
            return Ok(0);
        }

        let temp = Self::temp_path(p);
        let mut args: Vec<String> = vec!["-i".to_string(), p.to_string_lossy().into_owned()];
        args.extend(
            ["-y", "-map_metadata", "0", "-codec", "copy", "-write_id3v1", "1", "-id3v2_version", "4"]
                .iter()
                .map(|s| s.to_string()),
        );
        args.extend(metadata);
        args.push(temp.to_string_lossy().into_owned());

        let out = match self.runner.run(&self.ffmpeg, &args) {
            Ok(out) => out,
            Err(e) => {
                remove_if_exists(&temp);
                return Err(write_error(p, format!("failed to run {}: {e}", self.ffmpeg)).into());
            }
        };
        if !out.success {
            remove_if_exists(&temp);
            return Err(write_error(p, out.failure_reason(&self.ffmpeg)).into());
        }
        if let Err(e) = fs::rename(&temp, p) {
            remove_if_exists(&temp);
            return Err(write_error(p, format!("failed to replace original with {}: {e}", temp.display())).into());
        }
        Ok(count)
    }
}

pub struct TagWriter {
    vorbis: VorbisAdapter,
    frame: FrameAdapter,
}

impl TagWriter {
    pub fn new(runner: Arc<dyn CommandRunner>, tools: &ToolsConfig) -> Self {
        Self {
            vorbis: VorbisAdapter::new(Arc::clone(&runner), &tools.metaflac),
            frame: FrameAdapter::new(runner, &tools.ffmpeg, &tools.ffprobe),
        }
    }

    pub fn adapter(&self, format: AudioFormat) -> &dyn FormatAdapter {
        match format {
            AudioFormat::Vorbis => &self.vorbis,
            AudioFormat::Frame => &self.frame,
        }
    }

    /// Apply a change set. An empty change set touches nothing.
    pub fn write(&self, p: &Path, changes: &TagChangeSet, desired: &DesiredTags) -> Result<WriteOutcome> {
        if changes.is_empty() {
            return Ok(WriteOutcome::unchanged());
        }
        let format = audio_format(p)?;
        let tags_written = self.adapter(format).apply(p, changes, desired)?;
        if tags_written > 0 {
            info!(path = %p.display(), tags_written, keys = ?changes.keys().collect::<Vec<_>>(), "updated tags");
        }
        Ok(WriteOutcome { unchanged: tags_written == 0, tags_written })
    }

    /// Read the file's current tags, diff them against `tags`, and write what differs.
    pub fn sync(&self, p: &Path, tags: &FileTags) -> Result<WriteOutcome> {
        let format = audio_format(p)?;
        let desired = tags.desired(format);
        let existing = self.adapter(format).read_existing(p)?;
        let changes = diff(&existing, &desired);
        debug!(path = %p.display(), changed = changes.len(), desired = desired.len(), "computed tag diff");
        self.write(p, &changes, &desired)
    }
}
