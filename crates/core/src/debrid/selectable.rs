//! Which files inside a torrent are worth keeping.
//!
//! Playable files are videos and subtitles, recognised by extension. Videos
//! much smaller than the main feature (samples, extras) are left out.

use super::{AvailabilityVariant, TorrentFileEntry};

const VIDEO_EXTENSIONS: &[&str] = &[
    "3gp", "avi", "divx", "flv", "m2ts", "m4v", "mkv", "mov", "mp4", "mpeg", "mpg", "mts", "ogm",
    "ogv", "ts", "vob", "webm", "wmv", "xvid",
];

const SUBTITLE_EXTENSIONS: &[&str] = &["ass", "idx", "smi", "srt", "ssa", "sub", "sup", "vtt"];

/// Videos smaller than this share of the largest video are not selected.
pub const MIN_VIDEO_SHARE: f64 = 0.15;

fn extension(path: &str) -> Option<String> {
    let name = path.rsplit(|c: char| c == '/' || c == '\\').next().unwrap_or(path);
    let (_, ext) = name.rsplit_once('.')?;
    Some(ext.to_ascii_lowercase())
}

pub fn is_video(path: &str) -> bool {
    extension(path).is_some_and(|ext| VIDEO_EXTENSIONS.contains(&ext.as_str()))
}

pub fn is_subtitle(path: &str) -> bool {
    extension(path).is_some_and(|ext| SUBTITLE_EXTENSIONS.contains(&ext.as_str()))
}

pub fn is_video_or_subs(path: &str) -> bool {
    is_video(path) || is_subtitle(path)
}

/// Files to select: every subtitle, and videos of at least
/// [`MIN_VIDEO_SHARE`] of the largest video. File order is preserved.
pub fn selectable_files(files: &[TorrentFileEntry]) -> Vec<&TorrentFileEntry> {
    let largest = files
        .iter()
        .filter(|f| is_video(&f.path))
        .map(|f| f.bytes)
        .max()
        .unwrap_or(0);
    let threshold = largest as f64 * MIN_VIDEO_SHARE;

    files
        .iter()
        .filter(|f| is_subtitle(&f.path) || (is_video(&f.path) && f.bytes as f64 >= threshold))
        .collect()
}

/// Whether a cached variant contains anything playable.
pub fn has_playable_file(variant: &AvailabilityVariant) -> bool {
    variant.files.iter().any(|f| is_video_or_subs(&f.filename))
}
