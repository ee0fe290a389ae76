//! Canonical media identifiers.
//!
//! The identifier doubles as a cache key, so its format is fixed:
//!
//! - movie: `<title> (<year>)`, or `<title>` without a year
//! - one season, one episode: `<title> -> S01E02`
//! - one season: `<title> -> S01`
//! - consecutive seasons: `<title> -> S01 to S03`
//! - anything else: `<title> -> S01, S03`
//!
//! Seasons and episodes are sorted and deduplicated before formatting, so the
//! result does not depend on the order they were parsed in.

use super::types::{MediaInfo, MediaType};

/// Formatting switches for [`format_media_id`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MediaIdStyle {
    /// Lowercase the result (system identifiers are always lowercase).
    pub lowercase: bool,
    /// For shows, emit only the title.
    pub title_only: bool,
}

impl Default for MediaIdStyle {
    fn default() -> Self {
        Self {
            lowercase: true,
            title_only: false,
        }
    }
}

/// Lowercase system identifier for a movie or show.
pub fn get_media_id(info: &MediaInfo, media_type: MediaType) -> String {
    format_media_id(info, media_type, MediaIdStyle::default())
}

/// Format a media identifier with explicit style options.
pub fn format_media_id(info: &MediaInfo, media_type: MediaType, style: MediaIdStyle) -> String {
    let title = info.title.trim();

    let id = match media_type {
        MediaType::Movie => match info.year {
            Some(year) => format!("{} ({})", title, year),
            None => title.to_string(),
        },
        MediaType::Tv if style.title_only => title.to_string(),
        MediaType::Tv => {
            let seasons = sorted_unique(&info.seasons);
            let episodes = sorted_unique(&info.episode_numbers);
            match seasons.as_slice() {
                [] => title.to_string(),
                [season] if episodes.len() == 1 => format!(
                    "{} -> {}{}",
                    title,
                    prefix('S', *season),
                    prefix('E', episodes[0])
                ),
                [season] => format!("{} -> {}", title, prefix('S', *season)),
                [first, .., last] if is_consecutive(&seasons) => format!(
                    "{} -> {} to {}",
                    title,
                    prefix('S', *first),
                    prefix('S', *last)
                ),
                _ => format!(
                    "{} -> {}",
                    title,
                    seasons
                        .iter()
                        .map(|s| prefix('S', *s))
                        .collect::<Vec<_>>()
                        .join(", ")
                ),
            }
        }
    };

    if style.lowercase {
        id.to_lowercase()
    } else {
        id
    }
}

fn prefix(marker: char, num: u32) -> String {
    format!("{}{:02}", marker, num)
}

fn sorted_unique(values: &[u32]) -> Vec<u32> {
    let mut values = values.to_vec();
    values.sort_unstable();
    values.dedup();
    values
}

/// True if every value is exactly one more than its predecessor.
fn is_consecutive(values: &[u32]) -> bool {
    values.windows(2).all(|w| w[1] == w[0] + 1)
}
