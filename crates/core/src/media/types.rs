//! Types describing the media being searched for.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::media_id::get_media_id;
use super::titles::title_variants;

/// Kind of media a query targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaType {
    Movie,
    Tv,
}

impl MediaType {
    /// Returns the string representation used in cache keys.
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaType::Movie => "movie",
            MediaType::Tv => "tv",
        }
    }
}

/// Parsed title information used to build a media identifier.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaInfo {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<u16>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub seasons: Vec<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub episode_numbers: Vec<u32>,
}

impl MediaInfo {
    /// Movie info with an optional release year.
    pub fn movie(title: impl Into<String>, year: Option<u16>) -> Self {
        Self {
            title: title.into(),
            year,
            ..Default::default()
        }
    }

    /// Show info for the given seasons and episodes.
    pub fn show(title: impl Into<String>, seasons: Vec<u32>, episode_numbers: Vec<u32>) -> Self {
        Self {
            title: title.into(),
            year: None,
            seasons,
            episode_numbers,
        }
    }
}

/// Title metadata as returned by a metadata provider (TMDB, MDBList, ...).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TitleMetadata {
    /// Display title.
    pub title: String,
    /// Title in the original language, if different.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_title: Option<String>,
    /// Alternative or localized title.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alternative_title: Option<String>,
    /// Release year (movies) or first-air year (shows).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<u16>,
    /// Air/release date as `YYYY-MM-DD`, passed through to source adapters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub air_date: Option<String>,
}

/// A fully prepared search request for the aggregator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaQuery {
    /// Stable identity of the media (e.g. an IMDb id), used in store keys.
    pub identity: String,
    /// Title variants in order of preference. Never empty.
    pub titles: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub air_date: Option<String>,
    /// Season for show queries; `None` means a movie query.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub season: Option<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub episode_numbers: Vec<u32>,
}

impl MediaQuery {
    /// Build a movie query from title metadata.
    pub fn movie(identity: impl Into<String>, meta: &TitleMetadata) -> Result<Self, MediaError> {
        let titles = title_variants(meta);
        if titles.is_empty() {
            return Err(MediaError::NoTitle);
        }
        Ok(Self {
            identity: identity.into(),
            titles,
            year: meta.year,
            air_date: meta.air_date.clone(),
            season: None,
            episode_numbers: Vec::new(),
        })
    }

    /// Build a show query for one season (optionally narrowed to episodes).
    pub fn show(
        identity: impl Into<String>,
        meta: &TitleMetadata,
        season: u32,
        episode_numbers: Vec<u32>,
    ) -> Result<Self, MediaError> {
        let titles = title_variants(meta);
        if titles.is_empty() {
            return Err(MediaError::NoTitle);
        }
        let mut episode_numbers = episode_numbers;
        episode_numbers.sort_unstable();
        episode_numbers.dedup();
        Ok(Self {
            identity: identity.into(),
            titles,
            year: meta.year,
            air_date: meta.air_date.clone(),
            season: Some(season),
            episode_numbers,
        })
    }

    /// Fails unless this query targets `expected`.
    pub fn expect_media_type(&self, expected: MediaType) -> Result<(), MediaError> {
        let found = self.media_type();
        if found == expected {
            Ok(())
        } else {
            Err(MediaError::WrongMediaType { expected, found })
        }
    }

    pub fn media_type(&self) -> MediaType {
        if self.season.is_some() {
            MediaType::Tv
        } else {
            MediaType::Movie
        }
    }

    /// The most preferred title; the one results are matched against first.
    pub fn primary_title(&self) -> &str {
        // Constructors guarantee at least one title.
        self.titles.first().map(String::as_str).unwrap_or_default()
    }

    /// Media info for the primary title, suitable for [`get_media_id`].
    pub fn media_info(&self) -> MediaInfo {
        match self.season {
            Some(season) => MediaInfo::show(
                self.primary_title(),
                vec![season],
                self.episode_numbers.clone(),
            ),
            None => MediaInfo::movie(self.primary_title(), self.year),
        }
    }

    /// Canonical lowercase media identifier for this query.
    pub fn media_id(&self) -> String {
        get_media_id(&self.media_info(), self.media_type())
    }
}

/// Errors building media queries.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MediaError {
    #[error("Media query needs at least one non-empty title")]
    NoTitle,

    #[error("Expected a {} query, got a {} query", expected.as_str(), found.as_str())]
    WrongMediaType {
        expected: MediaType,
        found: MediaType,
    },
}
