//! Testing utilities and mock implementations.
//!
//! This module provides mock implementations of the source adapter and
//! provider gateway traits, allowing scrape and library flows to be tested
//! without indexers or debrid accounts.
//!
//! # Example
//!
//! ```rust,ignore
//! use dmm_core::testing::{fixtures, MockGateway, MockSource};
//!
//! let source = MockSource::new("mock");
//! let gateway = MockGateway::new(ProviderKind::RealDebrid);
//!
//! // Configure mock responses
//! source.add_results("\"Example\" 2020", vec![("Example.2020.1080p", fixtures::hash(1), 1_000)]).await;
//! gateway.set_instant(&fixtures::hash(1), vec![fixtures::playable_variant()]).await;
//! ```

mod mock_gateway;
mod mock_source;

pub use mock_gateway::MockGateway;
pub use mock_source::{MockSource, RecordedQuery};

/// Test fixtures and helper functions.
pub mod fixtures {
    use crate::debrid::{AvailabilityVariant, InstantFile, TorrentFileEntry};
    use crate::media::TitleMetadata;
    use crate::scraper::{RawResult, SearchResult};

    const GB: u64 = 1024 * 1024 * 1024;

    /// A deterministic 40-character info hash.
    pub fn hash(n: u32) -> String {
        format!("{:040x}", n)
    }

    pub fn raw_result(title: &str, hash: &str, file_size: u64) -> RawResult {
        RawResult {
            title: title.to_string(),
            hash: hash.to_string(),
            file_size,
        }
    }

    /// A search result with no availability flags set.
    pub fn search_result(title: &str, hash: &str, file_size: u64) -> SearchResult {
        SearchResult {
            hash: hash.to_string(),
            title: title.to_string(),
            file_size,
            rd_available: false,
            ad_available: false,
            no_videos: false,
        }
    }

    /// Movie metadata with a year and release date.
    pub fn movie_metadata(title: &str, year: u16) -> TitleMetadata {
        TitleMetadata {
            title: title.to_string(),
            original_title: None,
            alternative_title: None,
            year: Some(year),
            air_date: Some(format!("{}-06-15", year)),
        }
    }

    /// Show metadata with only a title.
    pub fn show_metadata(title: &str) -> TitleMetadata {
        TitleMetadata {
            title: title.to_string(),
            ..Default::default()
        }
    }

    /// A main feature (id 1) and an info file (id 2).
    pub fn playable_files() -> Vec<TorrentFileEntry> {
        vec![
            TorrentFileEntry {
                id: 1,
                path: "/Movie.2020.1080p/Movie.2020.1080p.mkv".to_string(),
                bytes: 4 * GB,
                selected: false,
            },
            TorrentFileEntry {
                id: 2,
                path: "/Movie.2020.1080p/Movie.2020.1080p.nfo".to_string(),
                bytes: 2048,
                selected: false,
            },
        ]
    }

    /// Files with nothing worth selecting.
    pub fn junk_files() -> Vec<TorrentFileEntry> {
        vec![
            TorrentFileEntry {
                id: 1,
                path: "/Setup/setup.exe".to_string(),
                bytes: GB,
                selected: false,
            },
            TorrentFileEntry {
                id: 2,
                path: "/Setup/readme.txt".to_string(),
                bytes: 512,
                selected: false,
            },
        ]
    }

    /// A cached variant holding one video.
    pub fn playable_variant() -> AvailabilityVariant {
        AvailabilityVariant {
            files: vec![InstantFile {
                filename: "Movie.2020.1080p.mkv".to_string(),
                filesize: 4 * GB,
            }],
        }
    }

    /// A cached variant holding only an archive.
    pub fn archive_variant() -> AvailabilityVariant {
        AvailabilityVariant {
            files: vec![InstantFile {
                filename: "Movie.2020.1080p.rar".to_string(),
                filesize: 4 * GB,
            }],
        }
    }
}
