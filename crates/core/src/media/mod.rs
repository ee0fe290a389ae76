//! Title normalisation and media identifiers.
//!
//! Turns title metadata into the set of title variants the aggregator fans
//! out over, and produces the canonical identifier used as a cache key.

mod media_id;
mod titles;
mod types;

pub use media_id::{format_media_id, get_media_id, MediaIdStyle};
pub use titles::{cleaned_title, normalize_title, strip_symbols, title_variants};
pub use types::*;
