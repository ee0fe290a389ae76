//! Debrid providers.
//!
//! This module provides a `ProviderGateway` trait with Real-Debrid and
//! AllDebrid clients, the `AvailabilityResolver` that annotates search results
//! with instant availability, and the `DownloadsCache` that mirrors a
//! provider library locally.

mod all_debrid;
mod availability;
mod lifecycle;
mod real_debrid;
pub mod selectable;
mod types;

pub use all_debrid::AllDebridClient;
pub use availability::{
    apply, apply_batches, candidate_hashes, reset_flags, AvailabilityBatch, AvailabilityResolver,
    HashAvailability,
};
pub use lifecycle::{DownloadsCache, SelectionOutcome};
pub use real_debrid::{RealDebridClient, RealDebridDownload};
pub use types::*;
