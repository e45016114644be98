//! Watering scale results cached until local midnight
//!
//! A scale computed for a site stays valid for the rest of that site's local
//! day, so repeated controller polls reuse the first result.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::data::{AdjustmentOptions, GeoCoordinates, Pws};
use crate::timezone::{next_local_midnight, timezone_for};

/// Snapshot of a computed scale
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedScale {
    pub scale: Option<i32>,
    pub raw_data: Value,
    pub rain_delay: Option<u32>,
    pub scales: Option<Vec<i32>>,
}

#[derive(Debug)]
struct Entry {
    scale: CachedScale,
    expires_at: DateTime<Utc>,
}

/// Keyed store of computed scales
#[derive(Debug, Default)]
pub struct WateringScaleCache {
    entries: RwLock<HashMap<String, Entry>>,
}

/// Builds the cache key for one calculation
///
/// Format: `method#lat,lon#pws#options`, with options in canonical key order.
pub fn fingerprint(
    method_id: u8,
    coordinates: GeoCoordinates,
    pws: Option<&Pws>,
    options: &AdjustmentOptions,
) -> String {
    format!(
        "{}#{}#{}#{}",
        method_id,
        coordinates,
        pws.map(Pws::id_or_empty).unwrap_or(""),
        options.canonical_json()
    )
}

impl WateringScaleCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a scale until the next local midnight at the coordinates
    ///
    /// If a live entry already exists for the same fingerprint it is kept.
    pub fn store_watering_scale(
        &self,
        method_id: u8,
        coordinates: GeoCoordinates,
        pws: Option<&Pws>,
        options: &AdjustmentOptions,
        scale: CachedScale,
    ) {
        self.store_at(method_id, coordinates, pws, options, scale, Utc::now());
    }

    /// Looks up a live scale for the calculation, if one was stored today
    pub fn get_watering_scale(
        &self,
        method_id: u8,
        coordinates: GeoCoordinates,
        pws: Option<&Pws>,
        options: &AdjustmentOptions,
    ) -> Option<CachedScale> {
        self.get_at(method_id, coordinates, pws, options, Utc::now())
    }

    pub fn store_at(
        &self,
        method_id: u8,
        coordinates: GeoCoordinates,
        pws: Option<&Pws>,
        options: &AdjustmentOptions,
        scale: CachedScale,
        now: DateTime<Utc>,
    ) {
        let key = fingerprint(method_id, coordinates, pws, options);
        let expires_at = next_local_midnight(timezone_for(coordinates), now);

        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.retain(|_, entry| entry.expires_at > now);
        if entries.contains_key(&key) {
            tracing::debug!(key = %key, "scale already cached, keeping first result");
            return;
        }
        tracing::debug!(key = %key, %expires_at, "caching watering scale");
        entries.insert(key, Entry { scale, expires_at });
    }

    pub fn get_at(
        &self,
        method_id: u8,
        coordinates: GeoCoordinates,
        pws: Option<&Pws>,
        options: &AdjustmentOptions,
        now: DateTime<Utc>,
    ) -> Option<CachedScale> {
        let key = fingerprint(method_id, coordinates, pws, options);
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries
            .get(&key)
            .filter(|entry| entry.expires_at > now)
            .map(|entry| entry.scale.clone())
    }

    /// Number of entries held, including any not yet pruned
    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
