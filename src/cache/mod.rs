//! Caching layers
//!
//! * [`Cached`] deduplicates in-flight fetches of one value until it expires.
//! * [`WateringScaleCache`] remembers computed scales until local midnight.
//! * [`CacheManager`] persists JSON data to disk across restarts.

mod cached;
mod manager;
mod scale_cache;

pub use cached::{Cached, CachedResult};
pub use manager::{CacheManager, CachedData};
pub use scale_cache::{fingerprint, CachedScale, WateringScaleCache};
