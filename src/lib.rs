//! Watering scale calculation
//!
//! Derives how much an irrigation controller should scale its programmed run
//! times from recent weather. The pieces, from the bottom up:
//!
//! - [`eto`]: FAO-56 reference evapotranspiration
//! - [`providers`]: weather sources, a fallback chain and per-site caching
//! - [`adjustment`]: the Manual, Zimmerman, rain delay and ETo scaling methods
//! - [`baseline`]: climatological ETo from a packed raster
//! - [`cache`]: single-flight memoization, the daily scale cache and a disk cache
//! - [`service`]: the request pipeline tying these together

pub mod adjustment;
pub mod baseline;
pub mod cache;
pub mod cli;
pub mod config;
pub mod data;
pub mod error;
pub mod eto;
pub mod geocoder;
pub mod providers;
pub mod service;
pub mod timezone;
