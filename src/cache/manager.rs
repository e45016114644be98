//! Disk cache for data that should survive restarts
//!
//! Geocoding results and the local weather station's observation buffer are
//! stored as JSON files with an expiry timestamp.

use chrono::{DateTime, Duration, Utc};
use directories::ProjectDirs;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// On-disk wrapper around cached data
#[derive(Debug, Serialize, Deserialize)]
struct CacheEntry<T> {
    data: T,
    cached_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

/// Result of reading from the disk cache
#[derive(Debug)]
pub struct CachedData<T> {
    pub data: T,
    pub cached_at: DateTime<Utc>,
    /// Whether the entry is past its expiry
    pub is_expired: bool,
}

/// Reads and writes JSON cache files in one directory
///
/// The default location is the XDG cache directory (`~/.cache/wateringscale/`
/// on Linux). Expired entries are still returned, flagged with
/// `is_expired`, so callers decide whether stale data is acceptable.
#[derive(Debug, Clone)]
pub struct CacheManager {
    cache_dir: PathBuf,
}

impl CacheManager {
    /// Uses the platform cache directory
    ///
    /// Returns `None` if no home directory can be determined.
    pub fn new() -> Option<Self> {
        let project_dirs = ProjectDirs::from("", "", "wateringscale")?;
        Some(Self {
            cache_dir: project_dirs.cache_dir().to_path_buf(),
        })
    }

    pub fn with_dir(cache_dir: PathBuf) -> Self {
        Self { cache_dir }
    }

    pub fn dir(&self) -> &Path {
        &self.cache_dir
    }

    /// File path for a key; characters unsafe in file names become `_`
    fn cache_path(&self, key: &str) -> PathBuf {
        let safe: String = key
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.cache_dir.join(format!("{}.json", safe))
    }

    /// Writes data that stays fresh for `ttl`
    pub fn write<T: Serialize>(&self, key: &str, data: &T, ttl: Duration) -> std::io::Result<()> {
        self.write_until(key, data, Utc::now() + ttl)
    }

    /// Writes data that stays fresh until `expires_at`
    ///
    /// # Returns
    /// * `Ok(())` on success
    /// * `Err` if the directory cannot be created or the file cannot be written
    pub fn write_until<T: Serialize>(
        &self,
        key: &str,
        data: &T,
        expires_at: DateTime<Utc>,
    ) -> std::io::Result<()> {
        fs::create_dir_all(&self.cache_dir)?;

        let entry = CacheEntry {
            data,
            cached_at: Utc::now(),
            expires_at,
        };
        let json = serde_json::to_string_pretty(&entry)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;

        // Write then rename so readers never see a half-written file
        let path = self.cache_path(key);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json)?;
        fs::rename(tmp, path)
    }

    /// Reads an entry, returning `None` if it is missing or unreadable
    pub fn read<T: DeserializeOwned>(&self, key: &str) -> Option<CachedData<T>> {
        let content = fs::read_to_string(self.cache_path(key)).ok()?;
        let entry: CacheEntry<T> = serde_json::from_str(&content).ok()?;

        Some(CachedData {
            data: entry.data,
            cached_at: entry.cached_at,
            is_expired: Utc::now() > entry.expires_at,
        })
    }

    /// Reads an entry only if it has not expired
    pub fn read_fresh<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.read(key)
            .filter(|cached| !cached.is_expired)
            .map(|cached| cached.data)
    }

    pub fn remove(&self, key: &str) -> std::io::Result<()> {
        match fs::remove_file(self.cache_path(key)) {
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn create_test_cache() -> (CacheManager, TempDir) {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let cache = CacheManager::with_dir(temp_dir.path().to_path_buf());
        (cache, temp_dir)
    }

    #[test]
    fn test_write_then_read_fresh() {
        let (cache, _temp_dir) = create_test_cache();
        let mut locations = HashMap::new();
        locations.insert("Boston".to_string(), (42.36, -71.06));

        cache
            .write("geocoder", &locations, Duration::days(30))
            .expect("Write should succeed");

        let read: HashMap<String, (f64, f64)> =
            cache.read_fresh("geocoder").expect("Should read fresh entry");
        assert_eq!(read, locations);
    }

    #[test]
    fn test_read_returns_none_for_missing_key() {
        let (cache, _temp_dir) = create_test_cache();
        let result: Option<CachedData<u32>> = cache.read("nonexistent_key");
        assert!(result.is_none(), "Should return None for missing key");
    }

    #[test]
    fn test_expired_entry_is_flagged_and_skipped_by_read_fresh() {
        let (cache, _temp_dir) = create_test_cache();
        cache
            .write_until("old", &5u32, Utc::now() - Duration::minutes(1))
            .expect("Write should succeed");

        let stale: CachedData<u32> = cache.read("old").expect("Expired entries are still readable");
        assert!(stale.is_expired);
        assert_eq!(stale.data, 5);
        assert!(cache.read_fresh::<u32>("old").is_none());
    }

    #[test]
    fn test_keys_are_sanitized_into_file_names() {
        let (cache, temp_dir) = create_test_cache();
        cache
            .write("geo/Boston, MA", &1u8, Duration::hours(1))
            .expect("Write should succeed");

        assert!(temp_dir.path().join("geo_Boston__MA.json").exists());
        assert_eq!(cache.read_fresh::<u8>("geo/Boston, MA"), Some(1));
    }

    #[test]
    fn test_write_creates_directory_if_missing() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let nested_path = temp_dir.path().join("nested").join("cache");
        let cache = CacheManager::with_dir(nested_path.clone());

        cache.write("nested_key", &1u8, Duration::hours(1)).expect("Write should succeed");

        assert!(nested_path.join("nested_key.json").exists(), "Cache file should exist");
    }

    #[test]
    fn test_remove_is_idempotent() {
        let (cache, _temp_dir) = create_test_cache();
        cache.write("gone", &1u8, Duration::hours(1)).expect("Write should succeed");
        cache.remove("gone").expect("first remove");
        cache.remove("gone").expect("second remove");
        assert!(cache.read::<u8>("gone").is_none());
    }

    #[test]
    fn test_new_uses_project_name() {
        if let Some(cache) = CacheManager::new() {
            assert!(cache.dir().to_string_lossy().contains("wateringscale"));
        }
    }
}
