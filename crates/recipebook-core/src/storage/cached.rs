use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use super::LocalStorage;

/// Consider cached data stale after 1 hour.
const CACHE_STALE_MINUTES: i64 = 60;

/// A value saved to local storage together with when it was fetched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedData<T> {
    pub data: T,
    pub cached_at: DateTime<Utc>,
}

impl<T> CachedData<T> {
    pub fn new(data: T) -> Self {
        Self {
            data,
            cached_at: Utc::now(),
        }
    }

    pub fn age_minutes(&self) -> i64 {
        (Utc::now() - self.cached_at).num_minutes()
    }

    pub fn age_display(&self) -> String {
        let minutes = self.age_minutes();
        if minutes < 1 {
            // Also covers clock skew
            "just now".to_string()
        } else if minutes < 60 {
            format!("{}m ago", minutes)
        } else if minutes < 1440 {
            format!("{}h ago", minutes / 60)
        } else {
            format!("{}d ago", minutes / 1440)
        }
    }

    pub fn is_stale(&self) -> bool {
        self.age_minutes() > CACHE_STALE_MINUTES
    }
}

impl<T: DeserializeOwned> CachedData<T> {
    pub fn load(storage: &dyn LocalStorage, key: &str) -> Result<Option<Self>> {
        let Some(contents) = storage.get_item(key)? else {
            return Ok(None);
        };
        let cached = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse cached item: {}", key))?;
        Ok(Some(cached))
    }
}

impl<T: Serialize> CachedData<T> {
    pub fn save(&self, storage: &dyn LocalStorage, key: &str) -> Result<()> {
        let contents = serde_json::to_string_pretty(self)?;
        storage.set_item(key, &contents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;
    use chrono::Duration;

    #[test]
    fn test_cached_data_age_display() {
        let mut cached = CachedData::new(vec![1, 2, 3]);
        assert_eq!(cached.age_display(), "just now");

        cached.cached_at = Utc::now() - Duration::minutes(5);
        assert_eq!(cached.age_display(), "5m ago");

        cached.cached_at = Utc::now() - Duration::minutes(150);
        assert_eq!(cached.age_display(), "2h ago");

        cached.cached_at = Utc::now() - Duration::days(3);
        assert_eq!(cached.age_display(), "3d ago");
    }

    #[test]
    fn test_cached_data_is_stale() {
        let fresh = CachedData::new(vec![1]);
        assert!(!fresh.is_stale());

        let mut old = CachedData::new(vec![1]);
        old.cached_at = Utc::now() - Duration::minutes(61);
        assert!(old.is_stale());
    }

    #[test]
    fn test_save_and_load_through_storage() {
        let storage = MemoryStorage::new();
        assert!(CachedData::<Vec<String>>::load(&storage, "recipes").unwrap().is_none());

        CachedData::new(vec!["Pancakes".to_string()]).save(&storage, "recipes").unwrap();
        let loaded = CachedData::<Vec<String>>::load(&storage, "recipes").unwrap().unwrap();
        assert_eq!(loaded.data, vec!["Pancakes".to_string()]);
    }
}
