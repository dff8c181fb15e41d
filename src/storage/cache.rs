use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use super::{CACHE_KEY, KeyValueStore, StoreError};
use crate::domain::{Category, PullRequest, UserId};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedCategoryData {
    pub prs: Vec<PullRequest>,
    #[serde(rename = "fetchedAt", with = "chrono::serde::ts_milliseconds")]
    pub fetched_at: DateTime<Utc>,
}

/// Last fetched pull requests per account and category, stored as one blob:
/// `{ "<account id>": { "<category id>": { prs, fetchedAt } } }`.
#[derive(Clone)]
pub struct PrCache {
    kv: Arc<dyn KeyValueStore>,
}

impl PrCache {
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self { kv }
    }

    pub fn get_cached_prs(&self, account_id: UserId, category: Category) -> Option<CachedCategoryData> {
        let blob = self.read_blob();
        let entry = blob.get(&account_id.to_string())?.get(category.id())?;
        match CachedCategoryData::deserialize(entry) {
            Ok(data) => Some(data),
            Err(err) => {
                warn!(account_id, %category, error = %err, "ignoring malformed cache entry");
                None
            }
        }
    }

    pub fn set_cached_prs(
        &self,
        account_id: UserId,
        category: Category,
        prs: Vec<PullRequest>,
    ) -> Result<(), StoreError> {
        self.set_cached_prs_at(account_id, category, prs, Utc::now())
    }

    /// Rewrites one leaf of the shared blob; other accounts and categories
    /// are carried over as stored.
    pub(crate) fn set_cached_prs_at(
        &self,
        account_id: UserId,
        category: Category,
        prs: Vec<PullRequest>,
        fetched_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut blob = self.try_read_blob()?;
        let count = prs.len();
        let entry = serde_json::to_value(CachedCategoryData { prs, fetched_at })?;

        let account = blob
            .entry(account_id.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !account.is_object() {
            *account = Value::Object(Map::new());
        }
        if let Value::Object(categories) = account {
            categories.insert(category.id().to_owned(), entry);
        }

        debug!(account_id, %category, count, "caching pull requests");
        self.kv.set(CACHE_KEY, &Value::Object(blob))
    }

    pub fn clear_user_cache(&self, account_id: UserId) -> Result<(), StoreError> {
        let mut blob = self.try_read_blob()?;
        if blob.remove(&account_id.to_string()).is_none() {
            return Ok(());
        }
        self.kv.set(CACHE_KEY, &Value::Object(blob))
    }

    fn read_blob(&self) -> Map<String, Value> {
        self.try_read_blob().unwrap_or_else(|err| {
            warn!(error = %err, "failed to read cache; starting empty");
            Map::new()
        })
    }

    /// Read side of every mutation; a failed read must abort the write.
    fn try_read_blob(&self) -> Result<Map<String, Value>, StoreError> {
        match self.kv.get(CACHE_KEY)? {
            Some(Value::Object(map)) => Ok(map),
            Some(_) => {
                warn!("stored cache is not an object; starting empty");
                Ok(Map::new())
            }
            None => Ok(Map::new()),
        }
    }
}

pub fn is_cache_expired(fetched_at: DateTime<Utc>, interval_minutes: u32) -> bool {
    is_cache_expired_at(fetched_at, interval_minutes, Utc::now())
}

/// Expired once `interval_minutes` have fully elapsed; the boundary counts as
/// expired.
pub fn is_cache_expired_at(
    fetched_at: DateTime<Utc>,
    interval_minutes: u32,
    now: DateTime<Utc>,
) -> bool {
    now - fetched_at >= TimeDelta::minutes(i64::from(interval_minutes))
}
