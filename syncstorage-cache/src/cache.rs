use std::fmt;

use memcache::Client;
use serde::{Deserialize, Serialize};

use crate::error::CacheError;

pub type CacheResult<T> = Result<T, CacheError>;

/// A tab's cached body, stored as a single JSON blob under `tabs:<uid>:<id>`.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct CachedTab {
    pub payload: String,
    pub sortindex: Option<i32>,
}

/// Timestamps here are server milliseconds, the same unit `SyncTimestamp`
/// uses elsewhere, kept as a plain `u64` so this crate doesn't need to
/// depend on `syncstorage-db-common` for a single newtype.
pub type Millis = u64;

fn meta_global_key(user_id: u64) -> String {
    format!("meta:global:{}", user_id)
}

fn tabs_ids_key(user_id: u64) -> String {
    format!("tabs:{}", user_id)
}

fn tab_key(user_id: u64, id: &str) -> String {
    format!("tabs:{}:{}", user_id, id)
}

fn tab_size_key(user_id: u64, id: &str) -> String {
    format!("tabs:size:{}:{}", user_id, id)
}

fn tabs_stamp_key(user_id: u64) -> String {
    format!("tabs:stamp:{}", user_id)
}

fn collection_stamp_key(user_id: u64, collection: &str) -> String {
    format!("collections:stamp:{}:{}", user_id, collection)
}

fn node_status_key(host: &str) -> String {
    format!("status:{}", host)
}

/// Node health as reported through the `status:<host>` memcache key.
///
/// Mirrors the four values §4.4 of the dispatcher's node-status check
/// recognizes: an absent key (`Unknown`) always means "assume healthy".
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum NodeStatus {
    Unknown,
    Draining,
    Down,
    Unhealthy,
    /// `backoff` or `backoff:<seconds>`; `None` means no explicit seconds
    /// were given and the caller should fall back to its own default.
    Backoff(Option<u64>),
}

impl NodeStatus {
    fn parse(raw: &str) -> Self {
        match raw {
            "draining" => NodeStatus::Draining,
            "down" => NodeStatus::Down,
            "unhealthy" => NodeStatus::Unhealthy,
            "backoff" => NodeStatus::Backoff(None),
            _ if raw.starts_with("backoff:") => {
                NodeStatus::Backoff(raw["backoff:".len()..].parse().ok())
            }
            _ => NodeStatus::Unknown,
        }
    }
}

/// The Cache Overlay described for `meta/global`, `tabs`, collection
/// last-modified stamps, and dispatcher node-status signals.
///
/// Every method here already swallows memcached-level errors into a miss
/// (empty read / dropped write) per the fault-tolerance invariant; the
/// `CacheResult` only carries a real error for local failures such as
/// malformed cached JSON.
pub trait Cache: fmt::Debug + Send + Sync {
    fn get_meta_global(&self, user_id: u64) -> CacheResult<Option<String>>;
    fn set_meta_global(&self, user_id: u64, value: &str) -> CacheResult<()>;
    fn delete_meta_global(&self, user_id: u64) -> CacheResult<()>;

    fn get_tab_ids(&self, user_id: u64) -> CacheResult<Vec<String>>;
    fn get_tab(&self, user_id: u64, id: &str) -> CacheResult<Option<CachedTab>>;
    fn set_tab(&self, user_id: u64, id: &str, tab: CachedTab, ttl: u32) -> CacheResult<()>;
    fn delete_tab(&self, user_id: u64, id: &str) -> CacheResult<()>;

    fn get_tabs_stamp(&self, user_id: u64) -> CacheResult<Option<Millis>>;
    fn set_tabs_stamp(&self, user_id: u64, stamp: Millis) -> CacheResult<()>;

    /// `(item_count, total_payload_bytes)` for quota accounting over the
    /// user's currently-live tabs.
    fn get_tabs_usage(&self, user_id: u64) -> CacheResult<(i32, usize)>;

    fn get_collection_stamp(&self, user_id: u64, collection: &str) -> CacheResult<Option<Millis>>;
    fn set_collection_stamp(&self, user_id: u64, collection: &str, stamp: Millis)
        -> CacheResult<()>;

    fn check_node_status(&self, host: &str) -> CacheResult<NodeStatus>;
}

/// Real memcached-backed `Cache`, fault-tolerant per the cache overlay
/// invariant: any network or protocol error talking to memcached is logged
/// and degrades to a miss (reads) or a dropped write, except where the
/// caller is explicitly relying on the cache as sole source of truth.
pub struct MemcachedCache {
    client: Client,
}

impl fmt::Debug for MemcachedCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemcachedCache").finish()
    }
}

impl MemcachedCache {
    pub fn new(url: &str) -> CacheResult<Self> {
        Ok(Self {
            client: Client::connect(url)?,
        })
    }

    fn get_string(&self, key: &str) -> CacheResult<Option<String>> {
        match self.client.get::<String>(key) {
            Ok(value) => Ok(value),
            Err(e) => {
                warn!("⚠️ cache miss, memcached error: {:?}", e; "key" => key);
                Ok(None)
            }
        }
    }

    fn set_string(&self, key: &str, value: &str, ttl: u32) -> CacheResult<()> {
        if let Err(e) = self.client.set(key, value, ttl) {
            warn!("⚠️ cache write dropped, memcached error: {:?}", e; "key" => key);
        }
        Ok(())
    }

    fn delete_key(&self, key: &str) -> CacheResult<()> {
        if let Err(e) = self.client.delete(key) {
            warn!("⚠️ cache delete dropped, memcached error: {:?}", e; "key" => key);
        }
        Ok(())
    }

    /// Never-expiring keys (the overlay's source of truth, e.g. tabs ids)
    /// are stored with memcached's "never expire" sentinel.
    const NEVER: u32 = 0;
}

impl Cache for MemcachedCache {
    fn get_meta_global(&self, user_id: u64) -> CacheResult<Option<String>> {
        self.get_string(&meta_global_key(user_id))
    }

    fn set_meta_global(&self, user_id: u64, value: &str) -> CacheResult<()> {
        self.set_string(&meta_global_key(user_id), value, Self::NEVER)
    }

    fn delete_meta_global(&self, user_id: u64) -> CacheResult<()> {
        self.delete_key(&meta_global_key(user_id))
    }

    fn get_tab_ids(&self, user_id: u64) -> CacheResult<Vec<String>> {
        let raw = self.get_string(&tabs_ids_key(user_id))?;
        Ok(raw
            .map(|s| serde_json::from_str(&s).unwrap_or_default())
            .unwrap_or_default())
    }

    fn get_tab(&self, user_id: u64, id: &str) -> CacheResult<Option<CachedTab>> {
        match self.get_string(&tab_key(user_id, id))? {
            Some(raw) => Ok(serde_json::from_str(&raw)?),
            None => Ok(None),
        }
    }

    fn set_tab(&self, user_id: u64, id: &str, tab: CachedTab, ttl: u32) -> CacheResult<()> {
        let size = tab.payload.len();
        let serialized_tab = serde_json::to_string(&tab)?;
        self.set_string(&tab_key(user_id, id), &serialized_tab, ttl)?;
        self.set_string(&tab_size_key(user_id, id), &size.to_string(), ttl)?;
        let mut ids = self.get_tab_ids(user_id)?;
        if !ids.iter().any(|existing| existing == id) {
            ids.push(id.to_owned());
        }
        let serialized_ids = serde_json::to_string(&ids)?;
        self.set_string(&tabs_ids_key(user_id), &serialized_ids, Self::NEVER)
    }

    fn delete_tab(&self, user_id: u64, id: &str) -> CacheResult<()> {
        self.delete_key(&tab_key(user_id, id))?;
        self.delete_key(&tab_size_key(user_id, id))?;
        let ids: Vec<String> = self
            .get_tab_ids(user_id)?
            .into_iter()
            .filter(|existing| existing != id)
            .collect();
        let serialized = serde_json::to_string(&ids)?;
        self.set_string(&tabs_ids_key(user_id), &serialized, Self::NEVER)
    }

    fn get_tabs_stamp(&self, user_id: u64) -> CacheResult<Option<Millis>> {
        Ok(self
            .get_string(&tabs_stamp_key(user_id))?
            .and_then(|s| s.parse().ok()))
    }

    fn set_tabs_stamp(&self, user_id: u64, stamp: Millis) -> CacheResult<()> {
        self.set_string(&tabs_stamp_key(user_id), &stamp.to_string(), Self::NEVER)
    }

    fn get_tabs_usage(&self, user_id: u64) -> CacheResult<(i32, usize)> {
        let ids = self.get_tab_ids(user_id)?;
        let mut total = 0usize;
        for id in &ids {
            if let Some(size) = self
                .get_string(&tab_size_key(user_id, id))?
                .and_then(|s| s.parse::<usize>().ok())
            {
                total += size;
            }
        }
        Ok((ids.len() as i32, total))
    }

    fn get_collection_stamp(&self, user_id: u64, collection: &str) -> CacheResult<Option<Millis>> {
        Ok(self
            .get_string(&collection_stamp_key(user_id, collection))?
            .and_then(|s| s.parse().ok()))
    }

    fn set_collection_stamp(
        &self,
        user_id: u64,
        collection: &str,
        stamp: Millis,
    ) -> CacheResult<()> {
        self.set_string(
            &collection_stamp_key(user_id, collection),
            &stamp.to_string(),
            Self::NEVER,
        )
    }

    fn check_node_status(&self, host: &str) -> CacheResult<NodeStatus> {
        Ok(self
            .get_string(&node_status_key(host))?
            .map(|raw| NodeStatus::parse(&raw))
            .unwrap_or(NodeStatus::Unknown))
    }
}
