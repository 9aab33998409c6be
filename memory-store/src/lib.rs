use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use cache_sessions_core::cache::{self, HashFields, SessionCache};
use time::{Duration, OffsetDateTime};
use tokio::sync::Mutex;

const WRONG_TYPE: &str = "WRONGTYPE Operation against a key holding the wrong kind of value";
const NO_SUCH_KEY: &str = "ERR no such key";

#[derive(Debug, Clone)]
enum Value {
    Hash(HashFields),
    Scalar(String),
}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at: Option<OffsetDateTime>,
}

impl Entry {
    fn is_live(&self, now: OffsetDateTime) -> bool {
        self.expires_at.map_or(true, |expires_at| expires_at > now)
    }
}

/// A cache that lives only in memory, with Redis-like hashes, renames and
/// per-key TTLs.
///
/// An expired key is dropped when next accessed, and every write that may
/// create a key sweeps all expired keys, so abandoned sessions do not pile up.
/// This is useful for testing and single-process deployments, but sessions do
/// not survive a restart.
///
/// # Examples
///
/// ```rust
/// use cache_sessions_memory_store::MemoryCache;
/// MemoryCache::default();
/// ```
#[derive(Clone, Debug, Default)]
pub struct MemoryCache(Arc<Mutex<HashMap<String, Entry>>>);

fn wrong_type() -> cache::Error {
    cache::Error::Backend(WRONG_TYPE.to_owned())
}

fn purge_expired(entries: &mut HashMap<String, Entry>, key: &str, now: OffsetDateTime) {
    if entries.get(key).is_some_and(|entry| !entry.is_live(now)) {
        entries.remove(key);
    }
}

fn sweep_expired(entries: &mut HashMap<String, Entry>, now: OffsetDateTime) {
    entries.retain(|_, entry| entry.is_live(now));
}

#[async_trait]
impl SessionCache for MemoryCache {
    async fn hash_get_all(&self, key: &str) -> cache::Result<HashFields> {
        let mut entries = self.0.lock().await;
        purge_expired(&mut entries, key, OffsetDateTime::now_utc());

        match entries.get(key).map(|entry| &entry.value) {
            None => Ok(HashFields::new()),
            Some(Value::Hash(fields)) => Ok(fields.clone()),
            Some(Value::Scalar(_)) => Err(wrong_type()),
        }
    }

    async fn hash_set_many(&self, key: &str, fields: HashFields) -> cache::Result<()> {
        let mut entries = self.0.lock().await;
        sweep_expired(&mut entries, OffsetDateTime::now_utc());

        let entry = entries.entry(key.to_owned()).or_insert_with(|| Entry {
            value: Value::Hash(HashFields::new()),
            expires_at: None,
        });
        match &mut entry.value {
            Value::Hash(existing) => {
                existing.extend(fields);
                Ok(())
            }
            Value::Scalar(_) => Err(wrong_type()),
        }
    }

    async fn hash_delete_field(&self, key: &str, field: &str) -> cache::Result<()> {
        let mut entries = self.0.lock().await;
        purge_expired(&mut entries, key, OffsetDateTime::now_utc());

        let now_empty = match entries.get_mut(key).map(|entry| &mut entry.value) {
            None => return Ok(()),
            Some(Value::Hash(fields)) => {
                fields.remove(field);
                fields.is_empty()
            }
            Some(Value::Scalar(_)) => return Err(wrong_type()),
        };
        // An emptied hash ceases to exist.
        if now_empty {
            entries.remove(key);
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> cache::Result<()> {
        self.0.lock().await.remove(key);
        Ok(())
    }

    async fn rename(&self, old_key: &str, new_key: &str) -> cache::Result<()> {
        let mut entries = self.0.lock().await;
        purge_expired(&mut entries, old_key, OffsetDateTime::now_utc());

        let entry = entries
            .remove(old_key)
            .ok_or_else(|| cache::Error::Backend(NO_SUCH_KEY.to_owned()))?;
        entries.insert(new_key.to_owned(), entry);
        Ok(())
    }

    async fn rename_if_absent(&self, old_key: &str, new_key: &str) -> cache::Result<bool> {
        let mut entries = self.0.lock().await;
        let now = OffsetDateTime::now_utc();
        purge_expired(&mut entries, old_key, now);
        purge_expired(&mut entries, new_key, now);

        if !entries.contains_key(old_key) {
            return Err(cache::Error::Backend(NO_SUCH_KEY.to_owned()));
        }
        if old_key == new_key || entries.contains_key(new_key) {
            return Ok(false);
        }
        if let Some(entry) = entries.remove(old_key) {
            entries.insert(new_key.to_owned(), entry);
        }
        Ok(true)
    }

    async fn exists(&self, key: &str) -> cache::Result<bool> {
        let mut entries = self.0.lock().await;
        purge_expired(&mut entries, key, OffsetDateTime::now_utc());
        Ok(entries.contains_key(key))
    }

    async fn ttl_seconds(&self, key: &str) -> cache::Result<i64> {
        let mut entries = self.0.lock().await;
        let now = OffsetDateTime::now_utc();
        purge_expired(&mut entries, key, now);

        Ok(match entries.get(key) {
            None => -2,
            Some(Entry {
                expires_at: None, ..
            }) => -1,
            // Rounded to the nearest second, like Redis.
            Some(Entry {
                expires_at: Some(expires_at),
                ..
            }) => ((*expires_at - now).whole_milliseconds() as i64 + 500) / 1000,
        })
    }

    async fn expire(&self, key: &str, seconds: i64) -> cache::Result<()> {
        let mut entries = self.0.lock().await;
        let now = OffsetDateTime::now_utc();
        purge_expired(&mut entries, key, now);

        if seconds <= 0 {
            entries.remove(key);
        } else if let Some(entry) = entries.get_mut(key) {
            entry.expires_at = Some(now.saturating_add(Duration::seconds(seconds)));
        }
        Ok(())
    }

    async fn touch(&self, key: &str) -> cache::Result<()> {
        let mut entries = self.0.lock().await;
        sweep_expired(&mut entries, OffsetDateTime::now_utc());

        let entry = entries.entry(key.to_owned()).or_insert_with(|| Entry {
            value: Value::Scalar(String::new()),
            expires_at: None,
        });
        match entry.value {
            Value::Scalar(_) => Ok(()),
            Value::Hash(_) => Err(wrong_type()),
        }
    }
}
