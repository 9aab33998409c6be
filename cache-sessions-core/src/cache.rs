//! The cache collaborator that sessions are persisted in.
//!
//! The session engine never talks to a concrete cache client. Instead it
//! relies on the handful of primitive operations described by
//! [`SessionCache`]: hash reads and writes, key deletion and renaming,
//! existence checks and per-key TTLs. Anything that can provide these, such
//! as Redis or the in-memory store, can back sessions.
//!
//! # Implementing a Custom Cache
//!
//! Every method on the [`SessionCache`] trait describes how it should behave.
//! The semantics follow Redis closely, since Redis is the reference backend:
//! a method that would fail on Redis _must_ fail here too, and a method that
//! Redis treats as a no-op _must_ be a no-op.
use std::{collections::HashMap, fmt::Debug, result, sync::Arc};

use async_trait::async_trait;
use serde_json::Value;

/// Fields of a cache hash, keyed by field name.
pub type HashFields = HashMap<String, Value>;

/// Errors raised by a cache backend.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Encoding failure.
    #[error("Encoding failed with: {0}")]
    Encode(String),

    /// Decoding failure.
    #[error("Decoding failed with: {0}")]
    Decode(String),

    /// Cache backend failure.
    #[error("{0}")]
    Backend(String),
}

/// Convenience type alias for cache results.
pub type Result<T> = result::Result<T, Error>;

/// Primitive operations a cache must offer to persist sessions.
///
/// The `Err(...)` case is reserved for hard errors: connection loss,
/// timeouts, type mismatches, codec failures. A missing key is not an error
/// for any method except [`rename`](SessionCache::rename).
#[async_trait]
pub trait SessionCache: Debug + Send + Sync + 'static {
    /// Reads every field of the hash stored at `key`.
    ///
    /// Returns an empty map when the key does not exist.
    async fn hash_get_all(&self, key: &str) -> Result<HashFields>;

    /// Writes `fields` into the hash stored at `key`, creating it if needed.
    ///
    /// Fields not named in `fields` are left untouched.
    async fn hash_set_many(&self, key: &str, fields: HashFields) -> Result<()>;

    /// Removes a single field from the hash stored at `key`.
    async fn hash_delete_field(&self, key: &str, field: &str) -> Result<()>;

    /// Deletes `key`. Deleting a missing key is not an error.
    async fn delete(&self, key: &str) -> Result<()>;

    /// Renames `old_key` to `new_key`, overwriting `new_key` if it exists.
    ///
    /// The TTL of `old_key` moves with it.
    ///
    /// # Implementations
    ///
    /// Implementations _must_ return an error when `old_key` does not exist.
    async fn rename(&self, old_key: &str, new_key: &str) -> Result<()>;

    /// Renames `old_key` to `new_key` only if `new_key` does not exist.
    ///
    /// Returns whether the rename happened. Like [`rename`](SessionCache::rename),
    /// it fails when `old_key` does not exist.
    ///
    /// # Implementations
    ///
    /// The default implementation checks [`exists`](SessionCache::exists) and
    /// then calls [`rename`](SessionCache::rename). Two concurrent callers can
    /// both see `new_key` as free, in which case the last rename wins.
    /// Backends with an atomic primitive such as Redis `RENAMENX` _should_
    /// override it.
    async fn rename_if_absent(&self, old_key: &str, new_key: &str) -> Result<bool> {
        if self.exists(new_key).await? {
            return Ok(false);
        }
        self.rename(old_key, new_key).await?;
        Ok(true)
    }

    /// Reports whether `key` exists.
    async fn exists(&self, key: &str) -> Result<bool>;

    /// Remaining time to live of `key`, in whole seconds.
    ///
    /// # Implementations
    ///
    /// Implementations _must_ return `-2` when the key does not exist and `-1`
    /// when it exists without a TTL.
    async fn ttl_seconds(&self, key: &str) -> Result<i64>;

    /// Sets the time to live of `key`, in seconds.
    ///
    /// Setting a TTL on a missing key is a no-op. A non-positive TTL deletes
    /// the key.
    async fn expire(&self, key: &str, seconds: i64) -> Result<()>;

    /// Creates `key` as an empty scalar value if it does not exist.
    ///
    /// An existing key keeps both its value and its TTL.
    async fn touch(&self, key: &str) -> Result<()>;
}

#[async_trait]
impl<C> SessionCache for Arc<C>
where
    C: SessionCache,
{
    async fn hash_get_all(&self, key: &str) -> Result<HashFields> {
        (**self).hash_get_all(key).await
    }

    async fn hash_set_many(&self, key: &str, fields: HashFields) -> Result<()> {
        (**self).hash_set_many(key, fields).await
    }

    async fn hash_delete_field(&self, key: &str, field: &str) -> Result<()> {
        (**self).hash_delete_field(key, field).await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        (**self).delete(key).await
    }

    async fn rename(&self, old_key: &str, new_key: &str) -> Result<()> {
        (**self).rename(old_key, new_key).await
    }

    async fn rename_if_absent(&self, old_key: &str, new_key: &str) -> Result<bool> {
        (**self).rename_if_absent(old_key, new_key).await
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        (**self).exists(key).await
    }

    async fn ttl_seconds(&self, key: &str) -> Result<i64> {
        (**self).ttl_seconds(key).await
    }

    async fn expire(&self, key: &str, seconds: i64) -> Result<()> {
        (**self).expire(key, seconds).await
    }

    async fn touch(&self, key: &str) -> Result<()> {
        (**self).touch(key).await
    }
}
