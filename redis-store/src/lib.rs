use std::collections::HashMap;

use async_trait::async_trait;
use cache_sessions_core::cache::{self, HashFields, SessionCache};
pub use fred;
use fred::prelude::{HashesInterface, KeysInterface, RedisClient};

/// An error type for `RedisCache`.
#[derive(thiserror::Error, Debug)]
pub enum RedisCacheError {
    /// A variant to map to `fred::error::RedisError` errors.
    #[error("Redis error: {0}")]
    Redis(#[from] fred::error::RedisError),

    /// A variant to map `rmp_serde` encode errors.
    #[error("Rust MsgPack encode error: {0}")]
    RmpSerdeEncode(#[from] rmp_serde::encode::Error),

    /// A variant to map `rmp_serde` decode errors.
    #[error("Rust MsgPack decode error: {0}")]
    RmpSerdeDecode(#[from] rmp_serde::decode::Error),
}

impl From<RedisCacheError> for cache::Error {
    fn from(err: RedisCacheError) -> Self {
        match err {
            RedisCacheError::Redis(inner) => cache::Error::Backend(inner.to_string()),
            RedisCacheError::RmpSerdeEncode(inner) => cache::Error::Encode(inner.to_string()),
            RedisCacheError::RmpSerdeDecode(inner) => cache::Error::Decode(inner.to_string()),
        }
    }
}

fn redis_error(err: fred::error::RedisError) -> cache::Error {
    RedisCacheError::from(err).into()
}

/// A Redis cache for sessions.
///
/// Hash field values are stored as MessagePack.
#[derive(Debug, Clone, Default)]
pub struct RedisCache {
    client: RedisClient,
}

impl RedisCache {
    /// Create a new Redis cache with the provided client.
    ///
    /// # Examples
    ///
    /// ```rust,no_run
    /// use cache_sessions::{RedisCache, SessionManager};
    /// use fred::prelude::*;
    ///
    /// # tokio_test::block_on(async {
    /// let client = RedisClient::default();
    ///
    /// let _ = client.connect();
    /// client.wait_for_connect().await.unwrap();
    ///
    /// let manager = SessionManager::new(RedisCache::new(client));
    /// })
    /// ```
    pub fn new(client: RedisClient) -> Self {
        Self { client }
    }
}

fn encode_fields(fields: &HashFields) -> Result<Vec<(String, Vec<u8>)>, RedisCacheError> {
    fields
        .iter()
        .map(|(field, value)| Ok((field.clone(), rmp_serde::to_vec(value)?)))
        .collect()
}

fn decode_fields(raw: HashMap<String, Vec<u8>>) -> Result<HashFields, RedisCacheError> {
    raw.into_iter()
        .map(|(field, bytes)| Ok((field, rmp_serde::from_slice(&bytes)?)))
        .collect()
}

#[async_trait]
impl SessionCache for RedisCache {
    async fn hash_get_all(&self, key: &str) -> cache::Result<HashFields> {
        let raw = self
            .client
            .hgetall::<HashMap<String, Vec<u8>>, _>(key)
            .await
            .map_err(redis_error)?;
        Ok(decode_fields(raw)?)
    }

    async fn hash_set_many(&self, key: &str, fields: HashFields) -> cache::Result<()> {
        if fields.is_empty() {
            return Ok(());
        }

        let encoded = encode_fields(&fields)?;
        let values: Vec<(&str, &[u8])> = encoded
            .iter()
            .map(|(field, bytes)| (field.as_str(), bytes.as_slice()))
            .collect();

        self.client
            .hset::<(), _, _>(key, values)
            .await
            .map_err(redis_error)
    }

    async fn hash_delete_field(&self, key: &str, field: &str) -> cache::Result<()> {
        self.client
            .hdel::<(), _, _>(key, field)
            .await
            .map_err(redis_error)
    }

    async fn delete(&self, key: &str) -> cache::Result<()> {
        self.client.del::<(), _>(key).await.map_err(redis_error)
    }

    async fn rename(&self, old_key: &str, new_key: &str) -> cache::Result<()> {
        self.client
            .rename::<(), _, _>(old_key, new_key)
            .await
            .map_err(redis_error)
    }

    async fn rename_if_absent(&self, old_key: &str, new_key: &str) -> cache::Result<bool> {
        self.client
            .renamenx::<bool, _, _>(old_key, new_key)
            .await
            .map_err(redis_error)
    }

    async fn exists(&self, key: &str) -> cache::Result<bool> {
        self.client.exists::<bool, _>(key).await.map_err(redis_error)
    }

    async fn ttl_seconds(&self, key: &str) -> cache::Result<i64> {
        self.client.ttl::<i64, _>(key).await.map_err(redis_error)
    }

    async fn expire(&self, key: &str, seconds: i64) -> cache::Result<()> {
        self.client
            .expire::<(), _>(key, seconds)
            .await
            .map_err(redis_error)
    }

    async fn touch(&self, key: &str) -> cache::Result<()> {
        // Appending nothing creates the key without disturbing an existing one.
        self.client
            .append::<(), _, _>(key, "")
            .await
            .map_err(redis_error)
    }
}
