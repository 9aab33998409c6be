use std::{collections::HashMap, fmt};

use async_trait::async_trait;
use cache_sessions_core::cache::{self, HashFields, SessionCache};
pub use redis;
use redis::AsyncCommands;
pub use redis_pool;
use redis_pool::SingleRedisPool;

/// An error type for `RedisPoolCache`.
#[derive(thiserror::Error, Debug)]
pub enum RedisCacheError {
    /// A variant to map to `redis_pool::errors::RedisPoolError` errors.
    #[error("RedisPool error: {0}")]
    RedisPool(#[from] redis_pool::errors::RedisPoolError),

    /// A variant to map to `redis::RedisError` errors.
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

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
            RedisCacheError::RedisPool(inner) => cache::Error::Backend(inner.to_string()),
            RedisCacheError::Redis(inner) => cache::Error::Backend(inner.to_string()),
            RedisCacheError::RmpSerdeEncode(inner) => cache::Error::Encode(inner.to_string()),
            RedisCacheError::RmpSerdeDecode(inner) => cache::Error::Decode(inner.to_string()),
        }
    }
}

/// A Redis cache for sessions, drawing connections from a pool.
///
/// Hash field values are stored as MessagePack.
#[derive(Clone)]
pub struct RedisPoolCache {
    client: SingleRedisPool,
}

impl fmt::Debug for RedisPoolCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisPoolCache").finish_non_exhaustive()
    }
}

impl RedisPoolCache {
    /// Create a new Redis cache with the provided pool.
    ///
    /// # Examples
    ///
    /// ```rust,no_run
    /// use cache_sessions::{RedisPoolCache, SessionManager};
    /// use redis::Client;
    ///
    /// # tokio_test::block_on(async {
    /// let redis_url = "redis://127.0.0.1:6379";
    /// let client = redis::Client::open(redis_url).expect("Error while trying to open the redis connection");
    ///
    /// let manager = SessionManager::new(RedisPoolCache::new(client.into()));
    /// })
    /// ```
    pub fn new(client: SingleRedisPool) -> Self {
        Self { client }
    }

    async fn hash_get_all_inner(&self, key: &str) -> Result<HashFields, RedisCacheError> {
        let mut con = self.client.aquire().await?;
        let raw: HashMap<String, Vec<u8>> = con.hgetall(key).await?;
        raw.into_iter()
            .map(|(field, bytes)| Ok((field, rmp_serde::from_slice(&bytes)?)))
            .collect()
    }

    async fn hash_set_many_inner(
        &self,
        key: &str,
        fields: HashFields,
    ) -> Result<(), RedisCacheError> {
        // HSET with no fields is a syntax error.
        if fields.is_empty() {
            return Ok(());
        }

        let items = fields
            .iter()
            .map(|(field, value)| Ok((field.as_str(), rmp_serde::to_vec(value)?)))
            .collect::<Result<Vec<_>, RedisCacheError>>()?;

        let mut con = self.client.aquire().await?;
        con.hset_multiple::<_, _, _, ()>(key, &items).await?;
        Ok(())
    }

    async fn expire_inner(&self, key: &str, seconds: i64) -> Result<(), RedisCacheError> {
        let mut con = self.client.aquire().await?;
        match usize::try_from(seconds) {
            Ok(seconds) if seconds > 0 => con.expire::<_, ()>(key, seconds).await?,
            // A non-positive TTL expires the key at once.
            _ => con.del::<_, ()>(key).await?,
        }
        Ok(())
    }
}

#[async_trait]
impl SessionCache for RedisPoolCache {
    async fn hash_get_all(&self, key: &str) -> cache::Result<HashFields> {
        Ok(self.hash_get_all_inner(key).await?)
    }

    async fn hash_set_many(&self, key: &str, fields: HashFields) -> cache::Result<()> {
        Ok(self.hash_set_many_inner(key, fields).await?)
    }

    async fn hash_delete_field(&self, key: &str, field: &str) -> cache::Result<()> {
        let run = async {
            let mut con = self.client.aquire().await?;
            con.hdel::<_, _, ()>(key, field).await?;
            Ok::<_, RedisCacheError>(())
        };
        Ok(run.await?)
    }

    async fn delete(&self, key: &str) -> cache::Result<()> {
        let run = async {
            let mut con = self.client.aquire().await?;
            con.del::<_, ()>(key).await?;
            Ok::<_, RedisCacheError>(())
        };
        Ok(run.await?)
    }

    async fn rename(&self, old_key: &str, new_key: &str) -> cache::Result<()> {
        let run = async {
            let mut con = self.client.aquire().await?;
            con.rename::<_, _, ()>(old_key, new_key).await?;
            Ok::<_, RedisCacheError>(())
        };
        Ok(run.await?)
    }

    async fn rename_if_absent(&self, old_key: &str, new_key: &str) -> cache::Result<bool> {
        let run = async {
            let mut con = self.client.aquire().await?;
            Ok::<_, RedisCacheError>(con.rename_nx::<_, _, bool>(old_key, new_key).await?)
        };
        Ok(run.await?)
    }

    async fn exists(&self, key: &str) -> cache::Result<bool> {
        let run = async {
            let mut con = self.client.aquire().await?;
            Ok::<_, RedisCacheError>(con.exists::<_, bool>(key).await?)
        };
        Ok(run.await?)
    }

    async fn ttl_seconds(&self, key: &str) -> cache::Result<i64> {
        let run = async {
            let mut con = self.client.aquire().await?;
            Ok::<_, RedisCacheError>(con.ttl::<_, i64>(key).await?)
        };
        Ok(run.await?)
    }

    async fn expire(&self, key: &str, seconds: i64) -> cache::Result<()> {
        Ok(self.expire_inner(key, seconds).await?)
    }

    async fn touch(&self, key: &str) -> cache::Result<()> {
        let run = async {
            let mut con = self.client.aquire().await?;
            // Appending nothing creates the key without disturbing an existing one.
            con.append::<_, _, ()>(key, "").await?;
            Ok::<_, RedisCacheError>(())
        };
        Ok(run.await?)
    }
}
