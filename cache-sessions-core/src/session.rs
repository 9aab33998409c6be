//! A session which associates timestamps and attributes with an ID, persisted
//! in a [`SessionCache`].
use std::{
    collections::{HashMap, HashSet},
    fmt::{self, Debug},
    result,
};

use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use time::{Duration, OffsetDateTime};

use crate::{
    cache::{self, HashFields, SessionCache},
    SessionManager,
};

/// Hash field holding the creation time, in epoch milliseconds.
pub const CREATION_TIME_FIELD: &str = "creationTime";

/// Hash field holding the idle timeout, in seconds.
pub const MAX_INACTIVE_INTERVAL_FIELD: &str = "maxInactiveInterval";

/// Hash field holding the last access time, in epoch milliseconds.
pub const LAST_ACCESSED_TIME_FIELD: &str = "lastAccessedTime";

/// Prefix of every attribute field. The suffix is the attribute name,
/// verbatim.
pub const ATTRIBUTE_FIELD_PREFIX: &str = "sessionAttr:";

/// Session errors.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// A caller supplied a missing or malformed argument.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Every candidate ID tried while changing a session ID was taken.
    #[error("Could not change the session id: all {attempts} candidate ids were taken")]
    IdGenerationExhausted {
        /// Number of candidates tried.
        attempts: usize,
    },

    /// Every newly generated ID collided with an existing session.
    #[error("Generated a duplicated session id {attempts} times")]
    DuplicateIdExhausted {
        /// Number of candidates tried.
        attempts: usize,
    },

    /// An attribute value could not be serialized.
    #[error("Failed to encode attribute: {0}")]
    Encode(#[source] serde_json::Error),

    /// A stored value could not be deserialized into the requested type.
    #[error("Failed to decode value: {0}")]
    Decode(#[source] serde_json::Error),

    /// The cache returned an error.
    #[error(transparent)]
    Cache(#[from] cache::Error),
}

/// Convenience type alias for session results.
pub type Result<T> = result::Result<T, Error>;

/// The name of the hash field holding the attribute `name`.
pub fn attribute_field(name: &str) -> String {
    format!("{ATTRIBUTE_FIELD_PREFIX}{name}")
}

/// A session which allows applications to associate key-value pairs with
/// visitors.
///
/// Every mutation is written through to the cache immediately, as a delta of
/// only the changed hash fields, after which the expiration policy re-arms the
/// session's TTLs. There is no separate save step.
///
/// A `Session` is meant to be owned by one request at a time; concurrent
/// writers to the same session ID resolve per hash field, last write wins.
pub struct Session<C: SessionCache> {
    manager: SessionManager<C>,
    id: String,
    original_id: String,
    creation_time: OffsetDateTime,
    last_accessed_time: OffsetDateTime,
    max_inactive_interval: Duration,
    attributes: HashMap<String, Value>,
    is_new: bool,
}

impl<C: SessionCache> Debug for Session<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("original_id", &self.original_id)
            .field("creation_time", &self.creation_time)
            .field("last_accessed_time", &self.last_accessed_time)
            .field("max_inactive_interval", &self.max_inactive_interval)
            .field("attributes", &self.attributes)
            .finish()
    }
}

impl<C: SessionCache> Session<C> {
    /// Creates a brand new session and writes its metadata to the cache.
    ///
    /// A missing or blank `id` is replaced with a freshly generated one.
    pub(crate) async fn create(
        manager: SessionManager<C>,
        id: Option<String>,
        max_inactive_interval: Option<Duration>,
    ) -> Result<Self> {
        let id = match id.filter(|id| !id.trim().is_empty()) {
            Some(id) => id,
            None => manager.generate_session_id().await?,
        };
        if id.trim().is_empty() {
            return Err(Error::InvalidArgument(
                "session id cannot be empty".to_owned(),
            ));
        }

        let now = now();
        let max_inactive_interval = max_inactive_interval
            .unwrap_or_else(|| manager.config().default_max_inactive_interval());
        let session = Self {
            manager,
            original_id: id.clone(),
            id,
            creation_time: now,
            last_accessed_time: now,
            max_inactive_interval,
            attributes: HashMap::new(),
            is_new: true,
        };

        let delta = HashFields::from([
            (CREATION_TIME_FIELD.to_owned(), Value::from(to_millis(now))),
            (
                MAX_INACTIVE_INTERVAL_FIELD.to_owned(),
                Value::from(max_inactive_interval.whole_seconds()),
            ),
            (LAST_ACCESSED_TIME_FIELD.to_owned(), Value::from(to_millis(now))),
        ]);
        session.save_delta(delta).await?;

        Ok(session)
    }

    /// Rebuilds a session from a snapshot of its cache hash.
    ///
    /// Reserved metadata fields are decoded, `sessionAttr:` fields become
    /// attributes and anything else is ignored. Nothing is written back.
    pub(crate) fn from_fields(
        manager: SessionManager<C>,
        id: String,
        fields: HashFields,
    ) -> Result<Self> {
        if id.trim().is_empty() {
            return Err(Error::InvalidArgument(
                "session id cannot be empty".to_owned(),
            ));
        }

        let now = now();
        let mut session = Self {
            max_inactive_interval: manager.config().default_max_inactive_interval(),
            manager,
            original_id: id.clone(),
            id,
            creation_time: now,
            last_accessed_time: now,
            attributes: HashMap::new(),
            is_new: false,
        };

        for (field, value) in fields {
            match field.as_str() {
                CREATION_TIME_FIELD => session.creation_time = from_millis(decode(value)?)?,
                LAST_ACCESSED_TIME_FIELD => {
                    session.last_accessed_time = from_millis(decode(value)?)?
                }
                MAX_INACTIVE_INTERVAL_FIELD => {
                    session.max_inactive_interval = Duration::seconds(decode(value)?)
                }
                _ => {
                    if let Some(name) = field.strip_prefix(ATTRIBUTE_FIELD_PREFIX) {
                        session.attributes.insert(name.to_owned(), value);
                    }
                }
            }
        }

        Ok(session)
    }

    /// The current ID of the session.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The ID this object was created or looked up with.
    ///
    /// Differs from [`id`](Session::id) once the ID has been changed.
    pub fn original_id(&self) -> &str {
        &self.original_id
    }

    /// Whether this object created the session, as opposed to loading it.
    pub fn is_new(&self) -> bool {
        self.is_new
    }

    /// When the session was first created.
    pub fn creation_time(&self) -> OffsetDateTime {
        self.creation_time
    }

    /// When the session was last touched.
    pub fn last_accessed_time(&self) -> OffsetDateTime {
        self.last_accessed_time
    }

    /// The idle timeout. Zero or negative means the session never times out.
    pub fn max_inactive_interval(&self) -> Duration {
        self.max_inactive_interval
    }

    /// The manager this session writes through.
    pub fn manager(&self) -> &SessionManager<C> {
        &self.manager
    }

    pub(crate) fn bind(&mut self, manager: SessionManager<C>) {
        self.manager = manager;
    }

    /// Gets the raw value of an attribute.
    pub fn get_value(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }

    /// Gets an attribute, deserialized as `T`.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::Decode`] if the stored value is not a `T`.
    pub fn get<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>> {
        self.attributes
            .get(name)
            .cloned()
            .map(serde_json::from_value)
            .transpose()
            .map_err(Error::Decode)
    }

    /// Names of every bound attribute.
    pub fn attribute_names(&self) -> HashSet<&str> {
        self.attributes.keys().map(String::as_str).collect()
    }

    /// Binds `value` to `name`, writing the attribute to the cache.
    ///
    /// A `null` value removes the attribute instead.
    pub async fn insert_value(&mut self, name: &str, value: Value) -> Result<()> {
        if value.is_null() {
            self.remove(name).await?;
            return Ok(());
        }

        let delta = HashFields::from([(attribute_field(name), value.clone())]);
        self.save_delta(delta).await?;
        self.attributes.insert(name.to_owned(), value);
        Ok(())
    }

    /// Serializes `value` and binds it to `name`.
    ///
    /// Values serializing to `null`, such as `None`, remove the attribute.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::Encode`] if `value` cannot be serialized, or if
    /// the cache write fails.
    pub async fn insert<T: Serialize>(&mut self, name: &str, value: T) -> Result<()> {
        let value = serde_json::to_value(value).map_err(Error::Encode)?;
        self.insert_value(name, value).await
    }

    /// Removes the attribute `name`, returning its previous value.
    pub async fn remove(&mut self, name: &str) -> Result<Option<Value>> {
        let session_key = self.manager.session_key(&self.id);
        self.manager
            .cache()
            .hash_delete_field(&session_key, &attribute_field(name))
            .await?;
        Ok(self.attributes.remove(name))
    }

    /// Records an access at `last_accessed_time`, sliding the idle timeout
    /// window forward.
    pub async fn set_last_accessed_time(&mut self, last_accessed_time: OffsetDateTime) -> Result<()> {
        let last_accessed_time = truncate_to_millis(last_accessed_time);
        let delta = HashFields::from([(
            LAST_ACCESSED_TIME_FIELD.to_owned(),
            Value::from(to_millis(last_accessed_time)),
        )]);
        self.save_delta(delta).await?;
        self.last_accessed_time = last_accessed_time;
        Ok(())
    }

    /// Records an access now.
    pub async fn touch(&mut self) -> Result<()> {
        self.set_last_accessed_time(OffsetDateTime::now_utc()).await
    }

    /// Changes the idle timeout and re-arms the session's TTLs.
    ///
    /// The local value is updated before the cache is written, so it reflects
    /// the caller's intent even if the write fails.
    pub async fn set_max_inactive_interval(&mut self, interval: Duration) -> Result<()> {
        self.max_inactive_interval = interval;
        let delta = HashFields::from([(
            MAX_INACTIVE_INTERVAL_FIELD.to_owned(),
            Value::from(interval.whole_seconds()),
        )]);
        self.save_delta(delta).await
    }

    /// Time left until the session times out for inactivity.
    ///
    /// This is the remaining TTL of the expiry marker, not the session's
    /// age. Zero when the marker is gone.
    pub async fn idle_time(&self) -> Result<Duration> {
        let ttl = self
            .manager
            .cache()
            .ttl_seconds(&self.manager.expires_key(&self.id))
            .await?;
        Ok(Duration::seconds(ttl.max(0)))
    }

    /// Renames the session to `new_id`, moving both its data and its expiry
    /// marker.
    ///
    /// Any session already stored under `new_id` is overwritten; use
    /// [`SessionManager::change_session_id_to`] for a checked change. If the
    /// data moves but the marker does not, the session reads as not found
    /// until its data expires.
    pub async fn change_id(&mut self, new_id: &str) -> Result<()> {
        if self.id == new_id {
            return Ok(());
        }
        validate_id(new_id)?;

        let cache = self.manager.cache();
        cache
            .rename(
                &self.manager.session_key(&self.id),
                &self.manager.session_key(new_id),
            )
            .await?;
        self.finish_change_id(new_id).await
    }

    /// Renames the session to `new_id` unless a session already exists there.
    ///
    /// Returns `false`, without changing anything, when `new_id` is taken.
    pub(crate) async fn change_id_if_absent(&mut self, new_id: &str) -> Result<bool> {
        validate_id(new_id)?;

        let renamed = self
            .manager
            .cache()
            .rename_if_absent(
                &self.manager.session_key(&self.id),
                &self.manager.session_key(new_id),
            )
            .await?;
        if renamed {
            self.finish_change_id(new_id).await?;
        }
        Ok(renamed)
    }

    async fn finish_change_id(&mut self, new_id: &str) -> Result<()> {
        self.manager
            .migrate_expires_key(&self.id, new_id, self.max_inactive_interval)
            .await?;
        tracing::debug!(old_id = %self.id, new_id, "changed session id");
        self.id = new_id.to_owned();
        Ok(())
    }

    async fn save_delta(&self, delta: HashFields) -> Result<()> {
        if !delta.is_empty() {
            self.manager
                .cache()
                .hash_set_many(&self.manager.session_key(&self.id), delta)
                .await?;
        }
        self.manager.apply_expiration(self).await
    }
}

pub(crate) fn validate_id(id: &str) -> Result<()> {
    if id.trim().is_empty() {
        return Err(Error::InvalidArgument(
            "session id cannot be empty".to_owned(),
        ));
    }
    Ok(())
}

fn decode<T: DeserializeOwned>(value: Value) -> Result<T> {
    serde_json::from_value(value).map_err(Error::Decode)
}

fn now() -> OffsetDateTime {
    truncate_to_millis(OffsetDateTime::now_utc())
}

fn truncate_to_millis(time: OffsetDateTime) -> OffsetDateTime {
    time - Duration::nanoseconds(i64::from(time.nanosecond() % 1_000_000))
}

fn to_millis(time: OffsetDateTime) -> i64 {
    (time.unix_timestamp_nanos() / 1_000_000) as i64
}

fn from_millis(millis: i64) -> Result<OffsetDateTime> {
    OffsetDateTime::from_unix_timestamp_nanos(i128::from(millis) * 1_000_000)
        .map_err(|err| cache::Error::Decode(err.to_string()).into())
}
