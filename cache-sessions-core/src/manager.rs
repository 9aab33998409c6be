//! Creates, finds, deletes and renames sessions stored in a [`SessionCache`].
use std::{
    fmt::{self, Debug},
    sync::Arc,
};

use time::Duration;

use crate::{
    cache::SessionCache,
    config::SessionConfig,
    expires::ExpirationPolicy,
    id::{SessionIdGenerator, StandardIdGenerator},
    session::{self, Error, Result, Session},
};

/// Candidate IDs tried by [`SessionManager::change_session_id`].
pub const MAX_CHANGE_ID_ATTEMPTS: usize = 3;

/// Candidate IDs tried by [`SessionManager::generate_session_id`].
pub const MAX_GENERATE_ID_ATTEMPTS: usize = 10;

/// Owns a cache namespace and the sessions stored in it.
///
/// The manager is a cheap handle: clones share the same cache, configuration
/// and ID generator, and every session it hands out keeps a clone to write
/// through.
///
/// # Examples
///
/// ```rust,ignore
/// use cache_sessions::{MemoryCache, SessionManager};
///
/// # tokio_test::block_on(async {
/// let manager = SessionManager::new(MemoryCache::default());
///
/// let mut session = manager.create_session(None, None).await.unwrap();
/// session.insert("counter", 1).await.unwrap();
///
/// let found = manager.find_by_id(session.id()).await.unwrap().unwrap();
/// assert_eq!(found.get::<i32>("counter").unwrap(), Some(1));
/// # });
/// ```
pub struct SessionManager<C> {
    cache: Arc<C>,
    config: Arc<SessionConfig>,
    id_generator: Arc<dyn SessionIdGenerator>,
    expiration_policy: ExpirationPolicy,
}

impl<C> Clone for SessionManager<C> {
    fn clone(&self) -> Self {
        Self {
            cache: self.cache.clone(),
            config: self.config.clone(),
            id_generator: self.id_generator.clone(),
            expiration_policy: self.expiration_policy,
        }
    }
}

impl<C: Debug> Debug for SessionManager<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionManager")
            .field("cache", &self.cache)
            .field("config", &self.config)
            .field("id_generator", &self.id_generator)
            .field("expiration_policy", &self.expiration_policy)
            .finish()
    }
}

impl<C: SessionCache> SessionManager<C> {
    /// Creates a manager with the default configuration and ID generator.
    pub fn new(cache: C) -> Self {
        Self::with_config(cache, SessionConfig::default())
    }

    /// Creates a manager with the given configuration.
    pub fn with_config(cache: C, config: SessionConfig) -> Self {
        Self {
            cache: Arc::new(cache),
            expiration_policy: ExpirationPolicy::new(config.grace_period()),
            config: Arc::new(config),
            id_generator: Arc::new(StandardIdGenerator::new()),
        }
    }

    /// Replaces the generator used for new session IDs.
    pub fn with_id_generator(mut self, id_generator: Arc<dyn SessionIdGenerator>) -> Self {
        self.id_generator = id_generator;
        self
    }

    /// The underlying cache.
    pub fn cache(&self) -> &C {
        &self.cache
    }

    /// The manager's configuration.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// The generator used for new session IDs.
    pub fn id_generator(&self) -> &Arc<dyn SessionIdGenerator> {
        &self.id_generator
    }

    /// The policy maintaining session TTLs.
    pub fn expiration_policy(&self) -> ExpirationPolicy {
        self.expiration_policy
    }

    /// Key of the hash holding the data of session `id`.
    pub fn session_key(&self, id: &str) -> String {
        format!("{}sessions:{id}", self.config.namespace())
    }

    /// Key of the expiry marker of session `id`.
    pub fn expires_key(&self, id: &str) -> String {
        format!("{}sessions:expires:{id}", self.config.namespace())
    }

    /// Creates a session and writes it to the cache.
    ///
    /// Without an `id`, a fresh unused one is generated. Without an
    /// interval, the configured default idle timeout applies.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::InvalidArgument`] if `id` is blank, before any cache
    /// call, and with [`Error::DuplicateIdExhausted`] if no unused ID could be
    /// generated.
    pub async fn create_session(
        &self,
        id: Option<&str>,
        max_inactive_interval: Option<Duration>,
    ) -> Result<Session<C>> {
        let id = match id {
            Some(id) => {
                session::validate_id(id)?;
                id.to_owned()
            }
            None => self.generate_session_id().await?,
        };

        let session = Session::create(self.clone(), Some(id), max_inactive_interval).await?;
        tracing::debug!(session_id = session.id(), "created session");
        Ok(session)
    }

    /// Looks up a live session.
    ///
    /// A session whose expiry marker is gone is not found, even if its data
    /// has not been reclaimed yet. So is a session with no data.
    pub async fn find_by_id(&self, id: &str) -> Result<Option<Session<C>>> {
        session::validate_id(id)?;

        if self.cache.ttl_seconds(&self.expires_key(id)).await? <= 0 {
            tracing::debug!(session_id = id, "session expired or missing");
            return Ok(None);
        }

        let fields = self.cache.hash_get_all(&self.session_key(id)).await?;
        if fields.is_empty() {
            tracing::debug!(session_id = id, "session has no data");
            return Ok(None);
        }

        Session::from_fields(self.clone(), id.to_owned(), fields).map(Some)
    }

    /// Invalidates a session by deleting its expiry marker.
    ///
    /// The data is left to expire with its own TTL. Returns whether a live
    /// session was found.
    pub async fn delete_by_id(&self, id: &str) -> Result<bool> {
        let Some(session) = self.find_by_id(id).await? else {
            return Ok(false);
        };

        self.cache.delete(&self.expires_key(session.id())).await?;
        tracing::debug!(session_id = session.id(), "deleted session");
        Ok(true)
    }

    /// Binds `session` to this manager, so its writes go through this
    /// manager's cache and namespace.
    pub fn add(&self, session: &mut Session<C>) {
        session.bind(self.clone());
    }

    /// Moves `session` to a freshly generated ID and returns it.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::IdGenerationExhausted`] when every candidate was
    /// taken, which points at a broken generator rather than bad luck.
    pub async fn change_session_id(&self, session: &mut Session<C>) -> Result<String> {
        for attempt in 1..=MAX_CHANGE_ID_ATTEMPTS {
            let new_id = self.generate_session_id().await?;
            if self.change_session_id_to(session, &new_id).await? {
                return Ok(new_id);
            }
            tracing::warn!(attempt, %new_id, "session id already taken, retrying");
        }

        Err(Error::IdGenerationExhausted {
            attempts: MAX_CHANGE_ID_ATTEMPTS,
        })
    }

    /// Moves `session` to `new_id` unless a session already exists there.
    ///
    /// Returns `false`, leaving everything untouched, when `new_id` is taken.
    /// The check is atomic only if the cache overrides
    /// [`SessionCache::rename_if_absent`]; otherwise two concurrent changes to
    /// the same ID can both succeed and the last one wins.
    pub async fn change_session_id_to(
        &self,
        session: &mut Session<C>,
        new_id: &str,
    ) -> Result<bool> {
        session::validate_id(new_id)?;
        session.change_id_if_absent(new_id).await
    }

    /// Generates an ID no session currently uses.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::DuplicateIdExhausted`] after
    /// [`MAX_GENERATE_ID_ATTEMPTS`] collisions, which means the generator
    /// produces too little entropy.
    pub async fn generate_session_id(&self) -> Result<String> {
        for attempt in 1..=MAX_GENERATE_ID_ATTEMPTS {
            let id = self.id_generator.generate();
            if !self.cache.exists(&self.session_key(&id)).await? {
                return Ok(id);
            }
            tracing::warn!(attempt, "generated a duplicated session id");
        }

        Err(Error::DuplicateIdExhausted {
            attempts: MAX_GENERATE_ID_ATTEMPTS,
        })
    }

    pub(crate) async fn migrate_expires_key(
        &self,
        old_id: &str,
        new_id: &str,
        max_inactive_interval: Duration,
    ) -> Result<()> {
        // Sessions that never time out have no marker to move.
        if self.expiration_policy.marker_ttl(max_inactive_interval).is_none() {
            return Ok(());
        }
        self.cache
            .rename(&self.expires_key(old_id), &self.expires_key(new_id))
            .await?;
        Ok(())
    }

    pub(crate) async fn apply_expiration(&self, session: &Session<C>) -> Result<()> {
        self.expiration_policy
            .apply(
                &*self.cache,
                &self.session_key(session.id()),
                &self.expires_key(session.id()),
                session.max_inactive_interval(),
            )
            .await?;
        Ok(())
    }
}
