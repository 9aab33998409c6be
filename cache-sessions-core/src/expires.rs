//! Sliding-window expiration on top of flat per-key TTLs.
//!
//! Every session owns two keys: a data hash and a scalar expiry marker. The
//! marker's TTL is the idle timeout itself; a session is valid exactly as long
//! as its marker lives. The data hash expires a grace period later, so a
//! session can be invalidated instantly by deleting only the marker while the
//! bulkier data is reclaimed lazily by the cache.
use time::Duration;

use crate::{cache::SessionCache, config::DEFAULT_GRACE_PERIOD};

/// Derives and applies the two TTLs of a session.
///
/// # Examples
///
/// ```rust
/// use cache_sessions_core::ExpirationPolicy;
/// use time::Duration;
///
/// let policy = ExpirationPolicy::new(Duration::minutes(5));
/// assert_eq!(policy.data_ttl(Duration::minutes(30)), Some(Duration::minutes(35)));
/// assert_eq!(policy.data_ttl(Duration::ZERO), None);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpirationPolicy {
    grace_period: Duration,
}

impl Default for ExpirationPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_GRACE_PERIOD)
    }
}

impl ExpirationPolicy {
    /// Creates a policy keeping session data `grace_period` past its idle
    /// timeout.
    pub fn new(grace_period: Duration) -> Self {
        Self {
            grace_period: grace_period.max(Duration::ZERO),
        }
    }

    /// How long session data outlives its expiry marker.
    pub fn grace_period(&self) -> Duration {
        self.grace_period
    }

    /// TTL of the expiry marker for the given idle timeout, if it expires.
    ///
    /// TTLs have whole second resolution; a timeout under one second never
    /// expires.
    pub fn marker_ttl(&self, max_inactive_interval: Duration) -> Option<Duration> {
        let seconds = max_inactive_interval.whole_seconds();
        (seconds > 0).then(|| Duration::seconds(seconds))
    }

    /// TTL of the data hash for the given idle timeout, if it expires.
    pub fn data_ttl(&self, max_inactive_interval: Duration) -> Option<Duration> {
        self.marker_ttl(max_inactive_interval)
            .map(|ttl| ttl.saturating_add(Duration::seconds(self.grace_period.whole_seconds())))
    }

    /// Re-arms both keys of a session after a change to its lifetime.
    ///
    /// A session that never times out has its marker deleted, after which it
    /// only lives until deleted explicitly. Otherwise the marker is created if
    /// needed and given the idle timeout as TTL, and the data hash is given
    /// the idle timeout plus the grace period.
    pub async fn apply<C: SessionCache + ?Sized>(
        &self,
        cache: &C,
        session_key: &str,
        expires_key: &str,
        max_inactive_interval: Duration,
    ) -> crate::cache::Result<()> {
        let (Some(marker_ttl), Some(data_ttl)) = (
            self.marker_ttl(max_inactive_interval),
            self.data_ttl(max_inactive_interval),
        ) else {
            tracing::debug!(expires_key, "session never times out, removing expiry marker");
            return cache.delete(expires_key).await;
        };

        cache.touch(expires_key).await?;
        cache
            .expire(expires_key, marker_ttl.whole_seconds())
            .await?;
        cache.expire(session_key, data_ttl.whole_seconds()).await?;

        tracing::debug!(
            session_key,
            marker_ttl = marker_ttl.whole_seconds(),
            data_ttl = data_ttl.whole_seconds(),
            "updated session expiration"
        );
        Ok(())
    }
}
