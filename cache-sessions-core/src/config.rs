//! Defines the configuration of a session manager.
use time::Duration;

use crate::session::{Error, Result};

/// Namespace used when none is configured.
pub const DEFAULT_NAMESPACE: &str = "project:session";

/// Idle timeout applied when a session is created without one (30 minutes).
pub const DEFAULT_MAX_INACTIVE_INTERVAL: Duration = Duration::minutes(30);

/// Extra lifetime of session data past its idle timeout (5 minutes).
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::minutes(5);

const NAMESPACE_SEPARATOR: char = ':';

/// Defines the configuration of a [`SessionManager`](crate::SessionManager).
///
/// # Examples
///
/// ```rust
/// use cache_sessions_core::SessionConfig;
/// use time::Duration;
///
/// let config = SessionConfig::default()
///     .with_namespace("shop:session")
///     .unwrap()
///     .with_default_max_inactive_interval(Duration::hours(1));
///
/// assert_eq!(config.namespace(), "shop:session:");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    namespace: String,
    default_max_inactive_interval: Duration,
    grace_period: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            namespace: format!("{DEFAULT_NAMESPACE}{NAMESPACE_SEPARATOR}"),
            default_max_inactive_interval: DEFAULT_MAX_INACTIVE_INTERVAL,
            grace_period: DEFAULT_GRACE_PERIOD,
        }
    }
}

impl SessionConfig {
    /// Sets the prefix isolating these session keys from other cache tenants.
    ///
    /// The namespace is trimmed and a trailing `:` is added unless present.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::InvalidArgument`] when the namespace is blank.
    pub fn with_namespace(mut self, namespace: &str) -> Result<Self> {
        let namespace = namespace.trim();
        if namespace.is_empty() {
            return Err(Error::InvalidArgument(
                "namespace cannot be empty".to_owned(),
            ));
        }
        self.namespace = if namespace.ends_with(NAMESPACE_SEPARATOR) {
            namespace.to_owned()
        } else {
            format!("{namespace}{NAMESPACE_SEPARATOR}")
        };
        Ok(self)
    }

    /// Sets the idle timeout used when a session is created without one.
    ///
    /// Zero or a negative duration means such sessions never time out.
    pub fn with_default_max_inactive_interval(mut self, interval: Duration) -> Self {
        self.default_max_inactive_interval = interval;
        self
    }

    /// Sets how long session data outlives its expiry marker.
    ///
    /// Negative durations are treated as zero.
    pub fn with_grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period = grace_period.max(Duration::ZERO);
        self
    }

    /// The normalized namespace, always ending in `:`.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// The idle timeout used when a session is created without one.
    pub fn default_max_inactive_interval(&self) -> Duration {
        self.default_max_inactive_interval
    }

    /// How long session data outlives its expiry marker.
    pub fn grace_period(&self) -> Duration {
        self.grace_period
    }
}
