//! Module for session IDs.
use std::{
    fmt::{self, Debug},
    iter,
    time::{Duration, Instant},
};

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use crossbeam::queue::ArrayQueue;
use parking_lot::RwLock;
use rand::{
    rngs::{OsRng, StdRng},
    RngCore, SeedableRng,
};

use crate::session::{Error, Result};

/// Number of random bytes in a session ID unless configured otherwise.
pub const DEFAULT_SESSION_ID_LENGTH: usize = 16;

/// Smallest accepted number of random bytes in a session ID.
///
/// Below 128 bits, collisions stop being negligible and the bounded retry
/// loops of the manager could give up under normal load.
pub const MIN_SESSION_ID_LENGTH: usize = 16;

const DEFAULT_POOL_CAPACITY: usize = 64;

const SLOW_SEED_THRESHOLD: Duration = Duration::from_millis(100);

/// Produces unique, unguessable session identifiers.
///
/// A manager holds one generator for its whole lifetime, so implementations
/// are shared between concurrent callers and _must_ be safe to call from many
/// tasks at once.
///
/// # Examples
///
/// ```rust
/// use cache_sessions_core::id::{SessionIdGenerator, StandardIdGenerator};
///
/// let generator = StandardIdGenerator::new().with_route("node-1");
/// let id = generator.generate();
/// assert!(id.ends_with(".node-1"));
/// ```
pub trait SessionIdGenerator: Debug + Send + Sync {
    /// The routing token appended to generated IDs. Empty when unset.
    fn route(&self) -> String;

    /// Replaces the routing token appended to generated IDs.
    fn set_route(&self, route: &str);

    /// Number of random bytes in a generated ID.
    fn session_id_length(&self) -> usize;

    /// Generates an ID carrying the given routing token.
    ///
    /// An empty route produces an ID without any routing suffix.
    fn generate_with_route(&self, route: &str) -> String;

    /// Generates an ID carrying the generator's own routing token.
    fn generate(&self) -> String {
        self.generate_with_route(&self.route())
    }
}

/// Where a pooled random number generator gets its seed from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SeedSource {
    /// Seed straight from the operating system's secure source.
    Os,

    /// Seed from `rand`'s thread-local generator, itself seeded by the OS.
    Thread,
}

const FALLBACK_SEED_SOURCES: [SeedSource; 2] = [SeedSource::Os, SeedSource::Thread];

/// The default [`SessionIdGenerator`].
///
/// IDs are URL-safe base64 encodings of `session_id_length` random bytes,
/// followed by `.<route>` when a routing token is set.
///
/// Random bytes come from cryptographically secure [`StdRng`] instances kept
/// in a bounded, lock-free pool. Seeding a generator can be slow, so each
/// call checks one out and returns it afterwards instead of seeding a fresh
/// one; concurrent callers never contend on a single generator.
pub struct StandardIdGenerator {
    route: RwLock<String>,
    session_id_length: usize,
    seed_source: SeedSource,
    randoms: ArrayQueue<StdRng>,
}

impl Default for StandardIdGenerator {
    fn default() -> Self {
        Self {
            route: RwLock::new(String::new()),
            session_id_length: DEFAULT_SESSION_ID_LENGTH,
            seed_source: SeedSource::Os,
            randoms: ArrayQueue::new(DEFAULT_POOL_CAPACITY),
        }
    }
}

impl Debug for StandardIdGenerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StandardIdGenerator")
            .field("route", &*self.route.read())
            .field("session_id_length", &self.session_id_length)
            .field("seed_source", &self.seed_source)
            .field("pooled", &self.randoms.len())
            .finish()
    }
}

impl StandardIdGenerator {
    /// Creates a generator producing 16 byte IDs without a routing token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the routing token appended to generated IDs.
    pub fn with_route(self, route: impl Into<String>) -> Self {
        *self.route.write() = route.into();
        self
    }

    /// Sets the number of random bytes per ID.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::InvalidArgument`] when `length` is below
    /// [`MIN_SESSION_ID_LENGTH`].
    ///
    /// ```rust
    /// use cache_sessions_core::id::StandardIdGenerator;
    ///
    /// assert!(StandardIdGenerator::new().with_session_id_length(8).is_err());
    /// assert!(StandardIdGenerator::new().with_session_id_length(32).is_ok());
    /// ```
    pub fn with_session_id_length(mut self, length: usize) -> Result<Self> {
        if length < MIN_SESSION_ID_LENGTH {
            return Err(Error::InvalidArgument(format!(
                "session id length must be at least {MIN_SESSION_ID_LENGTH} bytes, got {length}"
            )));
        }
        self.session_id_length = length;
        Ok(self)
    }

    /// Sets the preferred seed source for new random generators.
    ///
    /// When the preferred source fails, the remaining sources are tried in
    /// order, then `rand`'s platform default.
    pub fn with_seed_source(mut self, seed_source: SeedSource) -> Self {
        self.seed_source = seed_source;
        self
    }

    /// Sets how many idle random generators are kept for reuse.
    pub fn with_pool_capacity(mut self, capacity: usize) -> Self {
        self.randoms = ArrayQueue::new(capacity.max(1));
        self
    }

    fn random_bytes(&self, bytes: &mut [u8]) {
        let mut random = self.randoms.pop().unwrap_or_else(|| self.create_random());
        random.fill_bytes(bytes);
        // A full pool simply drops the extra generator.
        let _ = self.randoms.push(random);
    }

    fn create_random(&self) -> StdRng {
        let started = Instant::now();

        let fallbacks = FALLBACK_SEED_SOURCES
            .into_iter()
            .filter(|source| *source != self.seed_source);
        let random = iter::once(self.seed_source)
            .chain(fallbacks)
            .find_map(|source| match seed(source) {
                Ok(random) => Some(random),
                Err(err) => {
                    tracing::error!(?source, %err, "failed to seed secure random source");
                    None
                }
            })
            .unwrap_or_else(StdRng::from_entropy);

        let elapsed = started.elapsed();
        if elapsed > SLOW_SEED_THRESHOLD {
            tracing::info!(?elapsed, "seeding secure random source was slow");
        }

        random
    }
}

fn seed(source: SeedSource) -> std::result::Result<StdRng, rand::Error> {
    match source {
        SeedSource::Os => StdRng::from_rng(OsRng),
        SeedSource::Thread => StdRng::from_rng(rand::thread_rng()),
    }
}

impl SessionIdGenerator for StandardIdGenerator {
    fn route(&self) -> String {
        self.route.read().clone()
    }

    fn set_route(&self, route: &str) {
        *self.route.write() = route.to_owned();
    }

    fn session_id_length(&self) -> usize {
        self.session_id_length
    }

    fn generate_with_route(&self, route: &str) -> String {
        let mut bytes = vec![0; self.session_id_length];
        self.random_bytes(&mut bytes);

        let mut id = URL_SAFE_NO_PAD.encode(&bytes);
        if !route.is_empty() {
            id.push('.');
            id.push_str(route);
        }
        id
    }
}
