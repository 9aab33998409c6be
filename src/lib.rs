//! # Overview
//!
//! This crate provides sessions, timestamped key-value records associated
//! with a visitor, persisted in a remote cache such as Redis and expired after
//! a period of inactivity.
//!
//! It offers:
//!
//! - **Pluggable Caches:** Bring your own backend simply by implementing the
//!   [`SessionCache`] trait, a handful of Redis-like hash and key operations.
//! - **Sliding Expiration on Flat TTLs:** Caches only know absolute per-key
//!   TTLs. Each session pairs its data hash with an expiry marker key, and the
//!   [`ExpirationPolicy`] re-arms both on every change, so the session lives
//!   exactly as long as it stays active.
//! - **Instant Invalidation:** Deleting a session only removes its marker. The
//!   session is gone at once while its data is reclaimed lazily by the cache a
//!   grace period later.
//! - **Write-Through Attributes:** Session attributes are JSON values. Every
//!   change is written to the cache as it happens, touching only the affected
//!   fields.
//! - **Session Fixation Defense:** Sessions can move to a fresh ID without
//!   losing their data or their expiration.
//!
//! ### Caches
//!
//! | Feature            | Type               | Persistent | Description                     |
//! | ------------------ | ------------------ | ---------- | ------------------------------- |
//! | `memory-store`     | [`MemoryCache`]    | No         | In-process cache, on by default |
//! | `redis-store`      | `RedisCache`       | Yes        | Redis via `fred`                |
//! | `redis-pool-store` | `RedisPoolCache`   | Yes        | Redis via `redis` and a pool    |
//!
//! # Usage
//!
//! ```rust
//! use cache_sessions::{MemoryCache, SessionManager};
//! use time::Duration;
//!
//! # tokio_test::block_on(async {
//! let manager = SessionManager::new(MemoryCache::default());
//!
//! let mut session = manager
//!     .create_session(None, Some(Duration::minutes(30)))
//!     .await
//!     .unwrap();
//! session.insert("counter", 1).await.unwrap();
//!
//! let found = manager.find_by_id(session.id()).await.unwrap().unwrap();
//! assert_eq!(found.get::<usize>("counter").unwrap(), Some(1));
//!
//! manager.delete_by_id(session.id()).await.unwrap();
//! assert!(manager.find_by_id(session.id()).await.unwrap().is_none());
//! # });
//! ```
//!
//! # Keys
//!
//! Every key lives under the manager's namespace, `project:session:` unless
//! configured otherwise with [`SessionConfig::with_namespace`]. A session with
//! ID `abc` is made of:
//!
//! - `project:session:sessions:abc`, a hash holding `creationTime`,
//!   `lastAccessedTime` (both epoch milliseconds), `maxInactiveInterval`
//!   (seconds) and one `sessionAttr:<name>` field per attribute.
//! - `project:session:sessions:expires:abc`, an empty marker whose TTL is the
//!   idle timeout.
//!
//! The data hash expires [`SessionConfig::grace_period`] after the marker. A
//! session is found only while its marker lives.
//!
//! # Session IDs
//!
//! IDs come from a [`SessionIdGenerator`]. The default
//! [`StandardIdGenerator`] draws 16 random bytes and encodes them as
//! unpadded URL-safe base64, optionally suffixed with `.route` to pin
//! sessions to a node:
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use cache_sessions::{MemoryCache, SessionManager, StandardIdGenerator};
//!
//! # tokio_test::block_on(async {
//! let generator = StandardIdGenerator::new().with_route("node1");
//! let manager = SessionManager::new(MemoryCache::default()).with_id_generator(Arc::new(generator));
//!
//! let session = manager.create_session(None, None).await.unwrap();
//! assert!(session.id().ends_with(".node1"));
//! # });
//! ```
//!
//! # Logging
//!
//! Cache round trips, ID collisions and slow random seeding are reported
//! through [`tracing`](https://docs.rs/tracing). Install a subscriber to see
//! them.
#![warn(
    clippy::all,
    nonstandard_style,
    future_incompatible,
    missing_debug_implementations
)]
#![deny(missing_docs)]
#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub use cache_sessions_core::{cache, config, expires, id, manager, session};
#[doc(inline)]
pub use cache_sessions_core::{
    ExpirationPolicy, Error, Result, Session, SessionCache, SessionConfig, SessionIdGenerator,
    SessionManager, StandardIdGenerator,
};
#[cfg(feature = "memory-store")]
#[cfg_attr(docsrs, doc(cfg(feature = "memory-store")))]
#[doc(inline)]
pub use cache_sessions_memory_store::MemoryCache;
#[cfg(feature = "redis-pool-store")]
#[cfg_attr(docsrs, doc(cfg(feature = "redis-pool-store")))]
#[doc(inline)]
pub use cache_sessions_redis_pool_store::{redis, redis_pool, RedisPoolCache};
#[cfg(feature = "redis-store")]
#[cfg_attr(docsrs, doc(cfg(feature = "redis-store")))]
#[doc(inline)]
pub use cache_sessions_redis_store::{fred, RedisCache};
