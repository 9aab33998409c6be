//! Sessions persisted in a remote cache through [`SessionCache`], with
//! sliding-window expiration emulated on top of flat per-key TTLs.
//!
//! A [`SessionManager`] hands out [`Session`]s identified by IDs from a
//! [`SessionIdGenerator`], and the [`ExpirationPolicy`] keeps their TTLs in
//! step with every change.
#[doc(inline)]
pub use self::cache::SessionCache;
#[doc(inline)]
pub use self::config::SessionConfig;
#[doc(inline)]
pub use self::expires::ExpirationPolicy;
#[doc(inline)]
pub use self::id::{SessionIdGenerator, StandardIdGenerator};
#[doc(inline)]
pub use self::manager::SessionManager;
#[doc(inline)]
pub use self::session::{Error, Result, Session};

/// The cache operations sessions are built on.
pub mod cache;
/// Session manager configuration.
pub mod config;
/// Session expiry management.
pub mod expires;
/// Session IDs.
pub mod id;
/// Session lookup and lifecycle.
pub mod manager;
/// Sessions and their errors.
pub mod session;
