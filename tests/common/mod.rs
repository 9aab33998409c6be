#![allow(dead_code)]

use cache_sessions::{SessionCache, SessionConfig, SessionIdGenerator, SessionManager, StandardIdGenerator};

/// A namespace no other test shares, so tests against a real cache do not
/// see each other's keys.
pub fn unique_config() -> SessionConfig {
    let suffix = StandardIdGenerator::new().generate();
    SessionConfig::default()
        .with_namespace(&format!("test:{suffix}"))
        .unwrap()
}

pub fn manager<C: SessionCache>(cache: C) -> SessionManager<C> {
    SessionManager::with_config(cache, unique_config())
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

#[macro_export]
macro_rules! session_tests {
    ($create_cache:expr) => {
        use std::collections::HashSet;

        use cache_sessions::{Error, SessionCache, SessionConfig, SessionManager};
        use serde::{Deserialize, Serialize};
        use serde_json::{json, Value};
        use time::{Duration, OffsetDateTime};
        use $crate::common::{init_tracing, manager, unique_config};

        #[derive(Debug, PartialEq, Serialize, Deserialize)]
        struct Cart {
            items: Vec<String>,
            total: u32,
        }

        #[tokio::test]
        async fn create_then_find() {
            init_tracing();
            let manager = manager($create_cache().await);

            let mut session = manager.create_session(None, None).await.unwrap();
            assert!(session.is_new());
            assert!(!session.id().is_empty());
            assert_eq!(session.original_id(), session.id());
            assert_eq!(session.creation_time(), session.last_accessed_time());
            assert_eq!(session.max_inactive_interval(), Duration::minutes(30));
            session.insert("user", "alice").await.unwrap();

            let found = manager.find_by_id(session.id()).await.unwrap().unwrap();
            assert!(!found.is_new());
            assert_eq!(found.id(), session.id());
            assert_eq!(found.creation_time(), session.creation_time());
            assert_eq!(found.last_accessed_time(), session.last_accessed_time());
            assert_eq!(found.max_inactive_interval(), Duration::minutes(30));
            assert_eq!(found.get::<String>("user").unwrap(), Some("alice".to_string()));
            assert_eq!(found.attribute_names(), HashSet::from(["user"]));
        }

        #[tokio::test]
        async fn create_with_explicit_id() {
            let manager = manager($create_cache().await);

            let session = manager
                .create_session(Some("chosen-id"), Some(Duration::hours(2)))
                .await
                .unwrap();
            assert_eq!(session.id(), "chosen-id");

            let found = manager.find_by_id("chosen-id").await.unwrap().unwrap();
            assert_eq!(found.max_inactive_interval(), Duration::hours(2));
        }

        #[tokio::test]
        async fn blank_ids_are_rejected() {
            let manager = manager($create_cache().await);

            let err = manager.create_session(Some("  "), None).await.unwrap_err();
            assert!(matches!(err, Error::InvalidArgument(_)));

            let err = manager.find_by_id("").await.unwrap_err();
            assert!(matches!(err, Error::InvalidArgument(_)));
        }

        #[tokio::test]
        async fn fabricated_id_is_not_found() {
            let manager = manager($create_cache().await);
            assert!(manager.find_by_id("no-such-session").await.unwrap().is_none());
            assert!(!manager.delete_by_id("no-such-session").await.unwrap());
        }

        #[tokio::test]
        async fn idle_time_starts_at_interval() {
            let manager = manager($create_cache().await);

            let session = manager
                .create_session(None, Some(Duration::minutes(30)))
                .await
                .unwrap();
            let idle_time = session.idle_time().await.unwrap();
            assert!(idle_time <= Duration::minutes(30));
            assert!(idle_time >= Duration::minutes(30) - Duration::seconds(2));
        }

        #[tokio::test]
        async fn data_outlives_marker_by_grace_period() {
            let manager = manager($create_cache().await);

            let session = manager
                .create_session(None, Some(Duration::minutes(30)))
                .await
                .unwrap();
            let cache = manager.cache();

            let marker_ttl = cache
                .ttl_seconds(&manager.expires_key(session.id()))
                .await
                .unwrap();
            let data_ttl = cache
                .ttl_seconds(&manager.session_key(session.id()))
                .await
                .unwrap();
            assert!((1798..=1800).contains(&marker_ttl));
            assert!((2098..=2100).contains(&data_ttl));
        }

        #[tokio::test]
        async fn custom_grace_period() {
            let config = unique_config().with_grace_period(Duration::minutes(1));
            let manager = SessionManager::with_config($create_cache().await, config);

            let session = manager
                .create_session(None, Some(Duration::minutes(10)))
                .await
                .unwrap();
            let data_ttl = manager
                .cache()
                .ttl_seconds(&manager.session_key(session.id()))
                .await
                .unwrap();
            assert!((658..=660).contains(&data_ttl));
        }

        #[tokio::test]
        async fn attributes_round_trip() {
            let manager = manager($create_cache().await);
            let mut session = manager.create_session(None, None).await.unwrap();

            let cart = Cart {
                items: vec!["apple".to_string(), "pear".to_string()],
                total: 7,
            };
            session.insert("cart", &cart).await.unwrap();
            session
                .insert_value("prefs", json!({"theme": "dark", "sizes": [1, 2.5]}))
                .await
                .unwrap();

            let found = manager.find_by_id(session.id()).await.unwrap().unwrap();
            assert_eq!(found.get::<Cart>("cart").unwrap(), Some(cart));
            assert_eq!(
                found.get_value("prefs"),
                Some(&json!({"theme": "dark", "sizes": [1, 2.5]}))
            );
            assert_eq!(found.get_value("missing"), None);
            assert!(matches!(found.get::<u32>("prefs"), Err(Error::Decode(_))));
        }

        #[tokio::test]
        async fn null_removes_attribute() {
            let manager = manager($create_cache().await);
            let mut session = manager.create_session(None, None).await.unwrap();

            session.insert("a", 1).await.unwrap();
            session.insert("b", 2).await.unwrap();
            session.insert_value("a", Value::Null).await.unwrap();
            session.insert("b", Option::<u32>::None).await.unwrap();
            assert!(session.attribute_names().is_empty());

            let found = manager.find_by_id(session.id()).await.unwrap().unwrap();
            assert!(found.attribute_names().is_empty());
        }

        #[tokio::test]
        async fn remove_returns_previous_value() {
            let manager = manager($create_cache().await);
            let mut session = manager.create_session(None, None).await.unwrap();

            session.insert("a", "x").await.unwrap();
            assert_eq!(session.remove("a").await.unwrap(), Some(json!("x")));
            assert_eq!(session.remove("a").await.unwrap(), None);

            let found = manager.find_by_id(session.id()).await.unwrap().unwrap();
            assert_eq!(found.get_value("a"), None);
        }

        #[tokio::test]
        async fn last_accessed_time_is_persisted() {
            let manager = manager($create_cache().await);
            let mut session = manager.create_session(None, None).await.unwrap();

            let accessed = OffsetDateTime::now_utc() + Duration::seconds(5);
            session.set_last_accessed_time(accessed).await.unwrap();
            assert_eq!(
                session.last_accessed_time().unix_timestamp_nanos() / 1_000_000,
                accessed.unix_timestamp_nanos() / 1_000_000
            );

            let found = manager.find_by_id(session.id()).await.unwrap().unwrap();
            assert_eq!(found.last_accessed_time(), session.last_accessed_time());
            assert_eq!(found.creation_time(), session.creation_time());
        }

        #[tokio::test]
        async fn max_inactive_interval_rearms_ttls() {
            let manager = manager($create_cache().await);
            let mut session = manager
                .create_session(None, Some(Duration::minutes(1)))
                .await
                .unwrap();

            session
                .set_max_inactive_interval(Duration::hours(1))
                .await
                .unwrap();
            assert!(session.idle_time().await.unwrap() > Duration::minutes(59));

            let found = manager.find_by_id(session.id()).await.unwrap().unwrap();
            assert_eq!(found.max_inactive_interval(), Duration::hours(1));
        }

        #[tokio::test]
        async fn zero_interval_is_never_found() {
            let manager = manager($create_cache().await);

            let session = manager
                .create_session(None, Some(Duration::ZERO))
                .await
                .unwrap();
            assert_eq!(session.idle_time().await.unwrap(), Duration::ZERO);
            assert!(manager.find_by_id(session.id()).await.unwrap().is_none());

            // The data stays behind without a TTL.
            let data_ttl = manager
                .cache()
                .ttl_seconds(&manager.session_key(session.id()))
                .await
                .unwrap();
            assert_eq!(data_ttl, -1);
        }

        #[tokio::test]
        async fn shrinking_interval_to_zero_invalidates() {
            let manager = manager($create_cache().await);
            let mut session = manager.create_session(None, None).await.unwrap();

            session
                .set_max_inactive_interval(Duration::ZERO)
                .await
                .unwrap();
            assert!(manager.find_by_id(session.id()).await.unwrap().is_none());
        }

        #[tokio::test]
        async fn delete_keeps_data_until_it_expires() {
            let manager = manager($create_cache().await);
            let session = manager.create_session(None, None).await.unwrap();

            assert!(manager.delete_by_id(session.id()).await.unwrap());
            assert!(manager.find_by_id(session.id()).await.unwrap().is_none());
            assert!(!manager.delete_by_id(session.id()).await.unwrap());

            let cache = manager.cache();
            assert!(cache.exists(&manager.session_key(session.id())).await.unwrap());
            assert!(!cache.exists(&manager.expires_key(session.id())).await.unwrap());
        }

        #[tokio::test]
        async fn change_id_preserves_original_id() {
            let manager = manager($create_cache().await);
            let mut session = manager.create_session(None, None).await.unwrap();
            session.insert("user", "bob").await.unwrap();
            let old_id = session.id().to_owned();

            session.change_id("renamed").await.unwrap();
            assert_eq!(session.id(), "renamed");
            assert_eq!(session.original_id(), old_id);

            assert!(manager.find_by_id(&old_id).await.unwrap().is_none());
            let found = manager.find_by_id("renamed").await.unwrap().unwrap();
            assert_eq!(found.get::<String>("user").unwrap(), Some("bob".to_string()));
            assert!(found.idle_time().await.unwrap() > Duration::minutes(29));

            // Writes follow the session to its new keys.
            session.insert("user", "carol").await.unwrap();
            let found = manager.find_by_id("renamed").await.unwrap().unwrap();
            assert_eq!(found.get::<String>("user").unwrap(), Some("carol".to_string()));
            assert!(!manager
                .cache()
                .exists(&manager.session_key(&old_id))
                .await
                .unwrap());
        }

        #[tokio::test]
        async fn change_id_of_never_expiring_session() {
            let manager = manager($create_cache().await);
            let mut session = manager
                .create_session(None, Some(Duration::ZERO))
                .await
                .unwrap();

            session.change_id("moved").await.unwrap();
            assert!(manager
                .cache()
                .exists(&manager.session_key("moved"))
                .await
                .unwrap());
            assert!(!manager
                .cache()
                .exists(&manager.expires_key("moved"))
                .await
                .unwrap());
        }

        #[tokio::test]
        async fn change_session_id_generates_fresh_id() {
            let manager = manager($create_cache().await);
            let mut session = manager.create_session(None, None).await.unwrap();
            session.insert("n", 1).await.unwrap();
            let old_id = session.id().to_owned();

            let new_id = manager.change_session_id(&mut session).await.unwrap();
            assert_ne!(new_id, old_id);
            assert_eq!(session.id(), new_id);
            assert_eq!(session.original_id(), old_id);

            assert!(manager.find_by_id(&old_id).await.unwrap().is_none());
            let found = manager.find_by_id(&new_id).await.unwrap().unwrap();
            assert_eq!(found.get::<u32>("n").unwrap(), Some(1));
        }

        #[tokio::test]
        async fn change_session_id_to_taken_id_fails() {
            let manager = manager($create_cache().await);
            let mut first = manager.create_session(None, None).await.unwrap();
            first.insert("owner", "first").await.unwrap();
            let mut second = manager.create_session(None, None).await.unwrap();
            second.insert("owner", "second").await.unwrap();
            let first_id = first.id().to_owned();

            assert!(!manager
                .change_session_id_to(&mut second, &first_id)
                .await
                .unwrap());
            assert_ne!(second.id(), first_id);

            let found = manager.find_by_id(&first_id).await.unwrap().unwrap();
            assert_eq!(found.get::<String>("owner").unwrap(), Some("first".to_string()));
            assert!(manager.find_by_id(second.id()).await.unwrap().is_some());

            // A session's own ID is taken too.
            let second_id = second.id().to_owned();
            assert!(!manager
                .change_session_id_to(&mut second, &second_id)
                .await
                .unwrap());
            assert_eq!(second.id(), second_id);

            assert!(manager
                .change_session_id_to(&mut second, "free-id")
                .await
                .unwrap());
            assert_eq!(second.id(), "free-id");
        }

        #[tokio::test]
        async fn generated_ids_are_unused() {
            let manager = manager($create_cache().await);
            let id = manager.generate_session_id().await.unwrap();
            assert!(!manager
                .cache()
                .exists(&manager.session_key(&id))
                .await
                .unwrap());
        }

        #[tokio::test]
        async fn namespaces_are_isolated() {
            let cache = $create_cache().await;
            let first = SessionManager::with_config(cache.clone(), unique_config());
            let second = SessionManager::with_config(cache, unique_config());

            let session = first.create_session(None, None).await.unwrap();
            assert!(second.find_by_id(session.id()).await.unwrap().is_none());
            assert!(first.find_by_id(session.id()).await.unwrap().is_some());
        }

        #[tokio::test]
        async fn default_namespace_layout() {
            let manager = SessionManager::with_config($create_cache().await, SessionConfig::default());
            let session = manager.create_session(None, None).await.unwrap();

            assert_eq!(
                manager.session_key(session.id()),
                format!("project:session:sessions:{}", session.id())
            );
            assert_eq!(
                manager.expires_key(session.id()),
                format!("project:session:sessions:expires:{}", session.id())
            );
            manager.cache().delete(&manager.session_key(session.id())).await.unwrap();
            manager.cache().delete(&manager.expires_key(session.id())).await.unwrap();
        }

        #[tokio::test]
        async fn add_rebinds_session() {
            let cache = $create_cache().await;
            let first = SessionManager::with_config(cache.clone(), unique_config());
            let second = SessionManager::with_config(cache, unique_config());

            let mut session = first.create_session(None, None).await.unwrap();
            second.add(&mut session);
            session.insert("k", "v").await.unwrap();

            let stored = second
                .cache()
                .hash_get_all(&second.session_key(session.id()))
                .await
                .unwrap();
            assert_eq!(stored.get("sessionAttr:k"), Some(&json!("v")));
            let found = first.find_by_id(session.id()).await.unwrap().unwrap();
            assert_eq!(found.get_value("k"), None);
        }

        #[tokio::test]
        async fn sessions_expire_after_inactivity() {
            let manager = manager($create_cache().await);
            let session = manager
                .create_session(None, Some(Duration::seconds(1)))
                .await
                .unwrap();
            assert!(manager.find_by_id(session.id()).await.unwrap().is_some());

            tokio::time::sleep(std::time::Duration::from_millis(1500)).await;

            assert!(manager.find_by_id(session.id()).await.unwrap().is_none());
            assert!(manager
                .cache()
                .exists(&manager.session_key(session.id()))
                .await
                .unwrap());
        }

        #[tokio::test]
        async fn activity_slides_the_window() {
            let manager = manager($create_cache().await);
            let mut session = manager
                .create_session(None, Some(Duration::seconds(2)))
                .await
                .unwrap();

            tokio::time::sleep(std::time::Duration::from_millis(1200)).await;
            session.touch().await.unwrap();
            let idle_time = session.idle_time().await.unwrap();
            assert!(idle_time <= Duration::seconds(2));
            assert!(idle_time >= Duration::seconds(1));
            tokio::time::sleep(std::time::Duration::from_millis(1200)).await;

            assert!(manager.find_by_id(session.id()).await.unwrap().is_some());
        }
    };
}
