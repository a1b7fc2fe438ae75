//! Tests for [`RedisKeyValueStore`] against a real Redis.
//!
//! They need Docker, so they are `#[ignore]`d by default:
//!
//! ```bash
//! cargo test -p netsaga-redis --test redis_store -- --ignored
//! ```

#![allow(clippy::expect_used)]
#![allow(clippy::unwrap_used)]

use netsaga_core::kv::{CasOutcome, KeyValueStore};
use netsaga_redis::RedisKeyValueStore;
use testcontainers::ContainerAsync;
use testcontainers::runners::AsyncRunner;
use testcontainers_modules::redis::{REDIS_PORT, Redis};

async fn start() -> (ContainerAsync<Redis>, RedisKeyValueStore) {
    let redis = Redis::default().start().await.expect("Failed to start Redis container");
    let host = redis.get_host().await.expect("Failed to get host");
    let port = redis.get_host_port_ipv4(REDIS_PORT).await.expect("Failed to get port");

    let store = RedisKeyValueStore::connect(&format!("redis://{host}:{port}"))
        .await
        .expect("Failed to connect");
    (redis, store)
}

#[tokio::test]
#[ignore]
async fn set_then_get_returns_the_bytes() {
    let (_redis, store) = start().await;

    assert_eq!(store.get("GPBNetworks_svc-1").await.unwrap(), None);
    store.set("GPBNetworks_svc-1", b"{\"service\":\"svc-1\"}".to_vec()).await.unwrap();

    assert_eq!(
        store.get("GPBNetworks_svc-1").await.unwrap(),
        Some(b"{\"service\":\"svc-1\"}".to_vec())
    );
}

#[tokio::test]
#[ignore]
async fn compare_and_set_writes_only_over_the_expected_value() {
    let (_redis, store) = start().await;
    store.set("k", b"v1".to_vec()).await.unwrap();

    let stale = store.compare_and_set("k", Some(b"v0".to_vec()), b"x".to_vec()).await.unwrap();
    assert_eq!(stale, CasOutcome::Conflict);
    assert_eq!(store.get("k").await.unwrap(), Some(b"v1".to_vec()));

    let fresh = store.compare_and_set("k", Some(b"v1".to_vec()), b"v2".to_vec()).await.unwrap();
    assert_eq!(fresh, CasOutcome::Written);
    assert_eq!(store.get("k").await.unwrap(), Some(b"v2".to_vec()));
}

#[tokio::test]
#[ignore]
async fn expecting_absence_fails_once_the_key_exists() {
    let (_redis, store) = start().await;

    let first = store.compare_and_set("k", None, b"v1".to_vec()).await.unwrap();
    let second = store.compare_and_set("k", None, b"v2".to_vec()).await.unwrap();

    assert_eq!(first, CasOutcome::Written);
    assert_eq!(second, CasOutcome::Conflict);
    assert_eq!(store.get("k").await.unwrap(), Some(b"v1".to_vec()));
}

#[tokio::test]
#[ignore]
async fn empty_value_is_not_confused_with_absence() {
    let (_redis, store) = start().await;
    store.set("k", Vec::new()).await.unwrap();

    let outcome = store.compare_and_set("k", None, b"v".to_vec()).await.unwrap();

    assert_eq!(outcome, CasOutcome::Conflict);
}
