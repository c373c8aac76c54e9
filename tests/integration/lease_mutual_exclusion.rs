//! Lease mutual exclusion.
//!
//! Concurrent acquisition from distinct instances yields exactly one
//! holder; release by a non-owner never deletes the key; the loser
//! acquires after the owner releases.

use std::time::Duration;

use sr_state::{LeaseStore, MemoryStateStore};

#[tokio::test]
async fn concurrent_acquire_has_one_winner() {
    let store = MemoryStateStore::new();
    let ttl = Duration::from_secs(30);

    let a = {
        let store = store.clone();
        tokio::spawn(async move { store.try_acquire("c1", "inst-a", ttl).await.unwrap() })
    };
    let b = {
        let store = store.clone();
        tokio::spawn(async move { store.try_acquire("c1", "inst-b", ttl).await.unwrap() })
    };
    let (a, b) = (a.await.unwrap(), b.await.unwrap());
    assert!(a ^ b, "exactly one instance wins the lease");
}

#[tokio::test]
async fn loser_acquires_after_owner_release() {
    let store = MemoryStateStore::new();
    let ttl = Duration::from_secs(30);

    assert!(store.try_acquire("c1", "inst-a", ttl).await.unwrap());
    assert!(!store.try_acquire("c1", "inst-b", ttl).await.unwrap());

    assert!(store.release("c1", "inst-a").await.unwrap());
    assert!(store.try_acquire("c1", "inst-b", ttl).await.unwrap());
}

#[tokio::test]
async fn non_owner_release_does_not_delete() {
    let store = MemoryStateStore::new();
    let ttl = Duration::from_secs(30);

    assert!(store.try_acquire("c1", "inst-a", ttl).await.unwrap());

    // A third instance that never acquired tries to release.
    assert!(!store.release("c1", "inst-c").await.unwrap());

    // The owner's lease still holds: others still cannot acquire.
    assert!(!store.try_acquire("c1", "inst-b", ttl).await.unwrap());
    // And the owner can still renew.
    assert!(store.try_acquire("c1", "inst-a", ttl).await.unwrap());
}

#[tokio::test]
async fn leases_are_per_connector_name() {
    let store = MemoryStateStore::new();
    let ttl = Duration::from_secs(30);
    assert!(store.try_acquire("c1", "inst-a", ttl).await.unwrap());
    assert!(store.try_acquire("c2", "inst-b", ttl).await.unwrap());
}
