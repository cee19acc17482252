//! Teardown behavior against a dead endpoint
//!
//! Cleanup must never be blocked by remote state: deletions are best-effort
//! and the local descriptor is removed regardless, so a second teardown
//! finds nothing and does nothing.

use chrono::Utc;
use serial_test::serial;
use testforge::ai::provider::{CacheRole, Provider};
use testforge::ai::HostedClient;
use testforge::cache::{CacheManager, CachedContext, DocumentHandle};

fn stale_context() -> CachedContext {
    CachedContext {
        handle: "cachedContents/gone".to_string(),
        created_at: Utc::now(),
        ttl_secs: 1800,
        documents: vec![
            DocumentHandle {
                name: "files/doc1".to_string(),
                display_name: "requirements.txt".to_string(),
                uri: None,
            },
            DocumentHandle {
                name: "files/doc2".to_string(),
                display_name: "masters.txt".to_string(),
                uri: None,
            },
        ],
    }
}

#[tokio::test]
#[serial]
async fn teardown_twice_never_raises() {
    // Point the client at a port nothing listens on; remote deletions fail
    // fast and must be swallowed
    std::env::set_var("GOOGLE_API_BASE_URL", "http://127.0.0.1:9");

    let cache_dir = tempfile::TempDir::new().unwrap();
    let knowledge_dir = tempfile::TempDir::new().unwrap();
    let manager = CacheManager::new(cache_dir.path());

    manager
        .persist(CacheRole::Generator, "CashAllocation", &stale_context())
        .unwrap();

    let client = HostedClient::new(
        "test-key".to_string(),
        "gemini-2.5-flash".to_string(),
        CacheRole::Generator,
        "CashAllocation".to_string(),
        knowledge_dir.path().to_path_buf(),
        CacheManager::new(cache_dir.path()),
    );

    // first call: remote deletions fail (connection refused) but the local
    // descriptor still goes away
    client.teardown().await.unwrap();
    assert!(manager.peek(CacheRole::Generator, "CashAllocation").is_none());

    // second call: descriptor already absent, a clean no-op
    client.teardown().await.unwrap();

    std::env::remove_var("GOOGLE_API_BASE_URL");
}

#[tokio::test]
#[serial]
async fn teardown_without_descriptor_is_a_no_op() {
    std::env::set_var("GOOGLE_API_BASE_URL", "http://127.0.0.1:9");

    let cache_dir = tempfile::TempDir::new().unwrap();
    let knowledge_dir = tempfile::TempDir::new().unwrap();

    let client = HostedClient::new(
        "test-key".to_string(),
        "gemini-2.5-flash".to_string(),
        CacheRole::Verifier,
        "CashAllocation".to_string(),
        knowledge_dir.path().to_path_buf(),
        CacheManager::new(cache_dir.path()),
    );

    client.teardown().await.unwrap();

    std::env::remove_var("GOOGLE_API_BASE_URL");
}
