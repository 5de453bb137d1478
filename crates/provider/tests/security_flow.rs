//! End-to-end security flows over the memory backend.

#![cfg(feature = "memory")]

mod common;

use std::sync::Arc;
use std::time::Duration;

use backhouse_provider::backends::memory::MemoryProvider;
use backhouse_provider::config::MemoryConfig;
use backhouse_provider::core::{DatabaseProvider, Role, SecurityProvider, SharedProvider};
use backhouse_provider::factory::{HybridSecurityProvider, SecurityMode, create_security_provider};
use backhouse_provider::security::{
    OnError, RowAuditSink, SecurityConfig, SecurityEngine, StoreSecurityProvider,
};

use common::*;

#[tokio::test]
async fn staff_promotion_takes_effect_after_cache_clear() {
    let (memory, provider) = seeded_provider().await;
    let stack = create_security_provider(
        SecurityMode::Application,
        &provider,
        SecurityConfig::default(),
    );
    let engine = stack.engine.clone().expect("application mode has an engine");

    // Staff sits below the Manager threshold for deletions.
    assert!(
        !stack
            .security
            .can_perform_action(USER_STAFF, CLIENT_BISTRO, "delete_deliveries")
            .await
            .unwrap()
    );

    set_role(&memory, USER_STAFF, CLIENT_BISTRO, Role::Manager).await;

    // The stale cached role still answers until it is invalidated.
    assert!(
        !stack
            .security
            .can_perform_action(USER_STAFF, CLIENT_BISTRO, "delete_deliveries")
            .await
            .unwrap()
    );

    engine.clear_cache(Some(USER_STAFF), Some(CLIENT_BISTRO));
    assert!(
        stack
            .security
            .can_perform_action(USER_STAFF, CLIENT_BISTRO, "delete_deliveries")
            .await
            .unwrap()
    );

    engine.shutdown().await;
}

#[tokio::test]
async fn disjoint_users_have_disjoint_client_sets() {
    let (_, provider) = seeded_provider().await;
    let security = provider.native_security();

    let bistro_ids = security.get_user_client_ids(USER_STAFF).await;
    let trattoria_ids = security.get_user_client_ids(USER_OWNER).await;

    assert_eq!(bistro_ids, vec![CLIENT_BISTRO.to_string()]);
    assert_eq!(trattoria_ids, vec![CLIENT_TRATTORIA.to_string()]);
    assert!(!bistro_ids.iter().any(|id| trattoria_ids.contains(id)));

    assert!(security.get_user_client_ids(USER_OUTSIDER).await.is_empty());
}

#[tokio::test]
async fn validate_client_access_maps_to_denial_error() {
    let (_, provider) = seeded_provider().await;
    let stack = create_security_provider(
        SecurityMode::Application,
        &provider,
        SecurityConfig::default(),
    );

    assert!(
        stack
            .security
            .validate_client_access(USER_STAFF, CLIENT_BISTRO)
            .await
            .is_ok()
    );

    let err = stack
        .security
        .validate_client_access(USER_STAFF, CLIENT_TRATTORIA)
        .await
        .unwrap_err();
    assert!(err.is_access_denied());

    if let Some(engine) = stack.engine {
        engine.shutdown().await;
    }
}

#[tokio::test]
async fn hybrid_denies_when_either_layer_denies() {
    let (_memory, provider_a) = seeded_provider().await;

    // A second backing store that knows nothing about the staff user.
    let provider_b: SharedProvider = Arc::new(MemoryProvider::new(MemoryConfig::default()));

    let granting = Arc::new(StoreSecurityProvider::new(
        provider_a.membership_store(),
        "granting",
    ));
    let denying = Arc::new(StoreSecurityProvider::new(
        provider_b.membership_store(),
        "denying",
    ));

    // Sanity: the layers disagree.
    assert!(
        granting
            .enforce_client_access(USER_STAFF, CLIENT_BISTRO)
            .await
            .unwrap()
    );
    assert!(
        !denying
            .enforce_client_access(USER_STAFF, CLIENT_BISTRO)
            .await
            .unwrap()
    );

    let hybrid = HybridSecurityProvider::new(granting.clone(), denying.clone());
    assert!(
        !hybrid
            .enforce_client_access(USER_STAFF, CLIENT_BISTRO)
            .await
            .unwrap()
    );
    assert!(hybrid.get_user_client_ids(USER_STAFF).await.is_empty());
    assert!(
        !hybrid
            .can_perform_action(USER_STAFF, CLIENT_BISTRO, "view_deliveries")
            .await
            .unwrap()
    );

    // Agreeing layers grant.
    let agreeing = HybridSecurityProvider::new(granting.clone(), granting);
    assert!(
        agreeing
            .enforce_client_access(USER_STAFF, CLIENT_BISTRO)
            .await
            .unwrap()
    );
    assert_eq!(
        agreeing.get_user_client_ids(USER_STAFF).await,
        vec![CLIENT_BISTRO.to_string()]
    );
}

#[tokio::test]
async fn audit_entries_persist_through_the_provider() {
    let (memory, provider) = seeded_provider().await;

    let engine = SecurityEngine::new(
        provider.membership_store(),
        SecurityConfig {
            on_error: OnError::Deny,
            ..Default::default()
        },
    )
    .with_audit_sink(Arc::new(RowAuditSink::new(Arc::clone(&provider))));

    engine
        .enforce_client_access(USER_STAFF, CLIENT_BISTRO)
        .await
        .unwrap();
    engine
        .enforce_client_access(USER_OUTSIDER, CLIENT_BISTRO)
        .await
        .unwrap();

    // The flush task drains asynchronously.
    tokio::time::sleep(Duration::from_millis(50)).await;

    let rows = memory.list_rows("audit_log", "ignored").await.unwrap();
    assert_eq!(rows.len(), 2);
    let denied = rows
        .iter()
        .find(|r| r["user_id"] == USER_OUTSIDER)
        .expect("denial persisted");
    assert_eq!(denied["success"], false);

    // The in-memory ring holds the same trail.
    assert_eq!(engine.audit().len(), 2);

    engine.shutdown().await;
}

#[tokio::test]
async fn strict_mode_surfaces_store_failures() {
    let (memory, provider) = seeded_provider().await;
    let engine = SecurityEngine::new(
        provider.membership_store(),
        SecurityConfig {
            on_error: OnError::Propagate,
            cache_timeout: Duration::from_secs(300),
            use_hierarchy: true,
        },
    );

    // Memory store fails while disconnected.
    memory.disconnect().await.unwrap();
    let result = engine
        .enforce_client_access(USER_STAFF, CLIENT_BISTRO)
        .await;
    assert!(result.is_err());

    memory.connect().await.unwrap();
    assert!(
        engine
            .enforce_client_access(USER_STAFF, CLIENT_BISTRO)
            .await
            .unwrap()
    );

    engine.shutdown().await;
}
