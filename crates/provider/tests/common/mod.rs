//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use serde_json::json;

use backhouse_provider::backends::memory::MemoryProvider;
use backhouse_provider::config::MemoryConfig;
use backhouse_provider::core::{DatabaseProvider, Role, SharedProvider};

/// Well-known fixture ids.
pub const CLIENT_BISTRO: &str = "client-bistro";
pub const CLIENT_TRATTORIA: &str = "client-trattoria";
pub const USER_STAFF: &str = "user-staff";
pub const USER_MANAGER: &str = "user-manager";
pub const USER_OWNER: &str = "user-owner";
pub const USER_OUTSIDER: &str = "user-outsider";

/// Builds a memory provider seeded with two clients and memberships:
///
/// * `user-staff` - Staff in `client-bistro`
/// * `user-manager` - Manager in `client-bistro`
/// * `user-owner` - Owner in `client-trattoria`
/// * `user-outsider` - a user with no memberships
pub async fn seeded_provider() -> (Arc<MemoryProvider>, SharedProvider) {
    let provider = Arc::new(MemoryProvider::new(MemoryConfig::default()));

    for client in [CLIENT_BISTRO, CLIENT_TRATTORIA] {
        provider
            .insert_row("clients", json!({"id": client, "name": client}))
            .await
            .expect("seed client");
    }
    for user in [USER_STAFF, USER_MANAGER, USER_OWNER, USER_OUTSIDER] {
        provider
            .insert_row("users", json!({"id": user, "email": format!("{user}@example.com")}))
            .await
            .expect("seed user");
    }
    for (user, client, role) in [
        (USER_STAFF, CLIENT_BISTRO, Role::Staff),
        (USER_MANAGER, CLIENT_BISTRO, Role::Manager),
        (USER_OWNER, CLIENT_TRATTORIA, Role::Owner),
    ] {
        grant(&provider, user, client, role).await;
    }

    let shared: SharedProvider = provider.clone();
    (provider, shared)
}

/// Adds an active membership row.
pub async fn grant(provider: &MemoryProvider, user: &str, client: &str, role: Role) {
    provider
        .insert_row(
            "client_users",
            json!({
                "id": format!("membership-{user}-{client}"),
                "client_id": client,
                "user_id": user,
                "role": role.as_str(),
                "active": true,
            }),
        )
        .await
        .expect("seed membership");
}

/// Replaces a user's role in a client.
pub async fn set_role(provider: &MemoryProvider, user: &str, client: &str, role: Role) {
    provider
        .update_row(
            "client_users",
            client,
            &format!("membership-{user}-{client}"),
            json!({"role": role.as_str()}),
        )
        .await
        .expect("update membership");
}
