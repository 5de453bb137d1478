//! Store-backed security provider without caching.
//!
//! This is the "native" security implementation concrete providers hand
//! out: every check queries the tenant-membership store directly. The
//! application engine ([`super::engine::SecurityEngine`]) layers caching
//! and audit logging on top of the same store; the hybrid composition runs
//! both.

use std::sync::Arc;

use async_trait::async_trait;

use crate::core::{MembershipStore, Role, SecurityProvider};
use crate::error::ProviderResult;

use super::filter::append_client_filter;
use super::roles::{ActionTable, satisfies_requirement};

/// Uncached security checks over a [`MembershipStore`].
pub struct StoreSecurityProvider {
    store: Arc<dyn MembershipStore>,
    actions: ActionTable,
    provider: &'static str,
}

impl StoreSecurityProvider {
    /// Creates a provider over the given store.
    pub fn new(store: Arc<dyn MembershipStore>, provider: &'static str) -> Self {
        Self {
            store,
            actions: ActionTable::standard(),
            provider,
        }
    }

    /// Replaces the action table.
    pub fn with_actions(mut self, actions: ActionTable) -> Self {
        self.actions = actions;
        self
    }
}

impl std::fmt::Debug for StoreSecurityProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreSecurityProvider")
            .field("provider", &self.provider)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl SecurityProvider for StoreSecurityProvider {
    async fn enforce_client_access(
        &self,
        user_id: &str,
        client_id: &str,
    ) -> ProviderResult<bool> {
        let membership = self.store.membership(user_id, client_id).await?;
        Ok(membership.map(|m| m.active).unwrap_or(false))
    }

    async fn get_user_client_ids(&self, user_id: &str) -> Vec<String> {
        match self.store.memberships_for_user(user_id).await {
            Ok(memberships) => memberships
                .into_iter()
                .filter(|m| m.active)
                .map(|m| m.client_id)
                .collect(),
            Err(err) => {
                tracing::warn!(
                    error = %err,
                    provider = self.provider,
                    user_id,
                    "membership listing failed, returning empty set"
                );
                Vec::new()
            }
        }
    }

    async fn get_user_role_in_client(
        &self,
        user_id: &str,
        client_id: &str,
    ) -> ProviderResult<Option<Role>> {
        let membership = self.store.membership(user_id, client_id).await?;
        Ok(membership.filter(|m| m.active).map(|m| m.role))
    }

    async fn add_client_filter(&self, query: &str, user_id: &str) -> String {
        let client_ids = self.get_user_client_ids(user_id).await;
        append_client_filter(query, &client_ids)
    }

    fn has_required_role(&self, user_role: Role, required: &[Role]) -> bool {
        satisfies_requirement(user_role, required, true)
    }

    async fn can_perform_action(
        &self,
        user_id: &str,
        client_id: &str,
        action: &str,
    ) -> ProviderResult<bool> {
        let Some(minimum) = self.actions.minimum_role(action) else {
            tracing::warn!(
                action,
                provider = self.provider,
                "unknown action denied by default"
            );
            return Ok(false);
        };

        if !self.enforce_client_access(user_id, client_id).await? {
            return Ok(false);
        }

        let role = self.get_user_role_in_client(user_id, client_id).await?;
        Ok(role
            .map(|r| self.has_required_role(r, &[minimum]))
            .unwrap_or(false))
    }
}
