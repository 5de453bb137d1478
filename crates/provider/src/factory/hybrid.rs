//! Hybrid security composition.

use async_trait::async_trait;

use crate::core::{Role, SecurityProvider, SharedSecurity};
use crate::error::ProviderResult;
use crate::security::append_client_filter;

/// Composes a provider's native security with the application engine.
///
/// The contract: access is granted only when **both** layers agree; a deny
/// from either layer is a deny. Client-id sets intersect, and where the
/// layers disagree about a role the lower-privilege answer wins.
pub struct HybridSecurityProvider {
    native: SharedSecurity,
    engine: SharedSecurity,
}

impl HybridSecurityProvider {
    /// Creates the composition.
    pub fn new(native: SharedSecurity, engine: SharedSecurity) -> Self {
        Self { native, engine }
    }
}

impl std::fmt::Debug for HybridSecurityProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HybridSecurityProvider").finish()
    }
}

#[async_trait]
impl SecurityProvider for HybridSecurityProvider {
    async fn enforce_client_access(
        &self,
        user_id: &str,
        client_id: &str,
    ) -> ProviderResult<bool> {
        let native = self.native.enforce_client_access(user_id, client_id).await?;
        let engine = self.engine.enforce_client_access(user_id, client_id).await?;
        Ok(native && engine)
    }

    async fn get_user_client_ids(&self, user_id: &str) -> Vec<String> {
        let native = self.native.get_user_client_ids(user_id).await;
        let engine = self.engine.get_user_client_ids(user_id).await;
        engine
            .into_iter()
            .filter(|id| native.contains(id))
            .collect()
    }

    async fn get_user_role_in_client(
        &self,
        user_id: &str,
        client_id: &str,
    ) -> ProviderResult<Option<Role>> {
        let native = self.native.get_user_role_in_client(user_id, client_id).await?;
        let engine = self.engine.get_user_role_in_client(user_id, client_id).await?;
        Ok(match (native, engine) {
            (Some(n), Some(e)) => Some(if n.ordinal() <= e.ordinal() { n } else { e }),
            _ => None,
        })
    }

    async fn add_client_filter(&self, query: &str, user_id: &str) -> String {
        // Filter on the intersection so the predicate is at least as
        // restrictive as either layer alone.
        let client_ids = self.get_user_client_ids(user_id).await;
        append_client_filter(query, &client_ids)
    }

    fn has_required_role(&self, user_role: Role, required: &[Role]) -> bool {
        self.engine.has_required_role(user_role, required)
    }

    async fn can_perform_action(
        &self,
        user_id: &str,
        client_id: &str,
        action: &str,
    ) -> ProviderResult<bool> {
        let native = self
            .native
            .can_perform_action(user_id, client_id, action)
            .await?;
        let engine = self
            .engine
            .can_perform_action(user_id, client_id, action)
            .await?;
        Ok(native && engine)
    }
}
