//! The security contract: roles, tenant memberships, and the provider
//! surface consumed by the rest of the application.
//!
//! Every business row is scoped by a `client_id`; the invariant enforced
//! across this crate is that no query returns rows whose client id is
//! outside the requesting user's authorized set, regardless of which
//! provider answers the query.

use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::{AccessError, ProviderError, ProviderResult};

/// A user's role within one client.
///
/// Roles form a fixed ordered hierarchy; a user has exactly one role per
/// client, never a global role. Comparisons are ordinal ("has at least role
/// X") unless the caller explicitly asks for exact membership.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Line staff: read-mostly access.
    Staff,
    /// Shift supervisor: records production and deliveries.
    Supervisor,
    /// Manager: edits prices, deletes records, manages vendors.
    Manager,
    /// Owner: full control including users and billing.
    Owner,
}

impl Role {
    /// Returns the role's ordinal rank (Staff = 1 .. Owner = 4).
    pub fn ordinal(self) -> u8 {
        match self {
            Role::Staff => 1,
            Role::Supervisor => 2,
            Role::Manager => 3,
            Role::Owner => 4,
        }
    }

    /// Ordinal comparison: `true` if this role ranks at or above `other`.
    pub fn at_least(self, other: Role) -> bool {
        self.ordinal() >= other.ordinal()
    }

    /// All roles in ascending rank order.
    pub fn all() -> [Role; 4] {
        [Role::Staff, Role::Supervisor, Role::Manager, Role::Owner]
    }

    /// The role's canonical lowercase name.
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Staff => "staff",
            Role::Supervisor => "supervisor",
            Role::Manager => "manager",
            Role::Owner => "owner",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Error parsing a role name.
#[derive(Error, Debug)]
#[error("unknown role: {0}")]
pub struct RoleParseError(String);

impl FromStr for Role {
    type Err = RoleParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "staff" => Ok(Role::Staff),
            "supervisor" => Ok(Role::Supervisor),
            "manager" => Ok(Role::Manager),
            "owner" => Ok(Role::Owner),
            other => Err(RoleParseError(other.to_string())),
        }
    }
}

/// One tenant membership: a user's role within one client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Membership {
    /// The client the membership grants access to.
    pub client_id: String,
    /// The user's role within that client.
    pub role: Role,
    /// Inactive memberships grant no access.
    pub active: bool,
}

/// Backing store for tenant memberships.
///
/// This is the seam between the application security engine and whatever
/// provider answers membership queries; each backend supplies its own
/// implementation.
#[async_trait]
pub trait MembershipStore: Send + Sync {
    /// Returns all memberships (active and inactive) for a user.
    async fn memberships_for_user(&self, user_id: &str) -> ProviderResult<Vec<Membership>>;

    /// Returns the user's membership in one client, if any.
    async fn membership(
        &self,
        user_id: &str,
        client_id: &str,
    ) -> ProviderResult<Option<Membership>>;
}

/// The security contract consumed by the application.
///
/// Implemented natively by each database provider, by the application
/// security engine, and by the hybrid composition of both.
#[async_trait]
pub trait SecurityProvider: Send + Sync {
    /// Returns whether the user may access the given client.
    ///
    /// Internal failures follow the implementation's error policy: strict
    /// implementations propagate, fail-closed implementations return
    /// `Ok(false)`, and no failure path ever returns `Ok(true)`.
    async fn enforce_client_access(&self, user_id: &str, client_id: &str)
    -> ProviderResult<bool>;

    /// Returns the client ids the user is actively a member of.
    ///
    /// Returns an empty list on internal error rather than leaking
    /// internals; the failure is audit-logged by implementations that
    /// carry an audit trail.
    async fn get_user_client_ids(&self, user_id: &str) -> Vec<String>;

    /// Returns the user's role in the given client, if they are an active
    /// member.
    async fn get_user_role_in_client(
        &self,
        user_id: &str,
        client_id: &str,
    ) -> ProviderResult<Option<Role>>;

    /// Appends a client-id allow-list predicate to a query string.
    ///
    /// A user with zero authorized clients gets an always-false predicate,
    /// never the unfiltered query. This is a defense-in-depth textual
    /// transform, not a substitute for parameterized queries upstream.
    async fn add_client_filter(&self, query: &str, user_id: &str) -> String;

    /// Like [`enforce_client_access`] but returns an error on denial.
    ///
    /// [`enforce_client_access`]: Self::enforce_client_access
    async fn validate_client_access(&self, user_id: &str, client_id: &str) -> ProviderResult<()> {
        if self.enforce_client_access(user_id, client_id).await? {
            Ok(())
        } else {
            Err(ProviderError::Access(AccessError::ClientAccessDenied {
                user_id: user_id.to_string(),
                client_id: client_id.to_string(),
            }))
        }
    }

    /// Ordinal role check: `true` if `user_role` ranks at or above the
    /// minimum of `required`. Implementations configured without a
    /// hierarchy fall back to exact set-membership.
    fn has_required_role(&self, user_role: Role, required: &[Role]) -> bool;

    /// Returns whether the user may perform a named action in a client.
    ///
    /// Composes a client-access check with the action's minimum-role
    /// requirement. Unknown actions are denied.
    async fn can_perform_action(
        &self,
        user_id: &str,
        client_id: &str,
        action: &str,
    ) -> ProviderResult<bool>;
}

/// Shorthand for a shared security-provider handle.
pub type SharedSecurity = Arc<dyn SecurityProvider>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_ordinals() {
        assert_eq!(Role::Staff.ordinal(), 1);
        assert_eq!(Role::Supervisor.ordinal(), 2);
        assert_eq!(Role::Manager.ordinal(), 3);
        assert_eq!(Role::Owner.ordinal(), 4);
    }

    #[test]
    fn test_role_at_least_is_ordinal() {
        for higher in Role::all() {
            for lower in Role::all() {
                assert_eq!(
                    higher.at_least(lower),
                    higher.ordinal() >= lower.ordinal(),
                    "{higher} vs {lower}"
                );
            }
        }
    }

    #[test]
    fn test_role_parse_round_trip() {
        for role in Role::all() {
            assert_eq!(role.as_str().parse::<Role>().unwrap(), role);
        }
        assert_eq!("MANAGER".parse::<Role>().unwrap(), Role::Manager);
        assert!("chef".parse::<Role>().is_err());
    }

    #[test]
    fn test_role_serde_lowercase() {
        let json = serde_json::to_string(&Role::Supervisor).unwrap();
        assert_eq!(json, "\"supervisor\"");
        let role: Role = serde_json::from_str("\"owner\"").unwrap();
        assert_eq!(role, Role::Owner);
    }

    #[test]
    fn test_membership_serde() {
        let m = Membership {
            client_id: "c1".to_string(),
            role: Role::Manager,
            active: true,
        };
        let json = serde_json::to_value(&m).unwrap();
        assert_eq!(json["role"], "manager");
        let back: Membership = serde_json::from_value(json).unwrap();
        assert_eq!(back, m);
    }
}
