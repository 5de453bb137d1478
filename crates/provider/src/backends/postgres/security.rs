//! Membership store backed by the `client_users` table.

use async_trait::async_trait;
use deadpool_postgres::Pool;

use crate::core::{Membership, MembershipStore, Role};
use crate::error::{BackendError, ProviderError, ProviderResult};

use super::sql::map_pg_error;

/// Direct parameterized queries against `client_users`.
pub struct PgMembershipStore {
    pool: Pool,
}

impl PgMembershipStore {
    pub(crate) fn new(pool: Pool) -> Self {
        Self { pool }
    }

    fn membership_from_row(row: &tokio_postgres::Row) -> ProviderResult<Membership> {
        let client_id: String = row.try_get(0).map_err(to_serialization)?;
        let role_name: String = row.try_get(1).map_err(to_serialization)?;
        let active: bool = row.try_get(2).map_err(to_serialization)?;
        let role: Role = role_name.parse().map_err(|e: crate::core::RoleParseError| {
            ProviderError::Backend(BackendError::Serialization {
                message: e.to_string(),
            })
        })?;
        Ok(Membership {
            client_id,
            role,
            active,
        })
    }
}

fn to_serialization(err: tokio_postgres::Error) -> ProviderError {
    ProviderError::Backend(BackendError::Serialization {
        message: err.to_string(),
    })
}

#[async_trait]
impl MembershipStore for PgMembershipStore {
    async fn memberships_for_user(&self, user_id: &str) -> ProviderResult<Vec<Membership>> {
        let client = self.pool.get().await?;
        let rows = client
            .query(
                "SELECT client_id, role, active FROM client_users WHERE user_id = $1",
                &[&user_id],
            )
            .await
            .map_err(|e| map_pg_error("select memberships", e))?;
        rows.iter().map(Self::membership_from_row).collect()
    }

    async fn membership(
        &self,
        user_id: &str,
        client_id: &str,
    ) -> ProviderResult<Option<Membership>> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                "SELECT client_id, role, active FROM client_users \
                 WHERE user_id = $1 AND client_id = $2",
                &[&user_id, &client_id],
            )
            .await
            .map_err(|e| map_pg_error("select membership", e))?;
        row.as_ref().map(Self::membership_from_row).transpose()
    }
}
