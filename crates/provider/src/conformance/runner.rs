//! The conformance runner.
//!
//! Runs every suite against a live provider instance and reports per-case
//! results. Cases that need a capability the provider does not declare are
//! skipped with the capability named, so a run certifies exactly the
//! contract surface the provider claims.
//!
//! Every row a suite creates is tracked and deleted afterwards, even when
//! the suite fails; cleanup errors are swallowed so they never mask the
//! real failure.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use parking_lot::Mutex;
use serde_json::json;
use uuid::Uuid;

use crate::core::{
    AuthProvider, Credentials, DatabaseProvider, DatabaseProviderExt, ProviderCapability, Role,
    SecurityProvider, SharedProvider, SharedSecurity, StorageProvider, TransactionOptions,
};
use crate::error::{BackendError, ProviderError};

use super::report::{CaseReport, ConformanceReport, Outcome, SuiteReport};

/// Tunables for the heavier suites.
#[derive(Debug, Clone)]
pub struct ConformanceOptions {
    /// Rows written by the bulk-insert case.
    pub perf_rows: usize,
    /// Wall-clock budget for bulk-insert-then-query.
    pub perf_budget: Duration,
    /// Concurrent writers in the concurrency case.
    pub concurrency: usize,
    /// Bucket used by the storage suite.
    pub storage_bucket: String,
}

impl Default for ConformanceOptions {
    fn default() -> Self {
        Self {
            perf_rows: 25,
            perf_budget: Duration::from_secs(10),
            concurrency: 8,
            storage_bucket: "conformance".to_string(),
        }
    }
}

/// Rows created during a suite, deleted best-effort afterwards.
struct Cleanup {
    rows: Mutex<Vec<(String, String, String)>>,
}

impl Cleanup {
    fn new() -> Self {
        Self {
            rows: Mutex::new(Vec::new()),
        }
    }

    fn track(&self, table: &str, client_id: &str, id: &str) {
        self.rows
            .lock()
            .push((table.to_string(), client_id.to_string(), id.to_string()));
    }

    async fn sweep(&self, provider: &SharedProvider) {
        let rows: Vec<_> = {
            let mut rows = self.rows.lock();
            rows.drain(..).rev().collect()
        };
        for (table, client_id, id) in rows {
            if let Err(err) = provider.delete_row(&table, &client_id, &id).await {
                tracing::debug!(error = %err, table, id, "conformance cleanup failed");
            }
        }
    }
}

fn es(err: ProviderError) -> String {
    err.to_string()
}

fn ensure(cond: bool, msg: &str) -> Result<(), String> {
    if cond { Ok(()) } else { Err(msg.to_string()) }
}

fn deliberate_failure() -> ProviderError {
    ProviderError::Backend(BackendError::Internal {
        provider: "conformance".to_string(),
        message: "deliberate mid-transaction failure".to_string(),
        source: None,
    })
}

/// Certification runner for a provider (and optionally its security,
/// auth, and storage surfaces).
pub struct ConformanceRunner {
    provider: SharedProvider,
    security: Option<SharedSecurity>,
    auth: Option<Arc<dyn AuthProvider>>,
    storage: Option<Arc<dyn StorageProvider>>,
    options: ConformanceOptions,
}

impl ConformanceRunner {
    /// Creates a runner for a provider. The auth and storage suites pick
    /// up whatever the provider itself exposes.
    pub fn new(provider: SharedProvider) -> Self {
        let auth = provider.auth();
        let storage = provider.object_storage();
        Self {
            provider,
            security: None,
            auth,
            storage,
            options: ConformanceOptions::default(),
        }
    }

    /// Supplies the security provider to certify alongside.
    pub fn with_security(mut self, security: SharedSecurity) -> Self {
        self.security = Some(security);
        self
    }

    /// Overrides the runner options.
    pub fn with_options(mut self, options: ConformanceOptions) -> Self {
        self.options = options;
        self
    }

    /// Runs every suite and returns the full report.
    pub async fn run_all(&self) -> ConformanceReport {
        let suites = vec![
            self.connection_suite().await,
            self.schema_suite().await,
            self.crud_suite().await,
            self.transaction_suite().await,
            self.tenancy_suite().await,
            self.rbac_suite().await,
            self.business_suite().await,
            self.performance_suite().await,
            self.reliability_suite().await,
            self.auth_suite().await,
            self.storage_suite().await,
        ];
        let report = ConformanceReport {
            provider: self.provider.name().to_string(),
            suites,
        };
        tracing::info!(
            provider = %report.provider,
            cases = report.total_cases(),
            passed = report.passed(),
            "conformance run finished"
        );
        report
    }

    async fn case<F>(
        &self,
        suite: &mut SuiteReport,
        name: &str,
        required: &[ProviderCapability],
        fut: F,
    ) where
        F: Future<Output = Result<(), String>>,
    {
        for capability in required {
            if !self.provider.supports(*capability) {
                suite.cases.push(CaseReport::skipped(
                    name,
                    format!("requires capability '{capability}'"),
                ));
                return;
            }
        }
        let start = Instant::now();
        let outcome = match fut.await {
            Ok(()) => Outcome::Passed,
            Err(reason) => Outcome::Failed(reason),
        };
        suite.cases.push(CaseReport {
            name: name.to_string(),
            outcome,
            duration: start.elapsed(),
        });
    }

    fn skip(suite: &mut SuiteReport, name: &str, reason: &str) {
        suite.cases.push(CaseReport::skipped(name, reason.to_string()));
    }

    fn unique(prefix: &str) -> String {
        format!("conf-{prefix}-{}", Uuid::new_v4())
    }

    async fn seed_client(&self, cleanup: &Cleanup) -> Result<String, String> {
        let id = Self::unique("client");
        self.provider
            .insert_row("clients", json!({"id": id, "name": "Conformance Kitchen"}))
            .await
            .map_err(es)?;
        cleanup.track("clients", &id, &id);
        Ok(id)
    }

    async fn seed_user(&self, cleanup: &Cleanup) -> Result<String, String> {
        let id = Self::unique("user");
        self.provider
            .insert_row("users", json!({"id": id, "email": format!("{id}@example.com")}))
            .await
            .map_err(es)?;
        cleanup.track("users", &id, &id);
        Ok(id)
    }

    async fn seed_membership(
        &self,
        cleanup: &Cleanup,
        client_id: &str,
        user_id: &str,
        role: Role,
    ) -> Result<String, String> {
        let id = Self::unique("membership");
        self.provider
            .insert_row(
                "client_users",
                json!({
                    "id": id,
                    "client_id": client_id,
                    "user_id": user_id,
                    "role": role.as_str(),
                    "active": true,
                }),
            )
            .await
            .map_err(es)?;
        cleanup.track("client_users", client_id, &id);
        Ok(id)
    }

    async fn seed_delivery(&self, cleanup: &Cleanup, client_id: &str) -> Result<String, String> {
        let id = Self::unique("delivery");
        self.provider
            .insert_row(
                "deliveries",
                json!({"id": id, "client_id": client_id, "vendor": "Acme Produce", "total": 125.0}),
            )
            .await
            .map_err(es)?;
        cleanup.track("deliveries", client_id, &id);
        Ok(id)
    }

    async fn connection_suite(&self) -> SuiteReport {
        let mut suite = SuiteReport::new("connection");

        self.case(&mut suite, "health check reports latency", &[], async {
            let report = self.provider.health_check().await.map_err(es)?;
            ensure(!report.provider.is_empty(), "health report missing provider name")
        })
        .await;

        self.case(&mut suite, "connected state is observable", &[], async {
            ensure(
                self.provider.is_connected().await,
                "provider reports disconnected while serving",
            )
        })
        .await;

        self.case(&mut suite, "reconnect after disconnect", &[], async {
            self.provider.disconnect().await.map_err(es)?;
            ensure(
                !self.provider.is_connected().await,
                "provider still connected after disconnect",
            )?;
            self.provider.connect().await.map_err(es)?;
            self.provider.health_check().await.map_err(es)?;
            Ok(())
        })
        .await;

        suite
    }

    async fn schema_suite(&self) -> SuiteReport {
        let mut suite = SuiteReport::new("schema");
        let cleanup = Cleanup::new();

        self.case(&mut suite, "initialize is idempotent", &[], async {
            self.provider.initialize().await.map_err(es)?;
            self.provider.initialize().await.map_err(es)?;
            Ok(())
        })
        .await;

        self.case(
            &mut suite,
            "core tables are reachable",
            &[ProviderCapability::RowCrud],
            async {
                for table in ["users", "clients", "client_users", "deliveries"] {
                    let row = self
                        .provider
                        .fetch_row(table, "conf-none", "conf-missing")
                        .await
                        .map_err(|e| format!("probing '{table}': {e}"))?;
                    ensure(row.is_none(), &format!("phantom row in '{table}'"))?;
                }
                Ok(())
            },
        )
        .await;

        self.case(
            &mut suite,
            "foreign keys are enforced",
            &[
                ProviderCapability::RowCrud,
                ProviderCapability::ReferentialIntegrity,
            ],
            async {
                let err = self
                    .provider
                    .insert_row(
                        "client_users",
                        json!({
                            "client_id": Self::unique("ghost"),
                            "user_id": Self::unique("ghost"),
                            "role": "staff",
                        }),
                    )
                    .await;
                match err {
                    Err(e) if e.is_integrity() => Ok(()),
                    Err(e) => Err(format!("expected integrity error, got: {e}")),
                    Ok(_) => Err("dangling reference was accepted".to_string()),
                }
            },
        )
        .await;

        self.case(
            &mut suite,
            "duplicate ids are rejected",
            &[ProviderCapability::RowCrud],
            async {
                let client_id = self.seed_client(&cleanup).await?;
                let delivery_id = self.seed_delivery(&cleanup, &client_id).await?;
                let dup = self
                    .provider
                    .insert_row(
                        "deliveries",
                        json!({"id": delivery_id, "client_id": client_id}),
                    )
                    .await;
                match dup {
                    Err(e) if e.is_integrity() => Ok(()),
                    Err(e) => Err(format!("expected integrity error, got: {e}")),
                    Ok(_) => Err("duplicate id was accepted".to_string()),
                }
            },
        )
        .await;

        self.case(
            &mut suite,
            "table and index management round-trip",
            &[ProviderCapability::SchemaManagement],
            async {
                use crate::core::{ColumnDef, ColumnType, IndexDef, TableDef};
                let table = TableDef::new("conformance_scratch")
                    .column(ColumnDef::new("id", ColumnType::Text).primary_key())
                    .column(ColumnDef::new("client_id", ColumnType::Text).not_null())
                    .column(ColumnDef::new("data", ColumnType::Json));
                self.provider.create_table(&table).await.map_err(es)?;
                self.provider
                    .create_index(&IndexDef {
                        name: "idx_conformance_scratch_client".to_string(),
                        table: "conformance_scratch".to_string(),
                        columns: vec!["client_id".to_string()],
                        unique: false,
                    })
                    .await
                    .map_err(es)?;
                self.provider
                    .drop_table("conformance_scratch")
                    .await
                    .map_err(es)?;
                Ok(())
            },
        )
        .await;

        cleanup.sweep(&self.provider).await;
        suite
    }

    async fn crud_suite(&self) -> SuiteReport {
        let mut suite = SuiteReport::new("crud");
        let cleanup = Cleanup::new();

        self.case(
            &mut suite,
            "insert and fetch round-trip",
            &[ProviderCapability::RowCrud],
            async {
                let client_id = self.seed_client(&cleanup).await?;
                let delivery_id = self.seed_delivery(&cleanup, &client_id).await?;
                let row = self
                    .provider
                    .fetch_row("deliveries", &client_id, &delivery_id)
                    .await
                    .map_err(es)?
                    .ok_or("inserted row not found")?;
                ensure(
                    row.get("vendor").and_then(|v| v.as_str()) == Some("Acme Produce"),
                    "fetched row lost a field",
                )
            },
        )
        .await;

        self.case(
            &mut suite,
            "update merges fields",
            &[ProviderCapability::RowCrud],
            async {
                let client_id = self.seed_client(&cleanup).await?;
                let delivery_id = self.seed_delivery(&cleanup, &client_id).await?;
                let updated = self
                    .provider
                    .update_row(
                        "deliveries",
                        &client_id,
                        &delivery_id,
                        json!({"total": 250.0, "invoice": "INV-42"}),
                    )
                    .await
                    .map_err(es)?;
                ensure(
                    updated.get("invoice").and_then(|v| v.as_str()) == Some("INV-42"),
                    "patched field missing",
                )?;
                ensure(
                    updated.get("vendor").and_then(|v| v.as_str()) == Some("Acme Produce"),
                    "update dropped an untouched field",
                )
            },
        )
        .await;

        self.case(
            &mut suite,
            "delete removes the row",
            &[ProviderCapability::RowCrud],
            async {
                let client_id = self.seed_client(&cleanup).await?;
                let delivery_id = self.seed_delivery(&cleanup, &client_id).await?;
                self.provider
                    .delete_row("deliveries", &client_id, &delivery_id)
                    .await
                    .map_err(es)?;
                let row = self
                    .provider
                    .fetch_row("deliveries", &client_id, &delivery_id)
                    .await
                    .map_err(es)?;
                ensure(row.is_none(), "row survived deletion")
            },
        )
        .await;

        cleanup.sweep(&self.provider).await;
        suite
    }

    async fn transaction_suite(&self) -> SuiteReport {
        let mut suite = SuiteReport::new("transactions");
        let cleanup = Cleanup::new();

        self.case(
            &mut suite,
            "commit persists writes",
            &[ProviderCapability::Transactions, ProviderCapability::RowCrud],
            async {
                let client_id = self.seed_client(&cleanup).await?;
                let delivery_id = Self::unique("delivery");
                {
                    let client_id = client_id.clone();
                    let delivery_id = delivery_id.clone();
                    self.provider
                        .transaction(TransactionOptions::default(), move |tx| {
                            Box::pin(async move {
                                tx.insert_row(
                                    "deliveries",
                                    json!({"id": delivery_id, "client_id": client_id}),
                                )
                                .await?;
                                Ok(())
                            })
                        })
                        .await
                        .map_err(es)?;
                }
                cleanup.track("deliveries", &client_id, &delivery_id);
                let row = self
                    .provider
                    .fetch_row("deliveries", &client_id, &delivery_id)
                    .await
                    .map_err(es)?;
                ensure(row.is_some(), "committed row not visible")
            },
        )
        .await;

        self.case(
            &mut suite,
            "callback error rolls back every write",
            &[ProviderCapability::Transactions, ProviderCapability::RowCrud],
            async {
                let client_id = self.seed_client(&cleanup).await?;
                let delivery_id = Self::unique("delivery");
                let result = {
                    let client_id = client_id.clone();
                    let delivery_id = delivery_id.clone();
                    self.provider
                        .transaction(TransactionOptions::default(), move |tx| {
                            Box::pin(async move {
                                tx.insert_row(
                                    "deliveries",
                                    json!({"id": delivery_id, "client_id": client_id}),
                                )
                                .await?;
                                Err::<(), _>(deliberate_failure())
                            })
                        })
                        .await
                };
                ensure(result.is_err(), "transaction swallowed the callback error")?;
                let row = self
                    .provider
                    .fetch_row("deliveries", &client_id, &delivery_id)
                    .await
                    .map_err(es)?;
                ensure(row.is_none(), "write survived rollback")
            },
        )
        .await;

        self.case(
            &mut suite,
            "constraint failure mid-transaction rolls back fully",
            &[
                ProviderCapability::Transactions,
                ProviderCapability::RowCrud,
                ProviderCapability::ReferentialIntegrity,
            ],
            async {
                let client_id = self.seed_client(&cleanup).await?;
                let delivery_id = Self::unique("delivery");
                let result = {
                    let client_id = client_id.clone();
                    let delivery_id = delivery_id.clone();
                    self.provider
                        .transaction(TransactionOptions::default(), move |tx| {
                            Box::pin(async move {
                                tx.insert_row(
                                    "deliveries",
                                    json!({"id": delivery_id, "client_id": client_id}),
                                )
                                .await?;
                                // References a user that does not exist.
                                tx.insert_row(
                                    "client_users",
                                    json!({
                                        "client_id": client_id,
                                        "user_id": "conf-ghost-user",
                                        "role": "staff",
                                    }),
                                )
                                .await?;
                                Ok(())
                            })
                        })
                        .await
                };
                match result {
                    Err(e) if e.is_integrity() => {}
                    Err(e) => return Err(format!("expected integrity error, got: {e}")),
                    Ok(()) => return Err("dangling reference was accepted".to_string()),
                }
                let row = self
                    .provider
                    .fetch_row("deliveries", &client_id, &delivery_id)
                    .await
                    .map_err(es)?;
                ensure(row.is_none(), "earlier write in failed transaction is visible")
            },
        )
        .await;

        self.case(
            &mut suite,
            "uncommitted writes are invisible outside",
            &[ProviderCapability::Transactions, ProviderCapability::RowCrud],
            async {
                let client_id = self.seed_client(&cleanup).await?;
                let delivery_id = Self::unique("delivery");
                let mut tx = self
                    .provider
                    .begin_transaction(TransactionOptions::default())
                    .await
                    .map_err(es)?;
                tx.insert_row(
                    "deliveries",
                    json!({"id": delivery_id, "client_id": client_id}),
                )
                .await
                .map_err(es)?;
                let outside = self
                    .provider
                    .fetch_row("deliveries", &client_id, &delivery_id)
                    .await
                    .map_err(es)?;
                tx.rollback().await.map_err(es)?;
                ensure(outside.is_none(), "uncommitted write leaked outside transaction")
            },
        )
        .await;

        cleanup.sweep(&self.provider).await;
        suite
    }

    async fn tenancy_suite(&self) -> SuiteReport {
        let mut suite = SuiteReport::new("tenant-isolation");
        let cleanup = Cleanup::new();

        self.case(
            &mut suite,
            "rows never leak across clients",
            &[ProviderCapability::RowCrud],
            async {
                let client_a = self.seed_client(&cleanup).await?;
                let client_b = self.seed_client(&cleanup).await?;
                let delivery_a = self.seed_delivery(&cleanup, &client_a).await?;
                let delivery_b = self.seed_delivery(&cleanup, &client_b).await?;

                let listed = self
                    .provider
                    .list_rows("deliveries", &client_a)
                    .await
                    .map_err(es)?;
                for row in &listed {
                    ensure(
                        row.get("client_id").and_then(|v| v.as_str()) == Some(client_a.as_str()),
                        "listing returned a row from another client",
                    )?;
                }
                ensure(
                    listed
                        .iter()
                        .any(|r| r.get("id").and_then(|v| v.as_str()) == Some(delivery_a.as_str())),
                    "listing missed the client's own row",
                )?;

                let cross = self
                    .provider
                    .fetch_row("deliveries", &client_a, &delivery_b)
                    .await
                    .map_err(es)?;
                ensure(cross.is_none(), "fetched another client's row")
            },
        )
        .await;

        match self.security.clone() {
            None => {
                Self::skip(&mut suite, "authorized client sets are disjoint", "no security provider supplied");
                Self::skip(&mut suite, "client filter scopes queries", "no security provider supplied");
                Self::skip(&mut suite, "zero-tenant user gets unsatisfiable filter", "no security provider supplied");
            }
            Some(security) => {
                self.case(
                    &mut suite,
                    "authorized client sets are disjoint",
                    &[ProviderCapability::RowCrud],
                    async {
                        let client_a = self.seed_client(&cleanup).await?;
                        let client_b = self.seed_client(&cleanup).await?;
                        let user_a = self.seed_user(&cleanup).await?;
                        let user_b = self.seed_user(&cleanup).await?;
                        self.seed_membership(&cleanup, &client_a, &user_a, Role::Staff)
                            .await?;
                        self.seed_membership(&cleanup, &client_b, &user_b, Role::Staff)
                            .await?;

                        let ids_a = security.get_user_client_ids(&user_a).await;
                        let ids_b = security.get_user_client_ids(&user_b).await;
                        ensure(ids_a.contains(&client_a), "user missing own client")?;
                        ensure(
                            !ids_a.iter().any(|id| ids_b.contains(id)),
                            "disjoint users share an authorized client",
                        )
                    },
                )
                .await;

                self.case(
                    &mut suite,
                    "client filter scopes queries",
                    &[ProviderCapability::RowCrud],
                    async {
                        let client_a = self.seed_client(&cleanup).await?;
                        let client_b = self.seed_client(&cleanup).await?;
                        let user_a = self.seed_user(&cleanup).await?;
                        self.seed_membership(&cleanup, &client_a, &user_a, Role::Staff)
                            .await?;

                        let filtered = security
                            .add_client_filter("SELECT * FROM deliveries", &user_a)
                            .await;
                        ensure(filtered.contains(&client_a), "filter missing authorized client")?;
                        ensure(
                            !filtered.contains(&client_b),
                            "filter includes unauthorized client",
                        )
                    },
                )
                .await;

                self.case(
                    &mut suite,
                    "zero-tenant user gets unsatisfiable filter",
                    &[],
                    async {
                        let nobody = Self::unique("nobody");
                        let filtered = security
                            .add_client_filter("SELECT * FROM deliveries", &nobody)
                            .await;
                        ensure(
                            filtered.contains("1 = 0"),
                            "filter for zero-tenant user is satisfiable",
                        )
                    },
                )
                .await;
            }
        }

        cleanup.sweep(&self.provider).await;
        suite
    }

    async fn rbac_suite(&self) -> SuiteReport {
        let mut suite = SuiteReport::new("role-access");
        let cleanup = Cleanup::new();

        let Some(security) = self.security.clone() else {
            Self::skip(&mut suite, "role comparison is ordinal", "no security provider supplied");
            Self::skip(&mut suite, "action table boundaries", "no security provider supplied");
            Self::skip(&mut suite, "unknown actions are denied", "no security provider supplied");
            Self::skip(&mut suite, "non-members are denied", "no security provider supplied");
            return suite;
        };

        self.case(&mut suite, "role comparison is ordinal", &[], async {
            for higher in Role::all() {
                for lower in Role::all() {
                    let expected = higher.ordinal() >= lower.ordinal();
                    ensure(
                        security.has_required_role(higher, &[lower]) == expected,
                        &format!("ordinal comparison wrong for {higher} vs {lower}"),
                    )?;
                }
            }
            Ok(())
        })
        .await;

        self.case(
            &mut suite,
            "action table boundaries",
            &[ProviderCapability::RowCrud],
            async {
                let client_id = self.seed_client(&cleanup).await?;
                let staff = self.seed_user(&cleanup).await?;
                let manager = self.seed_user(&cleanup).await?;
                let owner = self.seed_user(&cleanup).await?;
                self.seed_membership(&cleanup, &client_id, &staff, Role::Staff)
                    .await?;
                self.seed_membership(&cleanup, &client_id, &manager, Role::Manager)
                    .await?;
                self.seed_membership(&cleanup, &client_id, &owner, Role::Owner)
                    .await?;

                // One allow and one deny on each side of a boundary.
                let checks: &[(&str, &str, bool)] = &[
                    (&staff, "view_deliveries", true),
                    (&staff, "record_deliveries", false),
                    (&staff, "delete_deliveries", false),
                    (&manager, "delete_deliveries", true),
                    (&manager, "manage_users", false),
                    (&owner, "manage_users", true),
                    (&owner, "manage_billing", true),
                ];
                for (user, action, expected) in checks {
                    let granted = security
                        .can_perform_action(user, &client_id, action)
                        .await
                        .map_err(es)?;
                    ensure(
                        granted == *expected,
                        &format!("'{action}' for {user}: expected {expected}, got {granted}"),
                    )?;
                }
                Ok(())
            },
        )
        .await;

        self.case(
            &mut suite,
            "unknown actions are denied",
            &[ProviderCapability::RowCrud],
            async {
                let client_id = self.seed_client(&cleanup).await?;
                let owner = self.seed_user(&cleanup).await?;
                self.seed_membership(&cleanup, &client_id, &owner, Role::Owner)
                    .await?;
                let granted = security
                    .can_perform_action(&owner, &client_id, "polish_silverware")
                    .await
                    .map_err(es)?;
                ensure(!granted, "unknown action was granted")
            },
        )
        .await;

        self.case(
            &mut suite,
            "non-members are denied",
            &[ProviderCapability::RowCrud],
            async {
                let client_id = self.seed_client(&cleanup).await?;
                let outsider = self.seed_user(&cleanup).await?;
                let granted = security
                    .can_perform_action(&outsider, &client_id, "view_deliveries")
                    .await
                    .map_err(es)?;
                ensure(!granted, "non-member was granted access")
            },
        )
        .await;

        cleanup.sweep(&self.provider).await;
        suite
    }

    async fn business_suite(&self) -> SuiteReport {
        let mut suite = SuiteReport::new("business-logic");
        let cleanup = Cleanup::new();

        self.case(
            &mut suite,
            "multi-table onboarding commits atomically",
            &[ProviderCapability::Transactions, ProviderCapability::RowCrud],
            async {
                let client_id = Self::unique("client");
                let user_id = Self::unique("user");
                let membership_id = Self::unique("membership");
                let delivery_id = Self::unique("delivery");
                {
                    let ids = (
                        client_id.clone(),
                        user_id.clone(),
                        membership_id.clone(),
                        delivery_id.clone(),
                    );
                    self.provider
                        .transaction(TransactionOptions::default(), move |tx| {
                            Box::pin(async move {
                                let (client_id, user_id, membership_id, delivery_id) = ids;
                                tx.insert_row("clients", json!({"id": client_id, "name": "Bistro"}))
                                    .await?;
                                tx.insert_row(
                                    "users",
                                    json!({"id": user_id, "email": format!("{user_id}@example.com")}),
                                )
                                .await?;
                                tx.insert_row(
                                    "client_users",
                                    json!({
                                        "id": membership_id,
                                        "client_id": client_id,
                                        "user_id": user_id,
                                        "role": "owner",
                                        "active": true,
                                    }),
                                )
                                .await?;
                                tx.insert_row(
                                    "deliveries",
                                    json!({"id": delivery_id, "client_id": client_id}),
                                )
                                .await?;
                                Ok(())
                            })
                        })
                        .await
                        .map_err(es)?;
                }
                cleanup.track("deliveries", &client_id, &delivery_id);
                cleanup.track("client_users", &client_id, &membership_id);
                cleanup.track("users", &user_id, &user_id);
                cleanup.track("clients", &client_id, &client_id);

                let membership = self
                    .provider
                    .fetch_row("client_users", &client_id, &membership_id)
                    .await
                    .map_err(es)?;
                ensure(membership.is_some(), "membership missing after commit")?;
                let delivery = self
                    .provider
                    .fetch_row("deliveries", &client_id, &delivery_id)
                    .await
                    .map_err(es)?;
                ensure(delivery.is_some(), "delivery missing after commit")
            },
        )
        .await;

        self.case(
            &mut suite,
            "failed onboarding leaves no residue",
            &[
                ProviderCapability::Transactions,
                ProviderCapability::RowCrud,
                ProviderCapability::ReferentialIntegrity,
            ],
            async {
                let client_id = Self::unique("client");
                let result = {
                    let client_id = client_id.clone();
                    self.provider
                        .transaction(TransactionOptions::default(), move |tx| {
                            Box::pin(async move {
                                tx.insert_row("clients", json!({"id": client_id, "name": "Ghost"}))
                                    .await?;
                                tx.insert_row(
                                    "client_users",
                                    json!({
                                        "client_id": client_id,
                                        "user_id": "conf-nonexistent-user",
                                        "role": "owner",
                                    }),
                                )
                                .await?;
                                Ok(())
                            })
                        })
                        .await
                };
                ensure(result.is_err(), "invalid reference was accepted")?;
                let client = self
                    .provider
                    .fetch_row("clients", &client_id, &client_id)
                    .await
                    .map_err(es)?;
                ensure(client.is_none(), "client row survived the failed transaction")
            },
        )
        .await;

        cleanup.sweep(&self.provider).await;
        suite
    }

    async fn performance_suite(&self) -> SuiteReport {
        let mut suite = SuiteReport::new("performance");
        let cleanup = Cleanup::new();

        self.case(
            &mut suite,
            "bulk insert then query within budget",
            &[ProviderCapability::RowCrud],
            async {
                let client_id = self.seed_client(&cleanup).await?;
                let start = Instant::now();
                for _ in 0..self.options.perf_rows {
                    self.seed_delivery(&cleanup, &client_id).await?;
                }
                let listed = self
                    .provider
                    .list_rows("deliveries", &client_id)
                    .await
                    .map_err(es)?;
                let elapsed = start.elapsed();
                ensure(
                    listed.len() == self.options.perf_rows,
                    &format!(
                        "expected {} rows, found {}",
                        self.options.perf_rows,
                        listed.len()
                    ),
                )?;
                ensure(
                    elapsed <= self.options.perf_budget,
                    &format!(
                        "bulk workload took {elapsed:?}, budget {:?}",
                        self.options.perf_budget
                    ),
                )
            },
        )
        .await;

        self.case(
            &mut suite,
            "concurrent writes maintain correctness",
            &[ProviderCapability::RowCrud],
            async {
                let client_id = self.seed_client(&cleanup).await?;
                let writes = (0..self.options.concurrency).map(|n| {
                    let provider = Arc::clone(&self.provider);
                    let client_id = client_id.clone();
                    let id = Self::unique(&format!("concurrent-{n}"));
                    async move {
                        provider
                            .insert_row(
                                "deliveries",
                                json!({"id": id.clone(), "client_id": client_id}),
                            )
                            .await
                            .map(|_| id)
                    }
                });
                let results = join_all(writes).await;
                for result in &results {
                    match result {
                        Ok(id) => cleanup.track("deliveries", &client_id, id),
                        Err(e) => return Err(format!("concurrent write failed: {e}")),
                    }
                }
                let listed = self
                    .provider
                    .list_rows("deliveries", &client_id)
                    .await
                    .map_err(es)?;
                ensure(
                    listed.len() == self.options.concurrency,
                    &format!(
                        "expected {} rows after concurrent writes, found {}",
                        self.options.concurrency,
                        listed.len()
                    ),
                )
            },
        )
        .await;

        cleanup.sweep(&self.provider).await;
        suite
    }

    async fn reliability_suite(&self) -> SuiteReport {
        let mut suite = SuiteReport::new("reliability");
        let cleanup = Cleanup::new();

        self.case(
            &mut suite,
            "an error does not poison subsequent operations",
            &[ProviderCapability::RowCrud],
            async {
                // A row without tenant scope is rejected by every provider.
                let bad = self
                    .provider
                    .insert_row("deliveries", json!({"vendor": "No Tenant"}))
                    .await;
                ensure(bad.is_err(), "unscoped insert was accepted")?;

                let client_id = self.seed_client(&cleanup).await?;
                self.seed_delivery(&cleanup, &client_id).await?;
                Ok(())
            },
        )
        .await;

        self.case(
            &mut suite,
            "recovers after disconnect",
            &[ProviderCapability::RowCrud],
            async {
                self.provider.disconnect().await.map_err(es)?;
                let while_down = self.provider.list_rows("deliveries", "conf-none").await;
                ensure(while_down.is_err(), "operation succeeded while disconnected")?;

                self.provider.connect().await.map_err(es)?;
                let client_id = self.seed_client(&cleanup).await?;
                self.seed_delivery(&cleanup, &client_id).await?;
                Ok(())
            },
        )
        .await;

        cleanup.sweep(&self.provider).await;
        suite
    }

    async fn auth_suite(&self) -> SuiteReport {
        let mut suite = SuiteReport::new("auth");
        let Some(auth) = self.auth.clone() else {
            Self::skip(&mut suite, "invalid token is rejected", "provider has no auth surface");
            Self::skip(&mut suite, "invalid credentials are rejected", "provider has no auth surface");
            return suite;
        };

        self.case(&mut suite, "invalid token is rejected", &[], async {
            let result = auth.get_user("conf-not-a-token").await;
            ensure(result.is_err(), "invalid token resolved to a user")
        })
        .await;

        self.case(&mut suite, "invalid credentials are rejected", &[], async {
            let result = auth
                .sign_in(&Credentials {
                    email: format!("{}@example.com", Self::unique("nobody")),
                    password: Self::unique("password"),
                })
                .await;
            ensure(result.is_err(), "bogus credentials produced a session")
        })
        .await;

        suite
    }

    async fn storage_suite(&self) -> SuiteReport {
        let mut suite = SuiteReport::new("storage");
        let Some(storage) = self.storage.clone() else {
            Self::skip(&mut suite, "object round-trip", "provider has no storage surface");
            return suite;
        };

        self.case(&mut suite, "object round-trip", &[], async {
            let bucket = self.options.storage_bucket.as_str();
            let path = format!("{}.txt", Self::unique("object"));
            let payload = b"conformance payload".to_vec();

            storage
                .upload(bucket, &path, payload.clone(), Some("text/plain"))
                .await
                .map_err(es)?;
            let downloaded = storage.download(bucket, &path).await.map_err(es)?;
            let matches = downloaded == payload;
            // Best-effort cleanup before asserting, so a mismatch does not
            // leak the object.
            if let Err(err) = storage.delete_object(bucket, &path).await {
                tracing::debug!(error = %err, "storage cleanup failed");
            }
            ensure(matches, "downloaded bytes differ from uploaded bytes")
        })
        .await;

        suite
    }
}
