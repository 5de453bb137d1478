//! Tenant-scoped row operations shared by the provider and its
//! transactions. Every function takes the connection it should run on, so
//! the same statements work on a pooled client and inside a transaction.

use serde_json::Value;
use tokio_postgres::Client;

use crate::core::SqlParam;
use crate::core::repository::{is_global_table, merge_row_patch, require_client_scope, row_id};
use crate::error::{BackendError, ProviderError, ProviderResult};

use super::sql::{check_ident, map_pg_error, param_refs};

/// Columns extracted from the JSONB document into real columns, per table.
/// Extracted columns back the foreign keys and the security layer's
/// membership queries.
fn extracted_columns(table: &str) -> &'static [&'static str] {
    match table {
        "client_users" => &["client_id", "user_id", "role", "active"],
        "audit_log" => &["client_id", "user_id", "action", "resource", "success"],
        "users" | "clients" => &[],
        _ => &["client_id"],
    }
}

/// Converts one extracted field of the document to a bindable parameter.
fn column_param(row: &Value, column: &str) -> SqlParam {
    match row.get(column) {
        Some(Value::Bool(b)) => SqlParam::Bool(*b),
        Some(Value::String(s)) => SqlParam::Text(s.clone()),
        Some(Value::Number(n)) => SqlParam::Text(n.to_string()),
        // Missing `active` means active; everything else missing is NULL.
        None | Some(Value::Null) if column == "active" => SqlParam::Bool(true),
        _ => SqlParam::Null,
    }
}

pub(crate) async fn insert_row(
    client: &Client,
    table: &str,
    mut row: Value,
) -> ProviderResult<Value> {
    check_ident(table)?;
    require_client_scope(table, &row)?;

    let id = row_id(&row);
    if let Some(obj) = row.as_object_mut() {
        obj.insert("id".to_string(), Value::String(id.clone()));
    }

    let columns = extracted_columns(table);
    let mut column_names = vec!["id"];
    column_names.extend_from_slice(columns);
    column_names.push("data");

    let mut params: Vec<SqlParam> = Vec::with_capacity(column_names.len());
    params.push(SqlParam::Text(id));
    for column in columns {
        params.push(column_param(&row, column));
    }
    params.push(SqlParam::Json(row.clone()));

    let placeholders = (1..=params.len())
        .map(|n| format!("${n}"))
        .collect::<Vec<_>>()
        .join(", ");
    let sql = format!(
        "INSERT INTO {table} ({}) VALUES ({placeholders})",
        column_names.join(", ")
    );

    client
        .execute(&sql, &param_refs(&params))
        .await
        .map_err(|e| map_pg_error(&format!("insert {table}"), e))?;
    Ok(row)
}

pub(crate) async fn fetch_row(
    client: &Client,
    table: &str,
    client_id: &str,
    id: &str,
) -> ProviderResult<Option<Value>> {
    check_ident(table)?;
    let (sql, params) = if is_global_table(table) {
        (
            format!("SELECT data FROM {table} WHERE id = $1"),
            vec![SqlParam::Text(id.to_string())],
        )
    } else {
        (
            format!("SELECT data FROM {table} WHERE id = $1 AND client_id = $2"),
            vec![
                SqlParam::Text(id.to_string()),
                SqlParam::Text(client_id.to_string()),
            ],
        )
    };

    let row = client
        .query_opt(&sql, &param_refs(&params))
        .await
        .map_err(|e| map_pg_error(&format!("fetch {table}"), e))?;
    match row {
        Some(row) => {
            let data: Value = row.try_get(0).map_err(|e| {
                ProviderError::Backend(BackendError::Serialization {
                    message: format!("data column in '{table}': {e}"),
                })
            })?;
            Ok(Some(data))
        }
        None => Ok(None),
    }
}

pub(crate) async fn list_rows(
    client: &Client,
    table: &str,
    client_id: &str,
) -> ProviderResult<Vec<Value>> {
    check_ident(table)?;
    let (sql, params) = if is_global_table(table) {
        (format!("SELECT data FROM {table} ORDER BY id"), vec![])
    } else {
        (
            format!("SELECT data FROM {table} WHERE client_id = $1 ORDER BY id"),
            vec![SqlParam::Text(client_id.to_string())],
        )
    };

    let rows = client
        .query(&sql, &param_refs(&params))
        .await
        .map_err(|e| map_pg_error(&format!("list {table}"), e))?;

    rows.iter()
        .map(|row| {
            row.try_get::<_, Value>(0).map_err(|e| {
                ProviderError::Backend(BackendError::Serialization {
                    message: format!("data column in '{table}': {e}"),
                })
            })
        })
        .collect()
}

pub(crate) async fn update_row(
    client: &Client,
    table: &str,
    client_id: &str,
    id: &str,
    patch: &Value,
) -> ProviderResult<Value> {
    check_ident(table)?;
    let current = fetch_row(client, table, client_id, id)
        .await?
        .ok_or_else(|| {
            ProviderError::Backend(BackendError::RowNotFound {
                table: table.to_string(),
                id: id.to_string(),
            })
        })?;
    let merged = merge_row_patch(&current, patch);

    let columns = extracted_columns(table);
    let mut sets = vec!["data = $1".to_string()];
    let mut params: Vec<SqlParam> = vec![SqlParam::Json(merged.clone())];
    for column in columns {
        params.push(column_param(&merged, column));
        sets.push(format!("{column} = ${}", params.len()));
    }

    params.push(SqlParam::Text(id.to_string()));
    let mut sql = format!(
        "UPDATE {table} SET {} WHERE id = ${}",
        sets.join(", "),
        params.len()
    );
    if !is_global_table(table) {
        params.push(SqlParam::Text(client_id.to_string()));
        sql.push_str(&format!(" AND client_id = ${}", params.len()));
    }

    client
        .execute(&sql, &param_refs(&params))
        .await
        .map_err(|e| map_pg_error(&format!("update {table}"), e))?;
    Ok(merged)
}

pub(crate) async fn delete_row(
    client: &Client,
    table: &str,
    client_id: &str,
    id: &str,
) -> ProviderResult<()> {
    check_ident(table)?;
    let (sql, params) = if is_global_table(table) {
        (
            format!("DELETE FROM {table} WHERE id = $1"),
            vec![SqlParam::Text(id.to_string())],
        )
    } else {
        (
            format!("DELETE FROM {table} WHERE id = $1 AND client_id = $2"),
            vec![
                SqlParam::Text(id.to_string()),
                SqlParam::Text(client_id.to_string()),
            ],
        )
    };

    client
        .execute(&sql, &param_refs(&params))
        .await
        .map_err(|e| map_pg_error(&format!("delete {table}"), e))?;
    Ok(())
}
