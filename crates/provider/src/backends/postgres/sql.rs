//! SQL plumbing for the PostgreSQL backend: parameter binding, row
//! decoding, error classification, and DDL generation.

use postgres_types::{IsNull, ToSql, Type, to_sql_checked};
use serde_json::Value;
use tokio_postgres::Row;
use tokio_postgres::error::SqlState;

use crate::core::{ColumnType, IndexDef, Record, SqlParam, TableDef};
use crate::error::{
    BackendError, ConfigError, ConnectionError, IntegrityError, ProviderError, ProviderResult,
    TransientError,
};

impl ToSql for SqlParam {
    fn to_sql(
        &self,
        ty: &Type,
        out: &mut postgres_types::private::BytesMut,
    ) -> Result<IsNull, Box<dyn std::error::Error + Sync + Send>> {
        match self {
            SqlParam::Null => Ok(IsNull::Yes),
            SqlParam::Bool(v) => v.to_sql(ty, out),
            SqlParam::Int(v) => v.to_sql(ty, out),
            SqlParam::Float(v) => v.to_sql(ty, out),
            SqlParam::Text(v) => v.to_sql(ty, out),
            SqlParam::Uuid(v) => v.to_sql(ty, out),
            SqlParam::Timestamp(v) => v.to_sql(ty, out),
            SqlParam::Json(v) => v.to_sql(ty, out),
        }
    }

    // Parameters are dynamically typed; the driver checks the concrete
    // value against the column type at bind time.
    fn accepts(_ty: &Type) -> bool {
        true
    }

    to_sql_checked!();
}

/// Borrows a parameter slice in the form the driver expects.
pub(crate) fn param_refs(params: &[SqlParam]) -> Vec<&(dyn ToSql + Sync)> {
    params.iter().map(|p| p as &(dyn ToSql + Sync)).collect()
}

/// Decodes a driver row into a provider-neutral [`Record`].
pub(crate) fn record_from_row(row: &Row) -> ProviderResult<Record> {
    let mut record = Record::new();
    for (idx, column) in row.columns().iter().enumerate() {
        let name = column.name().to_string();
        let ty = column.type_();
        let value = decode_column(row, idx, ty).map_err(|e| {
            ProviderError::Backend(BackendError::Serialization {
                message: format!("column '{name}': {e}"),
            })
        })?;
        record.insert(name, value);
    }
    Ok(record)
}

fn decode_column(row: &Row, idx: usize, ty: &Type) -> Result<Value, tokio_postgres::Error> {
    let value = if *ty == Type::BOOL {
        row.try_get::<_, Option<bool>>(idx)?.map(Value::from)
    } else if *ty == Type::INT2 {
        row.try_get::<_, Option<i16>>(idx)?.map(Value::from)
    } else if *ty == Type::INT4 {
        row.try_get::<_, Option<i32>>(idx)?.map(Value::from)
    } else if *ty == Type::INT8 {
        row.try_get::<_, Option<i64>>(idx)?.map(Value::from)
    } else if *ty == Type::FLOAT4 {
        row.try_get::<_, Option<f32>>(idx)?.map(Value::from)
    } else if *ty == Type::FLOAT8 {
        row.try_get::<_, Option<f64>>(idx)?.map(Value::from)
    } else if *ty == Type::JSON || *ty == Type::JSONB {
        row.try_get::<_, Option<Value>>(idx)?
    } else if *ty == Type::UUID {
        row.try_get::<_, Option<uuid::Uuid>>(idx)?
            .map(|u| Value::String(u.to_string()))
    } else if *ty == Type::TIMESTAMPTZ {
        row.try_get::<_, Option<chrono::DateTime<chrono::Utc>>>(idx)?
            .map(|t| Value::String(t.to_rfc3339()))
    } else if *ty == Type::TIMESTAMP {
        row.try_get::<_, Option<chrono::NaiveDateTime>>(idx)?
            .map(|t| Value::String(t.to_string()))
    } else {
        // TEXT, VARCHAR, NAME, and anything else with a textual encoding.
        row.try_get::<_, Option<String>>(idx)?.map(Value::String)
    };
    Ok(value.unwrap_or(Value::Null))
}

/// Classifies a driver error into the provider taxonomy.
pub(crate) fn map_pg_error(operation: &str, err: tokio_postgres::Error) -> ProviderError {
    if let Some(db) = err.as_db_error() {
        let table = db.table().unwrap_or("unknown").to_string();
        let code = db.code();
        if *code == SqlState::UNIQUE_VIOLATION {
            return ProviderError::Integrity(IntegrityError::Unique {
                table,
                message: db.message().to_string(),
            });
        }
        if *code == SqlState::FOREIGN_KEY_VIOLATION {
            return ProviderError::Integrity(IntegrityError::ForeignKey {
                table,
                message: db.message().to_string(),
            });
        }
        if *code == SqlState::CHECK_VIOLATION || *code == SqlState::NOT_NULL_VIOLATION {
            return ProviderError::Integrity(IntegrityError::Constraint {
                table,
                message: db.message().to_string(),
            });
        }
        if *code == SqlState::QUERY_CANCELED {
            return ProviderError::Transient(TransientError::Timeout {
                operation: operation.to_string(),
                timeout_ms: 0,
            });
        }
        if code.code().starts_with("08") {
            return ProviderError::Transient(TransientError::Network {
                operation: operation.to_string(),
                message: db.message().to_string(),
            });
        }
        return ProviderError::Backend(BackendError::Query {
            operation: operation.to_string(),
            message: db.message().to_string(),
            source: Some(Box::new(err)),
        });
    }

    if err.is_closed() {
        return ProviderError::Connection(ConnectionError::Failed {
            provider: "postgres".to_string(),
            message: "connection closed".to_string(),
        });
    }

    ProviderError::Backend(BackendError::Query {
        operation: operation.to_string(),
        message: err.to_string(),
        source: Some(Box::new(err)),
    })
}

/// A short operation label for error context: the leading keywords of the
/// statement, never bound parameter values.
pub(crate) fn op_label(sql: &str) -> String {
    sql.split_whitespace().take(4).collect::<Vec<_>>().join(" ")
}

/// Validates an SQL identifier before interpolation into DDL or row-surface
/// statements. Identifiers come from code constants, not user input; this
/// is a backstop, not an escape mechanism.
pub(crate) fn check_ident(name: &str) -> ProviderResult<&str> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
    if valid {
        Ok(name)
    } else {
        Err(ProviderError::Config(ConfigError::InvalidValue {
            field: "identifier".to_string(),
            message: format!("'{name}' is not a valid identifier"),
        }))
    }
}

fn column_type_sql(column_type: ColumnType) -> &'static str {
    match column_type {
        ColumnType::Text => "TEXT",
        ColumnType::BigInt => "BIGINT",
        ColumnType::Double => "DOUBLE PRECISION",
        ColumnType::Boolean => "BOOLEAN",
        ColumnType::TimestampTz => "TIMESTAMPTZ",
        ColumnType::Uuid => "UUID",
        ColumnType::Json => "JSONB",
    }
}

/// Renders CREATE TABLE DDL from a definition.
pub(crate) fn table_ddl(table: &TableDef) -> ProviderResult<String> {
    check_ident(&table.name)?;
    let mut columns = Vec::with_capacity(table.columns.len());
    for column in &table.columns {
        check_ident(&column.name)?;
        let mut sql = format!("{} {}", column.name, column_type_sql(column.column_type));
        if column.primary_key {
            sql.push_str(" PRIMARY KEY");
        } else if !column.nullable {
            sql.push_str(" NOT NULL");
        }
        if let Some((ref_table, ref_column)) = &column.references {
            check_ident(ref_table)?;
            check_ident(ref_column)?;
            sql.push_str(&format!(" REFERENCES {ref_table}({ref_column})"));
        }
        columns.push(sql);
    }
    Ok(format!(
        "CREATE TABLE IF NOT EXISTS {} ({})",
        table.name,
        columns.join(", ")
    ))
}

/// Renders CREATE INDEX DDL from a definition.
pub(crate) fn index_ddl(index: &IndexDef) -> ProviderResult<String> {
    check_ident(&index.name)?;
    check_ident(&index.table)?;
    for column in &index.columns {
        check_ident(column)?;
    }
    let unique = if index.unique { "UNIQUE " } else { "" };
    Ok(format!(
        "CREATE {}INDEX IF NOT EXISTS {} ON {} ({})",
        unique,
        index.name,
        index.table,
        index.columns.join(", ")
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ColumnDef;

    #[test]
    fn test_op_label_truncates() {
        assert_eq!(
            op_label("SELECT data FROM deliveries WHERE client_id = $1"),
            "SELECT data FROM deliveries"
        );
        assert_eq!(op_label("COMMIT"), "COMMIT");
    }

    #[test]
    fn test_check_ident() {
        assert!(check_ident("client_users").is_ok());
        assert!(check_ident("t2").is_ok());
        assert!(check_ident("").is_err());
        assert!(check_ident("drop table x; --").is_err());
        assert!(check_ident("Deliveries").is_err());
    }

    #[test]
    fn test_table_ddl() {
        let table = TableDef::new("deliveries")
            .column(ColumnDef::new("id", ColumnType::Text).primary_key())
            .column(
                ColumnDef::new("client_id", ColumnType::Text)
                    .not_null()
                    .references("clients", "id"),
            )
            .column(ColumnDef::new("data", ColumnType::Json));

        let ddl = table_ddl(&table).unwrap();
        assert_eq!(
            ddl,
            "CREATE TABLE IF NOT EXISTS deliveries (id TEXT PRIMARY KEY, \
             client_id TEXT NOT NULL REFERENCES clients(id), data JSONB)"
        );
    }

    #[test]
    fn test_index_ddl() {
        let index = IndexDef {
            name: "idx_deliveries_client".to_string(),
            table: "deliveries".to_string(),
            columns: vec!["client_id".to_string()],
            unique: false,
        };
        assert_eq!(
            index_ddl(&index).unwrap(),
            "CREATE INDEX IF NOT EXISTS idx_deliveries_client ON deliveries (client_id)"
        );

        let unique = IndexDef {
            name: "idx_membership".to_string(),
            table: "client_users".to_string(),
            columns: vec!["client_id".to_string(), "user_id".to_string()],
            unique: true,
        };
        assert!(index_ddl(&unique).unwrap().starts_with("CREATE UNIQUE INDEX"));
    }

    #[test]
    fn test_ddl_rejects_bad_identifiers() {
        let table = TableDef::new("bad; drop")
            .column(ColumnDef::new("id", ColumnType::Text).primary_key());
        assert!(table_ddl(&table).is_err());
    }
}
