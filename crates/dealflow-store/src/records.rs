//! Tenant-scoped CRM record store.
//!
//! Generic insert/update/delete/select against a closed registry of record
//! tables. Every operation is scoped to the acting user: the `owner_id`
//! predicate is conjoined by this module and never taken from the caller's
//! where-map. Column names are validated against the registry and all values
//! are bound as parameters, so step input can never reach SQL text.

use std::sync::Arc;

use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::Connection;
use serde_json::Value as Json;
use uuid::Uuid;

use dealflow_core::error::DealflowError;
use dealflow_core::types::JsonMap;

use crate::db::Database;

/// A record table the executor is allowed to touch.
struct TableSpec {
    name: &'static str,
    /// Columns a plan step may write. `id`, `owner_id`, and `created_at` are
    /// managed by the store itself.
    writable: &'static [&'static str],
}

const TABLES: &[TableSpec] = &[
    TableSpec {
        name: "clients",
        writable: &[
            "client_name",
            "brand_name",
            "stage",
            "contract_status",
            "contract_value",
            "notes",
        ],
    },
    TableSpec {
        name: "contacts",
        writable: &["client_id", "name", "email", "phone", "role"],
    },
    TableSpec {
        name: "activities",
        writable: &["client_id", "activity_type", "summary", "occurred_at"],
    },
    TableSpec {
        name: "schedules",
        writable: &["client_id", "title", "scheduled_at", "location"],
    },
    TableSpec {
        name: "reminders",
        writable: &["title", "remind_at"],
    },
    TableSpec {
        name: "proposals",
        writable: &["client_id", "title", "amount", "status"],
    },
    TableSpec {
        name: "documents",
        writable: &["client_id", "file_name", "url"],
    },
];

fn spec(table: &str) -> Result<&'static TableSpec, DealflowError> {
    TABLES
        .iter()
        .find(|t| t.name == table)
        .ok_or_else(|| DealflowError::UnknownTable(table.to_string()))
}

/// Store for CRM records, shared by the executor and the duplicate detector.
pub struct RecordStore {
    db: Arc<Database>,
}

impl RecordStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Insert a record, returning the stored row.
    ///
    /// An `id` in `values` is honored (rollback re-inserts deleted rows under
    /// their original ids); otherwise a v4 UUID is generated. A supplied
    /// `owner_id` is ignored — the row is always stamped with the acting
    /// user's id.
    pub fn insert(&self, owner_id: &str, table: &str, values: &JsonMap) -> Result<Json, DealflowError> {
        let spec = spec(table)?;

        let id = match values.get("id") {
            Some(Json::String(s)) if !s.is_empty() => s.clone(),
            Some(Json::Null) | None => Uuid::new_v4().to_string(),
            Some(other) => {
                return Err(DealflowError::Validation(format!(
                    "id must be a string, got {}",
                    other
                )))
            }
        };

        let mut columns = vec!["id".to_string(), "owner_id".to_string()];
        let mut params: Vec<SqlValue> = vec![
            SqlValue::Text(id.clone()),
            SqlValue::Text(owner_id.to_string()),
        ];
        for (key, value) in values {
            if key == "id" || key == "owner_id" {
                continue;
            }
            check_column(spec, key, true)?;
            columns.push(key.clone());
            params.push(json_to_sql(value));
        }

        let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("?{}", i)).collect();
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            spec.name,
            columns.join(", "),
            placeholders.join(", ")
        );

        self.db.with_conn(|conn| {
            conn.execute(&sql, rusqlite::params_from_iter(params.iter()))
                .map_err(|e| DealflowError::Storage(format!("Insert into {} failed: {}", table, e)))?;

            let rows = query_rows(
                conn,
                &format!("SELECT * FROM {} WHERE owner_id = ?1 AND id = ?2", spec.name),
                vec![
                    SqlValue::Text(owner_id.to_string()),
                    SqlValue::Text(id.clone()),
                ],
            )?;
            rows.into_iter()
                .next()
                .ok_or_else(|| DealflowError::Storage("Inserted row not found".to_string()))
        })
    }

    /// Select records matching the equality predicate, scoped to the owner.
    /// An empty filter returns all of the owner's rows in the table.
    pub fn select(&self, owner_id: &str, table: &str, filter: &JsonMap) -> Result<Vec<Json>, DealflowError> {
        let spec = spec(table)?;
        let (where_sql, params) = build_where(spec, owner_id, filter)?;
        self.db.with_conn(|conn| {
            query_rows(
                conn,
                &format!("SELECT * FROM {} WHERE {}", spec.name, where_sql),
                params,
            )
        })
    }

    /// Update records matching the predicate, returning the post-update rows.
    ///
    /// The matching row set is pinned by id before mutating, so the returned
    /// rows are exactly the ones changed even when the update rewrites a
    /// filtered column. Returns an empty vec when nothing matched; callers
    /// decide whether that is an error.
    pub fn update(
        &self,
        owner_id: &str,
        table: &str,
        filter: &JsonMap,
        values: &JsonMap,
    ) -> Result<Vec<Json>, DealflowError> {
        let spec = spec(table)?;
        if filter.is_empty() {
            return Err(DealflowError::Validation(
                "update requires a non-empty predicate".to_string(),
            ));
        }
        if values.is_empty() {
            return Err(DealflowError::Validation(
                "update requires at least one value".to_string(),
            ));
        }

        let mut set_cols = Vec::new();
        for key in values.keys() {
            if key == "id" || key == "owner_id" {
                return Err(DealflowError::Validation(format!(
                    "column {} is managed and cannot be updated",
                    key
                )));
            }
            check_column(spec, key, false)?;
            set_cols.push(key.clone());
        }

        let (where_sql, where_params) = build_where(spec, owner_id, filter)?;

        self.db.with_conn(|conn| {
            let ids = matching_ids(conn, spec.name, &where_sql, &where_params)?;
            if ids.is_empty() {
                return Ok(Vec::new());
            }

            let mut params: Vec<SqlValue> = values.values().map(json_to_sql).collect();
            params.push(SqlValue::Text(owner_id.to_string()));
            let set_sql: Vec<String> = set_cols
                .iter()
                .enumerate()
                .map(|(i, c)| format!("{} = ?{}", c, i + 1))
                .collect();
            let id_placeholders: Vec<String> = ids
                .iter()
                .enumerate()
                .map(|(i, _)| format!("?{}", set_cols.len() + 2 + i))
                .collect();
            for id in &ids {
                params.push(SqlValue::Text(id.clone()));
            }

            let sql = format!(
                "UPDATE {} SET {} WHERE owner_id = ?{} AND id IN ({})",
                spec.name,
                set_sql.join(", "),
                set_cols.len() + 1,
                id_placeholders.join(", ")
            );
            conn.execute(&sql, rusqlite::params_from_iter(params.iter()))
                .map_err(|e| DealflowError::Storage(format!("Update of {} failed: {}", table, e)))?;

            rows_by_ids(conn, spec.name, owner_id, &ids)
        })
    }

    /// Delete records matching the predicate, returning the deleted rows
    /// (the pre-delete snapshot rollback re-inserts from).
    pub fn delete(&self, owner_id: &str, table: &str, filter: &JsonMap) -> Result<Vec<Json>, DealflowError> {
        let spec = spec(table)?;
        if filter.is_empty() {
            return Err(DealflowError::Validation(
                "delete requires a non-empty predicate".to_string(),
            ));
        }
        let (where_sql, params) = build_where(spec, owner_id, filter)?;

        self.db.with_conn(|conn| {
            let rows = query_rows(
                conn,
                &format!("SELECT * FROM {} WHERE {}", spec.name, where_sql),
                params.clone(),
            )?;
            if rows.is_empty() {
                return Ok(rows);
            }
            conn.execute(
                &format!("DELETE FROM {} WHERE {}", spec.name, where_sql),
                rusqlite::params_from_iter(params.iter()),
            )
            .map_err(|e| DealflowError::Storage(format!("Delete from {} failed: {}", table, e)))?;
            Ok(rows)
        })
    }

    /// Count the owner's rows in one table.
    pub fn count(&self, owner_id: &str, table: &str) -> Result<u64, DealflowError> {
        let spec = spec(table)?;
        self.db.with_conn(|conn| {
            let count: i64 = conn
                .query_row(
                    &format!("SELECT COUNT(*) FROM {} WHERE owner_id = ?1", spec.name),
                    [owner_id],
                    |row| row.get(0),
                )
                .map_err(|e| DealflowError::Storage(e.to_string()))?;
            Ok(count as u64)
        })
    }

    /// Total rows across every record table, all owners. Used to assert the
    /// zero-additional-writes property of rejected executions.
    pub fn total_rows(&self) -> Result<u64, DealflowError> {
        self.db.with_conn(|conn| {
            let mut total = 0i64;
            for spec in TABLES {
                let count: i64 = conn
                    .query_row(&format!("SELECT COUNT(*) FROM {}", spec.name), [], |row| {
                        row.get(0)
                    })
                    .map_err(|e| DealflowError::Storage(e.to_string()))?;
                total += count;
            }
            Ok(total as u64)
        })
    }
}

fn check_column(spec: &TableSpec, column: &str, allow_managed: bool) -> Result<(), DealflowError> {
    if allow_managed && (column == "id" || column == "created_at") {
        return Ok(());
    }
    if spec.writable.contains(&column) {
        return Ok(());
    }
    Err(DealflowError::UnknownColumn {
        table: spec.name.to_string(),
        column: column.to_string(),
    })
}

/// Build `owner_id = ?1 AND col = ?2 AND ...` plus its parameter list.
fn build_where(
    spec: &TableSpec,
    owner_id: &str,
    filter: &JsonMap,
) -> Result<(String, Vec<SqlValue>), DealflowError> {
    let mut clauses = vec!["owner_id = ?1".to_string()];
    let mut params = vec![SqlValue::Text(owner_id.to_string())];
    for (key, value) in filter {
        if key == "owner_id" {
            return Err(DealflowError::Validation(
                "owner_id cannot appear in a predicate; scoping is implicit".to_string(),
            ));
        }
        check_column(spec, key, true)?;
        params.push(json_to_sql(value));
        clauses.push(format!("{} = ?{}", key, params.len()));
    }
    Ok((clauses.join(" AND "), params))
}

fn matching_ids(
    conn: &Connection,
    table: &str,
    where_sql: &str,
    params: &[SqlValue],
) -> Result<Vec<String>, DealflowError> {
    let sql = format!("SELECT id FROM {} WHERE {}", table, where_sql);
    let mut stmt = conn
        .prepare(&sql)
        .map_err(|e| DealflowError::Storage(e.to_string()))?;
    let rows = stmt
        .query_map(rusqlite::params_from_iter(params.iter()), |row| {
            row.get::<_, String>(0)
        })
        .map_err(|e| DealflowError::Storage(e.to_string()))?;
    let mut ids = Vec::new();
    for row in rows {
        ids.push(row.map_err(|e| DealflowError::Storage(e.to_string()))?);
    }
    Ok(ids)
}

fn rows_by_ids(
    conn: &Connection,
    table: &str,
    owner_id: &str,
    ids: &[String],
) -> Result<Vec<Json>, DealflowError> {
    let placeholders: Vec<String> = (2..ids.len() + 2).map(|i| format!("?{}", i)).collect();
    let sql = format!(
        "SELECT * FROM {} WHERE owner_id = ?1 AND id IN ({})",
        table,
        placeholders.join(", ")
    );
    let mut params = vec![SqlValue::Text(owner_id.to_string())];
    for id in ids {
        params.push(SqlValue::Text(id.clone()));
    }
    query_rows(conn, &sql, params)
}

fn query_rows(conn: &Connection, sql: &str, params: Vec<SqlValue>) -> Result<Vec<Json>, DealflowError> {
    let mut stmt = conn
        .prepare(sql)
        .map_err(|e| DealflowError::Storage(e.to_string()))?;
    let column_names: Vec<String> = stmt.column_names().iter().map(|s| s.to_string()).collect();

    let rows = stmt
        .query_map(rusqlite::params_from_iter(params.iter()), |row| {
            let mut object = serde_json::Map::new();
            for (i, name) in column_names.iter().enumerate() {
                object.insert(name.clone(), sql_to_json(row.get_ref(i)?));
            }
            Ok(Json::Object(object))
        })
        .map_err(|e| DealflowError::Storage(e.to_string()))?;

    let mut result = Vec::new();
    for row in rows {
        result.push(row.map_err(|e| DealflowError::Storage(e.to_string()))?);
    }
    Ok(result)
}

fn json_to_sql(value: &Json) -> SqlValue {
    match value {
        Json::Null => SqlValue::Null,
        Json::Bool(b) => SqlValue::Integer(*b as i64),
        Json::Number(n) => {
            if let Some(i) = n.as_i64() {
                SqlValue::Integer(i)
            } else {
                SqlValue::Real(n.as_f64().unwrap_or(0.0))
            }
        }
        Json::String(s) => SqlValue::Text(s.clone()),
        other => SqlValue::Text(other.to_string()),
    }
}

fn sql_to_json(value: ValueRef<'_>) -> Json {
    match value {
        ValueRef::Null => Json::Null,
        ValueRef::Integer(i) => Json::from(i),
        ValueRef::Real(f) => serde_json::Number::from_f64(f).map(Json::Number).unwrap_or(Json::Null),
        ValueRef::Text(t) => Json::String(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(_) => Json::Null,
    }
}
