//! Collaborator traits for the executor, plus in-memory implementations.
//!
//! The executor depends only on these narrow contracts, never on a concrete
//! storage engine or mail system. Both traits require the implementation to
//! scope every operation to the acting user's own records.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value as Json;
use uuid::Uuid;

use dealflow_core::error::DealflowError;
use dealflow_core::types::JsonMap;

/// Typed record operations scoped by table, predicate, and values.
///
/// Where-predicates are key-to-value equality conjunctions. Implementations
/// must conjoin the ownership predicate themselves; the caller-supplied
/// predicate is never trusted to carry it.
#[async_trait]
pub trait DataStore: Send + Sync {
    /// Insert a record and return the stored row (including generated `id`).
    async fn insert(&self, user_id: &str, table: &str, values: &JsonMap)
        -> Result<Json, DealflowError>;

    /// Update matching records and return the post-update rows.
    async fn update(
        &self,
        user_id: &str,
        table: &str,
        filter: &JsonMap,
        values: &JsonMap,
    ) -> Result<Vec<Json>, DealflowError>;

    /// Delete matching records and return the deleted rows.
    async fn delete(&self, user_id: &str, table: &str, filter: &JsonMap)
        -> Result<Vec<Json>, DealflowError>;

    /// Select matching records.
    async fn select(&self, user_id: &str, table: &str, filter: &JsonMap)
        -> Result<Vec<Json>, DealflowError>;
}

/// The groupware send-email collaborator. Irreversible; never rolled back.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), DealflowError>;
}

// =============================================================================
// In-memory implementations
// =============================================================================

/// In-memory `DataStore` with the same semantics as the SQLite-backed store:
/// owner scoping, id generation, and snapshot-returning delete. Tables can be
/// poisoned to fail on demand for failure-path tests.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<HashMap<String, Vec<Json>>>,
    fail_tables: Mutex<HashSet<String>>,
    writes: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent operation on `table` fail.
    pub fn fail_table(&self, table: &str) {
        if let Ok(mut tables) = self.fail_tables.lock() {
            tables.insert(table.to_string());
        }
    }

    /// Number of mutating operations that changed at least one row.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// All of the owner's rows in a table, for test assertions.
    pub fn rows(&self, user_id: &str, table: &str) -> Vec<Json> {
        let Ok(tables) = self.tables.lock() else {
            return Vec::new();
        };
        tables
            .get(table)
            .map(|rows| {
                rows.iter()
                    .filter(|r| r["owner_id"] == user_id)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    fn check_poisoned(&self, table: &str) -> Result<(), DealflowError> {
        let poisoned = self
            .fail_tables
            .lock()
            .map_err(|_| lock_poisoned())?
            .contains(table);
        if poisoned {
            return Err(DealflowError::Storage(format!(
                "simulated failure on {}",
                table
            )));
        }
        Ok(())
    }
}

fn lock_poisoned() -> DealflowError {
    DealflowError::Storage("memory store lock poisoned".to_string())
}

fn matches(row: &Json, user_id: &str, filter: &JsonMap) -> bool {
    if row["owner_id"] != user_id {
        return false;
    }
    filter.iter().all(|(k, v)| row.get(k) == Some(v))
}

#[async_trait]
impl DataStore for MemoryStore {
    async fn insert(
        &self,
        user_id: &str,
        table: &str,
        values: &JsonMap,
    ) -> Result<Json, DealflowError> {
        self.check_poisoned(table)?;

        let mut row = values.clone();
        let id = match row.get("id") {
            Some(Json::String(s)) if !s.is_empty() => s.clone(),
            _ => Uuid::new_v4().to_string(),
        };
        row.insert("id".to_string(), Json::String(id));
        row.insert("owner_id".to_string(), Json::String(user_id.to_string()));
        let row = Json::Object(row);

        self.tables
            .lock()
            .map_err(|_| lock_poisoned())?
            .entry(table.to_string())
            .or_default()
            .push(row.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(row)
    }

    async fn update(
        &self,
        user_id: &str,
        table: &str,
        filter: &JsonMap,
        values: &JsonMap,
    ) -> Result<Vec<Json>, DealflowError> {
        self.check_poisoned(table)?;
        if filter.is_empty() {
            return Err(DealflowError::Validation(
                "update requires a non-empty predicate".to_string(),
            ));
        }

        let mut tables = self.tables.lock().map_err(|_| lock_poisoned())?;
        let rows = tables.entry(table.to_string()).or_default();
        let mut updated = Vec::new();
        for row in rows.iter_mut() {
            if matches(row, user_id, filter) {
                let object = row.as_object_mut().ok_or_else(|| {
                    DealflowError::Storage("non-object row in memory store".to_string())
                })?;
                for (k, v) in values {
                    if k == "id" || k == "owner_id" {
                        continue;
                    }
                    object.insert(k.clone(), v.clone());
                }
                updated.push(row.clone());
            }
        }
        if !updated.is_empty() {
            self.writes.fetch_add(1, Ordering::SeqCst);
        }
        Ok(updated)
    }

    async fn delete(
        &self,
        user_id: &str,
        table: &str,
        filter: &JsonMap,
    ) -> Result<Vec<Json>, DealflowError> {
        self.check_poisoned(table)?;
        if filter.is_empty() {
            return Err(DealflowError::Validation(
                "delete requires a non-empty predicate".to_string(),
            ));
        }

        let mut tables = self.tables.lock().map_err(|_| lock_poisoned())?;
        let rows = tables.entry(table.to_string()).or_default();
        let (deleted, kept): (Vec<Json>, Vec<Json>) = rows
            .drain(..)
            .partition(|row| matches(row, user_id, filter));
        *rows = kept;
        if !deleted.is_empty() {
            self.writes.fetch_add(1, Ordering::SeqCst);
        }
        Ok(deleted)
    }

    async fn select(
        &self,
        user_id: &str,
        table: &str,
        filter: &JsonMap,
    ) -> Result<Vec<Json>, DealflowError> {
        self.check_poisoned(table)?;
        let tables = self.tables.lock().map_err(|_| lock_poisoned())?;
        Ok(tables
            .get(table)
            .map(|rows| {
                rows.iter()
                    .filter(|row| matches(row, user_id, filter))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}

/// A sent email captured by the recording mailer.
#[derive(Debug, Clone, PartialEq)]
pub struct SentMail {
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// Mailer that records outbound messages instead of delivering them.
#[derive(Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<SentMail>>,
    fail: AtomicBool,
}

impl RecordingMailer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<SentMail> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), DealflowError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(DealflowError::Mail("relay refused".to_string()));
        }
        self.sent.lock().map_err(|_| lock_poisoned())?.push(SentMail {
            to: to.to_string(),
            subject: subject.to_string(),
            body: body.to_string(),
        });
        Ok(())
    }
}
