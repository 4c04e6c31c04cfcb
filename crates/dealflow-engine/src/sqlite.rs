//! SQLite-backed implementations of the engine's storage contracts.
//!
//! Thin adapters over the store crate: `SqliteStore` maps the async
//! `DataStore` trait onto the synchronous `RecordStore`, and
//! `SqlitePlanStore` serializes plans into `PlanRepository` rows.

use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value as Json;
use uuid::Uuid;

use dealflow_core::error::DealflowError;
use dealflow_core::types::JsonMap;
use dealflow_store::{Database, PlanRepository, PlanRow, RecordStore};

use crate::plan::{PlanStore, StoredPlan};
use crate::store::DataStore;
use crate::types::{ActionPlan, PlanStatus};

/// `DataStore` over the SQLite record store.
pub struct SqliteStore {
    records: RecordStore,
}

impl SqliteStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self {
            records: RecordStore::new(db),
        }
    }
}

#[async_trait]
impl DataStore for SqliteStore {
    async fn insert(
        &self,
        user_id: &str,
        table: &str,
        values: &JsonMap,
    ) -> Result<Json, DealflowError> {
        self.records.insert(user_id, table, values)
    }

    async fn update(
        &self,
        user_id: &str,
        table: &str,
        filter: &JsonMap,
        values: &JsonMap,
    ) -> Result<Vec<Json>, DealflowError> {
        self.records.update(user_id, table, filter, values)
    }

    async fn delete(
        &self,
        user_id: &str,
        table: &str,
        filter: &JsonMap,
    ) -> Result<Vec<Json>, DealflowError> {
        self.records.delete(user_id, table, filter)
    }

    async fn select(
        &self,
        user_id: &str,
        table: &str,
        filter: &JsonMap,
    ) -> Result<Vec<Json>, DealflowError> {
        self.records.select(user_id, table, filter)
    }
}

/// `PlanStore` over the SQLite plan repository.
pub struct SqlitePlanStore {
    repo: PlanRepository,
}

impl SqlitePlanStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self {
            repo: PlanRepository::new(db),
        }
    }
}

fn to_row(stored: &StoredPlan) -> Result<PlanRow, DealflowError> {
    Ok(PlanRow {
        id: stored.plan.plan_id.to_string(),
        owner_id: stored.owner_id.clone(),
        status: stored.status.to_string(),
        intent: stored.plan.intent.to_string(),
        body: serde_json::to_string(&stored.plan)?,
        created_at: stored.plan.created_at.0,
    })
}

fn from_row(row: PlanRow) -> Result<StoredPlan, DealflowError> {
    let plan: ActionPlan = serde_json::from_str(&row.body)?;
    let status = PlanStatus::from_str(&row.status)
        .map_err(|e| DealflowError::Storage(format!("corrupt plan row: {}", e)))?;
    Ok(StoredPlan {
        plan,
        owner_id: row.owner_id,
        status,
    })
}

impl PlanStore for SqlitePlanStore {
    fn save(&self, stored: &StoredPlan) -> Result<(), DealflowError> {
        self.repo.save(&to_row(stored)?)
    }

    fn get(&self, plan_id: Uuid) -> Result<Option<StoredPlan>, DealflowError> {
        match self.repo.get(&plan_id.to_string())? {
            Some(row) => Ok(Some(from_row(row)?)),
            None => Ok(None),
        }
    }

    fn set_status(&self, plan_id: Uuid, status: PlanStatus) -> Result<(), DealflowError> {
        self.repo.set_status(&plan_id.to_string(), &status.to_string())
    }

    fn claim(
        &self,
        plan_id: Uuid,
        expected: PlanStatus,
        next: PlanStatus,
    ) -> Result<bool, DealflowError> {
        self.repo.claim(
            &plan_id.to_string(),
            &expected.to_string(),
            &next.to_string(),
        )
    }

    fn update_plan(&self, plan: &ActionPlan) -> Result<(), DealflowError> {
        let body = serde_json::to_string(plan)?;
        self.repo.update_body(&plan.plan_id.to_string(), &body)
    }
}
