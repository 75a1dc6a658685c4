//! Persistence collaborators.
//!
//! The canonical copy of every record lives behind these traits. The core
//! only ever holds transient views and writes snapshots back.

use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::{DailyActivityRecord, DailyNutritionRecord};

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait ActivityStore: Send + Sync {
    async fn get_activity_by_date(&self, date: NaiveDate)
        -> StoreResult<Option<DailyActivityRecord>>;

    /// Inserts a new record and returns the ID assigned to it.
    async fn save_activity(&self, record: &DailyActivityRecord) -> StoreResult<Uuid>;

    /// Overwrites the record whose `id` matches.
    async fn update_activity(&self, record: &DailyActivityRecord) -> StoreResult<()>;

    /// Records dated within `from..=to`, oldest first.
    async fn list_activity_range(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> StoreResult<Vec<DailyActivityRecord>>;
}

#[async_trait]
pub trait NutritionStore: Send + Sync {
    async fn get_nutrition_by_date(
        &self,
        date: NaiveDate,
    ) -> StoreResult<Option<DailyNutritionRecord>>;

    async fn save_nutrition(&self, record: &DailyNutritionRecord) -> StoreResult<Uuid>;

    async fn update_nutrition(&self, record: &DailyNutritionRecord) -> StoreResult<()>;

    /// Records dated within `from..=to`, oldest first.
    async fn list_nutrition_range(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> StoreResult<Vec<DailyNutritionRecord>>;
}

/// In-process store backed by hash maps.
///
/// `set_failing(true)` makes every call return a backend error until it is
/// switched off again.
#[derive(Default)]
pub struct MemoryStore {
    activity: Mutex<HashMap<Uuid, DailyActivityRecord>>,
    nutrition: Mutex<HashMap<Uuid, DailyNutritionRecord>>,
    failing: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub async fn activity_count(&self) -> usize {
        self.activity.lock().await.len()
    }

    fn check(&self) -> StoreResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("memory store is failing".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl ActivityStore for MemoryStore {
    async fn get_activity_by_date(
        &self,
        date: NaiveDate,
    ) -> StoreResult<Option<DailyActivityRecord>> {
        self.check()?;
        let records = self.activity.lock().await;
        Ok(records.values().find(|r| r.date == date).cloned())
    }

    async fn save_activity(&self, record: &DailyActivityRecord) -> StoreResult<Uuid> {
        self.check()?;
        let id = Uuid::new_v4();
        let mut stored = record.clone();
        stored.id = Some(id);
        self.activity.lock().await.insert(id, stored);
        Ok(id)
    }

    async fn update_activity(&self, record: &DailyActivityRecord) -> StoreResult<()> {
        self.check()?;
        let id = record.id.ok_or_else(|| StoreError::Backend("record has no id".into()))?;
        let mut records = self.activity.lock().await;
        match records.get_mut(&id) {
            Some(existing) => {
                *existing = record.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound(id)),
        }
    }

    async fn list_activity_range(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> StoreResult<Vec<DailyActivityRecord>> {
        self.check()?;
        let records = self.activity.lock().await;
        let mut found: Vec<DailyActivityRecord> = records
            .values()
            .filter(|r| r.date >= from && r.date <= to)
            .cloned()
            .collect();
        found.sort_by_key(|r| r.date);
        Ok(found)
    }
}

#[async_trait]
impl NutritionStore for MemoryStore {
    async fn get_nutrition_by_date(
        &self,
        date: NaiveDate,
    ) -> StoreResult<Option<DailyNutritionRecord>> {
        self.check()?;
        let records = self.nutrition.lock().await;
        Ok(records.values().find(|r| r.date == date).cloned())
    }

    async fn save_nutrition(&self, record: &DailyNutritionRecord) -> StoreResult<Uuid> {
        self.check()?;
        let id = Uuid::new_v4();
        let mut stored = record.clone();
        stored.id = Some(id);
        self.nutrition.lock().await.insert(id, stored);
        Ok(id)
    }

    async fn update_nutrition(&self, record: &DailyNutritionRecord) -> StoreResult<()> {
        self.check()?;
        let id = record.id.ok_or_else(|| StoreError::Backend("record has no id".into()))?;
        let mut records = self.nutrition.lock().await;
        match records.get_mut(&id) {
            Some(existing) => {
                *existing = record.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound(id)),
        }
    }

    async fn list_nutrition_range(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> StoreResult<Vec<DailyNutritionRecord>> {
        self.check()?;
        let records = self.nutrition.lock().await;
        let mut found: Vec<DailyNutritionRecord> = records
            .values()
            .filter(|r| r.date >= from && r.date <= to)
            .cloned()
            .collect();
        found.sort_by_key(|r| r.date);
        Ok(found)
    }
}
