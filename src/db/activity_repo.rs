use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::SqlitePool;
use uuid::Uuid;

use fittrack_core::{ActivityStore, DailyActivityRecord, StoreError, StoreResult};

/// Activity records for one user.
pub struct ActivityRepository {
    pool: SqlitePool,
    user_id: String,
}

#[derive(sqlx::FromRow)]
struct ActivityRow {
    id: String,
    date: String,
    step_count: i64,
    distance_meters: f64,
    calories_burned: f64,
    last_sync_timestamp: Option<i64>,
}

impl ActivityRepository {
    pub fn new(pool: SqlitePool, user_id: impl Into<String>) -> Self {
        Self {
            pool,
            user_id: user_id.into(),
        }
    }

    pub async fn get_by_date(
        &self,
        date: NaiveDate,
    ) -> Result<Option<DailyActivityRecord>, sqlx::Error> {
        let row: Option<ActivityRow> = sqlx::query_as(
            r#"
            SELECT id, date, step_count, distance_meters, calories_burned, last_sync_timestamp
            FROM activity_records
            WHERE user_id = ? AND date = ?
            "#,
        )
        .bind(&self.user_id)
        .bind(date.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(hydrate).transpose()
    }

    pub async fn list_range(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<DailyActivityRecord>, sqlx::Error> {
        let rows: Vec<ActivityRow> = sqlx::query_as(
            r#"
            SELECT id, date, step_count, distance_meters, calories_burned, last_sync_timestamp
            FROM activity_records
            WHERE user_id = ? AND date >= ? AND date <= ?
            ORDER BY date
            "#,
        )
        .bind(&self.user_id)
        .bind(from.to_string())
        .bind(to.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(hydrate).collect()
    }

    pub async fn create(&self, record: &DailyActivityRecord) -> Result<Uuid, sqlx::Error> {
        let id = Uuid::new_v4();

        sqlx::query(
            r#"
            INSERT INTO activity_records
                (id, user_id, date, step_count, distance_meters, calories_burned, last_sync_timestamp)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(id.to_string())
        .bind(&self.user_id)
        .bind(record.date.to_string())
        .bind(to_db_steps(record.step_count))
        .bind(record.distance_meters)
        .bind(record.calories_burned)
        .bind(record.last_sync_timestamp)
        .execute(&self.pool)
        .await?;

        Ok(id)
    }

    /// Returns false when no row matched.
    pub async fn update(&self, id: Uuid, record: &DailyActivityRecord) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE activity_records
            SET date = ?, step_count = ?, distance_meters = ?, calories_burned = ?,
                last_sync_timestamp = ?
            WHERE id = ? AND user_id = ?
            "#,
        )
        .bind(record.date.to_string())
        .bind(to_db_steps(record.step_count))
        .bind(record.distance_meters)
        .bind(record.calories_burned)
        .bind(record.last_sync_timestamp)
        .bind(id.to_string())
        .bind(&self.user_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}

fn to_db_steps(steps: u64) -> i64 {
    i64::try_from(steps).unwrap_or(i64::MAX)
}

fn hydrate(row: ActivityRow) -> Result<DailyActivityRecord, sqlx::Error> {
    let id = Uuid::parse_str(&row.id).map_err(|e| sqlx::Error::Decode(Box::new(e)))?;
    let date = NaiveDate::parse_from_str(&row.date, "%Y-%m-%d")
        .map_err(|e| sqlx::Error::Decode(Box::new(e)))?;

    Ok(DailyActivityRecord {
        id: Some(id),
        date,
        step_count: u64::try_from(row.step_count).unwrap_or(0),
        distance_meters: row.distance_meters.max(0.0),
        calories_burned: row.calories_burned.max(0.0),
        last_sync_timestamp: row.last_sync_timestamp,
    })
}

fn backend(e: sqlx::Error) -> StoreError {
    StoreError::Backend(e.to_string())
}

#[async_trait]
impl ActivityStore for ActivityRepository {
    async fn get_activity_by_date(
        &self,
        date: NaiveDate,
    ) -> StoreResult<Option<DailyActivityRecord>> {
        self.get_by_date(date).await.map_err(backend)
    }

    async fn save_activity(&self, record: &DailyActivityRecord) -> StoreResult<Uuid> {
        self.create(record).await.map_err(backend)
    }

    async fn update_activity(&self, record: &DailyActivityRecord) -> StoreResult<()> {
        let id = record
            .id
            .ok_or_else(|| StoreError::Backend("activity record has no id".into()))?;
        match self.update(id, record).await.map_err(backend)? {
            true => Ok(()),
            false => Err(StoreError::NotFound(id)),
        }
    }

    async fn list_activity_range(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> StoreResult<Vec<DailyActivityRecord>> {
        self.list_range(from, to).await.map_err(backend)
    }
}
