use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::{Sqlite, SqlitePool, Transaction};
use uuid::Uuid;

use fittrack_core::{
    DailyNutritionRecord, FoodItem, MealSlot, Nutrients, NutritionStore, StoreError, StoreResult,
};

/// Daily nutrition records for one user.
pub struct NutritionRepository {
    pool: SqlitePool,
    user_id: String,
}

#[derive(sqlx::FromRow)]
struct NutritionRow {
    id: String,
    date: String,
}

#[derive(sqlx::FromRow)]
struct FoodItemRow {
    meal_slot: String,
    name: String,
    calories: Option<f64>,
    protein: Option<f64>,
    carbohydrates: Option<f64>,
    fat: Option<f64>,
}

impl NutritionRepository {
    pub fn new(pool: SqlitePool, user_id: impl Into<String>) -> Self {
        Self {
            pool,
            user_id: user_id.into(),
        }
    }

    pub async fn get_by_date(
        &self,
        date: NaiveDate,
    ) -> Result<Option<DailyNutritionRecord>, sqlx::Error> {
        let row: Option<NutritionRow> =
            sqlx::query_as("SELECT id, date FROM nutrition_records WHERE user_id = ? AND date = ?")
                .bind(&self.user_id)
                .bind(date.to_string())
                .fetch_optional(&self.pool)
                .await?;

        match row {
            Some(row) => self.hydrate(row).await.map(Some),
            None => Ok(None),
        }
    }

    pub async fn list_range(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<DailyNutritionRecord>, sqlx::Error> {
        let rows: Vec<NutritionRow> = sqlx::query_as(
            r#"
            SELECT id, date FROM nutrition_records
            WHERE user_id = ? AND date >= ? AND date <= ?
            ORDER BY date
            "#,
        )
        .bind(&self.user_id)
        .bind(from.to_string())
        .bind(to.to_string())
        .fetch_all(&self.pool)
        .await?;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            records.push(self.hydrate(row).await?);
        }
        Ok(records)
    }

    pub async fn create(&self, record: &DailyNutritionRecord) -> Result<Uuid, sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        let id = Uuid::new_v4();

        sqlx::query("INSERT INTO nutrition_records (id, user_id, date) VALUES (?, ?, ?)")
            .bind(id.to_string())
            .bind(&self.user_id)
            .bind(record.date.to_string())
            .execute(&mut *tx)
            .await?;

        insert_items(&mut tx, id, record).await?;
        tx.commit().await?;

        Ok(id)
    }

    /// Replaces the stored items. Returns false when no row matched.
    pub async fn update(&self, id: Uuid, record: &DailyNutritionRecord) -> Result<bool, sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        let id_str = id.to_string();

        let result = sqlx::query("UPDATE nutrition_records SET date = ? WHERE id = ? AND user_id = ?")
            .bind(record.date.to_string())
            .bind(&id_str)
            .bind(&self.user_id)
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            return Ok(false);
        }

        sqlx::query("DELETE FROM food_items WHERE record_id = ?")
            .bind(&id_str)
            .execute(&mut *tx)
            .await?;

        insert_items(&mut tx, id, record).await?;
        tx.commit().await?;

        Ok(true)
    }

    async fn hydrate(&self, row: NutritionRow) -> Result<DailyNutritionRecord, sqlx::Error> {
        let id = Uuid::parse_str(&row.id).map_err(|e| sqlx::Error::Decode(Box::new(e)))?;
        let date = NaiveDate::parse_from_str(&row.date, "%Y-%m-%d")
            .map_err(|e| sqlx::Error::Decode(Box::new(e)))?;

        let items: Vec<FoodItemRow> = sqlx::query_as(
            r#"
            SELECT meal_slot, name, calories, protein, carbohydrates, fat
            FROM food_items
            WHERE record_id = ?
            ORDER BY meal_slot, position
            "#,
        )
        .bind(&row.id)
        .fetch_all(&self.pool)
        .await?;

        let mut record = DailyNutritionRecord::new(date);
        record.id = Some(id);

        for item in items {
            let slot: MealSlot = match item.meal_slot.parse() {
                Ok(slot) => slot,
                Err(e) => {
                    tracing::warn!("Skipping food item '{}': {}", item.name, e);
                    continue;
                }
            };
            let nutrients = Nutrients {
                calories: item.calories,
                protein: item.protein,
                carbohydrates: item.carbohydrates,
                fat: item.fat,
            };
            let food = FoodItem {
                name: item.name,
                nutrients: (nutrients != Nutrients::default()).then_some(nutrients),
            };
            record.add_item(slot, food);
        }

        Ok(record)
    }
}

async fn insert_items(
    tx: &mut Transaction<'_, Sqlite>,
    record_id: Uuid,
    record: &DailyNutritionRecord,
) -> Result<(), sqlx::Error> {
    let record_id = record_id.to_string();

    for meal in record.meals() {
        for (position, item) in meal.items.iter().enumerate() {
            let nutrients = item.nutrients.unwrap_or_default();
            sqlx::query(
                r#"
                INSERT INTO food_items
                    (record_id, meal_slot, position, name, calories, protein, carbohydrates, fat)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&record_id)
            .bind(meal.slot.to_string())
            .bind(position as i64)
            .bind(&item.name)
            .bind(nutrients.calories)
            .bind(nutrients.protein)
            .bind(nutrients.carbohydrates)
            .bind(nutrients.fat)
            .execute(&mut **tx)
            .await?;
        }
    }

    Ok(())
}

fn backend(e: sqlx::Error) -> StoreError {
    StoreError::Backend(e.to_string())
}

#[async_trait]
impl NutritionStore for NutritionRepository {
    async fn get_nutrition_by_date(
        &self,
        date: NaiveDate,
    ) -> StoreResult<Option<DailyNutritionRecord>> {
        self.get_by_date(date).await.map_err(backend)
    }

    async fn save_nutrition(&self, record: &DailyNutritionRecord) -> StoreResult<Uuid> {
        self.create(record).await.map_err(backend)
    }

    async fn update_nutrition(&self, record: &DailyNutritionRecord) -> StoreResult<()> {
        let id = record
            .id
            .ok_or_else(|| StoreError::Backend("nutrition record has no id".into()))?;
        match self.update(id, record).await.map_err(backend)? {
            true => Ok(()),
            false => Err(StoreError::NotFound(id)),
        }
    }

    async fn list_nutrition_range(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> StoreResult<Vec<DailyNutritionRecord>> {
        self.list_range(from, to).await.map_err(backend)
    }
}
