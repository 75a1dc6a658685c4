use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Activity totals for one calendar day.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DailyActivityRecord {
    /// Assigned by the store on first insert.
    pub id: Option<Uuid>,
    pub date: NaiveDate,
    pub step_count: u64,
    pub distance_meters: f64,
    pub calories_burned: f64,
    /// Epoch milliseconds of the last persistence write.
    pub last_sync_timestamp: Option<i64>,
}

impl DailyActivityRecord {
    pub fn new(date: NaiveDate) -> Self {
        Self {
            id: None,
            date,
            step_count: 0,
            distance_meters: 0.0,
            calories_burned: 0.0,
            last_sync_timestamp: None,
        }
    }
}

impl fmt::Display for DailyActivityRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Activity: {}", self.date)?;
        writeln!(f, "{}", "=".repeat(30))?;
        writeln!(f, "Steps:    {}", self.step_count)?;
        writeln!(f, "Distance: {:.0} m", self.distance_meters)?;
        writeln!(f, "Calories: {:.1} kcal", self.calories_burned)?;
        if let Some(ts) = self.last_sync_timestamp {
            writeln!(f, "Last sync: {}", ts)?;
        }
        Ok(())
    }
}
