//! fittrack core library
//!
//! Activity tracking and nutrition totals, plus the collaborator interfaces
//! they persist through.

pub mod activity;
pub mod error;
pub mod models;
pub mod notify;
pub mod nutrition;
pub mod store;

pub use activity::{
    ActivityTracker, Clock, LocationFix, LocationSource, StepSensor, SystemClock, TrackerConfig,
    TrackerState,
};
pub use error::{SourceError, StoreError, TrackerError};
pub use models::{DailyActivityRecord, DailyNutritionRecord, FoodItem, MealRecord, MealSlot, Nutrients};
pub use notify::{MessageLevel, Notifier, Notifications, UserMessage};
pub use nutrition::NutrientTotals;
pub use store::{ActivityStore, MemoryStore, NutritionStore, StoreResult};

pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
