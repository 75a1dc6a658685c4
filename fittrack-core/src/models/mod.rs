mod activity_record;
mod daily_nutrition;
mod food_item;
mod meal_slot;
mod nutrients;

pub use activity_record::DailyActivityRecord;
pub use daily_nutrition::{DailyNutritionRecord, MealRecord};
pub use food_item::FoodItem;
pub use meal_slot::MealSlot;
pub use nutrients::Nutrients;
