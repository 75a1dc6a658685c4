use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::food_item::FoodItem;
use super::meal_slot::MealSlot;

/// The items logged for one meal slot, in logging order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MealRecord {
    pub slot: MealSlot,
    #[serde(default)]
    pub items: Vec<FoodItem>,
}

impl MealRecord {
    pub fn new(slot: MealSlot) -> Self {
        Self {
            slot,
            items: Vec::new(),
        }
    }

    pub fn with_items(mut self, items: Vec<FoodItem>) -> Self {
        self.items = items;
        self
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Everything eaten on one day, split into the four meal slots.
///
/// Totals are never stored here; see [`crate::nutrition`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DailyNutritionRecord {
    pub id: Option<Uuid>,
    pub date: NaiveDate,
    pub breakfast: MealRecord,
    pub lunch: MealRecord,
    pub dinner: MealRecord,
    pub snack: MealRecord,
}

impl DailyNutritionRecord {
    pub fn new(date: NaiveDate) -> Self {
        Self {
            id: None,
            date,
            breakfast: MealRecord::new(MealSlot::Breakfast),
            lunch: MealRecord::new(MealSlot::Lunch),
            dinner: MealRecord::new(MealSlot::Dinner),
            snack: MealRecord::new(MealSlot::Snack),
        }
    }

    pub fn meal(&self, slot: MealSlot) -> &MealRecord {
        match slot {
            MealSlot::Breakfast => &self.breakfast,
            MealSlot::Lunch => &self.lunch,
            MealSlot::Dinner => &self.dinner,
            MealSlot::Snack => &self.snack,
        }
    }

    pub fn meal_mut(&mut self, slot: MealSlot) -> &mut MealRecord {
        match slot {
            MealSlot::Breakfast => &mut self.breakfast,
            MealSlot::Lunch => &mut self.lunch,
            MealSlot::Dinner => &mut self.dinner,
            MealSlot::Snack => &mut self.snack,
        }
    }

    pub fn add_item(&mut self, slot: MealSlot, item: FoodItem) {
        self.meal_mut(slot).items.push(item);
    }

    pub fn with_item(mut self, slot: MealSlot, item: FoodItem) -> Self {
        self.add_item(slot, item);
        self
    }

    /// Meals in day order.
    pub fn meals(&self) -> [&MealRecord; 4] {
        [&self.breakfast, &self.lunch, &self.dinner, &self.snack]
    }
}

impl fmt::Display for DailyNutritionRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Nutrition: {}", self.date)?;
        writeln!(f, "{}", "=".repeat(30))?;

        for meal in self.meals() {
            if meal.is_empty() {
                continue;
            }
            writeln!(f, "{}:", meal.slot)?;
            for item in &meal.items {
                writeln!(f, "  - {}", item)?;
            }
        }

        Ok(())
    }
}
