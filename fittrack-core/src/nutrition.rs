//! Nutrition totals.
//!
//! Every function here is a pure function of its input. Unknown nutrient
//! values count as zero, and so do negative or non-finite ones, so malformed
//! records are normalized instead of rejected.

use chrono::NaiveDate;
use serde::Serialize;
use std::fmt;
use std::ops::Add;

use crate::models::{DailyNutritionRecord, FoodItem, MealRecord, MealSlot, Nutrients};

/// Summed macro values for a meal or a day.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct NutrientTotals {
    pub calories: f64,
    pub protein: f64,
    pub carbohydrates: f64,
    pub fat: f64,
}

impl Add for NutrientTotals {
    type Output = NutrientTotals;

    fn add(self, rhs: NutrientTotals) -> NutrientTotals {
        NutrientTotals {
            calories: self.calories + rhs.calories,
            protein: self.protein + rhs.protein,
            carbohydrates: self.carbohydrates + rhs.carbohydrates,
            fat: self.fat + rhs.fat,
        }
    }
}

impl fmt::Display for NutrientTotals {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:.0} kcal | protein {:.1} g | carbs {:.1} g | fat {:.1} g",
            self.calories, self.protein, self.carbohydrates, self.fat
        )
    }
}

fn normalize(value: Option<f64>) -> f64 {
    match value {
        Some(v) if v.is_finite() && v > 0.0 => v,
        _ => 0.0,
    }
}

fn item_value(item: &FoodItem, field: fn(&Nutrients) -> Option<f64>) -> f64 {
    normalize(item.nutrients.as_ref().and_then(field))
}

fn sum_meal(meal: &MealRecord, field: fn(&Nutrients) -> Option<f64>) -> f64 {
    meal.items.iter().map(|item| item_value(item, field)).sum()
}

fn sum_day(record: &DailyNutritionRecord, field: fn(&Nutrients) -> Option<f64>) -> f64 {
    record.meals().iter().map(|meal| sum_meal(meal, field)).sum()
}

/// Calories of one meal.
pub fn meal_calories(meal: &MealRecord) -> f64 {
    sum_meal(meal, |n| n.calories)
}

/// Calories across all four meal slots.
pub fn total_calories(record: &DailyNutritionRecord) -> f64 {
    record.meals().iter().map(|meal| meal_calories(meal)).sum()
}

pub fn total_protein(record: &DailyNutritionRecord) -> f64 {
    sum_day(record, |n| n.protein)
}

pub fn total_carbs(record: &DailyNutritionRecord) -> f64 {
    sum_day(record, |n| n.carbohydrates)
}

pub fn total_fat(record: &DailyNutritionRecord) -> f64 {
    sum_day(record, |n| n.fat)
}

/// Total calories of the record dated `date`, or 0 when there is none.
pub fn calories_for_date(records: &[DailyNutritionRecord], date: NaiveDate) -> f64 {
    records
        .iter()
        .find(|record| record.date == date)
        .map(total_calories)
        .unwrap_or(0.0)
}

/// All four totals for one meal.
pub fn meal_totals(meal: &MealRecord) -> NutrientTotals {
    NutrientTotals {
        calories: meal_calories(meal),
        protein: sum_meal(meal, |n| n.protein),
        carbohydrates: sum_meal(meal, |n| n.carbohydrates),
        fat: sum_meal(meal, |n| n.fat),
    }
}

/// All four totals for the meal in `slot`.
pub fn nutrient_totals_for_meal(record: &DailyNutritionRecord, slot: MealSlot) -> NutrientTotals {
    let meal = match slot {
        MealSlot::Breakfast => &record.breakfast,
        MealSlot::Lunch => &record.lunch,
        MealSlot::Dinner => &record.dinner,
        MealSlot::Snack => &record.snack,
    };
    meal_totals(meal)
}

/// All four totals for the whole day.
pub fn daily_totals(record: &DailyNutritionRecord) -> NutrientTotals {
    record
        .meals()
        .iter()
        .map(|meal| meal_totals(meal))
        .fold(NutrientTotals::default(), Add::add)
}
