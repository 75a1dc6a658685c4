use serde::{Deserialize, Serialize};
use std::fmt;

/// Per-100g macro values. `None` means the value is unknown.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct Nutrients {
    pub calories: Option<f64>,
    pub protein: Option<f64>,
    pub carbohydrates: Option<f64>,
    pub fat: Option<f64>,
}

impl Nutrients {
    pub fn new(calories: f64, protein: f64, carbohydrates: f64, fat: f64) -> Self {
        Self {
            calories: Some(calories),
            protein: Some(protein),
            carbohydrates: Some(carbohydrates),
            fat: Some(fat),
        }
    }

    pub fn with_calories(mut self, calories: f64) -> Self {
        self.calories = Some(calories);
        self
    }

    pub fn with_protein(mut self, protein: f64) -> Self {
        self.protein = Some(protein);
        self
    }

    pub fn with_carbohydrates(mut self, carbohydrates: f64) -> Self {
        self.carbohydrates = Some(carbohydrates);
        self
    }

    pub fn with_fat(mut self, fat: f64) -> Self {
        self.fat = Some(fat);
        self
    }
}

impl fmt::Display for Nutrients {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let show = |v: Option<f64>| v.map(|n| n.to_string()).unwrap_or_else(|| "?".into());
        write!(
            f,
            "{} kcal, protein {} g, carbs {} g, fat {} g",
            show(self.calories),
            show(self.protein),
            show(self.carbohydrates),
            show(self.fat)
        )
    }
}
