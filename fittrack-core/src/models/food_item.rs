use serde::{Deserialize, Serialize};
use std::fmt;

use super::nutrients::Nutrients;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FoodItem {
    pub name: String,
    #[serde(default)]
    pub nutrients: Option<Nutrients>,
}

impl FoodItem {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            nutrients: None,
        }
    }

    pub fn with_nutrients(mut self, nutrients: Nutrients) -> Self {
        self.nutrients = Some(nutrients);
        self
    }

    /// Shorthand for an item where only the energy value is known.
    pub fn with_calories(self, calories: f64) -> Self {
        let nutrients = self.nutrients.unwrap_or_default().with_calories(calories);
        self.with_nutrients(nutrients)
    }
}

impl fmt::Display for FoodItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.nutrients {
            Some(n) => write!(f, "{} ({})", self.name, n),
            None => write!(f, "{} (no nutrition data)", self.name),
        }
    }
}
