use chrono::NaiveDate;
use clap::{Args, Subcommand};

use super::{date_or_today, parse_date, OutputFormat};
use fittrack_core::nutrition::{self, NutrientTotals};
use fittrack_core::{DailyNutritionRecord, FoodItem, MealSlot, Nutrients, NutritionStore, StoreError};

#[derive(Args)]
pub struct MealCommand {
    #[command(subcommand)]
    pub command: MealSubcommand,
}

#[derive(Subcommand)]
pub enum MealSubcommand {
    /// Record a food item eaten at a meal
    Add {
        /// Meal slot (breakfast, lunch, dinner, snack)
        #[arg(long, short)]
        slot: String,

        /// Food name
        #[arg(long, short)]
        name: String,

        /// Date (YYYY-MM-DD), defaults to today
        #[arg(long, short)]
        date: Option<String>,

        /// Calories (kcal)
        #[arg(long)]
        calories: Option<f64>,

        /// Protein (g)
        #[arg(long)]
        protein: Option<f64>,

        /// Carbohydrates (g)
        #[arg(long)]
        carbs: Option<f64>,

        /// Fat (g)
        #[arg(long)]
        fat: Option<f64>,
    },

    /// Show one day's meals with nutrient totals
    Show {
        /// Date (YYYY-MM-DD), defaults to today
        #[arg(long, short)]
        date: Option<String>,

        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Calories eaten per day over a date range
    History {
        /// Start date (YYYY-MM-DD), defaults to 7 days before the end date
        #[arg(long)]
        from: Option<String>,

        /// End date (YYYY-MM-DD), defaults to today
        #[arg(long)]
        to: Option<String>,

        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },
}

impl MealCommand {
    pub async fn run(&self, store: &dyn NutritionStore) -> Result<(), Box<dyn std::error::Error>> {
        match &self.command {
            MealSubcommand::Add {
                slot,
                name,
                date,
                calories,
                protein,
                carbs,
                fat,
            } => {
                let date = date_or_today(date)?;
                let slot: MealSlot = slot.parse()?;
                let nutrients = Nutrients {
                    calories: *calories,
                    protein: *protein,
                    carbohydrates: *carbs,
                    fat: *fat,
                };
                let item = FoodItem {
                    name: name.trim().to_string(),
                    nutrients: (nutrients != Nutrients::default()).then_some(nutrients),
                };
                if item.name.is_empty() {
                    return Err("Food name cannot be empty".into());
                }

                let record = add_food(store, date, slot, item).await?;
                let meal = record.meal(slot);

                println!("Added '{}' to {} on {}", name.trim(), slot, date);
                println!(
                    "  {}: {} item(s), {:.0} kcal",
                    slot,
                    meal.items.len(),
                    nutrition::meal_calories(meal)
                );
                println!("  Day total: {:.0} kcal", nutrition::total_calories(&record));
                Ok(())
            }
            MealSubcommand::Show { date, format } => {
                let date = date_or_today(date)?;
                let record = store
                    .get_nutrition_by_date(date)
                    .await?
                    .unwrap_or_else(|| DailyNutritionRecord::new(date));

                match format {
                    OutputFormat::Json => {
                        let report = DayReport::from_record(&record);
                        println!("{}", serde_json::to_string_pretty(&report)?);
                    }
                    OutputFormat::Text => print_day(&record),
                }
                Ok(())
            }
            MealSubcommand::History { from, to, format } => {
                let to_date = match to {
                    Some(d) => parse_date(d)?,
                    None => chrono::Local::now().date_naive(),
                };
                let from_date = match from {
                    Some(d) => parse_date(d)?,
                    None => to_date - chrono::Duration::days(7),
                };
                if from_date > to_date {
                    return Err(format!("--from {} is after --to {}", from_date, to_date).into());
                }

                let records = store.list_nutrition_range(from_date, to_date).await?;
                let days = calories_per_day(&records, from_date, to_date);

                match format {
                    OutputFormat::Json => {
                        let rows: Vec<serde_json::Value> = days
                            .iter()
                            .map(|(date, kcal)| serde_json::json!({ "date": date, "calories": kcal }))
                            .collect();
                        println!("{}", serde_json::to_string_pretty(&rows)?);
                    }
                    OutputFormat::Text => {
                        if records.is_empty() {
                            println!("No meals recorded for {} to {}", from_date, to_date);
                            return Ok(());
                        }
                        for (date, kcal) in &days {
                            println!("  {}  {:>7.0} kcal", date, kcal);
                        }
                        let total: f64 = days.iter().map(|(_, kcal)| kcal).sum();
                        println!("\nTotal: {:.0} kcal over {} day(s)", total, days.len());
                    }
                }
                Ok(())
            }
        }
    }
}

/// Appends `item` to the day's record, creating the record if needed.
pub async fn add_food(
    store: &dyn NutritionStore,
    date: NaiveDate,
    slot: MealSlot,
    item: FoodItem,
) -> Result<DailyNutritionRecord, StoreError> {
    match store.get_nutrition_by_date(date).await? {
        Some(mut record) => {
            record.add_item(slot, item);
            store.update_nutrition(&record).await?;
            Ok(record)
        }
        None => {
            let mut record = DailyNutritionRecord::new(date).with_item(slot, item);
            record.id = Some(store.save_nutrition(&record).await?);
            Ok(record)
        }
    }
}

/// One entry per calendar day in `from..=to`; days without records are 0.
fn calories_per_day(
    records: &[DailyNutritionRecord],
    from: NaiveDate,
    to: NaiveDate,
) -> Vec<(NaiveDate, f64)> {
    from.iter_days()
        .take_while(|d| *d <= to)
        .map(|d| (d, nutrition::calories_for_date(records, d)))
        .collect()
}

#[derive(serde::Serialize)]
struct DayReport<'a> {
    record: &'a DailyNutritionRecord,
    meals: Vec<(MealSlot, NutrientTotals)>,
    totals: NutrientTotals,
}

impl<'a> DayReport<'a> {
    fn from_record(record: &'a DailyNutritionRecord) -> Self {
        Self {
            record,
            meals: MealSlot::ALL
                .iter()
                .map(|slot| (*slot, nutrition::nutrient_totals_for_meal(record, *slot)))
                .collect(),
            totals: nutrition::daily_totals(record),
        }
    }
}

fn print_day(record: &DailyNutritionRecord) {
    println!("{}", record.date);
    println!("{}", "-".repeat(10));

    for meal in record.meals() {
        let totals = nutrition::meal_totals(meal);
        println!("  {:10} {}", meal.slot, totals);
        for item in &meal.items {
            match &item.nutrients {
                Some(n) => println!("    - {} ({})", item.name, n),
                None => println!("    - {}", item.name),
            }
        }
    }

    println!("\nTotal: {}", nutrition::daily_totals(record));
}
