mod activity;
mod config_cmd;
mod meal;

pub use activity::ActivityCommand;
pub use config_cmd::ConfigCommand;
pub use meal::MealCommand;

use chrono::NaiveDate;
use clap::ValueEnum;

#[derive(Clone, ValueEnum, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

fn parse_date(value: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|_| format!("Invalid date format '{}'. Use YYYY-MM-DD.", value))
}

/// Parsed `--date`, or today when absent.
fn date_or_today(value: &Option<String>) -> Result<NaiveDate, String> {
    match value {
        Some(d) => parse_date(d),
        None => Ok(chrono::Local::now().date_naive()),
    }
}
