use chrono::{DateTime, NaiveDate};
use clap::{Args, Subcommand};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::sync::watch;

use super::{date_or_today, parse_date, OutputFormat};
use crate::config::Config;
use fittrack_core::activity::{
    ChannelLocationSource, ChannelStepSensor, Feed, UnavailableSensor,
};
use fittrack_core::notify;
use fittrack_core::{
    ActivityStore, ActivityTracker, DailyActivityRecord, LocationFix, StepSensor, SystemClock,
    TrackerConfig, TrackerError, UserMessage,
};

#[derive(Args)]
pub struct ActivityCommand {
    #[command(subcommand)]
    pub command: ActivitySubcommand,
}

#[derive(Subcommand)]
pub enum ActivitySubcommand {
    /// Show stored activity totals for a day
    Show {
        /// Date (YYYY-MM-DD), defaults to today
        #[arg(long, short)]
        date: Option<String>,

        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Stored daily totals over a date range
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

    /// Track today's activity from a stream of sensor events
    ///
    /// Reads one JSON object per line, e.g.
    /// {"type":"step","raw":10250} or
    /// {"type":"location","latitude":52.52,"longitude":13.405,"accuracy_m":8}.
    /// Stops at end of input or on Ctrl-C, saving the totals either way.
    Track {
        /// Event file (JSON lines), defaults to stdin
        #[arg(long, short)]
        input: Option<PathBuf>,

        /// Behave as a device without a step counter
        #[arg(long)]
        no_step_sensor: bool,

        /// Behave as if location permission was refused
        #[arg(long)]
        deny_location: bool,
    },
}

/// One line of a tracking replay.
#[derive(Debug, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
enum ReplayEvent {
    Step { raw: u64 },
    Location(LocationFix),
}

/// Sums over a run of stored days.
#[derive(Debug, Default, PartialEq, Serialize)]
pub struct ActivitySummary {
    pub days: usize,
    pub steps: u64,
    pub distance_meters: f64,
    pub calories_burned: f64,
}

impl ActivitySummary {
    pub fn from_records(records: &[DailyActivityRecord]) -> Self {
        records.iter().fold(Self::default(), |acc, r| Self {
            days: acc.days + 1,
            steps: acc.steps.saturating_add(r.step_count),
            distance_meters: acc.distance_meters + r.distance_meters,
            calories_burned: acc.calories_burned + r.calories_burned,
        })
    }
}

pub struct TrackOptions {
    pub step_sensor: bool,
    pub location_permitted: bool,
}

pub struct TrackOutcome {
    pub record: DailyActivityRecord,
    pub location_denied: bool,
    pub messages: Vec<UserMessage>,
}

impl ActivityCommand {
    pub async fn run(
        &self,
        store: Arc<dyn ActivityStore>,
        config: &Config,
    ) -> Result<(), Box<dyn std::error::Error>> {
        match &self.command {
            ActivitySubcommand::Show { date, format } => {
                let date = date_or_today(date)?;
                let record = store.get_activity_by_date(date).await?;

                match (format, record) {
                    (OutputFormat::Json, record) => {
                        println!("{}", serde_json::to_string_pretty(&record)?);
                    }
                    (OutputFormat::Text, Some(record)) => print_record(&record),
                    (OutputFormat::Text, None) => println!("No activity recorded for {}", date),
                }
                Ok(())
            }
            ActivitySubcommand::History { from, to, format } => {
                let to_date = match to {
                    Some(d) => parse_date(d)?,
                    None => chrono::Local::now().date_naive(),
                };
                let from_date: NaiveDate = match from {
                    Some(d) => parse_date(d)?,
                    None => to_date - chrono::Duration::days(7),
                };
                if from_date > to_date {
                    return Err(format!("--from {} is after --to {}", from_date, to_date).into());
                }

                let records = store.list_activity_range(from_date, to_date).await?;
                let summary = ActivitySummary::from_records(&records);

                match format {
                    OutputFormat::Json => {
                        let report = serde_json::json!({ "records": records, "summary": summary });
                        println!("{}", serde_json::to_string_pretty(&report)?);
                    }
                    OutputFormat::Text => {
                        if records.is_empty() {
                            println!("No activity recorded for {} to {}", from_date, to_date);
                            return Ok(());
                        }
                        for r in &records {
                            println!(
                                "  {}  {:>7} steps  {:>7.0} m  {:>7.1} kcal",
                                r.date, r.step_count, r.distance_meters, r.calories_burned
                            );
                        }
                        println!(
                            "\nTotal: {} steps, {:.0} m, {:.1} kcal over {} day(s)",
                            summary.steps, summary.distance_meters, summary.calories_burned, summary.days
                        );
                    }
                }
                Ok(())
            }
            ActivitySubcommand::Track {
                input,
                no_step_sensor,
                deny_location,
            } => {
                let options = TrackOptions {
                    step_sensor: !no_step_sensor,
                    location_permitted: !deny_location,
                };
                let tracker_config = config.tracking.tracker_config();

                let (stop_tx, stop_rx) = watch::channel(false);
                let ctrl_c = tokio::spawn(async move {
                    if tokio::signal::ctrl_c().await.is_ok() {
                        tracing::info!("Interrupted, stopping tracker");
                        let _ = stop_tx.send(true);
                    }
                });

                let outcome = match input {
                    Some(path) => {
                        let file = tokio::fs::File::open(path)
                            .await
                            .map_err(|e| format!("Failed to open '{}': {}", path.display(), e))?;
                        track(store, tracker_config, options, BufReader::new(file), stop_rx).await
                    }
                    None => {
                        let stdin = BufReader::new(tokio::io::stdin());
                        track(store, tracker_config, options, stdin, stop_rx).await
                    }
                };
                ctrl_c.abort();
                let outcome = outcome?;

                if outcome.location_denied {
                    println!("Location permission denied; tracked steps only.");
                }
                for message in &outcome.messages {
                    eprintln!("{}", message);
                }
                println!();
                print_record(&outcome.record);
                Ok(())
            }
        }
    }
}

/// Runs one tracking session over `input` and returns today's totals.
///
/// Ends when the input is exhausted or `stop` is raised. Both paths save the
/// final totals before returning.
pub async fn track<R>(
    store: Arc<dyn ActivityStore>,
    config: TrackerConfig,
    options: TrackOptions,
    input: R,
    stop: watch::Receiver<bool>,
) -> Result<TrackOutcome, TrackerError>
where
    R: AsyncBufRead + Unpin + Send + 'static,
{
    let (channel_sensor, steps) = ChannelStepSensor::new();
    let sensor: Arc<dyn StepSensor> = if options.step_sensor {
        Arc::new(channel_sensor)
    } else {
        Arc::new(UnavailableSensor)
    };
    let (location, fixes) = ChannelLocationSource::new(options.location_permitted);

    let (notifier, mut notifications) = notify::channel();
    let mut tracker = ActivityTracker::new(
        store,
        sensor,
        Arc::new(location),
        Arc::new(SystemClock),
        config,
    )
    .with_notifier(notifier);

    tracker.initialize_tracking().await?;
    let location_denied = match tracker.start_continuous_tracking() {
        Ok(()) => false,
        Err(TrackerError::PermissionDenied) => true,
        Err(TrackerError::SensorUnavailable) => {
            tracing::warn!("No location hardware; tracking steps only");
            false
        }
        Err(e) => return Err(e),
    };

    let reader = tokio::spawn(replay(input, steps, fixes));
    tracker.run(stop).await;
    reader.abort();

    Ok(TrackOutcome {
        record: tracker.snapshot(),
        location_denied,
        messages: notifications.drain(),
    })
}

/// Pushes every event in `input` to the matching feed, then closes both.
async fn replay<R>(input: R, steps: Feed<u64>, fixes: Feed<LocationFix>)
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = input.lines();
    let mut line_no = 0usize;

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                tracing::warn!("Failed to read events: {}", e);
                break;
            }
        };
        line_no += 1;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match serde_json::from_str::<ReplayEvent>(line) {
            Ok(ReplayEvent::Step { raw }) => {
                steps.push(raw);
            }
            Ok(ReplayEvent::Location(fix)) => {
                fixes.push(fix);
            }
            Err(e) => tracing::warn!("Skipping line {}: {}", line_no, e),
        }
    }

    tracing::debug!("Replayed {} line(s)", line_no);
    steps.close();
    fixes.close();
}

fn print_record(record: &DailyActivityRecord) {
    println!("Activity for {}", record.date);
    println!("  Steps:    {}", record.step_count);
    println!("  Distance: {:.0} m", record.distance_meters);
    println!("  Calories: {:.1} kcal", record.calories_burned);
    match record
        .last_sync_timestamp
        .and_then(DateTime::from_timestamp_millis)
    {
        Some(at) => println!("  Last sync: {}", at.format("%Y-%m-%d %H:%M:%S UTC")),
        None => println!("  Last sync: never"),
    }
}
