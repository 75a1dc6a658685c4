//! Running activity totals for the current day.
//!
//! The tracker owns all of its mutable state. Sensor and location events are
//! applied synchronously through `&mut self`; the only awaits are the store
//! calls made on initialization and sync. While a sync is in flight, new
//! events wait in their subscription channels.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use uuid::Uuid;

use super::clock::Clock;
use super::source::{EventStream, LocationFix, LocationSource, StepSensor};
use crate::error::{StoreError, TrackerError};
use crate::models::DailyActivityRecord;
use crate::notify::Notifier;
use crate::store::ActivityStore;

/// Energy attributed to a single step, in kcal.
pub const CALORIES_PER_STEP: f64 = 0.04;

/// Energy attributed to one meter of location distance, in kcal.
pub const CALORIES_PER_METER: f64 = 0.05;

/// Steps and distance usually come from the same walk, so summing both terms
/// overstates the energy spent. Stored records depend on this formula; change
/// it only together with a data migration.
pub fn calories_for(step_count: u64, distance_meters: f64) -> f64 {
    step_count as f64 * CALORIES_PER_STEP + distance_meters * CALORIES_PER_METER
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrackerConfig {
    /// How often `run` writes a snapshot to the store.
    pub sync_interval: Duration,
    /// Requested interval between location fixes.
    pub location_interval: Duration,
    /// Fixes with a larger accuracy radius are ignored.
    pub max_fix_accuracy_m: Option<f64>,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            sync_interval: Duration::from_secs(300),
            location_interval: Duration::from_secs(10),
            max_fix_accuracy_m: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackerState {
    Uninitialized,
    Tracking,
    Syncing,
    Stopped,
}

impl fmt::Display for TrackerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackerState::Uninitialized => write!(f, "uninitialized"),
            TrackerState::Tracking => write!(f, "tracking"),
            TrackerState::Syncing => write!(f, "syncing"),
            TrackerState::Stopped => write!(f, "stopped"),
        }
    }
}

pub struct ActivityTracker {
    store: Arc<dyn ActivityStore>,
    sensor: Arc<dyn StepSensor>,
    location: Arc<dyn LocationSource>,
    clock: Arc<dyn Clock>,
    config: TrackerConfig,
    notifier: Option<Notifier>,

    state: TrackerState,
    record: DailyActivityRecord,
    /// Raw reading captured by the first step event after (re)start.
    baseline: Option<u64>,
    /// Steps already persisted for today when tracking started.
    restored_offset: u64,
    last_raw: Option<u64>,
    last_location: Option<LocationFix>,
    /// Closed-out days whose final save failed, oldest first.
    unsaved_days: Vec<DailyActivityRecord>,

    steps: Option<EventStream<u64>>,
    fixes: Option<EventStream<LocationFix>>,

    step_tx: watch::Sender<u64>,
    distance_tx: watch::Sender<f64>,
    calories_tx: watch::Sender<f64>,
}

impl ActivityTracker {
    pub fn new(
        store: Arc<dyn ActivityStore>,
        sensor: Arc<dyn StepSensor>,
        location: Arc<dyn LocationSource>,
        clock: Arc<dyn Clock>,
        config: TrackerConfig,
    ) -> Self {
        let today = clock.today();
        let (step_tx, _) = watch::channel(0);
        let (distance_tx, _) = watch::channel(0.0);
        let (calories_tx, _) = watch::channel(0.0);

        Self {
            store,
            sensor,
            location,
            clock,
            config,
            notifier: None,
            state: TrackerState::Uninitialized,
            record: DailyActivityRecord::new(today),
            baseline: None,
            restored_offset: 0,
            last_raw: None,
            last_location: None,
            unsaved_days: Vec::new(),
            steps: None,
            fixes: None,
            step_tx,
            distance_tx,
            calories_tx,
        }
    }

    /// Messages about background sync failures go to this notifier.
    pub fn with_notifier(mut self, notifier: Notifier) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn state(&self) -> TrackerState {
        self.state
    }

    /// Copy of the current in-memory totals.
    pub fn snapshot(&self) -> DailyActivityRecord {
        self.record.clone()
    }

    pub fn has_step_sensor(&self) -> bool {
        self.steps.is_some()
    }

    pub fn is_tracking_location(&self) -> bool {
        self.fixes.is_some()
    }

    /// Live step count for today.
    pub fn step_count(&self) -> watch::Receiver<u64> {
        self.step_tx.subscribe()
    }

    /// Live cumulative distance in meters.
    pub fn distance(&self) -> watch::Receiver<f64> {
        self.distance_tx.subscribe()
    }

    /// Live calories derived from steps and distance.
    pub fn calories_burned(&self) -> watch::Receiver<f64> {
        self.calories_tx.subscribe()
    }

    fn is_active(&self) -> bool {
        matches!(self.state, TrackerState::Tracking | TrackerState::Syncing)
    }

    /// Loads or creates today's record and subscribes to the step sensor.
    ///
    /// Does nothing when already tracking. A missing step counter is not an
    /// error; steps simply stay where they are.
    pub async fn initialize_tracking(&mut self) -> Result<(), TrackerError> {
        if self.is_active() {
            tracing::debug!("Tracking already initialized");
            return Ok(());
        }

        let today = self.clock.today();
        let record = match self.store.get_activity_by_date(today).await {
            Ok(Some(record)) => {
                tracing::info!(
                    "Restored activity for {}: {} steps, {:.0} m",
                    today,
                    record.step_count,
                    record.distance_meters
                );
                record
            }
            Ok(None) => {
                tracing::info!("No activity stored for {}, starting at zero", today);
                DailyActivityRecord::new(today)
            }
            Err(e) => {
                tracing::warn!("Failed to load activity for {}: {}", today, e);
                return Err(e.into());
            }
        };

        self.start_day(record);
        self.last_raw = None;

        match self.sensor.subscribe() {
            Ok(stream) => self.steps = Some(stream),
            Err(e) => {
                tracing::warn!("{}; step count will not advance", e);
                self.steps = None;
            }
        }

        self.state = TrackerState::Tracking;
        Ok(())
    }

    /// Starts listening for location fixes.
    ///
    /// Without location permission this returns `PermissionDenied` and step
    /// tracking carries on unaffected.
    pub fn start_continuous_tracking(&mut self) -> Result<(), TrackerError> {
        if !self.is_active() {
            return Err(TrackerError::NotInitialized);
        }
        if self.fixes.is_some() {
            return Ok(());
        }
        if !self.location.has_permission() {
            tracing::warn!("Location permission denied; distance will not be tracked");
            return Err(TrackerError::PermissionDenied);
        }

        let stream = self.location.subscribe(self.config.location_interval)?;
        self.fixes = Some(stream);
        tracing::info!(
            "Location tracking started (interval {:?})",
            self.config.location_interval
        );
        Ok(())
    }

    /// Applies a raw step-counter reading.
    pub fn handle_step(&mut self, raw: u64) {
        if !self.is_active() {
            return;
        }
        self.last_raw = Some(raw);

        let baseline = *self.baseline.get_or_insert(raw);
        let current = self
            .restored_offset
            .saturating_add(raw.saturating_sub(baseline));

        if current > self.record.step_count {
            self.record.step_count = current;
            self.step_tx.send_replace(current);
            self.recompute_calories();
        } else if current < self.record.step_count {
            tracing::debug!(
                "Ignoring step reading {} (would move {} back to {})",
                raw,
                self.record.step_count,
                current
            );
        }
    }

    /// Applies a location fix.
    pub fn handle_location(&mut self, fix: LocationFix) {
        if !self.is_active() {
            return;
        }
        if let Some(max) = self.config.max_fix_accuracy_m {
            if fix.accuracy_m > max {
                tracing::debug!(
                    "Dropping fix with accuracy {:.0} m (limit {:.0} m)",
                    fix.accuracy_m,
                    max
                );
                return;
            }
        }

        let Some(previous) = self.last_location.replace(fix) else {
            return;
        };

        let delta = previous.distance_to(&fix);
        if delta > 0.0 {
            self.record.distance_meters += delta;
            self.distance_tx.send_replace(self.record.distance_meters);
            self.recompute_calories();
        }
    }

    /// Writes the current totals to the store.
    ///
    /// Inserts on the first sync of the day and updates afterwards. Failures
    /// are logged and returned; the tracker keeps running either way.
    pub async fn sync_activity_data(&mut self) -> Result<Uuid, TrackerError> {
        if !self.is_active() {
            return Err(TrackerError::NotInitialized);
        }

        self.state = TrackerState::Syncing;
        self.save_unsaved_days().await;
        let snapshot = self.stamped_snapshot();
        let result = persist(self.store.as_ref(), &snapshot).await;
        self.state = TrackerState::Tracking;

        self.apply_sync_result(&snapshot, result)
    }

    /// Number of closed-out days still waiting to be saved.
    pub fn unsaved_day_count(&self) -> usize {
        self.unsaved_days.len()
    }

    /// Stops tracking and drops both subscriptions.
    pub fn cleanup(&mut self) {
        if self.state == TrackerState::Stopped {
            return;
        }
        self.steps = None;
        self.fixes = None;
        self.state = TrackerState::Stopped;
        tracing::info!(
            "Activity tracking stopped at {} steps, {:.0} m",
            self.record.step_count,
            self.record.distance_meters
        );
    }

    /// Drives the tracker until `stop` flips to true or both subscriptions
    /// have ended.
    ///
    /// Applies events from both subscriptions and syncs every
    /// `sync_interval`. A failed periodic sync is reported and retried on the
    /// next tick. On stop, a sync still in flight is awaited rather than
    /// aborted, then a final sync is attempted and the tracker is cleaned up.
    pub async fn run(&mut self, mut stop: watch::Receiver<bool>) {
        if !self.is_active() {
            tracing::warn!("Activity tracker run before initialization");
            return;
        }

        let mut ticker = tokio::time::interval(self.config.sync_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;

        let mut in_flight = None;
        loop {
            if *stop.borrow() {
                break;
            }
            if self.steps.is_none() && self.fixes.is_none() {
                tracing::info!("No event sources left, stopping");
                break;
            }

            tokio::select! {
                changed = stop.changed() => {
                    if changed.is_err() || *stop.borrow() {
                        break;
                    }
                }
                raw = next_event(&mut self.steps) => match raw {
                    Some(raw) => {
                        self.roll_over_if_new_day().await;
                        self.handle_step(raw);
                    }
                    None => {
                        tracing::warn!("Step sensor stream ended");
                        self.steps = None;
                    }
                },
                fix = next_event(&mut self.fixes) => match fix {
                    Some(fix) => {
                        self.roll_over_if_new_day().await;
                        self.handle_location(fix);
                    }
                    None => {
                        tracing::warn!("Location stream ended");
                        self.fixes = None;
                    }
                },
                _ = ticker.tick() => {
                    if let Some(task) = self.background_sync(&mut stop).await {
                        in_flight = Some(task);
                        break;
                    }
                }
            }
        }

        if let Some(task) = in_flight {
            tracing::info!("Waiting for in-flight sync before stopping");
            self.finish_sync_task(task.await);
        }
        if let Err(e) = self.sync_activity_data().await {
            self.report_sync_failure(&e);
        }
        self.cleanup();
    }

    /// Returns the save task when stop arrived before it finished.
    async fn background_sync(&mut self, stop: &mut watch::Receiver<bool>) -> Option<SyncTask> {
        self.state = TrackerState::Syncing;
        self.save_unsaved_days().await;
        let snapshot = self.stamped_snapshot();
        let store = Arc::clone(&self.store);

        let mut task = tokio::spawn(async move {
            let result = persist(store.as_ref(), &snapshot).await;
            (snapshot, result)
        });

        tokio::select! {
            joined = &mut task => {
                self.finish_sync_task(joined);
                None
            }
            _ = stop.changed() => {
                tracing::info!("Stop requested during sync");
                Some(task)
            }
        }
    }

    fn finish_sync_task(&mut self, joined: Result<SyncOutcome, tokio::task::JoinError>) {
        self.state = TrackerState::Tracking;
        match joined {
            Ok((snapshot, result)) => {
                if let Err(e) = self.apply_sync_result(&snapshot, result) {
                    self.report_sync_failure(&e);
                }
            }
            Err(e) => tracing::warn!("Sync task failed: {}", e),
        }
    }

    /// Retries days closed out while the store was failing.
    async fn save_unsaved_days(&mut self) {
        while let Some(mut record) = self.unsaved_days.first().cloned() {
            record.last_sync_timestamp = Some(self.clock.now_millis());
            match persist(self.store.as_ref(), &record).await {
                Ok(_) => {
                    tracing::info!("Saved activity for {} after an earlier failure", record.date);
                    self.unsaved_days.remove(0);
                }
                Err(e) => {
                    tracing::warn!("Activity for {} is still unsaved: {}", record.date, e);
                    break;
                }
            }
        }
    }

    fn report_sync_failure(&self, e: &TrackerError) {
        if let Some(notifier) = &self.notifier {
            notifier.warn(format!("Could not save activity: {}", e));
        }
    }

    /// Closes out the previous day once the clock has moved past it.
    async fn roll_over_if_new_day(&mut self) {
        let today = self.clock.today();
        if today <= self.record.date {
            return;
        }

        tracing::info!("Day changed from {} to {}", self.record.date, today);
        if let Err(e) = self.sync_activity_data().await {
            self.report_sync_failure(&e);
            self.unsaved_days.push(self.record.clone());
        }

        let record = match self.store.get_activity_by_date(today).await {
            Ok(Some(record)) => record,
            Ok(None) => DailyActivityRecord::new(today),
            Err(e) => {
                tracing::warn!("Failed to load activity for {}: {}", today, e);
                DailyActivityRecord::new(today)
            }
        };

        let last_raw = self.last_raw;
        let last_location = self.last_location;
        self.start_day(record);
        // The new day counts from the last reading of the old one.
        self.baseline = last_raw;
        self.last_location = last_location;
    }

    fn start_day(&mut self, record: DailyActivityRecord) {
        self.restored_offset = record.step_count;
        self.baseline = None;
        self.last_location = None;
        self.record = record;

        self.step_tx.send_replace(self.record.step_count);
        self.distance_tx.send_replace(self.record.distance_meters);
        self.recompute_calories();
    }

    fn recompute_calories(&mut self) {
        self.record.calories_burned = calories_for(self.record.step_count, self.record.distance_meters);
        self.calories_tx.send_replace(self.record.calories_burned);
    }

    fn stamped_snapshot(&self) -> DailyActivityRecord {
        let mut snapshot = self.record.clone();
        snapshot.last_sync_timestamp = Some(self.clock.now_millis());
        snapshot
    }

    fn apply_sync_result(
        &mut self,
        snapshot: &DailyActivityRecord,
        result: Result<Uuid, StoreError>,
    ) -> Result<Uuid, TrackerError> {
        match result {
            Ok(id) => {
                if snapshot.date == self.record.date {
                    self.record.id = Some(id);
                    self.record.last_sync_timestamp = snapshot.last_sync_timestamp;
                }
                tracing::debug!(
                    "Synced activity for {}: {} steps",
                    snapshot.date,
                    snapshot.step_count
                );
                Ok(id)
            }
            Err(e) => {
                tracing::warn!("Failed to sync activity for {}: {}", snapshot.date, e);
                Err(e.into())
            }
        }
    }
}

type SyncOutcome = (DailyActivityRecord, Result<Uuid, StoreError>);
type SyncTask = JoinHandle<SyncOutcome>;

/// Inserts when the record has no ID yet, updates otherwise. A record that
/// vanished from the store is inserted again.
async fn persist(
    store: &dyn ActivityStore,
    record: &DailyActivityRecord,
) -> Result<Uuid, StoreError> {
    match record.id {
        None => store.save_activity(record).await,
        Some(id) => match store.update_activity(record).await {
            Ok(()) => Ok(id),
            Err(StoreError::NotFound(_)) => {
                tracing::info!("Activity record {} is gone, inserting a new one", id);
                let mut fresh = record.clone();
                fresh.id = None;
                store.save_activity(&fresh).await
            }
            Err(e) => Err(e),
        },
    }
}

async fn next_event<T>(stream: &mut Option<EventStream<T>>) -> Option<T> {
    match stream {
        Some(stream) => stream.recv().await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activity::clock::FixedClock;
    use crate::activity::source::{
        ChannelLocationSource, ChannelStepSensor, Feed, UnavailableSensor,
    };
    use crate::notify::{self, MessageLevel};
    use crate::store::MemoryStore;
    use chrono::NaiveDate;

    const T0: i64 = 1_704_067_200_000;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    struct Harness {
        tracker: ActivityTracker,
        store: Arc<MemoryStore>,
        clock: Arc<FixedClock>,
        steps: Feed<u64>,
        fixes: Feed<LocationFix>,
    }

    fn harness_with(config: TrackerConfig, location_permitted: bool) -> Harness {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(FixedClock::new(day(1), T0));
        let (sensor, steps) = ChannelStepSensor::new();
        let (location, fixes) = ChannelLocationSource::new(location_permitted);
        let tracker = ActivityTracker::new(
            store.clone(),
            Arc::new(sensor),
            Arc::new(location),
            clock.clone(),
            config,
        );
        Harness {
            tracker,
            store,
            clock,
            steps,
            fixes,
        }
    }

    fn harness() -> Harness {
        harness_with(TrackerConfig::default(), true)
    }

    async fn wait_until<T: Clone>(rx: &mut watch::Receiver<T>, done: impl Fn(&T) -> bool) {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let value = rx.borrow_and_update().clone();
                if done(&value) {
                    return;
                }
                rx.changed().await.expect("tracker dropped");
            }
        })
        .await
        .expect("timed out waiting for tracker");
    }

    fn walk() -> (LocationFix, LocationFix) {
        (
            LocationFix::new(52.5200, 13.4050),
            LocationFix::new(52.5210, 13.4065),
        )
    }

    #[tokio::test]
    async fn test_step_count_is_raw_minus_baseline() {
        let mut h = harness();
        h.tracker.initialize_tracking().await.unwrap();

        for raw in [5_000, 5_001, 5_010, 5_200] {
            h.tracker.handle_step(raw);
            assert_eq!(h.tracker.snapshot().step_count, raw - 5_000);
        }
        assert_eq!(h.tracker.baseline, Some(5_000));
    }

    #[tokio::test]
    async fn test_lower_reading_never_decreases_steps() {
        let mut h = harness();
        h.tracker.initialize_tracking().await.unwrap();

        h.tracker.handle_step(100);
        h.tracker.handle_step(150);
        h.tracker.handle_step(120);
        assert_eq!(h.tracker.snapshot().step_count, 50);

        // Counter reset below the baseline
        h.tracker.handle_step(10);
        assert_eq!(h.tracker.snapshot().step_count, 50);

        h.tracker.handle_step(160);
        assert_eq!(h.tracker.snapshot().step_count, 60);
    }

    #[tokio::test]
    async fn test_restart_adds_restored_steps() {
        let mut h = harness();
        let mut stored = DailyActivityRecord::new(day(1));
        stored.step_count = 500;
        h.store.save_activity(&stored).await.unwrap();

        h.tracker.initialize_tracking().await.unwrap();
        assert_eq!(h.tracker.snapshot().step_count, 500);
        assert!(h.tracker.snapshot().id.is_some());

        h.tracker.handle_step(1_000);
        assert_eq!(h.tracker.baseline, Some(1_000));
        assert_eq!(h.tracker.snapshot().step_count, 500);

        h.tracker.handle_step(1_010);
        assert_eq!(h.tracker.snapshot().step_count, 510);
    }

    #[tokio::test]
    async fn test_first_fix_only_seeds_location() {
        let mut h = harness();
        h.tracker.initialize_tracking().await.unwrap();
        h.tracker.start_continuous_tracking().unwrap();
        let (a, b) = walk();

        h.tracker.handle_location(a);
        assert_eq!(h.tracker.snapshot().distance_meters, 0.0);

        h.tracker.handle_location(b);
        assert_eq!(h.tracker.snapshot().distance_meters, a.distance_to(&b));
        assert!(h.tracker.snapshot().distance_meters > 100.0);
    }

    #[tokio::test]
    async fn test_calories_follow_formula_after_every_update() {
        let mut h = harness();
        h.tracker.initialize_tracking().await.unwrap();
        let (a, b) = walk();

        let check = |t: &ActivityTracker| {
            let r = t.snapshot();
            let expected =
                r.step_count as f64 * CALORIES_PER_STEP + r.distance_meters * CALORIES_PER_METER;
            assert_eq!(r.calories_burned, expected);
            assert_eq!(*t.calories_burned().borrow(), expected);
        };

        h.tracker.handle_step(10);
        check(&h.tracker);
        h.tracker.handle_step(75);
        check(&h.tracker);
        h.tracker.handle_location(a);
        check(&h.tracker);
        h.tracker.handle_location(b);
        check(&h.tracker);
        assert!(h.tracker.snapshot().calories_burned > 65.0 * CALORIES_PER_STEP);
    }

    #[tokio::test]
    async fn test_inaccurate_fixes_are_dropped() {
        let config = TrackerConfig {
            max_fix_accuracy_m: Some(25.0),
            ..TrackerConfig::default()
        };
        let mut h = harness_with(config, true);
        h.tracker.initialize_tracking().await.unwrap();
        let (a, b) = walk();

        h.tracker.handle_location(a);
        h.tracker.handle_location(b.with_accuracy(80.0));
        assert_eq!(h.tracker.snapshot().distance_meters, 0.0);

        h.tracker.handle_location(b.with_accuracy(10.0));
        assert_eq!(h.tracker.snapshot().distance_meters, a.distance_to(&b));
    }

    #[tokio::test]
    async fn test_permission_denied_keeps_step_tracking() {
        let mut h = harness_with(TrackerConfig::default(), false);
        h.tracker.initialize_tracking().await.unwrap();

        let err = h.tracker.start_continuous_tracking().unwrap_err();
        assert!(matches!(err, TrackerError::PermissionDenied));
        assert!(!h.tracker.is_tracking_location());
        assert_eq!(h.tracker.state(), TrackerState::Tracking);
        assert!(!h.fixes.push(walk().0));

        h.tracker.handle_step(40);
        h.tracker.handle_step(52);
        assert_eq!(h.tracker.snapshot().step_count, 12);
    }

    #[tokio::test]
    async fn test_missing_step_sensor_still_tracks_distance() {
        let store = Arc::new(MemoryStore::new());
        let (location, _fixes) = ChannelLocationSource::new(true);
        let mut tracker = ActivityTracker::new(
            store,
            Arc::new(UnavailableSensor),
            Arc::new(location),
            Arc::new(FixedClock::new(day(1), T0)),
            TrackerConfig::default(),
        );

        tracker.initialize_tracking().await.unwrap();
        assert!(!tracker.has_step_sensor());
        tracker.start_continuous_tracking().unwrap();

        let (a, b) = walk();
        tracker.handle_location(a);
        tracker.handle_location(b);
        let record = tracker.snapshot();
        assert_eq!(record.step_count, 0);
        assert_eq!(record.calories_burned, record.distance_meters * CALORIES_PER_METER);
    }

    #[tokio::test]
    async fn test_operations_before_initialize() {
        let mut h = harness();
        assert_eq!(h.tracker.state(), TrackerState::Uninitialized);
        assert!(matches!(
            h.tracker.start_continuous_tracking(),
            Err(TrackerError::NotInitialized)
        ));
        assert!(matches!(
            h.tracker.sync_activity_data().await,
            Err(TrackerError::NotInitialized)
        ));

        h.tracker.handle_step(500);
        assert_eq!(h.tracker.snapshot().step_count, 0);
    }

    #[tokio::test]
    async fn test_initialize_is_idempotent() {
        let mut h = harness();
        h.tracker.initialize_tracking().await.unwrap();
        h.tracker.handle_step(300);
        h.tracker.handle_step(310);

        h.tracker.initialize_tracking().await.unwrap();
        assert_eq!(h.tracker.snapshot().step_count, 10);
        assert_eq!(h.tracker.baseline, Some(300));
    }

    #[tokio::test]
    async fn test_initialize_load_failure_is_reported() {
        let mut h = harness();
        h.store.set_failing(true);

        let err = h.tracker.initialize_tracking().await.unwrap_err();
        assert!(matches!(err, TrackerError::Persistence(_)));
        assert_eq!(h.tracker.state(), TrackerState::Uninitialized);

        h.store.set_failing(false);
        h.tracker.initialize_tracking().await.unwrap();
        assert_eq!(h.tracker.state(), TrackerState::Tracking);
    }

    #[tokio::test]
    async fn test_sync_inserts_then_updates() {
        let mut h = harness();
        h.tracker.initialize_tracking().await.unwrap();
        h.tracker.handle_step(1);
        h.tracker.handle_step(21);

        let id = h.tracker.sync_activity_data().await.unwrap();
        assert_eq!(h.tracker.state(), TrackerState::Tracking);
        assert_eq!(h.tracker.snapshot().id, Some(id));
        assert_eq!(h.tracker.snapshot().last_sync_timestamp, Some(T0));

        h.clock.advance_millis(60_000);
        h.tracker.handle_step(41);
        let second = h.tracker.sync_activity_data().await.unwrap();
        assert_eq!(second, id);

        assert_eq!(h.store.activity_count().await, 1);
        let stored = h.store.get_activity_by_date(day(1)).await.unwrap().unwrap();
        assert_eq!(stored.step_count, 40);
        assert_eq!(stored.last_sync_timestamp, Some(T0 + 60_000));
    }

    #[tokio::test]
    async fn test_sync_failure_is_recoverable() {
        let mut h = harness();
        h.tracker.initialize_tracking().await.unwrap();
        h.tracker.handle_step(0);
        h.tracker.handle_step(7);

        h.store.set_failing(true);
        let err = h.tracker.sync_activity_data().await.unwrap_err();
        assert!(matches!(err, TrackerError::Persistence(_)));
        assert_eq!(h.tracker.state(), TrackerState::Tracking);
        assert!(h.tracker.snapshot().last_sync_timestamp.is_none());

        // Tracking carries on and the next sync goes through
        h.tracker.handle_step(9);
        h.store.set_failing(false);
        h.tracker.sync_activity_data().await.unwrap();
        let stored = h.store.get_activity_by_date(day(1)).await.unwrap().unwrap();
        assert_eq!(stored.step_count, 9);
    }

    #[tokio::test]
    async fn test_cleanup_stops_and_reinitialize_restores() {
        let mut h = harness();
        h.tracker.initialize_tracking().await.unwrap();
        h.tracker.start_continuous_tracking().unwrap();
        h.tracker.handle_step(1_000);
        h.tracker.handle_step(1_100);
        h.tracker.sync_activity_data().await.unwrap();

        h.tracker.cleanup();
        assert_eq!(h.tracker.state(), TrackerState::Stopped);
        assert!(!h.steps.push(1_200));
        assert!(!h.fixes.push(walk().0));
        h.tracker.handle_step(1_300);
        assert_eq!(h.tracker.snapshot().step_count, 100);

        // Fresh start: new baseline on top of the stored 100 steps
        h.tracker.initialize_tracking().await.unwrap();
        assert_eq!(h.tracker.baseline, None);
        h.tracker.handle_step(40);
        h.tracker.handle_step(45);
        assert_eq!(h.tracker.snapshot().step_count, 105);
    }

    #[tokio::test]
    async fn test_observers_receive_live_values() {
        let mut h = harness();
        h.tracker.initialize_tracking().await.unwrap();
        let mut steps = h.tracker.step_count();
        let mut distance = h.tracker.distance();
        assert!(!steps.has_changed().unwrap());

        h.tracker.handle_step(10);
        h.tracker.handle_step(25);
        assert!(steps.has_changed().unwrap());
        assert_eq!(*steps.borrow_and_update(), 15);

        let (a, b) = walk();
        h.tracker.handle_location(a);
        assert!(!distance.has_changed().unwrap());
        h.tracker.handle_location(b);
        assert_eq!(*distance.borrow_and_update(), a.distance_to(&b));
    }

    #[tokio::test]
    async fn test_run_applies_events_and_syncs_on_stop() {
        let Harness {
            mut tracker,
            store,
            steps,
            fixes,
            ..
        } = harness();
        tracker.initialize_tracking().await.unwrap();
        tracker.start_continuous_tracking().unwrap();
        let mut step_rx = tracker.step_count();
        let mut distance_rx = tracker.distance();

        let (stop_tx, stop_rx) = watch::channel(false);
        let handle = tokio::spawn(async move {
            tracker.run(stop_rx).await;
            tracker
        });

        let (a, b) = walk();
        assert!(steps.push(100));
        assert!(steps.push(130));
        assert!(fixes.push(a));
        assert!(fixes.push(b));

        wait_until(&mut step_rx, |v| *v == 30).await;
        wait_until(&mut distance_rx, |v| *v > 0.0).await;

        stop_tx.send(true).unwrap();
        let tracker = handle.await.unwrap();
        assert_eq!(tracker.state(), TrackerState::Stopped);

        let stored = store.get_activity_by_date(day(1)).await.unwrap().unwrap();
        assert_eq!(stored.step_count, 30);
        assert_eq!(stored.distance_meters, a.distance_to(&b));
        assert_eq!(stored.last_sync_timestamp, Some(T0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_retries_failed_sync_on_next_tick() {
        let config = TrackerConfig {
            sync_interval: Duration::from_secs(60),
            ..TrackerConfig::default()
        };
        let Harness {
            tracker,
            store,
            steps,
            ..
        } = harness_with(config, true);
        let (notifier, mut notifications) = notify::channel();
        let mut tracker = tracker.with_notifier(notifier);
        tracker.initialize_tracking().await.unwrap();
        let mut step_rx = tracker.step_count();

        store.set_failing(true);
        let (stop_tx, stop_rx) = watch::channel(false);
        let handle = tokio::spawn(async move {
            tracker.run(stop_rx).await;
            tracker
        });

        steps.push(10);
        steps.push(20);
        wait_until(&mut step_rx, |v| *v == 10).await;

        tokio::time::sleep(Duration::from_secs(61)).await;
        let message = notifications.recv().await.unwrap();
        assert_eq!(message.level, MessageLevel::Warning);
        assert!(message.text.contains("Could not save activity"));
        assert_eq!(store.activity_count().await, 0);

        store.set_failing(false);
        for _ in 0..10 {
            if store.activity_count().await == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_secs(30)).await;
        }
        let stored = store.get_activity_by_date(day(1)).await.unwrap().unwrap();
        assert_eq!(stored.step_count, 10);

        stop_tx.send(true).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_run_ends_when_sources_close() {
        let Harness {
            mut tracker,
            store,
            steps,
            fixes,
            ..
        } = harness();
        tracker.initialize_tracking().await.unwrap();
        tracker.start_continuous_tracking().unwrap();

        steps.push(200);
        steps.push(260);
        steps.close();
        fixes.close();

        let (_stop_tx, stop_rx) = watch::channel(false);
        tracker.run(stop_rx).await;

        assert_eq!(tracker.state(), TrackerState::Stopped);
        let stored = store.get_activity_by_date(day(1)).await.unwrap().unwrap();
        assert_eq!(stored.step_count, 60);
    }

    #[tokio::test]
    async fn test_run_rolls_over_to_new_day() {
        let Harness {
            mut tracker,
            store,
            clock,
            steps,
            ..
        } = harness();
        tracker.initialize_tracking().await.unwrap();
        let mut step_rx = tracker.step_count();

        let (stop_tx, stop_rx) = watch::channel(false);
        let handle = tokio::spawn(async move {
            tracker.run(stop_rx).await;
            tracker
        });

        steps.push(100);
        steps.push(150);
        wait_until(&mut step_rx, |v| *v == 50).await;

        clock.set_today(day(2));
        clock.advance_millis(1_000);
        steps.push(160);
        wait_until(&mut step_rx, |v| *v == 10).await;

        stop_tx.send(true).unwrap();
        let tracker = handle.await.unwrap();
        assert_eq!(tracker.snapshot().date, day(2));

        let first = store.get_activity_by_date(day(1)).await.unwrap().unwrap();
        let second = store.get_activity_by_date(day(2)).await.unwrap().unwrap();
        assert_eq!(first.step_count, 50);
        assert_eq!(second.step_count, 10);
        assert_ne!(first.id, second.id);
    }

    #[tokio::test]
    async fn test_huge_reading_saturates_instead_of_overflowing() {
        let mut h = harness();
        let mut stored = DailyActivityRecord::new(day(1));
        stored.step_count = 500;
        h.store.save_activity(&stored).await.unwrap();
        h.tracker.initialize_tracking().await.unwrap();

        h.tracker.handle_step(0);
        h.tracker.handle_step(u64::MAX);
        assert_eq!(h.tracker.snapshot().step_count, u64::MAX);

        // Still monotonic afterwards
        h.tracker.handle_step(10);
        assert_eq!(h.tracker.snapshot().step_count, u64::MAX);
    }

    #[tokio::test]
    async fn test_failed_day_change_save_is_retried() {
        let Harness {
            mut tracker,
            store,
            clock,
            steps,
            ..
        } = harness();
        tracker.initialize_tracking().await.unwrap();
        let mut step_rx = tracker.step_count();

        let (stop_tx, stop_rx) = watch::channel(false);
        let handle = tokio::spawn(async move {
            tracker.run(stop_rx).await;
            tracker
        });

        steps.push(100);
        steps.push(400);
        wait_until(&mut step_rx, |v| *v == 300).await;

        store.set_failing(true);
        clock.set_today(day(2));
        steps.push(410);
        wait_until(&mut step_rx, |v| *v == 10).await;

        store.set_failing(false);
        steps.push(420);
        wait_until(&mut step_rx, |v| *v == 20).await;

        stop_tx.send(true).unwrap();
        let tracker = handle.await.unwrap();
        assert_eq!(tracker.unsaved_day_count(), 0);

        let first = store.get_activity_by_date(day(1)).await.unwrap().unwrap();
        let second = store.get_activity_by_date(day(2)).await.unwrap().unwrap();
        assert_eq!(first.step_count, 300);
        assert_eq!(second.step_count, 20);
    }

    #[tokio::test]
    async fn test_explicit_sync_saves_earlier_unsaved_day() {
        let mut h = harness();
        h.tracker.initialize_tracking().await.unwrap();
        h.tracker.handle_step(0);
        h.tracker.handle_step(80);

        h.store.set_failing(true);
        h.clock.set_today(day(2));
        h.tracker.roll_over_if_new_day().await;
        assert_eq!(h.tracker.unsaved_day_count(), 1);
        assert_eq!(h.tracker.snapshot().date, day(2));

        h.store.set_failing(false);
        h.tracker.sync_activity_data().await.unwrap();
        assert_eq!(h.tracker.unsaved_day_count(), 0);

        let first = h.store.get_activity_by_date(day(1)).await.unwrap().unwrap();
        assert_eq!(first.step_count, 80);
        assert!(first.last_sync_timestamp.is_some());
    }

    /// Saves block until released.
    struct GatedStore {
        inner: MemoryStore,
        started: tokio::sync::Notify,
        release: tokio::sync::Notify,
    }

    #[async_trait::async_trait]
    impl ActivityStore for GatedStore {
        async fn get_activity_by_date(
            &self,
            date: NaiveDate,
        ) -> crate::store::StoreResult<Option<DailyActivityRecord>> {
            self.inner.get_activity_by_date(date).await
        }

        async fn save_activity(
            &self,
            record: &DailyActivityRecord,
        ) -> crate::store::StoreResult<Uuid> {
            self.started.notify_one();
            self.release.notified().await;
            self.inner.save_activity(record).await
        }

        async fn update_activity(
            &self,
            record: &DailyActivityRecord,
        ) -> crate::store::StoreResult<()> {
            self.inner.update_activity(record).await
        }

        async fn list_activity_range(
            &self,
            from: NaiveDate,
            to: NaiveDate,
        ) -> crate::store::StoreResult<Vec<DailyActivityRecord>> {
            self.inner.list_activity_range(from, to).await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_during_sync_still_saves() {
        let store = Arc::new(GatedStore {
            inner: MemoryStore::new(),
            started: tokio::sync::Notify::new(),
            release: tokio::sync::Notify::new(),
        });
        let (sensor, steps) = ChannelStepSensor::new();
        let (location, _fixes) = ChannelLocationSource::new(false);
        let config = TrackerConfig {
            sync_interval: Duration::from_secs(60),
            ..TrackerConfig::default()
        };
        let mut tracker = ActivityTracker::new(
            store.clone(),
            Arc::new(sensor),
            Arc::new(location),
            Arc::new(FixedClock::new(day(1), T0)),
            config,
        );
        tracker.initialize_tracking().await.unwrap();
        let mut step_rx = tracker.step_count();

        let (stop_tx, stop_rx) = watch::channel(false);
        let handle = tokio::spawn(async move {
            tracker.run(stop_rx).await;
            tracker
        });

        steps.push(1_000);
        steps.push(1_250);
        wait_until(&mut step_rx, |v| *v == 250).await;

        // The periodic save is now blocked inside the store
        store.started.notified().await;
        stop_tx.send(true).unwrap();
        store.release.notify_one();

        let tracker = handle.await.unwrap();
        assert_eq!(tracker.state(), TrackerState::Stopped);
        assert_eq!(store.inner.activity_count().await, 1);
        let stored = store
            .inner
            .get_activity_by_date(day(1))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.step_count, 250);
        assert_eq!(tracker.snapshot().id, stored.id);
    }

    /// Grants permission but has no GPS hardware.
    struct NoGps;

    impl LocationSource for NoGps {
        fn has_permission(&self) -> bool {
            true
        }

        fn subscribe(
            &self,
            _interval: Duration,
        ) -> Result<EventStream<LocationFix>, crate::error::SourceError> {
            Err(crate::error::SourceError::Unavailable)
        }
    }

    #[tokio::test]
    async fn test_missing_location_hardware_is_sensor_unavailable() {
        let (sensor, _steps) = ChannelStepSensor::new();
        let mut tracker = ActivityTracker::new(
            Arc::new(MemoryStore::new()),
            Arc::new(sensor),
            Arc::new(NoGps),
            Arc::new(FixedClock::new(day(1), T0)),
            TrackerConfig::default(),
        );
        tracker.initialize_tracking().await.unwrap();

        let err = tracker.start_continuous_tracking().unwrap_err();
        assert!(matches!(err, TrackerError::SensorUnavailable));
        assert!(!tracker.is_tracking_location());
        assert_eq!(tracker.state(), TrackerState::Tracking);
    }
}
