//! Step-counter and location event sources.
//!
//! A subscription is an [`EventStream`]; dropping it unsubscribes.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

use crate::error::SourceError;

/// Mean earth radius in meters.
const EARTH_RADIUS_M: f64 = 6_371_008.8;

/// A single location fix as reported by the device.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LocationFix {
    pub latitude: f64,
    pub longitude: f64,
    /// Radius of 68% confidence, in meters.
    #[serde(default)]
    pub accuracy_m: f64,
    #[serde(default)]
    pub timestamp_ms: i64,
}

impl LocationFix {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            accuracy_m: 0.0,
            timestamp_ms: 0,
        }
    }

    pub fn with_accuracy(mut self, accuracy_m: f64) -> Self {
        self.accuracy_m = accuracy_m;
        self
    }

    /// Great-circle distance in meters (haversine).
    pub fn distance_to(&self, other: &LocationFix) -> f64 {
        let lat1 = self.latitude.to_radians();
        let lat2 = other.latitude.to_radians();
        let dlat = lat2 - lat1;
        let dlon = (other.longitude - self.longitude).to_radians();

        let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
        let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
        EARTH_RADIUS_M * c
    }
}

/// Live events from one subscription.
#[derive(Debug)]
pub struct EventStream<T> {
    rx: mpsc::UnboundedReceiver<T>,
}

impl<T> EventStream<T> {
    pub fn new(rx: mpsc::UnboundedReceiver<T>) -> Self {
        Self { rx }
    }

    /// Next event, or `None` once the source has shut down.
    pub async fn recv(&mut self) -> Option<T> {
        self.rx.recv().await
    }
}

/// Device step counter. Readings are cumulative since boot.
pub trait StepSensor: Send + Sync {
    fn subscribe(&self) -> Result<EventStream<u64>, SourceError>;
}

/// Device location provider.
pub trait LocationSource: Send + Sync {
    fn has_permission(&self) -> bool;

    fn subscribe(&self, interval: Duration) -> Result<EventStream<LocationFix>, SourceError>;
}

type Slot<T> = Arc<Mutex<Option<mpsc::UnboundedSender<T>>>>;

fn open<T>(slot: &Slot<T>) -> EventStream<T> {
    let (tx, rx) = mpsc::unbounded_channel();
    *slot.lock().unwrap_or_else(|e| e.into_inner()) = Some(tx);
    EventStream::new(rx)
}

/// Pushes events into whichever stream is currently subscribed.
#[derive(Debug)]
pub struct Feed<T> {
    slot: Slot<T>,
}

impl<T> Clone for Feed<T> {
    fn clone(&self) -> Self {
        Self {
            slot: Arc::clone(&self.slot),
        }
    }
}

impl<T> Feed<T> {
    /// Returns false when nobody is subscribed.
    pub fn push(&self, value: T) -> bool {
        let guard = self.slot.lock().unwrap_or_else(|e| e.into_inner());
        match guard.as_ref() {
            Some(tx) => tx.send(value).is_ok(),
            None => false,
        }
    }

    /// Ends the current subscription as if the platform shut the source down.
    pub fn close(&self) {
        self.slot.lock().unwrap_or_else(|e| e.into_inner()).take();
    }
}

/// Step sensor fed through a [`Feed`], for replays and tests.
pub struct ChannelStepSensor {
    slot: Slot<u64>,
}

impl ChannelStepSensor {
    pub fn new() -> (Self, Feed<u64>) {
        let slot: Slot<u64> = Arc::new(Mutex::new(None));
        (
            Self {
                slot: Arc::clone(&slot),
            },
            Feed { slot },
        )
    }
}

impl StepSensor for ChannelStepSensor {
    fn subscribe(&self) -> Result<EventStream<u64>, SourceError> {
        Ok(open(&self.slot))
    }
}

/// A device without a step counter.
pub struct UnavailableSensor;

impl StepSensor for UnavailableSensor {
    fn subscribe(&self) -> Result<EventStream<u64>, SourceError> {
        Err(SourceError::Unavailable)
    }
}

/// Location source fed through a [`Feed`], with a permission switch.
pub struct ChannelLocationSource {
    slot: Slot<LocationFix>,
    permitted: AtomicBool,
}

impl ChannelLocationSource {
    pub fn new(permitted: bool) -> (Self, Feed<LocationFix>) {
        let slot: Slot<LocationFix> = Arc::new(Mutex::new(None));
        (
            Self {
                slot: Arc::clone(&slot),
                permitted: AtomicBool::new(permitted),
            },
            Feed { slot },
        )
    }

    pub fn set_permission(&self, permitted: bool) {
        self.permitted.store(permitted, Ordering::SeqCst);
    }
}

impl LocationSource for ChannelLocationSource {
    fn has_permission(&self) -> bool {
        self.permitted.load(Ordering::SeqCst)
    }

    fn subscribe(&self, _interval: Duration) -> Result<EventStream<LocationFix>, SourceError> {
        if !self.has_permission() {
            return Err(SourceError::PermissionDenied);
        }
        Ok(open(&self.slot))
    }
}
