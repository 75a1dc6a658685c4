//! Step and location tracking for the current day.

mod clock;
mod source;
mod tracker;

pub use clock::{Clock, FixedClock, SystemClock};
pub use source::{
    ChannelLocationSource, ChannelStepSensor, EventStream, Feed, LocationFix, LocationSource,
    StepSensor, UnavailableSensor,
};
pub use tracker::{
    calories_for, ActivityTracker, TrackerConfig, TrackerState, CALORIES_PER_METER,
    CALORIES_PER_STEP,
};
