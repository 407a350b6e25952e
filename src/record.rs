//! Per-timestep sample containers.
//!
//! A [`TimestepRecord`] holds everything the producers captured during one
//! aggregation window. Each channel lives behind its own mutex so independent
//! producers append to disjoint channels without contending on a whole-record
//! lock; a producer that writes two channels (e.g. the battery monitor, which
//! reports both battery and charger voltage) serializes its own writes.
//!
//! Channels come in two flavours:
//! - append-only ordered sequences (wheel counts, orientation, voltages,
//!   images), where append order equals capture order within the channel;
//! - last-write-wins scalars (the sound-level snapshot, the action taken),
//!   overwritten at most once per tick.
//!
//! The ring buffer guarantees the consumer never reads a record while
//! producers still target it, so `snapshot()` taking all the channel locks
//! in turn is uncontended in the steady state.

use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

/// Microseconds since the Unix epoch, the timestamp unit used on every
/// channel sample.
pub fn timestamp_micros() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as u64)
        .unwrap_or_default()
}

/// Cumulative quadrature counts from both wheel encoders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WheelSample {
    /// Capture time in microseconds since the Unix epoch.
    pub timestamp_us: u64,
    /// Cumulative left wheel count.
    pub left_count: i64,
    /// Cumulative right wheel count.
    pub right_count: i64,
}

/// One voltage reading. Used for both the battery and the charger channel.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VoltageSample {
    /// Capture time in microseconds since the Unix epoch.
    pub timestamp_us: u64,
    /// Measured potential in volts.
    pub volts: f64,
}

/// Fused orientation reading.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OrientationSample {
    /// Capture time in microseconds since the Unix epoch.
    pub timestamp_us: u64,
    /// Tilt from vertical, radians.
    pub tilt_rad: f64,
    /// Angular velocity around the tilt axis, radians per second.
    pub angular_velocity_rad: f64,
}

/// Down-sampled microphone levels covering one aggregation window.
/// Last-write-wins: the microphone overwrites this once per tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SoundSnapshot {
    /// Down-sampled absolute levels.
    pub levels: Vec<f32>,
    /// Raw sample count the levels were reduced from.
    pub total_samples: u64,
    /// Raw capture rate in Hz.
    pub sample_rate: u32,
    /// Window start, microseconds since the Unix epoch.
    pub start_timestamp_us: u64,
    /// Window end, microseconds since the Unix epoch.
    pub end_timestamp_us: u64,
}

/// One encoded camera frame. A tick may carry zero or more of these.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSample {
    /// Capture time in microseconds since the Unix epoch.
    pub timestamp_us: u64,
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Encoded frame bytes (codec is the camera driver's concern).
    pub encoded: Vec<u8>,
}

/// The action the scheduler committed for this timestep. Set at most once
/// per tick, by the scheduler only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionSample {
    /// Discrete motion action index.
    pub motion_action: i32,
    /// Discrete communication action index.
    pub comm_action: i32,
}

/// Plain owned copy of a record's channels, handed to the serializer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimestepSnapshot {
    /// Wheel encoder sequence.
    pub wheel: Vec<WheelSample>,
    /// Orientation sequence.
    pub orientation: Vec<OrientationSample>,
    /// Charger voltage sequence.
    pub charger: Vec<VoltageSample>,
    /// Battery voltage sequence.
    pub battery: Vec<VoltageSample>,
    /// Sound-level snapshot, if the microphone reported this tick.
    pub sound: Option<SoundSnapshot>,
    /// Camera frames captured this tick.
    pub images: Vec<ImageSample>,
    /// Action committed by the scheduler, if any.
    pub action: Option<ActionSample>,
}

impl TimestepSnapshot {
    /// True when no channel carries any data.
    pub fn is_empty(&self) -> bool {
        self.wheel.is_empty()
            && self.orientation.is_empty()
            && self.charger.is_empty()
            && self.battery.is_empty()
            && self.sound.is_none()
            && self.images.is_empty()
            && self.action.is_none()
    }
}

/// One ring slot's worth of channel storage.
///
/// A record is either open for writing (it is the ring's current write slot)
/// or closed for reading (the current read slot); `reset()` is called exactly
/// once per reuse, by the ring buffer, immediately before the record becomes
/// the write target again.
#[derive(Debug, Default)]
pub struct TimestepRecord {
    wheel: Mutex<Vec<WheelSample>>,
    orientation: Mutex<Vec<OrientationSample>>,
    charger: Mutex<Vec<VoltageSample>>,
    battery: Mutex<Vec<VoltageSample>>,
    sound: Mutex<Option<SoundSnapshot>>,
    images: Mutex<Vec<ImageSample>>,
    action: Mutex<Option<ActionSample>>,
}

/// A poisoned channel lock only means a producer panicked mid-append; the
/// half-written sample is droppable, so recover the guard rather than
/// cascading the panic into the consumer.
fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl TimestepRecord {
    /// Creates an empty record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one wheel encoder sample.
    pub fn append_wheel(&self, sample: WheelSample) {
        lock(&self.wheel).push(sample);
    }

    /// Appends one orientation sample.
    pub fn append_orientation(&self, sample: OrientationSample) {
        lock(&self.orientation).push(sample);
    }

    /// Appends one charger voltage sample.
    pub fn append_charger(&self, sample: VoltageSample) {
        lock(&self.charger).push(sample);
    }

    /// Appends one battery voltage sample.
    pub fn append_battery(&self, sample: VoltageSample) {
        lock(&self.battery).push(sample);
    }

    /// Appends one encoded camera frame.
    pub fn append_image(&self, sample: ImageSample) {
        lock(&self.images).push(sample);
    }

    /// Overwrites the sound-level snapshot for this window.
    pub fn set_sound(&self, snapshot: SoundSnapshot) {
        *lock(&self.sound) = Some(snapshot);
    }

    /// Records the action the scheduler committed for this timestep.
    pub fn set_action(&self, action: ActionSample) {
        *lock(&self.action) = Some(action);
    }

    /// Clears every channel. Consumer-only; called by the ring buffer when
    /// this record is about to become the write target again.
    pub fn reset(&self) {
        lock(&self.wheel).clear();
        lock(&self.orientation).clear();
        lock(&self.charger).clear();
        lock(&self.battery).clear();
        *lock(&self.sound) = None;
        lock(&self.images).clear();
        *lock(&self.action) = None;
    }

    /// Copies every channel into an owned snapshot for serialization.
    pub fn snapshot(&self) -> TimestepSnapshot {
        TimestepSnapshot {
            wheel: lock(&self.wheel).clone(),
            orientation: lock(&self.orientation).clone(),
            charger: lock(&self.charger).clone(),
            battery: lock(&self.battery).clone(),
            sound: lock(&self.sound).clone(),
            images: lock(&self.images).clone(),
            action: *lock(&self.action),
        }
    }
}
