//! Simulated producers that generate synthetic samples.
//!
//! These stand in for the physical capture drivers (encoder decoding, sensor
//! fusion, camera and microphone pipelines) so the full pipeline can run
//! headless and the concurrency behaviour can be tested: each mock spawns a
//! tokio task that appends to the ring's current write record at its own
//! cadence, checking its recording flag before every append. While paused,
//! samples are dropped on the floor, never queued.

use super::Producer;
use crate::buffer::TimestepRingBuffer;
use crate::error::{AppResult, RoverError};
use crate::record::{
    timestamp_micros, ImageSample, OrientationSample, SoundSnapshot, VoltageSample, WheelSample,
};
use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::info;

/// Shared plumbing for all mock producers: the ring, the recording flag and
/// the capture task handle.
struct MockBase {
    ring: Arc<TimestepRingBuffer>,
    recording: Arc<AtomicBool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl MockBase {
    fn new(ring: Arc<TimestepRingBuffer>) -> Self {
        Self {
            ring,
            recording: Arc::new(AtomicBool::new(false)),
            task: Mutex::new(None),
        }
    }

    fn store(&self, name: &str, handle: JoinHandle<()>) -> AppResult<()> {
        let mut slot = self
            .task
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if slot.is_some() {
            handle.abort();
            return Err(RoverError::Precondition(format!(
                "producer '{name}' already started"
            )));
        }
        *slot = Some(handle);
        Ok(())
    }

    fn abort(&self) {
        if let Some(handle) = self
            .task
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
        {
            handle.abort();
        }
    }
}

macro_rules! impl_mock_producer {
    ($ty:ident, $name:literal, $perms:expr) => {
        #[async_trait]
        impl Producer for $ty {
            fn name(&self) -> String {
                $name.to_string()
            }

            fn required_permissions(&self) -> Vec<String> {
                $perms.iter().map(|p: &&str| p.to_string()).collect()
            }

            async fn start(&self) -> AppResult<()> {
                info!(producer = $name, "starting simulated capture (paused)");
                let task = tokio::spawn(Self::capture_loop(
                    Arc::clone(&self.base.ring),
                    Arc::clone(&self.base.recording),
                    self.interval,
                ));
                self.base.store($name, task)
            }

            async fn stop(&self) -> AppResult<()> {
                info!(producer = $name, "stopping simulated capture");
                self.base.abort();
                Ok(())
            }

            fn set_recording(&self, enabled: bool) {
                self.base.recording.store(enabled, Ordering::Release);
            }
        }
    };
}

/// Simulated quadrature wheel encoder pair.
pub struct MockWheelEncoder {
    base: MockBase,
    interval: Duration,
}

impl MockWheelEncoder {
    /// Creates an encoder producing cumulative counts at `interval` cadence.
    pub fn new(ring: Arc<TimestepRingBuffer>, interval: Duration) -> Self {
        Self {
            base: MockBase::new(ring),
            interval,
        }
    }

    async fn capture_loop(
        ring: Arc<TimestepRingBuffer>,
        recording: Arc<AtomicBool>,
        interval: Duration,
    ) {
        let mut ticker = tokio::time::interval(interval);
        let mut rng = StdRng::from_entropy();
        let mut left: i64 = 0;
        let mut right: i64 = 0;
        loop {
            ticker.tick().await;
            left += rng.gen_range(0..4);
            right += rng.gen_range(0..4);
            if recording.load(Ordering::Acquire) {
                ring.current_write().append_wheel(WheelSample {
                    timestamp_us: timestamp_micros(),
                    left_count: left,
                    right_count: right,
                });
            }
        }
    }
}

impl_mock_producer!(MockWheelEncoder, "wheel-encoder", [""; 0]);

/// Simulated fused orientation sensor.
pub struct MockOrientationSensor {
    base: MockBase,
    interval: Duration,
}

impl MockOrientationSensor {
    /// Creates an orientation source at `interval` cadence.
    pub fn new(ring: Arc<TimestepRingBuffer>, interval: Duration) -> Self {
        Self {
            base: MockBase::new(ring),
            interval,
        }
    }

    async fn capture_loop(
        ring: Arc<TimestepRingBuffer>,
        recording: Arc<AtomicBool>,
        interval: Duration,
    ) {
        let mut ticker = tokio::time::interval(interval);
        let mut phase: f64 = 0.0;
        loop {
            ticker.tick().await;
            phase += 0.05;
            if recording.load(Ordering::Acquire) {
                ring.current_write().append_orientation(OrientationSample {
                    timestamp_us: timestamp_micros(),
                    tilt_rad: 0.1 * phase.sin(),
                    angular_velocity_rad: 0.1 * phase.cos(),
                });
            }
        }
    }
}

impl_mock_producer!(MockOrientationSensor, "orientation", [""; 0]);

/// Simulated battery monitor reporting battery and charger voltage.
pub struct MockBatteryMonitor {
    base: MockBase,
    interval: Duration,
}

impl MockBatteryMonitor {
    /// Creates a voltage source at `interval` cadence.
    pub fn new(ring: Arc<TimestepRingBuffer>, interval: Duration) -> Self {
        Self {
            base: MockBase::new(ring),
            interval,
        }
    }

    async fn capture_loop(
        ring: Arc<TimestepRingBuffer>,
        recording: Arc<AtomicBool>,
        interval: Duration,
    ) {
        let mut ticker = tokio::time::interval(interval);
        let mut rng = StdRng::from_entropy();
        loop {
            ticker.tick().await;
            if recording.load(Ordering::Acquire) {
                let now = timestamp_micros();
                let record = ring.current_write();
                record.append_battery(VoltageSample {
                    timestamp_us: now,
                    volts: 11.4 + rng.gen_range(-0.2..0.2),
                });
                record.append_charger(VoltageSample {
                    timestamp_us: now,
                    volts: 0.0,
                });
            }
        }
    }
}

impl_mock_producer!(MockBatteryMonitor, "battery-monitor", [""; 0]);

/// Simulated microphone producing one level snapshot per window.
pub struct MockMicrophone {
    base: MockBase,
    interval: Duration,
}

impl MockMicrophone {
    /// Creates a microphone snapshotting levels every `interval`.
    pub fn new(ring: Arc<TimestepRingBuffer>, interval: Duration) -> Self {
        Self {
            base: MockBase::new(ring),
            interval,
        }
    }

    async fn capture_loop(
        ring: Arc<TimestepRingBuffer>,
        recording: Arc<AtomicBool>,
        interval: Duration,
    ) {
        const SAMPLE_RATE: u32 = 16_000;
        let mut ticker = tokio::time::interval(interval);
        let mut rng = StdRng::from_entropy();
        loop {
            let start = timestamp_micros();
            ticker.tick().await;
            if recording.load(Ordering::Acquire) {
                let total =
                    (u64::from(SAMPLE_RATE) * interval.as_micros() as u64) / 1_000_000;
                let levels = (0..16).map(|_| rng.gen::<f32>()).collect();
                ring.current_write().set_sound(SoundSnapshot {
                    levels,
                    total_samples: total,
                    sample_rate: SAMPLE_RATE,
                    start_timestamp_us: start,
                    end_timestamp_us: timestamp_micros(),
                });
            }
        }
    }
}

impl_mock_producer!(MockMicrophone, "microphone", ["record-audio"]);

/// Simulated camera emitting small encoded frames at a slow cadence.
pub struct MockCamera {
    base: MockBase,
    interval: Duration,
}

impl MockCamera {
    /// Creates a camera producing one frame every `interval`.
    pub fn new(ring: Arc<TimestepRingBuffer>, interval: Duration) -> Self {
        Self {
            base: MockBase::new(ring),
            interval,
        }
    }

    async fn capture_loop(
        ring: Arc<TimestepRingBuffer>,
        recording: Arc<AtomicBool>,
        interval: Duration,
    ) {
        let mut ticker = tokio::time::interval(interval);
        let mut frame_no: u8 = 0;
        loop {
            ticker.tick().await;
            frame_no = frame_no.wrapping_add(1);
            if recording.load(Ordering::Acquire) {
                ring.current_write().append_image(ImageSample {
                    timestamp_us: timestamp_micros(),
                    width: 32,
                    height: 24,
                    encoded: vec![frame_no; 64],
                });
            }
        }
    }
}

impl_mock_producer!(MockCamera, "camera", ["camera"]);

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::sleep;

    #[tokio::test]
    async fn paused_producer_drops_samples() {
        let ring = Arc::new(TimestepRingBuffer::new(3).unwrap());
        let encoder = MockWheelEncoder::new(Arc::clone(&ring), Duration::from_millis(5));
        encoder.start().await.unwrap();

        // Never enabled recording: nothing may land in the ring.
        sleep(Duration::from_millis(40)).await;
        assert!(ring.current_write().snapshot().wheel.is_empty());

        encoder.set_recording(true);
        sleep(Duration::from_millis(40)).await;
        assert!(!ring.current_write().snapshot().wheel.is_empty());

        encoder.stop().await.unwrap();
    }

    #[tokio::test]
    async fn double_start_is_a_precondition_error() {
        let ring = Arc::new(TimestepRingBuffer::new(2).unwrap());
        let camera = MockCamera::new(ring, Duration::from_millis(50));
        camera.start().await.unwrap();
        assert!(matches!(
            camera.start().await,
            Err(RoverError::Precondition(_))
        ));
        camera.stop().await.unwrap();
    }

    #[tokio::test]
    async fn stop_is_idempotent() {
        let ring = Arc::new(TimestepRingBuffer::new(2).unwrap());
        let mic = MockMicrophone::new(ring, Duration::from_millis(50));
        mic.start().await.unwrap();
        mic.stop().await.unwrap();
        mic.stop().await.unwrap();
    }
}
