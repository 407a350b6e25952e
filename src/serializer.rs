//! Episode accumulation: one serialized timestep block per scheduler tick.
//!
//! The exact binary schema of a timestep is deliberately an opaque
//! length+bytes contract with the trainer, so the per-channel encoding lives
//! behind the [`TimestepCodec`] trait; [`BinaryCodec`] is the default. What
//! the serializer itself pins down is structure and ordering:
//!
//! - an episode payload is `[u32 BE timestep count][blocks…]`, the count
//!   sharing the byte order of the wire framing around it;
//! - each block is `[u32 LE block length][channel sections…]`;
//! - channel sections appear in a fixed, positionally-parseable order:
//!   **wheel, orientation, charger, battery, sound, image, action**;
//! - a channel with no data this tick encodes as a zero-length section,
//!   never as an absent one. Serialization never fails.
//!
//! The accumulated payload is owned by the serializer until
//! [`EpisodeSerializer::end_episode`] hands it off as frozen [`Bytes`], after
//! which the serializer starts a fresh accumulator and must not touch the
//! old payload again.

use crate::record::TimestepSnapshot;
use bytes::{BufMut, Bytes, BytesMut};

/// Encodes one channel section's body. All multi-byte values within the
/// payload are little-endian; the wire framing around the payload is
/// big-endian and lives in [`crate::transport`].
pub trait TimestepCodec: Send {
    /// Appends the wheel section body.
    fn wheel(&self, snapshot: &TimestepSnapshot, out: &mut BytesMut);
    /// Appends the orientation section body.
    fn orientation(&self, snapshot: &TimestepSnapshot, out: &mut BytesMut);
    /// Appends the charger voltage section body.
    fn charger(&self, snapshot: &TimestepSnapshot, out: &mut BytesMut);
    /// Appends the battery voltage section body.
    fn battery(&self, snapshot: &TimestepSnapshot, out: &mut BytesMut);
    /// Appends the sound section body.
    fn sound(&self, snapshot: &TimestepSnapshot, out: &mut BytesMut);
    /// Appends the image section body.
    fn image(&self, snapshot: &TimestepSnapshot, out: &mut BytesMut);
    /// Appends the action section body.
    fn action(&self, snapshot: &TimestepSnapshot, out: &mut BytesMut);
}

/// Default little-endian binary encoding for every channel.
#[derive(Debug, Default, Clone, Copy)]
pub struct BinaryCodec;

impl TimestepCodec for BinaryCodec {
    fn wheel(&self, snapshot: &TimestepSnapshot, out: &mut BytesMut) {
        for s in &snapshot.wheel {
            out.put_u64_le(s.timestamp_us);
            out.put_i64_le(s.left_count);
            out.put_i64_le(s.right_count);
        }
    }

    fn orientation(&self, snapshot: &TimestepSnapshot, out: &mut BytesMut) {
        for s in &snapshot.orientation {
            out.put_u64_le(s.timestamp_us);
            out.put_f64_le(s.tilt_rad);
            out.put_f64_le(s.angular_velocity_rad);
        }
    }

    fn charger(&self, snapshot: &TimestepSnapshot, out: &mut BytesMut) {
        for s in &snapshot.charger {
            out.put_u64_le(s.timestamp_us);
            out.put_f64_le(s.volts);
        }
    }

    fn battery(&self, snapshot: &TimestepSnapshot, out: &mut BytesMut) {
        for s in &snapshot.battery {
            out.put_u64_le(s.timestamp_us);
            out.put_f64_le(s.volts);
        }
    }

    fn sound(&self, snapshot: &TimestepSnapshot, out: &mut BytesMut) {
        if let Some(sound) = &snapshot.sound {
            out.put_u32_le(sound.levels.len() as u32);
            for level in &sound.levels {
                out.put_f32_le(*level);
            }
            out.put_u64_le(sound.total_samples);
            out.put_u32_le(sound.sample_rate);
            out.put_u64_le(sound.start_timestamp_us);
            out.put_u64_le(sound.end_timestamp_us);
        }
    }

    fn image(&self, snapshot: &TimestepSnapshot, out: &mut BytesMut) {
        for s in &snapshot.images {
            out.put_u64_le(s.timestamp_us);
            out.put_u32_le(s.width);
            out.put_u32_le(s.height);
            out.put_u32_le(s.encoded.len() as u32);
            out.put_slice(&s.encoded);
        }
    }

    fn action(&self, snapshot: &TimestepSnapshot, out: &mut BytesMut) {
        if let Some(action) = &snapshot.action {
            out.put_i32_le(action.motion_action);
            out.put_i32_le(action.comm_action);
        }
    }
}

/// Fixed serialization order of the channel sections within a block.
const SECTION_COUNT: usize = 7;

/// Accumulates serialized timestep blocks into one episode payload.
pub struct EpisodeSerializer {
    codec: Box<dyn TimestepCodec>,
    payload: BytesMut,
    timestep_count: u32,
}

impl EpisodeSerializer {
    /// Creates a serializer using the default [`BinaryCodec`].
    pub fn new() -> Self {
        Self::with_codec(Box::new(BinaryCodec))
    }

    /// Creates a serializer with a custom channel codec.
    pub fn with_codec(codec: Box<dyn TimestepCodec>) -> Self {
        Self {
            codec,
            payload: BytesMut::new(),
            timestep_count: 0,
        }
    }

    /// Timesteps accumulated since the last [`end_episode`](Self::end_episode).
    pub fn timestep_count(&self) -> u32 {
        self.timestep_count
    }

    /// Appends one timestep block built from every channel present in
    /// `snapshot`. Missing channels become zero-length sections; this never
    /// fails.
    pub fn on_tick(&mut self, snapshot: &TimestepSnapshot) {
        let mut block = BytesMut::new();
        let encoders: [fn(&dyn TimestepCodec, &TimestepSnapshot, &mut BytesMut); SECTION_COUNT] = [
            |c, s, o| c.wheel(s, o),
            |c, s, o| c.orientation(s, o),
            |c, s, o| c.charger(s, o),
            |c, s, o| c.battery(s, o),
            |c, s, o| c.sound(s, o),
            |c, s, o| c.image(s, o),
            |c, s, o| c.action(s, o),
        ];
        let mut section = BytesMut::new();
        for encode in encoders {
            section.clear();
            encode(self.codec.as_ref(), snapshot, &mut section);
            block.put_u32_le(section.len() as u32);
            block.put_slice(&section);
        }

        self.payload.put_u32_le(block.len() as u32);
        self.payload.put_slice(&block);
        self.timestep_count += 1;
    }

    /// Finalizes the accumulated blocks into one self-contained payload and
    /// resets the accumulator for the next episode. Ownership of the bytes
    /// transfers to the caller.
    pub fn end_episode(&mut self) -> Bytes {
        let blocks = std::mem::take(&mut self.payload);
        let mut episode = BytesMut::with_capacity(4 + blocks.len());
        episode.put_u32(self.timestep_count);
        episode.put_slice(&blocks);
        self.timestep_count = 0;
        episode.freeze()
    }
}

impl Default for EpisodeSerializer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{ActionSample, OrientationSample, VoltageSample, WheelSample};
    use bytes::Buf;

    fn read_u32(buf: &mut impl Buf) -> u32 {
        buf.get_u32_le()
    }

    /// The episode-level count is big-endian, matching the wire framing.
    fn read_count(buf: &mut impl Buf) -> u32 {
        buf.get_u32()
    }

    /// Splits one block into its seven section bodies.
    fn sections(mut block: Bytes) -> Vec<Bytes> {
        let mut out = Vec::new();
        while block.has_remaining() {
            let len = read_u32(&mut block) as usize;
            out.push(block.split_to(len));
        }
        out
    }

    fn snapshot_with_wheel_and_action() -> TimestepSnapshot {
        TimestepSnapshot {
            wheel: vec![WheelSample {
                timestamp_us: 7,
                left_count: 1,
                right_count: 2,
            }],
            action: Some(ActionSample {
                motion_action: 4,
                comm_action: 1,
            }),
            ..Default::default()
        }
    }

    #[test]
    fn empty_snapshot_serializes_as_seven_zero_length_sections() {
        let mut serializer = EpisodeSerializer::new();
        serializer.on_tick(&TimestepSnapshot::default());
        let mut episode = serializer.end_episode();

        assert_eq!(read_count(&mut episode), 1); // timestep count
        let block_len = read_u32(&mut episode) as usize;
        let body = episode.split_to(block_len);
        let secs = sections(body);
        assert_eq!(secs.len(), SECTION_COUNT);
        assert!(secs.iter().all(|s| s.is_empty()));
    }

    #[test]
    fn sections_follow_the_documented_channel_order() {
        let mut snapshot = snapshot_with_wheel_and_action();
        snapshot.orientation.push(OrientationSample {
            timestamp_us: 9,
            tilt_rad: 0.5,
            angular_velocity_rad: -0.5,
        });
        snapshot.battery.push(VoltageSample {
            timestamp_us: 9,
            volts: 12.0,
        });

        let mut serializer = EpisodeSerializer::new();
        serializer.on_tick(&snapshot);
        let mut episode = serializer.end_episode();

        read_count(&mut episode);
        let block_len = read_u32(&mut episode) as usize;
        let secs = sections(episode.split_to(block_len));

        // wheel, orientation, charger, battery, sound, image, action
        assert_eq!(secs[0].len(), 24); // one wheel sample
        assert_eq!(secs[1].len(), 24); // one orientation sample
        assert!(secs[2].is_empty()); // no charger reading
        assert_eq!(secs[3].len(), 16); // one battery sample
        assert!(secs[4].is_empty()); // no sound
        assert!(secs[5].is_empty()); // no image
        assert_eq!(secs[6].len(), 8); // action pair
    }

    #[test]
    fn end_episode_resets_accumulation() {
        let mut serializer = EpisodeSerializer::new();
        serializer.on_tick(&snapshot_with_wheel_and_action());
        serializer.on_tick(&snapshot_with_wheel_and_action());
        assert_eq!(serializer.timestep_count(), 2);

        let first = serializer.end_episode();
        assert_eq!(serializer.timestep_count(), 0);

        serializer.on_tick(&snapshot_with_wheel_and_action());
        let mut second = serializer.end_episode();
        assert_eq!(read_count(&mut second), 1);
        assert!(first.len() > 4 + second.len());
    }
}
