//! Wire format shared with the trainer, kept free of socket I/O so the state
//! machines can be driven byte-by-byte in tests.
//!
//! A frame is `[4-byte big-endian header length][UTF-8 JSON header][payload]`.
//! The JSON header carries the payload byte count plus content metadata; the
//! payload itself is opaque at this layer. [`FrameReader`] reassembles frames
//! from arbitrarily fragmented input and [`FrameWriter`] tracks the drain of
//! an outgoing frame across short writes.

use crate::error::{AppResult, RoverError};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use std::io;

/// Width of the binary length prefix that precedes the JSON header.
pub const PROTO_HEADER_LEN: usize = 4;

/// `content-encoding` tag on outbound episode frames.
pub const EPISODE_ENCODING: &str = "episode";

/// `content-encoding` tag on trainer replies whose payload is a model
/// vector, split per `model-names`/`model-lengths`.
pub const MODEL_VECTOR_ENCODING: &str = "modelVector";

/// JSON metadata preceding every payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FrameHeader {
    /// Byte order of the frame's binary length prefix; always `"big"`.
    pub byteorder: String,
    /// Payload length in bytes.
    #[serde(rename = "content-length")]
    pub content_length: u64,
    /// Payload kind, e.g. `episode` or `models`.
    #[serde(rename = "content-type")]
    pub content_type: String,
    /// Payload encoding discriminator: [`EPISODE_ENCODING`] outbound,
    /// [`MODEL_VECTOR_ENCODING`] on replies carrying model blobs.
    #[serde(rename = "content-encoding")]
    pub content_encoding: String,
    /// Names of model blobs concatenated in the payload, in order.
    #[serde(rename = "model-names", default, skip_serializing_if = "Vec::is_empty")]
    pub model_names: Vec<String>,
    /// Byte length of each named blob, parallel to `model_names`.
    #[serde(
        rename = "model-lengths",
        default,
        skip_serializing_if = "Vec::is_empty"
    )]
    pub model_lengths: Vec<u64>,
}

impl FrameHeader {
    /// Header for an outgoing episode payload.
    pub fn episode(payload_len: usize) -> Self {
        Self {
            byteorder: "big".to_string(),
            content_length: payload_len as u64,
            content_type: "episode".to_string(),
            content_encoding: EPISODE_ENCODING.to_string(),
            model_names: Vec::new(),
            model_lengths: Vec::new(),
        }
    }
}

/// Serializes `header` and `payload` into one contiguous wire frame.
pub fn compose_frame(header: &FrameHeader, payload: &[u8]) -> AppResult<Bytes> {
    let json = serde_json::to_vec(header)?;
    if json.len() > u32::MAX as usize {
        return Err(RoverError::Transport(format!(
            "frame header of {} bytes exceeds the length prefix",
            json.len()
        )));
    }
    let mut frame = BytesMut::with_capacity(PROTO_HEADER_LEN + json.len() + payload.len());
    frame.put_u32(json.len() as u32);
    frame.put_slice(&json);
    frame.put_slice(payload);
    Ok(frame.freeze())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReadPhase {
    /// Waiting for the 4-byte header length prefix.
    ProtoHeader,
    /// Waiting for `len` bytes of JSON header.
    JsonHeader { len: usize },
    /// Waiting for the payload described by the parsed header.
    Payload { len: usize },
}

/// Incremental frame reassembly. Fed bytes are never discarded: a frame split
/// across any number of reads yields exactly once, when its last byte lands.
pub struct FrameReader {
    phase: ReadPhase,
    buf: BytesMut,
    header: Option<FrameHeader>,
    max_header_bytes: usize,
    max_payload_bytes: usize,
}

impl FrameReader {
    pub fn new(max_header_bytes: usize, max_payload_bytes: usize) -> Self {
        Self {
            phase: ReadPhase::ProtoHeader,
            buf: BytesMut::new(),
            header: None,
            max_header_bytes,
            max_payload_bytes,
        }
    }

    /// Appends `input` and returns every frame completed by it, in arrival
    /// order. A malformed or oversized header poisons the stream and the
    /// connection must be dropped; byte boundaries downstream of a bad
    /// header cannot be trusted.
    pub fn feed(&mut self, input: &[u8]) -> AppResult<Vec<(FrameHeader, Bytes)>> {
        self.buf.extend_from_slice(input);
        let mut frames = Vec::new();
        loop {
            match self.phase {
                ReadPhase::ProtoHeader => {
                    if self.buf.len() < PROTO_HEADER_LEN {
                        break;
                    }
                    let len = self.buf.get_u32() as usize;
                    if len == 0 || len > self.max_header_bytes {
                        return Err(RoverError::MalformedHeader(format!(
                            "header length {len} outside 1..={}",
                            self.max_header_bytes
                        )));
                    }
                    self.phase = ReadPhase::JsonHeader { len };
                }
                ReadPhase::JsonHeader { len } => {
                    if self.buf.len() < len {
                        break;
                    }
                    let raw = self.buf.split_to(len);
                    let header: FrameHeader = serde_json::from_slice(&raw).map_err(|e| {
                        RoverError::MalformedHeader(format!("header is not valid JSON: {e}"))
                    })?;
                    let payload_len = header.content_length as usize;
                    if payload_len > self.max_payload_bytes {
                        return Err(RoverError::MalformedHeader(format!(
                            "declared payload of {payload_len} bytes exceeds limit {}",
                            self.max_payload_bytes
                        )));
                    }
                    self.header = Some(header);
                    self.phase = ReadPhase::Payload { len: payload_len };
                }
                ReadPhase::Payload { len } => {
                    if self.buf.len() < len {
                        break;
                    }
                    let payload = self.buf.split_to(len).freeze();
                    let header = self
                        .header
                        .take()
                        .ok_or_else(|| RoverError::Transport("reader lost its header".into()))?;
                    frames.push((header, payload));
                    self.phase = ReadPhase::ProtoHeader;
                }
            }
        }
        Ok(frames)
    }

    /// Bytes buffered toward an incomplete frame.
    pub fn pending_bytes(&self) -> usize {
        self.buf.len()
    }
}

/// Tracks one outgoing frame across partial writes.
pub struct FrameWriter {
    pending: Bytes,
}

impl FrameWriter {
    pub fn new() -> Self {
        Self {
            pending: Bytes::new(),
        }
    }

    /// True when nothing is queued for write.
    pub fn is_idle(&self) -> bool {
        self.pending.is_empty()
    }

    /// Queues a composed frame. Only one frame may be in flight.
    pub fn enqueue(&mut self, frame: Bytes) -> AppResult<()> {
        if !self.is_idle() {
            return Err(RoverError::Transport(
                "a frame is already draining".to_string(),
            ));
        }
        self.pending = frame;
        Ok(())
    }

    /// Pushes pending bytes through `write`, advancing past whatever was
    /// accepted. `WouldBlock` pauses the drain without losing position;
    /// any other error propagates.
    pub fn drain_with(&mut self, mut write: impl FnMut(&[u8]) -> io::Result<usize>) -> AppResult<()> {
        while !self.pending.is_empty() {
            match write(&self.pending) {
                Ok(0) => {
                    return Err(RoverError::Transport(
                        "connection closed mid-frame".to_string(),
                    ))
                }
                Ok(n) => self.pending.advance(n),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }
}

impl Default for FrameWriter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn composes_prefix_header_payload_in_order() {
        let header = FrameHeader::episode(3);
        let frame = compose_frame(&header, b"abc").unwrap();

        let json_len = u32::from_be_bytes(frame[..4].try_into().unwrap()) as usize;
        let parsed: FrameHeader = serde_json::from_slice(&frame[4..4 + json_len]).unwrap();
        assert_eq!(parsed, header);
        assert_eq!(&frame[4 + json_len..], b"abc");
    }

    #[test]
    fn episode_header_carries_the_pinned_tags() {
        let header = FrameHeader::episode(9);
        assert_eq!(header.byteorder, "big");
        assert_eq!(header.content_encoding, EPISODE_ENCODING);
        assert_eq!(header.content_length, 9);
        assert!(header.model_names.is_empty());
    }

    #[test]
    fn reader_survives_single_byte_fragmentation() {
        let header = FrameHeader::episode(5);
        let frame = compose_frame(&header, b"hello").unwrap();

        let mut reader = FrameReader::new(4096, 4096);
        for &byte in &frame[..frame.len() - 1] {
            assert!(reader.feed(&[byte]).unwrap().is_empty());
        }
        let frames = reader.feed(&frame[frame.len() - 1..]).unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].0, header);
        assert_eq!(&frames[0].1[..], b"hello");
        assert_eq!(reader.pending_bytes(), 0);
    }

    #[test]
    fn reader_yields_back_to_back_frames_from_one_feed() {
        let first = compose_frame(&FrameHeader::episode(2), b"ab").unwrap();
        let second = compose_frame(&FrameHeader::episode(1), b"c").unwrap();
        let mut wire = first.to_vec();
        wire.extend_from_slice(&second);

        let mut reader = FrameReader::new(4096, 4096);
        let frames = reader.feed(&wire).unwrap();
        assert_eq!(frames.len(), 2);
        assert_eq!(&frames[0].1[..], b"ab");
        assert_eq!(&frames[1].1[..], b"c");
    }

    #[test]
    fn invalid_json_header_is_a_hard_error() {
        let mut frame = BytesMut::new();
        frame.put_u32(7);
        frame.put_slice(b"not]json");

        let mut reader = FrameReader::new(4096, 4096);
        let err = reader.feed(&frame).unwrap_err();
        assert!(matches!(err, RoverError::MalformedHeader(_)));
    }

    #[test]
    fn oversized_declared_lengths_are_rejected() {
        let mut reader = FrameReader::new(16, 4096);
        let mut prefix = BytesMut::new();
        prefix.put_u32(17);
        assert!(matches!(
            reader.feed(&prefix).unwrap_err(),
            RoverError::MalformedHeader(_)
        ));

        let mut reader = FrameReader::new(4096, 8);
        let frame = compose_frame(&FrameHeader::episode(9), &[0u8; 9]).unwrap();
        assert!(matches!(
            reader.feed(&frame).unwrap_err(),
            RoverError::MalformedHeader(_)
        ));
    }

    #[test]
    fn writer_resumes_after_would_block() {
        let frame = compose_frame(&FrameHeader::episode(4), b"data").unwrap();
        let total = frame.len();
        let mut writer = FrameWriter::new();
        writer.enqueue(frame).unwrap();

        let mut sink = Vec::new();
        // Accept three bytes, then stall.
        let mut budget = 3usize;
        writer
            .drain_with(|bytes| {
                if budget == 0 {
                    return Err(io::Error::from(io::ErrorKind::WouldBlock));
                }
                let n = budget.min(bytes.len());
                sink.extend_from_slice(&bytes[..n]);
                budget -= n;
                Ok(n)
            })
            .unwrap();
        assert!(!writer.is_idle());
        assert_eq!(sink.len(), 3);

        writer
            .drain_with(|bytes| {
                sink.extend_from_slice(bytes);
                Ok(bytes.len())
            })
            .unwrap();
        assert!(writer.is_idle());
        assert_eq!(sink.len(), total);
    }
}
