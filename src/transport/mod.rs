//! Trainer-facing transport: wire framing plus the TCP client that carries
//! one episode exchange at a time.

pub mod client;
pub mod framing;

pub use client::{EpisodeExchange, TrainerClient, TrainerEndpoint, TrainerHandle, TrainerReply};
pub use framing::{compose_frame, FrameHeader, FrameReader, FrameWriter, PROTO_HEADER_LEN};
