//! TCP client side of the trainer protocol.
//!
//! The scheduler talks to the trainer through the [`EpisodeExchange`] trait;
//! [`TrainerClient`] is the production implementation, running as its own
//! task and serialized through an mpsc channel so at most one episode is ever
//! in flight. Socket I/O is readiness-driven: the task awaits
//! [`TcpStream::ready`] and moves bytes with `try_read`/`try_write`, leaving
//! framing decisions to the sans-I/O machines in [`super::framing`].
//!
//! A failed exchange poisons only itself. The client drops the connection,
//! reports the error to the caller and reconnects lazily on the next
//! exchange, matching the trial-level rule that a lost episode never ends
//! the trial.

use crate::error::{AppResult, RoverError};
use crate::transport::framing::{compose_frame, FrameHeader, FrameReader, FrameWriter};
use async_trait::async_trait;
use bytes::Bytes;
use std::io;
use std::time::Duration;
use tokio::io::Interest;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

/// One decoded trainer response.
#[derive(Debug, Clone)]
pub struct TrainerReply {
    pub header: FrameHeader,
    pub payload: Bytes,
}

impl TrainerReply {
    /// Splits the payload into named model blobs per the header's
    /// `model-names`/`model-lengths` pair. Only replies tagged with the
    /// model-vector encoding carry blobs; anything else is a plain ack and
    /// yields an empty list. Declared lengths must tile the payload exactly.
    pub fn model_blobs(&self) -> AppResult<Vec<(String, Bytes)>> {
        if self.header.content_encoding != crate::transport::framing::MODEL_VECTOR_ENCODING {
            return Ok(Vec::new());
        }
        if self.header.model_names.len() != self.header.model_lengths.len() {
            return Err(RoverError::MalformedHeader(format!(
                "{} model names but {} lengths",
                self.header.model_names.len(),
                self.header.model_lengths.len()
            )));
        }
        let declared: u64 = self.header.model_lengths.iter().sum();
        if declared != self.payload.len() as u64 {
            return Err(RoverError::MalformedHeader(format!(
                "model lengths sum to {declared} but payload is {} bytes",
                self.payload.len()
            )));
        }
        let mut rest = self.payload.clone();
        let mut blobs = Vec::with_capacity(self.header.model_names.len());
        for (name, len) in self
            .header
            .model_names
            .iter()
            .zip(&self.header.model_lengths)
        {
            blobs.push((name.clone(), rest.split_to(*len as usize)));
        }
        Ok(blobs)
    }
}

/// Seam between the scheduler and whatever carries episodes to the trainer.
/// Exactly one exchange may be outstanding at a time.
#[async_trait]
pub trait EpisodeExchange: Send + Sync {
    /// Sends one episode payload and waits for the trainer's reply.
    async fn exchange(&self, payload: Bytes) -> AppResult<TrainerReply>;
}

struct ExchangeRequest {
    payload: Bytes,
    reply_tx: oneshot::Sender<AppResult<TrainerReply>>,
}

/// Cloneable sender half handed to the scheduler.
#[derive(Clone)]
pub struct TrainerHandle {
    tx: mpsc::Sender<ExchangeRequest>,
}

#[async_trait]
impl EpisodeExchange for TrainerHandle {
    async fn exchange(&self, payload: Bytes) -> AppResult<TrainerReply> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(ExchangeRequest { payload, reply_tx })
            .await
            .map_err(|_| RoverError::ChannelClosed("trainer client task gone".into()))?;
        reply_rx
            .await
            .map_err(|_| RoverError::ChannelClosed("trainer client dropped the reply".into()))?
    }
}

/// Connection settings for the trainer endpoint.
#[derive(Debug, Clone)]
pub struct TrainerEndpoint {
    pub addr: String,
    pub connect_timeout: Duration,
    pub response_timeout: Duration,
    pub max_header_bytes: usize,
    pub max_payload_bytes: usize,
}

/// Owns the trainer socket and serves [`TrainerHandle`] requests one at a
/// time.
pub struct TrainerClient {
    endpoint: TrainerEndpoint,
    stream: Option<TcpStream>,
    rx: mpsc::Receiver<ExchangeRequest>,
}

impl TrainerClient {
    /// Creates the client task state and its scheduler-facing handle. No
    /// connection is made until the first exchange.
    pub fn new(endpoint: TrainerEndpoint) -> (Self, TrainerHandle) {
        let (tx, rx) = mpsc::channel(1);
        (
            Self {
                endpoint,
                stream: None,
                rx,
            },
            TrainerHandle { tx },
        )
    }

    /// Serves exchanges until every handle is dropped.
    pub async fn run(mut self) {
        while let Some(request) = self.rx.recv().await {
            let result = self.serve(request.payload).await;
            if result.is_err() {
                // Framing state is unrecoverable after a failure mid-frame.
                self.stream = None;
            }
            let _ = request.reply_tx.send(result);
        }
        debug!("trainer client shutting down, all handles dropped");
    }

    async fn serve(&mut self, payload: Bytes) -> AppResult<TrainerReply> {
        self.ensure_connected().await?;
        let header = FrameHeader::episode(payload.len());
        let frame = compose_frame(&header, &payload)?;

        let timeout = self.endpoint.response_timeout;
        match tokio::time::timeout(timeout, self.round_trip(frame)).await {
            Ok(result) => result,
            Err(_) => Err(RoverError::ResponseTimeout(timeout)),
        }
    }

    async fn ensure_connected(&mut self) -> AppResult<()> {
        if self.stream.is_some() {
            return Ok(());
        }
        let addr = self.endpoint.addr.clone();
        let connect = TcpStream::connect(&addr);
        let stream = tokio::time::timeout(self.endpoint.connect_timeout, connect)
            .await
            .map_err(|_| {
                RoverError::Transport(format!(
                    "connect to trainer at {addr} timed out after {:?}",
                    self.endpoint.connect_timeout
                ))
            })?
            .map_err(|e| RoverError::Transport(format!("connect to trainer at {addr}: {e}")))?;
        stream.set_nodelay(true)?;
        info!(%addr, "connected to trainer");
        self.stream = Some(stream);
        Ok(())
    }

    async fn round_trip(&mut self, frame: Bytes) -> AppResult<TrainerReply> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| RoverError::Transport("not connected".into()))?;

        let mut writer = FrameWriter::new();
        writer.enqueue(frame)?;
        while !writer.is_idle() {
            stream.ready(Interest::WRITABLE).await?;
            writer.drain_with(|bytes| stream.try_write(bytes))?;
        }

        let mut reader = FrameReader::new(
            self.endpoint.max_header_bytes,
            self.endpoint.max_payload_bytes,
        );
        let mut chunk = vec![0u8; 16 * 1024];
        loop {
            stream.ready(Interest::READABLE).await?;
            let n = match stream.try_read(&mut chunk) {
                Ok(0) => {
                    return Err(RoverError::Transport(
                        "trainer closed the connection before replying".into(),
                    ))
                }
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => continue,
                Err(e) => return Err(e.into()),
            };
            let mut frames = reader.feed(&chunk[..n])?.into_iter();
            if let Some((header, payload)) = frames.next() {
                if frames.next().is_some() {
                    warn!("trainer sent more than one reply frame, keeping the first");
                }
                return Ok(TrainerReply { header, payload });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reply(names: &[&str], lengths: &[u64], payload: &'static [u8]) -> TrainerReply {
        TrainerReply {
            header: FrameHeader {
                byteorder: "big".into(),
                content_length: payload.len() as u64,
                content_type: "models".into(),
                content_encoding: crate::transport::framing::MODEL_VECTOR_ENCODING.into(),
                model_names: names.iter().map(|s| s.to_string()).collect(),
                model_lengths: lengths.to_vec(),
            },
            payload: Bytes::from_static(payload),
        }
    }

    #[test]
    fn model_blobs_split_payload_by_declared_lengths() {
        let reply = reply(&["actor", "critic"], &[3, 2], b"aaacc");
        let blobs = reply.model_blobs().unwrap();
        assert_eq!(blobs.len(), 2);
        assert_eq!(blobs[0], ("actor".to_string(), Bytes::from_static(b"aaa")));
        assert_eq!(blobs[1], ("critic".to_string(), Bytes::from_static(b"cc")));
    }

    #[test]
    fn non_model_vector_replies_carry_no_blobs() {
        let mut ack = reply(&["actor"], &[3], b"abc");
        ack.header.content_encoding = "ack".into();
        assert!(ack.model_blobs().unwrap().is_empty());
    }

    #[test]
    fn model_blobs_reject_mismatched_metadata() {
        let short = reply(&["actor"], &[9], b"abc");
        assert!(matches!(
            short.model_blobs().unwrap_err(),
            RoverError::MalformedHeader(_)
        ));

        let unpaired = reply(&["actor", "critic"], &[3], b"abc");
        assert!(matches!(
            unpaired.model_blobs().unwrap_err(),
            RoverError::MalformedHeader(_)
        ));
    }
}
