//! Lightweight pipeline counters.
//!
//! Transport failures and permission denials must be observable rather than
//! silently absorbed, so the pipeline keeps a small set of atomic counters
//! shared between the scheduler, the lifecycle coordinator and the binary's
//! end-of-trial report. This is deliberately not a metrics *system*; it is
//! the minimum surface the failure-handling contract requires.

use std::sync::atomic::{AtomicU64, Ordering};

/// Shared atomic counters for one pipeline instance.
#[derive(Debug, Default)]
pub struct PipelineMetrics {
    ticks: AtomicU64,
    episodes_sent: AtomicU64,
    transport_failures: AtomicU64,
    permission_denials: AtomicU64,
    model_blobs_saved: AtomicU64,
}

/// Point-in-time copy of the counters, for logging and summaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricsSnapshot {
    /// Scheduler ticks driven so far.
    pub ticks: u64,
    /// Episodes delivered to the trainer.
    pub episodes_sent: u64,
    /// Round trips aborted by a transport failure.
    pub transport_failures: u64,
    /// Producers excluded by permission denial or timeout.
    pub permission_denials: u64,
    /// Model blobs persisted from trainer replies.
    pub model_blobs_saved: u64,
}

impl PipelineMetrics {
    /// Counts one scheduler tick.
    pub fn record_tick(&self) {
        self.ticks.fetch_add(1, Ordering::Relaxed);
    }

    /// Counts one episode delivered to the trainer.
    pub fn record_episode_sent(&self) {
        self.episodes_sent.fetch_add(1, Ordering::Relaxed);
    }

    /// Counts one aborted round trip.
    pub fn record_transport_failure(&self) {
        self.transport_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Counts one excluded producer.
    pub fn record_permission_denial(&self) {
        self.permission_denials.fetch_add(1, Ordering::Relaxed);
    }

    /// Counts one persisted model blob.
    pub fn record_model_blob_saved(&self) {
        self.model_blobs_saved.fetch_add(1, Ordering::Relaxed);
    }

    /// Copies the current counter values.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            ticks: self.ticks.load(Ordering::Relaxed),
            episodes_sent: self.episodes_sent.load(Ordering::Relaxed),
            transport_failures: self.transport_failures.load(Ordering::Relaxed),
            permission_denials: self.permission_denials.load(Ordering::Relaxed),
            model_blobs_saved: self.model_blobs_saved.load(Ordering::Relaxed),
        }
    }
}
