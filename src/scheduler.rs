//! Trial driver: the single consumer of the timestep ring.
//!
//! One trial is a sequence of episodes. Within an episode the scheduler ticks
//! at a fixed cadence; each tick it rotates the ring, snapshots the freshly
//! published timestep, consults the policy for the next action and hands the
//! snapshot to the serializer. At an episode boundary producers are paused,
//! the accumulated payload makes exactly one round trip to the trainer, any
//! returned model blobs are persisted, and producers resume.
//!
//! The trainer exchange is the only suspension point while producers are
//! paused. A failed exchange drops that episode's payload and the trial
//! continues; the trainer sees a gap, not a dead robot.

use crate::buffer::TimestepRingBuffer;
use crate::error::AppResult;
use crate::metrics::PipelineMetrics;
use crate::policy::{ActionSelector, RewardMonitor};
use crate::producer::{PermissionBroker, ProducerLifecycle};
use crate::record::{ActionSample, TimestepSnapshot};
use crate::serializer::EpisodeSerializer;
use crate::storage::ModelStore;
use crate::transport::EpisodeExchange;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Cadence and bounds for one trial.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Time between ring rotations.
    pub tick_interval: Duration,
    /// Episode length cap in timesteps.
    pub max_timesteps: u32,
    /// Trial length cap in episodes (sent or dropped).
    pub max_episodes: u32,
}

/// Outcome of a completed trial.
#[derive(Debug, Clone)]
pub struct TrialSummary {
    pub trial_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub episodes_sent: u64,
    pub episodes_dropped: u64,
    pub timesteps_recorded: u64,
}

enum EpisodeEnd {
    Boundary,
    TrialOver,
}

/// Owns every collaborator for the duration of a trial.
pub struct EpisodeScheduler {
    config: SchedulerConfig,
    ring: Arc<TimestepRingBuffer>,
    serializer: EpisodeSerializer,
    lifecycle: ProducerLifecycle,
    exchange: Arc<dyn EpisodeExchange>,
    selector: Box<dyn ActionSelector>,
    monitor: Option<Box<dyn RewardMonitor>>,
    store: Arc<dyn ModelStore>,
    metrics: Arc<PipelineMetrics>,
}

impl EpisodeScheduler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: SchedulerConfig,
        ring: Arc<TimestepRingBuffer>,
        serializer: EpisodeSerializer,
        lifecycle: ProducerLifecycle,
        exchange: Arc<dyn EpisodeExchange>,
        selector: Box<dyn ActionSelector>,
        monitor: Option<Box<dyn RewardMonitor>>,
        store: Arc<dyn ModelStore>,
        metrics: Arc<PipelineMetrics>,
    ) -> Self {
        Self {
            config,
            ring,
            serializer,
            lifecycle,
            exchange,
            selector,
            monitor,
            store,
            metrics,
        }
    }

    /// Brings producers up, runs episodes until a trial bound is hit, then
    /// stops producers. The timestep being collected when the trial ends is
    /// dropped rather than sent short.
    pub async fn run_trial(&mut self, broker: &dyn PermissionBroker) -> AppResult<TrialSummary> {
        let trial_id = Uuid::new_v4();
        let started_at = Utc::now();
        info!(%trial_id, "trial starting");

        let running = self.lifecycle.bring_up(broker).await?;
        info!(%trial_id, producers = running, "producers running");

        let mut episodes_sent = 0u64;
        let mut episodes_dropped = 0u64;
        let mut timesteps_recorded = 0u64;

        loop {
            let end = self.run_episode(&mut timesteps_recorded).await;

            self.lifecycle.pause_all();
            let timesteps = self.serializer.timestep_count();
            let payload = self.serializer.end_episode();
            match self.exchange.exchange(payload).await {
                Ok(reply) => {
                    episodes_sent += 1;
                    self.metrics.record_episode_sent();
                    debug!(%trial_id, timesteps, "episode delivered");
                    self.apply_reply(reply).await;
                }
                Err(e) => {
                    episodes_dropped += 1;
                    self.metrics.record_transport_failure();
                    warn!(%trial_id, error = %e, "episode dropped, trial continues");
                }
            }

            let episodes = episodes_sent + episodes_dropped;
            let trial_over = matches!(end, EpisodeEnd::TrialOver)
                || episodes >= u64::from(self.config.max_episodes);
            if trial_over {
                self.lifecycle.stop_all().await;
                break;
            }
            self.lifecycle.resume_all();
        }

        let summary = TrialSummary {
            trial_id,
            started_at,
            finished_at: Utc::now(),
            episodes_sent,
            episodes_dropped,
            timesteps_recorded,
        };
        info!(
            %trial_id,
            episodes_sent,
            episodes_dropped,
            timesteps_recorded,
            "trial finished"
        );
        Ok(summary)
    }

    /// Ticks until something ends the episode.
    async fn run_episode(&mut self, timesteps_recorded: &mut u64) -> EpisodeEnd {
        let mut interval = tokio::time::interval(self.config.tick_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick of a tokio interval fires immediately; consume it so
        // the opening timestep gets a full collection window.
        interval.tick().await;

        loop {
            interval.tick().await;
            let snapshot = self.rotate_and_snapshot();
            self.serializer.on_tick(&snapshot);
            *timesteps_recorded += 1;
            self.metrics.record_tick();

            if self.selector.trial_done() {
                return EpisodeEnd::TrialOver;
            }
            let monitor_done = self
                .monitor
                .as_mut()
                .is_some_and(|m| m.episode_done(&snapshot));
            if monitor_done
                || self.selector.episode_done()
                || self.serializer.timestep_count() >= self.config.max_timesteps
            {
                return EpisodeEnd::Boundary;
            }
        }
    }

    /// Rotates the ring, picks the next action for the new collection window
    /// and returns an owned copy of the just-completed timestep.
    fn rotate_and_snapshot(&mut self) -> TimestepSnapshot {
        self.ring.advance();
        let snapshot = self.ring.current_read().snapshot();
        let action = self.selector.forward(&snapshot);
        self.ring.current_write().set_action(ActionSample {
            motion_action: action.motion,
            comm_action: action.communication,
        });
        snapshot
    }

    /// Persists any model blobs carried in the reply. Storage failures are
    /// logged and swallowed, same as transport failures.
    async fn apply_reply(&self, reply: crate::transport::TrainerReply) {
        let blobs = match reply.model_blobs() {
            Ok(blobs) => blobs,
            Err(e) => {
                warn!(error = %e, "trainer reply metadata unusable, blobs discarded");
                return;
            }
        };
        for (name, blob) in blobs {
            match self.store.save(&name, blob).await {
                Ok(()) => self.metrics.record_model_blob_saved(),
                Err(e) => warn!(model = %name, error = %e, "model blob not persisted"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RoverError;
    use crate::policy::{Action, RandomActionSelector};
    use crate::producer::GrantAll;
    use crate::transport::{FrameHeader, TrainerReply};
    use async_trait::async_trait;
    use bytes::Bytes;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Mutex;

    struct ScriptedExchange {
        payloads: Mutex<Vec<Bytes>>,
        fail_on_call: Option<u64>,
        calls: AtomicU64,
        model_names: Vec<String>,
    }

    impl ScriptedExchange {
        fn new() -> Self {
            Self {
                payloads: Mutex::new(Vec::new()),
                fail_on_call: None,
                calls: AtomicU64::new(0),
                model_names: Vec::new(),
            }
        }

        fn failing_on(call: u64) -> Self {
            Self {
                fail_on_call: Some(call),
                ..Self::new()
            }
        }

        fn with_models(names: &[&str]) -> Self {
            Self {
                model_names: names.iter().map(|s| s.to_string()).collect(),
                ..Self::new()
            }
        }
    }

    #[async_trait]
    impl EpisodeExchange for ScriptedExchange {
        async fn exchange(&self, payload: Bytes) -> AppResult<TrainerReply> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_on_call == Some(call) {
                return Err(RoverError::Transport("scripted failure".into()));
            }
            self.payloads.lock().unwrap().push(payload);
            let blob = Bytes::from_static(b"wb");
            let payload: Bytes = self
                .model_names
                .iter()
                .flat_map(|_| blob.clone())
                .collect();
            Ok(TrainerReply {
                header: FrameHeader {
                    byteorder: "big".into(),
                    content_length: payload.len() as u64,
                    content_type: "models".into(),
                    content_encoding: "modelVector".into(),
                    model_names: self.model_names.clone(),
                    model_lengths: self.model_names.iter().map(|_| 2).collect(),
                },
                payload,
            })
        }
    }

    struct RecordingStore {
        saved: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ModelStore for RecordingStore {
        async fn save(&self, name: &str, _blob: Bytes) -> AppResult<()> {
            self.saved.lock().unwrap().push(name.to_string());
            Ok(())
        }
    }

    struct NeverDone;

    impl ActionSelector for NeverDone {
        fn forward(&mut self, _snapshot: &TimestepSnapshot) -> Action {
            Action {
                motion: 0,
                communication: 0,
            }
        }
    }

    fn scheduler(
        exchange: Arc<dyn EpisodeExchange>,
        store: Arc<dyn ModelStore>,
        max_timesteps: u32,
        max_episodes: u32,
    ) -> EpisodeScheduler {
        let metrics = Arc::new(PipelineMetrics::default());
        EpisodeScheduler::new(
            SchedulerConfig {
                tick_interval: Duration::from_millis(1),
                max_timesteps,
                max_episodes,
            },
            Arc::new(TimestepRingBuffer::new(4).unwrap()),
            EpisodeSerializer::new(),
            ProducerLifecycle::new(Duration::from_millis(50), Arc::clone(&metrics)),
            exchange,
            Box::new(NeverDone),
            None,
            store,
            metrics,
        )
    }

    fn timestep_count(payload: &Bytes) -> u32 {
        u32::from_be_bytes(payload[..4].try_into().unwrap())
    }

    #[tokio::test(start_paused = true)]
    async fn runs_exact_episode_and_timestep_counts() {
        let exchange = Arc::new(ScriptedExchange::new());
        let store = Arc::new(RecordingStore {
            saved: Mutex::new(Vec::new()),
        });
        let mut sched = scheduler(exchange.clone(), store, 5, 2);

        let summary = sched.run_trial(&GrantAll).await.unwrap();

        assert_eq!(summary.episodes_sent, 2);
        assert_eq!(summary.episodes_dropped, 0);
        assert_eq!(summary.timesteps_recorded, 10);

        let payloads = exchange.payloads.lock().unwrap();
        assert_eq!(payloads.len(), 2);
        assert!(payloads.iter().all(|p| timestep_count(p) == 5));
    }

    #[tokio::test(start_paused = true)]
    async fn transport_failure_drops_episode_but_not_trial() {
        let exchange = Arc::new(ScriptedExchange::failing_on(0));
        let store = Arc::new(RecordingStore {
            saved: Mutex::new(Vec::new()),
        });
        let mut sched = scheduler(exchange.clone(), store, 3, 3);

        let summary = sched.run_trial(&GrantAll).await.unwrap();

        assert_eq!(summary.episodes_dropped, 1);
        assert_eq!(summary.episodes_sent, 2);
        assert_eq!(exchange.payloads.lock().unwrap().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn model_blobs_from_replies_reach_the_store() {
        let exchange = Arc::new(ScriptedExchange::with_models(&["actor", "critic"]));
        let store = Arc::new(RecordingStore {
            saved: Mutex::new(Vec::new()),
        });
        let mut sched = scheduler(exchange, store.clone(), 2, 1);

        sched.run_trial(&GrantAll).await.unwrap();

        let saved = store.saved.lock().unwrap();
        assert_eq!(saved.as_slice(), ["actor", "critic"]);
    }

    #[tokio::test(start_paused = true)]
    async fn random_selector_trial_terminates() {
        let exchange = Arc::new(ScriptedExchange::new());
        let store = Arc::new(RecordingStore {
            saved: Mutex::new(Vec::new()),
        });
        let metrics = Arc::new(PipelineMetrics::default());
        let mut sched = EpisodeScheduler::new(
            SchedulerConfig {
                tick_interval: Duration::from_millis(1),
                max_timesteps: 4,
                max_episodes: 2,
            },
            Arc::new(TimestepRingBuffer::new(3).unwrap()),
            EpisodeSerializer::new(),
            ProducerLifecycle::new(Duration::from_millis(50), Arc::clone(&metrics)),
            exchange,
            Box::new(RandomActionSelector::default()),
            None,
            store,
            Arc::clone(&metrics),
        );

        let summary = sched.run_trial(&GrantAll).await.unwrap();
        assert_eq!(summary.episodes_sent + summary.episodes_dropped, 2);
        assert_eq!(metrics.snapshot().ticks, summary.timesteps_recorded);
    }
}
