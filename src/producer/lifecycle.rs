//! Phased bring-up and pause/resume coordination for the producer set.
//!
//! The coordinator walks every registered producer through three rendezvous
//! phases in lockstep:
//!
//! 1. **Permission**: each producer's capability grants are requested from
//!    the broker. Denial (or a broker that never answers: every request is
//!    bounded by a timeout) is terminal for that producer only; its channels
//!    stay empty and the others proceed.
//! 2. **Initialize**: each granted producer starts its underlying stream,
//!    paused.
//! 3. **Start**: recording is flipped on for every producer that finished
//!    phase 2.
//!
//! Registration is open from construction until [`bring_up`] is called; the
//! party set is snapshotted at that first phase transition and later
//! registrations are rejected. This replaces the original growing-party
//! barrier, whose party count could mutate while a phase was already in
//! progress, with an explicit phase enum and a fixed registry per bring-up.
//!
//! After Start, [`pause_all`] / [`resume_all`] are independent, idempotent,
//! per-producer operations used at every episode boundary without repeating
//! phases 1–2.
//!
//! [`bring_up`]: ProducerLifecycle::bring_up
//! [`pause_all`]: ProducerLifecycle::pause_all
//! [`resume_all`]: ProducerLifecycle::resume_all

use super::{PermissionBroker, Producer};
use crate::error::{AppResult, RoverError};
use crate::metrics::PipelineMetrics;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Global coordination phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Producers may still register.
    Registration,
    /// Capability grants are being requested.
    Permission,
    /// Granted producers are starting their streams, paused.
    Initialize,
    /// All surviving producers are recording (or paused between episodes).
    Running,
    /// The trial ended; producers are permanently stopped.
    Stopped,
}

/// Per-producer progress through the phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PartyState {
    Registered,
    /// Permission denied or start failed; excluded from all later phases.
    Denied,
    Initialized,
    Running,
    Paused,
    Stopped,
}

struct Party {
    producer: Arc<dyn Producer>,
    state: PartyState,
}

/// Coordinator owning the registered producer set.
///
/// Owned by the scheduler task; all methods take `&mut self`, so no internal
/// locking is needed.
pub struct ProducerLifecycle {
    phase: Phase,
    parties: Vec<Party>,
    permission_timeout: Duration,
    metrics: Arc<PipelineMetrics>,
}

impl ProducerLifecycle {
    /// Creates an empty coordinator. `permission_timeout` bounds each
    /// broker request so a hung broker degrades to a denial instead of
    /// stalling bring-up forever.
    pub fn new(permission_timeout: Duration, metrics: Arc<PipelineMetrics>) -> Self {
        Self {
            phase: Phase::Registration,
            parties: Vec::new(),
            permission_timeout,
            metrics,
        }
    }

    /// Current global phase.
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Number of producers currently delivering samples.
    pub fn running_count(&self) -> usize {
        self.parties
            .iter()
            .filter(|p| matches!(p.state, PartyState::Running))
            .count()
    }

    /// Number of producers excluded by permission denial or start failure.
    pub fn denied_count(&self) -> usize {
        self.parties
            .iter()
            .filter(|p| matches!(p.state, PartyState::Denied))
            .count()
    }

    /// Registers a producer. Only valid before [`bring_up`](Self::bring_up);
    /// the party set is fixed once the first phase transition happens.
    pub fn register(&mut self, producer: Arc<dyn Producer>) -> AppResult<()> {
        if self.phase != Phase::Registration {
            return Err(RoverError::LifecycleStarted(producer.name()));
        }
        debug!(producer = %producer.name(), "producer registered");
        self.parties.push(Party {
            producer,
            state: PartyState::Registered,
        });
        Ok(())
    }

    /// Runs phases 1–3 and returns the number of producers recording.
    ///
    /// Never deadlocks on a denied or unresponsive producer: each permission
    /// request is bounded by the configured timeout, and a failure only
    /// excludes that producer from the rest of the bring-up.
    pub async fn bring_up(&mut self, broker: &dyn PermissionBroker) -> AppResult<usize> {
        if self.phase != Phase::Registration {
            return Err(RoverError::Precondition(format!(
                "bring_up called in phase {:?}",
                self.phase
            )));
        }

        // Phase 1: permission rendezvous.
        self.phase = Phase::Permission;
        for party in &mut self.parties {
            let name = party.producer.name();
            let permissions = party.producer.required_permissions();
            if permissions.is_empty() {
                continue;
            }
            let granted = tokio::time::timeout(
                self.permission_timeout,
                broker.request(&name, &permissions),
            )
            .await
            .unwrap_or_else(|_| {
                warn!(producer = %name, timeout = ?self.permission_timeout,
                      "permission request timed out, treating as denied");
                false
            });
            if !granted {
                warn!(producer = %name, ?permissions,
                      "permission denied, channels will stay empty");
                self.metrics.record_permission_denial();
                party.state = PartyState::Denied;
            }
        }

        // Phase 2: initialize every granted producer, paused.
        self.phase = Phase::Initialize;
        for party in &mut self.parties {
            if party.state == PartyState::Denied {
                continue;
            }
            party.producer.set_recording(false);
            match party.producer.start().await {
                Ok(()) => party.state = PartyState::Initialized,
                Err(e) => {
                    warn!(producer = %party.producer.name(), error = %e,
                          "producer failed to start, excluding it");
                    party.state = PartyState::Denied;
                }
            }
        }

        // Phase 3: flip recording on only after every survivor initialized.
        self.phase = Phase::Running;
        for party in &mut self.parties {
            if party.state == PartyState::Initialized {
                party.producer.set_recording(true);
                party.state = PartyState::Running;
            }
        }

        let running = self.running_count();
        info!(
            running,
            denied = self.denied_count(),
            "producer bring-up complete"
        );
        Ok(running)
    }

    /// Pauses sample delivery on every running producer. Idempotent.
    pub fn pause_all(&mut self) {
        for party in &mut self.parties {
            if party.state == PartyState::Running {
                party.producer.set_recording(false);
                party.state = PartyState::Paused;
            }
        }
    }

    /// Resumes sample delivery on every paused producer. Idempotent.
    pub fn resume_all(&mut self) {
        for party in &mut self.parties {
            if party.state == PartyState::Paused {
                party.producer.set_recording(true);
                party.state = PartyState::Running;
            }
        }
    }

    /// Permanently stops every producer. Individual stop failures are
    /// logged, not propagated: shutdown always completes.
    pub async fn stop_all(&mut self) {
        for party in &mut self.parties {
            match party.state {
                PartyState::Running | PartyState::Paused | PartyState::Initialized => {
                    party.producer.set_recording(false);
                    if let Err(e) = party.producer.stop().await {
                        warn!(producer = %party.producer.name(), error = %e,
                              "producer stop failed");
                    }
                    party.state = PartyState::Stopped;
                }
                PartyState::Registered | PartyState::Denied | PartyState::Stopped => {}
            }
        }
        self.phase = Phase::Stopped;
    }
}
