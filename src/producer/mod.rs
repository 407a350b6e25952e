//! Producer capability interface and permission brokering.
//!
//! A producer is any asynchronous source of channel samples: a sensor, the
//! camera, the microphone. The pipeline never inspects concrete types; it
//! only talks to the small [`Producer`] capability trait registered into the
//! lifecycle coordinator. Physical capture itself (sensor fusion, quadrature
//! decoding, drivers) lives behind the trait and is out of scope here;
//! [`mock`] provides simulated implementations.
//!
//! Producers begin life *paused*: `start()` must bring up the underlying
//! stream with recording disabled, and `set_recording(true)` is flipped by
//! the coordinator only once every granted producer finished initializing.

pub mod lifecycle;
pub mod mock;

pub use lifecycle::{Phase, ProducerLifecycle};

use crate::error::AppResult;
use async_trait::async_trait;

/// Capability interface implemented by every sample source.
#[async_trait]
pub trait Producer: Send + Sync {
    /// Human-readable producer name, used in logs and error reporting.
    fn name(&self) -> String;

    /// Platform capability grants this producer needs before it can start.
    /// Empty for producers that read nothing privileged.
    fn required_permissions(&self) -> Vec<String> {
        Vec::new()
    }

    /// Brings up the underlying capture stream in a paused state.
    async fn start(&self) -> AppResult<()>;

    /// Tears the capture stream down permanently.
    async fn stop(&self) -> AppResult<()>;

    /// Pauses or resumes sample delivery. Idempotent and non-blocking;
    /// while paused, samples are dropped, not queued.
    fn set_recording(&self, enabled: bool);
}

/// Collaborator that decides capability grants.
///
/// On a device this fronts the platform permission system; headless runs and
/// tests use [`GrantAll`] (or a denying stub).
#[async_trait]
pub trait PermissionBroker: Send + Sync {
    /// Returns true when every requested permission is granted.
    async fn request(&self, producer: &str, permissions: &[String]) -> bool;
}

/// Broker that grants every request. Default for headless operation.
#[derive(Debug, Default, Clone, Copy)]
pub struct GrantAll;

#[async_trait]
impl PermissionBroker for GrantAll {
    async fn request(&self, _producer: &str, _permissions: &[String]) -> bool {
        true
    }
}
