//! Configuration management.
use crate::error::{AppResult, RoverError};
use crate::validation;
use config::Config;
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub log_level: String,
    pub pipeline: PipelineSettings,
    pub trainer: TrainerSettings,
    pub producers: ProducerSettings,
    pub storage: StorageSettings,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PipelineSettings {
    /// Scheduler tick cadence.
    #[serde(with = "humantime_serde")]
    pub tick_interval: Duration,
    /// Ring capacity; producers get `ring_slots - 1` ticks of grace.
    pub ring_slots: usize,
    /// Episode length cap in timesteps.
    pub max_timesteps: u32,
    /// Trial length cap in episodes.
    pub max_episodes: u32,
    /// How long a permission request may hang before counting as denied.
    #[serde(with = "humantime_serde")]
    pub permission_timeout: Duration,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TrainerSettings {
    /// `host:port` of the trainer endpoint.
    pub addr: String,
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,
    #[serde(with = "humantime_serde")]
    pub response_timeout: Duration,
    pub max_header_bytes: usize,
    pub max_payload_bytes: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ProducerSettings {
    pub wheel_encoder: bool,
    pub orientation_sensor: bool,
    pub battery_monitor: bool,
    pub microphone: bool,
    pub camera: bool,
    /// Capture cadence for the scalar sensors.
    #[serde(with = "humantime_serde")]
    pub sensor_interval: Duration,
    /// Capture cadence for the camera.
    #[serde(with = "humantime_serde")]
    pub camera_interval: Duration,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageSettings {
    /// Directory receiving model blobs from trainer replies.
    pub model_dir: String,
}

impl Settings {
    /// Loads defaults, then an optional `config/{name}.toml` overlay, then
    /// `ROVER_*` environment overrides.
    pub fn new(config_name: Option<&str>) -> AppResult<Self> {
        let config_path = format!("config/{}", config_name.unwrap_or("default"));
        let s = Config::builder()
            .set_default("log_level", "info")?
            .set_default("pipeline.tick_interval", "100ms")?
            .set_default("pipeline.ring_slots", 4_i64)?
            .set_default("pipeline.max_timesteps", 200_i64)?
            .set_default("pipeline.max_episodes", 10_i64)?
            .set_default("pipeline.permission_timeout", "5s")?
            .set_default("trainer.addr", "127.0.0.1:7777")?
            .set_default("trainer.connect_timeout", "5s")?
            .set_default("trainer.response_timeout", "30s")?
            .set_default("trainer.max_header_bytes", 64_i64 * 1024)?
            .set_default("trainer.max_payload_bytes", 256_i64 * 1024 * 1024)?
            .set_default("producers.wheel_encoder", true)?
            .set_default("producers.orientation_sensor", true)?
            .set_default("producers.battery_monitor", true)?
            .set_default("producers.microphone", false)?
            .set_default("producers.camera", false)?
            .set_default("producers.sensor_interval", "20ms")?
            .set_default("producers.camera_interval", "100ms")?
            .set_default("storage.model_dir", "models")?
            .add_source(config::File::with_name(&config_path).required(false))
            .add_source(config::Environment::with_prefix("ROVER").separator("__"))
            .build()
            .map_err(RoverError::Config)?;

        let settings: Settings = s.try_deserialize().map_err(RoverError::Config)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Semantic checks the `config` crate cannot express.
    pub fn validate(&self) -> AppResult<()> {
        let fail = |msg: &str| Err(RoverError::Configuration(msg.to_string()));

        if validation::is_valid_socket_addr(&self.trainer.addr).is_err() {
            return fail("trainer.addr must be a host:port pair");
        }
        if validation::is_in_range(self.pipeline.ring_slots, 2..=1024).is_err() {
            return fail("pipeline.ring_slots must be between 2 and 1024");
        }
        if self.pipeline.max_timesteps == 0 {
            return fail("pipeline.max_timesteps must be at least 1");
        }
        if self.pipeline.max_episodes == 0 {
            return fail("pipeline.max_episodes must be at least 1");
        }
        if self.pipeline.tick_interval.is_zero() {
            return fail("pipeline.tick_interval must be non-zero");
        }
        if validation::is_not_empty(&self.storage.model_dir).is_err() {
            return fail("storage.model_dir cannot be empty");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_deserialize_and_validate() {
        let settings = Settings::new(Some("__does_not_exist__")).unwrap();
        assert_eq!(settings.pipeline.ring_slots, 4);
        assert_eq!(settings.pipeline.tick_interval, Duration::from_millis(100));
        assert_eq!(settings.trainer.addr, "127.0.0.1:7777");
        assert!(settings.producers.wheel_encoder);
        assert!(!settings.producers.camera);
    }

    #[test]
    fn validation_rejects_degenerate_ring() {
        let mut settings = Settings::new(Some("__does_not_exist__")).unwrap();
        settings.pipeline.ring_slots = 1;
        assert!(matches!(
            settings.validate().unwrap_err(),
            RoverError::Configuration(_)
        ));
    }

    #[test]
    fn validation_rejects_bad_trainer_addr() {
        let mut settings = Settings::new(Some("__does_not_exist__")).unwrap();
        settings.trainer.addr = "not-an-addr".to_string();
        assert!(settings.validate().is_err());
    }
}
