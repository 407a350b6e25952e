//! # Rover Link Core Library
//!
//! This crate is the on-robot half of a remote-training setup: it aggregates
//! sensor data into fixed-cadence timesteps, batches timesteps into episodes,
//! and ships each episode to a remote trainer over TCP, bringing back updated
//! model blobs for the local policy. The binary (`main.rs`) is a thin CLI
//! over this library so the pipeline can also be embedded in tests or other
//! frontends.
//!
//! ## Crate Structure
//!
//! - **`buffer`**: The multi-producer/single-consumer timestep ring. Producers
//!   write into the current slot while the scheduler reads the previous one;
//!   slow producers get a bounded grace window before their samples land in a
//!   stale slot and are silently reclaimed.
//! - **`config`**: Loading and validation of the pipeline configuration from
//!   TOML files and `ROVER_*` environment overrides. See `config::Settings`.
//! - **`error`**: The custom `RoverError` enum for centralized error handling
//!   across the application.
//! - **`metrics`**: Shared atomic counters for ticks, episodes, failures.
//! - **`policy`**: The `ActionSelector` and `RewardMonitor` seams plus the
//!   built-in random baseline policy.
//! - **`producer`**: The `Producer` trait, the phased bring-up lifecycle with
//!   permission brokering, and mock producers for every sensor channel.
//! - **`record`**: Per-timestep sample types and the channel-locked
//!   `TimestepRecord` that producers append into.
//! - **`scheduler`**: The trial driver that rotates the ring, accumulates
//!   episodes and brackets trainer round trips with pause/resume.
//! - **`serializer`**: Episode payload accumulation with a pluggable
//!   per-channel binary codec.
//! - **`storage`**: Persistence of model blobs returned by the trainer.
//! - **`transport`**: The length-prefixed JSON-header frame protocol and the
//!   readiness-driven TCP client that carries one episode at a time.
//! - **`validation`**: Utility functions for validating configuration
//!   parameters.

pub mod buffer;
pub mod config;
pub mod error;
pub mod metrics;
pub mod policy;
pub mod producer;
pub mod record;
pub mod scheduler;
pub mod serializer;
pub mod storage;
pub mod transport;
pub mod validation;
