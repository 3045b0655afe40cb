// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod model;

// Engine core: estimate -> group -> rank -> trend/surge
pub mod grouping;
pub mod interest;
pub mod ranking;
pub mod surge;
pub mod trend;

// Cycle orchestration
pub mod analyzer;
pub mod cycle;
pub mod scheduler;

pub mod store;

// Service plumbing
pub mod api;
pub mod config;
pub mod metrics;
pub mod translate;

// ---- Re-exports for stable public API ----
pub use crate::api::{create_router, AppState};
pub use crate::cycle::{CycleOutcome, Engine, EngineConfig};
pub use crate::store::PulseStore;
