//! Tempo Deterministic Simulation Testing (DST) Harness
//!
//! This crate provides a controlled environment where a [`tempo_core::Timeline`]
//! and a handful of demo subsystems run deterministically.
//!
//! # Core Principle: Everything From One Seed
//!
//! All sources of non-determinism are intercepted and controlled:
//! - **Time**: `SimContext` is a virtual clock; sleeping advances it
//! - **Frames**: wall-clock frame jitter comes from a seeded ChaCha8 stream
//! - **Callers**: command issuers for every source draw from the same seed
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                        SimWorld                          │
//! │  ┌────────────┐     ┌──────────────────────────────────┐ │
//! │  │ SimContext │────►│ Timeline                         │ │
//! │  │ StepPacer  │     │  arbiter → modes → clock → tracks │ │
//! │  └────────────┘     └───┬──────────┬──────────┬────────┘ │
//! │                         │          │          │          │
//! │                    OrbitalBody  MiningRig  Vegetation ...│
//! └──────────────────────────────────────────────────────────┘
//!            ▲                                   │
//!   CommandIssuer x4                      ReplayOracle
//!   (player/script/ui/debug)        (forward-only fingerprints)
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use tempo_sim::{ScenarioRunner, scenarios::ScenarioId};
//!
//! let result = ScenarioRunner::new(42).run(ScenarioId::RewindInWindow);
//! assert!(result.passed);
//! ```

mod context;
mod error;
mod exporter;
mod issuers;
mod oracle;
mod runner;
pub mod scenarios;
mod subsystems;
mod world;

pub use context::SimContext;
pub use error::SimError;
pub use exporter::{SimEvent, SimExport, SimFrame};
pub use issuers::{CommandIssuer, IssuerView};
pub use oracle::ReplayOracle;
pub use runner::{ScenarioMetrics, ScenarioResult, ScenarioRunner};
pub use subsystems::{fingerprint, AudioCues, DriftedLedger, MiningRig, OrbitalBody, VegetationPlot};
pub use world::{
    PacedSummary, SimConfig, SimWorld, WorldFingerprint, AUDIO_TRACK, DRIFTED_TRACK, MINING_TRACK,
    ORBIT_TRACK, VEGETATION_TRACK,
};
