#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Bed-leveling calibration engine (hardware-agnostic).
//!
//! Given a measured height-deviation mesh and validated settings, this
//! crate computes a chain of correction stages and simulates each stage's
//! effect on the mesh before handing it to the next one.
//!
//! ## Architecture
//!
//! - **Bed/Screw primitives**: grid model with fixed corner mapping
//!   (`bed`), rotation/height conversions (`screw`)
//! - **Analysis**: deviation statistics and stage-necessity decisions
//!   (`analyzer`)
//! - **Stage calculators**: belt/shaft synchronization (`belt`), screw
//!   solving over bilinear corner-influence maps (`solver`), tape
//!   shimming (`tape`), bimetallic thermal-warp prediction (`thermal`)
//! - **Orchestration**: the staged pipeline engine (`workflow`) and its
//!   result model (`stage`)
//!
//! ## Copy-on-write meshes
//!
//! Simulation never mutates an input mesh: every stage output is a fresh
//! `Mesh`, so previously computed stage results can never be corrupted
//! retroactively. This is the core correctness invariant of the crate.

pub mod analyzer;
pub mod bed;
pub mod belt;
pub mod error;
pub mod mesh;
pub mod screw;
pub mod solver;
pub mod stage;
pub mod tape;
pub mod thermal;
pub mod workflow;

pub use analyzer::{DeviationAnalyzer, DeviationStats, LevelingStage, StrategyForecast};
pub use bed::{Bed, BedConfig, Corner, MeshStats};
pub use belt::{BeltAdjustment, BeltCalculator, BeltTarget, VerticalDirection};
pub use error::{CalibError, Result};
pub use mesh::Mesh;
pub use screw::{RotationDirection, Screw, ScrewConfig, ScrewMotion};
pub use solver::{CornerWeights, ScrewAdjustment, ScrewSolver};
pub use stage::{ActionKind, MetaValue, StageAction, StageKey, StageResult, WorkflowData};
pub use tape::{TapeCalculator, TapeSpot};
pub use thermal::{ThermalBreakdown, ThermalWarpModel};
pub use workflow::{compute_workflow, stage_deviation};
