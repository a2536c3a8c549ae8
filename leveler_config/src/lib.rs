#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Settings schemas and mesh ingestion for the bed-leveling workflow.
//!
//! - `Settings` and its sub-structs are deserialized from TOML and validated
//!   once at the boundary; the workflow engine assumes validated input.
//! - `profile` parses printer.cfg-style text into named mesh profiles.
//! - `load_mesh_csv` loads a headerless rectangular grid from CSV.

use serde::Deserialize;

pub mod profile;

pub use profile::{MeshProfile, load_mesh_csv, parse_profiles, validate_profile};

/// Physical bed geometry and mesh grid resolution.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct BedCfg {
    /// Bed size along X in mm
    pub size_x: f64,
    /// Bed size along Y in mm
    pub size_y: f64,
    /// Number of probed mesh points along X
    pub mesh_points_x: usize,
    /// Number of probed mesh points along Y
    pub mesh_points_y: usize,
}

impl Default for BedCfg {
    fn default() -> Self {
        Self {
            size_x: 220.0,
            size_y: 220.0,
            mesh_points_x: 5,
            mesh_points_y: 5,
        }
    }
}

/// Screw, tape and belt hardware parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HardwareCfg {
    /// Adjustment screw thread label (display only)
    pub screw_thread: String,
    /// Screw thread pitch: mm of travel per full rotation
    pub screw_pitch: f64,
    /// Deviations below this are not worth a screw action (mm)
    pub min_adjustment: f64,
    /// Largest correction a single screw action may apply (mm)
    pub max_adjustment: f64,
    /// Thickness of one tape layer (mm)
    pub tape_thickness: f64,
    /// Belt tooth pitch (mm of height change per tooth)
    pub belt_tooth_mm: f64,
    /// Corner averaging radius in mesh points (0 = single point)
    pub corner_averaging: usize,
}

impl Default for HardwareCfg {
    fn default() -> Self {
        Self {
            screw_thread: "M4".to_owned(),
            screw_pitch: 0.7,
            min_adjustment: 0.1,
            max_adjustment: 2.0,
            tape_thickness: 0.06,
            belt_tooth_mm: 0.4,
            corner_averaging: 1,
        }
    }
}

/// Per-stage decision thresholds (mm).
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct ThresholdsCfg {
    /// Minimum shaft height difference worth a belt action.
    /// When absent, the screw threshold is used.
    pub belt_threshold: Option<f64>,
    /// Minimum corner deviation worth a screw action
    pub screw_threshold: f64,
    /// Minimum cell deficit worth a tape spot
    pub tape_threshold: f64,
}

impl Default for ThresholdsCfg {
    fn default() -> Self {
        Self {
            belt_threshold: None,
            screw_threshold: 0.19,
            tape_threshold: 0.01,
        }
    }
}

impl ThresholdsCfg {
    /// Effective belt threshold (falls back to the screw threshold).
    #[inline]
    pub fn belt(&self) -> f64 {
        self.belt_threshold.unwrap_or(self.screw_threshold)
    }
}

/// Per-stage enable flags. Disabling a stage never blocks later stages;
/// it passes the mesh through unchanged.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct WorkflowCfg {
    pub enable_belt: bool,
    pub enable_screws: bool,
    pub enable_tape: bool,
}

impl Default for WorkflowCfg {
    fn default() -> Self {
        Self {
            enable_belt: true,
            enable_screws: true,
            enable_tape: true,
        }
    }
}

/// Ambient measurement conditions for the thermal prediction.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct EnvironmentCfg {
    /// Bed temperature during probing (°C)
    pub measurement_temp: f64,
    /// Print temperature the prediction targets (°C); defaults to the
    /// measurement temperature (no thermal delta).
    pub target_temp: Option<f64>,
    /// Plain linear expansion coefficient for the legacy fallback model
    pub thermal_expansion_coeff: f64,
}

impl Default for EnvironmentCfg {
    fn default() -> Self {
        Self {
            measurement_temp: 25.0,
            target_temp: None,
            thermal_expansion_coeff: 0.0,
        }
    }
}

impl EnvironmentCfg {
    #[inline]
    pub fn target_temp(&self) -> f64 {
        self.target_temp.unwrap_or(self.measurement_temp)
    }
}

/// Two-layer (PEI sheet over steel base) plate model for thermal warp.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ThermalModelCfg {
    /// Optional model name echoed into stage metadata
    pub name: Option<String>,
    /// Overrides `environment.measurement_temp` when set
    pub measurement_temp: Option<f64>,
    /// Overrides `environment.target_temp` when set
    pub target_temp: Option<f64>,
    /// Fraction of the top-surface delta the chamber air reaches (0..=1)
    pub chamber_factor: f64,
    /// Print-surface layer thickness (mm)
    pub pei_thickness: f64,
    /// Base plate thickness (mm)
    pub steel_thickness: f64,
    /// Surface layer expansion coefficient; defaults to the environment one
    pub alpha_pei: Option<f64>,
    /// Base plate expansion coefficient; defaults to the environment one
    pub alpha_steel: Option<f64>,
    /// Weighting of the uniform bulk-expansion curvature term
    pub beta_uniform: f64,
}

impl Default for ThermalModelCfg {
    fn default() -> Self {
        Self {
            name: None,
            measurement_temp: None,
            target_temp: None,
            chamber_factor: 0.0,
            pei_thickness: 0.55,
            steel_thickness: 1.50,
            alpha_pei: None,
            alpha_steel: None,
            beta_uniform: 0.2,
        }
    }
}

/// Top-level settings record consumed by the workflow engine.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub bed: BedCfg,
    pub hardware: HardwareCfg,
    pub thresholds: ThresholdsCfg,
    pub workflow: WorkflowCfg,
    pub environment: EnvironmentCfg,
    /// Optional bimetallic plate model; absent means legacy fallback only.
    pub thermal_model: Option<ThermalModelCfg>,
}

pub fn load_toml(s: &str) -> Result<Settings, toml::de::Error> {
    toml::from_str::<Settings>(s)
}

impl Settings {
    pub fn validate(&self) -> eyre::Result<()> {
        // Bed
        if self.bed.size_x <= 0.0 || self.bed.size_y <= 0.0 {
            eyre::bail!("bed.size_x and bed.size_y must be > 0");
        }
        if self.bed.mesh_points_x < 2 || self.bed.mesh_points_y < 2 {
            eyre::bail!("bed.mesh_points_x and bed.mesh_points_y must be >= 2");
        }

        // Hardware
        if !(self.hardware.screw_pitch > 0.0) {
            eyre::bail!("hardware.screw_pitch must be > 0");
        }
        if self.hardware.min_adjustment < 0.0 {
            eyre::bail!("hardware.min_adjustment must be >= 0");
        }
        if !(self.hardware.max_adjustment > 0.0) {
            eyre::bail!("hardware.max_adjustment must be > 0");
        }
        if self.hardware.min_adjustment > self.hardware.max_adjustment {
            eyre::bail!("hardware.min_adjustment must not exceed hardware.max_adjustment");
        }
        if !(self.hardware.tape_thickness > 0.0) {
            eyre::bail!("hardware.tape_thickness must be > 0");
        }
        if !(self.hardware.belt_tooth_mm > 0.0) {
            eyre::bail!("hardware.belt_tooth_mm must be > 0");
        }
        if self.hardware.corner_averaging > 5 {
            eyre::bail!("hardware.corner_averaging is unreasonably large (>5 points)");
        }

        // Thresholds
        if let Some(belt) = self.thresholds.belt_threshold
            && belt < 0.0
        {
            eyre::bail!("thresholds.belt_threshold must be >= 0");
        }
        if self.thresholds.screw_threshold < 0.0 {
            eyre::bail!("thresholds.screw_threshold must be >= 0");
        }
        if self.thresholds.tape_threshold < 0.0 {
            eyre::bail!("thresholds.tape_threshold must be >= 0");
        }

        // Environment
        if !self.environment.measurement_temp.is_finite()
            || !self.environment.target_temp().is_finite()
        {
            eyre::bail!("environment temperatures must be finite");
        }

        // Thermal model
        if let Some(model) = &self.thermal_model {
            if !(model.pei_thickness > 0.0) {
                eyre::bail!("thermal_model.pei_thickness must be > 0");
            }
            if !(model.steel_thickness > 0.0) {
                eyre::bail!("thermal_model.steel_thickness must be > 0");
            }
            if !(0.0..=1.0).contains(&model.chamber_factor) {
                eyre::bail!("thermal_model.chamber_factor must be in [0.0, 1.0]");
            }
            if model.beta_uniform < 0.0 {
                eyre::bail!("thermal_model.beta_uniform must be >= 0");
            }
        }

        Ok(())
    }
}
