//! Deviation analysis: aggregate statistics, stage-necessity decisions,
//! and the two-stage strategy forecast.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::bed::{Bed, Corner};
use crate::error::Result;
use crate::mesh::Mesh;
use crate::screw::ScrewConfig;
use crate::solver::ScrewSolver;

/// Aggregate deviation statistics for a measured bed.
#[derive(Debug, Clone, Serialize)]
pub struct DeviationStats {
    pub mean_height: f64,
    /// Largest per-corner deviation from the mean
    pub max_deviation: f64,
    pub corner_deviations: BTreeMap<Corner, f64>,
    /// Max deviation exceeds the screw threshold
    pub has_critical_deviation: bool,
}

/// Which correction stages the current bed state calls for.
#[derive(Debug, Clone, Serialize)]
pub struct LevelingStage {
    pub needs_screw_adjustment: bool,
    /// The corner spread is within what the screws can correct
    pub can_use_screws: bool,
    pub needs_tape: bool,
    /// Largest corner-to-corner height difference
    pub max_corner_diff: f64,
    pub problematic_corners: Vec<Corner>,
}

/// Forecast of the screws-then-tape plan.
#[derive(Debug, Clone, Serialize)]
pub struct StrategyForecast {
    pub original_deviation: f64,
    pub deviation_after_screws: f64,
    pub needs_screws: bool,
    pub needs_tape: bool,
    /// Post-screw deviation, or the tape threshold as a conservative
    /// floor when tape is still required.
    pub expected_final_deviation: f64,
    #[serde(skip)]
    pub simulated_mesh: Mesh,
}

/// Computes deviation statistics and stage decisions from configured
/// thresholds.
#[derive(Debug, Clone)]
pub struct DeviationAnalyzer {
    corner_averaging: usize,
    screw_threshold: f64,
    tape_threshold: f64,
    screw_config: ScrewConfig,
}

impl DeviationAnalyzer {
    pub fn new(
        corner_averaging: usize,
        screw_threshold: f64,
        tape_threshold: f64,
        screw_config: ScrewConfig,
    ) -> Self {
        Self {
            corner_averaging,
            screw_threshold,
            tape_threshold,
            screw_config,
        }
    }

    pub fn from_settings(settings: &leveler_config::Settings) -> Self {
        Self::new(
            settings.hardware.corner_averaging,
            settings.thresholds.screw_threshold,
            settings.thresholds.tape_threshold,
            ScrewConfig::from(&settings.hardware),
        )
    }

    pub fn set_screw_config(&mut self, screw_config: ScrewConfig) {
        self.screw_config = screw_config;
    }

    /// Smoothing radius (in mesh points) used for corner measurements.
    pub fn set_corner_averaging(&mut self, radius: usize) {
        self.corner_averaging = radius;
    }

    pub fn stats(&self, bed: &Bed) -> Result<DeviationStats> {
        let mean_height = bed.mesh_stats()?.mean;

        let mut corner_deviations = BTreeMap::new();
        for corner in Corner::ALL {
            let height = bed.corner_height(corner, self.corner_averaging)?;
            corner_deviations.insert(corner, (height - mean_height).abs());
        }
        let max_deviation = corner_deviations.values().copied().fold(0.0, f64::max);
        let has_critical_deviation = max_deviation > self.screw_threshold;

        Ok(DeviationStats {
            mean_height,
            max_deviation,
            corner_deviations,
            has_critical_deviation,
        })
    }

    /// Decide whether screw-only correction suffices and whether tape will
    /// still be needed afterwards.
    pub fn leveling_stage(&self, bed: &Bed) -> Result<LevelingStage> {
        let stats = self.stats(bed)?;

        let mut min_corner = f64::INFINITY;
        let mut max_corner = f64::NEG_INFINITY;
        for corner in Corner::ALL {
            let height = bed.corner_height(corner, self.corner_averaging)?;
            min_corner = min_corner.min(height);
            max_corner = max_corner.max(height);
        }
        let max_corner_diff = max_corner - min_corner;

        let problematic_corners = stats
            .corner_deviations
            .iter()
            .filter(|&(_, &dev)| dev > self.tape_threshold)
            .map(|(&corner, _)| corner)
            .collect();

        Ok(LevelingStage {
            needs_screw_adjustment: stats.max_deviation > self.screw_threshold,
            can_use_screws: max_corner_diff <= self.screw_config.max_adjust,
            needs_tape: stats.max_deviation > self.tape_threshold,
            max_corner_diff,
            problematic_corners,
        })
    }

    /// Flat plane at the mean of an arbitrary (possibly simulated) mesh.
    pub fn ideal_plane(&self, mesh: &Mesh) -> Mesh {
        mesh.ideal_plane()
    }

    /// Reference two-stage forecast: simulate the screw stage through the
    /// solver's influence model, then check whether tape is still needed.
    pub fn optimal_strategy(&self, bed: &Bed, solver: &ScrewSolver) -> Result<StrategyForecast> {
        let mesh = bed.mesh()?;
        let original_deviation = mesh.peak_deviation();

        let adjustments = solver.calculate_adjustments(mesh, &mesh.ideal_plane())?;
        let simulated_mesh = solver.simulate_sequence(&adjustments, mesh)?;
        let deviation_after_screws = simulated_mesh.peak_deviation();

        let needs_tape = deviation_after_screws > self.tape_threshold;
        let expected_final_deviation = if needs_tape {
            self.tape_threshold
        } else {
            deviation_after_screws
        };
        tracing::debug!(
            original_deviation,
            deviation_after_screws,
            needs_tape,
            "strategy forecast"
        );

        Ok(StrategyForecast {
            original_deviation,
            deviation_after_screws,
            needs_screws: original_deviation > self.screw_threshold,
            needs_tape,
            expected_final_deviation,
            simulated_mesh,
        })
    }
}
