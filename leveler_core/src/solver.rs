//! Screw solver: per-corner bilinear influence maps and the adjustment
//! computation/simulation built on them.

use serde::Serialize;

use crate::bed::{Corner, corner_height_of};
use crate::error::Result;
use crate::mesh::Mesh;
use crate::screw::{RotationDirection, Screw, ScrewConfig, ScrewMotion};

/// One recommended screw correction.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScrewAdjustment {
    pub corner: Corner,
    pub minutes: f64,
    pub degrees: f64,
    pub direction: RotationDirection,
    pub current_height: f64,
    pub target_height: f64,
    /// Urgency tier, 1 (most urgent) to 4.
    pub priority: u8,
    /// Full turns, minutes / 60.
    pub turns: f64,
}

impl ScrewAdjustment {
    #[inline]
    pub fn deviation(&self) -> f64 {
        (self.current_height - self.target_height).abs()
    }
}

/// Per-corner bilinear weight maps, normalized so the four maps sum to 1
/// at every grid point. Derived read-only artifact keyed by grid shape;
/// rebuilt whole whenever the shape changes, never patched in place.
#[derive(Debug, Clone)]
pub struct CornerWeights {
    rows: usize,
    cols: usize,
    maps: [Mesh; 4],
}

impl CornerWeights {
    pub fn build(rows: usize, cols: usize) -> Self {
        if rows < 2 || cols < 2 {
            // Degenerate single-row/column grids: every corner moves every
            // point equally.
            let rows = rows.max(1);
            let cols = cols.max(1);
            let uniform = Mesh::filled_unchecked(rows, cols, 1.0);
            return Self {
                rows,
                cols,
                maps: [uniform.clone(), uniform.clone(), uniform.clone(), uniform],
            };
        }

        let zero = Mesh::filled_unchecked(rows, cols, 0.0);
        let mut raw = [zero.clone(), zero.clone(), zero.clone(), zero];

        for r in 0..rows {
            let rf = r as f64 / (rows - 1) as f64;
            for c in 0..cols {
                let cf = c as f64 / (cols - 1) as f64;
                raw[corner_slot(Corner::FrontLeft)].set(r, c, (1.0 - rf) * (1.0 - cf));
                raw[corner_slot(Corner::FrontRight)].set(r, c, (1.0 - rf) * cf);
                raw[corner_slot(Corner::BackLeft)].set(r, c, rf * (1.0 - cf));
                raw[corner_slot(Corner::BackRight)].set(r, c, rf * cf);
            }
        }

        // Renormalize against accumulated rounding; a zero total maps to 0.
        for r in 0..rows {
            for c in 0..cols {
                let total: f64 = raw.iter().map(|m| m.get(r, c)).sum();
                let correction = if total != 0.0 { 1.0 / total } else { 0.0 };
                for map in &mut raw {
                    let w = map.get(r, c) * correction;
                    map.set(r, c, w);
                }
            }
        }

        Self { rows, cols, maps: raw }
    }

    #[inline]
    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    #[inline]
    pub fn map(&self, corner: Corner) -> &Mesh {
        &self.maps[corner_slot(corner)]
    }
}

#[inline]
fn corner_slot(corner: Corner) -> usize {
    match corner {
        Corner::FrontLeft => 0,
        Corner::FrontRight => 1,
        Corner::BackLeft => 2,
        Corner::BackRight => 3,
    }
}

/// Computes per-corner screw adjustments against an ideal plane and
/// simulates their cumulative effect through the corner weight maps.
#[derive(Debug, Clone)]
pub struct ScrewSolver {
    screw: Screw,
    corner_averaging: usize,
    weights: CornerWeights,
}

impl ScrewSolver {
    pub fn new(rows: usize, cols: usize, screw_config: ScrewConfig, corner_averaging: usize) -> Self {
        Self {
            screw: Screw::new(screw_config),
            corner_averaging,
            weights: CornerWeights::build(rows, cols),
        }
    }

    pub fn from_settings(settings: &leveler_config::Settings) -> Self {
        Self::new(
            settings.bed.mesh_points_x,
            settings.bed.mesh_points_y,
            ScrewConfig::from(&settings.hardware),
            settings.hardware.corner_averaging,
        )
    }

    /// Swap the screw configuration; weight maps depend only on the grid
    /// shape and stay valid.
    pub fn set_screw_config(&mut self, screw_config: ScrewConfig) {
        self.screw = Screw::new(screw_config);
    }

    /// Swap the grid shape; rebuilds the weight maps from scratch.
    pub fn set_grid_shape(&mut self, rows: usize, cols: usize) {
        self.weights = CornerWeights::build(rows, cols);
        tracing::debug!(rows, cols, "rebuilt corner weight maps");
    }

    #[inline]
    pub fn weights(&self) -> &CornerWeights {
        &self.weights
    }

    #[inline]
    pub fn screw(&self) -> &Screw {
        &self.screw
    }

    fn priority_for(deviation: f64) -> u8 {
        if deviation > 0.4 {
            1
        } else if deviation > 0.3 {
            2
        } else if deviation > 0.2 {
            3
        } else {
            4
        }
    }

    /// Derive the screw corrections that move each corner of `mesh` toward
    /// `ideal`. No-op corners are filtered out; the rest are ordered most
    /// urgent and largest first.
    pub fn calculate_adjustments(&self, mesh: &Mesh, ideal: &Mesh) -> Result<Vec<ScrewAdjustment>> {
        mesh.ensure_same_shape(ideal)?;
        let mut adjustments = Vec::new();

        for corner in Corner::ALL {
            let (r, c) = corner.index(mesh.rows(), mesh.cols());
            let current = corner_height_of(mesh, corner, self.corner_averaging);
            let target = ideal.get(r, c);

            match self.screw.calculate_adjustment(current, target) {
                ScrewMotion::None => {}
                ScrewMotion::Rotate { minutes, direction } => {
                    let deviation = (current - target).abs();
                    adjustments.push(ScrewAdjustment {
                        corner,
                        minutes,
                        degrees: self.screw.minutes_to_degrees(minutes),
                        direction,
                        current_height: current,
                        target_height: target,
                        priority: Self::priority_for(deviation),
                        turns: minutes / 60.0,
                    });
                }
            }
        }

        adjustments.sort_by(|a, b| {
            a.priority
                .cmp(&b.priority)
                .then(b.deviation().total_cmp(&a.deviation()))
        });
        tracing::debug!(count = adjustments.len(), "screw adjustments derived");
        Ok(adjustments)
    }

    /// Apply one adjustment's height delta, scaled by the corner's weight
    /// map, to a fresh copy of `base`.
    pub fn simulate_adjustment(&self, adjustment: &ScrewAdjustment, base: &Mesh) -> Result<Mesh> {
        base.ensure_same_shape(self.weights.map(adjustment.corner))?;
        let height_change = self
            .screw
            .height_change_from_minutes(adjustment.minutes, adjustment.direction);
        base.plus_scaled(self.weights.map(adjustment.corner), height_change)
    }

    /// Apply a sequence of adjustments in order; later adjustments see the
    /// mesh already modified by earlier ones. Contributions are purely
    /// additive per corner, so the result is order-independent.
    pub fn simulate_sequence(&self, adjustments: &[ScrewAdjustment], base: &Mesh) -> Result<Mesh> {
        let mut mesh = base.clone();
        for adjustment in adjustments {
            mesh = self.simulate_adjustment(adjustment, &mesh)?;
        }
        Ok(mesh)
    }

    /// Peak-deviation reduction from applying a sequence.
    pub fn estimate_total_improvement(
        &self,
        adjustments: &[ScrewAdjustment],
        base: &Mesh,
    ) -> Result<f64> {
        let simulated = self.simulate_sequence(adjustments, base)?;
        Ok(base.peak_deviation() - simulated.peak_deviation())
    }
}
