//! Tape shimming: finding low cells, merging adjacent spots, and
//! simulating the applied layers.

use serde::Serialize;

use crate::bed::{BedConfig, Corner, mm_per_point};
use crate::mesh::Mesh;

/// One grid cell flagged for shimming.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TapeSpot {
    pub row: usize,
    pub col: usize,
    /// Tape layers to apply (at least 1)
    pub layers: u32,
    /// Height deficit against the mesh mean (mm)
    pub height_diff: f64,
    /// Urgency tier, 1 (most urgent) to 3
    pub priority: u8,
    /// Approximate covered area in mm²
    pub area_mm2: f64,
}

/// Scans a (post-screw) mesh for cells that remain below the mean and
/// plans tape layers for them.
#[derive(Debug, Clone)]
pub struct TapeCalculator {
    bed_config: BedConfig,
    tape_thickness: f64,
    min_height_diff: f64,
}

impl TapeCalculator {
    pub fn new(bed_config: BedConfig, tape_thickness: f64, min_height_diff: f64) -> Self {
        Self {
            bed_config,
            tape_thickness,
            min_height_diff,
        }
    }

    pub fn from_settings(settings: &leveler_config::Settings) -> Self {
        Self::new(
            BedConfig::from(&settings.bed),
            settings.hardware.tape_thickness,
            settings.thresholds.tape_threshold,
        )
    }

    #[inline]
    pub fn tape_thickness(&self) -> f64 {
        self.tape_thickness
    }

    fn priority_for(height_diff: f64) -> u8 {
        if height_diff > 0.3 {
            1
        } else if height_diff > 0.2 {
            2
        } else {
            3
        }
    }

    fn layers_for(&self, height_diff: f64) -> u32 {
        ((height_diff / self.tape_thickness).ceil() as u32).max(1)
    }

    fn area_for(&self, height_diff: f64) -> f64 {
        let (x_step, y_step) = mm_per_point(&self.bed_config);
        let base_area = x_step * y_step;
        // Larger deficits get a wider patch.
        if height_diff > 0.3 { base_area * 1.5 } else { base_area }
    }

    fn is_screw_cell(mesh: &Mesh, row: usize, col: usize) -> bool {
        Corner::ALL
            .iter()
            .any(|&corner| corner.index(mesh.rows(), mesh.cols()) == (row, col))
    }

    /// Every cell (except the screw corners) lower than the mesh mean by
    /// more than the threshold, ordered most urgent and deepest first.
    pub fn find_low_spots(&self, mesh: &Mesh) -> Vec<TapeSpot> {
        let mean = mesh.mean();
        let mut spots = Vec::new();

        for row in 0..mesh.rows() {
            for col in 0..mesh.cols() {
                if Self::is_screw_cell(mesh, row, col) {
                    continue;
                }
                let diff = mean - mesh.get(row, col);
                if diff > self.min_height_diff {
                    spots.push(TapeSpot {
                        row,
                        col,
                        layers: self.layers_for(diff),
                        height_diff: diff,
                        priority: Self::priority_for(diff),
                        area_mm2: self.area_for(diff),
                    });
                }
            }
        }

        spots.sort_by(|a, b| {
            a.priority
                .cmp(&b.priority)
                .then(b.height_diff.total_cmp(&a.height_diff))
        });
        spots
    }

    /// Merge spots that touch (8-neighborhood) into one representative
    /// patch each. Two passes: cluster membership is computed over the
    /// immutable input first, merged spots are built second, so the result
    /// cannot depend on aliasing between iteration and mutation.
    pub fn optimize_layout(&self, spots: &[TapeSpot]) -> Vec<TapeSpot> {
        let clusters = cluster_memberships(spots);

        let mut optimized = Vec::with_capacity(clusters.len());
        for members in &clusters {
            let cluster: Vec<&TapeSpot> = members.iter().map(|&i| &spots[i]).collect();
            optimized.push(self.merge_cluster(&cluster));
        }
        optimized
    }

    fn merge_cluster(&self, cluster: &[&TapeSpot]) -> TapeSpot {
        let n = cluster.len() as f64;
        let avg_diff = cluster.iter().map(|s| s.height_diff).sum::<f64>() / n;
        let total_area = cluster.iter().map(|s| s.area_mm2).sum();
        let priority = cluster.iter().map(|s| s.priority).min().unwrap_or(3);

        // Representative: the member nearest the cluster centroid
        // (Manhattan metric); a lone spot represents itself.
        let center = if cluster.len() > 1 {
            let mean_row = cluster.iter().map(|s| s.row as f64).sum::<f64>() / n;
            let mean_col = cluster.iter().map(|s| s.col as f64).sum::<f64>() / n;
            cluster
                .iter()
                .copied()
                .min_by(|a, b| {
                    let da = (a.row as f64 - mean_row).abs() + (a.col as f64 - mean_col).abs();
                    let db = (b.row as f64 - mean_row).abs() + (b.col as f64 - mean_col).abs();
                    da.total_cmp(&db)
                })
                .unwrap_or(cluster[0])
        } else {
            cluster[0]
        };

        TapeSpot {
            row: center.row,
            col: center.col,
            layers: self.layers_for(avg_diff),
            height_diff: avg_diff,
            priority,
            area_mm2: total_area,
        }
    }

    /// Additively raise the 3x3 neighborhood (clamped to the grid) around
    /// each spot by `layers x thickness` on a fresh copy of `base`.
    /// Overlapping neighborhoods stack.
    pub fn apply_spots(&self, base: &Mesh, spots: &[TapeSpot]) -> Mesh {
        let mut mesh = base.clone();
        for spot in spots {
            let raise = f64::from(spot.layers) * self.tape_thickness;
            let r0 = spot.row.saturating_sub(1);
            let r1 = (spot.row + 2).min(mesh.rows());
            let c0 = spot.col.saturating_sub(1);
            let c1 = (spot.col + 2).min(mesh.cols());
            for r in r0..r1 {
                for c in c0..c1 {
                    mesh.set(r, c, mesh.get(r, c) + raise);
                }
            }
        }
        mesh
    }

    /// Peak-deviation reduction from applying the spots.
    pub fn estimate_improvement(&self, base: &Mesh, spots: &[TapeSpot]) -> f64 {
        let simulated = self.apply_spots(base, spots);
        base.peak_deviation() - simulated.peak_deviation()
    }
}

/// Greedy 8-neighborhood clustering over the ordered spot list: each
/// unclaimed spot claims every still-unclaimed spot within Chebyshev
/// distance 1 (itself included). Cluster discovery order follows the
/// input order.
fn cluster_memberships(spots: &[TapeSpot]) -> Vec<Vec<usize>> {
    let mut claimed = vec![false; spots.len()];
    let mut clusters = Vec::new();

    for i in 0..spots.len() {
        if claimed[i] {
            continue;
        }
        let members: Vec<usize> = (0..spots.len())
            .filter(|&j| {
                !claimed[j]
                    && spots[i].row.abs_diff(spots[j].row) <= 1
                    && spots[i].col.abs_diff(spots[j].col) <= 1
            })
            .collect();
        for &j in &members {
            claimed[j] = true;
        }
        clusters.push(members);
    }
    clusters
}
