//! Belt/shaft synchronization stage: discrete tooth corrections for the
//! front Z-shafts and the rear support shaft, applied through smooth
//! falloff influence maps and re-centered to zero net height shift.

use serde::Serialize;

use crate::bed::Corner;
use crate::error::Result;
use crate::mesh::Mesh;

/// Front shafts respond harder than the rear support shaft.
pub const FRONT_SHAFT_GAIN: f64 = 1.6;
pub const BACK_SHAFT_GAIN: f64 = 0.4;

/// Which shaft a belt action targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BeltTarget {
    FrontLeft,
    FrontRight,
    Back,
}

impl BeltTarget {
    pub fn as_str(self) -> &'static str {
        match self {
            BeltTarget::FrontLeft => "front_left",
            BeltTarget::FrontRight => "front_right",
            BeltTarget::Back => "back",
        }
    }

    pub fn label_key(self) -> &'static str {
        match self {
            BeltTarget::FrontLeft => Corner::FrontLeft.label_key(),
            BeltTarget::FrontRight => Corner::FrontRight.label_key(),
            BeltTarget::Back => "corner.back_center",
        }
    }
}

/// Vertical sense of a shaft rotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VerticalDirection {
    Up,
    Down,
}

impl VerticalDirection {
    pub fn as_str(self) -> &'static str {
        match self {
            VerticalDirection::Up => "up",
            VerticalDirection::Down => "down",
        }
    }
}

/// One shaft correction in discrete tooth units.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BeltAdjustment {
    pub target: BeltTarget,
    pub direction: VerticalDirection,
    pub teeth: u32,
    /// teeth x tooth pitch (mm)
    pub magnitude_mm: f64,
    pub sign: f64,
    pub gain: f64,
    /// The measured height difference that triggered the action
    pub raw_difference: f64,
    /// "front" for the stiff front shafts, "support" for the rear
    pub load_bias: &'static str,
}

/// Diagnostics of the applied belt correction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BeltLoadInfo {
    /// Mean height shift removed by the rebalance
    pub removed_offset: f64,
    /// Span of the net per-cell change after rebalance
    pub load_range: f64,
}

/// Smooth falloff influence maps for the belt stage. Distinct from the
/// solver's bilinear maps: falloff is `1/(1+distance)` with a vertical
/// bias favoring the front edge and a horizontal bias toward the owning
/// front corner; rear maps stay damped and neutral. Each map is
/// normalized to peak 1.
#[derive(Debug, Clone)]
struct BeltWeights {
    front_left: Mesh,
    front_right: Mesh,
    back: Mesh,
}

impl BeltWeights {
    fn build(rows: usize, cols: usize) -> Self {
        let vertical_bias = |r: usize| linspace_at(1.0, 0.4, rows, r);
        let horizontal_left = |c: usize| linspace_at(1.0, 0.6, cols, c);
        let horizontal_right = |c: usize| linspace_at(1.0, 0.6, cols, cols - 1 - c);

        let falloff = |r: usize, c: usize, corner: (usize, usize)| {
            let dr = r as f64 - corner.0 as f64;
            let dc = c as f64 - corner.1 as f64;
            1.0 / (1.0 + dr.hypot(dc))
        };

        let mut front_left = Mesh::filled_unchecked(rows, cols, 0.0);
        let mut front_right = Mesh::filled_unchecked(rows, cols, 0.0);
        let mut back_left = Mesh::filled_unchecked(rows, cols, 0.0);
        let mut back_right = Mesh::filled_unchecked(rows, cols, 0.0);

        for r in 0..rows {
            for c in 0..cols {
                front_left.set(r, c, falloff(r, c, (0, 0)) * vertical_bias(r) * horizontal_left(c));
                front_right.set(
                    r,
                    c,
                    falloff(r, c, (0, cols - 1)) * vertical_bias(r) * horizontal_right(c),
                );
                back_left.set(r, c, falloff(r, c, (rows - 1, 0)) * 0.7);
                back_right.set(r, c, falloff(r, c, (rows - 1, cols - 1)) * 0.7);
            }
        }

        // The rear shaft acts through both back corners at once.
        let mut back = Mesh::filled_unchecked(rows, cols, 0.0);
        for r in 0..rows {
            for c in 0..cols {
                back.set(r, c, (back_left.get(r, c) + back_right.get(r, c)) / 2.0);
            }
        }

        Self {
            front_left: normalize_to_peak(front_left),
            front_right: normalize_to_peak(front_right),
            back: normalize_to_peak(back),
        }
    }

    fn map(&self, target: BeltTarget) -> &Mesh {
        match target {
            BeltTarget::FrontLeft => &self.front_left,
            BeltTarget::FrontRight => &self.front_right,
            BeltTarget::Back => &self.back,
        }
    }
}

fn linspace_at(start: f64, end: f64, n: usize, i: usize) -> f64 {
    if n < 2 {
        return start;
    }
    start + (end - start) * i as f64 / (n - 1) as f64
}

fn normalize_to_peak(mesh: Mesh) -> Mesh {
    let peak = mesh.max();
    if peak == 0.0 {
        return mesh;
    }
    let values = mesh.values().iter().map(|v| v / peak).collect();
    Mesh::from_values(mesh.rows(), mesh.cols(), values)
        .unwrap_or(mesh)
}

/// Derives and applies shaft-synchronization corrections.
#[derive(Debug, Clone)]
pub struct BeltCalculator {
    threshold: f64,
    tooth_mm: f64,
}

impl BeltCalculator {
    pub fn new(threshold: f64, tooth_mm: f64) -> Self {
        Self { threshold, tooth_mm }
    }

    pub fn from_settings(settings: &leveler_config::Settings) -> Self {
        Self::new(settings.thresholds.belt(), settings.hardware.belt_tooth_mm)
    }

    fn teeth_for(&self, diff: f64) -> u32 {
        ((diff.abs() / self.tooth_mm).ceil() as u32).max(1)
    }

    /// Compare the front corners against each other and the back center
    /// against the front average; emit a tooth-count action per shaft
    /// whose difference exceeds the threshold.
    pub fn calculate(&self, mesh: &Mesh) -> Vec<BeltAdjustment> {
        let rows = mesh.rows();
        let cols = mesh.cols();

        let left_front = mesh.get(0, 0);
        let right_front = mesh.get(0, cols - 1);
        let back_center = mesh.get(rows - 1, cols / 2);
        let front_avg = (left_front + right_front) / 2.0;

        let mut adjustments = Vec::new();

        let lr_diff = right_front - left_front;
        if lr_diff.abs() > self.threshold {
            let teeth = self.teeth_for(lr_diff);
            // Raise the lower front corner.
            let target = if lr_diff > 0.0 {
                BeltTarget::FrontLeft
            } else {
                BeltTarget::FrontRight
            };
            adjustments.push(BeltAdjustment {
                target,
                direction: VerticalDirection::Up,
                teeth,
                magnitude_mm: f64::from(teeth) * self.tooth_mm,
                sign: 1.0,
                gain: FRONT_SHAFT_GAIN,
                raw_difference: lr_diff,
                load_bias: "front",
            });
        }

        let back_diff = back_center - front_avg;
        if back_diff.abs() > self.threshold {
            let teeth = self.teeth_for(back_diff);
            let direction = if back_diff < 0.0 {
                VerticalDirection::Up
            } else {
                VerticalDirection::Down
            };
            adjustments.push(BeltAdjustment {
                target: BeltTarget::Back,
                direction,
                teeth,
                magnitude_mm: f64::from(teeth) * self.tooth_mm,
                sign: if back_diff < 0.0 { 1.0 } else { -1.0 },
                gain: BACK_SHAFT_GAIN,
                raw_difference: back_diff,
                load_bias: "support",
            });
        }

        tracing::debug!(
            lr_diff,
            back_diff,
            actions = adjustments.len(),
            "belt differences evaluated"
        );
        adjustments
    }

    /// Apply the corrections through the smooth influence maps, then
    /// re-center so the stage introduces exactly zero mean height shift:
    /// the belt stage redistributes, it never raises or lowers the bed as
    /// a whole.
    pub fn apply(
        &self,
        base: &Mesh,
        adjustments: &[BeltAdjustment],
    ) -> Result<(Mesh, BeltLoadInfo)> {
        if adjustments.is_empty() {
            return Ok((
                base.clone(),
                BeltLoadInfo {
                    removed_offset: 0.0,
                    load_range: 0.0,
                },
            ));
        }

        let weights = BeltWeights::build(base.rows(), base.cols());
        let mut result = base.clone();
        for adjustment in adjustments {
            let delta = adjustment.magnitude_mm * adjustment.sign * adjustment.gain;
            result = result.plus_scaled(weights.map(adjustment.target), delta)?;
        }

        let removed_offset = result.mean() - base.mean();
        let balanced = if removed_offset.abs() < 1e-9 {
            result
        } else {
            result.offset(-removed_offset)
        };

        let mut delta_min = f64::INFINITY;
        let mut delta_max = f64::NEG_INFINITY;
        for (after, before) in balanced.values().iter().zip(base.values()) {
            let d = after - before;
            delta_min = delta_min.min(d);
            delta_max = delta_max.max(d);
        }

        Ok((
            balanced,
            BeltLoadInfo {
                removed_offset,
                load_range: delta_max - delta_min,
            },
        ))
    }
}
