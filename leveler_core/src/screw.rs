//! Adjustment screw model: rotation <-> height-change conversions.

use serde::Serialize;

/// Rotation sense of an adjustment screw. Clockwise lowers the corner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RotationDirection {
    Clockwise,
    Counterclockwise,
}

impl RotationDirection {
    pub fn as_str(self) -> &'static str {
        match self {
            RotationDirection::Clockwise => "clockwise",
            RotationDirection::Counterclockwise => "counterclockwise",
        }
    }
}

impl std::fmt::Display for RotationDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Adjustment screw parameters.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScrewConfig {
    /// Thread label, display only (e.g. "M4")
    pub thread: String,
    /// mm of travel per full rotation
    pub pitch: f64,
    /// Deviations below this are left alone (mm)
    pub min_adjust: f64,
    /// Largest correction one action may apply (mm)
    pub max_adjust: f64,
}

impl Default for ScrewConfig {
    fn default() -> Self {
        Self {
            thread: "M4".to_owned(),
            pitch: 0.7,
            min_adjust: 0.1,
            max_adjust: 2.0,
        }
    }
}

impl From<&leveler_config::HardwareCfg> for ScrewConfig {
    fn from(hw: &leveler_config::HardwareCfg) -> Self {
        Self {
            thread: hw.screw_thread.clone(),
            pitch: hw.screw_pitch,
            min_adjust: hw.min_adjustment,
            max_adjust: hw.max_adjustment,
        }
    }
}

/// Outcome of a single screw computation. Deviations under the minimum
/// adjustment produce `None` rather than a zero-magnitude rotation with a
/// meaningless direction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScrewMotion {
    None,
    Rotate {
        /// Minutes of arc-turn; one full turn is 60 minutes (360 degrees).
        minutes: f64,
        direction: RotationDirection,
    },
}

/// One adjustment screw. Rotation units: 1 full turn = 60 minutes = 360
/// degrees, so 1 minute = 6 degrees.
#[derive(Debug, Clone)]
pub struct Screw {
    config: ScrewConfig,
    mm_per_minute: f64,
    mm_per_degree: f64,
}

impl Screw {
    pub fn new(config: ScrewConfig) -> Self {
        let mm_per_minute = config.pitch / 60.0;
        let mm_per_degree = config.pitch / 360.0;
        Self {
            config,
            mm_per_minute,
            mm_per_degree,
        }
    }

    #[inline]
    pub fn config(&self) -> &ScrewConfig {
        &self.config
    }

    /// Rotation required to move a corner from `current` to `target`
    /// height, clamped to the per-action maximum.
    pub fn calculate_adjustment(&self, current: f64, target: f64) -> ScrewMotion {
        let diff = current - target;
        if diff.abs() < self.config.min_adjust {
            return ScrewMotion::None;
        }
        let direction = if diff > 0.0 {
            RotationDirection::Clockwise
        } else {
            RotationDirection::Counterclockwise
        };
        let minutes = (diff.abs() / self.mm_per_minute)
            .min(self.config.max_adjust / self.mm_per_minute);
        ScrewMotion::Rotate { minutes, direction }
    }

    pub fn minutes_to_degrees(&self, minutes: f64) -> f64 {
        minutes * 6.0
    }

    /// Signed height change of a rotation; clockwise lowers the corner.
    pub fn height_change_from_minutes(&self, minutes: f64, direction: RotationDirection) -> f64 {
        let change = minutes * self.mm_per_minute;
        match direction {
            RotationDirection::Clockwise => -change,
            RotationDirection::Counterclockwise => change,
        }
    }

    pub fn height_change_from_degrees(&self, degrees: f64, direction: RotationDirection) -> f64 {
        let change = degrees * self.mm_per_degree;
        match direction {
            RotationDirection::Clockwise => -change,
            RotationDirection::Counterclockwise => change,
        }
    }
}
