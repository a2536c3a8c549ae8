//! Data model of the staged calibration pipeline: actions, per-stage
//! results, and the aggregated workflow output.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::mesh::Mesh;
use crate::thermal::ThermalBreakdown;

/// Pipeline stage identity, in fixed execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKey {
    Initial,
    AfterBelts,
    AfterScrews,
    AfterTape,
    AfterTemperature,
}

impl StageKey {
    pub const ORDER: [StageKey; 5] = [
        StageKey::Initial,
        StageKey::AfterBelts,
        StageKey::AfterScrews,
        StageKey::AfterTape,
        StageKey::AfterTemperature,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            StageKey::Initial => "initial",
            StageKey::AfterBelts => "after_belts",
            StageKey::AfterScrews => "after_screws",
            StageKey::AfterTape => "after_tape",
            StageKey::AfterTemperature => "after_temperature",
        }
    }
}

impl std::fmt::Display for StageKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of corrective instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Belt,
    Screw,
    Tape,
}

/// Free-form metadata value for kind-specific extras.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum MetaValue {
    Num(f64),
    Int(i64),
    Text(String),
}

/// One atomic corrective instruction. Created once per stage computation
/// and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageAction {
    pub kind: ActionKind,
    /// Corner name, shaft name, or grid cell designation (e.g. "3C")
    pub identifier: String,
    /// Localization key (or literal cell designation) for display
    pub label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub direction: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub magnitude_mm: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub teeth: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub minutes: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub degrees: Option<f64>,
    pub metadata: BTreeMap<String, MetaValue>,
}

impl StageAction {
    pub fn new(kind: ActionKind, identifier: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            kind,
            identifier: identifier.into(),
            label: label.into(),
            direction: None,
            magnitude_mm: None,
            teeth: None,
            minutes: None,
            degrees: None,
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_meta(mut self, key: &str, value: MetaValue) -> Self {
        self.metadata.insert(key.to_owned(), value);
        self
    }
}

/// Result of one pipeline stage. Constructed once per workflow run and
/// never mutated; a recompute produces a fresh value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageResult {
    pub key: StageKey,
    /// Localization key of the stage title
    pub label: String,
    /// Localization key of the stage description
    pub description: String,
    pub enabled: bool,
    /// Height span (max - min) of the output mesh
    pub deviation: f64,
    /// The previous stage's deviation; none for the initial stage
    pub baseline: Option<f64>,
    /// Owned copy of the stage's output mesh
    pub mesh: Mesh,
    pub actions: Vec<StageAction>,
    /// Warning keys, informational only
    pub warnings: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub help_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thermal: Option<ThermalBreakdown>,
}

impl StageResult {
    pub fn has_actions(&self) -> bool {
        !self.actions.is_empty()
    }
}

/// Aggregated output of one workflow computation: the ordered stage
/// results and the best (lowest-deviation) stage. Immutable and safe to
/// serialize for display.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkflowData {
    pub stages: Vec<StageResult>,
    pub best: StageKey,
    /// Name of the thermal model in effect, when one was configured
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_thermal_model: Option<String>,
}

impl WorkflowData {
    pub fn stage(&self, key: StageKey) -> Option<&StageResult> {
        self.stages.iter().find(|s| s.key == key)
    }

    /// The stage the `best` reference points at. The engine guarantees
    /// the reference is valid for the stages it produced.
    pub fn best_stage(&self) -> &StageResult {
        self.stage(self.best).unwrap_or(&self.stages[0])
    }
}
