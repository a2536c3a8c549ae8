//! The staged calibration workflow engine.
//!
//! Fixed pipeline: initial -> after_belts -> after_screws -> after_tape ->
//! after_temperature. Every stage consumes the simulated output mesh of
//! the previous stage, derives its actions from it, and simulates their
//! effect before handing the mesh on. A disabled stage passes the mesh
//! through unchanged and never blocks downstream stages. The whole
//! pipeline recomputes on every invocation; there is no partial
//! recompute.

use crate::analyzer::DeviationAnalyzer;
use crate::bed::{Bed, BedConfig};
use crate::belt::{BeltAdjustment, BeltCalculator, BeltLoadInfo};
use crate::error::Result;
use crate::mesh::Mesh;
use crate::solver::{ScrewAdjustment, ScrewSolver};
use crate::stage::{ActionKind, MetaValue, StageAction, StageKey, StageResult, WorkflowData};
use crate::tape::{TapeCalculator, TapeSpot};
use crate::thermal::ThermalWarpModel;

const WARN_STAGE_DISABLED: &str = "stage_disabled";

/// Height span of a mesh, the deviation metric shown per stage.
#[inline]
pub fn stage_deviation(mesh: &Mesh) -> f64 {
    mesh.span()
}

/// Run the full calibration pipeline against the bed's assigned mesh.
///
/// The analyzer, solver and tape calculator are expected to be
/// pre-configured from the same settings record; the belt calculator and
/// thermal model are derived from `settings` here. Settings are assumed
/// to be validated upstream.
pub fn compute_workflow(
    bed: &Bed,
    analyzer: &DeviationAnalyzer,
    solver: &ScrewSolver,
    tape: &TapeCalculator,
    settings: &leveler_config::Settings,
) -> Result<WorkflowData> {
    let flags = settings.workflow;
    let belt = BeltCalculator::from_settings(settings);
    let thermal = ThermalWarpModel::from_settings(settings);

    let mut mesh_state = bed.mesh()?.clone();
    let stats = analyzer.stats(bed)?;
    tracing::debug!(
        mean = stats.mean_height,
        max_deviation = stats.max_deviation,
        critical = stats.has_critical_deviation,
        "workflow started"
    );

    let mut stages = Vec::with_capacity(StageKey::ORDER.len());
    stages.push(compute_initial_stage(&mesh_state));

    let (belt_stage, next) = build_belt_stage(&belt, &mesh_state, flags.enable_belt)?;
    stages.push(belt_stage);
    mesh_state = next;

    let (screw_stage, next) =
        build_screw_stage(analyzer, solver, &mesh_state, flags.enable_screws)?;
    stages.push(screw_stage);
    mesh_state = next;

    let (tape_stage, next) = build_tape_stage(tape, &mesh_state, flags.enable_tape);
    stages.push(tape_stage);
    mesh_state = next;

    let (temperature_stage, _) = build_temperature_stage(&thermal, bed.config(), &mesh_state);
    stages.push(temperature_stage);

    let best = select_best_stage(&stages);
    tracing::debug!(best = %best, "workflow finished");

    Ok(WorkflowData {
        stages,
        best,
        active_thermal_model: settings
            .thermal_model
            .as_ref()
            .and_then(|m| m.name.clone()),
    })
}

/// Best stage: lowest deviation among enabled non-initial stages that
/// produced actions; failing that, lowest deviation among enabled
/// non-initial stages; failing that, the first non-initial stage.
fn select_best_stage(stages: &[StageResult]) -> StageKey {
    let by_deviation =
        |a: &&StageResult, b: &&StageResult| a.deviation.total_cmp(&b.deviation);
    let enabled = stages.iter().skip(1).filter(|s| s.enabled);

    enabled
        .clone()
        .filter(|s| s.has_actions())
        .min_by(by_deviation)
        .or_else(|| enabled.min_by(by_deviation))
        .map_or_else(
            || stages.get(1).map_or(StageKey::Initial, |s| s.key),
            |s| s.key,
        )
}

fn compute_initial_stage(mesh: &Mesh) -> StageResult {
    StageResult {
        key: StageKey::Initial,
        label: "stage.initial".to_owned(),
        description: "stage.initial.details".to_owned(),
        enabled: true,
        deviation: stage_deviation(mesh),
        baseline: None,
        mesh: mesh.clone(),
        actions: Vec::new(),
        warnings: Vec::new(),
        help_key: Some("help.initial".to_owned()),
        thermal: None,
    }
}

fn disabled_stage(
    key: StageKey,
    label: &str,
    description: &str,
    help_key: &str,
    baseline: f64,
    mesh: &Mesh,
) -> StageResult {
    StageResult {
        key,
        label: label.to_owned(),
        description: description.to_owned(),
        enabled: false,
        deviation: baseline,
        baseline: Some(baseline),
        mesh: mesh.clone(),
        actions: Vec::new(),
        warnings: vec![WARN_STAGE_DISABLED.to_owned()],
        help_key: Some(help_key.to_owned()),
        thermal: None,
    }
}

fn belt_action(adjustment: &BeltAdjustment, load: BeltLoadInfo) -> StageAction {
    let mut action = StageAction::new(
        ActionKind::Belt,
        adjustment.target.as_str(),
        adjustment.target.label_key(),
    );
    action.direction = Some(adjustment.direction.as_str().to_owned());
    action.magnitude_mm = Some(adjustment.magnitude_mm);
    action.teeth = Some(adjustment.teeth);
    action
        .with_meta("sign", MetaValue::Num(adjustment.sign))
        .with_meta("gain", MetaValue::Num(adjustment.gain))
        .with_meta("raw_difference", MetaValue::Num(adjustment.raw_difference))
        .with_meta("load_bias", MetaValue::Text(adjustment.load_bias.to_owned()))
        .with_meta("removed_offset", MetaValue::Num(load.removed_offset))
        .with_meta("load_range", MetaValue::Num(load.load_range))
}

fn build_belt_stage(
    belt: &BeltCalculator,
    mesh_before: &Mesh,
    enabled_flag: bool,
) -> Result<(StageResult, Mesh)> {
    let baseline = stage_deviation(mesh_before);

    if !enabled_flag {
        let stage = disabled_stage(
            StageKey::AfterBelts,
            "stage.belts",
            "stage.belts.details",
            "help.belts",
            baseline,
            mesh_before,
        );
        return Ok((stage, mesh_before.clone()));
    }

    let adjustments = belt.calculate(mesh_before);
    let (mesh_after, load) = belt.apply(mesh_before, &adjustments)?;
    let deviation = stage_deviation(&mesh_after);

    let actions: Vec<StageAction> = adjustments.iter().map(|a| belt_action(a, load)).collect();
    let warnings = if actions.is_empty() {
        vec!["belt.no_adjustments".to_owned()]
    } else {
        Vec::new()
    };

    let stage = StageResult {
        key: StageKey::AfterBelts,
        label: "stage.belts".to_owned(),
        description: "stage.belts.details".to_owned(),
        enabled: true,
        deviation,
        baseline: Some(baseline),
        mesh: mesh_after.clone(),
        actions,
        warnings,
        help_key: Some("help.belts".to_owned()),
        thermal: None,
    };
    Ok((stage, mesh_after))
}

fn screw_action(adjustment: &ScrewAdjustment) -> StageAction {
    let mut action = StageAction::new(
        ActionKind::Screw,
        adjustment.corner.as_str(),
        adjustment.corner.label_key(),
    );
    action.direction = Some(adjustment.direction.as_str().to_owned());
    action.minutes = Some(adjustment.minutes);
    action.degrees = Some(adjustment.degrees);
    action.magnitude_mm = Some(adjustment.deviation());
    action
        .with_meta("turns", MetaValue::Num(adjustment.turns))
        .with_meta("priority", MetaValue::Int(i64::from(adjustment.priority)))
}

fn build_screw_stage(
    analyzer: &DeviationAnalyzer,
    solver: &ScrewSolver,
    mesh_before: &Mesh,
    enabled_flag: bool,
) -> Result<(StageResult, Mesh)> {
    let baseline = stage_deviation(mesh_before);

    if !enabled_flag {
        let stage = disabled_stage(
            StageKey::AfterScrews,
            "stage.screws",
            "stage.screws.details",
            "help.screws",
            baseline,
            mesh_before,
        );
        return Ok((stage, mesh_before.clone()));
    }

    let ideal = analyzer.ideal_plane(mesh_before);
    let adjustments = solver.calculate_adjustments(mesh_before, &ideal)?;
    let mesh_after = if adjustments.is_empty() {
        mesh_before.clone()
    } else {
        solver.simulate_sequence(&adjustments, mesh_before)?
    };
    let deviation = stage_deviation(&mesh_after);

    let actions: Vec<StageAction> = adjustments.iter().map(screw_action).collect();
    let warnings = if actions.is_empty() {
        vec!["screw.no_adjustments".to_owned()]
    } else {
        Vec::new()
    };

    let stage = StageResult {
        key: StageKey::AfterScrews,
        label: "stage.screws".to_owned(),
        description: "stage.screws.details".to_owned(),
        enabled: true,
        deviation,
        baseline: Some(baseline),
        mesh: mesh_after.clone(),
        actions,
        warnings,
        help_key: Some("help.screws".to_owned()),
        thermal: None,
    };
    Ok((stage, mesh_after))
}

/// Grid cell designation used on printed bed overlays: 1-based row number
/// plus a column letter ("3C" = row 3, column C).
fn cell_designation(row: usize, col: usize) -> String {
    let letter = char::from(b'A' + (col % 26) as u8);
    format!("{}{}", row + 1, letter)
}

fn tape_action(spot: &TapeSpot, tape_thickness: f64) -> StageAction {
    let position = cell_designation(spot.row, spot.col);
    let mut action = StageAction::new(ActionKind::Tape, position.clone(), position);
    action.magnitude_mm = Some(spot.height_diff);
    action
        .with_meta("layers", MetaValue::Int(i64::from(spot.layers)))
        .with_meta(
            "thickness",
            MetaValue::Num(f64::from(spot.layers) * tape_thickness),
        )
        .with_meta("area_mm2", MetaValue::Num(spot.area_mm2))
        .with_meta("priority", MetaValue::Int(i64::from(spot.priority)))
}

fn build_tape_stage(
    tape: &TapeCalculator,
    mesh_before: &Mesh,
    enabled_flag: bool,
) -> (StageResult, Mesh) {
    let baseline = stage_deviation(mesh_before);

    if !enabled_flag {
        let stage = disabled_stage(
            StageKey::AfterTape,
            "stage.tape",
            "stage.tape.details",
            "help.tape",
            baseline,
            mesh_before,
        );
        return (stage, mesh_before.clone());
    }

    let spots = tape.optimize_layout(&tape.find_low_spots(mesh_before));
    let mesh_after = if spots.is_empty() {
        mesh_before.clone()
    } else {
        tape.apply_spots(mesh_before, &spots)
    };
    let deviation = stage_deviation(&mesh_after);

    let actions: Vec<StageAction> = spots
        .iter()
        .map(|s| tape_action(s, tape.tape_thickness()))
        .collect();
    let warnings = if actions.is_empty() {
        vec!["tape.no_adjustments".to_owned()]
    } else {
        Vec::new()
    };

    let stage = StageResult {
        key: StageKey::AfterTape,
        label: "stage.tape".to_owned(),
        description: "stage.tape.details".to_owned(),
        enabled: true,
        deviation,
        baseline: Some(baseline),
        mesh: mesh_after.clone(),
        actions,
        warnings,
        help_key: Some("help.tape".to_owned()),
        thermal: None,
    };
    (stage, mesh_after)
}

fn build_temperature_stage(
    thermal: &ThermalWarpModel,
    bed_config: &BedConfig,
    mesh_before: &Mesh,
) -> (StageResult, Mesh) {
    let baseline = stage_deviation(mesh_before);
    let (mesh_after, info) = thermal.apply(bed_config, mesh_before);
    let deviation = stage_deviation(&mesh_after);

    // A prediction that does not meaningfully move the deviation is
    // cosmetic; flag the stage disabled with an informational warning.
    let enabled = (deviation - baseline).abs() > 1e-6;
    let warnings = if enabled {
        Vec::new()
    } else {
        vec!["temperature.no_adjustments".to_owned()]
    };

    let stage = StageResult {
        key: StageKey::AfterTemperature,
        label: "stage.temperature".to_owned(),
        description: "stage.temperature.details".to_owned(),
        enabled,
        deviation,
        baseline: Some(baseline),
        mesh: mesh_after.clone(),
        actions: Vec::new(),
        warnings,
        help_key: Some("help.temperature".to_owned()),
        thermal: Some(info),
    };
    (stage, mesh_after)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cell_designation_matches_overlay_convention() {
        assert_eq!(cell_designation(0, 0), "1A");
        assert_eq!(cell_designation(2, 2), "3C");
        assert_eq!(cell_designation(4, 1), "5B");
    }
}
