use leveler_config::Settings;
use leveler_core::{
    ActionKind, Bed, BedConfig, DeviationAnalyzer, Mesh, ScrewSolver, StageKey, TapeCalculator,
    compute_workflow,
};

fn settings() -> Settings {
    let mut settings = Settings::default();
    settings.hardware.min_adjustment = 0.02;
    settings.hardware.max_adjustment = 4.0;
    settings.hardware.corner_averaging = 0;
    settings
}

fn bed_with(values: Vec<f64>) -> Bed {
    let mut bed = Bed::new(BedConfig::default()).expect("default bed");
    bed.set_mesh(Mesh::from_values(5, 5, values).expect("5x5 mesh"))
        .expect("matching shape");
    bed
}

fn run(bed: &Bed, settings: &Settings) -> leveler_core::WorkflowData {
    let analyzer = DeviationAnalyzer::from_settings(settings);
    let solver = ScrewSolver::from_settings(settings);
    let tape = TapeCalculator::from_settings(settings);
    compute_workflow(bed, &analyzer, &solver, &tape, settings).expect("workflow")
}

fn high_corner_values() -> Vec<f64> {
    let mut values = vec![0.0; 25];
    values[0] = 0.5;
    values
}

#[test]
fn produces_all_five_stages_in_order() {
    let data = run(&bed_with(high_corner_values()), &settings());
    let keys: Vec<StageKey> = data.stages.iter().map(|s| s.key).collect();
    assert_eq!(keys, StageKey::ORDER);
}

#[test]
fn recompute_with_same_inputs_is_bit_identical() {
    let bed = bed_with(high_corner_values());
    let settings = settings();
    let first = run(&bed, &settings);
    let second = run(&bed, &settings);
    assert_eq!(first, second);
}

#[test]
fn input_mesh_is_never_mutated() {
    let bed = bed_with(high_corner_values());
    let snapshot = bed.mesh().unwrap().clone();
    let _ = run(&bed, &settings());
    assert!(bed.mesh().unwrap().bitwise_eq(&snapshot));
}

#[test]
fn screw_stage_lowers_a_high_front_left_corner() {
    // With belts out of the way, a 0.5mm-high front_left corner must be
    // the most urgent screw action (lowering, sorted first) and the
    // simulated stage must reduce the span.
    let mut settings = settings();
    settings.workflow.enable_belt = false;

    let data = run(&bed_with(high_corner_values()), &settings);
    let screws = data.stage(StageKey::AfterScrews).expect("screw stage");
    assert!(screws.enabled);
    assert!(screws.has_actions());

    let action = &screws.actions[0];
    assert_eq!(action.kind, ActionKind::Screw);
    assert_eq!(action.identifier, "front_left");
    assert_eq!(action.direction.as_deref(), Some("clockwise"));
    assert!(action.minutes.unwrap() > 0.0);

    let baseline = screws.baseline.unwrap();
    assert!((baseline - 0.5).abs() < 1e-9);
    assert!(screws.deviation < baseline);
}

#[test]
fn belt_stage_preserves_the_mesh_mean() {
    let mut values = vec![0.0; 25];
    values[0] = -0.9; // front_left low: triggers a belt action
    let bed = bed_with(values);
    let data = run(&bed, &settings());

    let initial = data.stage(StageKey::Initial).unwrap();
    let belts = data.stage(StageKey::AfterBelts).unwrap();
    assert!(belts.has_actions());
    assert!((belts.mesh.mean() - initial.mesh.mean()).abs() < 1e-9);
}

#[test]
fn disabled_screw_stage_passes_mesh_through_exactly() {
    let mut settings = settings();
    settings.workflow.enable_screws = false;

    let data = run(&bed_with(high_corner_values()), &settings);
    let belts = data.stage(StageKey::AfterBelts).unwrap();
    let screws = data.stage(StageKey::AfterScrews).unwrap();

    assert!(!screws.enabled);
    assert!(screws.actions.is_empty());
    assert!(screws.mesh.bitwise_eq(&belts.mesh));
    assert_eq!(screws.deviation, screws.baseline.unwrap());
    assert!(screws.warnings.iter().any(|w| w == "stage_disabled"));

    // Downstream stages still ran.
    assert!(data.stage(StageKey::AfterTape).unwrap().enabled);
}

#[test]
fn disabling_a_stage_never_blocks_downstream_tape() {
    // A mid-bed dip that only tape can fix, with screws disabled.
    let mut values = vec![0.0; 25];
    values[2 * 5 + 2] = -0.3;
    let mut settings = settings();
    settings.workflow.enable_screws = false;

    let data = run(&bed_with(values), &settings);
    let tape = data.stage(StageKey::AfterTape).unwrap();
    assert!(tape.has_actions());
    assert!(tape.actions.iter().all(|a| a.kind == ActionKind::Tape));
}

#[test]
fn best_stage_is_enabled_non_initial_and_improves_on_initial() {
    let data = run(&bed_with(high_corner_values()), &settings());
    let best = data.best_stage();
    assert_ne!(best.key, StageKey::Initial);
    assert!(best.enabled);
    let initial = data.stage(StageKey::Initial).unwrap();
    assert!(best.deviation <= initial.deviation);
}

#[test]
fn flat_bed_yields_no_actions_and_informational_warnings() {
    let data = run(&bed_with(vec![0.0; 25]), &settings());
    for key in [StageKey::AfterBelts, StageKey::AfterScrews, StageKey::AfterTape] {
        let stage = data.stage(key).unwrap();
        assert!(stage.enabled);
        assert!(stage.actions.is_empty());
        assert_eq!(stage.warnings.len(), 1);
    }
    // No thermal delta configured: the temperature stage is cosmetic.
    let temp = data.stage(StageKey::AfterTemperature).unwrap();
    assert!(!temp.enabled);
    assert!(temp.warnings.iter().any(|w| w == "temperature.no_adjustments"));
}

#[test]
fn thermal_stage_enables_with_a_configured_model() {
    let mut settings = settings();
    settings.environment.target_temp = Some(60.0);
    settings.thermal_model = Some(leveler_config::ThermalModelCfg {
        name: Some("pei-on-steel".to_owned()),
        chamber_factor: 0.5,
        alpha_pei: Some(5.6e-5),
        alpha_steel: Some(1.2e-5),
        ..leveler_config::ThermalModelCfg::default()
    });

    let data = run(&bed_with(high_corner_values()), &settings);
    let temp = data.stage(StageKey::AfterTemperature).unwrap();
    assert!(temp.enabled);
    let breakdown = temp.thermal.as_ref().expect("thermal breakdown");
    assert!(breakdown.kappa_bimetal != 0.0);
    assert!(breakdown.warp_range > 0.0);
    assert_eq!(data.active_thermal_model.as_deref(), Some("pei-on-steel"));
}

#[test]
fn workflow_fails_fast_without_mesh_data() {
    let bed = Bed::new(BedConfig::default()).unwrap();
    let settings = settings();
    let analyzer = DeviationAnalyzer::from_settings(&settings);
    let solver = ScrewSolver::from_settings(&settings);
    let tape = TapeCalculator::from_settings(&settings);
    let err = compute_workflow(&bed, &analyzer, &solver, &tape, &settings).unwrap_err();
    assert!(format!("{err}").contains("has not been assigned"));
}

#[test]
fn stage_results_serialize_for_display() {
    let data = run(&bed_with(high_corner_values()), &settings());
    let json = serde_json::to_string(&data).expect("serializable");
    assert!(json.contains("\"after_screws\""));
    assert!(json.contains("\"best\""));
}
