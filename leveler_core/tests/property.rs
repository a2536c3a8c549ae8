use leveler_config::Settings;
use leveler_core::solver::CornerWeights;
use leveler_core::{
    Bed, BedConfig, BeltCalculator, Corner, DeviationAnalyzer, Mesh, ScrewSolver, StageKey,
    TapeCalculator, compute_workflow,
};
use proptest::prelude::*;

fn mesh_values() -> impl Strategy<Value = Vec<f64>> {
    // Realistic probed deviations: within +/-1mm.
    prop::collection::vec(-1.0f64..1.0, 25)
}

fn run_workflow(values: Vec<f64>, settings: &Settings) -> leveler_core::WorkflowData {
    let mut bed = Bed::new(BedConfig::default()).unwrap();
    bed.set_mesh(Mesh::from_values(5, 5, values).unwrap()).unwrap();
    let analyzer = DeviationAnalyzer::from_settings(settings);
    let solver = ScrewSolver::from_settings(settings);
    let tape = TapeCalculator::from_settings(settings);
    compute_workflow(&bed, &analyzer, &solver, &tape, settings).unwrap()
}

proptest! {
    #[test]
    fn corner_weights_sum_to_one_for_any_grid(rows in 2usize..16, cols in 2usize..16) {
        let weights = CornerWeights::build(rows, cols);
        for r in 0..rows {
            for c in 0..cols {
                let total: f64 = Corner::ALL.iter().map(|&k| weights.map(k).get(r, c)).sum();
                prop_assert!((total - 1.0).abs() < 1e-9, "sum {} at ({},{})", total, r, c);
            }
        }
    }

    #[test]
    fn belt_stage_never_shifts_the_mean(values in mesh_values()) {
        let base = Mesh::from_values(5, 5, values).unwrap();
        let calc = BeltCalculator::new(0.19, 0.4);
        let adjustments = calc.calculate(&base);
        let (after, _) = calc.apply(&base, &adjustments).unwrap();
        prop_assert!((after.mean() - base.mean()).abs() < 1e-9);
    }

    #[test]
    fn tape_layers_match_the_ceiling_formula(
        deficit in 0.011f64..1.0,
        thickness in 0.01f64..0.2,
    ) {
        let calc = TapeCalculator::new(BedConfig::default(), thickness, 0.01);
        let mut values = vec![0.0; 25];
        values[2 * 5 + 2] = -deficit * 25.0 / 24.0; // keeps mean - cell == deficit
        let mesh = Mesh::from_values(5, 5, values).unwrap();
        let spots = calc.find_low_spots(&mesh);
        prop_assert_eq!(spots.len(), 1);
        let spot = &spots[0];
        let expected = ((spot.height_diff / thickness).ceil() as u32).max(1);
        prop_assert_eq!(spot.layers, expected);
        prop_assert!(spot.layers >= 1);
    }

    #[test]
    fn doubling_a_deficit_never_reduces_layers(
        deficit in 0.02f64..0.5,
        thickness in 0.01f64..0.2,
    ) {
        let calc = TapeCalculator::new(BedConfig::default(), thickness, 0.01);
        let layers = |d: f64| {
            let mut values = vec![0.0; 25];
            values[2 * 5 + 2] = -d * 25.0 / 24.0;
            let mesh = Mesh::from_values(5, 5, values).unwrap();
            calc.find_low_spots(&mesh)[0].layers
        };
        prop_assert!(layers(2.0 * deficit) >= layers(deficit));
    }

    #[test]
    fn workflow_is_idempotent(values in mesh_values()) {
        let settings = Settings::default();
        let first = run_workflow(values.clone(), &settings);
        let second = run_workflow(values, &settings);
        prop_assert_eq!(first, second);
    }

    #[test]
    fn disabled_stages_pass_the_mesh_through_bitwise(values in mesh_values()) {
        let mut settings = Settings::default();
        settings.workflow.enable_belt = false;
        settings.workflow.enable_screws = false;
        settings.workflow.enable_tape = false;

        let data = run_workflow(values, &settings);
        let initial = data.stage(StageKey::Initial).unwrap();
        for key in [StageKey::AfterBelts, StageKey::AfterScrews, StageKey::AfterTape] {
            let stage = data.stage(key).unwrap();
            prop_assert!(!stage.enabled);
            prop_assert!(stage.mesh.bitwise_eq(&initial.mesh));
            prop_assert!(stage.actions.is_empty());
        }
    }

    #[test]
    fn original_mesh_survives_any_workflow(values in mesh_values()) {
        let mut bed = Bed::new(BedConfig::default()).unwrap();
        bed.set_mesh(Mesh::from_values(5, 5, values).unwrap()).unwrap();
        let snapshot = bed.mesh().unwrap().clone();

        let settings = Settings::default();
        let analyzer = DeviationAnalyzer::from_settings(&settings);
        let solver = ScrewSolver::from_settings(&settings);
        let tape = TapeCalculator::from_settings(&settings);
        let _ = compute_workflow(&bed, &analyzer, &solver, &tape, &settings).unwrap();

        prop_assert!(bed.mesh().unwrap().bitwise_eq(&snapshot));
    }
}
