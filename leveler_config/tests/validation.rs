use leveler_config::load_toml;
use rstest::rstest;

#[test]
fn empty_document_yields_usable_defaults() {
    let settings = load_toml("").expect("parse empty TOML");
    settings.validate().expect("defaults are valid");
    assert_eq!(settings.hardware.screw_pitch, 0.7);
    assert_eq!(settings.thresholds.screw_threshold, 0.19);
    assert_eq!(settings.thresholds.tape_threshold, 0.01);
    assert!(settings.workflow.enable_belt);
    assert!(settings.workflow.enable_screws);
    assert!(settings.workflow.enable_tape);
    assert!(settings.thermal_model.is_none());
}

#[test]
fn belt_threshold_falls_back_to_screw_threshold() {
    let settings = load_toml("[thresholds]\nscrew_threshold = 0.25\n").expect("parse");
    assert_eq!(settings.thresholds.belt(), 0.25);

    let settings =
        load_toml("[thresholds]\nscrew_threshold = 0.25\nbelt_threshold = 0.1\n").expect("parse");
    assert_eq!(settings.thresholds.belt(), 0.1);
}

#[test]
fn rejects_zero_screw_pitch() {
    let settings = load_toml("[hardware]\nscrew_pitch = 0.0\n").expect("parse");
    let err = settings.validate().expect_err("should reject pitch=0");
    assert!(format!("{err}").contains("hardware.screw_pitch must be > 0"));
}

#[rstest]
#[case("[hardware]\ntape_thickness = 0.0\n", "tape_thickness")]
#[case("[hardware]\nbelt_tooth_mm = -0.4\n", "belt_tooth_mm")]
#[case("[hardware]\nmin_adjustment = 3.0\n", "min_adjustment")]
#[case("[hardware]\ncorner_averaging = 9\n", "corner_averaging")]
#[case("[bed]\nmesh_points_x = 1\n", "mesh_points")]
#[case("[thresholds]\nscrew_threshold = -0.1\n", "screw_threshold")]
fn rejects_invalid_numeric_fields(#[case] toml: &str, #[case] needle: &str) {
    let settings = load_toml(toml).expect("parse");
    let err = settings.validate().expect_err("should reject");
    assert!(
        format!("{err}").contains(needle),
        "error {err} does not mention {needle}"
    );
}

#[test]
fn thermal_model_requires_positive_thicknesses() {
    let settings = load_toml("[thermal_model]\npei_thickness = 0.0\n").expect("parse");
    let err = settings.validate().expect_err("should reject");
    assert!(format!("{err}").contains("pei_thickness"));
}

#[test]
fn full_document_round_trips_every_group() {
    let toml = r#"
[bed]
size_x = 256.0
size_y = 256.0
mesh_points_x = 7
mesh_points_y = 7

[hardware]
screw_thread = "M3"
screw_pitch = 0.5
min_adjustment = 0.05
max_adjustment = 3.0
tape_thickness = 0.05
belt_tooth_mm = 0.5
corner_averaging = 2

[thresholds]
belt_threshold = 0.15
screw_threshold = 0.2
tape_threshold = 0.02

[workflow]
enable_belt = false
enable_screws = true
enable_tape = true

[environment]
measurement_temp = 22.0
target_temp = 60.0
thermal_expansion_coeff = 1.2e-5

[thermal_model]
name = "pei-on-steel"
chamber_factor = 0.4
pei_thickness = 0.55
steel_thickness = 1.5
alpha_pei = 5.6e-5
alpha_steel = 1.2e-5
beta_uniform = 0.2
"#;
    let settings = load_toml(toml).expect("parse full document");
    settings.validate().expect("valid");
    assert_eq!(settings.bed.mesh_points_x, 7);
    assert_eq!(settings.hardware.screw_thread, "M3");
    assert!(!settings.workflow.enable_belt);
    assert_eq!(settings.environment.target_temp(), 60.0);
    let model = settings.thermal_model.expect("model present");
    assert_eq!(model.name.as_deref(), Some("pei-on-steel"));
    assert_eq!(model.chamber_factor, 0.4);
}
