//! The --json workflow output is a stable machine-readable contract:
//! one JSON object per stage, then one summary object.

use assert_cmd::Command;
use std::io::Write;

const CFG: &str = "\
[besh_profile_default]
points : 0.5, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0
x_count : 5
y_count : 5
";

#[test]
fn every_output_line_is_valid_json_with_stage_fields() {
    let mut file = tempfile::Builder::new()
        .suffix(".cfg")
        .tempfile()
        .expect("temp cfg");
    file.write_all(CFG.as_bytes()).expect("write cfg");

    let output = Command::cargo_bin("leveler_cli")
        .expect("binary")
        .arg("--json")
        .arg("workflow")
        .arg(file.path())
        .output()
        .expect("run");
    assert!(output.status.success());

    let stdout = String::from_utf8(output.stdout).expect("utf8");
    let lines: Vec<&str> = stdout.lines().filter(|l| !l.trim().is_empty()).collect();
    // 5 stages + 1 summary
    assert_eq!(lines.len(), 6, "unexpected line count in:\n{stdout}");

    let expected_keys = [
        "initial",
        "after_belts",
        "after_screws",
        "after_tape",
        "after_temperature",
    ];
    for (line, expected) in lines.iter().zip(expected_keys) {
        let value: serde_json::Value = serde_json::from_str(line).expect("valid JSON line");
        assert_eq!(value["key"], expected);
        assert!(value["deviation"].is_number());
        assert!(value["mesh"]["values"].is_array());
        assert!(value["actions"].is_array());
        assert!(value["enabled"].is_boolean());
    }

    let summary: serde_json::Value =
        serde_json::from_str(lines[5]).expect("valid summary JSON");
    assert!(summary["summary"]["best_stage"].is_string());
    assert!(summary["summary"]["best_deviation"].is_number());
}

#[test]
fn analyze_json_carries_stats_and_forecast() {
    let mut file = tempfile::Builder::new()
        .suffix(".cfg")
        .tempfile()
        .expect("temp cfg");
    file.write_all(CFG.as_bytes()).expect("write cfg");

    let output = Command::cargo_bin("leveler_cli")
        .expect("binary")
        .arg("--json")
        .arg("analyze")
        .arg(file.path())
        .output()
        .expect("run");
    assert!(output.status.success());

    let stdout = String::from_utf8(output.stdout).expect("utf8");
    let value: serde_json::Value = serde_json::from_str(stdout.trim()).expect("valid JSON");
    assert!(value["stats"]["max_deviation"].is_number());
    assert!(value["stats"]["corner_deviations"]["front_left"].is_number());
    assert!(value["leveling_stage"]["can_use_screws"].is_boolean());
    assert!(value["forecast"]["expected_final_deviation"].is_number());
}
