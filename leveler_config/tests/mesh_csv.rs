use leveler_config::load_mesh_csv;
use std::io::Write;

fn write_csv(content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new()
        .prefix("mesh")
        .suffix(".csv")
        .tempfile()
        .expect("temp csv");
    file.write_all(content.as_bytes()).expect("write csv");
    file
}

#[test]
fn loads_a_rectangular_grid() {
    let file = write_csv("0.1,0.2,0.3\n0.0,-0.1,0.0\n");
    let profile = load_mesh_csv(file.path()).expect("load");
    assert_eq!((profile.x_count, profile.y_count), (3, 2));
    assert_eq!(profile.points, vec![0.1, 0.2, 0.3, 0.0, -0.1, 0.0]);
    assert!((profile.range_value() - 0.4).abs() < 1e-12);
}

#[test]
fn profile_name_comes_from_the_file_stem() {
    let file = write_csv("0.0,0.0\n0.0,0.0\n");
    let profile = load_mesh_csv(file.path()).expect("load");
    assert!(profile.name.starts_with("mesh"));
}

#[test]
fn rejects_ragged_rows() {
    let file = write_csv("0.1,0.2,0.3\n0.0,-0.1\n");
    let err = load_mesh_csv(file.path()).expect_err("ragged must fail");
    let msg = format!("{err}").to_lowercase();
    assert!(msg.contains("row") || msg.contains("length"), "got: {msg}");
}

#[test]
fn rejects_non_numeric_values() {
    let file = write_csv("0.1,abc\n0.0,0.0\n");
    assert!(load_mesh_csv(file.path()).is_err());
}

#[test]
fn rejects_empty_files() {
    let file = write_csv("");
    assert!(load_mesh_csv(file.path()).is_err());
}
