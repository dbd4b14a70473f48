use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use std::fs;
use std::io::Write;
use std::path::PathBuf;

fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

#[test]
fn canonical_output_reproduces_fixture() {
    let fixture = fixture_path("pyramid.md5mesh");
    let expected = fs::read_to_string(&fixture).unwrap();

    let mut cmd = cargo_bin_cmd!("md5");
    cmd.arg(&fixture);
    cmd.assert().success().stdout(expected);
}

#[test]
fn summary_for_anim() {
    let mut cmd = cargo_bin_cmd!("md5");
    cmd.arg(fixture_path("pyramid.md5anim"))
        .arg("--format")
        .arg("summary");

    let output_pred = predicate::str::contains("md5anim version 10")
        .and(predicate::str::contains("frames: 3"))
        .and(predicate::str::contains("animated components: 6"));
    cmd.assert().success().stdout(output_pred);
}

#[test]
fn positions_for_mesh() {
    let mut cmd = cargo_bin_cmd!("md5");
    cmd.arg(fixture_path("pyramid.md5mesh")).arg("-f").arg("positions");

    let output_pred = predicate::str::contains("mesh 0 (pyramid)\n\t0 ( -1 -1 0 )\n")
        .and(predicate::str::contains("\t2 ( 0 0 10 )\n"))
        .and(predicate::str::contains("mesh 1 (eye)"));
    cmd.assert().success().stdout(output_pred);
}

#[test]
fn json_output_parses() {
    let output = cargo_bin_cmd!("md5")
        .arg(fixture_path("pyramid.md5mesh"))
        .arg("--format")
        .arg("json")
        .output()
        .unwrap();
    assert!(output.status.success());
    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value["meshes"].as_array().map(Vec::len), Some(2));
}

#[test]
fn list_formats() {
    let mut cmd = cargo_bin_cmd!("md5");
    cmd.arg("--list-formats");
    cmd.assert().success().stdout(
        predicate::str::contains("canonical (md5mesh, md5anim)")
            .and(predicate::str::contains("pose (md5anim)")),
    );
}

#[test]
fn unknown_format_fails() {
    let mut cmd = cargo_bin_cmd!("md5");
    cmd.arg(fixture_path("pyramid.md5mesh")).arg("-f").arg("xml");
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("Invalid format: xml"));
}

#[test]
fn pose_on_mesh_fails() {
    let mut cmd = cargo_bin_cmd!("md5");
    cmd.arg(fixture_path("pyramid.md5mesh")).arg("-f").arg("pose");
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("does not apply to md5mesh"));
}

#[test]
fn count_mismatch_is_reported() {
    let source = fs::read_to_string(fixture_path("pyramid.md5mesh"))
        .unwrap()
        .replace("numtris 4", "numtris 9");
    let mut file = tempfile::Builder::new()
        .suffix(".md5mesh")
        .tempfile()
        .unwrap();
    file.write_all(source.as_bytes()).unwrap();

    let mut cmd = cargo_bin_cmd!("md5");
    cmd.arg(file.path());
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("numtris (tri records) declared 9 but 4 found"));
}

#[test]
fn kind_is_detected_without_extension() {
    let source = fs::read_to_string(fixture_path("pyramid.md5anim")).unwrap();
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(source.as_bytes()).unwrap();

    let mut cmd = cargo_bin_cmd!("md5");
    cmd.arg(file.path()).arg("-f").arg("summary");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("md5anim version 10"));
}

#[test]
fn config_file_sets_default_format_and_checks() {
    let source = fs::read_to_string(fixture_path("pyramid.md5mesh"))
        .unwrap()
        .replace("weight 4 1 1", "weight 4 9 1");
    let mut mesh = tempfile::Builder::new()
        .suffix(".md5mesh")
        .tempfile()
        .unwrap();
    mesh.write_all(source.as_bytes()).unwrap();

    let mut config = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    writeln!(
        config,
        "[validation]\ncheck_references = false\n\n[output]\nformat = \"summary\""
    )
    .unwrap();

    cargo_bin_cmd!("md5")
        .arg(mesh.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("weight joint of record 4 is 9"));

    cargo_bin_cmd!("md5")
        .arg(mesh.path())
        .arg("--config")
        .arg(config.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("meshes: 2"));
}

#[test]
fn permissive_flag_skips_reference_checks() {
    let source = fs::read_to_string(fixture_path("pyramid.md5mesh"))
        .unwrap()
        .replace("\"body\"\t0", "\"body\"\t2");
    let mut file = tempfile::Builder::new()
        .suffix(".md5mesh")
        .tempfile()
        .unwrap();
    file.write_all(source.as_bytes()).unwrap();

    let mut cmd = cargo_bin_cmd!("md5");
    cmd.arg(file.path()).arg("--permissive");
    cmd.assert().success();
}

#[test]
fn missing_file_fails() {
    let mut cmd = cargo_bin_cmd!("md5");
    cmd.arg("does-not-exist.md5mesh");
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("File not found"));
}

#[test]
fn environment_selects_output_format() {
    let mut cmd = cargo_bin_cmd!("md5");
    cmd.arg(fixture_path("pyramid.md5mesh"))
        .env("MD5_OUTPUT__FORMAT", "summary");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("md5mesh version 10"));
}
