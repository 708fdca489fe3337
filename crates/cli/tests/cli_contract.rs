use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};

const LEGACY: &str = r#"{
    "strokes": [
        {"points": [[10, 10], [200, 40], [300, 300]], "color": -16777216, "strokeWidth": 6, "isEraser": false}
    ],
    "texts": [
        {"text": "hello", "x": 40, "y": 500, "color": -65536, "textSize": 32}
    ],
    "gridType": "SQUARE"
}"#;

const PAGED: &str = r#"{
    "version": 2,
    "pages": [
        {"strokes": [], "texts": [], "gridType": "DOT"},
        {"strokes": [{"points": [[5, 5], [50, 50]]}], "texts": [], "gridType": "RULED"}
    ]
}"#;

fn write_fixture(dir: &Path, name: &str, contents: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, contents).expect("fixture should be written");
    path
}

fn info_json(path: &Path) -> Value {
    let output = cargo_bin_cmd!("inkleaf-cli")
        .arg("info")
        .arg(path)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    serde_json::from_slice(&output).expect("stdout should contain valid json")
}

#[test]
fn info_summarizes_legacy_document() {
    let temp = tempfile::tempdir().unwrap();
    let file = write_fixture(temp.path(), "legacy.json", LEGACY);

    let value = info_json(&file);
    assert_eq!(value["format"], "legacy");
    assert_eq!(value["page_count"], 1);
    assert_eq!(value["pages"][0]["grid"], "SQUARE");
    assert_eq!(value["pages"][0]["strokes"], 1);
    assert_eq!(value["pages"][0]["texts"], 1);
}

#[test]
fn info_summarizes_paged_document() {
    let temp = tempfile::tempdir().unwrap();
    let file = write_fixture(temp.path(), "paged.json", PAGED);

    let value = info_json(&file);
    assert_eq!(value["format"], "paged");
    assert_eq!(value["version"], 2);
    assert_eq!(value["page_count"], 2);
    assert_eq!(value["pages"][1]["grid"], "RULED");
    assert_eq!(value["pages"][1]["strokes"], 1);
}

#[test]
fn migrate_rewrites_legacy_as_paged() {
    let temp = tempfile::tempdir().unwrap();
    let file = write_fixture(temp.path(), "legacy.json", LEGACY);
    let output = temp.path().join("out/migrated.json");

    cargo_bin_cmd!("inkleaf-cli")
        .arg("migrate")
        .arg(&file)
        .arg("--output")
        .arg(&output)
        .assert()
        .success()
        .stdout(predicate::str::contains("migrated.json"));

    let migrated: Value = serde_json::from_slice(&fs::read(&output).unwrap()).unwrap();
    assert_eq!(migrated["version"], 2);
    assert_eq!(migrated["pages"].as_array().map(Vec::len), Some(1));
    assert_eq!(migrated["pages"][0]["gridType"], "SQUARE");
    assert!(migrated.get("strokes").is_none());

    let value = info_json(&output);
    assert_eq!(value["format"], "paged");
    assert_eq!(value["pages"][0]["texts"], 1);
}

#[test]
fn migrate_defaults_to_replacing_input() {
    let temp = tempfile::tempdir().unwrap();
    let file = write_fixture(temp.path(), "legacy.json", LEGACY);

    cargo_bin_cmd!("inkleaf-cli")
        .arg("migrate")
        .arg(&file)
        .assert()
        .success();

    assert_eq!(info_json(&file)["format"], "paged");
}

#[test]
fn render_writes_png_file() {
    let temp = tempfile::tempdir().unwrap();
    let file = write_fixture(temp.path(), "legacy.json", LEGACY);
    let output = temp.path().join("page.png");

    cargo_bin_cmd!("inkleaf-cli")
        .arg("render")
        .arg(&file)
        .arg("--width")
        .arg("320")
        .arg("--height")
        .arg("400")
        .arg("--output")
        .arg(&output)
        .assert()
        .success();

    let image = image::open(&output).expect("render output should be a readable image");
    assert_eq!((image.width(), image.height()), (320, 400));
}

#[test]
fn render_rejects_page_out_of_range() {
    let temp = tempfile::tempdir().unwrap();
    let file = write_fixture(temp.path(), "paged.json", PAGED);

    cargo_bin_cmd!("inkleaf-cli")
        .arg("render")
        .arg(&file)
        .arg("--page")
        .arg("3")
        .arg("--output")
        .arg(temp.path().join("page.png"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("out of range"));
}

#[test]
fn info_fails_for_missing_file() {
    let temp = tempfile::tempdir().unwrap();

    cargo_bin_cmd!("inkleaf-cli")
        .arg("info")
        .arg(temp.path().join("missing.json"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("file does not exist"));
}

#[test]
fn info_fails_for_malformed_document() {
    let temp = tempfile::tempdir().unwrap();
    let file = write_fixture(temp.path(), "broken.json", "{\"pages\": [");

    cargo_bin_cmd!("inkleaf-cli")
        .arg("info")
        .arg(&file)
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to decode"));
}

#[test]
fn version_prints_package_version() {
    cargo_bin_cmd!("inkleaf-cli")
        .arg("version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}
