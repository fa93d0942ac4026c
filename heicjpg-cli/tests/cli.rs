use std::fs;

use assert_cmd::Command;

fn heicjpg(home: &std::path::Path) -> Command {
    let mut cmd = Command::cargo_bin("heicjpg").unwrap();
    // keep saved settings of the machine out of the run
    cmd.env("HOME", home).env_remove("RUST_LOG");
    cmd
}

#[test]
fn empty_source_directory_succeeds() {
    let home = tempfile::tempdir().unwrap();
    let source = tempfile::tempdir().unwrap();
    let out = source.path().join("out");

    heicjpg(home.path())
        .arg(source.path())
        .arg(&out)
        .arg("--quiet")
        .assert()
        .success();

    assert!(out.is_dir());
}

#[test]
fn missing_source_directory_fails() {
    let home = tempfile::tempdir().unwrap();
    let dir = tempfile::tempdir().unwrap();

    heicjpg(home.path())
        .arg(dir.path().join("missing"))
        .arg(dir.path().join("out"))
        .assert()
        .failure();

    assert!(!dir.path().join("out").exists());
}

#[test]
fn corrupt_input_gives_failure_status() {
    let home = tempfile::tempdir().unwrap();
    let source = tempfile::tempdir().unwrap();
    fs::write(source.path().join("broken.heic"), b"not an image").unwrap();
    let out = source.path().join("out");

    let output = heicjpg(home.path())
        .arg(source.path())
        .arg(&out)
        .assert()
        .failure()
        .get_output()
        .clone();

    assert!(!out.join("broken.jpg").exists());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert_eq!(stderr.matches("broken.heic").count(), 1, "{stderr}");
    assert!(stderr.contains("0 converted, 1 failed"), "{stderr}");
}

#[test]
fn invalid_quality_range_is_rejected() {
    let home = tempfile::tempdir().unwrap();
    let source = tempfile::tempdir().unwrap();

    heicjpg(home.path())
        .arg(source.path())
        .arg(source.path().join("out"))
        .args(["--min-quality", "90", "--start-quality", "50"])
        .assert()
        .failure();
}

#[test]
fn saved_settings_are_written_under_home() {
    let home = tempfile::tempdir().unwrap();
    let source = tempfile::tempdir().unwrap();

    heicjpg(home.path())
        .arg(source.path())
        .arg(source.path().join("out"))
        .args(["--max-side", "1024", "--save-config", "--quiet"])
        .assert()
        .success();

    let saved = fs::read_to_string(home.path().join(".config/heicjpg/config.json")).unwrap();
    assert!(saved.contains("\"max_side\": 1024"));
}
