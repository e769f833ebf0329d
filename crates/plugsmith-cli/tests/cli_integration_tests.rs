//! CLI integration tests for plugsmith
//!
//! Tests the plugsmith CLI commands end-to-end using assert_cmd. None of
//! these need a bundler or cargo on PATH.

use assert_cmd::Command;
use predicates::prelude::*;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Command running inside `dir` with an isolated config file
#[allow(deprecated)]
fn plugsmith_cmd(dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("plugsmith").unwrap();
    cmd.current_dir(dir);
    cmd.env("PLUGSMITH_CONFIG", dir.join("config.toml"));
    cmd.env_remove("RUST_LOG");
    cmd
}

/// Hand-made compiled plugin, as the compiler would leave it
fn compiled_plugin(root: &Path, name: &str) -> PathBuf {
    let dir = root.join("dist/plugins").join(name);
    std::fs::create_dir_all(dir.join("assets")).unwrap();
    std::fs::write(
        dir.join("package.json"),
        format!(
            r#"{{"name": "{name}", "version": "1.2.0", "permissions": ["hook:component"]}}"#
        ),
    )
    .unwrap();
    std::fs::write(dir.join("index.js"), "export default { name: 'x' };\n").unwrap();
    std::fs::write(dir.join("assets/icon.svg"), "<svg/>").unwrap();
    std::fs::write(
        dir.join("manifest.json"),
        format!(
            r#"{{"id": "{name}", "name": "{name}", "version": "1.2.0", "entry": "index.js", "permissions": ["hook:component"]}}"#
        ),
    )
    .unwrap();
    dir
}

#[test]
fn test_help_lists_commands() {
    let tmp = TempDir::new().unwrap();
    plugsmith_cmd(tmp.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("build"))
        .stdout(predicate::str::contains("package"))
        .stdout(predicate::str::contains("install"));
}

#[test]
fn test_create_scaffolds_plugin() {
    let tmp = TempDir::new().unwrap();

    plugsmith_cmd(tmp.path())
        .args(["create", "pet-tools", "--backend"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Created plugin pet-tools"));

    let dir = tmp.path().join("plugins/pet-tools");
    assert!(dir.join("package.json").is_file());
    assert!(dir.join("index.ts").is_file());
    assert!(dir.join("backend/Cargo.toml").is_file());
    assert!(dir.join("backend/src/lib.rs").is_file());
}

#[test]
fn test_create_rejects_invalid_name() {
    let tmp = TempDir::new().unwrap();
    plugsmith_cmd(tmp.path())
        .args(["create", "Pet Tools"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid plugin name"));
}

#[test]
fn test_manifest_prints_compiled_entry() {
    let tmp = TempDir::new().unwrap();
    plugsmith_cmd(tmp.path())
        .args(["create", "pet-tools"])
        .assert()
        .success();

    plugsmith_cmd(tmp.path())
        .args(["manifest", "plugins/pet-tools"])
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""id": "pet-tools""#))
        .stdout(predicate::str::contains(r#""entry": "index.js""#));
}

#[test]
fn test_package_verify_install_list() {
    let tmp = TempDir::new().unwrap();
    compiled_plugin(tmp.path(), "pet-tools");

    plugsmith_cmd(tmp.path())
        .args(["package", "dist/plugins/pet-tools"])
        .assert()
        .success()
        .stdout(predicate::str::contains("pet-tools-1.2.0.zip"));

    let archive = tmp.path().join("releases/plugins/pet-tools-1.2.0.zip");
    assert!(archive.is_file());
    assert!(archive.with_extension("json").is_file());

    plugsmith_cmd(tmp.path())
        .args(["verify", "releases/plugins/pet-tools-1.2.0.zip"])
        .assert()
        .success()
        .stdout(predicate::str::contains("[OK] pet-tools 1.2.0"));

    plugsmith_cmd(tmp.path())
        .args(["install", "releases/plugins/pet-tools-1.2.0.zip"])
        .assert()
        .success();
    assert!(tmp.path().join("installed-plugins/pet-tools/index.js").is_file());
    assert!(tmp.path().join("installed-plugins/pet-tools/assets/icon.svg").is_file());

    plugsmith_cmd(tmp.path())
        .args(["install", "releases/plugins/pet-tools-1.2.0.zip"])
        .assert()
        .failure();

    plugsmith_cmd(tmp.path())
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("pet-tools 1.2.0"));
}

#[test]
fn test_verify_detects_tampering() {
    let tmp = TempDir::new().unwrap();
    compiled_plugin(tmp.path(), "pet-tools");
    plugsmith_cmd(tmp.path())
        .args(["package", "dist/plugins/pet-tools", "--out-dir", "out"])
        .assert()
        .success();

    let archive = tmp.path().join("out/pet-tools-1.2.0.zip");
    let mut bytes = std::fs::read(&archive).unwrap();
    bytes.extend_from_slice(b"tampered");
    std::fs::write(&archive, bytes).unwrap();

    plugsmith_cmd(tmp.path())
        .args(["verify", "out/pet-tools-1.2.0.zip"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Checksum mismatch"));
}

#[test]
fn test_package_without_entry_fails() {
    let tmp = TempDir::new().unwrap();
    let dir = compiled_plugin(tmp.path(), "pet-tools");
    std::fs::remove_file(dir.join("index.js")).unwrap();

    plugsmith_cmd(tmp.path())
        .args(["package", "dist/plugins/pet-tools"])
        .assert()
        .failure();
    assert!(!tmp.path().join("releases/plugins/pet-tools-1.2.0.zip").exists());
}

#[test]
fn test_validate_compiled_plugin() {
    let tmp = TempDir::new().unwrap();
    let dir = compiled_plugin(tmp.path(), "pet-tools");

    plugsmith_cmd(tmp.path())
        .args(["validate", "dist/plugins/pet-tools"])
        .assert()
        .success()
        .stdout(predicate::str::contains("is valid"));

    std::fs::write(dir.join("index.js"), "import _ from 'lodash';\n").unwrap();
    plugsmith_cmd(tmp.path())
        .args(["validate", "dist/plugins/pet-tools"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("lodash"));
}

#[test]
fn test_build_reports_failures_and_exits_nonzero() {
    let tmp = TempDir::new().unwrap();
    let dir = tmp.path().join("plugins/no-entry");
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(
        dir.join("package.json"),
        r#"{"name": "no-entry", "version": "1.0.0"}"#,
    )
    .unwrap();

    plugsmith_cmd(tmp.path())
        .arg("build")
        .assert()
        .failure()
        .stdout(predicate::str::contains("[!!] no-entry"))
        .stderr(predicate::str::contains("1 of 1 plugins failed"));
}

#[test]
fn test_build_missing_plugins_dir() {
    let tmp = TempDir::new().unwrap();
    plugsmith_cmd(tmp.path()).arg("build").assert().failure();
}

#[test]
fn test_watch_unknown_plugin_fails() {
    let tmp = TempDir::new().unwrap();
    std::fs::create_dir_all(tmp.path().join("plugins")).unwrap();
    plugsmith_cmd(tmp.path())
        .args(["watch", "ghost"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("ghost"));
}

#[test]
fn test_manifest_entry_points_at_bundle_for_nested_main() {
    let tmp = TempDir::new().unwrap();
    let dir = tmp.path().join("plugins/nested");
    std::fs::create_dir_all(dir.join("src")).unwrap();
    std::fs::write(
        dir.join("package.json"),
        r#"{"name": "nested", "version": "1.0.0", "main": "src/index.ts"}"#,
    )
    .unwrap();
    std::fs::write(dir.join("src/index.ts"), "export default {}").unwrap();

    plugsmith_cmd(tmp.path())
        .args(["manifest", "plugins/nested"])
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""entry": "index.js""#));
}

#[test]
fn test_config_set_get_list() {
    let tmp = TempDir::new().unwrap();

    plugsmith_cmd(tmp.path())
        .args(["config", "set", "runtime.base_port", "14000"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Set runtime.base_port = 14000"));
    assert!(tmp.path().join("config.toml").is_file());

    plugsmith_cmd(tmp.path())
        .args(["config", "get", "runtime.base_port"])
        .assert()
        .success()
        .stdout(predicate::str::diff("14000\n"));

    plugsmith_cmd(tmp.path())
        .args(["config", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("build.bundler = esbuild"));

    plugsmith_cmd(tmp.path())
        .args(["config", "set", "runtime.base_port", "0"])
        .assert()
        .failure();

    plugsmith_cmd(tmp.path())
        .args(["config", "get", "nope.nothing"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown configuration key"));
}

#[test]
fn test_config_path_honors_env() {
    let tmp = TempDir::new().unwrap();
    plugsmith_cmd(tmp.path())
        .args(["config", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains("config.toml"));
}

#[test]
fn test_probe_without_backend_fails() {
    let tmp = TempDir::new().unwrap();
    compiled_plugin(tmp.path(), "pet-tools");
    plugsmith_cmd(tmp.path())
        .args(["probe", "dist/plugins/pet-tools"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("No backend could be started"));
}
