//! Integration tests for the `trainpack recipe` command.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

/// Temp dir with a `src` source tree holding `main.py` and `reqs.txt`.
fn source_tree() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let src = temp_dir.path().join("src");
    fs::create_dir_all(&src).unwrap();
    fs::write(src.join("main.py"), "print('train')\n").unwrap();
    fs::write(src.join("reqs.txt"), "numpy\n").unwrap();
    (temp_dir, src)
}

/// `trainpack` isolated from the user's configuration.
fn trainpack(temp_dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("trainpack").unwrap();
    cmd.current_dir(temp_dir.path())
        .env("HOME", temp_dir.path())
        .env_remove("TRAINPACK_BUILDER")
        .env_remove("TRAINPACK_LOG");
    cmd
}

#[test]
fn test_recipe_prints_dockerfile() {
    let (temp_dir, src) = source_tree();

    trainpack(&temp_dir)
        .arg("recipe")
        .arg("--source-dir")
        .arg(&src)
        .args(["--script", "main.py", "--base-image", "base:1", "-t", "img:v1"])
        .args(["--requirements", "reqs.txt", "--extra-requirement", "torch>=2"])
        .assert()
        .success()
        .stdout(predicate::str::starts_with("FROM base:1\n"))
        .stdout(predicate::str::contains("COPY [\"./\",\"src\"]\n"))
        .stdout(predicate::str::contains("RUN pip install --no-cache-dir -r ./requirements.txt\n"))
        .stdout(predicate::str::contains("RUN pip install --no-cache-dir --upgrade 'torch>=2'\n"))
        .stdout(predicate::str::ends_with("ENTRYPOINT [\"python\",\"src/main.py\"]\n"));
}

#[test]
fn test_recipe_relative_source_dir_and_paths() {
    let (temp_dir, _src) = source_tree();

    trainpack(&temp_dir)
        .args(["recipe", "--source-dir", "src", "--script", "main.py", "--requirements", "reqs.txt"])
        .args(["--base-image", "base:1", "-t", "img:v1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("COPY [\"./\",\"src\"]\n"))
        .stdout(predicate::str::contains("COPY [\"reqs.txt\",\"./requirements.txt\"]\n"))
        .stdout(predicate::str::ends_with("ENTRYPOINT [\"python\",\"src/main.py\"]\n"));
}

#[test]
fn test_recipe_json_output() {
    let (temp_dir, src) = source_tree();

    let output = trainpack(&temp_dir)
        .arg("recipe")
        .arg("--source-dir")
        .arg(&src)
        .args(["--module", "train", "--base-image", "base:1", "-t", "img:v1", "--port", "8080", "--json"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value["argv"][0], "docker");
    assert_eq!(value["argv"][1], "build");
    assert_eq!(value["handle"]["image_name"], "img:v1");
    assert_eq!(value["handle"]["work_dir"], "/usr/app");
    assert!(value["rendered"].as_str().unwrap().contains("EXPOSE 8080\n"));
}

#[test]
fn test_recipe_uses_local_config() {
    let (temp_dir, src) = source_tree();
    fs::write(
        temp_dir.path().join(".trainpack.toml"),
        "base_image = \"python:3.11\"\ninterpreter = \"python3\"\n",
    )
    .unwrap();

    trainpack(&temp_dir)
        .arg("recipe")
        .arg("--source-dir")
        .arg(&src)
        .args(["--module", "train", "-t", "img:v1"])
        .assert()
        .success()
        .stdout(predicate::str::starts_with("FROM python:3.11\n"))
        .stdout(predicate::str::contains("ENTRYPOINT [\"python3\",\"-m\",\"train\"]"));
}

#[test]
fn test_recipe_explicit_config_file() {
    let (temp_dir, src) = source_tree();
    let config = temp_dir.path().join("custom.toml");
    fs::write(&config, "base_image = \"pytorch:2\"\nbuilder = \"podman\"\n").unwrap();

    let output = trainpack(&temp_dir)
        .arg("--config")
        .arg(&config)
        .arg("recipe")
        .arg("--source-dir")
        .arg(&src)
        .args(["--module", "train", "-t", "img:v1", "--json"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value["argv"][0], "podman");
    assert!(value["rendered"].as_str().unwrap().starts_with("FROM pytorch:2\n"));
}

#[test]
fn test_recipe_missing_config_file_fails() {
    let (temp_dir, src) = source_tree();

    trainpack(&temp_dir)
        .args(["--config", "does-not-exist.toml", "recipe"])
        .arg("--source-dir")
        .arg(&src)
        .args(["--module", "train", "--base-image", "base:1", "-t", "img:v1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("does-not-exist.toml"));
}

#[test]
fn test_recipe_rejects_out_of_tree_requirements() {
    let (temp_dir, src) = source_tree();
    let outside = temp_dir.path().join("reqs.txt");
    fs::write(&outside, "numpy\n").unwrap();

    trainpack(&temp_dir)
        .arg("recipe")
        .arg("--source-dir")
        .arg(&src)
        .args(["--module", "train", "--base-image", "base:1", "-t", "img:v1"])
        .arg("--requirements")
        .arg(&outside)
        .assert()
        .failure()
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::contains("manifest_path"));
}

#[test]
fn test_recipe_requires_base_image() {
    let (temp_dir, src) = source_tree();

    trainpack(&temp_dir)
        .arg("recipe")
        .arg("--source-dir")
        .arg(&src)
        .args(["--module", "train", "-t", "img:v1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("base_image"));
}

#[test]
fn test_recipe_requires_entry_point() {
    let (temp_dir, src) = source_tree();

    trainpack(&temp_dir)
        .arg("recipe")
        .arg("--source-dir")
        .arg(&src)
        .args(["--base-image", "base:1", "-t", "img:v1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--script"));
}

#[test]
fn test_recipe_rejects_malformed_env() {
    let (temp_dir, src) = source_tree();

    trainpack(&temp_dir)
        .arg("recipe")
        .arg("--source-dir")
        .arg(&src)
        .args(["--module", "train", "--base-image", "base:1", "-t", "img:v1", "--env", "NOVALUE"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("KEY=VALUE"));
}
