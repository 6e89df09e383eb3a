use assert_cmd::prelude::*;
use assert_fs::prelude::*;
use predicates::prelude::*;
use std::process::Command;

#[test]
fn init_writes_default_config_once() {
    let tmp = assert_fs::TempDir::new().unwrap();

    Command::cargo_bin("sqctx")
        .unwrap()
        .current_dir(tmp.path())
        .args(["init", "cfg"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Created config file"));

    tmp.child("cfg/sqctx.toml")
        .assert(predicate::str::contains("search_window = 200"))
        .assert(predicate::str::contains("backend = \"ripgrep\""));

    Command::cargo_bin("sqctx")
        .unwrap()
        .current_dir(tmp.path())
        .args(["init", "cfg"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));

    Command::cargo_bin("sqctx")
        .unwrap()
        .current_dir(tmp.path())
        .args(["--quiet", "init", "cfg", "--force"])
        .assert()
        .success();
}

#[test]
fn completions_to_stdout() {
    Command::cargo_bin("sqctx")
        .unwrap()
        .args(["completions", "bash", "--stdout"])
        .assert()
        .success()
        .stdout(predicate::str::contains("sqctx"));
}

#[test]
fn version_flag() {
    Command::cargo_bin("sqctx")
        .unwrap()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::starts_with("sqctx "));
}
