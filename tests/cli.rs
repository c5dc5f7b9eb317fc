use assert_cmd::Command;
use tempfile::{tempdir, TempDir};

// Keeps the user's config and state directories out of the run.
fn cogtrial(home: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("cogtrial").unwrap();
    cmd.env("HOME", home.path())
        .env("XDG_CONFIG_HOME", home.path().join("config"))
        .env_remove("RUST_LOG");
    cmd
}

fn stdout_of(cmd: &mut Command) -> String {
    let output = cmd.output().unwrap();
    assert!(output.status.success(), "{output:?}");
    String::from_utf8(output.stdout).unwrap()
}

#[test]
fn games_lists_every_variant() {
    let home = tempdir().unwrap();
    let out = stdout_of(cogtrial(&home).arg("games"));
    for slug in [
        "n-back",
        "shape-rotation",
        "rps",
        "number-pressing",
        "cat-chaser",
        "count-comparison",
    ] {
        assert!(out.contains(slug), "missing {slug} in {out}");
    }
}

#[test]
fn history_of_an_empty_memory_gateway() {
    let home = tempdir().unwrap();
    let out = stdout_of(cogtrial(&home).args(["history", "--memory"]));
    assert!(out.contains("no sessions on page 1 (0 total)"));
}

#[test]
fn history_creates_the_database_file() {
    let home = tempdir().unwrap();
    let db = home.path().join("db").join("sessions.db");
    let out = stdout_of(
        cogtrial(&home)
            .args(["history", "--game", "rps", "--db"])
            .arg(&db),
    );
    assert!(out.contains("0 total"));
    assert!(db.exists());
}

#[test]
fn export_with_no_sessions() {
    let home = tempdir().unwrap();
    let target = home.path().join("out.csv");
    let out = stdout_of(cogtrial(&home).args(["export", "--memory"]).arg(&target));
    assert!(out.contains("exported 0 sessions"));
    assert!(target.exists());
}

#[test]
fn stats_of_an_unknown_session_fails() {
    let home = tempdir().unwrap();
    let db = home.path().join("sessions.db");
    cogtrial(&home)
        .args(["stats", "42", "--db"])
        .arg(&db)
        .assert()
        .failure();
}

#[test]
fn unknown_game_is_rejected_by_the_parser() {
    let home = tempdir().unwrap();
    cogtrial(&home)
        .args(["play", "tetris"])
        .assert()
        .failure()
        .code(2);
}

#[test]
fn zero_page_size_is_an_error() {
    let home = tempdir().unwrap();
    cogtrial(&home)
        .args(["history", "--memory", "--limit", "0"])
        .assert()
        .failure();
}
