use assert_cmd::Command;
use std::path::Path;
use tempfile::tempdir;

fn run(dir: &Path, args: &[&str]) -> String {
    let output = Command::cargo_bin("setwise")
        .unwrap()
        .arg("--db")
        .arg(dir.join("setwise.db"))
        .arg("--config")
        .arg(dir.join("config.json"))
        .args(args)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    String::from_utf8(output).unwrap()
}

#[test]
fn full_workout_through_the_cli() {
    let dir = tempdir().unwrap();
    let dir = dir.path();

    let out = run(dir, &["start", "Push", "-e", "Bench Press:2"]);
    assert!(out.contains("Started Push"), "{out}");

    let out = run(dir, &["log", "185", "8"]);
    assert!(out.contains("Bench Press: set 1 185 x 8"), "{out}");
    assert!(out.contains("Rest 1:30"), "{out}");

    let out = run(dir, &["status"]);
    assert!(out.contains("> 1. Bench Press [weight/reps] 1/2"), "{out}");
    assert!(out.contains("Resting:"), "{out}");
    assert!(out.contains("Last time: 185 x 8"), "{out}");

    let out = run(dir, &["rest", "skip"]);
    assert!(out.contains("Rest skipped"), "{out}");

    let out = run(dir, &["log", "185", "9"]);
    assert!(out.contains("New PR! Bench Press 185 x 9"), "{out}");
    assert!(out.contains("Finished Push"), "{out}");

    let out = run(dir, &["status"]);
    assert!(out.contains("No active workout"), "{out}");

    let out = run(dir, &["history", "--csv"]);
    let mut lines = out.lines();
    assert_eq!(
        lines.next(),
        Some("name,started_at,finished_at,duration_secs,exercise_count,total_sets,total_volume,prs")
    );
    assert!(lines.next().unwrap().starts_with("Push,"));
}

#[test]
fn undo_and_cancel() {
    let dir = tempdir().unwrap();
    let dir = dir.path();

    run(dir, &["start", "Pull"]);
    run(dir, &["add", "Row", "--sets", "3", "--alt", "Cable Row"]);
    run(dir, &["log", "135", "10"]);

    let out = run(dir, &["undo"]);
    assert!(out.contains("Undid 1 entries"), "{out}");

    let out = run(dir, &["swap", "Cable Row"]);
    assert!(out.is_empty(), "{out}");
    let out = run(dir, &["status"]);
    assert!(out.contains("Cable Row [weight/reps] 0/3"), "{out}");

    let out = run(dir, &["cancel"]);
    assert!(out.contains("Workout cancelled"), "{out}");

    let out = run(dir, &["history"]);
    assert!(out.contains("No workouts yet"), "{out}");
}

#[test]
fn commands_without_a_workout_fail() {
    let dir = tempdir().unwrap();
    Command::cargo_bin("setwise")
        .unwrap()
        .arg("--db")
        .arg(dir.path().join("setwise.db"))
        .arg("--config")
        .arg(dir.path().join("config.json"))
        .args(["log", "100", "5"])
        .assert()
        .failure();
}
