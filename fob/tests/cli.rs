use assert_cmd::Command;
use predicates::prelude::predicate;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn fob(root: &Path) -> Command {
    let mut cmd = Command::cargo_bin("fob").unwrap();
    cmd.env_remove("FOB_ROOT")
        .env_remove("FOB_LOG")
        .current_dir(root);
    cmd
}

fn json(root: &Path, args: &[&str]) -> serde_json::Value {
    let output = fob(root).arg("--json").args(args).output().unwrap();
    assert!(output.status.success(), "{:?}", output);
    serde_json::from_slice(&output.stdout).unwrap()
}

fn init_with_commit(root: &Path, name: &str, content: &str, message: &str) {
    fob(root).arg("init").assert().success();
    commit_file(root, name, content, message);
}

fn commit_file(root: &Path, name: &str, content: &str, message: &str) {
    fs::write(root.join(name), content).unwrap();
    fob(root).args(["add", name]).assert().success();
    fob(root).args(["commit", "-m", message]).assert().success();
}

#[test]
fn init_creates_repository_once() -> Result<(), Box<dyn std::error::Error>> {
    let dir = TempDir::new()?;

    fob(dir.path())
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("Initialized empty fob repository in"));
    assert!(dir.path().join(".fob/branches.json").is_file());

    fob(dir.path())
        .arg("init")
        .assert()
        .failure()
        .code(3)
        .stderr(predicate::str::contains("already initialized"));

    Ok(())
}

#[test]
fn root_flag_and_env_select_working_tree() -> Result<(), Box<dyn std::error::Error>> {
    let dir = TempDir::new()?;
    let elsewhere = TempDir::new()?;
    let root = dir.path().to_str().unwrap();

    fob(elsewhere.path())
        .args(["--root", root, "init"])
        .assert()
        .success();
    assert!(dir.path().join(".fob").is_dir());

    fob(elsewhere.path())
        .env("FOB_ROOT", root)
        .arg("branch")
        .assert()
        .success()
        .stdout(predicate::str::contains("On branch main"));

    Ok(())
}

#[test]
fn add_commit_log_flow() -> Result<(), Box<dyn std::error::Error>> {
    let dir = TempDir::new()?;
    fob(dir.path()).arg("init").assert().success();
    fs::write(dir.path().join("file.txt"), "hello")?;

    fob(dir.path())
        .args(["add", "file.txt", "missing.txt"])
        .assert()
        .success()
        .stdout(predicate::str::contains("file.txt"))
        .stdout(predicate::str::contains("skipped missing.txt (not found)"));

    fob(dir.path())
        .args(["commit", "first"])
        .assert()
        .success()
        .stdout(predicate::str::contains("[main "))
        .stdout(predicate::str::contains("first"));

    fob(dir.path())
        .arg("log")
        .assert()
        .success()
        .stdout(predicate::str::contains("first"));

    let log = json(dir.path(), &["log"]);
    let commits = log["commits"].as_array().unwrap();
    assert_eq!(commits.len(), 1);
    assert_eq!(log["branch"], "main");
    assert_eq!(commits[0]["message"], "first");
    assert!(commits[0]["files"]["file.txt"].is_string());

    Ok(())
}

#[test]
fn add_dot_stages_tree_except_ignored() -> Result<(), Box<dyn std::error::Error>> {
    let dir = TempDir::new()?;
    fob(dir.path()).arg("init").assert().success();
    fs::create_dir_all(dir.path().join("src"))?;
    fs::create_dir_all(dir.path().join("build"))?;
    fs::write(dir.path().join("src/main.txt"), "main")?;
    fs::write(dir.path().join("build/out.txt"), "out")?;
    fs::write(dir.path().join(".fobignore"), "# generated\nbuild\n")?;

    let add = json(dir.path(), &["add", "."]);
    let staged: Vec<&str> = add["staged"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["path"].as_str().unwrap())
        .collect();
    assert_eq!(staged, vec![".fobignore", "src/main.txt"]);

    Ok(())
}

#[test]
fn commit_outside_repository_fails() -> Result<(), Box<dyn std::error::Error>> {
    let dir = TempDir::new()?;

    fob(dir.path())
        .args(["commit", "-m", "nothing"])
        .assert()
        .failure()
        .code(3)
        .stderr(predicate::str::contains("Not a fob repository"));

    Ok(())
}

#[test]
fn commit_with_unknown_head_fails() -> Result<(), Box<dyn std::error::Error>> {
    let dir = TempDir::new()?;
    fob(dir.path()).arg("init").assert().success();
    fs::write(dir.path().join(".fob/HEAD"), "ghost\n")?;

    fob(dir.path())
        .args(["commit", "-m", "x"])
        .assert()
        .failure()
        .code(4)
        .stderr(predicate::str::contains("No such branch: ghost"));

    Ok(())
}

#[test]
fn commit_requires_message() -> Result<(), Box<dyn std::error::Error>> {
    let dir = TempDir::new()?;
    fob(dir.path()).arg("init").assert().success();

    fob(dir.path()).arg("commit").assert().failure().code(2);

    Ok(())
}

#[test]
fn branch_create_switch_and_list() -> Result<(), Box<dyn std::error::Error>> {
    let dir = TempDir::new()?;
    init_with_commit(dir.path(), "a.txt", "a", "base");

    fob(dir.path())
        .args(["branch", "feature"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Switched to a new branch 'feature'"));

    fob(dir.path())
        .args(["branch", "main"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Switched to branch 'main'"));

    let listing = json(dir.path(), &["branch"]);
    assert_eq!(listing["current"], "main");
    let branches = listing["branches"].as_array().unwrap();
    assert_eq!(branches.len(), 2);
    assert_eq!(branches[0]["name"], "feature");
    assert_eq!(branches[0]["parent"], "main");
    assert_eq!(branches[0]["head"], branches[1]["head"]);

    fob(dir.path())
        .args(["branch", "bad/name"])
        .assert()
        .failure()
        .code(4);

    Ok(())
}

#[test]
fn push_to_default_remote_then_noop() -> Result<(), Box<dyn std::error::Error>> {
    let dir = TempDir::new()?;
    init_with_commit(dir.path(), "a.txt", "a", "A");
    commit_file(dir.path(), "a.txt", "b", "B");

    let first = json(dir.path(), &["push"]);
    assert_eq!(first["branch"], "main");
    assert_eq!(first["commits_copied"], 2);
    assert_eq!(first["blobs_copied"], 2);
    assert_eq!(first["up_to_date"], false);
    assert!(dir.path().join(".fob_remote/branches.json").is_file());

    fob(dir.path())
        .arg("push")
        .assert()
        .success()
        .stdout(predicate::str::contains("Everything up-to-date"));

    Ok(())
}

#[test]
fn divergent_push_is_rejected() -> Result<(), Box<dyn std::error::Error>> {
    let remote = TempDir::new()?;
    let ours = TempDir::new()?;
    let theirs = TempDir::new()?;
    let remote_path = remote.path().join("shared");
    let remote_arg = remote_path.to_str().unwrap();

    init_with_commit(theirs.path(), "x.txt", "theirs", "theirs");
    fob(theirs.path()).args(["push", remote_arg]).assert().success();

    init_with_commit(ours.path(), "x.txt", "ours", "ours");
    fob(ours.path())
        .args(["push", remote_arg])
        .assert()
        .failure()
        .code(5)
        .stderr(predicate::str::contains("Divergent history"));

    Ok(())
}

#[test]
fn push_unknown_branch_fails() -> Result<(), Box<dyn std::error::Error>> {
    let dir = TempDir::new()?;
    fob(dir.path()).arg("init").assert().success();

    fob(dir.path())
        .args(["push", "--branch", "nope"])
        .assert()
        .failure()
        .code(4);

    Ok(())
}

#[test]
fn gc_removes_unreferenced_blobs() -> Result<(), Box<dyn std::error::Error>> {
    let dir = TempDir::new()?;
    init_with_commit(dir.path(), "a.txt", "kept", "keep");

    // Restaging replaces the entry, leaving the first blob unreferenced
    fs::write(dir.path().join("b.txt"), "first")?;
    fob(dir.path()).args(["add", "b.txt"]).assert().success();
    fs::write(dir.path().join("b.txt"), "second")?;
    fob(dir.path()).args(["add", "b.txt"]).assert().success();

    let dry = json(dir.path(), &["gc", "--dry-run"]);
    assert_eq!(dry["blobs_deleted"], 1);
    assert_eq!(dry["commits_deleted"], 0);

    fob(dir.path())
        .arg("gc")
        .assert()
        .success()
        .stdout(predicate::str::contains("Deleted 0 commit(s) and 1 blob(s)"));

    fob(dir.path()).arg("verify").assert().success();

    Ok(())
}

#[test]
fn verify_reports_tampering() -> Result<(), Box<dyn std::error::Error>> {
    let dir = TempDir::new()?;
    init_with_commit(dir.path(), "a.txt", "a", "A");

    fob(dir.path())
        .arg("verify")
        .assert()
        .success()
        .stdout(predicate::str::contains("0 problem(s)"));

    let commits_dir = dir.path().join(".fob/commits");
    let entry = fs::read_dir(&commits_dir)?.next().unwrap()?;
    let tampered = fs::read_to_string(entry.path())?.replace("\"A\"", "\"forged\"");
    fs::write(entry.path(), tampered)?;

    fob(dir.path())
        .arg("verify")
        .assert()
        .failure()
        .code(6)
        .stdout(predicate::str::contains("1 problem(s)"));

    Ok(())
}
