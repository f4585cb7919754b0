use assert_cmd::Command;
use serde_json::Value;
use std::fs;
use std::path::Path;
use tempfile::{tempdir, TempDir};

#[allow(deprecated)]
fn cli(workdir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("phone-matcher").expect("binary");
    cmd.current_dir(workdir)
        .env_remove("PHONE_MATCHER_DB")
        .env_remove("PHONE_MATCHER_POOL_SIZE")
        .env_remove("PHONE_MATCHER_INGEST_CHUNK")
        .env_remove("PHONE_MATCHER_UPSERT_CHUNK")
        .env_remove("PHONE_MATCHER_MATCH_CHUNK")
        .args(["--db", "registry.sqlite"]);
    cmd
}

fn run_json(workdir: &Path, args: &[&str]) -> Value {
    let output = cli(workdir).args(args).output().expect("command run");
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).expect("valid json")
}

fn workspace() -> TempDir {
    let temp = tempdir().unwrap();
    fs::write(
        temp.path().join("admin.csv"),
        "name,Mobile\nAnn,+1 (111) 111-1111\nBob,1111111111\nCy,908\nDee,333.333.3333\n",
    )
    .unwrap();
    temp
}

#[test]
fn ingest_then_match_tagged_upload() {
    let temp = workspace();
    let root = temp.path();

    let report = run_json(root, &["ingest", "admin.csv", "--owner", "admin-1", "--json"]);
    assert_eq!(report["rows_read"], 4);
    assert_eq!(report["accepted"], 3);
    assert_eq!(report["rejected"], 1);
    assert_eq!(report["affected"], 2);

    fs::write(
        root.join("Client List.csv"),
        "state,phone\nCA,1111111111\nTX,222-222-2222\n,222 222 2222\nNV,12\n",
    )
    .unwrap();
    let summary = run_json(root, &["match", "Client List.csv", "--json"]);
    assert_eq!(summary["unmatched"], 1);
    assert_eq!(summary["tagged"], true);
    assert_eq!(summary["rejected"], 1);

    let written = fs::read_to_string(root.join("Client List-clean.csv")).unwrap();
    assert_eq!(written, "state,phone\nTX,2222222222\n");
}

#[test]
fn match_without_tags_writes_flat_json() {
    let temp = workspace();
    let root = temp.path();
    run_json(root, &["ingest", "admin.csv", "--owner", "admin-1", "--json"]);

    fs::write(root.join("leads.csv"), "phone\n1111111111\n4444444444\n").unwrap();
    cli(root)
        .args(["match", "leads.csv", "--format", "json", "-o", "out/unmatched.json"])
        .assert()
        .success()
        .stdout(predicates::str::contains("unmatched.json"));

    let written: Value =
        serde_json::from_str(&fs::read_to_string(root.join("out/unmatched.json")).unwrap())
            .unwrap();
    assert_eq!(written, serde_json::json!(["4444444444"]));
}

#[test]
fn registry_admin_commands() {
    let temp = workspace();
    let root = temp.path();
    run_json(root, &["ingest", "admin.csv", "--owner", "admin-1", "--json"]);

    let count = run_json(root, &["count", "--json"]);
    assert_eq!(count["count"], 2);

    let page = run_json(root, &["search", "333", "--json"]);
    assert_eq!(page["total"], 1);
    assert_eq!(page["entries"][0]["phone"], "3333333333");
    assert_eq!(page["entries"][0]["owner"], "admin-1");

    cli(root)
        .args(["delete", "(333) 333-3333"])
        .assert()
        .success()
        .stdout(predicates::str::contains("Deleted 3333333333"));

    let output = cli(root).args(["export"]).output().expect("export");
    assert!(output.status.success());
    assert_eq!(
        String::from_utf8_lossy(&output.stdout).lines().collect::<Vec<_>>()[..1],
        ["id,phone,added_by,created_at"]
    );
    assert!(String::from_utf8_lossy(&output.stdout).contains(",1111111111,admin-1,"));
    assert!(!String::from_utf8_lossy(&output.stdout).contains("3333333333"));
}

#[test]
fn workbook_uploads_are_rejected() {
    let temp = workspace();
    let root = temp.path();
    fs::write(root.join("sheet.xlsx"), b"PK\x03\x04").unwrap();
    cli(root)
        .args(["match", "sheet.xlsx"])
        .assert()
        .failure()
        .stderr(predicates::str::contains("not supported"));
}

#[test]
fn blank_owner_is_rejected() {
    let temp = workspace();
    cli(temp.path())
        .args(["ingest", "admin.csv", "--owner", "  "])
        .assert()
        .failure()
        .stderr(predicates::str::contains("--owner must not be blank"));
}

#[test]
fn config_file_and_flags_control_chunking() {
    let temp = workspace();
    let root = temp.path();
    fs::write(
        root.join("phone-matcher.toml"),
        "[pipeline]\ningest_flush_threshold = 1\n\n[pool]\nmax_handles = 2\n",
    )
    .unwrap();

    let report = run_json(
        root,
        &["--config", "phone-matcher.toml", "ingest", "admin.csv", "--owner", "a", "--json"],
    );
    assert_eq!(report["flushes"], 3);

    let report = run_json(
        root,
        &[
            "--config",
            "phone-matcher.toml",
            "ingest",
            "admin.csv",
            "--owner",
            "a",
            "--flush-every",
            "10",
            "--json",
        ],
    );
    assert_eq!(report["flushes"], 1);
    assert_eq!(report["affected"], 0);
}
