use std::path::{Path, PathBuf};
use std::process::Command;

use serde_json::Value;

fn create_temp_dir(prefix: &str) -> PathBuf {
    use std::sync::atomic::{AtomicU64, Ordering};
    static COUNTER: AtomicU64 = AtomicU64::new(0);

    let base = std::env::temp_dir();
    let pid = std::process::id();
    for _ in 0..10_000 {
        let n = COUNTER.fetch_add(1, Ordering::Relaxed);
        let path = base.join(format!("{prefix}_{pid}_{n}"));
        if std::fs::create_dir(&path).is_ok() {
            return path;
        }
    }
    panic!("failed to create temp dir under {}", base.display());
}

fn rm_rf(path: &Path) {
    let _ = std::fs::remove_dir_all(path);
}

fn run_rimorder(args: &[&str]) -> std::process::Output {
    let exe = env!("CARGO_BIN_EXE_rimorder");
    Command::new(exe).args(args).output().expect("run rimorder")
}

fn parse_json_stdout(out: &std::process::Output) -> Value {
    serde_json::from_slice(&out.stdout).expect("parse stdout JSON")
}

fn write_modset(dir: &Path, mods: Value) -> PathBuf {
    let doc = serde_json::json!({
        "schema_version": "rimorder.modset@0.1.0",
        "mods": mods,
    });
    let path = dir.join("modset.json");
    std::fs::write(&path, serde_json::to_vec_pretty(&doc).expect("encode modset"))
        .expect("write modset");
    path
}

fn seed_rules_cache(root: &Path, rules: Value) {
    let cache_dir = root.join("cache");
    std::fs::create_dir_all(&cache_dir).expect("create cache dir");
    let doc = serde_json::json!({"timestamp": 1700000000, "rules": rules});
    std::fs::write(
        cache_dir.join("communityRules.json"),
        serde_json::to_vec(&doc).expect("encode rules"),
    )
    .expect("write rules cache");
}

#[test]
fn sort_offline_orders_pins_first() {
    let dir = create_temp_dir("rimorder_cli_sort");
    let root = dir.join("root");
    let modset = write_modset(
        &dir,
        serde_json::json!([
            {"packageId": "zzz.mod", "loadAfter": ["aaa.mod"]},
            {"packageId": "Ludeon.RimWorld"},
            {"packageId": "aaa.mod"},
            {"packageId": "brrainz.harmony"},
        ]),
    );

    let out = run_rimorder(&[
        "--root",
        root.to_str().unwrap(),
        "--json",
        "sort",
        "--mods",
        modset.to_str().unwrap(),
        "--offline",
    ]);
    assert_eq!(
        out.status.code(),
        Some(0),
        "stderr:\n{}",
        String::from_utf8_lossy(&out.stderr)
    );
    let v = parse_json_stdout(&out);
    assert_eq!(v["schema_version"], "rimorder.sort-report@0.1.0");
    assert_eq!(v["ok"], true);
    assert_eq!(v["mod_count"], 4);
    let order: Vec<&str> = v["order"]
        .as_array()
        .expect("order[]")
        .iter()
        .map(|id| id.as_str().expect("order id"))
        .collect();
    assert_eq!(
        order,
        vec!["brrainz.harmony", "Ludeon.RimWorld", "aaa.mod", "zzz.mod"]
    );
    // No rules database, no issues key.
    assert!(v.get("issues").is_none());
    rm_rf(&dir);
}

#[test]
fn check_reports_cached_incompatibility_and_fails() {
    let dir = create_temp_dir("rimorder_cli_check");
    let root = dir.join("root");
    seed_rules_cache(
        &root,
        serde_json::json!({
            "First.Mod": {"incompatibleWith": {"second.mod": {}}}
        }),
    );
    let modset = write_modset(
        &dir,
        serde_json::json!([
            {"packageId": "First.Mod"},
            {"packageId": "Second.Mod"},
        ]),
    );

    let out = run_rimorder(&[
        "--root",
        root.to_str().unwrap(),
        "--json",
        "check",
        "--mods",
        modset.to_str().unwrap(),
        "--offline",
    ]);
    assert_eq!(
        out.status.code(),
        Some(1),
        "stderr:\n{}",
        String::from_utf8_lossy(&out.stderr)
    );
    let v = parse_json_stdout(&out);
    assert_eq!(v["schema_version"], "rimorder.check-report@0.1.0");
    assert_eq!(v["ok"], false);
    let issues = v["issues"].as_array().expect("issues[]");
    assert_eq!(issues.len(), 1);
    assert_eq!(issues[0]["kind"], "incompatibility");
    assert_eq!(issues[0]["severity"], "error");
    assert_eq!(issues[0]["subject"], "First.Mod");
    assert_eq!(issues[0]["target"], "second.mod");
    rm_rf(&dir);
}

#[test]
fn check_passes_a_clean_order() {
    let dir = create_temp_dir("rimorder_cli_clean");
    let root = dir.join("root");
    seed_rules_cache(
        &root,
        serde_json::json!({
            "first.mod": {"loadBefore": {"second.mod": {}}}
        }),
    );
    let modset = write_modset(
        &dir,
        serde_json::json!([
            {"packageId": "first.mod"},
            {"packageId": "second.mod"},
        ]),
    );

    let out = run_rimorder(&[
        "--root",
        root.to_str().unwrap(),
        "--json",
        "check",
        "--mods",
        modset.to_str().unwrap(),
        "--offline",
    ]);
    assert_eq!(
        out.status.code(),
        Some(0),
        "stderr:\n{}",
        String::from_utf8_lossy(&out.stderr)
    );
    let v = parse_json_stdout(&out);
    assert_eq!(v["ok"], true);
    assert!(v.get("issues").is_none());
    rm_rf(&dir);
}

#[test]
fn preset_round_trips_through_the_cli() {
    let dir = create_temp_dir("rimorder_cli_preset");
    let modset = write_modset(
        &dir,
        serde_json::json!([
            {"packageId": "Brrainz.Harmony"},
            {"packageId": "some.mod"},
        ]),
    );

    let out = run_rimorder(&[
        "preset",
        "encode",
        "--mods",
        modset.to_str().unwrap(),
        "--name",
        "Test Pack",
        "--quiet",
    ]);
    assert_eq!(
        out.status.code(),
        Some(0),
        "stderr:\n{}",
        String::from_utf8_lossy(&out.stderr)
    );
    let code = String::from_utf8(out.stdout).expect("utf-8 code");
    let code = code.trim();
    assert!(code.starts_with("RMM:v1:"), "got: {code}");

    let out = run_rimorder(&["--json", "preset", "decode", code]);
    assert_eq!(
        out.status.code(),
        Some(0),
        "stderr:\n{}",
        String::from_utf8_lossy(&out.stderr)
    );
    let v = parse_json_stdout(&out);
    assert_eq!(v["schema_version"], "rimorder.preset-decode@0.1.0");
    assert_eq!(v["name"], "Test Pack");
    let ids: Vec<&str> = v["package_ids"]
        .as_array()
        .expect("package_ids[]")
        .iter()
        .map(|id| id.as_str().expect("package id"))
        .collect();
    assert_eq!(ids, vec!["Brrainz.Harmony", "some.mod"]);
    rm_rf(&dir);
}

#[test]
fn malformed_modset_exits_with_error() {
    let dir = create_temp_dir("rimorder_cli_badmods");
    let path = dir.join("modset.json");
    std::fs::write(&path, b"{\"schema_version\":\"wrong@9.9.9\",\"mods\":[]}").unwrap();

    let out = run_rimorder(&["sort", "--mods", path.to_str().unwrap(), "--offline"]);
    assert_eq!(out.status.code(), Some(2));
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("schema_version"), "stderr:\n{stderr}");
    rm_rf(&dir);
}
