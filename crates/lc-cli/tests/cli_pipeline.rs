use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::time::{SystemTime, UNIX_EPOCH};

fn bin_path() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_larcal"))
}

fn tmp_dir(name: &str) -> PathBuf {
    let nanos = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_nanos();
    let mut p = std::env::temp_dir();
    p.push(format!("larcal_cli_{}_{}_{}", std::process::id(), nanos, name));
    std::fs::create_dir_all(&p).unwrap();
    p
}

fn run(args: &[&str]) -> Output {
    Command::new(bin_path())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("failed to run {:?} {:?}: {}", bin_path(), args, e))
}

fn run_ok(args: &[&str]) -> serde_json::Value {
    let out = run(args);
    assert!(
        out.status.success(),
        "{:?} should succeed, stderr={}",
        args,
        String::from_utf8_lossy(&out.stderr)
    );
    serde_json::from_slice(&out.stdout).unwrap_or_else(|e| {
        panic!("stdout is not JSON ({e}): {}", String::from_utf8_lossy(&out.stdout))
    })
}

fn s(p: &Path) -> String {
    p.to_string_lossy().into_owned()
}

const CONFIG: &str = r#"
schema_version: larcal_config_v0
n_planes: 3
axes:
  - { variable: x, bins: 10, min: 0.0, max: 100.0, title: "x [cm]" }
  - { variable: charge, bins: 40, min: 0.0, max: 200.0 }
  - { variable: width, bins: 4, min: 0.0, max: 8.0 }
selection: { min_goodness: 0.5 }
profile: { profile_axis: 0, projection_axes: [1, 2], min_counts: 100, tail: merge_into_previous }
grid: { x_axis: 0, y_axis: 2, nx: 2, ny: 2, projection_axis: 1 }
estimator: { bootstrap_throws: 200, seed: 17 }
"#;

/// Deterministic hits on two planes of TPC 0, one JSON object per line.
fn write_hits(path: &Path, n: usize, seed: u64) {
    let mut state = seed;
    let mut next = || {
        state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        (state >> 11) as f64 / (1u64 << 53) as f64
    };
    let mut text = String::new();
    for i in 0..n {
        let x = 100.0 * next();
        let charge = 40.0 + 20.0 * next() + 80.0 * next().powi(6);
        let width = 2.0 + 3.0 * next();
        let goodness = if i % 10 == 0 { 0.1 } else { 0.9 };
        text.push_str(&format!(
            "{{\"group\":{{\"tpc\":0,\"plane\":{}}},\"x\":{x},\"y\":0.0,\"z\":0.0,\"charge\":{charge},\"width\":{width},\"goodness\":{goodness}}}\n",
            i % 2
        ));
    }
    std::fs::write(path, text).unwrap();
}

#[test]
fn fill_merge_profile_inspect() {
    let dir = tmp_dir("pipeline");
    let cfg = dir.join("config.yaml");
    std::fs::write(&cfg, CONFIG).unwrap();

    let mut batches = Vec::new();
    for k in 0..3u64 {
        let hits = dir.join(format!("hits_{k}.jsonl"));
        write_hits(&hits, 1200, 100 + k);
        let out = dir.join(format!("hists_{k}.json"));
        let report = run_ok(&["fill", "--config", &s(&cfg), "--input", &s(&hits), "--output", &s(&out)]);
        assert_eq!(report["stats"]["accepted"], 1080);
        assert_eq!(report["stats"]["rejected_goodness"], 120);
        assert_eq!(report["groups"], serde_json::json!(["group_0", "group_1"]));
        batches.push(out);
    }

    // A corrupt batch in the middle is skipped, not fatal.
    let corrupt = dir.join("hists_corrupt.json");
    std::fs::write(&corrupt, "{ not json").unwrap();
    let merged = dir.join("merged.json");
    let report = run_ok(&[
        "merge",
        "--inputs",
        &s(&batches[0]),
        &s(&corrupt),
        &s(&batches[1]),
        &s(&batches[2]),
        "--output",
        &s(&merged),
    ]);
    assert_eq!(report["sources_seen"], 4);
    assert_eq!(report["sources_merged"], 3);
    assert_eq!(report["skipped"].as_array().unwrap().len(), 1);
    assert_eq!(report["skipped"][0]["source"], s(&corrupt));

    let curves = dir.join("curves.json");
    let report = run_ok(&[
        "profile",
        "--config",
        &s(&cfg),
        "--input",
        &s(&merged),
        "--output",
        &s(&curves),
        "--threads",
        "2",
    ]);
    let groups = report["groups"].as_array().unwrap();
    assert_eq!(groups.len(), 2);
    assert_eq!(groups[0]["curves"].as_array().unwrap().len(), 2);
    assert!(report["failures"].as_array().unwrap().is_empty());

    let listing = run_ok(&["inspect", "--input", &s(&curves)]);
    let names: Vec<&str> =
        listing["keys"].as_array().unwrap().iter().map(|k| k["name"].as_str().unwrap()).collect();
    assert!(names.contains(&"group_0/curve_dim0_1"));
    assert!(names.contains(&"group_0/curve_dim0_2"));
    assert!(names.contains(&"group_1/summary_dim0"));
    let class = listing["keys"]
        .as_array()
        .unwrap()
        .iter()
        .find(|k| k["name"] == "group_1/curve_dim0_1")
        .map(|k| k["class_name"].clone())
        .unwrap();
    assert_eq!(class, "CalibrationCurve");

    let grid = dir.join("grid.json");
    let report =
        run_ok(&["profile-grid", "--config", &s(&cfg), "--input", &s(&merged), "--output", &s(&grid)]);
    assert_eq!(report["groups"][0]["blocks"], 4);

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn merge_reads_a_file_list_and_projects() {
    let dir = tmp_dir("file_list");
    let cfg = dir.join("config.yaml");
    std::fs::write(&cfg, CONFIG).unwrap();

    let mut lines = String::from("# batches\n");
    for k in 0..2u64 {
        let hits = dir.join(format!("hits_{k}.jsonl"));
        write_hits(&hits, 300, k);
        let out = dir.join(format!("hists_{k}.json"));
        run_ok(&["fill", "--config", &s(&cfg), "--input", &s(&hits), "--output", &s(&out)]);
        lines.push_str(&format!("{}\n\n", s(&out)));
    }
    lines.push_str(&format!("{}\n", s(&dir.join("missing.json"))));
    let list = dir.join("inputs.txt");
    std::fs::write(&list, lines).unwrap();

    let merged = dir.join("merged.json");
    let report = run_ok(&[
        "merge",
        "--file-list",
        &s(&list),
        "--output",
        &s(&merged),
        "--keep-axes",
        "0,1",
    ]);
    assert_eq!(report["sources_seen"], 3);
    assert_eq!(report["sources_merged"], 2);
    assert!(report["skipped"][0]["reason"].as_str().unwrap().contains("missing input"));

    let bytes = std::fs::read(&merged).unwrap();
    let doc: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    let axes = &doc["objects"]["group_0"]["payload"]["axes"];
    assert_eq!(axes.as_array().unwrap().len(), 2);

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn ratio_divides_data_curves_by_simulation() {
    let dir = tmp_dir("ratio");
    // Same hits; data charge is scaled up by 1.25 on every plane.
    let mc_cfg = dir.join("mc.yaml");
    std::fs::write(&mc_cfg, CONFIG.replace("min_goodness: 0.5 }", "min_goodness: 0.5, is_data: false }"))
        .unwrap();
    let data_cfg = dir.join("data.yaml");
    std::fs::write(
        &data_cfg,
        CONFIG.replace("min_goodness: 0.5 }", "min_goodness: 0.5, plane_scale: [1.25, 1.25, 1.25] }"),
    )
    .unwrap();
    let hits = dir.join("hits.jsonl");
    write_hits(&hits, 3000, 42);

    let mut curves = Vec::new();
    for (tag, cfg) in [("data", &data_cfg), ("mc", &mc_cfg)] {
        let hists = dir.join(format!("hists_{tag}.json"));
        run_ok(&["fill", "--config", &s(cfg), "--input", &s(&hits), "--output", &s(&hists)]);
        let out = dir.join(format!("curves_{tag}.json"));
        run_ok(&["profile", "--config", &s(cfg), "--input", &s(&hists), "--output", &s(&out)]);
        curves.push(out);
    }

    // MC lacks group_1: that curve is reported, not fatal.
    let mc_bytes = std::fs::read(&curves[1]).unwrap();
    let mut mc_doc: serde_json::Value = serde_json::from_slice(&mc_bytes).unwrap();
    mc_doc["objects"].as_object_mut().unwrap().remove("group_1/curve_dim0_1");
    std::fs::write(&curves[1], serde_json::to_vec(&mc_doc).unwrap()).unwrap();

    let out = dir.join("ratio.json");
    let report =
        run_ok(&["ratio", "--data", &s(&curves[0]), "--mc", &s(&curves[1]), "--output", &s(&out)]);
    let names: Vec<&str> =
        report["ratios"].as_array().unwrap().iter().map(|r| r["name"].as_str().unwrap()).collect();
    assert_eq!(names, ["group_0/ratio_dim0_1", "group_0/ratio_dim0_2", "group_1/ratio_dim0_2"]);
    assert_eq!(report["failures"].as_array().unwrap().len(), 1);
    assert_eq!(report["failures"][0]["curve"], "group_1/curve_dim0_1");

    let bytes = std::fs::read(&out).unwrap();
    let doc: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(doc["attributes"]["n_planes"], 3);
    assert_eq!(doc["objects"]["group_0/ratio_dim0_1"]["class_name"], "CurveRatio");
    let charge = doc["objects"]["group_0/ratio_dim0_1"]["payload"]["points"].as_array().unwrap();
    assert!(!charge.is_empty());
    for p in charge {
        let v = p["value"].as_f64().unwrap();
        assert!((v - 1.25).abs() < 0.15, "charge ratio {v}");
        assert!(p["uncertainty"].as_f64().unwrap() > 0.0);
    }
    // Width is not corrected, so data and simulation agree exactly.
    let width = doc["objects"]["group_0/ratio_dim0_2"]["payload"]["points"].as_array().unwrap();
    for p in width.iter().filter(|p| p.get("skipped").is_none()) {
        assert_eq!(p["value"].as_f64().unwrap(), 1.0);
    }

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn bad_config_is_fatal() {
    let dir = tmp_dir("bad_config");
    let cfg = dir.join("config.yaml");
    std::fs::write(&cfg, CONFIG.replace("projection_axes: [1, 2]", "projection_axes: [0]")).unwrap();
    let hits = dir.join("hits.jsonl");
    write_hits(&hits, 10, 1);
    let out = run(&[
        "fill",
        "--config",
        &s(&cfg),
        "--input",
        &s(&hits),
        "--output",
        &s(&dir.join("out.json")),
    ]);
    assert!(!out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("projection axis"));

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn malformed_hit_line_is_fatal() {
    let dir = tmp_dir("bad_hits");
    let cfg = dir.join("config.yaml");
    std::fs::write(&cfg, CONFIG).unwrap();
    let hits = dir.join("hits.jsonl");
    std::fs::write(&hits, "{\"group\":{\"tpc\":0,\"plane\":0},\"x\":1.0}\n").unwrap();
    let out = run(&[
        "fill",
        "--config",
        &s(&cfg),
        "--input",
        &s(&hits),
        "--output",
        &s(&dir.join("out.json")),
    ]);
    assert!(!out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("line 1"));

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn version_prints_crate_version() {
    let out = run(&["version"]);
    assert!(out.status.success());
    assert!(String::from_utf8_lossy(&out.stdout).starts_with("larcal "));
}
