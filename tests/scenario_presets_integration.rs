//! Runs the shipped scenarios through the binary and checks their summaries.

use std::path::Path;
use std::process::Command;

#[derive(Debug)]
struct Summary {
    steps_played: usize,
    total_reward: f64,
    redispatch_mwh: f64,
}

#[test]
fn scenarios_run_via_cli_and_produce_distinct_outcomes() {
    let idle = run_and_parse("scenarios/case5_idle.toml", &[]);
    let redispatch = run_and_parse("scenarios/case14_redispatch.toml", &[]);
    let scripted = run_and_parse("scenarios/case14_scripted.toml", &[]);

    assert_eq!(idle.len(), 2);
    for s in &idle {
        assert_eq!(s.steps_played, 95);
        assert!((s.total_reward - 95.0).abs() < 1e-6);
        assert_eq!(s.redispatch_mwh, 0.0);
    }
    assert_eq!(redispatch.len(), 2);
    assert!(redispatch.iter().any(|s| s.redispatch_mwh > 0.0));
    assert_eq!(scripted.len(), 1);
    assert!(scripted[0].redispatch_mwh > 0.0);
}

#[test]
fn cli_overrides_and_logs_episodes() {
    let root = std::env::temp_dir().join(format!("grid_sim_cli_{}", std::process::id()));
    let log_dir = root.to_string_lossy().to_string();
    let summaries = run_and_parse(
        "scenarios/case5_idle.toml",
        &["--episodes", "3", "--workers", "2", "--max-iter", "10", "--log-dir", &log_dir],
    );
    assert_eq!(summaries.len(), 3);
    assert!(summaries.iter().all(|s| s.steps_played == 10));
    for dir in ["0000", "0001", "0000_2"] {
        assert!(root.join(dir).join("episode_meta.json").exists(), "{dir} missing");
    }

    let output = Command::new(env!("CARGO_BIN_EXE_grid-sim"))
        .args(["--replay", &root.join("0001").to_string_lossy(), "--plot", "line_status"])
        .output()
        .expect("grid-sim process should run");
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).expect("stdout should be valid UTF-8");
    assert!(stdout.contains("--- line_status at step 10 ---"));
    assert!(stdout.contains("--- Episode Summary ---"));
    std::fs::remove_dir_all(&root).ok();
}

#[test]
fn invalid_arguments_fail() {
    for args in [
        vec!["--preset", "case9000"],
        vec!["--workers", "0"],
        vec!["--agent", "greedy"],
        vec!["--plot", "flows"],
    ] {
        let output = Command::new(env!("CARGO_BIN_EXE_grid-sim"))
            .args(&args)
            .output()
            .expect("grid-sim process should run");
        assert!(!output.status.success(), "{args:?} should fail");
        assert!(String::from_utf8_lossy(&output.stderr).contains("error"));
    }
}

fn run_and_parse(path: &str, extra: &[&str]) -> Vec<Summary> {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join(path);
    let output = Command::new(env!("CARGO_BIN_EXE_grid-sim"))
        .arg("--scenario")
        .arg(&path)
        .args(extra)
        .output()
        .expect("grid-sim process should run");

    assert!(
        output.status.success(),
        "scenario run failed for {}: stderr={} ",
        path.display(),
        String::from_utf8_lossy(&output.stderr)
    );

    let stdout = String::from_utf8(output.stdout).expect("stdout should be valid UTF-8");
    parse_summaries(&stdout)
}

fn parse_summaries(stdout: &str) -> Vec<Summary> {
    stdout
        .split("--- Episode Summary ---")
        .skip(1)
        .map(|block| Summary {
            steps_played: parse_metric(block, "Steps played:", "") as usize,
            total_reward: parse_metric(block, "Reward:", "total"),
            redispatch_mwh: parse_metric(block, "Redispatched energy:", "MWh"),
        })
        .collect()
}

fn parse_metric(block: &str, label: &str, unit: &str) -> f64 {
    let line = block
        .lines()
        .find(|line| line.trim_start().starts_with(label))
        .unwrap_or_else(|| panic!("missing summary line `{label}` in output: {block}"));

    let raw = line
        .split_once(':')
        .map(|(_, right)| right.trim())
        .unwrap_or_else(|| panic!("invalid summary format for line `{line}`"));

    let numeric = raw.split_whitespace().next().unwrap_or(raw);
    let numeric = numeric.strip_suffix(unit).unwrap_or(numeric).trim();
    numeric
        .parse::<f64>()
        .unwrap_or_else(|_| panic!("failed parsing `{numeric}` from summary line `{line}`"))
}
