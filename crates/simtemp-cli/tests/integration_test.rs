use std::fs;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::process::{Command, Output, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use tempfile::TempDir;

fn simtemp(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_simtemp"))
        .args(args)
        .env("RUST_LOG", "warn")
        .output()
        .expect("Failed to run simtemp")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

fn fake_sysfs() -> TempDir {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("sampling_ms"), "1000\n").unwrap();
    fs::write(dir.path().join("threshold_mC"), "45000\n").unwrap();
    fs::write(dir.path().join("mode"), "normal\n").unwrap();
    fs::write(dir.path().join("stats"), "updates=7 alerts=0 drops=0\n").unwrap();
    dir
}

fn attr(dir: &Path, name: &str) -> String {
    fs::read_to_string(dir.join(name)).unwrap()
}

#[test]
fn verification_passes_against_simulator() {
    let output = simtemp(&["--simulate", "--test"]);
    assert_eq!(output.status.code(), Some(0), "stderr: {}", stderr(&output));
    assert!(stdout(&output).contains("TEST: alert observed"));
}

#[test]
fn verification_fails_when_threshold_is_unreachable() {
    let output = simtemp(&[
        "--simulate",
        "--test",
        "--threshold-mc",
        "100000",
        "--test-timeout-ms",
        "500",
    ]);
    assert_eq!(output.status.code(), Some(1), "stderr: {}", stderr(&output));
    let out = stdout(&output);
    assert!(out.contains("TEST: alert not observed"));
    assert!(!out.contains("alert=true"));
}

#[test]
fn streams_formatted_samples_until_run_ends() {
    let output = simtemp(&["--simulate", "--sampling-ms", "50", "--run-seconds", "1"]);
    assert_eq!(output.status.code(), Some(0), "stderr: {}", stderr(&output));

    let out = stdout(&output);
    let lines: Vec<&str> = out.lines().collect();
    assert!(lines.len() >= 5, "too few samples: {out}");
    assert!(lines[0].ends_with(" temp=30.000C alert=false"), "{}", lines[0]);
    assert!(lines[1].ends_with(" temp=30.001C alert=false"), "{}", lines[1]);
    for line in &lines {
        // 2024-01-01T00:00:00.000Z
        assert_eq!(line.as_bytes()[10], b'T');
        assert_eq!(&line[19..20], ".");
        assert_eq!(&line[23..25], "Z ");
    }
}

#[test]
fn closed_stdout_ends_the_run() {
    let mut child = Command::new(env!("CARGO_BIN_EXE_simtemp"))
        .args(["--simulate", "--sampling-ms", "10"])
        .env("RUST_LOG", "warn")
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("Failed to run simtemp");

    let mut reader = BufReader::new(child.stdout.take().unwrap());
    let mut first = String::new();
    reader.read_line(&mut first).unwrap();
    assert!(first.contains(" temp="), "{first}");
    drop(reader);

    let started = Instant::now();
    let status = loop {
        if let Some(status) = child.try_wait().unwrap() {
            break status;
        }
        if started.elapsed() > Duration::from_secs(5) {
            child.kill().unwrap();
            panic!("simtemp kept running after stdout closed");
        }
        thread::sleep(Duration::from_millis(20));
    };
    assert_eq!(status.code(), Some(0));
}

#[test]
fn huge_run_duration_does_not_panic() {
    let output = simtemp(&[
        "--simulate",
        "--test",
        "--run-seconds",
        "18446744073709551615",
    ]);
    assert_eq!(output.status.code(), Some(0), "stderr: {}", stderr(&output));
    assert!(stdout(&output).contains("TEST: alert observed"));
}

#[test]
fn missing_device_exits_with_error() {
    let output = simtemp(&["--device", "/nonexistent/simtemp", "--run-seconds", "1"]);
    assert_eq!(output.status.code(), Some(2));
    assert!(stderr(&output).contains("not found"));
}

#[test]
fn verification_without_attributes_exits_with_error() {
    let output = simtemp(&[
        "--device",
        "/nonexistent/simtemp",
        "--sysfs",
        "/nonexistent/sysfs",
        "--test",
    ]);
    assert_eq!(output.status.code(), Some(2));
    assert!(stderr(&output).contains("TEST: failed to program device attributes"));
}

#[test]
fn verification_programs_attributes_before_reading() {
    let sysfs = fake_sysfs();
    let output = simtemp(&[
        "--device",
        "/nonexistent/simtemp",
        "--sysfs",
        sysfs.path().to_str().unwrap(),
        "--test",
    ]);

    // Attributes are written, then the missing node fails the transport.
    assert_eq!(output.status.code(), Some(2));
    assert!(stderr(&output).contains("TEST: source failed"));
    assert_eq!(attr(sysfs.path(), "sampling_ms"), "100\n");
    assert_eq!(attr(sysfs.path(), "mode"), "ramp\n");
    assert_eq!(attr(sysfs.path(), "threshold_mC"), "26000\n");
}

#[test]
fn show_config_prints_attributes_and_stats() {
    let sysfs = fake_sysfs();
    let output = simtemp(&["--sysfs", sysfs.path().to_str().unwrap(), "--show-config"]);
    assert_eq!(output.status.code(), Some(0), "stderr: {}", stderr(&output));

    let out = stdout(&output);
    assert!(out.contains("sampling_ms=1000"));
    assert!(out.contains("threshold_mC=45000"));
    assert!(out.contains("mode=normal"));
    assert!(out.contains("stats: updates=7 alerts=0 drops=0"));
}

#[test]
fn apply_config_writes_only_requested_changes() {
    let sysfs = fake_sysfs();
    let output = simtemp(&[
        "--sysfs",
        sysfs.path().to_str().unwrap(),
        "--apply-config",
        "--mode",
        "noisy",
        "--threshold-mc",
        "-500",
    ]);
    assert_eq!(output.status.code(), Some(0), "stderr: {}", stderr(&output));
    assert_eq!(attr(sysfs.path(), "mode"), "noisy\n");
    assert_eq!(attr(sysfs.path(), "threshold_mC"), "-500\n");
    assert_eq!(attr(sysfs.path(), "sampling_ms"), "1000\n");
}

#[test]
fn event_log_records_the_session() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("events.jsonl");
    let output = simtemp(&[
        "--simulate",
        "--sampling-ms",
        "20",
        "--run-seconds",
        "1",
        "--event-log",
        path.to_str().unwrap(),
    ]);
    assert_eq!(output.status.code(), Some(0), "stderr: {}", stderr(&output));

    let entries: Vec<serde_json::Value> = fs::read_to_string(&path)
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert!(entries.len() >= 3);
    assert_eq!(entries[0]["kind"], "session_start");
    assert_eq!(entries[1]["kind"], "sample");
    assert_eq!(entries[1]["details"]["temperature_mc"], 30_000);
    let last = entries.last().unwrap();
    assert_eq!(last["kind"], "session_end");
    assert_eq!(last["details"]["outcome"], "stopped");
}

#[test]
fn history_summary_is_printed_at_exit() {
    let output = simtemp(&[
        "--simulate",
        "--sampling-ms",
        "20",
        "--run-seconds",
        "1",
        "--history",
        "5",
    ]);
    assert_eq!(output.status.code(), Some(0), "stderr: {}", stderr(&output));
    let out = stdout(&output);
    let summary = out.lines().last().unwrap();
    assert!(summary.starts_with("history: count=5 "), "{summary}");
}

#[test]
fn unknown_option_is_a_usage_error() {
    let output = simtemp(&["--frobnicate"]);
    assert_eq!(output.status.code(), Some(2));
    assert!(stderr(&output).contains("unknown option --frobnicate"));
}

#[test]
fn help_exits_cleanly() {
    let output = simtemp(&["--help"]);
    assert_eq!(output.status.code(), Some(0));
    assert!(stdout(&output).contains("USAGE:"));
}
