use assert_cmd::Command;
use predicates::prelude::*;
use rstest::rstest;
use std::fs;
use std::path::PathBuf;
use tempfile::tempdir;

// Build a minimal valid TOML config for sim mode
fn write_valid_config(dir: &tempfile::TempDir) -> PathBuf {
    let toml = r#"
[control]
tick_ms = 20
status_interval_ms = 90
max_actuators = 8

[timeouts]
sensor_ms = 5

[power]
settle_ms = 20

[[power.groups]]
pin = 40
name = "IN1-leftArm"

[feedback]
kp = 4.0

[[feedback.servo]]
channel = 5
sensor_channel = 0
deg_per_unit = 1.0
"#;
    let path = dir.path().join("cfg.toml");
    fs::write(&path, toml).unwrap();
    path
}

fn servoctl(cfg: &PathBuf) -> Command {
    let mut cmd = Command::cargo_bin("servoctl").unwrap();
    // Always include a valid config to avoid relying on default path
    cmd.arg("--config").arg(cfg);
    cmd
}

#[rstest]
#[case(&["--help"], 0, "Usage:", "stdout")]
#[case(&["self-check"], 0, "self-check ok: 1 power rail(s), 1 feedback servo(s)", "stdout")]
#[case(&["bogus"], 2, "unrecognized subcommand", "stderr")]
#[case(&["run", "--drain-timeout-ms", "abc"], 2, "invalid value", "stderr")]
fn cli_table_cases(
    #[case] args: &[&str],
    #[case] exit_code: i32,
    #[case] needle: &str,
    #[case] stream: &str,
) {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(&dir);

    let mut cmd = servoctl(&cfg);
    for a in args {
        cmd.arg(a);
    }

    let assert = cmd.assert().code(exit_code);
    match stream {
        "stdout" => {
            assert.stdout(predicate::str::contains(needle));
        }
        "stderr" => {
            assert.stderr(predicate::str::contains(needle));
        }
        other => panic!("unknown stream: {other}"),
    }
}

#[rstest]
#[case("[control]\ntick_ms = 0\n", "tick_ms")]
#[case("[[power.groups]]\npin = 40\n[[power.groups]]\npin = 40\n", "duplicate rail pin")]
#[case("[control\n", "not valid TOML")]
fn cli_rejects_bad_config_with_exit_code_2(#[case] toml: &str, #[case] needle: &str) {
    let dir = tempdir().unwrap();
    let path = dir.path().join("bad.toml");
    fs::write(&path, toml).unwrap();

    servoctl(&path)
        .arg("self-check")
        .assert()
        .code(2)
        .stderr(predicate::str::contains(needle));
}

#[rstest]
fn cli_reports_missing_config() {
    let dir = tempdir().unwrap();
    servoctl(&dir.path().join("missing.toml"))
        .arg("self-check")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("could not be read"));
}

#[rstest]
fn run_streams_binary_frames_until_drained() {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(&dir);

    let out = servoctl(&cfg)
        .args(["run", "--sim", "--drain-timeout-ms", "3000"])
        .write_stdin("0,wrist,1,0,180,60,0,90,40\n1,1,120,1000\n")
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let frames: Vec<_> = servo_core::protocol::split_frames(&out)
        .map(|f| servo_core::decode_frame(f).expect("well-formed frame"))
        .collect();
    assert!(!frames.is_empty());
    assert!(frames.iter().all(|r| r.channel == 1 && r.telemetry.is_none()));
    assert!(frames.iter().any(|r| r.flags.moving));
    let last = frames.last().unwrap();
    assert_eq!(last.position, 120);
    assert!(!last.flags.attached);
}

#[rstest]
fn run_logs_and_skips_bad_lines() {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(&dir);

    servoctl(&cfg)
        .args(["--log-level", "warn", "run", "--sim"])
        .write_stdin("9,1\n1,2\n# comment\n4,3\n")
        .assert()
        .success()
        .stderr(predicate::str::contains("bad command line"))
        .stderr(predicate::str::contains("command rejected"));
}

#[rstest]
fn decode_prints_text_lines() {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(&dir);

    // plain frame: channel 5, assigned|attached|reached, position 90
    let frames: Vec<u8> = vec![0xC5, 0xA5, 0x6A, 0x0A];
    servoctl(&cfg)
        .arg("decode")
        .write_stdin(frames)
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "ch=5 pos=90 flags=assigned,attached,reached",
        ));
}

#[rstest]
fn decode_flags_malformed_input() {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(&dir);

    servoctl(&cfg)
        .arg("decode")
        .write_stdin(vec![0x01, 0x02, 0x0A])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("malformed frame"));
}
