//! `servoctl`: drive a servo bank from a line protocol on stdin.

mod cli;
mod error_fmt;
mod output;
mod router;
mod rt;

use std::io::{BufRead, Read, Write};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use clap::Parser;
use crossbeam_channel as xch;
use eyre::{Result, WrapErr};
use servo_config::Config;
use servo_core::conversions::feedback_profiles;
use servo_core::runner::{self, FrameWriter, RunOptions, StatusSink, StopReason};
use servo_core::{Command, ServoBank};
use servo_traits::{AngleSensor, PinDriver, ServoDriver};

use crate::cli::{Cli, Commands, FILE_GUARD, JSON_MODE, RtLock};
use crate::error_fmt::{exit_code_for_error, format_error_json, humanize};
use crate::output::{JsonLines, status_json, status_text};
use crate::rt::{RtOptions, setup_rt_once};

/// Commands queued between the stdin reader and the control loop.
const COMMAND_QUEUE: usize = 64;

fn main() {
    let cli = Cli::parse();
    let _ = JSON_MODE.set(cli.json);
    if let Err(e) = color_eyre::install() {
        eprintln!("warning: color-eyre not installed: {e}");
    }

    if let Err(err) = real_main(&cli) {
        if JSON_MODE.get().copied().unwrap_or(false) {
            eprintln!("{}", format_error_json(&err));
        } else {
            eprintln!("{}", humanize(&err));
        }
        std::process::exit(exit_code_for_error(&err));
    }
}

fn real_main(cli: &Cli) -> Result<()> {
    match &cli.cmd {
        Commands::Decode => {
            init_tracing(cli.log_level.as_deref(), cli.json, None)?;
            decode_stdin(cli.json)
        }
        Commands::SelfCheck => {
            let cfg = load_config(cli)?;
            self_check(&cfg, cli.json)
        }
        Commands::Run {
            sim,
            drain_timeout_ms,
            max_ticks,
            rt,
            rt_prio,
            rt_lock,
            rt_cpu,
        } => {
            let cfg = load_config(cli)?;
            if *rt {
                setup_rt_once(RtOptions {
                    prio: *rt_prio,
                    lock: rt_lock.unwrap_or_else(RtLock::os_default),
                    cpu: *rt_cpu,
                });
            }
            run(
                &cfg,
                *sim,
                cli.json,
                RunOptions {
                    drain_timeout_ms: *drain_timeout_ms,
                    max_ticks: *max_ticks,
                },
            )
        }
    }
}

/// Load config, then install logging with its `[logging]` section. Logging is
/// installed without file output if the config itself is broken.
fn load_config(cli: &Cli) -> Result<Config> {
    match servo_config::load_file(&cli.config) {
        Ok(cfg) => {
            init_tracing(cli.log_level.as_deref(), cli.json, Some(&cfg.logging))?;
            tracing::debug!(path = %cli.config.display(), "config loaded");
            Ok(cfg)
        }
        Err(e) => {
            init_tracing(cli.log_level.as_deref(), cli.json, None)?;
            Err(e)
        }
    }
}

// ── Logging ──────────────────────────────────────────────────────────────────

/// Console logs go to stderr (stdout carries status output). Precedence for
/// the filter: `RUST_LOG` > `--log-level` > `[logging].level` > `info`.
fn init_tracing(
    cli_level: Option<&str>,
    json: bool,
    logging: Option<&servo_config::Logging>,
) -> Result<()> {
    use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

    let level = cli_level
        .or_else(|| logging.and_then(|l| l.level.as_deref()))
        .unwrap_or("info");
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .wrap_err_with(|| format!("invalid log level {level:?}"))?;

    let (pretty, structured) = if json {
        (None, Some(fmt::layer().json().with_writer(std::io::stderr)))
    } else {
        (Some(fmt::layer().with_writer(std::io::stderr)), None)
    };

    let file = match logging.and_then(|l| l.file.as_deref()) {
        Some(path) => {
            let rotation = logging.and_then(|l| l.rotation.as_deref()).unwrap_or("never");
            let path = Path::new(path);
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            let name = path
                .file_name()
                .ok_or_else(|| eyre::eyre!("logging.file has no file name"))?;
            let appender = match rotation {
                "daily" => tracing_appender::rolling::daily(dir, name),
                "hourly" => tracing_appender::rolling::hourly(dir, name),
                _ => tracing_appender::rolling::never(dir, name),
            };
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let _ = FILE_GUARD.set(guard);
            Some(fmt::layer().json().with_ansi(false).with_writer(writer))
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(pretty)
        .with(structured)
        .with(file)
        .try_init()
        .wrap_err("install tracing subscriber")
}

// ── Bank assembly ────────────────────────────────────────────────────────────

fn assemble(
    cfg: &Config,
    servos: impl ServoDriver + 'static,
    sensor: impl AngleSensor + 'static,
    pins: impl PinDriver + 'static,
) -> Result<ServoBank> {
    ServoBank::builder()
        .with_servos(servos)
        .with_sensor(sensor)
        .with_pins(pins)
        .with_loop((&cfg.control).into())
        .with_power((&cfg.power).into())
        .with_feedback((&cfg.feedback).into())
        .with_feedback_servos(feedback_profiles(&cfg.feedback))
        .with_timeouts((&cfg.timeouts).into())
        .build()
}

/// Simulated bench: every configured feedback joint gets a magnet on its shaft.
fn build_sim(cfg: &Config) -> Result<ServoBank> {
    let rig = servo_hardware::SimRig::new();
    for p in feedback_profiles(&cfg.feedback) {
        let dpu = if p.inverted {
            -p.deg_per_unit
        } else {
            p.deg_per_unit
        };
        rig.link_sensor(p.sensor_channel, p.channel, dpu, 180.0);
    }
    tracing::info!(backend = "sim", "hardware");
    assemble(cfg, rig.servo_bus(), rig.sensor(), rig.pins())
}

#[cfg(all(feature = "hardware", target_os = "linux"))]
fn build_hardware(cfg: &Config, probe: bool) -> Result<ServoBank> {
    use servo_hardware::hardware::{GpioPins, GpioServoBus, MuxedAs5600};
    use std::collections::BTreeMap;
    use std::time::Duration;

    let hw = &cfg.hardware;
    let channel_pins: BTreeMap<u8, u8> = hw.servo_pins.iter().copied().collect();
    let servos = GpioServoBus::try_new(&channel_pins, hw.pulse_min_us, hw.pulse_max_us)
        .wrap_err("open servo gpio outputs")?;
    let mut sensor = MuxedAs5600::try_new(hw.i2c_bus, hw.mux_address, hw.sensor_address)
        .wrap_err("open i2c angle sensors")?;
    let pins = GpioPins::try_new(cfg.power.active_low).wrap_err("open gpio rail pins")?;

    if probe {
        let timeout = Duration::from_millis(cfg.timeouts.sensor_ms);
        for s in &cfg.feedback.servos {
            let angle = sensor
                .read_angle(s.sensor_channel, timeout)
                .map_err(|e| eyre::eyre!("{e}"))
                .wrap_err_with(|| format!("i2c probe of sensor {}", s.sensor_channel))?;
            tracing::info!(channel = s.channel, sensor = s.sensor_channel, angle, "sensor ok");
        }
    }
    tracing::info!(backend = "gpio", "hardware");
    assemble(cfg, servos, sensor, pins)
}

fn build_bank(cfg: &Config, sim: bool, probe: bool) -> Result<ServoBank> {
    #[cfg(all(feature = "hardware", target_os = "linux"))]
    {
        if !sim {
            return build_hardware(cfg, probe);
        }
    }
    #[cfg(not(all(feature = "hardware", target_os = "linux")))]
    {
        let _ = probe;
        if !sim {
            tracing::debug!("built without hardware support, using the simulated bench");
        }
    }
    build_sim(cfg)
}

// ── Commands ─────────────────────────────────────────────────────────────────

fn self_check(cfg: &Config, json: bool) -> Result<()> {
    let bank = build_bank(cfg, false, true)?;
    let rails = bank.power().groups().len();
    let feedback = bank.actuators().len();
    if json {
        println!(
            "{}",
            serde_json::json!({
                "ok": true,
                "rails": rails,
                "feedback_servos": feedback,
                "capacity": bank.timing().max_actuators,
                "tick_ms": bank.timing().tick_ms,
            })
        );
    } else {
        println!("self-check ok: {rails} power rail(s), {feedback} feedback servo(s)");
    }
    Ok(())
}

/// Lines from stdin become typed commands on the queue. Malformed lines are
/// logged and dropped; EOF closes the queue.
fn spawn_reader(tx: xch::Sender<Command>) -> Result<()> {
    std::thread::Builder::new()
        .name("stdin-reader".into())
        .spawn(move || {
            let stdin = std::io::stdin();
            for (n, line) in stdin.lock().lines().enumerate() {
                let line = match line {
                    Ok(l) => l,
                    Err(e) => {
                        tracing::warn!(error = %e, "stdin read failed, closing command source");
                        break;
                    }
                };
                match router::parse_line(&line) {
                    Ok(Some(cmd)) => {
                        tracing::debug!(line = n + 1, ?cmd, "command");
                        if tx.send(cmd).is_err() {
                            break;
                        }
                    }
                    Ok(None) => {}
                    Err(e) => tracing::warn!(line = n + 1, text = %line, error = %e, "bad command line"),
                }
            }
        })
        .wrap_err("spawn stdin reader")?;
    Ok(())
}

fn run(cfg: &Config, sim: bool, json: bool, opts: RunOptions) -> Result<()> {
    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let flag = Arc::clone(&shutdown);
        ctrlc::set_handler(move || flag.store(true, Ordering::Relaxed))
            .wrap_err("install Ctrl-C handler")?;
    }

    let mut bank = build_bank(cfg, sim, false)?;
    let (tx, rx) = xch::bounded(COMMAND_QUEUE);
    spawn_reader(tx)?;

    let stdout = std::io::stdout();
    let mut sink: Box<dyn StatusSink> = if json {
        Box::new(JsonLines::new(stdout.lock()))
    } else {
        Box::new(FrameWriter::new(stdout.lock()))
    };
    let summary = runner::run(&mut bank, &rx, sink.as_mut(), &shutdown, opts)?;

    match summary.reason {
        StopReason::DrainTimeout => tracing::warn!(
            drain_timeout_ms = opts.drain_timeout_ms,
            "servos still in flight when the drain timeout expired"
        ),
        StopReason::Shutdown => tracing::info!("interrupted"),
        StopReason::Drained | StopReason::TickLimit => {}
    }
    Ok(())
}

fn decode_stdin(json: bool) -> Result<()> {
    let mut bytes = Vec::new();
    std::io::stdin()
        .read_to_end(&mut bytes)
        .wrap_err("read frames from stdin")?;

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    let mut bad = 0usize;
    for frame in servo_core::protocol::split_frames(&bytes) {
        match servo_core::decode_frame(frame) {
            Ok(r) if json => writeln!(out, "{}", status_json(&r))?,
            Ok(r) => writeln!(out, "{}", status_text(&r))?,
            Err(e) => {
                bad += 1;
                tracing::warn!(error = %e, len = frame.len(), "malformed frame");
            }
        }
    }
    out.flush()?;
    if bad > 0 {
        eyre::bail!("{bad} malformed frame(s) in input");
    }
    Ok(())
}
