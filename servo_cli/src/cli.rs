//! CLI argument definitions and shared statics.

use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::sync::OnceLock;

pub static FILE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();
/// Whether the user asked for JSON output (controls structured error output).
pub static JSON_MODE: OnceLock<bool> = OnceLock::new();

#[derive(Parser, Debug)]
#[command(name = "servoctl", version, about = "Servo bank controller")]
pub struct Cli {
    /// Path to config TOML (typed)
    #[arg(long, value_name = "FILE", default_value = "etc/servo_config.toml")]
    pub config: PathBuf,

    /// Emit status reports and errors as JSON lines instead of binary frames / text
    #[arg(long, action = ArgAction::SetTrue, global = true)]
    pub json: bool,

    /// Console log level (error|warn|info|debug|trace); RUST_LOG wins, config is the fallback
    #[arg(long = "log-level", value_name = "LEVEL", global = true)]
    pub log_level: Option<String>,

    /// Command to execute
    #[command(subcommand)]
    pub cmd: Commands,
}

/// Memory locking mode for real-time operation.
#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum RtLock {
    /// Do not lock memory
    None,
    /// Lock currently resident pages
    Current,
    /// Lock current and future pages
    All,
}

impl RtLock {
    #[inline]
    pub const fn os_default() -> Self {
        if cfg!(target_os = "linux") {
            Self::Current
        } else {
            Self::None
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Read command lines from stdin and drive the servo bank until EOF or Ctrl-C
    Run {
        /// Use the simulated bench even when built with hardware support
        #[arg(long, action = ArgAction::SetTrue)]
        sim: bool,
        /// After stdin closes, keep ticking at most this long for moves to finish
        #[arg(long, value_name = "MS", default_value_t = 5_000)]
        drain_timeout_ms: u64,
        /// Stop after this many control ticks
        #[arg(long, value_name = "N")]
        max_ticks: Option<u64>,
        /// Enable real-time mode (SCHED_FIFO, affinity, mlockall)
        #[arg(
            long,
            action = ArgAction::SetTrue,
            long_help = "Enable real-time mode on supported OSes.\n\nLinux: attempts SCHED_FIFO priority, pins the process to one CPU and locks memory with mlockall. This reduces tick jitter but may require CAP_SYS_NICE / CAP_IPC_LOCK or root.\n\nOther OSes: only memory locking is attempted."
        )]
        rt: bool,
        /// Real-time priority for SCHED_FIFO on Linux (clamped to the system range)
        #[arg(long, value_name = "PRIO")]
        rt_prio: Option<i32>,
        /// Memory locking mode for --rt: none, current, or all
        #[arg(long, value_enum, value_name = "MODE")]
        rt_lock: Option<RtLock>,
        /// CPU index to pin to under --rt (Linux only, default 0)
        #[arg(long, value_name = "CPU")]
        rt_cpu: Option<usize>,
    },
    /// Decode binary status frames from stdin
    Decode,
    /// Validate the config and build the bank (hardware presence / sim ok)
    SelfCheck,
}
