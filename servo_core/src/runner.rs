//! The cooperative control loop.
//!
//! Commands arrive on a channel from whatever parses the host link; the loop
//! applies them between ticks, ticks the bank at a fixed cadence and forwards
//! every status report to a sink.

use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crossbeam_channel as xch;
use eyre::WrapErr;

use crate::bank::{Command, ServoBank};
use crate::error::Result;
use crate::protocol::encode_frame;
use crate::status::StatusReport;

/// Where status reports go.
pub trait StatusSink {
    fn send(&mut self, report: &StatusReport) -> Result<()>;
    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

impl StatusSink for Vec<StatusReport> {
    fn send(&mut self, report: &StatusReport) -> Result<()> {
        self.push(report.clone());
        Ok(())
    }
}

/// Binary frames onto any writer (serial port, stdout).
pub struct FrameWriter<W: Write> {
    inner: W,
}

impl<W: Write> FrameWriter<W> {
    pub const fn new(inner: W) -> Self {
        Self { inner }
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> StatusSink for FrameWriter<W> {
    fn send(&mut self, report: &StatusReport) -> Result<()> {
        self.inner
            .write_all(&encode_frame(report))
            .wrap_err("write status frame")
    }

    fn flush(&mut self) -> Result<()> {
        self.inner.flush().wrap_err("flush status frames")
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    /// After the command channel closes, keep ticking at most this long for
    /// in-flight moves to finish and rails to drop.
    pub drain_timeout_ms: u64,
    /// Hard stop after this many ticks (tests, benchmarks).
    pub max_ticks: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Shutdown flag raised (Ctrl-C).
    Shutdown,
    /// Command source closed and the bank went quiet.
    Drained,
    /// Command source closed but something was still in flight.
    DrainTimeout,
    TickLimit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub reason: StopReason,
    pub ticks: u64,
    pub commands: u64,
    pub rejected: u64,
    pub statuses: u64,
}

/// Run until shutdown, drain, or the tick limit. The bank is shut down
/// (everything stopped, rails off) before returning.
pub fn run(
    bank: &mut ServoBank,
    commands: &xch::Receiver<Command>,
    sink: &mut dyn StatusSink,
    shutdown: &AtomicBool,
    opts: RunOptions,
) -> Result<RunSummary> {
    let tick = Duration::from_millis(bank.timing().tick_ms);
    let mut summary = RunSummary {
        reason: StopReason::Shutdown,
        ticks: 0,
        commands: 0,
        rejected: 0,
        statuses: 0,
    };
    let mut closed_at: Option<u64> = None;
    tracing::info!(tick_ms = bank.timing().tick_ms, "control loop start");

    summary.reason = loop {
        if shutdown.load(Ordering::Relaxed) {
            break StopReason::Shutdown;
        }
        if opts.max_ticks.is_some_and(|n| summary.ticks >= n) {
            break StopReason::TickLimit;
        }

        loop {
            match commands.try_recv() {
                Ok(cmd) => {
                    summary.commands += 1;
                    if bank.apply(cmd).is_err() {
                        summary.rejected += 1;
                    }
                }
                Err(xch::TryRecvError::Empty) => break,
                Err(xch::TryRecvError::Disconnected) => {
                    if closed_at.is_none() {
                        tracing::info!("command source closed, draining");
                        closed_at = Some(bank.now_ms());
                    }
                    break;
                }
            }
        }

        bank.tick();
        summary.ticks += 1;
        summary.statuses += forward(bank, sink)?;

        if let Some(t0) = closed_at {
            if bank.is_quiescent() {
                break StopReason::Drained;
            }
            if bank.now_ms().saturating_sub(t0) > opts.drain_timeout_ms {
                tracing::warn!(
                    in_flight = bank.in_flight_count(),
                    "drain timeout, shutting down with servos in flight"
                );
                break StopReason::DrainTimeout;
            }
        }

        bank.clock.sleep(tick);
    };

    bank.shutdown();
    summary.statuses += forward(bank, sink)?;
    sink.flush()?;
    tracing::info!(
        reason = ?summary.reason,
        ticks = summary.ticks,
        commands = summary.commands,
        rejected = summary.rejected,
        statuses = summary.statuses,
        "control loop complete"
    );
    Ok(summary)
}

fn forward(bank: &mut ServoBank, sink: &mut dyn StatusSink) -> Result<u64> {
    let mut n = 0;
    for r in bank.drain_status() {
        sink.send(&r)?;
        n += 1;
    }
    if n > 0 {
        sink.flush()?;
    }
    Ok(n)
}
