//! One servo's lifecycle: assign, move, arrive, hold, release.
//!
//! The phase is the single source of truth; the flags reported on the wire
//! (`moving`, `attached`, in-flight) are derived from it.

use std::time::Duration;

use servo_traits::{AngleSensor, ServoDriver};

use crate::config::{FeedbackCfg, FeedbackProfile, LoopCfg};
use crate::error::ServoError;
use crate::estimator::PositionEstimator;
use crate::hw_error::map_hw_error;
use crate::pid::{Pid, stiction_lead};
use crate::status::{StatusFlags, StatusReport, Telemetry};
use crate::trajectory::{LinearRamp, eased_position};
use crate::util::{
    POSITION_MAX, clamp_position, elapsed_ticks, ramp_steps, servo_write_value,
};

/// Hardware handles an actuator drives during one operation.
pub struct Drive<'a> {
    pub servos: &'a mut dyn ServoDriver,
    pub sensor: &'a mut dyn AngleSensor,
    pub sensor_timeout: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Known channel (e.g. a configured feedback joint) that was never assigned.
    Unassigned,
    /// Attached and holding, no move pending.
    Idle,
    Moving,
    /// Arrived; held until the auto-release delay passes.
    Holding { arrived_ms: u64 },
    /// Drive disabled.
    Released,
}

/// Parameters of an assign command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssignSpec {
    pub name: String,
    pub channel: u8,
    pub min: u8,
    pub max: u8,
    pub auto_release_ms: u64,
    pub inverted: bool,
    pub initial_position: u8,
    /// Output pin of the power rail feeding this servo.
    pub rail: u8,
}

#[derive(Debug, Clone)]
pub struct FeedbackState {
    profile: FeedbackProfile,
    cfg: FeedbackCfg,
    estimator: PositionEstimator,
    pid: Pid,
    last_write: u8,
    desired: f32,
    prev_step_ms: u64,
}

impl FeedbackState {
    fn new(profile: FeedbackProfile, cfg: FeedbackCfg) -> Self {
        Self {
            estimator: PositionEstimator::new(
                profile.sensor_channel,
                profile.deg_per_unit,
                profile.inverted,
            ),
            pid: Pid::new(profile.gains),
            profile,
            cfg,
            last_write: 0,
            desired: 0.0,
            prev_step_ms: 0,
        }
    }

    pub const fn profile(&self) -> &FeedbackProfile {
        &self.profile
    }
}

#[derive(Debug, Clone)]
pub enum ActuatorKind {
    Plain(LinearRamp),
    Feedback(Box<FeedbackState>),
}

#[derive(Debug, Clone)]
pub struct Actuator {
    name: String,
    channel: u8,
    min: u8,
    max: u8,
    inverted: bool,
    auto_release_ms: u64,
    rail: u8,
    verbose: bool,
    phase: Phase,
    position: u8,
    target: u8,
    start: u8,
    start_ms: u64,
    duration_ms: u64,
    last_status_ms: u64,
    last_reported: u8,
    timing: LoopCfg,
    kind: ActuatorKind,
}

impl Actuator {
    pub fn plain(channel: u8, timing: LoopCfg) -> Self {
        Self::with_kind(channel, timing, ActuatorKind::Plain(LinearRamp::new(0, 0, 0)))
    }

    pub fn feedback(profile: FeedbackProfile, cfg: FeedbackCfg, timing: LoopCfg) -> Self {
        Self::with_kind(
            profile.channel,
            timing,
            ActuatorKind::Feedback(Box::new(FeedbackState::new(profile, cfg))),
        )
    }

    fn with_kind(channel: u8, timing: LoopCfg, kind: ActuatorKind) -> Self {
        Self {
            name: String::new(),
            channel,
            min: 0,
            max: POSITION_MAX,
            inverted: false,
            auto_release_ms: 0,
            rail: 0,
            verbose: false,
            phase: Phase::Unassigned,
            position: 0,
            target: 0,
            start: 0,
            start_ms: 0,
            duration_ms: 0,
            last_status_ms: 0,
            last_reported: 0,
            timing,
            kind,
        }
    }

    // ── Accessors ────────────────────────────────────────────────────────────

    pub fn name(&self) -> &str {
        &self.name
    }
    pub const fn channel(&self) -> u8 {
        self.channel
    }
    pub const fn rail(&self) -> u8 {
        self.rail
    }
    pub const fn phase(&self) -> Phase {
        self.phase
    }
    pub const fn position(&self) -> u8 {
        self.position
    }
    pub const fn target(&self) -> u8 {
        self.target
    }
    pub const fn range(&self) -> (u8, u8) {
        (self.min, self.max)
    }
    pub const fn auto_release_ms(&self) -> u64 {
        self.auto_release_ms
    }
    pub const fn verbose(&self) -> bool {
        self.verbose
    }
    pub const fn kind(&self) -> &ActuatorKind {
        &self.kind
    }
    pub const fn is_feedback(&self) -> bool {
        matches!(self.kind, ActuatorKind::Feedback(_))
    }
    pub const fn is_assigned(&self) -> bool {
        !matches!(self.phase, Phase::Unassigned)
    }
    pub const fn is_moving(&self) -> bool {
        matches!(self.phase, Phase::Moving)
    }
    pub const fn is_attached(&self) -> bool {
        matches!(
            self.phase,
            Phase::Idle | Phase::Moving | Phase::Holding { .. }
        )
    }
    /// Keeps the owning rail energized.
    pub const fn in_flight(&self) -> bool {
        matches!(self.phase, Phase::Moving | Phase::Holding { .. })
    }

    // ── Commands ─────────────────────────────────────────────────────────────

    /// Bind (or rebind) this channel. The servo is left released until the
    /// next power-up or move.
    pub fn assign(
        &mut self,
        spec: &AssignSpec,
        drive: &mut Drive<'_>,
        now_ms: u64,
        out: &mut Vec<StatusReport>,
    ) -> Result<(), ServoError> {
        if spec.min > spec.max || spec.min > POSITION_MAX {
            return Err(ServoError::InvalidRange {
                channel: spec.channel,
                min: spec.min,
                max: spec.max,
            });
        }
        self.name.clone_from(&spec.name);
        self.min = spec.min;
        self.max = spec.max.min(POSITION_MAX);
        self.inverted = spec.inverted;
        self.auto_release_ms = spec.auto_release_ms;
        self.rail = spec.rail;
        self.position = self.clamp_logged(spec.initial_position, "initial position");
        self.target = self.position;
        self.start = self.position;
        self.duration_ms = 0;
        if let ActuatorKind::Feedback(fb) = &mut self.kind {
            fb.estimator.end();
            fb.pid.reset();
        }
        self.detach(drive);
        self.phase = Phase::Released;
        tracing::info!(
            channel = self.channel,
            name = %self.name,
            min = self.min,
            max = self.max,
            rail = self.rail,
            inverted = self.inverted,
            auto_release_ms = self.auto_release_ms,
            feedback = self.is_feedback(),
            "servo assigned"
        );
        self.emit(now_ms, out);
        Ok(())
    }

    /// Start a move toward `target` over `duration_ms`.
    pub fn move_to(
        &mut self,
        target: u8,
        duration_ms: u64,
        drive: &mut Drive<'_>,
        now_ms: u64,
        out: &mut Vec<StatusReport>,
    ) -> Result<(), ServoError> {
        if !self.is_assigned() {
            return Err(ServoError::NotAssigned(self.channel));
        }
        let target = self.clamp_logged(target, "move target");
        if self.is_moving() {
            tracing::warn!(
                channel = self.channel,
                "new move while moving, stopping current move first"
            );
            self.stop(now_ms, out)?;
        }
        if !self.is_attached() {
            self.power_up(drive);
        }

        if target == self.position {
            self.target = target;
            self.start = target;
            self.start_ms = now_ms;
            self.duration_ms = duration_ms;
            self.phase = Phase::Holding { arrived_ms: now_ms };
            self.trace("already at target", now_ms);
            self.emit(now_ms, out);
            return Ok(());
        }

        self.start = self.position;
        self.target = target;
        self.start_ms = now_ms;
        self.duration_ms = duration_ms;
        self.phase = Phase::Moving;

        match &mut self.kind {
            ActuatorKind::Plain(ramp) => {
                *ramp = LinearRamp::new(
                    self.start,
                    target,
                    ramp_steps(duration_ms, self.timing.tick_ms),
                );
            }
            ActuatorKind::Feedback(fb) => {
                let angle = fb.estimator.sample(drive.sensor, drive.sensor_timeout);
                let travel = fb.estimator.begin(angle, self.start, target);
                fb.pid.reset();
                fb.desired = f32::from(self.start);
                fb.prev_step_ms = now_ms;
                tracing::debug!(
                    channel = self.channel,
                    start_angle = angle,
                    ?travel,
                    "feedback move anchored"
                );
            }
        }
        tracing::debug!(
            channel = self.channel,
            from = self.start,
            to = target,
            duration_ms,
            "move started"
        );
        Ok(())
    }

    /// Halt where we are. The current estimate becomes the target; the
    /// servo stays attached until its rail is switched off.
    pub fn stop(&mut self, now_ms: u64, out: &mut Vec<StatusReport>) -> Result<(), ServoError> {
        if !self.is_assigned() {
            return Err(ServoError::NotAssigned(self.channel));
        }
        if self.in_flight() {
            self.phase = Phase::Idle;
        }
        self.target = self.position;
        if let ActuatorKind::Feedback(fb) = &mut self.kind {
            fb.estimator.end();
        }
        tracing::debug!(channel = self.channel, position = self.position, "stopped");
        self.emit(now_ms, out);
        Ok(())
    }

    /// Overwrite the stored position without moving.
    pub fn set_position(&mut self, position: u8) -> Result<(), ServoError> {
        if !self.is_assigned() {
            return Err(ServoError::NotAssigned(self.channel));
        }
        self.position = self.clamp_logged(position, "set position");
        if !self.is_moving() {
            self.target = self.position;
            self.start = self.position;
        }
        Ok(())
    }

    pub fn set_auto_release(&mut self, ms: u64) -> Result<(), ServoError> {
        if !self.is_assigned() {
            return Err(ServoError::NotAssigned(self.channel));
        }
        self.auto_release_ms = ms;
        Ok(())
    }

    pub fn set_verbose(&mut self, verbose: bool) -> Result<(), ServoError> {
        if !self.is_assigned() {
            return Err(ServoError::NotAssigned(self.channel));
        }
        self.verbose = verbose;
        tracing::info!(channel = self.channel, verbose, "verbose toggled");
        Ok(())
    }

    /// Queue the current status unconditionally.
    pub fn report(&mut self, now_ms: u64, out: &mut Vec<StatusReport>) {
        self.emit(now_ms, out);
    }

    // ── Power hooks ──────────────────────────────────────────────────────────

    /// Rail came up: drive the last known position and attach.
    pub fn power_up(&mut self, drive: &mut Drive<'_>) {
        if !self.is_assigned() {
            return;
        }
        let raw = servo_write_value(self.position, self.inverted);
        if let Err(e) = drive.servos.write(self.channel, raw) {
            tracing::warn!(channel = self.channel, error = %map_hw_error(e.as_ref()), "servo write failed");
        }
        if let Err(e) = drive.servos.attach(self.channel) {
            tracing::warn!(channel = self.channel, error = %map_hw_error(e.as_ref()), "servo attach failed");
        }
        if matches!(self.phase, Phase::Released) {
            self.phase = Phase::Idle;
        }
        if let ActuatorKind::Feedback(fb) = &mut self.kind {
            fb.last_write = raw;
        }
    }

    /// Rail went down (or the hold expired): disable the drive.
    pub fn force_release(&mut self, drive: &mut Drive<'_>, now_ms: u64, out: &mut Vec<StatusReport>) {
        if !self.is_assigned() || matches!(self.phase, Phase::Released) {
            return;
        }
        self.detach(drive);
        self.phase = Phase::Released;
        self.target = self.position;
        self.trace("released", now_ms);
        self.emit(now_ms, out);
    }

    // ── Tick ─────────────────────────────────────────────────────────────────

    /// One control step. Must run at least every `tick_ms`.
    pub fn update(&mut self, drive: &mut Drive<'_>, now_ms: u64, out: &mut Vec<StatusReport>) {
        match self.phase {
            Phase::Unassigned | Phase::Idle | Phase::Released => {}
            Phase::Holding { arrived_ms } => {
                if self.auto_release_ms > 0
                    && now_ms.saturating_sub(arrived_ms) > self.auto_release_ms
                {
                    self.force_release(drive, now_ms, out);
                }
            }
            Phase::Moving => {
                let elapsed = now_ms.saturating_sub(self.start_ms);
                // at least two ticks: a sub-tick move still gets its arrival step
                let limit = self
                    .duration_ms
                    .saturating_mul(2)
                    .max(self.timing.tick_ms.saturating_mul(2))
                    .saturating_add(self.auto_release_ms);
                if elapsed > limit {
                    tracing::warn!(
                        channel = self.channel,
                        elapsed_ms = elapsed,
                        limit_ms = limit,
                        position = self.position,
                        target = self.target,
                        "move overran, forcing stop"
                    );
                    // stop() cannot fail here: a moving actuator is assigned
                    let _ = self.stop(now_ms, out);
                    return;
                }
                if self.is_feedback() {
                    self.step_feedback(drive, now_ms, elapsed, out);
                } else {
                    self.step_plain(drive, now_ms, out);
                }
            }
        }
    }

    fn step_plain(&mut self, drive: &mut Drive<'_>, now_ms: u64, out: &mut Vec<StatusReport>) {
        let ActuatorKind::Plain(ramp) = &mut self.kind else {
            return;
        };
        match ramp.advance() {
            Some(next) => {
                self.position = clamp_position(next, self.min, self.max);
                self.write(drive, self.position);
                self.trace("step", now_ms);
                self.emit_progress(now_ms, out);
            }
            None => {
                self.position = self.target;
                self.write(drive, self.position);
                self.arrive(now_ms, out);
            }
        }
    }

    fn step_feedback(
        &mut self,
        drive: &mut Drive<'_>,
        now_ms: u64,
        elapsed: u64,
        out: &mut Vec<StatusReport>,
    ) {
        let (start, target, min, max) = (self.start, self.target, self.min, self.max);
        let ActuatorKind::Feedback(fb) = &mut self.kind else {
            return;
        };
        let sample = fb.estimator.sample(drive.sensor, drive.sensor_timeout);
        let estimate = fb.estimator.estimate(sample, start, target, min, max);
        fb.desired = eased_position(start, target, elapsed, self.duration_ms, &fb.cfg.ease);

        if estimate.abs_diff(target) <= fb.cfg.arrive_tolerance {
            fb.estimator.end();
            fb.desired = f32::from(target);
            self.position = estimate;
            self.write(drive, target);
            self.arrive(now_ms, out);
            return;
        }

        let command = if estimate.abs_diff(start) < fb.cfg.stiction_threshold {
            stiction_lead(fb.desired, start, target)
        } else {
            let ticks = elapsed_ticks(now_ms.saturating_sub(fb.prev_step_ms), self.timing.tick_ms);
            fb.pid.correct(fb.desired, f32::from(estimate), ticks)
        };
        fb.prev_step_ms = now_ms;
        self.position = estimate;
        self.write(drive, clamp_position(command, 0, POSITION_MAX));
        self.trace("feedback step", now_ms);
        self.emit_progress(now_ms, out);
    }

    fn arrive(&mut self, now_ms: u64, out: &mut Vec<StatusReport>) {
        self.phase = Phase::Holding { arrived_ms: now_ms };
        tracing::debug!(
            channel = self.channel,
            position = self.position,
            elapsed_ms = now_ms.saturating_sub(self.start_ms),
            "arrived"
        );
        self.emit(now_ms, out);
    }

    // ── Helpers ──────────────────────────────────────────────────────────────

    fn clamp_logged(&self, requested: u8, what: &'static str) -> u8 {
        let clamped = requested.clamp(self.min, self.max);
        if clamped != requested {
            tracing::warn!(
                channel = self.channel,
                requested,
                clamped,
                min = self.min,
                max = self.max,
                "{what} outside allowed range, clamped"
            );
        }
        clamped
    }

    /// `position` is logical; inversion is applied here.
    fn write(&mut self, drive: &mut Drive<'_>, position: u8) {
        let raw = servo_write_value(position, self.inverted);
        if let Err(e) = drive.servos.write(self.channel, raw) {
            tracing::warn!(channel = self.channel, error = %map_hw_error(e.as_ref()), "servo write failed");
        }
        if let ActuatorKind::Feedback(fb) = &mut self.kind {
            fb.last_write = raw;
        }
    }

    fn detach(&self, drive: &mut Drive<'_>) {
        if let Err(e) = drive.servos.detach(self.channel) {
            tracing::warn!(channel = self.channel, error = %map_hw_error(e.as_ref()), "servo detach failed");
        }
    }

    fn trace(&self, what: &'static str, now_ms: u64) {
        if self.verbose {
            tracing::info!(channel = self.channel, position = self.position, target = self.target, now_ms, "{what}");
        } else {
            tracing::trace!(channel = self.channel, position = self.position, target = self.target, now_ms, "{what}");
        }
    }

    pub fn flags(&self) -> StatusFlags {
        StatusFlags {
            assigned: self.is_assigned(),
            moving: self.is_moving(),
            attached: self.is_attached(),
            auto_release: self.auto_release_ms > 0,
            verbose: self.verbose,
            reached: !self.is_moving() && self.position == self.target,
        }
    }

    pub fn status(&self, now_ms: u64) -> StatusReport {
        let telemetry = match &self.kind {
            ActuatorKind::Plain(_) => None,
            ActuatorKind::Feedback(fb) => Some(Telemetry {
                elapsed_ms: now_ms.saturating_sub(self.start_ms),
                write: fb.last_write,
                desired: clamp_position(fb.desired, 0, POSITION_MAX),
            }),
        };
        StatusReport {
            channel: self.channel,
            flags: self.flags(),
            position: self.position,
            telemetry,
        }
    }

    fn emit(&mut self, now_ms: u64, out: &mut Vec<StatusReport>) {
        out.push(self.status(now_ms));
        self.last_status_ms = now_ms;
        self.last_reported = self.position;
    }

    /// Position-change status, rate limited by `status_interval_ms`.
    fn emit_progress(&mut self, now_ms: u64, out: &mut Vec<StatusReport>) {
        if self.position != self.last_reported
            && now_ms.saturating_sub(self.last_status_ms) > self.timing.status_interval_ms
        {
            self.emit(now_ms, out);
        }
    }
}
