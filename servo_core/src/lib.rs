#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Servo bank engine (hardware-agnostic).
//!
//! All hardware interaction goes through the `servo_traits` seams
//! (`ServoDriver`, `AngleSensor`, `PinDriver`, `Clock`).
//!
//! ## Architecture
//!
//! - **Trajectory**: fixed-step linear ramp and eased closed-loop curve (`trajectory`)
//! - **Estimation**: multi-turn unwrapping of the magnet angle (`estimator`)
//! - **Correction**: PID with a stiction lead (`pid`)
//! - **Lifecycle**: assign → move → arrive → hold → release (`actuator`)
//! - **Power**: rail gating on aggregate in-flight state (`power`)
//! - **Registry**: `ServoBank`, the typed command surface and tick (`bank`)
//! - **Wire**: status byte and frame codec (`status`, `protocol`)
//! - **Loop**: channel-fed control loop with status sinks (`runner`)

pub mod actuator;
pub mod bank;
pub mod builder;
pub mod config;
pub mod conversions;
pub mod error;
pub mod estimator;
pub mod hw_error;
pub mod mocks;
pub mod pid;
pub mod power;
pub mod protocol;
pub mod runner;
pub mod status;
pub mod trajectory;
pub mod util;

pub use actuator::{Actuator, ActuatorKind, AssignSpec, Phase};
pub use bank::{Command, ServoBank};
pub use builder::ServoBankBuilder;
pub use config::{EaseCfg, FeedbackCfg, FeedbackProfile, LoopCfg, PidGains, PowerCfg, Timeouts};
pub use error::{BuildError, Result, ServoError};
pub use protocol::{decode_frame, encode_frame};
pub use status::{StatusFlags, StatusReport, Telemetry};
