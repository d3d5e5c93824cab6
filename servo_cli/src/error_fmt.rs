//! Human-readable error descriptions and structured JSON error formatting.

use crate::router::ParseError;

/// Map an eyre::Report to a human-readable explanation with likely causes and fix hints.
pub fn humanize(err: &eyre::Report) -> String {
    use servo_core::error::{BuildError, ServoError};

    // Typed matches first
    if let Some(be) = err.downcast_ref::<BuildError>() {
        return match be {
            BuildError::MissingServos => {
                "What happened: No servo driver was provided to the bank.\nLikely causes: The servo outputs failed to initialize or were not wired into the builder.\nHow to fix: Check [hardware.servo_pins] and GPIO permissions, or run with --sim.".to_string()
            }
            BuildError::MissingSensor => {
                "What happened: No angle sensor was provided to the bank.\nLikely causes: The I2C bus or multiplexer failed to initialize.\nHow to fix: Check hardware.i2c_bus / mux_address / sensor_address, or run with --sim.".to_string()
            }
            BuildError::MissingPins => {
                "What happened: No pin driver was provided to the bank.\nLikely causes: GPIO could not be opened for the power rails.\nHow to fix: Ensure the process has permission to access GPIO, or run with --sim.".to_string()
            }
            BuildError::InvalidConfig(msg) => format!(
                "What happened: Invalid configuration ({msg}).\nLikely causes: Missing or out-of-range values in the TOML.\nHow to fix: Edit the config file, then rerun `servoctl self-check`."
            ),
        };
    }

    if let Some(se) = err.downcast_ref::<ServoError>() {
        return match se {
            ServoError::Timeout => "What happened: Angle sensor read timed out.\nLikely causes: Magnet sensor or multiplexer not wired correctly, or timeouts.sensor_ms too low.\nHow to fix: Verify the I2C wiring and consider raising timeouts.sensor_ms (it must stay below control.tick_ms).".to_string(),
            ServoError::RailPin(pin) => format!(
                "What happened: Pin {pin} is a power rail and cannot be driven directly.\nLikely causes: A pinHigh/pinLow command named a rail pin.\nHow to fix: Rails switch on automatically when a servo on them moves."
            ),
            other => format!(
                "What happened: {other}.\nLikely causes: See logs.\nHow to fix: Re-run with --log-level=debug or set RUST_LOG for more detail."
            ),
        };
    }

    if let Some(pe) = err.downcast_ref::<ParseError>() {
        return format!(
            "What happened: {pe}.\nLikely causes: The host sent a malformed command line.\nHow to fix: Check the line format (e.g. `1,<ch>,<pos>,<ms>`)."
        );
    }

    // String-based heuristics for errors coming from init or config
    let msg = err.to_string();
    let chain = format!("{err:#}").to_ascii_lowercase();

    if chain.contains("read config") {
        return format!(
            "What happened: The config file could not be read.\nLikely causes: Wrong --config path or missing permissions.\nHow to fix: Pass --config <FILE> pointing at a readable TOML file. Original: {msg}"
        );
    }

    if chain.contains("parse config") {
        return format!(
            "What happened: The config file is not valid TOML for this tool.\nLikely causes: Typo in a key, wrong value type, or an unknown section.\nHow to fix: Compare with etc/servo_config.toml. Original: {err:#}"
        );
    }

    if chain.contains("invalid config") {
        return format!(
            "What happened: Configuration is invalid or incomplete.\nLikely causes: Out-of-range values or duplicate channels/pins.\nHow to fix: Edit the TOML config and try again. Original: {err:#}"
        );
    }

    if chain.contains("gpio") || chain.contains("i2c") {
        return format!(
            "What happened: Failed to initialize hardware.\nLikely causes: Incorrect pin numbers, I2C disabled, or insufficient permissions.\nHow to fix: Fix the [hardware] section and check access to /dev/gpiomem and /dev/i2c-*. Original: {msg}"
        );
    }

    // Generic fallback
    let mut cause = String::new();
    if let Some(src) = err.source() {
        cause = format!(" Cause: {src}");
    }
    format!(
        "Something went wrong.{cause}\nHow to fix: Re-run with --log-level=debug for details. Original: {msg}"
    )
}

/// Stable exit codes: 2 configuration, 3 hardware, 1 anything else.
pub fn exit_code_for_error(err: &eyre::Report) -> i32 {
    use servo_core::error::BuildError;
    match err.downcast_ref::<BuildError>() {
        Some(BuildError::InvalidConfig(_)) => return 2,
        Some(_) => return 3,
        None => {}
    }
    let chain = format!("{err:#}").to_ascii_lowercase();
    if chain.contains("parse config") || chain.contains("invalid config") {
        2
    } else if chain.contains("gpio") || chain.contains("i2c") {
        3
    } else {
        1
    }
}

fn reason_name(err: &eyre::Report) -> &'static str {
    use servo_core::error::BuildError;
    if err.downcast_ref::<BuildError>().is_some() {
        return "Build";
    }
    match exit_code_for_error(err) {
        2 => "Config",
        3 => "Hardware",
        _ => "Error",
    }
}

/// Structured JSON for errors when --json is enabled.
pub fn format_error_json(err: &eyre::Report) -> String {
    use serde_json::json;
    json!({
        "reason": reason_name(err),
        "exit_code": exit_code_for_error(err),
        "message": humanize(err),
    })
    .to_string()
}
