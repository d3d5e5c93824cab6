//! Line protocol spoken by the host.
//!
//! One command per line, comma separated, opcode first:
//!
//! ```text
//! 0,<name>,<ch>,<min>,<max>,<autoReleaseMs>,<inverted>,<lastPos>,<railPin>
//! 1,<ch>,<pos>,<ms>    2,<ch>    3    4,<ch>
//! 5,<ch>,<ms>    6,<ch>,<pos>    7,<ch>,<0|1>
//! h,<pin>[,<pin>...]    l,<pin>[,<pin>...]
//! ```

use std::str::FromStr;

use servo_core::{AssignSpec, Command};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("unknown command {0:?}")]
    UnknownOp(String),
    #[error("command {op}: expected {expected} fields, got {got}")]
    Arity {
        op: &'static str,
        expected: usize,
        got: usize,
    },
    #[error("command {op}: bad {field} {value:?}")]
    Field {
        op: &'static str,
        field: &'static str,
        value: String,
    },
}

fn field<T: FromStr>(op: &'static str, name: &'static str, raw: &str) -> Result<T, ParseError> {
    raw.parse().map_err(|_| ParseError::Field {
        op,
        field: name,
        value: raw.to_string(),
    })
}

/// Positions follow the host's integer parsing: anything outside a byte is
/// saturated here and clamped into the servo's range by the bank.
fn position(op: &'static str, name: &'static str, raw: &str) -> Result<u8, ParseError> {
    let v: i64 = field(op, name, raw)?;
    let sat = v.clamp(0, i64::from(u8::MAX));
    if sat != v {
        tracing::warn!(op, field = name, requested = v, saturated = sat, "position out of range");
    }
    Ok(u8::try_from(sat).unwrap_or(u8::MAX))
}

fn flag(op: &'static str, name: &'static str, raw: &str) -> Result<bool, ParseError> {
    match raw {
        "0" | "false" => Ok(false),
        "1" | "true" => Ok(true),
        _ => Err(ParseError::Field {
            op,
            field: name,
            value: raw.to_string(),
        }),
    }
}

fn arity(op: &'static str, args: &[&str], expected: usize) -> Result<(), ParseError> {
    if args.len() == expected {
        Ok(())
    } else {
        Err(ParseError::Arity {
            op,
            expected,
            got: args.len(),
        })
    }
}

/// Parse one line. Blank lines and `#` comments yield `Ok(None)`.
pub fn parse_line(line: &str) -> Result<Option<Command>, ParseError> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }
    let mut parts = line.split(',').map(str::trim);
    let op = parts.next().unwrap_or_default();
    let args: Vec<&str> = parts.collect();

    let cmd = match op {
        "0" => {
            arity("assign", &args, 8)?;
            Command::Assign(AssignSpec {
                name: args[0].to_string(),
                channel: field("assign", "channel", args[1])?,
                min: field("assign", "min", args[2])?,
                max: field("assign", "max", args[3])?,
                auto_release_ms: field("assign", "autoReleaseMs", args[4])?,
                inverted: flag("assign", "inverted", args[5])?,
                initial_position: position("assign", "lastPos", args[6])?,
                rail: field("assign", "railPin", args[7])?,
            })
        }
        "1" => {
            arity("moveTo", &args, 3)?;
            Command::MoveTo {
                channel: field("moveTo", "channel", args[0])?,
                position: position("moveTo", "position", args[1])?,
                duration_ms: field("moveTo", "duration", args[2])?,
            }
        }
        "2" => {
            arity("stop", &args, 1)?;
            Command::Stop {
                channel: field("stop", "channel", args[0])?,
            }
        }
        "3" => {
            arity("stopAll", &args, 0)?;
            Command::StopAll
        }
        "4" => {
            arity("report", &args, 1)?;
            Command::Report {
                channel: field("report", "channel", args[0])?,
            }
        }
        "5" => {
            arity("setAutoRelease", &args, 2)?;
            Command::SetAutoRelease {
                channel: field("setAutoRelease", "channel", args[0])?,
                ms: field("setAutoRelease", "ms", args[1])?,
            }
        }
        "6" => {
            arity("setPosition", &args, 2)?;
            Command::SetPosition {
                channel: field("setPosition", "channel", args[0])?,
                position: position("setPosition", "position", args[1])?,
            }
        }
        "7" => {
            arity("setVerbose", &args, 2)?;
            Command::SetVerbose {
                channel: field("setVerbose", "channel", args[0])?,
                verbose: flag("setVerbose", "verbose", args[1])?,
            }
        }
        "h" | "l" => {
            let name = if op == "h" { "pinHigh" } else { "pinLow" };
            if args.is_empty() {
                return Err(ParseError::Arity {
                    op: name,
                    expected: 1,
                    got: 0,
                });
            }
            let pins = args
                .iter()
                .map(|p| field(name, "pin", p))
                .collect::<Result<Vec<u8>, _>>()?;
            if op == "h" {
                Command::PinHigh(pins)
            } else {
                Command::PinLow(pins)
            }
        }
        other => return Err(ParseError::UnknownOp(other.to_string())),
    };
    Ok(Some(cmd))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn assign_line() {
        let cmd = parse_line("0,leftElbow,12,10,170,500,1,88,40").unwrap();
        assert_eq!(
            cmd,
            Some(Command::Assign(AssignSpec {
                name: "leftElbow".into(),
                channel: 12,
                min: 10,
                max: 170,
                auto_release_ms: 500,
                inverted: true,
                initial_position: 88,
                rail: 40,
            }))
        );
    }

    #[rstest]
    #[case("1,3,120,800", Command::MoveTo { channel: 3, position: 120, duration_ms: 800 })]
    #[case(" 2, 3 ", Command::Stop { channel: 3 })]
    #[case("3", Command::StopAll)]
    #[case("4,7", Command::Report { channel: 7 })]
    #[case("5,7,0", Command::SetAutoRelease { channel: 7, ms: 0 })]
    #[case("6,7,45", Command::SetPosition { channel: 7, position: 45 })]
    #[case("7,7,1", Command::SetVerbose { channel: 7, verbose: true })]
    #[case("h,13", Command::PinHigh(vec![13]))]
    #[case("l,13,22,23", Command::PinLow(vec![13, 22, 23]))]
    fn short_commands(#[case] line: &str, #[case] expected: Command) {
        assert_eq!(parse_line(line), Ok(Some(expected)));
    }

    #[rstest]
    #[case("1,3,300,800", 255)]
    #[case("1,3,-5,800", 0)]
    #[case("1,3,180,800", 180)]
    fn out_of_range_targets_saturate(#[case] line: &str, #[case] expected: u8) {
        let cmd = parse_line(line).unwrap();
        assert_eq!(
            cmd,
            Some(Command::MoveTo {
                channel: 3,
                position: expected,
                duration_ms: 800
            })
        );
    }

    #[test]
    fn set_position_and_last_pos_saturate() {
        assert_eq!(
            parse_line("6,2,999"),
            Ok(Some(Command::SetPosition {
                channel: 2,
                position: 255
            }))
        );
        let Some(Command::Assign(spec)) = parse_line("0,x,1,0,180,0,0,-40,40").unwrap() else {
            panic!("not an assign");
        };
        assert_eq!(spec.initial_position, 0);
    }

    #[rstest]
    #[case("")]
    #[case("   ")]
    #[case("# comment")]
    fn ignorable_lines(#[case] line: &str) {
        assert_eq!(parse_line(line), Ok(None));
    }

    #[rstest]
    #[case("9,1", "unknown command")]
    #[case("1,3,120", "expected 3 fields, got 2")]
    #[case("3,1", "expected 0 fields")]
    #[case("1,3,abc,800", "bad position")]
    #[case("7,3,2", "bad verbose")]
    #[case("h", "pinHigh")]
    #[case("0,x,1,0,180,0,yes,90,40", "bad inverted")]
    fn malformed_lines(#[case] line: &str, #[case] needle: &str) {
        let err = parse_line(line).unwrap_err().to_string();
        assert!(err.contains(needle), "{err}");
    }
}
