//! Status output: JSON lines for humans and scripts, text for `decode`.

use std::io::Write;

use eyre::WrapErr;
use serde_json::json;
use servo_core::runner::StatusSink;
use servo_core::{StatusFlags, StatusReport};

pub fn status_json(r: &StatusReport) -> serde_json::Value {
    let f = r.flags;
    json!({
        "channel": r.channel,
        "position": r.position,
        "flags": f.encode(),
        "assigned": f.assigned,
        "moving": f.moving,
        "attached": f.attached,
        "auto_release": f.auto_release,
        "verbose": f.verbose,
        "reached": f.reached,
        "telemetry": r.telemetry.map(|t| json!({
            "elapsed_ms": t.elapsed_ms,
            "write": t.write,
            "desired": t.desired,
        })),
    })
}

fn flag_names(f: StatusFlags) -> String {
    let names: Vec<&str> = [
        (f.assigned, "assigned"),
        (f.moving, "moving"),
        (f.attached, "attached"),
        (f.auto_release, "auto_release"),
        (f.verbose, "verbose"),
        (f.reached, "reached"),
    ]
    .iter()
    .filter_map(|&(on, name)| on.then_some(name))
    .collect();
    if names.is_empty() {
        "-".to_string()
    } else {
        names.join(",")
    }
}

pub fn status_text(r: &StatusReport) -> String {
    let mut line = format!(
        "ch={} pos={} flags={}",
        r.channel,
        r.position,
        flag_names(r.flags)
    );
    if let Some(t) = r.telemetry {
        line.push_str(&format!(
            " elapsed_ms={} write={} desired={}",
            t.elapsed_ms, t.write, t.desired
        ));
    }
    line
}

/// One JSON object per status report.
pub struct JsonLines<W: Write> {
    out: W,
}

impl<W: Write> JsonLines<W> {
    pub const fn new(out: W) -> Self {
        Self { out }
    }
}

impl<W: Write> StatusSink for JsonLines<W> {
    fn send(&mut self, report: &StatusReport) -> servo_core::Result<()> {
        writeln!(self.out, "{}", status_json(report)).wrap_err("write status line")
    }

    fn flush(&mut self) -> servo_core::Result<()> {
        self.out.flush().wrap_err("flush status lines")
    }
}
