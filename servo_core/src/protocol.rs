//! Binary status frames sent back to the host.
//!
//! ```text
//! plain:    [0xC0|channel, flags, 0x10+pos] 0x0A
//! feedback: [0xC0|channel, flags, 0x10+pos, 0x80|ms>>7, 0x80|ms&0x7f,
//!            0x10+write, 0x10+desired] 0x0A
//! ```
//!
//! No payload byte can equal the `0x0A` terminator, so a byte stream splits
//! into frames on newlines alone.

use thiserror::Error;

use crate::status::{StatusFlags, StatusReport, Telemetry};
use crate::util::POSITION_MAX;

pub const TERMINATOR: u8 = 0x0A;
pub const CHANNEL_MARKER: u8 = 0xC0;
pub const POSITION_OFFSET: u8 = 0x10;
/// Largest elapsed time the two 7-bit groups can carry.
pub const ELAPSED_MAX_MS: u64 = 0x3fff;

const PLAIN_LEN: usize = 3;
const FEEDBACK_LEN: usize = 7;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("frame length {0} is neither 3 nor 7 bytes")]
    Length(usize),
    #[error("bad channel marker {0:#04x}")]
    ChannelMarker(u8),
    #[error("bad status byte {0:#04x}")]
    Flags(u8),
    #[error("position byte {0:#04x} out of range")]
    Position(u8),
    #[error("bad elapsed-time byte {0:#04x}")]
    Elapsed(u8),
}

const fn pos_byte(p: u8) -> u8 {
    let p = if p > POSITION_MAX { POSITION_MAX } else { p };
    POSITION_OFFSET + p
}

fn pos_from(b: u8) -> Result<u8, FrameError> {
    match b.checked_sub(POSITION_OFFSET) {
        Some(p) if p <= POSITION_MAX => Ok(p),
        _ => Err(FrameError::Position(b)),
    }
}

/// Encode one report, terminator included.
pub fn encode_frame(r: &StatusReport) -> Vec<u8> {
    let mut out = Vec::with_capacity(FEEDBACK_LEN + 1);
    out.push(CHANNEL_MARKER | (r.channel & 0x3f));
    out.push(r.flags.encode());
    out.push(pos_byte(r.position));
    if let Some(t) = r.telemetry {
        let ms = t.elapsed_ms.min(ELAPSED_MAX_MS) as u16;
        out.push(0x80 | ((ms >> 7) & 0x7f) as u8);
        out.push(0x80 | (ms & 0x7f) as u8);
        out.push(pos_byte(t.write));
        out.push(pos_byte(t.desired));
    }
    out.push(TERMINATOR);
    out
}

/// Decode one frame, with or without its trailing terminator.
pub fn decode_frame(frame: &[u8]) -> Result<StatusReport, FrameError> {
    let body = frame.strip_suffix(&[TERMINATOR]).unwrap_or(frame);
    if body.len() != PLAIN_LEN && body.len() != FEEDBACK_LEN {
        return Err(FrameError::Length(body.len()));
    }
    let marker = body[0];
    if marker & CHANNEL_MARKER != CHANNEL_MARKER {
        return Err(FrameError::ChannelMarker(marker));
    }
    let flags = StatusFlags::decode(body[1]).ok_or(FrameError::Flags(body[1]))?;
    let position = pos_from(body[2])?;
    let telemetry = if body.len() == FEEDBACK_LEN {
        let (hi, lo) = (body[3], body[4]);
        if hi & 0x80 == 0 {
            return Err(FrameError::Elapsed(hi));
        }
        if lo & 0x80 == 0 {
            return Err(FrameError::Elapsed(lo));
        }
        Some(Telemetry {
            elapsed_ms: (u64::from(hi & 0x7f) << 7) | u64::from(lo & 0x7f),
            write: pos_from(body[5])?,
            desired: pos_from(body[6])?,
        })
    } else {
        None
    };
    Ok(StatusReport {
        channel: marker & 0x3f,
        flags,
        position,
        telemetry,
    })
}

/// Split a received byte stream into frames (terminators dropped, empty
/// segments skipped).
pub fn split_frames(stream: &[u8]) -> impl Iterator<Item = &[u8]> {
    stream
        .split(|&b| b == TERMINATOR)
        .filter(|seg| !seg.is_empty())
}
