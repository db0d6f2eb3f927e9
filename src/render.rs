use std::fmt::Write;
use std::time::{Duration, Instant};

use crate::scheduler::Lane;

/// Spin for `cost` to stand in for expensive rendering work.
pub fn burn(cost: Duration) {
    if cost.is_zero() {
        return;
    }
    let start = Instant::now();
    while start.elapsed() < cost {
        std::hint::spin_loop();
    }
}

/// What was on screen after one commit.
///
/// `oldest..=version` are the store versions the committed views were
/// rendered from; they differ only when a pass read the store more than
/// once and the store moved in between.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    pub oldest: u64,
    pub version: u64,
    pub lane: Lane,
    pub header: i64,
    pub cells: Vec<i64>,
}

impl Frame {
    /// True if any leaf disagrees with the header.
    pub fn is_torn(&self) -> bool {
        self.cells.iter().any(|&c| c != self.header)
    }
}

/// Render a frame as one line, e.g. `v3 sync       Count -1 | -1x50`, or
/// `v1..2 transition ...` when the pass read more than one version.
///
/// Cells are grouped into runs so a torn frame reads as `1x11 0x39`.
pub fn format_frame(frame: &Frame) -> String {
    let lane = match frame.lane {
        Lane::Sync => "sync",
        Lane::Transition => "transition",
    };
    let versions = if frame.oldest == frame.version {
        frame.version.to_string()
    } else {
        format!("{}..{}", frame.oldest, frame.version)
    };
    let mut out = format!("v{versions} {lane:<10} Count {} |", frame.header);

    let mut cells = frame.cells.iter().copied().peekable();
    while let Some(value) = cells.next() {
        let mut run = 1usize;
        while cells.next_if_eq(&value).is_some() {
            run += 1;
        }
        let _ = write!(out, " {value}x{run}");
    }

    if frame.is_torn() {
        out.push_str("  TORN");
    }
    out
}
