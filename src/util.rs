//! Utility functions

use std::{cmp::min, fmt::Write};

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

use crate::{buffers::BaselineBuffer, flags::FlagMask};

/// A progress bar in the house style, drawn to stderr or hidden.
pub fn progress_bar(len: usize, message: &'static str, draw_progress: bool) -> ProgressBar {
    let draw_target = if draw_progress {
        ProgressDrawTarget::stderr()
    } else {
        ProgressDrawTarget::hidden()
    };
    let style = ProgressStyle::default_bar()
        .template("{msg:16}: [{elapsed_precise}] [{wide_bar:.cyan/blue}] {percent:3}% ({eta:5})")
        .map(|style| style.progress_chars("=> "))
        .unwrap_or_else(|_| ProgressStyle::default_bar());
    ProgressBar::with_draw_target(Some(len as u64), draw_target)
        .with_style(style)
        .with_position(0)
        .with_message(message)
}

/// Peek into the planes of a baseline buffer for debugging
///
/// # Examples
///
/// ```rust
/// use aartfaac2ms::{util::dump_buffer, BaselineBuffer, Complex};
///
/// let mut buffer = BaselineBuffer::new(2, 3);
/// buffer.set_sample(0, 1, 2, Complex::new(1.5, -0.5));
/// let dump = dump_buffer(&buffer, Some(2), None);
/// assert!(dump.contains("plane 00 chan 001 |   +0.000   +0.000   +1.500"));
/// ```
pub fn dump_buffer(
    buffer: &BaselineBuffer,
    chan_limit: Option<usize>,
    timestep_limit: Option<usize>,
) -> String {
    let mut out = String::new();
    let chan_limit = min(chan_limit.unwrap_or(usize::MAX), buffer.num_chans());
    let timestep_limit = min(timestep_limit.unwrap_or(usize::MAX), buffer.width());
    for plane_idx in 0..crate::buffers::NUM_PLANES {
        let plane = buffer.plane(plane_idx);
        for (chan, row) in plane.outer_iter().take(chan_limit).enumerate() {
            // writing to a String can't fail
            let _ = write!(&mut out, "plane {:02} chan {:03} |", plane_idx, chan);
            for value in row.iter().take(timestep_limit) {
                let _ = write!(&mut out, " {:+8.3}", value);
            }
            let _ = writeln!(&mut out);
        }
    }
    out
}

/// Peek into a flag mask for debugging: `#` is flagged, `.` is not.
///
/// # Examples
///
/// ```rust
/// use aartfaac2ms::{util::dump_flag_mask, FlagMask};
///
/// let mut mask = FlagMask::new_unflagged(2, 3);
/// mask.set(1, 0, true);
/// assert_eq!(dump_flag_mask(&mask, None, None), "chan 000 | . . . \nchan 001 | # . . \n");
/// ```
pub fn dump_flag_mask(
    mask: &FlagMask,
    chan_limit: Option<usize>,
    timestep_limit: Option<usize>,
) -> String {
    let mut out = String::new();
    let (num_chans, width) = mask.dim();
    let chan_limit = min(chan_limit.unwrap_or(num_chans), num_chans);
    let timestep_limit = min(timestep_limit.unwrap_or(width), width);
    for chan in 0..chan_limit {
        let _ = write!(&mut out, "chan {:03} | ", chan);
        for time in 0..timestep_limit {
            let symbol = if mask.get(chan, time) { "#" } else { "." };
            let _ = write!(&mut out, "{} ", symbol);
        }
        let _ = writeln!(&mut out);
    }
    out
}
