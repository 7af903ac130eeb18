//! Signal values carried on wires.
//!
//! Every port holds one `Signal` per tick. Chip kinds that can leave the
//! range clamp their result back into `[SIGNAL_MIN, SIGNAL_MAX]`.

pub type Signal = f64;

pub const SIGNAL_MIN: Signal = -100.0;
pub const SIGNAL_MAX: Signal = 100.0;

/// Value read by a socket with no incoming path.
pub const NEUTRAL: Signal = 0.0;

pub fn clamp_signal(value: Signal) -> Signal {
    value.clamp(SIGNAL_MIN, SIGNAL_MAX)
}
