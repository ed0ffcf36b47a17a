//! Thumbnail timecode selection.

/// Fractional positions of the source duration to take frames from.
pub const THUMBNAIL_POSITIONS: [f64; 3] = [0.1, 0.5, 0.9];

/// Pick one whole-second timecode per entry in [`THUMBNAIL_POSITIONS`].
///
/// Each raw position is clamped into `[1, max(1, duration - 1)]` to skip the
/// black frames at the very start and end, then rounded. The result is
/// capped at `floor(max(1, duration - 1))` so rounding never leaves the
/// window. Non-finite or non-positive durations yield `1` for every slot.
pub fn pick_timecodes(duration: f64) -> Vec<u32> {
    if !duration.is_finite() || duration <= 0.0 {
        return vec![1; THUMBNAIL_POSITIONS.len()];
    }

    let upper = (duration - 1.0).max(1.0);
    let cap = upper.floor().max(1.0);

    THUMBNAIL_POSITIONS
        .iter()
        .map(|p| (duration * p).clamp(1.0, upper).round().min(cap) as u32)
        .collect()
}
