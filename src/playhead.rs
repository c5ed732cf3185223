//! Transport bookkeeping for a looping clip.
//!
//! The position is never accumulated per block. It is reconstructed from the
//! audio clock as `offset + (now - anchor) * rate`, where `rate` is the
//! effective rate that has been in force since `anchor`. Any rate change
//! while running must [`reanchor`](Playhead::reanchor) first, otherwise the
//! new rate would be applied retroactively and the position would jump.

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Playhead {
    /// Buffer seconds at the anchor (or the paused position).
    offset: f64,
    /// Context time the offset was taken at, `None` while paused.
    anchor: Option<f64>,
}

impl Playhead {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_running(&self) -> bool {
        self.anchor.is_some()
    }

    /// Paused position, or the position at the last anchor.
    pub fn offset(&self) -> f64 {
        self.offset
    }

    /// Start running from the current offset.
    pub fn start(&mut self, now: f64) {
        self.anchor = Some(now);
    }

    /// Unwrapped position at `now`. `rate` is the effective rate since the anchor.
    pub fn position(&self, now: f64, rate: f64) -> f64 {
        match self.anchor {
            Some(anchor) => self.offset + (now - anchor).max(0.0) * rate,
            None => self.offset,
        }
    }

    /// Fold elapsed time at the outgoing `rate` into the offset and re-anchor
    /// at `now`. No-op while paused.
    pub fn reanchor(&mut self, now: f64, rate: f64) {
        if self.anchor.is_some() {
            self.offset = self.position(now, rate);
            self.anchor = Some(now);
        }
    }

    /// Stop running and keep the position, wrapped into `[0, duration)`.
    pub fn freeze(&mut self, now: f64, rate: f64, duration: f64) {
        self.offset = wrap(self.position(now, rate), duration);
        self.anchor = None;
    }

    /// Jump to `offset`. A running playhead re-anchors at `now`.
    pub fn set_offset(&mut self, offset: f64, now: f64) {
        self.offset = offset;
        if self.anchor.is_some() {
            self.anchor = Some(now);
        }
    }

    /// Back to zero, not running.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Wrap a position into a loop of `duration` seconds.
pub fn wrap(position: f64, duration: f64) -> f64 {
    if duration > 0.0 {
        position.rem_euclid(duration)
    } else {
        0.0
    }
}
