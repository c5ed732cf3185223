//! Audio context: the engine's audio clock.
//!
//! Time is the number of frames rendered so far divided by the sample rate,
//! so it only moves while the host pulls audio from a running context.

/// Whether the context is allowed to produce sound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextState {
    /// Waiting for a user gesture; renders silence and the clock stands still.
    Suspended,
    Running,
}

#[derive(Debug, Clone)]
pub struct AudioContext {
    sample_rate: f64,
    frames_rendered: u64,
    state: ContextState,
}

impl AudioContext {
    /// Create a suspended context at the given output sample rate.
    pub fn new(sample_rate: f64) -> Self {
        AudioContext {
            sample_rate,
            frames_rendered: 0,
            state: ContextState::Suspended,
        }
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    pub fn state(&self) -> ContextState {
        self.state
    }

    pub fn is_suspended(&self) -> bool {
        self.state == ContextState::Suspended
    }

    /// Audio clock in seconds.
    pub fn current_time(&self) -> f64 {
        self.frames_rendered as f64 / self.sample_rate
    }

    /// Let the context run. Idempotent.
    pub fn resume(&mut self) {
        if self.state == ContextState::Suspended {
            log::debug!("audio context resumed at {:.3}s", self.current_time());
            self.state = ContextState::Running;
        }
    }

    pub fn suspend(&mut self) {
        self.state = ContextState::Suspended;
    }

    /// Advance the clock after a block was rendered. No-op while suspended.
    pub(crate) fn advance(&mut self, frames: usize) {
        if self.state == ContextState::Running {
            self.frames_rendered += frames as u64;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_suspended_with_frozen_clock() {
        let mut ctx = AudioContext::new(48000.0);
        assert!(ctx.is_suspended());
        ctx.advance(48000);
        assert_eq!(ctx.current_time(), 0.0);
    }

    #[test]
    fn clock_follows_rendered_frames() {
        let mut ctx = AudioContext::new(48000.0);
        ctx.resume();
        ctx.advance(24000);
        ctx.advance(24000);
        assert!((ctx.current_time() - 1.0).abs() < 1e-12);
    }
}
