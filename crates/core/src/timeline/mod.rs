use std::{cell::Cell, rc::Rc, time::Instant};

/// Monotonic millisecond clock consumed by the playback engine, the beat
/// detector cooldown and the reaction channels.
pub trait TimeSource {
    fn now_ms(&self) -> f64;
}

/// Wall clock backed by [`Instant`], measured from construction.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for SystemClock {
    fn now_ms(&self) -> f64 {
        self.origin.elapsed().as_secs_f64() * 1000.0
    }
}

/// Host-advanced clock. Clones share the same underlying time, so a test or
/// an offline renderer can hand one clone to every component and step them
/// all together.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now_ms: Rc<Cell<f64>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn starting_at(ms: f64) -> Self {
        let clock = Self::new();
        clock.set_ms(ms);
        clock
    }

    /// Moves the clock forward. Negative deltas are ignored.
    pub fn advance_ms(&self, delta: f64) {
        if delta > 0.0 {
            self.now_ms.set(self.now_ms.get() + delta);
        }
    }

    pub fn advance_secs(&self, delta: f64) {
        self.advance_ms(delta * 1000.0);
    }

    pub fn set_ms(&self, ms: f64) {
        self.now_ms.set(ms.max(self.now_ms.get()));
    }
}

impl TimeSource for ManualClock {
    fn now_ms(&self) -> f64 {
        self.now_ms.get()
    }
}

/// Reference point of the playback position.
///
/// While playing, the position is `now - start_reference`, clamped to the
/// track. While paused or ready it is the stored offset.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct PlaybackClock {
    start_reference_ms: f64,
    paused_offset_seconds: f64,
}

impl PlaybackClock {
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Re-anchors the reference so that the elapsed time at `now_ms` equals
    /// the stored offset.
    pub fn start(&mut self, now_ms: f64) {
        self.start_reference_ms = now_ms - self.paused_offset_seconds * 1000.0;
    }

    pub fn set_offset(&mut self, seconds: f64) {
        self.paused_offset_seconds = seconds.max(0.0);
    }

    pub fn paused_offset(&self) -> f64 {
        self.paused_offset_seconds
    }

    pub fn elapsed(&self, playing: bool, now_ms: f64, duration: f64) -> f64 {
        let duration = duration.max(0.0);
        if playing {
            ((now_ms - self.start_reference_ms) / 1000.0).clamp(0.0, duration)
        } else {
            self.paused_offset_seconds.clamp(0.0, duration)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_clones_share_time() {
        let clock = ManualClock::new();
        let other = clock.clone();
        clock.advance_ms(250.0);
        assert_eq!(other.now_ms(), 250.0);

        other.advance_ms(-100.0);
        assert_eq!(clock.now_ms(), 250.0);
    }

    #[test]
    fn playback_clock_resumes_from_offset() {
        let mut clock = PlaybackClock::default();
        clock.set_offset(2.0);
        clock.start(10_000.0);

        assert!((clock.elapsed(true, 10_000.0, 60.0) - 2.0).abs() < 1e-9);
        assert!((clock.elapsed(true, 11_500.0, 60.0) - 3.5).abs() < 1e-9);
        assert_eq!(clock.elapsed(false, 11_500.0, 60.0), 2.0);
    }

    #[test]
    fn elapsed_is_clamped_to_duration() {
        let mut clock = PlaybackClock::default();
        clock.start(0.0);
        assert_eq!(clock.elapsed(true, 20_000.0, 5.0), 5.0);
    }
}
