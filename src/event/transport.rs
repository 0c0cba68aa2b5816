//! Transport state: play/stop control, a beat grid anchored to the output
//! clock, and a double-buffered tempo.
//!
//! [`Transport::set_bpm`] only stages a tempo. The scheduler reads
//! [`Transport::bpm`] for a whole tick and calls [`Transport::commit_tempo`]
//! afterwards, so one tick is always computed under one tempo. Committing
//! re-anchors the grid at the commit time, which keeps beat positions
//! continuous across tempo changes.

use tracing::debug;

pub const DEFAULT_BPM: f64 = 120.0;
pub const MIN_BPM: f64 = 20.0;
pub const MAX_BPM: f64 = 999.0;

/// Playback state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayState {
    Stopped,
    Playing,
}

/// Musical transport on top of an output clock measured in seconds.
#[derive(Debug)]
pub struct Transport {
    bpm: f64,
    next_bpm: Option<f64>,
    state: PlayState,
    /// Output clock time of `anchor_beat`.
    anchor_time: f64,
    anchor_beat: f64,
}

impl Default for Transport {
    fn default() -> Self {
        Self::new(DEFAULT_BPM)
    }
}

impl Transport {
    /// Stopped, with beat zero at time zero.
    pub fn new(bpm: f64) -> Self {
        Self {
            bpm: clamp_bpm(bpm).unwrap_or(DEFAULT_BPM),
            next_bpm: None,
            state: PlayState::Stopped,
            anchor_time: 0.0,
            anchor_beat: 0.0,
        }
    }

    /// Start playback with beat zero at `now`. No-op while already playing.
    pub fn play(&mut self, now: f64) {
        if self.state == PlayState::Playing {
            return;
        }
        self.state = PlayState::Playing;
        self.anchor_time = now;
        self.anchor_beat = 0.0;
    }

    pub fn stop(&mut self) {
        self.state = PlayState::Stopped;
    }

    pub fn state(&self) -> PlayState {
        self.state
    }

    pub fn is_playing(&self) -> bool {
        self.state == PlayState::Playing
    }

    /// The tempo in effect for the current tick.
    pub fn bpm(&self) -> f64 {
        self.bpm
    }

    /// The staged tempo, if any.
    pub fn pending_bpm(&self) -> Option<f64> {
        self.next_bpm
    }

    /// Stage a tempo for the next [`commit_tempo`](Self::commit_tempo).
    ///
    /// Values outside `MIN_BPM..=MAX_BPM` are clamped; non-finite values are
    /// ignored.
    pub fn set_bpm(&mut self, bpm: f64) {
        if let Some(bpm) = clamp_bpm(bpm) {
            self.next_bpm = Some(bpm);
        }
    }

    /// Apply the staged tempo. Returns `true` if the tempo changed.
    pub fn commit_tempo(&mut self, now: f64) -> bool {
        let Some(next) = self.next_bpm.take() else {
            return false;
        };
        if (next - self.bpm).abs() < f64::EPSILON {
            return false;
        }
        self.anchor_beat = self.beat_at(now);
        self.anchor_time = now;
        debug!(from = self.bpm, to = next, "tempo committed");
        self.bpm = next;
        true
    }

    /// Seconds per beat at the current tempo.
    pub fn beat_duration(&self) -> f64 {
        60.0 / self.bpm
    }

    /// Fractional beat position at output time `t`.
    pub fn beat_at(&self, t: f64) -> f64 {
        self.anchor_beat + (t - self.anchor_time) / self.beat_duration()
    }

    /// Output time of a beat position.
    pub fn time_of_beat(&self, beat: f64) -> f64 {
        self.anchor_time + (beat - self.anchor_beat) * self.beat_duration()
    }

    /// The first beat boundary at or after `t`.
    pub fn next_beat_after(&self, t: f64) -> f64 {
        let beat = self.beat_at(t);
        let rounded = beat.round();
        // Tolerate float noise when `t` sits on a boundary.
        if (beat - rounded).abs() < 1e-9 {
            return self.time_of_beat(rounded);
        }
        self.time_of_beat(beat.ceil())
    }
}

fn clamp_bpm(bpm: f64) -> Option<f64> {
    bpm.is_finite().then(|| bpm.clamp(MIN_BPM, MAX_BPM))
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn initial_state() {
        let t = Transport::new(120.0);
        assert_eq!(t.state(), PlayState::Stopped);
        assert_approx_eq!(t.bpm(), 120.0);
        assert!(t.pending_bpm().is_none());
    }

    #[test]
    fn play_and_stop() {
        let mut t = Transport::default();
        t.play(3.0);
        assert_eq!(t.state(), PlayState::Playing);
        assert_approx_eq!(t.beat_at(3.0), 0.0);
        t.stop();
        assert_eq!(t.state(), PlayState::Stopped);
    }

    #[test]
    fn tempo_is_double_buffered() {
        let mut t = Transport::new(120.0);
        t.set_bpm(60.0);
        assert_approx_eq!(t.bpm(), 120.0);
        assert!(t.commit_tempo(1.0));
        assert_approx_eq!(t.bpm(), 60.0);
        assert!(!t.commit_tempo(2.0));
    }

    #[test]
    fn commit_keeps_beat_position_continuous() {
        let mut t = Transport::new(120.0);
        t.play(0.0);
        // Two beats in at 120 BPM.
        assert_approx_eq!(t.beat_at(1.0), 2.0);
        t.set_bpm(60.0);
        t.commit_tempo(1.0);
        assert_approx_eq!(t.beat_at(1.0), 2.0);
        assert_approx_eq!(t.beat_at(2.0), 3.0);
    }

    #[test]
    fn next_beat_after() {
        let mut t = Transport::new(120.0);
        t.play(0.0);
        assert_approx_eq!(t.next_beat_after(0.1), 0.5);
        assert_approx_eq!(t.next_beat_after(0.5), 0.5);
        assert_approx_eq!(t.next_beat_after(0.75), 1.0);
    }

    #[test]
    fn out_of_range_tempo_is_clamped() {
        let mut t = Transport::new(120.0);
        t.set_bpm(5_000.0);
        t.commit_tempo(0.0);
        assert_approx_eq!(t.bpm(), MAX_BPM);
        t.set_bpm(f64::NAN);
        assert!(t.pending_bpm().is_none());
    }
}
