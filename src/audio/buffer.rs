//! Decoded audio ready for playback.

/// Interleaved `f32` frames at a known sample rate. One or two channels.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayableBuffer {
    samples: Vec<f32>,
    channels: u16,
    sample_rate: u32,
}

impl PlayableBuffer {
    /// `samples` is interleaved; a trailing partial frame is dropped.
    pub fn new(mut samples: Vec<f32>, channels: u16, sample_rate: u32) -> Self {
        let channels = channels.clamp(1, 2);
        let whole = samples.len() - samples.len() % channels as usize;
        samples.truncate(whole);
        Self {
            samples,
            channels,
            sample_rate: sample_rate.max(1),
        }
    }

    pub fn mono(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self::new(samples, 1, sample_rate)
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels as usize
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn duration_secs(&self) -> f64 {
        self.frames() as f64 / self.sample_rate as f64
    }

    /// Left and right sample of frame `i`. Mono is duplicated.
    pub fn frame(&self, i: usize) -> (f32, f32) {
        match self.channels {
            1 => {
                let s = self.samples.get(i).copied().unwrap_or(0.0);
                (s, s)
            }
            _ => {
                let base = i * 2;
                (
                    self.samples.get(base).copied().unwrap_or(0.0),
                    self.samples.get(base + 1).copied().unwrap_or(0.0),
                )
            }
        }
    }

    /// Linearly interpolated frame at a fractional position.
    pub fn frame_at(&self, pos: f64) -> (f32, f32) {
        let idx = pos.floor() as usize;
        let frac = (pos - idx as f64) as f32;
        let (l0, r0) = self.frame(idx);
        if idx + 1 >= self.frames() {
            return (l0, r0);
        }
        let (l1, r1) = self.frame(idx + 1);
        (l0 + (l1 - l0) * frac, r0 + (r1 - r0) * frac)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn mono_duplicates_channels() {
        let buf = PlayableBuffer::mono(vec![0.5, -0.5], 48_000);
        assert_eq!(buf.frames(), 2);
        assert_eq!(buf.frame(1), (-0.5, -0.5));
    }

    #[test]
    fn stereo_frames() {
        let buf = PlayableBuffer::new(vec![0.1, 0.2, 0.3, 0.4, 0.5], 2, 44_100);
        assert_eq!(buf.frames(), 2);
        assert_eq!(buf.frame(1), (0.3, 0.4));
        assert_eq!(buf.frame(5), (0.0, 0.0));
    }

    #[test]
    fn interpolates_between_frames() {
        let buf = PlayableBuffer::mono(vec![0.0, 1.0], 8_000);
        let (l, _) = buf.frame_at(0.25);
        assert_approx_eq!(l, 0.25, 1e-6);
    }

    #[test]
    fn duration() {
        let buf = PlayableBuffer::mono(vec![0.0; 24_000], 48_000);
        assert_approx_eq!(buf.duration_secs(), 0.5, 1e-9);
    }
}
