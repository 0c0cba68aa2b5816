//! Audio callback: runs on the cpal audio thread.
//!
//! Drains commands from the ring buffer, mixes every active clip into the
//! output, clamps it and advances the shared frame clock.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use ringbuf::traits::Consumer;
use ringbuf::HeapCons;

use super::command::{AudioCommand, ScheduledClip};

/// Clips beyond this are dropped oldest first.
const MAX_CLIPS: usize = 256;

/// State that lives on the audio thread. Accessed only from the cpal callback.
pub struct AudioCallback {
    consumer: HeapCons<AudioCommand>,
    clips: Vec<ScheduledClip>,
    channels: u16,
    sample_rate: u32,
    clock: Arc<AtomicU64>,
}

impl AudioCallback {
    pub fn new(
        consumer: HeapCons<AudioCommand>,
        channels: u16,
        sample_rate: u32,
        clock: Arc<AtomicU64>,
    ) -> Self {
        Self {
            consumer,
            clips: Vec::with_capacity(MAX_CLIPS),
            channels: channels.max(1),
            sample_rate: sample_rate.max(1),
            clock,
        }
    }

    pub fn process(&mut self, output: &mut [f32]) {
        let now = self.clock.load(Ordering::Acquire);

        while let Some(cmd) = self.consumer.try_pop() {
            match cmd {
                AudioCommand::Play(mut clip) => {
                    if clip.start_frame < now {
                        // Late: keep its length, start it right away.
                        let shift = now - clip.start_frame;
                        clip.start_frame = now;
                        clip.end_frame = clip.end_frame.saturating_add(shift);
                    }
                    if self.clips.len() >= MAX_CLIPS {
                        self.clips.remove(0);
                    }
                    self.clips.push(clip);
                }
                AudioCommand::Disconnect(block) => self.clips.retain(|c| c.block != block),
            }
        }

        output.fill(0.0);
        let channels = self.channels as usize;
        let frames = output.len() / channels;
        let end = now + frames as u64;

        for clip in &self.clips {
            mix_clip(clip, now, output, channels, self.sample_rate);
        }
        let rate = self.sample_rate;
        self.clips.retain(|c| !finished(c, end, rate));

        for sample in output.iter_mut() {
            *sample = sample.clamp(-1.0, 1.0);
        }

        self.clock.store(end, Ordering::Release);
    }

    pub fn active_clips(&self) -> usize {
        self.clips.len()
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

fn step_ratio(clip: &ScheduledClip, output_rate: u32) -> f64 {
    clip.rate.max(0.01) * clip.buffer.sample_rate() as f64 / output_rate as f64
}

fn mix_clip(clip: &ScheduledClip, now: u64, output: &mut [f32], channels: usize, rate: u32) {
    let ratio = step_ratio(clip, rate);
    let source_frames = clip.buffer.frames() as f64;
    let pan = clip.pan.clamp(-1.0, 1.0);
    let left_gain = clip.gain * (1.0 - pan).min(1.0);
    let right_gain = clip.gain * (1.0 + pan).min(1.0);

    for (i, frame) in output.chunks_exact_mut(channels).enumerate() {
        let t = now + i as u64;
        if t < clip.start_frame {
            continue;
        }
        if t >= clip.end_frame {
            break;
        }
        let pos = (t - clip.start_frame) as f64 * ratio;
        if pos >= source_frames {
            break;
        }
        let (l, r) = clip.buffer.frame_at(pos);
        if channels == 1 {
            frame[0] += (l * left_gain + r * right_gain) * 0.5;
        } else {
            frame[0] += l * left_gain;
            frame[1] += r * right_gain;
        }
    }
}

fn finished(clip: &ScheduledClip, now: u64, rate: u32) -> bool {
    if now >= clip.end_frame {
        return true;
    }
    if now <= clip.start_frame {
        return false;
    }
    (now - clip.start_frame) as f64 * step_ratio(clip, rate) >= clip.buffer.frames() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::BlockId;
    use crate::audio::PlayableBuffer;
    use ringbuf::{
        traits::{Producer, Split},
        HeapRb,
    };

    fn setup() -> (ringbuf::HeapProd<AudioCommand>, AudioCallback, Arc<AtomicU64>) {
        let rb = HeapRb::<AudioCommand>::new(16);
        let (prod, cons) = rb.split();
        let clock = Arc::new(AtomicU64::new(0));
        (prod, AudioCallback::new(cons, 2, 100, clock.clone()), clock)
    }

    fn clip(block: u32, start: u64, end: u64) -> ScheduledClip {
        ScheduledClip {
            block: BlockId(block),
            buffer: Arc::new(PlayableBuffer::mono(vec![0.5; 10], 100)),
            start_frame: start,
            end_frame: end,
            gain: 1.0,
            pan: 0.0,
            rate: 1.0,
        }
    }

    #[test]
    fn silence_without_clips() {
        let (_prod, mut cb, clock) = setup();
        let mut out = vec![9.0f32; 8];
        cb.process(&mut out);
        assert!(out.iter().all(|&s| s == 0.0));
        assert_eq!(clock.load(Ordering::Relaxed), 4);
    }

    #[test]
    fn clip_starts_on_its_frame_and_is_cut_at_end() {
        let (mut prod, mut cb, _) = setup();
        prod.try_push(AudioCommand::Play(clip(0, 2, 4))).unwrap();
        let mut out = vec![0.0f32; 12];
        cb.process(&mut out);
        let left: Vec<f32> = out.chunks(2).map(|f| f[0]).collect();
        assert_eq!(left, vec![0.0, 0.0, 0.5, 0.5, 0.0, 0.0]);
        assert_eq!(cb.active_clips(), 0);
    }

    #[test]
    fn buffer_exhaustion_ends_clip() {
        let (mut prod, mut cb, _) = setup();
        prod.try_push(AudioCommand::Play(clip(0, 0, 1_000))).unwrap();
        let mut out = vec![0.0f32; 24];
        cb.process(&mut out);
        assert_eq!(out[18], 0.5);
        assert_eq!(out[20], 0.0);
        assert_eq!(cb.active_clips(), 0);
    }

    #[test]
    fn hard_pan_silences_other_side() {
        let (mut prod, mut cb, _) = setup();
        let mut c = clip(0, 0, 4);
        c.pan = -1.0;
        prod.try_push(AudioCommand::Play(c)).unwrap();
        let mut out = vec![0.0f32; 4];
        cb.process(&mut out);
        assert_eq!(out, vec![0.5, 0.0, 0.5, 0.0]);
    }

    #[test]
    fn disconnect_drops_only_that_block() {
        let (mut prod, mut cb, _) = setup();
        prod.try_push(AudioCommand::Play(clip(1, 100, 200))).unwrap();
        prod.try_push(AudioCommand::Play(clip(2, 100, 200))).unwrap();
        let mut out = vec![0.0f32; 4];
        cb.process(&mut out);
        assert_eq!(cb.active_clips(), 2);
        prod.try_push(AudioCommand::Disconnect(BlockId(1))).unwrap();
        cb.process(&mut out);
        assert_eq!(cb.active_clips(), 1);
    }

    #[test]
    fn late_clip_starts_immediately() {
        let (mut prod, mut cb, clock) = setup();
        clock.store(50, Ordering::Relaxed);
        prod.try_push(AudioCommand::Play(clip(0, 10, 12))).unwrap();
        let mut out = vec![0.0f32; 8];
        cb.process(&mut out);
        assert_eq!(out[0], 0.5);
        assert_eq!(out[2], 0.5);
        assert_eq!(out[4], 0.0);
    }

    #[test]
    fn output_is_clamped() {
        let (mut prod, mut cb, _) = setup();
        for _ in 0..4 {
            prod.try_push(AudioCommand::Play(clip(0, 0, 4))).unwrap();
        }
        let mut out = vec![0.0f32; 2];
        cb.process(&mut out);
        assert_eq!(out[0], 1.0);
    }
}
