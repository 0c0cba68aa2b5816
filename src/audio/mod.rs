//! Audio output: clip scheduling over a lock-free queue to a cpal stream.
//!
//! The scheduler only sees the [`AudioOutput`] trait. [`AudioEngine`] owns the
//! cpal output stream and sends [`AudioCommand`]s through a ring buffer; the
//! audio thread drains them in its callback, mixes the clips and advances a
//! frame clock that backs [`AudioOutput::now`]. [`OfflineOutput`] records
//! clips against a manual clock instead.

pub mod buffer;
pub mod callback;
pub mod command;
pub mod decode;
pub mod offline;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use ringbuf::{
    traits::{Producer, Split},
    HeapRb,
};
use thiserror::Error;
use tracing::{debug, warn};

use crate::ast::{BlockId, EffectsChain};

pub use buffer::PlayableBuffer;
pub use command::{AudioCommand, ScheduledClip};
pub use decode::WavDecoder;
pub use offline::OfflineOutput;

use callback::AudioCallback;

/// Ring buffer capacity (number of commands).
const RING_BUFFER_CAPACITY: usize = 1024;

#[derive(Debug, Error)]
pub enum AudioError {
    #[error("no audio output device found")]
    NoOutputDevice,
    #[error("device config error: {0}")]
    DeviceConfig(String),
    #[error("stream build error: {0}")]
    StreamBuild(String),
    #[error("stream play error: {0}")]
    StreamPlay(String),
    /// The audio thread is not draining fast enough.
    #[error("audio command ring buffer is full")]
    BufferFull,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputState {
    Suspended,
    Running,
}

/// A resolved buffer to play between two points of the output clock.
#[derive(Debug, Clone)]
pub struct ClipRequest {
    pub block: BlockId,
    pub buffer: Arc<PlayableBuffer>,
    /// Seconds on the output clock.
    pub start: f64,
    pub end: f64,
    pub effects: EffectsChain,
}

impl ClipRequest {
    /// Product of every `volume` gain in the chain.
    pub fn gain(&self) -> f32 {
        self.effects
            .find("volume")
            .map(|e| e.arg(0, 1.0))
            .product::<f64>()
            .max(0.0) as f32
    }

    /// The outermost `pan` wins.
    pub fn pan(&self) -> f32 {
        self.effects
            .find("pan")
            .last()
            .map_or(0.0, |e| e.arg(0, 0.0).clamp(-1.0, 1.0)) as f32
    }

    /// Product of every `speed` rate in the chain.
    pub fn rate(&self) -> f64 {
        self.effects
            .find("speed")
            .map(|e| e.arg(0, 1.0))
            .product::<f64>()
            .max(0.01)
    }
}

/// What the scheduler needs from an audio output.
pub trait AudioOutput {
    /// Monotonic output clock, in seconds.
    fn now(&self) -> f64;
    fn state(&self) -> OutputState;
    fn resume(&mut self) -> Result<(), AudioError>;
    fn schedule_clip(&mut self, clip: ClipRequest) -> Result<(), AudioError>;
    /// Silence everything scheduled for a block.
    fn disconnect(&mut self, block: BlockId);
}

/// The audio engine. Owns the cpal stream and ring buffer producer.
pub struct AudioEngine {
    stream: cpal::Stream,
    producer: ringbuf::HeapProd<AudioCommand>,
    clock: Arc<AtomicU64>,
    sample_rate: u32,
    channels: u16,
    state: OutputState,
}

impl AudioEngine {
    /// Open the default output device. The stream starts suspended.
    pub fn new() -> Result<Self, AudioError> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or(AudioError::NoOutputDevice)?;

        let config = device
            .default_output_config()
            .map_err(|e| AudioError::DeviceConfig(e.to_string()))?;

        Self::build_with_device(&device, config.sample_rate().0, config.channels())
    }

    fn build_with_device(
        device: &cpal::Device,
        sample_rate: u32,
        channels: u16,
    ) -> Result<Self, AudioError> {
        let rb = HeapRb::<AudioCommand>::new(RING_BUFFER_CAPACITY);
        let (producer, consumer) = rb.split();
        let clock = Arc::new(AtomicU64::new(0));

        let mut audio_callback = AudioCallback::new(consumer, channels, sample_rate, clock.clone());

        let stream_config = cpal::StreamConfig {
            channels,
            sample_rate: cpal::SampleRate(sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let err_fn = |err: cpal::StreamError| {
            warn!(error = %err, "audio stream error");
        };

        let stream = device
            .build_output_stream(
                &stream_config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    audio_callback.process(data);
                },
                err_fn,
                None,
            )
            .map_err(|e| AudioError::StreamBuild(e.to_string()))?;

        // Some hosts start streams eagerly.
        let _ = stream.pause();
        debug!(sample_rate, channels, "audio stream built");

        Ok(Self {
            stream,
            producer,
            clock,
            sample_rate,
            channels,
            state: OutputState::Suspended,
        })
    }

    fn send(&mut self, cmd: AudioCommand) -> Result<(), AudioError> {
        self.producer
            .try_push(cmd)
            .map_err(|_| AudioError::BufferFull)
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    fn to_frame(&self, secs: f64) -> u64 {
        (secs.max(0.0) * self.sample_rate as f64).round() as u64
    }
}

impl AudioOutput for AudioEngine {
    fn now(&self) -> f64 {
        self.clock.load(Ordering::Acquire) as f64 / self.sample_rate as f64
    }

    fn state(&self) -> OutputState {
        self.state
    }

    fn resume(&mut self) -> Result<(), AudioError> {
        self.stream
            .play()
            .map_err(|e| AudioError::StreamPlay(e.to_string()))?;
        self.state = OutputState::Running;
        Ok(())
    }

    fn schedule_clip(&mut self, clip: ClipRequest) -> Result<(), AudioError> {
        let scheduled = ScheduledClip {
            block: clip.block,
            start_frame: self.to_frame(clip.start),
            end_frame: self.to_frame(clip.end),
            gain: clip.gain(),
            pan: clip.pan(),
            rate: clip.rate(),
            buffer: clip.buffer,
        };
        self.send(AudioCommand::Play(scheduled))
    }

    fn disconnect(&mut self, block: BlockId) {
        if let Err(e) = self.send(AudioCommand::Disconnect(block)) {
            warn!(%block, error = %e, "disconnect dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Effect;

    fn request(effects: Vec<Effect>) -> ClipRequest {
        ClipRequest {
            block: BlockId(0),
            buffer: Arc::new(PlayableBuffer::mono(vec![0.0; 4], 48_000)),
            start: 0.0,
            end: 1.0,
            effects: EffectsChain::new(effects),
        }
    }

    #[test]
    fn plain_clip_is_neutral() {
        let r = request(vec![]);
        assert_eq!(r.gain(), 1.0);
        assert_eq!(r.pan(), 0.0);
        assert_eq!(r.rate(), 1.0);
    }

    #[test]
    fn gains_and_rates_multiply() {
        let r = request(vec![
            Effect::new("volume", vec![0.5]),
            Effect::new("speed", vec![2.0]),
            Effect::new("volume", vec![0.5]),
            Effect::new("speed", vec![1.5]),
        ]);
        assert_eq!(r.gain(), 0.25);
        assert_eq!(r.rate(), 3.0);
    }

    #[test]
    fn outer_pan_wins_and_is_clamped() {
        let r = request(vec![Effect::new("pan", vec![0.2]), Effect::new("pan", vec![-4.0])]);
        assert_eq!(r.pan(), -1.0);
    }

    #[test]
    fn unrendered_effects_are_ignored() {
        let r = request(vec![Effect::new("reverb", vec![0.9])]);
        assert_eq!(r.gain(), 1.0);
    }

    #[test]
    fn audio_error_display() {
        assert_eq!(
            AudioError::NoOutputDevice.to_string(),
            "no audio output device found"
        );
        assert_eq!(
            AudioError::BufferFull.to_string(),
            "audio command ring buffer is full"
        );
        assert_eq!(
            AudioError::DeviceConfig("test".to_string()).to_string(),
            "device config error: test"
        );
    }

    #[test]
    #[ignore] // Requires audio device
    fn engine_starts_suspended_and_resumes() {
        let mut engine = AudioEngine::new().expect("no audio device");
        assert_eq!(engine.state(), OutputState::Suspended);
        engine.resume().unwrap();
        assert_eq!(engine.state(), OutputState::Running);
        engine.disconnect(BlockId(0));
    }
}
