//! WAV decoding with hound.

use std::io::Cursor;

use super::buffer::PlayableBuffer;
use crate::assets::{AssetError, AudioDecode};

/// Decodes 8 to 32-bit integer and 32-bit float WAV data.
///
/// Mono and stereo are kept as is; wider layouts are mixed down to mono.
#[derive(Debug, Default, Clone, Copy)]
pub struct WavDecoder;

impl AudioDecode for WavDecoder {
    fn decode(&self, bytes: &[u8]) -> Result<PlayableBuffer, AssetError> {
        let wav = hound::WavReader::new(Cursor::new(bytes))
            .map_err(|e| AssetError::Decode(e.to_string()))?;
        let spec = wav.spec();
        let channels = spec.channels.max(1) as usize;

        let raw: Vec<f32> = match spec.sample_format {
            hound::SampleFormat::Int => {
                let bits = spec.bits_per_sample.clamp(1, 32);
                let max_val = (1u64 << (bits - 1)) as f32;
                wav.into_samples::<i32>()
                    .map(|s| s.map(|v| v as f32 / max_val))
                    .collect::<Result<Vec<f32>, _>>()
            }
            hound::SampleFormat::Float => wav.into_samples::<f32>().collect::<Result<Vec<f32>, _>>(),
        }
        .map_err(|e| AssetError::Decode(e.to_string()))?;

        if raw.is_empty() {
            return Err(AssetError::Decode("no samples".into()));
        }

        if channels <= 2 {
            return Ok(PlayableBuffer::new(raw, channels as u16, spec.sample_rate));
        }
        let mono = raw
            .chunks_exact(channels)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32)
            .collect();
        Ok(PlayableBuffer::mono(mono, spec.sample_rate))
    }
}
