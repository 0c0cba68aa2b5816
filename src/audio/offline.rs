//! An output with a manual clock that records what would have played.
//!
//! Used by `freeloop check --beats` to print a schedule without a device,
//! and by tests.

use super::{AudioError, AudioOutput, ClipRequest, OutputState};
use crate::ast::BlockId;

#[derive(Debug)]
pub struct OfflineOutput {
    now: f64,
    state: OutputState,
    clips: Vec<ClipRequest>,
    disconnected: Vec<BlockId>,
}

impl Default for OfflineOutput {
    fn default() -> Self {
        Self::new()
    }
}

impl OfflineOutput {
    pub fn new() -> Self {
        Self {
            now: 0.0,
            state: OutputState::Suspended,
            clips: Vec::new(),
            disconnected: Vec::new(),
        }
    }

    /// Move the clock forward. Time only advances while running.
    pub fn advance(&mut self, secs: f64) {
        if self.state == OutputState::Running {
            self.now += secs.max(0.0);
        }
    }

    pub fn clips(&self) -> &[ClipRequest] {
        &self.clips
    }

    pub fn take_clips(&mut self) -> Vec<ClipRequest> {
        std::mem::take(&mut self.clips)
    }

    pub fn disconnected(&self) -> &[BlockId] {
        &self.disconnected
    }
}

impl AudioOutput for OfflineOutput {
    fn now(&self) -> f64 {
        self.now
    }

    fn state(&self) -> OutputState {
        self.state
    }

    fn resume(&mut self) -> Result<(), AudioError> {
        self.state = OutputState::Running;
        Ok(())
    }

    fn schedule_clip(&mut self, clip: ClipRequest) -> Result<(), AudioError> {
        self.clips.push(clip);
        Ok(())
    }

    fn disconnect(&mut self, block: BlockId) {
        self.clips.retain(|c| c.block != block || c.end <= self.now);
        self.disconnected.push(block);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::EffectsChain;
    use crate::audio::PlayableBuffer;
    use std::sync::Arc;

    fn clip(block: u32, start: f64) -> ClipRequest {
        ClipRequest {
            block: BlockId(block),
            buffer: Arc::new(PlayableBuffer::mono(vec![0.0], 8_000)),
            start,
            end: start + 0.5,
            effects: EffectsChain::default(),
        }
    }

    #[test]
    fn clock_is_frozen_while_suspended() {
        let mut out = OfflineOutput::new();
        out.advance(1.0);
        assert_eq!(out.now(), 0.0);
        out.resume().unwrap();
        out.advance(1.0);
        assert_eq!(out.now(), 1.0);
    }

    #[test]
    fn disconnect_drops_pending_clips_of_block() {
        let mut out = OfflineOutput::new();
        out.resume().unwrap();
        out.schedule_clip(clip(1, 0.0)).unwrap();
        out.schedule_clip(clip(1, 2.0)).unwrap();
        out.schedule_clip(clip(2, 2.0)).unwrap();
        out.advance(1.0);
        out.disconnect(BlockId(1));
        let left: Vec<(u32, f64)> = out.clips().iter().map(|c| (c.block.0, c.start)).collect();
        assert_eq!(left, vec![(1, 0.0), (2, 2.0)]);
        assert_eq!(out.disconnected(), &[BlockId(1)]);
    }
}
