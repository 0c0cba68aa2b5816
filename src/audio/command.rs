//! Commands sent from the scheduler thread to the audio thread.

use std::sync::Arc;

use super::buffer::PlayableBuffer;
use crate::ast::BlockId;

/// A clip placed on the output timeline, in output frames.
#[derive(Debug, Clone)]
pub struct ScheduledClip {
    pub block: BlockId,
    pub buffer: Arc<PlayableBuffer>,
    pub start_frame: u64,
    /// Playback is cut here even if the buffer runs longer.
    pub end_frame: u64,
    pub gain: f32,
    /// -1.0 (left) to 1.0 (right).
    pub pan: f32,
    /// Playback rate; 1.0 is the buffer's own speed.
    pub rate: f64,
}

#[derive(Debug)]
pub enum AudioCommand {
    Play(ScheduledClip),
    /// Drop every clip belonging to a block, playing or queued.
    Disconnect(BlockId),
}

#[cfg(test)]
mod tests {
    use super::*;
    use ringbuf::{
        traits::{Consumer, Producer, Split},
        HeapRb,
    };

    #[test]
    fn commands_cross_the_ring() {
        let rb = HeapRb::<AudioCommand>::new(4);
        let (mut prod, mut cons) = rb.split();
        prod.try_push(AudioCommand::Disconnect(BlockId(3))).unwrap();
        prod.try_push(AudioCommand::Disconnect(BlockId(5))).unwrap();

        assert!(matches!(cons.try_pop(), Some(AudioCommand::Disconnect(BlockId(3)))));
        assert!(matches!(cons.try_pop(), Some(AudioCommand::Disconnect(BlockId(5)))));
        assert!(cons.try_pop().is_none());
    }
}
