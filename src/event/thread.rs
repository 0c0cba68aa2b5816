//! One playing statement: an AST walked ahead of the output clock.

use tracing::{trace, warn};

use crate::ast::{BlockId, Cx, Node, Selector, Step};
use crate::audio::{AudioOutput, ClipRequest};
use crate::dsl::StatementFlags;
use crate::feedback::FeedbackHook;
use crate::symbol::SymbolTable;

/// Upper bound on steps scheduled by one thread in one tick.
const MAX_STEPS_PER_TICK: usize = 4096;

/// Shared, read-only inputs of one scheduler tick.
pub struct TickContext<'a> {
    pub now: f64,
    /// Steps starting before this are scheduled.
    pub horizon: f64,
    pub bpm: f64,
    pub table: &'a SymbolTable,
    pub feedback: &'a FeedbackHook,
}

#[derive(Debug)]
pub struct Thread {
    block: BlockId,
    ast: Node,
    next_step_time: f64,
    flags: StatementFlags,
}

impl Thread {
    /// Prime `ast` so its first `current()` is the first step, starting at
    /// `start`.
    pub fn new(block: BlockId, mut ast: Node, start: f64, flags: StatementFlags, cx: &mut Cx<'_>) -> Self {
        ast.advance(cx);
        Self {
            block,
            ast,
            next_step_time: start,
            flags,
        }
    }

    pub fn block(&self) -> BlockId {
        self.block
    }

    pub fn flags(&self) -> StatementFlags {
        self.flags
    }

    pub fn next_step_time(&self) -> f64 {
        self.next_step_time
    }

    pub fn current(&self) -> &Step {
        self.ast.current()
    }

    /// Continue from the current step at time `at`.
    pub fn restart(&mut self, at: f64) {
        self.next_step_time = at;
    }

    /// Schedule every step that starts before the horizon. Returns the number
    /// of clips handed to the output.
    pub fn tick(
        &mut self,
        ctx: &TickContext<'_>,
        audible: bool,
        output: &mut dyn AudioOutput,
        selector: &mut dyn Selector,
    ) -> usize {
        // After a stall, drop the backlog rather than replaying it late.
        if self.next_step_time < ctx.now - (ctx.horizon - ctx.now).max(0.0) {
            trace!(block = %self.block, behind = ctx.now - self.next_step_time, "thread resynced");
            self.next_step_time = ctx.now;
        }

        let mut scheduled = 0;
        let mut steps = 0;
        while self.next_step_time < ctx.horizon && steps < MAX_STEPS_PER_TICK {
            let step = self.ast.current();
            let start = self.next_step_time;
            let end = start + step.duration_secs(ctx.bpm);

            if let Some(id) = step.sound.as_deref() {
                match ctx.table.available_buffer(id) {
                    Some(buffer) if audible => {
                        let clip = ClipRequest {
                            block: self.block,
                            buffer,
                            start,
                            end,
                            effects: step.effects.clone(),
                        };
                        match output.schedule_clip(clip) {
                            Ok(()) => scheduled += 1,
                            Err(e) => warn!(block = %self.block, sound = id, error = %e, "clip dropped"),
                        }
                    }
                    Some(_) => {}
                    None => trace!(block = %self.block, sound = id, "step skipped, sound not available"),
                }
                ctx.feedback.step_visual_mark(step.instance, start, end);
            }

            self.next_step_time = end;
            let mut cx = Cx::new(ctx.table, selector);
            self.ast.advance(&mut cx);
            steps += 1;
        }
        scheduled
    }
}
