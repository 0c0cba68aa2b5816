//! Lookahead scheduler: one [`Thread`] per playing statement, driven by a
//! coarse periodic tick.
//!
//! Each [`Scheduler::tick`] walks every thread ahead of the output clock up
//! to `schedule_ahead` seconds and hands resolved clips to the
//! [`AudioOutput`]. The scheduler owns the [`Transport`] but not the output,
//! which keeps all scheduling logic testable without audio hardware.

pub mod thread;
pub mod transport;

use std::collections::BTreeMap;
use std::time::Duration;

use tracing::{debug, info};

use crate::ast::{Bindings, BlockId, Cx, Node, Pattern, RandomSelector, Selector};
use crate::audio::{AudioError, AudioOutput, OutputState};
use crate::dsl::StatementFlags;
use crate::feedback::FeedbackHook;
use crate::symbol::SymbolTable;

pub use thread::{Thread, TickContext};
pub use transport::{PlayState, Transport, DEFAULT_BPM};

#[derive(Debug, Clone, PartialEq)]
pub struct SchedulerConfig {
    /// Interval between ticks.
    pub lookahead: Duration,
    /// How far past `now` each tick schedules, in seconds. Should exceed
    /// `lookahead` so consecutive windows overlap.
    pub schedule_ahead: f64,
    /// Start new threads on the next beat instead of immediately.
    pub quantize_launch: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            lookahead: Duration::from_millis(25),
            schedule_ahead: 0.1,
            quantize_launch: true,
        }
    }
}

pub struct Scheduler {
    config: SchedulerConfig,
    transport: Transport,
    threads: BTreeMap<BlockId, Thread>,
    selector: Box<dyn Selector>,
}

impl Scheduler {
    pub fn new(config: SchedulerConfig, bpm: f64, seed: u64) -> Self {
        Self::with_selector(config, bpm, Box::new(RandomSelector::new(seed)))
    }

    /// A scheduler whose choices are made by `selector`.
    pub fn with_selector(config: SchedulerConfig, bpm: f64, selector: Box<dyn Selector>) -> Self {
        Self {
            config,
            transport: Transport::new(bpm),
            threads: BTreeMap::new(),
            selector,
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    /// Stage a tempo; it takes effect after the next tick.
    pub fn set_bpm(&mut self, bpm: f64) {
        self.transport.set_bpm(bpm);
    }

    /// Start the transport. Every thread restarts at `now` (or the first
    /// beat of the new grid, which is `now`).
    pub fn play(&mut self, now: f64) {
        if self.transport.is_playing() {
            return;
        }
        self.transport.play(now);
        for thread in self.threads.values_mut() {
            thread.restart(now);
        }
        info!(threads = self.threads.len(), "transport started");
    }

    /// Stop the transport and silence every thread's output. Threads stay.
    pub fn stop(&mut self, output: &mut dyn AudioOutput) {
        self.transport.stop();
        for block in self.threads.keys() {
            output.disconnect(*block);
        }
        info!("transport stopped");
    }

    /// Start playing `pattern` for `block`, replacing any thread it had.
    ///
    /// A replacement picks up where the old thread's schedule ends, so
    /// nothing is scheduled twice; a new thread starts at `now`. Either is
    /// pushed to the next beat when launches are quantized.
    pub fn launch(
        &mut self,
        block: BlockId,
        pattern: &Pattern,
        flags: StatementFlags,
        bindings: &dyn Bindings,
        now: f64,
    ) {
        let mut start = self
            .threads
            .get(&block)
            .map_or(now, |old| old.next_step_time().max(now));
        if self.config.quantize_launch && self.transport.is_playing() {
            start = self.transport.next_beat_after(start);
        }

        let mut cx = Cx::new(bindings, &mut *self.selector);
        let ast = Node::build(pattern, &mut cx);
        let thread = Thread::new(block, ast, start, flags, &mut cx);
        let replaced = self.threads.insert(block, thread).is_some();
        debug!(%block, start, replaced, "thread launched");
    }

    /// Remove a block's thread and disconnect its output.
    pub fn kill(&mut self, block: BlockId, output: &mut dyn AudioOutput) -> bool {
        if self.threads.remove(&block).is_none() {
            return false;
        }
        output.disconnect(block);
        debug!(%block, "thread killed");
        true
    }

    pub fn thread(&self, block: BlockId) -> Option<&Thread> {
        self.threads.get(&block)
    }

    pub fn threads(&self) -> impl Iterator<Item = &Thread> {
        self.threads.values()
    }

    pub fn len(&self) -> usize {
        self.threads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.threads.is_empty()
    }

    /// One scheduling pass. Returns the number of clips scheduled.
    ///
    /// Resumes a suspended output first. The whole pass runs under one tempo;
    /// a staged tempo is committed afterwards.
    pub fn tick(
        &mut self,
        table: &SymbolTable,
        output: &mut dyn AudioOutput,
        feedback: &FeedbackHook,
    ) -> Result<usize, AudioError> {
        if !self.transport.is_playing() {
            return Ok(0);
        }
        if output.state() == OutputState::Suspended {
            output.resume()?;
        }

        let now = output.now();
        let ctx = TickContext {
            now,
            horizon: now + self.config.schedule_ahead,
            bpm: self.transport.bpm(),
            table,
            feedback,
        };
        let soloed = self.threads.values().any(|t| t.flags().solo);

        let mut scheduled = 0;
        for thread in self.threads.values_mut() {
            let flags = thread.flags();
            let audible = !flags.mute && (!soloed || flags.solo);
            scheduled += thread.tick(&ctx, audible, output, &mut *self.selector);
        }

        self.transport.commit_tempo(now);
        Ok(scheduled)
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("config", &self.config)
            .field("transport", &self.transport)
            .field("threads", &self.threads)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{EffectsChain, InstanceId, Step};
    use crate::audio::{OfflineOutput, PlayableBuffer};
    use crate::symbol::TableConfig;
    use assert_approx_eq::assert_approx_eq;

    fn config(quantize: bool) -> SchedulerConfig {
        SchedulerConfig {
            lookahead: Duration::from_millis(25),
            schedule_ahead: 0.1,
            quantize_launch: quantize,
        }
    }

    fn sound(id: &str, start: usize) -> Pattern {
        Pattern::Sound(Step::sound(id, InstanceId::new(BlockId(0), start)))
    }

    fn seq(items: Vec<Pattern>) -> Pattern {
        Pattern::Sequence {
            items,
            effects: EffectsChain::default(),
        }
    }

    fn table_with(ids: &[&str]) -> SymbolTable {
        let mut table = SymbolTable::new(TableConfig::default());
        for id in ids {
            table.insert_available(id, PlayableBuffer::mono(vec![0.1; 8], 8_000));
        }
        table
    }

    fn first(_: &[f64]) -> usize {
        0
    }

    fn scheduler(quantize: bool) -> Scheduler {
        Scheduler::with_selector(config(quantize), 120.0, Box::new(first))
    }

    #[test]
    fn nothing_happens_while_stopped() {
        let table = table_with(&["a"]);
        let mut out = OfflineOutput::new();
        let mut s = scheduler(false);
        s.launch(BlockId(0), &sound("a", 0), StatementFlags::default(), &table, 0.0);
        assert_eq!(s.tick(&table, &mut out, &FeedbackHook::default()).unwrap(), 0);
        assert_eq!(out.state(), OutputState::Suspended);
    }

    #[test]
    fn tick_resumes_and_fills_window() {
        let table = table_with(&["a", "b"]);
        let mut out = OfflineOutput::new();
        let mut s = Scheduler::with_selector(
            SchedulerConfig {
                schedule_ahead: 1.2,
                ..config(false)
            },
            120.0,
            Box::new(first),
        );
        s.play(0.0);
        s.launch(BlockId(0), &seq(vec![sound("a", 0), sound("b", 2)]), StatementFlags::default(), &table, 0.0);
        let n = s.tick(&table, &mut out, &FeedbackHook::default()).unwrap();
        assert_eq!(out.state(), OutputState::Running);
        assert_eq!(n, 3);
        let clips = out.clips();
        let ids: Vec<(f64, f64)> = clips.iter().map(|c| (c.start, c.end)).collect();
        assert_approx_eq!(ids[0].0, 0.0);
        assert_approx_eq!(ids[0].1, 0.5);
        assert_approx_eq!(ids[2].0, 1.0);
        assert_approx_eq!(s.thread(BlockId(0)).unwrap().next_step_time(), 1.5);
    }

    #[test]
    fn unavailable_sounds_are_skipped_but_time_advances() {
        let table = table_with(&["a"]);
        let mut out = OfflineOutput::new();
        let mut s = Scheduler::with_selector(
            SchedulerConfig {
                schedule_ahead: 1.0,
                ..config(false)
            },
            120.0,
            Box::new(first),
        );
        s.play(0.0);
        s.launch(BlockId(0), &seq(vec![sound("missing", 0), sound("a", 8)]), StatementFlags::default(), &table, 0.0);
        s.tick(&table, &mut out, &FeedbackHook::default()).unwrap();
        assert_eq!(out.clips().len(), 1);
        assert_approx_eq!(out.clips()[0].start, 0.5);
    }

    #[test]
    fn quantized_launch_waits_for_next_beat() {
        let table = table_with(&["a"]);
        let mut s = scheduler(true);
        s.play(0.0);
        s.launch(BlockId(1), &sound("a", 0), StatementFlags::default(), &table, 0.3);
        assert_approx_eq!(s.thread(BlockId(1)).unwrap().next_step_time(), 0.5);
    }

    #[test]
    fn replacement_continues_old_schedule() {
        let table = table_with(&["a", "b"]);
        let mut out = OfflineOutput::new();
        let mut s = scheduler(false);
        s.play(0.0);
        s.launch(BlockId(0), &sound("a", 0), StatementFlags::default(), &table, 0.0);
        s.tick(&table, &mut out, &FeedbackHook::default()).unwrap();
        let resume_at = s.thread(BlockId(0)).unwrap().next_step_time();
        s.launch(BlockId(0), &sound("b", 0), StatementFlags::default(), &table, 0.01);
        assert_eq!(s.len(), 1);
        assert_approx_eq!(s.thread(BlockId(0)).unwrap().next_step_time(), resume_at);
        assert_eq!(s.thread(BlockId(0)).unwrap().current().sound.as_deref(), Some("b"));
    }

    #[test]
    fn kill_disconnects() {
        let table = table_with(&["a"]);
        let mut out = OfflineOutput::new();
        let mut s = scheduler(false);
        s.launch(BlockId(4), &sound("a", 0), StatementFlags::default(), &table, 0.0);
        assert!(s.kill(BlockId(4), &mut out));
        assert!(!s.kill(BlockId(4), &mut out));
        assert_eq!(out.disconnected(), &[BlockId(4)]);
        assert!(s.is_empty());
    }

    #[test]
    fn mute_and_solo() {
        let table = table_with(&["a", "b", "c"]);
        let mut out = OfflineOutput::new();
        let mut s = scheduler(false);
        s.play(0.0);
        s.launch(BlockId(0), &sound("a", 0), StatementFlags { mute: true, solo: false }, &table, 0.0);
        s.launch(BlockId(1), &sound("b", 0), StatementFlags { mute: false, solo: true }, &table, 0.0);
        s.launch(BlockId(2), &sound("c", 0), StatementFlags::default(), &table, 0.0);
        s.tick(&table, &mut out, &FeedbackHook::default()).unwrap();
        let blocks: Vec<BlockId> = out.clips().iter().map(|c| c.block).collect();
        assert_eq!(blocks, vec![BlockId(1)]);
    }

    #[test]
    fn tempo_change_applies_after_tick() {
        let table = table_with(&["a"]);
        let mut out = OfflineOutput::new();
        let mut s = Scheduler::with_selector(
            SchedulerConfig {
                schedule_ahead: 1.0,
                ..config(false)
            },
            120.0,
            Box::new(first),
        );
        s.play(0.0);
        s.launch(BlockId(0), &sound("a", 0), StatementFlags::default(), &table, 0.0);
        s.set_bpm(60.0);
        s.tick(&table, &mut out, &FeedbackHook::default()).unwrap();
        // Whole tick at 120 BPM.
        assert!(out.clips().iter().all(|c| (c.end - c.start - 0.5).abs() < 1e-9));
        assert_approx_eq!(s.transport().bpm(), 60.0);

        out.advance(1.0);
        out.take_clips();
        s.tick(&table, &mut out, &FeedbackHook::default()).unwrap();
        assert_approx_eq!(out.clips()[0].end - out.clips()[0].start, 1.0);
    }
}
