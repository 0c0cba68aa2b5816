//! The live runtime: editor blocks in, scheduled clips out.
//!
//! [`Runtime::on_block_changed`] analyses an edit right away so the editor
//! can show tokens and errors, and schedules a debounced commit. Commits,
//! resolution reports and scheduling all happen in [`Runtime::tick`], which
//! the host calls every `lookahead` interval.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::assets::AssetSource;
use crate::ast::BlockId;
use crate::audio::{AudioError, AudioOutput};
use crate::config::RuntimeConfig;
use crate::dsl::{
    self, second_pass, ErrorRegion, FirstPassResult, LexicalTokenKind, SemanticToken, Statement,
    StatementFlags, StatementKind,
};
use crate::event::Scheduler;
use crate::feedback::{Feedback, FeedbackHook};
use crate::symbol::{builtins, SymbolTable, VarValue};

/// What the editor gets back for every edit.
#[derive(Debug, Clone)]
pub struct BlockAnalysis {
    pub kind: StatementKind,
    pub flags: StatementFlags,
    pub tokens: Vec<SemanticToken>,
    pub errors: Vec<ErrorRegion>,
}

/// Counters from one [`Runtime::tick`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub committed: usize,
    pub status_changes: usize,
    pub resolutions_started: usize,
    pub clips: usize,
}

#[derive(Debug)]
struct Block {
    index: usize,
    text: String,
    /// When the pending edit may be committed.
    due: Option<Instant>,
    /// Words read by the last edit that failed to commit. A later
    /// declaration of one of them commits the block again.
    waiting_on: BTreeSet<String>,
}

pub struct Runtime<O: AudioOutput> {
    config: RuntimeConfig,
    table: SymbolTable,
    scheduler: Scheduler,
    output: O,
    feedback: FeedbackHook,
    blocks: BTreeMap<BlockId, Block>,
}

impl<O: AudioOutput> Runtime<O> {
    pub fn new(config: RuntimeConfig, output: O) -> Self {
        let mut table = SymbolTable::new(config.table_config());
        if let Some(handle) = table.variable_handle(builtins::BPM) {
            // The built-in is always numeric, so this cannot be rejected.
            let _ = table.define_variable(handle, VarValue::Number(config.bpm));
        }
        let scheduler = Scheduler::new(config.scheduler_config(), config.bpm, config.seed);
        Self {
            config,
            table,
            scheduler,
            output,
            feedback: FeedbackHook::default(),
            blocks: BTreeMap::new(),
        }
    }

    /// Where sounds are searched, fetched and decoded.
    pub fn with_source(mut self, source: AssetSource) -> Self {
        self.table.set_source(source);
        self
    }

    pub fn with_feedback(mut self, feedback: impl Feedback + 'static) -> Self {
        self.feedback = FeedbackHook::new(feedback);
        self.table.set_feedback(self.feedback.clone());
        self
    }

    /// Replace the scheduler, e.g. to inject a deterministic selector.
    pub fn with_scheduler(mut self, scheduler: Scheduler) -> Self {
        self.scheduler = scheduler;
        self
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn table(&self) -> &SymbolTable {
        &self.table
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn output(&self) -> &O {
        &self.output
    }

    pub fn output_mut(&mut self) -> &mut O {
        &mut self.output
    }

    pub fn feedback(&self) -> &FeedbackHook {
        &self.feedback
    }

    /// Number of blocks with an edit waiting for its debounce.
    pub fn pending_blocks(&self) -> usize {
        self.blocks.values().filter(|b| b.due.is_some()).count()
    }

    /// The single editor entry point: `block` at editor position `index` now
    /// reads `text`.
    ///
    /// The returned analysis reflects the table as it is now. The block is
    /// committed once it has been quiet for `parse_debounce_ms`; every edit
    /// restarts that wait.
    pub fn on_block_changed(&mut self, block: BlockId, index: usize, text: &str) -> BlockAnalysis {
        let first = dsl::analyze(&self.table, text, block, index);
        let due = Instant::now() + self.config.parse_debounce();
        self.blocks.insert(
            block,
            Block {
                index,
                text: text.to_string(),
                due: Some(due),
                waiting_on: BTreeSet::new(),
            },
        );
        debug!(%block, kind = ?first.kind, errors = first.errors.len(), "block edited");
        BlockAnalysis {
            kind: first.kind,
            flags: first.flags,
            tokens: first.tokens,
            errors: first.errors,
        }
    }

    /// Forget a block: stop its thread and drop its references.
    pub fn remove_block(&mut self, block: BlockId) {
        if self.blocks.remove(&block).is_none() {
            return;
        }
        self.scheduler.kill(block, &mut self.output);
        self.table.clear_block_refs(block);
        self.table.collect_garbage();
        debug!(%block, "block removed");
    }

    /// Commit every pending edit now, ignoring the debounce.
    pub fn flush(&mut self) -> usize {
        let pending: Vec<BlockId> = self
            .blocks
            .iter()
            .filter(|(_, b)| b.due.is_some())
            .map(|(id, _)| *id)
            .collect();
        self.commit(pending)
    }

    pub fn play(&mut self) {
        self.scheduler.play(self.output.now());
    }

    pub fn stop(&mut self) {
        self.scheduler.stop(&mut self.output);
    }

    /// One pass of the main loop: due commits, resolution reports, new
    /// resolutions, then scheduling.
    pub fn tick(&mut self, now: Instant) -> Result<TickReport, AudioError> {
        let due: Vec<BlockId> = self
            .blocks
            .iter()
            .filter(|(_, b)| b.due.is_some_and(|d| d <= now))
            .map(|(id, _)| *id)
            .collect();

        let mut report = TickReport::default();
        if !due.is_empty() {
            report.committed = self.commit(due);
        }
        report.status_changes = self.table.apply_updates();
        report.resolutions_started = self.table.poll_resolutions(now);
        report.clips = self.scheduler.tick(&self.table, &mut self.output, &self.feedback)?;
        Ok(report)
    }

    /// Wait up to `timeout` for resolution reports and apply them.
    pub fn wait_for_resolutions(&mut self, timeout: Duration) -> usize {
        self.table.wait_for_updates(timeout)
    }

    /// Commit `queue` and any blocks displaced on the way, then collect
    /// garbage once.
    fn commit(&mut self, queue: Vec<BlockId>) -> usize {
        let mut queue: VecDeque<BlockId> = queue.into();
        // A block comes back only after a declaration it was waiting on, and
        // declarations do not repeat within one batch. The cap guards bugs.
        let mut budget = 4 * self.blocks.len().max(1) + queue.len();
        let mut committed = 0;

        while let Some(block) = queue.pop_front() {
            if budget == 0 {
                break;
            }
            budget -= 1;
            for displaced in self.commit_block(block) {
                if self.blocks.contains_key(&displaced) && !queue.contains(&displaced) {
                    queue.push_back(displaced);
                }
            }
            committed += 1;
        }

        let evicted = self.table.collect_garbage();
        if !evicted.is_empty() {
            debug!(evicted = ?evicted, "garbage collected");
        }
        committed
    }

    /// Re-analyse and commit one block. Returns blocks to commit again.
    fn commit_block(&mut self, block: BlockId) -> BTreeSet<BlockId> {
        let Some(state) = self.blocks.get_mut(&block) else {
            return BTreeSet::new();
        };
        state.due = None;

        // Analysed again: other blocks may have changed the table since the edit.
        let first = dsl::analyze(&self.table, &state.text, block, state.index);
        if !first.is_clean() {
            debug!(%block, errors = first.errors.len(), "block has errors, keeping previous version");
            state.waiting_on = words_read(&first);
            return BTreeSet::new();
        }
        state.waiting_on.clear();

        let mut displaced: BTreeSet<BlockId> =
            self.table.commit_block(&first).into_iter().collect();
        if let Some(decl) = &first.declaration {
            displaced.extend(
                self.blocks
                    .iter()
                    .filter(|(id, b)| **id != block && b.waiting_on.contains(&decl.name))
                    .map(|(id, _)| *id),
            );
        }
        let result = second_pass(&first, &mut self.table);

        match result.statement {
            Statement::Empty => {
                self.scheduler.kill(block, &mut self.output);
            }
            Statement::Sequence(pattern) => {
                let now = self.output.now();
                self.scheduler
                    .launch(block, &pattern, first.flags, &self.table, now);
            }
            Statement::Assignment { name, value } => {
                self.scheduler.kill(block, &mut self.output);
                if result.error.is_none() && name == builtins::BPM {
                    if let VarValue::Number(bpm) = value {
                        info!(bpm, "tempo change staged");
                        self.scheduler.set_bpm(bpm);
                    }
                }
            }
        }
        displaced
    }
}

/// Identifiers anywhere in the block, inside error regions included.
fn words_read(first: &FirstPassResult) -> BTreeSet<String> {
    let semantic = first.tokens.iter().map(|t| &t.token);
    let swallowed = first.errors.iter().flat_map(|e| e.tokens.iter());
    semantic
        .chain(swallowed)
        .filter(|t| t.kind == LexicalTokenKind::Identifier)
        .map(|t| t.value.clone())
        .collect()
}

impl<O: AudioOutput> std::fmt::Debug for Runtime<O> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("table", &self.table)
            .field("scheduler", &self.scheduler)
            .field("blocks", &self.blocks.len())
            .finish_non_exhaustive()
    }
}
