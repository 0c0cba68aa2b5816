//! Symbol table: every identifier the blocks mention, with per-block
//! reference lists, garbage collection of unreferenced entries and
//! background resolution of sounds.
//!
//! Sounds start out `Searching`. Once a sound has sat unchanged for the fetch
//! debounce, [`SymbolTable::poll_resolutions`] starts a worker for it, and
//! [`SymbolTable::apply_updates`] folds worker reports back in. Both run on
//! the caller's thread, so the table itself is never shared.

pub mod builtins;
pub mod entry;
pub(crate) mod resolve;
pub mod variables;

use std::collections::{BTreeMap, HashMap};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::assets::AssetSource;
use crate::ast::{Bindings, BlockId, InstanceId, VarBinding, VarHandle};
use crate::audio::PlayableBuffer;
use crate::dsl::{canonical_id, FirstPassResult, QueryParams, ReferenceKind};
use crate::feedback::FeedbackHook;

pub use builtins::{FunctionDef, FunctionKind, ParamSpec, ParamType};
pub use entry::{Category, EntryKind, Occurrence, SoundEntry, SoundStatus, SymbolEntry};
pub use resolve::Paging;
pub use variables::{VarType, VarValue};

use resolve::{ResolutionEvent, ResolutionTask, ResolutionUpdate};
use variables::VariableArena;

#[derive(Debug, Error, PartialEq)]
pub enum DefineError {
    #[error("`{0}` would refer to itself")]
    Cycle(String),
    #[error("`{0}` only accepts a number")]
    TypeMismatch(String),
    #[error("variable is no longer declared")]
    Stale,
}

/// Resolution settings for a [`SymbolTable`].
#[derive(Debug, Clone)]
pub struct TableConfig {
    /// How long a new sound waits before its search starts.
    pub fetch_debounce: Duration,
    pub paging: Paging,
    /// Extra search filters applied to every query.
    pub filters: BTreeMap<String, String>,
    pub seed: u64,
}

impl Default for TableConfig {
    fn default() -> Self {
        Self {
            fetch_debounce: Duration::from_millis(250),
            paging: Paging::default(),
            filters: BTreeMap::new(),
            seed: 0,
        }
    }
}

pub struct SymbolTable {
    entries: HashMap<String, SymbolEntry>,
    variables: VariableArena,
    /// Sounds waiting for their debounce to expire.
    pending: HashMap<String, Instant>,
    tasks: HashMap<String, ResolutionTask>,
    next_serial: u64,
    source: Option<AssetSource>,
    config: TableConfig,
    rng: ChaCha8Rng,
    tx: Sender<ResolutionUpdate>,
    rx: Receiver<ResolutionUpdate>,
    feedback: FeedbackHook,
}

impl SymbolTable {
    pub fn new(config: TableConfig) -> Self {
        let (tx, rx) = mpsc::channel();
        let mut table = Self {
            entries: HashMap::new(),
            variables: VariableArena::new(),
            pending: HashMap::new(),
            tasks: HashMap::new(),
            next_serial: 0,
            source: None,
            rng: ChaCha8Rng::seed_from_u64(config.seed),
            config,
            tx,
            rx,
            feedback: FeedbackHook::default(),
        };
        table.install_builtins();
        table
    }

    fn install_builtins(&mut self) {
        let mut rest = SymbolEntry::new(
            builtins::REST,
            EntryKind::Sound(SoundEntry {
                status: SoundStatus::Available,
                ..SoundEntry::new(builtins::REST, QueryParams::new())
            }),
        );
        rest.builtin = true;
        self.entries.insert(rest.id.clone(), rest);

        let handle = self.variables.alloc(VarType::Number);
        let mut bpm = SymbolEntry::new(builtins::BPM, EntryKind::Variable(handle));
        bpm.builtin = true;
        self.entries.insert(bpm.id.clone(), bpm);

        for def in builtins::functions() {
            let mut entry = SymbolEntry::new(def.name, EntryKind::Function(Arc::new(def)));
            entry.builtin = true;
            self.entries.insert(entry.id.clone(), entry);
        }
    }

    pub fn set_source(&mut self, source: AssetSource) {
        self.source = Some(source);
    }

    pub fn set_feedback(&mut self, feedback: FeedbackHook) {
        self.feedback = feedback;
    }

    pub fn get(&self, id: &str) -> Option<&SymbolEntry> {
        self.entries.get(id)
    }

    pub fn entries(&self) -> impl Iterator<Item = &SymbolEntry> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_sound(&self, id: &str) -> bool {
        self.category(id) == Some(Category::Sound)
    }

    pub fn is_variable(&self, id: &str) -> bool {
        self.category(id) == Some(Category::Variable)
    }

    pub fn is_fn(&self, id: &str) -> bool {
        self.category(id) == Some(Category::Function)
    }

    fn category(&self, id: &str) -> Option<Category> {
        self.entries.get(id).map(SymbolEntry::category)
    }

    pub fn function(&self, id: &str) -> Option<Arc<FunctionDef>> {
        match &self.entries.get(id)?.kind {
            EntryKind::Function(def) => Some(def.clone()),
            _ => None,
        }
    }

    pub fn status(&self, id: &str) -> Option<SoundStatus> {
        self.entries.get(id)?.status()
    }

    /// The decoded buffer of an `Available` sound.
    pub fn available_buffer(&self, id: &str) -> Option<Arc<PlayableBuffer>> {
        let sound = self.entries.get(id)?.sound()?;
        match sound.status {
            SoundStatus::Available => sound.buffer.clone(),
            _ => None,
        }
    }

    /// Register one occurrence of a sound literal and return its id.
    ///
    /// A new id creates a `Searching` entry; its search starts after the
    /// fetch debounce.
    pub fn register_sound(
        &mut self,
        keyword: &str,
        params: &QueryParams,
        block: BlockId,
        occurrence: Occurrence,
    ) -> String {
        let id = canonical_id(keyword, params, occurrence.instance);
        if let Some(entry) = self.entries.get_mut(&id) {
            entry.add_reference(block, occurrence);
            return id;
        }

        let mut entry = SymbolEntry::new(
            id.clone(),
            EntryKind::Sound(SoundEntry::new(keyword, params.clone())),
        );
        entry.add_reference(block, occurrence);
        self.entries.insert(id.clone(), entry);
        self.pending.insert(id.clone(), Instant::now());
        debug!(sound = %id, "registered");
        self.feedback.status_changed(&id, SoundStatus::Searching);
        id
    }

    /// Record a reference to an existing entry. Returns `false` if `id` is
    /// unknown.
    pub fn add_reference(&mut self, id: &str, block: BlockId, occurrence: Occurrence) -> bool {
        match self.entries.get_mut(id) {
            Some(entry) => {
                entry.add_reference(block, occurrence);
                true
            }
            None => false,
        }
    }

    /// Declare `name` as a variable referenced by `block`.
    ///
    /// Returns the variable's handle and the blocks that used `name` as a
    /// sound before; those need to be parsed again. `None` if `name` is a
    /// function.
    pub fn declare_variable(
        &mut self,
        name: &str,
        declared: VarType,
        block: BlockId,
        occurrence: Occurrence,
    ) -> Option<(VarHandle, Vec<BlockId>)> {
        let mut displaced = Vec::new();
        match self.entries.get_mut(name) {
            Some(entry) => match entry.kind {
                EntryKind::Variable(handle) => {
                    entry.add_reference(block, occurrence);
                    return Some((handle, displaced));
                }
                EntryKind::Function(_) => return None,
                EntryKind::Sound(_) => {
                    displaced = entry.references.keys().copied().collect();
                    self.evict(name);
                }
            },
            None => {}
        }

        let handle = self.variables.alloc(declared);
        let mut entry = SymbolEntry::new(name, EntryKind::Variable(handle));
        entry.add_reference(block, occurrence);
        self.entries.insert(name.to_string(), entry);
        debug!(variable = name, %handle, "declared");
        Some((handle, displaced))
    }

    pub fn variable_handle(&self, id: &str) -> Option<VarHandle> {
        match self.entries.get(id)?.kind {
            EntryKind::Variable(handle) => Some(handle),
            _ => None,
        }
    }

    /// Current value of the variable `id`.
    pub fn variable(&self, id: &str) -> Option<&VarValue> {
        self.variables.value(self.variable_handle(id)?)
    }

    /// Store a value, rejecting definitions that would make the variable
    /// reach itself.
    pub fn define_variable(&mut self, handle: VarHandle, value: VarValue) -> Result<(), DefineError> {
        let name = self
            .entries
            .values()
            .find(|e| matches!(e.kind, EntryKind::Variable(h) if h == handle))
            .map(|e| e.id.clone())
            .ok_or(DefineError::Stale)?;

        match &value {
            VarValue::Pattern(_) if name == builtins::BPM => {
                return Err(DefineError::TypeMismatch(name));
            }
            VarValue::Pattern(pattern) if pattern.reaches(handle, &*self) => {
                return Err(DefineError::Cycle(name));
            }
            _ => {}
        }

        if self.variables.set(handle, value) {
            Ok(())
        } else {
            Err(DefineError::Stale)
        }
    }

    /// Remove every reference held by `block`.
    pub fn clear_block_refs(&mut self, block: BlockId) {
        for entry in self.entries.values_mut() {
            entry.references.remove(&block);
        }
    }

    /// Replace `block`'s references with those found by its first pass.
    ///
    /// Returns blocks that must be parsed again because a name they used as
    /// a sound is now a variable.
    pub fn commit_block(&mut self, result: &FirstPassResult) -> Vec<BlockId> {
        let block = result.block;
        self.clear_block_refs(block);

        let mut displaced = Vec::new();
        if let Some(decl) = &result.declaration {
            let occurrence = Occurrence {
                instance: decl.instance,
                index: result.index,
            };
            if let Some((_, blocks)) =
                self.declare_variable(&decl.name, decl.declared, block, occurrence)
            {
                displaced = blocks;
            }
        }

        for reference in &result.references {
            let occurrence = Occurrence {
                instance: reference.instance,
                index: result.index,
            };
            match &reference.kind {
                ReferenceKind::Sound { keyword, params } => {
                    self.register_sound(keyword, params, block, occurrence);
                }
                ReferenceKind::Variable | ReferenceKind::Function => {
                    if !self.add_reference(&reference.id, block, occurrence) {
                        warn!(id = %reference.id, %block, "reference to unknown symbol");
                    }
                }
            }
        }

        displaced.retain(|b| *b != block);
        displaced
    }

    /// Blocks holding at least one reference to `id`.
    pub fn blocks_referencing(&self, id: &str) -> Vec<BlockId> {
        self.entries
            .get(id)
            .map(|e| e.references.keys().copied().collect())
            .unwrap_or_default()
    }

    /// Evict every entry no block references. Built-ins are kept.
    pub fn collect_garbage(&mut self) -> Vec<String> {
        let dead: Vec<String> = self
            .entries
            .values()
            .filter(|e| !e.is_referenced())
            .map(|e| e.id.clone())
            .collect();
        for id in &dead {
            self.evict(id);
        }
        if !dead.is_empty() {
            debug!(count = dead.len(), "collected unreferenced symbols");
        }
        dead
    }

    fn evict(&mut self, id: &str) {
        self.pending.remove(id);
        if let Some(mut task) = self.tasks.remove(id) {
            task.cancel();
        }
        if let Some(entry) = self.entries.remove(id) {
            if let EntryKind::Variable(handle) = entry.kind {
                self.variables.free(handle);
            }
        }
    }

    /// Start resolution for every sound whose debounce expired by `now`.
    /// Returns the number of workers started.
    pub fn poll_resolutions(&mut self, now: Instant) -> usize {
        let Some(source) = self.source.clone() else {
            return 0;
        };
        let debounce = self.config.fetch_debounce;
        let due: Vec<String> = self
            .pending
            .iter()
            .filter(|(_, since)| now.saturating_duration_since(**since) >= debounce)
            .map(|(id, _)| id.clone())
            .collect();

        let mut started = 0;
        for id in due {
            self.pending.remove(&id);
            let Some(sound) = self.entries.get(&id).and_then(SymbolEntry::sound) else {
                continue;
            };
            if sound.status != SoundStatus::Searching {
                continue;
            }

            let mut query = sound
                .params
                .search_query(&sound.keyword, self.config.paging.page_size);
            query.filters = self.config.filters.clone();

            self.next_serial += 1;
            let task = ResolutionTask::spawn(
                id.clone(),
                query,
                source.clone(),
                self.config.paging,
                self.rng.gen(),
                self.next_serial,
                self.tx.clone(),
            );
            if let Some(mut old) = self.tasks.insert(id.clone(), task) {
                old.cancel();
            }
            info!(sound = %id, "searching");
            started += 1;
        }
        started
    }

    /// Apply every report received from workers so far. Returns the number
    /// of status changes.
    pub fn apply_updates(&mut self) -> usize {
        let mut changed = 0;
        while let Ok(update) = self.rx.try_recv() {
            if self.apply(update) {
                changed += 1;
            }
        }
        changed
    }

    /// Block up to `timeout` for the next report, then apply everything
    /// queued.
    pub fn wait_for_updates(&mut self, timeout: Duration) -> usize {
        match self.rx.recv_timeout(timeout) {
            Ok(update) => usize::from(self.apply(update)) + self.apply_updates(),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => 0,
        }
    }

    /// Number of sounds still waiting for their debounce.
    pub fn pending_resolutions(&self) -> usize {
        self.pending.len()
    }

    pub fn active_tasks(&self) -> usize {
        self.tasks.values().filter(|t| !t.is_finished()).count()
    }

    #[cfg(test)]
    pub(crate) fn insert_available(&mut self, id: &str, buffer: PlayableBuffer) {
        let sound = SoundEntry {
            status: SoundStatus::Available,
            buffer: Some(Arc::new(buffer)),
            ..SoundEntry::new(id, QueryParams::new())
        };
        self.entries
            .insert(id.to_string(), SymbolEntry::new(id, EntryKind::Sound(sound)));
    }

    fn apply(&mut self, update: ResolutionUpdate) -> bool {
        let ResolutionUpdate { id, serial, event } = update;
        if self.tasks.get(&id).map(|t| t.serial) != Some(serial) {
            debug!(sound = %id, "dropping report from evicted task");
            return false;
        }
        let Some(sound) = self.entries.get_mut(&id).and_then(SymbolEntry::sound_mut) else {
            return false;
        };

        let status = match event {
            ResolutionEvent::Downloading(asset) => {
                debug!(sound = %id, asset = %asset.name, "downloading");
                sound.asset = Some(asset);
                SoundStatus::Downloading
            }
            ResolutionEvent::Available(buffer) => {
                info!(sound = %id, secs = buffer.duration_secs(), "available");
                sound.buffer = Some(buffer);
                self.tasks.remove(&id);
                SoundStatus::Available
            }
            ResolutionEvent::Unavailable(reason) => {
                warn!(sound = %id, %reason, "unavailable");
                self.tasks.remove(&id);
                SoundStatus::Unavailable
            }
        };

        if let Some(sound) = self.entries.get_mut(&id).and_then(SymbolEntry::sound_mut) {
            sound.status = status;
        }
        self.feedback.status_changed(&id, status);
        true
    }
}

impl Bindings for SymbolTable {
    fn lookup(&self, handle: VarHandle) -> Option<(u64, VarBinding)> {
        self.variables.binding(handle)
    }
}

impl Drop for SymbolTable {
    fn drop(&mut self) {
        for task in self.tasks.values_mut() {
            task.cancel();
        }
    }
}

impl std::fmt::Debug for SymbolTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SymbolTable")
            .field("entries", &self.entries.len())
            .field("variables", &self.variables.len())
            .field("pending", &self.pending.len())
            .field("tasks", &self.tasks.len())
            .finish()
    }
}

/// Occurrence helper for callers outside a first pass.
pub fn occurrence(block: BlockId, start: usize, index: usize) -> Occurrence {
    Occurrence {
        instance: InstanceId::new(block, start),
        index,
    }
}
