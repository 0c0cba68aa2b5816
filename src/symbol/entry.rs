use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use super::builtins::FunctionDef;
use crate::assets::AssetHit;
use crate::ast::{BlockId, InstanceId, VarHandle};
use crate::audio::PlayableBuffer;
use crate::dsl::QueryParams;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    Sound,
    Variable,
    Function,
}

/// Resolution state of a sound entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SoundStatus {
    Searching,
    Downloading,
    Available,
    Unavailable,
}

impl SoundStatus {
    /// Lowercase name for styling hooks.
    pub fn class_name(self) -> &'static str {
        match self {
            SoundStatus::Searching => "searching",
            SoundStatus::Downloading => "downloading",
            SoundStatus::Available => "available",
            SoundStatus::Unavailable => "unavailable",
        }
    }

    pub fn is_settled(self) -> bool {
        matches!(self, SoundStatus::Available | SoundStatus::Unavailable)
    }
}

impl fmt::Display for SoundStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.class_name())
    }
}

#[derive(Debug, Clone)]
pub struct SoundEntry {
    pub keyword: String,
    pub params: QueryParams,
    pub status: SoundStatus,
    pub asset: Option<AssetHit>,
    pub buffer: Option<Arc<PlayableBuffer>>,
}

impl SoundEntry {
    pub fn new(keyword: impl Into<String>, params: QueryParams) -> Self {
        Self {
            keyword: keyword.into(),
            params,
            status: SoundStatus::Searching,
            asset: None,
            buffer: None,
        }
    }
}

#[derive(Debug, Clone)]
pub enum EntryKind {
    Sound(SoundEntry),
    Variable(VarHandle),
    Function(Arc<FunctionDef>),
}

/// Where a symbol occurs inside a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Occurrence {
    pub instance: InstanceId,
    /// Editor position of the block.
    pub index: usize,
}

#[derive(Debug, Clone)]
pub struct SymbolEntry {
    pub id: String,
    pub kind: EntryKind,
    pub references: BTreeMap<BlockId, Vec<Occurrence>>,
    /// Built-ins are never collected.
    pub builtin: bool,
}

impl SymbolEntry {
    pub fn new(id: impl Into<String>, kind: EntryKind) -> Self {
        Self {
            id: id.into(),
            kind,
            references: BTreeMap::new(),
            builtin: false,
        }
    }

    pub fn category(&self) -> Category {
        match self.kind {
            EntryKind::Sound(_) => Category::Sound,
            EntryKind::Variable(_) => Category::Variable,
            EntryKind::Function(_) => Category::Function,
        }
    }

    pub fn add_reference(&mut self, block: BlockId, occurrence: Occurrence) {
        let list = self.references.entry(block).or_default();
        if !list.contains(&occurrence) {
            list.push(occurrence);
        }
    }

    pub fn reference_count(&self) -> usize {
        self.references.values().map(Vec::len).sum()
    }

    pub fn is_referenced(&self) -> bool {
        self.builtin || self.reference_count() > 0
    }

    pub fn sound(&self) -> Option<&SoundEntry> {
        match &self.kind {
            EntryKind::Sound(s) => Some(s),
            _ => None,
        }
    }

    pub(crate) fn sound_mut(&mut self) -> Option<&mut SoundEntry> {
        match &mut self.kind {
            EntryKind::Sound(s) => Some(s),
            _ => None,
        }
    }

    pub fn status(&self) -> Option<SoundStatus> {
        self.sound().map(|s| s.status)
    }
}
