//! Generational arena of variable slots.

use std::sync::Arc;

use crate::ast::{Pattern, VarBinding, VarHandle};

/// Declared type of a variable, fixed by its first assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarType {
    Number,
    Sequence,
}

#[derive(Debug, Clone, Default)]
pub enum VarValue {
    #[default]
    Undefined,
    Number(f64),
    Pattern(Arc<Pattern>),
}

impl VarValue {
    pub fn is_defined(&self) -> bool {
        !matches!(self, VarValue::Undefined)
    }
}

#[derive(Debug)]
struct Slot {
    generation: u32,
    version: u64,
    declared: VarType,
    value: VarValue,
    live: bool,
}

#[derive(Debug, Default)]
pub struct VariableArena {
    slots: Vec<Slot>,
    free: Vec<u32>,
    versions: u64,
}

impl VariableArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alloc(&mut self, declared: VarType) -> VarHandle {
        match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index as usize];
                slot.generation = slot.generation.wrapping_add(1);
                slot.declared = declared;
                slot.value = VarValue::Undefined;
                slot.live = true;
                VarHandle::new(index, slot.generation)
            }
            None => {
                let index = self.slots.len() as u32;
                self.slots.push(Slot {
                    generation: 0,
                    version: 0,
                    declared,
                    value: VarValue::Undefined,
                    live: true,
                });
                VarHandle::new(index, 0)
            }
        }
    }

    /// Release a slot. Outstanding handles read as undefined afterwards.
    pub fn free(&mut self, handle: VarHandle) {
        if let Some(slot) = self.slot_mut(handle) {
            slot.live = false;
            slot.value = VarValue::Undefined;
            self.free.push(handle.index() as u32);
        }
    }

    pub fn value(&self, handle: VarHandle) -> Option<&VarValue> {
        self.slot(handle).map(|s| &s.value)
    }

    pub fn declared(&self, handle: VarHandle) -> Option<VarType> {
        self.slot(handle).map(|s| s.declared)
    }

    /// Store a new value and bump the slot's version. Returns `false` for a
    /// stale handle.
    pub fn set(&mut self, handle: VarHandle, value: VarValue) -> bool {
        self.versions += 1;
        let version = self.versions;
        match self.slot_mut(handle) {
            Some(slot) => {
                slot.declared = match value {
                    VarValue::Number(_) => VarType::Number,
                    VarValue::Pattern(_) => VarType::Sequence,
                    VarValue::Undefined => slot.declared,
                };
                slot.value = value;
                slot.version = version;
                true
            }
            None => false,
        }
    }

    pub fn binding(&self, handle: VarHandle) -> Option<(u64, VarBinding)> {
        let slot = self.slot(handle)?;
        let binding = match &slot.value {
            VarValue::Undefined => return None,
            VarValue::Number(n) => VarBinding::Number(*n),
            VarValue::Pattern(p) => VarBinding::Pattern(p.clone()),
        };
        Some((slot.version, binding))
    }

    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.live).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn slot(&self, handle: VarHandle) -> Option<&Slot> {
        self.slots
            .get(handle.index())
            .filter(|s| s.live && s.generation == handle.generation())
    }

    fn slot_mut(&mut self, handle: VarHandle) -> Option<&mut Slot> {
        self.slots
            .get_mut(handle.index())
            .filter(|s| s.live && s.generation == handle.generation())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stale_handle_reads_undefined() {
        let mut arena = VariableArena::new();
        let a = arena.alloc(VarType::Number);
        assert!(arena.set(a, VarValue::Number(3.0)));
        arena.free(a);
        let b = arena.alloc(VarType::Number);
        assert_eq!(a.index(), b.index());
        assert!(arena.binding(a).is_none());
        assert!(!arena.set(a, VarValue::Number(1.0)));
        assert!(arena.binding(b).is_none());
    }

    #[test]
    fn versions_increase_on_every_set() {
        let mut arena = VariableArena::new();
        let a = arena.alloc(VarType::Number);
        arena.set(a, VarValue::Number(1.0));
        let (v1, _) = arena.binding(a).unwrap();
        arena.set(a, VarValue::Number(1.0));
        let (v2, _) = arena.binding(a).unwrap();
        assert!(v2 > v1);
    }
}
