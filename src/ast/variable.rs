//! Variable references hold a handle into the variable arena, not a copy.

use std::fmt;

use super::step::{EffectsChain, InstanceId, Step};
use super::{Cx, Node, VarBinding};

/// Generational handle to a variable slot.
///
/// A freed slot bumps its generation, so stale handles read as undefined
/// instead of aliasing whatever variable reuses the slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VarHandle {
    index: u32,
    generation: u32,
}

impl VarHandle {
    pub fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    pub fn index(&self) -> usize {
        self.index as usize
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }
}

impl fmt::Display for VarHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "var#{}.{}", self.index, self.generation)
    }
}

/// A node that plays whatever sequence its variable currently holds.
///
/// The value is re-read only when the node cycles, so a redefinition never
/// changes a step mid-pattern.
#[derive(Debug, Clone)]
pub struct Variable {
    handle: VarHandle,
    instance: InstanceId,
    effects: EffectsChain,
    version: Option<u64>,
    inner: Option<Box<Node>>,
    current: Step,
    next: Step,
}

impl Variable {
    pub fn new(
        handle: VarHandle,
        instance: InstanceId,
        effects: EffectsChain,
        cx: &mut Cx<'_>,
    ) -> Self {
        let mut var = Self {
            handle,
            instance,
            effects,
            version: None,
            inner: None,
            current: Step::rest(instance),
            next: Step::rest(instance),
        };
        var.refresh(cx);
        var.next = var.report();
        var.current = var.next.clone();
        var
    }

    pub fn handle(&self) -> VarHandle {
        self.handle
    }

    pub fn current(&self) -> &Step {
        &self.current
    }

    pub fn next(&self) -> &Step {
        &self.next
    }

    pub fn advance(&mut self, cx: &mut Cx<'_>) -> bool {
        self.current = self.next.clone();

        let cycled = match self.inner.as_mut() {
            Some(inner) => inner.advance(cx),
            None => true,
        };
        if cycled {
            self.refresh(cx);
        }

        self.next = self.report();
        cycled
    }

    pub fn length(&self) -> u32 {
        self.inner.as_ref().map(|n| n.length()).unwrap_or(1)
    }

    /// Rebuild the inner node if the slot's version moved on.
    fn refresh(&mut self, cx: &mut Cx<'_>) {
        let lookup = cx.bindings.lookup(self.handle);
        let version = lookup.as_ref().map(|(v, _)| *v);
        if version.is_some() && version == self.version {
            return;
        }
        self.version = version;
        self.inner = match lookup {
            Some((_, VarBinding::Pattern(pattern))) => {
                Some(Box::new(Node::build(&pattern, cx)))
            }
            _ => None,
        };
    }

    fn report(&self) -> Step {
        match &self.inner {
            Some(inner) => inner.next().scaled(1, &self.effects),
            None => Step::rest(self.instance),
        }
    }
}
