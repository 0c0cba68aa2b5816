//! Self-advancing cyclic AST. Sequences, choices, repetitions and
//! subdivisions are steppable automata.
//!
//! Every [`Node`] holds a `current` and a `next` [`Step`]. Advancing is a
//! post-order bubble-up: a parent only moves its own position once its active
//! child reports that it cycled, and it always takes `current` from what was
//! `next` rather than recomputing it. Reading `current()` between two
//! `advance()` calls is therefore stable and free of side effects.
//!
//! Nodes are instantiated from immutable [`Pattern`] blueprints. Variables are
//! not deep-copied into the tree: a [`Node::Variable`] holds a [`VarHandle`]
//! into the symbol table's variable arena and re-reads it through [`Bindings`]
//! whenever it cycles.

pub mod choice;
pub mod pattern;
pub mod repetition;
pub mod sequence;
pub mod step;
pub mod variable;

use std::sync::Arc;

pub use choice::{cdf, Choice, RandomSelector, Selector};
pub use pattern::{Count, Pattern};
pub use repetition::Repetition;
pub use sequence::Sequence;
pub use step::{BlockId, Effect, EffectsChain, InstanceId, Step};
pub use variable::{VarHandle, Variable};

/// A variable's value as seen by the AST.
#[derive(Debug, Clone)]
pub enum VarBinding {
    Number(f64),
    Pattern(Arc<Pattern>),
}

/// Read access to variable values.
///
/// Implemented by the symbol table; the AST never depends on the table type.
pub trait Bindings {
    /// Current `(version, value)` of a variable slot, or `None` if the slot is
    /// undefined or was freed.
    fn lookup(&self, handle: VarHandle) -> Option<(u64, VarBinding)>;

    fn number(&self, handle: VarHandle) -> Option<f64> {
        match self.lookup(handle) {
            Some((_, VarBinding::Number(n))) => Some(n),
            _ => None,
        }
    }
}

/// Bindings with no variables at all.
pub struct NoBindings;

impl Bindings for NoBindings {
    fn lookup(&self, _handle: VarHandle) -> Option<(u64, VarBinding)> {
        None
    }
}

/// Context threaded through construction and `advance()`.
pub struct Cx<'a> {
    pub bindings: &'a dyn Bindings,
    pub selector: &'a mut dyn Selector,
}

impl<'a> Cx<'a> {
    pub fn new(bindings: &'a dyn Bindings, selector: &'a mut dyn Selector) -> Self {
        Self { bindings, selector }
    }
}

/// A steppable AST node.
#[derive(Debug, Clone)]
pub enum Node {
    Terminal(Step),
    Sequence(Sequence),
    BeatDiv(Sequence),
    Choice(Choice),
    Repetition(Repetition),
    Variable(Variable),
}

impl Node {
    /// Instantiate a node tree from a blueprint.
    pub fn build(pattern: &Pattern, cx: &mut Cx<'_>) -> Node {
        pattern::instantiate(pattern, cx)
    }

    /// The step most recently advanced onto.
    pub fn current(&self) -> &Step {
        match self {
            Node::Terminal(step) => step,
            Node::Sequence(s) | Node::BeatDiv(s) => s.current(),
            Node::Choice(c) => c.current(),
            Node::Repetition(r) => r.current(),
            Node::Variable(v) => v.current(),
        }
    }

    /// The step the next `advance()` will move onto.
    pub fn next(&self) -> &Step {
        match self {
            Node::Terminal(step) => step,
            Node::Sequence(s) | Node::BeatDiv(s) => s.next(),
            Node::Choice(c) => c.next(),
            Node::Repetition(r) => r.next(),
            Node::Variable(v) => v.next(),
        }
    }

    /// Move one step forward. Returns `true` when this node's stream cycled
    /// back to its start.
    pub fn advance(&mut self, cx: &mut Cx<'_>) -> bool {
        match self {
            Node::Terminal(_) => true,
            Node::Sequence(s) | Node::BeatDiv(s) => s.advance(cx),
            Node::Choice(c) => c.advance(cx),
            Node::Repetition(r) => r.advance(cx),
            Node::Variable(v) => v.advance(cx),
        }
    }

    /// Number of steps this node occupies in its parent.
    ///
    /// A subdivision always occupies one step; its children share it. This
    /// is not the subdivision's divisor, which is its children's
    /// [`Sequence::total_length`].
    pub fn length(&self) -> u32 {
        match self {
            Node::Terminal(_) => 1,
            Node::Sequence(s) => s.total_length(),
            Node::BeatDiv(_) => 1,
            Node::Choice(c) => c.length(),
            Node::Repetition(r) => r.length(),
            Node::Variable(v) => v.length(),
        }
    }
}
