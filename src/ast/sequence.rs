//! Ordered sequences and beat subdivisions.

use super::step::{EffectsChain, Step};
use super::{Cx, Node};

/// An ordered list of children played one after another.
///
/// When `subdivide` is set the node is a beat subdivision: all of its
/// children share the time of one parent step, so every reported step has its
/// `ppqn` multiplied by the total length of the children.
#[derive(Debug, Clone)]
pub struct Sequence {
    children: Vec<Node>,
    index: usize,
    subdivide: bool,
    effects: EffectsChain,
    current: Step,
    next: Step,
}

impl Sequence {
    pub fn new(children: Vec<Node>, subdivide: bool, effects: EffectsChain) -> Self {
        debug_assert!(!children.is_empty(), "sequence needs at least one child");
        let mut seq = Self {
            children,
            index: 0,
            subdivide,
            effects,
            current: Step::rest(Default::default()),
            next: Step::rest(Default::default()),
        };
        seq.next = seq.report();
        seq.current = seq.next.clone();
        seq
    }

    pub fn current(&self) -> &Step {
        &self.current
    }

    pub fn next(&self) -> &Step {
        &self.next
    }

    pub fn children(&self) -> &[Node] {
        &self.children
    }

    pub fn is_subdivision(&self) -> bool {
        self.subdivide
    }

    pub fn advance(&mut self, cx: &mut Cx<'_>) -> bool {
        self.current = self.next.clone();

        let mut wrapped = false;
        if self.children[self.index].advance(cx) {
            self.index += 1;
            if self.index >= self.children.len() {
                self.index = 0;
                wrapped = true;
            }
        }

        self.next = self.report();
        wrapped
    }

    /// Sum of the children's lengths.
    pub fn total_length(&self) -> u32 {
        self.children.iter().map(Node::length).sum::<u32>().max(1)
    }

    fn divisor(&self) -> u32 {
        if self.subdivide {
            self.total_length()
        } else {
            1
        }
    }

    fn report(&self) -> Step {
        self.children[self.index]
            .next()
            .scaled(self.divisor(), &self.effects)
    }
}
