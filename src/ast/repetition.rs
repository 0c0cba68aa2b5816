//! Repetition replays one child a number of times. The count may be live.

use super::pattern::Count;
use super::step::Step;
use super::{Cx, Node};

#[derive(Debug, Clone)]
pub struct Repetition {
    child: Box<Node>,
    count: Count,
    times: u32,
    done: u32,
    current: Step,
    next: Step,
}

impl Repetition {
    pub fn new(child: Node, count: Count, cx: &Cx<'_>) -> Self {
        let times = count.resolve(cx.bindings, 1);
        let next = child.next().clone();
        Self {
            child: Box::new(child),
            count,
            times,
            done: 0,
            current: next.clone(),
            next,
        }
    }

    pub fn current(&self) -> &Step {
        &self.current
    }

    pub fn next(&self) -> &Step {
        &self.next
    }

    /// Repetition count currently in effect.
    pub fn times(&self) -> u32 {
        self.times
    }

    pub fn advance(&mut self, cx: &mut Cx<'_>) -> bool {
        self.current = self.next.clone();

        let mut cycled = false;
        if self.child.advance(cx) {
            self.done += 1;
            if self.done >= self.times {
                self.done = 0;
                self.times = self.count.resolve(cx.bindings, self.times);
                cycled = true;
            }
        }

        self.next = self.child.next().clone();
        cycled
    }

    pub fn length(&self) -> u32 {
        self.times.saturating_mul(self.child.length())
    }
}
