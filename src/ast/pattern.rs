//! Immutable pattern blueprints.
//!
//! The second parser pass builds a [`Pattern`]; nodes are instantiated from it.
//! Variable values are stored as shared patterns so every reference can build
//! its own playback state without copying another reference's.

use super::choice::Choice;
use super::repetition::Repetition;
use super::sequence::Sequence;
use super::step::{Effect, EffectsChain, InstanceId, Step};
use super::variable::{VarHandle, Variable};
use super::{Bindings, Cx, Node, VarBinding};

/// How many times a repetition plays its child.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Count {
    Fixed(u32),
    /// Read from a numeric variable each time the repetition exhausts.
    Variable(VarHandle),
}

impl Count {
    /// Resolve to a count of at least one, falling back to `previous` when a
    /// variable is not numeric.
    pub fn resolve(&self, bindings: &dyn Bindings, previous: u32) -> u32 {
        match self {
            Count::Fixed(n) => (*n).max(1),
            Count::Variable(handle) => match bindings.number(*handle) {
                Some(n) if n.is_finite() && n >= 1.0 => n.round() as u32,
                Some(_) => 1,
                None => previous.max(1),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Pattern {
    Sound(Step),
    Rest(InstanceId),
    Sequence {
        items: Vec<Pattern>,
        effects: EffectsChain,
    },
    BeatDiv {
        items: Vec<Pattern>,
        effects: EffectsChain,
    },
    Choice {
        options: Vec<Pattern>,
        weights: Vec<f64>,
    },
    Repeat {
        item: Box<Pattern>,
        count: Count,
    },
    Variable {
        handle: VarHandle,
        instance: InstanceId,
        effects: EffectsChain,
    },
}

impl Pattern {
    /// Attach an effect to this pattern. Rests ignore effects.
    pub fn with_effect(self, effect: Effect) -> Pattern {
        match self {
            Pattern::Sound(mut step) => {
                step.effects.push(effect);
                Pattern::Sound(step)
            }
            Pattern::Rest(instance) => Pattern::Rest(instance),
            Pattern::Sequence { items, mut effects } => {
                effects.push(effect);
                Pattern::Sequence { items, effects }
            }
            Pattern::BeatDiv { items, mut effects } => {
                effects.push(effect);
                Pattern::BeatDiv { items, effects }
            }
            Pattern::Variable {
                handle,
                instance,
                mut effects,
            } => {
                effects.push(effect);
                Pattern::Variable {
                    handle,
                    instance,
                    effects,
                }
            }
            other @ (Pattern::Choice { .. } | Pattern::Repeat { .. }) => Pattern::Sequence {
                items: vec![other],
                effects: EffectsChain::new(vec![effect]),
            },
        }
    }

    /// Whether this pattern can reach `target` through variable references.
    pub fn reaches(&self, target: VarHandle, bindings: &dyn Bindings) -> bool {
        let mut seen = Vec::new();
        self.reaches_inner(target, bindings, &mut seen)
    }

    fn reaches_inner(
        &self,
        target: VarHandle,
        bindings: &dyn Bindings,
        seen: &mut Vec<VarHandle>,
    ) -> bool {
        match self {
            Pattern::Sound(_) | Pattern::Rest(_) => false,
            Pattern::Sequence { items, .. } | Pattern::BeatDiv { items, .. } => items
                .iter()
                .any(|p| p.reaches_inner(target, bindings, seen)),
            Pattern::Choice { options, .. } => options
                .iter()
                .any(|p| p.reaches_inner(target, bindings, seen)),
            Pattern::Repeat { item, count } => {
                matches!(count, Count::Variable(h) if *h == target)
                    || item.reaches_inner(target, bindings, seen)
            }
            Pattern::Variable { handle, .. } => {
                if *handle == target {
                    return true;
                }
                if seen.contains(handle) {
                    return false;
                }
                seen.push(*handle);
                match bindings.lookup(*handle) {
                    Some((_, VarBinding::Pattern(p))) => p.reaches_inner(target, bindings, seen),
                    _ => false,
                }
            }
        }
    }
}

pub(super) fn instantiate(pattern: &Pattern, cx: &mut Cx<'_>) -> Node {
    match pattern {
        Pattern::Sound(step) => Node::Terminal(step.clone()),
        Pattern::Rest(instance) => Node::Terminal(Step::rest(*instance)),
        Pattern::Sequence { items, effects } => {
            let children = items.iter().map(|p| instantiate(p, cx)).collect();
            Node::Sequence(Sequence::new(children, false, effects.clone()))
        }
        Pattern::BeatDiv { items, effects } => {
            let children = items.iter().map(|p| instantiate(p, cx)).collect();
            Node::BeatDiv(Sequence::new(children, true, effects.clone()))
        }
        Pattern::Choice { options, weights } => {
            let nodes = options.iter().map(|p| instantiate(p, cx)).collect();
            Node::Choice(Choice::new(nodes, weights, cx))
        }
        Pattern::Repeat { item, count } => {
            let child = instantiate(item, cx);
            Node::Repetition(Repetition::new(child, *count, cx))
        }
        Pattern::Variable {
            handle,
            instance,
            effects,
        } => Node::Variable(Variable::new(*handle, *instance, effects.clone(), cx)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{BlockId, NoBindings};

    fn at(start: usize) -> InstanceId {
        InstanceId::new(BlockId(0), start)
    }

    #[test]
    fn fixed_count_is_at_least_one() {
        assert_eq!(Count::Fixed(0).resolve(&NoBindings, 5), 1);
        assert_eq!(Count::Fixed(4).resolve(&NoBindings, 5), 4);
    }

    #[test]
    fn missing_variable_count_keeps_previous() {
        let count = Count::Variable(VarHandle::new(0, 0));
        assert_eq!(count.resolve(&NoBindings, 3), 3);
    }

    #[test]
    fn effect_on_sound_lands_in_step() {
        let p = Pattern::Sound(Step::sound("a", at(0))).with_effect(Effect::new("reverb", vec![]));
        match p {
            Pattern::Sound(step) => assert_eq!(step.effects.len(), 1),
            other => panic!("expected Sound, got {other:?}"),
        }
    }

    #[test]
    fn effect_on_choice_wraps_in_sequence() {
        let choice = Pattern::Choice {
            options: vec![Pattern::Rest(at(0))],
            weights: vec![1.0],
        };
        let p = choice.with_effect(Effect::new("volume", vec![0.5]));
        assert!(matches!(p, Pattern::Sequence { ref items, .. } if items.len() == 1));
    }

    #[test]
    fn direct_self_reference_is_detected() {
        let h = VarHandle::new(1, 0);
        let p = Pattern::Sequence {
            items: vec![
                Pattern::Sound(Step::sound("a", at(0))),
                Pattern::Variable {
                    handle: h,
                    instance: at(2),
                    effects: EffectsChain::default(),
                },
            ],
            effects: EffectsChain::default(),
        };
        assert!(p.reaches(h, &NoBindings));
        assert!(!p.reaches(VarHandle::new(2, 0), &NoBindings));
    }
}
