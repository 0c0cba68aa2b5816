//! Step values: what a node reports as its current and next playable unit.

use std::fmt;

/// Identifies one statement (editor block).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(pub u32);

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Addresses one specific occurrence of a token, for visual feedback.
///
/// Unique per `(block, start)`. Never used as a symbol lookup key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstanceId {
    pub block: BlockId,
    pub start: usize,
}

impl InstanceId {
    pub fn new(block: BlockId, start: usize) -> Self {
        Self { block, start }
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.block, self.start)
    }
}

/// An instantiated effect: a function name plus fully defaulted arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct Effect {
    pub name: String,
    pub args: Vec<f64>,
}

impl Effect {
    pub fn new(name: impl Into<String>, args: Vec<f64>) -> Self {
        Self {
            name: name.into(),
            args,
        }
    }

    /// Argument at `idx`, or `default` when absent.
    pub fn arg(&self, idx: usize, default: f64) -> f64 {
        self.args.get(idx).copied().unwrap_or(default)
    }
}

/// Ordered list of effects applied to a step, innermost first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EffectsChain {
    effects: Vec<Effect>,
}

impl EffectsChain {
    pub fn new(effects: Vec<Effect>) -> Self {
        Self { effects }
    }

    pub fn push(&mut self, effect: Effect) {
        self.effects.push(effect);
    }

    /// Append an outer chain after this one.
    pub fn then(&self, outer: &EffectsChain) -> EffectsChain {
        let mut effects = self.effects.clone();
        effects.extend(outer.effects.iter().cloned());
        EffectsChain { effects }
    }

    pub fn effects(&self) -> &[Effect] {
        &self.effects
    }

    pub fn find(&self, name: &str) -> impl Iterator<Item = &Effect> {
        let name = name.to_string();
        self.effects.iter().filter(move |e| e.name == name)
    }

    pub fn is_empty(&self) -> bool {
        self.effects.is_empty()
    }

    pub fn len(&self) -> usize {
        self.effects.len()
    }
}

/// One resolved unit of playback.
#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    /// Symbol id of the sound to play. `None` is a rest.
    pub sound: Option<String>,
    /// Subdivision multiplier: the step lasts `1 / ppqn` beats.
    pub ppqn: u32,
    pub effects: EffectsChain,
    pub instance: InstanceId,
}

impl Step {
    pub fn sound(id: impl Into<String>, instance: InstanceId) -> Self {
        Self {
            sound: Some(id.into()),
            ppqn: 1,
            effects: EffectsChain::default(),
            instance,
        }
    }

    pub fn rest(instance: InstanceId) -> Self {
        Self {
            sound: None,
            ppqn: 1,
            effects: EffectsChain::default(),
            instance,
        }
    }

    pub fn is_rest(&self) -> bool {
        self.sound.is_none()
    }

    /// Duration in seconds at the given tempo.
    pub fn duration_secs(&self, bpm: f64) -> f64 {
        (1.0 / self.ppqn.max(1) as f64) * (60.0 / bpm)
    }

    /// Copy of this step subdivided by `divisor` with `outer` effects appended.
    pub(crate) fn scaled(&self, divisor: u32, outer: &EffectsChain) -> Step {
        let mut step = self.clone();
        step.ppqn = step.ppqn.saturating_mul(divisor.max(1));
        if !outer.is_empty() {
            step.effects = step.effects.then(outer);
        }
        step
    }
}
