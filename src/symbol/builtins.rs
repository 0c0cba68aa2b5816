//! Built-in symbols: the rest, the tempo variable, the sound query function
//! and the chainable effects.

use crate::ast::Effect;

pub const REST: &str = "_";
pub const BPM: &str = "bpm";
pub const SOUND: &str = "sound";

/// Token type a parameter value may have.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
    Number,
    Hz,
    String,
    Identifier,
    /// Present without a value.
    Flag,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParamSpec {
    pub name: &'static str,
    pub accepts: &'static [ParamType],
    pub default: f64,
}

impl ParamSpec {
    const fn new(name: &'static str, accepts: &'static [ParamType], default: f64) -> Self {
        Self {
            name,
            accepts,
            default,
        }
    }

    pub fn accepts(&self, ty: ParamType) -> bool {
        self.accepts.contains(&ty)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionKind {
    /// Refines an asset search (`kick(dur: 0.5)`).
    Query,
    /// Chained onto a pattern (`kick.reverb(0.5)`).
    Effect,
}

/// A built-in function definition.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDef {
    pub name: &'static str,
    pub kind: FunctionKind,
    pub params: Vec<ParamSpec>,
}

impl FunctionDef {
    pub fn param(&self, name: &str) -> Option<&ParamSpec> {
        self.params.iter().find(|p| p.name == name)
    }

    /// Build an effect from positional arguments, defaulting the rest.
    pub fn instantiate(&self, args: &[f64]) -> Effect {
        let args = self
            .params
            .iter()
            .enumerate()
            .map(|(i, p)| args.get(i).copied().unwrap_or(p.default))
            .collect();
        Effect::new(self.name, args)
    }
}

const NUMERIC: &[ParamType] = &[ParamType::Number];
const FREQUENCY: &[ParamType] = &[ParamType::Hz, ParamType::Number];

/// Every built-in function.
pub fn functions() -> Vec<FunctionDef> {
    let effect = |name: &'static str, params: Vec<ParamSpec>| FunctionDef {
        name,
        kind: FunctionKind::Effect,
        params,
    };
    vec![
        FunctionDef {
            name: SOUND,
            kind: FunctionKind::Query,
            params: vec![
                ParamSpec::new("dur", NUMERIC, 0.0),
                ParamSpec::new(
                    "tag",
                    &[ParamType::String, ParamType::Identifier, ParamType::Number],
                    0.0,
                ),
                ParamSpec::new("pitch", FREQUENCY, 0.0),
                ParamSpec::new("unique", &[ParamType::Flag], 0.0),
            ],
        },
        effect("volume", vec![ParamSpec::new("gain", NUMERIC, 1.0)]),
        effect("pan", vec![ParamSpec::new("position", NUMERIC, 0.0)]),
        effect("speed", vec![ParamSpec::new("rate", NUMERIC, 1.0)]),
        effect("reverb", vec![ParamSpec::new("mix", NUMERIC, 0.3)]),
        effect(
            "delay",
            vec![
                ParamSpec::new("time", NUMERIC, 0.25),
                ParamSpec::new("feedback", NUMERIC, 0.3),
            ],
        ),
        effect("lowpass", vec![ParamSpec::new("cutoff", FREQUENCY, 20_000.0)]),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn effect_arguments_default() {
        let defs = functions();
        let delay = defs.iter().find(|f| f.name == "delay").unwrap();
        let effect = delay.instantiate(&[0.5]);
        assert_eq!(effect.args, vec![0.5, 0.3]);
    }

    #[test]
    fn sound_query_params() {
        let defs = functions();
        let sound = defs.iter().find(|f| f.name == SOUND).unwrap();
        assert_eq!(sound.kind, FunctionKind::Query);
        assert!(sound.param("pitch").unwrap().accepts(ParamType::Hz));
        assert!(!sound.param("dur").unwrap().accepts(ParamType::String));
        assert!(sound.param("colour").is_none());
    }
}
