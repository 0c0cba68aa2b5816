//! Second parser pass: semantic tokens to pattern blueprints.
//!
//! Runs only on blocks the first pass accepted, so it trusts the token
//! structure and skips anything it does not recognise.

use std::sync::Arc;

use tracing::warn;

use super::first_pass::{FirstPassResult, StatementKind};
use super::token::{Bracket, SemanticKind, SemanticToken};
use super::Flow;
use crate::ast::{Count, Effect, EffectsChain, Pattern, Step};
use crate::symbol::{DefineError, SymbolTable, VarValue};

/// What a committed block amounts to.
#[derive(Debug, Clone)]
pub enum Statement {
    Empty,
    Assignment { name: String, value: VarValue },
    Sequence(Pattern),
}

#[derive(Debug)]
pub struct SecondPassResult {
    pub statement: Statement,
    /// Set when an assignment could not be stored.
    pub error: Option<DefineError>,
}

/// Build the block's blueprint and store any variable definition.
pub fn second_pass(first: &FirstPassResult, table: &mut SymbolTable) -> SecondPassResult {
    let statement = build(first, table);

    let error = match &statement {
        Statement::Assignment { name, value } => match table.variable_handle(name) {
            Some(handle) => table.define_variable(handle, value.clone()).err(),
            None => Some(DefineError::Stale),
        },
        _ => None,
    };
    if let Some(e) = &error {
        warn!(block = %first.block, error = %e, "definition rejected");
    }

    SecondPassResult { statement, error }
}

/// Build the block's blueprint without touching the table.
pub fn build(first: &FirstPassResult, table: &SymbolTable) -> Statement {
    let mut builder = Builder {
        tokens: &first.tokens,
        pos: 0,
        table,
    };
    match &first.kind {
        StatementKind::Empty | StatementKind::Invalid => Statement::Empty,
        StatementKind::Sequence => {
            let items = builder.sequence();
            if items.is_empty() {
                Statement::Empty
            } else {
                Statement::Sequence(Pattern::Sequence {
                    items,
                    effects: EffectsChain::default(),
                })
            }
        }
        StatementKind::Assignment { name } => {
            builder.pos = 2;
            let value = match first.tokens.get(2).map(|t| &t.kind) {
                Some(SemanticKind::Number(n)) if first.tokens.len() == 3 => VarValue::Number(*n),
                _ => VarValue::Pattern(Arc::new(Pattern::Sequence {
                    items: builder.sequence(),
                    effects: EffectsChain::default(),
                })),
            };
            Statement::Assignment {
                name: name.clone(),
                value,
            }
        }
    }
}

struct Builder<'a> {
    tokens: &'a [SemanticToken],
    pos: usize,
    table: &'a SymbolTable,
}

impl<'a> Builder<'a> {
    /// Items up to the end or the closing bracket of the current group.
    fn sequence(&mut self) -> Vec<Pattern> {
        let mut items = Vec::new();
        while let Some(token) = self.peek() {
            if matches!(token.kind, SemanticKind::GroupClose(_)) {
                self.pos += 1;
                break;
            }
            match self.item() {
                Flow::Continue(pattern) => items.push(pattern),
                Flow::EndOfConstruct | Flow::Error(..) => self.pos += 1,
            }
        }
        items
    }

    fn item(&mut self) -> Flow<Pattern> {
        let (first, weight) = match self.weighted() {
            Flow::Continue(pair) => pair,
            Flow::EndOfConstruct => return Flow::EndOfConstruct,
            Flow::Error(e, at) => return Flow::Error(e, at),
        };
        if !self.peek_is(|k| *k == SemanticKind::ChoiceOp) {
            return Flow::Continue(first);
        }

        let mut options = vec![first];
        let mut weights = vec![weight];
        while self.peek_is(|k| *k == SemanticKind::ChoiceOp) {
            self.pos += 1;
            if let Flow::Continue((option, weight)) = self.weighted() {
                options.push(option);
                weights.push(weight);
            }
        }
        Flow::Continue(Pattern::Choice {
            options,
            weights: weights.into_iter().map(|w| w.unwrap_or(1.0)).collect(),
        })
    }

    fn weighted(&mut self) -> Flow<(Pattern, Option<f64>)> {
        let pattern = match self.repeat() {
            Flow::Continue(p) => p,
            Flow::EndOfConstruct => return Flow::EndOfConstruct,
            Flow::Error(e, at) => return Flow::Error(e, at),
        };
        let mut weight = None;
        if self.peek_is(|k| *k == SemanticKind::WeightOp) {
            self.pos += 1;
            if let Some(n) = self.number() {
                weight = Some(n);
            }
        }
        Flow::Continue((pattern, weight))
    }

    fn repeat(&mut self) -> Flow<Pattern> {
        let prefix = matches!(
            (self.tokens.get(self.pos), self.tokens.get(self.pos + 1)),
            (Some(t), Some(op)) if matches!(t.kind, SemanticKind::Number(_))
                && op.kind == SemanticKind::RepetitionOp
        );
        if prefix {
            let n = self.number().unwrap_or(1.0);
            self.pos += 1;
            return match self.postfix() {
                Flow::Continue(item) => Flow::Continue(Pattern::Repeat {
                    item: Box::new(item),
                    count: Count::Fixed(fixed_count(n)),
                }),
                other => other,
            };
        }

        let item = match self.postfix() {
            Flow::Continue(p) => p,
            other => return other,
        };
        if !self.peek_is(|k| *k == SemanticKind::RepetitionOp) {
            return Flow::Continue(item);
        }
        self.pos += 1;

        let count = match self.peek() {
            Some(t) if t.kind == SemanticKind::VariableRef => {
                let handle = self.table.variable_handle(&t.id);
                self.pos += 1;
                match handle {
                    Some(handle) => Count::Variable(handle),
                    None => Count::Fixed(1),
                }
            }
            _ => Count::Fixed(fixed_count(self.number().unwrap_or(1.0))),
        };
        Flow::Continue(Pattern::Repeat {
            item: Box::new(item),
            count,
        })
    }

    fn postfix(&mut self) -> Flow<Pattern> {
        let mut pattern = match self.primary() {
            Flow::Continue(p) => p,
            other => return other,
        };
        while self.peek_is(|k| *k == SemanticKind::ChainingOp) {
            self.pos += 1;
            let Some(token) = self.peek() else { break };
            if let SemanticKind::Fn { args } = &token.kind {
                let effect = match self.table.function(&token.id) {
                    Some(def) => def.instantiate(args),
                    None => Effect::new(token.id.clone(), args.clone()),
                };
                pattern = pattern.with_effect(effect);
                self.pos += 1;
            }
        }
        Flow::Continue(pattern)
    }

    fn primary(&mut self) -> Flow<Pattern> {
        let Some(token) = self.peek() else {
            return Flow::EndOfConstruct;
        };
        let instance = token.instance;
        let pattern = match &token.kind {
            SemanticKind::SoundLiteral => Pattern::Sound(Step::sound(token.id.clone(), instance)),
            SemanticKind::Rest => Pattern::Rest(instance),
            SemanticKind::VariableRef => match self.table.variable_handle(&token.id) {
                Some(handle) => Pattern::Variable {
                    handle,
                    instance,
                    effects: EffectsChain::default(),
                },
                None => Pattern::Rest(instance),
            },
            SemanticKind::GroupOpen(bracket) => {
                let bracket = *bracket;
                self.pos += 1;
                let items = self.sequence();
                if items.is_empty() {
                    return Flow::Continue(Pattern::Rest(instance));
                }
                let effects = EffectsChain::default();
                return Flow::Continue(match bracket {
                    Bracket::Square => Pattern::BeatDiv { items, effects },
                    _ => Pattern::Sequence { items, effects },
                });
            }
            _ => return Flow::EndOfConstruct,
        };
        self.pos += 1;
        Flow::Continue(pattern)
    }

    fn number(&mut self) -> Option<f64> {
        match self.peek()?.kind {
            SemanticKind::Number(n) => {
                self.pos += 1;
                Some(n)
            }
            _ => None,
        }
    }

    fn peek(&self) -> Option<&'a SemanticToken> {
        self.tokens.get(self.pos)
    }

    fn peek_is(&self, f: impl Fn(&SemanticKind) -> bool) -> bool {
        self.peek().is_some_and(|t| f(&t.kind))
    }
}

fn fixed_count(n: f64) -> u32 {
    if n.is_finite() {
        n.max(1.0).round() as u32
    } else {
        1
    }
}
