//! First parser pass: classification and syntax checking.
//!
//! Reads the symbol table but never changes it. The result lists the
//! semantic tokens for highlighting, any error regions, and the references
//! the block would hold once committed.
//!
//! ```text
//! statement := [sigil] (IDENT '=' (NUMBER | HZ | sequence) | sequence)
//! sequence  := item+
//! item      := weighted ('|' weighted)*
//! weighted  := repeat [':' NUMBER]
//! repeat    := NUMBER '*' postfix | postfix ['*' (NUMBER | VARIABLE)]
//! postfix   := primary ('.' EFFECT ['(' args ')'])*
//! primary   := IDENT ['(' params ')'] | STRING ['(' params ')'] | '_'
//!            | '(' sequence ')' | '[' sequence ']'
//! ```
//!
//! A parameter or argument list only belongs to the word it touches:
//! `kick(dur: 1)` queries, `kick (a b)` is a sound followed by a group.

use super::error::{ErrorRegion, ErrorRegions, SyntaxError};
use super::lexer::LexResult;
use super::query::{canonical_id, ParamValue, QueryParams};
use super::token::{
    Bracket, LexicalToken, LexicalTokenKind, Operator, SemanticKind, SemanticToken, Side, Sigil,
};
use super::Flow;
use crate::ast::{BlockId, InstanceId};
use crate::symbol::builtins::{self, FunctionKind, ParamType};
use crate::symbol::{SymbolTable, VarType};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatementKind {
    Empty,
    Assignment { name: String },
    Sequence,
    Invalid,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatementFlags {
    pub mute: bool,
    pub solo: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReferenceKind {
    Sound { keyword: String, params: QueryParams },
    Variable,
    Function,
}

/// A symbol the block refers to.
#[derive(Debug, Clone, PartialEq)]
pub struct Reference {
    pub id: String,
    pub kind: ReferenceKind,
    pub instance: InstanceId,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Declaration {
    pub name: String,
    pub declared: VarType,
    pub instance: InstanceId,
}

#[derive(Debug, Clone)]
pub struct FirstPassResult {
    pub block: BlockId,
    /// Editor position of the block.
    pub index: usize,
    pub kind: StatementKind,
    pub flags: StatementFlags,
    pub tokens: Vec<SemanticToken>,
    pub errors: Vec<ErrorRegion>,
    pub references: Vec<Reference>,
    pub declaration: Option<Declaration>,
}

impl FirstPassResult {
    /// Safe to commit: no lexical or syntax errors.
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty() && self.kind != StatementKind::Invalid
    }
}

macro_rules! proceed {
    ($flow:expr) => {
        match $flow {
            Flow::Error(error, at) => return Flow::Error(error, at),
            other => other,
        }
    };
}

pub struct FirstPass<'t> {
    table: &'t SymbolTable,
    block: BlockId,
    tokens: Vec<LexicalToken>,
    pos: usize,
    out: Vec<SemanticToken>,
    references: Vec<Reference>,
    assigned: Option<String>,
}

impl<'t> FirstPass<'t> {
    pub fn new(table: &'t SymbolTable, block: BlockId) -> Self {
        Self {
            table,
            block,
            tokens: Vec::new(),
            pos: 0,
            out: Vec::new(),
            references: Vec::new(),
            assigned: None,
        }
    }

    pub fn run(mut self, lexed: LexResult, index: usize) -> FirstPassResult {
        let mut errors = ErrorRegions::new();
        errors.extend(lexed.errors);

        let mut flags = StatementFlags::default();
        for token in lexed.tokens {
            match token.kind {
                LexicalTokenKind::Comment => {}
                LexicalTokenKind::Sigil(Sigil::Mute) => flags.mute = true,
                LexicalTokenKind::Sigil(Sigil::Solo) => flags.solo = true,
                _ => self.tokens.push(token),
            }
        }

        let mut declaration = None;
        let (mut kind, flow) = if self.tokens.is_empty() {
            (StatementKind::Empty, Flow::Continue(()))
        } else if self.is_assignment() {
            let name = self.tokens[0].value.clone();
            let mut declared = VarType::Sequence;
            let flow = self.assignment(&mut declared);
            declaration = Some(Declaration {
                name: name.clone(),
                declared,
                instance: self.tokens[0].instance(),
            });
            (StatementKind::Assignment { name }, flow)
        } else {
            (StatementKind::Sequence, self.sequence(None))
        };

        if let Flow::Error(error, at) = flow {
            let region = self.region(error, at);
            self.out.retain(|t| t.token.end() <= region.start);
            errors.insert(region);
        }

        if !errors.is_empty() {
            kind = StatementKind::Invalid;
            declaration = None;
        }

        FirstPassResult {
            block: self.block,
            index,
            kind,
            flags,
            tokens: self.out,
            errors: errors.into_vec(),
            references: self.references,
            declaration,
        }
    }

    fn region(&self, error: SyntaxError, at: usize) -> ErrorRegion {
        let at = at.min(self.tokens.len().saturating_sub(1));
        let start = self.tokens[at].start;
        let end = self.tokens.last().map_or(start + 1, LexicalToken::end);
        let mut region = ErrorRegion::new(start, end - start, error, self.block);
        region.tokens = self.tokens[at..].to_vec();
        region
    }

    fn is_assignment(&self) -> bool {
        self.tokens.len() >= 2
            && self.tokens[0].kind == LexicalTokenKind::Identifier
            && self.tokens[1].is_operator(Operator::Assign)
    }

    fn assignment(&mut self, declared: &mut VarType) -> Flow<()> {
        let name = self.tokens[0].value.clone();
        if name == builtins::REST || self.table.is_fn(&name) {
            return Flow::Error(SyntaxError::ReservedName(name), 0);
        }
        let decl = self.bump();
        self.emit(decl, name.clone(), SemanticKind::VariableDecl);
        let op = self.bump();
        self.emit(op, "=", SemanticKind::AssignmentOp);

        if self.at_end() {
            return Flow::Error(SyntaxError::Expected("a value"), 1);
        }

        if self.tokens.len() == 3 {
            if let LexicalTokenKind::Number(n) | LexicalTokenKind::HzQuantity(n) =
                self.tokens[2].kind
            {
                let value = self.bump();
                self.emit(value, n.to_string(), SemanticKind::Number(n));
                *declared = VarType::Number;
                return Flow::Continue(());
            }
        }
        if name == builtins::BPM {
            return Flow::Error(SyntaxError::ExpectedNumber(name), 2);
        }

        self.assigned = Some(name);
        self.sequence(None)
    }

    fn sequence(&mut self, closer: Option<Bracket>) -> Flow<()> {
        let mut items = 0;
        loop {
            let Some(token) = self.peek() else {
                return match closer {
                    Some(_) => Flow::Error(SyntaxError::Expected("a closing bracket"), self.pos),
                    None if items == 0 => Flow::Error(SyntaxError::Expected("a sound"), self.pos),
                    None => Flow::Continue(()),
                };
            };

            match token.kind {
                LexicalTokenKind::Bracket(bracket, Side::Close) => {
                    if closer != Some(bracket) {
                        return self.unexpected();
                    }
                    if items == 0 {
                        return Flow::Error(SyntaxError::EmptyGroup, self.pos);
                    }
                    let close = self.bump();
                    self.emit(
                        close,
                        bracket.close_char().to_string(),
                        SemanticKind::GroupClose(bracket),
                    );
                    return Flow::EndOfConstruct;
                }
                _ if !self.starts_term() => return self.unexpected(),
                _ => {}
            }

            proceed!(self.item());
            items += 1;
        }
    }

    fn item(&mut self) -> Flow<()> {
        proceed!(self.weighted());
        while self.peek_is(Operator::Choice) {
            let op = self.bump();
            self.emit(op, "|", SemanticKind::ChoiceOp);
            if !self.starts_term() {
                return Flow::Error(SyntaxError::Expected("a choice option"), self.pos);
            }
            proceed!(self.weighted());
        }
        Flow::Continue(())
    }

    fn weighted(&mut self) -> Flow<()> {
        proceed!(self.repeat());
        if self.peek_is(Operator::Colon) {
            let op = self.bump();
            self.emit(op, ":", SemanticKind::WeightOp);
            match self.peek_number() {
                Some(n) => {
                    let weight = self.bump();
                    self.emit(weight, n.to_string(), SemanticKind::Number(n));
                }
                None => return Flow::Error(SyntaxError::Expected("a weight"), self.pos),
            }
        }
        Flow::Continue(())
    }

    fn repeat(&mut self) -> Flow<()> {
        if let Some(n) = self.peek_number() {
            let is_prefix = self
                .tokens
                .get(self.pos + 1)
                .is_some_and(|t| t.is_operator(Operator::Repeat));
            if !is_prefix {
                return self.unexpected();
            }
            let count = self.bump();
            self.emit(count, n.to_string(), SemanticKind::Number(n));
            let op = self.bump();
            self.emit(op, "*", SemanticKind::RepetitionOp);
            if !self.starts_term() || self.peek_number().is_some() {
                return Flow::Error(SyntaxError::Expected("a pattern to repeat"), self.pos);
            }
            return self.postfix();
        }

        proceed!(self.postfix());
        if self.peek_is(Operator::Repeat) {
            let op = self.bump();
            self.emit(op, "*", SemanticKind::RepetitionOp);
            match self.peek() {
                Some(t) if matches!(t.kind, LexicalTokenKind::Number(_)) => {
                    let n = self.peek_number().unwrap_or(1.0);
                    let count = self.bump();
                    self.emit(count, n.to_string(), SemanticKind::Number(n));
                }
                Some(t)
                    if t.kind == LexicalTokenKind::Identifier && self.table.is_variable(&t.value) =>
                {
                    return self.variable_ref();
                }
                _ => return Flow::Error(SyntaxError::Expected("a repeat count"), self.pos),
            }
        }
        Flow::Continue(())
    }

    fn postfix(&mut self) -> Flow<()> {
        proceed!(self.primary());
        while self.peek_is(Operator::Chain) {
            let op = self.bump();
            self.emit(op, ".", SemanticKind::ChainingOp);
            proceed!(self.effect());
        }
        Flow::Continue(())
    }

    fn primary(&mut self) -> Flow<()> {
        let Some(token) = self.peek().cloned() else {
            return Flow::Error(SyntaxError::Expected("a sound"), self.pos);
        };
        match token.kind {
            LexicalTokenKind::Identifier => {
                let name = token.value.as_str();
                if self.assigned.as_deref() == Some(name) {
                    Flow::Error(SyntaxError::SelfReference(token.value.clone()), self.pos)
                } else if name == builtins::REST {
                    let rest = self.bump();
                    self.emit(rest, builtins::REST, SemanticKind::Rest);
                    Flow::Continue(())
                } else if self.table.is_variable(name) {
                    self.variable_ref()
                } else if self.table.is_fn(name) {
                    Flow::Error(SyntaxError::ReservedName(token.value.clone()), self.pos)
                } else {
                    self.sound_literal()
                }
            }
            LexicalTokenKind::String => self.sound_literal(),
            LexicalTokenKind::Bracket(bracket @ (Bracket::Paren | Bracket::Square), Side::Open) => {
                let open = self.bump();
                let text = open.value.clone();
                self.emit(open, text, SemanticKind::GroupOpen(bracket));
                match self.sequence(Some(bracket)) {
                    Flow::EndOfConstruct => Flow::Continue(()),
                    other => other,
                }
            }
            _ => self.unexpected(),
        }
    }

    fn variable_ref(&mut self) -> Flow<()> {
        let Some(token) = self.peek() else {
            return Flow::Error(SyntaxError::Expected("a variable"), self.pos);
        };
        if self.assigned.as_deref() == Some(token.value.as_str()) {
            return Flow::Error(SyntaxError::SelfReference(token.value.clone()), self.pos);
        }
        let token = self.bump();
        let id = token.value.clone();
        self.references.push(Reference {
            id: id.clone(),
            kind: ReferenceKind::Variable,
            instance: token.instance(),
        });
        self.emit(token, id, SemanticKind::VariableRef);
        Flow::Continue(())
    }

    fn sound_literal(&mut self) -> Flow<()> {
        let head = self.bump();
        let keyword = head.value.clone();
        let mut params = QueryParams::new();
        let mut end = head.end();

        if self.touching_open_paren(&head) {
            self.bump();
            match self.params(&mut params) {
                Flow::Continue(close) => end = close,
                Flow::EndOfConstruct => {}
                Flow::Error(error, at) => return Flow::Error(error, at),
            }
        }

        let id = canonical_id(&keyword, &params, head.instance());
        self.references.push(Reference {
            id: id.clone(),
            kind: ReferenceKind::Sound { keyword, params },
            instance: head.instance(),
        });
        let span = LexicalToken {
            length: end - head.start,
            ..head
        };
        self.emit(span, id, SemanticKind::SoundLiteral);
        Flow::Continue(())
    }

    /// Parse `key[: value], ...)` after the opening paren. Returns the end
    /// offset of the closing paren.
    fn params(&mut self, params: &mut QueryParams) -> Flow<usize> {
        let query = self.table.function(builtins::SOUND);
        loop {
            let Some(token) = self.peek().cloned() else {
                return Flow::Error(SyntaxError::Expected("a closing bracket"), self.pos);
            };
            match token.kind {
                LexicalTokenKind::Bracket(Bracket::Paren, Side::Close) => {
                    self.bump();
                    return Flow::Continue(token.end());
                }
                LexicalTokenKind::Identifier => {
                    self.bump();
                    let spec = query.as_ref().and_then(|q| q.param(&token.value));
                    let has_value = self.peek_is(Operator::Colon) || self.peek_is(Operator::Assign);

                    let value = if has_value {
                        self.bump();
                        let Some(raw) = self.peek().cloned() else {
                            return Flow::Error(SyntaxError::Expected("a value"), self.pos);
                        };
                        let (ty, value) = match raw.kind {
                            LexicalTokenKind::Number(n) => (ParamType::Number, ParamValue::Number(n)),
                            LexicalTokenKind::HzQuantity(n) => (ParamType::Hz, ParamValue::Hz(n)),
                            LexicalTokenKind::String => {
                                (ParamType::String, ParamValue::Text(raw.value.clone()))
                            }
                            LexicalTokenKind::Identifier => {
                                (ParamType::Identifier, ParamValue::Text(raw.value.clone()))
                            }
                            _ => return Flow::Error(SyntaxError::Expected("a value"), self.pos),
                        };
                        if let Some(spec) = spec {
                            if !spec.accepts(ty) {
                                return Flow::Error(
                                    SyntaxError::InvalidParameter {
                                        param: spec.name.to_string(),
                                        found: raw.describe(),
                                    },
                                    self.pos,
                                );
                            }
                        }
                        self.bump();
                        value
                    } else {
                        if let Some(spec) = spec {
                            if !spec.accepts(ParamType::Flag) {
                                return Flow::Error(
                                    SyntaxError::InvalidParameter {
                                        param: spec.name.to_string(),
                                        found: "a bare flag".to_string(),
                                    },
                                    self.pos - 1,
                                );
                            }
                        }
                        ParamValue::Flag
                    };
                    params.insert(token.value.clone(), value);
                    proceed!(self.list_separator());
                }
                _ => return self.unexpected(),
            }
        }
    }

    fn effect(&mut self) -> Flow<()> {
        let Some(token) = self.peek().cloned() else {
            return Flow::Error(SyntaxError::Expected("an effect"), self.pos);
        };
        if token.kind != LexicalTokenKind::Identifier {
            return Flow::Error(SyntaxError::Expected("an effect"), self.pos);
        }
        let Some(def) = self
            .table
            .function(&token.value)
            .filter(|f| f.kind == FunctionKind::Effect)
        else {
            return Flow::Error(SyntaxError::UnknownFunction(token.value.clone()), self.pos);
        };

        let head = self.bump();
        let mut end = head.end();
        let mut args = Vec::new();

        if self.touching_open_paren(&head) {
            self.bump();
            loop {
                let Some(arg) = self.peek().cloned() else {
                    return Flow::Error(SyntaxError::Expected("a closing bracket"), self.pos);
                };
                let (ty, n) = match arg.kind {
                    LexicalTokenKind::Bracket(Bracket::Paren, Side::Close) => {
                        self.bump();
                        end = arg.end();
                        break;
                    }
                    LexicalTokenKind::Number(n) => (ParamType::Number, n),
                    LexicalTokenKind::HzQuantity(n) => (ParamType::Hz, n),
                    _ => return self.unexpected(),
                };
                let Some(spec) = def.params.get(args.len()) else {
                    return Flow::Error(SyntaxError::TooManyArguments(def.name.to_string()), self.pos);
                };
                if !spec.accepts(ty) {
                    return Flow::Error(
                        SyntaxError::InvalidParameter {
                            param: spec.name.to_string(),
                            found: arg.describe(),
                        },
                        self.pos,
                    );
                }
                self.bump();
                args.push(n);
                proceed!(self.list_separator());
            }
        }

        self.references.push(Reference {
            id: def.name.to_string(),
            kind: ReferenceKind::Function,
            instance: head.instance(),
        });
        let span = LexicalToken {
            length: end - head.start,
            ..head
        };
        self.emit(span, def.name, SemanticKind::Fn { args });
        Flow::Continue(())
    }

    /// After a list element: consume a `,`, or leave a `)` for the caller.
    fn list_separator(&mut self) -> Flow<()> {
        match self.peek().map(|t| &t.kind) {
            Some(LexicalTokenKind::Separator) => {
                self.bump();
                Flow::Continue(())
            }
            Some(LexicalTokenKind::Bracket(Bracket::Paren, Side::Close)) => Flow::Continue(()),
            Some(_) => self.unexpected(),
            None => Flow::Error(SyntaxError::Expected("a closing bracket"), self.pos),
        }
    }

    fn unexpected<T>(&self) -> Flow<T> {
        match self.peek() {
            Some(token) => Flow::Error(SyntaxError::UnexpectedToken(token.describe()), self.pos),
            None => Flow::Error(SyntaxError::Expected("more input"), self.pos),
        }
    }

    fn touching_open_paren(&self, head: &LexicalToken) -> bool {
        self.peek()
            .is_some_and(|t| t.is_bracket(Bracket::Paren, Side::Open) && t.start == head.end())
    }

    fn starts_term(&self) -> bool {
        match self.peek().map(|t| &t.kind) {
            Some(
                LexicalTokenKind::Identifier
                | LexicalTokenKind::String
                | LexicalTokenKind::Number(_)
                | LexicalTokenKind::Bracket(Bracket::Paren | Bracket::Square, Side::Open),
            ) => true,
            _ => false,
        }
    }

    fn peek(&self) -> Option<&LexicalToken> {
        self.tokens.get(self.pos)
    }

    fn peek_is(&self, op: Operator) -> bool {
        self.peek().is_some_and(|t| t.is_operator(op))
    }

    fn peek_number(&self) -> Option<f64> {
        match self.peek()?.kind {
            LexicalTokenKind::Number(n) => Some(n),
            _ => None,
        }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn bump(&mut self) -> LexicalToken {
        let token = self.tokens[self.pos].clone();
        self.pos += 1;
        token
    }

    fn emit(&mut self, token: LexicalToken, id: impl Into<String>, kind: SemanticKind) {
        self.out.push(SemanticToken::new(token, id, kind));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsl::error::ErrorReason;
    use crate::dsl::lexer::Lexer;
    use crate::symbol::{occurrence, TableConfig};

    fn table() -> SymbolTable {
        SymbolTable::new(TableConfig::default())
    }

    fn analyze(table: &SymbolTable, source: &str) -> FirstPassResult {
        let block = BlockId(7);
        FirstPass::new(table, block).run(Lexer::lex(source, block), 0)
    }

    fn kinds(result: &FirstPassResult) -> Vec<SemanticKind> {
        result.tokens.iter().map(|t| t.kind.clone()).collect()
    }

    fn syntax_error(result: &FirstPassResult) -> SyntaxError {
        result
            .errors
            .iter()
            .flat_map(|r| r.reasons.iter())
            .find_map(|r| match r {
                ErrorReason::Syntax(e) => Some(e.clone()),
                ErrorReason::Lexical(_) => None,
            })
            .expect("a syntax error")
    }

    #[test]
    fn plain_sequence() {
        let t = table();
        let r = analyze(&t, "apple orange pear");
        assert_eq!(r.kind, StatementKind::Sequence);
        assert!(r.is_clean());
        assert_eq!(r.tokens.len(), 3);
        assert!(r.tokens.iter().all(|t| t.kind == SemanticKind::SoundLiteral));
        let ids: Vec<&str> = r.references.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["apple", "orange", "pear"]);
        assert_eq!(r.tokens[1].instance, InstanceId::new(BlockId(7), 6));
    }

    #[test]
    fn empty_and_comment_only() {
        let t = table();
        assert_eq!(analyze(&t, "").kind, StatementKind::Empty);
        assert_eq!(analyze(&t, "   // nothing").kind, StatementKind::Empty);
    }

    #[test]
    fn number_assignment() {
        let t = table();
        let r = analyze(&t, "n = 3");
        assert_eq!(r.kind, StatementKind::Assignment { name: "n".into() });
        assert_eq!(
            kinds(&r),
            vec![
                SemanticKind::VariableDecl,
                SemanticKind::AssignmentOp,
                SemanticKind::Number(3.0)
            ]
        );
        let decl = r.declaration.unwrap();
        assert_eq!(decl.declared, VarType::Number);
    }

    #[test]
    fn sequence_assignment() {
        let t = table();
        let r = analyze(&t, "beat = kick [hat hat]");
        assert!(r.is_clean());
        assert_eq!(r.declaration.unwrap().declared, VarType::Sequence);
        assert_eq!(r.references.len(), 3);
    }

    #[test]
    fn self_reference_is_an_error() {
        let t = table();
        let r = analyze(&t, "a = kick a");
        assert_eq!(r.kind, StatementKind::Invalid);
        assert_eq!(syntax_error(&r), SyntaxError::SelfReference("a".into()));
        assert!(r.declaration.is_none());
        let region = &r.errors[0];
        assert_eq!((region.start, region.end()), (9, 10));
    }

    #[test]
    fn declared_variables_are_references() {
        let mut t = table();
        t.declare_variable("groove", VarType::Sequence, BlockId(1), occurrence(BlockId(1), 0, 0));
        let r = analyze(&t, "groove snare");
        assert_eq!(
            kinds(&r),
            vec![SemanticKind::VariableRef, SemanticKind::SoundLiteral]
        );
        assert_eq!(r.references[0].kind, ReferenceKind::Variable);
    }

    #[test]
    fn unknown_effect() {
        let t = table();
        let r = analyze(&t, "kick.wobble snare");
        assert_eq!(syntax_error(&r), SyntaxError::UnknownFunction("wobble".into()));
        let region = &r.errors[0];
        assert_eq!((region.start, region.end()), (5, 17));
        // The sound before the error still highlights.
        assert_eq!(r.tokens.len(), 2);
    }

    #[test]
    fn effect_arguments() {
        let t = table();
        let r = analyze(&t, "kick.delay(0.5, 0.2)");
        assert!(r.is_clean());
        let effect = r.tokens.last().unwrap();
        assert_eq!(effect.kind, SemanticKind::Fn { args: vec![0.5, 0.2] });
        assert_eq!(effect.token.length, 15);
    }

    #[test]
    fn too_many_effect_arguments() {
        let t = table();
        let r = analyze(&t, "kick.reverb(1, 2)");
        assert_eq!(syntax_error(&r), SyntaxError::TooManyArguments("reverb".into()));
    }

    #[test]
    fn query_params_build_canonical_ids() {
        let t = table();
        let a = analyze(&t, "kick(tag: 808, dur: 0.5)");
        let b = analyze(&t, "kick(dur=0.5,tag=808)");
        assert!(a.is_clean(), "{:?}", a.errors);
        assert!(b.is_clean(), "{:?}", b.errors);
        assert_eq!(a.tokens[0].id, "kick(dur=0.5,tag=808)");
        assert_eq!(a.tokens[0].id, b.tokens[0].id);
        assert_eq!(a.tokens[0].token.length, 24);
    }

    #[test]
    fn invalid_parameter_type() {
        let t = table();
        let r = analyze(&t, "kick(dur: \"long\")");
        assert!(matches!(
            syntax_error(&r),
            SyntaxError::InvalidParameter { ref param, .. } if param == "dur"
        ));
    }

    #[test]
    fn unknown_params_fold_into_id() {
        let t = table();
        let r = analyze(&t, "kick(room: dry, bright)");
        assert!(r.is_clean());
        assert_eq!(r.tokens[0].id, "kick(bright,room=dry)");
    }

    #[test]
    fn detached_parens_are_a_group() {
        let t = table();
        let r = analyze(&t, "kick (a b)");
        assert!(r.is_clean());
        assert_eq!(r.tokens[0].id, "kick");
        assert_eq!(r.tokens[1].kind, SemanticKind::GroupOpen(Bracket::Paren));
    }

    #[test]
    fn choice_weight_and_repetition() {
        let t = table();
        let r = analyze(&t, "a:3 | b 2 * c d * 4");
        assert!(r.is_clean(), "{:?}", r.errors);
        assert_eq!(
            kinds(&r),
            vec![
                SemanticKind::SoundLiteral,
                SemanticKind::WeightOp,
                SemanticKind::Number(3.0),
                SemanticKind::ChoiceOp,
                SemanticKind::SoundLiteral,
                SemanticKind::Number(2.0),
                SemanticKind::RepetitionOp,
                SemanticKind::SoundLiteral,
                SemanticKind::SoundLiteral,
                SemanticKind::RepetitionOp,
                SemanticKind::Number(4.0),
            ]
        );
    }

    #[test]
    fn curly_braces_are_not_groups() {
        let t = table();
        let r = analyze(&t, "{a b}");
        assert_eq!(r.kind, StatementKind::Invalid);
        assert!(matches!(syntax_error(&r), SyntaxError::UnexpectedToken(_)));
    }

    #[test]
    fn empty_group() {
        let t = table();
        let r = analyze(&t, "a [] b");
        assert_eq!(syntax_error(&r), SyntaxError::EmptyGroup);
    }

    #[test]
    fn lexical_errors_make_the_statement_invalid() {
        let t = table();
        let r = analyze(&t, "this is wrong)");
        assert_eq!(r.kind, StatementKind::Invalid);
        assert!(!r.is_clean());
        assert_eq!(r.errors.len(), 1);
    }

    #[test]
    fn sigils_set_flags() {
        let t = table();
        let r = analyze(&t, "~kick");
        assert!(r.flags.mute);
        assert!(!r.flags.solo);
        assert_eq!(r.tokens[0].token.start, 1);
        assert!(analyze(&t, "!kick").flags.solo);
    }

    #[test]
    fn reserved_names() {
        let t = table();
        assert_eq!(
            syntax_error(&analyze(&t, "reverb = a")),
            SyntaxError::ReservedName("reverb".into())
        );
        assert_eq!(
            syntax_error(&analyze(&t, "a reverb")),
            SyntaxError::ReservedName("reverb".into())
        );
        assert_eq!(
            syntax_error(&analyze(&t, "bpm = a b")),
            SyntaxError::ExpectedNumber("bpm".into())
        );
        assert!(analyze(&t, "bpm = 140").is_clean());
    }

    #[test]
    fn first_pass_does_not_touch_the_table() {
        let t = table();
        let before = t.len();
        let _ = analyze(&t, "fresh new sounds");
        assert_eq!(t.len(), before);
    }
}
