//! Token types produced by the lexer and the first parser pass.

use crate::ast::{BlockId, InstanceId};

/// Bracket family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Bracket {
    Paren,  // ( )
    Square, // [ ]
    Curly,  // { }
}

impl Bracket {
    pub fn from_open(ch: char) -> Option<Bracket> {
        match ch {
            '(' => Some(Bracket::Paren),
            '[' => Some(Bracket::Square),
            '{' => Some(Bracket::Curly),
            _ => None,
        }
    }

    pub fn from_close(ch: char) -> Option<Bracket> {
        match ch {
            ')' => Some(Bracket::Paren),
            ']' => Some(Bracket::Square),
            '}' => Some(Bracket::Curly),
            _ => None,
        }
    }

    pub fn close_char(self) -> char {
        match self {
            Bracket::Paren => ')',
            Bracket::Square => ']',
            Bracket::Curly => '}',
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Open,
    Close,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Assign, // =
    Repeat, // *
    Choice, // |
    Chain,  // .
    Colon,  // :
}

impl Operator {
    pub fn from_char(ch: char) -> Option<Operator> {
        match ch {
            '=' => Some(Operator::Assign),
            '*' => Some(Operator::Repeat),
            '|' => Some(Operator::Choice),
            '.' => Some(Operator::Chain),
            ':' => Some(Operator::Colon),
            _ => None,
        }
    }
}

/// Statement prefix flags, only valid as the first character of a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sigil {
    Solo, // !
    Mute, // ~
}

/// The kind of a lexical token.
#[derive(Debug, Clone, PartialEq)]
pub enum LexicalTokenKind {
    Bracket(Bracket, Side),
    Separator,
    /// Quote-delimited text; the token value excludes the quotes.
    String,
    Number(f64),
    /// A number with an attached `Hz` suffix, e.g. `440Hz`.
    HzQuantity(f64),
    /// A free-standing `Hz` unit word.
    HzUnit,
    Operator(Operator),
    Comment,
    Sigil(Sigil),
    Identifier,
    /// Text that could not be lexed, kept inside an error region.
    Error,
}

/// A token produced by the lexer.
///
/// `start` and `length` are character offsets into the block's text.
#[derive(Debug, Clone, PartialEq)]
pub struct LexicalToken {
    pub kind: LexicalTokenKind,
    pub value: String,
    pub start: usize,
    pub length: usize,
    pub block: BlockId,
}

impl LexicalToken {
    pub fn end(&self) -> usize {
        self.start + self.length
    }

    pub fn overlaps(&self, start: usize, end: usize) -> bool {
        self.start < end && start < self.end()
    }

    pub fn is_operator(&self, op: Operator) -> bool {
        self.kind == LexicalTokenKind::Operator(op)
    }

    pub fn is_bracket(&self, bracket: Bracket, side: Side) -> bool {
        self.kind == LexicalTokenKind::Bracket(bracket, side)
    }

    pub fn instance(&self) -> InstanceId {
        InstanceId::new(self.block, self.start)
    }

    /// Short human-readable description for error messages.
    pub fn describe(&self) -> String {
        match &self.kind {
            LexicalTokenKind::String => format!("string \"{}\"", self.value),
            LexicalTokenKind::Number(_) | LexicalTokenKind::HzQuantity(_) => {
                format!("number {}", self.value)
            }
            _ => format!("`{}`", self.value),
        }
    }
}

/// The role of a token after classification.
#[derive(Debug, Clone, PartialEq)]
pub enum SemanticKind {
    VariableDecl,
    VariableRef,
    SoundLiteral,
    Rest,
    Number(f64),
    /// A chained effect with its positional arguments.
    Fn {
        args: Vec<f64>,
    },
    AssignmentOp,
    ChoiceOp,
    RepetitionOp,
    ChainingOp,
    WeightOp,
    GroupOpen(Bracket),
    GroupClose(Bracket),
}

/// A classified token.
///
/// `token` spans the whole construct, so a sound literal's span includes its
/// query parameter list. `id` is the symbol table key; `instance` addresses
/// this occurrence only.
#[derive(Debug, Clone, PartialEq)]
pub struct SemanticToken {
    pub token: LexicalToken,
    pub id: String,
    pub instance: InstanceId,
    pub kind: SemanticKind,
}

impl SemanticToken {
    pub fn new(token: LexicalToken, id: impl Into<String>, kind: SemanticKind) -> Self {
        let instance = token.instance();
        Self {
            token,
            id: id.into(),
            instance,
            kind,
        }
    }
}
