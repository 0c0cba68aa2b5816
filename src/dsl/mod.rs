//! Block language front end: lexer, first pass and second pass.
//!
//! A block goes through [`Lexer`], then [`FirstPass`] (classification and
//! error regions, read-only on the symbol table), and only when clean through
//! [`second_pass`], which builds the pattern blueprint and stores variable
//! definitions.

pub mod error;
pub mod first_pass;
pub mod lexer;
pub mod query;
pub mod second_pass;
pub mod token;

pub use error::{ErrorReason, ErrorRegion, ErrorRegions, LexicalError, SyntaxError};
pub use first_pass::{
    Declaration, FirstPass, FirstPassResult, Reference, ReferenceKind, StatementFlags,
    StatementKind,
};
pub use lexer::{LexResult, Lexer};
pub use query::{canonical_id, ParamValue, QueryParams};
pub use second_pass::{second_pass, SecondPassResult, Statement};
pub use token::{
    Bracket, LexicalToken, LexicalTokenKind, Operator, SemanticKind, SemanticToken, Side, Sigil,
};

use crate::ast::BlockId;
use crate::symbol::SymbolTable;

/// Parse outcome of one construct.
#[derive(Debug)]
pub(crate) enum Flow<T> {
    /// Parsed; keep going.
    Continue(T),
    /// The enclosing construct ended here.
    EndOfConstruct,
    /// Failed at the given token index.
    Error(SyntaxError, usize),
}

/// Lex and first-pass one block.
pub fn analyze(table: &SymbolTable, source: &str, block: BlockId, index: usize) -> FirstPassResult {
    FirstPass::new(table, block).run(Lexer::lex(source, block), index)
}
