//! Error-tolerant lexer.
//!
//! Converts one block of text into [`LexicalToken`]s. Nothing here fails:
//! unterminated strings and unbalanced brackets become [`ErrorRegion`]s, and
//! every token overlapping a region is moved into it.

use super::error::{ErrorRegion, ErrorRegions, LexicalError};
use super::token::{Bracket, LexicalToken, LexicalTokenKind, Operator, Side, Sigil};
use crate::ast::BlockId;

/// Output of [`Lexer::tokenize`].
#[derive(Debug, Clone, Default)]
pub struct LexResult {
    /// Tokens outside every error region, in source order.
    pub tokens: Vec<LexicalToken>,
    pub errors: Vec<ErrorRegion>,
}

impl LexResult {
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

pub struct Lexer {
    chars: Vec<char>,
    pos: usize,
    block: BlockId,
    tokens: Vec<LexicalToken>,
    open: Vec<(Bracket, usize)>,
    errors: ErrorRegions,
}

impl Lexer {
    pub fn new(source: &str, block: BlockId) -> Self {
        Self {
            chars: source.chars().collect(),
            pos: 0,
            block,
            tokens: Vec::new(),
            open: Vec::new(),
            errors: ErrorRegions::new(),
        }
    }

    /// Lex `source` as block `block`.
    pub fn lex(source: &str, block: BlockId) -> LexResult {
        Lexer::new(source, block).tokenize()
    }

    pub fn tokenize(&mut self) -> LexResult {
        self.pos = 0;
        self.tokens.clear();
        self.open.clear();
        self.errors = ErrorRegions::new();

        while !self.is_at_end() {
            let ch = self.peek();

            if ch.is_whitespace() {
                self.advance();
                continue;
            }

            if self.pos == 0 {
                let sigil = match ch {
                    '!' => Some(Sigil::Solo),
                    '~' => Some(Sigil::Mute),
                    _ => None,
                };
                if let Some(sigil) = sigil {
                    self.single_char(LexicalTokenKind::Sigil(sigil));
                    continue;
                }
            }

            if ch == '/' && self.peek_next() == Some('/') {
                self.lex_comment();
                continue;
            }

            match ch {
                '(' | '[' | '{' => self.lex_open(ch),
                ')' | ']' | '}' => self.lex_close(ch),
                ',' => self.single_char(LexicalTokenKind::Separator),
                '"' | '\'' => {
                    if !self.lex_string(ch) {
                        break;
                    }
                }
                '0'..='9' => self.lex_number(),
                '.' if self.peek_next().is_some_and(|c| c.is_ascii_digit())
                    && !self.follows_word() =>
                {
                    self.lex_number()
                }
                _ => match Operator::from_char(ch) {
                    Some(op) => self.single_char(LexicalTokenKind::Operator(op)),
                    None => self.lex_word(),
                },
            }
        }

        if let Some(&(_, start)) = self.open.first() {
            let len = self.chars.len() - start;
            self.errors.insert(ErrorRegion::new(
                start,
                len,
                LexicalError::SeparatorBalance,
                self.block,
            ));
        }

        let tokens = std::mem::take(&mut self.tokens);
        let mut errors = std::mem::take(&mut self.errors);
        let tokens = errors.absorb(tokens);
        LexResult {
            tokens,
            errors: errors.into_vec(),
        }
    }

    fn peek(&self) -> char {
        self.chars[self.pos]
    }

    fn peek_next(&self) -> Option<char> {
        self.chars.get(self.pos + 1).copied()
    }

    fn advance(&mut self) -> char {
        let ch = self.chars[self.pos];
        self.pos += 1;
        ch
    }

    fn is_at_end(&self) -> bool {
        self.pos >= self.chars.len()
    }

    /// Whether the previous character belongs to a word, so `a.5` chains
    /// rather than starting a number.
    fn follows_word(&self) -> bool {
        self.pos > 0 && {
            let prev = self.chars[self.pos - 1];
            !prev.is_whitespace() && !is_delimiter(prev) || matches!(prev, ')' | ']')
        }
    }

    fn push(&mut self, kind: LexicalTokenKind, start: usize, end: usize, value: String) {
        self.tokens.push(LexicalToken {
            kind,
            value,
            start,
            length: end - start,
            block: self.block,
        });
    }

    fn text(&self, start: usize, end: usize) -> String {
        self.chars[start..end].iter().collect()
    }

    fn single_char(&mut self, kind: LexicalTokenKind) {
        let start = self.pos;
        let ch = self.advance();
        self.push(kind, start, self.pos, ch.to_string());
    }

    fn lex_comment(&mut self) {
        let start = self.pos;
        while !self.is_at_end() && self.peek() != '\n' {
            self.advance();
        }
        let value = self.text(start, self.pos);
        self.push(LexicalTokenKind::Comment, start, self.pos, value);
    }

    fn lex_open(&mut self, ch: char) {
        let Some(bracket) = Bracket::from_open(ch) else {
            return;
        };
        self.open.push((bracket, self.pos));
        self.single_char(LexicalTokenKind::Bracket(bracket, Side::Open));
    }

    fn lex_close(&mut self, ch: char) {
        let Some(bracket) = Bracket::from_close(ch) else {
            return;
        };
        let at = self.pos;
        self.single_char(LexicalTokenKind::Bracket(bracket, Side::Close));

        match self.open.last() {
            None => {
                self.errors.insert(ErrorRegion::new(
                    at,
                    1,
                    LexicalError::SeparatorBalance,
                    self.block,
                ));
            }
            Some(&(top, _)) if top == bracket => {
                self.open.pop();
            }
            Some(_) => match self.open.iter().rposition(|&(b, _)| b == bracket) {
                Some(k) => {
                    // Everything opened since the matching opener is unclosed.
                    let start = self.open[k].1;
                    self.open.truncate(k);
                    self.errors.insert(ErrorRegion::new(
                        start,
                        at + 1 - start,
                        LexicalError::SeparatorMismatch,
                        self.block,
                    ));
                }
                None => {
                    // No opener of this type: the close ends the innermost one.
                    let start = self.open.pop().map_or(at, |(_, start)| start);
                    self.errors.insert(ErrorRegion::new(
                        start,
                        at + 1 - start,
                        LexicalError::SeparatorMismatch,
                        self.block,
                    ));
                }
            },
        }
    }

    /// Returns `false` when the closing quote is missing; lexing stops there.
    fn lex_string(&mut self, quote: char) -> bool {
        let start = self.pos;
        self.advance(); // opening quote
        let content_start = self.pos;
        while !self.is_at_end() && self.peek() != quote {
            self.advance();
        }

        if self.is_at_end() {
            let value = self.text(start, self.pos);
            self.push(LexicalTokenKind::Error, start, self.pos, value);
            self.errors.insert(ErrorRegion::new(
                start,
                self.pos - start,
                LexicalError::QuoteMissing,
                self.block,
            ));
            return false;
        }

        let value = self.text(content_start, self.pos);
        self.advance(); // closing quote
        self.push(LexicalTokenKind::String, start, self.pos, value);
        true
    }

    fn lex_number(&mut self) {
        let start = self.pos;
        while !self.is_at_end() && self.peek().is_ascii_digit() {
            self.advance();
        }
        if !self.is_at_end()
            && self.peek() == '.'
            && self.peek_next().is_some_and(|c| c.is_ascii_digit())
        {
            self.advance(); // '.'
            while !self.is_at_end() && self.peek().is_ascii_digit() {
                self.advance();
            }
        }

        let digits = self.text(start, self.pos);
        let value: f64 = digits.parse().unwrap_or(0.0);

        if self.hz_suffix_follows() {
            self.advance();
            self.advance();
            let text = self.text(start, self.pos);
            self.push(LexicalTokenKind::HzQuantity(value), start, self.pos, text);
        } else {
            self.push(LexicalTokenKind::Number(value), start, self.pos, digits);
        }
    }

    fn hz_suffix_follows(&self) -> bool {
        let h = self.chars.get(self.pos).copied();
        let z = self.chars.get(self.pos + 1).copied();
        let after = self.chars.get(self.pos + 2).copied();
        matches!(h, Some('H' | 'h'))
            && matches!(z, Some('z' | 'Z'))
            && !after.is_some_and(is_word_char)
    }

    fn lex_word(&mut self) {
        let start = self.pos;
        while !self.is_at_end() {
            let ch = self.peek();
            if !is_word_char(ch) || (ch == '/' && self.peek_next() == Some('/')) {
                break;
            }
            self.advance();
        }
        if self.pos == start {
            // A stray sigil character after the first position.
            self.advance();
        }

        let value = self.text(start, self.pos);
        let kind = if value.eq_ignore_ascii_case("hz") {
            LexicalTokenKind::HzUnit
        } else {
            LexicalTokenKind::Identifier
        };
        self.push(kind, start, self.pos, value);
    }
}

fn is_delimiter(ch: char) -> bool {
    matches!(
        ch,
        '(' | ')' | '[' | ']' | '{' | '}' | ',' | '"' | '\'' | '=' | '*' | '|' | '.' | ':'
    )
}

fn is_word_char(ch: char) -> bool {
    !ch.is_whitespace() && !is_delimiter(ch)
}
