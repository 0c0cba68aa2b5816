//! Recoverable error regions.
//!
//! Problems in user text are never raised: they become [`ErrorRegion`]s that
//! absorb the tokens they cover. Stored regions never overlap.

use thiserror::Error;

use super::token::LexicalToken;
use crate::ast::BlockId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum LexicalError {
    #[error("missing closing quote")]
    QuoteMissing,
    #[error("unbalanced bracket")]
    SeparatorBalance,
    #[error("mismatched bracket")]
    SeparatorMismatch,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SyntaxError {
    #[error("unexpected {0}")]
    UnexpectedToken(String),
    #[error("expected {0}")]
    Expected(&'static str),
    #[error("empty group")]
    EmptyGroup,
    #[error("unknown function `{0}`")]
    UnknownFunction(String),
    #[error("`{param}` does not accept {found}")]
    InvalidParameter { param: String, found: String },
    #[error("too many arguments for `{0}`")]
    TooManyArguments(String),
    #[error("`{0}` cannot refer to itself")]
    SelfReference(String),
    #[error("`{0}` is reserved")]
    ReservedName(String),
    #[error("`{0}` must be assigned a number")]
    ExpectedNumber(String),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ErrorReason {
    #[error(transparent)]
    Lexical(#[from] LexicalError),
    #[error(transparent)]
    Syntax(#[from] SyntaxError),
}

/// A span of text that could not be trusted, with every reason found for it.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorRegion {
    pub start: usize,
    pub length: usize,
    pub reasons: Vec<ErrorReason>,
    /// Tokens swallowed by this region, in source order.
    pub tokens: Vec<LexicalToken>,
    pub block: BlockId,
}

impl ErrorRegion {
    pub fn new(start: usize, length: usize, reason: impl Into<ErrorReason>, block: BlockId) -> Self {
        Self {
            start,
            length: length.max(1),
            reasons: vec![reason.into()],
            tokens: Vec::new(),
            block,
        }
    }

    pub fn end(&self) -> usize {
        self.start + self.length
    }

    pub fn overlaps(&self, other: &ErrorRegion) -> bool {
        self.start < other.end() && other.start < self.end()
    }

    pub fn contains_reason(&self, reason: &ErrorReason) -> bool {
        self.reasons.contains(reason)
    }

    /// Union of spans, reasons ordered by region start.
    fn merge(self, other: ErrorRegion) -> ErrorRegion {
        let (first, second) = if other.start < self.start {
            (other, self)
        } else {
            (self, other)
        };
        let start = first.start;
        let end = first.end().max(second.end());

        let mut reasons = first.reasons;
        for reason in second.reasons {
            if !reasons.contains(&reason) {
                reasons.push(reason);
            }
        }

        let mut tokens = first.tokens;
        tokens.extend(second.tokens);
        tokens.sort_by_key(|t| t.start);
        tokens.dedup_by_key(|t| t.start);

        ErrorRegion {
            start,
            length: end - start,
            reasons,
            tokens,
            block: first.block,
        }
    }
}

/// Ordered set of pairwise-disjoint error regions.
#[derive(Debug, Clone, Default)]
pub struct ErrorRegions {
    regions: Vec<ErrorRegion>,
}

impl ErrorRegions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a region, merging it with everything it overlaps.
    pub fn insert(&mut self, mut region: ErrorRegion) {
        let mut i = 0;
        while i < self.regions.len() {
            if self.regions[i].overlaps(&region) {
                let other = self.regions.remove(i);
                region = region.merge(other);
                // The union grew; earlier regions may overlap it now.
                i = 0;
            } else {
                i += 1;
            }
        }
        let pos = self.regions.partition_point(|r| r.start < region.start);
        self.regions.insert(pos, region);
    }

    pub fn extend(&mut self, regions: impl IntoIterator<Item = ErrorRegion>) {
        for region in regions {
            self.insert(region);
        }
    }

    /// Move every token that overlaps a region into that region.
    /// Returns the tokens that remain outside all regions.
    pub fn absorb(&mut self, tokens: Vec<LexicalToken>) -> Vec<LexicalToken> {
        let mut kept = Vec::with_capacity(tokens.len());
        for token in tokens {
            match self
                .regions
                .iter_mut()
                .find(|r| token.overlaps(r.start, r.end()))
            {
                Some(region) => {
                    let pos = region.tokens.partition_point(|t| t.start < token.start);
                    if region.tokens.get(pos).map(|t| t.start) != Some(token.start) {
                        region.tokens.insert(pos, token);
                    }
                }
                None => kept.push(token),
            }
        }
        kept
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ErrorRegion> {
        self.regions.iter()
    }

    pub fn into_vec(self) -> Vec<ErrorRegion> {
        self.regions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn region(start: usize, length: usize, reason: LexicalError) -> ErrorRegion {
        ErrorRegion::new(start, length, reason, BlockId(0))
    }

    fn assert_disjoint(regions: &ErrorRegions) {
        let all: Vec<&ErrorRegion> = regions.iter().collect();
        for (i, a) in all.iter().enumerate() {
            for b in &all[i + 1..] {
                assert!(!a.overlaps(b), "{a:?} overlaps {b:?}");
            }
        }
    }

    #[test]
    fn overlapping_regions_merge() {
        let mut regions = ErrorRegions::new();
        regions.insert(region(2, 5, LexicalError::SeparatorMismatch));
        regions.insert(region(4, 10, LexicalError::SeparatorBalance));
        assert_eq!(regions.len(), 1);
        let r = regions.iter().next().unwrap();
        assert_eq!((r.start, r.length), (2, 12));
        assert_eq!(r.reasons.len(), 2);
        assert_eq!(r.reasons[0], ErrorReason::Lexical(LexicalError::SeparatorMismatch));
    }

    #[test]
    fn adjacent_regions_stay_separate() {
        let mut regions = ErrorRegions::new();
        regions.insert(region(0, 3, LexicalError::SeparatorBalance));
        regions.insert(region(3, 2, LexicalError::SeparatorBalance));
        assert_eq!(regions.len(), 2);
    }

    #[test]
    fn bridging_region_merges_transitively() {
        let mut regions = ErrorRegions::new();
        regions.insert(region(0, 2, LexicalError::SeparatorBalance));
        regions.insert(region(5, 2, LexicalError::SeparatorBalance));
        regions.insert(region(10, 2, LexicalError::QuoteMissing));
        regions.insert(region(1, 10, LexicalError::SeparatorMismatch));
        assert_eq!(regions.len(), 1);
        let r = regions.iter().next().unwrap();
        assert_eq!((r.start, r.end()), (0, 12));
        // Repeated reasons are kept once.
        assert_eq!(r.reasons.len(), 3);
        assert_disjoint(&regions);
    }

    #[test]
    fn regions_are_ordered_by_start() {
        let mut regions = ErrorRegions::new();
        regions.insert(region(9, 1, LexicalError::SeparatorBalance));
        regions.insert(region(1, 1, LexicalError::SeparatorBalance));
        regions.insert(region(5, 1, LexicalError::SeparatorBalance));
        let starts: Vec<usize> = regions.iter().map(|r| r.start).collect();
        assert_eq!(starts, vec![1, 5, 9]);
    }

    #[test]
    fn absorb_moves_overlapping_tokens() {
        use crate::dsl::token::LexicalTokenKind;
        let token = |start: usize, length: usize| LexicalToken {
            kind: LexicalTokenKind::Identifier,
            value: "x".repeat(length),
            start,
            length,
            block: BlockId(0),
        };
        let mut regions = ErrorRegions::new();
        regions.insert(region(4, 3, LexicalError::SeparatorMismatch));
        let kept = regions.absorb(vec![token(0, 2), token(3, 2), token(8, 1)]);
        assert_eq!(kept.len(), 2);
        let r = regions.iter().next().unwrap();
        assert_eq!(r.tokens.len(), 1);
        assert_eq!(r.tokens[0].start, 3);
    }

    #[test]
    fn reasons_display() {
        let reason: ErrorReason = SyntaxError::UnknownFunction("wobble".into()).into();
        assert_eq!(reason.to_string(), "unknown function `wobble`");
        let reason: ErrorReason = LexicalError::QuoteMissing.into();
        assert_eq!(reason.to_string(), "missing closing quote");
    }
}
