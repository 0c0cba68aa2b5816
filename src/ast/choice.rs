//! Weighted probabilistic choice between alternatives.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use super::step::Step;
use super::{Cx, Node};

/// Picks an option index from a cumulative distribution.
///
/// Any `FnMut(&[f64]) -> usize` is a selector, so tests can inject a fixed
/// selection sequence.
pub trait Selector {
    fn select(&mut self, cdf: &[f64]) -> usize;
}

impl<F> Selector for F
where
    F: FnMut(&[f64]) -> usize,
{
    fn select(&mut self, cdf: &[f64]) -> usize {
        self(cdf)
    }
}

/// Seeded random selection.
#[derive(Debug, Clone)]
pub struct RandomSelector {
    rng: ChaCha8Rng,
}

impl RandomSelector {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }
}

impl Selector for RandomSelector {
    fn select(&mut self, cdf: &[f64]) -> usize {
        let r: f64 = self.rng.gen();
        cdf.iter()
            .position(|&c| r < c)
            .unwrap_or(cdf.len().saturating_sub(1))
    }
}

/// Cumulative distribution from relative weights.
///
/// Negative or non-finite weights count as zero; if nothing is left the
/// distribution is uniform. The last entry is always exactly 1.0.
pub fn cdf(weights: &[f64]) -> Vec<f64> {
    let clean: Vec<f64> = weights
        .iter()
        .map(|&w| if w.is_finite() && w > 0.0 { w } else { 0.0 })
        .collect();
    let total: f64 = clean.iter().sum();
    let n = clean.len();

    let mut acc = 0.0;
    let mut out: Vec<f64> = clean
        .iter()
        .map(|&w| {
            acc += if total > 0.0 { w / total } else { 1.0 / n as f64 };
            acc
        })
        .collect();
    if let Some(last) = out.last_mut() {
        *last = 1.0;
    }
    out
}

/// One live option out of a weighted set, re-selected each time it cycles.
#[derive(Debug, Clone)]
pub struct Choice {
    options: Vec<Node>,
    cdf: Vec<f64>,
    active: usize,
    current: Step,
    next: Step,
}

impl Choice {
    pub fn new(options: Vec<Node>, weights: &[f64], cx: &mut Cx<'_>) -> Self {
        debug_assert!(!options.is_empty(), "choice needs at least one option");
        debug_assert_eq!(options.len(), weights.len());
        let cdf = cdf(weights);
        let active = pick(&cdf, options.len(), cx);
        let next = options[active].next().clone();
        Self {
            options,
            cdf,
            active,
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

    pub fn active(&self) -> usize {
        self.active
    }

    pub fn advance(&mut self, cx: &mut Cx<'_>) -> bool {
        self.current = self.next.clone();
        let cycled = self.options[self.active].advance(cx);
        if cycled {
            self.active = pick(&self.cdf, self.options.len(), cx);
        }
        self.next = self.options[self.active].next().clone();
        cycled
    }

    /// Length of the live option.
    pub fn length(&self) -> u32 {
        self.options[self.active].length()
    }
}

fn pick(cdf: &[f64], len: usize, cx: &mut Cx<'_>) -> usize {
    cx.selector.select(cdf).min(len - 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cdf_from_uniform_weights() {
        let c = cdf(&[1.0, 1.0, 1.0, 1.0]);
        assert_eq!(c.len(), 4);
        assert!((c[0] - 0.25).abs() < 1e-12);
        assert!((c[2] - 0.75).abs() < 1e-12);
        assert_eq!(c[3], 1.0);
    }

    #[test]
    fn cdf_from_relative_weights() {
        let c = cdf(&[3.0, 1.0]);
        assert!((c[0] - 0.75).abs() < 1e-12);
        assert_eq!(c[1], 1.0);
    }

    #[test]
    fn cdf_ignores_invalid_weights() {
        let c = cdf(&[0.0, -2.0, f64::NAN]);
        assert!((c[0] - 1.0 / 3.0).abs() < 1e-12);
        let c = cdf(&[0.0, 2.0]);
        assert_eq!(c[0], 0.0);
        assert_eq!(c[1], 1.0);
    }

    #[test]
    fn random_selector_is_seeded() {
        let c = cdf(&[1.0, 1.0, 1.0]);
        let mut a = RandomSelector::new(7);
        let mut b = RandomSelector::new(7);
        let seq_a: Vec<usize> = (0..32).map(|_| a.select(&c)).collect();
        let seq_b: Vec<usize> = (0..32).map(|_| b.select(&c)).collect();
        assert_eq!(seq_a, seq_b);
        assert!(seq_a.iter().all(|&i| i < 3));
    }

    #[test]
    fn random_selector_never_picks_zero_weight() {
        let c = cdf(&[0.0, 1.0]);
        let mut s = RandomSelector::new(1);
        assert!((0..100).all(|_| s.select(&c) == 1));
    }
}
