use std::collections::{HashMap, HashSet};

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::config::MosaicConfig;
use crate::types::{DESCRIPTOR_BYTES, Descriptor, FeatureMatch, FeatureSet, MatchSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatcherKind {
    BruteForce,
    Lsh,
}

pub trait FeatureMatcher: Send + Sync {
    /// Matches every query descriptor against `reference`, examining up to
    /// `breadth` candidates per query, and keeps a match only when the best
    /// distance is below `ratio` times the second best.
    fn match_features(
        &self,
        query: &FeatureSet,
        reference: &FeatureSet,
        breadth: usize,
        ratio: f32,
    ) -> MatchSet;
}

pub fn matcher_from_config(config: &MosaicConfig) -> Box<dyn FeatureMatcher> {
    match config.matcher {
        MatcherKind::BruteForce => Box::new(BruteForceMatcher),
        MatcherKind::Lsh => Box::new(LshMatcher::default()),
    }
}

/// Running best and second-best distance for one query.
#[derive(Debug, Default)]
struct TwoNearest {
    best: Option<(usize, u32)>,
    second: Option<u32>,
}

impl TwoNearest {
    fn push(&mut self, idx: usize, distance: u32) {
        match self.best {
            Some((_, best)) if distance >= best => {
                if self.second.is_none_or(|s| distance < s) {
                    self.second = Some(distance);
                }
            }
            Some((_, best)) => {
                self.second = Some(best);
                self.best = Some((idx, distance));
            }
            None => self.best = Some((idx, distance)),
        }
    }

    fn accept(&self, query_idx: usize, ratio: f32) -> Option<FeatureMatch> {
        let (reference_idx, d1) = self.best?;
        let d2 = self.second?;
        if d2 == 0 || d1 as f32 >= ratio * d2 as f32 {
            return None;
        }
        Some(FeatureMatch {
            query_idx,
            reference_idx,
            distance: d1,
        })
    }
}

/// Exhaustive Hamming matcher. Always examines every reference descriptor,
/// so `breadth` has no effect.
#[derive(Debug, Clone, Copy, Default)]
pub struct BruteForceMatcher;

impl FeatureMatcher for BruteForceMatcher {
    fn match_features(
        &self,
        query: &FeatureSet,
        reference: &FeatureSet,
        _breadth: usize,
        ratio: f32,
    ) -> MatchSet {
        let refs = reference.descriptors();
        let matches: Vec<_> = query
            .descriptors()
            .par_iter()
            .enumerate()
            .filter_map(|(qi, qd)| {
                let mut nn = TwoNearest::default();
                for (ri, rd) in refs.iter().enumerate() {
                    nn.push(ri, qd.hamming(rd));
                }
                nn.accept(qi, ratio)
            })
            .collect();
        MatchSet::from_matches(matches)
    }
}

/// Approximate matcher over multi-table locality-sensitive hashing.
///
/// Each table keys descriptors on a fixed random subset of bits. A query
/// examines the members of its bucket in every table first, then tops up
/// with reference descriptors in index order until `breadth` candidates have
/// been compared.
#[derive(Debug, Clone, Copy)]
pub struct LshMatcher {
    pub tables: usize,
    pub key_bits: usize,
    pub seed: u64,
}

impl Default for LshMatcher {
    fn default() -> Self {
        Self {
            tables: 6,
            key_bits: 12,
            seed: 0x15b,
        }
    }
}

struct LshIndex {
    bit_sets: Vec<Vec<usize>>,
    buckets: Vec<HashMap<u32, Vec<usize>>>,
}

impl LshIndex {
    fn build(matcher: &LshMatcher, reference: &[Descriptor]) -> LshIndex {
        let mut rng = ChaCha8Rng::seed_from_u64(matcher.seed);
        let key_bits = matcher.key_bits.clamp(1, 32);
        let bit_sets: Vec<Vec<usize>> = (0..matcher.tables)
            .map(|_| rand::seq::index::sample(&mut rng, DESCRIPTOR_BYTES * 8, key_bits).into_vec())
            .collect();
        let buckets = bit_sets
            .iter()
            .map(|bits| {
                let mut table: HashMap<u32, Vec<usize>> = HashMap::new();
                for (idx, d) in reference.iter().enumerate() {
                    table.entry(Self::key(bits, d)).or_default().push(idx);
                }
                table
            })
            .collect();
        LshIndex { bit_sets, buckets }
    }

    fn key(bits: &[usize], descriptor: &Descriptor) -> u32 {
        bits.iter()
            .enumerate()
            .fold(0u32, |key, (i, &b)| key | ((descriptor.bit(b) as u32) << i))
    }

    fn candidates<'a>(&'a self, descriptor: &'a Descriptor) -> impl Iterator<Item = usize> + 'a {
        self.bit_sets
            .iter()
            .zip(self.buckets.iter())
            .filter_map(move |(bits, table)| table.get(&Self::key(bits, descriptor)))
            .flatten()
            .copied()
    }
}

impl FeatureMatcher for LshMatcher {
    fn match_features(
        &self,
        query: &FeatureSet,
        reference: &FeatureSet,
        breadth: usize,
        ratio: f32,
    ) -> MatchSet {
        let refs = reference.descriptors();
        if refs.is_empty() {
            return MatchSet::default();
        }
        let index = LshIndex::build(self, refs);
        let breadth = breadth.max(2);
        let matches: Vec<_> = query
            .descriptors()
            .par_iter()
            .enumerate()
            .filter_map(|(qi, qd)| {
                let mut seen = HashSet::with_capacity(breadth);
                let mut examined = 0;
                let mut nn = TwoNearest::default();
                let bucketed = index.candidates(qd);
                let fallback = 0..refs.len();
                for ri in bucketed.chain(fallback) {
                    if examined >= breadth {
                        break;
                    }
                    if !seen.insert(ri) {
                        continue;
                    }
                    examined += 1;
                    nn.push(ri, qd.hamming(&refs[ri]));
                }
                nn.accept(qi, ratio)
            })
            .collect();
        MatchSet::from_matches(matches)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn two_nearest_keeps_order() {
        let mut nn = TwoNearest::default();
        for (i, d) in [(0, 40), (1, 10), (2, 25), (3, 10)] {
            nn.push(i, d);
        }
        assert_eq!(nn.best, Some((1, 10)));
        assert_eq!(nn.second, Some(10));
        assert!(nn.accept(0, 0.7).is_none());
    }

    #[test]
    fn ratio_rejects_single_candidate() {
        let mut nn = TwoNearest::default();
        nn.push(0, 3);
        assert!(nn.accept(0, 0.7).is_none());
        nn.push(1, 100);
        assert_eq!(nn.accept(5, 0.7).map(|m| m.reference_idx), Some(0));
    }
}
