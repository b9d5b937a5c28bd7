use std::collections::HashMap;

use glam::Vec2;

/// Length of a binary descriptor in bytes (256 tests).
pub const DESCRIPTOR_BYTES: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Keypoint {
    pub p2d: Vec2,
    /// Size of the region the descriptor was sampled from, in pixels.
    pub scale: f32,
    /// Orientation in radians.
    pub angle: f32,
    pub response: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Descriptor(pub [u8; DESCRIPTOR_BYTES]);

impl Descriptor {
    pub fn zeros() -> Descriptor {
        Descriptor([0; DESCRIPTOR_BYTES])
    }

    pub fn hamming(&self, other: &Descriptor) -> u32 {
        self.0
            .iter()
            .zip(other.0.iter())
            .map(|(a, b)| (a ^ b).count_ones())
            .sum()
    }

    pub fn bit(&self, idx: usize) -> bool {
        (self.0[idx / 8] >> (idx % 8)) & 1 == 1
    }

    pub fn set_bit(&mut self, idx: usize) {
        self.0[idx / 8] |= 1 << (idx % 8);
    }
}

/// Keypoints with their descriptors, index aligned.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureSet {
    keypoints: Vec<Keypoint>,
    descriptors: Vec<Descriptor>,
}

impl FeatureSet {
    pub fn new(keypoints: Vec<Keypoint>, descriptors: Vec<Descriptor>) -> FeatureSet {
        if keypoints.len() != descriptors.len() {
            panic!(
                "keypoint count {} and descriptor count {} differ",
                keypoints.len(),
                descriptors.len()
            )
        }
        FeatureSet {
            keypoints,
            descriptors,
        }
    }

    pub fn empty() -> FeatureSet {
        FeatureSet::default()
    }

    pub fn len(&self) -> usize {
        self.keypoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keypoints.is_empty()
    }

    pub fn keypoints(&self) -> &[Keypoint] {
        &self.keypoints
    }

    pub fn descriptors(&self) -> &[Descriptor] {
        &self.descriptors
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Keypoint, &Descriptor)> {
        self.keypoints.iter().zip(self.descriptors.iter())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeatureMatch {
    /// Index into the current frame's feature set.
    pub query_idx: usize,
    /// Index into the mosaic's feature set.
    pub reference_idx: usize,
    pub distance: u32,
}

/// Accepted correspondences, at most one per query feature.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MatchSet {
    matches: Vec<FeatureMatch>,
}

impl MatchSet {
    /// Builds a match set, keeping the closest match when a query index repeats.
    pub fn from_matches(matches: Vec<FeatureMatch>) -> MatchSet {
        let mut best: HashMap<usize, FeatureMatch> = HashMap::with_capacity(matches.len());
        for m in matches {
            best.entry(m.query_idx)
                .and_modify(|kept| {
                    if m.distance < kept.distance {
                        *kept = m;
                    }
                })
                .or_insert(m);
        }
        let mut matches: Vec<_> = best.into_values().collect();
        matches.sort_by_key(|m| m.query_idx);
        MatchSet { matches }
    }

    pub fn len(&self) -> usize {
        self.matches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, FeatureMatch> {
        self.matches.iter()
    }

    pub fn as_slice(&self) -> &[FeatureMatch] {
        &self.matches
    }

    /// Point pairs `(query position, reference position)` for every match.
    pub fn point_pairs(&self, query: &FeatureSet, reference: &FeatureSet) -> Vec<(Vec2, Vec2)> {
        self.matches
            .iter()
            .map(|m| {
                (
                    query.keypoints()[m.query_idx].p2d,
                    reference.keypoints()[m.reference_idx].p2d,
                )
            })
            .collect()
    }
}

impl<'a> IntoIterator for &'a MatchSet {
    type Item = &'a FeatureMatch;
    type IntoIter = std::slice::Iter<'a, FeatureMatch>;

    fn into_iter(self) -> Self::IntoIter {
        self.matches.iter()
    }
}
