use std::collections::HashSet;

use video_mosaic::features::{FeatureExtractor, OrbExtractor};
use video_mosaic::matching::{BruteForceMatcher, FeatureMatcher, LshMatcher};
use video_mosaic::synthetic::{block_texture, pan_frames};
use video_mosaic::types::FeatureSet;

fn pan_pair() -> (FeatureSet, FeatureSet) {
    let texture = block_texture(150, 110, 5, 21);
    let frames = pan_frames(&texture, 110, 110, 20, 0, 2);
    let extractor = OrbExtractor::default();
    (extractor.extract(&frames[1], 20.0), extractor.extract(&frames[0], 20.0))
}

#[test]
fn test_no_duplicate_query_index() {
    let (query, reference) = pan_pair();
    let matchers: [Box<dyn FeatureMatcher>; 2] =
        [Box::new(BruteForceMatcher), Box::new(LshMatcher::default())];
    for matcher in matchers {
        let matches = matcher.match_features(&query, &reference, 50, 0.7);
        assert!(!matches.is_empty());
        let mut seen = HashSet::new();
        for m in &matches {
            assert!(seen.insert(m.query_idx), "query {} matched twice", m.query_idx);
            assert!(m.query_idx < query.len());
            assert!(m.reference_idx < reference.len());
        }
    }
}

#[test]
fn test_matches_follow_the_pan() {
    let (query, reference) = pan_pair();
    let matches = BruteForceMatcher.match_features(&query, &reference, 50, 0.7);
    let pairs = matches.point_pairs(&query, &reference);
    let consistent = pairs
        .iter()
        .filter(|(q, r)| (r.x - q.x - 20.0).abs() < 0.5 && (r.y - q.y).abs() < 0.5)
        .count();
    assert!(consistent * 2 > pairs.len());
}

#[test]
fn test_self_match_is_identity() {
    let (features, _) = pan_pair();
    let matches = LshMatcher::default().match_features(&features, &features, 50, 0.7);
    assert!(!matches.is_empty());
    assert!(matches.iter().all(|m| m.query_idx == m.reference_idx && m.distance == 0));
}

#[test]
fn test_empty_sets_give_no_matches() {
    let (features, _) = pan_pair();
    let empty = FeatureSet::empty();
    assert!(BruteForceMatcher.match_features(&features, &empty, 50, 0.7).is_empty());
    assert!(LshMatcher::default().match_features(&empty, &features, 50, 0.7).is_empty());
}

#[test]
fn test_exhaustive_lsh_agrees_with_brute_force() {
    let (query, reference) = pan_pair();
    let breadth = reference.len() + 10;
    let sorted = |matches: video_mosaic::types::MatchSet| {
        let mut v: Vec<_> = matches
            .iter()
            .map(|m| (m.query_idx, m.reference_idx, m.distance))
            .collect();
        v.sort_unstable();
        v
    };
    let brute = sorted(BruteForceMatcher.match_features(&query, &reference, breadth, 0.7));
    let lsh = sorted(LshMatcher::default().match_features(&query, &reference, breadth, 0.7));
    assert!(!brute.is_empty());
    assert_eq!(lsh, brute);
}
