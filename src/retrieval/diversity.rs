use super::RankedChunk;
use std::collections::HashSet;

/// Scores under this after the penalty are dropped.
pub const DIVERSITY_FLOOR: f32 = 0.1;

const UNKNOWN_LANGUAGE: &str = "unknown";

/// Penalizes candidates whose kind or language was already selected.
///
/// Candidates are visited best first. The penalty is
/// `min(factor, 0.5 * (kind_seen + language_seen))` and is applied
/// multiplicatively, so a score can only go down.
pub fn apply_diversity(mut candidates: Vec<RankedChunk>, factor: f32) -> Vec<RankedChunk> {
    let factor = factor.clamp(0.0, 1.0);
    candidates.sort_by(|a, b| b.score.total_cmp(&a.score));

    let mut seen_kinds = HashSet::new();
    let mut seen_languages = HashSet::new();
    let mut selected = Vec::with_capacity(candidates.len());

    for mut candidate in candidates {
        let language = candidate
            .chunk
            .metadata
            .language
            .clone()
            .unwrap_or_else(|| UNKNOWN_LANGUAGE.to_string());

        let kind_seen = seen_kinds.contains(&candidate.chunk.kind) as u8 as f32;
        let language_seen = seen_languages.contains(&language) as u8 as f32;
        let penalty = factor.min(0.5 * (kind_seen + language_seen));

        candidate.score *= 1.0 - penalty;
        if candidate.score < DIVERSITY_FLOOR {
            continue;
        }

        seen_kinds.insert(candidate.chunk.kind);
        seen_languages.insert(language);
        selected.push(candidate);
    }

    selected.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| b.similarity.total_cmp(&a.similarity))
    });
    selected
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector::{ContentKind, IndexName, SemanticChunk};
    use proptest::prelude::*;

    fn ranked(id: &str, kind: ContentKind, language: Option<&str>, score: f32) -> RankedChunk {
        let mut chunk = SemanticChunk::new(id, id, kind, vec![]);
        chunk.metadata.language = language.map(str::to_string);
        RankedChunk {
            chunk,
            similarity: score,
            score,
            index: IndexName::Code,
        }
    }

    #[test]
    fn test_first_candidate_unpenalized() {
        let out = apply_diversity(vec![ranked("a", ContentKind::Code, Some("rust"), 0.8)], 0.5);
        assert!((out[0].score - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_duplicate_kind_and_language_penalized() {
        let out = apply_diversity(
            vec![
                ranked("a", ContentKind::Code, Some("rust"), 0.9),
                ranked("b", ContentKind::Code, Some("rust"), 0.8),
                ranked("c", ContentKind::Documentation, Some("python"), 0.7),
            ],
            0.5,
        );
        let ids: Vec<&str> = out.iter().map(|r| r.chunk.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c", "b"]);
        assert!((out[2].score - 0.4).abs() < 1e-6);
    }

    #[test]
    fn test_half_penalty_for_single_overlap() {
        let out = apply_diversity(
            vec![
                ranked("a", ContentKind::Code, Some("rust"), 0.9),
                ranked("b", ContentKind::Code, Some("go"), 0.8),
            ],
            1.0,
        );
        let b = out.iter().find(|r| r.chunk.id == "b").unwrap();
        assert!((b.score - 0.4).abs() < 1e-6);
    }

    #[test]
    fn test_floor_drops_weak_candidates() {
        let out = apply_diversity(
            vec![
                ranked("a", ContentKind::Code, None, 0.9),
                ranked("b", ContentKind::Code, None, 0.15),
            ],
            0.5,
        );
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn test_zero_factor_is_identity() {
        let out = apply_diversity(
            vec![
                ranked("a", ContentKind::Code, None, 0.9),
                ranked("b", ContentKind::Code, None, 0.8),
            ],
            0.0,
        );
        assert!((out[1].score - 0.8).abs() < 1e-6);
    }

    fn kind_strategy() -> impl Strategy<Value = ContentKind> {
        prop_oneof![
            Just(ContentKind::Code),
            Just(ContentKind::Config),
            Just(ContentKind::Documentation),
            Just(ContentKind::Command),
        ]
    }

    proptest! {
        #[test]
        fn prop_output_score_never_exceeds_input(
            items in prop::collection::vec(
                (kind_strategy(), prop::option::of("[a-c]"), 0.0f32..1.0),
                0..20,
            ),
            factor in 0.0f32..1.0,
        ) {
            let candidates: Vec<RankedChunk> = items
                .iter()
                .enumerate()
                .map(|(i, (kind, lang, score))| ranked(&format!("c{i}"), *kind, lang.as_deref(), *score))
                .collect();
            let inputs: std::collections::HashMap<String, f32> = candidates
                .iter()
                .map(|c| (c.chunk.id.clone(), c.score))
                .collect();

            let out = apply_diversity(candidates, factor);
            prop_assert!(out.len() <= inputs.len());
            for chunk in &out {
                prop_assert!(chunk.score <= inputs[&chunk.chunk.id]);
                prop_assert!(chunk.score >= DIVERSITY_FLOOR);
            }
        }
    }
}
