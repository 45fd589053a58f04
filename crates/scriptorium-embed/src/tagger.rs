use std::collections::HashMap;

use once_cell::sync::Lazy;
use scriptorium_core::{EmbeddingProvider, Result, Tagger};

use crate::embedder::HashEmbedder;
use crate::taxonomy::{terms, Facet, TaxonomyTerm};

struct EmbeddedTerm {
    term: &'static TaxonomyTerm,
    embedding: Vec<f32>,
}

static TAXONOMY: Lazy<Vec<EmbeddedTerm>> = Lazy::new(|| {
    let embedder = HashEmbedder::new();
    let contexts: Vec<String> = terms().iter().map(|t| t.context.to_string()).collect();
    let embeddings = embedder.encode(&contexts).expect("taxonomy context always embeds");
    terms()
        .iter()
        .zip(embeddings)
        .map(|(term, embedding)| EmbeddedTerm { term, embedding })
        .collect()
});

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn round3(x: f32) -> f32 {
    (x * 1000.0).round() / 1000.0
}

/// Facet-constrained nearest-neighbor tagger over a fixed keyword taxonomy.
///
/// Each facet runs its own top-k/min-similarity competition (see
/// [`Facet::rule`]); a term that wins in more than one facet is kept once,
/// at its best score. The final tag list for an input is every winning
/// term's name, ordered by descending score.
#[derive(Debug, Default, Clone, Copy)]
pub struct KeywordTagger;

impl KeywordTagger {
    pub fn new() -> Self {
        KeywordTagger
    }

    fn tags_for(&self, query: &[f32]) -> Vec<String> {
        let mut best: HashMap<&'static str, f32> = HashMap::new();

        for facet in [
            Facet::Seniority,
            Facet::SoftSkill,
            Facet::HardSkill,
            Facet::Methodology,
            Facet::Role,
            Facet::Domain,
            Facet::Technology,
        ] {
            let (top_k, min_similarity) = facet.rule();
            let mut scored: Vec<(&'static str, f32)> = TAXONOMY
                .iter()
                .filter(|e| e.term.facet == facet)
                .map(|e| (e.term.name, round3(cosine_similarity(query, &e.embedding))))
                .filter(|(_, score)| *score >= min_similarity)
                .collect();
            scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
            scored.truncate(top_k);

            for (name, score) in scored {
                best.entry(name)
                    .and_modify(|existing| {
                        if score > *existing {
                            *existing = score;
                        }
                    })
                    .or_insert(score);
            }
        }

        let mut ranked: Vec<(&'static str, f32)> = best.into_iter().collect();
        ranked.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(b.0))
        });
        ranked.into_iter().map(|(name, _)| name.to_string()).collect()
    }
}

impl Tagger for KeywordTagger {
    fn extract_tags(&self, ids: &[String], texts: &[String]) -> Result<HashMap<String, Vec<String>>> {
        let embedder = HashEmbedder::new();
        let queries = embedder.encode(texts)?;
        Ok(ids
            .iter()
            .cloned()
            .zip(queries.iter().map(|q| self.tags_for(q)))
            .collect())
    }
}
