//! Purpose-driven ranking of candidate items
//!
//! Combines six signals, each normalized into [0, 1] before weighting:
//! vector similarity, stored salience, recency of last access, usage
//! frequency, a purpose-conditioned kind prior, and supersession freshness.
//! With the default weights every score also lands in [0, 1]. Ties break by
//! ascending item identifier.

use chrono::{DateTime, Utc};

use crate::types::{ItemKind, ItemState, ItemSubtype, MemoryItem, RankConfig};

/// Kind-prior boost applied when the purpose carries matching cue words
const KIND_PRIOR_BOOST: f32 = 0.2;

/// Usage saturates after 2^6 - 1 uses
const USAGE_LOG_CEILING: f32 = 6.0;

/// Individual signal values feeding one item's score
#[derive(Debug, Clone, Copy, Default)]
pub struct RankSignals {
    pub similarity: f32,
    pub salience: f32,
    pub recency: f32,
    pub usage: f32,
    pub kind_prior: f32,
    pub freshness: f32,
}

/// An item with its final score and the signals behind it
#[derive(Debug, Clone)]
pub struct RankedItem {
    pub item: MemoryItem,
    pub score: f32,
    pub signals: RankSignals,
}

/// Cue classes detected in the purpose text
#[derive(Debug, Clone, Copy, Default)]
struct PurposeCues {
    episodic: bool,
    decision: bool,
}

fn detect_cues(purpose: &str) -> PurposeCues {
    let mut cues = PurposeCues::default();
    for token in purpose
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
    {
        if ["fix", "error", "bug"].iter().any(|c| token.starts_with(c)) {
            cues.episodic = true;
        }
        if ["plan", "design", "decide"].iter().any(|c| token.starts_with(c)) {
            cues.decision = true;
        }
    }
    cues
}

/// Rank items against a purpose; input pairs each item with its cosine
/// similarity from the index (`None` when no vector was available)
pub fn rank(
    items: Vec<(MemoryItem, Option<f32>)>,
    purpose: &str,
    config: &RankConfig,
    now: DateTime<Utc>,
) -> Vec<RankedItem> {
    let cues = detect_cues(purpose);
    let weights = &config.weights;

    let mut ranked: Vec<RankedItem> = items
        .into_iter()
        .map(|(item, similarity)| {
            let signals = RankSignals {
                similarity: similarity.unwrap_or(0.0).clamp(0.0, 1.0),
                salience: item.salience.clamp(0.0, 1.0),
                recency: recency_signal(&item, config, now),
                usage: usage_signal(item.usage_count),
                kind_prior: kind_prior_signal(&item, cues),
                freshness: if item.state == ItemState::Superseded {
                    0.0
                } else {
                    1.0
                },
            };

            let score = weights.similarity * signals.similarity
                + weights.salience * signals.salience
                + weights.recency * signals.recency
                + weights.usage * signals.usage
                + weights.kind_prior * signals.kind_prior
                + weights.freshness * signals.freshness;

            RankedItem {
                item,
                score,
                signals,
            }
        })
        .collect();

    ranked.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.item.id.cmp(&b.item.id))
    });
    ranked
}

/// `exp(-dt / tau)` over seconds since last access, with tau per kind
fn recency_signal(item: &MemoryItem, config: &RankConfig, now: DateTime<Utc>) -> f32 {
    let tau = match item.kind {
        ItemKind::Semantic => config.tau_semantic_seconds,
        ItemKind::Episodic => config.tau_episodic_seconds,
    };
    if tau <= 0.0 {
        return 0.0;
    }
    let elapsed = (now - item.last_accessed_at).num_seconds().max(0) as f64;
    (-elapsed / tau).exp() as f32
}

/// `min(1, log2(1 + usage) / 6)`
fn usage_signal(usage_count: i64) -> f32 {
    let usage = usage_count.max(0) as f32;
    ((1.0 + usage).log2() / USAGE_LOG_CEILING).min(1.0)
}

fn kind_prior_signal(item: &MemoryItem, cues: PurposeCues) -> f32 {
    let mut prior: f32 = 0.0;
    if cues.episodic && item.kind == ItemKind::Episodic {
        prior += KIND_PRIOR_BOOST;
    }
    if cues.decision && item.subtype == ItemSubtype::Decision {
        prior += KIND_PRIOR_BOOST;
    }
    prior.clamp(0.0, 1.0)
}
