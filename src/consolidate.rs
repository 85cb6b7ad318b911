//! Consolidation of extracted candidates against existing memory
//!
//! Each candidate is processed in extraction order so that candidate N sees
//! the effects of candidates 1..N-1:
//!
//! 1. An exact content-hash match bumps the existing item's usage and drops
//!    the candidate.
//! 2. A same-subtype neighbor at or above the near threshold absorbs the
//!    candidate: the longer summary wins, the new body is appended under a
//!    `revisions` payload, and usage bumps.
//! 3. The strongest contradictory decision at or above the supersede
//!    threshold is superseded by the newly created candidate; further
//!    qualifying contradictions fall back to `refers_to`.
//! 4. Remaining neighbors above the refer threshold get `refers_to` links
//!    from the new item.

use once_cell::sync::Lazy;
use regex::Regex;
use rusqlite::Connection;

use crate::error::{MnemoError, Result};
use crate::extract::Candidate;
use crate::storage::queries::{
    add_link, create_item, find_item_by_hash, get_item, update_item,
};
use crate::storage::vectors::{self, SearchFilter};
use crate::types::{
    item_content_hash, ConsolidationConfig, CreateItemInput, ItemId, ItemMutation, ItemSubtype,
    LinkType, MemoryItem,
};

/// What happened to one candidate
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CandidateAction {
    /// Persisted as a new item
    Created(ItemId),
    /// Absorbed into an existing near-duplicate
    MergedInto(ItemId),
    /// Exact duplicate of an existing item; usage bumped
    DroppedExactDuplicate(ItemId),
}

static NEGATION_CUES: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:not|don't|never|won't|isn't|aren't|no)\b").expect("negation cues")
});

static REPLACEMENT_CUE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\binstead of\b").expect("replacement cue"));

/// Two decisions conflict when their negation polarity flips or the newer
/// one explicitly replaces the older
fn contradictory_polarity(newer: &str, older: &str) -> bool {
    if REPLACEMENT_CUE.is_match(newer) {
        return true;
    }
    NEGATION_CUES.is_match(newer) != NEGATION_CUES.is_match(older)
}

/// Merge a near-duplicate candidate into an existing item
fn merge_into(
    conn: &Connection,
    workspace: &str,
    existing: &MemoryItem,
    candidate: &Candidate,
) -> Result<MemoryItem> {
    // Prefer the longer summary; at equal length prefer the newer one
    let summary = if candidate.summary.len() >= existing.summary.len() {
        Some(candidate.summary.clone())
    } else {
        None
    };

    let mut payload_merge = None;
    if candidate.body != existing.body {
        let mut revisions: Vec<serde_json::Value> = existing
            .payload
            .get("revisions")
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default();
        revisions.push(serde_json::Value::String(candidate.body.clone()));
        payload_merge = Some(
            [("revisions".to_string(), serde_json::Value::Array(revisions))]
                .into_iter()
                .collect(),
        );
    }

    update_item(
        conn,
        workspace,
        &existing.id,
        &ItemMutation {
            summary,
            usage_increment: Some(1),
            payload_merge,
            ..Default::default()
        },
    )
}

/// Consolidate a single candidate; call inside a transaction
#[allow(clippy::too_many_arguments)]
pub fn consolidate_candidate(
    conn: &Connection,
    config: &ConsolidationConfig,
    workspace: &str,
    thread_id: &str,
    artifact_id: &ItemId,
    candidate: &Candidate,
    embedding: Option<&[f32]>,
    model_id: &str,
) -> Result<CandidateAction> {
    let hash = item_content_hash(&candidate.summary, &candidate.body);

    // Exact duplicate by content hash
    if let Some(existing) = find_item_by_hash(conn, workspace, hash)? {
        update_item(
            conn,
            workspace,
            &existing.id,
            &ItemMutation {
                usage_increment: Some(1),
                ..Default::default()
            },
        )?;
        tracing::debug!(item = %existing.id, "candidate dropped as exact duplicate");
        return Ok(CandidateAction::DroppedExactDuplicate(existing.id));
    }

    // Vector neighborhood within the same kind
    let mut refer_targets: Vec<ItemId> = Vec::new();
    let mut supersede_target: Option<ItemId> = None;

    if let Some(query) = embedding {
        let filter = SearchFilter {
            include_kinds: Some(vec![candidate.subtype.kind()]),
            ..Default::default()
        };
        let neighbors =
            vectors::search(conn, workspace, query, config.neighbor_limit, &filter, model_id)?;

        for (neighbor_id, cosine) in neighbors {
            if cosine < config.refer_threshold {
                break;
            }
            let neighbor = get_item(conn, workspace, &neighbor_id)?;

            if cosine >= config.near_threshold && neighbor.subtype == candidate.subtype {
                let merged = merge_into(conn, workspace, &neighbor, candidate)?;
                tracing::debug!(item = %merged.id, cosine, "candidate merged into near-duplicate");
                return Ok(CandidateAction::MergedInto(merged.id));
            }

            if cosine >= config.supersede_threshold
                && candidate.subtype == ItemSubtype::Decision
                && neighbor.subtype == ItemSubtype::Decision
                && contradictory_polarity(&candidate.body, &neighbor.body)
            {
                if supersede_target.is_none() {
                    supersede_target = Some(neighbor_id);
                } else {
                    // An item takes at most one superseder; further
                    // qualifying contradictions keep a weak link
                    refer_targets.push(neighbor_id);
                }
                continue;
            }

            refer_targets.push(neighbor_id);
        }
    }

    // Persist as a new item
    let item = create_item(
        conn,
        &CreateItemInput {
            workspace: workspace.to_string(),
            thread_id: thread_id.to_string(),
            subtype: candidate.subtype,
            summary: candidate.summary.clone(),
            body: candidate.body.clone(),
            salience: candidate.salience,
            payload: candidate.payload.clone(),
            source_artifact_id: artifact_id.clone(),
            source_span: candidate.span,
            embedding_model_id: embedding.map(|_| model_id.to_string()),
        },
    )?;

    if let Some(query) = embedding {
        vectors::upsert_vector(conn, workspace, &item.id, query, model_id)?;
    }

    if let Some(target) = supersede_target {
        match add_link(conn, workspace, &item.id, &target, LinkType::Supersedes) {
            Ok(_) => {}
            // Target already has a superseder; keep the association weak
            Err(MnemoError::Conflict(reason)) => {
                tracing::debug!(target = %target, %reason, "supersedes degraded to refers_to");
                add_link(conn, workspace, &item.id, &target, LinkType::RefersTo)?;
            }
            Err(e) => return Err(e),
        }
    }

    for target in refer_targets {
        add_link(conn, workspace, &item.id, &target, LinkType::RefersTo)?;
    }

    Ok(CandidateAction::Created(item.id))
}
