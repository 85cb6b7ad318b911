//! Feedback application
//!
//! Translates client feedback signals into salience and usage mutations,
//! appends every call to the journal, and handles the retire/duplicate
//! side effects. Salience deltas saturate into [0, 1]; concurrent feedback
//! on one item serializes through the caller's per-item lock, and the
//! outcome is the commutative sum of the deltas.

use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use rusqlite::Connection;

use crate::error::{MnemoError, Result};
use crate::storage::queries::{add_link, append_feedback, get_item, update_item};
use crate::types::{
    FeedbackOutcome, FeedbackRecord, FeedbackSignal, ItemId, ItemMutation, LinkType,
};

/// Salience at or below which an `outdated` signal retires the item
const RETIRE_THRESHOLD: f32 = 0.1;

/// Item id mentioned in a feedback comment, e.g. "duplicate of S12"
static ITEM_REF: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b([SE]\d+)\b").expect("item reference pattern"));

/// Salience delta and usage increment for one signal
fn signal_effects(signal: FeedbackSignal, magnitude: f32) -> (f32, i64) {
    match signal {
        FeedbackSignal::Helpful => (0.05 * magnitude, 1),
        FeedbackSignal::NotHelpful => (-0.05 * magnitude.abs(), 0),
        FeedbackSignal::Outdated => (-0.20, 0),
        FeedbackSignal::Duplicate => (-0.10, 0),
    }
}

/// Apply one feedback signal to an item; call inside a transaction while
/// holding the item's write lock
pub fn apply(
    conn: &Connection,
    workspace: &str,
    item_id: &ItemId,
    signal: FeedbackSignal,
    magnitude: f32,
    actor: Option<&str>,
    comment: Option<&str>,
) -> Result<FeedbackOutcome> {
    if !(-1.0..=1.0).contains(&magnitude) {
        return Err(MnemoError::InvalidInput(format!(
            "magnitude must be in [-1, 1], got {}",
            magnitude
        )));
    }

    let item = get_item(conn, workspace, item_id)?;
    let previous_salience = item.salience;
    let (delta, usage_increment) = signal_effects(signal, magnitude);

    let mut mutation = ItemMutation {
        salience_delta: Some(delta),
        ..Default::default()
    };
    if usage_increment != 0 {
        mutation.usage_increment = Some(usage_increment);
    }

    let updated = update_item(conn, workspace, item_id, &mutation)?;
    let mut retired = updated.retired_at.is_some();

    if signal == FeedbackSignal::Outdated && updated.salience <= RETIRE_THRESHOLD && !retired {
        update_item(
            conn,
            workspace,
            item_id,
            &ItemMutation {
                retired: true,
                ..Default::default()
            },
        )?;
        retired = true;
        tracing::info!(item = %item_id, salience = updated.salience, "item retired as outdated");
    }

    if signal == FeedbackSignal::Duplicate {
        if let Some(canonical) = comment.and_then(named_canonical) {
            if canonical != *item_id {
                match add_link(conn, workspace, item_id, &canonical, LinkType::DuplicateOf) {
                    Ok(_) => {}
                    Err(MnemoError::NotFound(_)) | Err(MnemoError::Conflict(_)) => {
                        tracing::debug!(
                            item = %item_id,
                            canonical = %canonical,
                            "named canonical not linkable, feedback still recorded"
                        );
                    }
                    Err(e) => return Err(e),
                }
            }
        }
    }

    append_feedback(
        conn,
        &FeedbackRecord {
            workspace: workspace.to_string(),
            item_id: item_id.clone(),
            signal,
            magnitude,
            at: Utc::now(),
            actor: actor.map(String::from),
        },
    )?;

    Ok(FeedbackOutcome {
        previous_salience,
        new_salience: updated.salience,
        delta: updated.salience - previous_salience,
        retired,
    })
}

/// First item id named in a duplicate-feedback comment
fn named_canonical(comment: &str) -> Option<ItemId> {
    ITEM_REF
        .captures(comment)
        .and_then(|caps| caps[1].parse().ok())
}
