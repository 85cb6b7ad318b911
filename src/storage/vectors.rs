//! Per-workspace vector index
//!
//! Stores one vector per `(item, model)` pair and answers nearest-neighbor
//! queries by cosine similarity. Only vectors recorded under the active
//! model id participate in a search; ties at equal similarity break by
//! ascending item identifier, and `k` is hard-capped per call.
//!
//! Vectors are encoded as little-endian f32 blobs.

use rusqlite::{params, Connection, ToSql};

use crate::embedding::cosine_similarity;
use crate::error::{MnemoError, Result};
use crate::types::{ItemId, ItemKind, ItemSubtype};

/// Hard cap on `k` per search call
pub const TOPK_CAP: usize = 256;

/// Restrictions applied to both vector search and the chronological
/// candidate listing
#[derive(Debug, Clone, Default)]
pub struct SearchFilter {
    /// Restrict to a single thread
    pub thread_id: Option<String>,
    /// Restrict to these kinds
    pub include_kinds: Option<Vec<ItemKind>>,
    /// Drop these subtypes
    pub exclude_subtypes: Vec<ItemSubtype>,
    /// Include retired items (excluded by default)
    pub include_retired: bool,
}

impl SearchFilter {
    /// Render as SQL conditions over an `items` table aliased `i`.
    ///
    /// Parameter placeholders continue from `?2` (`?1` is the workspace).
    pub(crate) fn sql_conditions(&self) -> (String, Vec<Box<dyn ToSql>>) {
        let mut conditions = String::new();
        let mut params: Vec<Box<dyn ToSql>> = Vec::new();
        let mut next_param = 2;

        if let Some(thread) = &self.thread_id {
            conditions.push_str(&format!(" AND i.thread_id = ?{}", next_param));
            params.push(Box::new(thread.clone()));
            next_param += 1;
        }
        if let Some(kinds) = &self.include_kinds {
            let placeholders: Vec<String> = kinds
                .iter()
                .map(|_| {
                    let p = format!("?{}", next_param);
                    next_param += 1;
                    p
                })
                .collect();
            conditions.push_str(&format!(" AND i.kind IN ({})", placeholders.join(", ")));
            for kind in kinds {
                params.push(Box::new(kind.as_str().to_string()));
            }
        }
        for subtype in &self.exclude_subtypes {
            conditions.push_str(&format!(" AND i.subtype != ?{}", next_param));
            params.push(Box::new(subtype.as_str().to_string()));
            next_param += 1;
        }
        if !self.include_retired {
            conditions.push_str(" AND i.state != 'retired'");
        }

        (conditions, params)
    }
}

/// Encode a vector as a little-endian f32 blob
pub fn vector_to_blob(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|f| f.to_le_bytes()).collect()
}

/// Decode a little-endian f32 blob
pub fn blob_to_vector(bytes: &[u8]) -> Result<Vec<f32>> {
    if bytes.len() % 4 != 0 {
        return Err(MnemoError::Internal(format!(
            "vector blob length {} not a multiple of 4",
            bytes.len()
        )));
    }
    let mut vector = Vec::with_capacity(bytes.len() / 4);
    for chunk in bytes.chunks_exact(4) {
        let arr: [u8; 4] = chunk.try_into().expect("chunks_exact yields 4 bytes");
        vector.push(f32::from_le_bytes(arr));
    }
    Ok(vector)
}

/// Insert or replace the vector for `(workspace, item, model)`
pub fn upsert_vector(
    conn: &Connection,
    workspace: &str,
    item_id: &ItemId,
    vector: &[f32],
    model_id: &str,
) -> Result<()> {
    if vector.is_empty() {
        return Err(MnemoError::InvalidInput("empty vector".to_string()));
    }
    conn.execute(
        "INSERT OR REPLACE INTO vectors (workspace_id, item_id, model_id, vector, dimensions, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            workspace,
            item_id.to_string(),
            model_id,
            vector_to_blob(vector),
            vector.len() as i64,
            chrono::Utc::now().to_rfc3339(),
        ],
    )?;
    Ok(())
}

/// Remove all vectors for an item
pub fn delete_vectors(conn: &Connection, workspace: &str, item_id: &ItemId) -> Result<()> {
    conn.execute(
        "DELETE FROM vectors WHERE workspace_id = ?1 AND item_id = ?2",
        params![workspace, item_id.to_string()],
    )?;
    Ok(())
}

/// Nearest neighbors of `query` by cosine similarity, descending
///
/// Returns at most `min(k, TOPK_CAP)` pairs. Vectors stored under other
/// model ids or with a different dimension are skipped.
pub fn search(
    conn: &Connection,
    workspace: &str,
    query: &[f32],
    k: usize,
    filter: &SearchFilter,
    model_id: &str,
) -> Result<Vec<(ItemId, f32)>> {
    let k = k.min(TOPK_CAP);
    if k == 0 || query.is_empty() {
        return Ok(vec![]);
    }

    let (conditions, extra_params) = filter.sql_conditions();
    // Shift filter placeholders past ?1 (workspace) and the model id, which
    // we bind last to keep the filter's numbering intact
    let sql = format!(
        "SELECT i.id, v.vector FROM vectors v
         JOIN items i ON i.workspace_id = v.workspace_id AND i.id = v.item_id
         WHERE v.workspace_id = ?1{} AND v.model_id = ?{}",
        conditions,
        2 + extra_params.len()
    );

    let mut all_params: Vec<Box<dyn ToSql>> = Vec::with_capacity(extra_params.len() + 2);
    all_params.push(Box::new(workspace.to_string()));
    all_params.extend(extra_params);
    all_params.push(Box::new(model_id.to_string()));

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(
        rusqlite::params_from_iter(all_params.iter().map(|p| p.as_ref())),
        |row| {
            let id: String = row.get(0)?;
            let blob: Vec<u8> = row.get(1)?;
            Ok((id, blob))
        },
    )?;

    let mut scored: Vec<(ItemId, f32)> = Vec::new();
    for row in rows {
        let (id, blob) = row?;
        let vector = blob_to_vector(&blob)?;
        if vector.len() != query.len() {
            continue;
        }
        let id: ItemId = id.parse().map_err(MnemoError::Internal)?;
        scored.push((id, cosine_similarity(query, &vector)));
    }

    scored.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.0.cmp(&b.0))
    });
    scored.truncate(k);
    Ok(scored)
}
