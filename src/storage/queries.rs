//! Database queries for memory operations
//!
//! Every function takes a `&Connection` and scopes each statement by
//! `workspace_id`, so a caller holding ids from another workspace observes
//! them as missing rather than as foreign data.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::{HashMap, HashSet};

use crate::error::{MnemoError, Result};
use crate::types::{
    item_content_hash, truncate_graphemes, Artifact, ContentType, CreateItemInput, FeedbackRecord,
    IdPrefix, ItemId, ItemKind, ItemMutation, ItemState, ItemSubtype, Link, LinkType, MemoryItem,
    WorkspaceStats, MAX_SUMMARY_GRAPHEMES,
};

use super::vectors::SearchFilter;

fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn parse_item_id(raw: &str) -> rusqlite::Result<ItemId> {
    raw.parse().map_err(|e: String| {
        rusqlite::Error::FromSqlConversionFailure(
            0,
            rusqlite::types::Type::Text,
            Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, e)),
        )
    })
}

/// Mint the next identifier for `(workspace, prefix)`, strictly increasing
///
/// Call inside a transaction so the read-increment pair is atomic.
pub fn mint_id(conn: &Connection, workspace: &str, prefix: IdPrefix) -> Result<ItemId> {
    conn.execute(
        "INSERT OR IGNORE INTO id_counters (workspace_id, prefix, next_seq) VALUES (?1, ?2, 1)",
        params![workspace, prefix.as_str()],
    )?;
    let seq: i64 = conn.query_row(
        "SELECT next_seq FROM id_counters WHERE workspace_id = ?1 AND prefix = ?2",
        params![workspace, prefix.as_str()],
        |row| row.get(0),
    )?;
    conn.execute(
        "UPDATE id_counters SET next_seq = next_seq + 1
         WHERE workspace_id = ?1 AND prefix = ?2",
        params![workspace, prefix.as_str()],
    )?;
    Ok(ItemId::new(prefix, seq))
}

// ---------------------------------------------------------------------------
// Artifacts
// ---------------------------------------------------------------------------

fn artifact_from_row(row: &Row) -> rusqlite::Result<Artifact> {
    let id: String = row.get("id")?;
    let content_type: String = row.get("content_type")?;
    let created_at: String = row.get("created_at")?;
    let content_hash: i64 = row.get("content_hash")?;

    Ok(Artifact {
        id: parse_item_id(&id)?,
        workspace: row.get("workspace_id")?,
        thread_id: row.get("thread_id")?,
        content_type: content_type.parse().unwrap_or(ContentType::Chat),
        body: row.get("body")?,
        content_hash: content_hash as u64,
        created_at: parse_timestamp(&created_at),
    })
}

/// Create an artifact, reusing an existing one with identical content
///
/// Artifacts are content-addressed within `(workspace, thread, type)`:
/// re-ingesting the same material returns the original artifact instead of
/// minting a new id. Returns the artifact and whether it was newly created.
pub fn create_artifact(
    conn: &Connection,
    workspace: &str,
    thread_id: &str,
    content_type: ContentType,
    body: &str,
) -> Result<(Artifact, bool)> {
    let hash = crate::types::content_hash(body);

    let existing = conn
        .query_row(
            "SELECT workspace_id, id, thread_id, content_type, body, content_hash, created_at
             FROM artifacts
             WHERE workspace_id = ?1 AND thread_id = ?2 AND content_type = ?3
               AND content_hash = ?4",
            params![workspace, thread_id, content_type.as_str(), hash as i64],
            artifact_from_row,
        )
        .optional()?;

    if let Some(artifact) = existing {
        return Ok((artifact, false));
    }

    let id = mint_id(conn, workspace, IdPrefix::Artifact)?;
    let now = Utc::now();
    conn.execute(
        "INSERT INTO artifacts (workspace_id, id, thread_id, content_type, body, content_hash, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            workspace,
            id.to_string(),
            thread_id,
            content_type.as_str(),
            body,
            hash as i64,
            now.to_rfc3339()
        ],
    )?;

    Ok((
        Artifact {
            id,
            workspace: workspace.to_string(),
            thread_id: thread_id.to_string(),
            content_type,
            body: body.to_string(),
            content_hash: hash,
            created_at: now,
        },
        true,
    ))
}

pub fn get_artifact(conn: &Connection, workspace: &str, id: &ItemId) -> Result<Artifact> {
    conn.query_row(
        "SELECT workspace_id, id, thread_id, content_type, body, content_hash, created_at
         FROM artifacts WHERE workspace_id = ?1 AND id = ?2",
        params![workspace, id.to_string()],
        artifact_from_row,
    )
    .optional()?
    .ok_or_else(|| MnemoError::not_found(id))
}

// ---------------------------------------------------------------------------
// Items
// ---------------------------------------------------------------------------

/// Parse a memory item from a database row
pub fn item_from_row(row: &Row) -> rusqlite::Result<MemoryItem> {
    let id: String = row.get("id")?;
    let kind: String = row.get("kind")?;
    let subtype: String = row.get("subtype")?;
    let state: String = row.get("state")?;
    let created_at: String = row.get("created_at")?;
    let last_accessed_at: String = row.get("last_accessed_at")?;
    let retired_at: Option<String> = row.get("retired_at")?;
    let payload_json: String = row.get("payload_json")?;
    let source_artifact_id: String = row.get("source_artifact_id")?;
    let content_hash: i64 = row.get("content_hash")?;

    let payload: HashMap<String, serde_json::Value> =
        serde_json::from_str(&payload_json).unwrap_or_default();

    Ok(MemoryItem {
        id: parse_item_id(&id)?,
        workspace: row.get("workspace_id")?,
        thread_id: row.get("thread_id")?,
        kind: kind.parse().unwrap_or(ItemKind::Semantic),
        subtype: subtype.parse().unwrap_or(ItemSubtype::Entity),
        summary: row.get("summary")?,
        body: row.get("body")?,
        salience: row.get("salience")?,
        usage_count: row.get("usage_count")?,
        created_at: parse_timestamp(&created_at),
        last_accessed_at: parse_timestamp(&last_accessed_at),
        retired_at: retired_at.map(|s| parse_timestamp(&s)),
        state: state.parse().unwrap_or(ItemState::Active),
        payload,
        source_artifact_id: parse_item_id(&source_artifact_id)?,
        source_span: (row.get("source_span_start")?, row.get("source_span_end")?),
        content_hash: content_hash as u64,
        embedding_model_id: row.get("embedding_model_id")?,
    })
}

const ITEM_COLUMNS: &str = "workspace_id, id, seq, thread_id, kind, subtype, summary, body,
    salience, usage_count, created_at, last_accessed_at, retired_at, state,
    payload_json, source_artifact_id, source_span_start, source_span_end,
    content_hash, embedding_model_id";

/// Create a new memory item, minting its identifier
///
/// Creation counts as the item's first use, so `usage_count` starts at 1.
pub fn create_item(conn: &Connection, input: &CreateItemInput) -> Result<MemoryItem> {
    let kind = input.subtype.kind();
    let id = mint_id(conn, &input.workspace, kind.id_prefix())?;
    let now = Utc::now();

    let summary = truncate_graphemes(&input.summary, MAX_SUMMARY_GRAPHEMES);
    let salience = input.salience.clamp(0.0, 1.0);
    let hash = item_content_hash(&summary, &input.body);
    let payload_json = serde_json::to_string(&input.payload)?;

    conn.execute(
        "INSERT INTO items (workspace_id, id, seq, thread_id, kind, subtype, summary, body,
            salience, usage_count, created_at, last_accessed_at, state, payload_json,
            source_artifact_id, source_span_start, source_span_end, content_hash,
            embedding_model_id)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 1, ?10, ?10, 'active', ?11, ?12, ?13, ?14, ?15, ?16)",
        params![
            input.workspace,
            id.to_string(),
            id.seq,
            input.thread_id,
            kind.as_str(),
            input.subtype.as_str(),
            summary,
            input.body,
            salience,
            now.to_rfc3339(),
            payload_json,
            input.source_artifact_id.to_string(),
            input.source_span.0,
            input.source_span.1,
            hash as i64,
            input.embedding_model_id,
        ],
    )?;

    Ok(MemoryItem {
        id,
        workspace: input.workspace.clone(),
        thread_id: input.thread_id.clone(),
        kind,
        subtype: input.subtype,
        summary,
        body: input.body.clone(),
        salience,
        usage_count: 1,
        created_at: now,
        last_accessed_at: now,
        retired_at: None,
        state: ItemState::Active,
        payload: input.payload.clone(),
        source_artifact_id: input.source_artifact_id.clone(),
        source_span: input.source_span,
        content_hash: hash,
        embedding_model_id: input.embedding_model_id.clone(),
    })
}

fn get_item_opt(conn: &Connection, workspace: &str, id: &ItemId) -> Result<Option<MemoryItem>> {
    let mut stmt = conn.prepare_cached(&format!(
        "SELECT {} FROM items WHERE workspace_id = ?1 AND id = ?2",
        ITEM_COLUMNS
    ))?;
    Ok(stmt
        .query_row(params![workspace, id.to_string()], item_from_row)
        .optional()?)
}

/// Fetch a single item; a cross-workspace id reads as missing
pub fn get_item(conn: &Connection, workspace: &str, id: &ItemId) -> Result<MemoryItem> {
    get_item_opt(conn, workspace, id)?.ok_or_else(|| MnemoError::not_found(id))
}

/// Fetch items by id, preserving input order; missing ids are omitted
pub fn get_items(conn: &Connection, workspace: &str, ids: &[ItemId]) -> Result<Vec<MemoryItem>> {
    let mut items = Vec::with_capacity(ids.len());
    for id in ids {
        if let Some(item) = get_item_opt(conn, workspace, id)? {
            items.push(item);
        }
    }
    Ok(items)
}

/// Look up an item by content hash (exact-duplicate detection)
pub fn find_item_by_hash(
    conn: &Connection,
    workspace: &str,
    hash: u64,
) -> Result<Option<MemoryItem>> {
    let mut stmt = conn.prepare_cached(&format!(
        "SELECT {} FROM items
         WHERE workspace_id = ?1 AND content_hash = ?2 AND retired_at IS NULL
         ORDER BY seq LIMIT 1",
        ITEM_COLUMNS
    ))?;
    Ok(stmt
        .query_row(params![workspace, hash as i64], item_from_row)
        .optional()?)
}

/// Apply a typed mutation to an item, atomically
///
/// Delta mutations saturate at bounds. A body change recomputes the content
/// hash and clears `embedding_model_id` so the backfill worker re-embeds.
pub fn update_item(
    conn: &Connection,
    workspace: &str,
    id: &ItemId,
    mutation: &ItemMutation,
) -> Result<MemoryItem> {
    let mut item = get_item(conn, workspace, id)?;
    let mut content_changed = false;

    if let Some(summary) = &mutation.summary {
        let truncated = truncate_graphemes(summary, MAX_SUMMARY_GRAPHEMES);
        if truncated != item.summary {
            item.summary = truncated;
            content_changed = true;
        }
    }
    if let Some(body) = &mutation.body {
        if body != &item.body {
            item.body = body.clone();
            content_changed = true;
            item.embedding_model_id = None;
        }
    }
    if content_changed {
        item.content_hash = item_content_hash(&item.summary, &item.body);
    }
    if let Some(delta) = mutation.salience_delta {
        item.salience = (item.salience + delta).clamp(0.0, 1.0);
    }
    if let Some(increment) = mutation.usage_increment {
        item.usage_count = (item.usage_count + increment).max(0);
    }
    if let Some(merge) = &mutation.payload_merge {
        for (k, v) in merge {
            item.payload.insert(k.clone(), v.clone());
        }
    }
    if mutation.retired && item.retired_at.is_none() {
        item.retired_at = Some(Utc::now());
        item.state = ItemState::Retired;
    }

    let payload_json = serde_json::to_string(&item.payload)?;
    conn.execute(
        "UPDATE items SET summary = ?3, body = ?4, salience = ?5, usage_count = ?6,
            retired_at = ?7, state = ?8, payload_json = ?9, content_hash = ?10,
            embedding_model_id = ?11
         WHERE workspace_id = ?1 AND id = ?2",
        params![
            workspace,
            id.to_string(),
            item.summary,
            item.body,
            item.salience,
            item.usage_count,
            item.retired_at.map(|t| t.to_rfc3339()),
            item.state.as_str(),
            payload_json,
            item.content_hash as i64,
            item.embedding_model_id,
        ],
    )?;

    Ok(item)
}

/// Refresh `last_accessed_at` on a set of items
pub fn touch_items(conn: &Connection, workspace: &str, ids: &[ItemId]) -> Result<()> {
    let now = Utc::now().to_rfc3339();
    let mut stmt = conn.prepare_cached(
        "UPDATE items SET last_accessed_at = ?3 WHERE workspace_id = ?1 AND id = ?2",
    )?;
    for id in ids {
        stmt.execute(params![workspace, id.to_string(), now])?;
    }
    Ok(())
}

/// Reverse-chronological listing used as the ranker's backfill path
pub fn list_candidates(
    conn: &Connection,
    workspace: &str,
    filter: &SearchFilter,
    limit: usize,
) -> Result<Vec<MemoryItem>> {
    let (conditions, mut sql_params) = filter.sql_conditions();
    sql_params.insert(0, Box::new(workspace.to_string()));

    let sql = format!(
        "SELECT {} FROM items i WHERE i.workspace_id = ?1{} ORDER BY i.created_at DESC, i.seq DESC LIMIT {}",
        ITEM_COLUMNS, conditions, limit
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(
        rusqlite::params_from_iter(sql_params.iter().map(|p| p.as_ref())),
        item_from_row,
    )?;

    let mut items = Vec::new();
    for row in rows {
        items.push(row?);
    }
    Ok(items)
}

// ---------------------------------------------------------------------------
// Links
// ---------------------------------------------------------------------------

fn insert_link(
    conn: &Connection,
    workspace: &str,
    from: &ItemId,
    to: &ItemId,
    link_type: LinkType,
) -> Result<Link> {
    let now = Utc::now();
    conn.execute(
        "INSERT OR IGNORE INTO links (workspace_id, from_id, to_id, type, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            workspace,
            from.to_string(),
            to.to_string(),
            link_type.as_str(),
            now.to_rfc3339()
        ],
    )?;
    Ok(Link {
        workspace: workspace.to_string(),
        from_id: from.clone(),
        to_id: to.clone(),
        link_type,
        created_at: now,
    })
}

/// Outgoing `duplicate_of` target of an item, if any
fn canonical_of(conn: &Connection, workspace: &str, id: &ItemId) -> Result<Option<ItemId>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT to_id FROM links
             WHERE workspace_id = ?1 AND from_id = ?2 AND type = 'duplicate_of' LIMIT 1",
            params![workspace, id.to_string()],
            |row| row.get(0),
        )
        .optional()?;
    match raw {
        Some(s) => Ok(Some(s.parse().map_err(MnemoError::Internal)?)),
        None => Ok(None),
    }
}

fn supersedes_targets(conn: &Connection, workspace: &str, id: &ItemId) -> Result<Vec<ItemId>> {
    let mut stmt = conn.prepare_cached(
        "SELECT to_id FROM links WHERE workspace_id = ?1 AND from_id = ?2 AND type = 'supersedes'",
    )?;
    let rows = stmt.query_map(params![workspace, id.to_string()], |row| {
        row.get::<_, String>(0)
    })?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?.parse().map_err(MnemoError::Internal)?);
    }
    Ok(out)
}

/// Add a typed link, enforcing the link invariants
///
/// - `duplicate_of`: chains resolve to the canonical item on write, and any
///   existing pointers at the newly-deduplicated item are re-pointed, so
///   chains never exceed length 1
/// - `supersedes`: rejected if it would close a cycle or give the target a
///   second superseder; the target transitions to `superseded`
pub fn add_link(
    conn: &Connection,
    workspace: &str,
    from: &ItemId,
    to: &ItemId,
    link_type: LinkType,
) -> Result<Link> {
    if from == to {
        return Err(MnemoError::Conflict(format!(
            "{} link from {} to itself",
            link_type.as_str(),
            from
        )));
    }
    // Both endpoints must exist in this workspace
    get_item(conn, workspace, from)?;
    get_item(conn, workspace, to)?;

    match link_type {
        LinkType::DuplicateOf => {
            let canonical = canonical_of(conn, workspace, to)?.unwrap_or_else(|| to.clone());
            if canonical == *from {
                return Err(MnemoError::Conflict(format!(
                    "{} is the canonical item for {}",
                    from, to
                )));
            }
            let link = insert_link(conn, workspace, from, &canonical, LinkType::DuplicateOf)?;

            // Re-point items that considered `from` canonical
            let mut stmt = conn.prepare_cached(
                "SELECT from_id FROM links
                 WHERE workspace_id = ?1 AND to_id = ?2 AND type = 'duplicate_of'",
            )?;
            let dependents: Vec<String> = stmt
                .query_map(params![workspace, from.to_string()], |row| row.get(0))?
                .collect::<rusqlite::Result<_>>()?;
            for dependent in dependents {
                conn.execute(
                    "DELETE FROM links
                     WHERE workspace_id = ?1 AND from_id = ?2 AND to_id = ?3 AND type = 'duplicate_of'",
                    params![workspace, dependent, from.to_string()],
                )?;
                if dependent != canonical.to_string() {
                    conn.execute(
                        "INSERT OR IGNORE INTO links (workspace_id, from_id, to_id, type, created_at)
                         VALUES (?1, ?2, ?3, 'duplicate_of', ?4)",
                        params![
                            workspace,
                            dependent,
                            canonical.to_string(),
                            Utc::now().to_rfc3339()
                        ],
                    )?;
                }
            }
            Ok(link)
        }
        LinkType::Supersedes => {
            let existing: i64 = conn.query_row(
                "SELECT COUNT(*) FROM links
                 WHERE workspace_id = ?1 AND to_id = ?2 AND type = 'supersedes'",
                params![workspace, to.to_string()],
                |row| row.get(0),
            )?;
            if existing > 0 {
                return Err(MnemoError::Conflict(format!(
                    "{} already has a superseder",
                    to
                )));
            }

            // Walk the supersedes relation from `to`; reaching `from` would
            // close a cycle
            let mut stack = vec![to.clone()];
            let mut seen: HashSet<ItemId> = HashSet::new();
            while let Some(current) = stack.pop() {
                if current == *from {
                    return Err(MnemoError::Conflict(format!(
                        "supersedes cycle between {} and {}",
                        from, to
                    )));
                }
                for next in supersedes_targets(conn, workspace, &current)? {
                    if seen.insert(next.clone()) {
                        stack.push(next);
                    }
                }
            }

            let link = insert_link(conn, workspace, from, to, LinkType::Supersedes)?;
            conn.execute(
                "UPDATE items SET state = 'superseded'
                 WHERE workspace_id = ?1 AND id = ?2 AND state = 'active'",
                params![workspace, to.to_string()],
            )?;
            Ok(link)
        }
        LinkType::RefersTo | LinkType::CausedBy => {
            insert_link(conn, workspace, from, to, link_type)
        }
    }
}

/// Links originating at an item
pub fn links_from(conn: &Connection, workspace: &str, id: &ItemId) -> Result<Vec<Link>> {
    let mut stmt = conn.prepare_cached(
        "SELECT from_id, to_id, type, created_at FROM links
         WHERE workspace_id = ?1 AND from_id = ?2 ORDER BY created_at",
    )?;
    let rows = stmt.query_map(params![workspace, id.to_string()], |row| {
        let from_id: String = row.get(0)?;
        let to_id: String = row.get(1)?;
        let link_type: String = row.get(2)?;
        let created_at: String = row.get(3)?;
        Ok((from_id, to_id, link_type, created_at))
    })?;

    let mut links = Vec::new();
    for row in rows {
        let (from_id, to_id, link_type, created_at) = row?;
        links.push(Link {
            workspace: workspace.to_string(),
            from_id: from_id.parse().map_err(MnemoError::Internal)?,
            to_id: to_id.parse().map_err(MnemoError::Internal)?,
            link_type: link_type
                .parse()
                .map_err(MnemoError::Internal)?,
            created_at: parse_timestamp(&created_at),
        });
    }
    Ok(links)
}

// ---------------------------------------------------------------------------
// Feedback journal
// ---------------------------------------------------------------------------

pub fn append_feedback(conn: &Connection, record: &FeedbackRecord) -> Result<()> {
    conn.execute(
        "INSERT INTO feedback (workspace_id, item_id, signal, magnitude, at, actor)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            record.workspace,
            record.item_id.to_string(),
            record.signal.as_str(),
            record.magnitude,
            record.at.to_rfc3339(),
            record.actor,
        ],
    )?;
    Ok(())
}

/// Number of journal entries for an item
pub fn feedback_count(conn: &Connection, workspace: &str, id: &ItemId) -> Result<i64> {
    Ok(conn.query_row(
        "SELECT COUNT(*) FROM feedback WHERE workspace_id = ?1 AND item_id = ?2",
        params![workspace, id.to_string()],
        |row| row.get(0),
    )?)
}

// ---------------------------------------------------------------------------
// Embedding backfill support
// ---------------------------------------------------------------------------

/// An item persisted without a vector
#[derive(Debug, Clone)]
pub struct PendingEmbedding {
    pub workspace: String,
    pub item_id: ItemId,
    pub summary: String,
    pub body: String,
    pub content_hash: u64,
}

/// Items awaiting (re-)embedding under the active model, oldest first
///
/// Covers both items persisted without a vector and items embedded under a
/// model that is no longer active.
pub fn list_pending_embeddings(
    conn: &Connection,
    active_model_id: &str,
    limit: usize,
) -> Result<Vec<PendingEmbedding>> {
    let mut stmt = conn.prepare_cached(
        "SELECT workspace_id, id, summary, body, content_hash FROM items
         WHERE (embedding_model_id IS NULL OR embedding_model_id != ?1)
           AND retired_at IS NULL
         ORDER BY created_at, seq LIMIT ?2",
    )?;
    let rows = stmt.query_map(params![active_model_id, limit as i64], |row| {
        let id: String = row.get(1)?;
        let hash: i64 = row.get(4)?;
        Ok((
            row.get::<_, String>(0)?,
            id,
            row.get::<_, String>(2)?,
            row.get::<_, String>(3)?,
            hash,
        ))
    })?;

    let mut out = Vec::new();
    for row in rows {
        let (workspace, id, summary, body, hash) = row?;
        out.push(PendingEmbedding {
            workspace,
            item_id: id.parse().map_err(MnemoError::Internal)?,
            summary,
            body,
            content_hash: hash as u64,
        });
    }
    Ok(out)
}

/// Record that an item's vector was produced by `model_id`
pub fn set_embedding_model(
    conn: &Connection,
    workspace: &str,
    id: &ItemId,
    model_id: &str,
) -> Result<()> {
    conn.execute(
        "UPDATE items SET embedding_model_id = ?3 WHERE workspace_id = ?1 AND id = ?2",
        params![workspace, id.to_string(), model_id],
    )?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Stats
// ---------------------------------------------------------------------------

pub fn workspace_stats(conn: &Connection, workspace: &str) -> Result<WorkspaceStats> {
    let count = |sql: &str| -> Result<i64> {
        Ok(conn.query_row(sql, params![workspace], |row| row.get(0))?)
    };

    Ok(WorkspaceStats {
        workspace: workspace.to_string(),
        semantic_count: count(
            "SELECT COUNT(*) FROM items WHERE workspace_id = ?1 AND kind = 'semantic'",
        )?,
        episodic_count: count(
            "SELECT COUNT(*) FROM items WHERE workspace_id = ?1 AND kind = 'episodic'",
        )?,
        active_count: count(
            "SELECT COUNT(*) FROM items WHERE workspace_id = ?1 AND state = 'active'",
        )?,
        superseded_count: count(
            "SELECT COUNT(*) FROM items WHERE workspace_id = ?1 AND state = 'superseded'",
        )?,
        retired_count: count(
            "SELECT COUNT(*) FROM items WHERE workspace_id = ?1 AND state = 'retired'",
        )?,
        artifact_count: count("SELECT COUNT(*) FROM artifacts WHERE workspace_id = ?1")?,
        pending_embedding_count: count(
            "SELECT COUNT(*) FROM items
             WHERE workspace_id = ?1 AND embedding_model_id IS NULL AND retired_at IS NULL",
        )?,
    })
}
