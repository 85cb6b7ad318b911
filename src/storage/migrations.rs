//! Database migrations

use rusqlite::Connection;

use crate::error::Result;

/// Current schema version
pub const SCHEMA_VERSION: i32 = 1;

/// Run all migrations
pub fn run_migrations(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    let current_version: i32 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_version",
            [],
            |row| row.get(0),
        )
        .unwrap_or(0);

    if current_version < SCHEMA_VERSION {
        migrate_v1(conn)?;
    }

    Ok(())
}

/// Initial schema (v1)
fn migrate_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        -- Monotonic identifier minting per (workspace, prefix)
        CREATE TABLE IF NOT EXISTS id_counters (
            workspace_id TEXT NOT NULL,
            prefix TEXT NOT NULL,
            next_seq INTEGER NOT NULL DEFAULT 1,
            PRIMARY KEY (workspace_id, prefix)
        );

        -- Immutable raw source materials
        CREATE TABLE IF NOT EXISTS artifacts (
            workspace_id TEXT NOT NULL,
            id TEXT NOT NULL,
            thread_id TEXT NOT NULL,
            content_type TEXT NOT NULL,
            body TEXT NOT NULL,
            content_hash INTEGER NOT NULL,
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
            PRIMARY KEY (workspace_id, id)
        );

        -- Memory items (semantic + episodic share the envelope)
        CREATE TABLE IF NOT EXISTS items (
            workspace_id TEXT NOT NULL,
            id TEXT NOT NULL,
            seq INTEGER NOT NULL,
            thread_id TEXT NOT NULL,
            kind TEXT NOT NULL,
            subtype TEXT NOT NULL,
            summary TEXT NOT NULL,
            body TEXT NOT NULL,
            salience REAL NOT NULL DEFAULT 0.5,
            usage_count INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
            last_accessed_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
            retired_at TEXT,
            state TEXT NOT NULL DEFAULT 'active',
            payload_json TEXT NOT NULL DEFAULT '{}',
            source_artifact_id TEXT NOT NULL,
            source_span_start INTEGER NOT NULL DEFAULT 0,
            source_span_end INTEGER NOT NULL DEFAULT 0,
            content_hash INTEGER NOT NULL,
            embedding_model_id TEXT,
            PRIMARY KEY (workspace_id, id)
        );

        -- Typed directed edges between items
        CREATE TABLE IF NOT EXISTS links (
            workspace_id TEXT NOT NULL,
            from_id TEXT NOT NULL,
            to_id TEXT NOT NULL,
            type TEXT NOT NULL,
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
            UNIQUE (workspace_id, from_id, to_id, type)
        );

        -- Item vectors; one row per (item, model)
        CREATE TABLE IF NOT EXISTS vectors (
            workspace_id TEXT NOT NULL,
            item_id TEXT NOT NULL,
            model_id TEXT NOT NULL,
            vector BLOB NOT NULL,
            dimensions INTEGER NOT NULL,
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
            PRIMARY KEY (workspace_id, item_id, model_id)
        );

        -- Append-only feedback journal
        CREATE TABLE IF NOT EXISTS feedback (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            workspace_id TEXT NOT NULL,
            item_id TEXT NOT NULL,
            signal TEXT NOT NULL,
            magnitude REAL NOT NULL,
            at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
            actor TEXT
        );

        -- Indexes
        CREATE INDEX IF NOT EXISTS idx_items_thread
            ON items(workspace_id, thread_id, created_at);
        CREATE INDEX IF NOT EXISTS idx_items_hash
            ON items(workspace_id, content_hash);
        CREATE INDEX IF NOT EXISTS idx_items_seq
            ON items(workspace_id, kind, seq);
        CREATE INDEX IF NOT EXISTS idx_artifacts_hash
            ON artifacts(workspace_id, thread_id, content_hash);
        CREATE INDEX IF NOT EXISTS idx_links_from
            ON links(workspace_id, from_id);
        CREATE INDEX IF NOT EXISTS idx_links_to
            ON links(workspace_id, to_id);
        CREATE INDEX IF NOT EXISTS idx_vectors_model
            ON vectors(workspace_id, model_id);
        CREATE INDEX IF NOT EXISTS idx_feedback_item
            ON feedback(workspace_id, item_id);

        -- Record migration
        INSERT INTO schema_version (version) VALUES (1);
        "#,
    )?;

    Ok(())
}
