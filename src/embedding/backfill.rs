//! Embedding backfill worker
//!
//! Items persisted while the provider was unavailable (or whose body later
//! changed) carry no vector and are excluded from similarity retrieval.
//! This worker drains them in batches: on a nudge from ingestion, and on a
//! periodic tick as a catch-all.

use async_channel::{bounded, Receiver, Sender};
use std::time::Duration;

use crate::error::Result;
use crate::storage::queries::{list_pending_embeddings, set_embedding_model};
use crate::storage::{vectors, Storage};

use super::EmbedderGateway;

/// Default pending items fetched per pass
const DEFAULT_BATCH_SIZE: usize = 64;

/// Default tick between unsolicited scans
const DEFAULT_INTERVAL: Duration = Duration::from_secs(30);

/// Background worker re-embedding pending items
pub struct EmbeddingBackfill {
    storage: Storage,
    gateway: EmbedderGateway,
    nudge_tx: Sender<()>,
    nudge_rx: Receiver<()>,
    batch_size: usize,
    interval: Duration,
}

impl EmbeddingBackfill {
    pub fn new(storage: Storage, gateway: EmbedderGateway) -> Self {
        let (nudge_tx, nudge_rx) = bounded(1024);
        Self {
            storage,
            gateway,
            nudge_tx,
            nudge_rx,
            batch_size: DEFAULT_BATCH_SIZE,
            interval: DEFAULT_INTERVAL,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Sender used to wake the worker after an ingestion left items pending
    pub fn notifier(&self) -> Sender<()> {
        self.nudge_tx.clone()
    }

    /// One backfill pass; returns how many items received vectors
    pub async fn backfill_once(&self) -> Result<usize> {
        let model = self.gateway.model_id().to_string();
        let pending = self
            .storage
            .with_connection(|conn| list_pending_embeddings(conn, &model, self.batch_size))?;
        if pending.is_empty() {
            return Ok(0);
        }

        let texts: Vec<String> = pending
            .iter()
            .map(|p| format!("{}\n{}", p.summary, p.body))
            .collect();
        let inputs: Vec<(u64, &str)> = pending
            .iter()
            .zip(&texts)
            .map(|(p, t)| (p.content_hash, t.as_str()))
            .collect();

        let embeddings = self.gateway.embed_hashed(&inputs, None).await?;

        let mut resolved = 0;
        self.storage.with_transaction(|conn| {
            for (item, embedding) in pending.iter().zip(&embeddings) {
                if let Some(vector) = embedding {
                    vectors::upsert_vector(conn, &item.workspace, &item.item_id, vector, &model)?;
                    set_embedding_model(conn, &item.workspace, &item.item_id, &model)?;
                    resolved += 1;
                }
            }
            Ok(())
        })?;

        Ok(resolved)
    }

    /// Run the worker loop (call in a spawned task)
    pub async fn run(&self) {
        let mut tick = tokio::time::interval(self.interval);
        loop {
            tokio::select! {
                _ = self.nudge_rx.recv() => {}
                _ = tick.tick() => {}
            }

            loop {
                match self.backfill_once().await {
                    Ok(0) => break,
                    Ok(resolved) => {
                        tracing::info!(resolved, "embedding backfill pass complete");
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "embedding backfill pass failed");
                        break;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashEmbedder;
    use crate::storage::queries::{create_item, get_item};
    use crate::types::{CreateItemInput, EmbeddingConfig, IdPrefix, ItemId, ItemSubtype};
    use std::collections::HashMap;
    use std::sync::Arc;

    fn pending_item(storage: &Storage, workspace: &str, summary: &str) -> ItemId {
        storage
            .with_transaction(|conn| {
                let item = create_item(
                    conn,
                    &CreateItemInput {
                        workspace: workspace.to_string(),
                        thread_id: "t1".to_string(),
                        subtype: ItemSubtype::Task,
                        summary: summary.to_string(),
                        body: summary.to_string(),
                        salience: 0.6,
                        payload: HashMap::new(),
                        source_artifact_id: ItemId::new(IdPrefix::Artifact, 1),
                        source_span: (0, 0),
                        embedding_model_id: None,
                    },
                )?;
                Ok(item.id)
            })
            .unwrap()
    }

    #[tokio::test]
    async fn test_backfill_resolves_pending_items() {
        let storage = Storage::open_in_memory().unwrap();
        let config = EmbeddingConfig {
            dimensions: 64,
            ..Default::default()
        };
        let gateway = EmbedderGateway::new(Arc::new(HashEmbedder::new(64)), &config);
        let backfill = EmbeddingBackfill::new(storage.clone(), gateway);

        let a = pending_item(&storage, "w", "first pending item");
        let b = pending_item(&storage, "other", "second pending item");

        let resolved = backfill.backfill_once().await.unwrap();
        assert_eq!(resolved, 2);

        for (workspace, id) in [("w", &a), ("other", &b)] {
            let item = storage
                .with_connection(|conn| get_item(conn, workspace, id))
                .unwrap();
            assert_eq!(item.embedding_model_id.as_deref(), Some("hash-v1"));
        }

        assert_eq!(backfill.backfill_once().await.unwrap(), 0, "nothing left");
    }
}
