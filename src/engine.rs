//! Memory core engine
//!
//! Wires the pipeline together behind the public operations:
//! `ingest`, `recall`, `build_working_set`, `expand`, `feedback`, `stats`.
//!
//! Every operation is scoped to one workspace and honors a deadline.
//! Ingestion persists candidates one transaction at a time, so cancellation
//! keeps everything persisted so far; recall and working-set assembly are
//! all-or-nothing.

use chrono::Utc;
use dashmap::DashMap;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::consolidate::{consolidate_candidate, CandidateAction};
use crate::embedding::{Embedder, EmbedderGateway, EmbeddingBackfill};
use crate::error::{MnemoError, Result};
use crate::extract::{extract, Candidate};
use crate::feedback as feedback_ops;
use crate::rank::{rank, RankedItem};
use crate::redact::Redactor;
use crate::storage::queries::{
    create_artifact, get_artifact, get_item, get_items, list_candidates, touch_items, update_item,
    workspace_stats,
};
use crate::storage::vectors::{self, SearchFilter};
use crate::storage::Storage;
use crate::types::{
    content_hash, item_content_hash, normalize_workspace, Artifact, CoreConfig, ExpandForm,
    Expanded, FeedbackOutcome, FeedbackSignal, IngestResult, ItemId, ItemMutation, Materials,
    MemoryItem, RecallFilters, RecallResult, RecalledItem, RejectedCandidate, WorkspaceStats,
};
use crate::workingset::{WorkingSet, WorkingSetBuilder};

/// Per-item lock table entries are pruned once the table grows past this
const LOCK_TABLE_LIMIT: usize = 1024;

/// The context memory core
///
/// Process-wide shared state: the embedding cache inside the gateway and
/// the per-`(workspace, item)` write lock table.
pub struct MemoryCore {
    storage: Storage,
    gateway: EmbedderGateway,
    redactor: Redactor,
    builder: WorkingSetBuilder,
    config: CoreConfig,
    locks: DashMap<(String, String), Arc<Mutex<()>>>,
}

impl MemoryCore {
    pub fn new(storage: Storage, embedder: Arc<dyn Embedder>, config: CoreConfig) -> Result<Self> {
        config
            .rank
            .weights
            .validate()
            .map_err(MnemoError::Config)?;
        if embedder.dimensions() != config.embedding.dimensions {
            return Err(MnemoError::Config(format!(
                "embedder dimension {} does not match configured {}",
                embedder.dimensions(),
                config.embedding.dimensions
            )));
        }

        let redactor = Redactor::new(&config.redaction_patterns)?;
        let gateway = EmbedderGateway::new(embedder, &config.embedding);
        let builder = WorkingSetBuilder::new(config.working_set.clone());

        Ok(Self {
            storage,
            gateway,
            redactor,
            builder,
            config,
            locks: DashMap::new(),
        })
    }

    /// A backfill worker bound to this core's storage and gateway
    pub fn backfill_worker(&self) -> EmbeddingBackfill {
        EmbeddingBackfill::new(self.storage.clone(), self.gateway.clone())
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    // -----------------------------------------------------------------------
    // Ingest
    // -----------------------------------------------------------------------

    /// Distill raw materials into memory items
    ///
    /// Redacts, extracts, embeds (bounded concurrency), then consolidates
    /// candidates strictly in order, each in its own transaction. On
    /// deadline expiry the result carries everything persisted so far with
    /// `cancelled = true`.
    pub async fn ingest(
        &self,
        workspace: &str,
        thread_id: &str,
        materials: &Materials,
        deadline: Option<Duration>,
    ) -> Result<IngestResult> {
        let workspace = self.workspace(workspace)?;
        if materials.is_empty() {
            return Err(MnemoError::InvalidInput(
                "at least one of chat, diffs, logs must be present".to_string(),
            ));
        }
        if thread_id.trim().is_empty() {
            return Err(MnemoError::InvalidInput("thread_id must not be empty".to_string()));
        }
        let deadline_at = Instant::now() + deadline.unwrap_or(self.config.timeouts.ingest);

        let mut result = IngestResult::default();
        let mut work: Vec<(ItemId, Candidate)> = Vec::new();

        for (content_type, raw) in materials.entries() {
            let redacted = self.redactor.redact(raw);
            let artifact = self.storage.with_transaction(|conn| {
                let (artifact, created) =
                    create_artifact(conn, &workspace, thread_id, content_type, &redacted)?;
                if created {
                    tracing::info!(
                        workspace = %workspace,
                        artifact = %artifact.id,
                        content_type = content_type.as_str(),
                        "artifact created"
                    );
                }
                Ok(artifact)
            })?;
            result.artifact_ids.push(artifact.id.clone());
            for candidate in extract(&artifact) {
                work.push((artifact.id.clone(), candidate));
            }
        }

        // Embed all candidates up front; unresolved inputs stay pending and
        // never block ingestion
        let texts: Vec<String> = work
            .iter()
            .map(|(_, c)| format!("{}\n{}", c.summary, c.body))
            .collect();
        let hashed: Vec<(u64, &str)> = work
            .iter()
            .zip(&texts)
            .map(|((_, c), t)| (item_content_hash(&c.summary, &c.body), t.as_str()))
            .collect();
        let embeddings = match self.gateway.embed_hashed(&hashed, Some(deadline_at)).await {
            Ok(embeddings) => embeddings,
            Err(e) => {
                tracing::warn!(error = %e, "embedding unavailable, persisting items as pending");
                vec![None; work.len()]
            }
        };

        let model_id = self.gateway.model_id().to_string();
        let mut updated_seen: HashSet<ItemId> = HashSet::new();

        for (i, (artifact_id, candidate)) in work.iter().enumerate() {
            if Instant::now() >= deadline_at {
                result.cancelled = true;
                tracing::warn!(
                    workspace = %workspace,
                    processed = i,
                    total = work.len(),
                    "ingestion deadline expired, returning partial result"
                );
                break;
            }

            let embedding = embeddings[i].as_deref();
            let action = self.storage.with_transaction(|conn| {
                consolidate_candidate(
                    conn,
                    &self.config.consolidation,
                    &workspace,
                    thread_id,
                    artifact_id,
                    candidate,
                    embedding,
                    &model_id,
                )
            });

            match action {
                Ok(CandidateAction::Created(id)) => result.created_item_ids.push(id),
                Ok(CandidateAction::MergedInto(id))
                | Ok(CandidateAction::DroppedExactDuplicate(id)) => {
                    if updated_seen.insert(id.clone()) {
                        result.updated_item_ids.push(id);
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, summary = %candidate.summary, "candidate rejected");
                    result.rejected.push(RejectedCandidate {
                        summary: candidate.summary.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        tracing::info!(
            workspace = %workspace,
            thread = thread_id,
            created = result.created_item_ids.len(),
            updated = result.updated_item_ids.len(),
            rejected = result.rejected.len(),
            "ingestion complete"
        );
        Ok(result)
    }

    // -----------------------------------------------------------------------
    // Recall
    // -----------------------------------------------------------------------

    /// Recall memory relevant to a purpose under a token budget
    ///
    /// On deadline expiry the result is empty rather than partial.
    pub async fn recall(
        &self,
        workspace: &str,
        thread_id: &str,
        purpose: &str,
        token_budget: usize,
        filters: Option<RecallFilters>,
        deadline: Option<Duration>,
    ) -> Result<RecallResult> {
        let workspace = self.workspace(workspace)?;
        self.validate_purpose(purpose, token_budget)?;
        let timeout = deadline.unwrap_or(self.config.timeouts.recall);

        let recalled = tokio::time::timeout(
            timeout,
            self.do_recall(&workspace, thread_id, purpose, token_budget, filters),
        )
        .await;

        match recalled {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(workspace = %workspace, "recall deadline expired");
                Ok(RecallResult {
                    items: vec![],
                    tokens_used: 0,
                    tokens_available: token_budget,
                })
            }
        }
    }

    async fn do_recall(
        &self,
        workspace: &str,
        thread_id: &str,
        purpose: &str,
        token_budget: usize,
        filters: Option<RecallFilters>,
    ) -> Result<RecallResult> {
        let ranked = self
            .ranked_pool(workspace, thread_id, purpose, &filters.unwrap_or_default())
            .await?;

        let estimator = self.builder.estimator();
        let mut result = RecallResult {
            items: vec![],
            tokens_used: 0,
            tokens_available: token_budget,
        };

        for entry in &ranked {
            let cost = estimator.estimate(&entry.item.summary);
            if result.tokens_used + cost > token_budget {
                continue;
            }
            result.tokens_used += cost;
            result.items.push(RecalledItem {
                id: entry.item.id.clone(),
                kind: entry.item.kind,
                subtype: entry.item.subtype,
                summary: entry.item.summary.clone(),
                score: entry.score,
            });
        }
        result.tokens_available = token_budget - result.tokens_used;

        let ids: Vec<ItemId> = result.items.iter().map(|i| i.id.clone()).collect();
        self.storage
            .with_transaction(|conn| touch_items(conn, workspace, &ids))?;

        Ok(result)
    }

    /// Build the ranked candidate pool for a purpose
    async fn ranked_pool(
        &self,
        workspace: &str,
        thread_id: &str,
        purpose: &str,
        filters: &RecallFilters,
    ) -> Result<Vec<RankedItem>> {
        let filter = SearchFilter {
            thread_id: (!filters.cross_thread).then(|| thread_id.to_string()),
            include_kinds: filters.include_kinds.clone(),
            exclude_subtypes: filters.exclude_subtypes.clone().unwrap_or_default(),
            include_retired: filters.include_retired,
        };
        let pool_size = self
            .config
            .rank
            .pool_size
            .min(self.config.vector_index.topk_cap);

        let query = match self
            .gateway
            .embed_query(content_hash(purpose), purpose, None)
            .await
        {
            Ok(query) => query,
            Err(e) => {
                tracing::warn!(error = %e, "purpose embedding unavailable, falling back to chronological pool");
                None
            }
        };

        let mut pairs: Vec<(MemoryItem, Option<f32>)> = Vec::new();
        if let Some(query) = &query {
            let model_id = self.gateway.model_id().to_string();
            let hits = self.storage.with_connection(|conn| {
                vectors::search(conn, workspace, query, pool_size, &filter, &model_id)
            })?;
            let ids: Vec<ItemId> = hits.iter().map(|(id, _)| id.clone()).collect();
            let similarity: HashMap<ItemId, f32> = hits.into_iter().collect();
            let items = self
                .storage
                .with_connection(|conn| get_items(conn, workspace, &ids))?;
            for item in items {
                let sim = similarity.get(&item.id).copied();
                pairs.push((item, sim));
            }
        }

        // Thin pool (empty workspace, embeddings pending): backfill with the
        // newest items
        if pairs.len() < pool_size / 2 {
            let have: HashSet<ItemId> = pairs.iter().map(|(i, _)| i.id.clone()).collect();
            let backfill = self.storage.with_connection(|conn| {
                list_candidates(conn, workspace, &filter, pool_size)
            })?;
            for item in backfill {
                if pairs.len() >= pool_size {
                    break;
                }
                if !have.contains(&item.id) {
                    pairs.push((item, None));
                }
            }
        }

        Ok(rank(pairs, purpose, &self.config.rank, Utc::now()))
    }

    // -----------------------------------------------------------------------
    // Working set
    // -----------------------------------------------------------------------

    /// Assemble a budgeted working set for a purpose
    ///
    /// All-or-nothing: a deadline expiry fails the call rather than
    /// exposing a partial assembly.
    pub async fn build_working_set(
        &self,
        workspace: &str,
        thread_id: &str,
        purpose: &str,
        token_budget: usize,
        filters: Option<RecallFilters>,
        deadline: Option<Duration>,
    ) -> Result<WorkingSet> {
        let workspace = self.workspace(workspace)?;
        self.validate_purpose(purpose, token_budget)?;
        let timeout = deadline.unwrap_or(self.config.timeouts.build);

        tokio::time::timeout(
            timeout,
            self.do_build(&workspace, thread_id, purpose, token_budget, filters),
        )
        .await
        .map_err(|_| MnemoError::Cancelled(timeout))?
    }

    async fn do_build(
        &self,
        workspace: &str,
        thread_id: &str,
        purpose: &str,
        token_budget: usize,
        filters: Option<RecallFilters>,
    ) -> Result<WorkingSet> {
        let ranked = self
            .ranked_pool(workspace, thread_id, purpose, &filters.unwrap_or_default())
            .await?;

        let mut artifacts: BTreeMap<ItemId, Artifact> = BTreeMap::new();
        self.storage.with_connection(|conn| {
            for entry in &ranked {
                let id = &entry.item.source_artifact_id;
                if !artifacts.contains_key(id) {
                    if let Ok(artifact) = get_artifact(conn, workspace, id) {
                        artifacts.insert(id.clone(), artifact);
                    }
                }
            }
            Ok(())
        })?;

        let working_set = self.builder.build(&ranked, purpose, token_budget, &artifacts);

        let mut cited: Vec<ItemId> = Vec::new();
        let mut seen: HashSet<ItemId> = HashSet::new();
        for ids in working_set.citations.values() {
            for id in ids {
                if seen.insert(id.clone()) {
                    cited.push(id.clone());
                }
            }
        }
        self.storage
            .with_transaction(|conn| touch_items(conn, workspace, &cited))?;

        Ok(working_set)
    }

    // -----------------------------------------------------------------------
    // Expand
    // -----------------------------------------------------------------------

    /// Retrieve the stored form of a cited item
    ///
    /// The `full` form returns the raw artifact span the item was extracted
    /// from and counts as a use.
    pub async fn expand(
        &self,
        workspace: &str,
        item_id: &ItemId,
        form: ExpandForm,
    ) -> Result<Expanded> {
        let workspace = self.workspace(workspace)?;

        match form {
            ExpandForm::Summary => {
                let item = self
                    .storage
                    .with_connection(|conn| get_item(conn, &workspace, item_id))?;
                Ok(Expanded::Record(Box::new(item)))
            }
            ExpandForm::Full => {
                let lock = self.item_lock(&workspace, item_id);
                let _guard = lock.lock().await;

                self.storage.with_transaction(|conn| {
                    let item = get_item(conn, &workspace, item_id)?;
                    let artifact = get_artifact(conn, &workspace, &item.source_artifact_id)?;

                    let body = artifact.body.as_str();
                    let start = (item.source_span.0.max(0) as usize).min(body.len());
                    let end = (item.source_span.1.max(0) as usize).min(body.len());
                    let raw = body.get(start..end).unwrap_or("").to_string();

                    let item = update_item(
                        conn,
                        &workspace,
                        item_id,
                        &ItemMutation {
                            usage_increment: Some(1),
                            ..Default::default()
                        },
                    )?;
                    touch_items(conn, &workspace, std::slice::from_ref(item_id))?;

                    Ok(Expanded::Full {
                        item: Box::new(item),
                        raw,
                    })
                })
            }
        }
    }

    // -----------------------------------------------------------------------
    // Feedback
    // -----------------------------------------------------------------------

    /// Apply a feedback signal to an item
    pub async fn feedback(
        &self,
        workspace: &str,
        item_id: &ItemId,
        signal: FeedbackSignal,
        magnitude: f32,
        comment: Option<&str>,
        actor: Option<&str>,
    ) -> Result<FeedbackOutcome> {
        let workspace = self.workspace(workspace)?;
        let timeout = self.config.timeouts.feedback;

        let lock = self.item_lock(&workspace, item_id);
        let applied = tokio::time::timeout(timeout, async {
            let _guard = lock.lock().await;
            self.storage.with_transaction(|conn| {
                feedback_ops::apply(conn, &workspace, item_id, signal, magnitude, actor, comment)
            })
        })
        .await;

        match applied {
            Ok(outcome) => outcome,
            Err(_) => Err(MnemoError::Cancelled(timeout)),
        }
    }

    // -----------------------------------------------------------------------
    // Stats
    // -----------------------------------------------------------------------

    /// Aggregate counts for a workspace
    pub fn stats(&self, workspace: &str) -> Result<WorkspaceStats> {
        let workspace = self.workspace(workspace)?;
        self.storage
            .with_connection(|conn| workspace_stats(conn, &workspace))
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    fn workspace(&self, raw: &str) -> Result<String> {
        normalize_workspace(raw).map_err(|e| MnemoError::InvalidInput(e.to_string()))
    }

    fn validate_purpose(&self, purpose: &str, token_budget: usize) -> Result<()> {
        if purpose.trim().is_empty() {
            return Err(MnemoError::InvalidInput("purpose must not be empty".to_string()));
        }
        if token_budget == 0 {
            return Err(MnemoError::InvalidInput(
                "token budget must be positive".to_string(),
            ));
        }
        Ok(())
    }

    fn item_lock(&self, workspace: &str, item_id: &ItemId) -> Arc<Mutex<()>> {
        if self.locks.len() > LOCK_TABLE_LIMIT {
            self.locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        }
        self.locks
            .entry((workspace.to_string(), item_id.to_string()))
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashEmbedder;
    use crate::types::EmbeddingConfig;

    fn core() -> MemoryCore {
        let storage = Storage::open_in_memory().unwrap();
        let config = CoreConfig {
            embedding: EmbeddingConfig {
                dimensions: 256,
                ..Default::default()
            },
            ..Default::default()
        };
        MemoryCore::new(storage, Arc::new(HashEmbedder::new(256)), config).unwrap()
    }

    #[tokio::test]
    async fn test_empty_materials_rejected() {
        let core = core();
        let result = core
            .ingest("default", "t1", &Materials::default(), None)
            .await;
        assert!(matches!(result, Err(MnemoError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_empty_purpose_rejected() {
        let core = core();
        let result = core.recall("default", "t1", "  ", 100, None, None).await;
        assert!(matches!(result, Err(MnemoError::InvalidInput(_))));

        let result = core.recall("default", "t1", "purpose", 0, None, None).await;
        assert!(matches!(result, Err(MnemoError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_invalid_workspace_rejected() {
        let core = core();
        let result = core
            .ingest(
                "_system",
                "t1",
                &Materials {
                    chat: Some("User: hello there everyone".to_string()),
                    ..Default::default()
                },
                None,
            )
            .await;
        assert!(matches!(result, Err(MnemoError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_mismatched_dimensions_rejected() {
        let storage = Storage::open_in_memory().unwrap();
        let config = CoreConfig {
            embedding: EmbeddingConfig {
                dimensions: 128,
                ..Default::default()
            },
            ..Default::default()
        };
        let result = MemoryCore::new(storage, Arc::new(HashEmbedder::new(256)), config);
        assert!(matches!(result, Err(MnemoError::Config(_))));
    }

    #[tokio::test]
    async fn test_expand_cross_workspace_is_not_found() {
        let core = core();
        let materials = Materials {
            chat: Some("User: We will use Postgres for persistence.".to_string()),
            ..Default::default()
        };
        let result = core.ingest("alpha", "t1", &materials, None).await.unwrap();
        let id = &result.created_item_ids[0];

        assert!(core.expand("alpha", id, ExpandForm::Summary).await.is_ok());
        assert!(matches!(
            core.expand("beta", id, ExpandForm::Summary).await,
            Err(MnemoError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_expand_full_returns_raw_span_and_counts_use() {
        let core = core();
        let materials = Materials {
            chat: Some("User: We will use Postgres for persistence.".to_string()),
            ..Default::default()
        };
        let result = core.ingest("default", "t1", &materials, None).await.unwrap();
        let id = &result.created_item_ids[0];

        let expanded = core.expand("default", id, ExpandForm::Full).await.unwrap();
        let Expanded::Full { item, raw } = expanded else {
            panic!("expected full expansion");
        };
        assert_eq!(raw, "We will use Postgres for persistence.");
        assert_eq!(item.usage_count, 2, "full expansion counts as a use");
    }
}
