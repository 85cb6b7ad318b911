//! End-to-end scenarios against an in-memory store and the deterministic
//! hashing embedder
//!
//! Run with: cargo test --test scenario_tests

use std::sync::Arc;

use mnemo::embedding::HashEmbedder;
use mnemo::storage::Storage;
use mnemo::types::{
    CoreConfig, EmbeddingConfig, ExpandForm, Expanded, FeedbackSignal, ItemKind, ItemState,
    ItemSubtype, Materials,
};
use mnemo::MemoryCore;

const DIMS: usize = 512;

fn core() -> MemoryCore {
    let storage = Storage::open_in_memory().unwrap();
    let config = CoreConfig {
        embedding: EmbeddingConfig {
            dimensions: DIMS,
            ..Default::default()
        },
        ..Default::default()
    };
    MemoryCore::new(storage, Arc::new(HashEmbedder::new(DIMS)), config).unwrap()
}

fn chat(text: &str) -> Materials {
    Materials {
        chat: Some(text.to_string()),
        ..Default::default()
    }
}

/// S1: chat ingestion produces a requirement and a decision; recall for a
/// related purpose returns both with the decision ranked higher
#[tokio::test]
async fn s1_chat_ingestion_and_recall() {
    let core = core();
    let materials = chat(
        "User: We must use JWT for auth.\nAssistant: Agreed. We will store refresh tokens in httpOnly cookies.",
    );

    let result = core.ingest("default", "T1", &materials, None).await.unwrap();
    assert_eq!(result.created_item_ids.len(), 2);
    assert!(result.updated_item_ids.is_empty());
    assert!(result.rejected.is_empty());

    let items: Vec<_> = {
        let ids = result.created_item_ids.clone();
        core.storage()
            .with_connection(|conn| mnemo::storage::queries::get_items(conn, "default", &ids))
            .unwrap()
    };
    assert_eq!(items[0].subtype, ItemSubtype::Requirement);
    assert!(items[0].summary.contains("use JWT for auth"));
    assert_eq!(items[1].subtype, ItemSubtype::Decision);
    assert!(items[1].summary.contains("refresh tokens"));

    let recall = core
        .recall("default", "T1", "implement token refresh", 4000, None, None)
        .await
        .unwrap();
    assert_eq!(recall.items.len(), 2, "both items fit the budget");
    assert!(recall.tokens_used <= 4000);

    let decision = recall
        .items
        .iter()
        .find(|i| i.subtype == ItemSubtype::Decision)
        .unwrap();
    let requirement = recall
        .items
        .iter()
        .find(|i| i.subtype == ItemSubtype::Requirement)
        .unwrap();
    assert!(
        decision.score > requirement.score,
        "similarity on 'refresh tokens' dominates: decision={} requirement={}",
        decision.score,
        requirement.score
    );
}

/// S2: ingesting identical materials twice creates nothing new; both items'
/// usage count reaches 2 and no new artifact is minted
#[tokio::test]
async fn s2_duplicate_ingestion() {
    let core = core();
    let materials = chat(
        "User: We must use JWT for auth.\nAssistant: Agreed. We will store refresh tokens in httpOnly cookies.",
    );

    let first = core.ingest("default", "T1", &materials, None).await.unwrap();
    assert_eq!(first.created_item_ids.len(), 2);

    let second = core.ingest("default", "T1", &materials, None).await.unwrap();
    assert!(second.created_item_ids.is_empty(), "{:?}", second);
    assert_eq!(second.updated_item_ids.len(), 2);
    assert_eq!(
        second.artifact_ids, first.artifact_ids,
        "identical material reuses the artifact"
    );

    let stats = core.stats("default").unwrap();
    assert_eq!(stats.artifact_count, 1);
    assert_eq!(stats.semantic_count, 2);

    let items = core
        .storage()
        .with_connection(|conn| {
            mnemo::storage::queries::get_items(conn, "default", &first.created_item_ids)
        })
        .unwrap();
    for item in items {
        assert_eq!(item.usage_count, 2, "item {} usage", item.id);
    }
}

/// Embedder with pinned vectors so the test controls cosine distances:
/// the replacement decision lands at 0.90 from the original, inside the
/// supersede band [0.88, 0.94)
struct ScriptedEmbedder;

#[async_trait::async_trait]
impl mnemo::embedding::Embedder for ScriptedEmbedder {
    async fn embed_batch(&self, texts: &[&str]) -> mnemo::Result<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|t| {
                if t.contains("Instead of") {
                    vec![0.90, (1.0f32 - 0.90 * 0.90).sqrt(), 0.0, 0.0]
                } else if t.contains("JWT") {
                    vec![1.0, 0.0, 0.0, 0.0]
                } else {
                    vec![0.0, 0.0, 1.0, 0.0]
                }
            })
            .collect())
    }

    fn dimensions(&self) -> usize {
        4
    }

    fn model_id(&self) -> &str {
        "scripted-v1"
    }
}

/// S3: a contradictory decision supersedes the earlier one; recall returns
/// both but ranks the fresh one strictly higher
#[tokio::test]
async fn s3_supersession() {
    let storage = Storage::open_in_memory().unwrap();
    let config = CoreConfig {
        embedding: EmbeddingConfig {
            dimensions: 4,
            ..Default::default()
        },
        ..Default::default()
    };
    let core = MemoryCore::new(storage, Arc::new(ScriptedEmbedder), config).unwrap();

    let first = core
        .ingest("default", "T1", &chat("User: Let's use JWT."), None)
        .await
        .unwrap();
    assert_eq!(first.created_item_ids.len(), 1);
    let old_id = first.created_item_ids[0].clone();

    let second = core
        .ingest(
            "default",
            "T1",
            &chat("User: Instead of JWT, use opaque session tokens."),
            None,
        )
        .await
        .unwrap();
    assert_eq!(second.created_item_ids.len(), 1, "{:?}", second);
    let new_id = second.created_item_ids[0].clone();

    core.storage()
        .with_connection(|conn| {
            let old = mnemo::storage::queries::get_item(conn, "default", &old_id)?;
            assert_eq!(old.subtype, ItemSubtype::Decision);
            assert_eq!(old.state, ItemState::Superseded);

            let links = mnemo::storage::queries::links_from(conn, "default", &new_id)?;
            assert!(links
                .iter()
                .any(|l| l.link_type == mnemo::types::LinkType::Supersedes && l.to_id == old_id));
            Ok(())
        })
        .unwrap();

    let recall = core
        .recall("default", "T1", "session strategy", 4000, None, None)
        .await
        .unwrap();
    assert_eq!(recall.items.len(), 2);

    let old_score = recall.items.iter().find(|i| i.id == old_id).unwrap().score;
    let new_score = recall.items.iter().find(|i| i.id == new_id).unwrap().score;
    assert!(
        new_score > old_score,
        "superseded decision loses freshness: new={} old={}",
        new_score,
        old_score
    );
}

/// S4: budget packing selects exactly as many equal-cost items as fit
#[tokio::test]
async fn s4_budget_packing() {
    use mnemo::rank::{RankSignals, RankedItem};
    use mnemo::types::{IdPrefix, ItemId, MemoryItem, WorkingSetConfig};
    use mnemo::workingset::WorkingSetBuilder;
    use std::collections::{BTreeMap, HashMap};

    let now = chrono::Utc::now();
    // 20 items whose summaries each estimate to exactly 100 tokens
    let ranked: Vec<RankedItem> = (1..=20)
        .map(|i| RankedItem {
            item: MemoryItem {
                id: ItemId::new(IdPrefix::Semantic, i),
                workspace: "default".to_string(),
                thread_id: "T1".to_string(),
                kind: ItemKind::Semantic,
                subtype: ItemSubtype::Task,
                summary: "m".repeat(400),
                body: "m".repeat(400),
                salience: 0.6,
                usage_count: 1,
                created_at: now,
                last_accessed_at: now,
                retired_at: None,
                state: ItemState::Active,
                payload: HashMap::new(),
                source_artifact_id: ItemId::new(IdPrefix::Artifact, 1),
                source_span: (0, 0),
                content_hash: 0,
                embedding_model_id: None,
            },
            score: 1.0 - i as f32 * 0.01,
            signals: RankSignals::default(),
        })
        .collect();

    let builder = WorkingSetBuilder::new(WorkingSetConfig::default());
    let ws = builder.build(&ranked, "plan the migration", 550, &BTreeMap::new());

    assert_eq!(ws.focus_tasks.len(), 5, "exactly five 100-token items fit");
    assert!(ws.tokens_used <= 550);
    let cited = &ws.citations["focus_tasks"];
    let expected: Vec<ItemId> = (1..=5).map(|i| ItemId::new(IdPrefix::Semantic, i)).collect();
    assert_eq!(cited, &expected, "packed in rank order");
}

/// S5: sensitive values are redacted before persistence, hashing, and
/// embedding
#[tokio::test]
async fn s5_redaction() {
    let core = core();
    let materials = Materials {
        logs: Some("2025-01-01 ERROR user=alice@example.com token=abcd1234efgh5678".to_string()),
        ..Default::default()
    };

    let result = core.ingest("default", "T1", &materials, None).await.unwrap();
    assert_eq!(result.created_item_ids.len(), 1);
    let id = result.created_item_ids[0].clone();

    let expanded = core.expand("default", &id, ExpandForm::Full).await.unwrap();
    let Expanded::Full { item, raw } = expanded else {
        panic!("expected full expansion");
    };

    assert_eq!(item.subtype, ItemSubtype::Error);
    for text in [&item.summary, &item.body, &raw] {
        assert!(text.contains("[REDACTED_EMAIL]"), "got: {}", text);
        assert!(text.contains("[REDACTED_TOKEN]"), "got: {}", text);
        assert!(!text.contains("alice@example.com"));
        assert!(!text.contains("abcd1234efgh5678"));
    }

    // Hash covers the redacted form
    let expected_hash = mnemo::types::item_content_hash(&item.summary, &item.body);
    assert_eq!(item.content_hash, expected_hash);
}

/// S6: helpful feedback saturates salience at 1.0 while usage keeps
/// counting
#[tokio::test]
async fn s6_feedback_saturation() {
    let core = core();
    let result = core
        .ingest(
            "default",
            "T1",
            &chat("User: the TokenManager caches vectors in memory"),
            None,
        )
        .await
        .unwrap();
    let id = result.created_item_ids[0].clone();

    let before = core
        .storage()
        .with_connection(|conn| mnemo::storage::queries::get_item(conn, "default", &id))
        .unwrap();
    assert_eq!(before.salience, 0.5);
    let usage_before = before.usage_count;

    for _ in 0..30 {
        core.feedback("default", &id, FeedbackSignal::Helpful, 1.0, None, None)
            .await
            .unwrap();
    }

    let after = core
        .storage()
        .with_connection(|conn| mnemo::storage::queries::get_item(conn, "default", &id))
        .unwrap();
    assert_eq!(after.salience, 1.0);
    assert_eq!(after.usage_count, usage_before + 30);
}

/// Workspace isolation holds end to end: items ingested under one
/// workspace are invisible to recall, expand, and feedback in another
#[tokio::test]
async fn workspace_isolation_end_to_end() {
    let core = core();
    let result = core
        .ingest("alpha", "T1", &chat("User: We will use Postgres for storage."), None)
        .await
        .unwrap();
    let id = result.created_item_ids[0].clone();

    let recall = core
        .recall("beta", "T1", "postgres storage", 4000, None, None)
        .await
        .unwrap();
    assert!(recall.items.is_empty());

    assert!(core.expand("beta", &id, ExpandForm::Summary).await.is_err());
    assert!(core
        .feedback("beta", &id, FeedbackSignal::Helpful, 1.0, None, None)
        .await
        .is_err());

    let ws = core
        .build_working_set("beta", "T1", "postgres storage", 4000, None, None)
        .await
        .unwrap();
    assert!(ws.focus_decisions.is_empty());
    assert!(ws.citations.is_empty());
}

/// Working sets built from ingested materials populate sections, runbook,
/// citations, and artifact references
#[tokio::test]
async fn working_set_end_to_end() {
    let core = core();
    let materials = chat(
        "User: We must not store plaintext passwords.\n\
         Assistant: We will hash them with argon2. Implement the hashing module first. \
         Must we also rotate existing hashes somehow?",
    );
    core.ingest("default", "T1", &materials, None).await.unwrap();

    let ws = core
        .build_working_set("default", "T1", "plan the password hashing work", 4000, None, None)
        .await
        .unwrap();

    assert_eq!(ws.mission, "Mission: plan the password hashing work");
    assert_eq!(ws.constraints.len(), 1, "{:?}", ws);
    assert_eq!(ws.focus_decisions.len(), 1, "{:?}", ws);
    assert_eq!(ws.focus_tasks.len(), 1, "{:?}", ws);
    assert!(!ws.runbook.is_empty());
    assert!(ws.runbook[0].starts_with("1. "));
    assert_eq!(ws.artifacts.len(), 1);
    assert!(ws.tokens_used <= 4000);
    assert!(!ws.citations.is_empty());
    assert!(
        !ws.open_questions.is_empty(),
        "interrogative requirement surfaces as an open question: {:?}",
        ws
    );
}

/// Embedding-pending items still participate in recall via the
/// chronological backfill path, and the backfill worker resolves them
#[tokio::test]
async fn backfill_resolves_pending_items() {
    let core = core();
    core.ingest("default", "T1", &chat("User: We will use Postgres for storage."), None)
        .await
        .unwrap();

    // Simulate an item left pending (e.g. provider outage during ingest)
    core.storage()
        .with_transaction(|conn| {
            conn.execute("UPDATE items SET embedding_model_id = NULL", [])
                .map_err(mnemo::MnemoError::from)?;
            conn.execute("DELETE FROM vectors", [])
                .map_err(mnemo::MnemoError::from)?;
            Ok(())
        })
        .unwrap();

    let recall = core
        .recall("default", "T1", "postgres storage plans", 4000, None, None)
        .await
        .unwrap();
    assert_eq!(recall.items.len(), 1, "backfill path still returns the item");

    let worker = core.backfill_worker();
    let resolved = worker.backfill_once().await.unwrap();
    assert_eq!(resolved, 1);
    assert_eq!(core.stats("default").unwrap().pending_embedding_count, 0);
}
