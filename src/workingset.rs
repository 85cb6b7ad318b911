//! Working-set assembly
//!
//! Packs ranked items into a structured, budgeted record for downstream
//! LLM context injection. Assembly is deterministic: identical inputs
//! produce a byte-identical working set. The token budget is a hard cap;
//! items that do not fit are skipped and scanning continues with
//! lower-ranked items to maximize packing.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::rank::RankedItem;
use crate::types::{
    truncate_graphemes, Artifact, ItemId, ItemSubtype, TokenEstimator, WorkingSetConfig,
};

/// Runbook entries are padded with requirements up to this length
const MIN_RUNBOOK_ENTRIES: usize = 3;

/// One artifact reference in the working set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactRef {
    pub id: ItemId,
    pub title: String,
    pub description: String,
}

/// The structured, budgeted context package
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkingSet {
    /// One-paragraph restatement of the purpose, token-bounded
    pub mission: String,
    /// Constraint summaries in rank order
    pub constraints: Vec<String>,
    /// Decision summaries in rank order
    pub focus_decisions: Vec<String>,
    /// Task summaries in rank order
    pub focus_tasks: Vec<String>,
    /// Episodic event summaries in rank order
    pub focus_events: Vec<String>,
    /// Requirement/entity/preference summaries in rank order
    pub notes: Vec<String>,
    /// Sequence-numbered task list, padded with requirements when short
    pub runbook: Vec<String>,
    /// Artifacts referenced by any selected item
    pub artifacts: Vec<ArtifactRef>,
    /// Section name -> contributing item ids, in rank order
    pub citations: BTreeMap<String, Vec<ItemId>>,
    /// Selected requirements carrying an interrogative or uncertainty marker
    pub open_questions: Vec<String>,
    pub tokens_used: usize,
    pub tokens_available: usize,
}

/// Builder turning ranked items into a working set
pub struct WorkingSetBuilder {
    config: WorkingSetConfig,
}

impl WorkingSetBuilder {
    pub fn new(config: WorkingSetConfig) -> Self {
        Self { config }
    }

    pub fn estimator(&self) -> TokenEstimator {
        self.config.token_estimator
    }

    /// Assemble a working set from ranked items under a hard token budget
    ///
    /// `artifacts` resolves the source artifact of each selected item; the
    /// caller supplies it keyed by artifact id.
    pub fn build(
        &self,
        ranked: &[RankedItem],
        purpose: &str,
        budget: usize,
        artifacts: &BTreeMap<ItemId, Artifact>,
    ) -> WorkingSet {
        let estimator = self.config.token_estimator;
        let mission = format!("Mission: {}", purpose.trim());
        let mission_tokens = estimator.estimate(&mission);

        // A budget below the mission estimate yields a truncated mission and
        // nothing else
        if mission_tokens > budget {
            let truncated = truncate_to_budget(&mission, budget, estimator);
            let tokens_used = estimator.estimate(&truncated);
            return WorkingSet {
                mission: truncated,
                tokens_used,
                tokens_available: 0,
                ..Default::default()
            };
        }

        let mut ws = WorkingSet {
            mission,
            ..Default::default()
        };
        let mut tokens_used = mission_tokens;
        let mut selected: Vec<&RankedItem> = Vec::new();

        for entry in ranked {
            let cost = estimator.estimate(&entry.item.summary);
            if tokens_used + cost > budget {
                continue;
            }
            tokens_used += cost;
            selected.push(entry);

            let (section, list) = match entry.item.subtype {
                ItemSubtype::Constraint => ("constraints", &mut ws.constraints),
                ItemSubtype::Decision => ("focus_decisions", &mut ws.focus_decisions),
                ItemSubtype::Task => ("focus_tasks", &mut ws.focus_tasks),
                ItemSubtype::Requirement | ItemSubtype::Entity | ItemSubtype::Preference => {
                    ("notes", &mut ws.notes)
                }
                ItemSubtype::Error
                | ItemSubtype::Log
                | ItemSubtype::TestFailure
                | ItemSubtype::Attempt
                | ItemSubtype::Observation => ("focus_events", &mut ws.focus_events),
            };
            list.push(entry.item.summary.clone());
            ws.citations
                .entry(section.to_string())
                .or_default()
                .push(entry.item.id.clone());
        }

        self.build_runbook(&mut ws, &selected);
        self.build_open_questions(&mut ws, &selected);
        build_artifact_refs(&mut ws, &selected, artifacts);

        ws.tokens_used = tokens_used;
        ws.tokens_available = budget - tokens_used;
        ws
    }

    /// Sequence-numbered tasks; requirements fill in when fewer than three
    /// tasks were selected
    fn build_runbook(&self, ws: &mut WorkingSet, selected: &[&RankedItem]) {
        let mut entries: Vec<(ItemId, String)> = selected
            .iter()
            .filter(|e| e.item.subtype == ItemSubtype::Task)
            .map(|e| (e.item.id.clone(), e.item.summary.clone()))
            .collect();

        if entries.len() < MIN_RUNBOOK_ENTRIES {
            for entry in selected {
                if entries.len() >= MIN_RUNBOOK_ENTRIES {
                    break;
                }
                if entry.item.subtype == ItemSubtype::Requirement {
                    entries.push((entry.item.id.clone(), entry.item.summary.clone()));
                }
            }
        }

        for (i, (id, summary)) in entries.into_iter().enumerate() {
            ws.runbook.push(format!("{}. {}", i + 1, summary));
            ws.citations
                .entry("runbook".to_string())
                .or_default()
                .push(id);
        }
    }

    /// Selected requirements whose body carries a `?` or a lexicon marker
    fn build_open_questions(&self, ws: &mut WorkingSet, selected: &[&RankedItem]) {
        for entry in selected {
            if entry.item.subtype != ItemSubtype::Requirement {
                continue;
            }
            let body = entry.item.body.to_lowercase();
            let uncertain = entry.item.body.contains('?')
                || self
                    .config
                    .uncertainty_lexicon
                    .iter()
                    .any(|w| body.contains(w.as_str()));
            if uncertain {
                ws.open_questions.push(entry.item.summary.clone());
                ws.citations
                    .entry("open_questions".to_string())
                    .or_default()
                    .push(entry.item.id.clone());
            }
        }
    }
}

fn build_artifact_refs(
    ws: &mut WorkingSet,
    selected: &[&RankedItem],
    artifacts: &BTreeMap<ItemId, Artifact>,
) {
    let mut seen: Vec<ItemId> = Vec::new();
    for entry in selected {
        let artifact_id = &entry.item.source_artifact_id;
        if seen.contains(artifact_id) {
            continue;
        }
        seen.push(artifact_id.clone());

        if let Some(artifact) = artifacts.get(artifact_id) {
            let first_line = artifact.body.lines().next().unwrap_or("");
            ws.artifacts.push(ArtifactRef {
                id: artifact.id.clone(),
                title: format!("{} {}", artifact.content_type.as_str(), artifact.id),
                description: truncate_graphemes(first_line.trim(), 80),
            });
        }
    }
}

/// Truncate text so its token estimate fits the budget
fn truncate_to_budget(text: &str, budget: usize, estimator: TokenEstimator) -> String {
    match estimator {
        TokenEstimator::CharsOver4 => text.chars().take(budget.saturating_mul(4)).collect(),
        TokenEstimator::WhitespaceTokens => {
            let words: Vec<&str> = text.split_whitespace().take(budget).collect();
            words.join(" ")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rank::{RankSignals, RankedItem};
    use crate::types::{ContentType, IdPrefix, ItemState, MemoryItem};
    use chrono::{TimeZone, Utc};
    use std::collections::HashMap;

    fn ranked_item(id: &str, subtype: ItemSubtype, summary: &str, score: f32) -> RankedItem {
        let now = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
        RankedItem {
            item: MemoryItem {
                id: id.parse().unwrap(),
                workspace: "w".to_string(),
                thread_id: "t1".to_string(),
                kind: subtype.kind(),
                subtype,
                summary: summary.to_string(),
                body: summary.to_string(),
                salience: 0.5,
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
            score,
            signals: RankSignals::default(),
        }
    }

    fn builder() -> WorkingSetBuilder {
        WorkingSetBuilder::new(WorkingSetConfig::default())
    }

    #[test]
    fn test_sections_by_subtype() {
        let ranked = vec![
            ranked_item("S1", ItemSubtype::Decision, "use postgres for storage", 0.9),
            ranked_item("S2", ItemSubtype::Constraint, "only use approved licenses", 0.8),
            ranked_item("S3", ItemSubtype::Task, "implement the retry logic", 0.7),
            ranked_item("E1", ItemSubtype::Error, "connection refused at startup", 0.6),
            ranked_item("S4", ItemSubtype::Requirement, "must support SSO", 0.5),
        ];
        let ws = builder().build(&ranked, "plan the rollout", 10_000, &BTreeMap::new());

        assert_eq!(ws.focus_decisions, vec!["use postgres for storage"]);
        assert_eq!(ws.constraints, vec!["only use approved licenses"]);
        assert_eq!(ws.focus_tasks, vec!["implement the retry logic"]);
        assert_eq!(ws.focus_events, vec!["connection refused at startup"]);
        assert_eq!(ws.notes, vec!["must support SSO"]);
        assert_eq!(
            ws.citations["focus_decisions"],
            vec!["S1".parse::<ItemId>().unwrap()]
        );
    }

    #[test]
    fn test_budget_respected_with_skip_and_continue() {
        // Summaries of 400 chars estimate to 100 tokens each
        let wide = "x".repeat(400);
        let narrow = "y".repeat(40); // 10 tokens
        let ranked = vec![
            ranked_item("S1", ItemSubtype::Task, &wide, 0.9),
            ranked_item("S2", ItemSubtype::Task, &wide, 0.8),
            ranked_item("S3", ItemSubtype::Task, &narrow, 0.7),
        ];
        // Mission "Mission: pack" = 13 chars -> 4 tokens; budget fits one
        // wide item and the narrow one but not the second wide item
        let ws = builder().build(&ranked, "pack", 120, &BTreeMap::new());

        assert_eq!(ws.focus_tasks.len(), 2);
        assert_eq!(ws.focus_tasks[0], wide);
        assert_eq!(ws.focus_tasks[1], narrow, "scan continued past the overflow");
        assert!(ws.tokens_used <= 120);
    }

    #[test]
    fn test_exact_packing() {
        // 20 items at 100 tokens each under a 550-token budget: exactly 5
        // fit after the mission
        let summary = "z".repeat(400);
        let ranked: Vec<RankedItem> = (1..=20)
            .map(|i| {
                ranked_item(
                    &format!("S{}", i),
                    ItemSubtype::Task,
                    &summary,
                    1.0 - i as f32 * 0.01,
                )
            })
            .collect();
        let ws = builder().build(&ranked, "plan the migration", 550, &BTreeMap::new());

        assert_eq!(ws.focus_tasks.len(), 5);
        assert!(ws.tokens_used <= 550);
        assert_eq!(
            ws.citations["focus_tasks"],
            (1..=5)
                .map(|i| format!("S{}", i).parse::<ItemId>().unwrap())
                .collect::<Vec<_>>(),
            "selection follows rank order"
        );
    }

    #[test]
    fn test_runbook_padded_with_requirements() {
        let ranked = vec![
            ranked_item("S1", ItemSubtype::Task, "deploy the staging build", 0.9),
            ranked_item("S2", ItemSubtype::Requirement, "must rotate keys", 0.8),
            ranked_item("S3", ItemSubtype::Requirement, "must audit access", 0.7),
        ];
        let ws = builder().build(&ranked, "release", 10_000, &BTreeMap::new());

        assert_eq!(
            ws.runbook,
            vec![
                "1. deploy the staging build",
                "2. must rotate keys",
                "3. must audit access",
            ]
        );
    }

    #[test]
    fn test_open_questions_from_requirements() {
        let mut question = ranked_item(
            "S1",
            ItemSubtype::Requirement,
            "should we shard by tenant",
            0.9,
        );
        question.item.body = "should we shard by tenant?".to_string();
        let mut lexicon_hit = ranked_item(
            "S2",
            ItemSubtype::Requirement,
            "quota handling is unclear",
            0.8,
        );
        lexicon_hit.item.body = "quota handling is unclear for batch jobs".to_string();
        let plain = ranked_item("S3", ItemSubtype::Requirement, "must support SSO", 0.7);

        let ws = builder().build(
            &[question, lexicon_hit, plain],
            "capacity planning",
            10_000,
            &BTreeMap::new(),
        );
        assert_eq!(
            ws.open_questions,
            vec!["should we shard by tenant", "quota handling is unclear"]
        );
    }

    #[test]
    fn test_artifact_references() {
        let artifact = Artifact {
            id: ItemId::new(IdPrefix::Artifact, 1),
            workspace: "w".to_string(),
            thread_id: "t1".to_string(),
            content_type: ContentType::Chat,
            body: "User: We must use JWT for auth.\nAssistant: agreed".to_string(),
            content_hash: 0,
            created_at: Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap(),
        };
        let mut artifacts = BTreeMap::new();
        artifacts.insert(artifact.id.clone(), artifact);

        let ranked = vec![
            ranked_item("S1", ItemSubtype::Decision, "use jwt", 0.9),
            ranked_item("S2", ItemSubtype::Task, "rotate keys", 0.8),
        ];
        let ws = builder().build(&ranked, "auth work", 10_000, &artifacts);

        assert_eq!(ws.artifacts.len(), 1, "shared artifact listed once");
        assert_eq!(ws.artifacts[0].title, "chat A1");
        assert_eq!(ws.artifacts[0].description, "User: We must use JWT for auth.");
    }

    #[test]
    fn test_empty_candidates_yield_mission_only() {
        let ws = builder().build(&[], "just the mission", 100, &BTreeMap::new());
        assert_eq!(ws.mission, "Mission: just the mission");
        assert!(ws.constraints.is_empty());
        assert!(ws.citations.is_empty());
        assert!(ws.tokens_available > 0);
    }

    #[test]
    fn test_budget_below_mission_truncates() {
        let ws = builder().build(
            &[ranked_item("S1", ItemSubtype::Task, "anything", 0.9)],
            "a very long purpose statement that cannot possibly fit in the budget",
            4,
            &BTreeMap::new(),
        );
        assert_eq!(ws.tokens_available, 0);
        assert!(ws.tokens_used <= 4);
        assert!(ws.focus_tasks.is_empty());
        assert!(ws.mission.chars().count() <= 16);
    }

    #[test]
    fn test_byte_identical_determinism() {
        let ranked = vec![
            ranked_item("S1", ItemSubtype::Decision, "use postgres", 0.9),
            ranked_item("S2", ItemSubtype::Requirement, "must support SSO?", 0.8),
            ranked_item("E1", ItemSubtype::Error, "timeout at startup", 0.7),
        ];
        let a = builder().build(&ranked, "plan", 500, &BTreeMap::new());
        let b = builder().build(&ranked, "plan", 500, &BTreeMap::new());
        assert_eq!(
            serde_json::to_vec(&a).unwrap(),
            serde_json::to_vec(&b).unwrap()
        );
    }

    #[test]
    fn test_whitespace_estimator() {
        let builder = WorkingSetBuilder::new(WorkingSetConfig {
            token_estimator: TokenEstimator::WhitespaceTokens,
            ..Default::default()
        });
        let ranked = vec![ranked_item(
            "S1",
            ItemSubtype::Task,
            "three word summary",
            0.9,
        )];
        // Mission "Mission: go" = 2 tokens, item = 3 tokens
        let ws = builder.build(&ranked, "go", 5, &BTreeMap::new());
        assert_eq!(ws.focus_tasks.len(), 1);
        assert_eq!(ws.tokens_used, 5);
        assert_eq!(ws.tokens_available, 0);
    }
}
