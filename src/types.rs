//! Core types for mnemo

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::time::Duration;
use unicode_normalization::UnicodeNormalization;
use unicode_segmentation::UnicodeSegmentation;

/// Default workspace used when the caller does not care about isolation
pub fn default_workspace() -> String {
    "default".to_string()
}

/// Reserved workspace names that cannot be used
pub const RESERVED_WORKSPACES: &[&str] = &["_system", "_archive"];

/// Maximum workspace name length
pub const MAX_WORKSPACE_LENGTH: usize = 64;

/// Maximum summary length in grapheme clusters
pub const MAX_SUMMARY_GRAPHEMES: usize = 280;

/// Workspace validation error
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkspaceError {
    Empty,
    TooLong,
    InvalidChars,
    Reserved,
}

impl std::fmt::Display for WorkspaceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkspaceError::Empty => write!(f, "Workspace name cannot be empty"),
            WorkspaceError::TooLong => write!(
                f,
                "Workspace name exceeds {} characters",
                MAX_WORKSPACE_LENGTH
            ),
            WorkspaceError::InvalidChars => write!(
                f,
                "Workspace name can only contain lowercase letters, numbers, hyphens, and underscores"
            ),
            WorkspaceError::Reserved => write!(f, "Workspace name is reserved"),
        }
    }
}

impl std::error::Error for WorkspaceError {}

/// Normalize and validate a workspace name
///
/// Rules:
/// - Trim whitespace and convert to lowercase
/// - Only allow [a-z0-9_-] characters
/// - Max 64 characters
/// - Cannot start with underscore (reserved for system workspaces)
pub fn normalize_workspace(s: &str) -> Result<String, WorkspaceError> {
    let normalized = s.trim().to_lowercase();

    if normalized.is_empty() {
        return Err(WorkspaceError::Empty);
    }

    if normalized.len() > MAX_WORKSPACE_LENGTH {
        return Err(WorkspaceError::TooLong);
    }

    if !normalized
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_')
    {
        return Err(WorkspaceError::InvalidChars);
    }

    if normalized.starts_with('_') || RESERVED_WORKSPACES.contains(&normalized.as_str()) {
        return Err(WorkspaceError::Reserved);
    }

    Ok(normalized)
}

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// Identifier prefix: `S` for semantic items, `E` for episodic, `A` for artifacts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum IdPrefix {
    Semantic,
    Episodic,
    Artifact,
}

impl IdPrefix {
    pub fn as_str(&self) -> &'static str {
        match self {
            IdPrefix::Semantic => "S",
            IdPrefix::Episodic => "E",
            IdPrefix::Artifact => "A",
        }
    }
}

/// Human-readable item identifier, minted monotonically per workspace
/// per prefix: `S1`, `S2`, ..., `E1`, ..., `A1`, ...
///
/// Ordering is (prefix, sequence), which gives the deterministic tie-break
/// order used by search and ranking.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ItemId {
    pub prefix: IdPrefix,
    pub seq: i64,
}

impl ItemId {
    pub fn new(prefix: IdPrefix, seq: i64) -> Self {
        Self { prefix, seq }
    }

    pub fn is_artifact(&self) -> bool {
        self.prefix == IdPrefix::Artifact
    }
}

impl std::fmt::Display for ItemId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}", self.prefix.as_str(), self.seq)
    }
}

impl std::str::FromStr for ItemId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let prefix = match s.chars().next() {
            Some('S') => IdPrefix::Semantic,
            Some('E') => IdPrefix::Episodic,
            Some('A') => IdPrefix::Artifact,
            _ => return Err(format!("Unknown identifier prefix: {}", s)),
        };
        let seq: i64 = s[1..]
            .parse()
            .map_err(|_| format!("Invalid identifier sequence: {}", s))?;
        if seq < 1 {
            return Err(format!("Identifier sequence must be positive: {}", s));
        }
        Ok(ItemId { prefix, seq })
    }
}

impl TryFrom<String> for ItemId {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<ItemId> for String {
    fn from(id: ItemId) -> String {
        id.to_string()
    }
}

// ---------------------------------------------------------------------------
// Item classification
// ---------------------------------------------------------------------------

/// Top-level memory item kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    /// Durable knowledge distilled from materials
    Semantic,
    /// A time-bounded event
    Episodic,
}

impl ItemKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemKind::Semantic => "semantic",
            ItemKind::Episodic => "episodic",
        }
    }

    pub fn id_prefix(&self) -> IdPrefix {
        match self {
            ItemKind::Semantic => IdPrefix::Semantic,
            ItemKind::Episodic => IdPrefix::Episodic,
        }
    }
}

impl std::str::FromStr for ItemKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "semantic" => Ok(ItemKind::Semantic),
            "episodic" => Ok(ItemKind::Episodic),
            _ => Err(format!("Unknown item kind: {}", s)),
        }
    }
}

/// Item subtype; the kind is implied by the subtype
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemSubtype {
    // Semantic
    Decision,
    Requirement,
    Constraint,
    Task,
    Entity,
    Preference,
    // Episodic
    Error,
    Log,
    TestFailure,
    Attempt,
    Observation,
}

impl ItemSubtype {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemSubtype::Decision => "decision",
            ItemSubtype::Requirement => "requirement",
            ItemSubtype::Constraint => "constraint",
            ItemSubtype::Task => "task",
            ItemSubtype::Entity => "entity",
            ItemSubtype::Preference => "preference",
            ItemSubtype::Error => "error",
            ItemSubtype::Log => "log",
            ItemSubtype::TestFailure => "test_failure",
            ItemSubtype::Attempt => "attempt",
            ItemSubtype::Observation => "observation",
        }
    }

    pub fn kind(&self) -> ItemKind {
        match self {
            ItemSubtype::Decision
            | ItemSubtype::Requirement
            | ItemSubtype::Constraint
            | ItemSubtype::Task
            | ItemSubtype::Entity
            | ItemSubtype::Preference => ItemKind::Semantic,
            ItemSubtype::Error
            | ItemSubtype::Log
            | ItemSubtype::TestFailure
            | ItemSubtype::Attempt
            | ItemSubtype::Observation => ItemKind::Episodic,
        }
    }

    /// Initial salience assigned by the extractor
    pub fn initial_salience(&self) -> f32 {
        match self {
            ItemSubtype::Decision => 0.8,
            ItemSubtype::Requirement => 0.75,
            ItemSubtype::Constraint => 0.7,
            ItemSubtype::Task => 0.6,
            ItemSubtype::Entity => 0.5,
            ItemSubtype::Preference => 0.55,
            ItemSubtype::Error => 0.75,
            ItemSubtype::TestFailure => 0.8,
            ItemSubtype::Log => 0.4,
            ItemSubtype::Attempt => 0.5,
            ItemSubtype::Observation => 0.5,
        }
    }
}

impl std::str::FromStr for ItemSubtype {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "decision" => Ok(ItemSubtype::Decision),
            "requirement" => Ok(ItemSubtype::Requirement),
            "constraint" => Ok(ItemSubtype::Constraint),
            "task" => Ok(ItemSubtype::Task),
            "entity" => Ok(ItemSubtype::Entity),
            "preference" => Ok(ItemSubtype::Preference),
            "error" => Ok(ItemSubtype::Error),
            "log" => Ok(ItemSubtype::Log),
            "test_failure" => Ok(ItemSubtype::TestFailure),
            "attempt" => Ok(ItemSubtype::Attempt),
            "observation" => Ok(ItemSubtype::Observation),
            _ => Err(format!("Unknown item subtype: {}", s)),
        }
    }
}

/// Lifecycle state of a memory item
///
/// `active → superseded` when a newer decision supersedes it,
/// `active|superseded → retired` on outdated feedback or explicit retire.
/// `retired` is terminal for retrieval; the record remains for audit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ItemState {
    #[default]
    Active,
    Superseded,
    Retired,
}

impl ItemState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemState::Active => "active",
            ItemState::Superseded => "superseded",
            ItemState::Retired => "retired",
        }
    }
}

impl std::str::FromStr for ItemState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "active" => Ok(ItemState::Active),
            "superseded" => Ok(ItemState::Superseded),
            "retired" => Ok(ItemState::Retired),
            _ => Err(format!("Unknown item state: {}", s)),
        }
    }
}

/// Content type tag of an artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Chat,
    Diff,
    Logs,
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Chat => "chat",
            ContentType::Diff => "diff",
            ContentType::Logs => "logs",
        }
    }
}

impl std::str::FromStr for ContentType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "chat" => Ok(ContentType::Chat),
            "diff" => Ok(ContentType::Diff),
            "logs" => Ok(ContentType::Logs),
            _ => Err(format!("Unknown content type: {}", s)),
        }
    }
}

/// Typed directed edge between two items in the same workspace
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkType {
    /// Equivalence pointer to a canonical item; chains resolve on write
    DuplicateOf,
    /// Newer decision invalidates older; forms a forest
    Supersedes,
    /// Weak association
    RefersTo,
    /// Episodic event caused by a semantic item
    CausedBy,
}

impl LinkType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkType::DuplicateOf => "duplicate_of",
            LinkType::Supersedes => "supersedes",
            LinkType::RefersTo => "refers_to",
            LinkType::CausedBy => "caused_by",
        }
    }
}

impl std::str::FromStr for LinkType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "duplicate_of" => Ok(LinkType::DuplicateOf),
            "supersedes" => Ok(LinkType::Supersedes),
            "refers_to" => Ok(LinkType::RefersTo),
            "caused_by" => Ok(LinkType::CausedBy),
            _ => Err(format!("Unknown link type: {}", s)),
        }
    }
}

/// Client feedback signal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackSignal {
    Helpful,
    NotHelpful,
    Outdated,
    Duplicate,
}

impl FeedbackSignal {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeedbackSignal::Helpful => "helpful",
            FeedbackSignal::NotHelpful => "not_helpful",
            FeedbackSignal::Outdated => "outdated",
            FeedbackSignal::Duplicate => "duplicate",
        }
    }
}

impl std::str::FromStr for FeedbackSignal {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "helpful" => Ok(FeedbackSignal::Helpful),
            "not_helpful" => Ok(FeedbackSignal::NotHelpful),
            "outdated" => Ok(FeedbackSignal::Outdated),
            "duplicate" => Ok(FeedbackSignal::Duplicate),
            _ => Err(format!("Unknown feedback signal: {}", s)),
        }
    }
}

// ---------------------------------------------------------------------------
// Entities
// ---------------------------------------------------------------------------

/// The atomic unit of memory
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryItem {
    pub id: ItemId,
    pub workspace: String,
    pub thread_id: String,
    pub kind: ItemKind,
    pub subtype: ItemSubtype,
    /// Redacted one-line distillation, at most 280 graphemes
    pub summary: String,
    /// Redacted full relevant span
    pub body: String,
    /// Accumulated relevance weight in [0, 1]
    pub salience: f32,
    pub usage_count: i64,
    pub created_at: DateTime<Utc>,
    pub last_accessed_at: DateTime<Utc>,
    pub retired_at: Option<DateTime<Utc>>,
    pub state: ItemState,
    /// Subtype-specific structured attributes
    #[serde(default)]
    pub payload: HashMap<String, serde_json::Value>,
    pub source_artifact_id: ItemId,
    /// Byte offsets into the source artifact body
    pub source_span: (i64, i64),
    /// 64-bit hash over the normalized summary+body
    pub content_hash: u64,
    /// Model that produced the stored vector; `None` means embedding pending
    pub embedding_model_id: Option<String>,
}

/// Raw, immutable source material a cluster of items was extracted from
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artifact {
    pub id: ItemId,
    pub workspace: String,
    pub thread_id: String,
    pub content_type: ContentType,
    /// Redacted raw text
    pub body: String,
    pub content_hash: u64,
    pub created_at: DateTime<Utc>,
}

/// Typed directed edge between two items
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Link {
    pub workspace: String,
    pub from_id: ItemId,
    pub to_id: ItemId,
    pub link_type: LinkType,
    pub created_at: DateTime<Utc>,
}

/// Append-only feedback journal entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackRecord {
    pub workspace: String,
    pub item_id: ItemId,
    pub signal: FeedbackSignal,
    pub magnitude: f32,
    pub at: DateTime<Utc>,
    pub actor: Option<String>,
}

// ---------------------------------------------------------------------------
// Operation inputs and outputs
// ---------------------------------------------------------------------------

/// Input for creating a new memory item
#[derive(Debug, Clone)]
pub struct CreateItemInput {
    pub workspace: String,
    pub thread_id: String,
    pub subtype: ItemSubtype,
    pub summary: String,
    pub body: String,
    pub salience: f32,
    pub payload: HashMap<String, serde_json::Value>,
    pub source_artifact_id: ItemId,
    pub source_span: (i64, i64),
    pub embedding_model_id: Option<String>,
}

/// Typed mutation applied atomically to a single item
#[derive(Debug, Clone, Default)]
pub struct ItemMutation {
    pub summary: Option<String>,
    pub body: Option<String>,
    /// Added to salience, saturating into [0, 1]
    pub salience_delta: Option<f32>,
    pub usage_increment: Option<i64>,
    pub retired: bool,
    /// Merge these keys into the payload
    pub payload_merge: Option<HashMap<String, serde_json::Value>>,
}

/// Raw interaction materials for one ingestion call
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Materials {
    pub chat: Option<String>,
    pub diffs: Option<String>,
    pub logs: Option<String>,
}

impl Materials {
    pub fn is_empty(&self) -> bool {
        self.chat.is_none() && self.diffs.is_none() && self.logs.is_none()
    }

    /// Provided materials in deterministic order
    pub fn entries(&self) -> Vec<(ContentType, &str)> {
        let mut out = Vec::new();
        if let Some(c) = self.chat.as_deref() {
            out.push((ContentType::Chat, c));
        }
        if let Some(d) = self.diffs.as_deref() {
            out.push((ContentType::Diff, d));
        }
        if let Some(l) = self.logs.as_deref() {
            out.push((ContentType::Logs, l));
        }
        out
    }
}

/// A candidate the consolidator refused to persist, with the reason
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RejectedCandidate {
    pub summary: String,
    pub reason: String,
}

/// Outcome of one ingestion call
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IngestResult {
    pub artifact_ids: Vec<ItemId>,
    pub created_item_ids: Vec<ItemId>,
    pub updated_item_ids: Vec<ItemId>,
    pub rejected: Vec<RejectedCandidate>,
    /// True when the deadline expired before all candidates were processed;
    /// everything listed above was persisted before cancellation
    pub cancelled: bool,
}

/// Optional recall filters
#[derive(Debug, Clone, Default)]
pub struct RecallFilters {
    pub include_kinds: Option<Vec<ItemKind>>,
    pub exclude_subtypes: Option<Vec<ItemSubtype>>,
    pub include_retired: bool,
    pub cross_thread: bool,
}

/// One recalled item summary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecalledItem {
    pub id: ItemId,
    pub kind: ItemKind,
    pub subtype: ItemSubtype,
    pub summary: String,
    pub score: f32,
}

/// Outcome of a recall call
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecallResult {
    pub items: Vec<RecalledItem>,
    pub tokens_used: usize,
    pub tokens_available: usize,
}

/// Expansion form requested by the client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpandForm {
    Summary,
    Full,
}

/// Result of expanding a cited item
#[derive(Debug, Clone)]
pub enum Expanded {
    /// The item record alone
    Record(Box<MemoryItem>),
    /// The item record plus the raw artifact span it was extracted from
    Full {
        item: Box<MemoryItem>,
        raw: String,
    },
}

/// Outcome of one feedback application
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackOutcome {
    pub previous_salience: f32,
    pub new_salience: f32,
    pub delta: f32,
    pub retired: bool,
}

/// Aggregate counts for a workspace
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkspaceStats {
    pub workspace: String,
    pub semantic_count: i64,
    pub episodic_count: i64,
    pub active_count: i64,
    pub superseded_count: i64,
    pub retired_count: i64,
    pub artifact_count: i64,
    pub pending_embedding_count: i64,
}

// ---------------------------------------------------------------------------
// Content normalization and hashing
// ---------------------------------------------------------------------------

/// Normalize text for hashing: Unicode NFC, ASCII-lowercase fold, collapse
/// whitespace runs to a single space, trim.
pub fn normalize_content(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pending_space = false;
    for c in text.nfc() {
        if c.is_whitespace() {
            pending_space = !out.is_empty();
            continue;
        }
        if pending_space {
            out.push(' ');
            pending_space = false;
        }
        out.push(c.to_ascii_lowercase());
    }
    out
}

/// 64-bit content hash: first 8 bytes of SHA-256 over the normalized text
pub fn content_hash(text: &str) -> u64 {
    let normalized = normalize_content(text);
    let digest = Sha256::digest(normalized.as_bytes());
    u64::from_be_bytes(digest[..8].try_into().expect("digest is 32 bytes"))
}

/// Content hash of an item: normalized summary+body
pub fn item_content_hash(summary: &str, body: &str) -> u64 {
    content_hash(&format!("{}\n{}", summary, body))
}

/// Truncate to at most `max` grapheme clusters
pub fn truncate_graphemes(text: &str, max: usize) -> String {
    let mut end = text.len();
    for (count, (offset, _)) in text.grapheme_indices(true).enumerate() {
        if count == max {
            end = offset;
            break;
        }
    }
    text[..end].to_string()
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Database path, `:memory:` for an in-memory database
    pub db_path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: ":memory:".to_string(),
        }
    }
}

/// Embedding gateway configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Active embedding model id; vectors with other model ids are ignored
    pub model_id: String,
    /// Must equal the provider's output dimension
    pub dimensions: usize,
    /// Provider API key, required for the HTTP embedder
    pub api_key: Option<String>,
    /// Provider endpoint override
    pub endpoint: Option<String>,
    /// Inputs per provider call, capped at 128
    pub batch_size: usize,
    /// Retry attempts per batch before items go embedding-pending
    pub max_retries: u32,
    /// Embedding cache capacity in bytes
    pub cache_bytes: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model_id: "text-embedding-3-small".to_string(),
            dimensions: 1536,
            api_key: None,
            endpoint: None,
            batch_size: 128,
            max_retries: 3,
            cache_bytes: 64 * 1024 * 1024,
        }
    }
}

/// Consolidation thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsolidationConfig {
    /// Exact-duplicate threshold; 1.0 means content-hash equality only
    pub exact_threshold: f32,
    /// Cosine at or above which a same-subtype neighbor is a near-duplicate
    pub near_threshold: f32,
    /// Cosine at or above which contradictory decisions supersede
    pub supersede_threshold: f32,
    /// Cosine at or above which neighbors are linked as refers_to
    pub refer_threshold: f32,
    /// Nearest neighbors consulted per candidate
    pub neighbor_limit: usize,
}

impl Default for ConsolidationConfig {
    fn default() -> Self {
        Self {
            exact_threshold: 1.0,
            near_threshold: 0.94,
            supersede_threshold: 0.88,
            refer_threshold: 0.86,
            neighbor_limit: 16,
        }
    }
}

/// Weights for the ranking signals; must sum to 1.0 (±0.01)
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RankWeights {
    pub similarity: f32,
    pub salience: f32,
    pub recency: f32,
    pub usage: f32,
    pub kind_prior: f32,
    pub freshness: f32,
}

impl Default for RankWeights {
    fn default() -> Self {
        Self {
            similarity: 0.45,
            salience: 0.15,
            recency: 0.15,
            usage: 0.10,
            kind_prior: 0.10,
            freshness: 0.05,
        }
    }
}

impl RankWeights {
    pub fn sum(&self) -> f32 {
        self.similarity + self.salience + self.recency + self.usage + self.kind_prior
            + self.freshness
    }

    pub fn validate(&self) -> Result<(), String> {
        let sum = self.sum();
        if (sum - 1.0).abs() > 0.01 {
            return Err(format!("Rank weights must sum to 1.0 (±0.01), got {}", sum));
        }
        Ok(())
    }
}

/// Ranker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankConfig {
    pub weights: RankWeights,
    /// Recency decay constant for semantic items, seconds
    pub tau_semantic_seconds: f64,
    /// Recency decay constant for episodic items, seconds
    pub tau_episodic_seconds: f64,
    /// Candidate pool size
    pub pool_size: usize,
}

impl Default for RankConfig {
    fn default() -> Self {
        Self {
            weights: RankWeights::default(),
            tau_semantic_seconds: 604_800.0,
            tau_episodic_seconds: 129_600.0,
            pool_size: 64,
        }
    }
}

/// Token estimator used for working-set budgeting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TokenEstimator {
    /// `ceil(chars / 4)`
    #[default]
    CharsOver4,
    /// Whitespace-separated token count
    WhitespaceTokens,
}

impl TokenEstimator {
    pub fn estimate(&self, text: &str) -> usize {
        match self {
            TokenEstimator::CharsOver4 => text.chars().count().div_ceil(4),
            TokenEstimator::WhitespaceTokens => text.split_whitespace().count(),
        }
    }
}

/// Working-set builder configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkingSetConfig {
    pub token_estimator: TokenEstimator,
    /// Words marking an uncertain requirement as an open question
    pub uncertainty_lexicon: Vec<String>,
}

impl Default for WorkingSetConfig {
    fn default() -> Self {
        Self {
            token_estimator: TokenEstimator::CharsOver4,
            uncertainty_lexicon: vec![
                "tbd".to_string(),
                "unclear".to_string(),
                "undecided".to_string(),
                "open question".to_string(),
            ],
        }
    }
}

/// Vector index configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorIndexConfig {
    /// Hard cap on `k` per search call
    pub topk_cap: usize,
}

impl Default for VectorIndexConfig {
    fn default() -> Self {
        Self { topk_cap: 256 }
    }
}

/// Per-operation default deadlines
#[derive(Debug, Clone)]
pub struct TimeoutConfig {
    pub ingest: Duration,
    pub recall: Duration,
    pub build: Duration,
    pub feedback: Duration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            ingest: Duration::from_secs(30),
            recall: Duration::from_secs(5),
            build: Duration::from_secs(1),
            feedback: Duration::from_secs(1),
        }
    }
}

/// Top-level configuration for the memory core
#[derive(Debug, Clone, Default)]
pub struct CoreConfig {
    pub embedding: EmbeddingConfig,
    /// Extra redaction patterns as (category, regex) pairs, applied after
    /// the built-in set
    pub redaction_patterns: Vec<(String, String)>,
    pub consolidation: ConsolidationConfig,
    pub rank: RankConfig,
    pub working_set: WorkingSetConfig,
    pub vector_index: VectorIndexConfig,
    pub timeouts: TimeoutConfig,
}
