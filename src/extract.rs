//! Extraction of candidate memory items from raw materials
//!
//! Parses redacted chat transcripts, unified diffs, and log output into
//! typed candidates with source spans and initial salience. Extraction is
//! deterministic: identical redacted input yields an identical ordered
//! candidate list.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{HashMap, HashSet};

use crate::types::{
    normalize_content, truncate_graphemes, Artifact, ContentType, ItemSubtype,
    MAX_SUMMARY_GRAPHEMES,
};

/// Minimum proposition length in characters; anything shorter is noise
const MIN_PROPOSITION_CHARS: usize = 10;

/// A candidate item produced by extraction, not yet persisted
#[derive(Debug, Clone)]
pub struct Candidate {
    pub subtype: ItemSubtype,
    pub summary: String,
    pub body: String,
    /// Byte offsets into the artifact body
    pub span: (i64, i64),
    pub salience: f32,
    pub payload: HashMap<String, serde_json::Value>,
}

impl Candidate {
    fn new(subtype: ItemSubtype, text: &str, span: (usize, usize)) -> Self {
        let summary = truncate_graphemes(
            text.trim().trim_end_matches(['.', '!', '?']).trim_end(),
            MAX_SUMMARY_GRAPHEMES,
        );
        Self {
            subtype,
            summary,
            body: text.trim().to_string(),
            span: (span.0 as i64, span.1 as i64),
            salience: subtype.initial_salience(),
            payload: HashMap::new(),
        }
    }
}

/// Extract candidates from an artifact according to its content type
pub fn extract(artifact: &Artifact) -> Vec<Candidate> {
    match artifact.content_type {
        ContentType::Chat => extract_chat(&artifact.body),
        ContentType::Diff => extract_diff(&artifact.body),
        ContentType::Logs => extract_logs(&artifact.body),
    }
}

// ---------------------------------------------------------------------------
// Chat
// ---------------------------------------------------------------------------

static TURN_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?im)^(?:user|assistant|system):[ \t]*").expect("turn marker"));

static CONSTRAINT_CUES: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:do not|don't|must not|should not|never|cannot|can't|won't|no longer|only)\b")
        .expect("constraint cues")
});

static REQUIREMENT_CUES: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:must|should|needs? to|required to|shall|have to)\b")
        .expect("requirement cues")
});

static DECISION_CUES: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(?:let's|let us|we will|we'll|going to|going with|decided (?:to|that|on)|decision|switch(?:ing)? to|instead of|agreed to|use \w+ for)\b",
    )
    .expect("decision cues")
});

static TASK_CUES: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^(?:implement|create|build|add|fix|write|update|refactor|remove|investigate|deploy|verify|document|migrate|configure|set up|review|run)\b",
    )
    .expect("task cues")
});

static CODE_SYMBOL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"\b[A-Z][a-z0-9]+(?:[A-Z][a-z0-9]+)+\b|\b[A-Za-z][A-Za-z0-9]*_[A-Za-z0-9_]+\b|`[^`]+`|\b[A-Za-z_][A-Za-z0-9_]*\(\)",
    )
    .expect("code symbol")
});

/// Classify one chat proposition into a semantic subtype
///
/// Negations are checked before modal obligations so that "must not" reads
/// as a constraint, and obligations before decision cues so that
/// "we must use X for Y" reads as a requirement.
fn classify_proposition(text: &str) -> ItemSubtype {
    if CONSTRAINT_CUES.is_match(text) {
        ItemSubtype::Constraint
    } else if REQUIREMENT_CUES.is_match(text) {
        ItemSubtype::Requirement
    } else if DECISION_CUES.is_match(text) {
        ItemSubtype::Decision
    } else if TASK_CUES.is_match(text) {
        ItemSubtype::Task
    } else if CODE_SYMBOL.is_match(text) || has_proper_noun(text) {
        ItemSubtype::Entity
    } else {
        ItemSubtype::Preference
    }
}

/// A capitalized word that does not open the sentence
fn has_proper_noun(text: &str) -> bool {
    text.split_whitespace().skip(1).any(|w| {
        let mut chars = w.chars();
        matches!(chars.next(), Some(c) if c.is_uppercase())
            && chars.next().is_some_and(|c| c.is_lowercase())
    })
}

/// Split a turn into propositions, returning trimmed byte ranges
fn split_propositions(text: &str) -> Vec<(usize, usize)> {
    let mut raw_spans = Vec::new();
    let mut start = 0;
    for (i, c) in text.char_indices() {
        if matches!(c, '.' | '!' | '?' | '\n') {
            let end = if c == '\n' { i } else { i + c.len_utf8() };
            raw_spans.push((start, end));
            start = i + c.len_utf8();
        }
    }
    raw_spans.push((start, text.len()));

    raw_spans
        .into_iter()
        .filter_map(|(s, e)| {
            let slice = &text[s..e];
            let trimmed = slice.trim();
            if trimmed.is_empty() {
                return None;
            }
            let lead = slice.len() - slice.trim_start().len();
            Some((s + lead, s + lead + trimmed.len()))
        })
        .collect()
}

fn extract_chat(body: &str) -> Vec<Candidate> {
    let mut candidates = Vec::new();

    let markers: Vec<(usize, usize)> = TURN_MARKER
        .find_iter(body)
        .map(|m| (m.start(), m.end()))
        .collect();

    let turns: Vec<(usize, usize)> = if markers.is_empty() {
        vec![(0, body.len())]
    } else {
        markers
            .iter()
            .enumerate()
            .map(|(i, &(_, content_start))| {
                let end = markers.get(i + 1).map(|m| m.0).unwrap_or(body.len());
                (content_start, end)
            })
            .collect()
    };

    for (turn_start, turn_end) in turns {
        let turn = &body[turn_start..turn_end];
        let mut seen: HashSet<String> = HashSet::new();

        for (start, end) in split_propositions(turn) {
            let proposition = &turn[start..end];
            if proposition.chars().count() < MIN_PROPOSITION_CHARS {
                continue;
            }
            let key = normalize_content(proposition);
            if key.is_empty() || !seen.insert(key) {
                continue;
            }
            let subtype = classify_proposition(proposition);
            candidates.push(Candidate::new(
                subtype,
                proposition,
                (turn_start + start, turn_start + end),
            ));
        }
    }

    candidates
}

// ---------------------------------------------------------------------------
// Diff
// ---------------------------------------------------------------------------

static DECLARATION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"\b(?:fn|def|function|class|struct|trait|interface|impl|enum|type)\s+([A-Za-z_][A-Za-z0-9_]*)",
    )
    .expect("declaration pattern")
});

static BINDING: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(?:const|static|let|var)\s+([A-Za-z_][A-Za-z0-9_]*)\s*[:=]")
        .expect("binding pattern")
});

static HUNK_HEADER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^@@ -\d+(?:,\d+)? \+\d+(?:,\d+)? @@").expect("hunk header"));

fn extract_diff(body: &str) -> Vec<Candidate> {
    struct Hunk {
        file: String,
        header: String,
        start: usize,
        end: usize,
        symbols: Vec<String>,
    }

    let mut hunks: Vec<Hunk> = Vec::new();
    let mut current_file: Option<String> = None;
    let mut offset = 0;

    for line in body.split_inclusive('\n') {
        let line_start = offset;
        offset += line.len();
        let trimmed = line.trim_end_matches('\n');

        if let Some(path) = trimmed.strip_prefix("+++ ") {
            let path = path.strip_prefix("b/").unwrap_or(path);
            current_file = Some(path.to_string());
            continue;
        }
        if trimmed.starts_with("--- ") || trimmed.starts_with("diff --git") {
            continue;
        }
        if HUNK_HEADER.is_match(trimmed) {
            if let Some(file) = &current_file {
                hunks.push(Hunk {
                    file: file.clone(),
                    header: trimmed.to_string(),
                    start: line_start,
                    end: offset,
                    symbols: Vec::new(),
                });
            }
            continue;
        }

        let Some(hunk) = hunks.last_mut() else {
            continue;
        };
        // Hunk content: context lines and single +/- changes
        let is_change = (trimmed.starts_with('+') || trimmed.starts_with('-'))
            && !trimmed.starts_with("+++")
            && !trimmed.starts_with("---");
        let is_context = trimmed.starts_with(' ') || trimmed.is_empty();
        if !is_change && !is_context {
            continue;
        }
        hunk.end = offset;

        if is_change {
            let content = &trimmed[1..];
            for re in [&*DECLARATION, &*BINDING] {
                for caps in re.captures_iter(content) {
                    hunk.symbols.push(caps[1].to_string());
                }
            }
        }
    }

    let mut seen: HashSet<(String, String)> = HashSet::new();
    let mut candidates = Vec::new();
    for hunk in &hunks {
        for symbol in &hunk.symbols {
            if !seen.insert((hunk.file.clone(), symbol.clone())) {
                continue;
            }
            let text = body[hunk.start..hunk.end].trim_end();
            let mut candidate = Candidate::new(ItemSubtype::Entity, text, (hunk.start, hunk.end));
            candidate.summary = truncate_graphemes(
                &format!("{} ({})", symbol, hunk.file),
                MAX_SUMMARY_GRAPHEMES,
            );
            candidate.payload.insert(
                "file".to_string(),
                serde_json::Value::String(hunk.file.clone()),
            );
            candidate.payload.insert(
                "hunk".to_string(),
                serde_json::Value::String(hunk.header.clone()),
            );
            candidate.payload.insert(
                "symbol".to_string(),
                serde_json::Value::String(symbol.clone()),
            );
            candidates.push(candidate);
        }
    }
    candidates
}

// ---------------------------------------------------------------------------
// Logs
// ---------------------------------------------------------------------------

static TIMESTAMP_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\d{4}-\d{2}-\d{2}(?:[ T]\d{2}:\d{2}:\d{2})?").expect("timestamp pattern")
});

static SEVERITY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(?:ERROR|FATAL|CRITICAL)\b").expect("severity pattern"));

static FAIL_PREFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"\bFAIL\b").expect("fail pattern"));

fn classify_log_record(first_line: &str) -> ItemSubtype {
    if SEVERITY.is_match(first_line) {
        return ItemSubtype::Error;
    }
    let lower = first_line.to_lowercase();
    if FAIL_PREFIX.is_match(first_line) || (lower.contains("failed") && lower.contains("test")) {
        return ItemSubtype::TestFailure;
    }
    ItemSubtype::Log
}

fn extract_logs(body: &str) -> Vec<Candidate> {
    struct Record {
        start: usize,
        end: usize,
        first_line: String,
    }

    let mut records: Vec<Record> = Vec::new();
    let mut offset = 0;

    for line in body.split_inclusive('\n') {
        let line_start = offset;
        offset += line.len();
        let trimmed = line.trim_end_matches('\n');

        if trimmed.trim().is_empty() {
            continue;
        }

        let starts_record = TIMESTAMP_LINE.is_match(trimmed) || records.is_empty();
        if starts_record {
            records.push(Record {
                start: line_start,
                end: line_start + trimmed.len(),
                first_line: trimmed.to_string(),
            });
        } else if let Some(last) = records.last_mut() {
            // Continuation line (stack trace frame, wrapped message)
            last.end = line_start + trimmed.len();
        }
    }

    records
        .into_iter()
        .map(|record| {
            let subtype = classify_log_record(&record.first_line);
            let text = &body[record.start..record.end];
            let mut candidate = Candidate::new(subtype, text, (record.start, record.end));
            candidate.summary =
                truncate_graphemes(record.first_line.trim(), MAX_SUMMARY_GRAPHEMES);
            candidate
        })
        .collect()
}
