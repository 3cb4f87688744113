use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use quorum_core::types::ConversationId;

use crate::error::Result;
use crate::store::{get_json, put_json, KvStore};

/// Entities live for 30 days unless refreshed.
const ENTITY_TTL_SECS: u64 = 30 * 24 * 3600;
/// Relevance multiplier applied when an AI extraction contributed to a merge.
const AI_BOOST: f64 = 1.1;

/// What kind of fact an entity records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    JiraTicket,
    Project,
    Person,
    Deadline,
    Document,
    Url,
    Metric,
    Technology,
    Other,
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::JiraTicket => "jira_ticket",
            Self::Project => "project",
            Self::Person => "person",
            Self::Deadline => "deadline",
            Self::Document => "document",
            Self::Url => "url",
            Self::Metric => "metric",
            Self::Technology => "technology",
            Self::Other => "other",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for EntityKind {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(match s {
            "jira_ticket" => Self::JiraTicket,
            "project" => Self::Project,
            "person" => Self::Person,
            "deadline" => Self::Deadline,
            "document" => Self::Document,
            "url" => Self::Url,
            "metric" => Self::Metric,
            "technology" => Self::Technology,
            _ => Self::Other,
        })
    }
}

/// A typed, deduplicated fact extracted from conversation turns.
///
/// The key is a deterministic function of (kind, normalized value), so two
/// extractions of the same fact collide and merge instead of duplicating.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    pub key: String,
    pub kind: EntityKind,
    pub value: String,
    pub context: String,
    pub conversation_key: String,
    pub relevance_score: f64,
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(default)]
    pub extraction_methods: Vec<String>,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

impl Entity {
    pub fn new(
        kind: EntityKind,
        value: impl Into<String>,
        context: impl Into<String>,
        conversation_key: impl Into<String>,
        relevance_score: f64,
        method: impl Into<String>,
    ) -> Self {
        let value = canonical_value(kind, &value.into());
        let now = Utc::now();
        Self {
            key: entity_key(kind, &value),
            kind,
            aliases: vec![value.clone()],
            value,
            context: context.into(),
            conversation_key: conversation_key.into(),
            relevance_score,
            extraction_methods: vec![method.into()],
            metadata: serde_json::Map::new(),
            first_seen: now,
            last_seen: now,
        }
    }
}

/// Canonical stored form of a value: tickets are uppercased, everything else
/// keeps its casing with whitespace collapsed.
pub fn canonical_value(kind: EntityKind, value: &str) -> String {
    let collapsed = collapse_whitespace(value.trim());
    match kind {
        EntityKind::JiraTicket => collapsed.to_uppercase(),
        _ => collapsed,
    }
}

/// Deterministic entity key: `kind:lower(trim(collapse_whitespace(value)))`.
pub fn entity_key(kind: EntityKind, value: &str) -> String {
    format!("{}:{}", kind, collapse_whitespace(value.trim()).to_lowercase())
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Merge two entities with the same key.
///
/// Primary is the one with the higher relevance score; context is the
/// longer; aliases union case-insensitively; metadata merges secondary into
/// primary; extraction methods accumulate as a sorted set; any method
/// containing "ai" earns a 1.1x relevance boost, capped at `score_ceiling`;
/// value is the longer string; first/last seen widen.
pub fn merge_entities(a: Entity, b: Entity, score_ceiling: f64) -> Entity {
    debug_assert_eq!(a.key, b.key);

    let (primary, secondary) = if b.relevance_score > a.relevance_score {
        (b, a)
    } else {
        (a, b)
    };

    let mut merged = primary.clone();

    if secondary.context.len() > merged.context.len() {
        merged.context = secondary.context.clone();
    }
    if secondary.value.len() > merged.value.len() {
        merged.value = secondary.value.clone();
    }

    // Case-insensitive alias union, preserving first-seen casing.
    let mut seen: BTreeSet<String> = merged.aliases.iter().map(|a| a.to_lowercase()).collect();
    for alias in &secondary.aliases {
        if seen.insert(alias.to_lowercase()) {
            merged.aliases.push(alias.clone());
        }
    }

    for (k, v) in &secondary.metadata {
        merged.metadata.insert(k.clone(), v.clone());
    }

    let methods: BTreeSet<String> = primary
        .extraction_methods
        .iter()
        .chain(secondary.extraction_methods.iter())
        .cloned()
        .collect();
    merged.extraction_methods = methods.into_iter().collect();

    let ai_assisted = merged
        .extraction_methods
        .iter()
        .any(|m| m.contains("ai"));
    let base = primary.relevance_score.max(secondary.relevance_score);
    merged.relevance_score = if ai_assisted {
        (base * AI_BOOST).min(score_ceiling)
    } else {
        base.min(score_ceiling)
    };

    merged.first_seen = primary.first_seen.min(secondary.first_seen);
    merged.last_seen = primary.last_seen.max(secondary.last_seen);

    merged
}

/// Per-conversation rollup returned by [`EntityStore::conversation_summary`].
#[derive(Debug, Clone, Serialize)]
pub struct ConversationEntitySummary {
    pub total: usize,
    pub by_type: Vec<(String, usize)>,
    pub recent_keys: Vec<String>,
    /// Advisory co-occurrence observations (project↔ticket, etc).
    pub relationships: Vec<String>,
}

struct Patterns {
    ticket: Regex,
    url: Regex,
    quoted: Regex,
    capitalized_span: Regex,
    iso_date: Regex,
    long_date: Regex,
    percent: Regex,
}

impl Patterns {
    fn compile() -> Self {
        Self {
            ticket: Regex::new(r"\b[A-Z][A-Z0-9]{1,9}-\d{1,6}\b").unwrap(),
            url: Regex::new(r#"https?://[^\s<>"')]+"#).unwrap(),
            quoted: Regex::new(r#""([^"]{3,80})""#).unwrap(),
            capitalized_span: Regex::new(r"\b[A-Z][a-z]+(?: [A-Z][a-z]+)+\b").unwrap(),
            iso_date: Regex::new(r"\b\d{4}-\d{2}-\d{2}\b").unwrap(),
            long_date: Regex::new(
                r"\b(?:January|February|March|April|May|June|July|August|September|October|November|December) \d{1,2}(?:, \d{4})?\b",
            )
            .unwrap(),
            percent: Regex::new(r"\b\d+(?:\.\d+)?%").unwrap(),
        }
    }
}

/// Words that flag a capitalized span or keyword as a technology mention.
const TECHNOLOGY_KEYWORDS: &[&str] = &[
    "api",
    "automation",
    "database",
    "kubernetes",
    "pipeline",
    "workflow",
    "integration",
    "embedding",
    "webhook",
];

/// Canonical, deduplicated, searchable typed facts per conversation.
///
/// Storage is the shared KV surface: one record per entity plus a per-
/// conversation index of keys. Upserts are serialized per (conversation,
/// key) so concurrent extractors can't clobber each other's merges.
pub struct EntityStore {
    store: Arc<dyn KvStore>,
    patterns: Patterns,
    score_ceiling: f64,
    upsert_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl EntityStore {
    pub fn new(store: Arc<dyn KvStore>, score_ceiling: f64) -> Self {
        Self {
            store,
            patterns: Patterns::compile(),
            score_ceiling,
            upsert_locks: DashMap::new(),
        }
    }

    /// Regex/heuristic extraction for well-formed tokens. In-process, no I/O.
    pub fn extract_pattern_entities(
        &self,
        text: &str,
        conversation_id: &ConversationId,
        context: &str,
    ) -> Vec<Entity> {
        let conv_key = conversation_id.key();
        let mut out: Vec<Entity> = Vec::new();
        let mut push = |kind: EntityKind, value: &str, score: f64| {
            out.push(Entity::new(
                kind,
                value,
                context,
                conv_key.clone(),
                score,
                "regex_pattern",
            ));
        };

        for m in self.patterns.ticket.find_iter(text) {
            push(EntityKind::JiraTicket, m.as_str(), 1.2);
        }
        for m in self.patterns.url.find_iter(text) {
            push(EntityKind::Url, m.as_str().trim_end_matches(['.', ',']), 1.0);
        }
        for c in self.patterns.quoted.captures_iter(text) {
            push(EntityKind::Document, &c[1], 0.9);
        }
        for m in self.patterns.capitalized_span.find_iter(text) {
            let span = m.as_str();
            // Date phrases match the capitalized-span shape too; skip them
            // here, the date patterns below claim them as deadlines.
            if self.patterns.long_date.is_match(span) {
                continue;
            }
            push(EntityKind::Project, span, 1.0);
        }
        for m in self.patterns.iso_date.find_iter(text) {
            push(EntityKind::Deadline, m.as_str(), 1.0);
        }
        for m in self.patterns.long_date.find_iter(text) {
            push(EntityKind::Deadline, m.as_str(), 1.0);
        }
        for m in self.patterns.percent.find_iter(text) {
            push(EntityKind::Metric, m.as_str(), 0.8);
        }
        for word in text.split_whitespace() {
            let bare = word.trim_matches(|c: char| !c.is_alphanumeric());
            if TECHNOLOGY_KEYWORDS.contains(&bare.to_lowercase().as_str()) {
                push(EntityKind::Technology, bare, 0.7);
            }
        }

        // Collapse duplicates found within this single pass.
        dedupe_batch(out, self.score_ceiling)
    }

    /// Upsert a batch of entities for a conversation. Existing entities with
    /// the same key are merged, not replaced.
    pub fn store_entities(
        &self,
        entities: Vec<Entity>,
        conversation_id: &ConversationId,
    ) -> Result<usize> {
        let entities = dedupe_batch(entities, self.score_ceiling);
        let conv_key = conversation_id.key();
        let mut stored = 0usize;

        for entity in entities {
            let record_key = format!("entities:{}:{}", conv_key, entity.key);
            let lock = self
                .upsert_locks
                .entry(record_key.clone())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone();
            let _guard = lock.lock().unwrap();

            let merged = match get_json::<Entity>(self.store.as_ref(), &record_key)? {
                Some(existing) => merge_entities(existing, entity, self.score_ceiling),
                None => entity,
            };
            let key = merged.key.clone();
            put_json(self.store.as_ref(), &record_key, &merged, Some(ENTITY_TTL_SECS))?;
            self.index_add(&conv_key, &key)?;
            stored += 1;
        }

        debug!(conversation = %conv_key, stored, "entities stored");
        Ok(stored)
    }

    /// Keyword search over one conversation's entities, ordered by
    /// descending relevance and tie-broken by recency.
    pub fn search_entities(
        &self,
        keywords: &[String],
        conversation_id: &ConversationId,
        limit: usize,
    ) -> Result<Vec<Entity>> {
        let conv_key = conversation_id.key();
        let keys = self.index_keys(&conv_key)?;

        let mut scored: Vec<(f64, Entity)> = Vec::new();
        for key in keys {
            let record_key = format!("entities:{}:{}", conv_key, key);
            let Some(entity) = get_json::<Entity>(self.store.as_ref(), &record_key)? else {
                continue;
            };
            let overlap = keyword_overlap(&entity, keywords);
            if overlap > 0.0 {
                scored.push((overlap * entity.relevance_score, entity));
            }
        }

        scored.sort_by(|(sa, ea), (sb, eb)| {
            sb.partial_cmp(sa)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(eb.last_seen.cmp(&ea.last_seen))
        });

        Ok(scored.into_iter().take(limit).map(|(_, e)| e).collect())
    }

    /// Rollup counts plus simple co-occurrence observations.
    pub fn conversation_summary(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<ConversationEntitySummary> {
        let conv_key = conversation_id.key();
        let keys = self.index_keys(&conv_key)?;

        let mut entities: Vec<Entity> = Vec::new();
        for key in &keys {
            let record_key = format!("entities:{}:{}", conv_key, key);
            if let Some(e) = get_json::<Entity>(self.store.as_ref(), &record_key)? {
                entities.push(e);
            }
        }

        let mut by_type: std::collections::BTreeMap<String, usize> = Default::default();
        for e in &entities {
            *by_type.entry(e.kind.to_string()).or_default() += 1;
        }

        let mut by_recency = entities.clone();
        by_recency.sort_by(|a, b| b.last_seen.cmp(&a.last_seen));
        let recent_keys: Vec<String> = by_recency.iter().take(10).map(|e| e.key.clone()).collect();

        let mut relationships = Vec::new();
        let count = |k: &str| by_type.get(k).copied().unwrap_or(0);
        if count("project") > 0 && count("jira_ticket") > 0 {
            relationships.push(format!(
                "{} tickets referenced alongside {} projects",
                count("jira_ticket"),
                count("project")
            ));
        }
        if count("person") > 0 && (count("jira_ticket") > 0 || count("project") > 0) {
            relationships.push(format!(
                "{} people mentioned with project or ticket references",
                count("person")
            ));
        }
        if count("deadline") > 0 && (count("project") > 0 || count("jira_ticket") > 0) {
            relationships.push(format!(
                "{} deadlines associated with tracked work",
                count("deadline")
            ));
        }

        Ok(ConversationEntitySummary {
            total: entities.len(),
            by_type: by_type.into_iter().collect(),
            recent_keys,
            relationships,
        })
    }

    fn index_add(&self, conv_key: &str, entity_key: &str) -> Result<()> {
        let index_key = format!("entities_index:{conv_key}");
        let mut keys: Vec<String> =
            get_json(self.store.as_ref(), &index_key)?.unwrap_or_default();
        if !keys.iter().any(|k| k == entity_key) {
            keys.push(entity_key.to_string());
            put_json(self.store.as_ref(), &index_key, &keys, Some(ENTITY_TTL_SECS))?;
        }
        Ok(())
    }

    fn index_keys(&self, conv_key: &str) -> Result<Vec<String>> {
        let index_key = format!("entities_index:{conv_key}");
        Ok(get_json(self.store.as_ref(), &index_key)?.unwrap_or_default())
    }
}

/// Merge duplicates inside one extraction batch before touching storage, so
/// a regex hit and an AI hit for the same fact produce a single write.
pub fn dedupe_batch(entities: Vec<Entity>, score_ceiling: f64) -> Vec<Entity> {
    let mut map: std::collections::BTreeMap<String, Entity> = Default::default();
    let mut merged_count = 0usize;
    for entity in entities {
        match map.remove(&entity.key) {
            Some(existing) => {
                map.insert(
                    entity.key.clone(),
                    merge_entities(existing, entity, score_ceiling),
                );
                merged_count += 1;
            }
            None => {
                map.insert(entity.key.clone(), entity);
            }
        }
    }
    if merged_count > 0 {
        debug!(merged = merged_count, "deduplicated extraction batch");
    }
    map.into_values().collect()
}

fn keyword_overlap(entity: &Entity, keywords: &[String]) -> f64 {
    if keywords.is_empty() {
        return 0.0;
    }
    let value = entity.value.to_lowercase();
    let context = entity.context.to_lowercase();
    let aliases: Vec<String> = entity.aliases.iter().map(|a| a.to_lowercase()).collect();

    let mut score = 0.0;
    for kw in keywords {
        let kw = kw.to_lowercase();
        if kw.len() < 2 {
            continue;
        }
        if value.contains(&kw) || aliases.iter().any(|a| a.contains(&kw)) {
            score += 1.0;
        } else if context.contains(&kw) {
            score += 0.5;
        }
    }
    score
}

impl std::fmt::Debug for EntityStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityStore")
            .field("score_ceiling", &self.score_ceiling)
            .finish()
    }
}

#[allow(dead_code)]
fn _assert_send_sync() {
    fn check<T: Send + Sync>() {}
    check::<EntityStore>();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SqliteStore;

    fn conv() -> ConversationId {
        ConversationId::new("C9", "root")
    }

    fn store() -> EntityStore {
        EntityStore::new(Arc::new(SqliteStore::open_in_memory().unwrap()), 2.0)
    }

    fn ticket(score: f64, context: &str, method: &str) -> Entity {
        let mut e = Entity::new(
            EntityKind::JiraTicket,
            "AUTOPILOT-123",
            context,
            conv().key(),
            score,
            method,
        );
        e.aliases = vec!["AUTOPILOT-123".to_string()];
        e
    }

    #[test]
    fn key_derivation_is_deterministic_and_lowercase() {
        assert_eq!(
            entity_key(EntityKind::JiraTicket, "AUTOPILOT-123"),
            "jira_ticket:autopilot-123"
        );
        assert_eq!(
            entity_key(EntityKind::Project, "  UiPath   Autopilot "),
            "project:uipath autopilot"
        );
    }

    #[test]
    fn ticket_values_are_uppercased() {
        let e = Entity::new(
            EntityKind::JiraTicket,
            "autopilot-123",
            "",
            conv().key(),
            1.0,
            "regex_pattern",
        );
        assert_eq!(e.value, "AUTOPILOT-123");
        assert_eq!(e.key, "jira_ticket:autopilot-123");
    }

    #[test]
    fn merge_keeps_longer_context_and_unions_aliases() {
        let mut a = ticket(1.2, "short", "regex_pattern");
        a.aliases = vec!["AUTOPILOT-123".to_string()];
        let mut b = ticket(1.8, "a much longer and richer context string", "gemini_ai");
        b.aliases = vec!["autopilot-123".to_string(), "Autopilot ticket".to_string()];

        let merged = merge_entities(a, b, 2.0);
        assert_eq!(merged.context, "a much longer and richer context string");
        // case-insensitive union: "autopilot-123" collapses into the existing alias
        assert_eq!(merged.aliases.len(), 2);
        assert_eq!(
            merged.extraction_methods,
            vec!["gemini_ai".to_string(), "regex_pattern".to_string()]
        );
    }

    #[test]
    fn merge_applies_ai_boost_with_cap() {
        let a = ticket(1.2, "regex", "regex_pattern");
        let b = ticket(1.8, "ai", "gemini_ai");
        let merged = merge_entities(a, b, 2.0);
        assert!((merged.relevance_score - 1.8 * 1.1).abs() < 1e-9);

        let a = ticket(1.95, "regex", "regex_pattern");
        let b = ticket(1.9, "ai", "gemini_ai");
        let merged = merge_entities(a, b, 2.0);
        assert_eq!(merged.relevance_score, 2.0);
    }

    #[test]
    fn merge_without_ai_methods_has_no_boost() {
        let a = ticket(1.2, "one", "regex_pattern");
        let b = ticket(1.5, "two", "regex_pattern");
        let merged = merge_entities(a, b, 2.0);
        assert!((merged.relevance_score - 1.5).abs() < 1e-9);
    }

    #[test]
    fn merge_is_commutative_on_agreed_fields() {
        let a = ticket(1.2, "short context", "regex_pattern");
        let b = ticket(1.8, "a considerably longer context", "gemini_ai");

        let ab = merge_entities(a.clone(), b.clone(), 2.0);
        let ba = merge_entities(b, a, 2.0);

        assert_eq!(ab.key, ba.key);
        assert_eq!(ab.kind, ba.kind);
        assert_eq!(ab.value, ba.value);
        assert_eq!(ab.context, ba.context);
        assert_eq!(ab.extraction_methods, ba.extraction_methods);
        let alias_set = |e: &Entity| -> BTreeSet<String> {
            e.aliases.iter().map(|a| a.to_lowercase()).collect()
        };
        assert_eq!(alias_set(&ab), alias_set(&ba));
        assert!((ab.relevance_score - ba.relevance_score).abs() < 1e-9);
        assert_eq!(ab.last_seen, ba.last_seen);
    }

    #[test]
    fn pattern_extraction_finds_expected_kinds() {
        let es = store();
        let text = r#"PLAT-42 is blocked on the "Rollout Checklist" for Phoenix Initiative,
            due 2026-09-01, see https://wiki.internal/page — uptime is 99.9% and the api needs work"#;
        let entities = es.extract_pattern_entities(text, &conv(), "test turn");

        let kinds: BTreeSet<String> = entities.iter().map(|e| e.kind.to_string()).collect();
        assert!(kinds.contains("jira_ticket"));
        assert!(kinds.contains("document"));
        assert!(kinds.contains("project"));
        assert!(kinds.contains("deadline"));
        assert!(kinds.contains("url"));
        assert!(kinds.contains("metric"));
        assert!(kinds.contains("technology"));
    }

    #[test]
    fn date_phrases_are_deadlines_not_projects() {
        let es = store();
        let entities = es.extract_pattern_entities(
            "budget review is planned for December 15, 2026",
            &conv(),
            "",
        );
        assert!(entities
            .iter()
            .any(|e| e.kind == EntityKind::Deadline && e.value.contains("December 15")));
        assert!(!entities
            .iter()
            .any(|e| e.kind == EntityKind::Project && e.value.contains("December")));
    }

    #[test]
    fn store_twice_is_idempotent() {
        let es = store();
        let e = ticket(1.2, "ctx", "regex_pattern");
        es.store_entities(vec![e.clone()], &conv()).unwrap();
        es.store_entities(vec![e], &conv()).unwrap();

        let found = es
            .search_entities(&["autopilot".to_string()], &conv(), 10)
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].value, "AUTOPILOT-123");
        // No self-boost: same record merged with itself keeps its score.
        assert!((found[0].relevance_score - 1.2).abs() < 1e-9);
    }

    #[test]
    fn duplicate_keys_merge_on_store() {
        let es = store();
        let regex_hit = ticket(1.2, "found via pattern", "regex_pattern");
        let ai_hit = ticket(1.8, "critical ticket for the autopilot launch", "gemini_ai");

        es.store_entities(vec![regex_hit, ai_hit], &conv()).unwrap();

        let found = es
            .search_entities(&["autopilot".to_string()], &conv(), 10)
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].extraction_methods.len(), 2);
        assert!(found[0].relevance_score > 1.8);
    }

    #[test]
    fn search_orders_by_relevance() {
        let es = store();
        let low = Entity::new(
            EntityKind::Project,
            "Phoenix Initiative",
            "mentioned once",
            conv().key(),
            0.5,
            "regex_pattern",
        );
        let high = Entity::new(
            EntityKind::Project,
            "Phoenix Launch Plan",
            "the main phoenix doc",
            conv().key(),
            1.9,
            "regex_pattern",
        );
        es.store_entities(vec![low, high], &conv()).unwrap();

        let found = es
            .search_entities(&["phoenix".to_string()], &conv(), 10)
            .unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].value, "Phoenix Launch Plan");
    }

    #[test]
    fn search_with_no_overlap_is_empty() {
        let es = store();
        es.store_entities(vec![ticket(1.0, "", "regex_pattern")], &conv())
            .unwrap();
        let found = es
            .search_entities(&["unrelated".to_string()], &conv(), 10)
            .unwrap();
        assert!(found.is_empty());
    }

    #[test]
    fn summary_counts_and_relationships() {
        let es = store();
        let entities = vec![
            ticket(1.2, "", "regex_pattern"),
            Entity::new(
                EntityKind::Project,
                "Phoenix Initiative",
                "",
                conv().key(),
                1.0,
                "regex_pattern",
            ),
            Entity::new(
                EntityKind::Person,
                "Dana Smith",
                "",
                conv().key(),
                1.0,
                "regex_pattern",
            ),
        ];
        es.store_entities(entities, &conv()).unwrap();

        let summary = es.conversation_summary(&conv()).unwrap();
        assert_eq!(summary.total, 3);
        assert!(summary
            .by_type
            .iter()
            .any(|(k, n)| k == "jira_ticket" && *n == 1));
        assert!(!summary.relationships.is_empty());
    }
}
