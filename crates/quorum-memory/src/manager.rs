use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use quorum_core::config::MemoryConfig;
use quorum_core::types::{ConversationId, Turn};

use crate::entities::{Entity, EntityStore};
use crate::error::{MemoryError, Result};
use crate::jobs::{ExtractJob, SummarizeJob};
use crate::store::{get_json, put_json, KvStore};
use crate::tokens::TokenAccountant;

/// Hot-store TTLs (advisory, per the persistence layout).
const TURNS_TTL_SECS: u64 = 24 * 3600;
const SUMMARY_TTL_SECS: u64 = 7 * 24 * 3600;
/// Length of the per-turn stub appended to the interim summary.
const STUB_CHARS: usize = 100;
/// Keyword budget for entity search.
const MAX_KEYWORDS: usize = 10;

/// Rolling narrative summary of turns that have left the live window.
/// `covered_turn_count` only ever grows.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LongTermSummary {
    pub summary: String,
    pub covered_turn_count: usize,
    pub last_updated: Option<DateTime<Utc>>,
}

/// The full context handed to planning: narrative summary + precise live
/// window + relevant entities.
#[derive(Debug, Clone)]
pub struct HybridHistory {
    pub summary_text: String,
    pub summary_turn_count: usize,
    pub live_window_text: String,
    pub live_turn_count: usize,
    pub live_token_count: usize,
    pub relevant_entities: Vec<Entity>,
}

/// Composes the token accountant, entity store, and KV hot store into the
/// hybrid history consumed by the engine, and accepts committed turns.
///
/// Per-conversation writes are serialized through an internal lock map so
/// `commit_exchange` and the background summarizer never interleave.
pub struct MemoryManager {
    store: Arc<dyn KvStore>,
    accountant: TokenAccountant,
    entities: Arc<EntityStore>,
    config: MemoryConfig,
    summarize_tx: Option<mpsc::Sender<SummarizeJob>>,
    extract_tx: Option<mpsc::Sender<ExtractJob>>,
    conv_locks: DashMap<String, Arc<tokio::sync::Mutex<()>>>,
    ticket_pattern: Regex,
    quoted_pattern: Regex,
}

impl MemoryManager {
    pub fn new(
        store: Arc<dyn KvStore>,
        entities: Arc<EntityStore>,
        config: MemoryConfig,
    ) -> Self {
        let accountant =
            TokenAccountant::new(&config.tokenizer, config.bot_names.clone());
        Self {
            store,
            accountant,
            entities,
            config,
            summarize_tx: None,
            extract_tx: None,
            conv_locks: DashMap::new(),
            ticket_pattern: Regex::new(r"\b[A-Z][A-Z0-9]{1,9}-\d{1,6}\b").unwrap(),
            quoted_pattern: Regex::new(r#""([^"]{3,80})""#).unwrap(),
        }
    }

    /// Attach the background worker queues. Without them the manager still
    /// works; summarization and extraction just never run.
    pub fn with_workers(
        mut self,
        summarize_tx: mpsc::Sender<SummarizeJob>,
        extract_tx: mpsc::Sender<ExtractJob>,
    ) -> Self {
        self.summarize_tx = Some(summarize_tx);
        self.extract_tx = Some(extract_tx);
        self
    }

    pub fn accountant(&self) -> &TokenAccountant {
        &self.accountant
    }

    pub fn entities(&self) -> &EntityStore {
        &self.entities
    }

    fn conv_lock(&self, conversation_id: &ConversationId) -> Arc<tokio::sync::Mutex<()>> {
        self.conv_locks
            .entry(conversation_id.key())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    /// Append one committed turn to the conversation's bounded hot ring.
    pub fn append_turn(&self, turn: &Turn) -> Result<()> {
        let key = format!("{}:turns", turn.conversation_id.key());
        let bytes = serde_json::to_vec(turn)?;
        self.store
            .append_bounded_list(&key, &bytes, self.config.max_live_turns)
    }

    /// Load up to `max_live_turns` most recent turns, oldest first.
    pub fn recent_turns(&self, conversation_id: &ConversationId) -> Result<Vec<Turn>> {
        let key = format!("{}:turns", conversation_id.key());
        let rows = self.store.list_head(&key, self.config.max_live_turns)?;
        Ok(rows
            .iter()
            .filter_map(|bytes| serde_json::from_slice(bytes).ok())
            .collect())
    }

    pub fn load_summary(&self, conversation_id: &ConversationId) -> Result<LongTermSummary> {
        let key = format!("{}:long_term_summary", conversation_id.key());
        Ok(get_json(self.store.as_ref(), &key)?.unwrap_or_default())
    }

    /// Commit a new abstractive summary produced by the background worker.
    ///
    /// `newly_covered` is the number of turns the new text integrates on top
    /// of the previous record; the covered count is strictly monotonic and a
    /// regression is rejected. Never touches live-window turns.
    pub async fn apply_summary(
        &self,
        conversation_id: &ConversationId,
        summary_text: String,
        newly_covered: usize,
    ) -> Result<()> {
        let lock = self.conv_lock(conversation_id);
        let _guard = lock.lock().await;

        let current = self.load_summary(conversation_id)?;
        if newly_covered == 0 {
            return Err(MemoryError::SummaryRegression {
                new: current.covered_turn_count,
                current: current.covered_turn_count,
            });
        }

        let record = LongTermSummary {
            summary: summary_text,
            covered_turn_count: current.covered_turn_count + newly_covered,
            last_updated: Some(Utc::now()),
        };
        let key = format!("{}:long_term_summary", conversation_id.key());
        put_json(self.store.as_ref(), &key, &record, Some(SUMMARY_TTL_SECS))?;

        debug!(
            conversation = %conversation_id,
            covered = record.covered_turn_count,
            "long-term summary updated"
        );
        Ok(())
    }

    /// Build the hybrid history for a request.
    ///
    /// Every step degrades independently: a failed entity search yields an
    /// empty entity list, a failed summary read yields an empty summary, and
    /// the history is still returned.
    pub async fn hybrid_history(
        &self,
        conversation_id: &ConversationId,
        current_user_text: &str,
    ) -> HybridHistory {
        let mut turns = match self.recent_turns(conversation_id) {
            Ok(t) => t,
            Err(e) => {
                warn!(conversation = %conversation_id, error = %e, "turn load failed");
                Vec::new()
            }
        };

        // The current query is part of the live window even before it is
        // committed; append it unless it is already the newest stored turn.
        let already_stored = turns
            .last()
            .map(|t| t.text == current_user_text)
            .unwrap_or(false);
        if !already_stored {
            turns.push(Turn::user(conversation_id.clone(), current_user_text));
        }

        let (kept, evicted, stats) = self.accountant.build_window(
            &turns,
            self.config.max_live_tokens,
            self.config.preserve_recent,
        );

        let summary = self
            .load_summary(conversation_id)
            .unwrap_or_else(|e| {
                warn!(conversation = %conversation_id, error = %e, "summary load failed");
                LongTermSummary::default()
            });

        // Hand the evicted turns to the abstractive summarizer without
        // waiting; the interim stub summary below covers the gap.
        if evicted.len() >= 2 {
            if let Some(tx) = &self.summarize_tx {
                let job = SummarizeJob {
                    conversation_id: conversation_id.clone(),
                    evicted_turns: evicted.clone(),
                    existing_summary: summary.summary.clone(),
                };
                if let Err(e) = tx.try_send(job) {
                    warn!(conversation = %conversation_id, error = %e, "summarizer queue full, skipping");
                }
            }
        }

        let summary_text = interim_summary(&summary.summary, &evicted);
        let summary_turn_count = summary.covered_turn_count + evicted.len();

        let keywords = extract_keywords(
            current_user_text,
            &self.ticket_pattern,
            &self.quoted_pattern,
        );
        let relevant_entities = match self
            .entities
            .search_entities(&keywords, conversation_id, MAX_KEYWORDS)
        {
            Ok(found) => found,
            Err(e) => {
                warn!(conversation = %conversation_id, error = %e, "entity search failed");
                Vec::new()
            }
        };

        HybridHistory {
            summary_text,
            summary_turn_count,
            live_window_text: self.accountant.format_window(&kept),
            live_turn_count: kept.len(),
            live_token_count: stats.total_tokens,
            relevant_entities,
        }
    }

    /// Record a completed exchange and queue background entity extraction.
    pub async fn commit_exchange(
        &self,
        conversation_id: &ConversationId,
        user_turn: Turn,
        assistant_turn: Turn,
    ) -> Result<()> {
        let lock = self.conv_lock(conversation_id);
        let _guard = lock.lock().await;

        let user_name = user_turn
            .author
            .name
            .clone()
            .unwrap_or_else(|| "user".to_string());
        let query = user_turn.text.clone();
        let answer = assistant_turn.text.clone();

        self.append_turn(&user_turn)?;
        self.append_turn(&assistant_turn)?;

        // Best-effort TTL refresh on the scalar conversation marker.
        let marker_key = conversation_id.key();
        let _ = self.store.put(&marker_key, b"1", Some(TURNS_TTL_SECS));

        if let Some(tx) = &self.extract_tx {
            let job = ExtractJob {
                conversation_id: conversation_id.clone(),
                query,
                answer,
                user_name: user_name.clone(),
                context: format!("Exchange with {user_name}"),
            };
            if let Err(e) = tx.try_send(job) {
                warn!(conversation = %conversation_id, error = %e, "extractor queue full, skipping");
            }
        }

        Ok(())
    }
}

/// Existing summary plus first-`STUB_CHARS` stubs of each evicted turn.
fn interim_summary(existing: &str, evicted: &[Turn]) -> String {
    if evicted.is_empty() {
        return existing.to_string();
    }
    let mut out = existing.to_string();
    for turn in evicted {
        let stub: String = turn.text.chars().take(STUB_CHARS).collect();
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(&format!("[{}: {}]", turn.speaker.label(), stub));
    }
    out
}

/// Words too common to be useful search keywords.
const STOPLIST: &[&str] = &[
    "the", "and", "for", "are", "was", "were", "what", "when", "where", "who", "why", "how",
    "about", "with", "this", "that", "these", "those", "can", "you", "your", "our", "has",
    "have", "had", "does", "did", "will", "would", "could", "should", "there", "their", "its",
    "status", "please", "any", "all", "get", "got", "some", "from", "into", "out", "not",
];

/// Pull search keywords from the user's query: ticket ids, quoted phrases,
/// capitalized words, and stoplist-filtered vocabulary, capped at ten.
fn extract_keywords(text: &str, ticket: &Regex, quoted: &Regex) -> Vec<String> {
    let mut keywords: Vec<String> = Vec::new();
    let mut push = |kw: String| {
        let lower = kw.to_lowercase();
        if !keywords.iter().any(|k: &String| k.to_lowercase() == lower) {
            keywords.push(kw);
        }
    };

    for m in ticket.find_iter(text) {
        push(m.as_str().to_string());
    }
    for c in quoted.captures_iter(text) {
        push(c[1].to_string());
    }
    for word in text.split_whitespace() {
        let bare: String = word
            .trim_matches(|c: char| !c.is_alphanumeric() && c != '-')
            .to_string();
        if bare.len() < 3 || !bare.chars().all(|c| c.is_alphanumeric() || c == '-') {
            continue;
        }
        if STOPLIST.contains(&bare.to_lowercase().as_str()) {
            continue;
        }
        push(bare);
    }

    keywords.truncate(MAX_KEYWORDS);
    keywords
}
