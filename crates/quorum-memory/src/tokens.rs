use tiktoken_rs::CoreBPE;
use tracing::warn;

use quorum_core::types::{Speaker, Turn};

/// A turn rendered for the live window: speaker-prefixed text plus its
/// precise token count under the configured tokenizer.
#[derive(Debug, Clone)]
pub struct TokenizedTurn {
    pub speaker_label: &'static str,
    pub formatted_text: String,
    pub token_count: usize,
}

/// Accounting from one `build_window` pass.
#[derive(Debug, Clone, Default)]
pub struct WindowStats {
    pub kept_count: usize,
    pub evicted_count: usize,
    pub total_tokens: usize,
    pub budget: usize,
    /// True when preserved recent turns alone exceed the budget.
    pub budget_violated: bool,
}

/// Comparison of the cheap character estimate against the precise count,
/// kept for observability dashboards.
#[derive(Debug, Clone)]
pub struct EfficiencyStats {
    pub char_estimate: usize,
    pub precise_count: usize,
    pub token_difference: i64,
    pub accuracy_percentage: f64,
    pub is_more_efficient: bool,
}

/// Counts tokens and builds token-budgeted windows over turn sequences.
///
/// The tokenizer id is a config knob; counting is deterministic for a given
/// tokenizer. If the tokenizer can't be constructed or fails, counting
/// degrades to a chars/4 estimate with a logged warning — it never panics.
pub struct TokenAccountant {
    bpe: Option<CoreBPE>,
    bot_names: Vec<String>,
}

impl TokenAccountant {
    pub fn new(tokenizer_id: &str, bot_names: Vec<String>) -> Self {
        let bpe = match tokenizer_id {
            "cl100k_base" => tiktoken_rs::cl100k_base().ok(),
            "o200k_base" => tiktoken_rs::o200k_base().ok(),
            "p50k_base" => tiktoken_rs::p50k_base().ok(),
            "r50k_base" => tiktoken_rs::r50k_base().ok(),
            other => {
                warn!(tokenizer = other, "unknown tokenizer id, using cl100k_base");
                tiktoken_rs::cl100k_base().ok()
            }
        };
        if bpe.is_none() {
            warn!(tokenizer = tokenizer_id, "tokenizer unavailable, falling back to chars/4 estimates");
        }
        let bot_names = bot_names.into_iter().map(|n| n.to_lowercase()).collect();
        Self { bpe, bot_names }
    }

    /// Count tokens in a string. Always returns a number.
    pub fn count_tokens(&self, text: &str) -> usize {
        match &self.bpe {
            Some(bpe) => bpe.encode_with_special_tokens(text).len(),
            None => estimate_tokens(text),
        }
    }

    /// Render a turn as `Speaker: text` and count its tokens.
    ///
    /// The speaker label is "Assistant" when the turn is an assistant turn,
    /// the author is flagged as a bot, or the author name is in the
    /// configured bot-name set; otherwise "User".
    pub fn tokenize_turn(&self, turn: &Turn) -> TokenizedTurn {
        let is_assistant = turn.speaker == Speaker::Assistant
            || turn.author.is_bot
            || turn
                .author
                .name
                .as_deref()
                .map(|n| self.bot_names.contains(&n.to_lowercase()))
                .unwrap_or(false);

        let label = if is_assistant { "Assistant" } else { "User" };
        let formatted_text = format!("{}: {}", label, turn.text);
        let token_count = self.count_tokens(&formatted_text);

        TokenizedTurn {
            speaker_label: label,
            formatted_text,
            token_count,
        }
    }

    /// Build a token-budgeted window over `turns`.
    ///
    /// Walks backward from the most recent turn. The last `preserve_recent`
    /// turns are always kept, even if that alone blows the budget (logged).
    /// Each earlier turn is kept iff it still fits; the first turn that
    /// doesn't fit evicts itself and everything older, so `kept` is always a
    /// contiguous suffix. Both returned lists are in chronological order.
    pub fn build_window(
        &self,
        turns: &[Turn],
        max_tokens: usize,
        preserve_recent: usize,
    ) -> (Vec<TokenizedTurn>, Vec<Turn>, WindowStats) {
        let tokenized: Vec<TokenizedTurn> = turns.iter().map(|t| self.tokenize_turn(t)).collect();

        let mut kept_rev: Vec<usize> = Vec::new();
        let mut total = 0usize;
        let mut budget_violated = false;

        for (offset, idx) in (0..turns.len()).rev().enumerate() {
            let count = tokenized[idx].token_count;
            if offset < preserve_recent {
                total += count;
                kept_rev.push(idx);
                if total > max_tokens {
                    budget_violated = true;
                }
                continue;
            }
            if total + count > max_tokens {
                break;
            }
            total += count;
            kept_rev.push(idx);
        }

        if budget_violated {
            warn!(
                total_tokens = total,
                budget = max_tokens,
                "preserved recent turns exceed the live-window token budget"
            );
        }

        kept_rev.reverse();
        let first_kept = kept_rev.first().copied().unwrap_or(turns.len());
        let kept: Vec<TokenizedTurn> = kept_rev.into_iter().map(|i| tokenized[i].clone()).collect();
        let evicted: Vec<Turn> = turns[..first_kept].to_vec();

        let stats = WindowStats {
            kept_count: kept.len(),
            evicted_count: evicted.len(),
            total_tokens: total,
            budget: max_tokens,
            budget_violated,
        };

        (kept, evicted, stats)
    }

    /// Newline-joined transcript of the kept window.
    pub fn format_window(&self, kept: &[TokenizedTurn]) -> String {
        kept.iter()
            .map(|t| t.formatted_text.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Compare the cheap character estimate against a precise count.
    pub fn efficiency_report(&self, char_estimate: usize, precise_count: usize) -> EfficiencyStats {
        let diff = precise_count as i64 - char_estimate as i64;
        let accuracy = if precise_count > 0 {
            100.0 - (diff.unsigned_abs() as f64 / precise_count as f64 * 100.0)
        } else {
            100.0
        };
        EfficiencyStats {
            char_estimate,
            precise_count,
            token_difference: diff,
            accuracy_percentage: accuracy,
            is_more_efficient: precise_count < char_estimate,
        }
    }
}

/// Character-based fallback: roughly 4 chars per token, rounded up.
fn estimate_tokens(text: &str) -> usize {
    text.len().div_ceil(4)
}
