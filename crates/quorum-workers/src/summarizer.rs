//! Abstractive conversation summarization: integrate evicted turns into the
//! rolling narrative using the fast model tier, with a concatenated-stub
//! fallback when the model is unavailable.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use quorum_memory::{MemoryManager, SummarizeJob};
use quorum_model::{ModelClient, ModelRequest, ModelTier};

const SUMMARY_DEADLINE: Duration = Duration::from_secs(15);
const STUB_CHARS: usize = 100;

const SUMMARIZER_PROMPT: &str = "\
You summarize team chat conversations into dense, flowing narrative prose — \
never bullet points. Integrate the new messages into the existing summary, \
preserving project names, people, tickets, and decisions, keeping \
chronological flow. Aim for two to four sentences per major topic. Return \
only the updated summary.";

/// Process one summarize job. Never returns an error; failures degrade to
/// the stub fallback and storage problems only log.
pub async fn run_summarize_job(
    memory: &MemoryManager,
    model: Option<&Arc<dyn ModelClient>>,
    job: SummarizeJob,
) {
    let covered = job.evicted_turns.len();
    if covered == 0 {
        return;
    }

    let summary = match model {
        Some(model) => match summarize_with_model(model.as_ref(), &job).await {
            Some(text) => text,
            None => fallback_summary(&job),
        },
        None => fallback_summary(&job),
    };

    match memory
        .apply_summary(&job.conversation_id, summary, covered)
        .await
    {
        Ok(()) => info!(
            conversation = %job.conversation_id,
            turns = covered,
            "long-term summary integrated"
        ),
        Err(e) => warn!(
            conversation = %job.conversation_id,
            error = %e,
            "summary store failed"
        ),
    }
}

async fn summarize_with_model(model: &dyn ModelClient, job: &SummarizeJob) -> Option<String> {
    let transcript: String = job
        .evicted_turns
        .iter()
        .map(|t| format!("{}: {}", t.speaker.label(), t.text))
        .collect::<Vec<_>>()
        .join("\n");

    let user_prompt = format!(
        "EXISTING SUMMARY:\n{}\n\nNEW MESSAGES TO INTEGRATE:\n{}\n\nUpdated summary:",
        if job.existing_summary.is_empty() {
            "No previous summary - this is the start of the conversation."
        } else {
            &job.existing_summary
        },
        transcript,
    );

    let req = ModelRequest::new(SUMMARIZER_PROMPT, user_prompt, ModelTier::Fast)
        .with_deadline(SUMMARY_DEADLINE)
        .with_max_tokens(800);

    match model.generate(&req).await {
        Ok(text) if !text.trim().is_empty() => Some(text.trim().to_string()),
        Ok(_) => {
            warn!("summarizer model returned empty text");
            None
        }
        Err(e) => {
            warn!(error = %e, "summarizer model call failed");
            None
        }
    }
}

/// Degraded summary: existing text plus first-100-char stubs of each turn.
fn fallback_summary(job: &SummarizeJob) -> String {
    let mut out = job.existing_summary.clone();
    for turn in &job.evicted_turns {
        let stub: String = turn.text.chars().take(STUB_CHARS).collect();
        if !out.is_empty() {
            out.push_str(" | ");
        }
        out.push_str(&format!("{}: {}", turn.speaker.label(), stub));
    }
    out
}
