//! Step 5: turn accumulated tool outcomes into the final answer. Prose
//! comes from the reasoning-tier model, falling to the fast tier on quota
//! exhaustion and to a deterministic template when both fail. Findings,
//! source links, confidence, and followups are assembled from the outcomes
//! themselves, then the text passes the leakage guard.

use std::collections::BTreeSet;
use std::time::Duration;

use tracing::{info, warn};

use quorum_core::types::EngineRequest;
use quorum_model::{ModelError, ModelRequest, ModelTier};
use quorum_progress::{ProgressChannel, ProgressKind};
use quorum_tools::{ToolKind, ToolOutcome, ToolPayload};

use crate::answer::{Confidence, ExecutionSummary, SourceLink, SynthesizedAnswer};
use crate::deps::Dependencies;
use crate::plan::{Plan, StepLog};
use crate::sanitize::sanitize_answer_text;

const MAX_KEY_FINDINGS: usize = 5;
const MAX_SOURCE_LINKS: usize = 5;
const MAX_FOLLOWUPS: usize = 4;

const SYNTHESIS_PROMPT: &str = "\
You synthesize findings from multiple sources into one clear, helpful \
answer. Write natural prose that directly answers the user's question, \
citing sources conversationally. Never emit JSON, tool names, or internal \
bookkeeping. After the answer, add a line reading exactly FOLLOWUPS: and \
then up to three short follow-up questions, one per line.";

/// Produce the final answer. Never fails — every model problem degrades to
/// the template path.
pub async fn run_synthesis(
    deps: &Dependencies,
    request: &EngineRequest,
    plan: &Plan,
    outcomes: &[ToolOutcome],
    steps: &StepLog,
    replanning_iterations: usize,
    progress: &ProgressChannel,
) -> SynthesizedAnswer {
    narrate_coverage(outcomes, progress);

    let key_findings = extract_key_findings(outcomes);
    let source_links = build_source_links(outcomes);

    let (prose, model_followups) =
        match synthesize_prose(deps, request, plan, outcomes, progress).await {
            Some((text, followups)) => (text, followups),
            None => (template_answer(request, outcomes), Vec::new()),
        };

    let confidence = assess_confidence(outcomes);
    let suggested_followups = merge_followups(outcomes, model_followups);
    let text = sanitize_answer_text(prose, &key_findings);

    progress.emit(
        ProgressKind::Generating,
        "response_ready",
        &format!(
            "Prepared an answer with {} key insight{} and {} source{}.",
            key_findings.len(),
            if key_findings.len() == 1 { "" } else { "s" },
            source_links.len(),
            if source_links.len() == 1 { "" } else { "s" },
        ),
    );

    // A phase where nothing succeeded can't be answered with authority;
    // hand the judgment back to the user.
    let requires_human_input = !outcomes.is_empty() && outcomes.iter().all(|o| !o.success);

    SynthesizedAnswer {
        text,
        key_findings,
        source_links,
        confidence,
        suggested_followups,
        requires_human_input,
        execution_summary: ExecutionSummary {
            steps_completed: steps.completed_count(),
            total_steps: steps.len(),
            replanning_iterations,
        },
    }
}

/// "Combining insights from N team discussions, M web sources…"
fn narrate_coverage(outcomes: &[ToolOutcome], progress: &ProgressChannel) {
    let mut sources = Vec::new();
    let count = |kind: ToolKind| outcomes.iter().filter(|o| o.kind == kind && o.success).count();

    let semantic = count(ToolKind::SemanticSearch);
    if semantic > 0 {
        sources.push(format!("{semantic} team discussion{}", s(semantic)));
    }
    let web = count(ToolKind::WebSearch);
    if web > 0 {
        sources.push(format!("{web} web source{}", s(web)));
    }
    let tickets = count(ToolKind::TicketsDocs);
    if tickets > 0 {
        sources.push(format!("{tickets} project resource{}", s(tickets)));
    }
    let calendar = count(ToolKind::CalendarOp);
    if calendar > 0 {
        sources.push(format!("{calendar} meeting action{}", s(calendar)));
    }

    let details = if sources.is_empty() {
        "Putting together the best answer I can…".to_string()
    } else {
        format!("Combining insights from {}…", sources.join(", "))
    };
    progress.emit(ProgressKind::Synthesizing, "synthesis", &details);
}

/// Model prose with tier fallback. Returns `None` when both tiers fail.
async fn synthesize_prose(
    deps: &Dependencies,
    request: &EngineRequest,
    plan: &Plan,
    outcomes: &[ToolOutcome],
    progress: &ProgressChannel,
) -> Option<(String, Vec<String>)> {
    let user_prompt = build_synthesis_prompt(request, plan, outcomes);
    let deadline = Duration::from_millis(deps.config.deadlines.synthesis_ms);

    let req = ModelRequest::new(SYNTHESIS_PROMPT, user_prompt, ModelTier::Reasoning)
        .with_deadline(deadline)
        .with_max_tokens(5_000);

    let raw = match deps.model.generate(&req).await {
        Ok(text) => Some(text),
        Err(e) if e.is_quota() => {
            warn!("synthesis quota exhausted on reasoning tier, retrying on fast tier");
            progress.emit(
                ProgressKind::Retry,
                "synthesis_fallback",
                "Switching to a faster model to finish up…",
            );
            let fast = ModelRequest {
                tier: ModelTier::Fast,
                ..req
            };
            match deps.model.generate(&fast).await {
                Ok(text) => Some(text),
                Err(e2) => {
                    warn!(error = %e2, "fast tier synthesis also failed");
                    None
                }
            }
        }
        Err(ModelError::Cancelled) => None,
        Err(e) => {
            warn!(error = %e, "synthesis failed");
            None
        }
    }?;

    info!(chars = raw.len(), "synthesis prose generated");
    Some(split_followups(&raw))
}

/// Split the trailing `FOLLOWUPS:` block off the prose.
fn split_followups(raw: &str) -> (String, Vec<String>) {
    let Some(idx) = raw.find("FOLLOWUPS:") else {
        return (raw.trim().to_string(), Vec::new());
    };
    let (prose, tail) = raw.split_at(idx);
    let followups = tail
        .trim_start_matches("FOLLOWUPS:")
        .lines()
        .map(|line| line.trim().trim_start_matches(['-', '*']).trim())
        .filter(|line| !line.is_empty())
        .take(3)
        .map(String::from)
        .collect();
    (prose.trim().to_string(), followups)
}

fn build_synthesis_prompt(
    request: &EngineRequest,
    plan: &Plan,
    outcomes: &[ToolOutcome],
) -> String {
    let mut prompt = format!("Original query: \"{}\"\n", request.user_text);
    if let Some(name) = &request.user_profile.first_name {
        prompt.push_str(&format!("Asked by: {name}"));
        if let Some(title) = &request.user_profile.title {
            prompt.push_str(&format!(" ({title})"));
        }
        prompt.push('\n');
    }
    if !plan.synthesis_approach.is_empty() {
        prompt.push_str(&format!("Approach: {}\n", plan.synthesis_approach));
    }

    prompt.push_str("\nFindings:\n");
    for outcome in outcomes.iter().filter(|o| o.success) {
        prompt.push_str(&summarize_outcome(outcome));
    }
    let failed = outcomes.iter().filter(|o| !o.success).count();
    if failed > 0 {
        prompt.push_str(&format!(
            "\n({failed} source{} couldn't be reached; answer from what's available.)\n",
            s(failed)
        ));
    }

    prompt.push_str("\nWrite the answer now.");
    prompt
}

/// Brief text summary of one successful outcome, for the synthesis prompt.
fn summarize_outcome(outcome: &ToolOutcome) -> String {
    let Some(payload) = &outcome.payload else {
        return String::new();
    };
    match payload {
        ToolPayload::Semantic(results) => {
            let mut out = format!(
                "- Team discussions ({} hits for \"{}\"):\n",
                results.hits.len(),
                outcome.input_echo
            );
            for hit in results.hits.iter().take(2) {
                out.push_str(&format!("  - {}\n", first_chars(&hit.content, 150)));
            }
            out
        }
        ToolPayload::Web(answer) => format!(
            "- Web ({} citations): {}\n",
            answer.citations.len(),
            first_chars(&answer.content, 300)
        ),
        ToolPayload::Tickets(result) => {
            let mut out = format!("- Tickets/docs ({} items):\n", result.items.len());
            for item in result.items.iter().take(3) {
                out.push_str(&format!(
                    "  - [{}] {}: {}\n",
                    item.item_type,
                    item.title,
                    first_chars(&item.summary, 100)
                ));
            }
            out
        }
        ToolPayload::Calendar(outcome) => format!("- Calendar: {}\n", outcome.detail),
    }
}

/// Deterministic answer used when both model tiers fail.
fn template_answer(request: &EngineRequest, outcomes: &[ToolOutcome]) -> String {
    let mut sources = Vec::new();
    let count = |kind: ToolKind| outcomes.iter().filter(|o| o.kind == kind && o.success).count();
    let semantic = count(ToolKind::SemanticSearch);
    if semantic > 0 {
        sources.push(format!("{semantic} team discussion{}", s(semantic)));
    }
    let web = count(ToolKind::WebSearch);
    if web > 0 {
        sources.push(format!("{web} web source{}", s(web)));
    }
    let tickets = count(ToolKind::TicketsDocs);
    if tickets > 0 {
        sources.push(format!("{tickets} project resource{}", s(tickets)));
    }

    let mut parts = vec![format!(
        "Based on your question about \"{}\", here's what I found.",
        request.user_text
    )];
    if sources.is_empty() {
        parts.push("I searched through multiple sources for relevant information.".to_string());
    } else {
        parts.push(format!(
            "I searched through {} and found relevant information.",
            sources.join(", ")
        ));
    }
    parts.push(
        "I'm experiencing high demand right now, so this is a brief summary — \
         feel free to ask for more detail on any part."
            .to_string(),
    );
    parts.join(" ")
}

/// Scan successful outcomes per tool family for up to five findings.
fn extract_key_findings(outcomes: &[ToolOutcome]) -> Vec<String> {
    let mut findings = Vec::new();
    for outcome in outcomes.iter().filter(|o| o.success) {
        let Some(payload) = &outcome.payload else {
            continue;
        };
        match payload {
            ToolPayload::Semantic(results) if !results.hits.is_empty() => {
                findings.push(format!(
                    "Found {} relevant team discussion{} in the knowledge base",
                    results.hits.len(),
                    s(results.hits.len())
                ));
            }
            ToolPayload::Web(answer) if !answer.content.is_empty() => {
                findings.push(format!(
                    "Located current web information on the topic ({} source{})",
                    answer.citations.len(),
                    s(answer.citations.len())
                ));
            }
            ToolPayload::Tickets(result) if result.is_success() => {
                findings.push(format!(
                    "Retrieved {} project ticket{} and document{}",
                    result.items.len(),
                    s(result.items.len()),
                    s(result.items.len())
                ));
            }
            ToolPayload::Calendar(c) => {
                findings.push(format!("Calendar: {}", c.detail));
            }
            _ => {}
        }
    }
    findings.truncate(MAX_KEY_FINDINGS);
    findings
}

/// Citations and structured items become provenance links, deduplicated by
/// URL and capped at five. Only absolute URLs with non-empty titles pass.
fn build_source_links(outcomes: &[ToolOutcome]) -> Vec<SourceLink> {
    let mut links: Vec<SourceLink> = Vec::new();
    let mut seen_urls: BTreeSet<String> = BTreeSet::new();

    let mut push = |title: &str, url: &str, link_type: String| {
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return;
        }
        if !seen_urls.insert(url.to_string()) {
            return;
        }
        let title = if title.is_empty() { "Source" } else { title };
        links.push(SourceLink {
            title: title.to_string(),
            url: url.to_string(),
            link_type,
        });
    };

    for outcome in outcomes.iter().filter(|o| o.success) {
        match &outcome.payload {
            Some(ToolPayload::Web(answer)) => {
                for citation in answer.citations.iter().take(3) {
                    push(&citation.title, &citation.url, "web".to_string());
                }
            }
            Some(ToolPayload::Tickets(result)) => {
                for item in &result.items {
                    push(&item.title, &item.url, item.item_type.to_string());
                }
            }
            _ => {}
        }
    }

    links.truncate(MAX_SOURCE_LINKS);
    links
}

/// Confidence from (success rate, substantive content):
/// rate ≥ 0.8 and substantive ⇒ high; rate ≥ 0.5 or any success ⇒ medium;
/// else low. A request that needed no tools has nothing failing, so it
/// lands on medium.
fn assess_confidence(outcomes: &[ToolOutcome]) -> Confidence {
    if outcomes.is_empty() {
        return Confidence::Medium;
    }
    let successful = outcomes.iter().filter(|o| o.success).count();
    let rate = successful as f64 / outcomes.len() as f64;
    let substantive = outcomes.iter().any(|o| o.success && has_content(o));

    if rate >= 0.8 && substantive {
        Confidence::High
    } else if rate >= 0.5 || successful > 0 {
        Confidence::Medium
    } else {
        Confidence::Low
    }
}

fn has_content(outcome: &ToolOutcome) -> bool {
    match &outcome.payload {
        Some(ToolPayload::Semantic(r)) => !r.hits.is_empty(),
        Some(ToolPayload::Web(a)) => !a.content.is_empty(),
        Some(ToolPayload::Tickets(t)) => !t.items.is_empty(),
        Some(ToolPayload::Calendar(_)) => true,
        None => false,
    }
}

/// Orchestrator-suggested followups merged with the model's, deduplicated
/// case-insensitively and truncated to four.
fn merge_followups(outcomes: &[ToolOutcome], model_followups: Vec<String>) -> Vec<String> {
    let mut followups: Vec<String> = Vec::new();
    let mut seen: BTreeSet<String> = BTreeSet::new();
    let mut push = |f: String| {
        if seen.insert(f.to_lowercase()) {
            followups.push(f);
        }
    };

    for f in model_followups {
        push(f);
    }

    let succeeded =
        |kind: ToolKind| outcomes.iter().any(|o| o.kind == kind && o.success);
    if succeeded(ToolKind::WebSearch) {
        push("What developments should we watch for next?".to_string());
    }
    if succeeded(ToolKind::TicketsDocs) {
        push("Want me to pull the latest ticket updates?".to_string());
    }
    if succeeded(ToolKind::SemanticSearch) {
        push("Should I dig deeper into the team discussions?".to_string());
    }
    if succeeded(ToolKind::CalendarOp) {
        push("Anything else to schedule while we're at it?".to_string());
    }

    followups.truncate(MAX_FOLLOWUPS);
    followups
}

fn first_chars(text: &str, max: usize) -> String {
    let cut: String = text.chars().take(max).collect();
    if cut.len() < text.len() {
        format!("{cut}…")
    } else {
        cut
    }
}

fn s(n: usize) -> &'static str {
    if n == 1 {
        ""
    } else {
        "s"
    }
}
