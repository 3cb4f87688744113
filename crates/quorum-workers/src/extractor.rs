//! Background entity extraction: a pattern pass over the committed
//! exchange, optionally augmented by a model pass whose JSON is parsed with
//! a bounded self-correction loop. Both result sets merge through the
//! entity store's dedup rule before a single storage write.

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tracing::{info, warn};

use quorum_memory::{Entity, EntityKind, ExtractJob, MemoryManager};
use quorum_model::{ModelClient, ModelRequest, ModelTier};

const EXTRACTION_DEADLINE: Duration = Duration::from_secs(15);
/// Re-prompt at most this many times when the model's JSON doesn't parse.
const MAX_CORRECTIONS: usize = 2;

const EXTRACTOR_PROMPT: &str = "\
You extract important entities from a conversation exchange for future \
reference: tickets (PROJ-123), projects, people, deadlines, documents, \
URLs, metrics, and technologies. Only extract factual, specific entities. \
Return ONLY a JSON array where each element is \
{\"type\": \"jira_ticket|project|person|deadline|document|url|metric|technology|other\", \
\"value\": \"...\", \"context\": \"brief context\", \"importance\": 1-10}. \
No markdown fences, no commentary.";

/// Process one extract job. All failures degrade: the pattern results alone
/// are stored when the model pass contributes nothing.
pub async fn run_extract_job(
    memory: &MemoryManager,
    model: Option<&Arc<dyn ModelClient>>,
    job: ExtractJob,
) {
    let store = memory.entities();

    let mut entities = store.extract_pattern_entities(
        &job.query,
        &job.conversation_id,
        &format!("User query by {}", job.user_name),
    );
    entities.extend(store.extract_pattern_entities(
        &job.answer,
        &job.conversation_id,
        "Assistant response with factual information",
    ));

    if let Some(model) = model {
        let ai_entities = extract_with_model(model.as_ref(), &job).await;
        info!(count = ai_entities.len(), "model extraction contributed entities");
        entities.extend(ai_entities);
    }

    if entities.is_empty() {
        return;
    }

    // store_entities folds duplicates (pattern + AI hits for the same fact)
    // through the merge rule before writing, so this is a single commit.
    match store.store_entities(entities, &job.conversation_id) {
        Ok(stored) => info!(
            conversation = %job.conversation_id,
            stored,
            "entities extracted and stored"
        ),
        Err(e) => warn!(
            conversation = %job.conversation_id,
            error = %e,
            "entity storage failed"
        ),
    }
}

/// Untrusted model output element. Unknown fields are rejected.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct EntityDraft {
    #[serde(rename = "type")]
    kind: Option<String>,
    value: Option<String>,
    context: Option<String>,
    importance: Option<f64>,
}

async fn extract_with_model(model: &dyn ModelClient, job: &ExtractJob) -> Vec<Entity> {
    let user_prompt = format!(
        "User ({}): {}\n\nAssistant response: {}\n\nExtract the entities as JSON.",
        job.user_name, job.query, job.answer
    );
    let req = ModelRequest::new(EXTRACTOR_PROMPT, user_prompt, ModelTier::Fast)
        .with_deadline(EXTRACTION_DEADLINE)
        .with_max_tokens(1_000);

    let mut raw = match model.generate(&req).await {
        Ok(text) => text,
        Err(e) => {
            warn!(error = %e, "model entity extraction failed");
            return Vec::new();
        }
    };

    // Parse with bounded self-correction: feed the invalid output and the
    // parser error back to the model, at most twice.
    for attempt in 0..=MAX_CORRECTIONS {
        match parse_entities(&raw, job) {
            Ok(entities) => {
                if attempt > 0 {
                    info!(attempt, "entity JSON parsed after self-correction");
                }
                return entities;
            }
            Err(parse_error) => {
                warn!(attempt, error = %parse_error, "entity JSON parse failed");
                if attempt == MAX_CORRECTIONS {
                    break;
                }
                let correction = format!(
                    "The previous response was not valid JSON.\n\nOriginal response:\n{raw}\n\n\
                     Error: {parse_error}\n\nReturn ONLY the corrected JSON array of entities, \
                     no markdown, no explanations."
                );
                let correction_req =
                    ModelRequest::new(EXTRACTOR_PROMPT, correction, ModelTier::Fast)
                        .with_deadline(EXTRACTION_DEADLINE)
                        .with_max_tokens(1_000);
                match model.generate(&correction_req).await {
                    Ok(text) => raw = text,
                    Err(e) => {
                        warn!(error = %e, "self-correction call failed");
                        break;
                    }
                }
            }
        }
    }

    warn!("giving up on model entity extraction, keeping pattern results only");
    Vec::new()
}

fn parse_entities(raw: &str, job: &ExtractJob) -> Result<Vec<Entity>, String> {
    let fragment = quorum_model::json::extract_array(raw)
        .ok_or_else(|| "no JSON array found in output".to_string())?;
    let drafts: Vec<EntityDraft> =
        serde_json::from_str(fragment).map_err(|e| e.to_string())?;

    let mut entities = Vec::new();
    for draft in drafts {
        let Some(value) = draft.value.filter(|v| !v.trim().is_empty()) else {
            continue;
        };
        let kind: EntityKind = draft
            .kind
            .as_deref()
            .unwrap_or("other")
            .parse()
            .unwrap_or(EntityKind::Other);
        let importance = draft.importance.unwrap_or(5.0).clamp(1.0, 10.0);
        // Importance 1–10 maps onto the 0.2–2.0 relevance scale.
        let relevance = (importance / 5.0).min(2.0);

        let mut entity = Entity::new(
            kind,
            value,
            draft.context.unwrap_or_default(),
            job.conversation_id.key(),
            relevance,
            "model_ai",
        );
        entity.metadata.insert(
            "importance_score".to_string(),
            serde_json::json!(importance),
        );
        entity
            .metadata
            .insert("user_name".to_string(), serde_json::json!(job.user_name));
        entities.push(entity);
    }
    Ok(entities)
}
