use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::info;

use quorum_memory::{ExtractJob, MemoryManager, SummarizeJob};
use quorum_model::ModelClient;

use crate::extractor::run_extract_job;
use crate::summarizer::run_summarize_job;

/// Owns the background consumer tasks. Each queue gets one consumer; jobs
/// arrive by value and workers never share mutable state with the
/// foreground beyond what they commit through the memory manager.
pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn the summarizer and extractor consumers. Pass `model: None` to
    /// run in degraded mode (stub summaries, pattern-only extraction).
    pub fn spawn(
        memory: Arc<MemoryManager>,
        model: Option<Arc<dyn ModelClient>>,
        mut summarize_rx: mpsc::Receiver<SummarizeJob>,
        mut extract_rx: mpsc::Receiver<ExtractJob>,
    ) -> Self {
        let summarizer_memory = Arc::clone(&memory);
        let summarizer_model = model.clone();
        let summarizer = tokio::spawn(async move {
            while let Some(job) = summarize_rx.recv().await {
                run_summarize_job(&summarizer_memory, summarizer_model.as_ref(), job).await;
            }
            info!("summarizer queue closed, worker exiting");
        });

        let extractor = tokio::spawn(async move {
            while let Some(job) = extract_rx.recv().await {
                run_extract_job(&memory, model.as_ref(), job).await;
            }
            info!("extractor queue closed, worker exiting");
        });

        Self {
            handles: vec![summarizer, extractor],
        }
    }

    /// Wait for the consumers to drain and exit. Callers drop the senders
    /// first; the loops end when the queues close.
    pub async fn join(self) {
        for handle in self.handles {
            let _ = handle.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use quorum_core::config::MemoryConfig;
    use quorum_core::types::{ConversationId, Turn};
    use quorum_memory::{EntityStore, KvStore, SqliteStore};
    use quorum_model::{ModelError, ModelRequest};

    struct ScriptedModel {
        responses: std::sync::Mutex<Vec<Result<String, &'static str>>>,
    }

    impl ScriptedModel {
        fn new(responses: Vec<Result<String, &'static str>>) -> Arc<dyn ModelClient> {
            Arc::new(Self {
                responses: std::sync::Mutex::new(responses),
            })
        }
    }

    #[async_trait]
    impl ModelClient for ScriptedModel {
        fn name(&self) -> &str {
            "scripted"
        }
        async fn generate(&self, _req: &ModelRequest) -> Result<String, ModelError> {
            let mut responses = self.responses.lock().unwrap();
            if responses.is_empty() {
                return Err(ModelError::Unavailable("script exhausted".to_string()));
            }
            responses
                .remove(0)
                .map_err(|e| ModelError::Unavailable(e.to_string()))
        }
    }

    fn memory() -> Arc<MemoryManager> {
        let store: Arc<dyn KvStore> = Arc::new(SqliteStore::open_in_memory().unwrap());
        let entities = Arc::new(EntityStore::new(Arc::clone(&store), 2.0));
        Arc::new(MemoryManager::new(store, entities, MemoryConfig::default()))
    }

    fn conv() -> ConversationId {
        ConversationId::new("C3", "root")
    }

    #[tokio::test]
    async fn summarizer_applies_model_summary() {
        let memory = memory();
        let model = ScriptedModel::new(vec![Ok(
            "The user asked about rollout; the assistant confirmed the date.".to_string(),
        )]);
        let cid = conv();

        run_summarize_job(
            &memory,
            Some(&model),
            SummarizeJob {
                conversation_id: cid.clone(),
                evicted_turns: vec![
                    Turn::user(cid.clone(), "when is rollout?"),
                    Turn::assistant(cid.clone(), "next Tuesday"),
                ],
                existing_summary: String::new(),
            },
        )
        .await;

        let summary = memory.load_summary(&cid).unwrap();
        assert_eq!(summary.covered_turn_count, 2);
        assert!(summary.summary.contains("rollout"));
    }

    #[tokio::test]
    async fn summarizer_falls_back_on_model_failure() {
        let memory = memory();
        let model = ScriptedModel::new(vec![Err("over capacity")]);
        let cid = conv();

        run_summarize_job(
            &memory,
            Some(&model),
            SummarizeJob {
                conversation_id: cid.clone(),
                evicted_turns: vec![
                    Turn::user(cid.clone(), "first question"),
                    Turn::assistant(cid.clone(), "first answer"),
                ],
                existing_summary: "Earlier: greetings.".to_string(),
            },
        )
        .await;

        let summary = memory.load_summary(&cid).unwrap();
        assert!(summary.summary.starts_with("Earlier: greetings."));
        assert!(summary.summary.contains("User: first question"));
        assert_eq!(summary.covered_turn_count, 2);
    }

    #[tokio::test]
    async fn extractor_merges_pattern_and_model_results() {
        let memory = memory();
        // The model reports the same ticket the pattern pass finds, plus a
        // person the patterns can't see.
        let model = ScriptedModel::new(vec![Ok(r#"[
            {"type": "jira_ticket", "value": "AUTOPILOT-123", "context": "release blocker that the team is tracking closely", "importance": 9},
            {"type": "person", "value": "Dana", "context": "owns the rollout", "importance": 6}
        ]"#
        .to_string())]);
        let cid = conv();

        run_extract_job(
            &memory,
            Some(&model),
            ExtractJob {
                conversation_id: cid.clone(),
                query: "Is AUTOPILOT-123 still blocked?".to_string(),
                answer: "Dana says AUTOPILOT-123 clears this week.".to_string(),
                user_name: "alice".to_string(),
                context: String::new(),
            },
        )
        .await;

        let found = memory
            .entities()
            .search_entities(&["autopilot-123".to_string()], &cid, 10)
            .unwrap();
        assert_eq!(found.len(), 1, "pattern and model hits merged into one record");
        let ticket = &found[0];
        assert!(ticket.extraction_methods.contains(&"model_ai".to_string()));
        assert!(ticket.extraction_methods.contains(&"regex_pattern".to_string()));
        // AI participation earns the merge boost.
        assert!(ticket.relevance_score > 1.8);

        let people = memory
            .entities()
            .search_entities(&["dana".to_string()], &cid, 10)
            .unwrap();
        assert_eq!(people.len(), 1);
    }

    #[tokio::test]
    async fn extractor_self_corrects_invalid_json() {
        let memory = memory();
        let model = ScriptedModel::new(vec![
            Ok("here are the entities: type=person value=Dana".to_string()),
            Ok(r#"[{"type": "person", "value": "Dana", "importance": 7}]"#.to_string()),
        ]);
        let cid = conv();

        run_extract_job(
            &memory,
            Some(&model),
            ExtractJob {
                conversation_id: cid.clone(),
                query: "who owns this?".to_string(),
                answer: "Dana owns it.".to_string(),
                user_name: "bob".to_string(),
                context: String::new(),
            },
        )
        .await;

        let people = memory
            .entities()
            .search_entities(&["dana".to_string()], &cid, 10)
            .unwrap();
        assert_eq!(people.len(), 1);
        assert!(people[0]
            .extraction_methods
            .contains(&"model_ai".to_string()));
    }

    #[tokio::test]
    async fn extractor_keeps_pattern_results_when_model_never_conforms() {
        let memory = memory();
        let model = ScriptedModel::new(vec![
            Ok("not json".to_string()),
            Ok("still not json".to_string()),
            Ok("nope".to_string()),
        ]);
        let cid = conv();

        run_extract_job(
            &memory,
            Some(&model),
            ExtractJob {
                conversation_id: cid.clone(),
                query: "status of PLAT-7?".to_string(),
                answer: "PLAT-7 is merged.".to_string(),
                user_name: "alice".to_string(),
                context: String::new(),
            },
        )
        .await;

        let found = memory
            .entities()
            .search_entities(&["plat-7".to_string()], &cid, 10)
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(
            found[0].extraction_methods,
            vec!["regex_pattern".to_string()]
        );
    }

    #[tokio::test]
    async fn pool_drains_queues_and_exits() {
        let memory = memory();
        let (sum_tx, sum_rx) = mpsc::channel(4);
        let (ext_tx, ext_rx) = mpsc::channel(4);
        let pool = WorkerPool::spawn(Arc::clone(&memory), None, sum_rx, ext_rx);

        let cid = conv();
        sum_tx
            .send(SummarizeJob {
                conversation_id: cid.clone(),
                evicted_turns: vec![
                    Turn::user(cid.clone(), "hello there"),
                    Turn::assistant(cid.clone(), "hi"),
                ],
                existing_summary: String::new(),
            })
            .await
            .unwrap();
        ext_tx
            .send(ExtractJob {
                conversation_id: cid.clone(),
                query: "check PLAT-1".to_string(),
                answer: "done".to_string(),
                user_name: "alice".to_string(),
                context: String::new(),
            })
            .await
            .unwrap();

        drop(sum_tx);
        drop(ext_tx);
        pool.join().await;

        assert_eq!(memory.load_summary(&cid).unwrap().covered_turn_count, 2);
        let found = memory
            .entities()
            .search_entities(&["plat-1".to_string()], &cid, 10)
            .unwrap();
        assert_eq!(found.len(), 1);
    }
}
