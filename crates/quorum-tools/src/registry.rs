use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, warn};

use crate::calendar::Calendar;
use crate::semantic::SemanticIndex;
use crate::tickets::TicketsDocsClient;
use crate::types::{ToolError, ToolInvocation, ToolOutcome, ToolPayload};
use crate::web::WebSearcher;

/// Retry schedule for idempotent reads: 1s → 2s → (cap 10s), 3 attempts.
const RETRY_BASE: Duration = Duration::from_secs(1);
const RETRY_CAP: Duration = Duration::from_secs(10);
const MAX_ATTEMPTS: u32 = 3;

/// Uniform façade over the four tool adapters.
///
/// Every call returns a [`ToolOutcome`]; adapter errors never escape as
/// `Err`. The per-call deadline covers the whole call including retries.
pub struct ToolRegistry {
    semantic: Arc<dyn SemanticIndex>,
    web: Arc<dyn WebSearcher>,
    tickets: Arc<dyn TicketsDocsClient>,
    calendar: Arc<dyn Calendar>,
}

impl ToolRegistry {
    pub fn new(
        semantic: Arc<dyn SemanticIndex>,
        web: Arc<dyn WebSearcher>,
        tickets: Arc<dyn TicketsDocsClient>,
        calendar: Arc<dyn Calendar>,
    ) -> Self {
        Self {
            semantic,
            web,
            tickets,
            calendar,
        }
    }

    /// Static catalog of available tools (id, description) for the planner
    /// prompt.
    pub fn catalog() -> Vec<(&'static str, &'static str)> {
        vec![
            (
                "semantic_search",
                "Internal team conversations and past discussions",
            ),
            ("web_search", "Current web information and real-time data"),
            (
                "tickets_and_docs",
                "Tickets, wiki pages, and project documentation",
            ),
            ("calendar_op", "Calendar and meeting management"),
        ]
    }

    /// Invoke one tool with a deadline. Transient errors on idempotent reads
    /// retry with exponential backoff; mutations never retry.
    pub async fn call(&self, invocation: &ToolInvocation, deadline: Duration) -> ToolOutcome {
        let start = Instant::now();
        let kind = invocation.kind();
        let echo = invocation.input_echo();

        let result = tokio::time::timeout(deadline, self.call_with_retry(invocation)).await;

        let latency = start.elapsed();
        match result {
            Ok(Ok(payload)) => {
                let success = payload_is_usable(&payload);
                debug!(tool = %kind, success, ?latency, "tool call complete");
                ToolOutcome {
                    kind,
                    input_echo: echo,
                    success,
                    error: (!success).then(|| "no usable content".to_string()),
                    payload: Some(payload),
                    latency,
                }
            }
            Ok(Err(e)) => {
                warn!(tool = %kind, error = %e, "tool call failed");
                ToolOutcome::failed(kind, echo, e.to_string(), latency)
            }
            Err(_) => {
                warn!(tool = %kind, ?deadline, "tool call timed out");
                ToolOutcome::failed(kind, echo, format!("timed out after {deadline:?}"), latency)
            }
        }
    }

    async fn call_with_retry(
        &self,
        invocation: &ToolInvocation,
    ) -> Result<ToolPayload, ToolError> {
        let retryable = invocation.is_idempotent();
        let mut delay = RETRY_BASE;

        for attempt in 1..=MAX_ATTEMPTS {
            match self.dispatch(invocation).await {
                Ok(payload) => return Ok(payload),
                Err(e) if retryable && e.is_retryable() && attempt < MAX_ATTEMPTS => {
                    warn!(
                        tool = %invocation.kind(),
                        attempt,
                        error = %e,
                        retry_after = ?delay,
                        "transient tool error, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    delay = (delay * 2).min(RETRY_CAP);
                }
                Err(e) => return Err(e),
            }
        }

        // The loop always returns inside the match arms above.
        unreachable!("retry loop exited without returning")
    }

    async fn dispatch(&self, invocation: &ToolInvocation) -> Result<ToolPayload, ToolError> {
        match invocation {
            ToolInvocation::SemanticSearch { query, top_k } => Ok(ToolPayload::Semantic(
                self.semantic.search(query, *top_k).await?,
            )),
            ToolInvocation::WebSearch {
                query,
                max_tokens,
                recency,
                domains,
            } => Ok(ToolPayload::Web(
                self.web
                    .search(query, *max_tokens, recency.as_deref(), domains)
                    .await?,
            )),
            ToolInvocation::TicketsDocs { task } => {
                Ok(ToolPayload::Tickets(self.tickets.execute_task(task).await?))
            }
            ToolInvocation::CalendarOp { action } => {
                Ok(ToolPayload::Calendar(self.calendar.perform(action).await?))
            }
        }
    }
}

/// Success rules per family: a semantic result with no hits counts only if
/// index metadata came back; a web answer needs content; a tickets result
/// needs upstream success; a calendar outcome that returned at all counts.
fn payload_is_usable(payload: &ToolPayload) -> bool {
    match payload {
        ToolPayload::Semantic(r) => !r.hits.is_empty() || !r.index_metadata.is_empty(),
        ToolPayload::Web(a) => !a.content.is_empty(),
        ToolPayload::Tickets(t) => t.is_success(),
        ToolPayload::Calendar(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::{CalendarAction, CalendarOutcome};
    use crate::semantic::{SemanticHit, SemanticResults};
    use crate::tickets::TicketsResult;
    use crate::types::ToolKind;
    use crate::web::WebAnswer;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct EmptyIndex;

    #[async_trait]
    impl SemanticIndex for EmptyIndex {
        async fn search(&self, _q: &str, _k: usize) -> Result<SemanticResults, ToolError> {
            Ok(SemanticResults::default())
        }
    }

    struct HitIndex;

    #[async_trait]
    impl SemanticIndex for HitIndex {
        async fn search(&self, q: &str, _k: usize) -> Result<SemanticResults, ToolError> {
            Ok(SemanticResults {
                hits: vec![SemanticHit {
                    content: format!("discussion about {q}"),
                    score: 0.92,
                    source_metadata: Default::default(),
                }],
                index_metadata: Default::default(),
            })
        }
    }

    struct FlakyIndex {
        attempts: AtomicU32,
    }

    #[async_trait]
    impl SemanticIndex for FlakyIndex {
        async fn search(&self, _q: &str, _k: usize) -> Result<SemanticResults, ToolError> {
            if self.attempts.fetch_add(1, Ordering::SeqCst) < 2 {
                return Err(ToolError::Transient("connection reset".to_string()));
            }
            Ok(SemanticResults {
                hits: vec![SemanticHit {
                    content: "finally".to_string(),
                    score: 1.0,
                    source_metadata: Default::default(),
                }],
                index_metadata: Default::default(),
            })
        }
    }

    struct NoWeb;

    #[async_trait]
    impl WebSearcher for NoWeb {
        async fn search(
            &self,
            _q: &str,
            _t: u32,
            _r: Option<&str>,
            _d: &[String],
        ) -> Result<WebAnswer, ToolError> {
            Ok(WebAnswer::default())
        }
    }

    struct NoTickets;

    #[async_trait]
    impl TicketsDocsClient for NoTickets {
        async fn execute_task(&self, _task: &str) -> Result<TicketsResult, ToolError> {
            Err(ToolError::Auth("token expired".to_string()))
        }
    }

    struct CountingCalendar {
        calls: AtomicU32,
    }

    #[async_trait]
    impl Calendar for CountingCalendar {
        async fn perform(&self, action: &CalendarAction) -> Result<CalendarOutcome, ToolError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(ToolError::Transient(format!(
                "calendar API hiccup during {}",
                action.verb()
            )))
        }
    }

    fn registry_with_semantic(semantic: Arc<dyn SemanticIndex>) -> ToolRegistry {
        ToolRegistry::new(
            semantic,
            Arc::new(NoWeb),
            Arc::new(NoTickets),
            Arc::new(CountingCalendar {
                calls: AtomicU32::new(0),
            }),
        )
    }

    fn semantic_call() -> ToolInvocation {
        ToolInvocation::SemanticSearch {
            query: "rollout".to_string(),
            top_k: 5,
        }
    }

    #[tokio::test]
    async fn semantic_hit_is_success() {
        let reg = registry_with_semantic(Arc::new(HitIndex));
        let outcome = reg.call(&semantic_call(), Duration::from_secs(5)).await;
        assert!(outcome.success);
        assert!(outcome.error.is_none());
    }

    #[tokio::test]
    async fn semantic_empty_without_metadata_is_failure() {
        let reg = registry_with_semantic(Arc::new(EmptyIndex));
        let outcome = reg.call(&semantic_call(), Duration::from_secs(5)).await;
        assert!(!outcome.success);
        assert!(outcome.payload.is_some());
    }

    #[tokio::test]
    async fn semantic_empty_with_metadata_is_success() {
        struct MetaOnly;
        #[async_trait]
        impl SemanticIndex for MetaOnly {
            async fn search(&self, _q: &str, _k: usize) -> Result<SemanticResults, ToolError> {
                let mut meta = serde_json::Map::new();
                meta.insert("index_size".to_string(), serde_json::json!(120_000));
                Ok(SemanticResults {
                    hits: Vec::new(),
                    index_metadata: meta,
                })
            }
        }
        let reg = registry_with_semantic(Arc::new(MetaOnly));
        let outcome = reg.call(&semantic_call(), Duration::from_secs(5)).await;
        assert!(outcome.success);
    }

    #[tokio::test]
    async fn web_empty_content_is_failure() {
        let reg = registry_with_semantic(Arc::new(HitIndex));
        let outcome = reg
            .call(
                &ToolInvocation::WebSearch {
                    query: "latest trends".to_string(),
                    max_tokens: 2000,
                    recency: None,
                    domains: Vec::new(),
                },
                Duration::from_secs(5),
            )
            .await;
        assert!(!outcome.success);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_errors_retry_until_success() {
        let reg = registry_with_semantic(Arc::new(FlakyIndex {
            attempts: AtomicU32::new(0),
        }));
        let outcome = reg.call(&semantic_call(), Duration::from_secs(30)).await;
        assert!(outcome.success);
    }

    #[tokio::test]
    async fn auth_errors_do_not_retry() {
        let reg = registry_with_semantic(Arc::new(HitIndex));
        let outcome = reg
            .call(
                &ToolInvocation::TicketsDocs {
                    task: "find AUTOPILOT-123".to_string(),
                },
                Duration::from_secs(5),
            )
            .await;
        assert!(!outcome.success);
        assert!(outcome.error.unwrap().contains("token expired"));
    }

    #[tokio::test(start_paused = true)]
    async fn calendar_mutations_never_retry() {
        let calendar = Arc::new(CountingCalendar {
            calls: AtomicU32::new(0),
        });
        let reg = ToolRegistry::new(
            Arc::new(HitIndex),
            Arc::new(NoWeb),
            Arc::new(NoTickets),
            Arc::clone(&calendar) as Arc<dyn Calendar>,
        );

        let outcome = reg
            .call(
                &ToolInvocation::CalendarOp {
                    action: CalendarAction::Schedule {
                        title: "sync".to_string(),
                        attendees: vec!["dana@example.com".to_string()],
                        start: "2026-08-04T14:00:00Z".to_string(),
                        duration_minutes: 30,
                    },
                },
                Duration::from_secs(30),
            )
            .await;

        assert!(!outcome.success);
        assert_eq!(calendar.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn calendar_reads_do_retry() {
        let calendar = Arc::new(CountingCalendar {
            calls: AtomicU32::new(0),
        });
        let reg = ToolRegistry::new(
            Arc::new(HitIndex),
            Arc::new(NoWeb),
            Arc::new(NoTickets),
            Arc::clone(&calendar) as Arc<dyn Calendar>,
        );

        let outcome = reg
            .call(
                &ToolInvocation::CalendarOp {
                    action: CalendarAction::GetCalendar {
                        day: "2026-08-04".to_string(),
                    },
                },
                Duration::from_secs(30),
            )
            .await;

        assert!(!outcome.success);
        assert_eq!(calendar.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn deadline_produces_timeout_outcome() {
        struct SlowIndex;
        #[async_trait]
        impl SemanticIndex for SlowIndex {
            async fn search(&self, _q: &str, _k: usize) -> Result<SemanticResults, ToolError> {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(SemanticResults::default())
            }
        }
        let reg = registry_with_semantic(Arc::new(SlowIndex));
        let outcome = reg.call(&semantic_call(), Duration::from_millis(20)).await;
        assert!(!outcome.success);
        assert!(outcome.error.unwrap().contains("timed out"));
    }

    #[test]
    fn search_phrases_are_human_readable() {
        let phrase = semantic_call().search_phrase();
        assert!(phrase.contains("rollout"));
        assert!(!phrase.contains('{'));
    }

    #[test]
    fn failure_substitution_order_is_fixed() {
        assert_eq!(
            ToolKind::SemanticSearch.failure_substitute(),
            Some(ToolKind::WebSearch)
        );
        assert_eq!(
            ToolKind::WebSearch.failure_substitute(),
            Some(ToolKind::TicketsDocs)
        );
        assert_eq!(ToolKind::TicketsDocs.failure_substitute(), None);
    }
}
