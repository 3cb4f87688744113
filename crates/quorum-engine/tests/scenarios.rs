// End-to-end engine scenarios against a scripted model client and scripted
// tool adapters. Each test drives Orchestrator::process and checks the
// answer plus the progress-event stream.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use quorum_core::config::QuorumConfig;
use quorum_core::types::{ConversationId, EngineRequest};
use quorum_engine::{Confidence, Dependencies, EngineError, Orchestrator};
use quorum_memory::{EntityStore, KvStore, MemoryManager, SqliteStore};
use quorum_model::{ModelClient, ModelError, ModelRequest};
use quorum_progress::{ProgressChannel, ProgressKind};
use quorum_tools::{
    Calendar, CalendarAction, CalendarOutcome, Citation, SemanticHit, SemanticIndex,
    SemanticResults, TicketsDocsClient, TicketsResult, ToolError, ToolRegistry, WebAnswer,
    WebSearcher, WorkItem, WorkItemType,
};
use tokio_util::sync::CancellationToken;

// ---------------------------------------------------------------------------
// Scripted fakes
// ---------------------------------------------------------------------------

enum Scripted {
    Text(&'static str),
    Quota,
    Unavailable,
}

struct ScriptedModel {
    script: Mutex<VecDeque<Scripted>>,
}

impl ScriptedModel {
    fn new(script: Vec<Scripted>) -> Arc<dyn ModelClient> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
        })
    }
}

#[async_trait]
impl ModelClient for ScriptedModel {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn generate(&self, _req: &ModelRequest) -> Result<String, ModelError> {
        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(Scripted::Text(text)) => Ok(text.to_string()),
            Some(Scripted::Quota) => Err(ModelError::QuotaExhausted("429".to_string())),
            Some(Scripted::Unavailable) | None => {
                Err(ModelError::Unavailable("script exhausted".to_string()))
            }
        }
    }
}

#[derive(Clone)]
enum SemanticMode {
    Hits(usize),
    Fail,
    CancelThenHang(CancellationToken),
}

struct FakeSemantic {
    mode: SemanticMode,
}

#[async_trait]
impl SemanticIndex for FakeSemantic {
    async fn search(&self, query: &str, _top_k: usize) -> Result<SemanticResults, ToolError> {
        match &self.mode {
            SemanticMode::Hits(n) => Ok(SemanticResults {
                hits: (0..*n)
                    .map(|i| SemanticHit {
                        content: format!("team note {i} about {query}"),
                        score: 0.9,
                        source_metadata: Default::default(),
                    })
                    .collect(),
                index_metadata: Default::default(),
            }),
            SemanticMode::Fail => Err(ToolError::Unavailable("index down".to_string())),
            SemanticMode::CancelThenHang(token) => {
                token.cancel();
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok(SemanticResults::default())
            }
        }
    }
}

struct FakeWeb {
    content: Option<&'static str>,
    citations: Vec<Citation>,
}

#[async_trait]
impl WebSearcher for FakeWeb {
    async fn search(
        &self,
        _query: &str,
        _max_tokens: u32,
        _recency: Option<&str>,
        _domains: &[String],
    ) -> Result<WebAnswer, ToolError> {
        match self.content {
            Some(content) => Ok(WebAnswer {
                content: content.to_string(),
                citations: self.citations.clone(),
                usage_tokens: 100,
            }),
            None => Err(ToolError::Unavailable("search api down".to_string())),
        }
    }
}

struct FakeTickets {
    items: Option<Vec<WorkItem>>,
}

#[async_trait]
impl TicketsDocsClient for FakeTickets {
    async fn execute_task(&self, _task: &str) -> Result<TicketsResult, ToolError> {
        match &self.items {
            Some(items) => Ok(TicketsResult {
                status: "success".to_string(),
                items: items.clone(),
                execution_method: "http".to_string(),
            }),
            None => Err(ToolError::Unavailable("upstream unreachable".to_string())),
        }
    }
}

struct FakeCalendar;

#[async_trait]
impl Calendar for FakeCalendar {
    async fn perform(&self, action: &CalendarAction) -> Result<CalendarOutcome, ToolError> {
        Ok(CalendarOutcome {
            action: action.verb().to_string(),
            detail: "3 open slots on Tuesday".to_string(),
            data: serde_json::Value::Null,
        })
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

struct Harness {
    engine: Orchestrator,
    progress: Arc<ProgressChannel>,
    memory: Arc<MemoryManager>,
}

fn citation(title: &str, url: &str) -> Citation {
    Citation {
        title: title.to_string(),
        url: url.to_string(),
        snippet: String::new(),
    }
}

fn jira_item(key: &str) -> WorkItem {
    WorkItem {
        title: key.to_string(),
        url: format!("https://jira.example.com/browse/{key}"),
        item_type: WorkItemType::Jira,
        summary: "On track for the Q3 release".to_string(),
    }
}

fn build_harness(
    model: Arc<dyn ModelClient>,
    semantic: SemanticMode,
    web: FakeWeb,
    tickets: FakeTickets,
) -> Harness {
    let store: Arc<dyn KvStore> = Arc::new(SqliteStore::open_in_memory().unwrap());
    let entities = Arc::new(EntityStore::new(Arc::clone(&store), 2.0));
    let mut config = QuorumConfig::default();
    // Keep cancellation grace short so tests stay fast.
    config.deadlines.cancel_grace_ms = 50;
    let memory = Arc::new(MemoryManager::new(
        store,
        entities,
        config.memory.clone(),
    ));

    let tools = Arc::new(ToolRegistry::new(
        Arc::new(FakeSemantic { mode: semantic }),
        Arc::new(web),
        Arc::new(tickets),
        Arc::new(FakeCalendar),
    ));

    let deps = Dependencies::new(model, tools, Arc::clone(&memory), Arc::new(config));
    Harness {
        engine: Orchestrator::new(deps),
        progress: Arc::new(ProgressChannel::new()),
        memory,
    }
}

fn request(text: &str) -> EngineRequest {
    EngineRequest::new(ConversationId::new("C100", "1718000000.000300"), text)
}

fn working_web() -> FakeWeb {
    FakeWeb {
        content: Some("AI automation keeps accelerating across industries."),
        citations: vec![citation("Trends 2025", "https://news.example.com/trends")],
    }
}

fn working_tickets() -> FakeTickets {
    FakeTickets {
        items: Some(vec![jira_item("AUTOPILOT-123")]),
    }
}

fn assert_monotonic_events(progress: &ProgressChannel) {
    let history = progress.history();
    assert!(!history.is_empty(), "engine must emit progress events");
    for pair in history.windows(2) {
        assert!(pair[0].seq < pair[1].seq);
        assert!(pair[0].at <= pair[1].at);
    }
}

// ---------------------------------------------------------------------------
// Scenario A: greeting
// ---------------------------------------------------------------------------

#[tokio::test]
async fn greeting_takes_the_simple_path() {
    let model = ScriptedModel::new(vec![
        Scripted::Text("This is just a greeting; no tools add value."),
        Scripted::Text(r#"{"reasoning_summary": "greeting", "complexity_level": "simple", "tools_needed": []}"#),
        Scripted::Text("Hey! Good to see you. What can I help you with today?"),
    ]);
    let h = build_harness(model, SemanticMode::Hits(1), working_web(), working_tickets());

    let answer = h
        .engine
        .process(request("Hey buddy"), Arc::clone(&h.progress))
        .await
        .unwrap();

    assert!(!answer.text.is_empty());
    assert!(matches!(
        answer.confidence,
        Confidence::Medium | Confidence::High
    ));
    assert!(answer.source_links.is_empty());
    assert_eq!(answer.execution_summary.replanning_iterations, 0);

    // At most one execute phase, and no searching events were needed.
    let history = h.progress.history();
    let searches = history
        .iter()
        .filter(|e| e.kind == ProgressKind::Searching)
        .count();
    assert_eq!(searches, 0);
    assert_monotonic_events(&h.progress);
}

// ---------------------------------------------------------------------------
// Scenario B: project status via tickets
// ---------------------------------------------------------------------------

#[tokio::test]
async fn ticket_status_flows_into_links_and_findings() {
    let model = ScriptedModel::new(vec![
        Scripted::Text("The user asks about a specific ticket; tickets_and_docs is the tool."),
        Scripted::Text(
            r#"{"complexity_level": "moderate", "tools_needed": ["tickets_and_docs"], "ticket_tasks": ["Look up AUTOPILOT-123 status"]}"#,
        ),
        Scripted::Text(r#"{"needs_more_tools": false, "reasoning": "ticket found", "new_plan": null}"#),
        Scripted::Text(
            "AUTOPILOT-123 is on track for the Q3 release.\nFOLLOWUPS:\n- Want the full sprint board?\n",
        ),
    ]);
    let h = build_harness(model, SemanticMode::Hits(1), working_web(), working_tickets());

    let answer = h
        .engine
        .process(
            request("What's the status of AUTOPILOT-123?"),
            Arc::clone(&h.progress),
        )
        .await
        .unwrap();

    assert_eq!(answer.confidence, Confidence::High);
    assert!(!answer.key_findings.is_empty());
    assert!(answer
        .source_links
        .iter()
        .any(|l| l.link_type == "jira" && l.url.starts_with("https://")));
    assert!(answer.text.contains("AUTOPILOT-123"));
    assert!(!answer.requires_human_input);

    let history = h.progress.history();
    assert!(history.iter().any(|e| e.kind == ProgressKind::Searching));
    assert!(history.iter().any(|e| e.kind == ProgressKind::Observing));
    assert!(history.iter().any(|e| e.kind == ProgressKind::Synthesizing));
    assert_monotonic_events(&h.progress);
}

// ---------------------------------------------------------------------------
// Scenario C: current events via web search
// ---------------------------------------------------------------------------

#[tokio::test]
async fn web_citations_dedupe_into_capped_source_links() {
    let many_citations = vec![
        citation("Trends", "https://a.example.com/1"),
        citation("Trends again", "https://a.example.com/1"),
        citation("Deep dive", "https://b.example.com/2"),
    ];
    let model = ScriptedModel::new(vec![
        Scripted::Text("Current events call for web search."),
        Scripted::Text(
            r#"{"complexity_level": "moderate", "tools_needed": ["web_search"], "web_queries": ["AI automation trends 2025"]}"#,
        ),
        Scripted::Text(r#"{"needs_more_tools": false, "reasoning": "covered", "new_plan": null}"#),
        Scripted::Text("Automation adoption keeps climbing in 2025.\nFOLLOWUPS:\n- Which industries will lead next year?\n"),
    ]);
    let h = build_harness(
        model,
        SemanticMode::Hits(1),
        FakeWeb {
            content: Some("Automation adoption keeps climbing."),
            citations: many_citations,
        },
        working_tickets(),
    );

    let answer = h
        .engine
        .process(
            request("What are the latest AI automation trends in 2025?"),
            Arc::clone(&h.progress),
        )
        .await
        .unwrap();

    assert!(answer.source_links.len() <= 5);
    let urls: Vec<&str> = answer.source_links.iter().map(|l| l.url.as_str()).collect();
    let mut deduped = urls.clone();
    deduped.sort();
    deduped.dedup();
    assert_eq!(urls.len(), deduped.len(), "links must be URL-deduplicated");

    // At least one forward-looking followup.
    assert!(answer
        .suggested_followups
        .iter()
        .any(|f| f.to_lowercase().contains("next")));
    assert!(answer.suggested_followups.len() <= 4);
}

// ---------------------------------------------------------------------------
// Scenario D: quota exhaustion during reasoning
// ---------------------------------------------------------------------------

#[tokio::test]
async fn quota_during_reasoning_uses_heuristic_and_still_answers() {
    let model = ScriptedModel::new(vec![
        // Reasoning pass dies on quota; the heuristic plan takes over and
        // no plan-extraction call happens.
        Scripted::Quota,
        Scripted::Text(r#"{"needs_more_tools": false, "reasoning": "enough", "new_plan": null}"#),
        Scripted::Text("Here's what's happening in AI automation this year."),
    ]);
    let h = build_harness(model, SemanticMode::Hits(1), working_web(), working_tickets());

    let answer = h
        .engine
        .process(
            request("What are the latest AI automation trends in 2025?"),
            Arc::clone(&h.progress),
        )
        .await
        .unwrap();

    assert!(!answer.text.is_empty());

    let history = h.progress.history();
    assert!(
        history.iter().any(|e| e.kind == ProgressKind::Warning),
        "quota fallback must surface a warning"
    );
    assert!(
        !history.iter().any(|e| e.kind == ProgressKind::Error),
        "quota fallback is not a terminal error"
    );
    // The heuristic picked web search for a "latest trends" query.
    assert!(history
        .iter()
        .any(|e| e.kind == ProgressKind::Searching && e.action == "web_search"));
}

// ---------------------------------------------------------------------------
// Scenario E: recursive replan after total failure
// ---------------------------------------------------------------------------

#[tokio::test]
async fn all_failures_substitute_tool_families_with_bounded_phases() {
    let model = ScriptedModel::new(vec![
        Scripted::Text("Semantic search should cover this."),
        Scripted::Text(
            r#"{"complexity_level": "moderate", "tools_needed": ["semantic_search"], "semantic_queries": ["deployment runbook"]}"#,
        ),
        // Failure replans are deterministic; the next model call is the
        // synthesis attempt, which also fails over to the template.
        Scripted::Unavailable,
        Scripted::Unavailable,
    ]);
    let h = build_harness(
        model,
        SemanticMode::Fail,
        FakeWeb {
            content: None,
            citations: Vec::new(),
        },
        FakeTickets { items: None },
    );

    let answer = h
        .engine
        .process(
            request("Where is the deployment runbook?"),
            Arc::clone(&h.progress),
        )
        .await
        .unwrap();

    // semantic → web → tickets, then nothing left: three execute phases.
    let history = h.progress.history();
    let replans = history
        .iter()
        .filter(|e| e.kind == ProgressKind::Replanning)
        .count();
    assert!(replans >= 1, "failure replanning must be narrated");
    assert!(replans <= 3);

    let phases = history
        .iter()
        .filter(|e| e.kind == ProgressKind::Processing && e.action == "executing_plan")
        .count();
    assert!(phases <= 4, "hard cap: at most four execute phases");

    assert_eq!(answer.confidence, Confidence::Low);
    assert!(answer.requires_human_input);
    assert!(!answer.text.is_empty());
    assert_eq!(answer.execution_summary.replanning_iterations, replans);
}

// ---------------------------------------------------------------------------
// Scenario F: cancellation mid-execute
// ---------------------------------------------------------------------------

#[tokio::test]
async fn cancellation_mid_execute_emits_terminal_warning_and_no_answer() {
    let cancel = CancellationToken::new();
    let model = ScriptedModel::new(vec![
        Scripted::Text("Needs the team archive."),
        Scripted::Text(
            r#"{"complexity_level": "moderate", "tools_needed": ["semantic_search"], "semantic_queries": ["archive"]}"#,
        ),
    ]);
    let h = build_harness(
        model,
        SemanticMode::CancelThenHang(cancel.clone()),
        working_web(),
        working_tickets(),
    );

    let mut req = request("Pull up the archive discussion");
    req.cancel = cancel;

    let result = h.engine.process(req, Arc::clone(&h.progress)).await;
    assert!(matches!(result, Err(EngineError::Cancelled)));

    let history = h.progress.history();
    let last = history.last().expect("terminal event expected");
    assert_eq!(last.kind, ProgressKind::Warning);
    assert_eq!(last.action, "cancelled");
    assert!(h.progress.is_closed());

    // Nothing may be emitted after the acknowledgment.
    let warning_seq = last.seq;
    assert!(history.iter().all(|e| e.seq <= warning_seq));
}

// ---------------------------------------------------------------------------
// Cross-cutting properties
// ---------------------------------------------------------------------------

#[tokio::test]
async fn exchange_is_committed_after_an_answer() {
    let model = ScriptedModel::new(vec![
        Scripted::Text("Simple lookup."),
        Scripted::Text(r#"{"complexity_level": "simple", "tools_needed": []}"#),
        Scripted::Text("All good here."),
    ]);
    let h = build_harness(model, SemanticMode::Hits(1), working_web(), working_tickets());

    let req = request("quick check-in");
    let cid = req.conversation_id.clone();
    h.engine.process(req, Arc::clone(&h.progress)).await.unwrap();

    let turns = h.memory.recent_turns(&cid).unwrap();
    assert_eq!(turns.len(), 2);
    assert_eq!(turns[0].text, "quick check-in");
    assert_eq!(turns[1].text, "All good here.");
}

#[tokio::test]
async fn sanitizer_rewrites_leaked_planner_json() {
    let model = ScriptedModel::new(vec![
        Scripted::Text("Ticket lookup."),
        Scripted::Text(
            r#"{"complexity_level": "moderate", "tools_needed": ["tickets_and_docs"], "ticket_tasks": ["look up"]}"#,
        ),
        Scripted::Text(r#"{"needs_more_tools": false, "reasoning": "done", "new_plan": null}"#),
        // The synthesis model leaks planner JSON verbatim.
        Scripted::Text(r#"{"limit": 10, "arguments": {"mcp_tool": "tickets"}}"#),
    ]);
    let h = build_harness(model, SemanticMode::Hits(1), working_web(), working_tickets());

    let answer = h
        .engine
        .process(request("Check AUTOPILOT-123"), Arc::clone(&h.progress))
        .await
        .unwrap();

    assert!(!answer.text.contains("\"limit\""));
    assert!(!answer.text.trim_start().starts_with('{'));
    // The best-effort summary keeps the findings visible.
    assert!(!answer.key_findings.is_empty());
}

#[tokio::test]
async fn model_collapse_still_resolves_with_low_confidence_fallback() {
    // Every model call fails outright, tools are fine: heuristic plan,
    // skipped evaluation, template synthesis.
    let model = ScriptedModel::new(vec![]);
    let h = build_harness(model, SemanticMode::Hits(2), working_web(), working_tickets());

    let answer = h
        .engine
        .process(
            request("What did the team decide about the rollout?"),
            Arc::clone(&h.progress),
        )
        .await
        .unwrap();

    // Tools succeeded, so the answer is grounded even though every model
    // call failed; the template text carries the source counts.
    assert!(!answer.text.is_empty());
    assert!(answer.text.contains("team discussion"));
    assert_ne!(answer.confidence, Confidence::Low);
    assert_monotonic_events(&h.progress);
}
