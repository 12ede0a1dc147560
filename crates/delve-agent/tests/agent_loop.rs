//! Agent loop behavior against a scripted model and timed tools.
//!
//! Tests run on tokio's paused clock, so sleeps advance virtual time and
//! elapsed-time assertions are exact.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use delve_agent::{Agent, AgentEvent, AgentSettings};
use delve_core::error::DelveError;
use delve_core::types::{Message, Role};
use delve_providers::{RawDelta, ScriptStep, ScriptedClient, text_turn, tool_call_turn};
use delve_tools::{Tool, ToolRegistry};

type Log = Arc<Mutex<Vec<String>>>;

/// Sleeps, then echoes its name. Records start and end in a shared log.
struct TimedTool {
    name: &'static str,
    delay: Duration,
    log: Log,
}

#[async_trait]
impl Tool for TimedTool {
    fn name(&self) -> &str {
        self.name
    }

    fn description(&self) -> &str {
        "Sleeps, then reports its name"
    }

    async fn execute(&self, _params: serde_json::Value) -> anyhow::Result<String> {
        self.log.lock().unwrap().push(format!("start:{}", self.name));
        tokio::time::sleep(self.delay).await;
        self.log.lock().unwrap().push(format!("end:{}", self.name));
        Ok(format!("{} done", self.name))
    }
}

struct FailingTool;

#[async_trait]
impl Tool for FailingTool {
    fn name(&self) -> &str {
        "boom"
    }

    fn description(&self) -> &str {
        "Always fails"
    }

    async fn execute(&self, _params: serde_json::Value) -> anyhow::Result<String> {
        anyhow::bail!("disk on fire")
    }
}

fn registry(log: &Log, tools: &[(&'static str, u64)]) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    for &(name, millis) in tools {
        registry.register(Arc::new(TimedTool {
            name,
            delay: Duration::from_millis(millis),
            log: log.clone(),
        }));
    }
    registry.register(Arc::new(FailingTool));
    registry
}

fn settings(max_iterations: u32) -> AgentSettings {
    AgentSettings {
        model: "test-model".into(),
        ..AgentSettings::default()
    }
    .with_max_iterations(max_iterations)
}

fn start() -> Vec<Message> {
    vec![Message::system("You are a test."), Message::user("Go")]
}

#[tokio::test(start_paused = true)]
async fn test_plain_answer_ends_after_one_round() {
    let client = Arc::new(ScriptedClient::from_turns(vec![text_turn("All done here.")]));
    let agent = Agent::new(client.clone(), ToolRegistry::new(), settings(5));

    let result = agent.run(start()).await.unwrap();
    assert_eq!(result.iterations, 1);
    assert_eq!(result.total_tool_calls, 0);
    assert_eq!(result.final_response, "All done here.");
    assert_eq!(result.history.len(), 3);
    assert_eq!(client.call_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_results_follow_call_order_not_completion_order() {
    let log: Log = Arc::default();
    let client = Arc::new(ScriptedClient::from_turns(vec![
        tool_call_turn(&[("a", "slow", r#"{"q": "first"}"#), ("b", "fast", "{}")]),
        text_turn("Summary."),
    ]));
    let agent = Agent::new(client.clone(), registry(&log, &[("slow", 100), ("fast", 10)]), settings(5));

    let result = agent.run(start()).await.unwrap();

    let ends: Vec<String> = log.lock().unwrap().iter().filter(|l| l.starts_with("end")).cloned().collect();
    assert_eq!(ends, vec!["end:fast", "end:slow"]);

    let history = &result.history;
    assert_eq!(history.len(), 6);
    assert_eq!(history[2].role, Role::Assistant);
    let ids: Vec<&str> = history[2].tool_calls.iter().map(|c| c.id.as_str()).collect();
    assert_eq!(ids, vec!["a", "b"]);
    assert_eq!(history[2].tool_calls[0].arguments, r#"{"q": "first"}"#);
    assert_eq!(history[3].tool_call_id.as_deref(), Some("a"));
    assert_eq!(history[3].text(), "slow done");
    assert_eq!(history[4].tool_call_id.as_deref(), Some("b"));
    assert_eq!(history[5].text(), "Summary.");
    assert_eq!(result.total_tool_calls, 2);

    // The second round saw the tool answers and was offered the tools.
    let second = &client.requests()[1];
    assert_eq!(second.messages.len(), 5);
    assert!(second.tools.iter().any(|t| t.name == "slow"));
}

/// First call closes mid-stream, then the model keeps streaming for 200ms.
fn overlapping_turn() -> Vec<ScriptStep> {
    vec![
        ScriptStep::Delta(RawDelta::tool_call(Some("a"), Some("slow"), "{}")),
        ScriptStep::Delta(RawDelta::tool_call(Some("b"), Some("fast"), "")),
        ScriptStep::Pause(Duration::from_millis(200)),
        ScriptStep::Delta(RawDelta::tool_call(None, None, "{}")),
    ]
}

#[tokio::test(start_paused = true)]
async fn test_early_execution_overlaps_streaming() {
    let log: Log = Arc::default();
    let client = Arc::new(ScriptedClient::from_turns(vec![overlapping_turn(), text_turn("ok")]));
    let agent = Agent::new(client, registry(&log, &[("slow", 200), ("fast", 0)]), settings(5));

    let begin = Instant::now();
    agent.run(start()).await.unwrap();
    assert!(begin.elapsed() < Duration::from_millis(300), "took {:?}", begin.elapsed());
}

#[tokio::test(start_paused = true)]
async fn test_without_early_execution_tools_wait_for_stream_end() {
    let log: Log = Arc::default();
    let client = Arc::new(ScriptedClient::from_turns(vec![overlapping_turn(), text_turn("ok")]));
    let settings = AgentSettings {
        early_tool_execution: false,
        ..settings(5)
    };
    let agent = Agent::new(client, registry(&log, &[("slow", 200), ("fast", 0)]), settings);

    let begin = Instant::now();
    let result = agent.run(start()).await.unwrap();
    assert!(begin.elapsed() >= Duration::from_millis(400));
    assert_eq!(result.history[3].tool_call_id.as_deref(), Some("a"));
}

#[tokio::test(start_paused = true)]
async fn test_iteration_cap_still_answers_last_round() {
    let log: Log = Arc::default();
    let client = Arc::new(ScriptedClient::new(|_, index| {
        let id = format!("call-{index}");
        Ok(tool_call_turn(&[(id.as_str(), "fast", "{}")]))
    }));
    let agent = Agent::new(client.clone(), registry(&log, &[("fast", 1)]), settings(3));

    let result = agent.run(start()).await.unwrap();
    assert_eq!(result.iterations, 3);
    assert_eq!(result.total_tool_calls, 3);
    assert_eq!(client.call_count(), 3);
    let last = result.history.last().unwrap();
    assert_eq!(last.role, Role::Tool);
    assert_eq!(last.tool_call_id.as_deref(), Some("call-2"));
    assert_eq!(result.final_response, "");
}

#[tokio::test(start_paused = true)]
async fn test_tool_failures_are_fed_back_not_fatal() {
    let log: Log = Arc::default();
    let client = Arc::new(ScriptedClient::from_turns(vec![
        tool_call_turn(&[("a", "missing", "{}"), ("b", "boom", "{}"), ("c", "fast", "not json")]),
        text_turn("Recovered."),
    ]));
    let agent = Agent::new(client, registry(&log, &[("fast", 1)]), settings(5));

    let result = agent.run(start()).await.unwrap();
    let outputs: Vec<&str> = result.history[3..6].iter().map(|m| m.text()).collect();
    assert_eq!(outputs[0], "Error: Tool 'missing' not found");
    assert!(outputs[1].starts_with("Error executing tool 'boom': disk on fire"));
    assert!(outputs[2].starts_with("Error: Invalid arguments for tool 'fast'"));
    assert_eq!(result.final_response, "Recovered.");
}

#[tokio::test(start_paused = true)]
async fn test_cancellation_aborts_running_tools() {
    let log: Log = Arc::default();
    let client = Arc::new(ScriptedClient::from_turns(vec![tool_call_turn(&[("a", "slow", "{}")])]));
    let token = CancellationToken::new();
    let agent = Agent::new(client, registry(&log, &[("slow", 10_000)]), settings(5))
        .with_cancellation(token.clone());

    let canceller = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        token.cancel();
    });
    let err = agent.run(start()).await.unwrap_err();
    canceller.await.unwrap();
    assert!(matches!(err, DelveError::Cancelled));

    tokio::time::sleep(Duration::from_secs(20)).await;
    assert_eq!(*log.lock().unwrap(), vec!["start:slow".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn test_connection_failure_ends_run_with_error_event() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let client = Arc::new(ScriptedClient::from_turns(vec![]));
    let agent = Agent::new(client, ToolRegistry::new(), settings(5)).with_events(tx);

    let err = agent.run(start()).await.unwrap_err();
    assert!(matches!(err, DelveError::Connection(_)));
    match rx.recv().await.unwrap() {
        AgentEvent::Error { kind, .. } => assert_eq!(kind, "connection"),
        other => panic!("unexpected event {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_orphan_fragment_is_malformed() {
    let client = Arc::new(ScriptedClient::from_turns(vec![vec![ScriptStep::Delta(
        RawDelta::tool_call(None, None, "{}"),
    )]]));
    let agent = Agent::new(client, ToolRegistry::new(), settings(5));
    let err = agent.run(start()).await.unwrap_err();
    assert!(matches!(err, DelveError::MalformedDelta(_)));
}

#[tokio::test(start_paused = true)]
async fn test_events_trace_the_run() {
    let log: Log = Arc::default();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let client = Arc::new(ScriptedClient::from_turns(vec![
        tool_call_turn(&[("a", "fast", "{}")]),
        text_turn("The final answer"),
    ]));
    let agent = Agent::new(client, registry(&log, &[("fast", 1)]), settings(5)).with_events(tx);
    agent.run(start()).await.unwrap();
    drop(agent);

    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }
    let call_at = events
        .iter()
        .position(|e| matches!(e, AgentEvent::ToolCall { id, .. } if id == "a"))
        .unwrap();
    let result_at = events
        .iter()
        .position(|e| matches!(e, AgentEvent::ToolResult { id, is_error: false, .. } if id == "a"))
        .unwrap();
    assert!(call_at < result_at);

    let streamed: String = events
        .iter()
        .filter_map(|e| match e {
            AgentEvent::PartialReply { delta } => Some(delta.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(streamed, "The final answer");
    assert_eq!(
        events.last(),
        Some(&AgentEvent::BlockReply {
            text: "The final answer".into(),
            is_final: true
        })
    );
}
