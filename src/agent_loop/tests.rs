use super::test_utils::*;
use super::*;
use crate::error::{ProviderError, ToolErrorKind};
use crate::llm::{Content, ContentBlock, Role};
use crate::primitive_tools::ExecTool;
use serde_json::json;
use std::time::Duration;

fn key() -> ConversationKey {
    ConversationKey::new("test", "conv-1")
}

fn echo_tools() -> ToolRegistry {
    let mut tools = ToolRegistry::new();
    tools.register(EchoTool);
    tools
}

fn build(
    primary: &Arc<MockProvider>,
    config: AgentConfig,
    tools: ToolRegistry,
) -> anyhow::Result<AgentLoop> {
    AgentLoop::builder()
        .provider(primary.clone())
        .config(config)
        .tools(tools)
        .build()
}

fn with_backup(config: AgentConfig) -> AgentConfig {
    AgentConfig {
        model: "primary-model".to_string(),
        backup_model: Some("backup-model".to_string()),
        ..config
    }
}

fn tool_results(conversation: &Conversation) -> Vec<(String, bool)> {
    conversation
        .messages()
        .iter()
        .filter(|m| m.role == Role::Tool)
        .flat_map(|m| match &m.content {
            Content::Blocks(blocks) => blocks.clone(),
            Content::Text(_) => Vec::new(),
        })
        .filter_map(|b| match b {
            ContentBlock::ToolResult {
                content, is_error, ..
            } => Some((content, is_error.unwrap_or(false))),
            _ => None,
        })
        .collect()
}

// ===================
// Builder Tests
// ===================

#[test]
fn test_builder_requires_a_provider() {
    let result = AgentLoop::builder().build();
    assert!(result.is_err());
}

#[test]
fn test_builder_rejects_backup_provider_without_model() {
    let result = AgentLoop::builder()
        .provider(Arc::new(MockProvider::new(vec![])))
        .backup_provider(Arc::new(MockProvider::new(vec![])))
        .build();

    assert!(result.is_err());
}

#[test]
fn test_builder_rejects_backup_model_without_provider() {
    let result = AgentLoop::builder()
        .provider(Arc::new(MockProvider::new(vec![])))
        .config(with_backup(AgentConfig::default()))
        .build();

    assert!(result.is_err());
}

#[test]
fn test_builder_defaults_sandbox_to_workspace() -> anyhow::Result<()> {
    let config = AgentConfig {
        workspace: "/srv/ws".into(),
        ..AgentConfig::default()
    };
    let agent = build(&Arc::new(MockProvider::new(vec![])), config, echo_tools())?;

    assert_eq!(agent.sandbox().workspace, std::path::PathBuf::from("/srv/ws"));
    assert_eq!(agent.tools().len(), 1);
    Ok(())
}

// ===================
// Basic Turns
// ===================

#[tokio::test]
async fn test_single_round_answer() -> anyhow::Result<()> {
    let provider = Arc::new(MockProvider::new(vec![MockProvider::text_response("4")]));
    let agent = build(&provider, AgentConfig::default(), ToolRegistry::new())?;
    let mut conversation = Conversation::new(key());

    let outcome = agent
        .run_turn(&mut conversation, "2+2?", &CancellationToken::new())
        .await;

    assert_eq!(outcome.reply(), Some("4"));
    assert_eq!(outcome.summary().rounds, 1);
    assert!(!outcome.degraded());
    assert_eq!(conversation.len(), 2);
    assert_eq!(conversation.messages()[0].role, Role::User);
    assert_eq!(conversation.messages()[1].content, Content::Text("4".to_string()));
    assert_eq!(provider.call_count(), 1);
    Ok(())
}

#[tokio::test]
async fn test_request_carries_history_and_settings() -> anyhow::Result<()> {
    let provider = Arc::new(MockProvider::new(vec![]));
    let config = AgentConfig {
        model: "openai/gpt-4o".to_string(),
        max_tokens: 512,
        temperature: 0.2,
        ..AgentConfig::default()
    };
    let agent = build(&provider, config, echo_tools())?;
    let mut conversation = Conversation::new(key());

    agent
        .run_turn(&mut conversation, "hello", &CancellationToken::new())
        .await;

    let requests = provider.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].model, "openai/gpt-4o");
    assert_eq!(requests[0].max_tokens, 512);
    assert_eq!(requests[0].temperature, Some(0.2));
    assert_eq!(requests[0].messages.len(), 1);
    assert!(requests[0].system.contains("Workspace:"));
    assert_eq!(requests[0].tools.as_ref().map(Vec::len), Some(1));
    Ok(())
}

#[tokio::test]
async fn test_empty_response_uses_fallback() -> anyhow::Result<()> {
    let provider = Arc::new(MockProvider::new(vec![MockProvider::empty_response()]));
    let agent = build(&provider, AgentConfig::default(), ToolRegistry::new())?;
    let mut conversation = Conversation::new(key());

    let outcome = agent
        .run_turn(&mut conversation, "hi", &CancellationToken::new())
        .await;

    assert_eq!(outcome.reply(), Some(helpers::EMPTY_RESPONSE_FALLBACK));
    assert_eq!(conversation.len(), 2);
    Ok(())
}

// ===================
// Tool Rounds
// ===================

#[tokio::test]
async fn test_tool_round_then_answer() -> anyhow::Result<()> {
    let provider = Arc::new(MockProvider::new(vec![
        MockProvider::tool_use_response("call_1", "echo", json!({"message": "ping"})),
        MockProvider::text_response("pong received"),
    ]));
    let agent = build(&provider, AgentConfig::default(), echo_tools())?;
    let mut conversation = Conversation::new(key());

    let outcome = agent
        .run_turn(&mut conversation, "echo ping", &CancellationToken::new())
        .await;

    assert_eq!(outcome.reply(), Some("pong received"));
    assert_eq!(outcome.summary().tool_calls, 1);
    assert_eq!(outcome.summary().rounds, 2);
    // user, assistant tool call, tool result, assistant answer
    assert_eq!(conversation.len(), 4);
    assert_eq!(tool_results(&conversation), vec![("Echo: ping".to_string(), false)]);
    assert!(conversation.is_turn_complete());

    // The second request sees the tool result
    let requests = provider.requests();
    assert_eq!(requests[1].messages.len(), 3);
    Ok(())
}

#[tokio::test]
async fn test_mixed_response_drops_text() -> anyhow::Result<()> {
    let provider = Arc::new(MockProvider::new(vec![
        MockProvider::mixed_response("I'll check", "call_1", "echo"),
        MockProvider::text_response("done"),
    ]));
    let agent = build(&provider, AgentConfig::default(), echo_tools())?;
    let mut conversation = Conversation::new(key());

    agent
        .run_turn(&mut conversation, "go", &CancellationToken::new())
        .await;

    let assistant_call = &conversation.messages()[1];
    assert_eq!(assistant_call.content.first_text(), None);
    assert_eq!(assistant_call.tool_use_ids().collect::<Vec<_>>(), vec!["call_1"]);
    Ok(())
}

#[tokio::test]
async fn test_unknown_tool_is_reported_to_model() -> anyhow::Result<()> {
    let provider = Arc::new(MockProvider::new(vec![
        MockProvider::tool_use_response("call_1", "teleport", json!({})),
        MockProvider::text_response("I can't do that"),
    ]));
    let agent = build(&provider, AgentConfig::default(), echo_tools())?;
    let mut conversation = Conversation::new(key());

    let outcome = agent
        .run_turn(&mut conversation, "beam me up", &CancellationToken::new())
        .await;

    assert!(outcome.is_done());
    let results = tool_results(&conversation);
    assert_eq!(results.len(), 1);
    assert!(results[0].1);
    assert!(results[0].0.contains("Unknown tool"));
    Ok(())
}

#[tokio::test]
async fn test_missing_call_ids_are_generated() -> anyhow::Result<()> {
    let provider = Arc::new(MockProvider::new(vec![
        MockProvider::tool_use_response("", "echo", json!({"message": "x"})),
        MockProvider::text_response("ok"),
    ]));
    let agent = build(&provider, AgentConfig::default(), echo_tools())?;
    let mut conversation = Conversation::new(key());

    agent
        .run_turn(&mut conversation, "go", &CancellationToken::new())
        .await;

    let ids: Vec<&str> = conversation.messages()[1].tool_use_ids().collect();
    assert!(ids[0].starts_with("call_"));
    assert!(conversation.is_turn_complete());
    Ok(())
}

#[tokio::test]
async fn test_exec_timeout_is_recorded_and_loop_continues() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let provider = Arc::new(MockProvider::new(vec![
        MockProvider::tool_use_response("call_1", "exec", json!({"command": "sleep 30"})),
        MockProvider::text_response("that took too long"),
    ]));
    let mut tools = ToolRegistry::new();
    tools.register(ExecTool);
    let agent = AgentLoop::builder()
        .provider(provider.clone())
        .tools(tools)
        .sandbox(SandboxConfig::new(dir.path()).with_timeout(Duration::from_secs(1)))
        .build()?;
    let mut conversation = Conversation::new(key());

    let started = std::time::Instant::now();
    let outcome = agent
        .run_turn(&mut conversation, "wait", &CancellationToken::new())
        .await;

    assert!(started.elapsed() < Duration::from_secs(10));
    assert_eq!(outcome.reply(), Some("that took too long"));
    let results = tool_results(&conversation);
    assert!(results[0].1);
    assert!(results[0].0.contains("timed out"));
    assert_eq!(provider.call_count(), 2);
    Ok(())
}

// ===================
// Iteration Budget
// ===================

#[tokio::test]
async fn test_iteration_budget_stops_after_n_rounds() -> anyhow::Result<()> {
    let provider = Arc::new(MockProvider::new(vec![
        MockProvider::tool_use_response("call_1", "echo", json!({"message": "1"})),
        MockProvider::tool_use_response("call_2", "echo", json!({"message": "2"})),
        MockProvider::tool_use_response("call_3", "echo", json!({"message": "3"})),
    ]));
    let config = AgentConfig {
        max_tool_iterations: 2,
        ..AgentConfig::default()
    };
    let agent = build(&provider, config, echo_tools())?;
    let mut conversation = Conversation::new(key());

    let outcome = agent
        .run_turn(&mut conversation, "loop", &CancellationToken::new())
        .await;

    assert!(matches!(
        outcome,
        TurnOutcome::Done {
            budget_exhausted: true,
            ..
        }
    ));
    assert_eq!(provider.call_count(), 2);
    assert_eq!(outcome.summary().tool_calls, 2);
    assert_eq!(tool_results(&conversation).len(), 2);
    let last = conversation.messages().last().map(|m| m.content.clone());
    assert_eq!(last, Some(Content::Text(helpers::ITERATION_BUDGET_NOTE.to_string())));
    assert!(conversation.is_turn_complete());
    Ok(())
}

#[tokio::test]
async fn test_budget_reached_mid_round_resolves_every_call() -> anyhow::Result<()> {
    let provider = Arc::new(MockProvider::new(vec![MockProvider::tool_uses_response(vec![
        ("a", "echo", json!({"message": "a"})),
        ("b", "echo", json!({"message": "b"})),
        ("c", "echo", json!({"message": "c"})),
    ])]));
    let config = AgentConfig {
        max_tool_iterations: 1,
        ..AgentConfig::default()
    };
    let agent = build(&provider, config, echo_tools())?;
    let mut conversation = Conversation::new(key());

    let outcome = agent
        .run_turn(&mut conversation, "three at once", &CancellationToken::new())
        .await;

    assert_eq!(outcome.reply(), Some(helpers::ITERATION_BUDGET_NOTE));
    assert_eq!(tool_results(&conversation).len(), 3);
    assert_eq!(provider.call_count(), 1);
    assert!(conversation.is_turn_complete());
    Ok(())
}

#[tokio::test]
async fn test_zero_iterations_sends_no_tools() -> anyhow::Result<()> {
    let provider = Arc::new(MockProvider::new(vec![MockProvider::tool_use_response(
        "call_1",
        "echo",
        json!({"message": "x"}),
    )]));
    let config = AgentConfig {
        max_tool_iterations: 0,
        ..AgentConfig::default()
    };
    let agent = build(&provider, config, echo_tools())?;
    let mut conversation = Conversation::new(key());

    let outcome = agent
        .run_turn(&mut conversation, "hi", &CancellationToken::new())
        .await;

    assert_eq!(outcome.reply(), Some(helpers::ITERATION_BUDGET_NOTE));
    assert!(provider.requests()[0].tools.is_none());
    // The ignored tool call is not recorded
    assert_eq!(conversation.len(), 2);
    assert!(conversation.is_turn_complete());
    Ok(())
}

// ===================
// Failover
// ===================

#[tokio::test]
async fn test_auth_failure_fails_over_to_backup() -> anyhow::Result<()> {
    let primary = Arc::new(MockProvider::named(
        "primary",
        vec![Err(ProviderError::Auth("401".to_string()))],
    ));
    let backup = Arc::new(MockProvider::named("backup", vec![MockProvider::text_response("4")]));
    let agent = AgentLoop::builder()
        .provider(primary.clone())
        .backup_provider(backup.clone())
        .config(with_backup(AgentConfig::default()))
        .build()?;
    let mut conversation = Conversation::new(key());

    let outcome = agent
        .run_turn(&mut conversation, "2+2?", &CancellationToken::new())
        .await;

    assert_eq!(outcome.reply(), Some("4"));
    assert!(outcome.degraded());
    assert_eq!(primary.call_count(), 1);
    assert_eq!(backup.call_count(), 1);
    assert_eq!(backup.requests()[0].model, "backup-model");
    assert_eq!(conversation.len(), 2);
    Ok(())
}

#[tokio::test]
async fn test_failover_is_sticky_for_the_turn() -> anyhow::Result<()> {
    let primary = Arc::new(MockProvider::named(
        "primary",
        vec![Err(ProviderError::Transient("503".to_string()))],
    ));
    let backup = Arc::new(MockProvider::named(
        "backup",
        vec![
            MockProvider::tool_use_response("call_1", "echo", json!({"message": "x"})),
            MockProvider::text_response("done"),
        ],
    ));
    let agent = AgentLoop::builder()
        .provider(primary.clone())
        .backup_provider(backup.clone())
        .config(with_backup(AgentConfig::default()))
        .tools(echo_tools())
        .build()?;
    let mut conversation = Conversation::new(key());

    let outcome = agent
        .run_turn(&mut conversation, "go", &CancellationToken::new())
        .await;

    assert_eq!(outcome.reply(), Some("done"));
    assert_eq!(primary.call_count(), 1);
    assert_eq!(backup.call_count(), 2);
    Ok(())
}

#[tokio::test]
async fn test_backup_failure_is_not_retried() -> anyhow::Result<()> {
    let primary = Arc::new(MockProvider::named(
        "primary",
        vec![Err(ProviderError::Transient("429".to_string()))],
    ));
    let backup = Arc::new(MockProvider::named(
        "backup",
        vec![Err(ProviderError::Transient("429".to_string()))],
    ));
    let agent = AgentLoop::builder()
        .provider(primary.clone())
        .backup_provider(backup.clone())
        .config(with_backup(AgentConfig::default()))
        .build()?;
    let mut conversation = Conversation::new(key());

    let outcome = agent
        .run_turn(&mut conversation, "hi", &CancellationToken::new())
        .await;

    assert!(matches!(
        outcome.error(),
        Some(AgentError::Provider(ProviderError::Transient(_)))
    ));
    assert_eq!(primary.call_count(), 1);
    assert_eq!(backup.call_count(), 1);
    // Only the user message was recorded
    assert_eq!(conversation.len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_fatal_error_does_not_fail_over() -> anyhow::Result<()> {
    let primary = Arc::new(MockProvider::named(
        "primary",
        vec![Err(ProviderError::Fatal("400".to_string()))],
    ));
    let backup = Arc::new(MockProvider::named("backup", vec![]));
    let agent = AgentLoop::builder()
        .provider(primary.clone())
        .backup_provider(backup.clone())
        .config(with_backup(AgentConfig::default()))
        .build()?;
    let mut conversation = Conversation::new(key());

    let outcome = agent
        .run_turn(&mut conversation, "hi", &CancellationToken::new())
        .await;

    assert!(matches!(
        outcome.error(),
        Some(AgentError::Provider(ProviderError::Fatal(_)))
    ));
    assert_eq!(backup.call_count(), 0);
    Ok(())
}

#[tokio::test]
async fn test_transient_without_backup_fails_turn() -> anyhow::Result<()> {
    let provider = Arc::new(MockProvider::new(vec![Err(ProviderError::Transient(
        "timeout".to_string(),
    ))]));
    let agent = build(&provider, AgentConfig::default(), ToolRegistry::new())?;
    let mut conversation = Conversation::new(key());

    let outcome = agent
        .run_turn(&mut conversation, "hi", &CancellationToken::new())
        .await;

    assert!(!outcome.is_done());
    assert_eq!(provider.call_count(), 1);
    Ok(())
}

// ===================
// Deadline, Tokens, Cancellation
// ===================

#[tokio::test]
async fn test_deadline_fails_turn() -> anyhow::Result<()> {
    let agent = AgentLoop::builder()
        .provider(Arc::new(HangingProvider))
        .config(AgentConfig {
            turn_timeout: Duration::from_millis(100),
            ..AgentConfig::default()
        })
        .build()?;
    let mut conversation = Conversation::new(key());

    let outcome = agent
        .run_turn(&mut conversation, "hi", &CancellationToken::new())
        .await;

    assert_eq!(
        outcome.error(),
        Some(&AgentError::BudgetExhausted(BudgetKind::Deadline))
    );
    Ok(())
}

#[tokio::test]
async fn test_token_ceiling_stops_before_tools_run() -> anyhow::Result<()> {
    // Each mock response uses 30 tokens
    let provider = Arc::new(MockProvider::new(vec![MockProvider::tool_use_response(
        "call_1",
        "echo",
        json!({"message": "x"}),
    )]));
    let config = AgentConfig {
        max_turn_tokens: Some(25),
        ..AgentConfig::default()
    };
    let agent = build(&provider, config, echo_tools())?;
    let mut conversation = Conversation::new(key());

    let outcome = agent
        .run_turn(&mut conversation, "hi", &CancellationToken::new())
        .await;

    assert_eq!(
        outcome.error(),
        Some(&AgentError::BudgetExhausted(BudgetKind::Tokens))
    );
    assert_eq!(outcome.summary().usage.total(), 30);
    assert_eq!(conversation.len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_cancelled_before_start() -> anyhow::Result<()> {
    let provider = Arc::new(MockProvider::new(vec![]));
    let agent = build(&provider, AgentConfig::default(), ToolRegistry::new())?;
    let mut conversation = Conversation::new(key());
    let cancel = CancellationToken::new();
    cancel.cancel();

    let outcome = agent.run_turn(&mut conversation, "hi", &cancel).await;

    assert_eq!(outcome.error(), Some(&AgentError::Cancelled));
    assert_eq!(provider.call_count(), 0);
    Ok(())
}

#[tokio::test]
async fn test_cancel_during_model_call() -> anyhow::Result<()> {
    let agent = AgentLoop::builder()
        .provider(Arc::new(HangingProvider))
        .build()?;
    let mut conversation = Conversation::new(key());
    let cancel = CancellationToken::new();

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let outcome = agent.run_turn(&mut conversation, "hi", &cancel).await;

    assert_eq!(outcome.error(), Some(&AgentError::Cancelled));
    assert_eq!(conversation.len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_cancel_during_tool_round_keeps_history_consistent() -> anyhow::Result<()> {
    let provider = Arc::new(MockProvider::new(vec![MockProvider::tool_uses_response(vec![
        ("a", "block", json!({})),
        ("b", "echo", json!({"message": "never"})),
    ])]));
    let mut tools = echo_tools();
    tools.register(BlockingTool);
    let agent = build(&provider, AgentConfig::default(), tools)?;
    let mut conversation = Conversation::new(key());
    let cancel = CancellationToken::new();

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let outcome = agent.run_turn(&mut conversation, "hi", &cancel).await;

    assert_eq!(outcome.error(), Some(&AgentError::Cancelled));
    assert!(conversation.is_turn_complete());
    let results = tool_results(&conversation);
    assert_eq!(results.len(), 2);
    assert!(results.iter().all(|(_, is_error)| *is_error));
    assert_eq!(provider.call_count(), 1);
    Ok(())
}

// ===================
// History Invariants
// ===================

#[tokio::test]
async fn test_ordinals_increase_across_turns_and_failures() -> anyhow::Result<()> {
    let provider = Arc::new(MockProvider::new(vec![
        MockProvider::tool_use_response("call_1", "echo", json!({"message": "1"})),
        MockProvider::text_response("first"),
        Err(ProviderError::Fatal("bad request".to_string())),
        MockProvider::text_response("third"),
    ]));
    let agent = build(&provider, AgentConfig::default(), echo_tools())?;
    let mut conversation = Conversation::new(key());
    let cancel = CancellationToken::new();

    agent.run_turn(&mut conversation, "one", &cancel).await;
    agent.run_turn(&mut conversation, "two", &cancel).await;
    agent.run_turn(&mut conversation, "three", &cancel).await;

    let ordinals: Vec<u64> = conversation.messages().iter().map(|m| m.ordinal).collect();
    let expected: Vec<u64> = (1..=u64::try_from(ordinals.len())?).collect();
    assert_eq!(ordinals, expected);
    assert!(conversation.is_turn_complete());
    Ok(())
}

#[tokio::test]
async fn test_events_stream_in_order() -> anyhow::Result<()> {
    let provider = Arc::new(MockProvider::new(vec![
        MockProvider::tool_use_response("call_1", "echo", json!({"message": "1"})),
        MockProvider::text_response("ok"),
    ]));
    let (tx, mut rx) = mpsc::channel(32);
    let agent = AgentLoop::builder()
        .provider(provider.clone())
        .tools(echo_tools())
        .events(tx)
        .build()?;
    let mut conversation = Conversation::new(key());

    agent
        .run_turn(&mut conversation, "go", &CancellationToken::new())
        .await;
    drop(agent);

    let mut events = Vec::new();
    while let Some(envelope) = rx.recv().await {
        events.push(envelope);
    }

    let kinds: Vec<&str> = events
        .iter()
        .map(|e| match e.event {
            AgentEvent::RoundStart { .. } => "round_start",
            AgentEvent::ToolCallStart { .. } => "tool_call_start",
            AgentEvent::ToolCallEnd { .. } => "tool_call_end",
            AgentEvent::Failover { .. } => "failover",
            AgentEvent::Done { .. } => "done",
            AgentEvent::Failed { .. } => "failed",
        })
        .collect();
    assert_eq!(
        kinds,
        vec!["round_start", "tool_call_start", "tool_call_end", "round_start", "done"]
    );
    let sequences: Vec<u64> = events.iter().map(|e| e.sequence).collect();
    assert_eq!(sequences, vec![0, 1, 2, 3, 4]);
    assert!(events.iter().all(|e| e.key == key()));

    let tool_end = events.iter().find_map(|e| match &e.event {
        AgentEvent::ToolCallEnd { result, .. } => Some(result.clone()),
        _ => None,
    });
    assert_eq!(tool_end.map(|r| r.error), Some(None::<ToolErrorKind>));
    Ok(())
}
