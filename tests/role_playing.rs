use std::sync::Arc;

use duet::agent::{Completion, ScriptedBackend};
use duet::config::{AgentConfig, BridgeConfig, SessionConfig};
use duet::error::{ModelError, RolePlayError};
use duet::session::{RolePlaying, RolePlayingOptions, SessionStatus};
use duet::tools::{FunctionRegistry, RolePlayingFunction, ROLE_PLAYING_FUNCTION};
use duet::types::{FunctionCall, Role, ToolCall};

fn options(turn_limit: usize) -> RolePlayingOptions {
    RolePlayingOptions::new(
        SessionConfig::new("Python Programmer", "Stock Trader", "Develop a trading bot")
            .with_turn_limit(turn_limit),
        AgentConfig::default(),
    )
}

async fn session(backend: &Arc<ScriptedBackend>, opts: RolePlayingOptions) -> RolePlaying {
    RolePlaying::create(opts, backend.clone()).await.unwrap()
}

#[tokio::test]
async fn runs_exactly_the_turn_limit_without_markers() {
    for limit in 1..=6 {
        let backend = Arc::new(ScriptedBackend::texts::<&str>(&[]).with_fallback("carry on"));
        let mut session = session(&backend, options(limit)).await;

        let outcome = session.run(|_| {}).await.unwrap();

        assert_eq!(outcome.status, SessionStatus::LimitReached, "limit {}", limit);
        assert_eq!(outcome.turn_count, limit);
        assert_eq!(outcome.transcript.len(), limit);
        assert_eq!(backend.call_count(), 2 * limit);
    }
}

#[tokio::test]
async fn turn_limit_three_ends_in_limit_reached() {
    let backend = Arc::new(ScriptedBackend::texts(&["u1", "a1", "u2", "a2", "u3", "a3", "u4"]));
    let mut session = session(&backend, options(3)).await;

    let outcome = session.run(|_| {}).await.unwrap();

    assert_eq!(outcome.status, SessionStatus::LimitReached);
    assert_eq!(session.state().turn_count(), 3);
    assert_eq!(backend.call_count(), 6);
}

#[tokio::test]
async fn assistant_marker_completes_at_that_turn() {
    let backend = Arc::new(ScriptedBackend::texts(&[
        "u1",
        "a1",
        "u2",
        "Summary done. CAMEL_TASK_DONE",
        "never used",
    ]));
    let mut session = session(&backend, options(10)).await;

    let outcome = session.run(|_| {}).await.unwrap();

    assert_eq!(outcome.status, SessionStatus::Completed);
    assert_eq!(outcome.turn_count, 2);
    assert_eq!(backend.call_count(), 4);
}

#[tokio::test]
async fn user_marker_at_turn_two_completes() {
    let backend = Arc::new(ScriptedBackend::texts(&[
        "Instruction: write tests",
        "Thought: done",
        "Great work. CAMEL_TASK_DONE",
        "Acknowledged.",
    ]));
    let mut session = session(&backend, options(10)).await;

    let outcome = session.run(|_| {}).await.unwrap();

    assert_eq!(outcome.status, SessionStatus::Completed);
    assert_eq!(outcome.turn_count, 2);
    // 同一轮里 assistant 已经回复过，回复会留在记录里
    assert_eq!(outcome.transcript[1].assistant.message.content(), "Acknowledged.");
}

#[tokio::test]
async fn termination_takes_precedence_over_completion_marker() {
    let backend = Arc::new(ScriptedBackend::texts(&["I refuse <<STOP>>", "CAMEL_TASK_DONE"]));
    let mut opts = options(10);
    opts.user = AgentConfig::default().with_termination_marker("<<STOP>>");
    let mut session = session(&backend, opts).await;

    let outcome = session.run(|_| {}).await.unwrap();

    assert_eq!(
        outcome.status,
        SessionStatus::Terminated {
            by: Role::User,
            reasons: vec!["termination_marker:<<STOP>>".into()],
        }
    );
    assert_eq!(outcome.turn_count, 1);
    assert!(session.state().user_terminated());
    assert_eq!(session.state().termination_reason(), Some("termination_marker:<<STOP>>"));
}

#[tokio::test]
async fn memory_holds_two_records_per_turn_in_order() {
    let backend = Arc::new(ScriptedBackend::texts(&["u1", "a1", "u2", "a2", "u3", "a3"]));
    let mut session = session(&backend, options(3)).await;
    let seed = session.init_chat();

    session.run(|_| {}).await.unwrap();

    let user_records = session.user_agent().memory().records();
    let assistant_records = session.assistant_agent().memory().records();
    assert_eq!(user_records.len(), 6);
    assert_eq!(assistant_records.len(), 6);

    let user_contents: Vec<&str> = user_records.iter().map(|r| r.message.content()).collect();
    assert_eq!(user_contents, vec![seed.content(), "u1", "a1", "u2", "a2", "u3"]);

    let assistant_contents: Vec<&str> = assistant_records
        .iter()
        .map(|r| r.message.content())
        .collect();
    assert_eq!(assistant_contents, vec!["u1", "a1", "u2", "a2", "u3", "a3"]);

    let user_id = session.user_agent().id();
    let assistant_id = session.assistant_agent().id();
    for (i, record) in user_records.iter().enumerate() {
        assert_eq!(record.seq, i as u64);
        assert_eq!(record.is_own(user_id), i % 2 == 1);
    }

    // 每条输入都能追溯到发送方；只有种子消息没有来源
    assert_eq!(user_records[0].producer, None);
    assert_eq!(user_records[2].producer, Some(assistant_id));
    assert_eq!(user_records[2].role_name, "Python Programmer");
    for record in assistant_records.iter().step_by(2) {
        assert_eq!(record.producer, Some(user_id));
        assert_eq!(record.role_name, "Stock Trader");
    }
}

#[tokio::test]
async fn model_fault_aborts_step_without_recording() {
    let backend = Arc::new(ScriptedBackend::new(vec![
        Ok(Completion::text("Instruction: begin")),
        Err(ModelError::Api {
            status: 500,
            body: "boom".into(),
        }),
        Ok(Completion::text("Instruction: begin again")),
        Ok(Completion::text("Thought: fine")),
    ]));
    let mut session = session(&backend, options(5)).await;
    let seed = session.init_chat();

    let err = session.step(&seed).await.unwrap_err();
    assert!(matches!(
        err,
        RolePlayError::ModelInvocation(ModelError::Api { status: 500, .. })
    ));
    assert_eq!(session.state().turn_count(), 0);
    assert!(session.assistant_agent().memory().is_empty());
    assert!(session.user_agent().memory().is_empty());
    assert!(session.transcript().is_empty());
    assert_eq!(session.state().status(), &SessionStatus::Running);

    // 失败后会话仍可继续
    let (assistant, user) = session.step(&seed).await.unwrap();
    assert_eq!(user.message.content(), "Instruction: begin again");
    assert_eq!(assistant.message.content(), "Thought: fine");
    assert_eq!(session.state().turn_count(), 1);
    assert_eq!(session.user_agent().memory().len(), 2);
}

#[tokio::test]
async fn run_propagates_model_errors() {
    let backend = Arc::new(ScriptedBackend::new(vec![Err(ModelError::RateLimited)]));
    let mut session = session(&backend, options(5)).await;

    let err = session.run(|_| {}).await.unwrap_err();
    assert!(matches!(err, RolePlayError::ModelInvocation(ModelError::RateLimited)));
    assert_eq!(session.state().turn_count(), 0);
}

#[tokio::test]
async fn nested_sessions_never_see_parent_memory() {
    let backend = Arc::new(
        ScriptedBackend::texts(&["PARENT_SECRET instruction", "PARENT_SECRET answer"])
            .with_fallback("nested reply"),
    );
    let mut parent = session(&backend, options(1)).await;
    parent.run(|_| {}).await.unwrap();
    assert!(!parent.assistant_agent().memory().is_empty());

    let bridge = RolePlayingFunction::new(
        backend.clone(),
        AgentConfig::default(),
        BridgeConfig {
            turn_limit: 2,
            transcript_tail: 4,
        },
    );

    let before = backend.call_count();
    let first = bridge
        .invoke("Sub task", "context", "Analyst", "Engineer", "English")
        .await
        .unwrap();
    let second = bridge
        .invoke("Sub task", "context", "Analyst", "Engineer", "English")
        .await
        .unwrap();

    assert_eq!(first, second);
    assert!(!first.contains("PARENT_SECRET"));

    for request in &backend.requests()[before..] {
        assert!(!request.system_prompt.contains("PARENT_SECRET"));
        assert!(request
            .history
            .iter()
            .all(|m| !m.content.contains("PARENT_SECRET")));
    }

    // 父会话状态不受影响
    assert_eq!(parent.assistant_agent().memory().len(), 2);
    assert_eq!(parent.state().turn_count(), 1);
}

#[tokio::test]
async fn assistant_can_delegate_through_role_playing_function() {
    let delegate = ToolCall {
        id: String::new(),
        tool_type: Some("function".into()),
        function: FunctionCall {
            name: ROLE_PLAYING_FUNCTION.into(),
            index: None,
            arguments: serde_json::json!({
                "task_prompt": "Check the lemma",
                "input": "m = 1",
                "user_role": "Math Student",
                "assistant_role": "Math Student",
                "output_language": "English"
            }),
        },
    };

    let backend = Arc::new(ScriptedBackend::new(vec![
        // 父会话 user
        Ok(Completion::text("Instruction: verify the base case")),
        // 父会话 assistant 请求委派
        Ok(Completion {
            content: String::new(),
            tool_calls: vec![delegate],
            truncated: false,
        }),
        // 嵌套会话一轮
        Ok(Completion::text("Instruction: check m = 1")),
        Ok(Completion::text("Base case holds. CAMEL_TASK_DONE")),
        // 父会话 assistant 收到函数结果后的最终回复
        Ok(Completion::text("Verified via sub-session. CAMEL_TASK_DONE")),
    ]));

    let nested = RolePlayingFunction::new(
        backend.clone(),
        AgentConfig::default(),
        BridgeConfig {
            turn_limit: 1,
            transcript_tail: 4,
        },
    );
    let registry = Arc::new(FunctionRegistry::new().with(Arc::new(nested)));
    let mut session = session(&backend, options(5).with_functions(registry)).await;

    let outcome = session.run(|_| {}).await.unwrap();

    assert_eq!(outcome.status, SessionStatus::Completed);
    assert_eq!(outcome.turn_count, 1);

    let assistant = &outcome.transcript[0].assistant;
    assert_eq!(assistant.message.content(), "Verified via sub-session. CAMEL_TASK_DONE");
    let calls = assistant.info["function_calls"].as_array().unwrap();
    let result = calls[0]["result"].as_str().unwrap();
    assert!(result.starts_with("Check the lemma\nm = 1\n"));
    assert!(result.contains("Base case holds."));
    assert!(!result.contains("CAMEL_TASK_DONE"));

    // 父会话 Agent 带工具，嵌套会话的 Agent 不带
    let requests = backend.requests();
    assert_eq!(requests.len(), 5);
    assert_eq!(requests[1].tool_names, vec![ROLE_PLAYING_FUNCTION.to_string()]);
    assert!(requests[2].tool_names.is_empty());
    assert!(requests[3].tool_names.is_empty());
    assert_eq!(requests[4].history.last().unwrap().role, "tool");

    assert_eq!(session.assistant_agent().memory().len(), 2);
}
