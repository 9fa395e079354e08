//! 端到端：脚本化 LLM + 真实 shell 会话 / 文件系统

use std::sync::Arc;

use forager::config::SearchSection;
use forager::core::{AgentState, FlowBuilder};
use forager::llm::{LlmClient, MockLlmClient, ToolChoice};
use forager::memory::Role;
use forager::react::{shared, Agent, AgentCore, EventSink, ToolCallStrategy};
use forager::session::Sessions;
use forager::tools::{AgentTool, ToolContext, ToolDeps, ToolKind};
use serde_json::json;

fn deps(root: &std::path::Path) -> ToolDeps {
    let sessions = Sessions::from_config(&Default::default());
    ToolDeps::new(sessions, root, SearchSection::default())
}

#[cfg(unix)]
#[tokio::test]
async fn test_shell_session_survives_user_question() {
    let dir = tempfile::tempdir().unwrap();
    let deps = deps(dir.path());
    let mock = Arc::new(MockLlmClient::new());
    let exec_args = json!({"command": "echo forager-e2e", "exec_dir": dir.path()}).to_string();
    mock.push_thought("start the command").push_tool_calls(&[
        ("shell_exec", exec_args.as_str()),
        ("message_ask_user", r#"{"text": "Proceed?"}"#),
    ]);

    let tools = deps.collection(&[
        ToolKind::ShellExec,
        ToolKind::ShellWait,
        ToolKind::MessageAskUser,
        ToolKind::Terminate,
    ]);
    let llm: Arc<dyn LlmClient> = mock.clone();
    let mut agent = Agent::new(AgentCore::new("worker", llm), ToolCallStrategy::new(tools));

    let first = agent.run(Some("echo something".into()), None).await.unwrap();
    assert!(first.contains("Question for the user: Proceed?"));
    assert_eq!(agent.core.state(), AgentState::AwaitingUserInput);
    assert_eq!(agent.core.current_step(), 1);

    let ids = deps.sessions.shell.ids();
    assert_eq!(ids.len(), 1);
    let wait_args = json!({"id": ids[0], "seconds": 10}).to_string();
    mock.push_thought("wait for it")
        .push_tool_calls(&[("shell_wait", wait_args.as_str())]);

    let second = agent.run(Some("yes".into()), None).await.unwrap();
    assert!(second.contains("finished with return code 0"));
    assert!(second.contains("forager-e2e"));
    assert!(second.contains("Step 3: Observed output of cmd `terminate` executed:"));
    assert_eq!(agent.core.state(), AgentState::Idle);
    assert!(deps.sessions.shell.is_empty());

    deps.sessions.shutdown().await;
}

#[tokio::test]
async fn test_required_choice_writes_and_reads_file() {
    let dir = tempfile::tempdir().unwrap();
    let deps = deps(dir.path());
    let path = dir.path().join("notes.txt");
    let file = path.to_string_lossy().to_string();

    let mock = Arc::new(MockLlmClient::new());
    mock.push_thought("write then read")
        .push_tool_calls(&[(
            "file_write",
            json!({"file": file, "content": "alpha\nbeta\n"}).to_string().as_str(),
        )])
        .push_thought("read back")
        .push_tool_calls(&[("file_read", json!({"file": file}).to_string().as_str())]);

    let tools = deps.collection(&[ToolKind::FileWrite, ToolKind::FileRead, ToolKind::Terminate]);
    let llm: Arc<dyn LlmClient> = mock.clone();
    let strategy = ToolCallStrategy::new(tools).with_tool_choice(ToolChoice::Required);
    let mut agent = Agent::new(AgentCore::new("writer", llm), strategy);

    let out = agent.run(Some("keep notes".into()), None).await.unwrap();
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "alpha\nbeta\n");
    assert!(out.contains("Successfully"));
    assert!(out.contains("beta"));
    assert!(mock
        .tool_requests()
        .iter()
        .all(|r| r.choice == ToolChoice::Required));
}

#[tokio::test]
async fn test_flow_shares_scratchpad_between_agents() {
    let dir = tempfile::tempdir().unwrap();
    let deps = deps(dir.path());
    let mock = Arc::new(MockLlmClient::new());
    mock.push_thought("note the goal")
        .push_tool_calls(&[(
            "scratchpad_write",
            r#"{"key": "goal", "value": "ship it"}"#,
        )])
        .push_thought("delegate")
        .push_tool_calls(&[("helper_agent", r#"{"request": "read the goal"}"#)])
        // helper
        .push_thought("look at the pad")
        .push_tool_calls(&[("scratchpad_read", r#"{"key": "goal"}"#)]);
    let llm: Arc<dyn LlmClient> = mock.clone();

    let helper = shared(Agent::new(
        AgentCore::new("helper", llm.clone()).with_description("Reads notes."),
        ToolCallStrategy::new(deps.collection(&[ToolKind::ScratchpadRead, ToolKind::Idle]))
            .with_special_tools(["idle"]),
    ));
    let mut manager_tools = deps.collection(&[ToolKind::ScratchpadWrite, ToolKind::Idle]);
    manager_tools.add(AgentTool::from_agent(helper.clone()).await);
    let manager = shared(Agent::new(
        AgentCore::new("manager", llm),
        ToolCallStrategy::new(manager_tools).with_special_tools(["idle"]),
    ));

    let (events, _rx) = EventSink::channel();
    let flow = FlowBuilder::new()
        .agent("manager", manager)
        .agent("helper", helper.clone())
        .events(events)
        .build()
        .await
        .unwrap();
    let out = flow.execute("ship the release").await.unwrap();

    assert!(out.contains("Saved 'goal' to the scratchpad."));
    assert!(out.contains("ship it"));
    assert_eq!(helper.lock().await.state(), AgentState::Idle);
}

#[cfg(unix)]
#[tokio::test]
async fn test_listing_tmp_through_shell_session() {
    let deps = deps(&std::env::temp_dir());
    let marker = tempfile::Builder::new()
        .prefix("forager-ls-")
        .tempfile_in("/tmp")
        .unwrap();
    let marker_name = marker
        .path()
        .file_name()
        .unwrap()
        .to_string_lossy()
        .to_string();

    let mock = Arc::new(MockLlmClient::new());
    mock.push_thought("list it").push_tool_calls(&[(
        "shell_exec",
        r#"{"command": "ls /tmp", "exec_dir": "/tmp"}"#,
    )]);
    let tools = deps.collection(&[ToolKind::ShellExec, ToolKind::ShellView]);
    let llm: Arc<dyn LlmClient> = mock.clone();
    let mut agent = Agent::new(
        AgentCore::new("lister", llm).with_max_steps(1),
        ToolCallStrategy::new(tools),
    );

    let out = agent.run(Some("list files in /tmp".into()), None).await.unwrap();
    assert!(out.contains("Terminated: Reached max steps (1)"));

    let observation = agent
        .core
        .memory
        .messages()
        .iter()
        .find(|m| m.role == Role::Tool)
        .map(|m| m.content.clone())
        .unwrap();
    let id = observation
        .split("session ID: ")
        .nth(1)
        .and_then(|rest| rest.split('.').next())
        .unwrap()
        .to_string();

    let ctx = ToolContext::default();
    let mut view = String::new();
    for _ in 0..50 {
        view = agent
            .strategy
            .tools()
            .execute("shell_view", json!({ "id": id }), &ctx)
            .await
            .to_string();
        if view.contains("STATUS: Finished") {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    }
    assert!(view.contains("STATUS: Finished with code 0"), "{view}");
    assert!(view.contains(&marker_name));
    assert!(deps.sessions.shell.get(&id).is_none());
}
