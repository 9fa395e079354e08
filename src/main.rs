//! Forager 命令行入口
//!
//! 初始化日志与配置，构建默认团队，执行一次请求后清理所有后台会话。
//! 请求文本取自命令行参数；没有参数时从标准输入读取。

use std::io::Read;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use forager::config::load_config;
use forager::core::{build_default_team, FlowBuilder, MANAGER_KEY};
use forager::llm::create_client_from_config;
use forager::observability;
use forager::react::{AgentEvent, EventSink};
use forager::session::Sessions;
use forager::tools::ToolDeps;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();

    let config_path = std::env::var("FORAGER_CONFIG").ok().map(PathBuf::from);
    let cfg = load_config(config_path).context("Failed to load config")?;

    let workspace_root = &cfg.app.workspace_root;
    std::fs::create_dir_all(workspace_root)
        .with_context(|| format!("Failed to create workspace {}", workspace_root.display()))?;
    let workspace_root = workspace_root
        .canonicalize()
        .context("Failed to resolve workspace path")?;

    let prompt = read_prompt()?;
    if prompt.trim().is_empty() {
        tracing::warn!("Empty prompt provided.");
        return Ok(());
    }

    let llm = create_client_from_config(&cfg.llm);
    let sessions = Sessions::from_config(&cfg.tools);
    let deps = ToolDeps::new(sessions.clone(), workspace_root, cfg.tools.search.clone());

    let (events, mut rx) = EventSink::channel();
    let printer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            print_event(&event);
        }
    });

    let flow = FlowBuilder::new()
        .agents(build_default_team(llm, &deps, &cfg.agent))
        .primary(MANAGER_KEY)
        .events(events)
        .build()
        .await
        .context("Failed to build agent team")?;

    tracing::warn!("Processing your request...");
    let started = std::time::Instant::now();
    let timeout = Duration::from_secs(cfg.app.run_timeout_secs);
    let outcome = tokio::time::timeout(timeout, flow.execute(&prompt)).await;

    match outcome {
        Ok(Ok(result)) => {
            tracing::info!(elapsed_secs = started.elapsed().as_secs_f64(), "request processed");
            println!("{}", result);
        }
        Ok(Err(e)) => tracing::error!(error = %e, "request failed"),
        Err(_) => tracing::error!(
            timeout_secs = cfg.app.run_timeout_secs,
            "request processing timed out"
        ),
    }

    sessions.shutdown().await;
    drop(flow);
    let _ = tokio::time::timeout(Duration::from_secs(1), printer).await;
    Ok(())
}

fn read_prompt() -> anyhow::Result<String> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    if !args.is_empty() {
        return Ok(args.join(" "));
    }
    let mut buf = String::new();
    std::io::stdin()
        .read_to_string(&mut buf)
        .context("Failed to read prompt from stdin")?;
    Ok(buf)
}

fn print_event(event: &AgentEvent) {
    match event {
        AgentEvent::StepUpdate {
            agent,
            step,
            max_steps,
        } => eprintln!("[{}] step {}/{}", agent, step, max_steps),
        AgentEvent::Thought { agent, content } => eprintln!("[{}] ✨ {}", agent, content),
        AgentEvent::Action { title, content } => eprintln!("{} {}", title, content),
        AgentEvent::Chat { content } | AgentEvent::Summary { content } => eprintln!("{}", content),
        AgentEvent::TerminalOutput { content } => eprint!("{}", content),
        other => tracing::debug!(kind = other.kind(), "event"),
    }
}
