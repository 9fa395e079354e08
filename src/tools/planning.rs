//! planning：创建与管理多步计划
//!
//! 命令：create / update / list / get / set_active / mark_step / delete。
//! 同一时刻最多一个 active 计划；每次修改都会推送 plan 事件（状态映射为 pending / in_progress / completed）。

use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::react::{AgentEvent, PlanStepView};
use crate::tools::schema::{args_schema, parse_args};
use crate::tools::{Tool, ToolContext, ToolError, ToolResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    #[default]
    NotStarted,
    InProgress,
    Completed,
    Blocked,
}

impl StepStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepStatus::NotStarted => "not_started",
            StepStatus::InProgress => "in_progress",
            StepStatus::Completed => "completed",
            StepStatus::Blocked => "blocked",
        }
    }

    /// 展示用状态：未开始与阻塞都显示为 pending
    fn view_status(&self) -> &'static str {
        match self {
            StepStatus::InProgress => "in_progress",
            StepStatus::Completed => "completed",
            StepStatus::NotStarted | StepStatus::Blocked => "pending",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanStep {
    pub text: String,
    pub status: StepStatus,
    pub notes: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan {
    pub id: String,
    pub title: String,
    pub steps: Vec<PlanStep>,
}

impl Plan {
    fn completed(&self) -> usize {
        self.steps
            .iter()
            .filter(|s| s.status == StepStatus::Completed)
            .count()
    }

    fn render(&self) -> String {
        let mut out = format!("Plan: {} (ID: {})", self.title, self.id);
        for (i, step) in self.steps.iter().enumerate() {
            out.push_str(&format!("\n{}. [{}] {}", i, step.status.as_str(), step.text));
        }
        out
    }

    fn view(&self) -> Vec<PlanStepView> {
        self.steps
            .iter()
            .enumerate()
            .map(|(i, s)| PlanStepView {
                id: i.to_string(),
                text: s.text.clone(),
                status: s.status.view_status().to_string(),
            })
            .collect()
    }

    /// 替换步骤；与旧步骤同位置同文本的保留状态与备注
    fn replace_steps(&mut self, steps: Vec<String>) {
        let old = std::mem::take(&mut self.steps);
        self.steps = steps
            .into_iter()
            .enumerate()
            .map(|(i, text)| match old.get(i) {
                Some(prev) if prev.text == text => prev.clone(),
                _ => PlanStep {
                    text,
                    status: StepStatus::NotStarted,
                    notes: String::new(),
                },
            })
            .collect();
    }
}

#[derive(Debug, Clone, Copy, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
enum PlanCommand {
    Create,
    Update,
    List,
    Get,
    SetActive,
    MarkStep,
    Delete,
}

#[derive(Deserialize, JsonSchema)]
struct PlanningArgs {
    /// The command to execute. Available commands: create, update, list, get, set_active, mark_step, delete.
    command: PlanCommand,
    /// Unique identifier for the plan.
    #[serde(default)]
    plan_id: Option<String>,
    /// Title for the plan (create / update).
    #[serde(default)]
    title: Option<String>,
    /// List of plan steps (create / update).
    #[serde(default)]
    steps: Option<Vec<String>>,
    /// Index of the step to update, 0-based (mark_step).
    #[serde(default)]
    step_index: Option<i64>,
    /// Status to set for a step (mark_step).
    #[serde(default)]
    step_status: Option<StepStatus>,
    /// Additional notes for a step (mark_step).
    #[serde(default)]
    step_notes: Option<String>,
}

#[derive(Default)]
struct PlanStore {
    plans: Vec<Plan>,
    active: Option<String>,
}

impl PlanStore {
    fn find(&self, id: &str) -> Result<usize, ToolError> {
        self.plans
            .iter()
            .position(|p| p.id == id)
            .ok_or_else(|| fail(format!("No plan found with ID: {}", id)))
    }

    fn resolve(&self, plan_id: Option<String>) -> Result<usize, ToolError> {
        let id = plan_id
            .or_else(|| self.active.clone())
            .ok_or_else(|| fail("No active plan. Please specify a plan_id."))?;
        self.find(&id)
    }
}

fn fail(msg: impl Into<String>) -> ToolError {
    ToolError::Execution(msg.into())
}

fn required(value: Option<String>, name: &str, command: &str) -> Result<String, ToolError> {
    value
        .filter(|v| !v.is_empty())
        .ok_or_else(|| fail(format!("Parameter `{}` is required for command: {}", name, command)))
}

/// 计划工具；计划只存在于进程内存
#[derive(Default)]
pub struct PlanningTool {
    store: Mutex<PlanStore>,
}

impl PlanningTool {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, PlanStore> {
        self.store.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// 当前 active 计划的快照
    pub fn active_plan(&self) -> Option<Plan> {
        let store = self.lock();
        let id = store.active.as_deref()?;
        store.plans.iter().find(|p| p.id == id).cloned()
    }

    /// 执行命令；返回给 Agent 的文本与（若有修改）需推送的计划视图
    fn run(&self, args: PlanningArgs) -> Result<(String, Option<Vec<PlanStepView>>), ToolError> {
        let mut store = self.lock();
        match args.command {
            PlanCommand::Create => {
                let id = required(args.plan_id, "plan_id", "create")?;
                if store.plans.iter().any(|p| p.id == id) {
                    return Err(fail(format!("A plan with ID '{}' already exists.", id)));
                }
                let title = required(args.title, "title", "create")?;
                let steps = args
                    .steps
                    .filter(|s| !s.is_empty())
                    .ok_or_else(|| fail("Parameter `steps` must be a non-empty list of strings."))?;
                let plan = Plan {
                    id: id.clone(),
                    title,
                    steps: steps
                        .into_iter()
                        .map(|text| PlanStep {
                            text,
                            status: StepStatus::NotStarted,
                            notes: String::new(),
                        })
                        .collect(),
                };
                let out = format!("Plan created successfully with ID: {}\n\n{}", id, plan.render());
                let view = plan.view();
                store.plans.push(plan);
                store.active = Some(id);
                Ok((out, Some(view)))
            }
            PlanCommand::Update => {
                let id = required(args.plan_id, "plan_id", "update")?;
                let idx = store.find(&id)?;
                let plan = &mut store.plans[idx];
                if let Some(title) = args.title.filter(|t| !t.is_empty()) {
                    plan.title = title;
                }
                if let Some(steps) = args.steps.filter(|s| !s.is_empty()) {
                    plan.replace_steps(steps);
                }
                Ok((
                    format!("Plan updated successfully: {}\n\n{}", id, plan.render()),
                    Some(plan.view()),
                ))
            }
            PlanCommand::List => {
                if store.plans.is_empty() {
                    return Ok(("No plans available.".to_string(), None));
                }
                let mut out = String::from("Available plans:");
                for plan in &store.plans {
                    let marker = if store.active.as_deref() == Some(plan.id.as_str()) {
                        " (active)"
                    } else {
                        ""
                    };
                    out.push_str(&format!(
                        "\n• {}{}: {} - {}/{} steps completed",
                        plan.id,
                        marker,
                        plan.title,
                        plan.completed(),
                        plan.steps.len()
                    ));
                }
                Ok((out, None))
            }
            PlanCommand::Get => {
                let idx = store.resolve(args.plan_id)?;
                Ok((store.plans[idx].render(), None))
            }
            PlanCommand::SetActive => {
                let id = required(args.plan_id, "plan_id", "set_active")?;
                let idx = store.find(&id)?;
                store.active = Some(id.clone());
                let plan = &store.plans[idx];
                Ok((
                    format!("Plan '{}' is now active.\n\n{}", id, plan.render()),
                    Some(plan.view()),
                ))
            }
            PlanCommand::MarkStep => {
                let idx = store.resolve(args.plan_id)?;
                let step_index = args
                    .step_index
                    .ok_or_else(|| fail("Parameter `step_index` is required."))?;
                let plan = &mut store.plans[idx];
                let step = match usize::try_from(step_index) {
                    Ok(i) if i < plan.steps.len() => &mut plan.steps[i],
                    _ => return Err(fail(format!("Invalid step_index: {}.", step_index))),
                };
                if let Some(status) = args.step_status {
                    step.status = status;
                }
                if let Some(notes) = args.step_notes.filter(|n| !n.is_empty()) {
                    step.notes = notes;
                }
                Ok((
                    format!(
                        "Step {} updated in plan '{}'.\n\n{}",
                        step_index,
                        plan.id,
                        plan.render()
                    ),
                    Some(plan.view()),
                ))
            }
            PlanCommand::Delete => {
                let id = args
                    .plan_id
                    .filter(|v| !v.is_empty())
                    .ok_or_else(|| fail("Parameter `plan_id` is required."))?;
                let idx = store.find(&id)?;
                store.plans.remove(idx);
                if store.active.as_deref() == Some(id.as_str()) {
                    store.active = None;
                }
                Ok((format!("Plan '{}' has been deleted.", id), None))
            }
        }
    }
}

#[async_trait]
impl Tool for PlanningTool {
    fn name(&self) -> &str {
        "planning"
    }

    fn description(&self) -> &str {
        "A planning tool that allows the agent to create and manage plans for solving complex tasks. The tool provides functionality for creating plans, updating plan steps, and tracking progress."
    }

    fn parameters_schema(&self) -> Value {
        args_schema::<PlanningArgs>()
    }

    async fn execute(&self, ctx: &ToolContext, args: Value) -> Result<ToolResult, ToolError> {
        let args: PlanningArgs = parse_args(args)?;
        let (output, view) = self.run(args)?;
        if let Some(steps) = view {
            ctx.events.emit(AgentEvent::Plan { steps });
        }
        Ok(ToolResult::success(output))
    }
}
