//! Agents and their task sequences.
//!
//! An [`Agent`] owns an ordered list of [`Task`]s decomposed from its goal.
//! The agent's status after a run is a pure function of its task statuses,
//! see [`derive_status`].

mod export;

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use agent_core::{ModelId, decompose};

pub use export::format_as_markdown;

use super::{Error, Result};

/// Generate a new agent ID.
#[must_use]
pub fn new_agent_id() -> String {
    format!("agt_{}", Ulid::new())
}

/// Generate a new task ID.
#[must_use]
pub fn new_task_id() -> String {
    format!("tsk_{}", Ulid::new())
}

/// Overall agent status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    /// Created, never run.
    #[default]
    Idle,
    Running,
    /// Stopped early with pending tasks left.
    Paused,
    Completed,
    Failed,
}

impl AgentStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Task status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
}

impl TaskStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// One decomposed unit of work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// Unique task identifier.
    pub id: String,

    /// Task title.
    pub title: String,

    /// Current status.
    pub status: TaskStatus,

    /// Result text, or the error message for a failed task.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
}

impl Task {
    /// Create a pending task.
    #[must_use]
    pub fn pending(title: impl Into<String>) -> Self {
        Self {
            id: new_task_id(),
            title: title.into(),
            status: TaskStatus::Pending,
            result: None,
        }
    }
}

/// One goal-driven automation run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Agent {
    /// Unique agent identifier.
    pub id: String,

    /// Free-text goal.
    pub goal: String,

    /// Model the tasks run on.
    pub model: ModelId,

    /// Ordered task sequence.
    pub tasks: Vec<Task>,

    /// Overall status.
    pub status: AgentStatus,

    /// Creation time.
    pub created_at: DateTime<Utc>,
}

impl Agent {
    /// Create an idle agent with tasks decomposed from `goal`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EmptyGoal`] if the goal is blank.
    pub fn new(goal: &str, model: ModelId) -> Result<Self> {
        let goal = goal.trim();
        if goal.is_empty() {
            return Err(Error::EmptyGoal);
        }

        Ok(Self {
            id: new_agent_id(),
            goal: goal.to_string(),
            model,
            tasks: decompose(goal).into_iter().map(Task::pending).collect(),
            status: AgentStatus::Idle,
            created_at: Utc::now(),
        })
    }

    /// Index of the first pending task.
    #[must_use]
    pub fn first_pending(&self) -> Option<usize> {
        self.tasks
            .iter()
            .position(|t| t.status == TaskStatus::Pending)
    }

    /// Whether any task still waits to run.
    #[must_use]
    pub fn has_pending(&self) -> bool {
        self.first_pending().is_some()
    }

    /// Number of tasks with the given status.
    #[must_use]
    pub fn count(&self, status: TaskStatus) -> usize {
        self.tasks.iter().filter(|t| t.status == status).count()
    }

    /// Recompute the status from the task sequence.
    pub fn settle(&mut self) {
        self.status = derive_status(&self.tasks);
    }
}

/// Derive an agent's post-run status from its tasks.
///
/// `Failed` if any task failed, `Completed` if every task completed,
/// `Paused` otherwise.
#[must_use]
pub fn derive_status(tasks: &[Task]) -> AgentStatus {
    if tasks.iter().any(|t| t.status == TaskStatus::Failed) {
        AgentStatus::Failed
    } else if tasks.iter().all(|t| t.status == TaskStatus::Completed) {
        AgentStatus::Completed
    } else {
        AgentStatus::Paused
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tasks(statuses: &[TaskStatus]) -> Vec<Task> {
        statuses
            .iter()
            .map(|s| Task {
                status: *s,
                ..Task::pending("t")
            })
            .collect()
    }

    #[test]
    fn new_agent_has_five_pending_tasks() {
        let agent = Agent::new("  Research solar panels ", ModelId::GeminiFlash).unwrap();
        assert_eq!(agent.goal, "Research solar panels");
        assert_eq!(agent.status, AgentStatus::Idle);
        assert_eq!(agent.tasks.len(), 5);
        assert!(agent.tasks.iter().all(|t| t.status == TaskStatus::Pending));
        assert_eq!(agent.tasks[0].title, "Research and gather initial information");
        assert!(agent.id.starts_with("agt_"));
        assert!(agent.tasks[0].id.starts_with("tsk_"));
    }

    #[test]
    fn blank_goal_rejected() {
        assert!(matches!(
            Agent::new("   ", ModelId::default()),
            Err(Error::EmptyGoal)
        ));
    }

    #[test]
    fn any_failure_means_failed() {
        use TaskStatus::{Completed, Failed, Pending};
        assert_eq!(derive_status(&tasks(&[Completed, Failed, Pending])), AgentStatus::Failed);
        assert_eq!(derive_status(&tasks(&[Failed, Completed])), AgentStatus::Failed);
    }

    #[test]
    fn all_completed_means_completed() {
        use TaskStatus::Completed;
        assert_eq!(
            derive_status(&tasks(&[Completed, Completed, Completed])),
            AgentStatus::Completed
        );
    }

    #[test]
    fn leftover_pending_means_paused() {
        use TaskStatus::{Completed, Pending};
        assert_eq!(derive_status(&tasks(&[Completed, Pending])), AgentStatus::Paused);
        assert_eq!(derive_status(&tasks(&[Pending, Pending])), AgentStatus::Paused);
    }

    #[test]
    fn first_pending_skips_finished() {
        use TaskStatus::{Completed, Failed, Pending};
        let mut agent = Agent::new("write", ModelId::default()).unwrap();
        agent.tasks = tasks(&[Completed, Failed, Pending]);
        assert_eq!(agent.first_pending(), Some(2));
        assert_eq!(agent.count(Completed), 1);
    }

    #[test]
    fn serializes_lowercase_statuses() {
        let agent = Agent::new("plan a trip", ModelId::Gpt4Turbo).unwrap();
        let json = serde_json::to_value(&agent).unwrap();
        assert_eq!(json["status"], "idle");
        assert_eq!(json["model"], "gpt-4-turbo");
        assert_eq!(json["tasks"][0]["status"], "pending");
        assert!(json["tasks"][0].get("result").is_none());
    }
}
