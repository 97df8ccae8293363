//! Sequential task runner.
//!
//! Walks an agent's tasks in order, executing each pending task against a
//! [`TaskExecutor`]. Exactly one task is `running` at a time; the executor
//! call is the only suspension point per iteration. A stop request is
//! observed between tasks; a result that arrives after a stop is discarded
//! and its task returns to `pending`.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use thiserror::Error;

use agent_core::{Credential, ExecuteRequest, ExecutionError, TaskExecutor};

use super::agent::{Agent, AgentStatus, Task, TaskStatus};
use super::secret::mask_secrets;
use super::state::StateStore;

/// Errors that prevent a run from starting or finishing.
///
/// Task-level failures are not errors: they are recorded on the task and
/// reported through [`RunReport::failure`].
#[derive(Debug, Error)]
pub enum RunError {
    /// No API key configured; nothing was executed.
    #[error("API key required: add your OpenRouter API key in settings")]
    MissingCredential,

    /// The agent has no pending task.
    #[error("no pending tasks found")]
    NoPendingTasks,

    /// No agent with this ID.
    #[error("agent not found: {0}")]
    AgentNotFound(String),

    /// The agent was deleted while the run was in flight.
    #[error("agent {0} was removed during the run")]
    AgentRemoved(String),

    /// A run is already in flight for this agent.
    #[error("agent {0} is already running")]
    AlreadyRunning(String),

    /// Persistence failure.
    #[error(transparent)]
    Core(#[from] super::Error),
}

impl From<super::storage::StorageError> for RunError {
    fn from(err: super::storage::StorageError) -> Self {
        Self::Core(err.into())
    }
}

/// Why a task failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The executor answered with an application-level error.
    RemoteExecutionFailed,
    /// The executor could not be reached.
    TransportFailure,
}

/// The failure that stopped a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskFailure {
    pub task_id: String,
    pub kind: FailureKind,
    pub message: String,
}

/// Outcome of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    /// Agent status after the run.
    pub status: AgentStatus,
    /// Tasks completed during this run.
    pub completed: usize,
    /// Failure that ended the run early, if any.
    pub failure: Option<TaskFailure>,
    /// Whether the run ended because of a stop request.
    pub stopped: bool,
}

/// Progress notifications published during a run.
#[derive(Debug, Clone)]
pub enum RunEvent {
    /// A task moved to `running`.
    TaskStarted { index: usize, title: String },
    /// A task completed.
    TaskCompleted {
        index: usize,
        title: String,
        result: String,
    },
    /// A task failed; the run stops after this event.
    TaskFailed {
        index: usize,
        title: String,
        kind: FailureKind,
        message: String,
    },
    /// The executor is unreachable. Shown to the user as an offline alert.
    Offline { message: String },
    /// The run ended.
    Finished { status: AgentStatus },
}

/// Ephemeral state of an in-flight run.
#[derive(Debug, Clone, Default)]
pub struct RunnerSession {
    stopped: Arc<AtomicBool>,
}

impl RunnerSession {
    /// Request a stop at the next task boundary.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    /// Whether a stop was requested.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

/// Build the context passed to the next task.
///
/// Completed tasks with a result, in sequence order, one paragraph each.
#[must_use]
pub fn build_context(tasks: &[Task]) -> String {
    tasks
        .iter()
        .filter(|t| t.status == TaskStatus::Completed)
        .filter_map(|t| {
            t.result
                .as_ref()
                .map(|r| format!("Previous task \"{}\": {r}", t.title))
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Removes the session entry when a run exits by any path.
struct SessionGuard<'a> {
    sessions: &'a Mutex<HashMap<String, RunnerSession>>,
    agent_id: String,
}

impl Drop for SessionGuard<'_> {
    fn drop(&mut self) {
        self.sessions.lock().remove(&self.agent_id);
    }
}

/// Runs agents' tasks one at a time.
pub struct TaskRunner {
    state: Arc<StateStore>,
    executor: Arc<dyn TaskExecutor>,
    sessions: Mutex<HashMap<String, RunnerSession>>,
}

impl TaskRunner {
    /// Create a runner over a state store and an executor.
    pub fn new(state: Arc<StateStore>, executor: Arc<dyn TaskExecutor>) -> Self {
        Self {
            state,
            executor,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Underlying state store.
    #[must_use]
    pub fn state(&self) -> &Arc<StateStore> {
        &self.state
    }

    /// Whether a run is in flight for this agent.
    #[must_use]
    pub fn is_running(&self, agent_id: &str) -> bool {
        self.sessions.lock().contains_key(agent_id)
    }

    /// Request a stop and settle the agent's status from its tasks.
    ///
    /// The agent ends `paused` unless a task already failed.
    ///
    /// With a run in flight, the loop exits at the next task boundary. With
    /// no run in this process, any task left `running` (from an interrupted
    /// process) is reset to `pending` so a later run resumes it.
    ///
    /// # Errors
    ///
    /// Returns error if the agent does not exist or cannot be persisted.
    pub fn stop(&self, agent_id: &str) -> Result<bool, RunError> {
        let session = self.sessions.lock().get(agent_id).cloned();
        let in_flight = session.is_some();
        if let Some(session) = session {
            session.stop();
        }

        let updated = self.state.update_agent(agent_id, |agent| {
            if !in_flight {
                for task in &mut agent.tasks {
                    if task.status == TaskStatus::Running {
                        task.status = TaskStatus::Pending;
                    }
                }
            }
            if matches!(agent.status, AgentStatus::Running | AgentStatus::Idle) || in_flight {
                agent.settle();
            }
        })?;

        if updated.is_none() {
            return Err(RunError::AgentNotFound(agent_id.to_string()));
        }

        tracing::info!(agent_id, in_flight, "stop requested");
        Ok(in_flight)
    }

    /// Run every pending task of an agent, in order.
    ///
    /// `on_event` observes each transition as it happens.
    ///
    /// # Errors
    ///
    /// Returns error if the run cannot start (missing credential, unknown
    /// agent, nothing pending, already running) or the agent is deleted
    /// mid-run. Task failures are reported in the [`RunReport`].
    pub async fn run<F>(
        &self,
        agent_id: &str,
        credential: Option<Credential>,
        mut on_event: F,
    ) -> Result<RunReport, RunError>
    where
        F: FnMut(&RunEvent) + Send,
    {
        let credential = credential.ok_or(RunError::MissingCredential)?;

        let agent = self
            .state
            .agent(agent_id)
            .ok_or_else(|| RunError::AgentNotFound(agent_id.to_string()))?;
        if !agent.has_pending() {
            return Err(RunError::NoPendingTasks);
        }

        let session = {
            let mut sessions = self.sessions.lock();
            if sessions.contains_key(agent_id) {
                return Err(RunError::AlreadyRunning(agent_id.to_string()));
            }
            let session = RunnerSession::default();
            sessions.insert(agent_id.to_string(), session.clone());
            session
        };
        let _guard = SessionGuard {
            sessions: &self.sessions,
            agent_id: agent_id.to_string(),
        };

        tracing::info!(agent_id, model = %agent.model, executor = self.executor.name(), "agent run started");
        self.write(agent_id, |a| a.status = AgentStatus::Running)?;

        let mut completed = 0;
        let mut failure = None;

        for index in 0..agent.tasks.len() {
            if session.is_stopped() {
                break;
            }

            // Re-read so that context reflects results recorded this run.
            let Some(current) = self.state.agent(agent_id) else {
                return Err(RunError::AgentRemoved(agent_id.to_string()));
            };
            let Some(task) = current.tasks.get(index) else {
                break;
            };
            if task.status != TaskStatus::Pending {
                continue;
            }

            let title = task.title.clone();
            let task_id = task.id.clone();
            let request = ExecuteRequest {
                goal: current.goal.clone(),
                task_title: title.clone(),
                prior_context: build_context(&current.tasks),
                model: current.model,
                credential: credential.clone(),
            };

            self.write(agent_id, |a| a.tasks[index].status = TaskStatus::Running)?;
            on_event(&RunEvent::TaskStarted {
                index,
                title: title.clone(),
            });
            tracing::debug!(agent_id, task_id = %task_id, title = %title, "task started");

            let outcome = self.executor.execute(request).await;

            if session.is_stopped() {
                tracing::info!(agent_id, task_id = %task_id, "discarding result after stop");
                self.write(agent_id, |a| a.tasks[index].status = TaskStatus::Pending)?;
                break;
            }

            match outcome {
                Ok(response) => {
                    let result = response.result_text;
                    self.write(agent_id, |a| {
                        let task = &mut a.tasks[index];
                        task.status = TaskStatus::Completed;
                        task.result = Some(result.clone());
                    })?;
                    completed += 1;
                    tracing::debug!(agent_id, task_id = %task_id, "task completed");
                    on_event(&RunEvent::TaskCompleted {
                        index,
                        title,
                        result,
                    });
                }
                Err(err) => {
                    let (kind, message) = classify_failure(&err, &credential);
                    self.write(agent_id, |a| {
                        let task = &mut a.tasks[index];
                        task.status = TaskStatus::Failed;
                        task.result = Some(message.clone());
                    })?;
                    tracing::warn!(agent_id, task_id = %task_id, error = %message, "task failed");
                    on_event(&RunEvent::TaskFailed {
                        index,
                        title,
                        kind,
                        message: message.clone(),
                    });
                    if kind == FailureKind::TransportFailure {
                        on_event(&RunEvent::Offline {
                            message: "Failed to execute task. Please check your API key and connection and try again."
                                .to_string(),
                        });
                    }
                    failure = Some(TaskFailure {
                        task_id,
                        kind,
                        message,
                    });
                    break;
                }
            }
        }

        let stopped = session.is_stopped();
        let status = self.write(agent_id, |a| {
            a.settle();
            a.status
        })?;

        tracing::info!(agent_id, status = %status, completed, "agent run finished");
        on_event(&RunEvent::Finished { status });

        Ok(RunReport {
            status,
            completed,
            failure,
            stopped,
        })
    }

    /// Persist a mutation, aborting the run if the agent disappeared.
    fn write<F, T>(&self, agent_id: &str, f: F) -> Result<T, RunError>
    where
        F: FnOnce(&mut Agent) -> T,
    {
        self.state
            .update_agent(agent_id, f)?
            .ok_or_else(|| {
                tracing::warn!(agent_id, "agent removed mid-run, aborting");
                RunError::AgentRemoved(agent_id.to_string())
            })
    }
}

/// Map an execution error to the failure kind and the message stored on the task.
fn classify_failure(err: &ExecutionError, credential: &Credential) -> (FailureKind, String) {
    let secret = Some(credential.expose());
    match err {
        ExecutionError::Transport(message) => (
            FailureKind::TransportFailure,
            format!("Network error: {}", mask_secrets(message, secret)),
        ),
        other => (
            FailureKind::RemoteExecutionFailed,
            mask_secrets(&other.to_string(), secret).into_owned(),
        ),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use async_trait::async_trait;
    use tokio::sync::Notify;

    use agent_core::{ExecuteResponse, ModelId, RemoteErrorKind};

    use super::*;
    use crate::core::agent::derive_status;
    use crate::core::storage::MemoryStorage;

    type Hook = Box<dyn Fn() + Send + Sync>;

    /// Executor that replays canned outcomes and records every request.
    #[derive(Default)]
    struct Scripted {
        outcomes: Mutex<VecDeque<agent_core::Result<String>>>,
        requests: Mutex<Vec<ExecuteRequest>>,
        hook: Option<Hook>,
    }

    impl Scripted {
        fn new(outcomes: Vec<agent_core::Result<String>>) -> Self {
            Self {
                outcomes: Mutex::new(outcomes.into()),
                ..Self::default()
            }
        }

        fn with_hook(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
            self.hook = Some(Box::new(hook));
            self
        }

        fn requests(&self) -> Vec<ExecuteRequest> {
            self.requests.lock().clone()
        }
    }

    #[async_trait]
    impl TaskExecutor for Scripted {
        fn name(&self) -> &'static str {
            "scripted"
        }

        async fn execute(&self, request: ExecuteRequest) -> agent_core::Result<ExecuteResponse> {
            if let Some(hook) = &self.hook {
                hook();
            }
            self.requests.lock().push(request);
            let next = self
                .outcomes
                .lock()
                .pop_front()
                .unwrap_or_else(|| Ok("done".to_string()));
            next.map(|result_text| ExecuteResponse { result_text })
        }
    }

    /// Executor that blocks until released, to interleave a stop.
    struct Gated {
        started: Arc<Notify>,
        release: Arc<Notify>,
    }

    #[async_trait]
    impl TaskExecutor for Gated {
        fn name(&self) -> &'static str {
            "gated"
        }

        async fn execute(&self, _request: ExecuteRequest) -> agent_core::Result<ExecuteResponse> {
            self.started.notify_one();
            self.release.notified().await;
            Ok(ExecuteResponse {
                result_text: "late".to_string(),
            })
        }
    }

    fn credential() -> Option<Credential> {
        Credential::new("sk-test-credential")
    }

    fn state_with_agent(goal: &str) -> (Arc<StateStore>, String) {
        let state = Arc::new(StateStore::load(Arc::new(MemoryStorage::new())));
        let agent = Agent::new(goal, ModelId::Claude3Haiku).unwrap();
        let id = agent.id.clone();
        state.insert_agent(agent).unwrap();
        (state, id)
    }

    fn ok(text: &str) -> agent_core::Result<String> {
        Ok(text.to_string())
    }

    #[tokio::test]
    async fn runs_every_task_in_order() {
        let (state, id) = state_with_agent("Write a newsletter");
        let executor = Arc::new(Scripted::new(vec![
            ok("r1"),
            ok("r2"),
            ok("r3"),
            ok("r4"),
            ok("r5"),
        ]));
        let runner = TaskRunner::new(state.clone(), executor.clone());

        let mut events = Vec::new();
        let report = runner
            .run(&id, credential(), |e| events.push(e.clone()))
            .await
            .unwrap();

        assert_eq!(report.status, AgentStatus::Completed);
        assert_eq!(report.completed, 5);
        assert!(report.failure.is_none());
        assert!(!runner.is_running(&id));

        let agent = state.agent(&id).unwrap();
        assert_eq!(agent.status, AgentStatus::Completed);
        assert_eq!(agent.tasks[4].result.as_deref(), Some("r5"));

        let titles: Vec<_> = executor.requests().into_iter().map(|r| r.task_title).collect();
        let expected: Vec<_> = agent.tasks.iter().map(|t| t.title.clone()).collect();
        assert_eq!(titles, expected);

        assert!(matches!(events[0], RunEvent::TaskStarted { index: 0, .. }));
        assert!(matches!(
            events.last(),
            Some(RunEvent::Finished {
                status: AgentStatus::Completed
            })
        ));
    }

    #[tokio::test]
    async fn context_is_prior_completed_results_in_order() {
        let (state, id) = state_with_agent("Write a newsletter");
        let executor = Arc::new(Scripted::new(vec![ok("alpha"), ok("beta"), ok("gamma")]));
        let runner = TaskRunner::new(state.clone(), executor.clone());

        runner.run(&id, credential(), |_| {}).await.unwrap();

        let requests = executor.requests();
        let tasks = state.agent(&id).unwrap().tasks;
        assert_eq!(requests[0].prior_context, "");
        assert_eq!(
            requests[1].prior_context,
            format!("Previous task \"{}\": alpha", tasks[0].title)
        );
        assert_eq!(
            requests[2].prior_context,
            format!(
                "Previous task \"{}\": alpha\n\nPrevious task \"{}\": beta",
                tasks[0].title, tasks[1].title
            )
        );
        assert_eq!(requests[0].goal, "Write a newsletter");
        assert_eq!(requests[0].model, ModelId::Claude3Haiku);
    }

    #[test]
    fn context_skips_unfinished_tasks() {
        let mut tasks = vec![Task::pending("A"), Task::pending("B"), Task::pending("C")];
        tasks[0].status = TaskStatus::Completed;
        tasks[0].result = Some("one".to_string());
        tasks[1].status = TaskStatus::Failed;
        tasks[1].result = Some("boom".to_string());
        tasks[2].status = TaskStatus::Completed;
        tasks[2].result = Some("three".to_string());

        assert_eq!(
            build_context(&tasks),
            "Previous task \"A\": one\n\nPrevious task \"C\": three"
        );
    }

    #[tokio::test]
    async fn remote_failure_stops_the_loop() {
        let (state, id) = state_with_agent("Write a newsletter");
        let executor = Arc::new(Scripted::new(vec![
            ok("r1"),
            Err(ExecutionError::remote(RemoteErrorKind::Upstream, "boom")),
        ]));
        let runner = TaskRunner::new(state.clone(), executor.clone());

        let mut offline = false;
        let report = runner
            .run(&id, credential(), |e| {
                offline |= matches!(e, RunEvent::Offline { .. });
            })
            .await
            .unwrap();

        assert_eq!(report.status, AgentStatus::Failed);
        let failure = report.failure.unwrap();
        assert_eq!(failure.kind, FailureKind::RemoteExecutionFailed);
        assert_eq!(failure.message, "AI execution failed: boom");
        assert!(!offline);
        assert_eq!(executor.requests().len(), 2);

        let agent = state.agent(&id).unwrap();
        assert_eq!(agent.tasks[1].status, TaskStatus::Failed);
        assert_eq!(agent.tasks[1].result.as_deref(), Some("AI execution failed: boom"));
        assert_eq!(agent.count(TaskStatus::Pending), 3);
    }

    #[tokio::test]
    async fn transport_failure_raises_offline_alert() {
        let (state, id) = state_with_agent("Write a newsletter");
        let executor = Arc::new(Scripted::new(vec![Err(ExecutionError::Transport(
            "connection refused".to_string(),
        ))]));
        let runner = TaskRunner::new(state.clone(), executor);

        let mut offline = 0;
        let report = runner
            .run(&id, credential(), |e| {
                if matches!(e, RunEvent::Offline { .. }) {
                    offline += 1;
                }
            })
            .await
            .unwrap();

        assert_eq!(offline, 1);
        assert_eq!(report.status, AgentStatus::Failed);
        assert_eq!(report.failure.unwrap().kind, FailureKind::TransportFailure);
        let task = &state.agent(&id).unwrap().tasks[0];
        assert_eq!(task.result.as_deref(), Some("Network error: connection refused"));
    }

    #[tokio::test]
    async fn failure_message_masks_credential() {
        let (state, id) = state_with_agent("Write a newsletter");
        let executor = Arc::new(Scripted::new(vec![Err(ExecutionError::remote(
            RemoteErrorKind::Unauthorized,
            "invalid key sk-test-credential",
        ))]));
        let runner = TaskRunner::new(state.clone(), executor);

        runner.run(&id, credential(), |_| {}).await.unwrap();

        let result = state.agent(&id).unwrap().tasks[0].result.clone().unwrap();
        assert!(!result.contains("sk-test-credential"));
    }

    #[tokio::test]
    async fn missing_credential_never_starts() {
        let (state, id) = state_with_agent("Write a newsletter");
        let executor = Arc::new(Scripted::default());
        let runner = TaskRunner::new(state.clone(), executor.clone());

        let err = runner.run(&id, None, |_| {}).await.unwrap_err();
        assert!(matches!(err, RunError::MissingCredential));
        assert!(executor.requests().is_empty());
        assert_eq!(state.agent(&id).unwrap().status, AgentStatus::Idle);
    }

    #[tokio::test]
    async fn no_pending_tasks_is_a_noop() {
        let (state, id) = state_with_agent("Write a newsletter");
        let runner = TaskRunner::new(state.clone(), Arc::new(Scripted::default()));
        runner.run(&id, credential(), |_| {}).await.unwrap();
        let before = state.agent(&id).unwrap();

        let err = runner.run(&id, credential(), |_| {}).await.unwrap_err();
        assert!(matches!(err, RunError::NoPendingTasks));
        assert_eq!(state.agent(&id).unwrap(), before);
    }

    #[tokio::test]
    async fn unknown_agent() {
        let (state, _) = state_with_agent("Write a newsletter");
        let runner = TaskRunner::new(state, Arc::new(Scripted::default()));
        let err = runner.run("agt_nope", credential(), |_| {}).await.unwrap_err();
        assert!(matches!(err, RunError::AgentNotFound(_)));
    }

    #[tokio::test]
    async fn rerun_resumes_at_first_pending() {
        let (state, id) = state_with_agent("Write a newsletter");
        state
            .update_agent(&id, |a| {
                a.tasks[0].status = TaskStatus::Completed;
                a.tasks[0].result = Some("kept".to_string());
                a.tasks[1].status = TaskStatus::Failed;
                a.tasks[1].result = Some("old error".to_string());
                a.status = AgentStatus::Failed;
            })
            .unwrap();
        let executor = Arc::new(Scripted::default());
        let runner = TaskRunner::new(state.clone(), executor.clone());

        let report = runner.run(&id, credential(), |_| {}).await.unwrap();

        let requests = executor.requests();
        assert_eq!(requests.len(), 3);
        assert!(requests[0].prior_context.contains("kept"));
        let agent = state.agent(&id).unwrap();
        assert_eq!(agent.tasks[1].result.as_deref(), Some("old error"));
        assert_eq!(report.status, AgentStatus::Failed);
        assert_eq!(agent.count(TaskStatus::Completed), 4);
    }

    #[tokio::test]
    async fn at_most_one_task_running() {
        let (state, id) = state_with_agent("Write a newsletter");
        let probe = state.clone();
        let probe_id = id.clone();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_hook = seen.clone();
        let executor = Arc::new(Scripted::default().with_hook(move || {
            let agent = probe.agent(&probe_id).unwrap();
            seen_hook.lock().push(agent.count(TaskStatus::Running));
        }));
        let runner = TaskRunner::new(state.clone(), executor);

        runner
            .run(&id, credential(), |e| {
                if let RunEvent::TaskStarted { .. } = e {
                    assert_eq!(state.agent(&id).unwrap().count(TaskStatus::Running), 1);
                }
            })
            .await
            .unwrap();

        assert_eq!(*seen.lock(), vec![1, 1, 1, 1, 1]);
        assert_eq!(state.agent(&id).unwrap().count(TaskStatus::Running), 0);
    }

    #[tokio::test]
    async fn stop_discards_in_flight_result() {
        let (state, id) = state_with_agent("Write a newsletter");
        let started = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());
        let runner = TaskRunner::new(
            state.clone(),
            Arc::new(Gated {
                started: started.clone(),
                release: release.clone(),
            }),
        );

        let control = async {
            started.notified().await;
            assert!(runner.stop(&id).unwrap());
            assert_eq!(state.agent(&id).unwrap().status, AgentStatus::Paused);
            release.notify_one();
        };
        let (report, ()) = tokio::join!(runner.run(&id, credential(), |_| {}), control);
        let report = report.unwrap();

        assert!(report.stopped);
        assert_eq!(report.status, AgentStatus::Paused);
        assert_eq!(report.completed, 0);
        let agent = state.agent(&id).unwrap();
        assert_eq!(agent.tasks[0].status, TaskStatus::Pending);
        assert!(agent.tasks[0].result.is_none());
        assert!(!runner.is_running(&id));
    }

    #[tokio::test]
    async fn stopping_a_resumed_failed_agent_keeps_it_failed() {
        let (state, id) = state_with_agent("Write a newsletter");
        state
            .update_agent(&id, |a| {
                a.tasks[0].status = TaskStatus::Failed;
                a.tasks[0].result = Some("AI execution failed: boom".to_string());
                a.settle();
            })
            .unwrap();
        let started = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());
        let runner = TaskRunner::new(
            state.clone(),
            Arc::new(Gated {
                started: started.clone(),
                release: release.clone(),
            }),
        );

        let control = async {
            started.notified().await;
            runner.stop(&id).unwrap();
            assert_eq!(state.agent(&id).unwrap().status, AgentStatus::Failed);
            release.notify_one();
        };
        let (report, ()) = tokio::join!(runner.run(&id, credential(), |_| {}), control);
        let report = report.unwrap();

        assert!(report.stopped);
        assert_eq!(report.status, AgentStatus::Failed);
        let agent = state.agent(&id).unwrap();
        assert_eq!(agent.status, derive_status(&agent.tasks));
        assert_eq!(agent.tasks[1].status, TaskStatus::Pending);
        assert_eq!(agent.count(TaskStatus::Pending), 4);
    }

    #[tokio::test]
    async fn second_run_is_rejected_while_in_flight() {
        let (state, id) = state_with_agent("Write a newsletter");
        let started = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());
        let runner = TaskRunner::new(
            state,
            Arc::new(Gated {
                started: started.clone(),
                release: release.clone(),
            }),
        );

        let control = async {
            started.notified().await;
            let err = runner.run(&id, credential(), |_| {}).await.unwrap_err();
            assert!(matches!(err, RunError::AlreadyRunning(_)));
            runner.stop(&id).unwrap();
            release.notify_one();
        };
        let (report, ()) = tokio::join!(runner.run(&id, credential(), |_| {}), control);
        assert!(report.unwrap().stopped);
    }

    #[tokio::test]
    async fn deleting_agent_mid_run_aborts_without_writing() {
        let (state, id) = state_with_agent("Write a newsletter");
        let probe = state.clone();
        let probe_id = id.clone();
        let executor = Arc::new(Scripted::default().with_hook(move || {
            probe.remove_agent(&probe_id).unwrap();
        }));
        let runner = TaskRunner::new(state.clone(), executor);

        let err = runner.run(&id, credential(), |_| {}).await.unwrap_err();
        assert!(matches!(err, RunError::AgentRemoved(_)));
        assert!(state.agent(&id).is_none());
        assert!(state.agents().is_empty());
    }

    #[test]
    fn stop_without_run_recovers_interrupted_task() {
        let (state, id) = state_with_agent("Write a newsletter");
        state
            .update_agent(&id, |a| {
                a.status = AgentStatus::Running;
                a.tasks[0].status = TaskStatus::Running;
            })
            .unwrap();
        let runner = TaskRunner::new(state.clone(), Arc::new(Scripted::default()));

        assert!(!runner.stop(&id).unwrap());
        let agent = state.agent(&id).unwrap();
        assert_eq!(agent.status, AgentStatus::Paused);
        assert_eq!(agent.tasks[0].status, TaskStatus::Pending);
    }

    #[test]
    fn stop_leaves_finished_agent_alone() {
        let (state, id) = state_with_agent("Write a newsletter");
        state
            .update_agent(&id, |a| a.status = AgentStatus::Completed)
            .unwrap();
        let runner = TaskRunner::new(state.clone(), Arc::new(Scripted::default()));

        runner.stop(&id).unwrap();
        assert_eq!(state.agent(&id).unwrap().status, AgentStatus::Completed);
        assert!(matches!(runner.stop("agt_nope"), Err(RunError::AgentNotFound(_))));
    }
}
