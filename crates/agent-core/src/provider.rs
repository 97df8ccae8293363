//! Remote task execution contract.

use std::fmt;

use async_trait::async_trait;

use super::error::Result;
use super::types::ModelId;

/// Instruction sent as the system message with every task.
pub const SYSTEM_PROMPT: &str = "You are a helpful AI assistant working as part of an autonomous agent team. Execute the given task thoroughly and provide detailed, actionable results.";

/// Result text used when the model returns an empty completion.
pub const EMPTY_RESULT: &str = "Task completed but no result generated.";

/// Opaque API credential.
///
/// `Debug` never prints the secret.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    /// Wrap a non-empty secret.
    #[must_use]
    pub fn new(secret: impl Into<String>) -> Option<Self> {
        let secret = secret.into();
        let trimmed = secret.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    /// Raw secret, for the transport layer only.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(***)")
    }
}

/// One task execution request.
#[derive(Debug, Clone)]
pub struct ExecuteRequest {
    /// Overall agent goal.
    pub goal: String,
    /// Title of the task being executed.
    pub task_title: String,
    /// Concatenated results of prior completed tasks (may be empty).
    pub prior_context: String,
    /// Model to run the task on.
    pub model: ModelId,
    /// API credential.
    pub credential: Credential,
}

impl ExecuteRequest {
    /// Render the user prompt for this task.
    #[must_use]
    pub fn prompt(&self) -> String {
        let mut prompt = format!("Overall Goal: {}\n\n", self.goal);

        if !self.prior_context.is_empty() {
            prompt.push_str("Context from previous tasks:\n");
            prompt.push_str(&self.prior_context);
            prompt.push_str("\n\n");
        }

        prompt.push_str("Current Task: ");
        prompt.push_str(&self.task_title);
        prompt.push_str("\n\n");
        prompt.push_str(
            "Please execute this task thoroughly. Consider the overall goal and any previous context. \
             Provide detailed, actionable results that will help accomplish the overall objective.",
        );
        prompt
    }
}

/// Successful execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecuteResponse {
    /// Generated result text.
    pub result_text: String,
}

/// Executes a single task against a language model.
///
/// Implementations perform exactly one attempt per call.
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    /// Executor name, for logs.
    fn name(&self) -> &'static str;

    /// Execute one task.
    async fn execute(&self, request: ExecuteRequest) -> Result<ExecuteResponse>;
}
