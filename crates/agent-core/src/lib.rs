//! Goal decomposition and remote task execution for `BeastMode`.

pub mod decompose;
pub mod error;
pub mod provider;
pub mod providers;
pub mod types;

pub use decompose::{STEPS_PER_GOAL, Template, decompose};
pub use error::{ExecutionError, RemoteErrorKind, Result};
pub use provider::{
    Credential, EMPTY_RESULT, ExecuteRequest, ExecuteResponse, SYSTEM_PROMPT, TaskExecutor,
};
pub use providers::{DEFAULT_BASE_URL, OpenAiExecutor, SamplingParams};
pub use types::{CATALOG, ModelId, ModelInfo, UnknownModel};
