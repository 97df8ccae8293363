//! Core logic shared by the CLI and the offline proxy.

pub mod agent;
mod error;
pub mod keychain;
pub mod offline;
pub mod runner;
pub mod secret;
pub mod state;
pub mod storage;

pub use agent::{Agent, AgentStatus, Task, TaskStatus};
pub use error::{Error, Result};
pub use runner::{RunError, RunEvent, RunReport, TaskRunner};
pub use state::{Settings, StateStore, Theme};
