//! `BeastMode` - goal-driven task automation.
//!
//! An agent turns a goal into a short list of tasks and runs them one at a
//! time against a remote model. A caching proxy keeps the application
//! usable while the network is down.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐        ┌─────────────────┐
//! │     CLI     │        │  Offline proxy  │
//! └──────┬──────┘        └────────┬────────┘
//!        │                        │
//!        └───────────┬────────────┘
//!                    │
//!             ┌──────┴──────┐     ┌────────────┐
//!             │    Core     │─────│ agent-core │
//!             └─────────────┘     └────────────┘
//! ```

pub mod api;
pub mod build_info;
pub mod cli;
pub mod config;
pub mod core;

pub use config::Config;
pub use core::{Agent, AgentStatus, StateStore, Task, TaskRunner, TaskStatus};
