//! Executor implementations.

mod openai;

pub use openai::{DEFAULT_BASE_URL, OpenAiExecutor, SamplingParams};
