//! Agent report export.

use std::fmt::Write;

use super::Agent;

/// Format an agent as a Markdown report.
#[must_use]
pub fn format_as_markdown(agent: &Agent) -> String {
    let mut md = String::new();

    md.push_str("# BeastMode Agent Report\n\n");
    let _ = writeln!(md, "## Goal\n{}\n", agent.goal);
    let _ = writeln!(md, "## Model\n{}\n", agent.model);
    let _ = writeln!(
        md,
        "## Created\n{}\n",
        agent.created_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
    let _ = writeln!(md, "## Status\n{}\n", agent.status);
    md.push_str("## Tasks\n");

    for (index, task) in agent.tasks.iter().enumerate() {
        let _ = writeln!(md, "\n### Task {}: {}", index + 1, task.title);
        let _ = writeln!(md, "**Status:** {}", task.status);
        if let Some(result) = &task.result {
            let _ = writeln!(md, "**Result:** {result}");
        }
    }

    md.push_str("\n---\nGenerated by BeastMode\n");
    md
}
