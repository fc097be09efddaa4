//! Tools command: lists registered tools.

use anyhow::Result;
use colored::Colorize;
use lodestar_orchestrator::ToolRegistry;
use serde_json::json;

/// Execute the tools list command
pub fn execute(json: bool) -> Result<()> {
    let registry = ToolRegistry::with_builtin_tools();

    if json {
        let tools: Vec<_> = registry
            .list()
            .into_iter()
            .map(|tool| {
                json!({
                    "id": tool.id,
                    "description": tool.description,
                    "read_only": tool.id.is_read_only(),
                    "requires_model": tool.requires_model,
                    "command": tool.id.command_name(),
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&tools)?);
        return Ok(());
    }

    println!("{}", "Available Tools".bold().cyan());
    println!("{}", "─".repeat(60).dimmed());
    for tool in registry.list() {
        let access = if tool.id.is_read_only() { "read-only".green() } else { "mutating".yellow() };
        let model = if tool.requires_model { "model" } else { "local" };
        let id = tool.id.as_str().bold();
        println!("  {id:<14} {access:<10} {model:<6} {}", tool.description);
    }
    println!();
    println!("{}", format!("{} tool(s) registered", registry.len()).dimmed());
    Ok(())
}
