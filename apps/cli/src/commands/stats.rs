//! Stats command: aggregates the JSONL telemetry log.

use anyhow::{Context, Result};
use colored::Colorize;
use lodestar_core::{TelemetryEvent, TelemetryStats};
use std::path::{Path, PathBuf};

use crate::context::CliContext;

/// Telemetry file location, resolved against the workspace.
pub fn telemetry_path(cx: &CliContext) -> Option<PathBuf> {
    cx.config.telemetry.path.as_ref().map(|path| {
        if path.is_absolute() { path.clone() } else { cx.workspace.join(path) }
    })
}

/// Execute the stats command
pub fn execute(cx: &CliContext, json: bool) -> Result<()> {
    let Some(path) = telemetry_path(cx) else {
        anyhow::bail!("telemetry is disabled; set [telemetry] path in the configuration");
    };
    let events = read_events(&path)?;
    let stats = TelemetryStats::from_events(&events);

    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    println!("{}", "Telemetry".bold().cyan());
    println!("  Events:            {}", events.len());
    println!("  Runs started:      {}", stats.runs_started);
    println!("  Runs completed:    {}", stats.runs_completed);
    println!("  Runs failed:       {}", stats.runs_failed);
    println!("  Speculative hits:  {}", stats.speculative_hits);
    println!("  Speculative misses: {}", stats.speculative_misses);
    match stats.hit_rate() {
        Some(rate) => println!("  Hit rate:          {:.1}%", rate * 100.0),
        None => println!("  Hit rate:          {}", "n/a".dimmed()),
    }
    println!("  Time saved:        {}ms", stats.saved_ms);
    println!("  Findings acted on: {}", stats.findings_acted);
    Ok(())
}

/// Reads events, skipping lines that do not parse.
fn read_events(path: &Path) -> Result<Vec<TelemetryEvent>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read telemetry from {}", path.display()))?;
    Ok(content.lines().filter_map(|line| serde_json::from_str(line).ok()).collect())
}
