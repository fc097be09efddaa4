//! Run command: executes one tool through the orchestrator.

use anyhow::{Context, Result};
use colored::Colorize;
use lodestar_abstraction::MockProvider;
use lodestar_core::{JsonlTelemetrySink, NoopTelemetrySink, TelemetrySink};
use lodestar_orchestrator::{
    Finding, Notification, NotificationLevel, Notifier, Orchestrator, ScanOptions, ScanResult,
    ScanStatus, Severity, ToolId, ToolRegistry, ToolRunner,
};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::stats::telemetry_path;
use crate::context::CliContext;

/// Parses a `key=value` argument.
pub fn parse_key_val(s: &str) -> Result<(String, String), String> {
    let (key, value) =
        s.split_once('=').ok_or_else(|| format!("invalid key=value: no '=' in '{s}'"))?;
    if key.is_empty() {
        return Err(format!("invalid key=value: empty key in '{s}'"));
    }
    Ok((key.to_string(), value.to_string()))
}

/// Prints run notifications to stderr so stdout stays machine-readable.
struct ConsoleNotifier;

impl Notifier for ConsoleNotifier {
    fn notify(&self, notification: Notification) {
        match notification.level {
            NotificationLevel::Info => eprintln!("{} {}", "●".green(), notification.message),
            NotificationLevel::Error => eprintln!("{} {}", "✗".red(), notification.message),
        }
    }
}

/// Execute the run command
pub async fn execute(
    cx: &CliContext,
    tool: ToolId,
    path: Option<PathBuf>,
    args: Vec<(String, String)>,
    mock_model: bool,
    json: bool,
) -> Result<()> {
    let telemetry: Arc<dyn TelemetrySink> = match telemetry_path(cx) {
        Some(path) => Arc::new(
            JsonlTelemetrySink::open(&path)
                .with_context(|| format!("Failed to open telemetry log {}", path.display()))?,
        ),
        None => Arc::new(NoopTelemetrySink),
    };

    let mut builder = ToolRunner::builder(ToolRegistry::with_builtin_tools())
        .workspace(cx.workspace.clone())
        .telemetry(telemetry)
        .notifier(Arc::new(ConsoleNotifier))
        .config(cx.config.clone());
    if mock_model {
        builder = builder.provider(Arc::new(MockProvider::new()));
    }
    let orchestrator = Orchestrator::new(cx.config.clone(), builder.build());

    let token = CancellationToken::new();
    let mut options = ScanOptions::default().with_cancellation(token.clone());
    if let Some(path) = path {
        options = options.with_path(path);
    }
    for (key, raw) in args {
        let value = serde_json::from_str::<Value>(&raw).unwrap_or(Value::String(raw));
        options = options.with_arg(key, value);
    }

    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling run");
            token.cancel();
        }
    });

    debug!(tool = %tool, workspace = %cx.workspace.display(), "Running tool");
    let outcome = orchestrator.run_tool(tool, options).await;
    interrupt.abort();
    let result = outcome?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_result(&result);
    }

    if result.status == ScanStatus::Failed {
        anyhow::bail!("{} failed: {}", tool, result.error.as_deref().unwrap_or("unknown error"));
    }
    Ok(())
}

fn print_result(result: &ScanResult) {
    println!("{}", format!("{} ({})", result.tool_id, result.status).bold().cyan());
    println!("{}", "─".repeat(60).dimmed());

    if result.findings.is_empty() {
        println!("  {}", "No findings".dimmed());
    }
    for finding in &result.findings {
        print_finding(finding);
    }

    let summary = &result.summary;
    println!();
    println!(
        "{} total: {} errors, {} warnings, {} info, {} hints in {} files ({}ms)",
        summary.total,
        summary.errors.to_string().red(),
        summary.warnings.to_string().yellow(),
        summary.infos,
        summary.hints,
        summary.files_scanned,
        result.duration_ms,
    );
}

fn print_finding(finding: &Finding) {
    let severity = match finding.severity {
        Severity::Error => "error".red().bold(),
        Severity::Warning => "warning".yellow().bold(),
        Severity::Info => "info".blue(),
        Severity::Hint => "hint".dimmed(),
    };
    let location = finding
        .location
        .as_ref()
        .map_or_else(String::new, |location| {
            format!("{}:{}", location.path.display(), location.start_line)
        });
    println!("  {severity:<8} {} {}", location.dimmed(), finding.title);
}
