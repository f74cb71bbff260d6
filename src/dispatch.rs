use crate::runner::{RunError, RunOutcome};
use rmcp::model::{CallToolResult, Content};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;

/// Commands that take positional arguments but never a subcommand. For these
/// the leading-token inference below is skipped.
pub const SUBCOMMANDLESS_COMMANDS: &[&str] = &["version", "check-update", "completion", "api"];

/// Structured arguments accepted by every generic command tool.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ToolCallArgs {
    pub args: Vec<String>,
    pub subcommand: Option<String>,
    pub common_flags: Option<BTreeMap<String, Value>>,
    pub repo: Option<String>,
    pub cwd: Option<String>,
    pub format: Option<String>,
}

#[derive(Debug, PartialEq, Eq)]
pub struct AssembledCall {
    pub argv: Vec<String>,
    /// Leading non-dash token of `args` when no explicit subcommand was
    /// given and the command supports subcommands. The argv is unchanged
    /// either way; this is recorded because the token is ambiguous — it is
    /// indistinguishable from a positional argument with the same spelling.
    pub inferred_subcommand: Option<String>,
}

fn flag_value_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Rebuild a CLI argument list from structured tool parameters.
pub fn assemble(command: &str, call: &ToolCallArgs) -> AssembledCall {
    let mut argv = vec![command.to_string()];
    let mut inferred_subcommand = None;

    if let Some(subcommand) = &call.subcommand {
        argv.push(subcommand.clone());
    } else if let Some(first) = call.args.first()
        && !first.starts_with('-')
        && !SUBCOMMANDLESS_COMMANDS.contains(&command)
    {
        inferred_subcommand = Some(first.clone());
    }
    argv.extend(call.args.iter().cloned());

    if let Some(flags) = &call.common_flags {
        for (name, value) in flags {
            let value = flag_value_string(value);
            if value.is_empty() {
                continue;
            }
            argv.push(format!("--{}", name.replace('_', "-")));
            argv.push(value);
        }
    }

    if let Some(repo) = &call.repo
        && !argv
            .iter()
            .any(|a| a == "-R" || a == "--repo" || a.starts_with("--repo="))
    {
        argv.push("-R".to_string());
        argv.push(repo.clone());
    }

    if let Some(format) = &call.format
        && !argv.iter().any(|a| a.starts_with("--format"))
    {
        argv.push("--format".to_string());
        argv.push(format.clone());
    }

    if let Some(token) = &inferred_subcommand {
        tracing::debug!("Treating leading argument {token:?} as {command} subcommand");
    }

    AssembledCall {
        argv,
        inferred_subcommand,
    }
}

fn failure_hints(stderr: &str) -> Vec<&'static str> {
    let lower = stderr.to_lowercase();
    let mut hints = Vec::new();
    if lower.contains("401") || lower.contains("unauthorized") || lower.contains("authentication")
    {
        hints.push("Hint: authentication failed. Run `glab auth login` or set GITLAB_TOKEN.");
    }
    if lower.contains("404") || lower.contains("not found") {
        hints.push("Hint: resource not found. Check the project path, ID, or reference.");
    }
    if lower.contains("403") || lower.contains("forbidden") || lower.contains("permission denied")
    {
        hints.push("Hint: the authenticated user lacks permission for this operation.");
    }
    if lower.contains("git repository") || lower.contains("no git remote") {
        hints.push(
            "Hint: run inside a repository clone, or pass repo as NAMESPACE/PROJECT (-R).",
        );
    }
    hints
}

/// Format a finished invocation as a tool result. Failures become tool
/// results with the error flag set, never protocol errors, so the caller
/// can read the text and hints.
pub fn render_outcome(outcome: &RunOutcome) -> CallToolResult {
    if outcome.succeeded() {
        let mut parts = Vec::new();
        match &outcome.structured {
            Some(payload) => {
                let pretty = serde_json::to_string_pretty(payload)
                    .unwrap_or_else(|_| payload.to_string());
                parts.push("Command executed successfully".to_string());
                parts.push(format!("JSON output:\n```json\n{pretty}\n```"));
            }
            None if !outcome.stdout.is_empty() => {
                parts.push("Command executed successfully".to_string());
                parts.push(format!("Output:\n```\n{}\n```", outcome.stdout));
            }
            None => parts.push("Command executed successfully (no output)".to_string()),
        }
        // Success does not imply empty stderr; glab reports progress there.
        if !outcome.stderr.is_empty() {
            parts.push(format!("Warnings:\n```\n{}\n```", outcome.stderr));
        }
        CallToolResult::success(vec![Content::text(parts.join("\n\n"))])
    } else {
        let mut parts = vec![format!("Command failed (exit code {})", outcome.exit_code)];
        if !outcome.stderr.is_empty() {
            parts.push(format!("Error:\n```\n{}\n```", outcome.stderr));
        }
        for hint in failure_hints(&outcome.stderr) {
            parts.push(hint.to_string());
        }
        if !outcome.stdout.is_empty() {
            parts.push(format!("Output:\n```\n{}\n```", outcome.stdout));
        }
        parts.push(
            "Use the glab_help tool for usage details, or glab_examples for common invocations."
                .to_string(),
        );
        CallToolResult::error(vec![Content::text(parts.join("\n\n"))])
    }
}

pub fn render_run_error(command: &str, err: &RunError) -> CallToolResult {
    CallToolResult::error(vec![Content::text(format!(
        "glab {command} did not complete: {err}"
    ))])
}
