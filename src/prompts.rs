use rmcp::ErrorData as McpError;
use rmcp::model::{
    GetPromptResult, JsonObject, Prompt, PromptArgument, PromptMessage, PromptMessageRole,
};

struct WorkflowPrompt {
    name: &'static str,
    description: &'static str,
    arguments: &'static [(&'static str, &'static str, bool)],
    template: &'static str,
}

/// Guided workflows layered over the generic tools. Placeholders in the
/// template are `{argument_name}`.
const WORKFLOWS: &[WorkflowPrompt] = &[
    WorkflowPrompt {
        name: "review_merge_request",
        description: "Review a merge request: changes, discussions, and pipeline state",
        arguments: &[("mr_id", "Merge request IID, e.g. 42", true)],
        template: "Review merge request !{mr_id}. Use the glab_mr tool to view it \
                   (subcommand 'view'), inspect its changes (subcommand 'diff'), and check \
                   its notes. Summarize the purpose of the change, call out risky or \
                   unclear parts, and suggest concrete review comments.",
    },
    WorkflowPrompt {
        name: "debug_pipeline_failure",
        description: "Investigate why a CI/CD pipeline failed",
        arguments: &[("pipeline_id", "Pipeline ID; defaults to the latest pipeline", false)],
        template: "Investigate the failing pipeline {pipeline_id}. Use the glab_ci tool to \
                   view the pipeline, find the failed jobs, and read their logs with the \
                   'trace' subcommand. Explain the root cause and propose a fix.",
    },
    WorkflowPrompt {
        name: "triage_issues",
        description: "Triage open issues, optionally filtered by label",
        arguments: &[("label", "Only triage issues carrying this label", false)],
        template: "Triage the open issues{label_clause}. Use the glab_issue tool to list \
                   them, group them by theme, flag duplicates and stale items, and propose \
                   a priority order with a one-line rationale each.",
    },
];

pub fn all() -> Vec<Prompt> {
    WORKFLOWS
        .iter()
        .map(|w| {
            Prompt::new(
                w.name,
                Some(w.description),
                Some(
                    w.arguments
                        .iter()
                        .map(|(name, description, required)| PromptArgument {
                            name: name.to_string(),
                            title: None,
                            description: Some(description.to_string()),
                            required: Some(*required),
                        })
                        .collect(),
                ),
            )
        })
        .collect()
}

pub fn get(name: &str, arguments: Option<&JsonObject>) -> Result<GetPromptResult, McpError> {
    let workflow = WORKFLOWS
        .iter()
        .find(|w| w.name == name)
        .ok_or_else(|| McpError::invalid_params(format!("Unknown prompt: {name}"), None))?;

    let mut text = workflow.template.to_string();
    for (arg_name, _, required) in workflow.arguments {
        let value = arguments
            .and_then(|a| a.get(*arg_name))
            .and_then(|v| v.as_str())
            .unwrap_or_default();
        if *required && value.is_empty() {
            return Err(McpError::invalid_params(
                format!("Missing required prompt argument: {arg_name}"),
                None,
            ));
        }
        text = text.replace(&format!("{{{arg_name}}}"), value);
    }

    // Optional filters render as a clause only when present.
    if name == "triage_issues" {
        let label = arguments
            .and_then(|a| a.get("label"))
            .and_then(|v| v.as_str())
            .unwrap_or_default();
        let clause = if label.is_empty() {
            String::new()
        } else {
            format!(" labeled '{label}'")
        };
        text = text.replace("{label_clause}", &clause);
    }

    Ok(GetPromptResult {
        description: Some(workflow.description.to_string()),
        messages: vec![PromptMessage::new_text(PromptMessageRole::User, text)],
    })
}
