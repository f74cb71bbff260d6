use crate::discovery::CommandInfo;
use rmcp::model::JsonObject;
use serde_json::{Value, json};

/// `--target-branch` → `target_branch`, the property name used in tool
/// schemas and reversed again at dispatch time.
pub fn normalize_flag_name(flag: &str) -> String {
    flag.trim_start_matches('-').replace('-', "_")
}

fn object(value: Value) -> JsonObject {
    match value {
        Value::Object(map) => map,
        _ => JsonObject::new(),
    }
}

/// Generic input schema for one discovered command. Nothing is required;
/// every field is an optional refinement over a plain argument list.
pub fn command_input_schema(info: &CommandInfo) -> JsonObject {
    let mut properties = JsonObject::new();

    properties.insert(
        "args".to_string(),
        json!({
            "type": "array",
            "items": {"type": "string"},
            "description": format!("Command arguments for 'glab {}'", info.name),
        }),
    );

    if !info.flags.is_empty() {
        // Duplicate flag names across help sections simply overwrite here.
        let mut flag_properties = JsonObject::new();
        for flag in &info.flags {
            flag_properties.insert(
                normalize_flag_name(&flag.name),
                json!({"type": "string", "description": flag.description}),
            );
        }
        properties.insert(
            "common_flags".to_string(),
            json!({
                "type": "object",
                "description": "Common flags, converted back to CLI arguments",
                "properties": flag_properties,
            }),
        );
    }

    if !info.subcommands.is_empty() {
        let names: Vec<&str> = info.subcommands.iter().map(|s| s.name.as_str()).collect();
        properties.insert(
            "subcommand".to_string(),
            json!({
                "type": "string",
                "enum": names,
                "description": "Subcommand to execute",
            }),
        );
    }

    properties.insert(
        "repo".to_string(),
        json!({
            "type": "string",
            "description": "Repository override as NAMESPACE/PROJECT, passed to glab as -R",
        }),
    );
    properties.insert(
        "cwd".to_string(),
        json!({"type": "string", "description": "Working directory for the command"}),
    );
    properties.insert(
        "format".to_string(),
        json!({
            "type": "string",
            "enum": ["json", "table", "text"],
            "description": "Output format, if the command supports one",
        }),
    );

    object(json!({
        "type": "object",
        "properties": properties,
        "required": [],
    }))
}

pub fn raw_input_schema() -> JsonObject {
    object(json!({
        "type": "object",
        "properties": {
            "args": {
                "type": "array",
                "items": {"type": "string"},
                "description": "Complete command arguments, without the leading 'glab'",
            },
            "cwd": {"type": "string", "description": "Working directory"},
        },
        "required": ["args"],
    }))
}

pub fn help_input_schema() -> JsonObject {
    object(json!({
        "type": "object",
        "properties": {
            "command": {
                "type": "string",
                "description": "Command to get help for, e.g. 'issue' or 'mr create'",
            },
        },
        "required": ["command"],
    }))
}

pub fn empty_input_schema() -> JsonObject {
    object(json!({
        "type": "object",
        "properties": {},
        "required": [],
    }))
}
