use crate::runner::Runner;
use async_trait::async_trait;
use regex::Regex;
use std::{collections::BTreeMap, sync::Arc, sync::LazyLock};
use tokio_util::sync::CancellationToken;

/// One discovered flag. The type is never inferred from help text; flags are
/// surfaced as free-text strings only.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FlagInfo {
    pub name: String,
    pub description: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubcommandInfo {
    pub name: String,
    pub description: String,
}

/// Best-effort description of one top-level glab command, rebuilt on every
/// scan and discarded on cache expiry. Never persisted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommandInfo {
    pub name: String,
    pub description: String,
    pub usage: String,
    pub flags: Vec<FlagInfo>,
    pub subcommands: Vec<SubcommandInfo>,
}

impl CommandInfo {
    /// Fallback shape for a command whose help invocation failed.
    pub fn synthetic(binary: &str, name: &str) -> Self {
        Self {
            name: name.to_string(),
            description: format!("Execute {binary} {name} command"),
            usage: format!("{binary} {name}"),
            flags: Vec::new(),
            subcommands: Vec::new(),
        }
    }
}

pub type CommandTable = BTreeMap<String, CommandInfo>;

/// Source of the command table. The default implementation is a
/// hand-maintained catalog; help-text scraping is best-effort enrichment,
/// never a correctness-critical path.
#[async_trait]
pub trait CapabilitySource: Send + Sync {
    async fn scan(&self) -> CommandTable;
}

// Top-level help sections that introduce the command list, and the
// substrings that end it.
const COMMAND_SECTION_MARKERS: &[&str] = &["Available Commands:", "Commands:", "CORE COMMANDS"];
const COMMAND_SECTION_TERMINATORS: &[&str] = &["Flags", "FLAGS", "Learn more"];

const FLAG_SECTION_HEADERS: &[&str] = &["Flags:", "Options:", "Global Flags:"];
const SUBCOMMAND_SECTION_HEADERS: &[&str] = &["Available Commands:", "Commands:"];

static FLAG_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(-\w|--[\w-]+)").expect("flag pattern"));
static TYPE_HINT_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*\[[\w\s,]+\]").expect("type hint pattern"));

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Section {
    None,
    Flags,
    Subcommands,
}

/// Scrapes `glab --help` output into a command table. This is a heuristic
/// over prose, coupled to glab's current help formatting: any field that
/// cannot be extracted degrades silently to an empty or synthetic value.
pub struct HelpScanner {
    runner: Arc<dyn Runner>,
    binary: String,
}

impl HelpScanner {
    pub fn new(runner: Arc<dyn Runner>, binary: String) -> Self {
        Self { runner, binary }
    }

    async fn command_help(&self, name: &str) -> CommandInfo {
        let args = vec![name.to_string(), "--help".to_string()];
        match self.runner.run(&args, None, CancellationToken::new()).await {
            Ok(outcome) if outcome.succeeded() => {
                parse_command_help(&self.binary, name, &outcome.stdout)
            }
            _ => CommandInfo::synthetic(&self.binary, name),
        }
    }
}

#[async_trait]
impl CapabilitySource for HelpScanner {
    async fn scan(&self) -> CommandTable {
        tracing::info!("Discovering {} commands from help text", self.binary);

        let help = match self
            .runner
            .run(&["--help".to_string()], None, CancellationToken::new())
            .await
        {
            Ok(outcome) if outcome.succeeded() => outcome.stdout,
            _ => {
                tracing::error!("Failed to get {} help output", self.binary);
                return CommandTable::new();
            }
        };

        let mut table = CommandTable::new();
        for name in top_level_commands(&help) {
            let info = self.command_help(&name).await;
            table.insert(name, info);
        }

        tracing::info!("Discovered {} commands", table.len());
        table
    }
}

/// First-column command names from the top-level help output.
pub fn top_level_commands(help: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    let mut in_section = false;

    for line in help.lines() {
        let trimmed = line.trim();

        if COMMAND_SECTION_MARKERS.iter().any(|m| trimmed.contains(m)) {
            in_section = true;
            continue;
        }
        if !in_section || trimmed.is_empty() {
            continue;
        }
        if COMMAND_SECTION_TERMINATORS
            .iter()
            .any(|t| trimmed.contains(t))
        {
            break;
        }

        // "  mr:          Create, view and manage merge requests"
        if let Some((lhs, _)) = trimmed.split_once(':') {
            let name = lhs.trim();
            if !name.is_empty()
                && !name.starts_with('-')
                && !name.contains(char::is_whitespace)
                && !names.iter().any(|n| n == name)
            {
                names.push(name.to_string());
            }
        }
    }

    names
}

/// Line-by-line state machine over one command's help output.
pub fn parse_command_help(binary: &str, name: &str, help: &str) -> CommandInfo {
    let mut description = String::new();
    let mut usage = String::new();
    let mut flags = Vec::new();
    let mut subcommands = Vec::new();
    let mut section = Section::None;

    for line in help.lines() {
        let trimmed = line.trim();

        if description.is_empty()
            && !trimmed.is_empty()
            && !trimmed.starts_with("Usage:")
        {
            let lower = trimmed.to_lowercase();
            if lower.contains(&name.to_lowercase()) || lower.contains("command") {
                description = trimmed.to_string();
            }
        }

        if usage.is_empty()
            && let Some(rest) = trimmed.strip_prefix("Usage:")
        {
            usage = rest.trim().to_string();
        }

        if FLAG_SECTION_HEADERS.contains(&trimmed) {
            section = Section::Flags;
            continue;
        }
        if SUBCOMMAND_SECTION_HEADERS.contains(&trimmed) {
            section = Section::Subcommands;
            continue;
        }
        if trimmed.starts_with("Examples:") || trimmed.starts_with("Use \"") {
            section = Section::None;
            continue;
        }

        match section {
            Section::Flags if line.starts_with("  ") => {
                if let Some(m) = FLAG_PATTERN.captures(line) {
                    let token = m.get(1).map(|t| t.as_str()).unwrap_or_default();
                    let rest = &line[m.get(0).map(|t| t.end()).unwrap_or(0)..];
                    let description = TYPE_HINT_PATTERN
                        .replace_all(rest.trim(), "")
                        .trim()
                        .to_string();
                    flags.push(FlagInfo {
                        name: token.to_string(),
                        description,
                    });
                }
            }
            Section::Subcommands if line.starts_with("  ") => {
                let mut parts = trimmed.split_whitespace();
                if let Some(sub) = parts.next() {
                    subcommands.push(SubcommandInfo {
                        name: sub.to_string(),
                        description: parts.collect::<Vec<_>>().join(" "),
                    });
                }
            }
            _ => {}
        }
    }

    let fallback = CommandInfo::synthetic(binary, name);
    CommandInfo {
        name: name.to_string(),
        description: if description.is_empty() {
            fallback.description
        } else {
            description
        },
        usage: if usage.is_empty() { fallback.usage } else { usage },
        flags,
        subcommands,
    }
}

/// Hand-maintained capability table for glab's core surface. This is the
/// default source; it does not depend on glab's help formatting and keeps
/// startup free of a dozen subprocess spawns.
#[derive(Default)]
pub struct StaticCatalog;

impl StaticCatalog {
    fn entry(
        name: &str,
        description: &str,
        usage: &str,
        flags: &[(&str, &str)],
        subcommands: &[(&str, &str)],
    ) -> CommandInfo {
        CommandInfo {
            name: name.to_string(),
            description: description.to_string(),
            usage: usage.to_string(),
            flags: flags
                .iter()
                .map(|(name, description)| FlagInfo {
                    name: name.to_string(),
                    description: description.to_string(),
                })
                .collect(),
            subcommands: subcommands
                .iter()
                .map(|(name, description)| SubcommandInfo {
                    name: name.to_string(),
                    description: description.to_string(),
                })
                .collect(),
        }
    }

    pub fn table() -> CommandTable {
        let entries = [
            Self::entry(
                "mr",
                "Create, view and manage merge requests",
                "glab mr <subcommand> [flags]",
                &[
                    ("--assignee", "Filter or assign by user"),
                    ("--label", "Filter or apply labels"),
                    ("--reviewer", "Request review from users"),
                    ("--milestone", "Filter or set the milestone"),
                ],
                &[
                    ("list", "List merge requests"),
                    ("view", "Display a merge request"),
                    ("create", "Create a merge request"),
                    ("merge", "Merge an open merge request"),
                    ("close", "Close a merge request"),
                    ("reopen", "Reopen a closed merge request"),
                    ("approve", "Approve a merge request"),
                    ("checkout", "Check out a merge request branch"),
                    ("diff", "Show changes in a merge request"),
                    ("note", "Comment on a merge request"),
                    ("update", "Update a merge request"),
                ],
            ),
            Self::entry(
                "issue",
                "Work with GitLab issues",
                "glab issue <subcommand> [flags]",
                &[
                    ("--assignee", "Filter or assign by user"),
                    ("--label", "Filter or apply labels"),
                    ("--milestone", "Filter or set the milestone"),
                ],
                &[
                    ("list", "List issues"),
                    ("view", "Display an issue"),
                    ("create", "Create an issue"),
                    ("close", "Close an issue"),
                    ("reopen", "Reopen a closed issue"),
                    ("note", "Comment on an issue"),
                    ("update", "Update an issue"),
                ],
            ),
            Self::entry(
                "ci",
                "Work with GitLab CI/CD pipelines and jobs",
                "glab ci <subcommand> [flags]",
                &[("--branch", "Select a branch ref")],
                &[
                    ("list", "List pipelines"),
                    ("view", "View a pipeline"),
                    ("run", "Create or run a new pipeline"),
                    ("status", "View a running pipeline"),
                    ("trace", "Trace a job log in real time"),
                    ("retry", "Retry a failed pipeline job"),
                    ("cancel", "Cancel a running pipeline or job"),
                    ("lint", "Check a .gitlab-ci.yml for validity"),
                ],
            ),
            Self::entry(
                "repo",
                "Work with GitLab repositories and projects",
                "glab repo <subcommand> [flags]",
                &[("--group", "Select a group namespace")],
                &[
                    ("view", "View a repository"),
                    ("clone", "Clone a repository"),
                    ("fork", "Fork a repository"),
                    ("create", "Create a new repository"),
                    ("list", "List repositories you are a member of"),
                    ("archive", "Download an archive of the repository"),
                ],
            ),
            Self::entry(
                "release",
                "Manage GitLab releases",
                "glab release <subcommand> [flags]",
                &[],
                &[
                    ("list", "List releases"),
                    ("view", "View a release"),
                    ("create", "Create a release"),
                    ("delete", "Delete a release"),
                    ("upload", "Upload release assets"),
                ],
            ),
            Self::entry(
                "label",
                "Manage labels for a project",
                "glab label <subcommand> [flags]",
                &[],
                &[
                    ("list", "List labels"),
                    ("create", "Create a label"),
                    ("delete", "Delete a label"),
                ],
            ),
            Self::entry(
                "snippet",
                "Create, view and manage snippets",
                "glab snippet <subcommand> [flags]",
                &[],
                &[
                    ("create", "Create a snippet"),
                    ("view", "View a snippet"),
                ],
            ),
            Self::entry(
                "variable",
                "Manage project and group CI/CD variables",
                "glab variable <subcommand> [flags]",
                &[("--group", "Operate on a group instead of a project")],
                &[
                    ("list", "List variables"),
                    ("get", "Get a variable"),
                    ("set", "Create or update a variable"),
                    ("delete", "Delete a variable"),
                ],
            ),
            Self::entry(
                "auth",
                "Manage glab's authentication state",
                "glab auth <subcommand> [flags]",
                &[],
                &[
                    ("login", "Authenticate with a GitLab instance"),
                    ("logout", "Remove stored credentials"),
                    ("status", "Check authentication status"),
                ],
            ),
            Self::entry(
                "api",
                "Make an authenticated request to the GitLab API",
                "glab api <endpoint> [flags]",
                &[
                    ("--method", "HTTP method to use"),
                    ("--field", "Add a typed request body parameter"),
                    ("--header", "Add an HTTP request header"),
                    ("--paginate", "Fetch all pages of results"),
                ],
                &[],
            ),
            Self::entry(
                "version",
                "Show glab version information",
                "glab version",
                &[],
                &[],
            ),
            Self::entry(
                "check-update",
                "Check for the latest glab release",
                "glab check-update",
                &[],
                &[],
            ),
            Self::entry(
                "completion",
                "Generate shell completion scripts",
                "glab completion -s <shell>",
                &[("--shell", "Shell type: bash, zsh, fish, powershell")],
                &[],
            ),
        ];

        entries
            .into_iter()
            .map(|info| (info.name.clone(), info))
            .collect()
    }
}

#[async_trait]
impl CapabilitySource for StaticCatalog {
    async fn scan(&self) -> CommandTable {
        Self::table()
    }
}
