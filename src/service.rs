use crate::{
    cache::CommandCache,
    config::{Config, DiscoveryMode},
    discovery::{CapabilitySource, HelpScanner, StaticCatalog},
    dispatch::{self, ToolCallArgs},
    prompts,
    runner::{GlabRunner, LAUNCH_FAILURE_CODE, Runner},
    schema,
};
use anyhow::Result;
use rmcp::{
    ErrorData as McpError, ServerHandler,
    model::*,
    service::{RequestContext, RoleServer},
};
use std::{ops::Deref, path::PathBuf, sync::Arc};
use tokio_util::sync::CancellationToken;

pub const TOOL_PREFIX: &str = "glab_";

const EXAMPLES: &str = "\
Common glab invocations, expressed as tool calls:

- List merge requests assigned to you:
  glab_mr with {\"subcommand\": \"list\", \"args\": [\"--assignee=@me\"]}
- View an issue:
  glab_issue with {\"subcommand\": \"view\", \"args\": [\"42\"]}
- Watch the latest pipeline:
  glab_ci with {\"subcommand\": \"status\"}
- Hit the raw API with pagination:
  glab_api with {\"args\": [\"projects/:id/issues\"], \"common_flags\": {\"paginate\": \"true\"}}
- Anything else, verbatim:
  glab_raw with {\"args\": [\"mr\", \"merge\", \"42\", \"--squash\"]}

Pass {\"repo\": \"namespace/project\"} to any command tool to target a \
repository you are not inside, and {\"format\": \"json\"} for structured \
output where glab supports it. glab_help returns live usage for any \
command; glab_discover rebuilds the command table.";

pub struct GlabServiceInner {
    runner: Arc<dyn Runner>,
    cache: CommandCache,
    binary: String,
    default_repo: Option<String>,
}

pub struct GlabService(Arc<GlabServiceInner>);

impl Clone for GlabService {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl Deref for GlabService {
    type Target = Arc<GlabServiceInner>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl GlabService {
    pub fn new(config: &Config) -> Self {
        let mut runner = GlabRunner::new(config.binary.clone(), config.command_timeout());
        if let Some(host) = &config.gitlab_host {
            runner = runner.with_env("GITLAB_HOST", host.as_str());
        }
        let runner: Arc<dyn Runner> = Arc::new(runner);
        let source: Arc<dyn CapabilitySource> = match config.discovery {
            DiscoveryMode::Static => Arc::new(StaticCatalog),
            DiscoveryMode::Dynamic => Arc::new(HelpScanner::new(
                Arc::clone(&runner),
                config.binary.clone(),
            )),
        };
        Self(Arc::new(GlabServiceInner {
            cache: CommandCache::new(source, config.cache_ttl()),
            runner,
            binary: config.binary.clone(),
            default_repo: config.repo.clone(),
        }))
    }

    #[cfg(test)]
    fn with_parts(
        runner: Arc<dyn Runner>,
        source: Arc<dyn CapabilitySource>,
        default_repo: Option<String>,
    ) -> Self {
        Self(Arc::new(GlabServiceInner {
            cache: CommandCache::new(source, std::time::Duration::from_secs(300)),
            runner,
            binary: "glab".to_string(),
            default_repo,
        }))
    }

    /// Startup check: the binary must at least launch, and the command table
    /// is warmed so the first tools/list does not pay for a full scan. A
    /// warm-up that finds nothing is logged, not fatal.
    pub async fn preflight(&self) -> Result<()> {
        let outcome = self
            .runner
            .run(
                &["--version".to_string()],
                None,
                CancellationToken::new(),
            )
            .await?;
        if outcome.exit_code == LAUNCH_FAILURE_CODE {
            anyhow::bail!("{} is not runnable: {}", self.binary, outcome.stderr.trim());
        }
        if std::env::var("GITLAB_TOKEN").is_err() {
            tracing::info!("GITLAB_TOKEN not set; relying on glab's stored credentials");
        }
        let table = self.cache.get().await;
        if table.is_empty() {
            tracing::warn!("Initial command discovery found no commands");
        }
        Ok(())
    }

    async fn run_and_render(
        &self,
        command: &str,
        argv: &[String],
        cwd: Option<&str>,
        ct: CancellationToken,
    ) -> CallToolResult {
        let cwd = cwd.map(PathBuf::from);
        match self.runner.run(argv, cwd.as_deref(), ct).await {
            Ok(outcome) => dispatch::render_outcome(&outcome),
            Err(err) => dispatch::render_run_error(command, &err),
        }
    }
}

fn parse_call_args(arguments: JsonObject) -> Result<ToolCallArgs, McpError> {
    serde_json::from_value(serde_json::Value::Object(arguments))
        .map_err(|e| McpError::invalid_params(format!("Invalid tool arguments: {e}"), None))
}

impl ServerHandler for GlabService {
    async fn call_tool(
        &self,
        request: CallToolRequestParam,
        context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        tracing::info!("got tools/call request {:?}", request);
        let arguments = request.arguments.unwrap_or_default();

        match request.name.as_ref() {
            "glab_raw" => {
                let call = parse_call_args(arguments)?;
                if call.args.is_empty() {
                    return Err(McpError::invalid_params(
                        "glab_raw requires a non-empty args array",
                        None,
                    ));
                }
                let command = call.args[0].clone();
                Ok(self
                    .run_and_render(&command, &call.args, call.cwd.as_deref(), context.ct)
                    .await)
            }
            "glab_help" => {
                let command = arguments
                    .get("command")
                    .and_then(|v| v.as_str())
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .ok_or_else(|| {
                        McpError::invalid_params("glab_help requires a command", None)
                    })?;
                // "mr create" becomes ["mr", "create", "--help"].
                let mut argv: Vec<String> =
                    command.split_whitespace().map(str::to_string).collect();
                argv.push("--help".to_string());
                Ok(self.run_and_render(command, &argv, None, context.ct).await)
            }
            "glab_discover" => {
                self.cache.invalidate().await;
                let table = self.cache.get().await;
                Ok(CallToolResult::success(vec![Content::text(format!(
                    "Re-discovered {} glab commands. Use glab_help for per-command usage.",
                    table.len()
                ))]))
            }
            "glab_examples" => Ok(CallToolResult::success(vec![Content::text(EXAMPLES)])),
            name if name.starts_with(TOOL_PREFIX) => {
                let command = name[TOOL_PREFIX.len()..].replace('_', "-");
                let mut call = parse_call_args(arguments)?;
                if call.repo.is_none() {
                    call.repo = self.default_repo.clone();
                }
                let assembled = dispatch::assemble(&command, &call);
                Ok(self
                    .run_and_render(
                        &command,
                        &assembled.argv,
                        call.cwd.as_deref(),
                        context.ct,
                    )
                    .await)
            }
            _ => Err(McpError::invalid_params(
                format!("Unknown tool: {}", request.name),
                None,
            )),
        }
    }

    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            server_info: Implementation {
                name: "glab-mcp".to_string(),
                title: Some("GitLab CLI MCP Server".to_string()),
                version: env!("CARGO_PKG_VERSION").to_string(),
                ..Default::default()
            },
            capabilities: ServerCapabilities::builder()
                .enable_prompts()
                .enable_tools()
                .build(),
            instructions: Some(
                "Exposes the GitLab CLI (glab) as tools: one tool per top-level command \
                 (glab_mr, glab_issue, glab_ci, ...), plus glab_raw for verbatim argument \
                 lists, glab_help for live usage text, glab_examples for common \
                 invocations, and glab_discover to rebuild the command table. glab must \
                 be installed and authenticated."
                    .to_string(),
            ),
            ..Default::default()
        }
    }

    async fn get_prompt(
        &self,
        request: GetPromptRequestParam,
        _context: RequestContext<RoleServer>,
    ) -> Result<GetPromptResult, McpError> {
        tracing::info!("got prompts/get request {:?}", request);
        prompts::get(&request.name, request.arguments.as_ref())
    }

    async fn list_prompts(
        &self,
        request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListPromptsResult, McpError> {
        tracing::info!("got prompts/list request {:?}", request);
        let mut result = ListPromptsResult::default();
        result.prompts = prompts::all();
        Ok(result)
    }

    async fn list_tools(
        &self,
        request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, McpError> {
        tracing::info!("got tools/list request {:?}", request);
        let table = self.cache.get().await;

        let mut result = ListToolsResult::default();
        result.tools.push(Tool::new(
            "glab_raw",
            "Execute any glab command with full argument control",
            Arc::new(schema::raw_input_schema()),
        ));

        for (name, info) in table.iter() {
            let tool_name = format!("{TOOL_PREFIX}{}", name.replace('-', "_"));
            let mut description = info.description.clone();
            if !info.subcommands.is_empty() {
                let names: Vec<&str> =
                    info.subcommands.iter().map(|s| s.name.as_str()).collect();
                description.push_str(&format!(". Subcommands: {}", names.join(", ")));
            }
            result.tools.push(Tool::new(
                tool_name,
                description,
                Arc::new(schema::command_input_schema(info)),
            ));
        }

        result.tools.push(Tool::new(
            "glab_help",
            "Get help for any glab command or subcommand",
            Arc::new(schema::help_input_schema()),
        ));
        result.tools.push(Tool::new(
            "glab_discover",
            "Force re-discovery of available glab commands (clears the cache)",
            Arc::new(schema::empty_input_schema()),
        ));
        result.tools.push(Tool::new(
            "glab_examples",
            "Show example invocations for common GitLab workflows",
            Arc::new(schema::empty_input_schema()),
        ));

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::{RunError, RunOutcome};
    use async_trait::async_trait;
    use rmcp::service::{RoleClient, RunningService, Service, serve_client, serve_server};
    use std::collections::HashMap;
    use std::path::Path;
    use std::sync::Mutex;
    use tokio::io::duplex;
    use tokio_test::assert_ok;

    /// Canned runner keyed by the joined argument list; records every argv
    /// it receives.
    struct ScriptedRunner {
        responses: HashMap<String, RunOutcome>,
        calls: Mutex<Vec<Vec<String>>>,
    }

    impl ScriptedRunner {
        fn new(entries: &[(&str, RunOutcome)]) -> Arc<Self> {
            Arc::new(Self {
                responses: entries
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.clone()))
                    .collect(),
                calls: Mutex::new(Vec::new()),
            })
        }

        fn ok(stdout: &str) -> RunOutcome {
            RunOutcome::from_captured(0, stdout.to_string(), String::new())
        }

        fn fail(stderr: &str) -> RunOutcome {
            RunOutcome::from_captured(1, String::new(), stderr.to_string())
        }

        fn calls(&self) -> Vec<Vec<String>> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Runner for ScriptedRunner {
        async fn run(
            &self,
            args: &[String],
            _cwd: Option<&Path>,
            _ct: CancellationToken,
        ) -> Result<RunOutcome, RunError> {
            self.calls.lock().unwrap().push(args.to_vec());
            Ok(self
                .responses
                .get(&args.join(" "))
                .cloned()
                .unwrap_or_else(|| Self::fail("unknown command")))
        }
    }

    fn static_service(runner: Arc<ScriptedRunner>) -> GlabService {
        GlabService::with_parts(runner, Arc::new(StaticCatalog), None)
    }

    async fn create_test_pair<S, C>(
        service: S,
        client: C,
    ) -> (RunningService<RoleServer, S>, RunningService<RoleClient, C>)
    where
        S: Service<RoleServer>,
        C: Service<RoleClient>,
    {
        let (srv_io, cli_io) = duplex(64 * 1024);
        tokio::try_join!(
            async {
                serve_server(service, srv_io)
                    .await
                    .map_err(anyhow::Error::from)
            },
            async {
                serve_client(client, cli_io)
                    .await
                    .map_err(anyhow::Error::from)
            }
        )
        .expect("Failed to create test pair")
    }

    fn create_test_ctx(
        running: &RunningService<RoleServer, GlabService>,
    ) -> RequestContext<RoleServer> {
        RequestContext {
            ct: CancellationToken::new(),
            extensions: Extensions::default(),
            id: RequestId::Number(1),
            meta: Meta::default(),
            peer: running.peer().clone(),
        }
    }

    fn call(name: &str, arguments: serde_json::Value) -> CallToolRequestParam {
        CallToolRequestParam {
            name: std::borrow::Cow::Owned(name.to_string()),
            arguments: match arguments {
                serde_json::Value::Object(map) => Some(map),
                _ => None,
            },
        }
    }

    fn text_of(result: &CallToolResult) -> String {
        result
            .content
            .iter()
            .filter_map(|c| c.as_text().map(|t| t.text.clone()))
            .collect()
    }

    #[tokio::test]
    async fn test_list_tools_includes_catalog_and_special_tools() {
        let runner = ScriptedRunner::new(&[]);
        let (server, client) =
            create_test_pair(static_service(runner), ClientInfo::default()).await;

        let ctx = create_test_ctx(&server);
        let result = server.service().list_tools(None, ctx).await.unwrap();

        let names: Vec<String> = result.tools.iter().map(|t| t.name.to_string()).collect();
        assert_eq!(names[0], "glab_raw");
        for expected in ["glab_mr", "glab_issue", "glab_check_update"] {
            assert!(names.contains(&expected.to_string()), "missing {expected}");
        }
        assert!(names.ends_with(&[
            "glab_help".to_string(),
            "glab_discover".to_string(),
            "glab_examples".to_string()
        ]));
        // Static catalog plus the four special tools.
        assert_eq!(names.len(), StaticCatalog::table().len() + 4);

        let mr_tool = result.tools.iter().find(|t| t.name == "glab_mr").unwrap();
        assert!(
            mr_tool
                .description
                .as_ref()
                .unwrap()
                .contains("Subcommands:")
        );

        assert_ok!(server.cancel().await);
        assert_ok!(client.cancel().await);
    }

    #[tokio::test]
    async fn test_call_tool_generic_dispatch_infers_subcommand() {
        let runner = ScriptedRunner::new(&[(
            "mr list --assignee=@me",
            ScriptedRunner::ok("[{\"iid\": 1}]"),
        )]);
        let (server, client) =
            create_test_pair(static_service(runner.clone()), ClientInfo::default()).await;

        let ctx = create_test_ctx(&server);
        let result = server
            .service()
            .call_tool(
                call("glab_mr", serde_json::json!({"args": ["list", "--assignee=@me"]})),
                ctx,
            )
            .await
            .unwrap();

        assert_ne!(result.is_error, Some(true));
        assert!(text_of(&result).contains("JSON output"));
        assert_eq!(runner.calls(), vec![vec!["mr", "list", "--assignee=@me"]
            .into_iter()
            .map(String::from)
            .collect::<Vec<_>>()]);

        assert_ok!(server.cancel().await);
        assert_ok!(client.cancel().await);
    }

    #[tokio::test]
    async fn test_call_tool_exclusion_list_passthrough() {
        let runner = ScriptedRunner::new(&[(
            "version --help",
            ScriptedRunner::ok("Show glab version\n"),
        )]);
        let (server, client) =
            create_test_pair(static_service(runner.clone()), ClientInfo::default()).await;

        let ctx = create_test_ctx(&server);
        let result = server
            .service()
            .call_tool(call("glab_version", serde_json::json!({"args": ["--help"]})), ctx)
            .await
            .unwrap();

        assert_ne!(result.is_error, Some(true));
        assert_eq!(
            runner.calls()[0],
            vec!["version".to_string(), "--help".to_string()]
        );

        assert_ok!(server.cancel().await);
        assert_ok!(client.cancel().await);
    }

    #[tokio::test]
    async fn test_call_tool_underscored_name_maps_to_dashed_command() {
        let runner = ScriptedRunner::new(&[("check-update", ScriptedRunner::ok("up to date"))]);
        let (server, client) =
            create_test_pair(static_service(runner.clone()), ClientInfo::default()).await;

        let ctx = create_test_ctx(&server);
        let result = server
            .service()
            .call_tool(call("glab_check_update", serde_json::json!({})), ctx)
            .await
            .unwrap();

        assert_ne!(result.is_error, Some(true));
        assert_eq!(runner.calls()[0], vec!["check-update".to_string()]);

        assert_ok!(server.cancel().await);
        assert_ok!(client.cancel().await);
    }

    #[tokio::test]
    async fn test_call_tool_default_repo_injected() {
        let runner = ScriptedRunner::new(&[(
            "issue list -R group/project",
            ScriptedRunner::ok(""),
        )]);
        let service = GlabService::with_parts(
            runner.clone(),
            Arc::new(StaticCatalog),
            Some("group/project".to_string()),
        );
        let (server, client) = create_test_pair(service, ClientInfo::default()).await;

        let ctx = create_test_ctx(&server);
        let result = server
            .service()
            .call_tool(
                call("glab_issue", serde_json::json!({"subcommand": "list"})),
                ctx,
            )
            .await
            .unwrap();

        assert_ne!(result.is_error, Some(true));
        assert!(text_of(&result).contains("no output"));

        assert_ok!(server.cancel().await);
        assert_ok!(client.cancel().await);
    }

    #[tokio::test]
    async fn test_call_tool_raw_requires_args() {
        let runner = ScriptedRunner::new(&[]);
        let (server, client) =
            create_test_pair(static_service(runner.clone()), ClientInfo::default()).await;

        let ctx = create_test_ctx(&server);
        let result = server
            .service()
            .call_tool(call("glab_raw", serde_json::json!({})), ctx)
            .await;
        assert!(result.is_err(), "empty args must be a protocol error");
        // No subprocess was attempted.
        assert!(runner.calls().is_empty());

        assert_ok!(server.cancel().await);
        assert_ok!(client.cancel().await);
    }

    #[tokio::test]
    async fn test_call_tool_help_lookup() {
        let runner = ScriptedRunner::new(&[(
            "mr create --help",
            ScriptedRunner::ok("Create a merge request\n"),
        )]);
        let (server, client) =
            create_test_pair(static_service(runner.clone()), ClientInfo::default()).await;

        let ctx = create_test_ctx(&server);
        let result = server
            .service()
            .call_tool(
                call("glab_help", serde_json::json!({"command": "mr create"})),
                ctx,
            )
            .await
            .unwrap();
        assert!(text_of(&result).contains("Create a merge request"));

        let ctx = create_test_ctx(&server);
        let missing = server
            .service()
            .call_tool(call("glab_help", serde_json::json!({})), ctx)
            .await;
        assert!(missing.is_err());

        assert_ok!(server.cancel().await);
        assert_ok!(client.cancel().await);
    }

    #[tokio::test]
    async fn test_call_tool_failure_carries_hint() {
        let runner = ScriptedRunner::new(&[(
            "issue list",
            ScriptedRunner::fail("GET https://gitlab.com/api/v4/issues: 401 Unauthorized"),
        )]);
        let (server, client) =
            create_test_pair(static_service(runner), ClientInfo::default()).await;

        let ctx = create_test_ctx(&server);
        let result = server
            .service()
            .call_tool(call("glab_issue", serde_json::json!({"args": ["list"]})), ctx)
            .await
            .unwrap();

        assert_eq!(result.is_error, Some(true));
        let text = text_of(&result);
        assert!(text.contains("exit code 1"));
        assert!(text.contains("authentication failed"));

        assert_ok!(server.cancel().await);
        assert_ok!(client.cancel().await);
    }

    #[tokio::test]
    async fn test_call_tool_unknown_name_rejected() {
        let runner = ScriptedRunner::new(&[]);
        let (server, client) =
            create_test_pair(static_service(runner), ClientInfo::default()).await;

        let ctx = create_test_ctx(&server);
        let result = server
            .service()
            .call_tool(call("other_tool", serde_json::json!({})), ctx)
            .await;
        assert!(result.is_err());

        assert_ok!(server.cancel().await);
        assert_ok!(client.cancel().await);
    }

    #[tokio::test]
    async fn test_discover_tool_rescans() {
        let runner = ScriptedRunner::new(&[]);
        let (server, client) =
            create_test_pair(static_service(runner), ClientInfo::default()).await;

        let ctx = create_test_ctx(&server);
        let result = server
            .service()
            .call_tool(call("glab_discover", serde_json::json!({})), ctx)
            .await
            .unwrap();
        assert!(text_of(&result).contains("Re-discovered"));

        assert_ok!(server.cancel().await);
        assert_ok!(client.cancel().await);
    }

    #[tokio::test]
    async fn test_prompts_roundtrip() {
        let runner = ScriptedRunner::new(&[]);
        let (server, client) =
            create_test_pair(static_service(runner), ClientInfo::default()).await;

        let ctx = create_test_ctx(&server);
        let listed = server.service().list_prompts(None, ctx).await.unwrap();
        assert!(!listed.prompts.is_empty());

        let ctx = create_test_ctx(&server);
        let prompt = server
            .service()
            .get_prompt(
                GetPromptRequestParam {
                    name: "review_merge_request".to_string(),
                    arguments: Some(
                        serde_json::json!({"mr_id": "7"})
                            .as_object()
                            .cloned()
                            .unwrap(),
                    ),
                },
                ctx,
            )
            .await
            .unwrap();
        assert_eq!(prompt.messages.len(), 1);

        assert_ok!(server.cancel().await);
        assert_ok!(client.cancel().await);
    }
}
