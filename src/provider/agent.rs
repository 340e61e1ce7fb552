use std::{env, process::Stdio, sync::Arc};

use async_trait::async_trait;
use futures_util::{future, StreamExt};
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    process::Command,
};
use tokio_stream::wrappers::LinesStream;
use tracing::{debug, warn};

use crate::{
    config::{ProviderConfig, ProviderKind},
    provider::{FragmentStream, ProviderError, TextProvider},
};

/// Tools the delegated agent may use; everything else stays disabled.
pub const ALLOWED_TOOLS: [&str; 2] = ["WebSearch", "Read"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentRequest {
    pub prompt: String,
    pub system: String,
    pub model: String,
    pub allowed_tools: Vec<String>,
    pub api_key: Option<String>,
}

/// An external agent that runs the whole query/tool loop itself and reports
/// progress as a stream of stringified messages.
#[async_trait]
pub trait AgentRunner: Send + Sync {
    async fn run(&self, request: AgentRequest) -> Result<FragmentStream, ProviderError>;
}

pub struct AgentProvider {
    runner: Arc<dyn AgentRunner>,
    model: String,
    api_key: Option<String>,
}

impl AgentProvider {
    pub fn new(runner: Arc<dyn AgentRunner>, config: &ProviderConfig) -> Self {
        Self {
            runner,
            model: config.model.clone(),
            api_key: config.api_key.clone(),
        }
    }
}

#[async_trait]
impl TextProvider for AgentProvider {
    fn name(&self) -> &str {
        ProviderKind::Anthropic.as_str()
    }

    async fn stream_text(&self, prompt: &str, system: &str) -> Result<FragmentStream, ProviderError> {
        let request = AgentRequest {
            prompt: prompt.to_owned(),
            system: system.to_owned(),
            model: self.model.clone(),
            allowed_tools: ALLOWED_TOOLS.iter().map(|tool| (*tool).to_owned()).collect(),
            api_key: self.api_key.clone(),
        };

        let stream = self.runner.run(request).await?;
        Ok(stream
            .filter(|next| future::ready(!matches!(next, Ok(fragment) if fragment.is_empty())))
            .boxed())
    }
}

/// Runs the Claude Code CLI in print mode, one process per query.
#[derive(Debug, Clone)]
pub struct ClaudeCliRunner {
    program: String,
}

impl ClaudeCliRunner {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn from_env() -> Self {
        let program = env::var("RESEARCH_AGENT_CLI")
            .ok()
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| "claude".to_owned());
        Self::new(program)
    }
}

impl Default for ClaudeCliRunner {
    fn default() -> Self {
        Self::new("claude")
    }
}

pub fn command_args(request: &AgentRequest) -> Vec<String> {
    vec![
        "-p".to_owned(),
        request.prompt.clone(),
        "--system-prompt".to_owned(),
        request.system.clone(),
        "--allowedTools".to_owned(),
        request.allowed_tools.join(","),
        "--model".to_owned(),
        request.model.clone(),
        "--output-format".to_owned(),
        "stream-json".to_owned(),
        "--verbose".to_owned(),
    ]
}

#[async_trait]
impl AgentRunner for ClaudeCliRunner {
    async fn run(&self, request: AgentRequest) -> Result<FragmentStream, ProviderError> {
        let mut command = Command::new(&self.program);
        command
            .args(command_args(&request))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        if let Some(api_key) = &request.api_key {
            command.env("ANTHROPIC_API_KEY", api_key);
        }

        let mut child = command
            .spawn()
            .map_err(|error| ProviderError::Agent(format!("failed to start {}: {error}", self.program)))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ProviderError::Agent("agent stdout was not captured".to_owned()))?;

        let program = self.program.clone();
        let mut output = LinesStream::new(BufReader::new(stdout).lines());
        let stream = async_stream::stream! {
            // The child lives inside the stream so dropping the stream kills it.
            let mut child = child;
            let mut failed = false;

            while let Some(next) = output.next().await {
                match next {
                    Ok(line) => {
                        let line = line.trim_end().to_owned();
                        if !line.is_empty() {
                            yield Ok(line);
                        }
                    }
                    Err(error) => {
                        failed = true;
                        yield Err(ProviderError::Read(error.to_string()));
                        break;
                    }
                }
            }

            if !failed {
                match child.wait().await {
                    Ok(status) if status.success() => {}
                    Ok(status) => {
                        warn!(program = %program, %status, "agent exited unsuccessfully");
                        yield Err(ProviderError::Agent(format!("{program} exited with {status}")));
                    }
                    Err(error) => {
                        yield Err(ProviderError::Agent(error.to_string()));
                    }
                }
            }
        };

        debug!(program = %self.program, model = %request.model, "agent process started");
        Ok(stream.boxed())
    }
}

#[cfg(test)]
mod tests {
    use futures_util::stream;
    use tokio::sync::Mutex;

    use super::*;

    #[derive(Default)]
    struct RecordingRunner {
        seen: Mutex<Vec<AgentRequest>>,
    }

    #[async_trait]
    impl AgentRunner for RecordingRunner {
        async fn run(&self, request: AgentRequest) -> Result<FragmentStream, ProviderError> {
            self.seen.lock().await.push(request);
            let items = vec![Ok("first".to_owned()), Ok(String::new()), Ok("second".to_owned())];
            Ok(stream::iter(items).boxed())
        }
    }

    fn agent_config() -> ProviderConfig {
        ProviderConfig {
            kind: ProviderKind::Anthropic,
            api_key: Some("sk-ant-test".to_owned()),
            base_url: None,
            model: "claude-test".to_owned(),
        }
    }

    #[tokio::test]
    async fn agent_provider_uses_fixed_tool_allowlist_and_drops_empty_chunks() {
        let runner = Arc::new(RecordingRunner::default());
        let provider = AgentProvider::new(runner.clone(), &agent_config());

        let fragments = provider
            .stream_text("what is entropy?", "be nerdy")
            .await
            .expect("runner should start")
            .map(|item| item.expect("fragment"))
            .collect::<Vec<_>>()
            .await;
        assert_eq!(fragments, vec!["first", "second"]);

        let seen = runner.seen.lock().await;
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].allowed_tools, vec!["WebSearch", "Read"]);
        assert_eq!(seen[0].system, "be nerdy");
        assert_eq!(seen[0].model, "claude-test");
        assert_eq!(seen[0].api_key.as_deref(), Some("sk-ant-test"));
    }

    #[test]
    fn cli_arguments_carry_prompt_and_allowlist() {
        let request = AgentRequest {
            prompt: "topic".to_owned(),
            system: "system".to_owned(),
            model: "claude-test".to_owned(),
            allowed_tools: vec!["WebSearch".to_owned(), "Read".to_owned()],
            api_key: None,
        };
        let args = command_args(&request);
        assert_eq!(&args[..2], ["-p", "topic"]);
        let tools = args.iter().position(|arg| arg == "--allowedTools").expect("allowlist flag");
        assert_eq!(args[tools + 1], "WebSearch,Read");
        assert!(args.windows(2).any(|pair| pair == ["--output-format", "stream-json"]));
    }

    fn cli_request() -> AgentRequest {
        AgentRequest {
            prompt: "topic".to_owned(),
            system: "sys".to_owned(),
            model: "claude-test".to_owned(),
            allowed_tools: vec!["WebSearch".to_owned(), "Read".to_owned()],
            api_key: None,
        }
    }

    #[tokio::test]
    #[serial_test::serial(agent_process)]
    async fn missing_agent_binary_is_a_start_failure() {
        let runner = ClaudeCliRunner::new("nerd-agent-binary-that-does-not-exist");
        let error = runner.run(cli_request()).await.err().expect("spawn should fail");
        assert!(matches!(error, ProviderError::Agent(_)));
    }

    #[cfg(unix)]
    fn write_script(dir: &tempfile::TempDir, body: &str) -> String {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.path().join("fake-agent.sh");
        std::fs::write(&path, format!("#!/bin/sh\n{body}")).expect("write agent script");
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).expect("chmod agent script");
        path.to_string_lossy().into_owned()
    }

    #[cfg(unix)]
    #[tokio::test]
    #[serial_test::serial(agent_process)]
    async fn agent_stdout_lines_become_fragments_and_exit_code_is_reported() {
        let dir = tempfile::tempdir().expect("tempdir");
        let program = write_script(
            &dir,
            "echo \"args: $1 $2 $3 $4 $5 $6\"\necho\necho '{\"type\":\"result\"}'\nexit 3\n",
        );

        let items = ClaudeCliRunner::new(program.clone())
            .run(cli_request())
            .await
            .expect("script should start")
            .collect::<Vec<_>>()
            .await;

        assert_eq!(items.len(), 3, "unexpected items: {items:?}");
        assert_eq!(
            items[0].as_deref().expect("first line"),
            "args: -p topic --system-prompt sys --allowedTools WebSearch,Read"
        );
        assert_eq!(items[1].as_deref().expect("second line"), "{\"type\":\"result\"}");
        match &items[2] {
            Err(ProviderError::Agent(message)) => {
                assert!(message.starts_with(&program), "message: {message}");
                assert!(message.ends_with("exit status: 3"), "message: {message}");
            }
            other => panic!("expected exit failure, got {other:?}"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    #[serial_test::serial(agent_process)]
    async fn agent_key_reaches_the_child_environment() {
        let dir = tempfile::tempdir().expect("tempdir");
        let program = write_script(&dir, "echo \"key=$ANTHROPIC_API_KEY\"\n");
        let mut request = cli_request();
        request.api_key = Some("sk-ant-child".to_owned());

        let items = ClaudeCliRunner::new(program)
            .run(request)
            .await
            .expect("script should start")
            .collect::<Vec<_>>()
            .await;

        assert_eq!(items.len(), 1, "unexpected items: {items:?}");
        assert_eq!(items[0].as_deref().expect("line"), "key=sk-ant-child");
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    #[serial_test::serial(agent_process)]
    async fn dropping_the_stream_kills_the_agent() {
        use std::time::Duration;

        let dir = tempfile::tempdir().expect("tempdir");
        let pid_file = dir.path().join("agent.pid");
        let program = write_script(
            &dir,
            &format!("echo $$ > '{}'\necho started\nexec sleep 30\n", pid_file.display()),
        );

        let mut stream = ClaudeCliRunner::new(program)
            .run(cli_request())
            .await
            .expect("script should start");
        let first = tokio::time::timeout(Duration::from_secs(5), stream.next())
            .await
            .expect("first line within timeout")
            .expect("stream item")
            .expect("fragment");
        assert_eq!(first, "started");

        let pid = std::fs::read_to_string(&pid_file).expect("pid file");
        let stat = format!("/proc/{}/stat", pid.trim());
        drop(stream);

        // Gone, or a zombie waiting to be reaped, both mean the process stopped.
        let mut stopped = false;
        for _ in 0..50 {
            match std::fs::read_to_string(&stat) {
                Err(_) => stopped = true,
                Ok(fields) => {
                    stopped = fields
                        .rsplit_once(") ")
                        .is_some_and(|(_, rest)| rest.starts_with('Z'));
                }
            }
            if stopped {
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        assert!(stopped, "agent process {} still running", pid.trim());
    }
}
