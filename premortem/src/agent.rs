//! Diagnostic sessions.
//!
//! A session is a lazy stream of `AgentMessage`s ending with a `result` message. The
//! production agent drives the `claude` CLI in stream-json mode: the prompt goes in on
//! stdin, one JSON object per stdout line comes back.

use std::path::PathBuf;
use std::process::Stdio;

use async_stream::try_stream;
use futures::stream::{BoxStream, Stream};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tracing::{debug, info};

use crate::config::AgentConfig;
use crate::error::AgentError;
use crate::types::AgentMessage;

pub type AgentStream = BoxStream<'static, Result<AgentMessage, AgentError>>;

#[derive(Debug, Clone)]
pub struct SessionRequest {
    pub prompt: String,
    pub api_key: String,
    pub config: AgentConfig,
    pub working_dir: PathBuf,
}

pub trait DiagnosticAgent: Send + Sync {
    /// Nothing runs until the returned stream is first polled.
    fn start(&self, request: SessionRequest) -> AgentStream;
}

#[derive(Debug, Clone, Default)]
pub struct ClaudeCliAgent;

impl DiagnosticAgent for ClaudeCliAgent {
    fn start(&self, request: SessionRequest) -> AgentStream {
        Box::pin(run_cli(request))
    }
}

fn run_cli(request: SessionRequest) -> impl Stream<Item = Result<AgentMessage, AgentError>> {
    try_stream! {
        let command = request.config.command().to_string();
        let mut child = Command::new(&command)
            .args(cli_args(&request.config))
            // key goes to the child only, never into our own environment
            .env("ANTHROPIC_API_KEY", &request.api_key)
            .current_dir(&request.working_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| AgentError::Spawn { command: command.clone(), source })?;
        info!("Starting Claude agent...");

        if let Some(mut stdin) = child.stdin.take() {
            match stdin.write_all(request.prompt.as_bytes()).await {
                // agent may exit without reading its prompt; its exit status tells the story
                Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => {}
                other => other?,
            }
        }

        let stdout = child.stdout.take().ok_or_else(|| {
            std::io::Error::other("agent stdout not captured")
        })?;
        let mut lines = BufReader::new(stdout).lines();
        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            let msg = AgentMessage::from_line(line.trim())?;
            log_progress(&msg);
            yield msg;
        }

        let status = child.wait().await?;
        if !status.success() {
            Err::<(), _>(AgentError::Exited(status))?;
        }
    }
}

fn cli_args(config: &AgentConfig) -> Vec<String> {
    let mut args: Vec<String> = ["--print", "--output-format", "stream-json", "--verbose"]
        .into_iter()
        .map(String::from)
        .collect();
    if let Some(model) = &config.model {
        args.push("--model".into());
        args.push(model.clone());
    }
    if let Some(turns) = config.max_turns {
        args.push("--max-turns".into());
        args.push(turns.to_string());
    }
    args
}

fn log_progress(msg: &AgentMessage) {
    match msg.kind() {
        "system" if msg.get("subtype").and_then(Value::as_str) == Some("init") => {
            info!("Agent session started")
        }
        "assistant" => {
            for name in tool_uses(msg) {
                info!("Tool used: {name}");
            }
        }
        AgentMessage::RESULT => info!("Agent completed"),
        other => debug!("agent message: {other}"),
    }
}

fn tool_uses(msg: &AgentMessage) -> impl Iterator<Item = &str> {
    msg.get("message")
        .and_then(|m| m.get("content"))
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter(|block| block.get("type").and_then(Value::as_str) == Some("tool_use"))
        .filter_map(|block| block.get("name").and_then(Value::as_str))
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use serde_json::json;

    #[test]
    fn default_args() {
        assert_eq!(
            cli_args(&AgentConfig::default()),
            vec!["--print", "--output-format", "stream-json", "--verbose"]
        );
    }

    #[test]
    fn model_and_turns_args() {
        let cfg = AgentConfig {
            model: Some("claude-sonnet-4".into()),
            max_turns: Some(8),
            ..AgentConfig::default()
        };
        let args = cli_args(&cfg);
        assert_eq!(&args[4..], ["--model", "claude-sonnet-4", "--max-turns", "8"]);
    }

    #[test]
    fn finds_tool_use_blocks() {
        let msg = AgentMessage::from_value(json!({
            "type": "assistant",
            "message": {"content": [
                {"type": "text", "text": "looking"},
                {"type": "tool_use", "name": "Bash", "input": {"command": "ps aux"}},
                {"type": "tool_use", "name": "Read"}
            ]}
        }))
        .unwrap();
        assert_eq!(tool_uses(&msg).collect::<Vec<_>>(), vec!["Bash", "Read"]);
    }

    #[test]
    fn string_content_has_no_tool_uses() {
        let msg = AgentMessage::from_value(json!({
            "type": "assistant",
            "message": {"role": "assistant", "content": "plain text"}
        }))
        .unwrap();
        assert_eq!(tool_uses(&msg).count(), 0);
    }

    #[tokio::test]
    async fn missing_command_is_a_spawn_error() {
        let td = tempfile::tempdir().unwrap();
        let request = SessionRequest {
            prompt: "p".into(),
            api_key: "k".into(),
            config: AgentConfig {
                command: Some("/nonexistent/premortem-agent".into()),
                ..AgentConfig::default()
            },
            working_dir: td.path().to_path_buf(),
        };
        let mut stream = ClaudeCliAgent.start(request);
        let first = stream.next().await.unwrap();
        assert!(matches!(first, Err(AgentError::Spawn { .. })));
        assert!(stream.next().await.is_none());
    }

    #[cfg(unix)]
    mod scripted {
        use super::*;
        use std::os::unix::fs::PermissionsExt;
        use std::path::Path;

        fn script(dir: &Path, body: &str) -> String {
            let path = dir.join("fake-agent.sh");
            std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
            path.to_string_lossy().into_owned()
        }

        fn request(dir: &Path, command: String) -> SessionRequest {
            SessionRequest {
                prompt: "diagnose please".into(),
                api_key: "sk-script".into(),
                config: AgentConfig {
                    command: Some(command),
                    ..AgentConfig::default()
                },
                working_dir: dir.to_path_buf(),
            }
        }

        #[tokio::test]
        async fn streams_lines_in_order() {
            let td = tempfile::tempdir().unwrap();
            let cmd = script(
                td.path(),
                r#"cat > /dev/null
echo '{"type":"system","subtype":"init","session_id":"s-1"}'
echo ''
echo '{"type":"assistant","session_id":"s-1","message":{"content":"hi"}}'
echo '{"type":"result","session_id":"s-1","result":"done"}'"#,
            );
            let msgs: Vec<_> = ClaudeCliAgent.start(request(td.path(), cmd)).collect().await;
            let kinds: Vec<_> = msgs
                .iter()
                .map(|m| m.as_ref().unwrap().kind().to_string())
                .collect();
            assert_eq!(kinds, vec!["system", "assistant", "result"]);
        }

        #[tokio::test]
        async fn child_sees_prompt_key_and_cwd() {
            let td = tempfile::tempdir().unwrap();
            let cmd = script(
                td.path(),
                r#"prompt=$(cat)
printf '{"type":"result","prompt":"%s","key":"%s","cwd":"%s","args":"%s"}\n' "$prompt" "$ANTHROPIC_API_KEY" "$(pwd)" "$*""#,
            );
            let msgs: Vec<_> = ClaudeCliAgent.start(request(td.path(), cmd)).collect().await;
            let msg = msgs[0].as_ref().unwrap();
            assert_eq!(msg.get("prompt"), Some(&json!("diagnose please")));
            assert_eq!(msg.get("key"), Some(&json!("sk-script")));
            assert_eq!(
                msg.get("args"),
                Some(&json!("--print --output-format stream-json --verbose"))
            );
            let cwd = msg.get("cwd").and_then(Value::as_str).unwrap();
            assert_eq!(
                Path::new(cwd).canonicalize().unwrap(),
                td.path().canonicalize().unwrap()
            );
        }

        #[tokio::test]
        async fn nonzero_exit_is_an_error_after_messages() {
            let td = tempfile::tempdir().unwrap();
            let cmd = script(
                td.path(),
                r#"echo '{"type":"system","session_id":"s-2"}'
exit 3"#,
            );
            let msgs: Vec<_> = ClaudeCliAgent.start(request(td.path(), cmd)).collect().await;
            assert_eq!(msgs.len(), 2);
            assert!(msgs[0].is_ok());
            assert!(matches!(msgs[1], Err(AgentError::Exited(_))));
        }

        #[tokio::test]
        async fn malformed_line_ends_the_stream() {
            let td = tempfile::tempdir().unwrap();
            let cmd = script(
                td.path(),
                r#"echo 'garbage'
echo '{"type":"result"}'"#,
            );
            let msgs: Vec<_> = ClaudeCliAgent.start(request(td.path(), cmd)).collect().await;
            assert_eq!(msgs.len(), 1);
            assert!(matches!(msgs[0], Err(AgentError::Malformed(_))));
        }
    }
}
