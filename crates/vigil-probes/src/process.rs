//! External-command probes.
//!
//! The probe receives `{check_id, params, context}` as JSON on stdin and
//! answers with a JSON document on stdout. A non-zero exit is a probe
//! failure; anything on stdout that is not JSON is invalid output.

use std::io::ErrorKind;
use std::process::Stdio;

use async_trait::async_trait;
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;
use vigil_core::{CommandRunner, ExecutionContext, Invocation, PluginError, PluginOutput};

/// Longest stderr excerpt carried into a failure message.
const STDERR_EXCERPT_CHARS: usize = 512;

/// Document written to the probe's stdin.
#[derive(Debug, Serialize)]
pub struct ProbeRequest<'a> {
    pub check_id: &'a str,
    pub params: &'a serde_json::Value,
    pub context: &'a ExecutionContext,
}

impl<'a> ProbeRequest<'a> {
    pub fn from_invocation(inv: &'a Invocation) -> Self {
        Self {
            check_id: inv.definition.id.as_str(),
            params: inv.params(),
            context: &inv.context,
        }
    }
}

/// Runs probes as child processes.
///
/// Children are spawned with `kill_on_drop`, so a probe abandoned by the
/// scheduler on timeout is killed along with its task.
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner;

impl ProcessRunner {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(
        &self,
        command: &[String],
        invocation: &Invocation,
    ) -> Result<PluginOutput, PluginError> {
        let (exe, args) = command
            .split_first()
            .ok_or_else(|| PluginError::Failed("empty command".to_string()))?;

        let payload = serde_json::to_vec(&ProbeRequest::from_invocation(invocation))
            .map_err(|e| PluginError::Failed(format!("failed to encode probe request: {e}")))?;

        let mut child = Command::new(exe)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;
        debug!(check_id = %invocation.definition.id, exe = %exe, "probe process spawned");

        let stdin = child.stdin.take();
        let feed = async move {
            if let Some(mut stdin) = stdin {
                stdin.write_all(&payload).await?;
                stdin.shutdown().await?;
            }
            Ok::<(), std::io::Error>(())
        };

        let run = async {
            let (fed, output) = tokio::join!(feed, child.wait_with_output());
            match fed {
                // The probe may exit without reading its input.
                Err(e) if e.kind() != ErrorKind::BrokenPipe => return Err(PluginError::Io(e)),
                _ => {}
            }
            Ok(output?)
        };

        let output = tokio::select! {
            biased;
            _ = invocation.cancel.cancelled() => return Err(PluginError::Cancelled),
            output = run => output?,
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(PluginError::Failed(format!(
                "{} exited with {}: {}",
                exe,
                output.status,
                excerpt(&stderr)
            )));
        }

        let value: serde_json::Value = serde_json::from_slice(&output.stdout)
            .map_err(|e| PluginError::InvalidOutput(format!("stdout is not JSON: {e}")))?;
        PluginOutput::from_json(value)
    }
}

/// Tail of `text`, at most [`STDERR_EXCERPT_CHARS`] characters, trimmed.
fn excerpt(text: &str) -> &str {
    let text = text.trim();
    match text.char_indices().rev().nth(STDERR_EXCERPT_CHARS - 1) {
        Some((idx, _)) => &text[idx..],
        None => text,
    }
}
