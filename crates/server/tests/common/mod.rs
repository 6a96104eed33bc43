use anyhow::Context as _;
use serde_json::{Value, json};
use std::process::{ExitStatus, Output, Stdio};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt as _, AsyncWriteExt as _, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};

const KIMAI_ENV: [&str; 8] = [
    "KIMAI_BASE_URL",
    "KIMAI_TOKEN",
    "KIMAI_API_TOKEN",
    "KIMAI_USER",
    "KIMAI_TIMEOUT_SECS",
    "KIMAI_RETRY_BACKOFF_MS",
    "KIMAI_MCP_MAX_CONCURRENT_CALLS",
    "RUST_LOG",
];

fn command(envs: &[(&str, &str)]) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_kimai-mcp"));
    for key in KIMAI_ENV {
        cmd.env_remove(key);
    }
    cmd.envs(envs.iter().copied())
        .arg("--log-level")
        .arg("debug")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .kill_on_drop(true);
    cmd
}

/// Run the binary to completion with empty stdin.
pub async fn run_to_exit(envs: &[(&str, &str)]) -> anyhow::Result<Output> {
    let child = command(envs)
        .stderr(Stdio::piped())
        .spawn()
        .context("spawn kimai-mcp")?;
    tokio::time::timeout(Duration::from_secs(20), child.wait_with_output())
        .await
        .context("kimai-mcp did not exit")?
        .context("wait for kimai-mcp")
}

/// A running `kimai-mcp` process spoken to over its stdio.
pub struct StdioSession {
    child: Child,
    stdin: Option<ChildStdin>,
    stdout: Lines<BufReader<ChildStdout>>,
}

impl StdioSession {
    pub fn spawn(envs: &[(&str, &str)]) -> anyhow::Result<Self> {
        let mut child = command(envs)
            .stderr(Stdio::null())
            .spawn()
            .context("spawn kimai-mcp")?;
        let stdin = child.stdin.take().context("child stdin")?;
        let stdout = child.stdout.take().context("child stdout")?;
        Ok(Self {
            child,
            stdin: Some(stdin),
            stdout: BufReader::new(stdout).lines(),
        })
    }

    pub async fn send(&mut self, message: &Value) -> anyhow::Result<()> {
        let stdin = self.stdin.as_mut().context("stdin already closed")?;
        let mut line = serde_json::to_vec(message)?;
        line.push(b'\n');
        stdin.write_all(&line).await.context("write request")?;
        stdin.flush().await.context("flush request")?;
        Ok(())
    }

    /// Send a request and wait for the response carrying the same id.
    pub async fn request(&mut self, id: i64, method: &str, params: Value) -> anyhow::Result<Value> {
        self.send(&json!({"jsonrpc": "2.0", "id": id, "method": method, "params": params}))
            .await?;
        loop {
            let msg = self.next_message().await?;
            if msg.get("id") == Some(&json!(id)) {
                return Ok(msg);
            }
        }
    }

    pub async fn next_message(&mut self) -> anyhow::Result<Value> {
        let line = tokio::time::timeout(Duration::from_secs(20), self.stdout.next_line())
            .await
            .context("timed out waiting for kimai-mcp output")?
            .context("read kimai-mcp stdout")?
            .context("kimai-mcp closed stdout")?;
        serde_json::from_str(&line).with_context(|| format!("non-JSON line: {line}"))
    }

    pub async fn initialize(&mut self) -> anyhow::Result<Value> {
        let init = self
            .request(
                0,
                "initialize",
                json!({
                    "protocolVersion": "2025-06-18",
                    "capabilities": {},
                    "clientInfo": {"name": "kimai-mcp-tests", "version": "0"}
                }),
            )
            .await?;
        self.send(&json!({"jsonrpc": "2.0", "method": "notifications/initialized"}))
            .await?;
        Ok(init)
    }

    /// Close stdin and wait for the process to exit on its own.
    pub async fn close(mut self) -> anyhow::Result<ExitStatus> {
        drop(self.stdin.take());
        tokio::time::timeout(Duration::from_secs(20), self.child.wait())
            .await
            .context("kimai-mcp did not exit after EOF")?
            .context("wait for kimai-mcp")
    }
}

/// `result.structuredContent.body` of a `tools/call` response.
pub fn tool_body(msg: &Value) -> anyhow::Result<&Value> {
    msg.get("result")
        .and_then(|r| r.get("structuredContent"))
        .and_then(|s| s.get("body"))
        .with_context(|| format!("tools/call response without structuredContent.body: {msg}"))
}
