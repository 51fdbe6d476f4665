//! Stdio provider - spawns a provider process and speaks JSON lines
//!
//! Requests are single-line JSON objects written to the provider's stdin:
//! `{"op":"catalog"}` and `{"op":"call","tool":"search","args":{...}}`.
//! Each is answered with one line on stdout: `{"ok": <value>}` on success
//! or `{"error": "<message>"}` on failure. The catalog reply's `ok` value
//! carries `{"tools": [...]}` (see [`ToolCatalog`]).

use crate::core::config::ProviderLocator;
use crate::provider::{ProviderError, ToolCatalog, ToolProvider};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{debug, warn};

/// How long the initial catalog handshake may take
const HANDSHAKE_TIMEOUT_SECS: u64 = 30;

/// How long to wait for a clean exit before killing the process
const EXIT_TIMEOUT_SECS: u64 = 5;

#[derive(Debug, Serialize)]
#[serde(tag = "op", rename_all = "lowercase")]
enum Request<'a> {
    Catalog,
    Call {
        tool: &'a str,
        args: &'a Map<String, Value>,
    },
}

#[derive(Debug, Deserialize)]
struct Reply {
    #[serde(default)]
    ok: Option<Value>,
    #[serde(default)]
    error: Option<String>,
}

struct ProviderIo {
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
}

/// Provider handle backed by a child process with JSON-line stdio
pub struct StdioProvider {
    name: String,
    catalog: ToolCatalog,
    call_timeout: Duration,
    /// None once the provider has been shut down
    io: Mutex<Option<ProviderIo>>,
}

impl StdioProvider {
    /// Spawn the provider process and perform the catalog handshake
    ///
    /// # Errors
    /// Returns `ProviderError::Spawn` if the process cannot be started and
    /// `ProviderError::Handshake` if the catalog exchange fails.
    pub async fn connect(name: &str, locator: &ProviderLocator) -> Result<Self, ProviderError> {
        debug!(
            "Spawning provider '{}': {} {:?}",
            name, locator.command, locator.args
        );

        let mut child = Command::new(&locator.command)
            .args(&locator.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ProviderError::Spawn(format!("{}: {}", locator.command, e)))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| ProviderError::Spawn("stdin not captured".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ProviderError::Spawn("stdout not captured".to_string()))?;

        let mut io = ProviderIo {
            child,
            stdin,
            stdout: BufReader::new(stdout),
        };

        let raw = request(
            &mut io,
            &Request::Catalog,
            Duration::from_secs(HANDSHAKE_TIMEOUT_SECS),
        )
        .await
        .map_err(|e| ProviderError::Handshake(e.to_string()))?;

        let catalog: ToolCatalog = serde_json::from_value(raw)
            .map_err(|e| ProviderError::Handshake(format!("invalid catalog: {}", e)))?;

        debug!("Provider '{}' exposes {} tool(s)", name, catalog.len());

        Ok(Self {
            name: name.to_string(),
            catalog,
            call_timeout: Duration::from_secs(locator.timeout_secs),
            io: Mutex::new(Some(io)),
        })
    }
}

/// Send one request and read one reply line, within a time limit
async fn request(
    io: &mut ProviderIo,
    request: &Request<'_>,
    limit: Duration,
) -> Result<Value, ProviderError> {
    let mut line = serde_json::to_string(request)
        .map_err(|e| ProviderError::Protocol(format!("encode failed: {}", e)))?;
    line.push('\n');

    timeout(limit, async {
        io.stdin
            .write_all(line.as_bytes())
            .await
            .map_err(|e| ProviderError::Protocol(format!("write failed: {}", e)))?;
        io.stdin
            .flush()
            .await
            .map_err(|e| ProviderError::Protocol(format!("flush failed: {}", e)))?;

        let mut reply_line = String::new();
        let read = io
            .stdout
            .read_line(&mut reply_line)
            .await
            .map_err(|e| ProviderError::Protocol(format!("read failed: {}", e)))?;
        if read == 0 {
            return Err(ProviderError::Protocol(
                "provider closed its stdout".to_string(),
            ));
        }

        let reply: Reply = serde_json::from_str(reply_line.trim())
            .map_err(|e| ProviderError::Protocol(format!("malformed reply: {}", e)))?;

        match (reply.ok, reply.error) {
            (_, Some(message)) => Err(ProviderError::Tool(message)),
            (Some(value), None) => Ok(value),
            (None, None) => Err(ProviderError::Protocol(
                "reply carries neither ok nor error".to_string(),
            )),
        }
    })
    .await
    .map_err(|_| ProviderError::Timeout(limit.as_secs()))?
}

#[async_trait]
impl ToolProvider for StdioProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn catalog(&self) -> &ToolCatalog {
        &self.catalog
    }

    async fn call(&self, tool: &str, args: Map<String, Value>) -> Result<Value, ProviderError> {
        let mut guard = self.io.lock().await;
        let io = guard
            .as_mut()
            .ok_or_else(|| ProviderError::Protocol("provider already shut down".to_string()))?;

        debug!("Calling {}.{}", self.name, tool);
        request(io, &Request::Call { tool, args: &args }, self.call_timeout).await
    }

    async fn shutdown(&self) -> Result<(), ProviderError> {
        let mut guard = self.io.lock().await;
        let Some(io) = guard.take() else {
            return Ok(());
        };

        let ProviderIo {
            mut child,
            stdin,
            stdout: _stdout,
        } = io;

        // Closing stdin asks the provider to exit
        drop(stdin);

        match timeout(Duration::from_secs(EXIT_TIMEOUT_SECS), child.wait()).await {
            Ok(Ok(status)) => {
                debug!("Provider '{}' exited: {}", self.name, status);
                Ok(())
            }
            Ok(Err(e)) => Err(ProviderError::Protocol(format!("wait failed: {}", e))),
            Err(_) => {
                warn!("Provider '{}' did not exit in time, killing", self.name);
                child
                    .kill()
                    .await
                    .map_err(|e| ProviderError::Protocol(format!("kill failed: {}", e)))
            }
        }
    }
}
