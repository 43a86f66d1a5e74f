//! Client for the line-delimited JSON-RPC server.
//!
//! Spawns the server binary as a child process and talks to it over its
//! stdin/stdout. The child's stderr is inherited so its logs stay visible.

use std::path::Path;
use std::process::Stdio;

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tracing::debug;

use crate::rpc::{Method, RpcRequest, RpcResponse};

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// The server answered with something that is not a valid response.
    #[error("Protocol error: {0}")]
    Protocol(String),
    /// The server answered with a JSON-RPC error.
    #[error("{message} (code {code})")]
    Rpc { code: i64, message: String },
    #[error("Server closed the connection")]
    Closed,
}

/// A running server process plus the pipes to talk to it.
pub struct RpcClient {
    child: Child,
    stdin: ChildStdin,
    stdout: Lines<BufReader<ChildStdout>>,
    next_id: u64,
}

impl RpcClient {
    /// Spawn `program` with `args` and connect to its stdio.
    pub fn spawn(program: &Path, args: &[String]) -> Result<Self, ClientError> {
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| ClientError::Protocol("child stdin unavailable".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ClientError::Protocol("child stdout unavailable".into()))?;

        debug!(program = %program.display(), "spawned server");
        Ok(Self {
            child,
            stdin,
            stdout: BufReader::new(stdout).lines(),
            next_id: 1,
        })
    }

    /// Call `method` and return its display text.
    pub async fn call<P: Serialize>(&mut self, method: Method, params: &P) -> Result<String, ClientError> {
        let id = self.next_id;
        self.next_id += 1;

        let request = RpcRequest {
            jsonrpc: Some("2.0".to_string()),
            id: Value::from(id),
            method: method.name().to_string(),
            params: serde_json::to_value(params)
                .map_err(|e| ClientError::Protocol(e.to_string()))?,
        };
        let mut line =
            serde_json::to_string(&request).map_err(|e| ClientError::Protocol(e.to_string()))?;
        line.push('\n');

        self.stdin.write_all(line.as_bytes()).await?;
        self.stdin.flush().await?;

        let reply = self.stdout.next_line().await?.ok_or(ClientError::Closed)?;
        decode_response(&reply, &Value::from(id))
    }

    /// Close the server's stdin and wait for it to exit.
    pub async fn shutdown(mut self) -> Result<(), ClientError> {
        drop(self.stdin);
        self.child.wait().await?;
        Ok(())
    }
}

/// Decode one response line, checking it answers request `id`.
pub fn decode_response(line: &str, id: &Value) -> Result<String, ClientError> {
    let response: RpcResponse = serde_json::from_str(line)
        .map_err(|e| ClientError::Protocol(format!("invalid response: {e}")))?;

    if let Some(error) = response.error {
        return Err(ClientError::Rpc {
            code: error.code,
            message: error.message,
        });
    }
    if response.id != *id {
        return Err(ClientError::Protocol(format!(
            "response id {} does not match request id {id}",
            response.id
        )));
    }
    response
        .result
        .ok_or_else(|| ClientError::Protocol("response has neither result nor error".into()))
}
