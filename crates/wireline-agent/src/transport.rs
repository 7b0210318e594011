// SPDX-FileCopyrightText: 2026 Wireline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Line-framed JSON-RPC 2.0 transport over the agent child's stdio.
//!
//! The reader task classifies every stdout line and either fulfills a
//! pending request or posts the event to the session manager's channel. It
//! never calls back into the session manager directly, so it can never
//! deadlock against the orchestrator lock. Stderr lines are surfaced as
//! warnings only. Abnormal exit rejects all pending requests with a
//! terminal error.

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::time::Duration;

use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::{debug, error, info, warn};
use wireline_core::WirelineError;

use crate::protocol::{
    self, ClientInfo, Incoming, OutgoingErrorResponse, OutgoingNotification, OutgoingRequest,
    OutgoingResponse, RpcErrorBody,
};

const JSONRPC: &str = "2.0";
const STOP_GRACE: Duration = Duration::from_secs(5);

/// Events the transport posts to its subscriber (the session manager).
#[derive(Debug)]
pub enum AgentEvent {
    /// A notification from the agent.
    Notification { method: String, params: Value },
    /// A server-initiated request that must be answered via
    /// [`CodexTransport::respond`] or [`CodexTransport::respond_error`].
    ServerRequest {
        id: Value,
        method: String,
        params: Value,
    },
    /// The child exited (or closed stdout) outside of a requested stop.
    Exited { detail: String },
}

type PendingMap = HashMap<i64, oneshot::Sender<Result<Value, WirelineError>>>;

struct Inner {
    binary_path: String,
    working_dir: String,
    default_timeout: Duration,
    events_tx: mpsc::Sender<AgentEvent>,
    next_id: AtomicI64,
    /// Bumped on every stop so a stale reader's EOF handling is a no-op.
    generation: AtomicU64,
    pending: StdMutex<PendingMap>,
    stdin: Mutex<Option<ChildStdin>>,
    child: Mutex<Option<Child>>,
}

/// JSON-RPC transport bound to the agent child process.
#[derive(Clone)]
pub struct CodexTransport {
    inner: Arc<Inner>,
}

impl CodexTransport {
    /// Creates a stopped transport. Events for the lifetime of every child
    /// are posted to `events_tx`.
    pub fn new(
        binary_path: impl Into<String>,
        working_dir: impl Into<String>,
        default_timeout: Duration,
        events_tx: mpsc::Sender<AgentEvent>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                binary_path: binary_path.into(),
                working_dir: working_dir.into(),
                default_timeout,
                events_tx,
                next_id: AtomicI64::new(1),
                generation: AtomicU64::new(0),
                pending: StdMutex::new(HashMap::new()),
                stdin: Mutex::new(None),
                child: Mutex::new(None),
            }),
        }
    }

    /// Spawns the child, starts the reader tasks, and performs the
    /// `initialize` handshake.
    pub async fn start(&self) -> Result<(), WirelineError> {
        let mut child = Command::new(&self.inner.binary_path)
            .current_dir(&self.inner.working_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| WirelineError::Agent {
                message: format!("failed to spawn {}: {e}", self.inner.binary_path),
                source: Some(Box::new(e)),
            })?;

        let stdout = child.stdout.take().ok_or_else(|| WirelineError::Agent {
            message: "child stdout not captured".into(),
            source: None,
        })?;
        let stderr = child.stderr.take().ok_or_else(|| WirelineError::Agent {
            message: "child stderr not captured".into(),
            source: None,
        })?;
        let stdin = child.stdin.take().ok_or_else(|| WirelineError::Agent {
            message: "child stdin not captured".into(),
            source: None,
        })?;

        info!(
            binary = self.inner.binary_path.as_str(),
            pid = child.id(),
            "agent child spawned"
        );

        *self.inner.stdin.lock().await = Some(stdin);
        *self.inner.child.lock().await = Some(child);
        let generation = self.inner.generation.load(Ordering::SeqCst);

        // Stderr is surfaced as warnings only.
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                warn!(line = line.as_str(), "agent stderr");
            }
        });

        let inner = self.inner.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => inner.dispatch_line(&line).await,
                    Ok(None) => break,
                    Err(e) => {
                        error!(error = %e, "agent stdout read failed");
                        break;
                    }
                }
            }
            // Only the reader of the current child reports the exit.
            if inner.generation.load(Ordering::SeqCst) == generation {
                let detail = "agent process closed its stdout".to_string();
                inner.fail_all_pending(&detail);
                let _ = inner
                    .events_tx
                    .send(AgentEvent::Exited {
                        detail: detail.clone(),
                    })
                    .await;
                warn!(detail = detail.as_str(), "agent child gone");
            }
        });

        let client_info = ClientInfo {
            name: "wireline",
            version: env!("CARGO_PKG_VERSION"),
        };
        self.request(
            protocol::methods::INITIALIZE,
            serde_json::json!({ "clientInfo": client_info }),
            None,
        )
        .await?;
        self.notify(protocol::methods::INITIALIZED, serde_json::json!({}))
            .await?;
        Ok(())
    }

    /// Terminates the child with SIGTERM, escalating after a grace period.
    ///
    /// Pending requests are rejected; a stop is never reported as an
    /// abnormal exit.
    pub async fn stop(&self) {
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
        self.inner.fail_all_pending("agent transport stopped");
        *self.inner.stdin.lock().await = None;

        let child = self.inner.child.lock().await.take();
        let Some(mut child) = child else {
            return;
        };

        if let Some(pid) = child.id() {
            let _ = nix::sys::signal::kill(
                nix::unistd::Pid::from_raw(pid as i32),
                nix::sys::signal::Signal::SIGTERM,
            );
        }
        match tokio::time::timeout(STOP_GRACE, child.wait()).await {
            Ok(Ok(status)) => debug!(status = %status, "agent child exited"),
            Ok(Err(e)) => warn!(error = %e, "failed to reap agent child"),
            Err(_) => {
                warn!("agent child ignored SIGTERM, killing");
                let _ = child.start_kill();
                let _ = child.wait().await;
            }
        }
    }

    /// Whether a child is currently attached.
    pub async fn is_running(&self) -> bool {
        self.inner.child.lock().await.is_some()
    }

    /// Issues a request and awaits its response.
    pub async fn request(
        &self,
        method: &str,
        params: Value,
        timeout: Option<Duration>,
    ) -> Result<Value, WirelineError> {
        let timeout = timeout.unwrap_or(self.inner.default_timeout);
        let id = self.inner.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        self.inner
            .pending
            .lock()
            .expect("pending map poisoned")
            .insert(id, tx);

        let line = serde_json::to_string(&OutgoingRequest {
            jsonrpc: JSONRPC,
            id,
            method,
            params,
        })
        .map_err(|e| WirelineError::Internal(format!("request failed to encode: {e}")))?;

        if let Err(e) = self.write_line(&line).await {
            self.inner
                .pending
                .lock()
                .expect("pending map poisoned")
                .remove(&id);
            return Err(e);
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(WirelineError::Agent {
                message: format!("request {method} dropped: transport closed"),
                source: None,
            }),
            Err(_) => {
                self.inner
                    .pending
                    .lock()
                    .expect("pending map poisoned")
                    .remove(&id);
                Err(WirelineError::Timeout { duration: timeout })
            }
        }
    }

    /// Sends a fire-and-forget notification.
    pub async fn notify(&self, method: &str, params: Value) -> Result<(), WirelineError> {
        let line = serde_json::to_string(&OutgoingNotification {
            jsonrpc: JSONRPC,
            method,
            params,
        })
        .map_err(|e| WirelineError::Internal(format!("notification failed to encode: {e}")))?;
        self.write_line(&line).await
    }

    /// Answers a server-initiated request.
    pub async fn respond(&self, id: Value, result: Value) -> Result<(), WirelineError> {
        let line = serde_json::to_string(&OutgoingResponse {
            jsonrpc: JSONRPC,
            id,
            result,
        })
        .map_err(|e| WirelineError::Internal(format!("response failed to encode: {e}")))?;
        self.write_line(&line).await
    }

    /// Answers a server-initiated request with a JSON-RPC error.
    pub async fn respond_error(
        &self,
        id: Value,
        code: i64,
        message: impl Into<String>,
        data: Option<Value>,
    ) -> Result<(), WirelineError> {
        let line = serde_json::to_string(&OutgoingErrorResponse {
            jsonrpc: JSONRPC,
            id,
            error: RpcErrorBody {
                code,
                message: message.into(),
                data,
            },
        })
        .map_err(|e| WirelineError::Internal(format!("error response failed to encode: {e}")))?;
        self.write_line(&line).await
    }

    async fn write_line(&self, line: &str) -> Result<(), WirelineError> {
        let mut guard = self.inner.stdin.lock().await;
        let stdin = guard.as_mut().ok_or_else(|| WirelineError::Agent {
            message: "agent transport is not running".into(),
            source: None,
        })?;
        let write = async {
            stdin.write_all(line.as_bytes()).await?;
            stdin.write_all(b"\n").await?;
            stdin.flush().await
        };
        write.await.map_err(|e| {
            self.inner.fail_all_pending("agent stdin write failed");
            WirelineError::Agent {
                message: format!("agent stdin write failed: {e}"),
                source: Some(Box::new(e)),
            }
        })
    }
}

impl Inner {
    async fn dispatch_line(&self, line: &str) {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return;
        }
        match protocol::classify(trimmed) {
            Ok(Incoming::Response { id, outcome }) => {
                let sender = self
                    .pending
                    .lock()
                    .expect("pending map poisoned")
                    .remove(&id);
                match sender {
                    Some(tx) => {
                        let _ = tx.send(outcome.map_err(RpcErrorBody::into_error));
                    }
                    None => warn!(id, "response for unknown request id"),
                }
            }
            Ok(Incoming::ServerRequest { id, method, params }) => {
                if self
                    .events_tx
                    .send(AgentEvent::ServerRequest { id, method, params })
                    .await
                    .is_err()
                {
                    warn!("agent event channel closed, dropping server request");
                }
            }
            Ok(Incoming::Notification { method, params }) => {
                if self
                    .events_tx
                    .send(AgentEvent::Notification { method, params })
                    .await
                    .is_err()
                {
                    warn!("agent event channel closed, dropping notification");
                }
            }
            Err(e) => warn!(error = %e, line = trimmed, "unclassifiable agent line"),
        }
    }

    fn fail_all_pending(&self, reason: &str) {
        let drained: Vec<_> = {
            let mut pending = self.pending.lock().expect("pending map poisoned");
            pending.drain().collect()
        };
        for (id, tx) in drained {
            debug!(id, reason, "rejecting pending request");
            let _ = tx.send(Err(WirelineError::Agent {
                message: reason.to_string(),
                source: None,
            }));
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::io::Write;
    use std::os::unix::fs::PermissionsExt;

    /// Writes an executable fake-agent script and returns its path.
    fn fake_agent(dir: &tempfile::TempDir, body: &str) -> String {
        let path = dir.path().join("fake-agent.sh");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "#!/bin/sh").unwrap();
        writeln!(file, "{body}").unwrap();
        drop(file);
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path.to_str().unwrap().to_string()
    }

    /// A script that answers initialize (id 1), swallows the initialized
    /// notification, answers the next request (id 2), then emits a
    /// thread/started notification and waits.
    const SCRIPTED_AGENT: &str = r#"
IFS= read -r _initialize
printf '%s\n' '{"jsonrpc":"2.0","id":1,"result":{"userAgent":"fake-agent"}}'
IFS= read -r _initialized
IFS= read -r _request
printf '%s\n' '{"jsonrpc":"2.0","id":2,"result":{"threadId":"th_1"}}'
printf '%s\n' '{"jsonrpc":"2.0","method":"thread/started","params":{"threadId":"th_1"}}'
IFS= read -r _wait_forever
"#;

    #[tokio::test]
    async fn handshake_request_and_notification_flow() {
        let dir = tempfile::tempdir().unwrap();
        let script = fake_agent(&dir, SCRIPTED_AGENT);
        let (tx, mut rx) = mpsc::channel(16);
        let transport = CodexTransport::new(
            script,
            dir.path().to_str().unwrap(),
            Duration::from_secs(5),
            tx,
        );

        transport.start().await.unwrap();

        let result = transport
            .request(
                protocol::methods::THREAD_START,
                serde_json::json!({"model": "gpt-5.3-codex"}),
                None,
            )
            .await
            .unwrap();
        assert_eq!(result["threadId"], "th_1");

        match rx.recv().await.unwrap() {
            AgentEvent::Notification { method, params } => {
                assert_eq!(method, "thread/started");
                assert_eq!(params["threadId"], "th_1");
            }
            other => panic!("unexpected event: {other:?}"),
        }

        transport.stop().await;
    }

    #[tokio::test]
    async fn immediate_exit_rejects_pending_initialize() {
        let dir = tempfile::tempdir().unwrap();
        let script = fake_agent(&dir, "exit 0");
        let (tx, _rx) = mpsc::channel(16);
        let transport = CodexTransport::new(
            script,
            dir.path().to_str().unwrap(),
            Duration::from_secs(5),
            tx,
        );

        let err = transport.start().await.unwrap_err();
        assert!(
            matches!(err, WirelineError::Agent { .. }),
            "expected terminal agent error, got {err:?}"
        );
        transport.stop().await;
    }

    #[tokio::test]
    async fn request_without_child_fails_fast() {
        let (tx, _rx) = mpsc::channel(16);
        let transport = CodexTransport::new("does-not-matter", ".", Duration::from_secs(1), tx);
        let err = transport
            .request("turn/start", serde_json::json!({}), None)
            .await
            .unwrap_err();
        assert!(matches!(err, WirelineError::Agent { .. }));
    }

    #[tokio::test]
    async fn rpc_error_response_maps_to_rpc_error() {
        let dir = tempfile::tempdir().unwrap();
        let script = fake_agent(
            &dir,
            r#"
IFS= read -r _initialize
printf '%s\n' '{"jsonrpc":"2.0","id":1,"result":{}}'
IFS= read -r _initialized
IFS= read -r _request
printf '%s\n' '{"jsonrpc":"2.0","id":2,"error":{"code":-32000,"message":"thread not found"}}'
IFS= read -r _wait_forever
"#,
        );
        let (tx, _rx) = mpsc::channel(16);
        let transport = CodexTransport::new(
            script,
            dir.path().to_str().unwrap(),
            Duration::from_secs(5),
            tx,
        );
        transport.start().await.unwrap();

        let err = transport
            .request(
                protocol::methods::THREAD_RESUME,
                serde_json::json!({"threadId": "th_zombie"}),
                None,
            )
            .await
            .unwrap_err();
        assert!(err.is_thread_not_found(), "got {err:?}");

        transport.stop().await;
    }
}
