// SPDX-FileCopyrightText: 2026 Wireline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Session manager: the thread/turn state machine on top of the transport.
//!
//! Owns the transport and enforces the invariants the rest of the bridge
//! relies on: at most one active turn, steer-vs-start decisions, recovery
//! from lost threads and child crashes, spark fallback with exactly one
//! retry, and policy-gated answers to server-initiated requests.

use std::collections::HashMap;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};
use wireline_config::model::CodexConfig;
use wireline_core::{
    AuditKind, BridgeEvent, ReasoningEffort, TurnContext, TurnMode, TurnStatus, WirelineError,
};
use wireline_storage::queries::{audit, flags, notifications, session};
use wireline_storage::{flag_keys, Database, SparkReturnTarget};

use crate::models::{self, MODEL_SPARK, MODEL_STANDARD};
use crate::protocol::{
    self, methods, notices, server_requests, AgentMessageDeltaNotice, InputItem, ItemNotice,
    ThreadResult, ThreadStartedNotice, ToolCallParams, TurnCompletedNotice, TurnResult,
    TurnStartedNotice,
};
use crate::tools;
use crate::transport::{AgentEvent, CodexTransport};

/// How a turn was launched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnLaunchMode {
    Start,
    Steer,
}

/// Outcome of launching or steering a turn.
#[derive(Debug, Clone)]
pub struct TurnHandle {
    pub mode: TurnLaunchMode,
    pub turn_id: String,
    pub thread_id: String,
}

struct ManagerState {
    /// Thread id resumed/started within the current child lifetime.
    attached_thread: Option<String>,
    /// Latched false forever once the agent rejects `turn/steer`.
    supports_turn_steer: bool,
    /// In-memory contexts for turns currently in flight.
    turn_contexts: HashMap<String, TurnContext>,
}

/// Owns the agent transport and the session/turn state machine.
pub struct SessionManager {
    db: Database,
    codex: CodexConfig,
    phone: String,
    transport: CodexTransport,
    state: Mutex<ManagerState>,
    bridge_tx: mpsc::Sender<BridgeEvent>,
}

impl SessionManager {
    /// Builds the manager and its transport. The returned receiver carries
    /// raw transport events; the caller feeds them back through
    /// [`SessionManager::handle_agent_event`] on a dedicated task.
    pub fn new(
        db: Database,
        codex: CodexConfig,
        phone: String,
        bridge_tx: mpsc::Sender<BridgeEvent>,
    ) -> (Self, mpsc::Receiver<AgentEvent>) {
        let (agent_tx, agent_rx) = mpsc::channel(256);
        let transport = CodexTransport::new(
            codex.binary_path.clone(),
            codex.working_dir.clone(),
            Duration::from_secs(codex.request_timeout_secs),
            agent_tx,
        );
        let manager = Self {
            db,
            codex,
            phone,
            transport,
            state: Mutex::new(ManagerState {
                attached_thread: None,
                supports_turn_steer: true,
                turn_contexts: HashMap::new(),
            }),
            bridge_tx,
        };
        (manager, agent_rx)
    }

    /// Starts the child and loads persisted latches.
    pub async fn start(&self) -> Result<(), WirelineError> {
        let supports_steer =
            flags::get(&self.db, flag_keys::SUPPORTS_TURN_STEER).await?.as_deref()
                != Some("false");
        self.state.lock().await.supports_turn_steer = supports_steer;
        self.transport.start().await
    }

    /// Stops the child.
    pub async fn stop(&self) {
        self.transport.stop().await;
        let mut state = self.state.lock().await;
        state.attached_thread = None;
        state.turn_contexts.clear();
    }

    /// Mode of the currently active turn, if one is in flight.
    pub async fn active_turn_mode(&self) -> Result<Option<TurnMode>, WirelineError> {
        let record = session::get_or_create(&self.db, &self.phone, &self.codex.default_model).await?;
        let Some(turn_id) = record.active_turn_id else {
            return Ok(None);
        };
        let state = self.state.lock().await;
        Ok(Some(
            state
                .turn_contexts
                .get(&turn_id)
                .map(|ctx| ctx.mode)
                .unwrap_or(TurnMode::User),
        ))
    }

    /// Mode recorded for a specific turn, while its context is alive.
    pub async fn turn_mode(&self, turn_id: &str) -> Option<TurnMode> {
        self.state
            .lock()
            .await
            .turn_contexts
            .get(turn_id)
            .map(|ctx| ctx.mode)
    }

    /// Clears thread and active turn atomically, then ensures a fresh
    /// thread. Backs `/reset` and `/thread new`.
    pub async fn reset_thread(&self) -> Result<String, WirelineError> {
        session::reset(&self.db, &self.phone).await?;
        {
            let mut state = self.state.lock().await;
            state.attached_thread = None;
            state.turn_contexts.clear();
        }
        self.audit(AuditKind::System, None, None, "thread reset", None)
            .await;
        self.ensure_thread().await
    }

    /// Returns a valid thread id attached to the current child lifetime.
    pub async fn ensure_thread(&self) -> Result<String, WirelineError> {
        let record = session::get_or_create(&self.db, &self.phone, &self.codex.default_model).await?;

        if let Some(thread_id) = record.thread_id {
            if self.state.lock().await.attached_thread.as_deref() == Some(thread_id.as_str()) {
                return Ok(thread_id);
            }
            match self
                .transport
                .request(
                    methods::THREAD_RESUME,
                    json!({ "threadId": thread_id }),
                    None,
                )
                .await
            {
                Ok(_) => {
                    self.state.lock().await.attached_thread = Some(thread_id.clone());
                    self.audit(
                        AuditKind::System,
                        Some(&thread_id),
                        None,
                        "thread resumed",
                        None,
                    )
                    .await;
                    return Ok(thread_id);
                }
                Err(e) if e.is_thread_not_found() => {
                    warn!(thread_id = thread_id.as_str(), "agent lost our thread, starting fresh");
                    session::set_thread(&self.db, &self.phone, None).await?;
                    self.audit(
                        AuditKind::System,
                        Some(&thread_id),
                        None,
                        "thread lost, recreating",
                        None,
                    )
                    .await;
                }
                Err(e) => {
                    if let Some(new_model) = self.try_spark_fallback(&e, "thread/resume").await? {
                        debug!(model = new_model.as_str(), "retrying thread/resume after fallback");
                        self.transport
                            .request(
                                methods::THREAD_RESUME,
                                json!({ "threadId": thread_id }),
                                None,
                            )
                            .await?;
                        self.state.lock().await.attached_thread = Some(thread_id.clone());
                        return Ok(thread_id);
                    }
                    return Err(e);
                }
            }
        }

        self.start_thread().await
    }

    /// Issues `thread/start`, with the one-shot child restart on timeout and
    /// the one-shot spark retry.
    async fn start_thread(&self) -> Result<String, WirelineError> {
        let record = session::get_or_create(&self.db, &self.phone, &self.codex.default_model).await?;
        let params = self.thread_start_params(&record.model).await?;

        let result = match self
            .transport
            .request(methods::THREAD_START, params, None)
            .await
        {
            Ok(result) => result,
            Err(WirelineError::Timeout { duration }) => {
                warn!(?duration, "thread/start timed out, restarting agent child once");
                self.transport.stop().await;
                self.state.lock().await.attached_thread = None;
                self.transport.start().await?;
                let params = self.thread_start_params(&record.model).await?;
                self.transport
                    .request(methods::THREAD_START, params, None)
                    .await?
            }
            Err(e) => {
                let Some(new_model) = self.try_spark_fallback(&e, "thread/start").await? else {
                    return Err(e);
                };
                let params = self.thread_start_params(&new_model).await?;
                self.transport
                    .request(methods::THREAD_START, params, None)
                    .await?
            }
        };

        let thread: ThreadResult = serde_json::from_value(result)
            .map_err(|e| WirelineError::Validation(format!("malformed thread/start result: {e}")))?;
        session::set_thread(&self.db, &self.phone, Some(&thread.thread_id)).await?;
        self.state.lock().await.attached_thread = Some(thread.thread_id.clone());
        self.audit(
            AuditKind::System,
            Some(&thread.thread_id),
            None,
            "thread started",
            None,
        )
        .await;
        info!(thread_id = thread.thread_id.as_str(), "thread started");
        Ok(thread.thread_id)
    }

    async fn thread_start_params(&self, model: &str) -> Result<Value, WirelineError> {
        let auto_approve = flags::get_bool(&self.db, flag_keys::AUTO_APPROVE).await?;
        let effort = self.effort_for(model).await?;
        let approval_policy = if auto_approve { "never" } else { "on-request" };
        Ok(json!({
            "model": model,
            "effort": effort,
            "cwd": self.codex.working_dir,
            "approvalPolicy": approval_policy,
            "sandboxMode": self.codex.sandbox_mode,
            "experimental": { "dynamicTools": true },
            "dynamicTools": tools::descriptors(),
        }))
    }

    /// Steers the active turn when possible, otherwise starts a new one.
    pub async fn start_or_steer_turn(&self, text: &str) -> Result<TurnHandle, WirelineError> {
        let mut thread_id = self.ensure_thread().await?;
        let record = session::get_or_create(&self.db, &self.phone, &self.codex.default_model).await?;

        if let Some(active_turn) = record.active_turn_id {
            let steer_supported = self.state.lock().await.supports_turn_steer;
            if steer_supported {
                let params = json!({
                    "threadId": thread_id,
                    "expectedTurnId": active_turn,
                    "input": [InputItem::text(text)],
                });
                match self.transport.request(methods::TURN_STEER, params, None).await {
                    Ok(result) => {
                        let turn_id = serde_json::from_value::<TurnResult>(result)
                            .map(|r| r.turn_id)
                            .unwrap_or(active_turn);
                        self.audit(
                            AuditKind::TurnSteered,
                            Some(&thread_id),
                            Some(&turn_id),
                            &one_line(text, 200),
                            None,
                        )
                        .await;
                        return Ok(TurnHandle {
                            mode: TurnLaunchMode::Steer,
                            turn_id,
                            thread_id,
                        });
                    }
                    Err(e) if e.is_unknown_method() => {
                        warn!("agent rejects turn/steer, disabling steering permanently");
                        self.state.lock().await.supports_turn_steer = false;
                        flags::set(&self.db, flag_keys::SUPPORTS_TURN_STEER, "false").await?;
                        return Err(WirelineError::Validation(
                            "agent does not support steering mid-turn; message not delivered, send again"
                                .into(),
                        ));
                    }
                    Err(e) if e.is_thread_not_found() => {
                        warn!("steer hit a lost thread, re-ensuring");
                        self.state.lock().await.attached_thread = None;
                        session::set_thread(&self.db, &self.phone, None).await?;
                        thread_id = self.ensure_thread().await?;
                    }
                    Err(e) => {
                        warn!(error = %e, "steer failed, falling back to turn/start");
                        session::clear_active_turn(&self.db, &self.phone).await?;
                        self.state.lock().await.turn_contexts.remove(&active_turn);
                    }
                }
            }
        }

        self.start_turn_inner(thread_id, text, TurnContext::user(), None)
            .await
    }

    /// Starts a structured-output decision turn for a queued notification.
    pub async fn start_notification_turn(
        &self,
        notification_id: i64,
        attempt: u8,
        text: &str,
        output_schema: Value,
    ) -> Result<TurnHandle, WirelineError> {
        let thread_id = self.ensure_thread().await?;
        let handle = self
            .start_turn_inner(
                thread_id,
                text,
                TurnContext::notification(notification_id, attempt),
                Some(output_schema),
            )
            .await?;
        notifications::set_turn(&self.db, notification_id, &handle.thread_id, &handle.turn_id)
            .await?;
        Ok(handle)
    }

    async fn start_turn_inner(
        &self,
        thread_id: String,
        text: &str,
        context: TurnContext,
        output_schema: Option<Value>,
    ) -> Result<TurnHandle, WirelineError> {
        let mut thread_id = thread_id;
        let record = session::get_or_create(&self.db, &self.phone, &self.codex.default_model).await?;
        let mut model = record.model;

        let params = self
            .turn_start_params(&thread_id, text, &model, output_schema.as_ref())
            .await?;
        let result = match self.transport.request(methods::TURN_START, params, None).await {
            Ok(result) => result,
            Err(e) if e.is_thread_not_found() => {
                warn!("turn/start hit a lost thread, re-ensuring once");
                self.state.lock().await.attached_thread = None;
                session::set_thread(&self.db, &self.phone, None).await?;
                thread_id = self.ensure_thread().await?;
                let params = self
                    .turn_start_params(&thread_id, text, &model, output_schema.as_ref())
                    .await?;
                self.transport.request(methods::TURN_START, params, None).await?
            }
            Err(e) => {
                let Some(new_model) = self.try_spark_fallback(&e, "turn/start").await? else {
                    return Err(e);
                };
                model = new_model;
                let params = self
                    .turn_start_params(&thread_id, text, &model, output_schema.as_ref())
                    .await?;
                self.transport.request(methods::TURN_START, params, None).await?
            }
        };

        let turn: TurnResult = serde_json::from_value(result)
            .map_err(|e| WirelineError::Validation(format!("malformed turn/start result: {e}")))?;
        session::set_active_turn(&self.db, &self.phone, &turn.turn_id).await?;
        self.state
            .lock()
            .await
            .turn_contexts
            .insert(turn.turn_id.clone(), context);
        self.audit(
            AuditKind::TurnStarted,
            Some(&thread_id),
            Some(&turn.turn_id),
            &one_line(text, 200),
            None,
        )
        .await;
        Ok(TurnHandle {
            mode: TurnLaunchMode::Start,
            turn_id: turn.turn_id,
            thread_id,
        })
    }

    async fn turn_start_params(
        &self,
        thread_id: &str,
        text: &str,
        model: &str,
        output_schema: Option<&Value>,
    ) -> Result<Value, WirelineError> {
        let auto_approve = flags::get_bool(&self.db, flag_keys::AUTO_APPROVE).await?;
        let effort = self.effort_for(model).await?;
        let approval_policy = if auto_approve { "never" } else { "on-request" };
        let mut params = json!({
            "threadId": thread_id,
            "input": [InputItem::text(text)],
            "model": model,
            "effort": effort,
            "approvalPolicy": approval_policy,
            "sandboxPolicy": self.codex.sandbox_mode,
            "cwd": self.codex.working_dir,
        });
        if let Some(schema) = output_schema {
            params["outputSchema"] = schema.clone();
        }
        Ok(params)
    }

    /// Interrupts the active turn. Returns false when nothing is in flight.
    pub async fn interrupt_current(&self) -> Result<bool, WirelineError> {
        let record = session::get_or_create(&self.db, &self.phone, &self.codex.default_model).await?;
        let (Some(thread_id), Some(turn_id)) = (record.thread_id, record.active_turn_id) else {
            return Ok(false);
        };
        self.transport
            .request(
                methods::TURN_INTERRUPT,
                json!({ "threadId": thread_id, "turnId": turn_id }),
                None,
            )
            .await?;
        self.audit(
            AuditKind::TurnInterrupted,
            Some(&thread_id),
            Some(&turn_id),
            "turn interrupted by user",
            None,
        )
        .await;
        Ok(true)
    }

    /// Starts a context compaction on the current thread.
    pub async fn compact_thread(&self) -> Result<(), WirelineError> {
        let thread_id = self.ensure_thread().await?;
        self.transport
            .request(
                methods::THREAD_COMPACT_START,
                json!({ "threadId": thread_id }),
                None,
            )
            .await?;
        Ok(())
    }

    /// Restarts the child and re-ensures a thread, best-effort.
    pub async fn restart_codex(&self) -> Result<Option<String>, WirelineError> {
        self.audit(AuditKind::System, None, None, "restarting codex", None)
            .await;
        self.transport.stop().await;
        {
            let mut state = self.state.lock().await;
            state.attached_thread = None;
            state.turn_contexts.clear();
        }
        session::clear_active_turn(&self.db, &self.phone).await?;
        self.transport.start().await?;
        let thread_id = match self.ensure_thread().await {
            Ok(id) => Some(id),
            Err(e) => {
                warn!(error = %e, "codex restarted but thread could not be ensured");
                None
            }
        };
        self.audit(
            AuditKind::System,
            thread_id.as_deref(),
            None,
            "codex restarted",
            None,
        )
        .await;
        Ok(thread_id)
    }

    // ---- model and effort controls ----

    /// Reasoning effort for `model`: per-model override or built-in default.
    pub async fn effort_for(&self, model: &str) -> Result<ReasoningEffort, WirelineError> {
        let map: Option<HashMap<String, ReasoningEffort>> =
            flags::get_json(&self.db, flag_keys::REASONING_EFFORT_BY_MODEL).await?;
        Ok(map
            .and_then(|m| m.get(model).copied())
            .unwrap_or_else(|| models::default_effort(model)))
    }

    async fn store_effort(&self, model: &str, effort: ReasoningEffort) -> Result<(), WirelineError> {
        let mut map: HashMap<String, ReasoningEffort> =
            flags::get_json(&self.db, flag_keys::REASONING_EFFORT_BY_MODEL)
                .await?
                .unwrap_or_default();
        map.insert(model.to_string(), effort);
        flags::set_json(&self.db, flag_keys::REASONING_EFFORT_BY_MODEL, &map).await
    }

    /// Persists a new session model. Returns the effective effort.
    pub async fn set_model(&self, model: &str) -> Result<ReasoningEffort, WirelineError> {
        self.check_prefix(model)?;
        session::get_or_create(&self.db, &self.phone, &self.codex.default_model).await?;
        session::set_model(&self.db, &self.phone, model).await?;
        self.effort_for(model).await
    }

    /// Persists model and its effort-map entry together.
    pub async fn set_model_with_effort(
        &self,
        model: &str,
        effort: ReasoningEffort,
    ) -> Result<(), WirelineError> {
        self.check_prefix(model)?;
        session::get_or_create(&self.db, &self.phone, &self.codex.default_model).await?;
        session::set_model(&self.db, &self.phone, model).await?;
        self.store_effort(model, effort).await
    }

    /// Updates the effort map for the session's current model only.
    pub async fn set_effort_for_current_model(
        &self,
        effort: ReasoningEffort,
    ) -> Result<String, WirelineError> {
        let record = session::get_or_create(&self.db, &self.phone, &self.codex.default_model).await?;
        self.store_effort(&record.model, effort).await?;
        Ok(record.model)
    }

    /// Toggles between the spark model and the saved return target.
    ///
    /// Returns `(model, effort, on_spark_now)`.
    pub async fn toggle_spark_model(
        &self,
    ) -> Result<(String, ReasoningEffort, bool), WirelineError> {
        let record = session::get_or_create(&self.db, &self.phone, &self.codex.default_model).await?;

        if record.model != MODEL_SPARK {
            let current_effort = self.effort_for(&record.model).await?;
            flags::set_json(
                &self.db,
                flag_keys::SPARK_RETURN_TARGET,
                &SparkReturnTarget {
                    model: record.model,
                    effort: current_effort,
                },
            )
            .await?;
            session::set_model(&self.db, &self.phone, MODEL_SPARK).await?;
            let effort = self.effort_for(MODEL_SPARK).await?;
            Ok((MODEL_SPARK.to_string(), effort, true))
        } else {
            let target: Option<SparkReturnTarget> =
                flags::consume_json(&self.db, flag_keys::SPARK_RETURN_TARGET).await?;
            let (model, effort) = match target {
                Some(t) => (t.model, t.effort),
                None => (
                    MODEL_STANDARD.to_string(),
                    models::default_effort(MODEL_STANDARD),
                ),
            };
            session::set_model(&self.db, &self.phone, &model).await?;
            self.store_effort(&model, effort).await?;
            Ok((model, effort, false))
        }
    }

    fn check_prefix(&self, model: &str) -> Result<(), WirelineError> {
        if !model.starts_with(&self.codex.model_prefix) {
            return Err(WirelineError::Validation(format!(
                "model must start with {:?}",
                self.codex.model_prefix
            )));
        }
        Ok(())
    }

    /// Performs the spark fallback when `err` matches the inaccessibility
    /// predicate while the session is on spark.
    ///
    /// Persists the downgraded model and emits a `ModelFallback` event.
    /// Returns the new model so the caller retries exactly once. The
    /// `spark_return_target` flag is intentionally left alone.
    async fn try_spark_fallback(
        &self,
        err: &WirelineError,
        operation: &str,
    ) -> Result<Option<String>, WirelineError> {
        let message = match err {
            WirelineError::Rpc { message, .. } => message.clone(),
            WirelineError::Agent { message, .. } => message.clone(),
            _ => return Ok(None),
        };
        let record = session::get_or_create(&self.db, &self.phone, &self.codex.default_model).await?;
        if !models::is_spark_access_error(&record.model, &message) {
            return Ok(None);
        }

        session::set_model(&self.db, &self.phone, MODEL_STANDARD).await?;
        let to_effort = self.effort_for(MODEL_STANDARD).await?;
        warn!(
            from = record.model.as_str(),
            to = MODEL_STANDARD,
            operation,
            "spark inaccessible, falling back"
        );
        self.audit(
            AuditKind::System,
            record.thread_id.as_deref(),
            None,
            &format!("model fallback during {operation}"),
            Some(json!({ "from": record.model, "to": MODEL_STANDARD, "reason": message }).to_string()),
        )
        .await;
        self.emit(BridgeEvent::ModelFallback {
            from_model: record.model,
            to_model: MODEL_STANDARD.to_string(),
            to_effort,
            operation: operation.to_string(),
            reason: message,
        })
        .await;
        Ok(Some(MODEL_STANDARD.to_string()))
    }

    // ---- agent event handling ----

    /// Translates one raw transport event, updating persistent state and
    /// emitting bridge events. Called from the orchestrator's event task.
    pub async fn handle_agent_event(&self, event: AgentEvent) {
        match event {
            AgentEvent::Notification { method, params } => {
                if let Err(e) = self.handle_notification(&method, params).await {
                    warn!(method = method.as_str(), error = %e, "agent notification mishandled");
                }
            }
            AgentEvent::ServerRequest { id, method, params } => {
                if let Err(e) = self.handle_server_request(id, &method, params).await {
                    warn!(method = method.as_str(), error = %e, "server request mishandled");
                }
            }
            AgentEvent::Exited { detail } => self.handle_child_exit(&detail).await,
        }
    }

    async fn handle_notification(
        &self,
        method: &str,
        params: Value,
    ) -> Result<(), WirelineError> {
        match method {
            notices::THREAD_STARTED => {
                let notice: ThreadStartedNotice = parse_params(params)?;
                session::set_thread(&self.db, &self.phone, Some(&notice.thread_id)).await?;
                self.state.lock().await.attached_thread = Some(notice.thread_id);
            }
            notices::TURN_STARTED => {
                let notice: TurnStartedNotice = parse_params(params)?;
                if self.is_stale(&notice.thread_id).await? {
                    return Ok(());
                }
                session::set_active_turn(&self.db, &self.phone, &notice.turn_id).await?;
                self.state
                    .lock()
                    .await
                    .turn_contexts
                    .entry(notice.turn_id.clone())
                    .or_insert_with(TurnContext::user);
                self.emit(BridgeEvent::TurnStarted {
                    thread_id: notice.thread_id,
                    turn_id: notice.turn_id,
                })
                .await;
            }
            notices::TURN_COMPLETED => {
                let notice: TurnCompletedNotice = parse_params(params)?;
                if self.is_stale(&notice.thread_id).await? {
                    return Ok(());
                }
                session::clear_active_turn(&self.db, &self.phone).await?;
                let context = self.state.lock().await.turn_contexts.remove(&notice.turn_id);
                self.audit(
                    AuditKind::TurnCompleted,
                    Some(&notice.thread_id),
                    Some(&notice.turn_id),
                    &format!("turn {}", notice.status),
                    notice.error.as_ref().map(|e| json!({ "error": e }).to_string()),
                )
                .await;
                self.emit(BridgeEvent::TurnCompleted {
                    thread_id: notice.thread_id,
                    turn_id: notice.turn_id,
                    status: notice.status,
                    error: notice.error,
                    context,
                })
                .await;
            }
            notices::AGENT_MESSAGE_DELTA => {
                let notice: AgentMessageDeltaNotice = parse_params(params)?;
                if self.is_stale(&notice.thread_id).await? {
                    return Ok(());
                }
                self.audit(
                    AuditKind::AssistantDelta,
                    Some(&notice.thread_id),
                    Some(&notice.turn_id),
                    &one_line(&notice.delta, 80),
                    None,
                )
                .await;
                self.emit(BridgeEvent::AssistantDelta {
                    item_id: notice.item_id,
                    turn_id: notice.turn_id,
                    delta: notice.delta,
                })
                .await;
            }
            notices::ITEM_STARTED => {
                let notice: ItemNotice = parse_params(params)?;
                if self.is_stale(&notice.thread_id).await? {
                    return Ok(());
                }
                if notice.item.kind == protocol::item_types::CONTEXT_COMPACTION {
                    self.emit(BridgeEvent::CompactionStarted).await;
                }
            }
            notices::ITEM_COMPLETED => {
                let notice: ItemNotice = parse_params(params)?;
                if self.is_stale(&notice.thread_id).await? {
                    return Ok(());
                }
                match notice.item.kind.as_str() {
                    protocol::item_types::CONTEXT_COMPACTION => {
                        self.emit(BridgeEvent::CompactionCompleted).await;
                    }
                    protocol::item_types::AGENT_MESSAGE => {
                        let text = notice.item.text.unwrap_or_default();
                        let turn_id = notice.item.turn_id.unwrap_or_default();
                        if let Some(ctx) =
                            self.state.lock().await.turn_contexts.get_mut(&turn_id)
                        {
                            ctx.latest_text = text.clone();
                        }
                        self.emit(BridgeEvent::AssistantFinal {
                            item_id: notice.item.id,
                            turn_id,
                            text,
                        })
                        .await;
                    }
                    _ => {}
                }
            }
            other => debug!(method = other, "unhandled agent notification"),
        }
        Ok(())
    }

    async fn handle_server_request(
        &self,
        id: Value,
        method: &str,
        params: Value,
    ) -> Result<(), WirelineError> {
        match method {
            server_requests::COMMAND_APPROVAL | server_requests::FILE_CHANGE_APPROVAL => {
                let auto_approve = flags::get_bool(&self.db, flag_keys::AUTO_APPROVE).await?;
                let paused = flags::get_bool(&self.db, flag_keys::PAUSED).await?;
                let accept = auto_approve && !paused;
                let summary = one_line(&params.to_string(), 200);

                self.audit(AuditKind::ApprovalRequest, None, None, &summary, None)
                    .await;
                let decision = if accept { "accept" } else { "decline" };
                self.transport
                    .respond(id, json!({ "decision": decision }))
                    .await?;
                let verdict = if accept {
                    "accepted by policy"
                } else {
                    "declined by policy"
                };
                self.audit(AuditKind::ApprovalResponse, None, None, verdict, None)
                    .await;

                if !accept {
                    self.emit(BridgeEvent::ApprovalDeclinedDueToPolicy {
                        method: method.to_string(),
                        summary,
                    })
                    .await;
                }
            }
            server_requests::TOOL_CALL => {
                let call: ToolCallParams = parse_params(params)?;
                if tools::is_notification_tool(&call.tool) {
                    let result =
                        tools::handle_tool_call(&self.db, &call.tool, &call.arguments).await;
                    self.transport.respond(id, result).await?;
                } else {
                    self.transport
                        .respond_error(id, -32601, format!("unknown tool: {}", call.tool), None)
                        .await?;
                }
            }
            other => {
                self.transport
                    .respond_error(id, -32601, format!("method not found: {other}"), None)
                    .await?;
            }
        }
        Ok(())
    }

    async fn handle_child_exit(&self, detail: &str) {
        let contexts: Vec<(String, TurnContext)> = {
            let mut state = self.state.lock().await;
            state.attached_thread = None;
            state.turn_contexts.drain().collect()
        };
        let record = session::get(&self.db, &self.phone).await.ok().flatten();
        let thread_id = record
            .as_ref()
            .and_then(|r| r.thread_id.clone())
            .unwrap_or_default();
        if let Err(e) = session::clear_active_turn(&self.db, &self.phone).await {
            warn!(error = %e, "failed to clear active turn after child exit");
        }
        self.audit(AuditKind::Error, None, None, detail, None).await;

        // Surface the loss as a failed completion for every in-flight turn.
        for (turn_id, context) in contexts {
            self.emit(BridgeEvent::TurnCompleted {
                thread_id: thread_id.clone(),
                turn_id,
                status: TurnStatus::Failed,
                error: Some(detail.to_string()),
                context: Some(context),
            })
            .await;
        }
    }

    /// True when an event references a thread other than the session's
    /// current one (stale events after reset are dropped).
    async fn is_stale(&self, thread_id: &str) -> Result<bool, WirelineError> {
        let record = session::get(&self.db, &self.phone).await?;
        let current = record.and_then(|r| r.thread_id);
        let stale = current.as_deref() != Some(thread_id);
        if stale {
            debug!(thread_id, "dropping event for stale thread");
        }
        Ok(stale)
    }

    async fn emit(&self, event: BridgeEvent) {
        if self.bridge_tx.send(event).await.is_err() {
            warn!("bridge event channel closed");
        }
    }

    async fn audit(
        &self,
        kind: AuditKind,
        thread_id: Option<&str>,
        turn_id: Option<&str>,
        summary: &str,
        payload_json: Option<String>,
    ) {
        let result = audit::append(
            &self.db,
            audit::AppendAudit {
                phone_number: &self.phone,
                thread_id,
                turn_id,
                kind,
                summary,
                payload_json: payload_json.as_deref(),
            },
        )
        .await;
        if let Err(e) = result {
            warn!(error = %e, kind = kind.as_str(), "audit append failed");
        }
    }
}

fn parse_params<T: serde::de::DeserializeOwned>(params: Value) -> Result<T, WirelineError> {
    serde_json::from_value(params)
        .map_err(|e| WirelineError::Validation(format!("malformed agent params: {e}")))
}

/// Collapses text to a single trimmed line of at most `max` characters.
fn one_line(text: &str, max: usize) -> String {
    let collapsed: String = text
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    collapsed.chars().take(max).collect()
}
