// SPDX-FileCopyrightText: 2026 Wireline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The bridge orchestrator: poll loop, command router, event fan-in.
//!
//! Everything converges here. The poll loop ingests provider messages, the
//! session manager's events arrive over a channel, and the notification
//! pipeline gets one shot per idle poll pass. The orchestrator never blocks
//! inside the transport reader; all cross-task traffic is channels.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use wireline_agent::{AgentEvent, SessionManager};
use wireline_config::BridgeConfig;
use wireline_core::{AuditKind, BridgeEvent, TurnMode, TurnStatus, WirelineError};
use wireline_notify::pipeline::CompletionAction;
use wireline_notify::NotificationPipeline;
use wireline_provider::{normalize_number, InboundMessage, ProviderClient};
use wireline_storage::queries::{audit, dedupe, flags, notifications, session};
use wireline_storage::{flag_keys, Database, RestartNotice};

use crate::commands::{self, Command, RestartTarget, HELP_TEXT};
use crate::compose;
use crate::outbound::OutboundQueue;
use crate::relay::{AssistantRelay, ErrorLogAction, PollErrorSuppressor, TypingIndicator};

/// The long-lived bridge orchestrator.
pub struct Bridge {
    config: BridgeConfig,
    db: Database,
    /// Trusted user's normalized number; also the session key.
    phone: String,
    manager: Arc<SessionManager>,
    pipeline: Arc<NotificationPipeline>,
    client: Arc<ProviderClient>,
    outbound: OutboundQueue,
    typing: TypingIndicator,
    relay: StdMutex<AssistantRelay>,
    suppressor: StdMutex<PollErrorSuppressor>,
    restart_requested: AtomicBool,
}

impl Bridge {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: BridgeConfig,
        db: Database,
        phone: String,
        manager: Arc<SessionManager>,
        pipeline: Arc<NotificationPipeline>,
        client: Arc<ProviderClient>,
        outbound: OutboundQueue,
    ) -> Self {
        let typing = TypingIndicator::new(
            config.features.typing_indicators,
            Duration::from_secs(config.features.typing_heartbeat_secs),
        );
        Self {
            config,
            db,
            phone,
            manager,
            pipeline,
            client,
            outbound,
            typing,
            relay: StdMutex::new(AssistantRelay::new()),
            suppressor: StdMutex::new(PollErrorSuppressor::new()),
            restart_requested: AtomicBool::new(false),
        }
    }

    /// Returns the restart flag and clears it; true at most once per set.
    pub fn consume_restart_requested(&self) -> bool {
        self.restart_requested.swap(false, Ordering::SeqCst)
    }

    /// Runs until shutdown or a user-requested bridge restart.
    ///
    /// Returns `true` when the caller should exit with the sentinel code so
    /// the supervisor wrapper relaunches us.
    pub async fn run(
        self,
        cancel: CancellationToken,
        mut agent_rx: mpsc::Receiver<AgentEvent>,
        mut bridge_rx: mpsc::Receiver<BridgeEvent>,
    ) -> Result<bool, WirelineError> {
        self.manager.start().await?;
        info!("session manager started");

        // Transport events pump into the manager on their own task; the
        // reader must never wait on the orchestrator.
        let manager = self.manager.clone();
        let pump = tokio::spawn(async move {
            while let Some(event) = agent_rx.recv().await {
                manager.handle_agent_event(event).await;
            }
        });

        if self.config.features.discard_backlog_on_start {
            self.discard_backlog().await;
        }

        match flags::consume_json::<RestartNotice>(&self.db, flag_keys::PENDING_BRIDGE_RESTART_NOTICE)
            .await
        {
            Ok(Some(notice)) => {
                info!(target = notice.target.as_str(), "completing user-requested restart");
                self.outbound
                    .enqueue("Bridge restarted. Back online.".to_string())
                    .await;
                self.audit(AuditKind::System, "bridge back online after restart")
                    .await;
            }
            Ok(None) => {}
            Err(e) => warn!(error = %e, "restart notice unreadable, ignoring"),
        }

        let mut poll = tokio::time::interval(Duration::from_millis(
            self.config.provider.poll_interval_ms,
        ));
        poll.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("shutdown requested");
                    break;
                }
                _ = poll.tick() => {
                    self.poll_cycle().await;
                }
                Some(event) = bridge_rx.recv() => {
                    self.handle_bridge_event(event).await;
                }
            }
            if self.restart_requested.load(Ordering::SeqCst) {
                info!("bridge restart requested, leaving poll loop");
                break;
            }
        }

        self.manager.stop().await;
        pump.abort();

        let restart = self.consume_restart_requested();
        let Bridge { outbound, .. } = self;
        // Drain queued messages (the restart acknowledgment in particular)
        // before the process exits.
        outbound.close().await;
        Ok(restart)
    }

    // ---- poll loop ----

    async fn poll_cycle(&self) {
        match self.client.fetch_messages().await {
            Ok(mut messages) => {
                messages.sort_by_key(InboundMessage::best_timestamp_ms);
                for message in messages {
                    self.handle_inbound(message).await;
                    if self.restart_requested.load(Ordering::SeqCst) {
                        return;
                    }
                }
            }
            Err(e) => self.log_poll_error(&e),
        }

        match self.manager.active_turn_mode().await {
            Ok(None) => {
                if let Err(e) = self.pipeline.process_next(&self.manager).await {
                    warn!(error = %e, "notification processing failed");
                }
            }
            Ok(Some(_)) => {}
            Err(e) => warn!(error = %e, "could not read active turn state"),
        }

        if let Err(e) = self.pipeline.maybe_prune().await {
            warn!(error = %e, "notification prune failed");
        }
    }

    async fn handle_inbound(&self, message: InboundMessage) {
        if message.is_outbound {
            return;
        }
        let Some(sender) = message.sender() else {
            return;
        };
        let Ok(sender) = normalize_number(sender) else {
            return;
        };
        if sender != self.phone {
            debug!(sender = sender.as_str(), "ignoring message from untrusted number");
            return;
        }
        if message.message_handle.is_empty() {
            debug!("ignoring message without a handle");
            return;
        }
        match dedupe::mark_processed(&self.db, &message.message_handle).await {
            Ok(true) => {}
            Ok(false) => return,
            Err(e) => {
                warn!(error = %e, "dedupe check failed, dropping message");
                return;
            }
        }

        self.audit_inbound(&message).await;

        let content = message.content.trim().to_string();
        if content.starts_with('/') {
            self.handle_command_text(&content, &message).await;
        } else {
            self.handle_user_text(&message).await;
        }
    }

    async fn handle_command_text(&self, content: &str, message: &InboundMessage) {
        let command = match commands::parse(content) {
            Ok(command) => command,
            Err(e) => {
                self.outbound.enqueue(e.user_message()).await;
                return;
            }
        };

        match self.execute_command(command).await {
            Ok(reply) => {
                self.audit_command(content, true).await;
                if !reply.is_empty() {
                    self.outbound.enqueue(reply).await;
                }
                self.read_receipt(message).await;
            }
            Err(e) => {
                self.audit_command(content, false).await;
                self.outbound
                    .enqueue(format!("Command failed: {e}"))
                    .await;
            }
        }
    }

    async fn handle_user_text(&self, message: &InboundMessage) {
        let input =
            compose::compose_inbound_text(&message.content, message.media_url.as_deref());
        if input.is_empty() {
            return;
        }

        match flags::get_bool(&self.db, flag_keys::PAUSED).await {
            Ok(true) => {
                self.outbound
                    .enqueue("Bridge is paused. Send /resume to continue.".to_string())
                    .await;
                return;
            }
            Ok(false) => {}
            Err(e) => {
                warn!(error = %e, "paused flag unreadable");
                return;
            }
        }

        // A decision turn holds the thread; user text must not steer it.
        if let Ok(Some(TurnMode::Notification)) = self.manager.active_turn_mode().await {
            self.outbound
                .enqueue(
                    "A notification is being handled right now. Please send that again in a moment."
                        .to_string(),
                )
                .await;
            return;
        }

        match self.manager.start_or_steer_turn(&input).await {
            Ok(handle) => {
                debug!(mode = ?handle.mode, turn_id = handle.turn_id.as_str(), "turn launched");
                self.read_receipt(message).await;
            }
            Err(e) => {
                warn!(error = %e, "turn launch failed");
                self.outbound.enqueue(format!("Turn failed: {e}")).await;
            }
        }
    }

    async fn read_receipt(&self, message: &InboundMessage) {
        if !self.config.features.read_receipts {
            return;
        }
        if let Err(e) = self
            .client
            .mark_read(&self.phone, &message.message_handle)
            .await
        {
            debug!(error = %e, "read receipt failed");
        }
    }

    fn log_poll_error(&self, e: &WirelineError) {
        let signature = e.to_string();
        let action = self
            .suppressor
            .lock()
            .expect("suppressor poisoned")
            .observe(&signature);
        match action {
            ErrorLogAction::Log => error!(error = %e, "Poll loop error"),
            ErrorLogAction::Suppress => {}
            ErrorLogAction::FlushThenLog {
                suppressed,
                signature,
            } => {
                warn!(
                    suppressed,
                    signature = signature.as_str(),
                    "Poll loop error repeated"
                );
                error!(error = %e, "Poll loop error");
            }
        }
    }

    async fn discard_backlog(&self) {
        match self.client.fetch_messages().await {
            Ok(messages) => {
                let handles: Vec<String> = messages
                    .iter()
                    .filter(|m| !m.is_outbound)
                    .filter(|m| {
                        m.sender()
                            .and_then(|s| normalize_number(s).ok())
                            .is_some_and(|s| s == self.phone)
                    })
                    .filter(|m| !m.message_handle.is_empty())
                    .map(|m| m.message_handle.clone())
                    .collect();
                let total = handles.len();
                match dedupe::mark_many(&self.db, handles).await {
                    Ok(discarded) => {
                        info!(discarded, total, "startup backlog discarded");
                        self.audit(
                            AuditKind::System,
                            &format!("startup backlog discarded ({discarded} of {total})"),
                        )
                        .await;
                    }
                    Err(e) => warn!(error = %e, "backlog discard failed"),
                }
            }
            Err(e) => warn!(error = %e, "backlog fetch failed"),
        }
    }

    // ---- bridge events ----

    async fn handle_bridge_event(&self, event: BridgeEvent) {
        match event {
            BridgeEvent::TurnStarted { turn_id, .. } => {
                debug!(turn_id = turn_id.as_str(), "turn started");
            }
            BridgeEvent::AssistantDelta { turn_id, .. } => {
                if self.manager.turn_mode(&turn_id).await == Some(TurnMode::User) {
                    self.typing.maybe_send(&self.client, &self.phone);
                }
            }
            BridgeEvent::AssistantFinal {
                item_id,
                turn_id,
                text,
            } => {
                // Decision envelopes never go to the user directly; the
                // pipeline dispatches what the envelope says.
                if self.manager.turn_mode(&turn_id).await == Some(TurnMode::Notification) {
                    return;
                }
                let fresh = self
                    .relay
                    .lock()
                    .expect("relay poisoned")
                    .first_sighting(&item_id);
                if fresh && !text.trim().is_empty() {
                    self.outbound.enqueue(text).await;
                }
            }
            BridgeEvent::TurnCompleted {
                status,
                error,
                context,
                ..
            } => {
                self.typing.clear();
                match context {
                    Some(ctx) if ctx.mode == TurnMode::Notification => {
                        match self
                            .pipeline
                            .handle_completion(&self.manager, &ctx, status, error.as_deref())
                            .await
                        {
                            Ok(CompletionAction::Dispatch(message)) => {
                                self.outbound.enqueue(message).await;
                            }
                            Ok(_) => {}
                            Err(e) => warn!(error = %e, "decision completion mishandled"),
                        }
                    }
                    _ => {
                        if status == TurnStatus::Failed {
                            let detail = error.unwrap_or_else(|| "unknown error".to_string());
                            self.outbound
                                .enqueue(format!("Turn failed: {detail}"))
                                .await;
                        }
                    }
                }
            }
            BridgeEvent::CompactionStarted => debug!("context compaction started"),
            BridgeEvent::CompactionCompleted => info!("context compaction completed"),
            BridgeEvent::ApprovalDeclinedDueToPolicy { method, .. } => {
                self.outbound
                    .enqueue(format!(
                        "Approval request declined by policy ({method}). Send /resume to enable auto-approval."
                    ))
                    .await;
            }
            BridgeEvent::ModelFallback {
                from_model,
                to_model,
                to_effort,
                ..
            } => {
                self.outbound
                    .enqueue(format!(
                        "Model {from_model} is unavailable; switched to {to_model} (effort {to_effort})."
                    ))
                    .await;
            }
        }
    }

    // ---- commands ----

    async fn execute_command(&self, command: Command) -> Result<String, WirelineError> {
        match command {
            Command::Help => Ok(HELP_TEXT.to_string()),
            Command::Status => self.status_text().await,
            Command::Stop => {
                if self.manager.interrupt_current().await? {
                    Ok("Interrupting the current turn...".to_string())
                } else {
                    Ok("Nothing to interrupt.".to_string())
                }
            }
            Command::Reset => {
                let thread_id = self.manager.reset_thread().await?;
                Ok(format!("Thread reset. New thread: {thread_id}"))
            }
            Command::Debug => self.debug_text().await,
            Command::Thread { new: false } => {
                let record =
                    session::get_or_create(&self.db, &self.phone, &self.config.codex.default_model)
                        .await?;
                match record.thread_id {
                    Some(id) => Ok(format!("Thread: {id}")),
                    None => Ok("No thread yet. /thread new to create one.".to_string()),
                }
            }
            Command::Thread { new: true } => {
                let thread_id = self.manager.reset_thread().await?;
                Ok(format!("New thread: {thread_id}"))
            }
            Command::Compact => {
                self.manager.compact_thread().await?;
                Ok("Compaction started.".to_string())
            }
            Command::Model { model, effort } => {
                let effective = match effort {
                    Some(effort) => {
                        self.manager.set_model_with_effort(&model, effort).await?;
                        effort
                    }
                    None => self.manager.set_model(&model).await?,
                };
                Ok(format!("Model: {model} (effort {effective})"))
            }
            Command::Effort { level: None } => {
                let record =
                    session::get_or_create(&self.db, &self.phone, &self.config.codex.default_model)
                        .await?;
                let effort = self.manager.effort_for(&record.model).await?;
                Ok(format!("Effort for {}: {effort}", record.model))
            }
            Command::Effort { level: Some(level) } => {
                let model = self.manager.set_effort_for_current_model(level).await?;
                Ok(format!("Effort for {model}: {level}"))
            }
            Command::Spark => {
                let (model, effort, on_spark) = self.manager.toggle_spark_model().await?;
                if on_spark {
                    Ok(format!("Spark on: {model} (effort {effort})"))
                } else {
                    Ok(format!("Spark off: back to {model} (effort {effort})"))
                }
            }
            Command::Pause => {
                flags::set_bool(&self.db, flag_keys::PAUSED, true).await?;
                flags::set_bool(&self.db, flag_keys::AUTO_APPROVE, false).await?;
                Ok("Paused. New turns blocked, auto-approve off.".to_string())
            }
            Command::Resume => {
                flags::set_bool(&self.db, flag_keys::PAUSED, false).await?;
                flags::set_bool(&self.db, flag_keys::AUTO_APPROVE, true).await?;
                Ok("Resumed. Auto-approve on.".to_string())
            }
            Command::Notifications { count, source } => {
                let rows = notifications::list(&self.db, count, source).await?;
                if rows.is_empty() {
                    return Ok("No notifications.".to_string());
                }
                let lines: Vec<String> = rows
                    .iter()
                    .map(|row| {
                        let summary: String = row.summary.chars().take(120).collect();
                        format!("#{} [{}] {}: {}", row.id, row.status, row.source, summary)
                    })
                    .collect();
                Ok(lines.join("\n"))
            }
            Command::Restart(RestartTarget::Codex) => {
                let thread_id = self.manager.restart_codex().await?;
                match thread_id {
                    Some(id) => Ok(format!("Codex restarted. Thread: {id}")),
                    None => Ok("Codex restarted. No thread yet.".to_string()),
                }
            }
            Command::Restart(RestartTarget::Bridge) => self.request_bridge_restart("bridge").await,
            Command::Restart(RestartTarget::Both) => self.request_bridge_restart("both").await,
        }
    }

    /// Persists the one-shot restart notice and stops the poll loop so the
    /// process can exit with the relaunch sentinel.
    async fn request_bridge_restart(&self, target: &str) -> Result<String, WirelineError> {
        flags::set_json(
            &self.db,
            flag_keys::PENDING_BRIDGE_RESTART_NOTICE,
            &RestartNotice {
                target: target.to_string(),
                requested_at_ms: now_epoch_ms(),
            },
        )
        .await?;
        self.restart_requested.store(true, Ordering::SeqCst);
        self.audit(AuditKind::System, &format!("restart requested: {target}"))
            .await;
        Ok("Restarting bridge now...".to_string())
    }

    async fn status_text(&self) -> Result<String, WirelineError> {
        let record =
            session::get_or_create(&self.db, &self.phone, &self.config.codex.default_model).await?;
        let paused = flags::get_bool(&self.db, flag_keys::PAUSED).await?;
        let auto_approve = flags::get_bool(&self.db, flag_keys::AUTO_APPROVE).await?;
        Ok(format!(
            "phone: {}\nthread: {}\nactive_turn: {}\nmodel: {}\npaused: {}\nauto_approve: {}",
            record.phone_number,
            record.thread_id.as_deref().unwrap_or("none"),
            record.active_turn_id.as_deref().unwrap_or("none"),
            record.model,
            paused,
            auto_approve,
        ))
    }

    async fn debug_text(&self) -> Result<String, WirelineError> {
        let events = audit::last_turn_timeline(&self.db, &self.phone, 50).await?;
        if events.is_empty() {
            return Ok("No turn recorded yet.".to_string());
        }
        let lines: Vec<String> = events
            .iter()
            .map(|event| {
                let summary: String = event.summary.chars().take(200).collect();
                format!("{}: {}", event.kind, summary)
            })
            .collect();
        Ok(lines.join("\n"))
    }

    // ---- audit helpers ----

    async fn audit_inbound(&self, message: &InboundMessage) {
        let summary: String = message.content.chars().take(200).collect();
        let payload = serde_json::json!({
            "messageHandle": message.message_handle,
            "mediaUrl": message.media_url,
        })
        .to_string();
        if let Err(e) = audit::append(
            &self.db,
            audit::AppendAudit {
                phone_number: &self.phone,
                thread_id: None,
                turn_id: None,
                kind: AuditKind::InboundMessage,
                summary: &summary,
                payload_json: Some(&payload),
            },
        )
        .await
        {
            warn!(error = %e, "inbound audit failed");
        }
    }

    async fn audit_command(&self, content: &str, success: bool) {
        let summary = if success {
            content.to_string()
        } else {
            format!("{content} (failed)")
        };
        if let Err(e) = audit::append(
            &self.db,
            audit::AppendAudit {
                phone_number: &self.phone,
                thread_id: None,
                turn_id: None,
                kind: AuditKind::Command,
                summary: &summary,
                payload_json: None,
            },
        )
        .await
        {
            warn!(error = %e, "command audit failed");
        }
    }

    async fn audit(&self, kind: AuditKind, summary: &str) {
        if let Err(e) = audit::append(
            &self.db,
            audit::AppendAudit {
                phone_number: &self.phone,
                thread_id: None,
                turn_id: None,
                kind,
                summary,
                payload_json: None,
            },
        )
        .await
        {
            warn!(error = %e, kind = kind.as_str(), "audit append failed");
        }
    }
}

fn now_epoch_ms() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
