// SPDX-FileCopyrightText: 2026 Wireline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Slash-command parsing.
//!
//! Execution lives in the bridge; this module only turns user text into a
//! typed [`Command`] with validated arguments.

use std::str::FromStr;

use wireline_core::{NotificationSource, ReasoningEffort};

/// Help text for `/help`.
pub const HELP_TEXT: &str = "\
Commands:
/help - show this list
/status - phone, thread, active turn, model, paused, auto_approve
/stop - interrupt the current turn
/reset - drop the thread and start a new one
/debug - timeline of the last turn
/thread [new] - show the thread, or create one
/compact - compact the thread context
/model <id>[-<effort>] - set the model (and optionally its effort)
/effort [level] - show or set effort for the current model
/spark - toggle the spark model
/pause - pause turns, disable auto-approve
/resume - resume turns, enable auto-approve
/notifications [count] [source] - recent notifications
/restart <codex|bridge|both> - restart components";

/// A parsed slash command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Help,
    Status,
    Stop,
    Reset,
    Debug,
    Thread { new: bool },
    Compact,
    Model { model: String, effort: Option<ReasoningEffort> },
    Effort { level: Option<ReasoningEffort> },
    Spark,
    Pause,
    Resume,
    Notifications {
        count: u32,
        source: Option<NotificationSource>,
    },
    Restart(RestartTarget),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartTarget {
    Codex,
    Bridge,
    Both,
}

/// Parse failures, each with a user-facing message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    Unknown,
    Invalid(String),
}

impl CommandError {
    pub fn user_message(&self) -> String {
        match self {
            CommandError::Unknown => "Unknown command. /help for the list.".to_string(),
            CommandError::Invalid(msg) => msg.clone(),
        }
    }
}

/// Parses one inbound line beginning with `/`.
pub fn parse(input: &str) -> Result<Command, CommandError> {
    let mut parts = input.trim().split_whitespace();
    let name = parts.next().unwrap_or_default();
    let args: Vec<&str> = parts.collect();

    match name {
        "/help" => Ok(Command::Help),
        "/status" => Ok(Command::Status),
        "/stop" => Ok(Command::Stop),
        "/reset" => Ok(Command::Reset),
        "/debug" => Ok(Command::Debug),
        "/compact" => Ok(Command::Compact),
        "/spark" => Ok(Command::Spark),
        "/pause" => Ok(Command::Pause),
        "/resume" => Ok(Command::Resume),
        "/thread" => match args.as_slice() {
            [] => Ok(Command::Thread { new: false }),
            ["new"] => Ok(Command::Thread { new: true }),
            _ => Err(CommandError::Invalid("Usage: /thread [new]".into())),
        },
        "/model" => match args.as_slice() {
            [spec] => Ok(parse_model_spec(spec)),
            _ => Err(CommandError::Invalid("Usage: /model <id>".into())),
        },
        "/effort" => match args.as_slice() {
            [] => Ok(Command::Effort { level: None }),
            [level] => ReasoningEffort::from_str(level)
                .map(|level| Command::Effort { level: Some(level) })
                .map_err(|_| {
                    CommandError::Invalid(
                        "Effort must be one of: none, minimal, low, medium, high, xhigh".into(),
                    )
                }),
            _ => Err(CommandError::Invalid("Usage: /effort [level]".into())),
        },
        "/notifications" => parse_notifications(&args),
        "/restart" => match args.as_slice() {
            ["codex"] => Ok(Command::Restart(RestartTarget::Codex)),
            ["bridge"] => Ok(Command::Restart(RestartTarget::Bridge)),
            ["both"] => Ok(Command::Restart(RestartTarget::Both)),
            _ => Err(CommandError::Invalid(
                "Usage: /restart <codex|bridge|both>".into(),
            )),
        },
        _ => Err(CommandError::Unknown),
    }
}

/// `/model` accepts `<id>` or the suffix form `<id>-<effort>`, split on the
/// last dash.
fn parse_model_spec(spec: &str) -> Command {
    if let Some((model, suffix)) = spec.rsplit_once('-') {
        if let Ok(effort) = ReasoningEffort::from_str(suffix) {
            return Command::Model {
                model: model.to_string(),
                effort: Some(effort),
            };
        }
    }
    Command::Model {
        model: spec.to_string(),
        effort: None,
    }
}

fn parse_notifications(args: &[&str]) -> Result<Command, CommandError> {
    let mut count: u32 = 10;
    let mut source: Option<NotificationSource> = None;

    for arg in args {
        if let Ok(n) = arg.parse::<u32>() {
            if !(1..=200).contains(&n) {
                return Err(CommandError::Invalid(
                    "Count must be between 1 and 200".into(),
                ));
            }
            count = n;
        } else if *arg == "all" {
            source = None;
        } else if let Ok(s) = NotificationSource::from_str(arg) {
            source = Some(s);
        } else {
            return Err(CommandError::Invalid(
                "Usage: /notifications [count] [all|webhook|cron|heartbeat]".into(),
            ));
        }
    }

    Ok(Command::Notifications { count, source })
}
