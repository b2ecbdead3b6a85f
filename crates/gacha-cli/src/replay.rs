use std::io::Write;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, FixedOffset};
use gacha_core::ManualClock;
use gacha_router::GameAction;
use gacha_runtime::{DispatchOutcome, GachaRuntime, InboundMessage};
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

use crate::console_gateway::ConsoleGateway;

#[derive(Debug, Clone, Deserialize)]
/// One line of a replay file: an inbound message plus optional replay controls.
pub struct ReplayEvent {
    #[serde(flatten)]
    pub message: InboundMessage,
    /// Runs the action through the explicit command path instead of keyword dispatch.
    #[serde(default)]
    pub action: Option<GameAction>,
    /// Moves the replay clock before the event is handled.
    #[serde(default)]
    pub at: Option<DateTime<FixedOffset>>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplaySummary {
    pub events: usize,
    pub handled: usize,
    pub skipped: usize,
    pub commands: usize,
}

pub fn parse_replay_events(raw: &str) -> Result<Vec<(usize, ReplayEvent)>> {
    raw.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(index, line)| {
            let line_number = index + 1;
            serde_json::from_str::<ReplayEvent>(line)
                .with_context(|| format!("failed to parse replay event on line {line_number}"))
                .map(|event| (line_number, event))
        })
        .collect()
}

/// Feeds `events` through `runtime`, writing one outcome line per event to `gateway`.
pub async fn replay_events<W: Write + Send>(
    runtime: &GachaRuntime,
    gateway: &ConsoleGateway<W>,
    clock: &Arc<ManualClock>,
    events: Vec<(usize, ReplayEvent)>,
) -> Result<ReplaySummary> {
    let mut summary = ReplaySummary::default();
    for (line, event) in events {
        summary.events += 1;
        if let Some(at) = event.at {
            clock.set(at);
        }
        match event.action {
            Some(action) => {
                if let Err(error) = runtime.track_active(&event.message).await {
                    warn!(
                        line,
                        reason_code = "activity_write_failed",
                        error = %error,
                        "activity tracking failed; running command anyway"
                    );
                }
                let replies = runtime
                    .run_command(action, &event.message)
                    .await
                    .with_context(|| format!("command {action} failed on line {line}"))?;
                summary.commands += 1;
                gateway.emit(&json!({
                    "event": "command",
                    "line": line,
                    "action": action,
                    "replies": replies,
                }))?;
            }
            None => {
                let outcome = runtime
                    .handle_message(&event.message)
                    .await
                    .with_context(|| format!("dispatch failed on line {line}"))?;
                let line_output = match &outcome {
                    DispatchOutcome::Handled { action, replies } => {
                        summary.handled += 1;
                        json!({
                            "event": "dispatch",
                            "line": line,
                            "action": action,
                            "replies": replies,
                        })
                    }
                    DispatchOutcome::Skipped { reason_code } => {
                        summary.skipped += 1;
                        json!({
                            "event": "dispatch",
                            "line": line,
                            "reason_code": reason_code,
                        })
                    }
                };
                gateway.emit(&line_output)?;
            }
        }
    }
    info!(
        events = summary.events,
        handled = summary.handled,
        skipped = summary.skipped,
        commands = summary.commands,
        "replay finished"
    );
    Ok(summary)
}
