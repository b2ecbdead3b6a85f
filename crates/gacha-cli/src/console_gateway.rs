use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use anyhow::{Context, Result};
use async_trait::async_trait;
use gacha_gateway::{
    GroupInfo, GroupMember, MessageId, MessageSegment, MessageTarget, MessagingGateway,
};
use serde_json::{json, Value};

/// Group id to member list, as read from a `--roster` file.
pub type RosterMap = BTreeMap<String, Vec<GroupMember>>;

pub fn load_roster(path: &Path) -> Result<RosterMap> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read roster {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse roster {}", path.display()))
}

/// Gateway that writes every outbound call as one JSON line.
pub struct ConsoleGateway<W: Write + Send> {
    roster: RosterMap,
    next_message_id: AtomicU64,
    out: Mutex<W>,
}

impl<W: Write + Send> ConsoleGateway<W> {
    pub fn new(roster: RosterMap, out: W) -> Self {
        Self {
            roster,
            next_message_id: AtomicU64::new(1),
            out: Mutex::new(out),
        }
    }

    pub fn emit(&self, line: &Value) -> Result<()> {
        let mut out = match self.out.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        writeln!(out, "{line}").context("failed to write console output")?;
        out.flush().context("failed to flush console output")
    }

    pub fn into_inner(self) -> W {
        match self.out.into_inner() {
            Ok(out) => out,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[async_trait]
impl<W: Write + Send> MessagingGateway for ConsoleGateway<W> {
    async fn send_message(
        &self,
        target: &MessageTarget,
        segments: &[MessageSegment],
    ) -> Result<Option<MessageId>> {
        let message_id = self.next_message_id.fetch_add(1, Ordering::Relaxed).to_string();
        self.emit(&json!({
            "event": "send",
            "message_id": message_id,
            "target": target,
            "segments": segments,
        }))?;
        Ok(Some(message_id))
    }

    async fn fetch_group_members(&self, group_id: &str) -> Result<Vec<GroupMember>> {
        Ok(self.roster.get(group_id).cloned().unwrap_or_default())
    }

    async fn fetch_group_info(&self, group_id: &str) -> Result<GroupInfo> {
        Ok(GroupInfo {
            group_id: group_id.to_string(),
            group_name: None,
        })
    }

    async fn delete_message(&self, message_id: &str) -> Result<()> {
        self.emit(&json!({"event": "delete", "message_id": message_id}))
    }
}
