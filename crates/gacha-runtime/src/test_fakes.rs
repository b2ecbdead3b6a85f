use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDate, TimeZone};
use gacha_config::GachaConfig;
use gacha_core::ManualClock;
use gacha_gateway::{
    GroupInfo, GroupMember, MessageId, MessageSegment, MessageTarget, MessagingGateway,
    RenderOptions, RenderService, WithdrawScheduler,
};
use gacha_store::RetentionStore;
use serde_json::Value;
use tokio::sync::Mutex as AsyncMutex;

use crate::game_commands::{GameCommandDeps, GameCommandService};

#[derive(Default)]
pub(crate) struct ScriptedGateway {
    pub members: Vec<GroupMember>,
    pub group_name: Option<String>,
    pub fail_roster: bool,
    pub roster_delay: Option<Duration>,
    pub next_message_id: Option<String>,
    pub sent: Mutex<Vec<(MessageTarget, Vec<MessageSegment>)>>,
    pub deleted: Mutex<Vec<String>>,
}

impl ScriptedGateway {
    pub fn with_members(ids: &[&str]) -> Self {
        Self {
            members: ids
                .iter()
                .map(|id| GroupMember::new(*id).with_card(format!("card-{id}")))
                .collect(),
            ..Self::default()
        }
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().expect("sent lock").len()
    }
}

#[async_trait]
impl MessagingGateway for ScriptedGateway {
    async fn send_message(
        &self,
        target: &MessageTarget,
        segments: &[MessageSegment],
    ) -> Result<Option<MessageId>> {
        self.sent
            .lock()
            .expect("sent lock")
            .push((target.clone(), segments.to_vec()));
        Ok(self.next_message_id.clone())
    }

    async fn fetch_group_members(&self, _group_id: &str) -> Result<Vec<GroupMember>> {
        if let Some(delay) = self.roster_delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_roster {
            bail!("roster api offline");
        }
        Ok(self.members.clone())
    }

    async fn fetch_group_info(&self, group_id: &str) -> Result<GroupInfo> {
        Ok(GroupInfo {
            group_id: group_id.to_string(),
            group_name: self.group_name.clone(),
        })
    }

    async fn delete_message(&self, message_id: &str) -> Result<()> {
        self.deleted
            .lock()
            .expect("deleted lock")
            .push(message_id.to_string());
        Ok(())
    }
}

#[derive(Default)]
pub(crate) struct RecordingRenderer {
    pub calls: Mutex<Vec<(Value, RenderOptions)>>,
}

#[async_trait]
impl RenderService for RecordingRenderer {
    async fn render(&self, _template: &str, context: &Value, options: &RenderOptions) -> Result<String> {
        let mut calls = self.calls.lock().expect("calls lock");
        calls.push((context.clone(), options.clone()));
        Ok(format!("file:///tmp/render-{}.png", calls.len()))
    }
}

pub(crate) fn fixed_now() -> DateTime<FixedOffset> {
    let offset = FixedOffset::east_opt(8 * 3600).expect("offset");
    let naive = NaiveDate::from_ymd_opt(2026, 2, 8)
        .and_then(|date| date.and_hms_opt(12, 0, 0))
        .expect("naive");
    offset.from_local_datetime(&naive).single().expect("local")
}

pub(crate) struct Harness {
    pub service: GameCommandService,
    pub gateway: Arc<ScriptedGateway>,
    pub renderer: Arc<RecordingRenderer>,
    pub withdraw: Arc<WithdrawScheduler>,
    pub clock: Arc<ManualClock>,
}

pub(crate) fn build_harness(
    root: &Path,
    config: GachaConfig,
    gateway: ScriptedGateway,
) -> Harness {
    let config = Arc::new(config);
    let store = RetentionStore::open(&root.join("data"), &config).expect("open store");
    let gateway = Arc::new(gateway);
    let renderer = Arc::new(RecordingRenderer::default());
    let withdraw = Arc::new(WithdrawScheduler::new(gateway.clone()));
    let clock = Arc::new(ManualClock::new(fixed_now()));
    let service = GameCommandService::new(GameCommandDeps {
        config,
        store: Arc::new(AsyncMutex::new(store)),
        gateway: gateway.clone(),
        renderer: renderer.clone(),
        withdraw: withdraw.clone(),
        clock: clock.clone(),
        templates_dir: root.join("templates"),
        rng_seed: Some(7),
    });
    Harness {
        service,
        gateway,
        renderer,
        withdraw,
        clock,
    }
}
