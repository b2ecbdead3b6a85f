use std::{
    fs,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::{SystemTime, UNIX_EPOCH},
};

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, FixedOffset};
use gacha_config::GachaConfig;
use gacha_core::ManualClock;
use gacha_gateway::{
    GroupInfo, GroupMember, MessageId, MessageSegment, MessageTarget, MessagingGateway,
    RenderOptions, RenderService,
};
use gacha_router::GameAction;
use gacha_runtime::{DispatchOutcome, GachaRuntime, GachaRuntimeOptions, GameReply, InboundMessage};
use gacha_store::{DailyRecordSet, ACTIVE_USERS_FILE_NAME, DAILY_RECORDS_FILE_NAME};
use serde_json::{json, Value};
use tokio::sync::Mutex as AsyncMutex;

static WORKSPACE_COUNTER: AtomicU64 = AtomicU64::new(1);

struct IsolatedWorkspace {
    root: PathBuf,
}

impl IsolatedWorkspace {
    fn new(label: &str) -> Self {
        let tick = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock should be after unix epoch")
            .as_nanos();
        let count = WORKSPACE_COUNTER.fetch_add(1, Ordering::Relaxed);
        let root = std::env::temp_dir().join(format!(
            "gacha-{label}-{}-{tick}-{count}",
            std::process::id()
        ));
        fs::create_dir_all(&root).expect("must create isolated workspace root");
        Self { root }
    }

    fn root(&self) -> &Path {
        &self.root
    }

    fn data_dir(&self) -> PathBuf {
        self.root.join("data")
    }
}

impl Drop for IsolatedWorkspace {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.root);
    }
}

struct RosterGateway {
    members: Vec<GroupMember>,
    sent: AsyncMutex<Vec<MessageTarget>>,
}

impl RosterGateway {
    fn new(ids: &[&str]) -> Self {
        Self {
            members: ids
                .iter()
                .map(|id| GroupMember::new(*id).with_nickname(format!("nick-{id}")))
                .collect(),
            sent: AsyncMutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl MessagingGateway for RosterGateway {
    async fn send_message(
        &self,
        target: &MessageTarget,
        _segments: &[MessageSegment],
    ) -> Result<Option<MessageId>> {
        self.sent.lock().await.push(target.clone());
        Ok(None)
    }

    async fn fetch_group_members(&self, _group_id: &str) -> Result<Vec<GroupMember>> {
        Ok(self.members.clone())
    }

    async fn fetch_group_info(&self, group_id: &str) -> Result<GroupInfo> {
        Ok(GroupInfo {
            group_id: group_id.to_string(),
            group_name: Some("integration".to_string()),
        })
    }

    async fn delete_message(&self, _message_id: &str) -> Result<()> {
        Ok(())
    }
}

struct EchoRenderer;

#[async_trait]
impl RenderService for EchoRenderer {
    async fn render(&self, _template: &str, context: &Value, _options: &RenderOptions) -> Result<String> {
        Ok(format!("file:///render/{}.png", context["group_id"].as_str().unwrap_or("none")))
    }
}

fn start_time() -> DateTime<FixedOffset> {
    "2026-02-08T09:30:00+08:00".parse().expect("start time")
}

fn open_runtime(
    workspace: &IsolatedWorkspace,
    config: Value,
    gateway: Arc<RosterGateway>,
    clock: Arc<ManualClock>,
) -> GachaRuntime {
    GachaRuntime::open(GachaRuntimeOptions {
        data_dir: workspace.data_dir(),
        templates_dir: workspace.root().join("templates"),
        config: GachaConfig::from_value(&config),
        gateway,
        renderer: Arc::new(EchoRenderer),
        clock,
        registry: None,
        rng_seed: Some(2608),
    })
    .expect("runtime opens")
}

fn group_message(sender: &str, text: &str) -> InboundMessage {
    serde_json::from_value(json!({
        "platform": "onebot",
        "group_id": 100,
        "sender_id": sender,
        "self_id": 999,
        "text": text,
    }))
    .expect("inbound message")
}

#[tokio::test]
async fn integration_keyword_draw_persists_and_survives_restart() {
    let workspace = IsolatedWorkspace::new("draw-restart");
    let gateway = Arc::new(RosterGateway::new(&["1", "2", "999"]));
    let clock = Arc::new(ManualClock::new(start_time()));
    let config = json!({"keyword_trigger_enabled": true, "auto_set_other_half": true});

    let runtime = open_runtime(&workspace, config.clone(), gateway.clone(), clock.clone());
    runtime
        .handle_message(&group_message("2", "大家好"))
        .await
        .expect("chatter");
    let outcome = runtime
        .handle_message(&group_message("1", "今日老婆"))
        .await
        .expect("draw");
    let DispatchOutcome::Handled { action, replies } = outcome else {
        panic!("draw keyword should be handled");
    };
    assert_eq!(action, GameAction::DrawWife);
    assert_eq!(replies.len(), 1);
    runtime.teardown().await.expect("teardown");
    drop(runtime);

    let raw = fs::read_to_string(workspace.data_dir().join(DAILY_RECORDS_FILE_NAME))
        .expect("daily records written");
    let persisted: DailyRecordSet = serde_json::from_str(&raw).expect("daily records parse");
    assert_eq!(persisted.date, "2026-02-08");
    let records = &persisted.groups["100"].records;
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].user_id, "1");
    assert_eq!(records[0].partner_id, "2");
    assert_eq!(records[0].partner_name, "nick-2");
    assert!(records[1].auto_set);
    assert!(workspace.data_dir().join(ACTIVE_USERS_FILE_NAME).exists());

    let reopened = open_runtime(&workspace, config, gateway, clock.clone());
    let history = reopened
        .run_command(GameAction::ShowHistory, &group_message("1", "我的老婆"))
        .await
        .expect("history");
    let [GameReply::Text { text }] = history.as_slice() else {
        panic!("history should be one text reply");
    };
    assert!(text.contains("【nick-2】 (09:30)"));

    let second = reopened
        .handle_message(&group_message("2", "抽老婆"))
        .await
        .expect("partner draws");
    assert!(second.stop_propagation());
    assert!(matches!(
        second.replies(),
        [GameReply::Segments { segments }] if segments[1] == MessageSegment::text(" 你今天已经有老婆了哦❤️~\n她是：【nick-1】\n")
    ));
}

#[tokio::test]
async fn integration_day_rollover_starts_fresh_records() {
    let workspace = IsolatedWorkspace::new("rollover");
    let gateway = Arc::new(RosterGateway::new(&["1", "2"]));
    let clock = Arc::new(ManualClock::new(start_time()));
    let runtime = open_runtime(&workspace, json!({}), gateway, clock.clone());

    runtime.track_active(&group_message("2", "hi")).await.expect("track");
    runtime
        .run_command(GameAction::DrawWife, &group_message("1", "抽老婆"))
        .await
        .expect("draw");
    clock.advance(Duration::days(1));

    let replies = runtime
        .run_command(GameAction::DrawWife, &group_message("1", "抽老婆"))
        .await
        .expect("next-day draw");
    let [GameReply::Segments { segments }] = replies.as_slice() else {
        panic!("draw should produce segments");
    };
    assert_eq!(segments[1], MessageSegment::text(" 你的今日老婆是：\n\n【nick-2】\n"));
    let store = runtime.store().lock().await;
    assert_eq!(store.daily_records().date, "2026-02-09");
    assert_eq!(store.daily_records().total_records(), 1);
}

#[tokio::test]
async fn integration_ranking_renders_after_force_marry() {
    let workspace = IsolatedWorkspace::new("ranking");
    fs::create_dir_all(workspace.root().join("templates")).expect("templates dir");
    fs::write(
        workspace.root().join("templates").join("rbq_ranking.html"),
        "{{ title }}",
    )
    .expect("ranking template");
    let gateway = Arc::new(RosterGateway::new(&["1", "2"]));
    let clock = Arc::new(ManualClock::new(start_time()));
    let runtime = open_runtime(
        &workspace,
        json!({"keyword_trigger_enabled": true, "keyword_trigger_mode": "starts_with"}),
        gateway,
        clock,
    );
    runtime.track_active(&group_message("2", "hi")).await.expect("track");

    let outcome = runtime
        .handle_message(&group_message("1", "强娶 [CQ:at,qq=2]"))
        .await
        .expect("force");
    assert!(outcome.stop_propagation());

    let ranking = runtime
        .handle_message(&group_message("1", "rbq排行"))
        .await
        .expect("ranking");
    assert_eq!(
        ranking.replies(),
        &[GameReply::image("file:///render/100.png")]
    );
}

#[tokio::test]
async fn regression_blacklisted_group_leaves_no_state_behind() {
    let workspace = IsolatedWorkspace::new("blacklist");
    let gateway = Arc::new(RosterGateway::new(&["1", "2"]));
    let clock = Arc::new(ManualClock::new(start_time()));
    let runtime = open_runtime(
        &workspace,
        json!({"keyword_trigger_enabled": true, "blacklist_groups": [100]}),
        gateway.clone(),
        clock,
    );

    let outcome = runtime
        .handle_message(&group_message("1", "抽老婆"))
        .await
        .expect("blocked");
    assert_eq!(
        outcome,
        DispatchOutcome::Skipped {
            reason_code: "skip_group_not_allowed"
        }
    );
    assert!(runtime.store().lock().await.active_users().is_empty());
    assert!(gateway.sent.lock().await.is_empty());
}
