use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset};
use gacha_config::GachaConfig;
use gacha_core::{iso_local_timestamp, unix_seconds, Clock};
use gacha_gateway::{
    extract_target_id, fallback_user_name, member_name_map, resolve_member_name, GroupMember,
    MessagingGateway, RenderOptions, RenderService, WithdrawScheduler, MENTION_ALL,
};
use gacha_router::GameAction;
use gacha_store::{ActivityTracker, DrawRecord, RetentionStore, SENTINEL_USER_ID};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde_json::json;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::dispatch_gate::ActionHandler;
use crate::game_replies::{
    cooldown_reply, daily_limit_reply, draw_reply, force_marry_reply, history_reply,
    missing_template_reply, COOLDOWN_RESET_TEXT, DEFAULT_GROUP_NAME, EMPTY_POOL_TEXT,
    EMPTY_RANKING_TEXT, FORCE_EXCLUDED_TEXT, GROUP_ONLY_TEXT, MENTION_REQUIRED_TEXT,
    MISSING_RANKING_TEMPLATE_TEXT, NO_COOLDOWN_TEXT, NO_DRAW_TODAY_TEXT, PRIVATE_RANKING_TEXT,
    RANKING_TITLE, RECORDS_RESET_TEXT, SELF_MARRY_TEXT,
};
use crate::game_rules::{
    build_rbq_top_ranking, compute_force_marry_reset, graph_clip_height, graph_node_count,
    help_text, maybe_add_other_half_record, ranking_clip_height, select_draw_pool,
    GRAPH_CLIP_WIDTH, RANKING_CLIP_WIDTH, RANKING_TOP_N,
};
use crate::inbound_message::{GameReply, InboundMessage};

pub const GRAPH_TEMPLATE_FILE_NAME: &str = "graph_template.html";
pub const GRAPH_SCRIPT_FILE_NAME: &str = "vis-network.min.js";
pub const RANKING_TEMPLATE_FILE_NAME: &str = "rbq_ranking.html";

/// Shared handle to the single retention store.
pub type SharedRetentionStore = Arc<Mutex<RetentionStore>>;

/// Everything [`GameCommandService`] needs from its host.
pub struct GameCommandDeps {
    pub config: Arc<GachaConfig>,
    pub store: SharedRetentionStore,
    pub gateway: Arc<dyn MessagingGateway>,
    pub renderer: Arc<dyn RenderService>,
    pub withdraw: Arc<WithdrawScheduler>,
    pub clock: Arc<dyn Clock>,
    pub templates_dir: PathBuf,
    /// Fixed seed for reproducible draws; entropy when `None`.
    pub rng_seed: Option<u64>,
}

/// Implements the eight game actions on top of the retention store and the gateway seams.
///
/// The store lock is taken for the state-touching part of each handler and released
/// before any gateway or render call.
pub struct GameCommandService {
    config: Arc<GachaConfig>,
    store: SharedRetentionStore,
    activity: ActivityTracker,
    gateway: Arc<dyn MessagingGateway>,
    renderer: Arc<dyn RenderService>,
    withdraw: Arc<WithdrawScheduler>,
    clock: Arc<dyn Clock>,
    templates_dir: PathBuf,
    rng: StdMutex<StdRng>,
}

impl GameCommandService {
    pub fn new(deps: GameCommandDeps) -> Self {
        let rng = match deps.rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            activity: ActivityTracker::new(Arc::clone(&deps.config)),
            config: deps.config,
            store: deps.store,
            gateway: deps.gateway,
            renderer: deps.renderer,
            withdraw: deps.withdraw,
            clock: deps.clock,
            templates_dir: deps.templates_dir,
            rng: StdMutex::new(rng),
        }
    }

    pub fn store(&self) -> &SharedRetentionStore {
        &self.store
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Stamps the sender as active in the message's group.
    pub async fn track_active(&self, message: &InboundMessage) -> Result<bool> {
        let Some(group_id) = message.group_id() else {
            return Ok(false);
        };
        let now = self.clock.now_unix();
        let mut store = self.store.lock().await;
        self.activity
            .record_active(&mut store, group_id, &message.sender_id, &message.self_id, now)
    }

    pub async fn run_action(
        &self,
        action: GameAction,
        message: &InboundMessage,
    ) -> Result<Vec<GameReply>> {
        match action {
            GameAction::DrawWife => self.draw_wife(message).await,
            GameAction::ShowHistory => self.show_history(message).await,
            GameAction::ForceMarry => self.force_marry(message).await,
            GameAction::ShowGraph => self.show_graph(message).await,
            GameAction::RbqRanking => self.rbq_ranking(message).await,
            GameAction::ShowHelp => self.show_help(message).await,
            GameAction::ResetRecords => self.reset_records(message).await,
            GameAction::ResetForceCd => self.reset_force_cd(message).await,
        }
    }

    fn allowed_group<'a>(&self, message: &'a InboundMessage) -> Option<&'a str> {
        message
            .group_id()
            .filter(|group_id| self.config.is_allowed_group(group_id))
    }

    /// Reply for a sender still inside the force-marry cooldown; creates the group's cooldown entry.
    fn pending_cooldown_reply(
        &self,
        store: &mut RetentionStore,
        group_id: &str,
        user_id: &str,
        now: &DateTime<FixedOffset>,
    ) -> Option<GameReply> {
        let last_time = store
            .cooldowns_mut()
            .entry(group_id.to_string())
            .or_default()
            .get(user_id)
            .copied()
            .unwrap_or(0.0);
        compute_force_marry_reset(last_time, now, self.config.force_marry_cd_days)
            .filter(|reset| reset.is_cooling_down())
            .map(|reset| cooldown_reply(&reset.reset_at, reset.remaining_secs))
    }

    fn choose_partner(&self, pool: &[String]) -> Option<String> {
        let mut rng = match self.rng.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        pool.choose(&mut *rng).cloned()
    }

    fn sender_name(message: &InboundMessage) -> String {
        message
            .sender_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| fallback_user_name(&message.sender_id))
    }

    async fn fetch_members(&self, group_id: &str) -> Vec<GroupMember> {
        match self.gateway.fetch_group_members(group_id).await {
            Ok(members) => members,
            Err(error) => {
                warn!(
                    group_id,
                    error = %error,
                    reason_code = "group_roster_unavailable",
                    "failed to fetch group members; falling back to cached activity"
                );
                Vec::new()
            }
        }
    }

    async fn read_template(&self, file_name: &str) -> Result<String> {
        let path = self.templates_dir.join(file_name);
        tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("failed to read template {}", path.display()))
    }

    fn template_path(&self, file_name: &str) -> PathBuf {
        self.templates_dir.join(file_name)
    }

    /// Hands `reply` back to the host, or sends it directly and schedules a delete when
    /// auto-withdraw is enabled.
    async fn deliver(&self, message: &InboundMessage, reply: GameReply) -> Result<Vec<GameReply>> {
        if !self.config.auto_withdraw_enabled {
            return Ok(vec![reply]);
        }
        let target = message.reply_target();
        let message_id = self
            .gateway
            .send_message(&target, &reply.into_segments())
            .await
            .with_context(|| format!("failed to send auto-withdraw reply to {target}"))?;
        match message_id {
            Some(message_id) => self.withdraw.schedule_delete(
                message_id,
                Duration::from_secs(self.config.auto_withdraw_delay_seconds.max(1)),
            ),
            None => warn!(
                target = %target,
                reason_code = "auto_withdraw_missing_message_id",
                "send returned no message id; auto-withdraw skipped"
            ),
        }
        Ok(Vec::new())
    }

    pub async fn draw_wife(&self, message: &InboundMessage) -> Result<Vec<GameReply>> {
        if message.is_private() {
            return Ok(vec![GameReply::text(GROUP_ONLY_TEXT)]);
        }
        let Some(group_id) = self.allowed_group(message) else {
            return Ok(Vec::new());
        };
        let user_id = message.sender_id.as_str();
        let now = self.clock.now();
        let now_unix = unix_seconds(&now);
        let today = now.date_naive();
        let daily_limit = self.config.daily_limit.max(1);

        {
            let mut store = self.store.lock().await;
            self.activity.cleanup_inactive(&mut store, group_id, now_unix)?;
            let records = store.group_records_mut(group_id, today);
            let user_records = records
                .iter()
                .filter(|record| record.user_id == user_id)
                .collect::<Vec<_>>();
            if let Some(reply) = daily_limit_reply(&user_records, user_id, daily_limit) {
                drop(store);
                return self.deliver(message, reply).await;
            }
        }

        let members = self.fetch_members(group_id).await;
        let roster = members
            .iter()
            .map(|member| member.user_id.clone())
            .collect::<BTreeSet<_>>();

        let reply = {
            let mut store = self.store.lock().await;
            let drawn_today = store
                .group_records_mut(group_id, today)
                .iter()
                .filter(|record| record.user_id == user_id)
                .cloned()
                .collect::<Vec<_>>();
            let drawn_refs = drawn_today.iter().collect::<Vec<_>>();
            if let Some(reply) = daily_limit_reply(&drawn_refs, user_id, daily_limit) {
                drop(store);
                return self.deliver(message, reply).await;
            }

            let mut excluded = self.config.excluded_users.clone();
            excluded.extend([
                message.self_id.clone(),
                user_id.to_string(),
                SENTINEL_USER_ID.to_string(),
            ]);
            let active_ids = store
                .active_users()
                .get(group_id)
                .map(|group| group.keys().cloned().collect::<Vec<_>>())
                .unwrap_or_default();
            let selection =
                select_draw_pool(active_ids.iter().map(String::as_str), &roster, &excluded);
            if !selection.removed.is_empty() {
                if let Some(group) = store.active_users_mut().get_mut(group_id) {
                    for removed in &selection.removed {
                        group.remove(removed);
                    }
                }
                info!(
                    group_id,
                    removed = selection.removed.len(),
                    "departed members removed from active users"
                );
                store.save_active_users()?;
            }

            let Some(partner_id) = self.choose_partner(&selection.pool) else {
                return Ok(vec![GameReply::text(EMPTY_POOL_TEXT)]);
            };
            let partner_name =
                resolve_member_name(&members, &partner_id, &fallback_user_name(&partner_id));
            let user_name = resolve_member_name(&members, user_id, &Self::sender_name(message));
            let timestamp = iso_local_timestamp(&now);

            let records = store.group_records_mut(group_id, today);
            records.push(DrawRecord::drawn(
                user_id,
                partner_id.as_str(),
                partner_name.as_str(),
                timestamp.as_str(),
            ));
            maybe_add_other_half_record(
                records,
                user_id,
                &user_name,
                &partner_id,
                &partner_name,
                self.config.auto_set_other_half,
                &timestamp,
            );
            store.save_daily_records()?;
            info!(group_id, user_id, partner_id = %partner_id, "partner drawn");

            let remaining = daily_limit.saturating_sub(drawn_today.len() + 1);
            draw_reply(user_id, &partner_id, &partner_name, remaining)
        };
        self.deliver(message, reply).await
    }

    pub async fn show_history(&self, message: &InboundMessage) -> Result<Vec<GameReply>> {
        if message.is_private() {
            return Ok(vec![GameReply::text(GROUP_ONLY_TEXT)]);
        }
        let Some(group_id) = self.allowed_group(message) else {
            return Ok(Vec::new());
        };
        let today = self.clock.today();
        let store = self.store.lock().await;
        let user_records = store
            .group_records_for_day(group_id, today)
            .iter()
            .filter(|record| record.user_id == message.sender_id)
            .collect::<Vec<_>>();
        if user_records.is_empty() {
            return Ok(vec![GameReply::text(NO_DRAW_TODAY_TEXT)]);
        }
        Ok(vec![history_reply(
            &user_records,
            self.config.daily_limit.max(1),
        )])
    }

    pub async fn force_marry(&self, message: &InboundMessage) -> Result<Vec<GameReply>> {
        if message.is_private() {
            return Ok(vec![GameReply::text(GROUP_ONLY_TEXT)]);
        }
        let Some(group_id) = self.allowed_group(message) else {
            return Ok(Vec::new());
        };
        let user_id = message.sender_id.as_str();
        let now = self.clock.now();
        let now_unix = unix_seconds(&now);

        {
            let mut store = self.store.lock().await;
            if let Some(reply) = self.pending_cooldown_reply(&mut store, group_id, user_id, &now) {
                return Ok(vec![reply]);
            }
        }

        let target_id = match extract_target_id(&message.mentions, &message.text) {
            Some(target_id) if target_id != MENTION_ALL => target_id,
            _ => return Ok(vec![GameReply::text(MENTION_REQUIRED_TEXT)]),
        };
        if target_id == user_id {
            return Ok(vec![GameReply::text(SELF_MARRY_TEXT)]);
        }
        let force_excluded = &self.config.force_marry_excluded_users;
        if force_excluded.contains(&target_id)
            || target_id == message.self_id
            || target_id == SENTINEL_USER_ID
        {
            return Ok(vec![GameReply::text(FORCE_EXCLUDED_TEXT)]);
        }

        let members = self.fetch_members(group_id).await;
        let target_name =
            resolve_member_name(&members, &target_id, &fallback_user_name(&target_id));
        let user_name = resolve_member_name(&members, user_id, &Self::sender_name(message));

        {
            let mut store = self.store.lock().await;
            // Another force-marry from this sender may have landed during the roster fetch.
            if let Some(reply) = self.pending_cooldown_reply(&mut store, group_id, user_id, &now) {
                return Ok(vec![reply]);
            }
            store
                .ranking_stats_mut()
                .entry(group_id.to_string())
                .or_default()
                .entry(target_id.clone())
                .or_default()
                .push(now_unix);
            store.clean_ranking_stats(now_unix)?;

            let timestamp = iso_local_timestamp(&now);
            let records = store.group_records_mut(group_id, now.date_naive());
            records.retain(|record| record.user_id != user_id);
            records.push(
                DrawRecord::drawn(
                    user_id,
                    target_id.as_str(),
                    target_name.as_str(),
                    timestamp.as_str(),
                )
                .forced(),
            );
            maybe_add_other_half_record(
                records,
                user_id,
                &user_name,
                &target_id,
                &target_name,
                self.config.auto_set_other_half,
                &timestamp,
            );
            store
                .cooldowns_mut()
                .entry(group_id.to_string())
                .or_default()
                .insert(user_id.to_string(), now_unix);
            store.save_daily_records()?;
            store.save_cooldowns()?;
        }
        info!(group_id, user_id, target_id = %target_id, "force-marry recorded");

        self.deliver(message, force_marry_reply(user_id, &target_id, &target_name))
            .await
    }

    pub async fn show_graph(&self, message: &InboundMessage) -> Result<Vec<GameReply>> {
        if message.is_private() {
            return Ok(vec![GameReply::text(GROUP_ONLY_TEXT)]);
        }
        let Some(group_id) = self.allowed_group(message) else {
            return Ok(Vec::new());
        };

        let script = match self.read_template(GRAPH_SCRIPT_FILE_NAME).await {
            Ok(script) => script,
            Err(error) => {
                error!(error = %error, "graph script missing; rendering without it");
                String::new()
            }
        };
        let template_path = self.template_path(GRAPH_TEMPLATE_FILE_NAME);
        let Ok(template) = self.read_template(GRAPH_TEMPLATE_FILE_NAME).await else {
            return Ok(vec![missing_template_reply(&template_path)]);
        };

        let records = {
            let store = self.store.lock().await;
            store
                .group_records_for_day(group_id, self.clock.today())
                .to_vec()
        };

        let group_name = match self.gateway.fetch_group_info(group_id).await {
            Ok(info) => info
                .group_name
                .filter(|name| !name.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_GROUP_NAME.to_string()),
            Err(error) => {
                warn!(group_id, error = %error, "failed to fetch group info");
                DEFAULT_GROUP_NAME.to_string()
            }
        };
        let user_map = member_name_map(&self.fetch_members(group_id).await);

        let options = RenderOptions::png_clip(
            GRAPH_CLIP_WIDTH,
            graph_clip_height(graph_node_count(&records)),
        );
        let context = json!({
            "vis_js_content": script,
            "group_id": group_id,
            "group_name": group_name,
            "user_map": user_map,
            "records": records,
            "iterations": self.config.iterations,
        });
        Ok(self.render_image(&template, &context, &options, "graph").await)
    }

    pub async fn rbq_ranking(&self, message: &InboundMessage) -> Result<Vec<GameReply>> {
        if message.is_private() {
            return Ok(vec![GameReply::text(PRIVATE_RANKING_TEXT)]);
        }
        let Some(group_id) = self.allowed_group(message) else {
            return Ok(Vec::new());
        };
        let now_unix = self.clock.now_unix();
        let group_stats = {
            let mut store = self.store.lock().await;
            store.clean_ranking_stats(now_unix)?;
            store.ranking_stats().get(group_id).cloned().unwrap_or_default()
        };
        if group_stats.is_empty() {
            return Ok(vec![GameReply::text(EMPTY_RANKING_TEXT)]);
        }

        let names = member_name_map(&self.fetch_members(group_id).await);
        let ranking = build_rbq_top_ranking(&group_stats, &names, RANKING_TOP_N);

        let Ok(template) = self.read_template(RANKING_TEMPLATE_FILE_NAME).await else {
            return Ok(vec![GameReply::text(MISSING_RANKING_TEMPLATE_TEXT)]);
        };
        let options = RenderOptions::png_clip(RANKING_CLIP_WIDTH, ranking_clip_height(ranking.len()));
        let context = json!({
            "group_id": group_id,
            "ranking": ranking,
            "title": RANKING_TITLE,
        });
        Ok(self.render_image(&template, &context, &options, "ranking").await)
    }

    async fn render_image(
        &self,
        template: &str,
        context: &serde_json::Value,
        options: &RenderOptions,
        card: &str,
    ) -> Vec<GameReply> {
        match self.renderer.render(template, context, options).await {
            Ok(url) => vec![GameReply::image(url)],
            Err(error) => {
                error!(card, error = %error, "render failed");
                Vec::new()
            }
        }
    }

    /// Private chats are checked as the empty group id, so a non-empty allow-list silences them.
    pub async fn show_help(&self, message: &InboundMessage) -> Result<Vec<GameReply>> {
        if !self
            .config
            .is_allowed_group(message.group_id().unwrap_or_default())
        {
            return Ok(Vec::new());
        }
        Ok(vec![GameReply::text(help_text(self.config.daily_limit.max(1)))])
    }

    pub async fn reset_records(&self, _message: &InboundMessage) -> Result<Vec<GameReply>> {
        let today = self.clock.today();
        let mut store = self.store.lock().await;
        store.reset_today(today)?;
        Ok(vec![GameReply::text(RECORDS_RESET_TEXT)])
    }

    pub async fn reset_force_cd(&self, message: &InboundMessage) -> Result<Vec<GameReply>> {
        let Some(group_id) = message.group_id() else {
            return Ok(vec![GameReply::text(GROUP_ONLY_TEXT)]);
        };
        let mut store = self.store.lock().await;
        if store.reset_cooldown_for_group(group_id)? {
            Ok(vec![GameReply::text(COOLDOWN_RESET_TEXT)])
        } else {
            Ok(vec![GameReply::text(NO_COOLDOWN_TEXT)])
        }
    }

    pub fn templates_dir(&self) -> &Path {
        &self.templates_dir
    }
}

#[async_trait]
impl ActionHandler for GameCommandService {
    async fn record_activity(&self, message: &InboundMessage) -> Result<()> {
        self.track_active(message).await.map(|_| ())
    }

    async fn handle_action(
        &self,
        action: GameAction,
        message: &InboundMessage,
    ) -> Result<Vec<GameReply>> {
        self.run_action(action, message).await
    }
}
