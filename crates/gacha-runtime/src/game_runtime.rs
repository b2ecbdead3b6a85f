use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use gacha_config::GachaConfig;
use gacha_core::Clock;
use gacha_gateway::{MessagingGateway, RenderService, WithdrawScheduler};
use gacha_router::{default_keyword_router, GameAction};
use gacha_store::RetentionStore;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::dispatch_gate::{CommandRegistry, DispatchGate, DispatchOutcome, StaticCommandRegistry};
use crate::game_commands::{GameCommandDeps, GameCommandService, SharedRetentionStore};
use crate::inbound_message::{GameReply, InboundMessage};

/// Host-provided pieces needed to start a [`GachaRuntime`].
pub struct GachaRuntimeOptions {
    pub data_dir: PathBuf,
    pub templates_dir: PathBuf,
    pub config: GachaConfig,
    pub gateway: Arc<dyn MessagingGateway>,
    pub renderer: Arc<dyn RenderService>,
    pub clock: Arc<dyn Clock>,
    /// Defaults to [`StaticCommandRegistry::with_defaults`].
    pub registry: Option<Arc<dyn CommandRegistry>>,
    pub rng_seed: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Counts reported by [`GachaRuntime::teardown`].
pub struct TeardownReport {
    pub cancelled_withdrawals: usize,
}

/// The game as a host plugin sees it: activity tracking, keyword dispatch, explicit
/// commands, and teardown.
pub struct GachaRuntime {
    config: Arc<GachaConfig>,
    gate: DispatchGate,
    registry: Arc<dyn CommandRegistry>,
    commands: Arc<GameCommandService>,
    withdraw: Arc<WithdrawScheduler>,
}

impl GachaRuntime {
    pub fn open(options: GachaRuntimeOptions) -> Result<Self> {
        let config = Arc::new(options.config);
        let store = RetentionStore::open(&options.data_dir, &config).with_context(|| {
            format!(
                "failed to open retention store in {}",
                options.data_dir.display()
            )
        })?;
        let registry = options
            .registry
            .unwrap_or_else(|| Arc::new(StaticCommandRegistry::with_defaults()));
        let withdraw = Arc::new(WithdrawScheduler::new(Arc::clone(&options.gateway)));
        let commands = Arc::new(GameCommandService::new(GameCommandDeps {
            config: Arc::clone(&config),
            store: Arc::new(Mutex::new(store)),
            gateway: options.gateway,
            renderer: options.renderer,
            withdraw: Arc::clone(&withdraw),
            clock: options.clock,
            templates_dir: options.templates_dir,
            rng_seed: options.rng_seed,
        }));
        let gate = DispatchGate::new(
            default_keyword_router(),
            Arc::clone(&config),
            Arc::clone(&registry),
        );
        info!(
            daily_limit = config.daily_limit,
            keyword_trigger_enabled = config.keyword_trigger_enabled,
            keyword_trigger_mode = config.keyword_trigger_mode.as_str(),
            auto_withdraw_enabled = config.auto_withdraw_enabled,
            "gacha runtime started"
        );
        Ok(Self {
            config,
            gate,
            registry,
            commands,
            withdraw,
        })
    }

    pub fn config(&self) -> &GachaConfig {
        &self.config
    }

    pub fn store(&self) -> &SharedRetentionStore {
        self.commands.store()
    }

    pub fn commands(&self) -> &GameCommandService {
        &self.commands
    }

    /// Passive listener: stamps the sender of every group message.
    pub async fn track_active(&self, message: &InboundMessage) -> Result<bool> {
        self.commands.track_active(message).await
    }

    /// Offers a plain-text message to keyword dispatch.
    pub async fn keyword_trigger(&self, message: &InboundMessage) -> Result<DispatchOutcome> {
        self.gate.dispatch(message, self.commands.as_ref()).await
    }

    /// Activity tracking followed by keyword dispatch, as a host does for each message.
    pub async fn handle_message(&self, message: &InboundMessage) -> Result<DispatchOutcome> {
        if let Err(error) = self.track_active(message).await {
            warn!(
                group_id = message.group_id().unwrap_or_default(),
                sender_id = %message.sender_id,
                reason_code = "activity_write_failed",
                error = %error,
                "activity tracking failed; continuing to keyword dispatch"
            );
        }
        self.keyword_trigger(message).await
    }

    /// Explicit command path; checks the registry the same way keyword dispatch does.
    pub async fn run_command(
        &self,
        action: GameAction,
        message: &InboundMessage,
    ) -> Result<Vec<GameReply>> {
        if let Some(metadata) = self.registry.command_metadata(action) {
            if !metadata.permits(message) {
                warn!(
                    action = action.as_str(),
                    sender_id = %message.sender_id,
                    reason_code = "skip_permission_denied",
                    "explicit command rejected"
                );
                return Ok(Vec::new());
            }
        }
        self.commands.run_action(action, message).await
    }

    /// Persists every collection and cancels pending auto-withdraw deletes.
    pub async fn teardown(&self) -> Result<TeardownReport> {
        self.store().lock().await.save_all()?;
        let cancelled_withdrawals = self.withdraw.cancel_all();
        info!(cancelled_withdrawals, "gacha runtime stopped");
        Ok(TeardownReport {
            cancelled_withdrawals,
        })
    }
}
