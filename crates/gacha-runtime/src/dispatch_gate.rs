use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use gacha_config::GachaConfig;
use gacha_router::{
    default_keyword_routes, starts_with_command_prefix, GameAction, KeywordRoute, KeywordRouter,
    PermissionLevel,
};
use serde::Serialize;
use tracing::{debug, warn};

use crate::inbound_message::{GameReply, InboundMessage};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
/// Host-side registration of a command: whether it is enabled and who may run it.
pub struct CommandMetadata {
    pub enabled: bool,
    pub required_permission: PermissionLevel,
}

impl CommandMetadata {
    pub fn permits(&self, message: &InboundMessage) -> bool {
        self.enabled && permission_allows(self.required_permission, message)
    }
}

/// Trait contract for looking up host command registrations by action.
pub trait CommandRegistry: Send + Sync {
    fn command_metadata(&self, action: GameAction) -> Option<CommandMetadata>;
}

#[derive(Debug, Clone, Default)]
/// In-memory [`CommandRegistry`].
pub struct StaticCommandRegistry {
    commands: BTreeMap<GameAction, CommandMetadata>,
}

impl StaticCommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers every action of `routes` as enabled with the route's permission.
    pub fn from_routes(routes: &[KeywordRoute]) -> Self {
        let mut registry = Self::new();
        for route in routes {
            registry
                .commands
                .entry(route.action)
                .or_insert(CommandMetadata {
                    enabled: true,
                    required_permission: route.permission,
                });
        }
        registry
    }

    pub fn with_defaults() -> Self {
        Self::from_routes(&default_keyword_routes())
    }

    pub fn register(&mut self, action: GameAction, metadata: CommandMetadata) {
        self.commands.insert(action, metadata);
    }

    pub fn set_enabled(&mut self, action: GameAction, enabled: bool) -> bool {
        match self.commands.get_mut(&action) {
            Some(metadata) => {
                metadata.enabled = enabled;
                true
            }
            None => false,
        }
    }
}

impl CommandRegistry for StaticCommandRegistry {
    fn command_metadata(&self, action: GameAction) -> Option<CommandMetadata> {
        self.commands.get(&action).copied()
    }
}

fn permission_allows(permission: PermissionLevel, message: &InboundMessage) -> bool {
    match permission {
        PermissionLevel::Member => true,
        PermissionLevel::Admin => message.is_admin,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Enumerates supported `GateDecision` values.
pub enum GateDecision {
    Route(KeywordRoute),
    Skip { reason_code: &'static str },
}

impl GateDecision {
    fn skip(reason_code: &'static str) -> Self {
        Self::Skip { reason_code }
    }

    pub fn reason_code(&self) -> &'static str {
        match self {
            Self::Route(_) => "dispatch_route_matched",
            Self::Skip { reason_code } => *reason_code,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Result of offering a message to keyword dispatch.
pub enum DispatchOutcome {
    Skipped { reason_code: &'static str },
    Handled {
        action: GameAction,
        replies: Vec<GameReply>,
    },
}

impl DispatchOutcome {
    /// True when the host must not pass the message to further handlers.
    pub fn stop_propagation(&self) -> bool {
        matches!(self, Self::Handled { .. })
    }

    pub fn replies(&self) -> &[GameReply] {
        match self {
            Self::Handled { replies, .. } => replies,
            Self::Skipped { .. } => &[],
        }
    }

    pub fn into_replies(self) -> Vec<GameReply> {
        match self {
            Self::Handled { replies, .. } => replies,
            Self::Skipped { .. } => Vec::new(),
        }
    }
}

#[async_trait]
/// Trait contract for the side that executes routed actions.
pub trait ActionHandler: Send + Sync {
    async fn record_activity(&self, message: &InboundMessage) -> Result<()>;

    fn supports(&self, _action: GameAction) -> bool {
        true
    }

    async fn handle_action(
        &self,
        action: GameAction,
        message: &InboundMessage,
    ) -> Result<Vec<GameReply>>;
}

/// Keyword-trigger gate in front of the router.
pub struct DispatchGate {
    router: KeywordRouter,
    config: Arc<GachaConfig>,
    registry: Arc<dyn CommandRegistry>,
}

impl DispatchGate {
    pub fn new(
        router: KeywordRouter,
        config: Arc<GachaConfig>,
        registry: Arc<dyn CommandRegistry>,
    ) -> Self {
        Self {
            router,
            config,
            registry,
        }
    }

    pub fn router(&self) -> &KeywordRouter {
        &self.router
    }

    /// Runs the gates in order and stops at the first one that rejects.
    pub fn evaluate(&self, message: &InboundMessage) -> GateDecision {
        if !self.config.keyword_trigger_enabled {
            return GateDecision::skip("skip_keyword_trigger_disabled");
        }
        let Some(group_id) = message.group_id() else {
            return GateDecision::skip("skip_not_group_message");
        };
        if !self.config.is_allowed_group(group_id) {
            return GateDecision::skip("skip_group_not_allowed");
        }
        if message.text.trim().is_empty() {
            return GateDecision::skip("skip_empty_message");
        }
        if message.is_wake_command {
            return GateDecision::skip("skip_wake_command");
        }
        if starts_with_command_prefix(&message.text) {
            return GateDecision::skip("skip_command_prefix");
        }

        let route = self
            .router
            .match_route(&message.text, self.config.keyword_trigger_mode)
            .or_else(|| self.router.match_command(&message.text));
        let Some(route) = route else {
            return GateDecision::skip("skip_no_route");
        };

        match self.registry.command_metadata(route.action) {
            Some(metadata) if !metadata.enabled => GateDecision::skip("skip_command_disabled"),
            Some(metadata) if !metadata.permits(message) => {
                GateDecision::skip("skip_permission_denied")
            }
            Some(_) => GateDecision::Route(route.clone()),
            None if permission_allows(route.permission, message) => {
                GateDecision::Route(route.clone())
            }
            None => GateDecision::skip("skip_permission_denied"),
        }
    }

    /// Gates the message, then records activity and runs the handler for the routed action.
    pub async fn dispatch(
        &self,
        message: &InboundMessage,
        handler: &dyn ActionHandler,
    ) -> Result<DispatchOutcome> {
        let route = match self.evaluate(message) {
            GateDecision::Route(route) => route,
            GateDecision::Skip { reason_code } => {
                debug!(
                    group_id = message.group_id().unwrap_or_default(),
                    sender_id = %message.sender_id,
                    reason_code,
                    "keyword dispatch skipped"
                );
                return Ok(DispatchOutcome::Skipped { reason_code });
            }
        };

        if let Err(error) = handler.record_activity(message).await {
            warn!(
                group_id = message.group_id().unwrap_or_default(),
                sender_id = %message.sender_id,
                reason_code = "activity_write_failed",
                error = %error,
                "activity bump failed; dispatching anyway"
            );
        }

        if !handler.supports(route.action) {
            warn!(
                action = route.action.as_str(),
                keyword = %route.keyword,
                reason_code = "skip_unknown_action",
                "keyword route matched an action without a handler; ignored"
            );
            return Ok(DispatchOutcome::Skipped {
                reason_code: "skip_unknown_action",
            });
        }

        let replies = handler.handle_action(route.action, message).await?;
        debug!(
            action = route.action.as_str(),
            replies = replies.len(),
            "keyword dispatch handled"
        );
        Ok(DispatchOutcome::Handled {
            action: route.action,
            replies,
        })
    }
}
