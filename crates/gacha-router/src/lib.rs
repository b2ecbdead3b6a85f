//! Keyword routing for the gacha game.
//!
//! Maps free-text chat messages to game actions. Routing is a pure function of an
//! immutable route table, the input text, and a [`MatchMode`]; nothing here knows
//! about chat platforms, permissions beyond the declared level, or persistence.
//!
//! ```rust
//! use gacha_router::{default_keyword_router, GameAction, MatchMode};
//!
//! let router = default_keyword_router();
//! let route = router.match_route("重置强娶时间", MatchMode::Contains).expect("route");
//! assert_eq!(route.action, GameAction::ResetForceCd);
//! assert!(router.match_command("强娶别人呢").is_none());
//! ```

pub mod keyword_router;
pub mod keyword_routes;

pub use keyword_router::*;
pub use keyword_routes::*;
