//! Outbound seams of the gacha game.
//!
//! The game never talks to a chat protocol directly: it sends segments through a
//! [`MessagingGateway`], renders cards through a [`RenderService`], and defers
//! message deletion to a [`WithdrawScheduler`]. Hosts provide the implementations.

pub mod gateway_contract;
pub mod message_parsing;
pub mod withdraw_scheduler;

pub use gateway_contract::*;
pub use message_parsing::*;
pub use withdraw_scheduler::*;
