//! Game runtime for the group-chat partner gacha.
//!
//! Wires the retention store, keyword router, and gateway seams into the eight
//! game actions, the keyword dispatch gate, and the host-facing [`GachaRuntime`].

pub mod dispatch_gate;
pub mod game_commands;
pub mod game_replies;
pub mod game_rules;
pub mod game_runtime;
pub mod inbound_message;

#[cfg(test)]
mod test_fakes;

pub use dispatch_gate::*;
pub use game_commands::*;
pub use game_replies::*;
pub use game_rules::*;
pub use game_runtime::*;
pub use inbound_message::*;
