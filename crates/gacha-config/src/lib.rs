//! Typed plugin configuration for the gacha game.
//!
//! The host hands over a flat, loosely typed settings object; this crate turns it
//! into a [`GachaConfig`] once at startup, clamping numeric bounds and falling back
//! to defaults instead of failing on bad input.

pub mod config_view;

pub use config_view::*;
