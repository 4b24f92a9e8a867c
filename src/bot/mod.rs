//! Bot module for handling chat interactions
//!
//! This module is split into several submodules:
//! - `engine`: Routes inbound messages and runs the per-user login flow
//! - `attendance`: Year, semester and confirmation prompts
//! - `commands`: Fetches a portal section and replies with it
//! - `transport`: Outbound messaging seam
//! - `telegram`: Bot API implementation of the transport and the dispatcher endpoint
//! - `ui_builder`: Formats menus, option lists and fetched pages

pub mod attendance;
pub mod commands;
pub mod engine;
pub mod telegram;
pub mod transport;
pub mod ui_builder;

pub use engine::{Dispatch, Engine};
pub use telegram::{message_handler, TelegramTransport};
pub use transport::ChatTransport;
