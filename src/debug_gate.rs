//! Debug access gate.
//!
//! A configured allow-list decides who may flip the process-wide debug flag.
//! While the flag is on, inbound messages and session snapshots are logged.

use chrono::Utc;
use std::borrow::Cow;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::info;

use crate::session::{parse_login_command, LoginCommand, UserId};

/// Result of a `/debug` request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebugToggle {
    Enabled,
    Disabled,
    Unauthorized,
}

/// Remove everything after `@` in a user identifier
pub fn strip_domain(user: &str) -> &str {
    user.split('@').next().unwrap_or(user)
}

/// Replace the password of a `/login` command before it is logged
pub fn redact_inbound(text: &str) -> Cow<'_, str> {
    match parse_login_command(text) {
        LoginCommand::Valid(credentials) => {
            Cow::Owned(format!("/login {} <redacted>", credentials.username))
        }
        LoginCommand::NotLogin | LoginCommand::MissingArguments => Cow::Borrowed(text),
    }
}

#[derive(Debug, Default)]
pub struct DebugGate {
    allow_list: HashSet<String>,
    enabled: AtomicBool,
}

impl DebugGate {
    pub fn new(allow_list: HashSet<String>) -> Self {
        Self {
            allow_list,
            enabled: AtomicBool::new(false),
        }
    }

    /// Group chat sessions (`<chat>/<sender>`) are matched on the sender
    pub fn is_debug_user(&self, user: &UserId) -> bool {
        let id = strip_domain(user.as_str());
        let sender = id.rsplit('/').next().unwrap_or(id);
        self.allow_list.contains(sender)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// Flip the flag for an allowed user and report the new state
    pub fn toggle(&self, user: &UserId) -> DebugToggle {
        if !self.is_debug_user(user) {
            info!(user_id = %user, "Debug toggle refused for user outside allow-list");
            return DebugToggle::Unauthorized;
        }

        let was_enabled = self.enabled.fetch_xor(true, Ordering::SeqCst);
        if was_enabled {
            info!(user_id = %user, at = %Utc::now().to_rfc3339(), "Debug mode deactivated");
            DebugToggle::Disabled
        } else {
            info!(user_id = %user, at = %Utc::now().to_rfc3339(), "Debug mode activated");
            DebugToggle::Enabled
        }
    }

    /// Log an inbound message when debug mode is on; passwords are redacted
    pub fn log_inbound(&self, user: &UserId, text: &str) {
        if self.is_enabled() {
            let text = redact_inbound(text);
            info!(user_id = %user, text = %text, at = %Utc::now().to_rfc3339(), "Debug: inbound message");
        }
    }

    /// Log a serializable value when debug mode is on
    pub fn log_snapshot<T: serde::Serialize>(&self, user: &UserId, label: &str, value: &T) {
        if self.is_enabled() {
            match serde_json::to_string(value) {
                Ok(json) => info!(user_id = %user, label = label, snapshot = %json, "Debug: session snapshot"),
                Err(e) => info!(user_id = %user, error = %e, "Debug: snapshot not serializable"),
            }
        }
    }
}
