//! Menu command handlers.
//!
//! Each handler fetches one portal page and always answers the user, either
//! with the fetched text or with a fixed failure message. Only a failure to
//! send is returned to the caller.

use anyhow::Result;
use std::path::Path;
use tracing::{error, info, warn};

use super::transport::ChatTransport;
use super::ui_builder::format_fetched;
use crate::errors::PortalError;
use crate::localization::{t, t_args};
use crate::portal::{PortalSession, Section};
use crate::session::{MenuOption, UserId};

/// Shared pieces every handler needs
pub struct CommandContext<'a> {
    pub user: &'a UserId,
    pub transport: &'a dyn ChatTransport,
    pub portal: &'a dyn PortalSession,
    pub max_message_chars: usize,
}

impl CommandContext<'_> {
    /// Send "Fetching ...", run `fetch`, then reply with its text or a failure message
    async fn fetch_and_reply<F>(&self, label_key: &str, fetch: F) -> Result<()>
    where
        F: std::future::Future<Output = Result<String, PortalError>>,
    {
        let section = t(label_key);
        self.transport
            .send_text(self.user, &t_args("fetching", &[("section", &section)]))
            .await?;

        let reply = match fetch.await {
            Ok(content) if content.trim().is_empty() => {
                info!(user_id = %self.user, section = %section, "Portal page had no content");
                t_args("fetch-empty", &[("section", &section)])
            }
            Ok(content) => {
                info!(user_id = %self.user, section = %section, chars = content.len(), "Fetched portal page");
                format_fetched(&section, &content, self.max_message_chars)
            }
            Err(e) => {
                error!(user_id = %self.user, section = %section, error = %e, "Failed to fetch portal page");
                t_args("fetch-failed", &[("section", &section)])
            }
        };

        self.transport.send_text(self.user, &reply).await
    }
}

/// Result, admit card, timetable and others: one page each
pub async fn handle_section(ctx: &CommandContext<'_>, section: Section) -> Result<()> {
    let label_key = match section {
        Section::Result => MenuOption::Result.label_key(),
        Section::AdmitCard => MenuOption::AdmitCard.label_key(),
        Section::Timetable => MenuOption::Timetable.label_key(),
        Section::Others => MenuOption::Others.label_key(),
    };
    ctx.fetch_and_reply(label_key, ctx.portal.fetch_section(section))
        .await
}

/// Attendance for a year and semester already chosen by the user
pub async fn handle_attendance(ctx: &CommandContext<'_>, year: &str, semester: &str) -> Result<()> {
    ctx.fetch_and_reply(
        MenuOption::Attendance.label_key(),
        ctx.portal.fetch_attendance(year, semester),
    )
    .await
}

/// Reply for `0` on the main menu: the meme image when one is configured and readable
pub async fn handle_meme(
    transport: &dyn ChatTransport,
    user: &UserId,
    image: Option<&Path>,
) -> Result<()> {
    if let Some(path) = image {
        match tokio::fs::read(path).await {
            Ok(bytes) => return transport.send_image(user, bytes, &t("menu-meme")).await,
            Err(e) => warn!(path = %path.display(), error = %e, "Meme image unreadable, sending text"),
        }
    }
    transport.send_text(user, &t("menu-meme")).await
}
