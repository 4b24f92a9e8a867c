//! Attendance subflow: year, then semester, then a yes/no confirmation.

use anyhow::Result;
use tracing::{debug, info, warn};

use super::commands::{handle_attendance, CommandContext};
use super::engine::prompt;
use super::ui_builder::format_option_list;
use crate::config::ConversationConfig;
use crate::errors::PortalError;
use crate::localization::{t, t_args};
use crate::session::{
    parse_confirmation, select_option, AttendanceStep, Confirmation, MenuStage, Reply, Selection,
    SessionRegistry,
};

/// Where the menu loop continues after the subflow
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubflowOutcome {
    BackToMenu,
    Finished,
}

/// Result of one prompt step
enum Step<T> {
    Chosen(T),
    Back,
    /// Timed out, too many invalid answers, or superseded; the user has been told
    Ended,
}

pub struct AttendanceDialogue<'a> {
    pub sessions: &'a SessionRegistry,
    pub ctx: &'a CommandContext<'a>,
    pub config: &'a ConversationConfig,
}

impl AttendanceDialogue<'_> {
    pub async fn run(&self) -> Result<SubflowOutcome> {
        let user = self.ctx.user;
        self.sessions
            .set_stage(user, MenuStage::InAttendanceSubflow(AttendanceStep::Year));

        let Some(years) = self.load_options(self.ctx.portal.attendance_years().await).await? else {
            return Ok(SubflowOutcome::Finished);
        };
        let year = match self
            .choose(AttendanceStep::Year, &t("attendance-year-prompt"), &years)
            .await?
        {
            Step::Chosen(year) => year,
            Step::Back => return Ok(SubflowOutcome::BackToMenu),
            Step::Ended => return Ok(SubflowOutcome::Finished),
        };
        self.sessions.select_year(user, Some(year.clone()));

        let Some(semesters) = self
            .load_options(self.ctx.portal.attendance_semesters(&year).await)
            .await?
        else {
            return Ok(SubflowOutcome::Finished);
        };
        let semester_prompt = t_args("attendance-semester-prompt", &[("year", &year)]);
        let semester = match self
            .choose(AttendanceStep::Semester, &semester_prompt, &semesters)
            .await?
        {
            Step::Chosen(semester) => semester,
            Step::Back => return Ok(SubflowOutcome::BackToMenu),
            Step::Ended => return Ok(SubflowOutcome::Finished),
        };
        self.sessions.select_semester(user, Some(semester.clone()));

        match self.confirm(&year, &semester).await? {
            Step::Chosen(()) => {
                info!(user_id = %user, year = %year, semester = %semester, "Fetching attendance");
                handle_attendance(self.ctx, &year, &semester).await?;
                self.ctx.transport.send_text(user, &t("session-done")).await?;
                Ok(SubflowOutcome::Finished)
            }
            Step::Back => Ok(SubflowOutcome::BackToMenu),
            Step::Ended => Ok(SubflowOutcome::Finished),
        }
    }

    /// Unwrap a list read from the portal, telling the user when there is none
    async fn load_options(
        &self,
        options: Result<Vec<String>, PortalError>,
    ) -> Result<Option<Vec<String>>> {
        let user = self.ctx.user;
        match options {
            Ok(options) if !options.is_empty() => Ok(Some(options)),
            Ok(_) | Err(PortalError::NoOptions(_)) => {
                info!(user_id = %user, "No attendance options on the portal");
                self.ctx
                    .transport
                    .send_text(user, &t("attendance-no-options"))
                    .await?;
                Ok(None)
            }
            Err(e) => {
                warn!(user_id = %user, error = %e, "Could not read attendance options");
                let section = t("section-attendance");
                self.ctx
                    .transport
                    .send_text(user, &t_args("fetch-failed", &[("section", &section)]))
                    .await?;
                Ok(None)
            }
        }
    }

    /// Ask until the user picks an entry, sends `0`, or runs out of tries
    async fn choose(&self, step: AttendanceStep, title: &str, options: &[String]) -> Result<Step<String>> {
        let listing = format_option_list(title, options);
        let mut prompt_text = listing.clone();
        let mut invalid = 0;

        loop {
            let Some(text) = self.ask(step, &prompt_text).await? else {
                return Ok(Step::Ended);
            };

            match select_option(options, &text) {
                Selection::Selected(option) => return Ok(Step::Chosen(option.clone())),
                Selection::Exit => return Ok(Step::Back),
                Selection::Invalid => {
                    invalid += 1;
                    debug!(user_id = %self.ctx.user, ?step, invalid, "Invalid attendance selection");
                    if self.too_many_invalid(invalid).await? {
                        return Ok(Step::Ended);
                    }
                    prompt_text = format!("{}\n\n{}", t("selection-invalid"), listing);
                }
            }
        }
    }

    async fn confirm(&self, year: &str, semester: &str) -> Result<Step<()>> {
        let question = t_args("attendance-confirm", &[("year", year), ("semester", semester)]);
        let mut prompt_text = question.clone();
        let mut invalid = 0;

        loop {
            let Some(text) = self.ask(AttendanceStep::Confirm, &prompt_text).await? else {
                return Ok(Step::Ended);
            };

            match parse_confirmation(&text) {
                Confirmation::Yes => return Ok(Step::Chosen(())),
                Confirmation::No => return Ok(Step::Back),
                Confirmation::Invalid => {
                    invalid += 1;
                    if self.too_many_invalid(invalid).await? {
                        return Ok(Step::Ended);
                    }
                    prompt_text = format!("{}\n\n{}", t("selection-invalid"), question);
                }
            }
        }
    }

    /// One prompt at `step`; `None` once the user has been told the flow is over
    async fn ask(&self, step: AttendanceStep, text: &str) -> Result<Option<String>> {
        let user = self.ctx.user;
        self.sessions
            .set_stage(user, MenuStage::InAttendanceSubflow(step));

        match prompt(self.sessions, self.ctx.transport, user, text, self.config.subflow_timeout).await? {
            Reply::Message(text) => Ok(Some(text)),
            Reply::TimedOut => {
                info!(user_id = %user, ?step, "Attendance prompt timed out");
                self.ctx
                    .transport
                    .send_text(user, &t("response-timeout"))
                    .await?;
                Ok(None)
            }
            Reply::Superseded => Ok(None),
        }
    }

    async fn too_many_invalid(&self, invalid: u32) -> Result<bool> {
        if invalid < self.config.max_invalid_selections {
            return Ok(false);
        }
        self.ctx
            .transport
            .send_text(self.ctx.user, &t("selection-too-many"))
            .await?;
        Ok(true)
    }
}
