//! Conversation engine: routes inbound messages and runs login flows.
//!
//! Every inbound message first goes to the sender's awaiting-response slot.
//! Only when nothing is waiting is it read as a top-level command. A `/login`
//! spawns one flow task per user; the flow owns the browser and walks the
//! user through CAPTCHA, menu and attendance prompts.

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore, TryAcquireError};
use tracing::{debug, error, info, warn};

use super::attendance::{AttendanceDialogue, SubflowOutcome};
use super::commands::{handle_meme, handle_section, CommandContext};
use super::transport::ChatTransport;
use super::ui_builder::main_menu;
use crate::captcha::CaptchaSolver;
use crate::config::BotConfig;
use crate::debug_gate::{DebugGate, DebugToggle};
use crate::errors::{CaptchaError, PortalError};
use crate::localization::{t, t_args};
use crate::ocr::calculate_retry_delay;
use crate::portal::{PortalLauncher, PortalSession, Section};
use crate::session::{
    parse_login_command, parse_menu_choice, Credentials, LoginCommand, MenuChoice, MenuStage,
    Reply, SessionRegistry, UserId,
};

/// What the engine did with an inbound message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// Answered a prompt of the sender's running flow
    DeliveredToFlow,
    Pong,
    Debug(DebugToggle),
    LoginStarted,
    LoginUsage,
    LoginBusy,
    Ignored,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoginOutcome {
    Authenticated,
    Failed,
    TimedOut,
}

/// Install the reply slot, send the prompt, then wait for the answer
pub(super) async fn prompt(
    sessions: &SessionRegistry,
    transport: &dyn ChatTransport,
    user: &UserId,
    text: &str,
    timeout: Duration,
) -> Result<Reply> {
    let waiter = sessions.install_waiter(user);
    transport.send_text(user, text).await?;
    Ok(sessions.wait(waiter, timeout).await)
}

/// Resets the user's session when the flow ends, however it ends
struct FlowGuard<'a> {
    sessions: &'a SessionRegistry,
    user: &'a UserId,
}

impl Drop for FlowGuard<'_> {
    fn drop(&mut self) {
        self.sessions.end_flow(self.user);
    }
}

pub struct Engine {
    config: BotConfig,
    transport: Arc<dyn ChatTransport>,
    launcher: Arc<dyn PortalLauncher>,
    solver: Arc<dyn CaptchaSolver>,
    sessions: SessionRegistry,
    debug_gate: DebugGate,
    browser_slots: Arc<Semaphore>,
}

impl Engine {
    pub fn new(
        config: BotConfig,
        transport: Arc<dyn ChatTransport>,
        launcher: Arc<dyn PortalLauncher>,
        solver: Arc<dyn CaptchaSolver>,
    ) -> Self {
        let browser_slots = Arc::new(Semaphore::new(config.portal.max_browser_sessions));
        let debug_gate = DebugGate::new(config.debug_users.clone());
        Self {
            config,
            transport,
            launcher,
            solver,
            sessions: SessionRegistry::new(),
            debug_gate,
            browser_slots,
        }
    }

    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    pub fn debug_gate(&self) -> &DebugGate {
        &self.debug_gate
    }

    /// Route one inbound text message from `user`
    pub async fn handle_inbound(self: &Arc<Self>, user: UserId, text: String) -> Result<Dispatch> {
        self.debug_gate.log_inbound(&user, &text);

        let text = match self.sessions.offer(&user, text) {
            Ok(()) => {
                debug!(user_id = %user, "Delivered message to waiting flow");
                return Ok(Dispatch::DeliveredToFlow);
            }
            Err(text) => text,
        };

        match text.trim() {
            "ping" => {
                self.transport.send_text(&user, &t("pong")).await?;
                return Ok(Dispatch::Pong);
            }
            "/debug" => {
                let toggle = self.debug_gate.toggle(&user);
                let key = match toggle {
                    DebugToggle::Enabled => "debug-enabled",
                    DebugToggle::Disabled => "debug-disabled",
                    DebugToggle::Unauthorized => "debug-unauthorized",
                };
                self.transport.send_text(&user, &t(key)).await?;
                return Ok(Dispatch::Debug(toggle));
            }
            _ => {}
        }

        match parse_login_command(&text) {
            LoginCommand::NotLogin => {
                debug!(user_id = %user, "No flow waiting and no command matched");
                Ok(Dispatch::Ignored)
            }
            LoginCommand::MissingArguments => {
                self.transport.send_text(&user, &t("usage-login")).await?;
                Ok(Dispatch::LoginUsage)
            }
            LoginCommand::Valid(credentials) => {
                if !self.sessions.begin_flow(&user) {
                    info!(user_id = %user, "Login refused, flow already running");
                    self.transport.send_text(&user, &t("login-busy")).await?;
                    return Ok(Dispatch::LoginBusy);
                }

                info!(user_id = %user, username = %credentials.username, "Starting login flow");
                let engine = Arc::clone(self);
                tokio::spawn(async move { engine.run_flow(user, credentials).await });
                Ok(Dispatch::LoginStarted)
            }
        }
    }

    async fn run_flow(self: Arc<Self>, user: UserId, credentials: Credentials) {
        let _guard = FlowGuard {
            sessions: &self.sessions,
            user: &user,
        };

        if let Err(e) = self.login_flow(&user, &credentials).await {
            error!(user_id = %user, error = %e, "Login flow failed");
            if let Err(send_err) = self.transport.send_text(&user, &t("flow-failed")).await {
                error!(user_id = %user, error = %send_err, "Failed to notify user of flow failure");
            }
        }
        info!(user_id = %user, "Login flow finished");
    }

    async fn login_flow(&self, user: &UserId, credentials: &Credentials) -> Result<()> {
        let _permit = self.acquire_browser_slot(user).await?;
        self.transport.send_text(user, &t("login-started")).await?;

        let portal = match self.launch_portal(user).await {
            Ok(portal) => portal,
            Err(e) => {
                error!(user_id = %user, error = %e, "Portal unavailable");
                self.transport.send_text(user, &t("portal-unavailable")).await?;
                return Ok(());
            }
        };

        let result = self.drive_portal(user, credentials, portal.as_ref()).await;
        portal.close().await;
        result
    }

    async fn acquire_browser_slot(&self, user: &UserId) -> Result<OwnedSemaphorePermit> {
        match Arc::clone(&self.browser_slots).try_acquire_owned() {
            Ok(permit) => Ok(permit),
            Err(TryAcquireError::NoPermits) => {
                info!(user_id = %user, "All browser slots busy, queueing");
                self.transport.send_text(user, &t("login-queued")).await?;
                Ok(Arc::clone(&self.browser_slots).acquire_owned().await?)
            }
            Err(TryAcquireError::Closed) => anyhow::bail!("browser pool closed"),
        }
    }

    /// Launch a browser and open the login form, retrying with backoff
    async fn launch_portal(&self, user: &UserId) -> Result<Box<dyn PortalSession>, PortalError> {
        let attempts = self.config.portal.launch_retries.max(1);
        let mut last_error = PortalError::Launch("no launch attempted".to_string());

        for attempt in 1..=attempts {
            match self.launcher.launch().await {
                Ok(portal) => match portal.open_login().await {
                    Ok(()) => return Ok(portal),
                    Err(e) => {
                        portal.close().await;
                        last_error = e;
                    }
                },
                Err(e) => last_error = e,
            }

            warn!(user_id = %user, attempt, error = %last_error, "Opening the portal failed");
            if attempt < attempts {
                let delay = calculate_retry_delay(attempt, &self.config.portal.recovery);
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }
        }

        Err(last_error)
    }

    async fn drive_portal(
        &self,
        user: &UserId,
        credentials: &Credentials,
        portal: &dyn PortalSession,
    ) -> Result<()> {
        if let Err(e) = portal.enter_credentials(credentials).await {
            error!(user_id = %user, error = %e, "Could not fill the login form");
            self.transport.send_text(user, &t("portal-unavailable")).await?;
            return Ok(());
        }

        let outcome = if self.solve_captcha_automatically(user, portal).await {
            LoginOutcome::Authenticated
        } else {
            self.manual_captcha(user, portal).await?
        };

        match outcome {
            LoginOutcome::Authenticated => {
                info!(user_id = %user, "Portal login succeeded");
                self.menu_loop(user, portal).await
            }
            LoginOutcome::Failed => {
                info!(user_id = %user, "Portal login failed");
                self.transport.send_text(user, &t("login-failed")).await
            }
            LoginOutcome::TimedOut => Ok(()),
        }
    }

    /// Up to `max_attempts` capture, OCR and submit cycles
    async fn solve_captcha_automatically(&self, user: &UserId, portal: &dyn PortalSession) -> bool {
        let max_attempts = self.config.captcha.max_attempts;

        for attempt in 1..=max_attempts {
            self.sessions.record_login_attempt(user, attempt);
            self.debug_snapshot(user);

            match self.captcha_attempt(portal).await {
                Ok(true) => return true,
                Ok(false) => info!(user_id = %user, attempt, "Portal rejected the login attempt"),
                Err(e) => warn!(user_id = %user, attempt, error = %e, "CAPTCHA attempt failed"),
            }

            if attempt < max_attempts {
                if let Err(e) = portal.clear_captcha().await {
                    warn!(user_id = %user, error = %e, "Could not clear the CAPTCHA field");
                }
            }
        }

        false
    }

    async fn captcha_attempt(&self, portal: &dyn PortalSession) -> Result<bool> {
        let png = portal.captcha_image().await.map_err(CaptchaError::from)?;
        let guess = self.solver.solve(&png).await?;
        debug!(guess_len = guess.len(), "CAPTCHA guess ready");

        portal.enter_captcha(&guess).await?;
        portal.submit().await?;
        Ok(portal.is_authenticated().await?)
    }

    /// Send the CAPTCHA to the user and submit their typed answer once
    async fn manual_captcha(&self, user: &UserId, portal: &dyn PortalSession) -> Result<LoginOutcome> {
        let attempts = self.config.captcha.max_attempts.to_string();
        self.transport
            .send_text(user, &t_args("login-captcha-exhausted", &[("attempts", &attempts)]))
            .await?;

        if !self.config.captcha.manual_fallback {
            return Ok(LoginOutcome::Failed);
        }

        let png = match portal.captcha_image().await {
            Ok(png) => png,
            Err(e) => {
                warn!(user_id = %user, error = %e, "Could not capture CAPTCHA for manual entry");
                return Ok(LoginOutcome::Failed);
            }
        };

        self.sessions.set_stage(user, MenuStage::AwaitingCaptchaEntry);
        let waiter = self.sessions.install_waiter(user);
        self.transport
            .send_image(user, png, &t("captcha-manual-prompt"))
            .await?;

        let guess = match self
            .sessions
            .wait(waiter, self.config.conversation.captcha_entry_timeout)
            .await
        {
            Reply::Message(text) => text,
            Reply::TimedOut => {
                info!(user_id = %user, "Manual CAPTCHA entry timed out");
                self.transport.send_text(user, &t("response-timeout")).await?;
                return Ok(LoginOutcome::TimedOut);
            }
            Reply::Superseded => return Ok(LoginOutcome::Failed),
        };

        self.sessions.set_stage(user, MenuStage::LoggingIn);
        let submitted = async {
            portal.clear_captcha().await?;
            portal.enter_captcha(guess.trim()).await?;
            portal.submit().await?;
            portal.is_authenticated().await
        };

        match submitted.await {
            Ok(true) => Ok(LoginOutcome::Authenticated),
            Ok(false) => Ok(LoginOutcome::Failed),
            Err(e) => {
                warn!(user_id = %user, error = %e, "Manual CAPTCHA submission failed");
                Ok(LoginOutcome::Failed)
            }
        }
    }

    async fn menu_loop(&self, user: &UserId, portal: &dyn PortalSession) -> Result<()> {
        let ctx = CommandContext {
            user,
            transport: self.transport.as_ref(),
            portal,
            max_message_chars: self.config.conversation.max_message_chars,
        };
        let mut prompt_text = main_menu();

        loop {
            self.sessions.set_stage(user, MenuStage::AwaitingMenuChoice);
            self.debug_snapshot(user);

            let reply = prompt(
                &self.sessions,
                self.transport.as_ref(),
                user,
                &prompt_text,
                self.config.conversation.menu_timeout,
            )
            .await?;

            let text = match reply {
                Reply::Message(text) => text,
                Reply::TimedOut => {
                    info!(user_id = %user, "Menu choice timed out");
                    return self.transport.send_text(user, &t("response-timeout")).await;
                }
                Reply::Superseded => return Ok(()),
            };

            let option = match parse_menu_choice(&text) {
                MenuChoice::Option(option) => option,
                MenuChoice::Meme => {
                    return handle_meme(
                        self.transport.as_ref(),
                        user,
                        self.config.conversation.meme_image.as_deref(),
                    )
                    .await
                }
                MenuChoice::Invalid => {
                    debug!(user_id = %user, "Invalid menu choice");
                    // The invalid notice doubles as the next prompt
                    prompt_text = t("menu-invalid");
                    continue;
                }
            };

            match Section::try_from(option) {
                Ok(section) => {
                    handle_section(&ctx, section).await?;
                    return self.transport.send_text(user, &t("session-done")).await;
                }
                Err(_) => {
                    let dialogue = AttendanceDialogue {
                        sessions: &self.sessions,
                        ctx: &ctx,
                        config: &self.config.conversation,
                    };
                    match dialogue.run().await? {
                        SubflowOutcome::BackToMenu => {
                            self.sessions.select_year(user, None);
                            prompt_text = main_menu();
                        }
                        SubflowOutcome::Finished => return Ok(()),
                    }
                }
            }
        }
    }

    fn debug_snapshot(&self, user: &UserId) {
        if let Some(snapshot) = self.sessions.snapshot(user) {
            self.debug_gate.log_snapshot(user, "session", &snapshot);
        }
    }
}
