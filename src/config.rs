//! # Configuration Module
//!
//! Configuration structures for the portal bot: portal selectors, CAPTCHA
//! and OCR recovery settings, conversation timeouts and the debug allow-list.
//! Values come from the environment (optionally a `.env` file) with defaults
//! for everything except the bot token.

use anyhow::{Context, Result};
use std::collections::HashSet;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

// Constants for portal and conversation configuration
pub const DEFAULT_PORTAL_URL: &str = "https://www.imsnsit.org/imsnsit/";
pub const DEFAULT_AUTH_MARKER: &str = "Logout";
pub const DEFAULT_OCR_LANGUAGES: &str = "eng";
pub const CAPTCHA_CHAR_WHITELIST: &str =
    "ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";
pub const MAX_CAPTCHA_ATTEMPTS: u32 = 3;
pub const CAPTCHA_RESIZE_WIDTH: u32 = 300;

/// CSS selectors and link labels used to drive the portal
#[derive(Debug, Clone)]
pub struct PortalSelectors {
    /// Text of the link that opens the student login form
    pub student_login_label: String,
    /// URL fragment identifying the frame that hosts the login form
    pub login_frame_marker: String,
    pub username_input: String,
    pub password_input: String,
    pub captcha_input: String,
    pub captcha_image: String,
    pub submit_button: String,
    pub year_select: String,
    pub semester_select: String,
}

impl Default for PortalSelectors {
    fn default() -> Self {
        Self {
            student_login_label: "Student Login".to_string(),
            login_frame_marker: "student_login.php".to_string(),
            username_input: r#"input[name="uid"]"#.to_string(),
            password_input: r#"input[name="pwd"]"#.to_string(),
            captcha_input: r#"input[name="cap"]"#.to_string(),
            captcha_image: "#captchaimg".to_string(),
            submit_button: r#"input[type="submit"]"#.to_string(),
            year_select: r#"select[name="year"]"#.to_string(),
            semester_select: r#"select[name="sem"]"#.to_string(),
        }
    }
}

/// Browser and portal configuration
#[derive(Debug, Clone)]
pub struct PortalConfig {
    /// Landing page of the portal
    pub url: String,
    /// Run Chromium without a window
    pub headless: bool,
    /// Text present on the page only after a successful login
    pub authenticated_marker: String,
    /// Upper bound on concurrently open browsers
    pub max_browser_sessions: usize,
    /// Launch attempts before giving up
    pub launch_retries: u32,
    /// Backoff between launch attempts
    pub recovery: RecoveryConfig,
    pub selectors: PortalSelectors,
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_PORTAL_URL.to_string(),
            headless: true,
            authenticated_marker: DEFAULT_AUTH_MARKER.to_string(),
            max_browser_sessions: 2,
            launch_retries: 3,
            recovery: RecoveryConfig::default(),
            selectors: PortalSelectors::default(),
        }
    }
}

/// Recovery configuration for error handling
#[derive(Debug, Clone)]
pub struct RecoveryConfig {
    /// Base delay between retries in milliseconds
    pub base_retry_delay_ms: u64,
    /// Maximum delay between retries in milliseconds
    pub max_retry_delay_ms: u64,
    /// Timeout for OCR operations in seconds
    pub operation_timeout_secs: u64,
    /// Circuit breaker failure threshold
    pub circuit_breaker_threshold: u32,
    /// Circuit breaker reset timeout in seconds
    pub circuit_breaker_reset_secs: u64,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            base_retry_delay_ms: 1000,  // 1 second
            max_retry_delay_ms: 10000,  // 10 seconds
            operation_timeout_secs: 30, // 30 seconds
            circuit_breaker_threshold: 5,
            circuit_breaker_reset_secs: 60, // 1 minute
        }
    }
}

/// CAPTCHA solving configuration
#[derive(Debug, Clone)]
pub struct CaptchaConfig {
    /// OCR language codes (e.g., "eng")
    pub languages: String,
    /// Characters the OCR engine may emit
    pub char_whitelist: String,
    /// Automatic solve-and-submit cycles before giving up
    pub max_attempts: u32,
    /// Ask the user to type the CAPTCHA once automatic attempts are exhausted
    pub manual_fallback: bool,
    /// Width the image is scaled to before OCR
    pub resize_width: u32,
    pub recovery: RecoveryConfig,
}

impl Default for CaptchaConfig {
    fn default() -> Self {
        Self {
            languages: DEFAULT_OCR_LANGUAGES.to_string(),
            char_whitelist: CAPTCHA_CHAR_WHITELIST.to_string(),
            max_attempts: MAX_CAPTCHA_ATTEMPTS,
            manual_fallback: true,
            resize_width: CAPTCHA_RESIZE_WIDTH,
            recovery: RecoveryConfig::default(),
        }
    }
}

/// How long each prompt waits for the user
#[derive(Debug, Clone)]
pub struct ConversationConfig {
    /// Wait on the main menu
    pub menu_timeout: Duration,
    /// Wait on each attendance year/semester/confirm step
    pub subflow_timeout: Duration,
    /// Wait for a typed CAPTCHA during manual fallback
    pub captcha_entry_timeout: Duration,
    /// Invalid answers tolerated per attendance step
    pub max_invalid_selections: u32,
    /// Outbound text longer than this is truncated
    pub max_message_chars: usize,
    /// Image sent for `0` on the main menu; text only when unset
    pub meme_image: Option<PathBuf>,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            menu_timeout: Duration::from_secs(120),
            subflow_timeout: Duration::from_secs(60),
            captcha_entry_timeout: Duration::from_secs(90),
            max_invalid_selections: 3,
            max_message_chars: 4000,
            meme_image: None,
        }
    }
}

/// Top-level bot configuration
#[derive(Debug, Clone, Default)]
pub struct BotConfig {
    pub portal: PortalConfig,
    pub captcha: CaptchaConfig,
    pub conversation: ConversationConfig,
    /// User ids (domain suffix stripped) allowed to toggle debug mode
    pub debug_users: HashSet<String>,
}

impl BotConfig {
    /// Build the configuration from environment variables, falling back to defaults
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let portal = PortalConfig {
            url: env::var("PORTAL_URL").unwrap_or(defaults.portal.url),
            headless: env_or("PORTAL_HEADLESS", defaults.portal.headless)?,
            authenticated_marker: env::var("PORTAL_AUTH_MARKER")
                .unwrap_or(defaults.portal.authenticated_marker),
            max_browser_sessions: env_or(
                "MAX_BROWSER_SESSIONS",
                defaults.portal.max_browser_sessions,
            )?,
            launch_retries: env_or("PORTAL_LAUNCH_RETRIES", defaults.portal.launch_retries)?,
            recovery: defaults.portal.recovery,
            selectors: defaults.portal.selectors,
        };

        let captcha = CaptchaConfig {
            languages: env::var("OCR_LANGUAGES").unwrap_or(defaults.captcha.languages),
            max_attempts: env_or("CAPTCHA_MAX_ATTEMPTS", defaults.captcha.max_attempts)?,
            manual_fallback: env_or("CAPTCHA_MANUAL_FALLBACK", defaults.captcha.manual_fallback)?,
            ..defaults.captcha
        };

        let conversation = ConversationConfig {
            menu_timeout: Duration::from_secs(env_or(
                "MENU_TIMEOUT_SECS",
                defaults.conversation.menu_timeout.as_secs(),
            )?),
            subflow_timeout: Duration::from_secs(env_or(
                "SUBFLOW_TIMEOUT_SECS",
                defaults.conversation.subflow_timeout.as_secs(),
            )?),
            captcha_entry_timeout: Duration::from_secs(env_or(
                "CAPTCHA_ENTRY_TIMEOUT_SECS",
                defaults.conversation.captcha_entry_timeout.as_secs(),
            )?),
            max_invalid_selections: env_or(
                "MAX_INVALID_SELECTIONS",
                defaults.conversation.max_invalid_selections,
            )?,
            meme_image: env::var_os("MEME_IMAGE_PATH").map(PathBuf::from),
            ..defaults.conversation
        };

        let debug_users = env::var("DEBUG_USERS")
            .map(|list| parse_user_list(&list))
            .unwrap_or_default();

        let config = Self {
            portal,
            captcha,
            conversation,
            debug_users,
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would make a flow impossible to complete
    pub fn validate(&self) -> Result<()> {
        if self.portal.max_browser_sessions == 0 {
            anyhow::bail!("MAX_BROWSER_SESSIONS must be at least 1");
        }
        if self.captcha.max_attempts == 0 {
            anyhow::bail!("CAPTCHA_MAX_ATTEMPTS must be at least 1");
        }
        if self.conversation.max_invalid_selections == 0 {
            anyhow::bail!("MAX_INVALID_SELECTIONS must be at least 1");
        }
        Ok(())
    }
}

/// Read `key` and parse it, or return `default` when unset
fn env_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("Invalid value for {key}: {raw:?}")),
        Err(_) => Ok(default),
    }
}

/// Split a comma separated list of user ids, dropping any `@domain` suffix
pub fn parse_user_list(list: &str) -> HashSet<String> {
    list.split(',')
        .map(|entry| crate::debug_gate::strip_domain(entry.trim()).to_string())
        .filter(|entry| !entry.is_empty())
        .collect()
}
