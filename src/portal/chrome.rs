//! Headless Chromium implementation of the portal seam.
//!
//! The portal renders its login form inside a frame. Instead of holding a
//! frame handle, the page is navigated straight to the frame's URL once it is
//! known, so every later call works on the top-level document.

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
use chromiumoxide::Page;
use futures::StreamExt;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{PortalLauncher, PortalSession, Section};
use crate::config::PortalConfig;
use crate::errors::PortalError;
use crate::session::Credentials;

const ATTENDANCE_LINK_LABEL: &str = "Attendance";
const FRAME_POLL_ATTEMPTS: u32 = 20;
const FRAME_POLL_INTERVAL: Duration = Duration::from_millis(500);
const SELECT_SETTLE_DELAY: Duration = Duration::from_millis(500);

/// Quote a Rust string as a JavaScript string literal
fn js_string(value: &str) -> String {
    serde_json::Value::from(value).to_string()
}

fn click_by_text_script(label: &str) -> String {
    format!(
        r#"(() => {{
    const label = {label};
    const candidates = Array.from(document.querySelectorAll('input, button, a'));
    const target = candidates.find(el => (el.textContent || el.value || '').includes(label));
    if (!target) return false;
    target.click();
    return true;
}})()"#,
        label = js_string(label)
    )
}

fn link_href_script(label: &str) -> String {
    format!(
        r#"(() => {{
    const label = {label};
    const link = Array.from(document.querySelectorAll('a')).find(a => a.textContent.includes(label));
    return link ? link.href : null;
}})()"#,
        label = js_string(label)
    )
}

fn frame_src_script(marker: &str) -> String {
    format!(
        r#"(() => {{
    const marker = {marker};
    const frame = Array.from(document.querySelectorAll('iframe, frame')).find(f => (f.src || '').includes(marker));
    return frame ? frame.src : null;
}})()"#,
        marker = js_string(marker)
    )
}

fn clear_input_script(selector: &str) -> String {
    format!(
        r#"(() => {{
    const input = document.querySelector({selector});
    if (!input) return false;
    input.value = '';
    return true;
}})()"#,
        selector = js_string(selector)
    )
}

fn select_options_script(selector: &str) -> String {
    format!(
        r#"(() => {{
    const select = document.querySelector({selector});
    if (!select) return null;
    return Array.from(select.options)
        .map(o => o.text.trim())
        .filter(t => t.length > 0 && !/^(select|--)/i.test(t));
}})()"#,
        selector = js_string(selector)
    )
}

fn choose_option_script(selector: &str, text: &str) -> String {
    format!(
        r#"(() => {{
    const select = document.querySelector({selector});
    if (!select) return false;
    const option = Array.from(select.options).find(o => o.text.trim() === {text});
    if (!option) return false;
    select.value = option.value;
    select.dispatchEvent(new Event('change', {{ bubbles: true }}));
    return true;
}})()"#,
        selector = js_string(selector),
        text = js_string(text)
    )
}

const BODY_TEXT_SCRIPT: &str = "document.body ? document.body.innerText : ''";

/// Launches one Chromium per login flow
pub struct ChromeLauncher {
    config: PortalConfig,
}

impl ChromeLauncher {
    pub fn new(config: PortalConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl PortalLauncher for ChromeLauncher {
    async fn launch(&self) -> Result<Box<dyn PortalSession>, PortalError> {
        let mut builder = BrowserConfig::builder();
        if !self.config.headless {
            builder = builder.with_head();
        }
        let browser_config = builder.build().map_err(PortalError::Launch)?;

        let (browser, mut handler) = Browser::launch(browser_config)
            .await
            .map_err(|e| PortalError::Launch(e.to_string()))?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    warn!(error = %e, "Browser handler event error");
                }
            }
        });

        let page = match browser.new_page("about:blank").await {
            Ok(page) => page,
            Err(e) => {
                handler_task.abort();
                return Err(PortalError::Launch(e.to_string()));
            }
        };

        info!(headless = self.config.headless, "Browser launched");
        Ok(Box::new(ChromePortal {
            browser: Mutex::new(browser),
            page,
            handler_task,
            config: self.config.clone(),
        }))
    }
}

/// A Chromium page driving the portal
pub struct ChromePortal {
    browser: Mutex<Browser>,
    page: Page,
    handler_task: JoinHandle<()>,
    config: PortalConfig,
}

impl ChromePortal {
    async fn eval<T: DeserializeOwned>(&self, script: String) -> Result<T, PortalError> {
        let result = self.page.evaluate(script).await?;
        result
            .into_value::<T>()
            .map_err(|e| PortalError::Automation(format!("unexpected script result: {e}")))
    }

    async fn goto(&self, url: &str) -> Result<(), PortalError> {
        debug!(url = %url, "Navigating");
        self.page.goto(url).await.map_err(|e| match PortalError::from(e) {
            PortalError::Timeout(_) => PortalError::Timeout(url.to_string()),
            other => PortalError::Navigation(format!("{url}: {other}")),
        })?;
        Ok(())
    }

    async fn type_into(&self, selector: &str, text: &str) -> Result<(), PortalError> {
        let element = self
            .page
            .find_element(selector)
            .await
            .map_err(|_| PortalError::ElementNotFound(selector.to_string()))?;
        element.click().await?.type_str(text).await?;
        Ok(())
    }

    async fn body_text(&self) -> Result<String, PortalError> {
        let text: String = self.eval(BODY_TEXT_SCRIPT.to_string()).await?;
        Ok(text.trim().to_string())
    }

    async fn open_link(&self, label: &str) -> Result<(), PortalError> {
        let href: Option<String> = self.eval(link_href_script(label)).await?;
        match href {
            Some(href) => self.goto(&href).await,
            None => Err(PortalError::ElementNotFound(format!("link '{label}'"))),
        }
    }

    async fn select_options(&self, selector: &str) -> Result<Vec<String>, PortalError> {
        let options: Option<Vec<String>> = self.eval(select_options_script(selector)).await?;
        match options {
            Some(options) if !options.is_empty() => Ok(options),
            Some(_) => Err(PortalError::NoOptions(selector.to_string())),
            None => Err(PortalError::ElementNotFound(selector.to_string())),
        }
    }

    async fn choose_option(&self, selector: &str, text: &str) -> Result<(), PortalError> {
        let chosen: bool = self.eval(choose_option_script(selector, text)).await?;
        if !chosen {
            return Err(PortalError::ElementNotFound(format!("{selector} option '{text}'")));
        }
        tokio::time::sleep(SELECT_SETTLE_DELAY).await;
        Ok(())
    }

    /// Wait for the login frame to appear and return its URL
    async fn login_frame_url(&self) -> Result<String, PortalError> {
        let marker = &self.config.selectors.login_frame_marker;
        for _ in 0..FRAME_POLL_ATTEMPTS {
            let src: Option<String> = self.eval(frame_src_script(marker)).await?;
            if let Some(src) = src {
                return Ok(src);
            }
            if let Some(url) = self.page.url().await? {
                if url.contains(marker.as_str()) {
                    return Ok(url);
                }
            }
            tokio::time::sleep(FRAME_POLL_INTERVAL).await;
        }
        Err(PortalError::Navigation("Login frame not found".to_string()))
    }
}

#[async_trait]
impl PortalSession for ChromePortal {
    async fn open_login(&self) -> Result<(), PortalError> {
        self.goto(&self.config.url).await?;

        let label = &self.config.selectors.student_login_label;
        let clicked: bool = self.eval(click_by_text_script(label)).await?;
        if !clicked {
            return Err(PortalError::ElementNotFound(format!("'{label}' button")));
        }

        let frame_url = self.login_frame_url().await?;
        self.goto(&frame_url).await
    }

    async fn enter_credentials(&self, credentials: &Credentials) -> Result<(), PortalError> {
        let selectors = &self.config.selectors;
        self.type_into(&selectors.username_input, &credentials.username).await?;
        self.type_into(&selectors.password_input, &credentials.password).await
    }

    async fn captcha_image(&self) -> Result<Vec<u8>, PortalError> {
        let selector = &self.config.selectors.captcha_image;
        let element = self
            .page
            .find_element(selector.as_str())
            .await
            .map_err(|_| PortalError::ElementNotFound(selector.clone()))?;
        Ok(element.screenshot(CaptureScreenshotFormat::Png).await?)
    }

    async fn enter_captcha(&self, text: &str) -> Result<(), PortalError> {
        self.type_into(&self.config.selectors.captcha_input, text).await
    }

    async fn clear_captcha(&self) -> Result<(), PortalError> {
        let selector = &self.config.selectors.captcha_input;
        let cleared: bool = self.eval(clear_input_script(selector)).await?;
        if cleared {
            Ok(())
        } else {
            Err(PortalError::ElementNotFound(selector.clone()))
        }
    }

    async fn submit(&self) -> Result<(), PortalError> {
        let selector = &self.config.selectors.submit_button;
        self.page
            .find_element(selector.as_str())
            .await
            .map_err(|_| PortalError::ElementNotFound(selector.clone()))?
            .click()
            .await?;
        self.page.wait_for_navigation().await.map_err(|e| match PortalError::from(e) {
            PortalError::Timeout(_) => PortalError::Timeout("navigation after submit".to_string()),
            other => PortalError::Navigation(other.to_string()),
        })?;
        Ok(())
    }

    async fn is_authenticated(&self) -> Result<bool, PortalError> {
        let text = self.body_text().await?;
        Ok(text.contains(self.config.authenticated_marker.as_str()))
    }

    async fn fetch_section(&self, section: Section) -> Result<String, PortalError> {
        self.open_link(section.link_label()).await?;
        self.body_text().await
    }

    async fn attendance_years(&self) -> Result<Vec<String>, PortalError> {
        self.open_link(ATTENDANCE_LINK_LABEL).await?;
        self.select_options(&self.config.selectors.year_select).await
    }

    async fn attendance_semesters(&self, year: &str) -> Result<Vec<String>, PortalError> {
        let selectors = &self.config.selectors;
        self.choose_option(&selectors.year_select, year).await?;
        self.select_options(&selectors.semester_select).await
    }

    async fn fetch_attendance(&self, year: &str, semester: &str) -> Result<String, PortalError> {
        let selectors = &self.config.selectors;
        self.choose_option(&selectors.year_select, year).await?;
        self.choose_option(&selectors.semester_select, semester).await?;
        self.submit().await?;
        self.body_text().await
    }

    async fn close(&self) {
        let mut browser = self.browser.lock().await;
        if let Err(e) = browser.close().await {
            warn!(error = %e, "Failed to close browser");
        }
        if let Err(e) = browser.wait().await {
            warn!(error = %e, "Failed to wait for browser exit");
        }
        self.handler_task.abort();
        debug!("Browser closed");
    }
}
