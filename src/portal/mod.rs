//! Browser automation seam for the college portal
//!
//! - [`PortalLauncher`] opens one browser per login flow
//! - [`PortalSession`] drives the login form and reads academic records
//! - `chrome`: the headless Chromium implementation

use async_trait::async_trait;

use crate::errors::PortalError;
use crate::session::{Credentials, MenuOption};

pub mod chrome;

pub use chrome::ChromeLauncher;

/// Portal pages reachable from the main menu, other than attendance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
    Result,
    AdmitCard,
    Timetable,
    Others,
}

impl Section {
    /// Link text used to find the page on the portal
    pub fn link_label(self) -> &'static str {
        match self {
            Section::Result => "Result",
            Section::AdmitCard => "Admit Card",
            Section::Timetable => "Time Table",
            Section::Others => "Notice",
        }
    }
}

impl TryFrom<MenuOption> for Section {
    type Error = MenuOption;

    fn try_from(option: MenuOption) -> Result<Self, Self::Error> {
        match option {
            MenuOption::Result => Ok(Section::Result),
            MenuOption::AdmitCard => Ok(Section::AdmitCard),
            MenuOption::Timetable => Ok(Section::Timetable),
            MenuOption::Others => Ok(Section::Others),
            MenuOption::Attendance => Err(option),
        }
    }
}

/// One open browser, logged in or on its way there
#[async_trait]
pub trait PortalSession: Send + Sync {
    /// Navigate to the student login form
    async fn open_login(&self) -> Result<(), PortalError>;

    async fn enter_credentials(&self, credentials: &Credentials) -> Result<(), PortalError>;

    /// PNG screenshot of the CAPTCHA element
    async fn captcha_image(&self) -> Result<Vec<u8>, PortalError>;

    async fn enter_captcha(&self, text: &str) -> Result<(), PortalError>;

    async fn clear_captcha(&self) -> Result<(), PortalError>;

    async fn submit(&self) -> Result<(), PortalError>;

    /// Whether the current page shows the logged-in marker
    async fn is_authenticated(&self) -> Result<bool, PortalError>;

    async fn fetch_section(&self, section: Section) -> Result<String, PortalError>;

    async fn attendance_years(&self) -> Result<Vec<String>, PortalError>;

    async fn attendance_semesters(&self, year: &str) -> Result<Vec<String>, PortalError>;

    async fn fetch_attendance(&self, year: &str, semester: &str) -> Result<String, PortalError>;

    /// Close the browser; errors are logged, not returned
    async fn close(&self);
}

#[async_trait]
pub trait PortalLauncher: Send + Sync {
    async fn launch(&self) -> Result<Box<dyn PortalSession>, PortalError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_menu_options_map_to_sections() {
        assert_eq!(Section::try_from(MenuOption::Result), Ok(Section::Result));
        assert_eq!(Section::try_from(MenuOption::Others), Ok(Section::Others));
        assert_eq!(
            Section::try_from(MenuOption::Attendance),
            Err(MenuOption::Attendance)
        );
    }
}
