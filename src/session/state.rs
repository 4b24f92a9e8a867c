//! Conversation state tracked per chat user.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Chat-user identifier as delivered by the messaging transport
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for UserId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Step inside the attendance year/semester dialogue
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttendanceStep {
    Year,
    Semester,
    Confirm,
}

/// Position of a session within the post-login dialogue tree
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum MenuStage {
    #[default]
    Idle,
    LoggingIn,
    AwaitingCaptchaEntry,
    AwaitingMenuChoice,
    InAttendanceSubflow(AttendanceStep),
}

/// Serializable view of a session, used for debug logging and tests
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub login_attempts: u32,
    pub stage: MenuStage,
    pub selected_year: Option<String>,
    pub selected_semester: Option<String>,
    pub flow_active: bool,
    pub awaiting_reply: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_stage_is_idle() {
        assert_eq!(MenuStage::default(), MenuStage::Idle);
        assert_eq!(SessionSnapshot::default().stage, MenuStage::Idle);
    }

    #[test]
    fn test_stage_serialization() {
        let stage = MenuStage::InAttendanceSubflow(AttendanceStep::Semester);
        let json = serde_json::to_string(&stage).unwrap();
        assert_eq!(json, r#"{"InAttendanceSubflow":"Semester"}"#);
    }
}
