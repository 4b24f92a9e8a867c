//! # Error Types Module
//!
//! Structured errors for the two fallible collaborators of a login flow:
//! the browser automation transport and the CAPTCHA resolver.

use thiserror::Error;

/// Errors raised while driving the portal in a browser
#[derive(Debug, Clone, Error)]
pub enum PortalError {
    /// Browser could not be started or connected
    #[error("Browser launch error: {0}")]
    Launch(String),
    /// Page or frame navigation failed
    #[error("Navigation error: {0}")]
    Navigation(String),
    /// A selector matched nothing
    #[error("Element not found: {0}")]
    ElementNotFound(String),
    /// Any other devtools protocol failure
    #[error("Automation error: {0}")]
    Automation(String),
    /// The portal did not answer in time
    #[error("Timeout error: {0}")]
    Timeout(String),
    /// A selection list on the portal was empty
    #[error("No options available: {0}")]
    NoOptions(String),
}

impl From<chromiumoxide::error::CdpError> for PortalError {
    fn from(err: chromiumoxide::error::CdpError) -> Self {
        match err {
            chromiumoxide::error::CdpError::Timeout => {
                PortalError::Timeout("devtools request".to_string())
            }
            other => PortalError::Automation(other.to_string()),
        }
    }
}

/// Errors raised while turning a CAPTCHA image into text
#[derive(Debug, Clone, Error)]
pub enum CaptchaError {
    /// Screenshot of the CAPTCHA element failed
    #[error("Failed to capture CAPTCHA image: {0}")]
    Capture(String),
    /// Image decoding or preprocessing failed
    #[error("Image preprocessing failed: {0}")]
    Preprocess(String),
    /// OCR engine initialization errors
    #[error("OCR initialization error: {0}")]
    Initialization(String),
    /// Text extraction errors
    #[error("OCR failed: {0}")]
    Extraction(String),
    /// OCR produced nothing usable
    #[error("OCR returned no usable characters")]
    Empty,
    /// OCR exceeded the operation timeout
    #[error("OCR timed out after {0} seconds")]
    Timeout(u64),
    /// Circuit breaker is open
    #[error("OCR temporarily unavailable after repeated failures")]
    Unavailable,
}

impl From<PortalError> for CaptchaError {
    fn from(err: PortalError) -> Self {
        CaptchaError::Capture(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_message_formatting() {
        let err = PortalError::ElementNotFound("input[name=\"uid\"]".to_string());
        assert_eq!(err.to_string(), "Element not found: input[name=\"uid\"]");

        assert_eq!(CaptchaError::Timeout(30).to_string(), "OCR timed out after 30 seconds");
    }

    #[test]
    fn test_cdp_timeout_maps_to_timeout() {
        let err = PortalError::from(chromiumoxide::error::CdpError::Timeout);
        assert!(matches!(err, PortalError::Timeout(_)));

        let err = PortalError::from(chromiumoxide::error::CdpError::msg("socket closed"));
        assert!(matches!(err, PortalError::Automation(msg) if msg.contains("socket closed")));
    }

    #[test]
    fn test_portal_error_converts_to_capture_error() {
        let err: CaptchaError = PortalError::Timeout("screenshot".to_string()).into();
        assert!(matches!(err, CaptchaError::Capture(msg) if msg.contains("screenshot")));
    }
}
