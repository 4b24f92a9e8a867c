//! CAPTCHA resolver seam.
//!
//! The login flow hands the raw PNG screenshot to a [`CaptchaSolver`] and
//! gets back its best guess at the characters.

use async_trait::async_trait;

use crate::circuit_breaker::CircuitBreaker;
use crate::config::CaptchaConfig;
use crate::errors::CaptchaError;
use crate::instance_manager::OcrInstanceManager;
use crate::ocr::{extract_captcha_text, preprocess_captcha};

#[async_trait]
pub trait CaptchaSolver: Send + Sync {
    /// Turn a CAPTCHA screenshot into text
    async fn solve(&self, png: &[u8]) -> Result<String, CaptchaError>;
}

/// Preprocessing plus Tesseract OCR, with cached engines and a circuit breaker
pub struct TesseractSolver {
    config: CaptchaConfig,
    instances: OcrInstanceManager,
    circuit_breaker: CircuitBreaker,
}

impl TesseractSolver {
    pub fn new(config: CaptchaConfig) -> Self {
        let circuit_breaker = CircuitBreaker::new(config.recovery.clone());
        Self {
            config,
            instances: OcrInstanceManager::new(),
            circuit_breaker,
        }
    }
}

#[async_trait]
impl CaptchaSolver for TesseractSolver {
    async fn solve(&self, png: &[u8]) -> Result<String, CaptchaError> {
        let image = preprocess_captcha(png, self.config.resize_width)?;
        extract_captcha_text(image, &self.config, &self.instances, &self.circuit_breaker).await
    }
}
