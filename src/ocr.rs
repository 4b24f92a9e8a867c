//! # CAPTCHA OCR Module
//!
//! Image preprocessing and Tesseract text extraction for portal CAPTCHAs.
//! Preprocessing scales the image to a fixed width, converts it to grayscale
//! and stretches its contrast before OCR.

use image::imageops::FilterType;
use image::{GrayImage, ImageFormat};
use rand::Rng;
use regex::Regex;
use std::io::Write;
use std::sync::{LazyLock, PoisonError};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::circuit_breaker::CircuitBreaker;
use crate::config::{CaptchaConfig, RecoveryConfig};
use crate::errors::CaptchaError;
use crate::instance_manager::OcrInstanceManager;

static NON_ALPHANUMERIC: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[^A-Za-z0-9]").unwrap_or_else(|_| unreachable!("pattern is a valid regex"))
});

/// Resize to `width`, convert to grayscale and stretch contrast to the full range
pub fn preprocess_captcha(png: &[u8], width: u32) -> Result<GrayImage, CaptchaError> {
    let decoded = image::load_from_memory(png)
        .map_err(|e| CaptchaError::Preprocess(format!("decode failed: {e}")))?;

    if decoded.width() == 0 || decoded.height() == 0 {
        return Err(CaptchaError::Preprocess("image has no pixels".to_string()));
    }

    let height = ((u64::from(decoded.height()) * u64::from(width)) / u64::from(decoded.width()))
        .max(1) as u32;
    let resized = decoded.resize_exact(width, height, FilterType::Lanczos3);
    let mut gray = resized.to_luma8();
    normalize_contrast(&mut gray);

    debug!(width = gray.width(), height = gray.height(), "CAPTCHA image preprocessed");
    Ok(gray)
}

/// Linearly stretch luminance so the darkest pixel becomes 0 and the brightest 255
pub fn normalize_contrast(image: &mut GrayImage) {
    let (min, max) = image
        .pixels()
        .fold((u8::MAX, u8::MIN), |(lo, hi), p| (lo.min(p[0]), hi.max(p[0])));

    if max <= min {
        return;
    }

    let range = f32::from(max - min);
    for pixel in image.pixels_mut() {
        let scaled = f32::from(pixel[0] - min) * 255.0 / range;
        pixel[0] = scaled.round() as u8;
    }
}

/// Keep only characters a CAPTCHA can contain
pub fn clean_captcha_text(raw: &str) -> String {
    NON_ALPHANUMERIC.replace_all(raw.trim(), "").into_owned()
}

/// Run OCR on a preprocessed image with circuit breaker protection.
///
/// The image is written to a temporary PNG that is deleted when OCR finishes.
///
/// # Arguments
///
/// * `image` - Grayscale CAPTCHA from [`preprocess_captcha`]
/// * `config` - Languages, whitelist and timeout
/// * `instance_manager` - Pool the Tesseract instance is taken from
/// * `circuit_breaker` - Shared breaker, updated with the outcome
///
/// # Returns
///
/// The recognized characters with anything non-alphanumeric removed
///
/// # Errors
///
/// - [`CaptchaError::Unavailable`] while the breaker is open
/// - [`CaptchaError::Timeout`] when OCR exceeds `operation_timeout_secs`
/// - [`CaptchaError::Empty`] when nothing readable was found; this does not
///   count as a breaker failure
/// - [`CaptchaError::Extraction`] on engine errors; the cached instance is dropped
pub async fn extract_captcha_text(
    image: GrayImage,
    config: &CaptchaConfig,
    instance_manager: &OcrInstanceManager,
    circuit_breaker: &CircuitBreaker,
) -> Result<String, CaptchaError> {
    if circuit_breaker.is_open() {
        warn!("OCR circuit breaker open, skipping CAPTCHA solve");
        return Err(CaptchaError::Unavailable);
    }

    let result = run_ocr(image, config, instance_manager).await;

    match &result {
        Ok(text) => {
            circuit_breaker.record_success();
            info!(chars_extracted = text.len(), "CAPTCHA OCR completed");
        }
        Err(CaptchaError::Empty) => {
            // The engine works, the image was just unreadable
            circuit_breaker.record_success();
        }
        Err(e) => {
            circuit_breaker.record_failure();
            warn!(error = %e, "CAPTCHA OCR failed");
            if matches!(e, CaptchaError::Extraction(_)) {
                instance_manager.remove_instance(config);
            }
        }
    }

    result
}

async fn run_ocr(
    image: GrayImage,
    config: &CaptchaConfig,
    instance_manager: &OcrInstanceManager,
) -> Result<String, CaptchaError> {
    let instance = instance_manager.get_instance(config)?;
    let timeout_secs = config.recovery.operation_timeout_secs;

    let task = tokio::task::spawn_blocking(move || -> Result<String, CaptchaError> {
        let mut temp_file = tempfile::Builder::new()
            .prefix("captcha-")
            .suffix(".png")
            .tempfile()
            .map_err(|e| CaptchaError::Preprocess(format!("temp file: {e}")))?;
        let mut encoded = Vec::new();
        image
            .write_to(&mut std::io::Cursor::new(&mut encoded), ImageFormat::Png)
            .map_err(|e| CaptchaError::Preprocess(format!("encode failed: {e}")))?;
        temp_file
            .write_all(&encoded)
            .map_err(|e| CaptchaError::Preprocess(format!("write failed: {e}")))?;

        let image_path = temp_file.path().to_string_lossy().to_string();
        let mut tess = instance.lock().unwrap_or_else(PoisonError::into_inner);
        tess.set_image(&image_path)
            .map_err(|e| CaptchaError::Extraction(format!("Failed to load image for OCR: {e}")))?;
        let raw = tess
            .get_utf8_text()
            .map_err(|e| CaptchaError::Extraction(format!("Failed to extract text: {e}")))?;
        Ok(raw)
    });

    let raw = match tokio::time::timeout(Duration::from_secs(timeout_secs), task).await {
        Ok(Ok(result)) => result?,
        Ok(Err(join_err)) => return Err(CaptchaError::Extraction(join_err.to_string())),
        Err(_) => return Err(CaptchaError::Timeout(timeout_secs)),
    };

    let cleaned = clean_captcha_text(&raw);
    if cleaned.is_empty() {
        return Err(CaptchaError::Empty);
    }
    Ok(cleaned)
}

/// Exponential backoff with up to 10% random jitter, capped at `max_retry_delay_ms`
pub fn calculate_retry_delay(attempt: u32, config: &RecoveryConfig) -> u64 {
    let exponent = attempt.saturating_sub(1).min(16);
    let base = config
        .base_retry_delay_ms
        .saturating_mul(1u64 << exponent)
        .min(config.max_retry_delay_ms);
    let jitter = rand::thread_rng().gen_range(0..=base / 10);
    base + jitter
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, Luma, Rgb, RgbImage};

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = RgbImage::from_fn(width, height, |x, _| {
            if x % 2 == 0 {
                Rgb([90, 90, 90])
            } else {
                Rgb([160, 160, 160])
            }
        });
        let mut bytes = Vec::new();
        DynamicImage::ImageRgb8(img)
            .write_to(&mut std::io::Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        bytes
    }

    #[test]
    fn test_preprocess_scales_to_width() {
        let gray = preprocess_captcha(&png_bytes(100, 40), 300).unwrap();
        assert_eq!(gray.width(), 300);
        assert_eq!(gray.height(), 120);
    }

    #[test]
    fn test_preprocess_rejects_garbage() {
        let err = preprocess_captcha(b"not an image", 300).unwrap_err();
        assert!(matches!(err, CaptchaError::Preprocess(_)));
    }

    #[test]
    fn test_normalize_contrast_stretches_range() {
        let mut img = GrayImage::from_fn(2, 1, |x, _| if x == 0 { Luma([90]) } else { Luma([160]) });
        normalize_contrast(&mut img);
        assert_eq!(img.get_pixel(0, 0)[0], 0);
        assert_eq!(img.get_pixel(1, 0)[0], 255);
    }

    #[test]
    fn test_normalize_contrast_flat_image_unchanged() {
        let mut img = GrayImage::from_pixel(3, 3, Luma([42]));
        normalize_contrast(&mut img);
        assert!(img.pixels().all(|p| p[0] == 42));
    }

    #[test]
    fn test_clean_captcha_text() {
        assert_eq!(clean_captcha_text(" Xk 9p\n"), "Xk9p");
        assert_eq!(clean_captcha_text("A-b.C_1"), "AbC1");
        assert_eq!(clean_captcha_text("  \n"), "");
    }

    #[test]
    fn test_calculate_retry_delay() {
        let recovery = RecoveryConfig::default();

        let delay1 = calculate_retry_delay(1, &recovery);
        assert!(delay1 >= recovery.base_retry_delay_ms);

        let delay2 = calculate_retry_delay(2, &recovery);
        assert!(delay2 >= delay1);

        let delay_max_test = calculate_retry_delay(10, &recovery);
        assert!(delay_max_test <= recovery.max_retry_delay_ms + recovery.max_retry_delay_ms / 10);
    }
}
