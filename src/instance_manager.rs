//! # OCR Instance Manager Module
//!
//! Reuses Tesseract instances across CAPTCHA solves. Creating an instance
//! costs hundreds of milliseconds, which would otherwise be paid on every
//! login attempt.

use leptess::{LepTess, Variable};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::info;

use crate::config::CaptchaConfig;
use crate::errors::CaptchaError;

/// Thread-safe pool of Tesseract instances keyed by language and whitelist
///
/// Instances are created on first request for a configuration and live until
/// removed or the manager is dropped. Each instance sits behind its own mutex
/// so concurrent logins serialize on OCR but not on the pool.
///
/// # Thread Safety
///
/// Uses `Mutex<HashMap<>>` internally; the map lock is never held while
/// Tesseract is being created or run.
pub struct OcrInstanceManager {
    instances: Mutex<HashMap<String, Arc<Mutex<LepTess>>>>,
}

impl OcrInstanceManager {
    /// Create an empty pool; instances are created by `get_instance()`
    ///
    /// # Examples
    ///
    /// ```rust
    /// use portal_bot::instance_manager::OcrInstanceManager;
    ///
    /// let manager = OcrInstanceManager::new();
    /// assert_eq!(manager.instance_count(), 0);
    /// ```
    pub fn new() -> Self {
        Self {
            instances: Mutex::new(HashMap::new()),
        }
    }

    fn key(config: &CaptchaConfig) -> String {
        format!("{}|{}", config.languages, config.char_whitelist)
    }

    /// Get or create an OCR instance for the given configuration
    ///
    /// # Arguments
    ///
    /// * `config` - CAPTCHA configuration; `languages` and `char_whitelist` form the cache key
    ///
    /// # Returns
    ///
    /// A shared handle to a Tesseract instance with the whitelist already applied
    ///
    /// # Errors
    ///
    /// Returns [`CaptchaError::Initialization`] if Tesseract cannot be created
    /// (missing traineddata for the languages, for instance).
    pub fn get_instance(&self, config: &CaptchaConfig) -> Result<Arc<Mutex<LepTess>>, CaptchaError> {
        let key = Self::key(config);

        {
            let instances = self.instances.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(instance) = instances.get(&key) {
                return Ok(Arc::clone(instance));
            }
        }

        info!(languages = %config.languages, "Creating new OCR instance");
        let mut tess = LepTess::new(None, &config.languages)
            .map_err(|e| CaptchaError::Initialization(e.to_string()))?;
        tess.set_variable(Variable::TesseditCharWhitelist, &config.char_whitelist)
            .map_err(|e| CaptchaError::Initialization(format!("{e:?}")))?;

        let instance = Arc::new(Mutex::new(tess));
        self.instances
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, Arc::clone(&instance));

        Ok(instance)
    }

    /// Drop an instance, e.g. after it produced an engine error
    pub fn remove_instance(&self, config: &CaptchaConfig) {
        let key = Self::key(config);
        let mut instances = self.instances.lock().unwrap_or_else(PoisonError::into_inner);
        if instances.remove(&key).is_some() {
            info!(languages = %config.languages, "Removed OCR instance");
        }
    }

    pub fn instance_count(&self) -> usize {
        self.instances
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl Default for OcrInstanceManager {
    fn default() -> Self {
        Self::new()
    }
}
