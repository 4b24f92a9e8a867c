//! # Portal Bot
//!
//! A chat bot that logs students into the college portal with a headless
//! browser, solves the login CAPTCHA with OCR, and relays attendance,
//! results, admit cards and timetables back into the conversation.

pub mod bot;
pub mod captcha;
pub mod circuit_breaker;
pub mod config;
pub mod debug_gate;
pub mod errors;
pub mod instance_manager;
pub mod localization;
pub mod ocr;
pub mod portal;
pub mod session;
