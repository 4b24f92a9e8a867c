//! Messaging transport seam.

use anyhow::Result;
use async_trait::async_trait;

use crate::session::UserId;

/// Outbound side of the chat network
#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn send_text(&self, user: &UserId, text: &str) -> Result<()>;

    /// Send an image attachment with a caption
    async fn send_image(&self, user: &UserId, png: Vec<u8>, caption: &str) -> Result<()>;
}
