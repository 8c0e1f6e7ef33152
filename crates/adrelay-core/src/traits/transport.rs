//! Messaging transport: what an account uses to post into groups.

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::Result;
use crate::types::{Account, Identity, Media};

/// A connected messaging session.
///
/// Implementations must surface flood control as
/// [`AdRelayError::RateLimited`](crate::error::AdRelayError::RateLimited)
/// so the forwarder can honour the mandated wait.
#[async_trait]
pub trait Transport: Send + Sync {
    fn name(&self) -> &str;

    /// Who this session is logged in as.
    async fn get_me(&self) -> Result<Identity>;

    fn is_connected(&self) -> bool;

    async fn send_message(&self, chat_id: i64, text: &str) -> Result<()>;

    /// Send a photo or video by network file reference, with a caption.
    async fn send_media(&self, chat_id: i64, media: &Media, caption: &str) -> Result<()>;
}

/// Builds a live transport for an account's stored credential.
#[async_trait]
pub trait TransportFactory: Send + Sync {
    async fn connect(&self, account: &Account) -> Result<Arc<dyn Transport>>;
}
