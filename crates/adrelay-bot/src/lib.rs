//! # AdRelay Bot
//! Long-polls the command bot and answers private chat commands.

pub mod commands;
pub mod handlers;

use std::sync::Arc;

use adrelay_channels::TelegramTransport;
use adrelay_core::error::Result;
use adrelay_core::traits::Transport;
use futures::StreamExt;

pub use commands::Command;
pub use handlers::{BotHandler, Reply};

/// Run the command bot until the update stream ends.
///
/// `poller` is consumed by the polling task; replies go out through
/// `replier`, a second session on the same bot token.
pub async fn run_bot(
    handler: Arc<BotHandler>,
    poller: TelegramTransport,
    replier: Arc<dyn Transport>,
) -> Result<()> {
    let me = poller.connect().await?;
    tracing::info!(
        "🤖 Command bot @{} is listening",
        me.username.as_deref().unwrap_or("unknown")
    );

    let mut updates = poller.start_polling();
    while let Some(msg) = updates.next().await {
        let handler = handler.clone();
        let replier = replier.clone();
        // Broadcasts and logins can take a while; keep polling meanwhile.
        tokio::spawn(async move {
            let Some(reply) = handler.handle(&msg).await else {
                return;
            };
            let sent = match &reply {
                Reply::Text(text) => replier.send_message(msg.chat_id, text).await,
                Reply::Media { media, caption } => {
                    replier.send_media(msg.chat_id, media, caption).await
                }
            };
            if let Err(e) = sent {
                tracing::warn!("Reply to {} failed: {}", msg.chat_id, e);
            }
        });
    }

    tracing::info!("Command bot stopped");
    Ok(())
}
