//! Operator broadcast through every connected free-tier account.

use std::time::Duration;

use adrelay_core::error::{AdRelayError, Result};
use adrelay_core::tier::Tier;
use adrelay_core::types::AdOwner;
use chrono::Utc;
use serde::Serialize;

use crate::forwarder::Forwarder;
use crate::sessions::SessionRegistry;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BroadcastReport {
    pub accounts: u32,
    pub sent: u32,
    pub failed: u32,
}

/// Send an operator-owned ad to the destinations of every connected free
/// account, footer included. Only a successful send is followed by the gap;
/// failures are logged and skipped. Nothing is written to the forwarding log.
pub async fn broadcast_operator_ad(
    forwarder: &Forwarder,
    sessions: &SessionRegistry,
    ad_id: i64,
) -> Result<BroadcastReport> {
    let store = forwarder.store();
    let ad = store
        .get_ad(ad_id)
        .await?
        .ok_or_else(|| AdRelayError::NotFound(format!("ad #{ad_id}")))?;
    if ad.owner != AdOwner::Operator {
        return Err(AdRelayError::InvalidInput(format!(
            "ad #{ad_id} is not an operator ad"
        )));
    }

    let gap = Duration::from_secs(forwarder.timing().broadcast_gap_secs);
    let text = forwarder.policy().compose(&ad.text, Tier::Free);
    let mut report = BroadcastReport::default();

    for user_id in sessions.user_ids().await {
        let Some(account) = store.get_account(user_id).await? else {
            continue;
        };
        if Tier::of(&account, Utc::now()) != Tier::Free {
            continue;
        }
        let Some(transport) = sessions.get(user_id).await else {
            continue;
        };
        report.accounts += 1;

        for dest in store.forwardable_destinations(user_id).await? {
            let sent = match &ad.media {
                Some(media) => transport.send_media(dest.group_id, media, &text).await,
                None => transport.send_message(dest.group_id, &text).await,
            };
            match sent {
                Ok(()) => {
                    report.sent += 1;
                    tokio::time::sleep(gap).await;
                }
                Err(e) => {
                    tracing::warn!(
                        "📢 Broadcast via user {} to '{}' failed: {}",
                        user_id,
                        dest.group_name,
                        e
                    );
                    report.failed += 1;
                }
            }
        }
    }

    tracing::info!(
        "📢 Operator ad #{} broadcast via {} accounts: {} sent, {} failed",
        ad_id,
        report.accounts,
        report.sent,
        report.failed
    );
    Ok(report)
}
