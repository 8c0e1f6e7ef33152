//! One-shot scheduled campaigns, checked on an interval.

use std::sync::Arc;

use adrelay_core::error::Result;
use adrelay_core::types::{Campaign, CampaignStatus};
use chrono::{DateTime, Utc};

use crate::forwarder::{Forwarder, PassReport};
use crate::sessions::SessionRegistry;

pub struct CampaignRunner {
    forwarder: Arc<Forwarder>,
    sessions: SessionRegistry,
}

impl CampaignRunner {
    pub fn new(forwarder: Arc<Forwarder>, sessions: SessionRegistry) -> Self {
        Self {
            forwarder,
            sessions,
        }
    }

    /// Run every pending campaign due at `now`. Returns how many ran.
    pub async fn tick(&self, now: DateTime<Utc>) -> Result<usize> {
        let store = self.forwarder.store();
        let due = store.due_campaigns(now).await?;
        for campaign in &due {
            let status = match self.run(campaign).await {
                Ok(Some(report)) => {
                    tracing::info!(
                        "📅 Campaign #{} for user {}: {} sent, {} failed",
                        campaign.id,
                        campaign.user_id,
                        report.sent,
                        report.failed
                    );
                    CampaignStatus::Completed
                }
                Ok(None) => CampaignStatus::Failed,
                Err(e) => {
                    tracing::error!("Campaign #{} failed: {}", campaign.id, e);
                    CampaignStatus::Failed
                }
            };
            store.set_campaign_status(campaign.id, status).await?;
        }
        Ok(due.len())
    }

    /// `None` when the campaign cannot run at all.
    async fn run(&self, campaign: &Campaign) -> Result<Option<PassReport>> {
        let store = self.forwarder.store();
        let Some(account) = store.get_account(campaign.user_id).await? else {
            tracing::warn!("Campaign #{}: account {} is gone", campaign.id, campaign.user_id);
            return Ok(None);
        };
        let Some(transport) = self.sessions.get(campaign.user_id).await else {
            tracing::warn!("Campaign #{}: user {} has no live session", campaign.id, campaign.user_id);
            return Ok(None);
        };
        let ad = match store.get_ad(campaign.ad_id).await? {
            Some(ad) if ad.is_active => ad,
            _ => {
                tracing::warn!("Campaign #{}: ad #{} no longer exists", campaign.id, campaign.ad_id);
                return Ok(None);
            }
        };
        let destinations = store.forwardable_destinations(campaign.user_id).await?;
        let report = self
            .forwarder
            .run_pass(transport.as_ref(), &account, &ad, &destinations)
            .await?;
        Ok(Some(report))
    }
}

/// Spawn the campaign ticker as a background tokio task.
pub fn spawn_campaign_runner(
    runner: Arc<CampaignRunner>,
    check_interval_secs: u64,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        tracing::info!("⏰ Campaign runner started (check every {}s)", check_interval_secs);
        let mut interval =
            tokio::time::interval(std::time::Duration::from_secs(check_interval_secs.max(1)));
        loop {
            interval.tick().await;
            if let Err(e) = runner.tick(Utc::now()).await {
                tracing::error!("Campaign tick failed: {}", e);
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use adrelay_core::config::ForwardingConfig;
    use adrelay_core::tier::TierPolicy;
    use adrelay_core::traits::Store;
    use adrelay_core::types::{AdOwner, NewAdvertisement};
    use chrono::Duration;

    use crate::testing::{RecordingTransport, memory_store, seed_account};

    #[tokio::test(start_paused = true)]
    async fn test_due_campaigns_run_once() {
        let store = memory_store();
        seed_account(&store, 1, true, 30, 2).await;
        seed_account(&store, 2, false, 300, 1).await;
        let ad = store
            .save_ad(
                AdOwner::User(1),
                NewAdvertisement {
                    text: "Launch".into(),
                    media: None,
                },
                false,
            )
            .await
            .unwrap();

        let now = Utc::now();
        let due = store.create_campaign(1, ad, now - Duration::minutes(1)).await.unwrap();
        let later = store.create_campaign(1, ad, now + Duration::hours(1)).await.unwrap();
        let no_session = store.create_campaign(2, ad, now - Duration::minutes(1)).await.unwrap();
        let no_ad = store.create_campaign(1, 999, now - Duration::minutes(1)).await.unwrap();

        let transport = RecordingTransport::new();
        let sessions = SessionRegistry::new();
        sessions.insert(1, transport.clone()).await;
        let forwarder = Arc::new(Forwarder::new(
            store.clone(),
            TierPolicy::default(),
            ForwardingConfig::default(),
        ));
        let runner = CampaignRunner::new(forwarder, sessions);

        assert_eq!(runner.tick(now).await.unwrap(), 3);
        assert_eq!(transport.sent().len(), 2);
        assert!(transport.sent().iter().all(|s| s.text == "Launch"));

        let status = |id: i64, list: &[Campaign]| {
            list.iter().find(|c| c.id == id).map(|c| c.status)
        };
        let mine = store.list_campaigns(1).await.unwrap();
        assert_eq!(status(due, &mine), Some(CampaignStatus::Completed));
        assert_eq!(status(later, &mine), Some(CampaignStatus::Pending));
        assert_eq!(status(no_ad, &mine), Some(CampaignStatus::Failed));
        let theirs = store.list_campaigns(2).await.unwrap();
        assert_eq!(status(no_session, &theirs), Some(CampaignStatus::Failed));

        // Completed campaigns are not picked up again.
        assert_eq!(runner.tick(now).await.unwrap(), 0);
        assert_eq!(transport.sent().len(), 2);
    }
}
