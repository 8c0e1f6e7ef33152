//! The forwarding cycle: one ad, every forwardable destination, then sleep.

use std::sync::Arc;
use std::time::Duration;

use adrelay_core::config::ForwardingConfig;
use adrelay_core::error::{AdRelayError, Result};
use adrelay_core::tier::{Tier, TierPolicy};
use adrelay_core::traits::{Store, Transport};
use adrelay_core::types::{Account, Advertisement, Destination, NewForwardingRecord};
use chrono::Utc;
use serde::Serialize;

use crate::rotation;
use crate::sessions::SessionRegistry;

/// What the account loop should do after a cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Leave the loop for good.
    Stop(String),
    /// Sleep, then run another cycle.
    Sleep(Duration),
}

/// Result of sending one ad to a list of destinations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PassReport {
    pub sent: u32,
    pub failed: u32,
}

/// Sends ads on behalf of accounts and records every attempt.
pub struct Forwarder {
    store: Arc<dyn Store>,
    policy: TierPolicy,
    timing: ForwardingConfig,
}

impl Forwarder {
    pub fn new(store: Arc<dyn Store>, policy: TierPolicy, timing: ForwardingConfig) -> Self {
        Self {
            store,
            policy,
            timing,
        }
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub fn policy(&self) -> &TierPolicy {
        &self.policy
    }

    pub fn timing(&self) -> &ForwardingConfig {
        &self.timing
    }

    /// Send one ad to one destination and record the success.
    ///
    /// On flood control the mandated wait is slept out here, then the
    /// `RateLimited` error is returned so the caller counts a failure.
    pub async fn forward_one(
        &self,
        transport: &dyn Transport,
        account: &Account,
        dest: &Destination,
        ad: &Advertisement,
        tier: Tier,
    ) -> Result<()> {
        let text = self.policy.compose(&ad.text, tier);
        let sent = match &ad.media {
            Some(media) => transport.send_media(dest.group_id, media, &text).await,
            None => transport.send_message(dest.group_id, &text).await,
        };

        if let Err(e) = sent {
            if let Some(secs) = e.retry_after() {
                tracing::warn!(
                    "⏳ Rate limited for user {} in '{}': waiting {}s",
                    account.user_id,
                    dest.group_name,
                    secs
                );
                tokio::time::sleep(Duration::from_secs(secs)).await;
            }
            return Err(e);
        }

        self.store
            .add_record(NewForwardingRecord::success(account.user_id, dest, ad.id))
            .await?;
        tracing::info!("📤 User {} → '{}' (ad #{})", account.user_id, dest.group_name, ad.id);

        if let Some(channel) = account.log_channel_id {
            let note = format!("✅ Ad #{} sent to {}", ad.id, dest.group_name);
            if let Err(e) = transport.send_message(channel, &note).await {
                tracing::warn!("Log channel {} unreachable for user {}: {}", channel, account.user_id, e);
            }
        }
        Ok(())
    }

    /// Forward `ad` to each destination in order.
    ///
    /// A failed destination is recorded and skipped without the gap; a
    /// successful one is followed by the inter-destination gap.
    pub async fn run_pass(
        &self,
        transport: &dyn Transport,
        account: &Account,
        ad: &Advertisement,
        destinations: &[Destination],
    ) -> Result<PassReport> {
        let tier = Tier::of(account, Utc::now());
        let gap = Duration::from_secs(self.timing.destination_gap_secs);
        let mut report = PassReport::default();

        for dest in destinations {
            match self.forward_one(transport, account, dest, ad, tier).await {
                Ok(()) => {
                    report.sent += 1;
                    tokio::time::sleep(gap).await;
                }
                Err(e) => {
                    tracing::warn!(
                        "❌ User {} failed to post in '{}': {}",
                        account.user_id,
                        dest.group_name,
                        e
                    );
                    self.store
                        .add_record(NewForwardingRecord::failed(
                            account.user_id,
                            dest,
                            ad.id,
                            e.to_string(),
                        ))
                        .await?;
                    report.failed += 1;
                }
            }
        }
        Ok(report)
    }

    /// One iteration of an account's loop, minus the final sleep.
    pub async fn cycle(&self, user_id: i64, sessions: &SessionRegistry) -> Result<CycleOutcome> {
        let idle = CycleOutcome::Sleep(Duration::from_secs(self.timing.idle_retry_secs));

        let Some(account) = self.store.get_account(user_id).await? else {
            return Ok(CycleOutcome::Stop("account removed".into()));
        };
        if !account.is_active {
            return Ok(CycleOutcome::Stop("automation stopped".into()));
        }
        if !account.has_session() {
            return Ok(CycleOutcome::Stop("logged out".into()));
        }
        let Some(transport) = sessions.get(user_id).await else {
            return Ok(CycleOutcome::Stop("no live session".into()));
        };

        let Some(ad) = rotation::next_ad(self.store.as_ref(), user_id).await? else {
            tracing::debug!("User {} has no active ad, idling", user_id);
            return Ok(idle);
        };
        let destinations = self.store.forwardable_destinations(user_id).await?;
        if destinations.is_empty() {
            tracing::debug!("User {} has no forwardable destinations, idling", user_id);
            return Ok(idle);
        }

        let report = self
            .run_pass(transport.as_ref(), &account, &ad, &destinations)
            .await?;
        let now = Utc::now();
        self.store.touch_last_run(user_id, now).await?;

        let delay = self.policy.cycle_delay(&account, now);
        tracing::info!(
            "🔁 User {} cycle done: {} sent, {} failed, next in {}s ({})",
            user_id,
            report.sent,
            report.failed,
            delay.as_secs(),
            Tier::of(&account, now)
        );
        Ok(CycleOutcome::Sleep(delay))
    }
}

/// Drive an account until its cycle asks to stop. Unexpected errors back
/// off and retry; cancellation is by aborting the task.
pub async fn run_account_loop(user_id: i64, forwarder: Arc<Forwarder>, sessions: SessionRegistry) {
    tracing::info!("🚀 Forwarding loop started for user {}", user_id);
    let backoff = Duration::from_secs(forwarder.timing.error_backoff_secs);
    loop {
        match forwarder.cycle(user_id, &sessions).await {
            Ok(CycleOutcome::Stop(reason)) => {
                tracing::info!("🛑 Forwarding loop for user {} ended: {}", user_id, reason);
                break;
            }
            Ok(CycleOutcome::Sleep(delay)) => tokio::time::sleep(delay).await,
            Err(AdRelayError::NoSession(id)) => {
                tracing::info!("🛑 Forwarding loop for user {} ended: no session", id);
                break;
            }
            Err(e) => {
                tracing::error!("Forwarding loop error for user {}: {}", user_id, e);
                tokio::time::sleep(backoff).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use adrelay_core::types::{AdOwner, ForwardStatus, Media, MediaKind, NewAdvertisement};
    use tokio::time::Instant;

    use crate::testing::{Fail, FlakyStore, RecordingTransport, memory_store, seed_account};

    fn forwarder(store: Arc<dyn Store>) -> Arc<Forwarder> {
        Arc::new(Forwarder::new(
            store,
            TierPolicy::default(),
            ForwardingConfig::default(),
        ))
    }

    async fn save_text_ad(store: &dyn Store, user_id: i64, text: &str) -> i64 {
        store
            .save_ad(
                AdOwner::User(user_id),
                NewAdvertisement {
                    text: text.into(),
                    media: None,
                },
                false,
            )
            .await
            .unwrap()
    }

    fn offsets(start: Instant, transport: &RecordingTransport) -> Vec<(i64, u64)> {
        transport
            .sent()
            .iter()
            .map(|s| (s.chat_id, (s.at - start).as_secs()))
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_premium_loop_timing() {
        let store = memory_store();
        seed_account(&store, 1, true, 30, 3).await;
        save_text_ad(store.as_ref(), 1, "Buy now").await;

        let transport = RecordingTransport::new();
        let sessions = SessionRegistry::new();
        sessions.insert(1, transport.clone()).await;

        let start = Instant::now();
        let handle = tokio::spawn(run_account_loop(1, forwarder(store.clone()), sessions));
        tokio::time::sleep(Duration::from_secs(37)).await;
        handle.abort();

        // Equal priority sorts by name; 2s gaps; 30s cycle delay after the last gap.
        assert_eq!(
            offsets(start, &transport),
            vec![(-1, 0), (-2, 2), (-3, 4), (-1, 36)]
        );
        assert!(transport.sent().iter().all(|s| s.text == "Buy now"));

        let account = store.get_account(1).await.unwrap().unwrap();
        assert!(account.last_ad_run.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_sleeps_then_skips_destination() {
        let store = memory_store();
        seed_account(&store, 1, true, 60, 3).await;
        let ad_id = save_text_ad(store.as_ref(), 1, "Hello").await;

        let transport = RecordingTransport::new();
        transport.fail_chat(-2, Fail::RateLimit(10));
        let sessions = SessionRegistry::new();
        sessions.insert(1, transport.clone()).await;

        let start = Instant::now();
        let outcome = forwarder(store.clone()).cycle(1, &sessions).await.unwrap();
        assert_eq!(outcome, CycleOutcome::Sleep(Duration::from_secs(60)));

        // -2 attempted once at t=2, 10s wait, no gap after a failure.
        assert_eq!(
            offsets(start, &transport),
            vec![(-1, 0), (-2, 2), (-3, 12)]
        );

        let records = store.recent_records(1, 10).await.unwrap();
        assert_eq!(records.len(), 3);
        let failed: Vec<_> = records
            .iter()
            .filter(|r| r.status == ForwardStatus::Failed)
            .collect();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].group_id, -2);
        assert_eq!(failed[0].ad_id, Some(ad_id));
        assert!(failed[0].error.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_free_tier_footer_and_fixed_delay() {
        let store = memory_store();
        // A custom delay on a free account is ignored.
        seed_account(&store, 2, false, 20, 1).await;
        save_text_ad(store.as_ref(), 2, "Sale").await;

        let transport = RecordingTransport::new();
        let sessions = SessionRegistry::new();
        sessions.insert(2, transport.clone()).await;

        let fwd = forwarder(store.clone());
        let outcome = fwd.cycle(2, &sessions).await.unwrap();
        assert_eq!(outcome, CycleOutcome::Sleep(Duration::from_secs(300)));

        let sent = transport.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].text, format!("Sale{}", fwd.policy().footer));
        assert!(sent[0].text.ends_with("Sent via @AdRelayBot"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_media_ad_and_log_channel_note() {
        let store = memory_store();
        seed_account(&store, 3, true, 30, 1).await;
        store.set_log_channel(3, Some(-999)).await.unwrap();
        store
            .save_ad(
                AdOwner::User(3),
                NewAdvertisement {
                    text: "Look".into(),
                    media: Some(Media {
                        kind: MediaKind::Photo,
                        file_id: "AgAD".into(),
                    }),
                },
                true,
            )
            .await
            .unwrap();

        let transport = RecordingTransport::new();
        transport.fail_chat(-999, Fail::Error);
        let sessions = SessionRegistry::new();
        sessions.insert(3, transport.clone()).await;

        let outcome = forwarder(store.clone()).cycle(3, &sessions).await.unwrap();
        assert!(matches!(outcome, CycleOutcome::Sleep(_)));

        let to_group = transport.attempts_to(-1);
        assert_eq!(to_group.len(), 1);
        assert_eq!(to_group[0].text, "Look");
        assert_eq!(
            to_group[0].media.as_ref().map(|m| m.kind),
            Some(MediaKind::Photo)
        );
        // Note attempted; its failure does not turn the forward into a failure.
        assert_eq!(transport.attempts_to(-999).len(), 1);
        let records = store.recent_records(3, 10).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status, ForwardStatus::Success);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cycle_stops_and_idles() {
        let store = memory_store();
        let fwd = forwarder(store.clone());
        let sessions = SessionRegistry::new();

        // Unknown account.
        assert!(matches!(fwd.cycle(9, &sessions).await.unwrap(), CycleOutcome::Stop(_)));

        seed_account(&store, 1, true, 30, 0).await;
        // Registered but no live transport.
        assert!(matches!(fwd.cycle(1, &sessions).await.unwrap(), CycleOutcome::Stop(_)));

        sessions.insert(1, RecordingTransport::new()).await;
        let idle = CycleOutcome::Sleep(Duration::from_secs(300));
        // No ad yet.
        assert_eq!(fwd.cycle(1, &sessions).await.unwrap(), idle);
        // Ad but no destinations.
        save_text_ad(store.as_ref(), 1, "x").await;
        assert_eq!(fwd.cycle(1, &sessions).await.unwrap(), idle);
        // Only paused destinations.
        store.add_destination(1, -7, "Paused").await.unwrap();
        store.set_paused(1, -7, true).await.unwrap();
        assert_eq!(fwd.cycle(1, &sessions).await.unwrap(), idle);

        store.set_active(1, false).await.unwrap();
        assert!(matches!(fwd.cycle(1, &sessions).await.unwrap(), CycleOutcome::Stop(_)));

        store.set_active(1, true).await.unwrap();
        store.clear_session(1).await.unwrap();
        assert!(matches!(fwd.cycle(1, &sessions).await.unwrap(), CycleOutcome::Stop(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_loop_exits_when_deactivated() {
        let store = memory_store();
        seed_account(&store, 1, true, 30, 1).await;
        save_text_ad(store.as_ref(), 1, "x").await;
        let sessions = SessionRegistry::new();
        sessions.insert(1, RecordingTransport::new()).await;

        let handle = tokio::spawn(run_account_loop(1, forwarder(store.clone()), sessions));
        tokio::time::sleep(Duration::from_secs(5)).await;
        store.set_active(1, false).await.unwrap();
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert!(handle.is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn test_store_errors_back_off_then_resume() {
        let store = memory_store();
        seed_account(&store, 1, true, 30, 1).await;
        save_text_ad(store.as_ref(), 1, "x").await;
        let transport = RecordingTransport::new();
        let sessions = SessionRegistry::new();
        sessions.insert(1, transport.clone()).await;

        let flaky = FlakyStore::new(store.clone(), 2);
        let start = Instant::now();
        let handle = tokio::spawn(run_account_loop(1, forwarder(flaky), sessions));
        tokio::time::sleep(Duration::from_secs(155)).await;
        assert!(!handle.is_finished());
        handle.abort();

        // Two failed cycles, 60s apart, then the normal 2s gap + 30s delay.
        assert_eq!(offsets(start, &transport), vec![(-1, 120), (-1, 152)]);
    }
}
