//! Test doubles: a recording transport and a factory handing them out.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use adrelay_core::error::{AdRelayError, Result};
use adrelay_core::traits::{Store, Transport, TransportFactory};
use adrelay_core::types::{
    Account, AdOwner, Advertisement, Campaign, CampaignStatus, Destination, ForwardingRecord,
    GroupPerformance, Identity, Media, NewAdvertisement, NewForwardingRecord, UserAnalytics,
};
use chrono::{DateTime, Utc};
use adrelay_store::SqliteStore;
use async_trait::async_trait;
use tokio::time::Instant;

#[derive(Debug, Clone)]
pub struct Sent {
    pub chat_id: i64,
    pub text: String,
    pub media: Option<Media>,
    pub at: Instant,
}

#[derive(Debug, Clone, Copy)]
pub enum Fail {
    RateLimit(u64),
    Error,
}

#[derive(Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<Sent>>,
    failures: Mutex<HashMap<i64, Fail>>,
    disconnected: bool,
}

impl RecordingTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn disconnected() -> Arc<Self> {
        Arc::new(Self {
            disconnected: true,
            ..Default::default()
        })
    }

    pub fn fail_chat(&self, chat_id: i64, fail: Fail) {
        self.failures.lock().unwrap().insert(chat_id, fail);
    }

    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }

    /// Attempts to a chat, successful or not.
    pub fn attempts_to(&self, chat_id: i64) -> Vec<Sent> {
        self.sent()
            .into_iter()
            .filter(|s| s.chat_id == chat_id)
            .collect()
    }

    fn record(&self, chat_id: i64, text: &str, media: Option<&Media>) -> Result<()> {
        let fail = self.failures.lock().unwrap().get(&chat_id).copied();
        self.sent.lock().unwrap().push(Sent {
            chat_id,
            text: text.to_string(),
            media: media.cloned(),
            at: Instant::now(),
        });
        match fail {
            None => Ok(()),
            Some(Fail::RateLimit(secs)) => Err(AdRelayError::RateLimited {
                retry_after_secs: secs,
            }),
            Some(Fail::Error) => Err(AdRelayError::Transport("CHAT_WRITE_FORBIDDEN".into())),
        }
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    fn name(&self) -> &str {
        "recording"
    }

    async fn get_me(&self) -> Result<Identity> {
        if self.disconnected {
            return Err(AdRelayError::Transport("AUTH_KEY_UNREGISTERED".into()));
        }
        Ok(Identity {
            id: 1,
            first_name: "Tester".into(),
            username: Some("tester".into()),
        })
    }

    fn is_connected(&self) -> bool {
        !self.disconnected
    }

    async fn send_message(&self, chat_id: i64, text: &str) -> Result<()> {
        self.record(chat_id, text, None)
    }

    async fn send_media(&self, chat_id: i64, media: &Media, caption: &str) -> Result<()> {
        self.record(chat_id, caption, Some(media))
    }
}

/// Hands out one shared recording transport per account; rejects "bad" sessions.
#[derive(Default)]
pub struct RecordingFactory {
    pub transports: Mutex<HashMap<i64, Arc<RecordingTransport>>>,
}

impl RecordingFactory {
    pub fn transport(&self, user_id: i64) -> Option<Arc<RecordingTransport>> {
        self.transports.lock().unwrap().get(&user_id).cloned()
    }
}

#[async_trait]
impl TransportFactory for RecordingFactory {
    async fn connect(&self, account: &Account) -> Result<Arc<dyn Transport>> {
        if account.session.as_deref() == Some("bad") {
            return Err(AdRelayError::Transport("SESSION_REVOKED".into()));
        }
        let transport = self
            .transports
            .lock()
            .unwrap()
            .entry(account.user_id)
            .or_insert_with(RecordingTransport::new)
            .clone();
        Ok(transport)
    }
}

/// SQLite store whose next `n` account lookups fail with a database error.
pub struct FlakyStore {
    inner: Arc<SqliteStore>,
    failures: AtomicUsize,
}

impl FlakyStore {
    pub fn new(inner: Arc<SqliteStore>, failures: usize) -> Arc<Self> {
        Arc::new(Self {
            inner,
            failures: AtomicUsize::new(failures),
        })
    }
}

#[async_trait]
impl Store for FlakyStore {
    async fn add_account(&self, user_id: i64, username: Option<&str>) -> Result<()> {
        self.inner.add_account(user_id, username).await
    }
    async fn get_account(&self, user_id: i64) -> Result<Option<Account>> {
        let left = self.failures.load(Ordering::SeqCst);
        if left > 0 {
            self.failures.store(left - 1, Ordering::SeqCst);
            return Err(AdRelayError::Database("database is locked".into()));
        }
        self.inner.get_account(user_id).await
    }
    async fn list_active_accounts(&self) -> Result<Vec<Account>> {
        self.inner.list_active_accounts().await
    }
    async fn update_session(&self, user_id: i64, session: &str, phone: Option<&str>) -> Result<()> {
        self.inner.update_session(user_id, session, phone).await
    }
    async fn clear_session(&self, user_id: i64) -> Result<()> {
        self.inner.clear_session(user_id).await
    }
    async fn set_active(&self, user_id: i64, active: bool) -> Result<()> {
        self.inner.set_active(user_id, active).await
    }
    async fn set_delay(&self, user_id: i64, delay_secs: u64) -> Result<()> {
        self.inner.set_delay(user_id, delay_secs).await
    }
    async fn set_premium(
        &self,
        user_id: i64,
        premium: bool,
        until: Option<DateTime<Utc>>,
    ) -> Result<()> {
        self.inner.set_premium(user_id, premium, until).await
    }
    async fn set_log_channel(&self, user_id: i64, channel_id: Option<i64>) -> Result<()> {
        self.inner.set_log_channel(user_id, channel_id).await
    }
    async fn touch_last_run(&self, user_id: i64, at: DateTime<Utc>) -> Result<()> {
        self.inner.touch_last_run(user_id, at).await
    }
    async fn save_ad(&self, owner: AdOwner, ad: NewAdvertisement, replace: bool) -> Result<i64> {
        self.inner.save_ad(owner, ad, replace).await
    }
    async fn get_ad(&self, id: i64) -> Result<Option<Advertisement>> {
        self.inner.get_ad(id).await
    }
    async fn active_ads(&self, owner: AdOwner) -> Result<Vec<Advertisement>> {
        self.inner.active_ads(owner).await
    }
    async fn set_ad_active(&self, id: i64, active: bool) -> Result<()> {
        self.inner.set_ad_active(id, active).await
    }
    async fn add_destination(&self, user_id: i64, group_id: i64, group_name: &str) -> Result<()> {
        self.inner.add_destination(user_id, group_id, group_name).await
    }
    async fn remove_destination(&self, user_id: i64, group_id: i64) -> Result<bool> {
        self.inner.remove_destination(user_id, group_id).await
    }
    async fn list_destinations(&self, user_id: i64) -> Result<Vec<Destination>> {
        self.inner.list_destinations(user_id).await
    }
    async fn forwardable_destinations(&self, user_id: i64) -> Result<Vec<Destination>> {
        self.inner.forwardable_destinations(user_id).await
    }
    async fn set_paused(&self, user_id: i64, group_id: i64, paused: bool) -> Result<bool> {
        self.inner.set_paused(user_id, group_id, paused).await
    }
    async fn set_priority(&self, user_id: i64, group_id: i64, priority: i32) -> Result<bool> {
        self.inner.set_priority(user_id, group_id, priority).await
    }
    async fn add_record(&self, record: NewForwardingRecord) -> Result<i64> {
        self.inner.add_record(record).await
    }
    async fn recent_records(&self, user_id: i64, limit: usize) -> Result<Vec<ForwardingRecord>> {
        self.inner.recent_records(user_id, limit).await
    }
    async fn last_success_ad(&self, user_id: i64) -> Result<Option<i64>> {
        self.inner.last_success_ad(user_id).await
    }
    async fn user_analytics(&self, user_id: i64, days: u32) -> Result<UserAnalytics> {
        self.inner.user_analytics(user_id, days).await
    }
    async fn group_performance(&self, user_id: i64, group_id: i64) -> Result<GroupPerformance> {
        self.inner.group_performance(user_id, group_id).await
    }
    async fn create_campaign(&self, user_id: i64, ad_id: i64, at: DateTime<Utc>) -> Result<i64> {
        self.inner.create_campaign(user_id, ad_id, at).await
    }
    async fn due_campaigns(&self, now: DateTime<Utc>) -> Result<Vec<Campaign>> {
        self.inner.due_campaigns(now).await
    }
    async fn set_campaign_status(&self, id: i64, status: CampaignStatus) -> Result<()> {
        self.inner.set_campaign_status(id, status).await
    }
    async fn list_campaigns(&self, user_id: i64) -> Result<Vec<Campaign>> {
        self.inner.list_campaigns(user_id).await
    }
}

pub fn memory_store() -> Arc<SqliteStore> {
    Arc::new(SqliteStore::open(&PathBuf::from(":memory:")).unwrap())
}

/// Account with a session and `n` destinations (-1, -2, ...) named G1, G2, ...
pub async fn seed_account(store: &SqliteStore, user_id: i64, premium: bool, delay: u64, n: i64) {
    store.add_account(user_id, Some("seed")).await.unwrap();
    store.update_session(user_id, "token", None).await.unwrap();
    store.set_active(user_id, true).await.unwrap();
    store.set_delay(user_id, delay).await.unwrap();
    if premium {
        store.set_premium(user_id, true, None).await.unwrap();
    }
    for i in 1..=n {
        store
            .add_destination(user_id, -i, &format!("G{i}"))
            .await
            .unwrap();
    }
}
