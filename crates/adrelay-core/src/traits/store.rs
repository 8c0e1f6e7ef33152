//! Persistence seam: simple get/set/list operations over flat records.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::types::{
    Account, AdOwner, Advertisement, Campaign, CampaignStatus, Destination, ForwardingRecord,
    GroupPerformance, NewAdvertisement, NewForwardingRecord, UserAnalytics,
};

#[async_trait]
pub trait Store: Send + Sync {
    // ── Accounts ─────────────────────────────────────

    /// Register an account if unknown; refreshes the username otherwise.
    async fn add_account(&self, user_id: i64, username: Option<&str>) -> Result<()>;
    async fn get_account(&self, user_id: i64) -> Result<Option<Account>>;
    /// Active accounts holding a session credential.
    async fn list_active_accounts(&self) -> Result<Vec<Account>>;
    async fn update_session(&self, user_id: i64, session: &str, phone: Option<&str>) -> Result<()>;
    async fn clear_session(&self, user_id: i64) -> Result<()>;
    async fn set_active(&self, user_id: i64, active: bool) -> Result<()>;
    async fn set_delay(&self, user_id: i64, delay_secs: u64) -> Result<()>;
    /// `until = None` with `premium = true` grants premium without expiry.
    async fn set_premium(
        &self,
        user_id: i64,
        premium: bool,
        until: Option<DateTime<Utc>>,
    ) -> Result<()>;
    async fn set_log_channel(&self, user_id: i64, channel_id: Option<i64>) -> Result<()>;
    async fn touch_last_run(&self, user_id: i64, at: DateTime<Utc>) -> Result<()>;

    // ── Advertisements ───────────────────────────────

    /// Save an ad. With `replace`, the owner's other ads are deactivated.
    async fn save_ad(&self, owner: AdOwner, ad: NewAdvertisement, replace: bool) -> Result<i64>;
    async fn get_ad(&self, id: i64) -> Result<Option<Advertisement>>;
    /// Active ads of an owner, newest first.
    async fn active_ads(&self, owner: AdOwner) -> Result<Vec<Advertisement>>;
    async fn set_ad_active(&self, id: i64, active: bool) -> Result<()>;

    // ── Destinations ─────────────────────────────────

    async fn add_destination(&self, user_id: i64, group_id: i64, group_name: &str) -> Result<()>;
    async fn remove_destination(&self, user_id: i64, group_id: i64) -> Result<bool>;
    /// All destinations, paused included, in forwarding order.
    async fn list_destinations(&self, user_id: i64) -> Result<Vec<Destination>>;
    /// Destinations that are not paused, priority DESC then name ASC.
    async fn forwardable_destinations(&self, user_id: i64) -> Result<Vec<Destination>>;
    async fn set_paused(&self, user_id: i64, group_id: i64, paused: bool) -> Result<bool>;
    async fn set_priority(&self, user_id: i64, group_id: i64, priority: i32) -> Result<bool>;

    // ── Forwarding records ───────────────────────────

    async fn add_record(&self, record: NewForwardingRecord) -> Result<i64>;
    async fn recent_records(&self, user_id: i64, limit: usize) -> Result<Vec<ForwardingRecord>>;
    /// Ad used by the most recent successful forward.
    async fn last_success_ad(&self, user_id: i64) -> Result<Option<i64>>;
    async fn user_analytics(&self, user_id: i64, days: u32) -> Result<UserAnalytics>;
    async fn group_performance(&self, user_id: i64, group_id: i64) -> Result<GroupPerformance>;

    // ── Campaigns ────────────────────────────────────

    async fn create_campaign(
        &self,
        user_id: i64,
        ad_id: i64,
        at: DateTime<Utc>,
    ) -> Result<i64>;
    /// Pending campaigns scheduled at or before `now`.
    async fn due_campaigns(&self, now: DateTime<Utc>) -> Result<Vec<Campaign>>;
    async fn set_campaign_status(&self, id: i64, status: CampaignStatus) -> Result<()>;
    async fn list_campaigns(&self, user_id: i64) -> Result<Vec<Campaign>>;
}
