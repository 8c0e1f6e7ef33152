//! Flat records shared by the store, the scheduler and the command surface.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A connected messaging identity used to send content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub user_id: i64,
    pub username: Option<String>,
    /// Credential the account transport authenticates with.
    pub session: Option<String>,
    pub phone: Option<String>,
    /// Cycle delay requested by the account (only honoured for premium).
    pub delay_secs: u64,
    pub is_active: bool,
    pub is_premium: bool,
    pub premium_until: Option<DateTime<Utc>>,
    /// Chat that receives a note after every successful forward.
    pub log_channel_id: Option<i64>,
    pub last_ad_run: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Account {
    /// Whether the account has a transport credential on file.
    pub fn has_session(&self) -> bool {
        self.session.as_deref().is_some_and(|s| !s.is_empty())
    }
}

/// Who published an advertisement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdOwner {
    User(i64),
    /// The bot operator; these ads are broadcast through free accounts.
    Operator,
}

/// Media kinds an advertisement can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Photo,
    Video,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Photo => "photo",
            MediaKind::Video => "video",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "photo" => Some(MediaKind::Photo),
            "video" => Some(MediaKind::Video),
            _ => None,
        }
    }
}

/// A media reference held by the messaging network (e.g. a Telegram file_id).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Media {
    pub kind: MediaKind,
    pub file_id: String,
}

/// Promotional content to forward.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Advertisement {
    pub id: i64,
    pub owner: AdOwner,
    pub text: String,
    pub media: Option<Media>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// Input for creating an advertisement.
#[derive(Debug, Clone, Default)]
pub struct NewAdvertisement {
    pub text: String,
    pub media: Option<Media>,
}

/// A group or channel target for forwarded content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Destination {
    pub user_id: i64,
    pub group_id: i64,
    pub group_name: String,
    /// Higher goes first.
    pub priority: i32,
    pub paused: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ForwardStatus {
    Success,
    Failed,
}

impl ForwardStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ForwardStatus::Success => "success",
            ForwardStatus::Failed => "failed",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ForwardStatus::Success)
    }
}

/// One attempt to deliver an ad to a destination.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForwardingRecord {
    pub id: i64,
    pub user_id: i64,
    pub group_id: i64,
    pub group_name: String,
    pub ad_id: Option<i64>,
    pub status: ForwardStatus,
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Input for appending a forwarding record.
#[derive(Debug, Clone)]
pub struct NewForwardingRecord {
    pub user_id: i64,
    pub group_id: i64,
    pub group_name: String,
    pub ad_id: Option<i64>,
    pub status: ForwardStatus,
    pub error: Option<String>,
}

impl NewForwardingRecord {
    pub fn success(user_id: i64, dest: &Destination, ad_id: i64) -> Self {
        Self {
            user_id,
            group_id: dest.group_id,
            group_name: dest.group_name.clone(),
            ad_id: Some(ad_id),
            status: ForwardStatus::Success,
            error: None,
        }
    }

    pub fn failed(user_id: i64, dest: &Destination, ad_id: i64, error: impl Into<String>) -> Self {
        Self {
            user_id,
            group_id: dest.group_id,
            group_name: dest.group_name.clone(),
            ad_id: Some(ad_id),
            status: ForwardStatus::Failed,
            error: Some(error.into()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CampaignStatus {
    Pending,
    Completed,
    Failed,
}

impl CampaignStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CampaignStatus::Pending => "pending",
            CampaignStatus::Completed => "completed",
            CampaignStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "completed" => CampaignStatus::Completed,
            "failed" => CampaignStatus::Failed,
            _ => CampaignStatus::Pending,
        }
    }
}

/// A one-shot forwarding pass scheduled for a specific time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Campaign {
    pub id: i64,
    pub user_id: i64,
    pub ad_id: i64,
    pub scheduled_at: DateTime<Utc>,
    pub status: CampaignStatus,
    pub created_at: DateTime<Utc>,
}

/// Identity reported by a transport (`getMe`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Identity {
    pub id: i64,
    pub first_name: String,
    pub username: Option<String>,
}

/// Per-destination totals inside an analytics window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupStats {
    pub group_id: i64,
    pub name: String,
    pub forwards: u64,
    pub successful: u64,
}

/// Per-day totals inside an analytics window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailyStats {
    /// `YYYY-MM-DD` (UTC).
    pub date: String,
    pub total: u64,
    pub successful: u64,
}

/// Forwarding performance of one account over the last N days.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserAnalytics {
    pub total_forwards: u64,
    pub successful: u64,
    pub failed: u64,
    pub top_groups: Vec<GroupStats>,
    pub daily_stats: Vec<DailyStats>,
}

impl UserAnalytics {
    /// Success percentage, 0 when nothing was forwarded.
    pub fn success_rate(&self) -> f64 {
        success_rate(self.successful, self.total_forwards)
    }
}

/// All-time performance of one destination.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GroupPerformance {
    pub total_forwards: u64,
    pub successful: u64,
    pub failed: u64,
    pub first_forward: Option<DateTime<Utc>>,
    pub last_forward: Option<DateTime<Utc>>,
}

impl GroupPerformance {
    pub fn success_rate(&self) -> f64 {
        success_rate(self.successful, self.total_forwards)
    }
}

fn success_rate(successful: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        successful as f64 / total as f64 * 100.0
    }
}
