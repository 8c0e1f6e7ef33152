//! Command handlers: turn a parsed command into store/manager calls and a reply.

use std::sync::Arc;

use adrelay_channels::telegram::IncomingMessage;
use adrelay_core::error::{AdRelayError, Result};
use adrelay_core::tier::{Tier, TierPolicy};
use adrelay_core::traits::Store;
use adrelay_core::types::{AdOwner, Media, NewAdvertisement};
use adrelay_scheduler::{AutomationManager, broadcast_operator_ad, check_session_health, rotation};
use chrono::{Duration, Utc};

use crate::commands::{Command, OPERATOR_HELP, USER_HELP};

/// What the bot sends back to the chat.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Text(String),
    Media { media: Media, caption: String },
}

impl Reply {
    fn text(s: impl Into<String>) -> Self {
        Reply::Text(s.into())
    }
}

pub struct BotHandler {
    store: Arc<dyn Store>,
    manager: Arc<AutomationManager>,
    policy: TierPolicy,
    owner_id: i64,
}

impl BotHandler {
    pub fn new(manager: Arc<AutomationManager>, owner_id: i64) -> Self {
        let forwarder = manager.forwarder();
        Self {
            store: forwarder.store().clone(),
            policy: forwarder.policy().clone(),
            manager,
            owner_id,
        }
    }

    /// Handle one incoming message. `None` when the bot stays silent.
    pub async fn handle(&self, msg: &IncomingMessage) -> Option<Reply> {
        if !msg.is_private {
            return None;
        }
        let cmd = Command::parse(&msg.text)?;
        tracing::debug!("Command from {}: {:?}", msg.sender_id, cmd);

        match self.dispatch(msg, cmd).await {
            Ok(reply) => Some(reply),
            Err(e) => {
                tracing::warn!("Command from {} failed: {}", msg.sender_id, e);
                Some(Reply::Text(format!("❌ {e}")))
            }
        }
    }

    async fn dispatch(&self, msg: &IncomingMessage, cmd: Command<'_>) -> Result<Reply> {
        let user_id = msg.sender_id;
        if cmd.is_operator_only() && user_id != self.owner_id {
            return Ok(Reply::text("⛔ This command is for the operator only."));
        }
        self.store
            .add_account(user_id, msg.sender_username.as_deref())
            .await?;

        match cmd {
            Command::Start => self.start(msg).await,
            Command::Help => Ok(Reply::Text(self.help(user_id))),
            Command::Login { session } => self.login(user_id, session).await,
            Command::Logout => {
                self.manager.end_session(user_id).await?;
                Ok(Reply::text("👋 Logged out. Your session has been removed."))
            }
            Command::Status => self.status(user_id).await,
            Command::SetAd { text } => self.save_ad(user_id, text, msg.media.clone(), true).await,
            Command::AddAd { text } => {
                let tier = self.tier(user_id).await?;
                if tier == Tier::Free {
                    return Err(AdRelayError::PremiumRequired(
                        "multiple ads in rotation need premium; use /setad".into(),
                    ));
                }
                self.save_ad(user_id, text, msg.media.clone(), false).await
            }
            Command::ViewAd => self.view_ad(user_id).await,
            Command::MyAds => self.my_ads(user_id).await,
            Command::ToggleAd { ad_id } => self.toggle_ad(user_id, ad_id).await,
            Command::AddGroup { group_id, name } => {
                self.store.add_destination(user_id, group_id, name).await?;
                Ok(Reply::Text(format!("✅ Added group '{name}' ({group_id})")))
            }
            Command::RemoveGroup { group_id } => {
                if !self.store.remove_destination(user_id, group_id).await? {
                    return Err(AdRelayError::NotFound(format!("group {group_id}")));
                }
                Ok(Reply::Text(format!("🗑️ Group {group_id} removed")))
            }
            Command::ListGroups => self.list_groups(user_id).await,
            Command::GroupStats { group_id } => self.group_stats(user_id, group_id).await,
            Command::Pause { group_id } => self.pause(user_id, group_id, true).await,
            Command::Resume { group_id } => self.pause(user_id, group_id, false).await,
            Command::Priority { group_id, priority } => {
                if self.store.set_priority(user_id, group_id, priority).await? {
                    Ok(Reply::Text(format!("✅ Priority of {group_id} set to {priority}")))
                } else {
                    Err(AdRelayError::NotFound(format!("group {group_id}")))
                }
            }
            Command::StartAds => self.start_ads(user_id).await,
            Command::StopAds => {
                self.manager.stop_automation(user_id).await?;
                Ok(Reply::text("🛑 Automation stopped. Use /start_ads to resume."))
            }
            Command::Delay(secs) => self.delay(user_id, secs).await,
            Command::Analytics { days } => self.analytics(user_id, days).await,
            Command::LogChannel(channel) => {
                self.store.set_log_channel(user_id, channel).await?;
                Ok(match channel {
                    Some(id) => Reply::Text(format!("📝 Send notes will go to {id}")),
                    None => Reply::text("📝 Log channel turned off"),
                })
            }
            Command::Premium { user_id: target, days } => {
                let account = self
                    .store
                    .get_account(target)
                    .await?
                    .ok_or_else(|| AdRelayError::NotFound(format!("user {target}")))?;
                let until = Utc::now()
                    .checked_add_signed(Duration::days(i64::from(days)))
                    .ok_or_else(|| {
                        AdRelayError::InvalidInput(format!("{days} days is out of range"))
                    })?;
                self.store.set_premium(target, true, Some(until)).await?;
                self.store
                    .set_delay(target, self.policy.premium_start_delay(&account))
                    .await?;
                tracing::info!("💎 Premium granted to {} until {}", target, until);
                Ok(Reply::Text(format!(
                    "💎 User {target} is premium until {}",
                    until.format("%Y-%m-%d %H:%M UTC")
                )))
            }
            Command::Revoke { user_id: target } => {
                self.store.set_premium(target, false, None).await?;
                tracing::info!("Premium revoked for {}", target);
                Ok(Reply::Text(format!("User {target} is back on the free tier")))
            }
            Command::Schedule { user_id: target, ad_id, at } => {
                if at <= Utc::now() {
                    return Err(AdRelayError::InvalidInput("that time is in the past".into()));
                }
                if self.store.get_account(target).await?.is_none() {
                    return Err(AdRelayError::NotFound(format!("user {target}")));
                }
                if self.store.get_ad(ad_id).await?.is_none() {
                    return Err(AdRelayError::NotFound(format!("ad #{ad_id}")));
                }
                let id = self.store.create_campaign(target, ad_id, at).await?;
                Ok(Reply::Text(format!(
                    "📅 Campaign #{id} scheduled for {}",
                    at.format("%Y-%m-%d %H:%M UTC")
                )))
            }
            Command::OwnerAd { text } => {
                let id = self
                    .store
                    .save_ad(AdOwner::Operator, new_ad(text, msg.media.clone())?, false)
                    .await?;
                Ok(Reply::Text(format!("✅ Operator ad #{id} saved. Send it with /broadcast {id}")))
            }
            Command::Broadcast { ad_id } => {
                let report =
                    broadcast_operator_ad(self.manager.forwarder(), self.manager.sessions(), ad_id)
                        .await?;
                Ok(Reply::Text(format!(
                    "📢 Broadcast done via {} accounts: {} sent, {} failed",
                    report.accounts, report.sent, report.failed
                )))
            }
            Command::Usage(usage) => Ok(Reply::Text(format!("Usage: {usage}"))),
            Command::Unknown(name) => Ok(Reply::Text(format!(
                "Unknown command /{name}. Send /help for the list."
            ))),
        }
    }

    fn help(&self, user_id: i64) -> String {
        if user_id == self.owner_id {
            format!("{USER_HELP}\n\n{OPERATOR_HELP}")
        } else {
            USER_HELP.to_string()
        }
    }

    async fn tier(&self, user_id: i64) -> Result<Tier> {
        let account = self
            .store
            .get_account(user_id)
            .await?
            .ok_or_else(|| AdRelayError::NotFound(format!("account {user_id}")))?;
        Ok(Tier::of(&account, Utc::now()))
    }

    async fn start(&self, msg: &IncomingMessage) -> Result<Reply> {
        let tier = self.tier(msg.sender_id).await?;
        let name = msg.sender_username.as_deref().unwrap_or("there");
        Ok(Reply::Text(format!(
            "🤖 Welcome, {name}!\n\nPlan: {}\n\n{}",
            tier_label(tier),
            self.help(msg.sender_id)
        )))
    }

    async fn login(&self, user_id: i64, session: &str) -> Result<Reply> {
        self.store.update_session(user_id, session, None).await?;
        if let Err(e) = self.manager.start_session(user_id).await {
            self.store.clear_session(user_id).await?;
            return Err(e);
        }
        let who = match self.manager.session(user_id).await {
            Some(transport) => match transport.get_me().await {
                Ok(me) => me.username.map(|u| format!("@{u}")).unwrap_or(me.first_name),
                Err(_) => "your account".to_string(),
            },
            None => "your account".to_string(),
        };
        Ok(Reply::Text(format!(
            "✅ Logged in as {who}.\n\nNext: /setad, /addgroup, then /start_ads"
        )))
    }

    async fn status(&self, user_id: i64) -> Result<Reply> {
        let account = self
            .store
            .get_account(user_id)
            .await?
            .ok_or_else(|| AdRelayError::NotFound(format!("account {user_id}")))?;
        if !account.has_session() {
            return Ok(Reply::text("❌ Not logged in. Use /login to get started."));
        }
        let now = Utc::now();
        let tier = Tier::of(&account, now);
        let ads = self.store.active_ads(AdOwner::User(user_id)).await?;
        let groups = self.store.list_destinations(user_id).await?;
        let paused = groups.iter().filter(|g| g.paused).count();
        let running = self.manager.is_running(user_id).await;

        let mut text = format!(
            "📊 Your status\n\n\
             Plan: {}\n\
             Ads: {}\n\
             Groups: {} ({} paused)\n\
             Automation: {}\n\
             Delay: {}s",
            tier_label(tier),
            ads.len(),
            groups.len(),
            paused,
            if running { "🟢 running" } else { "🔴 stopped" },
            self.policy.cycle_delay(&account, now).as_secs()
        );
        if let Some(last) = account.last_ad_run {
            text.push_str(&format!("\nLast cycle: {}", last.format("%Y-%m-%d %H:%M UTC")));
        }
        match (tier, account.premium_until) {
            (Tier::Premium, Some(until)) => text.push_str(&format!(
                "\nPremium until {} ({} days left)",
                until.format("%Y-%m-%d"),
                (until - now).num_days()
            )),
            (Tier::Premium, None) => text.push_str("\nPremium without expiry"),
            (Tier::Free, _) => text.push_str(&format!(
                "\nFree plan: fixed {}s delay, branded footer",
                self.policy.free_delay_secs
            )),
        }

        if let Some(transport) = self.manager.session(user_id).await {
            let health = check_session_health(self.store.as_ref(), transport.as_ref(), user_id).await?;
            for issue in &health.issues {
                text.push_str(&format!("\n⚠️ {issue}"));
            }
            for warning in &health.warnings {
                text.push_str(&format!("\n⚠️ {warning}"));
            }
        }
        Ok(Reply::Text(text))
    }

    async fn save_ad(
        &self,
        user_id: i64,
        text: &str,
        media: Option<Media>,
        replace: bool,
    ) -> Result<Reply> {
        let account = self.store.get_account(user_id).await?;
        if !account.is_some_and(|a| a.has_session()) {
            return Ok(Reply::text("❌ Please log in first: /login"));
        }
        let id = self
            .store
            .save_ad(AdOwner::User(user_id), new_ad(text, media)?, replace)
            .await?;
        let action = if replace { "saved" } else { "added to the rotation" };
        Ok(Reply::Text(format!("✅ Ad #{id} {action}. Preview it with /viewad")))
    }

    async fn view_ad(&self, user_id: i64) -> Result<Reply> {
        let Some(ad) = rotation::next_ad(self.store.as_ref(), user_id).await? else {
            return Ok(Reply::text("❌ No ad set. Use /setad to create one."));
        };
        let caption = self.policy.compose(&ad.text, self.tier(user_id).await?);
        Ok(match ad.media {
            Some(media) => Reply::Media { media, caption },
            None => Reply::Text(caption),
        })
    }

    async fn my_ads(&self, user_id: i64) -> Result<Reply> {
        let ads = self.store.active_ads(AdOwner::User(user_id)).await?;
        if ads.is_empty() {
            return Ok(Reply::text("❌ No ads yet. Use /setad to create one."));
        }
        let mut text = String::from("📢 Your ads (newest first)\n");
        for ad in &ads {
            let icon = match &ad.media {
                Some(media) => match media.kind {
                    adrelay_core::types::MediaKind::Photo => "🖼️",
                    adrelay_core::types::MediaKind::Video => "🎬",
                },
                None => "📝",
            };
            let preview: String = ad.text.chars().take(40).collect();
            text.push_str(&format!("\n#{} {} {}", ad.id, icon, preview));
        }
        Ok(Reply::Text(text))
    }

    async fn toggle_ad(&self, user_id: i64, ad_id: i64) -> Result<Reply> {
        let ad = self
            .store
            .get_ad(ad_id)
            .await?
            .filter(|ad| ad.owner == AdOwner::User(user_id))
            .ok_or_else(|| AdRelayError::NotFound(format!("ad #{ad_id}")))?;
        let active = !ad.is_active;
        self.store.set_ad_active(ad_id, active).await?;
        Ok(Reply::Text(if active {
            format!("▶️ Ad #{ad_id} is back in the rotation")
        } else {
            format!("⏸️ Ad #{ad_id} taken out of the rotation")
        }))
    }

    async fn group_stats(&self, user_id: i64, group_id: i64) -> Result<Reply> {
        let group = self
            .store
            .list_destinations(user_id)
            .await?
            .into_iter()
            .find(|g| g.group_id == group_id)
            .ok_or_else(|| AdRelayError::NotFound(format!("group {group_id}")))?;
        let perf = self.store.group_performance(user_id, group_id).await?;
        let mut text = format!(
            "📊 {} ({})\n\nForwards: {}\nSuccessful: {}\nFailed: {}\nSuccess rate: {:.1}%",
            group.group_name,
            group_id,
            perf.total_forwards,
            perf.successful,
            perf.failed,
            perf.success_rate()
        );
        if let (Some(first), Some(last)) = (perf.first_forward, perf.last_forward) {
            text.push_str(&format!(
                "\nFirst: {}\nLast: {}",
                first.format("%Y-%m-%d %H:%M UTC"),
                last.format("%Y-%m-%d %H:%M UTC")
            ));
        }
        Ok(Reply::Text(text))
    }

    async fn list_groups(&self, user_id: i64) -> Result<Reply> {
        let groups = self.store.list_destinations(user_id).await?;
        if groups.is_empty() {
            return Ok(Reply::text("👥 No groups yet. Use /addgroup <id> <name>."));
        }
        let mut text = format!("👥 {} groups, in sending order\n", groups.len());
        for g in &groups {
            let state = if g.paused { " ⏸️" } else { "" };
            text.push_str(&format!(
                "\n• {} ({}) priority {}{}",
                g.group_name, g.group_id, g.priority, state
            ));
        }
        Ok(Reply::Text(text))
    }

    async fn pause(&self, user_id: i64, group_id: i64, paused: bool) -> Result<Reply> {
        if !self.store.set_paused(user_id, group_id, paused).await? {
            return Err(AdRelayError::NotFound(format!("group {group_id}")));
        }
        Ok(Reply::Text(if paused {
            format!("⏸️ Group {group_id} paused")
        } else {
            format!("▶️ Group {group_id} resumed")
        }))
    }

    async fn start_ads(&self, user_id: i64) -> Result<Reply> {
        if self.store.active_ads(AdOwner::User(user_id)).await?.is_empty() {
            return Ok(Reply::text("❌ Set an ad first: /setad <text>"));
        }
        if self.store.forwardable_destinations(user_id).await?.is_empty() {
            return Ok(Reply::text("❌ Add a group first: /addgroup <id> <name>"));
        }
        if self.manager.start_automation(user_id).await? {
            Ok(Reply::text("🚀 Automation started!"))
        } else {
            Ok(Reply::text("ℹ️ Automation is already running."))
        }
    }

    async fn delay(&self, user_id: i64, secs: Option<u64>) -> Result<Reply> {
        let tier = self.tier(user_id).await?;
        let Some(secs) = secs else {
            let account = self.store.get_account(user_id).await?;
            let current = account
                .map(|a| self.policy.cycle_delay(&a, Utc::now()).as_secs())
                .unwrap_or(self.policy.free_delay_secs);
            return Ok(Reply::Text(format!(
                "⏱️ Current delay: {current}s\nPremium range: {}-{}s. Usage: /delay <seconds>",
                self.policy.min_delay_secs, self.policy.max_delay_secs
            )));
        };
        self.policy.validate_delay(tier, secs)?;
        self.store.set_delay(user_id, secs).await?;
        Ok(Reply::Text(format!("✅ Delay set to {secs}s")))
    }

    async fn analytics(&self, user_id: i64, days: u32) -> Result<Reply> {
        let stats = self.store.user_analytics(user_id, days).await?;
        if stats.total_forwards == 0 {
            return Ok(Reply::Text(format!("📈 No forwards in the last {days} days.")));
        }
        let mut text = format!(
            "📈 Last {days} days\n\nForwards: {}\nSuccessful: {}\nFailed: {}\nSuccess rate: {:.1}%",
            stats.total_forwards,
            stats.successful,
            stats.failed,
            stats.success_rate()
        );
        if !stats.top_groups.is_empty() {
            text.push_str("\n\n🏆 Top groups");
            for g in &stats.top_groups {
                text.push_str(&format!("\n• {}: {}/{}", g.name, g.successful, g.forwards));
            }
        }
        if !stats.daily_stats.is_empty() {
            text.push_str("\n\n📅 By day");
            for d in &stats.daily_stats {
                text.push_str(&format!("\n• {}: {}/{}", d.date, d.successful, d.total));
            }
        }
        Ok(Reply::Text(text))
    }
}

fn new_ad(text: &str, media: Option<Media>) -> Result<NewAdvertisement> {
    if text.is_empty() && media.is_none() {
        return Err(AdRelayError::InvalidInput(
            "send the ad text after the command, or a photo/video with it as caption".into(),
        ));
    }
    Ok(NewAdvertisement {
        text: text.to_string(),
        media,
    })
}

fn tier_label(tier: Tier) -> &'static str {
    match tier {
        Tier::Free => "🆓 Free",
        Tier::Premium => "🌟 Premium",
    }
}
