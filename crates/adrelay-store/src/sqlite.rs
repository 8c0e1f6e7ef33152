//! SQLite-backed store: accounts, ads, destinations, forwarding logs, campaigns.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use adrelay_core::error::{AdRelayError, Result};
use adrelay_core::traits::Store;
use adrelay_core::types::{
    Account, AdOwner, Advertisement, Campaign, CampaignStatus, Destination, ForwardStatus,
    ForwardingRecord, GroupPerformance, Media, MediaKind, NewAdvertisement, NewForwardingRecord,
    UserAnalytics,
};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension, params};

use crate::analytics;

/// SQLite store shared by the bot and every forwarding task.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

/// Shared SELECT column lists; keep row mappers in sync with these.
const ACCOUNT_SELECT: &str = "SELECT user_id, username, session, phone, delay_secs, is_active, is_premium, premium_until, log_channel_id, last_ad_run, created_at FROM accounts";
const AD_SELECT: &str =
    "SELECT id, owner_id, text, media_kind, media_file_id, is_active, created_at FROM ads";
const DESTINATION_SELECT: &str =
    "SELECT user_id, group_id, group_name, priority, paused FROM destinations";
const CAMPAIGN_SELECT: &str =
    "SELECT id, user_id, ad_id, scheduled_at, status, created_at FROM campaigns";

/// Timestamps are stored as fixed-width RFC 3339 UTC so string order is time order.
pub(crate) fn ts(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

pub(crate) fn parse_ts(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|d| d.with_timezone(&Utc))
}

fn db_err(context: &str) -> impl FnOnce(rusqlite::Error) -> AdRelayError + '_ {
    move |e| AdRelayError::Database(format!("{context}: {e}"))
}

fn row_to_account(row: &rusqlite::Row) -> rusqlite::Result<Account> {
    let premium_until: Option<String> = row.get(7)?;
    let last_ad_run: Option<String> = row.get(9)?;
    let created_at: String = row.get(10)?;
    Ok(Account {
        user_id: row.get(0)?,
        username: row.get(1)?,
        session: row.get(2)?,
        phone: row.get(3)?,
        delay_secs: row.get::<_, i64>(4)?.max(0) as u64,
        is_active: row.get::<_, i64>(5)? != 0,
        is_premium: row.get::<_, i64>(6)? != 0,
        premium_until: premium_until.as_deref().and_then(parse_ts),
        log_channel_id: row.get(8)?,
        last_ad_run: last_ad_run.as_deref().and_then(parse_ts),
        created_at: parse_ts(&created_at).unwrap_or_else(Utc::now),
    })
}

fn row_to_ad(row: &rusqlite::Row) -> rusqlite::Result<Advertisement> {
    let owner_id: Option<i64> = row.get(1)?;
    let media_kind: Option<String> = row.get(3)?;
    let media_file_id: Option<String> = row.get(4)?;
    let created_at: String = row.get(6)?;
    let media = match (media_kind.as_deref().and_then(MediaKind::parse), media_file_id) {
        (Some(kind), Some(file_id)) if !file_id.is_empty() => Some(Media { kind, file_id }),
        _ => None,
    };
    Ok(Advertisement {
        id: row.get(0)?,
        owner: owner_id.map(AdOwner::User).unwrap_or(AdOwner::Operator),
        text: row.get(2)?,
        media,
        is_active: row.get::<_, i64>(5)? != 0,
        created_at: parse_ts(&created_at).unwrap_or_else(Utc::now),
    })
}

fn row_to_destination(row: &rusqlite::Row) -> rusqlite::Result<Destination> {
    Ok(Destination {
        user_id: row.get(0)?,
        group_id: row.get(1)?,
        group_name: row.get(2)?,
        priority: row.get(3)?,
        paused: row.get::<_, i64>(4)? != 0,
    })
}

fn row_to_campaign(row: &rusqlite::Row) -> rusqlite::Result<Campaign> {
    let scheduled_at: String = row.get(3)?;
    let status: String = row.get(4)?;
    let created_at: String = row.get(5)?;
    Ok(Campaign {
        id: row.get(0)?,
        user_id: row.get(1)?,
        ad_id: row.get(2)?,
        scheduled_at: parse_ts(&scheduled_at).unwrap_or_else(Utc::now),
        status: CampaignStatus::parse(&status),
        created_at: parse_ts(&created_at).unwrap_or_else(Utc::now),
    })
}

fn row_to_record(row: &rusqlite::Row) -> rusqlite::Result<ForwardingRecord> {
    let status: String = row.get(5)?;
    let timestamp: String = row.get(7)?;
    Ok(ForwardingRecord {
        id: row.get(0)?,
        user_id: row.get(1)?,
        group_id: row.get(2)?,
        group_name: row.get(3)?,
        ad_id: row.get(4)?,
        status: if status == "success" {
            ForwardStatus::Success
        } else {
            ForwardStatus::Failed
        },
        error: row.get(6)?,
        timestamp: parse_ts(&timestamp).unwrap_or_else(Utc::now),
    })
}

impl SqliteStore {
    /// Open or create the database at `path` (`:memory:` works for tests).
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path).map_err(db_err("DB open"))?;

        // WAL lets the bot read while forwarding tasks append logs
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA busy_timeout = 5000;
             PRAGMA foreign_keys = ON;",
        )
        .map_err(db_err("DB pragma"))?;

        let store = Self {
            conn: Mutex::new(conn),
        };
        store.migrate()?;
        tracing::debug!("SQLite store ready at {}", path.display());
        Ok(store)
    }

    /// Run schema migrations.
    fn migrate(&self) -> Result<()> {
        let conn = self.conn()?;
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS accounts (
                user_id INTEGER PRIMARY KEY,
                username TEXT,
                session TEXT,
                phone TEXT,
                delay_secs INTEGER NOT NULL DEFAULT 300,
                is_active INTEGER NOT NULL DEFAULT 0,
                is_premium INTEGER NOT NULL DEFAULT 0,
                premium_until TEXT,
                log_channel_id INTEGER,
                last_ad_run TEXT,
                created_at TEXT NOT NULL
            );

            -- owner_id NULL marks an operator ad
            CREATE TABLE IF NOT EXISTS ads (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                owner_id INTEGER REFERENCES accounts(user_id) ON DELETE CASCADE,
                text TEXT NOT NULL DEFAULT '',
                media_kind TEXT,
                media_file_id TEXT,
                is_active INTEGER NOT NULL DEFAULT 1,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS destinations (
                user_id INTEGER NOT NULL REFERENCES accounts(user_id) ON DELETE CASCADE,
                group_id INTEGER NOT NULL,
                group_name TEXT NOT NULL,
                priority INTEGER NOT NULL DEFAULT 0,
                paused INTEGER NOT NULL DEFAULT 0,
                added_at TEXT NOT NULL,
                PRIMARY KEY (user_id, group_id)
            );

            CREATE TABLE IF NOT EXISTS forwarding_logs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                group_id INTEGER NOT NULL,
                group_name TEXT NOT NULL,
                ad_id INTEGER,
                status TEXT NOT NULL,            -- success, failed
                error TEXT,
                timestamp TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_forwarding_logs_user_ts
                ON forwarding_logs (user_id, timestamp);

            CREATE TABLE IF NOT EXISTS campaigns (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL REFERENCES accounts(user_id) ON DELETE CASCADE,
                ad_id INTEGER NOT NULL,
                scheduled_at TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending',  -- pending, completed, failed
                created_at TEXT NOT NULL
            );
            ",
        )
        .map_err(db_err("Migration"))?;
        Ok(())
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| AdRelayError::Database(format!("Store lock poisoned: {e}")))
    }

    fn update_account(&self, sql: &str, params: impl rusqlite::Params) -> Result<()> {
        let changed = self
            .conn()?
            .execute(sql, params)
            .map_err(db_err("Update account"))?;
        if changed == 0 {
            return Err(AdRelayError::NotFound("account".into()));
        }
        Ok(())
    }

    fn query_destinations(&self, user_id: i64, only_forwardable: bool) -> Result<Vec<Destination>> {
        let conn = self.conn()?;
        let filter = if only_forwardable { "AND paused = 0" } else { "" };
        let mut stmt = conn
            .prepare(&format!(
                "{DESTINATION_SELECT} WHERE user_id = ?1 {filter} ORDER BY priority DESC, group_name ASC"
            ))
            .map_err(db_err("Prepare"))?;
        let rows = stmt
            .query_map(params![user_id], row_to_destination)
            .map_err(db_err("Query destinations"))?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }

    fn update_destination(&self, sql: &str, params: impl rusqlite::Params) -> Result<bool> {
        let changed = self
            .conn()?
            .execute(sql, params)
            .map_err(db_err("Update destination"))?;
        Ok(changed > 0)
    }
}

#[async_trait]
impl Store for SqliteStore {
    // ── Accounts ─────────────────────────────────────

    async fn add_account(&self, user_id: i64, username: Option<&str>) -> Result<()> {
        self.conn()?
            .execute(
                "INSERT INTO accounts (user_id, username, created_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(user_id) DO UPDATE SET username = COALESCE(excluded.username, username)",
                params![user_id, username, ts(Utc::now())],
            )
            .map_err(db_err("Add account"))?;
        Ok(())
    }

    async fn get_account(&self, user_id: i64) -> Result<Option<Account>> {
        self.conn()?
            .query_row(
                &format!("{ACCOUNT_SELECT} WHERE user_id = ?1"),
                params![user_id],
                row_to_account,
            )
            .optional()
            .map_err(db_err("Get account"))
    }

    async fn list_active_accounts(&self) -> Result<Vec<Account>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&format!(
                "{ACCOUNT_SELECT} WHERE is_active = 1 AND session IS NOT NULL AND session != '' ORDER BY user_id"
            ))
            .map_err(db_err("Prepare"))?;
        let rows = stmt
            .query_map([], row_to_account)
            .map_err(db_err("Query active accounts"))?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }

    async fn update_session(&self, user_id: i64, session: &str, phone: Option<&str>) -> Result<()> {
        self.update_account(
            "UPDATE accounts SET session = ?1, phone = COALESCE(?2, phone) WHERE user_id = ?3",
            params![session, phone, user_id],
        )
    }

    async fn clear_session(&self, user_id: i64) -> Result<()> {
        self.update_account(
            "UPDATE accounts SET session = NULL, is_active = 0 WHERE user_id = ?1",
            params![user_id],
        )
    }

    async fn set_active(&self, user_id: i64, active: bool) -> Result<()> {
        self.update_account(
            "UPDATE accounts SET is_active = ?1 WHERE user_id = ?2",
            params![active as i64, user_id],
        )
    }

    async fn set_delay(&self, user_id: i64, delay_secs: u64) -> Result<()> {
        self.update_account(
            "UPDATE accounts SET delay_secs = ?1 WHERE user_id = ?2",
            params![delay_secs as i64, user_id],
        )
    }

    async fn set_premium(
        &self,
        user_id: i64,
        premium: bool,
        until: Option<DateTime<Utc>>,
    ) -> Result<()> {
        self.update_account(
            "UPDATE accounts SET is_premium = ?1, premium_until = ?2 WHERE user_id = ?3",
            params![premium as i64, until.map(ts), user_id],
        )
    }

    async fn set_log_channel(&self, user_id: i64, channel_id: Option<i64>) -> Result<()> {
        self.update_account(
            "UPDATE accounts SET log_channel_id = ?1 WHERE user_id = ?2",
            params![channel_id, user_id],
        )
    }

    async fn touch_last_run(&self, user_id: i64, at: DateTime<Utc>) -> Result<()> {
        self.update_account(
            "UPDATE accounts SET last_ad_run = ?1 WHERE user_id = ?2",
            params![ts(at), user_id],
        )
    }

    // ── Advertisements ───────────────────────────────

    async fn save_ad(&self, owner: AdOwner, ad: NewAdvertisement, replace: bool) -> Result<i64> {
        if ad.text.trim().is_empty() && ad.media.is_none() {
            return Err(AdRelayError::InvalidInput(
                "an ad needs text or media".into(),
            ));
        }
        let owner_id = match owner {
            AdOwner::User(id) => Some(id),
            AdOwner::Operator => None,
        };
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(db_err("Begin"))?;
        if replace {
            tx.execute(
                "UPDATE ads SET is_active = 0 WHERE owner_id IS ?1",
                params![owner_id],
            )
            .map_err(db_err("Deactivate ads"))?;
        }
        tx.execute(
            "INSERT INTO ads (owner_id, text, media_kind, media_file_id, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                owner_id,
                ad.text,
                ad.media.as_ref().map(|m| m.kind.as_str()),
                ad.media.as_ref().map(|m| m.file_id.as_str()),
                ts(Utc::now()),
            ],
        )
        .map_err(db_err("Insert ad"))?;
        let id = tx.last_insert_rowid();
        tx.commit().map_err(db_err("Commit"))?;
        Ok(id)
    }

    async fn get_ad(&self, id: i64) -> Result<Option<Advertisement>> {
        self.conn()?
            .query_row(&format!("{AD_SELECT} WHERE id = ?1"), params![id], row_to_ad)
            .optional()
            .map_err(db_err("Get ad"))
    }

    async fn active_ads(&self, owner: AdOwner) -> Result<Vec<Advertisement>> {
        let owner_id = match owner {
            AdOwner::User(id) => Some(id),
            AdOwner::Operator => None,
        };
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&format!(
                "{AD_SELECT} WHERE owner_id IS ?1 AND is_active = 1 ORDER BY created_at DESC, id DESC"
            ))
            .map_err(db_err("Prepare"))?;
        let rows = stmt
            .query_map(params![owner_id], row_to_ad)
            .map_err(db_err("Query ads"))?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }

    async fn set_ad_active(&self, id: i64, active: bool) -> Result<()> {
        let changed = self
            .conn()?
            .execute(
                "UPDATE ads SET is_active = ?1 WHERE id = ?2",
                params![active as i64, id],
            )
            .map_err(db_err("Update ad"))?;
        if changed == 0 {
            return Err(AdRelayError::NotFound(format!("ad {id}")));
        }
        Ok(())
    }

    // ── Destinations ─────────────────────────────────

    async fn add_destination(&self, user_id: i64, group_id: i64, group_name: &str) -> Result<()> {
        self.conn()?
            .execute(
                "INSERT INTO destinations (user_id, group_id, group_name, added_at) VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(user_id, group_id) DO UPDATE SET group_name = excluded.group_name",
                params![user_id, group_id, group_name, ts(Utc::now())],
            )
            .map_err(db_err("Add destination"))?;
        Ok(())
    }

    async fn remove_destination(&self, user_id: i64, group_id: i64) -> Result<bool> {
        self.update_destination(
            "DELETE FROM destinations WHERE user_id = ?1 AND group_id = ?2",
            params![user_id, group_id],
        )
    }

    async fn list_destinations(&self, user_id: i64) -> Result<Vec<Destination>> {
        self.query_destinations(user_id, false)
    }

    async fn forwardable_destinations(&self, user_id: i64) -> Result<Vec<Destination>> {
        self.query_destinations(user_id, true)
    }

    async fn set_paused(&self, user_id: i64, group_id: i64, paused: bool) -> Result<bool> {
        self.update_destination(
            "UPDATE destinations SET paused = ?1 WHERE user_id = ?2 AND group_id = ?3",
            params![paused as i64, user_id, group_id],
        )
    }

    async fn set_priority(&self, user_id: i64, group_id: i64, priority: i32) -> Result<bool> {
        self.update_destination(
            "UPDATE destinations SET priority = ?1 WHERE user_id = ?2 AND group_id = ?3",
            params![priority, user_id, group_id],
        )
    }

    // ── Forwarding records ───────────────────────────

    async fn add_record(&self, record: NewForwardingRecord) -> Result<i64> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO forwarding_logs (user_id, group_id, group_name, ad_id, status, error, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                record.user_id,
                record.group_id,
                record.group_name,
                record.ad_id,
                record.status.as_str(),
                record.error,
                ts(Utc::now()),
            ],
        )
        .map_err(db_err("Add forwarding log"))?;
        Ok(conn.last_insert_rowid())
    }

    async fn recent_records(&self, user_id: i64, limit: usize) -> Result<Vec<ForwardingRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT id, user_id, group_id, group_name, ad_id, status, error, timestamp
                 FROM forwarding_logs WHERE user_id = ?1 ORDER BY id DESC LIMIT ?2",
            )
            .map_err(db_err("Prepare"))?;
        let rows = stmt
            .query_map(params![user_id, limit as i64], row_to_record)
            .map_err(db_err("Query forwarding logs"))?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }

    async fn last_success_ad(&self, user_id: i64) -> Result<Option<i64>> {
        let ad_id: Option<Option<i64>> = self
            .conn()?
            .query_row(
                "SELECT ad_id FROM forwarding_logs WHERE user_id = ?1 AND status = 'success'
                 ORDER BY id DESC LIMIT 1",
                params![user_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(db_err("Last success ad"))?;
        Ok(ad_id.flatten())
    }

    async fn user_analytics(&self, user_id: i64, days: u32) -> Result<UserAnalytics> {
        let since = Utc::now()
            .checked_sub_signed(chrono::Duration::days(i64::from(days)))
            .ok_or_else(|| AdRelayError::InvalidInput(format!("{days} days is out of range")))?;
        let conn = self.conn()?;
        analytics::user_analytics(&conn, user_id, since)
    }

    async fn group_performance(&self, user_id: i64, group_id: i64) -> Result<GroupPerformance> {
        let conn = self.conn()?;
        analytics::group_performance(&conn, user_id, group_id)
    }

    // ── Campaigns ────────────────────────────────────

    async fn create_campaign(&self, user_id: i64, ad_id: i64, at: DateTime<Utc>) -> Result<i64> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO campaigns (user_id, ad_id, scheduled_at, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![user_id, ad_id, ts(at), ts(Utc::now())],
        )
        .map_err(db_err("Create campaign"))?;
        Ok(conn.last_insert_rowid())
    }

    async fn due_campaigns(&self, now: DateTime<Utc>) -> Result<Vec<Campaign>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&format!(
                "{CAMPAIGN_SELECT} WHERE status = 'pending' AND scheduled_at <= ?1 ORDER BY scheduled_at, id"
            ))
            .map_err(db_err("Prepare"))?;
        let rows = stmt
            .query_map(params![ts(now)], row_to_campaign)
            .map_err(db_err("Query campaigns"))?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }

    async fn set_campaign_status(&self, id: i64, status: CampaignStatus) -> Result<()> {
        self.conn()?
            .execute(
                "UPDATE campaigns SET status = ?1 WHERE id = ?2",
                params![status.as_str(), id],
            )
            .map_err(db_err("Update campaign"))?;
        Ok(())
    }

    async fn list_campaigns(&self, user_id: i64) -> Result<Vec<Campaign>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&format!(
                "{CAMPAIGN_SELECT} WHERE user_id = ?1 ORDER BY scheduled_at DESC"
            ))
            .map_err(db_err("Prepare"))?;
        let rows = stmt
            .query_map(params![user_id], row_to_campaign)
            .map_err(db_err("Query campaigns"))?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }
}
