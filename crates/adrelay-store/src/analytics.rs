//! Aggregate queries over `forwarding_logs`.

use adrelay_core::error::{AdRelayError, Result};
use adrelay_core::types::{DailyStats, GroupPerformance, GroupStats, UserAnalytics};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, params};

use crate::sqlite::{parse_ts, ts};

const SUCCESS_SUM: &str = "COALESCE(SUM(CASE WHEN status = 'success' THEN 1 ELSE 0 END), 0)";
const FAILED_SUM: &str = "COALESCE(SUM(CASE WHEN status = 'failed' THEN 1 ELSE 0 END), 0)";
const TOP_GROUPS: i64 = 5;

fn query_err(e: rusqlite::Error) -> AdRelayError {
    AdRelayError::Database(format!("Analytics query: {e}"))
}

pub(crate) fn user_analytics(
    conn: &Connection,
    user_id: i64,
    since: DateTime<Utc>,
) -> Result<UserAnalytics> {
    let since = ts(since);

    let (total, successful, failed): (i64, i64, i64) = conn
        .query_row(
            &format!(
                "SELECT COUNT(*), {SUCCESS_SUM}, {FAILED_SUM} FROM forwarding_logs
                 WHERE user_id = ?1 AND timestamp >= ?2"
            ),
            params![user_id, since],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )
        .map_err(query_err)?;

    let mut stmt = conn
        .prepare(&format!(
            "SELECT group_id, MAX(group_name), COUNT(*) AS forwards, {SUCCESS_SUM} AS successful
             FROM forwarding_logs WHERE user_id = ?1 AND timestamp >= ?2
             GROUP BY group_id ORDER BY successful DESC, forwards DESC LIMIT ?3"
        ))
        .map_err(query_err)?;
    let top_groups = stmt
        .query_map(params![user_id, since, TOP_GROUPS], |row| {
            Ok(GroupStats {
                group_id: row.get(0)?,
                name: row.get(1)?,
                forwards: row.get::<_, i64>(2)? as u64,
                successful: row.get::<_, i64>(3)? as u64,
            })
        })
        .map_err(query_err)?
        .filter_map(|r| r.ok())
        .collect();

    let mut stmt = conn
        .prepare(&format!(
            "SELECT substr(timestamp, 1, 10) AS day, COUNT(*), {SUCCESS_SUM}
             FROM forwarding_logs WHERE user_id = ?1 AND timestamp >= ?2
             GROUP BY day ORDER BY day DESC"
        ))
        .map_err(query_err)?;
    let daily_stats = stmt
        .query_map(params![user_id, since], |row| {
            Ok(DailyStats {
                date: row.get(0)?,
                total: row.get::<_, i64>(1)? as u64,
                successful: row.get::<_, i64>(2)? as u64,
            })
        })
        .map_err(query_err)?
        .filter_map(|r| r.ok())
        .collect();

    Ok(UserAnalytics {
        total_forwards: total as u64,
        successful: successful as u64,
        failed: failed as u64,
        top_groups,
        daily_stats,
    })
}

pub(crate) fn group_performance(
    conn: &Connection,
    user_id: i64,
    group_id: i64,
) -> Result<GroupPerformance> {
    conn.query_row(
        &format!(
            "SELECT COUNT(*), {SUCCESS_SUM}, {FAILED_SUM}, MIN(timestamp), MAX(timestamp)
             FROM forwarding_logs WHERE user_id = ?1 AND group_id = ?2"
        ),
        params![user_id, group_id],
        |row| {
            let first: Option<String> = row.get(3)?;
            let last: Option<String> = row.get(4)?;
            Ok(GroupPerformance {
                total_forwards: row.get::<_, i64>(0)? as u64,
                successful: row.get::<_, i64>(1)? as u64,
                failed: row.get::<_, i64>(2)? as u64,
                first_forward: first.as_deref().and_then(parse_ts),
                last_forward: last.as_deref().and_then(parse_ts),
            })
        },
    )
    .map_err(query_err)
}

#[cfg(test)]
mod tests {
    use crate::SqliteStore;
    use adrelay_core::error::AdRelayError;
    use adrelay_core::traits::Store;
    use adrelay_core::types::{Destination, NewForwardingRecord};
    use std::path::PathBuf;

    fn dest(group_id: i64, name: &str) -> Destination {
        Destination {
            user_id: 1,
            group_id,
            group_name: name.into(),
            priority: 0,
            paused: false,
        }
    }

    #[tokio::test]
    async fn test_user_analytics_counts_and_top_groups() {
        let store = SqliteStore::open(&PathBuf::from(":memory:")).unwrap();
        let a = dest(-1, "Alpha");
        let b = dest(-2, "Beta");
        for _ in 0..3 {
            store.add_record(NewForwardingRecord::success(1, &a, 1)).await.unwrap();
        }
        store.add_record(NewForwardingRecord::success(1, &b, 1)).await.unwrap();
        store.add_record(NewForwardingRecord::failed(1, &b, 1, "boom")).await.unwrap();
        // Another account's logs stay out
        store.add_record(NewForwardingRecord::success(2, &a, 1)).await.unwrap();

        let stats = store.user_analytics(1, 7).await.unwrap();
        assert_eq!(stats.total_forwards, 5);
        assert_eq!(stats.successful, 4);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.success_rate(), 80.0);
        assert_eq!(stats.top_groups[0].name, "Alpha");
        assert_eq!(stats.top_groups[0].successful, 3);
        assert_eq!(stats.top_groups[1].forwards, 2);
        assert_eq!(stats.daily_stats.iter().map(|d| d.total).sum::<u64>(), 5);
    }

    #[tokio::test]
    async fn test_empty_analytics() {
        let store = SqliteStore::open(&PathBuf::from(":memory:")).unwrap();
        let stats = store.user_analytics(1, 1).await.unwrap();
        assert_eq!(stats.total_forwards, 0);
        assert!(stats.top_groups.is_empty());

        let perf = store.group_performance(1, -1).await.unwrap();
        assert_eq!(perf.total_forwards, 0);
        assert!(perf.first_forward.is_none());
    }

    #[tokio::test]
    async fn test_window_beyond_calendar_is_rejected() {
        let store = SqliteStore::open(&PathBuf::from(":memory:")).unwrap();
        let err = store.user_analytics(1, u32::MAX).await.unwrap_err();
        assert!(matches!(err, AdRelayError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_group_performance() {
        let store = SqliteStore::open(&PathBuf::from(":memory:")).unwrap();
        let a = dest(-1, "Alpha");
        store.add_record(NewForwardingRecord::success(1, &a, 1)).await.unwrap();
        store.add_record(NewForwardingRecord::failed(1, &a, 1, "x")).await.unwrap();

        let perf = store.group_performance(1, -1).await.unwrap();
        assert_eq!(perf.total_forwards, 2);
        assert_eq!(perf.success_rate(), 50.0);
        assert!(perf.first_forward.is_some());
        assert!(perf.first_forward <= perf.last_forward);
    }
}
