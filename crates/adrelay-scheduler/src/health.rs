//! Session health check.

use adrelay_core::error::Result;
use adrelay_core::traits::{Store, Transport};
use serde::Serialize;

/// Forwards in the last day above which a low success rate is flagged.
const BUSY_THRESHOLD: u64 = 10;
const MIN_SUCCESS_RATE: f64 = 50.0;

#[derive(Debug, Clone, Default, Serialize)]
pub struct HealthReport {
    pub is_healthy: bool,
    pub issues: Vec<String>,
    pub warnings: Vec<String>,
}

pub async fn check_session_health(
    store: &dyn Store,
    transport: &dyn Transport,
    user_id: i64,
) -> Result<HealthReport> {
    let mut report = HealthReport {
        is_healthy: true,
        ..Default::default()
    };

    if let Err(e) = transport.get_me().await {
        report.is_healthy = false;
        report.issues.push(format!("Session unauthorized: {e}"));
    }
    if !transport.is_connected() {
        report.is_healthy = false;
        report.issues.push("Session disconnected".into());
    }

    let last_day = store.user_analytics(user_id, 1).await?;
    if last_day.total_forwards > BUSY_THRESHOLD {
        let rate = last_day.success_rate();
        if rate < MIN_SUCCESS_RATE {
            report
                .warnings
                .push(format!("Low success rate in the last 24h: {rate:.1}%"));
        }
    }

    Ok(report)
}
