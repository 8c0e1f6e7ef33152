//! Ad rotation: an account with several active ads cycles through them,
//! newest first, one ad per forwarding cycle.

use adrelay_core::error::Result;
use adrelay_core::traits::Store;
use adrelay_core::types::{AdOwner, Advertisement};

/// The ad an account should forward in its next cycle.
pub async fn next_ad(store: &dyn Store, user_id: i64) -> Result<Option<Advertisement>> {
    let ads = store.active_ads(AdOwner::User(user_id)).await?;
    if ads.is_empty() {
        return Ok(None);
    }
    let last = store.last_success_ad(user_id).await?;
    Ok(pick_next(&ads, last).cloned())
}

/// Round-robin over `ads` (newest first), continuing after `last`.
/// Unknown or missing `last` starts again at the newest ad.
pub fn pick_next(ads: &[Advertisement], last: Option<i64>) -> Option<&Advertisement> {
    let position = last.and_then(|id| ads.iter().position(|ad| ad.id == id));
    match position {
        Some(i) => ads.get((i + 1) % ads.len()),
        None => ads.first(),
    }
}
