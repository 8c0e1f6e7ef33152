//! # AdRelay Scheduler
//!
//! One lightweight tokio task per logged-in account, each independent:
//!
//! ```text
//! AutomationManager
//!   ├── sessions: user_id → Transport
//!   └── tasks:    user_id → account loop
//!         loop {
//!           reload account (stop if inactive / no session)
//!           pick ad (rotation) + forwardable destinations
//!           for each destination: forward → gap sleep | record failure
//!           sleep cycle delay (tier policy)
//!         }
//!
//! CampaignRunner  (interval tick) → one forwarding pass per due campaign
//! broadcast       operator ad → every free-tier account's destinations
//! ```

pub mod broadcast;
pub mod campaigns;
pub mod forwarder;
pub mod health;
pub mod manager;
pub mod rotation;
pub mod sessions;

#[cfg(test)]
pub(crate) mod testing;

pub use broadcast::{BroadcastReport, broadcast_operator_ad};
pub use campaigns::{CampaignRunner, spawn_campaign_runner};
pub use forwarder::{CycleOutcome, Forwarder, PassReport, run_account_loop};
pub use health::{HealthReport, check_session_health};
pub use manager::AutomationManager;
pub use sessions::SessionRegistry;
