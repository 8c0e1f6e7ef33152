//! Automation manager: owns the live sessions and one loop task per account.

use std::collections::HashMap;
use std::sync::Arc;

use adrelay_core::error::{AdRelayError, Result};
use adrelay_core::traits::{Store, Transport, TransportFactory};
use adrelay_core::types::Account;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::forwarder::{Forwarder, run_account_loop};
use crate::sessions::SessionRegistry;

pub struct AutomationManager {
    store: Arc<dyn Store>,
    factory: Arc<dyn TransportFactory>,
    forwarder: Arc<Forwarder>,
    sessions: SessionRegistry,
    tasks: Mutex<HashMap<i64, JoinHandle<()>>>,
}

impl AutomationManager {
    pub fn new(factory: Arc<dyn TransportFactory>, forwarder: Arc<Forwarder>) -> Self {
        Self {
            store: forwarder.store().clone(),
            factory,
            forwarder,
            sessions: SessionRegistry::new(),
            tasks: Mutex::new(HashMap::new()),
        }
    }

    pub fn forwarder(&self) -> &Arc<Forwarder> {
        &self.forwarder
    }

    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    pub async fn session(&self, user_id: i64) -> Option<Arc<dyn Transport>> {
        self.sessions.get(user_id).await
    }

    /// Connect the stored credential, register the session and resume
    /// automation when the account is active.
    pub async fn start_session(&self, user_id: i64) -> Result<()> {
        if self.connect(user_id).await?.is_active {
            self.spawn_loop(user_id).await;
        }
        Ok(())
    }

    /// Reconnect every active account on boot. Returns how many connected.
    pub async fn start_all(&self) -> Result<usize> {
        let accounts = self.store.list_active_accounts().await?;
        let mut connected = 0;
        for account in &accounts {
            match self.start_session(account.user_id).await {
                Ok(()) => connected += 1,
                Err(e) => {
                    tracing::warn!("⚠️ Could not restore session for user {}: {}", account.user_id, e)
                }
            }
        }
        tracing::info!(
            "✅ Restored {}/{} sessions, {} loops running",
            connected,
            accounts.len(),
            self.running_count().await
        );
        Ok(connected)
    }

    /// Mark the account active and make sure its loop runs.
    /// Returns `false` if it was already running.
    pub async fn start_automation(&self, user_id: i64) -> Result<bool> {
        // Inactive accounts are not reconnected on boot.
        if !self.sessions.contains(user_id).await {
            self.connect(user_id).await?;
        }
        self.store.set_active(user_id, true).await?;
        if self.is_running(user_id).await {
            return Ok(false);
        }
        self.spawn_loop(user_id).await;
        Ok(true)
    }

    /// Mark the account inactive and cancel its loop.
    /// Returns whether a loop was running.
    pub async fn stop_automation(&self, user_id: i64) -> Result<bool> {
        self.store.set_active(user_id, false).await?;
        let was_running = self.abort_task(user_id).await;
        if was_running {
            tracing::info!("⏹️ Automation stopped for user {}", user_id);
        }
        Ok(was_running)
    }

    /// Stop automation, drop the live session and forget the credential.
    pub async fn end_session(&self, user_id: i64) -> Result<()> {
        self.abort_task(user_id).await;
        self.sessions.remove(user_id).await;
        self.store.clear_session(user_id).await?;
        self.store.set_active(user_id, false).await?;
        tracing::info!("👋 Session ended for user {}", user_id);
        Ok(())
    }

    pub async fn is_running(&self, user_id: i64) -> bool {
        self.tasks
            .lock()
            .await
            .get(&user_id)
            .is_some_and(|h| !h.is_finished())
    }

    pub async fn running_count(&self) -> usize {
        let mut tasks = self.tasks.lock().await;
        tasks.retain(|_, h| !h.is_finished());
        tasks.len()
    }

    /// Abort every loop; sessions stay registered.
    pub async fn shutdown(&self) {
        let mut tasks = self.tasks.lock().await;
        for (_, handle) in tasks.drain() {
            handle.abort();
        }
        tracing::info!("🛑 All forwarding loops stopped");
    }

    async fn connect(&self, user_id: i64) -> Result<Account> {
        let account = self
            .store
            .get_account(user_id)
            .await?
            .ok_or_else(|| AdRelayError::NotFound(format!("account {user_id}")))?;
        if !account.has_session() {
            return Err(AdRelayError::NoSession(user_id));
        }

        // A new credential replaces any previous session and its loop.
        self.abort_task(user_id).await;
        let transport = self.factory.connect(&account).await?;
        tracing::info!("🔌 Session connected for user {} via {}", user_id, transport.name());
        self.sessions.insert(user_id, transport).await;
        Ok(account)
    }

    async fn spawn_loop(&self, user_id: i64) {
        let mut tasks = self.tasks.lock().await;
        if tasks.get(&user_id).is_some_and(|h| !h.is_finished()) {
            return;
        }
        let handle = tokio::spawn(run_account_loop(
            user_id,
            self.forwarder.clone(),
            self.sessions.clone(),
        ));
        tasks.insert(user_id, handle);
    }

    async fn abort_task(&self, user_id: i64) -> bool {
        match self.tasks.lock().await.remove(&user_id) {
            Some(handle) => {
                let live = !handle.is_finished();
                handle.abort();
                live
            }
            None => false,
        }
    }
}
