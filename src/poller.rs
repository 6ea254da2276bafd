use chrono::Utc;
use orderdesk_backend::{BackendError, DynBackend, OrderScope};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, MutexGuard, watch};
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, error, info};

use crate::alert::DynAlerter;
use crate::preferences::Preferences;
use crate::store::SharedOrderStore;

/// Whether a refresh that moved the pending count from `previous` to
/// `current` should alert the operator. The very first load never alerts.
pub const fn should_alert(
    loaded_before: bool,
    previous: usize,
    current: usize,
    sound_enabled: bool,
) -> bool {
    loaded_before && current > previous && sound_enabled
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    Refreshed {
        total: usize,
        pending: usize,
        alerted: bool,
    },
    /// Another refresh was already running.
    Skipped,
}

/// Fetches the authoritative order list into the store, one fetch at a time.
#[derive(Debug)]
pub struct OrderRefresher {
    backend: DynBackend,
    scope: OrderScope,
    store: SharedOrderStore,
    preferences: Arc<Preferences>,
    alerter: DynAlerter,
    in_flight: Mutex<()>,
}

impl OrderRefresher {
    pub fn new(
        backend: DynBackend,
        scope: OrderScope,
        store: SharedOrderStore,
        preferences: Arc<Preferences>,
        alerter: DynAlerter,
    ) -> Self {
        Self {
            backend,
            scope,
            store,
            preferences,
            alerter,
            in_flight: Mutex::new(()),
        }
    }

    /// Keeps every refresh out until the guard is dropped. Held by writers
    /// so a fetch never lands between a tentative patch and its commit.
    pub async fn pause(&self) -> MutexGuard<'_, ()> {
        self.in_flight.lock().await
    }

    /// Timer path: does nothing while another refresh is running.
    pub async fn refresh_if_idle(&self) -> Result<RefreshOutcome, BackendError> {
        let Ok(_guard) = self.in_flight.try_lock() else {
            debug!("Refresh already in flight, skipping tick");
            return Ok(RefreshOutcome::Skipped);
        };

        self.refresh_locked().await
    }

    /// Waits for a running refresh to finish, then fetches again so the
    /// result reflects every write that completed before this call.
    pub async fn refresh_now(&self) -> Result<RefreshOutcome, BackendError> {
        let _guard = self.in_flight.lock().await;
        self.refresh_locked().await
    }

    async fn refresh_locked(&self) -> Result<RefreshOutcome, BackendError> {
        let (previous_pending, loaded_before) = {
            let store = self.store.read().await;
            (store.pending_count(), store.has_loaded())
        };

        let orders = self.backend.fetch_orders(&self.scope).await?;

        let total = orders.len();
        let pending = orders.iter().filter(|order| order.is_pending()).count();
        let alerted = should_alert(
            loaded_before,
            previous_pending,
            pending,
            self.preferences.sound_enabled(),
        );

        self.store.write().await.replace_all(orders, Utc::now());
        debug!("Refreshed {total} orders for {}, {pending} pending", self.scope);

        if alerted {
            self.alerter.new_pending_orders(previous_pending, pending);
        }

        Ok(RefreshOutcome::Refreshed {
            total,
            pending,
            alerted,
        })
    }
}

#[derive(Debug, Clone)]
pub struct PollerConfig {
    pub interval: Duration,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
        }
    }
}

pub struct OrderPoller {
    refresher: Arc<OrderRefresher>,
    config: PollerConfig,
    shutdown_rx: watch::Receiver<bool>,
}

impl OrderPoller {
    pub const fn new(
        refresher: Arc<OrderRefresher>,
        config: PollerConfig,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Self {
        Self {
            refresher,
            config,
            shutdown_rx,
        }
    }

    pub fn spawn(refresher: Arc<OrderRefresher>, config: PollerConfig) -> PollerHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(Self::new(refresher, config, shutdown_rx).run());
        PollerHandle { shutdown_tx, task }
    }

    pub async fn run(mut self) {
        info!(
            "Starting order poller with interval: {:?}",
            self.config.interval
        );

        let mut ticker = interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    tokio::select! {
                        result = self.refresher.refresh_if_idle() => {
                            if let Err(e) = result {
                                error!("Order refresh failed: {e}");
                            }
                        }
                        _ = self.shutdown_rx.changed() => {
                            info!("Received shutdown signal during refresh, stopping order poller");
                            break;
                        }
                    }
                }
                changed = self.shutdown_rx.changed() => {
                    if changed.is_err() || *self.shutdown_rx.borrow() {
                        info!("Received shutdown signal, stopping order poller");
                        break;
                    }
                }
            }
        }
    }
}

pub struct PollerHandle {
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl PollerHandle {
    pub async fn shutdown(self) {
        if self.shutdown_tx.send(true).is_err() {
            debug!("Order poller already stopped");
        }
        if let Err(e) = self.task.await {
            error!("Order poller task panicked: {e}");
        }
    }
}
