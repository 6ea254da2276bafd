use backon::{ConstantBuilder, Retryable};
use chrono::Utc;
use chrono_tz::Tz;
use orderdesk_backend::{BackendError, DynBackend, Order, OrderScope};
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::alert::DynAlerter;
use crate::env::Env;
use crate::filter::OrderFilter;
use crate::lifecycle::OrderLifecycle;
use crate::poller::OrderRefresher;
use crate::preferences::Preferences;
use crate::stats::DashboardStats;
use crate::store::{OrderStore, SharedOrderStore};

const SCOPE_RETRY_DELAY: Duration = Duration::from_secs(5);
const SCOPE_RETRY_TIMES: usize = 5;

/// Everything an operator surface needs, wired together.
#[derive(Debug, Clone)]
pub struct Dashboard {
    pub store: SharedOrderStore,
    pub refresher: Arc<OrderRefresher>,
    pub lifecycle: OrderLifecycle,
    pub preferences: Arc<Preferences>,
    pub pool: SqlitePool,
    pub timezone: Tz,
}

impl Dashboard {
    /// Opens the local database, resolves the viewer's scope and wires the
    /// order desk. Does not fetch orders.
    pub async fn connect(env: &Env, alerter: DynAlerter) -> anyhow::Result<Self> {
        let pool = env.get_sqlite_pool().await?;
        sqlx::migrate!().run(&pool).await?;

        let preferences = Arc::new(Preferences::load(&pool).await?);
        let backend = env.get_backend()?;
        let role = env.viewer_role()?;
        let timezone = env.timezone()?;

        info!("Resolving order scope for {role} via {}", backend.name());
        let scope = (|| backend.resolve_scope(&role))
            .retry(
                ConstantBuilder::default()
                    .with_delay(SCOPE_RETRY_DELAY)
                    .with_max_times(SCOPE_RETRY_TIMES),
            )
            .when(BackendError::is_transient)
            .notify(|err, delay| {
                warn!("Scope resolution failed: {err}. Retrying in {delay:?}");
            })
            .await?;
        info!("Showing orders for {scope}");

        Ok(Self::from_parts(
            backend,
            scope,
            pool,
            preferences,
            alerter,
            timezone,
        ))
    }

    pub fn from_parts(
        backend: DynBackend,
        scope: OrderScope,
        pool: SqlitePool,
        preferences: Arc<Preferences>,
        alerter: DynAlerter,
        timezone: Tz,
    ) -> Self {
        let store = OrderStore::shared();
        let refresher = Arc::new(OrderRefresher::new(
            backend.clone(),
            scope,
            store.clone(),
            preferences.clone(),
            alerter,
        ));
        let lifecycle = OrderLifecycle::new(backend, store.clone(), refresher.clone(), pool.clone());

        Self {
            store,
            refresher,
            lifecycle,
            preferences,
            pool,
            timezone,
        }
    }

    /// Current orders passing `filter`, in store order.
    pub async fn list(&self, filter: &OrderFilter) -> Vec<Order> {
        let store = self.store.read().await;
        filter
            .apply(store.orders(), Utc::now(), self.timezone)
            .into_iter()
            .cloned()
            .collect()
    }

    /// Opens an order in the detail view and returns it.
    pub async fn open(&self, key: &str) -> Option<Order> {
        let mut store = self.store.write().await;
        let order_id = store.find(key)?.id.clone();
        store.select(&order_id);
        store.selected().cloned()
    }

    /// The order open in the detail view, with any tentative patch applied.
    pub async fn selected(&self) -> Option<Order> {
        self.store.read().await.selected().cloned()
    }

    pub async fn stats(&self) -> DashboardStats {
        DashboardStats::from_orders(self.store.read().await.orders())
    }
}
