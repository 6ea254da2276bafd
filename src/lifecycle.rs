use chrono::{DateTime, Utc};
use orderdesk_backend::{BackendError, DynBackend, OrderId, PaymentStatus};
use serde::Serialize;
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::error::LifecycleError;
use crate::journal::{JournalEntry, JournalOutcome, MutationField};
use crate::poller::OrderRefresher;
use crate::store::SharedOrderStore;
use crate::transition::{OrderAction, resolve_action};

/// A committed operator mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MutationOutcome {
    pub order_id: OrderId,
    pub order_number: String,
    pub field: MutationField,
    pub from: String,
    pub to: String,
    pub message: String,
}

/// Operator mutations on orders.
///
/// Every mutation is applied to the store first so the operator sees it at
/// once, then written to the backend. Refreshes wait until the write has
/// settled. When the write fails the store is put back and reloaded from the
/// backend before the error is returned.
#[derive(Debug, Clone)]
pub struct OrderLifecycle {
    backend: DynBackend,
    store: SharedOrderStore,
    refresher: Arc<OrderRefresher>,
    pool: SqlitePool,
}

/// Everything needed to commit or undo one tentative patch.
struct Pending<T> {
    order_id: OrderId,
    order_number: String,
    from: T,
    to: T,
    previous_updated_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl OrderLifecycle {
    pub const fn new(
        backend: DynBackend,
        store: SharedOrderStore,
        refresher: Arc<OrderRefresher>,
        pool: SqlitePool,
    ) -> Self {
        Self {
            backend,
            store,
            refresher,
            pool,
        }
    }

    /// Moves an order along its lifecycle. `confirmed` must be set for
    /// actions that ask for confirmation.
    pub async fn apply_action(
        &self,
        key: &str,
        action: OrderAction,
        confirmed: bool,
    ) -> Result<MutationOutcome, LifecycleError> {
        if action.requires_confirmation() && !confirmed {
            return Err(LifecycleError::ConfirmationRequired);
        }

        let pause = self.refresher.pause().await;
        let pending = {
            let mut store = self.store.write().await;
            let order = store.find(key).ok_or_else(|| LifecycleError::UnknownOrder {
                key: key.to_string(),
            })?;

            let from = order.status;
            let to = resolve_action(from, action)?;
            let pending = Pending {
                order_id: order.id.clone(),
                order_number: order.order_number.clone(),
                from,
                to,
                previous_updated_at: order.updated_at,
                updated_at: Utc::now(),
            };

            store.apply_status(&pending.order_id, to, pending.updated_at);
            pending
        };

        let result = self
            .backend
            .update_status(
                &pending.order_id,
                pending.from,
                pending.to,
                pending.updated_at,
            )
            .await;

        if let Err(e) = result {
            self.store.write().await.apply_status(
                &pending.order_id,
                pending.from,
                pending.previous_updated_at,
            );
            drop(pause);
            return Err(self.roll_back(&pending, MutationField::Status, e).await);
        }
        drop(pause);

        let message = format!("Order #{} marked as {}", pending.order_number, pending.to);
        Ok(self.commit(&pending, MutationField::Status, message).await)
    }

    /// Sets an order's payment status. Any value may replace any other.
    pub async fn set_payment_status(
        &self,
        key: &str,
        status: PaymentStatus,
    ) -> Result<MutationOutcome, LifecycleError> {
        let pause = self.refresher.pause().await;
        let pending = {
            let mut store = self.store.write().await;
            let order = store.find(key).ok_or_else(|| LifecycleError::UnknownOrder {
                key: key.to_string(),
            })?;

            let pending = Pending {
                order_id: order.id.clone(),
                order_number: order.order_number.clone(),
                from: order.payment_status,
                to: status,
                previous_updated_at: order.updated_at,
                updated_at: Utc::now(),
            };

            store.apply_payment_status(&pending.order_id, status, pending.updated_at);
            pending
        };

        let result = self
            .backend
            .update_payment_status(&pending.order_id, status, pending.updated_at)
            .await;

        if let Err(e) = result {
            self.store.write().await.apply_payment_status(
                &pending.order_id,
                pending.from,
                pending.previous_updated_at,
            );
            drop(pause);
            return Err(self.roll_back(&pending, MutationField::PaymentStatus, e).await);
        }
        drop(pause);

        let message = format!(
            "Order #{} payment marked as {}",
            pending.order_number, pending.to
        );
        Ok(self.commit(&pending, MutationField::PaymentStatus, message).await)
    }

    async fn commit<T: ToString>(
        &self,
        pending: &Pending<T>,
        field: MutationField,
        message: String,
    ) -> MutationOutcome {
        info!("{message}");
        self.record(pending, field, JournalOutcome::Committed, None)
            .await;

        MutationOutcome {
            order_id: pending.order_id.clone(),
            order_number: pending.order_number.clone(),
            field,
            from: pending.from.to_string(),
            to: pending.to.to_string(),
            message,
        }
    }

    async fn roll_back<T: ToString>(
        &self,
        pending: &Pending<T>,
        field: MutationField,
        err: BackendError,
    ) -> LifecycleError {
        error!(
            "Failed to update {field} of order {} ({}): {err:?}",
            pending.order_number, pending.order_id
        );
        self.record(
            pending,
            field,
            JournalOutcome::RolledBack,
            Some(err.to_string()),
        )
        .await;

        if let Err(refresh_err) = self.refresher.refresh_now().await {
            warn!("Failed to reload orders after rollback: {refresh_err}");
        }

        LifecycleError::Backend(err)
    }

    async fn record<T: ToString>(
        &self,
        pending: &Pending<T>,
        field: MutationField,
        outcome: JournalOutcome,
        error: Option<String>,
    ) {
        let entry = JournalEntry {
            id: None,
            order_id: pending.order_id.clone(),
            order_number: pending.order_number.clone(),
            field,
            from_value: pending.from.to_string(),
            to_value: pending.to.to_string(),
            outcome,
            error,
            recorded_at: Utc::now(),
        };

        if let Err(e) = entry.save(&self.pool).await {
            warn!(
                "Failed to journal {field} change of order {}: {e}",
                pending.order_number
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::journal;
    use crate::poller::RefreshOutcome;
    use crate::preferences::Preferences;
    use crate::store::OrderStore;
    use crate::test_utils::{RecordingAlerter, setup_test_db};
    use orderdesk_backend::test::order_fixture;
    use orderdesk_backend::{Order, OrderScope, OrderStatus, TestBackend};

    async fn setup(
        orders: Vec<Order>,
    ) -> (TestBackend, SharedOrderStore, OrderLifecycle, SqlitePool) {
        let pool = setup_test_db().await;
        let backend = TestBackend::with_orders(orders);
        let dyn_backend: DynBackend = Arc::new(backend.clone());
        let store = OrderStore::shared();
        let refresher = Arc::new(OrderRefresher::new(
            dyn_backend.clone(),
            OrderScope::All,
            store.clone(),
            Arc::new(Preferences::load(&pool).await.unwrap()),
            Arc::new(RecordingAlerter::default()),
        ));
        refresher.refresh_now().await.unwrap();

        let lifecycle = OrderLifecycle::new(dyn_backend, store.clone(), refresher, pool.clone());
        (backend, store, lifecycle, pool)
    }

    #[tokio::test]
    async fn test_advance_commits_and_reports() {
        let (backend, store, lifecycle, pool) =
            setup(vec![order_fixture("o-1", "A1", OrderStatus::Pending)]).await;

        let outcome = lifecycle
            .apply_action("A1", OrderAction::Advance, false)
            .await
            .unwrap();

        assert_eq!(outcome.message, "Order #A1 marked as confirmed");
        let id = OrderId::new("o-1");
        assert_eq!(backend.order(&id).unwrap().status, OrderStatus::Confirmed);
        assert_eq!(store.read().await.get(&id).unwrap().status, OrderStatus::Confirmed);

        let entries = journal::recent(&pool, 10).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].outcome, JournalOutcome::Committed);
        assert_eq!(entries[0].to_value, "confirmed");
    }

    #[tokio::test]
    async fn test_failed_update_restores_persisted_status() {
        let (backend, store, lifecycle, pool) =
            setup(vec![order_fixture("o-1", "A1", OrderStatus::Confirmed)]).await;
        let id = OrderId::new("o-1");
        store.write().await.select(&id);
        backend.set_fail_updates(true);

        let err = lifecycle
            .apply_action("o-1", OrderAction::Advance, false)
            .await
            .unwrap_err();

        assert!(matches!(err, LifecycleError::Backend(_)));
        let store = store.read().await;
        assert_eq!(store.get(&id).unwrap().status, OrderStatus::Confirmed);
        assert_eq!(store.selected().unwrap().status, OrderStatus::Confirmed);
        // initial load plus the reload after rollback
        assert_eq!(backend.fetch_count(), 2);

        let entries = journal::recent(&pool, 10).await.unwrap();
        assert_eq!(entries[0].outcome, JournalOutcome::RolledBack);
        assert!(entries[0].error.as_deref().unwrap().contains("injected"));
    }

    #[tokio::test]
    async fn test_rollback_picks_up_concurrent_change() {
        let (backend, store, lifecycle, _pool) =
            setup(vec![order_fixture("o-1", "A1", OrderStatus::Pending)]).await;
        let id = OrderId::new("o-1");

        // another operator already confirmed and started preparing it
        backend.insert(order_fixture("o-1", "A1", OrderStatus::Preparing));

        let err = lifecycle
            .apply_action("A1", OrderAction::Cancel, true)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            LifecycleError::Backend(BackendError::TransitionRejected { .. })
        ));
        assert_eq!(store.read().await.get(&id).unwrap().status, OrderStatus::Preparing);
    }

    #[tokio::test]
    async fn test_cancel_requires_confirmation() {
        let (backend, _store, lifecycle, _pool) =
            setup(vec![order_fixture("o-1", "A1", OrderStatus::Pending)]).await;

        let err = lifecycle
            .apply_action("A1", OrderAction::Cancel, false)
            .await
            .unwrap_err();

        assert!(matches!(err, LifecycleError::ConfirmationRequired));
        assert_eq!(backend.update_count(), 0);
    }

    #[tokio::test]
    async fn test_unavailable_action_never_reaches_backend() {
        let (backend, _store, lifecycle, _pool) =
            setup(vec![order_fixture("o-1", "A1", OrderStatus::Completed)]).await;

        let err = lifecycle
            .apply_action("A1", OrderAction::Advance, false)
            .await
            .unwrap_err();

        assert!(matches!(err, LifecycleError::ActionNotAvailable { .. }));
        assert_eq!(backend.update_count(), 0);
    }

    #[tokio::test]
    async fn test_unknown_order() {
        let (_backend, _store, lifecycle, _pool) = setup(vec![]).await;
        let err = lifecycle
            .set_payment_status("Z9", PaymentStatus::Paid)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "No order matches Z9");
    }

    #[tokio::test]
    async fn test_payment_status_any_to_any() {
        let (backend, store, lifecycle, _pool) =
            setup(vec![order_fixture("o-1", "A1", OrderStatus::Completed)]).await;
        let id = OrderId::new("o-1");

        for status in [
            PaymentStatus::Paid,
            PaymentStatus::Refunded,
            PaymentStatus::Pending,
            PaymentStatus::Pending,
        ] {
            lifecycle.set_payment_status("A1", status).await.unwrap();
            assert_eq!(backend.order(&id).unwrap().payment_status, status);
            assert_eq!(store.read().await.get(&id).unwrap().payment_status, status);
        }
    }

    #[tokio::test]
    async fn test_failed_payment_update_rolls_back() {
        let (backend, store, lifecycle, _pool) =
            setup(vec![order_fixture("o-1", "A1", OrderStatus::Ready)]).await;
        backend.set_fail_updates(true);
        backend.set_fail_fetches(true);

        let err = lifecycle
            .set_payment_status("A1", PaymentStatus::Paid)
            .await
            .unwrap_err();

        assert!(matches!(err, LifecycleError::Backend(_)));
        // the reload failed too, the local undo still holds
        assert_eq!(
            store.read().await.find("A1").unwrap().payment_status,
            PaymentStatus::Pending
        );
    }

    #[tokio::test]
    async fn test_tick_during_slow_write_cannot_undo_it() {
        let pool = setup_test_db().await;
        let backend = TestBackend::with_orders([order_fixture("o-1", "A1", OrderStatus::Pending)]);
        let dyn_backend: DynBackend = Arc::new(backend.clone());
        let store = OrderStore::shared();
        let alerter = Arc::new(RecordingAlerter::default());
        let refresher = Arc::new(OrderRefresher::new(
            dyn_backend.clone(),
            OrderScope::All,
            store.clone(),
            Arc::new(Preferences::load(&pool).await.unwrap()),
            alerter.clone(),
        ));
        refresher.refresh_now().await.unwrap();
        let lifecycle = OrderLifecycle::new(dyn_backend, store.clone(), refresher.clone(), pool);

        backend.set_update_delay(std::time::Duration::from_millis(200));
        let writer = lifecycle.clone();
        let write = tokio::spawn(async move {
            writer.apply_action("A1", OrderAction::Advance, false).await
        });

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        let tick = refresher.refresh_if_idle().await.unwrap();
        assert_eq!(tick, RefreshOutcome::Skipped);

        let outcome = write.await.unwrap().unwrap();
        assert_eq!(outcome.message, "Order #A1 marked as confirmed");

        // a manual reload queued behind the write sees the committed row
        refresher.refresh_now().await.unwrap();
        let id = OrderId::new("o-1");
        assert_eq!(store.read().await.get(&id).unwrap().status, OrderStatus::Confirmed);
        assert_eq!(backend.order(&id).unwrap().status, OrderStatus::Confirmed);
        assert!(alerter.alerts().is_empty());
    }

    #[tokio::test]
    async fn test_reload_waits_for_running_write() {
        let (backend, store, lifecycle, _pool) =
            setup(vec![order_fixture("o-1", "A1", OrderStatus::Pending)]).await;
        backend.set_update_delay(std::time::Duration::from_millis(200));

        let writer = lifecycle.clone();
        let write = tokio::spawn(async move {
            writer.set_payment_status("A1", PaymentStatus::Paid).await
        });

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        let started = std::time::Instant::now();
        lifecycle.refresher.refresh_now().await.unwrap();

        // the reload could only run once the write had landed
        assert!(started.elapsed() >= std::time::Duration::from_millis(100));
        assert_eq!(
            backend.order(&OrderId::new("o-1")).unwrap().payment_status,
            PaymentStatus::Paid
        );
        write.await.unwrap().unwrap();
        assert_eq!(
            store.read().await.find("A1").unwrap().payment_status,
            PaymentStatus::Paid
        );
    }
}
