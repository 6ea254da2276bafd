use chrono::{DateTime, Utc};
use orderdesk_backend::{Order, OrderId, OrderStatus, PaymentStatus};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

pub type SharedOrderStore = Arc<RwLock<OrderStore>>;

/// Last fetched order list plus the operator's current selection.
///
/// The selection is held by id so that an open detail view always reads the
/// same record the list shows, including tentative patches.
#[derive(Debug, Default)]
pub struct OrderStore {
    orders: Vec<Order>,
    selected: Option<OrderId>,
    last_refreshed: Option<DateTime<Utc>>,
}

impl OrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> SharedOrderStore {
        Arc::new(RwLock::new(Self::new()))
    }

    pub fn orders(&self) -> &[Order] {
        &self.orders
    }

    pub fn get(&self, order_id: &OrderId) -> Option<&Order> {
        self.orders.iter().find(|order| &order.id == order_id)
    }

    /// Looks an order up by id, then by order number (case-insensitive).
    pub fn find(&self, key: &str) -> Option<&Order> {
        let key = key.trim().trim_start_matches('#');

        self.orders
            .iter()
            .find(|order| order.id.as_str() == key)
            .or_else(|| {
                self.orders
                    .iter()
                    .find(|order| order.order_number.eq_ignore_ascii_case(key))
            })
    }

    /// Selects an order for the detail view. Returns false if it is unknown.
    pub fn select(&mut self, order_id: &OrderId) -> bool {
        if self.get(order_id).is_none() {
            return false;
        }
        self.selected = Some(order_id.clone());
        true
    }

    pub fn selected(&self) -> Option<&Order> {
        self.selected.as_ref().and_then(|id| self.get(id))
    }

    pub fn pending_count(&self) -> usize {
        self.orders.iter().filter(|order| order.is_pending()).count()
    }

    pub const fn last_refreshed(&self) -> Option<DateTime<Utc>> {
        self.last_refreshed
    }

    pub const fn has_loaded(&self) -> bool {
        self.last_refreshed.is_some()
    }

    /// Replaces the list with a fresh fetch. A selection whose order vanished
    /// is dropped.
    pub fn replace_all(&mut self, orders: Vec<Order>, refreshed_at: DateTime<Utc>) {
        self.orders = orders;
        self.last_refreshed = Some(refreshed_at);

        if let Some(selected) = &self.selected
            && self.get(selected).is_none()
        {
            debug!("Selected order {selected} is gone after refresh");
            self.selected = None;
        }
    }

    /// Tentatively sets an order's status. Returns the previous status.
    pub fn apply_status(
        &mut self,
        order_id: &OrderId,
        status: OrderStatus,
        updated_at: DateTime<Utc>,
    ) -> Option<OrderStatus> {
        let order = self.orders.iter_mut().find(|order| &order.id == order_id)?;
        let previous = order.status;
        order.status = status;
        order.updated_at = updated_at;
        Some(previous)
    }

    /// Tentatively sets an order's payment status. Returns the previous value.
    pub fn apply_payment_status(
        &mut self,
        order_id: &OrderId,
        status: PaymentStatus,
        updated_at: DateTime<Utc>,
    ) -> Option<PaymentStatus> {
        let order = self.orders.iter_mut().find(|order| &order.id == order_id)?;
        let previous = order.payment_status;
        order.payment_status = status;
        order.updated_at = updated_at;
        Some(previous)
    }
}
