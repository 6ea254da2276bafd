use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt::Display;

pub mod payment;
pub mod row;
pub mod status;

pub use payment::PaymentStatus;
pub use row::OrderRow;
pub use status::OrderStatus;

/// Opaque order identifier as assigned by the remote database.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(pub String);

impl OrderId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for OrderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerRef {
    pub id: String,
    pub email: Option<String>,
    pub full_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VendorRef {
    pub id: String,
    pub name: Option<String>,
}

/// Menu item as it looked when the order was read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MenuItemSnapshot {
    pub id: Option<String>,
    pub name: String,
    pub image_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: String,
    pub quantity: u32,
    pub unit_price: Decimal,
    pub subtotal: Decimal,
    pub special_instructions: Option<String>,
    pub menu_item: MenuItemSnapshot,
}

impl OrderItem {
    /// `subtotal == quantity * unit_price`. Reported, never enforced.
    pub fn subtotal_consistent(&self) -> bool {
        self.unit_price * Decimal::from(self.quantity) == self.subtotal
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub order_number: String,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub total: Decimal,
    pub subtotal: Decimal,
    pub tax: Decimal,
    pub scheduled_pickup_time: Option<DateTime<Utc>>,
    pub special_instructions: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub customer: CustomerRef,
    pub vendor: VendorRef,
    pub items: Vec<OrderItem>,
}

impl Order {
    pub fn is_pending(&self) -> bool {
        self.status == OrderStatus::Pending
    }

    pub fn customer_email(&self) -> Option<&str> {
        self.customer.email.as_deref()
    }

    pub fn vendor_name(&self) -> Option<&str> {
        self.vendor.name.as_deref()
    }

    /// `total == subtotal + tax`. Reported, never enforced.
    pub fn totals_consistent(&self) -> bool {
        self.subtotal + self.tax == self.total
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test::order_fixture;
    use rust_decimal_macros::dec;

    #[test]
    fn test_totals_consistent() {
        let mut order = order_fixture("o-1", "A1", OrderStatus::Pending);
        order.subtotal = dec!(10.00);
        order.tax = dec!(0.80);
        order.total = dec!(10.80);
        assert!(order.totals_consistent());

        order.total = dec!(11.00);
        assert!(!order.totals_consistent());
    }

    #[test]
    fn test_item_subtotal_consistent() {
        let order = order_fixture("o-1", "A1", OrderStatus::Pending);
        let mut item = order.items[0].clone();
        item.quantity = 3;
        item.unit_price = dec!(2.50);
        item.subtotal = dec!(7.50);
        assert!(item.subtotal_consistent());

        item.subtotal = dec!(7.00);
        assert!(!item.subtotal_consistent());
    }

    #[test]
    fn test_order_id_serializes_transparently() {
        let id = OrderId::new("abc");
        assert_eq!(serde_json::to_value(&id).unwrap(), "abc");
        assert_eq!(id.to_string(), "abc");
    }
}
