use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::fmt::{Debug, Display};
use std::sync::Arc;

pub mod error;
pub mod order;
pub mod supabase;

pub use error::BackendError;
pub use order::{
    CustomerRef, MenuItemSnapshot, Order, OrderId, OrderItem, OrderStatus, PaymentStatus,
    VendorRef,
};
pub use supabase::{SupabaseBackend, SupabaseConfig};
pub use test::TestBackend;

/// Who is looking at the order desk. Decides which orders are visible.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewerRole {
    Admin,
    Vendor { vendor_id: String },
    Cashier { user_id: String },
}

impl Display for ViewerRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Admin => write!(f, "admin"),
            Self::Vendor { vendor_id } => write!(f, "vendor {vendor_id}"),
            Self::Cashier { user_id } => write!(f, "cashier {user_id}"),
        }
    }
}

/// Resolved set of orders a viewer may see.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderScope {
    All,
    Vendor(String),
}

impl OrderScope {
    pub fn includes(&self, order: &Order) -> bool {
        match self {
            Self::All => true,
            Self::Vendor(vendor_id) => &order.vendor.id == vendor_id,
        }
    }
}

impl Display for OrderScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::All => write!(f, "all vendors"),
            Self::Vendor(vendor_id) => write!(f, "vendor {vendor_id}"),
        }
    }
}

/// Remote source of truth for orders.
///
/// Implementations must enforce the lifecycle themselves: `update_status`
/// rejects edges that are not part of the lifecycle and rows that are no
/// longer in `from`.
#[async_trait]
pub trait OrderBackend: Send + Sync + Debug + 'static {
    fn name(&self) -> &'static str;

    async fn resolve_scope(&self, role: &ViewerRole) -> Result<OrderScope, BackendError>;

    /// All orders in scope, newest first, with customer, vendor and items joined.
    async fn fetch_orders(&self, scope: &OrderScope) -> Result<Vec<Order>, BackendError>;

    async fn update_status(
        &self,
        order_id: &OrderId,
        from: OrderStatus,
        to: OrderStatus,
        updated_at: DateTime<Utc>,
    ) -> Result<(), BackendError>;

    async fn update_payment_status(
        &self,
        order_id: &OrderId,
        status: PaymentStatus,
        updated_at: DateTime<Utc>,
    ) -> Result<(), BackendError>;
}

pub type DynBackend = Arc<dyn OrderBackend>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test::order_fixture;

    #[test]
    fn test_scope_includes() {
        let mut order = order_fixture("o-1", "A1", OrderStatus::Pending);
        order.vendor.id = "vend-1".to_string();

        assert!(OrderScope::All.includes(&order));
        assert!(OrderScope::Vendor("vend-1".into()).includes(&order));
        assert!(!OrderScope::Vendor("vend-2".into()).includes(&order));
    }

    #[test]
    fn test_role_display() {
        assert_eq!(ViewerRole::Admin.to_string(), "admin");
        assert_eq!(
            ViewerRole::Cashier {
                user_id: "u-1".into()
            }
            .to_string(),
            "cashier u-1"
        );
    }
}
