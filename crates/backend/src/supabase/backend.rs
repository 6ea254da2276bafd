use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use super::{SupabaseClient, SupabaseConfig, SupabaseError};
use crate::order::OrderRow;
use crate::order::row::{ORDER_SELECT, deserialize_id};
use crate::{
    BackendError, Order, OrderBackend, OrderId, OrderScope, OrderStatus, PaymentStatus,
    ViewerRole,
};

const ORDERS_TABLE: &str = "orders";
const CASHIER_VENDOR_RPC: &str = "get_cashier_vendor";

#[derive(Debug, Deserialize)]
struct CashierVendor {
    #[serde(deserialize_with = "deserialize_id")]
    vendor_id: String,
}

/// Orders stored in a Supabase project, read and written through PostgREST.
#[derive(Debug, Clone)]
pub struct SupabaseBackend {
    client: SupabaseClient,
}

impl SupabaseBackend {
    pub fn try_from_config(config: &SupabaseConfig) -> Result<Self, SupabaseError> {
        Ok(Self {
            client: SupabaseClient::try_new(config)?,
        })
    }
}

#[async_trait]
impl OrderBackend for SupabaseBackend {
    fn name(&self) -> &'static str {
        "supabase"
    }

    async fn resolve_scope(&self, role: &ViewerRole) -> Result<OrderScope, BackendError> {
        match role {
            ViewerRole::Admin => Ok(OrderScope::All),
            ViewerRole::Vendor { vendor_id } => Ok(OrderScope::Vendor(vendor_id.clone())),
            ViewerRole::Cashier { user_id } => {
                let result: Result<CashierVendor, SupabaseError> = self
                    .client
                    .rpc(CASHIER_VENDOR_RPC, &json!({ "p_user_id": user_id }))
                    .await;

                match result {
                    Ok(CashierVendor { vendor_id }) if !vendor_id.is_empty() => {
                        info!("Cashier {user_id} works for vendor {vendor_id}");
                        Ok(OrderScope::Vendor(vendor_id))
                    }
                    Ok(_) => Err(BackendError::Scope(format!(
                        "cashier {user_id} is not linked to a vendor"
                    ))),
                    Err(SupabaseError::Rpc { message, .. }) => Err(BackendError::Scope(message)),
                    Err(e) => Err(e.into()),
                }
            }
        }
    }

    async fn fetch_orders(&self, scope: &OrderScope) -> Result<Vec<Order>, BackendError> {
        let mut params = vec![
            ("select", ORDER_SELECT.to_string()),
            ("order", "created_at.desc".to_string()),
        ];
        if let OrderScope::Vendor(vendor_id) = scope {
            params.push(("vendor_id", format!("eq.{vendor_id}")));
        }

        let rows: Vec<OrderRow> = self.client.select(ORDERS_TABLE, &params).await?;
        debug!("Fetched {} order rows for {scope}", rows.len());

        rows.into_iter().map(Order::try_from).collect()
    }

    async fn update_status(
        &self,
        order_id: &OrderId,
        from: OrderStatus,
        to: OrderStatus,
        updated_at: DateTime<Utc>,
    ) -> Result<(), BackendError> {
        if !from.can_transition_to(to) {
            return Err(BackendError::TransitionRejected {
                order_id: order_id.clone(),
                from,
                to,
            });
        }

        let filters = [
            ("id", format!("eq.{order_id}")),
            ("status", format!("eq.{from}")),
        ];
        let body = json!({ "status": to, "updated_at": updated_at });

        let updated: Vec<Value> = self.client.update(ORDERS_TABLE, &filters, &body).await?;

        if updated.is_empty() {
            warn!("Order {order_id} was no longer {from}; {from} -> {to} not applied");
            return Err(BackendError::TransitionRejected {
                order_id: order_id.clone(),
                from,
                to,
            });
        }

        Ok(())
    }

    async fn update_payment_status(
        &self,
        order_id: &OrderId,
        status: PaymentStatus,
        updated_at: DateTime<Utc>,
    ) -> Result<(), BackendError> {
        let filters = [("id", format!("eq.{order_id}"))];
        let body = json!({ "payment_status": status, "updated_at": updated_at });

        let updated: Vec<Value> = self.client.update(ORDERS_TABLE, &filters, &body).await?;

        if updated.is_empty() {
            return Err(BackendError::OrderNotFound {
                order_id: order_id.clone(),
            });
        }

        Ok(())
    }
}
