//! Wire shapes of the `orders` select with its joins, and the single
//! validation step that turns them into domain [`Order`]s.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer};
use std::fmt::Display;

use super::{
    CustomerRef, MenuItemSnapshot, Order, OrderId, OrderItem, OrderStatus, PaymentStatus,
    VendorRef,
};
use crate::BackendError;

/// PostgREST columns used by [`OrderRow`]; keep in sync with the struct.
pub const ORDER_SELECT: &str = "*,customer:profiles!orders_customer_id_fkey(id,email,full_name),vendor:vendors(id,name),order_items(*,menu_item:menu_items(id,name,image_url))";

/// Ids are uuid text in most deployments but serial integers in older ones.
pub(crate) fn deserialize_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Text(String),
        Number(i64),
    }

    Ok(match RawId::deserialize(deserializer)? {
        RawId::Text(text) => text,
        RawId::Number(number) => number.to_string(),
    })
}

fn deserialize_optional_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    struct Wrapper(#[serde(deserialize_with = "deserialize_id")] String);

    Ok(Option::<Wrapper>::deserialize(deserializer)?.map(|Wrapper(id)| id))
}

#[derive(Debug, Clone, Deserialize)]
pub struct CustomerRow {
    #[serde(default, deserialize_with = "deserialize_optional_id")]
    pub id: Option<String>,
    pub email: Option<String>,
    pub full_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VendorRow {
    #[serde(default, deserialize_with = "deserialize_optional_id")]
    pub id: Option<String>,
    pub name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MenuItemRow {
    #[serde(default, deserialize_with = "deserialize_optional_id")]
    pub id: Option<String>,
    pub name: Option<String>,
    pub image_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OrderItemRow {
    #[serde(deserialize_with = "deserialize_id")]
    pub id: String,
    pub quantity: i64,
    pub unit_price: Decimal,
    pub subtotal: Decimal,
    pub special_instructions: Option<String>,
    #[serde(default)]
    pub menu_item: Option<MenuItemRow>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OrderRow {
    #[serde(deserialize_with = "deserialize_id")]
    pub id: String,
    pub order_number: String,
    pub status: String,
    pub payment_status: String,
    pub total: Decimal,
    pub subtotal: Decimal,
    pub tax: Decimal,
    pub scheduled_pickup_time: Option<DateTime<Utc>>,
    pub special_instructions: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(deserialize_with = "deserialize_id")]
    pub customer_id: String,
    #[serde(deserialize_with = "deserialize_id")]
    pub vendor_id: String,
    #[serde(default)]
    pub customer: Option<CustomerRow>,
    #[serde(default)]
    pub vendor: Option<VendorRow>,
    #[serde(default)]
    pub order_items: Vec<OrderItemRow>,
}

fn invalid_row(order_id: &str, reason: impl Display) -> BackendError {
    BackendError::InvalidRow {
        order_id: order_id.to_string(),
        reason: reason.to_string(),
    }
}

impl OrderItemRow {
    fn into_item(self, order_id: &str) -> Result<OrderItem, BackendError> {
        let quantity = u32::try_from(self.quantity)
            .ok()
            .filter(|quantity| *quantity > 0)
            .ok_or_else(|| {
                invalid_row(
                    order_id,
                    format!("item {} has invalid quantity {}", self.id, self.quantity),
                )
            })?;

        let menu_item = self.menu_item.map_or_else(
            || MenuItemSnapshot {
                id: None,
                name: "Unknown item".to_string(),
                image_url: None,
            },
            |menu| MenuItemSnapshot {
                id: menu.id,
                name: menu.name.unwrap_or_else(|| "Unknown item".to_string()),
                image_url: menu.image_url,
            },
        );

        Ok(OrderItem {
            id: self.id,
            quantity,
            unit_price: self.unit_price,
            subtotal: self.subtotal,
            special_instructions: self.special_instructions,
            menu_item,
        })
    }
}

impl TryFrom<OrderRow> for Order {
    type Error = BackendError;

    fn try_from(row: OrderRow) -> Result<Self, Self::Error> {
        let status: OrderStatus = row.status.parse().map_err(|e| invalid_row(&row.id, e))?;
        let payment_status: PaymentStatus = row
            .payment_status
            .parse()
            .map_err(|e| invalid_row(&row.id, e))?;

        let items = row
            .order_items
            .into_iter()
            .map(|item| item.into_item(&row.id))
            .collect::<Result<Vec<_>, _>>()?;

        let customer = match row.customer {
            Some(customer) => CustomerRef {
                id: customer.id.unwrap_or_else(|| row.customer_id.clone()),
                email: customer.email,
                full_name: customer.full_name,
            },
            None => CustomerRef {
                id: row.customer_id,
                email: None,
                full_name: None,
            },
        };

        let vendor = match row.vendor {
            Some(vendor) => VendorRef {
                id: vendor.id.unwrap_or_else(|| row.vendor_id.clone()),
                name: vendor.name,
            },
            None => VendorRef {
                id: row.vendor_id,
                name: None,
            },
        };

        Ok(Self {
            id: OrderId(row.id),
            order_number: row.order_number,
            status,
            payment_status,
            total: row.total,
            subtotal: row.subtotal,
            tax: row.tax,
            scheduled_pickup_time: row.scheduled_pickup_time,
            special_instructions: row.special_instructions,
            created_at: row.created_at,
            updated_at: row.updated_at.unwrap_or(row.created_at),
            customer,
            vendor,
            items,
        })
    }
}
