use orderdesk_backend::{Order, OrderStatus, PaymentStatus};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;

/// Headline numbers for the dashboard header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DashboardStats {
    pub total_orders: usize,
    pub by_status: BTreeMap<String, usize>,
    pub active_orders: usize,
    pub paid_orders: usize,
    pub revenue: Decimal,
    pub average_order_value: Decimal,
    /// Completed orders as a percentage of orders that were not cancelled.
    pub completion_rate: Decimal,
}

impl DashboardStats {
    pub fn from_orders<'a>(orders: impl IntoIterator<Item = &'a Order>) -> Self {
        let mut by_status: BTreeMap<String, usize> = OrderStatus::ALL
            .iter()
            .map(|status| (status.to_string(), 0))
            .collect();
        let mut total_orders = 0;
        let mut paid_orders = 0;
        let mut revenue = Decimal::ZERO;

        for order in orders {
            total_orders += 1;
            *by_status.entry(order.status.to_string()).or_default() += 1;

            if order.payment_status == PaymentStatus::Paid {
                paid_orders += 1;
                revenue += order.total;
            }
        }

        let count = |status: OrderStatus| by_status.get(status.as_str()).copied().unwrap_or(0);
        let active_orders = count(OrderStatus::Confirmed)
            + count(OrderStatus::Preparing)
            + count(OrderStatus::Ready);
        let completed = count(OrderStatus::Completed);
        let not_cancelled = total_orders - count(OrderStatus::Cancelled);

        let average_order_value = if paid_orders == 0 {
            Decimal::ZERO
        } else {
            (revenue / Decimal::from(paid_orders)).round_dp(2)
        };

        let completion_rate = if not_cancelled == 0 {
            Decimal::ZERO
        } else {
            (Decimal::from(completed) * Decimal::ONE_HUNDRED / Decimal::from(not_cancelled))
                .round_dp(2)
        };

        Self {
            total_orders,
            by_status,
            active_orders,
            paid_orders,
            revenue,
            average_order_value,
            completion_rate,
        }
    }
}
