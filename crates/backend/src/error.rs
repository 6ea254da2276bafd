use crate::order::{OrderId, OrderStatus};
use crate::supabase::SupabaseError;

/// Error type shared by every [`crate::OrderBackend`] implementation.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("Supabase error: {0}")]
    Supabase(#[from] SupabaseError),

    #[error("Order not found: {order_id}")]
    OrderNotFound { order_id: OrderId },

    #[error("Transition {from} -> {to} rejected for order {order_id}")]
    TransitionRejected {
        order_id: OrderId,
        from: OrderStatus,
        to: OrderStatus,
    },

    #[error("Invalid order row {order_id}: {reason}")]
    InvalidRow { order_id: String, reason: String },

    #[error("Could not resolve order scope: {0}")]
    Scope(String),

    #[error("Backend unavailable: {message}")]
    Unavailable { message: String },
}

impl BackendError {
    /// Whether retrying the same call later could succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Supabase(err) => err.is_transient(),
            Self::Unavailable { .. } => true,
            Self::OrderNotFound { .. }
            | Self::TransitionRejected { .. }
            | Self::InvalidRow { .. }
            | Self::Scope(_) => false,
        }
    }
}
