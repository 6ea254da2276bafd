use std::fmt::Debug;
use std::io::Write;
use std::sync::Arc;
use tracing::{info, warn};

/// Notifies the operator that new pending orders arrived.
pub trait Alerter: Send + Sync + Debug + 'static {
    fn new_pending_orders(&self, previous: usize, current: usize);
}

pub type DynAlerter = Arc<dyn Alerter>;

/// Rings the terminal bell. Each call is a separate ring.
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalBell;

impl Alerter for TerminalBell {
    fn new_pending_orders(&self, previous: usize, current: usize) {
        info!("New pending orders: {previous} -> {current}");

        let mut stdout = std::io::stdout().lock();
        if let Err(e) = stdout.write_all(b"\x07").and_then(|()| stdout.flush()) {
            warn!("Failed to ring terminal bell: {e}");
        }
    }
}
