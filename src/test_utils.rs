use sqlx::SqlitePool;
use sqlx::sqlite::SqlitePoolOptions;
use std::sync::Mutex;

use crate::alert::Alerter;

/// Fresh in-memory database with all migrations applied. A single connection
/// keeps every query on the same in-memory database.
pub async fn setup_test_db() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect(":memory:")
        .await
        .unwrap();
    sqlx::migrate!().run(&pool).await.unwrap();
    pool
}

/// Remembers every alert instead of making noise.
#[derive(Debug, Default)]
pub struct RecordingAlerter {
    alerts: Mutex<Vec<(usize, usize)>>,
}

impl RecordingAlerter {
    pub fn alerts(&self) -> Vec<(usize, usize)> {
        self.alerts.lock().unwrap().clone()
    }
}

impl Alerter for RecordingAlerter {
    fn new_pending_orders(&self, previous: usize, current: usize) {
        self.alerts.lock().unwrap().push((previous, current));
    }
}
