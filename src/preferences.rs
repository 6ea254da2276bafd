use chrono::Utc;
use sqlx::SqlitePool;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::info;

use crate::error::PersistenceError;

const DEFAULT_SOUND_ENABLED: bool = true;

/// Operator preferences, loaded once at startup and saved on every change.
#[derive(Debug)]
pub struct Preferences {
    pool: SqlitePool,
    sound_enabled: AtomicBool,
}

impl Preferences {
    pub async fn load(pool: &SqlitePool) -> Result<Self, PersistenceError> {
        let stored: Option<i64> =
            sqlx::query_scalar("SELECT sound_enabled FROM operator_preferences WHERE id = 1")
                .fetch_optional(pool)
                .await?;

        let sound_enabled = stored.map_or(DEFAULT_SOUND_ENABLED, |value| value != 0);

        Ok(Self {
            pool: pool.clone(),
            sound_enabled: AtomicBool::new(sound_enabled),
        })
    }

    pub fn sound_enabled(&self) -> bool {
        self.sound_enabled.load(Ordering::SeqCst)
    }

    /// Persists the preference first; the in-process value only changes once
    /// the write succeeded.
    pub async fn set_sound_enabled(&self, enabled: bool) -> Result<(), PersistenceError> {
        sqlx::query(
            "INSERT INTO operator_preferences (id, sound_enabled, updated_at)
             VALUES (1, ?1, ?2)
             ON CONFLICT(id) DO UPDATE SET
               sound_enabled = excluded.sound_enabled,
               updated_at = excluded.updated_at",
        )
        .bind(i64::from(enabled))
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        self.sound_enabled.store(enabled, Ordering::SeqCst);
        info!("Sound alerts {}", if enabled { "enabled" } else { "disabled" });
        Ok(())
    }
}
