use chrono::{DateTime, SecondsFormat, Utc};
use orderdesk_backend::OrderId;
use serde::Serialize;
use sqlx::SqlitePool;
use std::fmt::Display;
use std::str::FromStr;

use crate::error::PersistenceError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationField {
    Status,
    PaymentStatus,
}

impl MutationField {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Status => "status",
            Self::PaymentStatus => "payment_status",
        }
    }
}

impl FromStr for MutationField {
    type Err = PersistenceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "status" => Ok(Self::Status),
            "payment_status" => Ok(Self::PaymentStatus),
            other => Err(PersistenceError::InvalidJournalField(other.to_string())),
        }
    }
}

impl Display for MutationField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JournalOutcome {
    Committed,
    RolledBack,
}

impl JournalOutcome {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Committed => "committed",
            Self::RolledBack => "rolled_back",
        }
    }
}

impl FromStr for JournalOutcome {
    type Err = PersistenceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "committed" => Ok(Self::Committed),
            "rolled_back" => Ok(Self::RolledBack),
            other => Err(PersistenceError::InvalidJournalOutcome(other.to_string())),
        }
    }
}

/// One operator mutation attempt and how it ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JournalEntry {
    pub id: Option<i64>,
    pub order_id: OrderId,
    pub order_number: String,
    pub field: MutationField,
    pub from_value: String,
    pub to_value: String,
    pub outcome: JournalOutcome,
    pub error: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct JournalRow {
    id: i64,
    order_id: String,
    order_number: String,
    field: String,
    from_value: String,
    to_value: String,
    outcome: String,
    error: Option<String>,
    recorded_at: String,
}

impl TryFrom<JournalRow> for JournalEntry {
    type Error = PersistenceError;

    fn try_from(row: JournalRow) -> Result<Self, Self::Error> {
        let recorded_at = DateTime::parse_from_rfc3339(&row.recorded_at)
            .map_err(|_| PersistenceError::InvalidTimestamp(row.recorded_at.clone()))?
            .with_timezone(&Utc);

        Ok(Self {
            id: Some(row.id),
            order_id: OrderId::new(row.order_id),
            order_number: row.order_number,
            field: row.field.parse()?,
            from_value: row.from_value,
            to_value: row.to_value,
            outcome: row.outcome.parse()?,
            error: row.error,
            recorded_at,
        })
    }
}

impl JournalEntry {
    pub async fn save(&self, pool: &SqlitePool) -> Result<i64, PersistenceError> {
        let result = sqlx::query(
            "INSERT INTO mutation_journal
               (order_id, order_number, field, from_value, to_value, outcome, error, recorded_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        )
        .bind(self.order_id.as_str())
        .bind(&self.order_number)
        .bind(self.field.as_str())
        .bind(&self.from_value)
        .bind(&self.to_value)
        .bind(self.outcome.as_str())
        .bind(self.error.as_deref())
        .bind(self.recorded_at.to_rfc3339_opts(SecondsFormat::Micros, true))
        .execute(pool)
        .await?;

        Ok(result.last_insert_rowid())
    }
}

/// Most recent entries first. Timestamps are stored at fixed width so that
/// they sort as text.
pub async fn recent(pool: &SqlitePool, limit: u32) -> Result<Vec<JournalEntry>, PersistenceError> {
    let rows: Vec<JournalRow> = sqlx::query_as(
        "SELECT id, order_id, order_number, field, from_value, to_value, outcome, error, recorded_at
         FROM mutation_journal
         ORDER BY recorded_at DESC, id DESC
         LIMIT ?1",
    )
    .bind(i64::from(limit))
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(JournalEntry::try_from).collect()
}
