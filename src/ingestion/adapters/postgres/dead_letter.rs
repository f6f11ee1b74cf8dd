//! `PostgreSQL` dead-letter store.

use super::{EventPgPool, models::DeadLetterRow, schema::webhook_dead_letters};
use crate::ingestion::{
    domain::{DeadLetterEntry, EventId},
    ports::{DeadLetterError, DeadLetterResult, DeadLetterStore},
};
use async_trait::async_trait;
use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::upsert::excluded;

/// `PostgreSQL`-backed dead-letter store.
///
/// Each event is stored whole, failure history included, so it can be
/// replayed exactly as it left the stream.
#[derive(Debug, Clone)]
pub struct PostgresDeadLetterStore {
    pool: EventPgPool,
}

impl PostgresDeadLetterStore {
    /// Creates a store over a `PostgreSQL` pool.
    #[must_use]
    pub const fn new(pool: EventPgPool) -> Self {
        Self { pool }
    }

    async fn run_blocking<F, T>(&self, operation: F) -> DeadLetterResult<T>
    where
        F: FnOnce(&mut PgConnection) -> DeadLetterResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut connection = pool.get().map_err(DeadLetterError::persistence)?;
            operation(&mut connection)
        })
        .await
        .map_err(DeadLetterError::persistence)?
    }
}

#[async_trait]
impl DeadLetterStore for PostgresDeadLetterStore {
    async fn put(&self, entry: &DeadLetterEntry) -> DeadLetterResult<()> {
        let row = to_row(entry)?;
        self.run_blocking(move |connection| {
            diesel::insert_into(webhook_dead_letters::table)
                .values(&row)
                .on_conflict(webhook_dead_letters::event_id)
                .do_update()
                .set((
                    webhook_dead_letters::event.eq(excluded(webhook_dead_letters::event)),
                    webhook_dead_letters::dead_lettered_at
                        .eq(excluded(webhook_dead_letters::dead_lettered_at)),
                ))
                .execute(connection)
                .map_err(DeadLetterError::persistence)?;
            Ok(())
        })
        .await
    }

    async fn list(&self) -> DeadLetterResult<Vec<DeadLetterEntry>> {
        let rows = self
            .run_blocking(|connection| {
                webhook_dead_letters::table
                    .order(webhook_dead_letters::dead_lettered_at.asc())
                    .select(DeadLetterRow::as_select())
                    .load::<DeadLetterRow>(connection)
                    .map_err(DeadLetterError::persistence)
            })
            .await?;
        rows.into_iter().map(row_to_entry).collect()
    }

    async fn find(&self, id: EventId) -> DeadLetterResult<Option<DeadLetterEntry>> {
        let row = self
            .run_blocking(move |connection| {
                webhook_dead_letters::table
                    .filter(webhook_dead_letters::event_id.eq(id.into_inner()))
                    .select(DeadLetterRow::as_select())
                    .first::<DeadLetterRow>(connection)
                    .optional()
                    .map_err(DeadLetterError::persistence)
            })
            .await?;
        row.map(row_to_entry).transpose()
    }
}

fn to_row(entry: &DeadLetterEntry) -> DeadLetterResult<DeadLetterRow> {
    Ok(DeadLetterRow {
        event_id: entry.event.id().into_inner(),
        provider: entry.event.provider().as_str().to_owned(),
        event: serde_json::to_value(&entry.event).map_err(DeadLetterError::persistence)?,
        dead_lettered_at: entry.dead_lettered_at,
    })
}

fn row_to_entry(row: DeadLetterRow) -> DeadLetterResult<DeadLetterEntry> {
    Ok(DeadLetterEntry {
        event: serde_json::from_value(row.event).map_err(DeadLetterError::persistence)?,
        dead_lettered_at: row.dead_lettered_at,
    })
}
