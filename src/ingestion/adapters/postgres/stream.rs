//! `PostgreSQL` event stream with row-level claim leases.

use super::{
    EventPgPool,
    models::{EventRow, NewEventRow},
    schema::webhook_events,
};
use crate::ingestion::{
    domain::{EventId, PersistedEventData, WebhookEvent},
    ports::{EventStream, EventStreamError, EventStreamResult},
};
use crate::provider::domain::ProviderName;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::result::Error as DieselError;
use mockable::Clock;
use std::sync::Arc;
use std::time::Duration;

/// `PostgreSQL`-backed event stream.
///
/// Claims lock candidate rows with `FOR UPDATE SKIP LOCKED`, so concurrent
/// consumers never lease the same entry twice. Lease expiry and retry
/// delays are evaluated against the injected clock.
pub struct PostgresEventStream<C: Clock + Send + Sync> {
    pool: EventPgPool,
    clock: Arc<C>,
}

impl<C: Clock + Send + Sync> Clone for PostgresEventStream<C> {
    fn clone(&self) -> Self {
        Self {
            pool: self.pool.clone(),
            clock: Arc::clone(&self.clock),
        }
    }
}

impl<C: Clock + Send + Sync + 'static> PostgresEventStream<C> {
    /// Creates a stream over a `PostgreSQL` pool.
    #[must_use]
    pub const fn new(pool: EventPgPool, clock: Arc<C>) -> Self {
        Self { pool, clock }
    }

    /// Returns the consumer currently holding a live lease on an entry.
    ///
    /// # Errors
    ///
    /// Returns [`EventStreamError::NotFound`] when the entry is gone.
    pub async fn lease_holder(&self, id: EventId) -> EventStreamResult<Option<String>> {
        let now = self.clock.utc();
        self.run_blocking(move |connection| {
            let (holder, expires_at) = webhook_events::table
                .filter(webhook_events::id.eq(id.into_inner()))
                .select((webhook_events::claimed_by, webhook_events::lease_expires_at))
                .first::<(Option<String>, Option<DateTime<Utc>>)>(connection)
                .optional()
                .map_err(EventStreamError::persistence)?
                .ok_or(EventStreamError::NotFound(id))?;
            Ok(holder.filter(|_| expires_at.is_some_and(|expiry| expiry > now)))
        })
        .await
    }

    async fn run_blocking<F, T>(&self, operation: F) -> EventStreamResult<T>
    where
        F: FnOnce(&mut PgConnection) -> EventStreamResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut connection = pool.get().map_err(EventStreamError::persistence)?;
            operation(&mut connection)
        })
        .await
        .map_err(EventStreamError::persistence)?
    }
}

#[async_trait]
impl<C: Clock + Send + Sync + 'static> EventStream for PostgresEventStream<C> {
    async fn append(&self, event: &WebhookEvent) -> EventStreamResult<()> {
        let row = to_new_row(event, self.clock.utc())?;
        self.run_blocking(move |connection| {
            diesel::insert_into(webhook_events::table)
                .values(&row)
                .on_conflict(webhook_events::id)
                .do_nothing()
                .execute(connection)
                .map_err(EventStreamError::persistence)?;
            Ok(())
        })
        .await
    }

    async fn claim(
        &self,
        consumer: &str,
        max: usize,
        visibility: Duration,
    ) -> EventStreamResult<Vec<WebhookEvent>> {
        let now = self.clock.utc();
        let expires_at = chrono::Duration::from_std(visibility)
            .ok()
            .and_then(|lease| now.checked_add_signed(lease))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        let limit = i64::try_from(max).unwrap_or(i64::MAX);
        let holder = consumer.to_owned();

        let rows = self
            .run_blocking(move |connection| {
                connection
                    .transaction::<_, DieselError, _>(|tx| {
                        let ids = webhook_events::table
                            .filter(webhook_events::available_at.le(now))
                            .filter(
                                webhook_events::lease_expires_at
                                    .is_null()
                                    .or(webhook_events::lease_expires_at.le(now)),
                            )
                            .order(webhook_events::stream_position.asc())
                            .limit(limit)
                            .select(webhook_events::id)
                            .for_update()
                            .skip_locked()
                            .load::<uuid::Uuid>(tx)?;
                        if ids.is_empty() {
                            return Ok(Vec::new());
                        }

                        diesel::update(webhook_events::table.filter(webhook_events::id.eq_any(ids)))
                            .set((
                                webhook_events::claimed_by.eq(Some(holder.as_str())),
                                webhook_events::lease_expires_at.eq(Some(expires_at)),
                            ))
                            .returning(EventRow::as_returning())
                            .get_results::<EventRow>(tx)
                    })
                    .map_err(EventStreamError::persistence)
            })
            .await?;

        let mut ordered = rows;
        ordered.sort_by_key(|row| row.stream_position);
        ordered.into_iter().map(row_to_event).collect()
    }

    async fn ack(&self, id: EventId) -> EventStreamResult<()> {
        self.run_blocking(move |connection| {
            let deleted =
                diesel::delete(webhook_events::table.filter(webhook_events::id.eq(id.into_inner())))
                    .execute(connection)
                    .map_err(EventStreamError::persistence)?;
            if deleted == 0 {
                return Err(EventStreamError::NotFound(id));
            }
            Ok(())
        })
        .await
    }

    async fn fail(
        &self,
        id: EventId,
        error: &str,
        retry_at: DateTime<Utc>,
    ) -> EventStreamResult<WebhookEvent> {
        let message = error.to_owned();
        let clock = Arc::clone(&self.clock);

        self.run_blocking(move |connection| {
            connection
                .transaction::<_, DieselError, _>(|tx| {
                    let Some(row) = webhook_events::table
                        .filter(webhook_events::id.eq(id.into_inner()))
                        .select(EventRow::as_select())
                        .for_update()
                        .first::<EventRow>(tx)
                        .optional()?
                    else {
                        return Ok(None);
                    };

                    let mut event = row_to_event(row)
                        .map_err(|err| DieselError::DeserializationError(Box::new(err)))?;
                    event.record_failure(message, &*clock);
                    let failures = serde_json::to_value(event.failures())
                        .map_err(|err| DieselError::SerializationError(Box::new(err)))?;

                    diesel::update(
                        webhook_events::table.filter(webhook_events::id.eq(id.into_inner())),
                    )
                    .set((
                        webhook_events::failures.eq(failures),
                        webhook_events::available_at.eq(retry_at),
                        webhook_events::claimed_by.eq(None::<String>),
                        webhook_events::lease_expires_at.eq(None::<DateTime<Utc>>),
                    ))
                    .execute(tx)?;
                    Ok(Some(event))
                })
                .map_err(EventStreamError::persistence)?
                .ok_or(EventStreamError::NotFound(id))
        })
        .await
    }

    async fn dead_letter(&self, id: EventId) -> EventStreamResult<WebhookEvent> {
        let row = self
            .run_blocking(move |connection| {
                diesel::delete(webhook_events::table.filter(webhook_events::id.eq(id.into_inner())))
                    .returning(EventRow::as_returning())
                    .get_result::<EventRow>(connection)
                    .optional()
                    .map_err(EventStreamError::persistence)?
                    .ok_or(EventStreamError::NotFound(id))
            })
            .await?;
        row_to_event(row)
    }

    async fn pending_count(&self) -> EventStreamResult<usize> {
        let count = self
            .run_blocking(|connection| {
                webhook_events::table
                    .count()
                    .get_result::<i64>(connection)
                    .map_err(EventStreamError::persistence)
            })
            .await?;
        usize::try_from(count).map_err(EventStreamError::persistence)
    }
}

fn to_new_row(event: &WebhookEvent, available_at: DateTime<Utc>) -> EventStreamResult<NewEventRow> {
    Ok(NewEventRow {
        id: event.id().into_inner(),
        provider: event.provider().as_str().to_owned(),
        delivery_id: event.delivery_id().map(str::to_owned),
        event_type: event.event_type().map(str::to_owned),
        payload: event.payload().clone(),
        received_at: event.received_at(),
        failures: serde_json::to_value(event.failures()).map_err(EventStreamError::persistence)?,
        available_at,
    })
}

fn row_to_event(row: EventRow) -> EventStreamResult<WebhookEvent> {
    let provider = ProviderName::new(row.provider).map_err(EventStreamError::persistence)?;
    let failures = serde_json::from_value(row.failures).map_err(EventStreamError::persistence)?;
    Ok(WebhookEvent::from_persisted(PersistedEventData {
        id: EventId::from_uuid(row.id),
        provider,
        delivery_id: row.delivery_id,
        event_type: row.event_type,
        payload: row.payload,
        received_at: row.received_at,
        failures,
    }))
}
