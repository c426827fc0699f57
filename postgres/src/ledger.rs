//! `PostgreSQL`-backed [`LedgerStore`].

use crate::PostgresConfig;
use crate::rows::{
    EVENT_COLUMNS, EventRow, PaymentRow, REGISTRATION_COLUMNS, RatingRow, RegistrationRow,
    SeatColumns, WaitlistRow, to_i32, to_i64, version_from,
};
use eventdesk_core::ledger::{
    EventLedger, LedgerError, LedgerFuture, LedgerOp, LedgerStore, Version,
};
use eventdesk_core::types::{
    DecisionToken, Event, EventId, Payment, Rating, Registration, UserId,
};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

/// `PostgreSQL` ledger store.
///
/// Every commit runs in one transaction: the event row is locked with
/// `SELECT ... FOR UPDATE`, its version compared with the caller's, the ops
/// applied and the version bumped. Capacity and uniqueness are also enforced
/// by the schema, so a faulty op aborts the whole batch.
#[derive(Clone, Debug)]
pub struct PostgresLedger {
    pool: PgPool,
}

impl PostgresLedger {
    /// Create a ledger over an existing connection pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Open a connection pool with the given settings.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Database`] if the database cannot be reached.
    pub async fn connect(config: &PostgresConfig) -> Result<Self, LedgerError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.connect_timeout())
            .connect(&config.url)
            .await
            .map_err(|e| LedgerError::Database(format!("Failed to connect: {e}")))?;

        tracing::info!(max_connections = config.max_connections, "Ledger database connected");
        Ok(Self::new(pool))
    }

    /// Run the embedded migrations.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Database`] if a migration fails.
    pub async fn migrate(&self) -> Result<(), LedgerError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| LedgerError::Database(format!("Migration failed: {e}")))?;
        Ok(())
    }

    /// The underlying pool
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn fetch_event(&self, event_id: EventId) -> Result<Option<Event>, LedgerError> {
        let row: Option<EventRow> =
            sqlx::query_as(&format!("SELECT {EVENT_COLUMNS} FROM events WHERE id = $1"))
                .bind(event_id.as_uuid())
                .fetch_optional(&self.pool)
                .await
                .map_err(db_error)?;
        row.map(Event::try_from).transpose()
    }

    #[tracing::instrument(skip_all, fields(event_id = %event_id))]
    async fn load_ledger(&self, event_id: EventId) -> Result<Option<EventLedger>, LedgerError> {
        let mut tx = self.pool.begin().await.map_err(db_error)?;
        // One snapshot across all tables
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ READ ONLY")
            .execute(&mut *tx)
            .await
            .map_err(db_error)?;

        let row: Option<EventRow> =
            sqlx::query_as(&format!("SELECT {EVENT_COLUMNS} FROM events WHERE id = $1"))
                .bind(event_id.as_uuid())
                .fetch_optional(&mut *tx)
                .await
                .map_err(db_error)?;
        let Some(row) = row else {
            return Ok(None);
        };
        let version = version_from(row.version)?;
        let mut ledger = EventLedger::new(Event::try_from(row)?);
        ledger.version = version;

        let registrations: Vec<RegistrationRow> = sqlx::query_as(&format!(
            "SELECT {REGISTRATION_COLUMNS} FROM registrations WHERE event_id = $1 ORDER BY seq"
        ))
        .bind(event_id.as_uuid())
        .fetch_all(&mut *tx)
        .await
        .map_err(db_error)?;
        ledger.registrations = registrations
            .into_iter()
            .map(Registration::try_from)
            .collect::<Result<_, _>>()?;

        let payments: Vec<PaymentRow> = sqlx::query_as(
            "SELECT user_id, event_id, amount, confirmed_at, confirmed_by \
             FROM payments WHERE event_id = $1",
        )
        .bind(event_id.as_uuid())
        .fetch_all(&mut *tx)
        .await
        .map_err(db_error)?;
        for row in payments {
            let payment = Payment::try_from(row)?;
            ledger.payments.insert(payment.user_id, payment);
        }

        let waitlist: Vec<WaitlistRow> = sqlx::query_as(
            "SELECT user_id, event_id, added_at FROM waitlist_entries \
             WHERE event_id = $1 ORDER BY added_at, seq",
        )
        .bind(event_id.as_uuid())
        .fetch_all(&mut *tx)
        .await
        .map_err(db_error)?;
        ledger.waitlist = waitlist.into_iter().map(Into::into).collect();

        let ratings: Vec<RatingRow> = sqlx::query_as(
            "SELECT user_id, event_id, score, rated_at FROM ratings WHERE event_id = $1",
        )
        .bind(event_id.as_uuid())
        .fetch_all(&mut *tx)
        .await
        .map_err(db_error)?;
        for row in ratings {
            let rating = Rating::try_from(row)?;
            ledger.ratings.insert(rating.user_id, rating);
        }

        tx.commit().await.map_err(db_error)?;
        Ok(Some(ledger))
    }

    #[tracing::instrument(
        skip_all,
        fields(event_id = %event_id, expected = %expected, ops = ops.len())
    )]
    async fn commit_ops(
        &self,
        event_id: EventId,
        expected: Version,
        ops: Vec<LedgerOp>,
    ) -> Result<Version, LedgerError> {
        let mut tx = self.pool.begin().await.map_err(db_error)?;

        let current: Option<(i64,)> =
            sqlx::query_as("SELECT version FROM events WHERE id = $1 FOR UPDATE")
                .bind(event_id.as_uuid())
                .fetch_optional(&mut *tx)
                .await
                .map_err(db_error)?;
        let Some((current,)) = current else {
            return Err(LedgerError::EventNotFound(event_id));
        };
        let actual = version_from(current)?;
        if actual != expected {
            metrics::counter!("eventdesk_ledger_commits_total", "outcome" => "conflict")
                .increment(1);
            return Err(LedgerError::ConcurrencyConflict {
                event_id,
                expected,
                actual,
            });
        }

        for op in &ops {
            if let Err(error) = apply_op(&mut tx, event_id, op).await {
                tracing::warn!(%error, ?op, "Ledger op rejected, rolling back");
                metrics::counter!("eventdesk_ledger_commits_total", "outcome" => "rejected")
                    .increment(1);
                return Err(error);
            }
        }

        let next = expected.next();
        sqlx::query("UPDATE events SET version = $2 WHERE id = $1")
            .bind(event_id.as_uuid())
            .bind(to_i64(next.value())?)
            .execute(&mut *tx)
            .await
            .map_err(db_error)?;
        tx.commit().await.map_err(db_error)?;

        metrics::counter!("eventdesk_ledger_commits_total", "outcome" => "committed").increment(1);
        tracing::debug!(version = %next, "Ledger committed");
        Ok(next)
    }
}

/// Apply one op inside the commit transaction.
///
/// Rows are always written under the committing event.
async fn apply_op(
    tx: &mut Transaction<'_, Postgres>,
    event_id: EventId,
    op: &LedgerOp,
) -> Result<(), LedgerError> {
    let event = event_id.as_uuid();
    let affected = match op {
        LedgerOp::CreateRegistration(registration) => {
            let seat = SeatColumns::from(&registration.state);
            sqlx::query(&format!(
                "INSERT INTO registrations ({REGISTRATION_COLUMNS}) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7)"
            ))
            .bind(registration.user_id.value())
            .bind(event)
            .bind(registration.created_at)
            .bind(seat.state)
            .bind(seat.token)
            .bind(seat.receipt)
            .bind(seat.submitted_at)
            .execute(&mut **tx)
            .await
        }
        LedgerOp::DeleteRegistration { user_id } => {
            sqlx::query("DELETE FROM registrations WHERE user_id = $1 AND event_id = $2")
                .bind(user_id.value())
                .bind(event)
                .execute(&mut **tx)
                .await
        }
        LedgerOp::SetSeatState { user_id, state } => {
            let seat = SeatColumns::from(state);
            sqlx::query(
                "UPDATE registrations \
                 SET state = $3, decision_token = $4, receipt = $5, submitted_at = $6 \
                 WHERE user_id = $1 AND event_id = $2",
            )
            .bind(user_id.value())
            .bind(event)
            .bind(seat.state)
            .bind(seat.token)
            .bind(seat.receipt)
            .bind(seat.submitted_at)
            .execute(&mut **tx)
            .await
        }
        LedgerOp::IncrementConfirmed => {
            sqlx::query(
                "UPDATE events SET confirmed_count = confirmed_count + 1 \
                 WHERE id = $1 AND (capacity = 0 OR confirmed_count < capacity)",
            )
            .bind(event)
            .execute(&mut **tx)
            .await
        }
        LedgerOp::DecrementConfirmed => {
            sqlx::query(
                "UPDATE events SET confirmed_count = confirmed_count - 1 \
                 WHERE id = $1 AND confirmed_count > 0",
            )
            .bind(event)
            .execute(&mut **tx)
            .await
        }
        LedgerOp::CreatePayment(payment) => {
            sqlx::query(
                "INSERT INTO payments (user_id, event_id, amount, confirmed_at, confirmed_by) \
                 VALUES ($1, $2, $3, $4, $5)",
            )
            .bind(payment.user_id.value())
            .bind(event)
            .bind(to_i64(payment.amount.minor())?)
            .bind(payment.confirmed_at)
            .bind(payment.confirmed_by.value())
            .execute(&mut **tx)
            .await
        }
        LedgerOp::DeletePayment { user_id } => {
            sqlx::query("DELETE FROM payments WHERE user_id = $1 AND event_id = $2")
                .bind(user_id.value())
                .bind(event)
                .execute(&mut **tx)
                .await
        }
        LedgerOp::AddWaitlistEntry(entry) => {
            sqlx::query(
                "INSERT INTO waitlist_entries (user_id, event_id, added_at) VALUES ($1, $2, $3)",
            )
            .bind(entry.user_id.value())
            .bind(event)
            .bind(entry.added_at)
            .execute(&mut **tx)
            .await
        }
        LedgerOp::RemoveWaitlistEntry { user_id } => {
            sqlx::query("DELETE FROM waitlist_entries WHERE user_id = $1 AND event_id = $2")
                .bind(user_id.value())
                .bind(event)
                .execute(&mut **tx)
                .await
        }
        LedgerOp::DeactivateEvent(deactivation) => {
            sqlx::query(
                "UPDATE events SET active = FALSE, deactivation_reason = $2, deactivated_at = $3 \
                 WHERE id = $1",
            )
            .bind(event)
            .bind(&deactivation.reason)
            .bind(deactivation.at)
            .execute(&mut **tx)
            .await
        }
        LedgerOp::ReactivateEvent => {
            sqlx::query(
                "UPDATE events \
                 SET active = TRUE, deactivation_reason = NULL, deactivated_at = NULL \
                 WHERE id = $1",
            )
            .bind(event)
            .execute(&mut **tx)
            .await
        }
        LedgerOp::RecordRating(rating) => {
            sqlx::query(
                "INSERT INTO ratings (user_id, event_id, score, rated_at) VALUES ($1, $2, $3, $4)",
            )
            .bind(rating.user_id.value())
            .bind(event)
            .bind(i16::from(rating.score.value()))
            .bind(rating.rated_at)
            .execute(&mut **tx)
            .await
        }
    }
    .map_err(db_error)?
    .rows_affected();

    if affected == 0 {
        return Err(LedgerError::Constraint(format!(
            "{op:?} matched no row of event {event_id}"
        )));
    }
    Ok(())
}

/// Map sqlx errors, surfacing schema violations as constraint errors.
fn db_error(error: sqlx::Error) -> LedgerError {
    if let Some(db) = error.as_database_error() {
        if db.is_unique_violation() || db.is_check_violation() || db.is_foreign_key_violation() {
            return LedgerError::Constraint(db.message().to_string());
        }
    }
    LedgerError::Database(error.to_string())
}

impl LedgerStore for PostgresLedger {
    fn create_event(&self, event: Event) -> LedgerFuture<'_, ()> {
        Box::pin(async move {
            let (reason, deactivated_at) = event
                .deactivation
                .as_ref()
                .map(|d| (Some(d.reason.clone()), Some(d.at)))
                .unwrap_or_default();
            sqlx::query(&format!(
                "INSERT INTO events ({EVENT_COLUMNS}) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, 0)"
            ))
            .bind(event.id.as_uuid())
            .bind(&event.title)
            .bind(to_i32(event.capacity.to_stored())?)
            .bind(to_i32(event.confirmed_count)?)
            .bind(to_i64(event.cost.minor())?)
            .bind(&event.description)
            .bind(&event.location)
            .bind(event.active)
            .bind(reason)
            .bind(deactivated_at)
            .bind(event.starts_at)
            .bind(event.created_at)
            .execute(&self.pool)
            .await
            .map_err(db_error)?;

            tracing::info!(event_id = %event.id, title = %event.title, "Event stored");
            Ok(())
        })
    }

    fn get_event(&self, event_id: EventId) -> LedgerFuture<'_, Option<Event>> {
        Box::pin(self.fetch_event(event_id))
    }

    fn list_active_events(&self) -> LedgerFuture<'_, Vec<Event>> {
        Box::pin(async move {
            let rows: Vec<EventRow> = sqlx::query_as(&format!(
                "SELECT {EVENT_COLUMNS} FROM events WHERE active \
                 ORDER BY starts_at ASC NULLS LAST, created_at ASC"
            ))
            .fetch_all(&self.pool)
            .await
            .map_err(db_error)?;
            rows.into_iter().map(Event::try_from).collect()
        })
    }

    fn load(&self, event_id: EventId) -> LedgerFuture<'_, Option<EventLedger>> {
        Box::pin(self.load_ledger(event_id))
    }

    fn commit(
        &self,
        event_id: EventId,
        expected_version: Version,
        ops: Vec<LedgerOp>,
    ) -> LedgerFuture<'_, Version> {
        Box::pin(self.commit_ops(event_id, expected_version, ops))
    }

    fn registrations_for_user(&self, user_id: UserId) -> LedgerFuture<'_, Vec<Registration>> {
        Box::pin(async move {
            let rows: Vec<RegistrationRow> = sqlx::query_as(&format!(
                "SELECT {REGISTRATION_COLUMNS} FROM registrations \
                 WHERE user_id = $1 ORDER BY created_at, seq"
            ))
            .bind(user_id.value())
            .fetch_all(&self.pool)
            .await
            .map_err(db_error)?;
            rows.into_iter().map(Registration::try_from).collect()
        })
    }

    fn locate_decision(
        &self,
        token: DecisionToken,
    ) -> LedgerFuture<'_, Option<(EventId, UserId)>> {
        Box::pin(async move {
            let row: Option<(Uuid, i64)> = sqlx::query_as(
                "SELECT event_id, user_id FROM registrations \
                 WHERE decision_token = $1 AND state = 'awaiting_review'",
            )
            .bind(token.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?;
            Ok(row.map(|(event_id, user_id)| {
                (EventId::from_uuid(event_id), UserId::new(user_id))
            }))
        })
    }
}
