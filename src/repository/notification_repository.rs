use sqlx::{query, query_as, query_scalar, FromRow, Pool, Sqlite, SqliteConnection};

use crate::models::{types::UtcDateTime, Notification, NotificationId, NotificationKind};

use super::conversion::{DBConvertible, DBFromConversionError, DBToConversionError};

/// The outbox of messages waiting for the dispatcher.
pub struct NotificationRepository {
    pool: Pool<Sqlite>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AttemptOutcome {
    WillRetry,
    GaveUp,
}

impl NotificationRepository {
    pub fn new(pool: Pool<Sqlite>) -> NotificationRepository {
        NotificationRepository { pool }
    }

    pub async fn get_pending_notifications(
        &self,
        limit: u32,
    ) -> Result<Vec<Notification>, anyhow::Error> {
        let limit = limit.to_db()?;

        let notifications = query_as::<_, SqlNotification>(
            r#"
                SELECT id, recipient, event_type, payload, attempts, created_at
                FROM notification_outbox
                WHERE delivered_at IS NULL AND failed_at IS NULL
                ORDER BY id
                LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(notifications
            .iter()
            .map(Notification::from_db)
            .collect::<Result<_, _>>()?)
    }

    pub async fn mark_delivered(
        &self,
        id: NotificationId,
        delivered_at: UtcDateTime,
    ) -> Result<(), anyhow::Error> {
        let mut transaction = self.pool.begin().await?;

        let id = id.to_db()?;
        let delivered_at = delivered_at.to_db()?;
        query(
            r#"
                UPDATE notification_outbox
                SET delivered_at = $1, attempts = attempts + 1, last_error = NULL
                WHERE id = $2
            "#,
        )
        .bind(delivered_at)
        .bind(id)
        .execute(&mut *transaction)
        .await?;

        transaction.commit().await?;

        Ok(())
    }

    /// Records a failed delivery. After `max_attempts` failures the notification is given up on.
    pub async fn record_failed_attempt(
        &self,
        id: NotificationId,
        error: &str,
        failed_at: UtcDateTime,
        max_attempts: u32,
    ) -> Result<AttemptOutcome, anyhow::Error> {
        let mut transaction = self.pool.begin().await?;

        let id = id.to_db()?;
        let failed_at = failed_at.to_db()?;
        let max_attempts = max_attempts.to_db()?;

        let gave_up: bool = query_scalar(
            r#"
                UPDATE notification_outbox
                SET
                    attempts = attempts + 1,
                    last_error = $1,
                    failed_at = CASE WHEN attempts + 1 >= $2 THEN $3 ELSE NULL END
                WHERE id = $4
                RETURNING failed_at IS NOT NULL
            "#,
        )
        .bind(error)
        .bind(max_attempts)
        .bind(failed_at)
        .bind(id)
        .fetch_one(&mut *transaction)
        .await?;

        transaction.commit().await?;

        Ok(if gave_up {
            AttemptOutcome::GaveUp
        } else {
            AttemptOutcome::WillRetry
        })
    }
}

/// Inserts into the outbox on a connection the caller controls, so the message commits
/// or rolls back together with the caller's transaction.
pub(super) async fn insert_notification(
    connection: &mut SqliteConnection,
    recipient: &str,
    kind: NotificationKind,
    payload: &serde_json::Value,
    created_at: UtcDateTime,
) -> Result<NotificationId, anyhow::Error> {
    let kind = kind.to_db()?;
    let payload = payload.to_db()?;
    let created_at = created_at.to_db()?;

    let id: i64 = query_scalar(
        r#"
            INSERT INTO notification_outbox (recipient, event_type, payload, created_at)
            VALUES ($1, $2, $3, $4)
            RETURNING id
        "#,
    )
    .bind(recipient)
    .bind(kind)
    .bind(payload)
    .bind(created_at)
    .fetch_one(&mut *connection)
    .await?;

    Ok(NotificationId::from_db(&id)?)
}

#[derive(Debug, FromRow)]
pub struct SqlNotification {
    id: i64,
    recipient: String,
    event_type: String,
    payload: String,
    attempts: i64,
    created_at: String,
}

impl DBConvertible for Notification {
    type DBType = SqlNotification;

    fn to_db(&self) -> Result<Self::DBType, DBToConversionError> {
        Ok(SqlNotification {
            id: self.id.to_db()?,
            recipient: self.recipient.clone(),
            event_type: self.kind.to_db()?,
            payload: self.payload.to_db()?,
            attempts: self.attempts.to_db()?,
            created_at: self.created_at.to_db()?,
        })
    }

    fn from_db(value: &Self::DBType) -> Result<Self, DBFromConversionError> {
        Ok(Notification {
            id: NotificationId::from_db(&value.id)?,
            recipient: value.recipient.clone(),
            kind: NotificationKind::from_db(&value.event_type)?,
            payload: serde_json::Value::from_db(&value.payload)?,
            attempts: u32::from_db(&value.attempts)?,
            created_at: UtcDateTime::from_db(&value.created_at)?,
        })
    }
}
