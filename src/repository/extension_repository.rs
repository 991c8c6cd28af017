use sqlx::{query_as, FromRow, Pool, Sqlite};

use crate::models::{types::UtcDateTime, Extension, ExtensionId, ExtensionStatus, UserId};

use super::conversion::{DBConvertible, DBFromConversionError, DBToConversionError};

pub struct ExtensionRepository {
    pool: Pool<Sqlite>,
}

impl ExtensionRepository {
    pub fn new(pool: Pool<Sqlite>) -> ExtensionRepository {
        ExtensionRepository { pool }
    }

    /// Queued extensions not owned by `reviewer`, oldest submission first.
    pub async fn get_queued_extensions(
        &self,
        reviewer: UserId,
    ) -> Result<Vec<Extension>, anyhow::Error> {
        let reviewer = reviewer.to_db()?;

        let extensions = query_as::<_, SqlExtension>(
            r#"
                SELECT id, owner_id, name, status, submitted_to_queue_at
                FROM extensions
                WHERE status IN ('queued', 'pending_verification') AND owner_id <> $1
                ORDER BY submitted_to_queue_at IS NULL, submitted_to_queue_at, id
            "#,
        )
        .bind(reviewer)
        .fetch_all(&self.pool)
        .await?;

        Ok(extensions
            .iter()
            .map(Extension::from_db)
            .collect::<Result<_, _>>()?)
    }
}

#[derive(Debug, FromRow)]
pub struct SqlExtension {
    id: String,
    owner_id: String,
    name: String,
    status: String,
    submitted_to_queue_at: Option<String>,
}

impl DBConvertible for Extension {
    type DBType = SqlExtension;

    fn to_db(&self) -> Result<Self::DBType, DBToConversionError> {
        Ok(SqlExtension {
            id: self.id.to_db()?,
            owner_id: self.owner_id.to_db()?,
            name: self.name.clone(),
            status: self.status.to_db()?,
            submitted_to_queue_at: self.submitted_to_queue_at.to_db()?,
        })
    }

    fn from_db(value: &Self::DBType) -> Result<Self, DBFromConversionError> {
        Ok(Extension {
            id: ExtensionId::from_db(&value.id)?,
            owner_id: UserId::from_db(&value.owner_id)?,
            name: value.name.clone(),
            status: ExtensionStatus::from_db(&value.status)?,
            submitted_to_queue_at: Option::<UtcDateTime>::from_db(&value.submitted_to_queue_at)?,
        })
    }
}
