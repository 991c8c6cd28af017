use sqlx::{query_as, FromRow, Pool, Sqlite};

use crate::models::{types::UtcDateTime, ExtensionId, ReviewRelationship, UserId};

use super::conversion::{DBConvertible, DBFromConversionError, DBToConversionError};

pub struct ReviewRelationshipRepository {
    pool: Pool<Sqlite>,
}

impl ReviewRelationshipRepository {
    pub fn new(pool: Pool<Sqlite>) -> ReviewRelationshipRepository {
        ReviewRelationshipRepository { pool }
    }

    pub async fn get_relationships(
        &self,
        reviewer: UserId,
    ) -> Result<Vec<ReviewRelationship>, anyhow::Error> {
        let reviewer = reviewer.to_db()?;

        let relationships = query_as::<_, SqlReviewRelationship>(
            r#"
                SELECT reviewer_id, reviewed_owner_id, extension_id, created_at
                FROM review_relationships
                WHERE reviewer_id = $1
                ORDER BY created_at
            "#,
        )
        .bind(reviewer)
        .fetch_all(&self.pool)
        .await?;

        Ok(relationships
            .iter()
            .map(ReviewRelationship::from_db)
            .collect::<Result<_, _>>()?)
    }
}

#[derive(Debug, FromRow)]
pub struct SqlReviewRelationship {
    reviewer_id: String,
    reviewed_owner_id: String,
    extension_id: Option<String>,
    created_at: String,
}

impl DBConvertible for ReviewRelationship {
    type DBType = SqlReviewRelationship;

    fn to_db(&self) -> Result<Self::DBType, DBToConversionError> {
        Ok(SqlReviewRelationship {
            reviewer_id: self.reviewer_id.to_db()?,
            reviewed_owner_id: self.reviewed_owner_id.to_db()?,
            extension_id: self.extension_id.to_db()?,
            created_at: self.created_at.to_db()?,
        })
    }

    fn from_db(value: &Self::DBType) -> Result<Self, DBFromConversionError> {
        Ok(ReviewRelationship {
            reviewer_id: UserId::from_db(&value.reviewer_id)?,
            reviewed_owner_id: UserId::from_db(&value.reviewed_owner_id)?,
            extension_id: Option::<ExtensionId>::from_db(&value.extension_id)?,
            created_at: UtcDateTime::from_db(&value.created_at)?,
        })
    }
}
