use sqlx::{query_as, FromRow, Pool, Sqlite};

use crate::models::{User, UserId};

use super::conversion::{DBConvertible, DBFromConversionError, DBToConversionError};

pub struct UserRepository {
    pool: Pool<Sqlite>,
}

impl UserRepository {
    pub fn new(pool: Pool<Sqlite>) -> UserRepository {
        UserRepository { pool }
    }

    pub async fn get_user(&self, id: UserId) -> Result<Option<User>, anyhow::Error> {
        let id = id.to_db()?;

        let user = query_as::<_, SqlUser>(
            r#"
                SELECT id, email, has_completed_qualification
                FROM users
                WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        match user {
            Some(user) => Ok(Some(User::from_db(&user)?)),
            None => Ok(None),
        }
    }
}

#[derive(Debug, FromRow)]
pub struct SqlUser {
    id: String,
    email: String,
    has_completed_qualification: bool,
}

impl DBConvertible for User {
    type DBType = SqlUser;

    fn to_db(&self) -> Result<Self::DBType, DBToConversionError> {
        Ok(SqlUser {
            id: self.id.to_db()?,
            email: self.email.clone(),
            has_completed_qualification: self.has_completed_qualification,
        })
    }

    fn from_db(value: &Self::DBType) -> Result<Self, DBFromConversionError> {
        Ok(User {
            id: UserId::from_db(&value.id)?,
            email: value.email.clone(),
            has_completed_qualification: value.has_completed_qualification,
        })
    }
}
