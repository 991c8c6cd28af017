use thiserror::Error;
use time::{format_description::well_known::Iso8601, OffsetDateTime};
use uuid::Uuid;

use crate::models::{
    types::UtcDateTime, AssignmentId, AssignmentStatus, AssignmentType, BatchId, BatchStatus,
    ExtensionId, ExtensionStatus, NotificationId, NotificationKind, UserId,
};

pub trait DBConvertible: Sized {
    type DBType;

    fn to_db(&self) -> Result<Self::DBType, DBToConversionError>;

    fn from_db(value: &Self::DBType) -> Result<Self, DBFromConversionError>;
}

#[derive(Debug, Error)]
pub enum DBFromConversionError {
    #[error("Failed to parse datetime: {0}")]
    DateTime(#[from] time::error::Parse),
    #[error("Failed to parse enum variant: {0}")]
    NoSuchVariant(String),
    #[error("Invalid number: {0}")]
    InvalidNumber(i64),
    #[error("Invalid id: {0}")]
    InvalidId(#[from] uuid::Error),
    #[error("Invalid JSON payload: {0}")]
    Payload(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum DBToConversionError {
    #[error("Failed to format datetime")]
    DateTime(#[from] time::error::Format),
    #[error("Number does not fit into the database: {0}")]
    InvalidNumber(u64),
    #[error("Failed to serialize JSON payload: {0}")]
    Payload(#[from] serde_json::Error),
}

impl DBConvertible for UtcDateTime {
    type DBType = String;

    fn to_db(&self) -> Result<Self::DBType, DBToConversionError> {
        let string = OffsetDateTime::from(*self).format(&Iso8601::DEFAULT)?;
        Ok(string)
    }

    fn from_db(db_value: &Self::DBType) -> Result<Self, DBFromConversionError> {
        let datetime = OffsetDateTime::parse(db_value, &Iso8601::DEFAULT)?;
        Ok(UtcDateTime::from(datetime))
    }
}

impl<T: DBConvertible> DBConvertible for Option<T> {
    type DBType = Option<T::DBType>;

    fn to_db(&self) -> Result<Self::DBType, DBToConversionError> {
        self.as_ref().map(T::to_db).transpose()
    }

    fn from_db(value: &Self::DBType) -> Result<Self, DBFromConversionError> {
        value.as_ref().map(T::from_db).transpose()
    }
}

macro_rules! uuid_convertible {
    ($($id:ident),* $(,)?) => {
        $(
            impl DBConvertible for $id {
                type DBType = String;

                fn to_db(&self) -> Result<Self::DBType, DBToConversionError> {
                    Ok(self.0.hyphenated().to_string())
                }

                fn from_db(value: &Self::DBType) -> Result<Self, DBFromConversionError> {
                    Ok($id(Uuid::parse_str(value)?))
                }
            }
        )*
    };
}

uuid_convertible!(UserId, ExtensionId, BatchId, AssignmentId);

/// Enums are stored by their snake_case name.
macro_rules! name_convertible {
    ($($kind:ident),* $(,)?) => {
        $(
            impl DBConvertible for $kind {
                type DBType = String;

                fn to_db(&self) -> Result<Self::DBType, DBToConversionError> {
                    Ok(self.to_string())
                }

                fn from_db(value: &Self::DBType) -> Result<Self, DBFromConversionError> {
                    value
                        .parse()
                        .map_err(|_| DBFromConversionError::NoSuchVariant(value.clone()))
                }
            }
        )*
    };
}

name_convertible!(
    ExtensionStatus,
    AssignmentStatus,
    AssignmentType,
    BatchStatus,
    NotificationKind,
);

impl DBConvertible for NotificationId {
    type DBType = i64;

    fn to_db(&self) -> Result<Self::DBType, DBToConversionError> {
        Ok(self.0)
    }

    fn from_db(value: &Self::DBType) -> Result<Self, DBFromConversionError> {
        Ok(NotificationId(*value))
    }
}

impl DBConvertible for u64 {
    type DBType = i64;

    fn to_db(&self) -> Result<Self::DBType, DBToConversionError> {
        i64::try_from(*self).map_err(|_| DBToConversionError::InvalidNumber(*self))
    }

    fn from_db(value: &Self::DBType) -> Result<Self, DBFromConversionError> {
        u64::try_from(*value).map_err(|_| DBFromConversionError::InvalidNumber(*value))
    }
}

impl DBConvertible for u32 {
    type DBType = i64;

    fn to_db(&self) -> Result<Self::DBType, DBToConversionError> {
        Ok(*self as _)
    }

    fn from_db(value: &Self::DBType) -> Result<Self, DBFromConversionError> {
        u32::try_from(*value).map_err(|_| DBFromConversionError::InvalidNumber(*value))
    }
}

impl DBConvertible for serde_json::Value {
    type DBType = String;

    fn to_db(&self) -> Result<Self::DBType, DBToConversionError> {
        Ok(serde_json::to_string(self)?)
    }

    fn from_db(value: &Self::DBType) -> Result<Self, DBFromConversionError> {
        Ok(serde_json::from_str(value)?)
    }
}
