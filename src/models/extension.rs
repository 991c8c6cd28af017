use strum::{Display, EnumString};
use uuid::Uuid;

use super::{types::UtcDateTime, UserId};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ExtensionId(pub Uuid);

impl std::fmt::Display for ExtensionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle of a submitted extension.
///
/// Older rows may still carry `pending_verification`, which is read as [`ExtensionStatus::Queued`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum ExtensionStatus {
    Library,
    #[strum(to_string = "queued", serialize = "pending_verification")]
    Queued,
    Assigned,
    Reviewed,
    Rejected,
    Verified,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Extension {
    pub id: ExtensionId,
    pub owner_id: UserId,
    pub name: String,
    pub status: ExtensionStatus,
    pub submitted_to_queue_at: Option<UtcDateTime>,
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::ExtensionStatus;

    #[test]
    fn legacy_queue_name() {
        assert_eq!(
            ExtensionStatus::from_str("pending_verification").unwrap(),
            ExtensionStatus::Queued
        );
        assert_eq!(ExtensionStatus::Queued.to_string(), "queued");
    }

    #[test]
    fn snake_case_names() {
        assert_eq!(ExtensionStatus::Assigned.to_string(), "assigned");
        assert_eq!(
            ExtensionStatus::from_str("library").unwrap(),
            ExtensionStatus::Library
        );
        assert!(ExtensionStatus::from_str("archived").is_err());
    }
}
