use super::{types::UtcDateTime, ExtensionId, UserId};

/// A past pairing: `reviewer_id` has reviewed an extension owned by `reviewed_owner_id`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReviewRelationship {
    pub reviewer_id: UserId,
    pub reviewed_owner_id: UserId,
    pub extension_id: Option<ExtensionId>,
    pub created_at: UtcDateTime,
}
