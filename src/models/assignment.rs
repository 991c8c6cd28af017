use strum::{Display, EnumString};
use uuid::Uuid;

use super::{types::UtcDateTime, ExtensionId, UserId};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BatchId(pub Uuid);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct AssignmentId(pub Uuid);

impl std::fmt::Display for AssignmentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum AssignmentType {
    Single,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum BatchStatus {
    Active,
    Completed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum AssignmentStatus {
    Assigned,
    Submitted,
    Approved,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AssignmentBatch {
    pub id: BatchId,
    pub reviewer_id: UserId,
    pub assignment_type: AssignmentType,
    pub status: BatchStatus,
    pub created_at: UtcDateTime,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReviewAssignment {
    pub id: AssignmentId,
    pub batch_id: BatchId,
    pub extension_id: ExtensionId,
    pub reviewer_id: UserId,
    pub assignment_number: u64,
    pub assigned_at: UtcDateTime,
    pub due_at: UtcDateTime,
    pub status: AssignmentStatus,
}

/// Everything needed to commit one assignment; ids and the sequence number are allocated on insert.
#[derive(Clone, Debug)]
pub struct NewAssignment {
    pub reviewer_id: UserId,
    pub reviewer_email: String,
    pub extension_id: ExtensionId,
    pub extension_name: String,
    pub assigned_at: UtcDateTime,
    pub due_at: UtcDateTime,
}
