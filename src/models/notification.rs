use serde::Serialize;
use strum::{Display, EnumString};

use super::{types::UtcDateTime, AssignmentId};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct NotificationId(pub i64);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum NotificationKind {
    ReviewAssigned,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Notification {
    pub id: NotificationId,
    pub recipient: String,
    pub kind: NotificationKind,
    pub payload: serde_json::Value,
    pub attempts: u32,
    pub created_at: UtcDateTime,
}

/// Payload of the [`NotificationKind::ReviewAssigned`] message.
#[derive(Clone, Debug, Serialize)]
pub struct AssignmentConfirmation {
    pub assignment_id: String,
    pub assignment_number: u64,
    pub extension_name: String,
    pub due_date: String,
}

impl AssignmentConfirmation {
    pub fn new(
        assignment_id: AssignmentId,
        assignment_number: u64,
        extension_name: &str,
        due_at: UtcDateTime,
    ) -> Result<AssignmentConfirmation, time::error::Format> {
        Ok(AssignmentConfirmation {
            assignment_id: assignment_id.to_string(),
            assignment_number,
            extension_name: extension_name.to_owned(),
            due_date: due_at.to_rfc3339()?,
        })
    }
}
