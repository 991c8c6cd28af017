mod assignment;
mod extension;
mod notification;
mod review_relationship;
mod user;

pub mod types;

pub use assignment::{
    AssignmentBatch, AssignmentId, AssignmentStatus, AssignmentType, BatchId, BatchStatus,
    NewAssignment, ReviewAssignment,
};
pub use extension::{Extension, ExtensionId, ExtensionStatus};
pub use notification::{AssignmentConfirmation, Notification, NotificationId, NotificationKind};
pub use review_relationship::ReviewRelationship;
pub use user::{User, UserId};
