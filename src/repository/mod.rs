mod assignment_repository;
pub(crate) mod conversion;
mod extension_repository;
mod notification_repository;
mod review_relationship_repository;
mod user_repository;

pub use assignment_repository::{
    AssignmentRepository, CommitStep, CreateAssignmentError, CreatedAssignment,
};
pub use extension_repository::ExtensionRepository;
pub use notification_repository::{AttemptOutcome, NotificationRepository};
pub use review_relationship_repository::ReviewRelationshipRepository;
pub use user_repository::UserRepository;
