use std::{collections::HashSet, sync::Arc};

use time::Duration;
use tokio::sync::Notify;
use tracing::{debug, error, info, warn};

use crate::{
    models::{types::UtcDateTime, AssignmentId, ExtensionId, NewAssignment, UserId},
    repository::{
        AssignmentRepository, CreateAssignmentError, ExtensionRepository,
        ReviewRelationshipRepository, UserRepository,
    },
    utils::candidate_selection::{select_next_extension, Selection},
};

const NOT_QUALIFIED: &str = "You must complete the qualification before requesting assignments";
const ACTIVE_ASSIGNMENT: &str =
    "You already have an active assignment. Please complete it before requesting a new one.";
const NOTHING_QUEUED: &str = "No extensions available for review at this time";
const ALL_OWNERS_REVIEWED: &str =
    "No new extensions available. You have already reviewed all available developers.";
const QUEUE_CONTENDED: &str =
    "Extensions are being assigned to other reviewers right now. Please try again.";

#[derive(Clone, Copy, Debug)]
pub struct AssignmentPolicy {
    /// How many assignments in `assigned` status a reviewer may hold at once.
    pub max_active_assignments: u32,
    pub review_window: Duration,
    /// How many times to re-select after another request claimed the chosen extension first.
    pub max_claim_attempts: u32,
}

impl Default for AssignmentPolicy {
    fn default() -> Self {
        AssignmentPolicy {
            max_active_assignments: 1,
            review_window: Duration::hours(48),
            max_claim_attempts: 3,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AssignmentOutcome {
    pub assignment_id: AssignmentId,
    pub assignment_number: u64,
    pub extension_name: String,
    pub due_at: UtcDateTime,
    /// `due_at` in RFC 3339, as sent in the confirmation.
    pub due_date: String,
}

#[derive(thiserror::Error, Debug)]
pub enum AssignmentError {
    #[error("{message}")]
    Validation { message: String },
    #[error("{message}")]
    NotFound { message: String },
    #[error("{message}")]
    PreconditionFailed { message: String },
    #[error("{message}")]
    Conflict { message: String },
    #[error("{message}")]
    Internal { message: String, details: String },
}

pub fn validation_err(message: impl Into<String>) -> AssignmentError {
    AssignmentError::Validation {
        message: message.into(),
    }
}

fn not_found(message: impl Into<String>) -> AssignmentError {
    AssignmentError::NotFound {
        message: message.into(),
    }
}

fn precondition_failed(message: impl Into<String>) -> AssignmentError {
    AssignmentError::PreconditionFailed {
        message: message.into(),
    }
}

fn conflict(message: impl Into<String>) -> AssignmentError {
    AssignmentError::Conflict {
        message: message.into(),
    }
}

/// Logs the underlying error and hides it behind a generic message.
fn internal_err(message: &str, err: impl std::fmt::Display) -> AssignmentError {
    error!("{message}: {err:#}");
    AssignmentError::Internal {
        message: message.to_owned(),
        details: err.to_string(),
    }
}

/// Hands out queued extensions to reviewers, one assignment per request.
pub struct AssignmentService {
    user_repository: Arc<UserRepository>,
    extension_repository: Arc<ExtensionRepository>,
    review_relationship_repository: Arc<ReviewRelationshipRepository>,
    assignment_repository: Arc<AssignmentRepository>,
    notification_wakeup: Arc<Notify>,
    policy: AssignmentPolicy,
}

impl AssignmentService {
    pub fn new(
        user_repository: Arc<UserRepository>,
        extension_repository: Arc<ExtensionRepository>,
        review_relationship_repository: Arc<ReviewRelationshipRepository>,
        assignment_repository: Arc<AssignmentRepository>,
        notification_wakeup: Arc<Notify>,
        policy: AssignmentPolicy,
    ) -> AssignmentService {
        AssignmentService {
            user_repository,
            extension_repository,
            review_relationship_repository,
            assignment_repository,
            notification_wakeup,
            policy,
        }
    }

    #[tracing::instrument(skip(self))]
    pub async fn request_assignment(
        &self,
        reviewer_id: UserId,
    ) -> Result<AssignmentOutcome, AssignmentError> {
        let reviewer = self
            .user_repository
            .get_user(reviewer_id)
            .await
            .map_err(|err| internal_err("Could not load the reviewer", err))?
            .ok_or_else(|| not_found("User not found"))?;

        if !reviewer.has_completed_qualification {
            return Err(precondition_failed(NOT_QUALIFIED));
        }

        {
            let active = self
                .assignment_repository
                .get_active_assignments(reviewer.id)
                .await
                .map_err(|err| internal_err("Could not check active assignments", err))?;

            if active.len() >= self.policy.max_active_assignments as usize {
                let numbers = active
                    .iter()
                    .map(|a| format!("#{}", a.assignment_number))
                    .collect::<Vec<String>>()
                    .join(", ");
                debug!("Reviewer already holds active assignments: {numbers}");
                return Err(conflict(ACTIVE_ASSIGNMENT));
            }
        }

        let reviewed_owners = self
            .review_relationship_repository
            .get_relationships(reviewer.id)
            .await
            .map_err(|err| internal_err("Could not load review history", err))?
            .into_iter()
            .map(|relationship| relationship.reviewed_owner_id)
            .collect::<HashSet<UserId>>();

        let mut lost_claims = HashSet::<ExtensionId>::new();

        for attempt in 1..=self.policy.max_claim_attempts {
            // Read the queue again on every attempt; competing requests have moved it on.
            let mut candidates = self
                .extension_repository
                .get_queued_extensions(reviewer.id)
                .await
                .map_err(|err| internal_err("Could not load queued extensions", err))?;
            candidates.retain(|candidate| !lost_claims.contains(&candidate.id));

            let extension = match select_next_extension(&candidates, reviewer.id, &reviewed_owners)
            {
                Selection::Selected(extension) => extension.clone(),
                Selection::NothingQueued => return Err(not_found(NOTHING_QUEUED)),
                Selection::AllOwnersReviewed => return Err(not_found(ALL_OWNERS_REVIEWED)),
            };

            debug!(
                "Selected extension {} ({}) on attempt {attempt}",
                extension.id, extension.name
            );

            let assigned_at = UtcDateTime::now();
            let due_at = assigned_at
                .checked_add(self.policy.review_window)
                .ok_or_else(|| {
                    internal_err(
                        "Could not compute the due date",
                        format!("review window of {} is out of range", self.policy.review_window),
                    )
                })?;

            let new_assignment = NewAssignment {
                reviewer_id: reviewer.id,
                reviewer_email: reviewer.email.clone(),
                extension_id: extension.id,
                extension_name: extension.name.clone(),
                assigned_at,
                due_at,
            };

            match self
                .assignment_repository
                .create_assignment(&new_assignment, self.policy.max_active_assignments)
                .await
            {
                Ok(created) => {
                    info!(
                        "Assigned extension {} to reviewer {} as #{} (batch {:?}, notification {:?})",
                        extension.id,
                        reviewer.id,
                        created.assignment.assignment_number,
                        created.batch.id,
                        created.notification_id,
                    );

                    // Stored permit: the dispatcher picks it up even if it is busy right now.
                    self.notification_wakeup.notify_one();

                    return Ok(AssignmentOutcome {
                        assignment_id: created.assignment.id,
                        assignment_number: created.assignment.assignment_number,
                        extension_name: extension.name,
                        due_at: created.assignment.due_at,
                        due_date: created.confirmation.due_date,
                    });
                }

                Err(CreateAssignmentError::ExtensionUnavailable(id)) => {
                    warn!("Extension {id} was claimed by another request, selecting again");
                    lost_claims.insert(id);
                }

                Err(CreateAssignmentError::ActiveLimitReached { active, .. }) => {
                    warn!("Concurrent request left the reviewer with {active} active assignments");
                    return Err(conflict(ACTIVE_ASSIGNMENT));
                }

                Err(err @ CreateAssignmentError::Store { .. }) => {
                    return Err(internal_err("Could not create the assignment", err));
                }
            }
        }

        warn!(
            "Gave up after {} lost claims",
            self.policy.max_claim_attempts
        );
        Err(conflict(QUEUE_CONTENDED))
    }
}
