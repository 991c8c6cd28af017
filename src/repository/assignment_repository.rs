use sqlx::{query, query_as, query_scalar, FromRow, Pool, Sqlite};
use strum::Display;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{
    types::UtcDateTime, AssignmentBatch, AssignmentConfirmation, AssignmentId, AssignmentStatus,
    AssignmentType, BatchId, BatchStatus, ExtensionId, ExtensionStatus, NewAssignment,
    NotificationId, NotificationKind, ReviewAssignment, UserId,
};

use super::{
    conversion::{DBConvertible, DBFromConversionError, DBToConversionError},
    notification_repository::insert_notification,
};

pub struct AssignmentRepository {
    pool: Pool<Sqlite>,
}

#[derive(Debug)]
pub struct CreatedAssignment {
    pub batch: AssignmentBatch,
    pub assignment: ReviewAssignment,
    /// The payload that was enqueued for the reviewer.
    pub confirmation: AssignmentConfirmation,
    pub notification_id: NotificationId,
}

/// The write that failed while committing an assignment.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Display)]
pub enum CommitStep {
    #[strum(to_string = "begin the transaction")]
    BeginTransaction,
    #[strum(to_string = "create the assignment batch")]
    CreateBatch,
    #[strum(to_string = "allocate the assignment number")]
    AllocateNumber,
    #[strum(to_string = "create the review assignment")]
    CreateAssignment,
    #[strum(to_string = "mark the extension as assigned")]
    ClaimExtension,
    #[strum(to_string = "count active assignments")]
    CountActive,
    #[strum(to_string = "enqueue the assignment notification")]
    EnqueueNotification,
    #[strum(to_string = "commit the transaction")]
    Commit,
}

#[derive(Debug, Error)]
pub enum CreateAssignmentError {
    #[error("Extension {0} is no longer queued")]
    ExtensionUnavailable(ExtensionId),
    #[error("Reviewer {reviewer} would have {active} active assignments")]
    ActiveLimitReached { reviewer: UserId, active: u32 },
    #[error("Could not {step}: {source}")]
    Store {
        step: CommitStep,
        #[source]
        source: anyhow::Error,
    },
}

fn store_err<E: Into<anyhow::Error>>(step: CommitStep) -> impl FnOnce(E) -> CreateAssignmentError {
    move |err| CreateAssignmentError::Store {
        step,
        source: err.into(),
    }
}

impl AssignmentRepository {
    pub fn new(pool: Pool<Sqlite>) -> AssignmentRepository {
        AssignmentRepository { pool }
    }

    pub async fn get_active_assignments(
        &self,
        reviewer: UserId,
    ) -> Result<Vec<ReviewAssignment>, anyhow::Error> {
        let reviewer = reviewer.to_db()?;
        let status = AssignmentStatus::Assigned.to_db()?;

        let assignments = query_as::<_, SqlReviewAssignment>(
            r#"
                SELECT
                    id,
                    batch_id,
                    extension_id,
                    reviewer_id,
                    assignment_number,
                    assigned_at,
                    due_at,
                    status
                FROM review_assignments
                WHERE reviewer_id = $1 AND status = $2
                ORDER BY assignment_number
            "#,
        )
        .bind(reviewer)
        .bind(status)
        .fetch_all(&self.pool)
        .await?;

        Ok(assignments
            .iter()
            .map(ReviewAssignment::from_db)
            .collect::<Result<_, _>>()?)
    }

    /// Creates the batch, the assignment and its notification, and claims the extension,
    /// all in one transaction. Nothing is written unless every step succeeds.
    ///
    /// The extension is claimed only if it is still queued, and the reviewer's active
    /// assignments are re-counted under the write lock, so concurrent requests cannot
    /// double-assign an extension or push a reviewer over `max_active_assignments`.
    #[tracing::instrument(skip(self, new_assignment), fields(reviewer = %new_assignment.reviewer_id, extension = %new_assignment.extension_id))]
    pub async fn create_assignment(
        &self,
        new_assignment: &NewAssignment,
        max_active_assignments: u32,
    ) -> Result<CreatedAssignment, CreateAssignmentError> {
        use CommitStep::*;

        let mut transaction = self.pool.begin().await.map_err(store_err(BeginTransaction))?;

        let batch = AssignmentBatch {
            id: BatchId(Uuid::new_v4()),
            reviewer_id: new_assignment.reviewer_id,
            assignment_type: AssignmentType::Single,
            status: BatchStatus::Active,
            created_at: new_assignment.assigned_at,
        };

        {
            let row = batch.to_db().map_err(store_err(CreateBatch))?;

            query(
                r#"
                    INSERT INTO assignment_batches (id, reviewer_id, assignment_type, status, created_at)
                    VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(row.id)
            .bind(row.reviewer_id)
            .bind(row.assignment_type)
            .bind(row.status)
            .bind(row.created_at)
            .execute(&mut *transaction)
            .await
            .map_err(store_err(CreateBatch))?;
        }

        // Rows inserted by other means may be ahead of the counter.
        let assignment_number = {
            let number: i64 = query_scalar(
                r#"
                    UPDATE sequences
                    SET value = MAX(
                        value,
                        (SELECT COALESCE(MAX(assignment_number), 0) FROM review_assignments)
                    ) + 1
                    WHERE name = 'assignment_number'
                    RETURNING value
                "#,
            )
            .fetch_one(&mut *transaction)
            .await
            .map_err(store_err(AllocateNumber))?;

            u64::from_db(&number).map_err(store_err(AllocateNumber))?
        };

        let assignment = ReviewAssignment {
            id: AssignmentId(Uuid::new_v4()),
            batch_id: batch.id,
            extension_id: new_assignment.extension_id,
            reviewer_id: new_assignment.reviewer_id,
            assignment_number,
            assigned_at: new_assignment.assigned_at,
            due_at: new_assignment.due_at,
            status: AssignmentStatus::Assigned,
        };

        {
            let row = assignment.to_db().map_err(store_err(CreateAssignment))?;

            query(
                r#"
                    INSERT INTO review_assignments (
                        id,
                        batch_id,
                        extension_id,
                        reviewer_id,
                        assignment_number,
                        assigned_at,
                        due_at,
                        status)
                    VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                "#,
            )
            .bind(row.id)
            .bind(row.batch_id)
            .bind(row.extension_id)
            .bind(row.reviewer_id)
            .bind(row.assignment_number)
            .bind(row.assigned_at)
            .bind(row.due_at)
            .bind(row.status)
            .execute(&mut *transaction)
            .await
            .map_err(store_err(CreateAssignment))?;
        }

        {
            let extension_id = new_assignment
                .extension_id
                .to_db()
                .map_err(store_err(ClaimExtension))?;
            let assigned = ExtensionStatus::Assigned
                .to_db()
                .map_err(store_err(ClaimExtension))?;

            let claimed = query(
                r#"
                    UPDATE extensions
                    SET status = $1
                    WHERE id = $2 AND status IN ('queued', 'pending_verification')
                "#,
            )
            .bind(assigned)
            .bind(extension_id)
            .execute(&mut *transaction)
            .await
            .map_err(store_err(ClaimExtension))?
            .rows_affected();

            if claimed == 0 {
                return Err(CreateAssignmentError::ExtensionUnavailable(
                    new_assignment.extension_id,
                ));
            }
        }

        {
            let reviewer = new_assignment
                .reviewer_id
                .to_db()
                .map_err(store_err(CountActive))?;
            let status = AssignmentStatus::Assigned
                .to_db()
                .map_err(store_err(CountActive))?;

            let active: i64 = query_scalar(
                r#"
                    SELECT COUNT(*) FROM review_assignments
                    WHERE reviewer_id = $1 AND status = $2
                "#,
            )
            .bind(reviewer)
            .bind(status)
            .fetch_one(&mut *transaction)
            .await
            .map_err(store_err(CountActive))?;

            let active = u32::from_db(&active).map_err(store_err(CountActive))?;
            if active > max_active_assignments {
                return Err(CreateAssignmentError::ActiveLimitReached {
                    reviewer: new_assignment.reviewer_id,
                    active,
                });
            }
        }

        let confirmation = AssignmentConfirmation::new(
            assignment.id,
            assignment.assignment_number,
            &new_assignment.extension_name,
            assignment.due_at,
        )
        .map_err(store_err(EnqueueNotification))?;

        let notification_id = {
            let payload =
                serde_json::to_value(&confirmation).map_err(store_err(EnqueueNotification))?;

            insert_notification(
                &mut *transaction,
                &new_assignment.reviewer_email,
                NotificationKind::ReviewAssigned,
                &payload,
                new_assignment.assigned_at,
            )
            .await
            .map_err(store_err(EnqueueNotification))?
        };

        transaction.commit().await.map_err(store_err(Commit))?;

        Ok(CreatedAssignment {
            batch,
            assignment,
            confirmation,
            notification_id,
        })
    }
}

#[derive(Debug)]
pub struct SqlAssignmentBatch {
    id: String,
    reviewer_id: String,
    assignment_type: String,
    status: String,
    created_at: String,
}

impl DBConvertible for AssignmentBatch {
    type DBType = SqlAssignmentBatch;

    fn to_db(&self) -> Result<Self::DBType, DBToConversionError> {
        Ok(SqlAssignmentBatch {
            id: self.id.to_db()?,
            reviewer_id: self.reviewer_id.to_db()?,
            assignment_type: self.assignment_type.to_db()?,
            status: self.status.to_db()?,
            created_at: self.created_at.to_db()?,
        })
    }

    fn from_db(value: &Self::DBType) -> Result<Self, DBFromConversionError> {
        Ok(AssignmentBatch {
            id: BatchId::from_db(&value.id)?,
            reviewer_id: UserId::from_db(&value.reviewer_id)?,
            assignment_type: AssignmentType::from_db(&value.assignment_type)?,
            status: BatchStatus::from_db(&value.status)?,
            created_at: UtcDateTime::from_db(&value.created_at)?,
        })
    }
}

#[derive(Debug, FromRow)]
pub struct SqlReviewAssignment {
    id: String,
    batch_id: String,
    extension_id: String,
    reviewer_id: String,
    assignment_number: i64,
    assigned_at: String,
    due_at: String,
    status: String,
}

impl DBConvertible for ReviewAssignment {
    type DBType = SqlReviewAssignment;

    fn to_db(&self) -> Result<Self::DBType, DBToConversionError> {
        Ok(SqlReviewAssignment {
            id: self.id.to_db()?,
            batch_id: self.batch_id.to_db()?,
            extension_id: self.extension_id.to_db()?,
            reviewer_id: self.reviewer_id.to_db()?,
            assignment_number: self.assignment_number.to_db()?,
            assigned_at: self.assigned_at.to_db()?,
            due_at: self.due_at.to_db()?,
            status: self.status.to_db()?,
        })
    }

    fn from_db(value: &Self::DBType) -> Result<Self, DBFromConversionError> {
        Ok(ReviewAssignment {
            id: AssignmentId::from_db(&value.id)?,
            batch_id: BatchId::from_db(&value.batch_id)?,
            extension_id: ExtensionId::from_db(&value.extension_id)?,
            reviewer_id: UserId::from_db(&value.reviewer_id)?,
            assignment_number: u64::from_db(&value.assignment_number)?,
            assigned_at: UtcDateTime::from_db(&value.assigned_at)?,
            due_at: UtcDateTime::from_db(&value.due_at)?,
            status: AssignmentStatus::from_db(&value.status)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use time::{macros::datetime, Duration};

    use super::{AssignmentRepository, CommitStep, CreateAssignmentError};
    use crate::{
        models::{
            types::UtcDateTime, AssignmentStatus, AssignmentType, BatchStatus, ExtensionId,
            NewAssignment, UserId,
        },
        test_utils,
    };

    fn new_assignment(reviewer: UserId, extension_id: ExtensionId) -> NewAssignment {
        let assigned_at = UtcDateTime::assume_utc(datetime!(2024-05-01 10:00:00));
        NewAssignment {
            reviewer_id: reviewer,
            reviewer_email: "reviewer@example.com".to_string(),
            extension_id,
            extension_name: "Tab Tamer".to_string(),
            assigned_at,
            due_at: assigned_at.checked_add(Duration::hours(48)).unwrap(),
        }
    }

    #[test_log::test(tokio::test)]
    async fn creates_everything_in_one_go() {
        let pool = test_utils::setup_database().await;
        let reviewer = test_utils::add_user(&pool, "reviewer@example.com", true).await;
        let owner = test_utils::add_user(&pool, "owner@example.com", true).await;
        let extension = test_utils::add_extension(&pool, owner, "Tab Tamer", "queued", None).await;

        let repository = AssignmentRepository::new(pool.clone());
        let created = repository
            .create_assignment(&new_assignment(reviewer, extension), 1)
            .await
            .unwrap();

        assert_eq!(created.batch.reviewer_id, reviewer);
        assert_eq!(created.batch.assignment_type, AssignmentType::Single);
        assert_eq!(created.batch.status, BatchStatus::Active);
        assert_eq!(created.assignment.batch_id, created.batch.id);
        assert_eq!(created.assignment.assignment_number, 1);
        assert_eq!(created.assignment.status, AssignmentStatus::Assigned);
        assert_eq!(created.confirmation.assignment_number, 1);
        assert_eq!(created.confirmation.due_date, "2024-05-03T10:00:00Z");

        assert_eq!(test_utils::count_rows(&pool, "assignment_batches").await, 1);
        assert_eq!(test_utils::count_rows(&pool, "review_assignments").await, 1);
        assert_eq!(test_utils::count_rows(&pool, "notification_outbox").await, 1);
        assert_eq!(test_utils::extension_status(&pool, extension).await, "assigned");

        let active = repository.get_active_assignments(reviewer).await.unwrap();
        assert_eq!(active, vec![created.assignment]);
    }

    #[test_log::test(tokio::test)]
    async fn number_follows_previous_maximum() {
        let pool = test_utils::setup_database().await;
        let reviewer = test_utils::add_user(&pool, "reviewer@example.com", true).await;
        let other_reviewer = test_utils::add_user(&pool, "other@example.com", true).await;
        let owner = test_utils::add_user(&pool, "owner@example.com", true).await;
        let imported = test_utils::add_extension(&pool, owner, "Imported", "reviewed", None).await;
        let extension = test_utils::add_extension(&pool, owner, "Tab Tamer", "queued", None).await;
        test_utils::add_assignment(&pool, other_reviewer, imported, 41, "approved").await;

        let repository = AssignmentRepository::new(pool);
        let created = repository
            .create_assignment(&new_assignment(reviewer, extension), 1)
            .await
            .unwrap();

        assert_eq!(created.assignment.assignment_number, 42);
    }

    #[test_log::test(tokio::test)]
    async fn numbers_keep_increasing() {
        let pool = test_utils::setup_database().await;
        let owner = test_utils::add_user(&pool, "owner@example.com", true).await;
        let repository = AssignmentRepository::new(pool.clone());

        let mut numbers = vec![];
        for i in 0..3 {
            let reviewer = test_utils::add_user(&pool, &format!("reviewer{i}@example.com"), true).await;
            let extension = test_utils::add_extension(&pool, owner, "Extension", "queued", None).await;
            let created = repository
                .create_assignment(&new_assignment(reviewer, extension), 1)
                .await
                .unwrap();
            numbers.push(created.assignment.assignment_number);
        }

        assert_eq!(numbers, vec![1, 2, 3]);
    }

    #[test_log::test(tokio::test)]
    async fn claimed_extension_is_not_assigned_twice() {
        let pool = test_utils::setup_database().await;
        let reviewer = test_utils::add_user(&pool, "reviewer@example.com", true).await;
        let owner = test_utils::add_user(&pool, "owner@example.com", true).await;
        let extension = test_utils::add_extension(&pool, owner, "Tab Tamer", "assigned", None).await;

        let repository = AssignmentRepository::new(pool.clone());
        let result = repository
            .create_assignment(&new_assignment(reviewer, extension), 1)
            .await;

        assert!(matches!(
            result,
            Err(CreateAssignmentError::ExtensionUnavailable(id)) if id == extension
        ));
        assert_eq!(test_utils::count_rows(&pool, "assignment_batches").await, 0);
        assert_eq!(test_utils::count_rows(&pool, "review_assignments").await, 0);
        assert_eq!(test_utils::count_rows(&pool, "notification_outbox").await, 0);
    }

    #[test_log::test(tokio::test)]
    async fn active_limit_is_rechecked() {
        let pool = test_utils::setup_database().await;
        let reviewer = test_utils::add_user(&pool, "reviewer@example.com", true).await;
        let owner = test_utils::add_user(&pool, "owner@example.com", true).await;
        let first = test_utils::add_extension(&pool, owner, "First", "assigned", None).await;
        let second = test_utils::add_extension(&pool, owner, "Second", "queued", None).await;
        test_utils::add_assignment(&pool, reviewer, first, 1, "assigned").await;

        let repository = AssignmentRepository::new(pool.clone());
        let result = repository
            .create_assignment(&new_assignment(reviewer, second), 1)
            .await;

        assert!(matches!(
            result,
            Err(CreateAssignmentError::ActiveLimitReached { active: 2, .. })
        ));
        assert_eq!(test_utils::count_rows(&pool, "review_assignments").await, 1);
        assert_eq!(test_utils::extension_status(&pool, second).await, "queued");
    }

    #[test_log::test(tokio::test)]
    async fn failed_claim_rolls_back_earlier_writes() {
        let pool = test_utils::setup_database().await;
        let reviewer = test_utils::add_user(&pool, "reviewer@example.com", true).await;
        let owner = test_utils::add_user(&pool, "owner@example.com", true).await;
        let extension = test_utils::add_extension(&pool, owner, "Tab Tamer", "queued", None).await;
        test_utils::fail_extension_updates(&pool).await;

        let repository = AssignmentRepository::new(pool.clone());
        let result = repository
            .create_assignment(&new_assignment(reviewer, extension), 1)
            .await;

        assert!(matches!(
            result,
            Err(CreateAssignmentError::Store {
                step: CommitStep::ClaimExtension,
                ..
            })
        ));
        assert_eq!(test_utils::count_rows(&pool, "assignment_batches").await, 0);
        assert_eq!(test_utils::count_rows(&pool, "review_assignments").await, 0);
        assert_eq!(test_utils::count_rows(&pool, "notification_outbox").await, 0);
        assert_eq!(test_utils::extension_status(&pool, extension).await, "queued");
    }
}
