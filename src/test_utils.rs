use sqlx::{query, query_scalar, sqlite::SqlitePoolOptions, SqlitePool};
use uuid::Uuid;

use crate::{
    models::{types::UtcDateTime, ExtensionId, UserId},
    repository::conversion::DBConvertible,
};

/// A private in-memory database with all migrations applied.
pub async fn setup_database() -> SqlitePool {
    // Every connection to `sqlite::memory:` opens a separate database, so keep exactly one alive.
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .min_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .expect("In-memory database should open");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Migrations should apply to an empty database");

    pool
}

pub async fn add_user(pool: &SqlitePool, email: &str, qualified: bool) -> UserId {
    let id = UserId(Uuid::new_v4());

    query("INSERT INTO users (id, email, has_completed_qualification) VALUES ($1, $2, $3)")
        .bind(id.to_db().unwrap())
        .bind(email)
        .bind(qualified)
        .execute(pool)
        .await
        .unwrap();

    id
}

pub async fn add_extension(
    pool: &SqlitePool,
    owner: UserId,
    name: &str,
    status: &str,
    submitted_to_queue_at: Option<UtcDateTime>,
) -> ExtensionId {
    let id = ExtensionId(Uuid::new_v4());

    query(
        r#"
            INSERT INTO extensions (id, owner_id, name, status, submitted_to_queue_at)
            VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(id.to_db().unwrap())
    .bind(owner.to_db().unwrap())
    .bind(name)
    .bind(status)
    .bind(submitted_to_queue_at.to_db().unwrap())
    .execute(pool)
    .await
    .unwrap();

    id
}

pub async fn add_review_relationship(pool: &SqlitePool, reviewer: UserId, owner: UserId) {
    query(
        r#"
            INSERT INTO review_relationships (reviewer_id, reviewed_owner_id, created_at)
            VALUES ($1, $2, $3)
        "#,
    )
    .bind(reviewer.to_db().unwrap())
    .bind(owner.to_db().unwrap())
    .bind(UtcDateTime::now().to_db().unwrap())
    .execute(pool)
    .await
    .unwrap();
}

/// Inserts an assignment (and its batch) directly, bypassing the sequence.
pub async fn add_assignment(
    pool: &SqlitePool,
    reviewer: UserId,
    extension: ExtensionId,
    assignment_number: i64,
    status: &str,
) {
    let batch_id = Uuid::new_v4().to_string();
    let now = UtcDateTime::now().to_db().unwrap();

    query(
        r#"
            INSERT INTO assignment_batches (id, reviewer_id, assignment_type, status, created_at)
            VALUES ($1, $2, 'single', 'active', $3)
        "#,
    )
    .bind(&batch_id)
    .bind(reviewer.to_db().unwrap())
    .bind(&now)
    .execute(pool)
    .await
    .unwrap();

    query(
        r#"
            INSERT INTO review_assignments (
                id, batch_id, extension_id, reviewer_id, assignment_number, assigned_at, due_at, status)
            VALUES ($1, $2, $3, $4, $5, $6, $6, $7)
        "#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(&batch_id)
    .bind(extension.to_db().unwrap())
    .bind(reviewer.to_db().unwrap())
    .bind(assignment_number)
    .bind(&now)
    .bind(status)
    .execute(pool)
    .await
    .unwrap();
}

pub async fn count_rows(pool: &SqlitePool, table: &str) -> i64 {
    query_scalar(&format!("SELECT COUNT(*) FROM {table}"))
        .fetch_one(pool)
        .await
        .unwrap()
}

pub async fn extension_status(pool: &SqlitePool, id: ExtensionId) -> String {
    query_scalar("SELECT status FROM extensions WHERE id = $1")
        .bind(id.to_db().unwrap())
        .fetch_one(pool)
        .await
        .unwrap()
}

/// Makes every later attempt to change an extension's status fail inside the database.
pub async fn fail_extension_updates(pool: &SqlitePool) {
    query(
        r#"
            CREATE TRIGGER fail_extension_updates
            BEFORE UPDATE OF status ON extensions
            BEGIN
                SELECT RAISE(ABORT, 'simulated store failure');
            END
        "#,
    )
    .execute(pool)
    .await
    .unwrap();
}

/// Simulates a concurrent request that claims `extension` right after an assignment for it is
/// inserted, so the claim inside the same transaction finds it no longer queued.
pub async fn steal_extension_on_assignment(pool: &SqlitePool, extension: ExtensionId) {
    let id = extension.to_db().unwrap();

    query(&format!(
        r#"
            CREATE TRIGGER steal_{name}
            AFTER INSERT ON review_assignments
            WHEN NEW.extension_id = '{id}'
            BEGIN
                UPDATE extensions SET status = 'assigned' WHERE id = NEW.extension_id;
            END
        "#,
        name = extension.0.simple(),
    ))
    .execute(pool)
    .await
    .unwrap();
}

pub async fn add_notification(pool: &SqlitePool, recipient: &str) {
    query(
        r#"
            INSERT INTO notification_outbox (recipient, event_type, payload, created_at)
            VALUES ($1, 'review_assigned', '{"assignment_number": 1}', $2)
        "#,
    )
    .bind(recipient)
    .bind(UtcDateTime::now().to_db().unwrap())
    .execute(pool)
    .await
    .unwrap();
}
