use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::models::{
    Contact, Coordinates, DeliveryMethod, DeliveryStatus, JobContext, Notification, Page, PayType,
    WorkerContext,
};
use crate::services::store::{
    AppendOutcome, ApplicationOutcome, ApplicationStore, CandidateRow, NotificationStore, PostingStore,
    StoreError, WorkerStore,
};

const JOB_COLUMNS: &str = r#"
    j.id, j.title, j.employer_id, j.latitude, j.longitude, j.city, j.zip_code, j.address,
    j.provides_transportation, j.pay_amount, j.pay_type, j.start_date, j.created_at,
    COALESCE(array_agg(js.skill_id) FILTER (WHERE js.skill_id IS NOT NULL), '{}') AS skill_ids
"#;

const NOTIFICATION_COLUMNS: &str = r#"
    id, recipient_id, type, title, body, payload, delivery_method, delivery_status,
    event_key, is_read, created_at
"#;

/// PostgreSQL implementation of the posting, worker, application and
/// notification stores
pub struct PostgresClient {
    pool: PgPool,
}

impl PostgresClient {
    /// Create a new PostgreSQL client from a connection string
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
        acquire_timeout_secs: u64,
    ) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(Duration::from_secs(acquire_timeout_secs))
            .idle_timeout(Duration::from_secs(600))
            .test_before_acquire(true)
            .connect(database_url)
            .await?;

        // Run migrations on startup
        sqlx::migrate!("./migrations").run(&pool).await?;

        Ok(Self { pool })
    }

    /// Create a new PostgreSQL client from settings
    pub async fn from_settings(settings: &crate::config::DatabaseSettings) -> Result<Self, StoreError> {
        tracing::info!("Connecting to PostgreSQL");

        Self::new(
            &settings.url,
            settings.max_connections,
            settings.min_connections,
            settings.acquire_timeout_secs,
        )
        .await
    }

    /// Health check for the database connection
    pub async fn health_check(&self) -> Result<bool, StoreError> {
        sqlx::query("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .map(|_| true)
            .map_err(Into::into)
    }
}

fn job_from_row(row: &PgRow) -> Result<JobContext, StoreError> {
    let id: String = row.try_get("id")?;
    let pay_type: String = row.try_get("pay_type")?;
    let pay_type: PayType = pay_type
        .parse()
        .map_err(|e| StoreError::InvalidRow(format!("job {}: {}", id, e)))?;
    let location = Coordinates::new(row.try_get("latitude")?, row.try_get("longitude")?)
        .map_err(|e| StoreError::InvalidRow(format!("job {}: {}", id, e)))?;
    let skill_ids: Vec<String> = row.try_get("skill_ids")?;

    Ok(JobContext {
        title: row.try_get("title")?,
        employer_id: row.try_get("employer_id")?,
        skill_ids: skill_ids.into_iter().collect(),
        location,
        provides_transportation: row.try_get("provides_transportation")?,
        pay_amount: row.try_get("pay_amount")?,
        pay_type,
        start_date: row.try_get("start_date")?,
        created_at: row.try_get("created_at")?,
        city: row.try_get("city")?,
        zip_code: row.try_get("zip_code")?,
        address: row.try_get("address")?,
        id,
    })
}

fn worker_from_row(row: &PgRow) -> Result<(String, WorkerContext), StoreError> {
    let id: String = row.try_get("id")?;
    let location = Coordinates::from_parts(row.try_get("latitude")?, row.try_get("longitude")?)
        .map_err(|e| StoreError::InvalidRow(format!("user {}: {}", id, e)))?;
    let skill_ids: Vec<String> = row.try_get("skill_ids")?;

    Ok((
        id,
        WorkerContext {
            skill_ids: skill_ids.into_iter().collect::<HashSet<_>>(),
            location,
            needs_transportation: row.try_get("needs_transportation")?,
        },
    ))
}

fn notification_from_row(row: &PgRow) -> Result<Notification, StoreError> {
    let id: Uuid = row.try_get("id")?;
    let invalid = |e: String| StoreError::InvalidRow(format!("notification {}: {}", id, e));

    let notification_type: String = row.try_get("type")?;
    let delivery_method: String = row.try_get("delivery_method")?;
    let delivery_status: String = row.try_get("delivery_status")?;

    Ok(Notification {
        id,
        recipient_id: row.try_get("recipient_id")?,
        notification_type: notification_type.parse().map_err(|e| invalid(format!("{}", e)))?,
        title: row.try_get("title")?,
        body: row.try_get("body")?,
        payload: row.try_get("payload")?,
        delivery_method: delivery_method
            .parse::<DeliveryMethod>()
            .map_err(|e| invalid(format!("{}", e)))?,
        delivery_status: DeliveryStatus::from_db(&delivery_status)
            .ok_or_else(|| invalid(format!("unknown delivery status {}", delivery_status)))?,
        event_key: row.try_get("event_key")?,
        is_read: row.try_get("is_read")?,
        created_at: row.try_get("created_at")?,
    })
}

#[async_trait]
impl PostingStore for PostgresClient {
    async fn fetch_posting(&self, job_id: &str) -> Result<Option<JobContext>, StoreError> {
        let query = format!(
            r#"
            SELECT {}
            FROM jobs j
            LEFT JOIN job_skills js ON js.job_id = j.id
            WHERE j.id = $1
            GROUP BY j.id
            "#,
            JOB_COLUMNS
        );

        let row = sqlx::query(&query).bind(job_id).fetch_optional(&self.pool).await?;
        row.as_ref().map(job_from_row).transpose()
    }

    /// Rows that fail to decode are logged and left out of the listing
    async fn fetch_open_postings(&self) -> Result<Vec<JobContext>, StoreError> {
        let query = format!(
            r#"
            SELECT {}
            FROM jobs j
            LEFT JOIN job_skills js ON js.job_id = j.id
            WHERE j.status = 'OPEN'
            GROUP BY j.id
            ORDER BY j.created_at DESC
            "#,
            JOB_COLUMNS
        );

        let rows = sqlx::query(&query).fetch_all(&self.pool).await?;

        let postings: Vec<JobContext> = rows
            .iter()
            .filter_map(|row| match job_from_row(row) {
                Ok(job) => Some(job),
                Err(e) => {
                    tracing::warn!("Skipping unreadable posting: {}", e);
                    None
                }
            })
            .collect();

        tracing::debug!("Fetched {} open postings", postings.len());

        Ok(postings)
    }
}

#[async_trait]
impl WorkerStore for PostgresClient {
    async fn fetch_worker(&self, worker_id: &str) -> Result<Option<WorkerContext>, StoreError> {
        let query = r#"
            SELECT u.id, u.latitude, u.longitude, u.needs_transportation,
                   COALESCE(array_agg(us.skill_id) FILTER (WHERE us.skill_id IS NOT NULL), '{}') AS skill_ids
            FROM users u
            LEFT JOIN user_skills us ON us.user_id = u.id
            WHERE u.id = $1
            GROUP BY u.id
        "#;

        let row = sqlx::query(query).bind(worker_id).fetch_optional(&self.pool).await?;
        Ok(row.as_ref().map(worker_from_row).transpose()?.map(|(_, ctx)| ctx))
    }

    async fn fetch_contact(&self, user_id: &str) -> Result<Option<Contact>, StoreError> {
        let query = r#"
            SELECT name, phone, email, preferred_delivery
            FROM users
            WHERE id = $1
        "#;

        let Some(row) = sqlx::query(query).bind(user_id).fetch_optional(&self.pool).await? else {
            return Ok(None);
        };

        let preferred: Option<String> = row.try_get("preferred_delivery")?;
        let preferred_delivery = match preferred {
            Some(value) => Some(
                value
                    .parse::<DeliveryMethod>()
                    .map_err(|e| StoreError::InvalidRow(format!("user {}: {}", user_id, e)))?,
            ),
            None => None,
        };

        Ok(Some(Contact {
            name: row.try_get("name")?,
            phone: row.try_get("phone")?,
            email: row.try_get("email")?,
            preferred_delivery,
        }))
    }

    fn stream_candidates<'a>(&'a self, exclude_user_id: &'a str) -> BoxStream<'a, CandidateRow> {
        let query = r#"
            SELECT u.id, u.latitude, u.longitude, u.needs_transportation,
                   COALESCE(array_agg(us.skill_id) FILTER (WHERE us.skill_id IS NOT NULL), '{}') AS skill_ids
            FROM users u
            LEFT JOIN user_skills us ON us.user_id = u.id
            WHERE u.user_type IN ('WORKER', 'BOTH') AND u.id <> $1
            GROUP BY u.id
            ORDER BY u.id
        "#;

        sqlx::query(query)
            .bind(exclude_user_id)
            .fetch(&self.pool)
            .map(|row| row.map_err(StoreError::from).and_then(|row| worker_from_row(&row)))
            .boxed()
    }
}

#[async_trait]
impl ApplicationStore for PostgresClient {
    async fn apply(&self, job_id: &str, worker_id: &str, cover_note: &str) -> Result<ApplicationOutcome, StoreError> {
        let query = r#"
            INSERT INTO job_applications (id, job_id, worker_id, cover_note)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (job_id, worker_id) DO NOTHING
            RETURNING id
        "#;

        let created: Option<String> = sqlx::query_scalar(query)
            .bind(Uuid::new_v4().to_string())
            .bind(job_id)
            .bind(worker_id)
            .bind(cover_note)
            .fetch_optional(&self.pool)
            .await?;

        if let Some(id) = created {
            return Ok(ApplicationOutcome::Created(id));
        }

        let existing: String =
            sqlx::query_scalar("SELECT id FROM job_applications WHERE job_id = $1 AND worker_id = $2")
                .bind(job_id)
                .bind(worker_id)
                .fetch_one(&self.pool)
                .await?;

        Ok(ApplicationOutcome::Existing(existing))
    }
}

#[async_trait]
impl NotificationStore for PostgresClient {
    /// Uses INSERT ... ON CONFLICT DO NOTHING so a repeated event returns the
    /// stored record instead of creating a second one.
    async fn append(&self, notification: Notification) -> Result<AppendOutcome, StoreError> {
        let query = r#"
            INSERT INTO notifications
                (id, recipient_id, type, title, body, payload, delivery_method,
                 delivery_status, event_key, is_read, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT DO NOTHING
        "#;

        let result = sqlx::query(query)
            .bind(notification.id)
            .bind(&notification.recipient_id)
            .bind(notification.notification_type.as_str())
            .bind(&notification.title)
            .bind(&notification.body)
            .bind(&notification.payload)
            .bind(notification.delivery_method.as_str())
            .bind(notification.delivery_status.to_db())
            .bind(&notification.event_key)
            .bind(notification.is_read)
            .bind(notification.created_at)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() > 0 {
            return Ok(AppendOutcome::Inserted(notification));
        }

        let existing = self
            .fetch(notification.id)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("notification {}", notification.id)))?;

        tracing::debug!(notification_id = %existing.id, "Notification already recorded");

        Ok(AppendOutcome::Duplicate(existing))
    }

    async fn update_status(&self, id: Uuid, status: DeliveryStatus) -> Result<(), StoreError> {
        let query = r#"
            UPDATE notifications
            SET delivery_status = $2, delivered_at = CASE WHEN $2 = 'DELIVERED' THEN NOW() ELSE delivered_at END
            WHERE id = $1
        "#;

        let result = sqlx::query(query)
            .bind(id)
            .bind(status.to_db())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("notification {}", id)));
        }

        Ok(())
    }

    async fn fetch(&self, id: Uuid) -> Result<Option<Notification>, StoreError> {
        let query = format!("SELECT {} FROM notifications WHERE id = $1", NOTIFICATION_COLUMNS);

        let row = sqlx::query(&query).bind(id).fetch_optional(&self.pool).await?;
        row.as_ref().map(notification_from_row).transpose()
    }

    async fn list_for_recipient(
        &self,
        recipient_id: &str,
        unread_only: bool,
        page: Page,
    ) -> Result<(Vec<Notification>, usize), StoreError> {
        let query = format!(
            r#"
            SELECT {}
            FROM notifications
            WHERE recipient_id = $1 AND ($2 = FALSE OR is_read = FALSE)
            ORDER BY created_at DESC, id
            LIMIT $3 OFFSET $4
            "#,
            NOTIFICATION_COLUMNS
        );

        let rows = sqlx::query(&query)
            .bind(recipient_id)
            .bind(unread_only)
            .bind(page.size as i64)
            .bind(page.offset() as i64)
            .fetch_all(&self.pool)
            .await?;

        let notifications = rows
            .iter()
            .map(notification_from_row)
            .collect::<Result<Vec<_>, _>>()?;

        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM notifications WHERE recipient_id = $1 AND ($2 = FALSE OR is_read = FALSE)",
        )
        .bind(recipient_id)
        .bind(unread_only)
        .fetch_one(&self.pool)
        .await?;

        Ok((notifications, total as usize))
    }

    async fn unread_count(&self, recipient_id: &str) -> Result<usize, StoreError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM notifications WHERE recipient_id = $1 AND is_read = FALSE",
        )
        .bind(recipient_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(count as usize)
    }

    async fn mark_read(&self, id: Uuid, recipient_id: &str) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE notifications SET is_read = TRUE WHERE id = $1 AND recipient_id = $2",
        )
        .bind(id)
        .bind(recipient_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}
