//! Database operations for `import_jobs` and `import_errors`.
//!
//! Every status change is a guarded `UPDATE … WHERE status IN (…)`; zero
//! affected rows means the job was concurrently moved elsewhere and is
//! reported as [`DbError::InvalidJobTransition`].

use chrono::{DateTime, Utc};
use sfimport_core::{
    ImportError, ImportJob, ImportOptions, JobCounters, JobStatus, NewImportJob,
};
use sqlx::PgPool;
use uuid::Uuid;

use crate::DbError;

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

/// A row from the `import_jobs` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ImportJobRow {
    pub id: i64,
    pub public_id: Uuid,
    pub storefront_id: i64,
    pub user_id: i64,
    pub file_name: Option<String>,
    pub file_type: String,
    pub file_url: Option<String>,
    pub status: String,
    pub update_mode: String,
    pub category_mapping_mode: String,
    pub total_records: i32,
    pub processed_records: i32,
    pub successful_records: i32,
    pub failed_records: i32,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl TryFrom<ImportJobRow> for ImportJob {
    type Error = DbError;

    fn try_from(row: ImportJobRow) -> Result<Self, Self::Error> {
        Ok(ImportJob {
            id: row.id,
            public_id: row.public_id,
            storefront_id: row.storefront_id,
            user_id: row.user_id,
            file_name: row.file_name,
            file_type: row.file_type.parse()?,
            file_url: row.file_url,
            status: row.status.parse()?,
            options: ImportOptions {
                update_mode: row.update_mode.parse()?,
                category_mapping_mode: row.category_mapping_mode.parse()?,
            },
            counters: JobCounters {
                total_records: row.total_records,
                processed_records: row.processed_records,
                successful_records: row.successful_records,
                failed_records: row.failed_records,
            },
            error_message: row.error_message,
            created_at: row.created_at,
            started_at: row.started_at,
            completed_at: row.completed_at,
        })
    }
}

/// A row from the `import_errors` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ImportErrorRow {
    pub id: i64,
    pub job_id: i64,
    pub line_number: i32,
    pub field_name: String,
    pub error_message: String,
    pub raw_data: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<ImportErrorRow> for ImportError {
    fn from(row: ImportErrorRow) -> Self {
        ImportError {
            job_id: row.job_id,
            line_number: row.line_number,
            field_name: row.field_name,
            error_message: row.error_message,
            raw_data: row.raw_data,
        }
    }
}

const JOB_COLUMNS: &str = "id, public_id, storefront_id, user_id, file_name, file_type, file_url, \
     status, update_mode, category_mapping_mode, total_records, processed_records, \
     successful_records, failed_records, error_message, created_at, started_at, completed_at";

// ---------------------------------------------------------------------------
// import_jobs operations
// ---------------------------------------------------------------------------

/// Creates a new job in `pending` status with a fresh `public_id`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails.
pub async fn create_import_job(pool: &PgPool, new: &NewImportJob) -> Result<ImportJob, DbError> {
    let row = sqlx::query_as::<_, ImportJobRow>(&format!(
        "INSERT INTO import_jobs \
             (public_id, storefront_id, user_id, file_name, file_type, file_url, \
              status, update_mode, category_mapping_mode) \
         VALUES ($1, $2, $3, $4, $5, $6, 'pending', $7, $8) \
         RETURNING {JOB_COLUMNS}"
    ))
    .bind(Uuid::new_v4())
    .bind(new.storefront_id)
    .bind(new.user_id)
    .bind(&new.file_name)
    .bind(new.file_type.as_str())
    .bind(&new.file_url)
    .bind(new.options.update_mode.as_str())
    .bind(new.options.category_mapping_mode.as_str())
    .fetch_one(pool)
    .await?;

    row.try_into()
}

/// Fetches a job by internal id.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails or [`DbError::InvalidValue`]
/// if a stored enum column holds an unknown value.
pub async fn get_import_job(pool: &PgPool, id: i64) -> Result<Option<ImportJob>, DbError> {
    sqlx::query_as::<_, ImportJobRow>(&format!(
        "SELECT {JOB_COLUMNS} FROM import_jobs WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?
    .map(ImportJob::try_from)
    .transpose()
}

/// Jobs of one storefront ordered by `created_at DESC`, optionally filtered
/// by status.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_import_jobs(
    pool: &PgPool,
    storefront_id: i64,
    status: Option<JobStatus>,
    limit: i64,
    offset: i64,
) -> Result<Vec<ImportJob>, DbError> {
    let rows = sqlx::query_as::<_, ImportJobRow>(&format!(
        "SELECT {JOB_COLUMNS} FROM import_jobs \
         WHERE storefront_id = $1 AND ($2::text IS NULL OR status = $2) \
         ORDER BY created_at DESC, id DESC \
         LIMIT $3 OFFSET $4"
    ))
    .bind(storefront_id)
    .bind(status.map(JobStatus::as_str))
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(ImportJob::try_from).collect()
}

/// Claims a `pending` job: `processing`, `started_at = NOW()`.
///
/// # Errors
///
/// Returns [`DbError::InvalidJobTransition`] if the job is not pending,
/// [`DbError::NotFound`] if it does not exist.
pub async fn mark_import_job_processing(pool: &PgPool, id: i64) -> Result<ImportJob, DbError> {
    let row = sqlx::query_as::<_, ImportJobRow>(&format!(
        "UPDATE import_jobs \
         SET status = 'processing', started_at = NOW() \
         WHERE id = $1 AND status = 'pending' \
         RETURNING {JOB_COLUMNS}"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;

    match row {
        Some(row) => row.try_into(),
        None => Err(transition_error(pool, id, "pending", "processing").await),
    }
}

/// Writes the running counters of a `processing` job.
///
/// # Errors
///
/// Returns [`DbError::InvalidJobTransition`] if the job is no longer
/// processing.
pub async fn update_import_job_progress(
    pool: &PgPool,
    id: i64,
    counters: &JobCounters,
) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE import_jobs \
         SET total_records = $1, processed_records = $2, \
             successful_records = $3, failed_records = $4 \
         WHERE id = $5 AND status = 'processing'",
    )
    .bind(counters.total_records)
    .bind(counters.processed_records)
    .bind(counters.successful_records)
    .bind(counters.failed_records)
    .bind(id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(transition_error(pool, id, "processing", "progress").await);
    }
    Ok(())
}

/// Marks a `processing` job `completed` with its final counters.
///
/// # Errors
///
/// Returns [`DbError::InvalidJobTransition`] if the job is not processing,
/// e.g. because it was cancelled.
pub async fn complete_import_job(
    pool: &PgPool,
    id: i64,
    counters: &JobCounters,
    error_message: Option<&str>,
) -> Result<ImportJob, DbError> {
    let row = sqlx::query_as::<_, ImportJobRow>(&format!(
        "UPDATE import_jobs \
         SET status = 'completed', completed_at = NOW(), \
             total_records = $1, processed_records = $2, \
             successful_records = $3, failed_records = $4, error_message = $5 \
         WHERE id = $6 AND status = 'processing' \
         RETURNING {JOB_COLUMNS}"
    ))
    .bind(counters.total_records)
    .bind(counters.processed_records)
    .bind(counters.successful_records)
    .bind(counters.failed_records)
    .bind(error_message)
    .bind(id)
    .fetch_optional(pool)
    .await?;

    match row {
        Some(row) => row.try_into(),
        None => Err(transition_error(pool, id, "processing", "completed").await),
    }
}

/// Marks a `pending` or `processing` job `failed`.
///
/// # Errors
///
/// Returns [`DbError::InvalidJobTransition`] if the job already finished.
pub async fn fail_import_job(
    pool: &PgPool,
    id: i64,
    counters: &JobCounters,
    error_message: &str,
) -> Result<ImportJob, DbError> {
    let row = sqlx::query_as::<_, ImportJobRow>(&format!(
        "UPDATE import_jobs \
         SET status = 'failed', completed_at = NOW(), \
             total_records = $1, processed_records = $2, \
             successful_records = $3, failed_records = $4, error_message = $5 \
         WHERE id = $6 AND status IN ('pending', 'processing') \
         RETURNING {JOB_COLUMNS}"
    ))
    .bind(counters.total_records)
    .bind(counters.processed_records)
    .bind(counters.successful_records)
    .bind(counters.failed_records)
    .bind(error_message)
    .bind(id)
    .fetch_optional(pool)
    .await?;

    match row {
        Some(row) => row.try_into(),
        None => Err(transition_error(pool, id, "pending or processing", "failed").await),
    }
}

/// Marks a `pending` or `processing` job `cancelled`.
///
/// # Errors
///
/// Returns [`DbError::InvalidJobTransition`] if the job already finished.
pub async fn cancel_import_job(pool: &PgPool, id: i64) -> Result<ImportJob, DbError> {
    let row = sqlx::query_as::<_, ImportJobRow>(&format!(
        "UPDATE import_jobs \
         SET status = 'cancelled', completed_at = NOW() \
         WHERE id = $1 AND status IN ('pending', 'processing') \
         RETURNING {JOB_COLUMNS}"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;

    match row {
        Some(row) => row.try_into(),
        None => Err(transition_error(pool, id, "pending or processing", "cancelled").await),
    }
}

async fn transition_error(
    pool: &PgPool,
    id: i64,
    expected_status: &'static str,
    action: &'static str,
) -> DbError {
    let exists = sqlx::query_scalar::<_, bool>(
        "SELECT EXISTS (SELECT 1 FROM import_jobs WHERE id = $1)",
    )
    .bind(id)
    .fetch_one(pool)
    .await;

    match exists {
        Ok(false) => DbError::NotFound {
            entity: "import job",
            key: id.to_string(),
        },
        Ok(true) => DbError::InvalidJobTransition {
            id,
            expected_status,
            action,
        },
        Err(e) => DbError::Sqlx(e),
    }
}

// ---------------------------------------------------------------------------
// import_errors operations
// ---------------------------------------------------------------------------

/// Appends error rows in one round-trip. Rows may belong to different jobs.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails.
pub async fn insert_import_errors(pool: &PgPool, errors: &[ImportError]) -> Result<u64, DbError> {
    if errors.is_empty() {
        return Ok(0);
    }

    let mut job_ids: Vec<i64> = Vec::with_capacity(errors.len());
    let mut line_numbers: Vec<i32> = Vec::with_capacity(errors.len());
    let mut field_names: Vec<String> = Vec::with_capacity(errors.len());
    let mut messages: Vec<String> = Vec::with_capacity(errors.len());
    let mut raw_datas: Vec<Option<String>> = Vec::with_capacity(errors.len());
    for e in errors {
        job_ids.push(e.job_id);
        line_numbers.push(e.line_number);
        field_names.push(e.field_name.clone());
        messages.push(e.error_message.clone());
        raw_datas.push(e.raw_data.clone());
    }

    let result = sqlx::query(
        "INSERT INTO import_errors (job_id, line_number, field_name, error_message, raw_data) \
         SELECT * FROM UNNEST($1::bigint[], $2::int4[], $3::text[], $4::text[], $5::text[])",
    )
    .bind(&job_ids)
    .bind(&line_numbers)
    .bind(&field_names)
    .bind(&messages)
    .bind(&raw_datas)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

/// Error rows of a job ordered by line number, then insertion order.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_import_errors(pool: &PgPool, job_id: i64) -> Result<Vec<ImportError>, DbError> {
    let rows = sqlx::query_as::<_, ImportErrorRow>(
        "SELECT id, job_id, line_number, field_name, error_message, raw_data, created_at \
         FROM import_errors \
         WHERE job_id = $1 \
         ORDER BY line_number, id",
    )
    .bind(job_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(ImportError::from).collect())
}
