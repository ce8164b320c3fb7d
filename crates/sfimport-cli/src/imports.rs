//! Handlers for validating, previewing and importing catalog files.

use std::path::{Path, PathBuf};
use std::time::Duration;

use sfimport_core::{
    record_location, CategoryMappingMode, FileType, ImportJob, ImportJobStatus, ImportOptions,
    ImportValidationError, JobStatus, UpdateMode,
};
use sfimport_pipeline::{ImportPreview, ImportSubmission, PipelineError, UrlSubmission};
use sfimport_variants::VariantDetector;

use crate::files::{file_name, read_catalog};
use crate::runtime::Runtime;

const POLL_INTERVAL: Duration = Duration::from_millis(500);
const MAX_PRINTED_ERRORS: usize = 20;

/// Where `import` reads the catalog from.
#[derive(Debug)]
pub(crate) enum CatalogSource {
    File(PathBuf),
    Url(String),
}

#[derive(Debug)]
pub(crate) struct ImportRequest {
    pub(crate) source: CatalogSource,
    pub(crate) storefront_id: i64,
    pub(crate) user_id: i64,
    pub(crate) file_type: Option<FileType>,
    pub(crate) update_mode: UpdateMode,
    pub(crate) category_mode: CategoryMappingMode,
}

fn fmt_time(at: Option<chrono::DateTime<chrono::Utc>>) -> String {
    at.map_or_else(
        || "-".to_string(),
        |t| t.format("%Y-%m-%d %H:%M:%S").to_string(),
    )
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() > max {
        format!("{}...", text.chars().take(max).collect::<String>())
    } else {
        text.to_string()
    }
}

fn print_validation_errors(errors: &[ImportValidationError]) {
    if errors.is_empty() {
        return;
    }
    println!();
    println!("{:<24}{:<18}MESSAGE", "LOCATION", "FIELD");
    for error in errors.iter().take(MAX_PRINTED_ERRORS) {
        println!(
            "{:<24}{:<18}{}",
            truncate(&error.location(), 20),
            error.field,
            error.message
        );
    }
    if errors.len() > MAX_PRINTED_ERRORS {
        println!("... {} more", errors.len() - MAX_PRINTED_ERRORS);
    }
}

/// Parses a file and prints its validation summary. Nothing is stored.
///
/// # Errors
///
/// Returns an error if the file cannot be read or is rejected as a whole.
pub(crate) fn run_validate(file: &Path, file_type: Option<FileType>) -> anyhow::Result<()> {
    let (file_type, bytes) = read_catalog(file, file_type)?;
    let output = sfimport_parser::parse_file(file_type, &bytes)?;
    let summary = sfimport_parser::summarize(&output);

    println!("file:     {} ({file_type})", file_name(file));
    println!("records:  {}", summary.total_records);
    println!("valid:    {}", summary.valid_records);
    println!("invalid:  {}", summary.invalid_records);
    print_validation_errors(&summary.errors);
    Ok(())
}

/// Prints the first `limit` records of a file and its variant families.
///
/// # Errors
///
/// Returns an error if the file cannot be read or is rejected as a whole.
pub(crate) fn run_preview(
    file: &Path,
    file_type: Option<FileType>,
    limit: usize,
    json: bool,
) -> anyhow::Result<()> {
    let (file_type, bytes) = read_catalog(file, file_type)?;
    let output = sfimport_parser::parse_file(file_type, &bytes)?;
    let preview = ImportPreview {
        summary: sfimport_parser::summarize(&output),
        records: sfimport_parser::preview_records(&output, limit),
        variant_groups: VariantDetector::default().group_products(&output.products),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&preview)?);
        return Ok(());
    }

    let summary = &preview.summary;
    println!(
        "{} records, {} valid, {} invalid",
        summary.total_records, summary.valid_records, summary.invalid_records
    );
    println!();
    println!("{:<24}{:<8}{:<16}{:<12}NAME", "LOCATION", "VALID", "SKU", "PRICE");
    for record in &preview.records {
        let (sku, price, name) = record.product.as_ref().map_or_else(
            || ("-".to_string(), "-".to_string(), "-".to_string()),
            |p| {
                (
                    p.sku.clone().unwrap_or_else(|| "-".to_string()),
                    p.price.to_string(),
                    truncate(&p.name, 50),
                )
            },
        );
        let valid = if record.is_valid() { "yes" } else { "no" };
        let location = record_location(record.source.as_deref(), record.line_number);
        println!(
            "{:<24}{:<8}{:<16}{:<12}{}",
            truncate(&location, 20),
            valid,
            sku,
            price,
            name
        );
    }

    let families: Vec<_> = preview
        .variant_groups
        .iter()
        .filter(|g| g.is_grouped)
        .collect();
    if !families.is_empty() {
        println!();
        println!("{:<40}{:<10}{:<12}ATTRIBUTES", "FAMILY", "MEMBERS", "CONFIDENCE");
        for group in families {
            let attributes: Vec<&str> = group
                .variant_attribute_names
                .iter()
                .map(String::as_str)
                .collect();
            println!(
                "{:<40}{:<10}{:<12.2}{}",
                truncate(&group.base_name, 36),
                group.variant_count,
                group.confidence,
                attributes.join(", ")
            );
        }
    }
    Ok(())
}

fn print_job(job: &ImportJob) {
    println!(
        "job {} [{}] storefront {} ({})",
        job.id,
        job.status,
        job.storefront_id,
        job.file_name.as_deref().unwrap_or("-")
    );
    println!(
        "records: {} total, {} processed, {} ok, {} failed",
        job.counters.total_records,
        job.counters.processed_records,
        job.counters.successful_records,
        job.counters.failed_records
    );
    println!(
        "created {}  started {}  completed {}",
        fmt_time(Some(job.created_at)),
        fmt_time(job.started_at),
        fmt_time(job.completed_at)
    );
    if let Some(url) = &job.file_url {
        println!("source: {url}");
    }
    if let Some(message) = &job.error_message {
        println!("message: {message}");
    }
}

fn print_status(status: &ImportJobStatus) {
    print_job(&status.job);
    println!("progress: {:.1}%", status.progress);
    if status.errors.is_empty() {
        return;
    }
    println!();
    println!("{:<8}{:<18}MESSAGE", "LINE", "FIELD");
    for error in status.errors.iter().take(MAX_PRINTED_ERRORS) {
        println!(
            "{:<8}{:<18}{}",
            error.line_number, error.field_name, error.error_message
        );
    }
    if status.errors.len() > MAX_PRINTED_ERRORS {
        println!("... {} more", status.errors.len() - MAX_PRINTED_ERRORS);
    }
}

async fn wait_for_job(runtime: &Runtime, job_id: i64) -> anyhow::Result<ImportJobStatus> {
    let mut last_processed = -1;
    loop {
        let status = runtime.service.job_status(job_id).await?;
        if status.job.status.is_terminal() {
            return Ok(status);
        }
        if status.job.counters.processed_records != last_processed {
            last_processed = status.job.counters.processed_records;
            tracing::info!(
                job_id,
                processed = last_processed,
                total = status.job.counters.total_records,
                "import in progress"
            );
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

/// Submits a file or URL and follows the job until it finishes. Ctrl-C
/// cancels the job instead of abandoning it.
///
/// # Errors
///
/// Returns an error if the catalog cannot be read or downloaded, the job
/// cannot be queued or the job ends in a non-completed state.
pub(crate) async fn run_import(runtime: &Runtime, request: &ImportRequest) -> anyhow::Result<()> {
    let options = ImportOptions {
        update_mode: request.update_mode,
        category_mapping_mode: request.category_mode,
    };
    let submitted = match &request.source {
        CatalogSource::File(path) => {
            let (file_type, bytes) = read_catalog(path, request.file_type)?;
            let submission = ImportSubmission {
                storefront_id: request.storefront_id,
                user_id: request.user_id,
                file_name: Some(file_name(path)),
                file_type,
                file_url: None,
                options,
            };
            runtime.service.submit_file(submission, bytes).await
        }
        CatalogSource::Url(url) => {
            let submission = UrlSubmission {
                storefront_id: request.storefront_id,
                user_id: request.user_id,
                url: url.clone(),
                file_type: request.file_type,
                options,
            };
            runtime.service.submit_url(submission).await
        }
    };

    let job = match submitted {
        Ok(job) => job,
        Err(e) if e.is_retryable() => {
            anyhow::bail!("{e}; try again once running imports finish")
        }
        Err(e) => return Err(e.into()),
    };
    println!("submitted job {}", job.id);

    let status = tokio::select! {
        status = wait_for_job(runtime, job.id) => status?,
        _ = tokio::signal::ctrl_c() => {
            tracing::warn!(job_id = job.id, "interrupted; cancelling import job");
            match runtime.service.cancel_job(job.id).await {
                Ok(_) | Err(PipelineError::InvalidTransition { .. }) => {}
                Err(e) => return Err(e.into()),
            }
            wait_for_job(runtime, job.id).await?
        }
    };

    print_status(&status);
    match status.job.status {
        JobStatus::Completed => Ok(()),
        other => anyhow::bail!("import job {} ended as {other}", status.job.id),
    }
}

/// # Errors
///
/// Returns an error if the job does not exist or the query fails.
pub(crate) async fn run_status(runtime: &Runtime, job_id: i64) -> anyhow::Result<()> {
    let status = runtime.service.job_status(job_id).await?;
    print_status(&status);
    Ok(())
}

/// Lists the jobs of a storefront, newest first.
///
/// # Errors
///
/// Returns an error if the query fails.
pub(crate) async fn run_jobs(
    runtime: &Runtime,
    storefront_id: i64,
    status: Option<JobStatus>,
    limit: i64,
    offset: i64,
) -> anyhow::Result<()> {
    let jobs = runtime
        .service
        .list_jobs(storefront_id, status, limit, offset)
        .await?;

    if jobs.is_empty() {
        println!(
            "no import jobs found for storefront {storefront_id}{}",
            status.map(|s| format!(" with status {s}")).unwrap_or_default()
        );
        return Ok(());
    }

    println!(
        "{:<8}{:<12}{:<21}{:<10}{:<10}FILE",
        "ID", "STATUS", "CREATED", "OK", "FAILED"
    );
    for job in &jobs {
        println!(
            "{:<8}{:<12}{:<21}{:<10}{:<10}{}",
            job.id,
            job.status,
            fmt_time(Some(job.created_at)),
            job.counters.successful_records,
            job.counters.failed_records,
            truncate(job.file_name.as_deref().unwrap_or("-"), 40)
        );
    }
    Ok(())
}

/// # Errors
///
/// Returns an error if the job does not exist or has already finished.
pub(crate) async fn run_cancel(runtime: &Runtime, job_id: i64) -> anyhow::Result<()> {
    let job = runtime.service.cancel_job(job_id).await?;
    println!("job {} is now {}", job.id, job.status);
    Ok(())
}

/// Resubmits a failed or cancelled job and follows the new job. Without
/// `file` the job's source URL is downloaded again.
///
/// # Errors
///
/// Returns an error if the job is not retryable, the catalog cannot be read
/// or downloaded, or the new job does not complete.
pub(crate) async fn run_retry(
    runtime: &Runtime,
    job_id: i64,
    file: Option<&Path>,
) -> anyhow::Result<()> {
    let job = match file {
        Some(file) => {
            let previous = runtime.service.job_status(job_id).await?.job;
            let (_, bytes) = read_catalog(file, Some(previous.file_type))?;
            runtime.service.retry_job(job_id, bytes).await?
        }
        None => runtime.service.retry_job_from_url(job_id).await?,
    };
    println!("job {job_id} resubmitted as job {}", job.id);

    let status = wait_for_job(runtime, job.id).await?;
    print_status(&status);
    match status.job.status {
        JobStatus::Completed => Ok(()),
        other => anyhow::bail!("import job {} ended as {other}", status.job.id),
    }
}
