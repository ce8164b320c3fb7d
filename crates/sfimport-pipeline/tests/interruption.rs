//! Jobs stopped mid-run, by the operator or by queue shutdown.

mod support;

use std::fmt::Write as _;
use std::time::Duration;

use sfimport_core::{FileType, ImportOptions, JobStatus, NewImportJob};
use sfimport_pipeline::{ImportJobStore, JobOutcome, QueueConfig, PROGRESS_BATCH_SIZE};
use tokio_util::sync::CancellationToken;

use support::{Harness, MemoryJobs, MemoryProducts, STOREFRONT, USER};

const WRITE_DELAY: Duration = Duration::from_millis(2);

fn catalog(rows: usize) -> String {
    let mut csv = String::from("name,price,currency,sku\n");
    for i in 0..rows {
        writeln!(csv, "Lamp model {i},10,RSD,SKU-{i}").unwrap();
    }
    csv
}

fn slow_harness() -> Harness {
    Harness::idle_with(
        MemoryJobs::default(),
        MemoryProducts::slow(WRITE_DELAY),
        QueueConfig { workers: 1, capacity: 4 },
    )
}

#[tokio::test]
async fn cancel_during_processing_stops_at_the_next_checkpoint() {
    let h = slow_harness();
    let job = h
        .jobs
        .create_job(&NewImportJob {
            storefront_id: STOREFRONT,
            user_id: USER,
            file_name: Some("catalog.csv".to_string()),
            file_type: FileType::Csv,
            file_url: None,
            options: ImportOptions::default(),
        })
        .await
        .unwrap();
    let bytes = catalog(250).into_bytes();
    let shutdown = CancellationToken::new();

    let (outcome, cancelled) = tokio::join!(h.worker.process(job.id, &bytes, &shutdown), async {
        h.wait_products(1).await;
        h.service.cancel_job(job.id).await
    });

    assert_eq!(cancelled.unwrap().status, JobStatus::Cancelled);
    assert_eq!(outcome, JobOutcome::Cancelled);
    assert_eq!(h.products.count(), PROGRESS_BATCH_SIZE);

    let stored = h.jobs.job(job.id).unwrap();
    assert_eq!(stored.status, JobStatus::Cancelled);
    assert!(stored.error_message.is_none());
    assert!(stored.completed_at.is_some());
}

#[tokio::test]
async fn queue_shutdown_fails_the_running_job() {
    let h = slow_harness();
    h.service.queue().start().unwrap();

    let job = h.submit(&catalog(250), ImportOptions::default()).await;
    h.wait_products(1).await;
    h.service.queue().stop().await;

    let stored = h.jobs.job(job.id).unwrap();
    assert_eq!(stored.status, JobStatus::Failed);
    assert_eq!(
        stored.error_message.as_deref(),
        Some("import interrupted by shutdown")
    );
    assert_eq!(stored.counters.total_records, 250);
    assert_eq!(
        stored.counters.processed_records,
        i32::try_from(PROGRESS_BATCH_SIZE).unwrap()
    );
    assert_eq!(h.products.count(), PROGRESS_BATCH_SIZE);
    assert!(!h.service.queue().is_running());
}

#[tokio::test]
async fn shutdown_before_the_first_checkpoint_lets_short_jobs_finish() {
    let h = slow_harness();
    h.service.queue().start().unwrap();

    let job = h.submit(&catalog(20), ImportOptions::default()).await;
    h.wait_products(1).await;
    h.service.queue().stop().await;

    let stored = h.jobs.job(job.id).unwrap();
    assert_eq!(stored.status, JobStatus::Completed);
    assert_eq!(stored.counters.successful_records, 20);
}
