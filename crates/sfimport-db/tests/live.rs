//! Live integration tests for sfimport-db using `#[sqlx::test]`.
//!
//! Each test gets a fresh, fully-migrated Postgres database from the sqlx
//! test harness. They need `DATABASE_URL` and are ignored by default:
//! `cargo test -p sfimport-db -- --ignored`.

use std::str::FromStr;

use rust_decimal::Decimal;
use sfimport_core::{
    AttributeValue, FileType, ImportError, ImportOptions, ImportProductRequest, JobCounters,
    JobStatus, NewCategoryMapping, NewImportJob, StoreError,
};
use sfimport_db::{
    cancel_import_job, complete_import_job, create_import_job, fail_import_job, get_import_job,
    insert_category_mapping, insert_import_errors, list_attribute_templates,
    list_category_mappings, list_import_errors, list_import_jobs, mark_import_job_processing,
    update_import_job_progress, upsert_manual_category_mapping, DbError, PgStore,
};
use sfimport_pipeline::{ImportJobStore, ProductStore};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn new_job(storefront_id: i64) -> NewImportJob {
    NewImportJob {
        storefront_id,
        user_id: 3,
        file_name: Some("catalog.csv".to_string()),
        file_type: FileType::Csv,
        file_url: None,
        options: ImportOptions::default(),
    }
}

fn counters(total: i32, ok: i32, failed: i32) -> JobCounters {
    JobCounters {
        total_records: total,
        processed_records: ok + failed,
        successful_records: ok,
        failed_records: failed,
    }
}

fn mapping(path: &str, category_id: i64, is_manual: bool) -> NewCategoryMapping {
    NewCategoryMapping {
        storefront_id: 7,
        external_path: path.to_string(),
        normalized_path: path.to_string(),
        category_id,
        confidence: if is_manual { 1.0 } else { 0.8 },
        reasoning: None,
        is_manual,
    }
}

async fn insert_category(pool: &sqlx::PgPool, id: i64) {
    sqlx::query("INSERT INTO categories (id, name, slug) VALUES ($1, $2, $3)")
        .bind(id)
        .bind(format!("Category {id}"))
        .bind(format!("category-{id}"))
        .execute(pool)
        .await
        .unwrap_or_else(|e| panic!("insert_category failed for {id}: {e}"));
}

// ---------------------------------------------------------------------------
// Section 1: Job lifecycle
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires DATABASE_URL"]
async fn job_lifecycle_pending_to_completed(pool: sqlx::PgPool) {
    let job = create_import_job(&pool, &new_job(7))
        .await
        .expect("create_import_job failed");
    assert_eq!(job.status, JobStatus::Pending);
    assert!(job.started_at.is_none());

    let job = mark_import_job_processing(&pool, job.id)
        .await
        .expect("mark_import_job_processing failed");
    assert_eq!(job.status, JobStatus::Processing);
    assert!(job.started_at.is_some());

    update_import_job_progress(&pool, job.id, &counters(10, 4, 1))
        .await
        .expect("update_import_job_progress failed");

    let summary = Some("1 of 10 records failed");
    let done = complete_import_job(&pool, job.id, &counters(10, 9, 1), summary)
        .await
        .expect("complete_import_job failed");
    assert_eq!(done.status, JobStatus::Completed);
    assert_eq!(done.counters.successful_records, 9);
    assert_eq!(done.error_message.as_deref(), Some("1 of 10 records failed"));
    assert!(done.completed_at.is_some());
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires DATABASE_URL"]
async fn finished_job_rejects_further_transitions(pool: sqlx::PgPool) {
    let job = create_import_job(&pool, &new_job(7)).await.unwrap();
    cancel_import_job(&pool, job.id).await.unwrap();

    let err = mark_import_job_processing(&pool, job.id).await.unwrap_err();
    assert!(matches!(err, DbError::InvalidJobTransition { .. }));
    let err = fail_import_job(&pool, job.id, &JobCounters::default(), "late")
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::InvalidJobTransition { .. }));

    let err = cancel_import_job(&pool, 987_654).await.unwrap_err();
    assert!(matches!(err, DbError::NotFound { .. }));

    let reloaded = get_import_job(&pool, job.id).await.unwrap().unwrap();
    assert_eq!(reloaded.status, JobStatus::Cancelled);
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires DATABASE_URL"]
async fn store_reports_lost_claims_as_invalid_transitions(pool: sqlx::PgPool) {
    let store = PgStore::new(pool);
    let job = store.create_job(&new_job(7)).await.unwrap();
    store.mark_processing(job.id).await.unwrap();

    let err = store.mark_processing(job.id).await.unwrap_err();
    assert!(matches!(err, StoreError::InvalidTransition { .. }));
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires DATABASE_URL"]
async fn jobs_list_newest_first_with_status_filter(pool: sqlx::PgPool) {
    let first = create_import_job(&pool, &new_job(7)).await.unwrap();
    let second = create_import_job(&pool, &new_job(7)).await.unwrap();
    create_import_job(&pool, &new_job(8)).await.unwrap();
    fail_import_job(&pool, first.id, &JobCounters::default(), "broken")
        .await
        .unwrap();

    let all = list_import_jobs(&pool, 7, None, 10, 0).await.unwrap();
    let ids: Vec<i64> = all.iter().map(|j| j.id).collect();
    assert_eq!(ids, vec![second.id, first.id]);

    let failed = list_import_jobs(&pool, 7, Some(JobStatus::Failed), 10, 0)
        .await
        .unwrap();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].id, first.id);

    let page = list_import_jobs(&pool, 7, None, 1, 1).await.unwrap();
    assert_eq!(page[0].id, first.id);
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires DATABASE_URL"]
async fn import_errors_round_trip_in_line_order(pool: sqlx::PgPool) {
    let job = create_import_job(&pool, &new_job(7)).await.unwrap();
    let rows = vec![
        ImportError {
            job_id: job.id,
            line_number: 9,
            field_name: "product".to_string(),
            error_message: "product with sku A already exists".to_string(),
            raw_data: Some("A".to_string()),
        },
        ImportError {
            job_id: job.id,
            line_number: 3,
            field_name: "price".to_string(),
            error_message: "invalid price".to_string(),
            raw_data: None,
        },
    ];

    let inserted = insert_import_errors(&pool, &rows).await.unwrap();
    assert_eq!(inserted, 2);
    assert_eq!(insert_import_errors(&pool, &[]).await.unwrap(), 0);

    let stored = list_import_errors(&pool, job.id).await.unwrap();
    assert_eq!(stored, vec![rows[1].clone(), rows[0].clone()]);
}

// ---------------------------------------------------------------------------
// Section 2: Category mappings
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires DATABASE_URL"]
async fn insert_mapping_never_replaces_an_existing_row(pool: sqlx::PgPool) {
    insert_category(&pool, 2040).await;
    insert_category(&pool, 3000).await;

    let pinned = upsert_manual_category_mapping(&pool, &mapping("home/lighting", 3000, true))
        .await
        .unwrap();
    assert!(pinned.is_manual);

    let stored = insert_category_mapping(&pool, &mapping("home/lighting", 2040, false))
        .await
        .unwrap();
    assert_eq!(stored.id, pinned.id);
    assert_eq!(stored.category_id, 3000);
    assert!(stored.is_manual);

    let fresh = insert_category_mapping(&pool, &mapping("electronics/phones", 2040, false))
        .await
        .unwrap();
    assert!(!fresh.is_manual);

    let all = list_category_mappings(&pool, 7).await.unwrap();
    let paths: Vec<&str> = all.iter().map(|m| m.normalized_path.as_str()).collect();
    assert_eq!(paths, vec!["electronics/phones", "home/lighting"]);
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires DATABASE_URL"]
async fn manual_upsert_overrides_detected_row(pool: sqlx::PgPool) {
    insert_category(&pool, 2040).await;
    insert_category(&pool, 3000).await;

    let detected = insert_category_mapping(&pool, &mapping("home/lighting", 2040, false))
        .await
        .unwrap();
    let pinned = upsert_manual_category_mapping(&pool, &mapping("home/lighting", 3000, true))
        .await
        .unwrap();

    assert_eq!(pinned.id, detected.id);
    assert_eq!(pinned.category_id, 3000);
    assert!(pinned.is_manual);
}

// ---------------------------------------------------------------------------
// Section 3: Taxonomy and products
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires DATABASE_URL"]
async fn attribute_templates_load_with_rules(pool: sqlx::PgPool) {
    sqlx::query(
        "INSERT INTO attribute_templates (code, name, value_type, validation_rules, category_ids) \
         VALUES ('screen_size', 'Screen size', 'number', '{\"min\": 1, \"max\": 100}'::jsonb, '{2040}')",
    )
    .execute(&pool)
    .await
    .unwrap();

    let templates = list_attribute_templates(&pool).await.unwrap();
    assert_eq!(templates.len(), 1);
    assert_eq!(templates[0].validation_rules.max, Some(100.0));
    assert_eq!(templates[0].category_ids, vec![2040]);
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires DATABASE_URL"]
async fn products_are_found_by_sku_within_a_storefront(pool: sqlx::PgPool) {
    let store = PgStore::new(pool);
    let mut product = ImportProductRequest::new("Lamp", Decimal::from_str("19.99").unwrap(), 2);
    product.sku = Some("L-1".to_string());
    product.category_id = Some(1001);
    product
        .attributes
        .insert("color".to_string(), AttributeValue::text("white"));

    let id = store.create(7, &product).await.unwrap();
    let found = store.get_by_sku(7, "L-1").await.unwrap().unwrap();
    assert_eq!(found.id, id);
    assert!(store.get_by_sku(8, "L-1").await.unwrap().is_none());

    product.name = "Lamp v2".to_string();
    store.update(id, &product).await.unwrap();
    let name: String = sqlx::query_scalar("SELECT name FROM storefront_products WHERE id = $1")
        .bind(id)
        .fetch_one(store.pool())
        .await
        .unwrap();
    assert_eq!(name, "Lamp v2");

    let duplicate = store.create(7, &product).await.unwrap_err();
    assert!(matches!(duplicate, StoreError::Conflict(_)));
}
