//! Category and attribute mapping handlers.

use std::path::Path;

use sfimport_core::FileType;
use sfimport_mapping::category::REVIEW_THRESHOLD;

use crate::files::read_catalog;
use crate::runtime::Runtime;

fn review_marker(confidence: f64) -> &'static str {
    if confidence < REVIEW_THRESHOLD {
        "review"
    } else {
        ""
    }
}

/// Pins an external path to an internal category.
///
/// # Errors
///
/// Returns an error if the path is blank, the category does not exist or the
/// mapping cannot be stored.
pub(crate) async fn run_pin(
    runtime: &Runtime,
    storefront_id: i64,
    path: &str,
    category_id: i64,
) -> anyhow::Result<()> {
    let mapping = runtime
        .categories
        .pin_mapping(storefront_id, path, category_id)
        .await?;
    println!(
        "storefront {}: '{}' -> category {}",
        mapping.storefront_id, mapping.normalized_path, mapping.category_id
    );
    Ok(())
}

/// # Errors
///
/// Returns an error if the mapping store fails.
pub(crate) async fn run_list(runtime: &Runtime, storefront_id: i64) -> anyhow::Result<()> {
    let mappings = runtime.categories.list_mappings(storefront_id).await?;
    if mappings.is_empty() {
        println!("no category mappings for storefront {storefront_id}");
        return Ok(());
    }

    println!(
        "{:<45}{:<10}{:<12}{:<8}UPDATED",
        "PATH", "CATEGORY", "CONFIDENCE", "MANUAL"
    );
    for mapping in &mappings {
        println!(
            "{:<45}{:<10}{:<12.2}{:<8}{}",
            mapping.normalized_path,
            mapping.category_id,
            mapping.confidence,
            if mapping.is_manual { "yes" } else { "no" },
            mapping.updated_at.format("%Y-%m-%d %H:%M")
        );
    }
    Ok(())
}

/// Resolves every external category in a file and prints the suggestions
/// with a quality summary. Newly detected mappings are remembered.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed.
pub(crate) async fn run_analyze_categories(
    runtime: &Runtime,
    storefront_id: i64,
    file: &Path,
    file_type: Option<FileType>,
) -> anyhow::Result<()> {
    let (file_type, bytes) = read_catalog(file, file_type)?;
    let analysis = runtime
        .service
        .analyze_categories(storefront_id, file_type, &bytes)
        .await?;

    if analysis.suggestions.is_empty() {
        println!("no external categories found in {}", file.display());
        return Ok(());
    }

    println!(
        "{:<45}{:<10}{:<12}{:<8}NOTE",
        "PATH", "CATEGORY", "CONFIDENCE", "SOURCE"
    );
    for suggestion in &analysis.suggestions {
        let source = if suggestion.is_manual {
            "manual"
        } else if suggestion.from_cache {
            "stored"
        } else {
            "new"
        };
        println!(
            "{:<45}{:<10}{:<12.2}{:<8}{}",
            suggestion.normalized_path,
            suggestion.suggested_category_id,
            suggestion.confidence,
            source,
            review_marker(suggestion.confidence)
        );
    }

    let quality = &analysis.quality;
    println!();
    println!(
        "{} paths: {} high, {} medium, {} low confidence (average {:.2})",
        quality.total, quality.high, quality.medium, quality.low, quality.average_confidence
    );
    if !quality.needs_review.is_empty() {
        println!("needs review: {}", quality.needs_review.join(", "));
    }
    Ok(())
}

/// Prints how each external attribute in a file maps onto the templates.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed.
pub(crate) async fn run_analyze_attributes(
    runtime: &Runtime,
    file: &Path,
    file_type: Option<FileType>,
) -> anyhow::Result<()> {
    let (file_type, bytes) = read_catalog(file, file_type)?;
    let mapped = runtime.service.analyze_attributes(file_type, &bytes).await?;

    if mapped.is_empty() {
        println!("no extra attributes found in {}", file.display());
        return Ok(());
    }

    println!(
        "{:<25}{:<25}{:<12}{:<6}VALUE",
        "EXTERNAL", "CODE", "CONFIDENCE", "NEW"
    );
    for attribute in &mapped {
        println!(
            "{:<25}{:<25}{:<12.2}{:<6}{}",
            attribute.external_name,
            attribute.storage_code(),
            attribute.confidence,
            if attribute.is_new_attribute { "yes" } else { "no" },
            attribute.value
        );
    }
    Ok(())
}
