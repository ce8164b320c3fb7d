//! Dry-run views over a parse result. Nothing here touches storage.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use sfimport_core::{ImportProductRequest, ImportValidationError};

use crate::ParseOutput;

/// Totals reported by a validation-only run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationSummary {
    pub total_records: usize,
    pub valid_records: usize,
    pub invalid_records: usize,
    pub errors: Vec<ImportValidationError>,
}

/// One source record as seen by the operator before committing an import.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordPreview {
    pub line_number: i32,
    /// Archive entry of the record, when the file was a ZIP bundle.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    pub product: Option<ImportProductRequest>,
    pub errors: Vec<ImportValidationError>,
}

impl RecordPreview {
    fn empty(source: Option<&str>, line_number: i32) -> Self {
        Self {
            line_number,
            source: source.map(str::to_owned),
            product: None,
            errors: Vec::new(),
        }
    }

    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty() && self.product.is_some()
    }
}

/// Summarises a parse result.
///
/// Invalid records are counted by distinct (entry, line) pair; file-level
/// errors from archive entries (line `0`) count once each.
#[must_use]
pub fn summarize(output: &ParseOutput) -> ValidationSummary {
    let invalid_records = output.invalid_record_count();
    ValidationSummary {
        total_records: output.products.len() + invalid_records,
        valid_records: output.products.len(),
        invalid_records,
        errors: output.errors.clone(),
    }
}

/// Position of a record: archive entry in order of appearance, then line.
type RecordKey = (usize, i32);

struct EntryOrder<'a> {
    seen: Vec<Option<&'a str>>,
}

impl<'a> EntryOrder<'a> {
    fn key(&mut self, source: Option<&'a str>, line_number: i32) -> RecordKey {
        let index = match self.seen.iter().position(|s| *s == source) {
            Some(index) => index,
            None => {
                self.seen.push(source);
                self.seen.len() - 1
            }
        };
        (index, line_number)
    }
}

/// Returns the first `limit` records in file order, valid or not.
#[must_use]
pub fn preview_records(output: &ParseOutput, limit: usize) -> Vec<RecordPreview> {
    let mut order = EntryOrder { seen: Vec::new() };
    let mut records: BTreeMap<RecordKey, RecordPreview> = BTreeMap::new();
    for product in &output.products {
        let source = product.source.as_deref();
        records
            .entry(order.key(source, product.line_number))
            .or_insert_with(|| RecordPreview::empty(source, product.line_number))
            .product = Some(product.clone());
    }
    for error in output.errors.iter().filter(|e| e.line_number > 0) {
        let source = error.source.as_deref();
        records
            .entry(order.key(source, error.line_number))
            .or_insert_with(|| RecordPreview::empty(source, error.line_number))
            .errors
            .push(error.clone());
    }
    records.into_values().take(limit).collect()
}

impl ParseOutput {
    /// Number of records rejected during parsing.
    #[must_use]
    pub fn invalid_record_count(&self) -> usize {
        let rows: BTreeSet<(Option<&str>, i32)> = self
            .errors
            .iter()
            .filter(|e| e.line_number > 0)
            .map(|e| (e.source.as_deref(), e.line_number))
            .collect();
        let file_level = self.errors.iter().filter(|e| e.line_number <= 0).count();
        rows.len() + file_level
    }
}
