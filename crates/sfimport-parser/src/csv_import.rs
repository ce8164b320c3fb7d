//! CSV catalog reader.
//!
//! The first row is the header. Header names are matched case-insensitively
//! and `name`, `price` and `currency` must all be present, otherwise the whole
//! file is rejected. Rows are parsed independently; a bad row yields
//! validation errors and is left out of the product list.

use sfimport_core::ImportValidationError;

use crate::error::ParseError;
use crate::fields::strip_bom;
use crate::record::{product_from_fields, FieldMap, CSV_COLUMNS};
use crate::ParseOutput;

const REQUIRED_HEADERS: [&str; 3] = ["name", "price", "currency"];

/// Parses a CSV catalog.
///
/// # Errors
///
/// Returns [`ParseError::EmptyFile`] for a blank file,
/// [`ParseError::MissingHeaders`] when a required column is absent and
/// [`ParseError::Csv`] when the header row cannot be read.
pub fn parse_csv(bytes: &[u8]) -> Result<ParseOutput, ParseError> {
    let bytes = strip_bom(bytes);
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Err(ParseError::EmptyFile);
    }

    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(bytes);

    let headers: Vec<String> = reader
        .headers()?
        .iter()
        .map(|h| h.trim().to_lowercase())
        .collect();

    let missing: Vec<String> = REQUIRED_HEADERS
        .iter()
        .filter(|required| !headers.iter().any(|h| h == *required))
        .map(|required| (*required).to_string())
        .collect();
    if !missing.is_empty() {
        return Err(ParseError::MissingHeaders(missing));
    }

    let mut output = ParseOutput::default();
    for (idx, result) in reader.records().enumerate() {
        let fallback_line = idx.saturating_add(2);
        let record = match result {
            Ok(record) => record,
            Err(e) => {
                let line = e
                    .position()
                    .and_then(|p| usize::try_from(p.line()).ok())
                    .unwrap_or(fallback_line);
                output.errors.push(ImportValidationError::new(
                    to_line(line),
                    "row",
                    format!("unreadable row: {e}"),
                    None,
                ));
                continue;
            }
        };
        if record.iter().all(str::is_empty) {
            continue;
        }

        let line = record
            .position()
            .and_then(|p| usize::try_from(p.line()).ok())
            .unwrap_or(fallback_line);

        let fields: FieldMap = headers
            .iter()
            .zip(record.iter())
            .filter(|(header, _)| !header.is_empty())
            .map(|(header, value)| (header.clone(), value.to_string()))
            .collect();

        match product_from_fields(&fields, to_line(line)) {
            Ok(product) => output.products.push(product),
            Err(errors) => output.errors.extend(errors),
        }
    }

    Ok(output)
}

fn to_line(line: usize) -> i32 {
    i32::try_from(line).unwrap_or(i32::MAX)
}

/// Header row plus two example rows, offered to storefront owners as a
/// starting point.
#[must_use]
pub fn csv_template() -> String {
    let header = CSV_COLUMNS.join(",");
    format!(
        "{header}\n\
         Majica pamučna crvena M,1990.00,RSD,TS-001-RED-M,Pamučna majica kratkih rukava,1200.00,Odeća/Majice,25,8600123456789,\"https://cdn.example.com/ts-001-red.jpg,https://cdn.example.com/ts-001-red-back.jpg\",true,false,,Basic,TS-001,Srbija\n\
         Majica pamučna plava M,1990.00,RSD,TS-001-BLUE-M,Pamučna majica kratkih rukava,1200.00,Odeća/Majice,12,8600123456796,https://cdn.example.com/ts-001-blue.jpg,true,true,1590.00,Basic,TS-001,Srbija\n"
    )
}
