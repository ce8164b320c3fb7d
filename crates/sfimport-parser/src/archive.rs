//! ZIP bundles of XML and CSV catalogs.

use std::io::{Cursor, Read};

use sfimport_core::{FileType, ImportValidationError};

use crate::error::ParseError;
use crate::{csv_import, xml_import, ParseOutput};

/// Entries macOS adds to archives; never catalog data.
fn is_resource_fork(name: &str) -> bool {
    name.starts_with("__MACOSX/")
        || name
            .rsplit('/')
            .next()
            .is_some_and(|base| base.starts_with("._"))
}

fn entry_error(name: &str, e: &dyn std::fmt::Display) -> ImportValidationError {
    let mut error = ImportValidationError::new(0, "file", format!("{name}: {e}"), Some(name));
    error.source = Some(name.to_string());
    error
}

/// Parses every XML and CSV entry of a ZIP archive and concatenates the
/// results.
///
/// Line numbers restart in every entry, so each record and error is tagged
/// with the entry name it came from.
///
/// Directories, unsupported extensions and nested archives are skipped. An
/// entry that cannot be read or fails fatally is reported as a validation
/// error on field `file` and does not stop the remaining entries.
///
/// # Errors
///
/// Returns [`ParseError::Zip`] when the container itself is unreadable.
pub fn parse_zip(bytes: &[u8]) -> Result<ParseOutput, ParseError> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))?;
    let mut output = ParseOutput::default();

    for index in 0..archive.len() {
        let mut entry = match archive.by_index(index) {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(index, error = %e, "skipping unreadable archive entry");
                output.errors.push(ImportValidationError::new(
                    0,
                    "file",
                    format!("entry #{index} could not be read: {e}"),
                    None,
                ));
                continue;
            }
        };
        let name = entry.name().to_string();
        if entry.is_dir() || is_resource_fork(&name) {
            continue;
        }

        let file_type = match FileType::from_file_name(&name) {
            Some(file_type @ (FileType::Xml | FileType::Csv)) => file_type,
            _ => {
                tracing::debug!(entry = %name, "skipping unsupported archive entry");
                continue;
            }
        };

        let mut buf = Vec::new();
        if let Err(e) = entry.read_to_end(&mut buf) {
            tracing::warn!(entry = %name, error = %e, "failed to read archive entry");
            output.errors.push(entry_error(&name, &e));
            continue;
        }

        let parsed = match file_type {
            FileType::Csv => csv_import::parse_csv(&buf),
            _ => xml_import::parse_xml(&buf),
        };
        match parsed {
            Ok(mut entry_output) => {
                entry_output.tag_source(&name);
                tracing::debug!(
                    entry = %name,
                    products = entry_output.products.len(),
                    errors = entry_output.errors.len(),
                    "parsed archive entry"
                );
                output.extend(entry_output);
            }
            Err(e) => {
                tracing::warn!(entry = %name, error = %e, "archive entry rejected");
                output.errors.push(entry_error(&name, &e));
            }
        }
    }

    Ok(output)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use zip::write::FileOptions;
    use zip::CompressionMethod;

    use super::*;

    fn build_zip(entries: &[(&str, &str)]) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        let options = FileOptions::default().compression_method(CompressionMethod::Stored);
        for (name, body) in entries {
            if name.ends_with('/') {
                writer.add_directory(*name, options).unwrap();
            } else {
                writer.start_file(*name, options).unwrap();
                writer.write_all(body.as_bytes()).unwrap();
            }
        }
        writer.finish().unwrap().into_inner()
    }

    #[test]
    fn concatenates_supported_entries() {
        let bytes = build_zip(&[
            ("catalog/", ""),
            ("catalog/a.csv", "name,price,currency\nLamp,10,RSD\n"),
            (
                "catalog/b.XML",
                "<artikli><artikal><naziv>Sto</naziv><mpCena>100</mpCena></artikal></artikli>",
            ),
            ("catalog/readme.txt", "ignore me"),
            ("__MACOSX/catalog/._a.csv", "junk"),
        ]);
        let out = parse_zip(&bytes).unwrap();
        let names: Vec<&str> = out.products.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["Lamp", "Sto"]);
        assert!(out.errors.is_empty(), "{:?}", out.errors);
    }

    #[test]
    fn fatal_entry_becomes_file_error() {
        let bytes = build_zip(&[
            ("bad.csv", "name,currency\nLamp,RSD\n"),
            ("good.csv", "name,price,currency\nChair,20,RSD\n"),
        ]);
        let out = parse_zip(&bytes).unwrap();
        assert_eq!(out.products.len(), 1);
        assert_eq!(out.errors.len(), 1);
        assert_eq!(out.errors[0].field, "file");
        assert_eq!(out.errors[0].value.as_deref(), Some("bad.csv"));
        assert_eq!(out.errors[0].source.as_deref(), Some("bad.csv"));
        assert!(out.errors[0].message.contains("price"));
    }

    #[test]
    fn rows_from_different_entries_keep_their_entry() {
        let bytes = build_zip(&[
            ("a.csv", "name,price,currency\nLamp,10,RSD\n,abc,RSD\n"),
            ("b.csv", "name,price,currency\nChair,20,RSD\n,abc,RSD\n"),
        ]);
        let out = parse_zip(&bytes).unwrap();
        assert_eq!(out.products[0].source.as_deref(), Some("a.csv"));
        assert_eq!(out.products[1].source.as_deref(), Some("b.csv"));
        assert!(out.errors.iter().all(|e| e.line_number == 3));

        let summary = crate::summarize(&out);
        assert_eq!(summary.total_records, 4);
        assert_eq!(summary.valid_records, 2);
        assert_eq!(summary.invalid_records, 2);

        let preview = crate::preview_records(&out, 10);
        assert_eq!(preview.len(), 4);
        let names: Vec<&str> = preview
            .iter()
            .filter_map(|r| r.product.as_ref().map(|p| p.name.as_str()))
            .collect();
        assert_eq!(names, vec!["Lamp", "Chair"]);
        assert_eq!(preview[1].source.as_deref(), Some("a.csv"));
        assert!(!preview[1].is_valid());
        assert_eq!(preview[3].source.as_deref(), Some("b.csv"));
        assert!(!preview[3].is_valid());
    }

    #[test]
    fn not_a_zip_is_fatal() {
        assert!(matches!(parse_zip(b"definitely not a zip"), Err(ParseError::Zip(_))));
    }
}
