//! XML catalog reader.
//!
//! Two layouts are understood. The localized supplier layout (`<artikli>` with
//! `<artikal>` records and Serbian field names) is tried first. Anything else
//! falls back to the generic layout, where `<product>`, `<item>` or `<offer>`
//! elements carry children named like the CSV columns.

use std::collections::BTreeMap;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use sfimport_core::{AttributeValue, ImportProductRequest, ImportValidationError};
use sfimport_core::ORIGINAL_CATEGORY_ATTRIBUTE;

use crate::error::ParseError;
use crate::fields::{
    is_explicit_false, is_truthy, parse_decimal, split_urls, strip_bom, strip_cdata,
};
use crate::record::{parse_price_field, product_from_fields, FieldMap, DEFAULT_CURRENCY};
use crate::ParseOutput;

const LOCALIZED_ROOT: &str = "artikli";
const LOCALIZED_RECORD: &str = "artikal";
const GENERIC_RECORDS: [&str; 3] = ["product", "item", "offer"];

/// Localized fields carried over as attributes, with their attribute codes.
const LOCALIZED_ATTRIBUTES: [(&str, &str); 4] = [
    ("id", "external_id"),
    ("uvoznik", "importer"),
    ("godinaUvoza", "import_year"),
    ("zemljaPorekla", "country_of_origin"),
];

/// Child element aliases accepted by the generic layout.
const GENERIC_ALIASES: [(&str, &str); 6] = [
    ("title", "name"),
    ("image", "image_url"),
    ("picture", "image_url"),
    ("quantity", "stock_quantity"),
    ("stock", "stock_quantity"),
    ("category_path", "category"),
];

/// All text found under one record element, keyed by the local name of the
/// element that contained it.
#[derive(Debug, Default)]
struct RawRecord {
    fields: BTreeMap<String, Vec<String>>,
}

impl RawRecord {
    fn open_field(&mut self, name: &str) {
        self.fields.entry(name.to_string()).or_default().push(String::new());
    }

    fn append(&mut self, name: &str, text: &str) {
        let values = self.fields.entry(name.to_string()).or_default();
        match values.last_mut() {
            Some(last) => last.push_str(text),
            None => values.push(text.to_string()),
        }
    }

    fn absorb_attributes(&mut self, element: &BytesStart<'_>) {
        for attr in element.attributes().flatten() {
            let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
            if let Ok(value) = attr.unescape_value() {
                self.fields.entry(key).or_default().push(value.into_owned());
            }
        }
    }

    /// Cleaned, non-empty values of a field in document order.
    fn values<'a>(&'a self, name: &str) -> impl Iterator<Item = String> + 'a {
        self.fields
            .get(name)
            .into_iter()
            .flatten()
            .map(|v| strip_cdata(v))
            .filter(|v| !v.is_empty())
    }

    fn first(&self, name: &str) -> Option<String> {
        self.values(name).next()
    }
}

struct Collected {
    root: Option<String>,
    records: Vec<RawRecord>,
}

fn local_name(element: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(element.local_name().as_ref()).into_owned()
}

/// Walks the document once, collecting every top-level record element
/// accepted by `is_record`.
fn collect_records(xml: &str, is_record: impl Fn(&str) -> bool) -> Result<Collected, ParseError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut root = None;
    let mut stack: Vec<String> = Vec::new();
    let mut current: Option<(usize, RawRecord)> = None;
    let mut records = Vec::new();

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                let name = local_name(&e);
                if root.is_none() {
                    root = Some(name.clone());
                }
                if let Some((_, record)) = current.as_mut() {
                    record.open_field(&name);
                } else if is_record(&name) {
                    let mut record = RawRecord::default();
                    record.absorb_attributes(&e);
                    current = Some((stack.len(), record));
                }
                stack.push(name);
            }
            Event::Empty(e) => {
                let name = local_name(&e);
                if root.is_none() {
                    root = Some(name.clone());
                }
                if current.is_none() && is_record(&name) {
                    let mut record = RawRecord::default();
                    record.absorb_attributes(&e);
                    records.push(record);
                }
            }
            Event::End(_) => {
                stack.pop();
                if current.as_ref().is_some_and(|(depth, _)| *depth == stack.len()) {
                    if let Some((_, record)) = current.take() {
                        records.push(record);
                    }
                }
            }
            Event::Text(e) => {
                if let Some((depth, record)) = current.as_mut() {
                    if stack.len() > *depth + 1 {
                        let text = e.unescape().map_err(quick_xml::Error::from)?;
                        if let Some(field) = stack.last() {
                            record.append(field, &text);
                        }
                    }
                }
            }
            Event::CData(e) => {
                if let Some((depth, record)) = current.as_mut() {
                    if stack.len() > *depth + 1 {
                        let text = String::from_utf8_lossy(&e).into_owned();
                        if let Some(field) = stack.last() {
                            record.append(field, &text);
                        }
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(Collected { root, records })
}

/// Parses an XML catalog in either supported layout.
///
/// # Errors
///
/// Returns [`ParseError::EmptyFile`] for a blank document,
/// [`ParseError::Encoding`] for non UTF-8 input, [`ParseError::Xml`] for
/// malformed markup and [`ParseError::UnrecognizedSchema`] when neither
/// layout finds any record.
pub fn parse_xml(bytes: &[u8]) -> Result<ParseOutput, ParseError> {
    let xml = std::str::from_utf8(strip_bom(bytes))?;
    if xml.trim().is_empty() {
        return Err(ParseError::EmptyFile);
    }

    let localized = collect_records(xml, |name| name == LOCALIZED_RECORD)?;
    if localized.root.as_deref() == Some(LOCALIZED_ROOT) {
        return Ok(build_output(&localized.records, localized_product));
    }

    let generic = collect_records(xml, |name| {
        GENERIC_RECORDS
            .iter()
            .any(|candidate| name.eq_ignore_ascii_case(candidate))
    })?;
    if generic.records.is_empty() {
        return Err(ParseError::UnrecognizedSchema);
    }
    Ok(build_output(&generic.records, generic_product))
}

fn build_output(
    records: &[RawRecord],
    convert: fn(&RawRecord, i32) -> Result<ImportProductRequest, Vec<ImportValidationError>>,
) -> ParseOutput {
    let mut output = ParseOutput::default();
    for (idx, record) in records.iter().enumerate() {
        let line = i32::try_from(idx + 1).unwrap_or(i32::MAX);
        match convert(record, line) {
            Ok(product) => output.products.push(product),
            Err(errors) => output.errors.extend(errors),
        }
    }
    output
}

/// Converts an `<artikal>` record.
///
/// `mpCena` is the retail price. When it is missing or zero the wholesale
/// `vpCena` stands in so the record is still importable.
fn localized_product(
    record: &RawRecord,
    line: i32,
) -> Result<ImportProductRequest, Vec<ImportValidationError>> {
    let mut errors = Vec::new();

    let name = record.first("naziv");
    if name.is_none() {
        errors.push(ImportValidationError::new(
            line,
            "name",
            "naziv is required",
            None,
        ));
    }

    let retail_raw = record.first("mpCena");
    let wholesale_raw = record.first("vpCena");
    let wholesale = wholesale_raw.as_deref().and_then(parse_decimal);

    let retail = match parse_price_field(retail_raw.as_deref(), "price", line) {
        Ok(value) => value,
        Err(e) => {
            if wholesale.is_none() {
                errors.push(e);
            }
            None
        }
    };
    let price = retail
        .filter(|p| !p.is_zero())
        .or(wholesale.filter(|w| w.is_sign_positive() && !w.is_zero()))
        .or(retail);
    if price.is_none() && errors.iter().all(|e| e.field != "price") {
        errors.push(ImportValidationError::new(
            line,
            "price",
            "mpCena is required",
            None,
        ));
    }

    let (Some(name), Some(price)) = (name, price) else {
        return Err(errors);
    };

    let mut product = ImportProductRequest::new(name, price, line);
    product.currency = DEFAULT_CURRENCY.to_string();
    product.wholesale_price = wholesale.filter(|w| w.is_sign_positive());
    product.sku = record.first("sifra");
    product.barcode = record.first("barKod");
    product.description = record.first("opis");
    product.is_active = !record.first("dostupan").is_some_and(|v| is_explicit_false(&v));
    product.on_sale = record.first("naAkciji").is_some_and(|v| is_truthy(&v));
    product.image_urls = record
        .values("slika")
        .chain(record.values("slike"))
        .flat_map(|raw| split_urls(&raw).collect::<Vec<_>>())
        .collect();

    let path: Vec<String> = ["kategorija1", "kategorija2", "kategorija3"]
        .iter()
        .filter_map(|field| record.first(field))
        .collect();
    if !path.is_empty() {
        product.attributes.insert(
            ORIGINAL_CATEGORY_ATTRIBUTE.to_string(),
            AttributeValue::text(path.join("/")),
        );
    }
    for (field, code) in LOCALIZED_ATTRIBUTES {
        if let Some(value) = record.first(field) {
            product
                .attributes
                .insert(code.to_string(), AttributeValue::text(value));
        }
    }

    Ok(product)
}

/// Converts a generic `<product>`/`<item>`/`<offer>` record by flattening it
/// to CSV columns.
fn generic_product(
    record: &RawRecord,
    line: i32,
) -> Result<ImportProductRequest, Vec<ImportValidationError>> {
    let mut fields = FieldMap::new();
    for name in record.fields.keys() {
        let column = GENERIC_ALIASES
            .iter()
            .find(|(alias, _)| name.eq_ignore_ascii_case(alias))
            .map_or_else(|| name.to_lowercase(), |(_, column)| (*column).to_string());

        if column == "image_url" {
            let urls: Vec<String> = record.values(name).collect();
            if !urls.is_empty() {
                let joined = fields
                    .remove("image_url")
                    .into_iter()
                    .chain(urls)
                    .collect::<Vec<_>>()
                    .join(",");
                fields.insert(column, joined);
            }
            continue;
        }
        if fields.contains_key(&column) {
            continue;
        }
        if let Some(value) = record.first(name) {
            fields.insert(column, value);
        }
    }
    product_from_fields(&fields, line)
}
