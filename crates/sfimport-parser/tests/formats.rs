use rust_decimal::Decimal;
use sfimport_core::FileType;
use sfimport_parser::{parse_file, parse_named, ParseError};

#[test]
fn dispatches_by_file_type() {
    let csv = b"name,price,currency,sku\nProduct 1,99.99,USD,SKU1\n";
    let out = parse_file(FileType::Csv, csv).unwrap();
    assert_eq!(out.products.len(), 1);
    assert_eq!(out.products[0].price, "99.99".parse::<Decimal>().unwrap());

    let xml = b"<artikli><artikal><naziv>Sto</naziv><mpCena>100,50</mpCena></artikal></artikli>";
    let out = parse_file(FileType::Xml, xml).unwrap();
    assert_eq!(out.products[0].price, "100.50".parse::<Decimal>().unwrap());
}

#[test]
fn infers_type_from_name() {
    let out = parse_named("Export.CSV", b"name,price,currency\nLamp,1,RSD\n").unwrap();
    assert_eq!(out.products.len(), 1);
}

#[test]
fn unknown_extension_is_rejected() {
    let err = parse_named("catalog.json", b"{}").unwrap_err();
    assert!(matches!(err, ParseError::UnsupportedFileType(name) if name == "catalog.json"));
}

#[test]
fn csv_without_price_header_returns_no_products() {
    let result = parse_file(FileType::Csv, b"name,currency\nLamp,RSD\nChair,RSD\n");
    assert!(matches!(result, Err(ParseError::MissingHeaders(_))));
}

#[test]
fn generic_xml_offer_records_are_accepted() {
    let xml = br#"<shop><offers>
        <offer><name>Kettle</name><price>2.499,00</price><quantity>3</quantity></offer>
        <offer><name>Toaster</name><price>1999</price><is_active>0</is_active></offer>
    </offers></shop>"#;
    let out = parse_file(FileType::Xml, xml).unwrap();
    assert_eq!(out.products.len(), 2);
    assert_eq!(out.products[0].stock_quantity, 3);
    assert_eq!(out.products[0].price, "2499.00".parse::<Decimal>().unwrap());
    assert!(!out.products[1].is_active);
}
