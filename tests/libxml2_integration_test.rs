use std::sync::Arc;
use std::thread;

use validate_markup::{EngineError, LibXml2Wrapper, ValidationResult};

mod common;
use common::test_helpers::TestFixtures;

const SIMPLE_XSD: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
    <xs:element name="root" type="xs:string"/>
</xs:schema>"#;

const VALID_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<root>Hello World</root>"#;

const INVALID_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<root><invalid>content</invalid></root>"#;

#[test]
fn test_xsd_validation_success() {
    let wrapper = LibXml2Wrapper::new();

    let schema = wrapper
        .compile_xsd(SIMPLE_XSD.as_bytes(), "file:///schemas/simple.xsd")
        .unwrap();
    let doc = wrapper.parse_document(VALID_XML.as_bytes(), None).unwrap();

    let result = wrapper.validate_xsd(&schema, &doc).unwrap();
    assert_eq!(result, ValidationResult::Valid);
    assert!(result.is_valid());
}

#[test]
fn test_xsd_validation_failure_has_position() {
    let wrapper = LibXml2Wrapper::new();

    let schema = wrapper
        .compile_xsd(SIMPLE_XSD.as_bytes(), "file:///schemas/simple.xsd")
        .unwrap();
    let doc = wrapper.parse_document(INVALID_XML.as_bytes(), None).unwrap();

    let result = wrapper.validate_xsd(&schema, &doc).unwrap();
    assert!(result.is_invalid());
    match result {
        ValidationResult::Invalid { errors, .. } => {
            assert!(!errors.is_empty());
            assert_eq!(errors[0].line, Some(2));
        }
        other => panic!("Expected Invalid, got {:?}", other),
    }
}

#[test]
fn test_parse_error_reports_position() {
    let wrapper = LibXml2Wrapper::new();
    let fixtures = TestFixtures::new();
    let content = std::fs::read(fixtures.document("malformed.xml")).unwrap();

    let diagnostic = wrapper.parse_document(&content, None).unwrap_err();
    assert!(diagnostic.line.is_some());
    assert!(!diagnostic.message.is_empty());
}

#[test]
fn test_fixture_schemas_compile() {
    let wrapper = LibXml2Wrapper::new();
    let fixtures = TestFixtures::new();

    wrapper
        .compile_xsd(
            &fixtures.schema_bytes("book.xsd"),
            fixtures.schema_url("book.xsd").as_str(),
        )
        .unwrap();
    wrapper
        .compile_relaxng(
            &fixtures.schema_bytes("book.rng"),
            fixtures.schema_url("book.rng").as_str(),
        )
        .unwrap();
    wrapper
        .compile_schematron(
            &fixtures.schema_bytes("book.sch"),
            fixtures.schema_url("book.sch").as_str(),
        )
        .unwrap();
    wrapper.compile_dtd(&fixtures.schema_bytes("book.dtd")).unwrap();
}

#[test]
fn test_grammar_without_start_fails_to_compile() {
    let wrapper = LibXml2Wrapper::new();
    let fixtures = TestFixtures::new();

    let err = wrapper
        .compile_relaxng(
            &fixtures.schema_bytes("broken.rng"),
            fixtures.schema_url("broken.rng").as_str(),
        )
        .unwrap_err();
    assert!(matches!(err, EngineError::SchemaParse { .. }));
}

#[test]
fn test_dtd_validation() {
    let wrapper = LibXml2Wrapper::new();
    let fixtures = TestFixtures::new();
    let dtd = wrapper.compile_dtd(&fixtures.schema_bytes("book.dtd")).unwrap();

    let valid = wrapper
        .parse_document(b"<book><title>T</title><chapter>C</chapter></book>", None)
        .unwrap();
    assert!(wrapper.validate_dtd(&dtd, &valid).unwrap().is_valid());

    let invalid = wrapper
        .parse_document(b"<book>\n<chapter>C</chapter>\n</book>", None)
        .unwrap();
    assert!(wrapper.validate_dtd(&dtd, &invalid).unwrap().is_invalid());
}

#[test]
fn test_schematron_failure_carries_report_text() {
    let wrapper = LibXml2Wrapper::new();
    let fixtures = TestFixtures::new();
    let schema = wrapper
        .compile_schematron(
            &fixtures.schema_bytes("book.sch"),
            fixtures.schema_url("book.sch").as_str(),
        )
        .unwrap();

    let doc = wrapper
        .parse_document(
            b"<book>\n<title>T</title>\n<chapter> </chapter>\n</book>",
            None,
        )
        .unwrap();

    match wrapper.validate_schematron(&schema, &doc).unwrap() {
        ValidationResult::Invalid { errors, .. } => {
            let first = &errors[0];
            assert_eq!(first.line, Some(3));
            assert!(
                first
                    .report
                    .as_deref()
                    .unwrap_or(&first.message)
                    .contains("This chapter has no content")
            );
        }
        other => panic!("Expected Invalid, got {:?}", other),
    }
}

#[test]
fn test_xpath_queries() {
    let wrapper = LibXml2Wrapper::new();
    let doc = wrapper
        .parse_document(
            br#"<?xml-model href="a.rng"?><?other x="1"?><book version="2.0"><chapter/><chapter/></book>"#,
            None,
        )
        .unwrap();

    assert_eq!(
        wrapper.xpath_string(&doc, "string(/*/@version)", &[]).as_deref(),
        Some("2.0")
    );
    assert_eq!(wrapper.xpath_count(&doc, "count(//chapter)"), 2);
    assert_eq!(wrapper.xpath_count(&doc, "count(/processing-instruction())"), 2);
}

#[test]
fn test_concurrent_validations_share_schema() {
    let wrapper = LibXml2Wrapper::new();
    let schema = Arc::new(
        wrapper
            .compile_xsd(SIMPLE_XSD.as_bytes(), "file:///schemas/simple.xsd")
            .unwrap(),
    );

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let schema = Arc::clone(&schema);
            thread::spawn(move || {
                let wrapper = LibXml2Wrapper::new();
                let content = if i % 2 == 0 { VALID_XML } else { INVALID_XML };
                let doc = wrapper.parse_document(content.as_bytes(), None).unwrap();
                (i, wrapper.validate_xsd(&schema, &doc).unwrap())
            })
        })
        .collect();

    for handle in handles {
        let (i, result) = handle.join().unwrap();
        assert_eq!(result.is_valid(), i % 2 == 0);
    }
}

#[test]
fn test_unknown_public_id_has_no_catalog_entry() {
    let wrapper = LibXml2Wrapper::new();
    assert!(
        wrapper
            .resolve_public("-//Nobody//DTD Nothing At All 0.0//EN")
            .is_none()
    );
}
