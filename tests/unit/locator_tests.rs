use url::Url;

use validate_markup::{
    Candidate, Document, Locator, Origin, ResourceResolver, SchemaKind, SchemaLocator, namespaces,
};

fn kinds(candidates: &[Candidate]) -> Vec<Option<SchemaKind>> {
    candidates
        .iter()
        .map(|candidate| match candidate {
            Candidate::Reference(reference) => Some(reference.kind),
            Candidate::Unmatched { .. } => None,
        })
        .collect()
}

#[test]
fn test_full_precedence_chain() {
    let xml = format!(
        r#"<?xml version="1.0"?>
<?xml-model href="book.sch" schematypens="{sch}"?>
<!DOCTYPE book PUBLIC "-//Example//DTD Book//EN" "book.dtd">
<?xml-model href="book.rng"?>
<book xmlns="urn:book" xmlns:xsi="{xsi}" xsi:schemaLocation="urn:book book.xsd urn:other other.xsd"/>"#,
        sch = namespaces::ISO_SCHEMATRON,
        xsi = namespaces::XSI,
    );
    let document = Document::parse(xml, None).unwrap();
    let candidates = SchemaLocator::new().locate(&document);

    assert_eq!(
        kinds(&candidates),
        vec![
            Some(SchemaKind::Dtd),
            Some(SchemaKind::XmlSchema),
            Some(SchemaKind::XmlSchema),
            Some(SchemaKind::Schematron),
            Some(SchemaKind::RelaxNg),
        ]
    );

    // Namespace-keyed location before the last token
    match (&candidates[1], &candidates[2]) {
        (Candidate::Reference(keyed), Candidate::Reference(last)) => {
            assert_eq!(keyed.locator, Locator::Uri("book.xsd".to_string()));
            assert_eq!(last.locator, Locator::Uri("other.xsd".to_string()));
            assert_eq!(keyed.origin, Origin::InstanceAttribute);
        }
        other => panic!("Expected two references, got {:?}", other),
    }
}

#[test]
fn test_unknown_namespace_is_unmatched() {
    let document = Document::parse(
        r#"<?xml-model href="book.rng" schematypens="urn:not-a-schema-language"?><book/>"#,
        None,
    )
    .unwrap();

    let candidates = SchemaLocator::new().locate(&document);
    assert_eq!(kinds(&candidates), vec![None]);
}

#[test]
fn test_relative_locators_need_a_base() {
    let base = Url::parse("file:///library/books/rust.xml").unwrap();

    assert_eq!(
        ResourceResolver::resolve("../schemas/book.rng", Some(&base))
            .unwrap()
            .as_str(),
        "file:///library/schemas/book.rng"
    );
    assert!(ResourceResolver::resolve("../schemas/book.rng", None).is_err());
    assert!(ResourceResolver::resolve("https://example.com/book.rng", None).is_ok());
}
