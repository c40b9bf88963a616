use validate_markup::{
    EngineError, ErrorDetail, ParseErrorKind, ResolveError, Unresolved, ValidationError,
};

#[test]
fn test_error_detail_positions() {
    let detail = ErrorDetail::with_position("Element 'chapter': not expected", Some(4), Some(3));
    assert_eq!(detail.line, Some(4));
    assert_eq!(detail.column, Some(3));
    assert_eq!(
        detail.to_string(),
        "Element 'chapter': not expected, line 4, column 3"
    );

    let bare = ErrorDetail::new("Document does not conform to its DTD schema");
    assert!(bare.line.is_none());
    assert!(bare.column.is_none());
}

#[test]
fn test_unresolved_display() {
    let unresolved = Unresolved {
        reference: "http://example.com/book.rng".to_string(),
        reason: "Request timeout".to_string(),
    };
    let text = unresolved.to_string();
    assert!(text.contains("http://example.com/book.rng"));
    assert!(text.contains("Request timeout"));
}

#[test]
fn test_syntax_error_is_distinct_from_validation() {
    let err = ValidationError::UnsupportedSyntax {
        syntax: "HTML".to_string(),
    };
    assert!(err.to_string().contains("No validating parser"));
    assert!(!matches!(err, ValidationError::NotWellFormed(_)));
}

#[test]
fn test_resolve_error_messages() {
    let cases = vec![
        (
            ResolveError::NoBaseLocation {
                locator: "book.rng".to_string(),
            },
            "book.rng",
        ),
        (
            ResolveError::UnsupportedScheme {
                scheme: "ftp".to_string(),
                url: "ftp://example.com/book.xsd".to_string(),
            },
            "ftp",
        ),
        (
            ResolveError::NotFound {
                url: "file:///schemas/missing.dtd".to_string(),
            },
            "missing.dtd",
        ),
    ];

    for (err, expected) in cases {
        assert!(
            err.to_string().contains(expected),
            "'{}' should mention '{}'",
            err,
            expected
        );
    }
}

#[test]
fn test_engine_error_kinds() {
    for kind in [
        ParseErrorKind::Dtd,
        ParseErrorKind::XmlSchema,
        ParseErrorKind::RelaxNg,
        ParseErrorKind::Schematron,
    ] {
        let err = EngineError::parse(kind, "unexpected element");
        assert!(err.to_string().contains(&kind.to_string()));
    }
}

#[test]
fn test_anyhow_interop() -> anyhow::Result<()> {
    fn fails() -> Result<(), ValidationError> {
        Err(ValidationError::Config("No stylesheet schema directory configured".to_string()))
    }

    let err = anyhow::Error::from(fails().unwrap_err());
    assert!(err.to_string().contains("stylesheet"));
    assert!(err.downcast_ref::<ValidationError>().is_some());
    Ok(())
}
