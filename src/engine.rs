//! Schema engines: compiling schema sources into reusable validators.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::document::Document;
use crate::error::{EngineError, EngineResult};
use crate::libxml2::{
    Diagnostic, DtdPtr, LibXml2Wrapper, RelaxNgPtr, SchematronPtr, ValidationResult,
    XML_SCHEMATRONV_REPORT, XmlSchemaPtr,
};
use crate::registry::{ConstructionStrategy, ReportStyle, SchemaKind, namespaces};

/// A compiled schema, immutable once built
pub trait Validator: Send + Sync + fmt::Debug {
    fn kind(&self) -> SchemaKind;

    /// Check `document`, returning the validator's native failure shape
    fn validate(&self, document: &Document) -> Result<(), EngineFailure>;
}

/// Shared compiled validator, as stored in the cache
pub type ValidatorHandle = Arc<dyn Validator>;

/// Where schema content comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaSource {
    /// Fetched schema bytes and the absolute URI they were read from
    Bytes { uri: String, data: Vec<u8> },
    /// The document's own internal DTD subset
    InlineSubset,
}

impl SchemaSource {
    pub fn bytes(uri: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        SchemaSource::Bytes {
            uri: uri.into(),
            data: data.into(),
        }
    }
}

/// Failure reported by a validator, before normalization
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineFailure {
    /// Error log entries with native positions
    Diagnostics(Vec<Diagnostic>),
    /// An SVRL report plus the error log entry that accompanied it
    Report {
        svrl: String,
        diagnostic: Option<Diagnostic>,
    },
    /// A resource the schema needs could not be read
    Resource { uri: String, details: String },
    /// The engine failed without judging the document
    Internal { details: String },
}

/// Compiles schema sources
pub trait SchemaEngine: Send + Sync {
    fn compile(
        &self,
        strategy: &ConstructionStrategy,
        source: &SchemaSource,
    ) -> EngineResult<ValidatorHandle>;
}

/// Schema engine backed by libxml2
#[derive(Default)]
pub struct Libxml2Engine {
    wrapper: LibXml2Wrapper,
}

impl Libxml2Engine {
    pub fn new() -> Self {
        Self {
            wrapper: LibXml2Wrapper::new(),
        }
    }
}

impl SchemaEngine for Libxml2Engine {
    fn compile(
        &self,
        strategy: &ConstructionStrategy,
        source: &SchemaSource,
    ) -> EngineResult<ValidatorHandle> {
        let (uri, data) = match source {
            SchemaSource::InlineSubset if strategy.kind == SchemaKind::Dtd => {
                return Ok(Arc::new(InlineSubsetValidator));
            }
            SchemaSource::InlineSubset => {
                return Err(EngineError::UnsupportedSource {
                    kind: strategy.parse_error,
                });
            }
            SchemaSource::Bytes { uri, data } => (uri.as_str(), data.as_slice()),
        };

        let handle: ValidatorHandle = match strategy.kind {
            SchemaKind::Dtd => Arc::new(DtdValidator {
                dtd: self.wrapper.compile_dtd(data)?,
                guard: Mutex::new(()),
            }),
            SchemaKind::XmlSchema => Arc::new(XsdValidator {
                schema: self.wrapper.compile_xsd(data, uri)?,
            }),
            SchemaKind::RelaxNg => Arc::new(RelaxNgValidator {
                schema: self.wrapper.compile_relaxng(data, uri)?,
            }),
            SchemaKind::Schematron | SchemaKind::PreIsoSchematron => Arc::new(SchematronValidator {
                kind: strategy.kind,
                schema: self.wrapper.compile_schematron(data, uri)?,
                report: strategy.report,
            }),
        };
        Ok(handle)
    }
}

fn into_outcome(result: EngineResult<ValidationResult>) -> Result<(), EngineFailure> {
    match result {
        Ok(ValidationResult::Valid) => Ok(()),
        Ok(ValidationResult::Invalid { errors, .. }) => Err(EngineFailure::Diagnostics(errors)),
        Ok(ValidationResult::InternalError { code, errors }) => Err(EngineFailure::Internal {
            details: errors
                .into_iter()
                .next()
                .map(|d| d.message)
                .unwrap_or_else(|| format!("libxml2 returned {}", code)),
        }),
        Err(err) => Err(EngineFailure::Internal {
            details: err.to_string(),
        }),
    }
}

#[derive(Debug)]
struct XsdValidator {
    schema: XmlSchemaPtr,
}

impl Validator for XsdValidator {
    fn kind(&self) -> SchemaKind {
        SchemaKind::XmlSchema
    }

    fn validate(&self, document: &Document) -> Result<(), EngineFailure> {
        let wrapper = LibXml2Wrapper::new();
        into_outcome(document.with_tree(|tree| wrapper.validate_xsd(&self.schema, tree)))
    }
}

#[derive(Debug)]
struct RelaxNgValidator {
    schema: RelaxNgPtr,
}

impl Validator for RelaxNgValidator {
    fn kind(&self) -> SchemaKind {
        SchemaKind::RelaxNg
    }

    fn validate(&self, document: &Document) -> Result<(), EngineFailure> {
        let wrapper = LibXml2Wrapper::new();
        into_outcome(document.with_tree(|tree| wrapper.validate_relaxng(&self.schema, tree)))
    }
}

#[derive(Debug)]
struct SchematronValidator {
    kind: SchemaKind,
    schema: SchematronPtr,
    report: ReportStyle,
}

impl Validator for SchematronValidator {
    fn kind(&self) -> SchemaKind {
        self.kind
    }

    fn validate(&self, document: &Document) -> Result<(), EngineFailure> {
        let wrapper = LibXml2Wrapper::new();
        let result = into_outcome(
            document.with_tree(|tree| wrapper.validate_schematron(&self.schema, tree)),
        );

        match (self.report, result) {
            (ReportStyle::Svrl, Err(EngineFailure::Diagnostics(errors))) => {
                Err(EngineFailure::Report {
                    svrl: svrl_report(&errors),
                    diagnostic: errors.into_iter().next(),
                })
            }
            (_, other) => other,
        }
    }
}

/// DTD validation temporarily attaches the DTD to the document, so one
/// compiled DTD is applied to one document at a time.
#[derive(Debug)]
struct DtdValidator {
    dtd: DtdPtr,
    guard: Mutex<()>,
}

impl Validator for DtdValidator {
    fn kind(&self) -> SchemaKind {
        SchemaKind::Dtd
    }

    fn validate(&self, document: &Document) -> Result<(), EngineFailure> {
        let wrapper = LibXml2Wrapper::new();
        let _guard = self.guard.lock();
        into_outcome(document.with_tree(|tree| wrapper.validate_dtd(&self.dtd, tree)))
    }
}

#[derive(Debug)]
struct InlineSubsetValidator;

impl Validator for InlineSubsetValidator {
    fn kind(&self) -> SchemaKind {
        SchemaKind::Dtd
    }

    fn validate(&self, document: &Document) -> Result<(), EngineFailure> {
        let wrapper = LibXml2Wrapper::new();
        into_outcome(document.with_tree(|tree| wrapper.validate_internal_subset(tree)))
    }
}

fn escape_xml(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Render Schematron failures as an SVRL document
pub fn svrl_report(diagnostics: &[Diagnostic]) -> String {
    let mut svrl = format!(
        "<svrl:schematron-output xmlns:svrl=\"{}\">\n",
        namespaces::SVRL
    );
    for diagnostic in diagnostics {
        let element = if diagnostic.code == XML_SCHEMATRONV_REPORT {
            "svrl:successful-report"
        } else {
            "svrl:failed-assert"
        };
        let text = diagnostic.report.as_deref().unwrap_or(&diagnostic.message);
        svrl.push_str(&format!(
            "  <{element} location=\"{}\">\n    <svrl:text>{}</svrl:text>\n  </{element}>\n",
            escape_xml(diagnostic.node_path.as_deref().unwrap_or("")),
            escape_xml(text),
        ));
    }
    svrl.push_str("</svrl:schematron-output>\n");
    svrl
}
