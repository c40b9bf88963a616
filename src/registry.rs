//! Schema languages and how to build validators for them.

use std::fmt;
use std::sync::Arc;

use crate::engine::{SchemaEngine, SchemaSource, ValidatorHandle};
use crate::error::EngineResult;

/// Namespace URIs that identify schema languages and related vocabularies
pub mod namespaces {
    pub const RELAX_NG: &str = "http://relaxng.org/ns/structure/1.0";
    pub const XML_SCHEMA: &str = "http://www.w3.org/2001/XMLSchema";
    pub const ISO_SCHEMATRON: &str = "http://purl.oclc.org/dsdl/schematron";
    pub const PRE_ISO_SCHEMATRON: &str = "http://www.ascc.net/xml/schematron";
    pub const XSI: &str = "http://www.w3.org/2001/XMLSchema-instance";
    pub const SVRL: &str = "http://purl.oclc.org/dsdl/svrl";
}

/// Every schema language the engine can validate against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SchemaKind {
    Dtd,
    XmlSchema,
    RelaxNg,
    Schematron,
    PreIsoSchematron,
}

impl SchemaKind {
    pub const ALL: [SchemaKind; 5] = [
        SchemaKind::Dtd,
        SchemaKind::XmlSchema,
        SchemaKind::RelaxNg,
        SchemaKind::Schematron,
        SchemaKind::PreIsoSchematron,
    ];

    /// Prefix used in validator cache keys
    pub fn key_prefix(&self) -> &'static str {
        match self {
            SchemaKind::Dtd => "dtd",
            SchemaKind::XmlSchema => "xsd",
            SchemaKind::RelaxNg => "rng",
            SchemaKind::Schematron => "sch",
            SchemaKind::PreIsoSchematron => "sch-ascc",
        }
    }
}

impl fmt::Display for SchemaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SchemaKind::Dtd => "DTD",
            SchemaKind::XmlSchema => "XML Schema",
            SchemaKind::RelaxNg => "RelaxNG",
            SchemaKind::Schematron => "Schematron",
            SchemaKind::PreIsoSchematron => "pre-ISO Schematron",
        };
        f.write_str(name)
    }
}

/// The family of parse error a schema compiler raises
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParseErrorKind {
    Dtd,
    XmlSchema,
    RelaxNg,
    Schematron,
}

impl fmt::Display for ParseErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ParseErrorKind::Dtd => "DTD",
            ParseErrorKind::XmlSchema => "XML Schema",
            ParseErrorKind::RelaxNg => "RelaxNG",
            ParseErrorKind::Schematron => "Schematron",
        };
        f.write_str(name)
    }
}

/// How a validator reports failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportStyle {
    /// Error log entries carrying line and column
    Native,
    /// An SVRL report document
    Svrl,
}

/// Everything needed to compile and interpret one schema language
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConstructionStrategy {
    pub kind: SchemaKind,
    pub parse_error: ParseErrorKind,
    pub report: ReportStyle,
    /// Namespace that selects this language in an `xml-model` declaration
    pub namespace: Option<&'static str>,
}

/// Maps schema kinds and namespaces to construction strategies
#[derive(Clone)]
pub struct ValidatorRegistry {
    engine: Arc<dyn SchemaEngine>,
}

impl fmt::Debug for ValidatorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValidatorRegistry").finish_non_exhaustive()
    }
}

impl ValidatorRegistry {
    pub fn new(engine: Arc<dyn SchemaEngine>) -> Self {
        Self { engine }
    }

    pub fn strategy(&self, kind: SchemaKind) -> ConstructionStrategy {
        strategy_for(kind)
    }

    /// Strategy for an `xml-model` namespace; `None` for anything unrecognized
    pub fn for_namespace(&self, namespace: &str) -> Option<ConstructionStrategy> {
        kind_for_namespace(namespace).map(strategy_for)
    }

    /// Compile `source` with the strategy registered for `kind`
    pub fn construct(
        &self,
        kind: SchemaKind,
        source: &SchemaSource,
    ) -> EngineResult<ValidatorHandle> {
        self.engine.compile(&strategy_for(kind), source)
    }
}

fn strategy_for(kind: SchemaKind) -> ConstructionStrategy {
    match kind {
        SchemaKind::Dtd => ConstructionStrategy {
            kind,
            parse_error: ParseErrorKind::Dtd,
            report: ReportStyle::Native,
            namespace: None,
        },
        SchemaKind::XmlSchema => ConstructionStrategy {
            kind,
            parse_error: ParseErrorKind::XmlSchema,
            report: ReportStyle::Native,
            namespace: Some(namespaces::XML_SCHEMA),
        },
        SchemaKind::RelaxNg => ConstructionStrategy {
            kind,
            parse_error: ParseErrorKind::RelaxNg,
            report: ReportStyle::Native,
            namespace: Some(namespaces::RELAX_NG),
        },
        SchemaKind::Schematron => ConstructionStrategy {
            kind,
            parse_error: ParseErrorKind::Schematron,
            report: ReportStyle::Svrl,
            namespace: Some(namespaces::ISO_SCHEMATRON),
        },
        SchemaKind::PreIsoSchematron => ConstructionStrategy {
            kind,
            parse_error: ParseErrorKind::Schematron,
            report: ReportStyle::Native,
            namespace: Some(namespaces::PRE_ISO_SCHEMATRON),
        },
    }
}

/// Schema kind selected by an `xml-model` namespace
pub fn kind_for_namespace(namespace: &str) -> Option<SchemaKind> {
    SchemaKind::ALL
        .into_iter()
        .find(|&kind| strategy_for(kind).namespace == Some(namespace.trim()))
}

/// Schema kind implied by a locator's file extension
pub fn kind_for_extension(locator: &str) -> Option<SchemaKind> {
    let path = locator.split(['?', '#']).next().unwrap_or(locator);
    let file_name = path.rsplit(['/', '\\']).next().unwrap_or(path);
    let (_, extension) = file_name.rsplit_once('.')?;

    match extension.to_ascii_lowercase().as_str() {
        "dtd" => Some(SchemaKind::Dtd),
        "xsd" => Some(SchemaKind::XmlSchema),
        "rng" => Some(SchemaKind::RelaxNg),
        "sch" => Some(SchemaKind::Schematron),
        _ => None,
    }
}
