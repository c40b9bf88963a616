//! Schema discovery: which schemas does a document declare, and in what order
//! should they be tried.

use std::fmt;

use crate::document::{Document, ProcessingInstruction};
use crate::registry::{SchemaKind, kind_for_extension, kind_for_namespace};

/// How a schema is addressed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Locator {
    /// A URI or path, possibly relative to the document
    Uri(String),
    /// A DTD public identifier, with the system URL declared next to it
    PublicId {
        public_id: String,
        system_id: Option<String>,
    },
    /// The document's own internal DTD subset
    InlineSubset,
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Locator::Uri(uri) => f.write_str(uri),
            Locator::PublicId { public_id, .. } => write!(f, "PUBLIC \"{}\"", public_id),
            Locator::InlineSubset => f.write_str("internal DTD subset"),
        }
    }
}

/// Where in the document a schema declaration was found
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    Doctype,
    InstanceAttribute,
    ProcessingInstruction,
    /// Chosen by configuration rather than declared
    Configured,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaReference {
    pub kind: SchemaKind,
    pub locator: Locator,
    pub origin: Origin,
}

impl SchemaReference {
    pub fn new(kind: SchemaKind, locator: Locator, origin: Origin) -> Self {
        Self {
            kind,
            locator,
            origin,
        }
    }
}

impl fmt::Display for SchemaReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind, self.locator)
    }
}

/// One entry in the fallback chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Candidate {
    Reference(SchemaReference),
    /// A declaration whose schema language could not be determined
    Unmatched { origin: Origin, detail: String },
}

/// Derives the ordered candidate list from a document's declarations.
///
/// Order: the DOCTYPE, then `xsi` attributes on the root element, then
/// `xml-model` processing instructions in document order.
#[derive(Debug, Clone, Copy, Default)]
pub struct SchemaLocator;

impl SchemaLocator {
    pub fn new() -> Self {
        SchemaLocator
    }

    pub fn locate(&self, document: &Document) -> Vec<Candidate> {
        let mut candidates = self.doctype_candidates(document);
        candidates.extend(self.schema_instance_candidates(document));
        candidates.extend(self.xml_model_candidates(document));
        candidates
    }

    /// At most one DTD: public id, else system URL, else an inline subset
    /// that declares elements
    pub fn doctype_candidates(&self, document: &Document) -> Vec<Candidate> {
        let Some(doctype) = document.doctype() else {
            return Vec::new();
        };

        let locator = if let Some(public_id) = &doctype.public_id {
            Locator::PublicId {
                public_id: public_id.clone(),
                system_id: doctype.system_id.clone(),
            }
        } else if let Some(system_id) = &doctype.system_id {
            Locator::Uri(system_id.clone())
        } else if doctype.declares_elements {
            Locator::InlineSubset
        } else {
            return Vec::new();
        };

        vec![Candidate::Reference(SchemaReference::new(
            SchemaKind::Dtd,
            locator,
            Origin::Doctype,
        ))]
    }

    /// XML Schema locations from `xsi:schemaLocation` and
    /// `xsi:noNamespaceSchemaLocation`: the URI paired with the root
    /// namespace first, then the last URI token
    pub fn schema_instance_candidates(&self, document: &Document) -> Vec<Candidate> {
        let root = document.root();
        let pairs: Vec<&str> = root
            .schema_location
            .as_deref()
            .map(|value| value.split_whitespace().collect())
            .unwrap_or_default();

        let keyed = match &root.namespace {
            Some(namespace) => pairs
                .chunks(2)
                .find(|pair| pair.len() == 2 && pair[0] == namespace)
                .map(|pair| pair[1].to_string()),
            None => root.no_namespace_schema_location.clone(),
        };

        let last_token = pairs
            .last()
            .map(|token| token.to_string())
            .or_else(|| {
                root.no_namespace_schema_location
                    .as_deref()
                    .and_then(|value| value.split_whitespace().last())
                    .map(str::to_string)
            });

        let mut uris: Vec<String> = Vec::new();
        for uri in keyed.into_iter().chain(last_token) {
            if !uris.contains(&uri) {
                uris.push(uri);
            }
        }

        uris.into_iter()
            .map(|uri| {
                Candidate::Reference(SchemaReference::new(
                    SchemaKind::XmlSchema,
                    Locator::Uri(uri),
                    Origin::InstanceAttribute,
                ))
            })
            .collect()
    }

    /// One candidate per `xml-model` instruction, in document order. An
    /// instruction with neither `href` nor `schematypens` ends the list.
    pub fn xml_model_candidates(&self, document: &Document) -> Vec<Candidate> {
        let mut candidates = Vec::new();
        for model in document.xml_models() {
            match xml_model_candidate(model) {
                Some(candidate) => candidates.push(candidate),
                None => break,
            }
        }
        candidates
    }
}

fn xml_model_candidate(model: &ProcessingInstruction) -> Option<Candidate> {
    let href = model.pseudo_attribute("href");
    let namespace = model.pseudo_attribute("schematypens");
    let origin = Origin::ProcessingInstruction;

    let candidate = match (href, namespace) {
        (None, None) => return None,
        (Some(href), Some(namespace)) => match kind_for_namespace(&namespace) {
            Some(kind) => {
                Candidate::Reference(SchemaReference::new(kind, Locator::Uri(href), origin))
            }
            None => Candidate::Unmatched {
                origin,
                detail: format!("unknown schema namespace '{}'", namespace),
            },
        },
        (Some(href), None) => match kind_for_extension(&href) {
            Some(kind) => {
                Candidate::Reference(SchemaReference::new(kind, Locator::Uri(href), origin))
            }
            None => Candidate::Unmatched {
                origin,
                detail: format!("cannot infer schema language of '{}'", href),
            },
        },
        (None, Some(namespace)) => Candidate::Unmatched {
            origin,
            detail: format!("xml-model for '{}' has no href", namespace),
        },
    };
    Some(candidate)
}
