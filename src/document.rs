//! Parsed documents and the metadata schema discovery reads from them.

use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::OnceLock;

use parking_lot::Mutex;
use regex::Regex;
use url::Url;

use crate::error::{ErrorDetail, Result, ValidationError};
use crate::libxml2::{LibXml2Wrapper, XmlDocPtr};
use crate::registry::namespaces;

/// Editor syntaxes the engine knows about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Syntax {
    Xml,
    Xhtml,
    Xslt,
    /// Recognized, but there is no validating parser for it
    Html,
}

impl Syntax {
    pub fn name(&self) -> &'static str {
        match self {
            Syntax::Xml => "XML",
            Syntax::Xhtml => "XHTML",
            Syntax::Xslt => "XSLT",
            Syntax::Html => "HTML",
        }
    }

    /// Whether documents of this syntax can be parsed for validation
    pub fn has_parser(&self) -> bool {
        !matches!(self, Syntax::Html)
    }
}

impl fmt::Display for Syntax {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Syntax {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "XML" => Ok(Syntax::Xml),
            "XHTML" => Ok(Syntax::Xhtml),
            "XSL" | "XSLT" => Ok(Syntax::Xslt),
            "HTML" => Ok(Syntax::Html),
            _ => Err(ValidationError::UnsupportedSyntax {
                syntax: s.to_string(),
            }),
        }
    }
}

/// The DOCTYPE declaration of a document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Doctype {
    pub name: String,
    pub public_id: Option<String>,
    pub system_id: Option<String>,
    /// True when the internal subset declares at least one element
    pub declares_elements: bool,
}

/// Root element facts used for schema discovery
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RootElement {
    pub name: String,
    pub local_name: String,
    pub namespace: Option<String>,
    /// `xsi:schemaLocation`, unsplit
    pub schema_location: Option<String>,
    /// `xsi:noNamespaceSchemaLocation`
    pub no_namespace_schema_location: Option<String>,
    /// `version` attribute, used by stylesheets
    pub version: Option<String>,
}

/// A top-level processing instruction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessingInstruction {
    pub target: String,
    pub data: String,
}

fn pseudo_attribute_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| {
        Regex::new(r#"([A-Za-z_][\w.:-]*)\s*=\s*(?:"([^"]*)"|'([^']*)')"#)
            .expect("Failed to compile pseudo-attribute regex")
    })
}

fn encoding_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| {
        Regex::new(r#"^\s*<\?xml\s[^>]*?encoding\s*=\s*["']([A-Za-z][A-Za-z0-9._-]*)["']"#)
            .expect("Failed to compile encoding regex")
    })
}

impl ProcessingInstruction {
    /// Value of a `name="value"` pseudo-attribute in the instruction data
    pub fn pseudo_attribute(&self, name: &str) -> Option<String> {
        pseudo_attribute_regex()
            .captures_iter(&self.data)
            .find(|caps| &caps[1] == name)
            .and_then(|caps| caps.get(2).or_else(|| caps.get(3)))
            .map(|m| m.as_str().to_string())
    }

    pub fn is_xml_model(&self) -> bool {
        self.target == "xml-model"
    }
}

/// A well-formed document ready for validation
#[derive(Debug)]
pub struct Document {
    tree: Mutex<XmlDocPtr>,
    content: String,
    location: Option<Url>,
    syntax: Syntax,
    encoding: Option<String>,
    doctype: Option<Doctype>,
    root: RootElement,
    processing_instructions: Vec<ProcessingInstruction>,
}

impl Document {
    /// Parse XML content. `location` is the document's own URL, if it has one.
    pub fn parse(content: impl Into<String>, location: Option<Url>) -> Result<Self> {
        Self::parse_with_syntax(Syntax::Xml, content, location)
    }

    pub fn parse_with_syntax(
        syntax: Syntax,
        content: impl Into<String>,
        location: Option<Url>,
    ) -> Result<Self> {
        if !syntax.has_parser() {
            return Err(ValidationError::UnsupportedSyntax {
                syntax: syntax.name().to_string(),
            });
        }

        let content = content.into();
        let wrapper = LibXml2Wrapper::new();
        let tree = wrapper
            .parse_document(content.as_bytes(), location.as_ref().map(Url::as_str))
            .map_err(|d| {
                ValidationError::NotWellFormed(ErrorDetail::with_position(
                    d.message, d.line, d.column,
                ))
            })?;

        let doctype = wrapper.internal_subset(&tree);
        let root = read_root(&wrapper, &tree);
        let processing_instructions = read_processing_instructions(&wrapper, &tree);
        let encoding = encoding_regex()
            .captures(&content)
            .map(|caps| caps[1].to_string());

        Ok(Document {
            tree: Mutex::new(tree),
            content,
            location,
            syntax,
            encoding,
            doctype,
            root,
            processing_instructions,
        })
    }

    /// Read and parse a file, using its path as the document location
    pub async fn open(path: &Path, syntax: Syntax) -> Result<Self> {
        let content = tokio::fs::read_to_string(path).await?;
        let absolute = if path.is_absolute() {
            path.to_path_buf()
        } else {
            std::env::current_dir()?.join(path)
        };
        let location = Url::from_file_path(&absolute).ok();
        tokio::task::spawn_blocking(move || Self::parse_with_syntax(syntax, content, location))
            .await?
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn location(&self) -> Option<&Url> {
        self.location.as_ref()
    }

    pub fn syntax(&self) -> Syntax {
        self.syntax
    }

    /// Encoding named in the XML declaration
    pub fn encoding(&self) -> Option<&str> {
        self.encoding.as_deref()
    }

    pub fn doctype(&self) -> Option<&Doctype> {
        self.doctype.as_ref()
    }

    pub fn root(&self) -> &RootElement {
        &self.root
    }

    pub fn processing_instructions(&self) -> &[ProcessingInstruction] {
        &self.processing_instructions
    }

    /// `xml-model` instructions in document order
    pub fn xml_models(&self) -> impl Iterator<Item = &ProcessingInstruction> {
        self.processing_instructions
            .iter()
            .filter(|pi| pi.is_xml_model())
    }

    /// Run `f` with exclusive access to the parsed tree
    pub(crate) fn with_tree<R>(&self, f: impl FnOnce(&XmlDocPtr) -> R) -> R {
        let tree = self.tree.lock();
        f(&tree)
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn read_root(wrapper: &LibXml2Wrapper, tree: &XmlDocPtr) -> RootElement {
    let xsi = [("xsi", namespaces::XSI)];
    let query = |expr: &str, ns: &[(&str, &str)]| non_empty(wrapper.xpath_string(tree, expr, ns));

    RootElement {
        name: query("string(name(/*))", &[]).unwrap_or_default(),
        local_name: query("string(local-name(/*))", &[]).unwrap_or_default(),
        namespace: query("string(namespace-uri(/*))", &[]),
        schema_location: query("string(/*/@xsi:schemaLocation)", &xsi),
        no_namespace_schema_location: query("string(/*/@xsi:noNamespaceSchemaLocation)", &xsi),
        version: query("string(/*/@version)", &[]),
    }
}

fn read_processing_instructions(
    wrapper: &LibXml2Wrapper,
    tree: &XmlDocPtr,
) -> Vec<ProcessingInstruction> {
    let count = wrapper.xpath_count(tree, "count(/processing-instruction())");
    (1..=count)
        .filter_map(|i| {
            let target = wrapper.xpath_string(
                tree,
                &format!("string(name(/processing-instruction()[{}]))", i),
                &[],
            )?;
            let data = wrapper
                .xpath_string(tree, &format!("string(/processing-instruction()[{}])", i), &[])
                .unwrap_or_default();
            Some(ProcessingInstruction { target, data })
        })
        .collect()
}
