//! # validate-markup Library
//!
//! Schema resolution and validation for XML documents. A document's DOCTYPE,
//! `xsi` schema locations and `xml-model` processing instructions are tried
//! in precedence order against DTD, XML Schema, RelaxNG and Schematron
//! validators built on libxml2, with compiled validators kept in a bounded
//! in-memory cache.

pub mod cache;
pub mod config;
pub mod document;
pub mod engine;
pub mod error;
pub mod http_client;
pub mod libxml2;
pub mod locator;
pub mod normalizer;
pub mod pipeline;
pub mod registry;
pub mod resolver;

pub use cache::{CacheStats, DEFAULT_CAPACITY, ValidatorCache};
pub use config::{Config, ConfigError, ConfigManager};
pub use document::{Doctype, Document, ProcessingInstruction, RootElement, Syntax};
pub use engine::{
    EngineFailure, Libxml2Engine, SchemaEngine, SchemaSource, Validator, ValidatorHandle,
};
pub use error::{EngineError, ErrorDetail, ResolveError, Unresolved, ValidationError};
pub use http_client::{AsyncHttpClient, HttpClientConfig};
pub use libxml2::{Diagnostic, LibXml2Wrapper, ValidationResult};
pub use locator::{Candidate, Locator, Origin, SchemaLocator, SchemaReference};
pub use normalizer::{ErrorNormalizer, Normalized};
pub use pipeline::{ValidationOutcome, ValidationPipeline, Verdict};
pub use registry::{
    ConstructionStrategy, ParseErrorKind, ReportStyle, SchemaKind, ValidatorRegistry, namespaces,
};
pub use resolver::{DefaultFetcher, ResourceFetcher, ResourceResolver};
