//! Validation pipeline: walks a document's schema declarations in precedence
//! order and reports the first conclusive outcome.
//!
//! Each candidate ends in one of four ways:
//! - **Valid** or **Invalid**: conclusive, reported immediately
//! - **Unresolved**: the schema could not be fetched or applied; terminal
//! - **Inapplicable**: unknown schema language or a schema that does not
//!   compile; the next candidate is tried
//!
//! A document that declares nothing, or whose every candidate is
//! inapplicable, is valid.
//!
//! Schema fetching is async. Compilation and validation are CPU-bound libxml2
//! calls and run on the blocking pool.

use std::path::PathBuf;
use std::sync::Arc;

use futures::future::try_join_all;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};
use url::Url;

use crate::cache::ValidatorCache;
use crate::config::{Config, ConfigManager};
use crate::document::{Document, Syntax};
use crate::engine::{EngineFailure, Libxml2Engine, SchemaSource, ValidatorHandle};
use crate::error::{EngineError, ErrorDetail, Result, Unresolved, ValidationError};
use crate::locator::{Candidate, Locator, Origin, SchemaLocator, SchemaReference};
use crate::normalizer::{ErrorNormalizer, Normalized};
use crate::registry::{SchemaKind, ValidatorRegistry};
use crate::resolver::{DefaultFetcher, ResourceFetcher, ResourceResolver};

/// Final answer for one document
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Valid,
    Invalid(ErrorDetail),
    Unresolved(Unresolved),
    /// The document could not be parsed; no schema was consulted
    NotWellFormed(ErrorDetail),
}

impl Verdict {
    pub fn is_valid(&self) -> bool {
        matches!(self, Verdict::Valid)
    }

    /// The failure detail, for Invalid and NotWellFormed verdicts
    pub fn detail(&self) -> Option<&ErrorDetail> {
        match self {
            Verdict::Invalid(detail) | Verdict::NotWellFormed(detail) => Some(detail),
            _ => None,
        }
    }
}

/// Result of trying a single candidate
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationOutcome {
    Valid,
    Invalid(ErrorDetail),
    /// Not applicable to this document; try the next candidate
    Inapplicable,
    Unresolved(Unresolved),
}

pub struct ValidationPipeline {
    registry: ValidatorRegistry,
    cache: Arc<ValidatorCache>,
    resolver: ResourceResolver,
    locator: SchemaLocator,
    normalizer: ErrorNormalizer,
    config: Config,
}

impl ValidationPipeline {
    pub fn new(
        registry: ValidatorRegistry,
        cache: Arc<ValidatorCache>,
        resolver: ResourceResolver,
        config: Config,
    ) -> Self {
        Self {
            registry,
            cache,
            resolver,
            locator: SchemaLocator::new(),
            normalizer: ErrorNormalizer::new(),
            config,
        }
    }

    /// Build a pipeline on libxml2 and the default file/HTTP fetcher
    pub fn from_config(config: Config) -> Result<Self> {
        ConfigManager::validate_config(&config)?;

        let fetcher: Arc<dyn ResourceFetcher> = Arc::new(
            DefaultFetcher::new(&config.network)
                .map_err(|e| ValidationError::Config(format!("HTTP client setup failed: {}", e)))?,
        );
        let registry = ValidatorRegistry::new(Arc::new(Libxml2Engine::new()));
        let cache = Arc::new(ValidatorCache::new(config.cache.capacity));

        Ok(Self::new(
            registry,
            cache,
            ResourceResolver::new(fetcher),
            config,
        ))
    }

    pub fn cache(&self) -> &Arc<ValidatorCache> {
        &self.cache
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Validate a parsed document against the schemas it declares
    pub async fn validate(&self, document: Arc<Document>) -> Verdict {
        let candidates = self.locator.locate(&document);
        if candidates.is_empty() {
            debug!(location = ?document.location(), "no schema declared");
            return Verdict::Valid;
        }

        for candidate in &candidates {
            match self.evaluate(&document, candidate).await {
                ValidationOutcome::Valid => return Verdict::Valid,
                ValidationOutcome::Invalid(detail) => return Verdict::Invalid(detail),
                ValidationOutcome::Unresolved(unresolved) => {
                    return Verdict::Unresolved(unresolved);
                }
                ValidationOutcome::Inapplicable => continue,
            }
        }

        debug!(
            candidates = candidates.len(),
            "no applicable schema, document accepted"
        );
        Verdict::Valid
    }

    /// Parse `content` and validate it.
    ///
    /// A document that does not parse is reported as
    /// [`Verdict::NotWellFormed`]. Stylesheets are checked against the
    /// configured XSLT grammar instead of their declarations.
    pub async fn validate_source(
        &self,
        content: impl Into<String>,
        location: Option<Url>,
        syntax: Syntax,
    ) -> Result<Verdict> {
        if !syntax.has_parser() {
            return Err(ValidationError::UnsupportedSyntax {
                syntax: syntax.name().to_string(),
            });
        }

        let content = content.into();
        let parsed = tokio::task::spawn_blocking(move || {
            Document::parse_with_syntax(syntax, content, location)
        })
        .await?;

        let document = match parsed {
            Ok(document) => Arc::new(document),
            Err(ValidationError::NotWellFormed(detail)) => {
                debug!(error = %detail, "document is not well-formed");
                return Ok(Verdict::NotWellFormed(detail));
            }
            Err(e) => return Err(e),
        };

        if syntax == Syntax::Xslt {
            return self.validate_stylesheet(document).await;
        }
        Ok(self.validate(document).await)
    }

    /// Validate an XSLT document against the RelaxNG grammar for its version
    pub async fn validate_stylesheet(&self, document: Arc<Document>) -> Result<Verdict> {
        let schema_dir = self.config.stylesheets.schema_dir.as_ref().ok_or_else(|| {
            ValidationError::Config("No stylesheet schema directory configured".to_string())
        })?;

        let version: String = document
            .root()
            .version
            .as_deref()
            .unwrap_or("1.0")
            .chars()
            .filter(char::is_ascii_alphanumeric)
            .collect();
        let schema_path = absolute(schema_dir.join(format!("xslt{}.rng", version)))?;

        let reference = SchemaReference::new(
            SchemaKind::RelaxNg,
            Locator::Uri(schema_path.to_string_lossy().into_owned()),
            Origin::Configured,
        );
        debug!(schema = %reference, "validating stylesheet");

        let verdict = match self
            .evaluate(&document, &Candidate::Reference(reference))
            .await
        {
            ValidationOutcome::Valid | ValidationOutcome::Inapplicable => Verdict::Valid,
            ValidationOutcome::Invalid(detail) => Verdict::Invalid(detail),
            ValidationOutcome::Unresolved(unresolved) => Verdict::Unresolved(unresolved),
        };
        Ok(verdict)
    }

    /// Validate several documents concurrently against the shared cache.
    ///
    /// Verdicts are returned in input order.
    pub async fn validate_all(&self, documents: Vec<Arc<Document>>) -> Result<Vec<Verdict>> {
        if documents.is_empty() {
            return Ok(Vec::new());
        }

        let semaphore = Semaphore::new(ConfigManager::get_thread_count(&self.config).max(1));
        let semaphore = &semaphore;

        let tasks = documents.into_iter().map(|document| async move {
            let _permit = semaphore.acquire().await.map_err(|_| {
                ValidationError::Config("Failed to acquire validation semaphore".to_string())
            })?;
            Ok::<Verdict, ValidationError>(self.validate(document).await)
        });

        try_join_all(tasks).await
    }

    /// Try a single candidate against `document`
    pub async fn evaluate(
        &self,
        document: &Arc<Document>,
        candidate: &Candidate,
    ) -> ValidationOutcome {
        let reference = match candidate {
            Candidate::Reference(reference) => reference,
            Candidate::Unmatched { origin, detail } => {
                warn!(?origin, %detail, "skipping schema declaration");
                return ValidationOutcome::Inapplicable;
            }
        };

        let handle = match self.acquire(document, reference).await {
            Ok(handle) => handle,
            Err(outcome) => return outcome,
        };

        let strategy = self.registry.strategy(reference.kind);
        let target = Arc::clone(document);
        let result = tokio::task::spawn_blocking(move || handle.validate(&target)).await;

        match result {
            Ok(Ok(())) => {
                info!(schema = %reference, "document is valid");
                ValidationOutcome::Valid
            }
            Ok(Err(failure)) => {
                match self
                    .normalizer
                    .normalize(&strategy, &reference.to_string(), failure)
                {
                    Normalized::Invalid(detail) => {
                        info!(schema = %reference, error = %detail, "document is invalid");
                        ValidationOutcome::Invalid(detail)
                    }
                    Normalized::Unresolved(unresolved) => {
                        warn!(%unresolved, "schema could not be applied");
                        ValidationOutcome::Unresolved(unresolved)
                    }
                }
            }
            Err(e) => ValidationOutcome::Unresolved(Unresolved {
                reference: reference.to_string(),
                reason: format!("Validation task failed: {}", e),
            }),
        }
    }

    /// Drop every compiled validator
    pub fn clear_cache(&self) {
        self.cache.clear();
        info!("validator cache cleared");
    }

    /// Find or build the validator for `reference`
    async fn acquire(
        &self,
        document: &Document,
        reference: &SchemaReference,
    ) -> std::result::Result<ValidatorHandle, ValidationOutcome> {
        let kind = reference.kind;
        let base = document.location();

        let (key, url) = match &reference.locator {
            Locator::InlineSubset => {
                return self.compile(reference, SchemaSource::InlineSubset).await;
            }
            Locator::PublicId {
                public_id,
                system_id,
            } => match self.resolver.resolve_public_id(public_id) {
                Some(url) => {
                    debug!(%public_id, %url, "public identifier found in catalog");
                    (format!("{}:{}", kind.key_prefix(), public_id), url)
                }
                None => match system_id {
                    Some(system_id) => {
                        let url = self.resolve(reference, system_id, base)?;
                        (format!("{}:{}", kind.key_prefix(), url), url)
                    }
                    None => {
                        warn!(%public_id, "public identifier not in catalog and no system URL");
                        return Err(ValidationOutcome::Inapplicable);
                    }
                },
            },
            Locator::Uri(locator) => {
                let url = self.resolve(reference, locator, base)?;
                (format!("{}:{}", kind.key_prefix(), url), url)
            }
        };

        self.cache
            .get_or_create(&key, move || async move {
                let data = match self.resolver.fetch(&url).await {
                    Ok(data) => data,
                    Err(e) => {
                        return Err(self.unresolved(reference, url.as_str(), e.to_string()));
                    }
                };
                debug!(%url, bytes = data.len(), "schema fetched");
                self.compile(reference, SchemaSource::bytes(url.as_str(), data))
                    .await
            })
            .await
    }

    fn resolve(
        &self,
        reference: &SchemaReference,
        locator: &str,
        base: Option<&Url>,
    ) -> std::result::Result<Url, ValidationOutcome> {
        ResourceResolver::resolve(locator, base)
            .map_err(|e| self.unresolved(reference, locator, e.to_string()))
    }

    async fn compile(
        &self,
        reference: &SchemaReference,
        source: SchemaSource,
    ) -> std::result::Result<ValidatorHandle, ValidationOutcome> {
        let registry = self.registry.clone();
        let kind = reference.kind;
        let compiled = tokio::task::spawn_blocking(move || registry.construct(kind, &source))
            .await
            .map_err(|e| {
                ValidationOutcome::Unresolved(Unresolved {
                    reference: reference.to_string(),
                    reason: format!("Compilation task failed: {}", e),
                })
            })?;

        compiled.map_err(|e| match e {
            EngineError::UnreachableResource { url, details } => {
                self.unresolved(reference, &url, details)
            }
            e => {
                warn!(schema = %reference, error = %e, "schema does not compile");
                ValidationOutcome::Inapplicable
            }
        })
    }

    fn unresolved(
        &self,
        reference: &SchemaReference,
        uri: &str,
        details: String,
    ) -> ValidationOutcome {
        let failure = EngineFailure::Resource {
            uri: uri.to_string(),
            details,
        };
        match self
            .normalizer
            .normalize(&self.registry.strategy(reference.kind), &reference.to_string(), failure)
        {
            Normalized::Unresolved(unresolved) => {
                warn!(%unresolved, "schema unavailable");
                ValidationOutcome::Unresolved(unresolved)
            }
            Normalized::Invalid(detail) => ValidationOutcome::Invalid(detail),
        }
    }
}

fn absolute(path: PathBuf) -> Result<PathBuf> {
    if path.is_absolute() {
        Ok(path)
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}
