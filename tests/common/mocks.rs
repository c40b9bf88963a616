use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use mockall::mock;
use parking_lot::Mutex;
use url::Url;

use validate_markup::error::{EngineResult, ResolveResult};
use validate_markup::{
    ConstructionStrategy, Document, EngineFailure, Libxml2Engine, ResourceFetcher, SchemaEngine,
    SchemaKind, SchemaSource, Validator, ValidatorHandle,
};

// Fetcher with scripted responses
mock! {
    pub Fetcher {}

    #[async_trait]
    impl ResourceFetcher for Fetcher {
        async fn fetch(&self, url: &Url) -> ResolveResult<Vec<u8>>;
    }
}

/// libxml2 engine that counts compilations per schema kind
#[derive(Default)]
pub struct CountingEngine {
    inner: Libxml2Engine,
    compilations: Mutex<HashMap<SchemaKind, usize>>,
    total: AtomicUsize,
}

impl CountingEngine {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn compilations(&self, kind: SchemaKind) -> usize {
        self.compilations.lock().get(&kind).copied().unwrap_or(0)
    }

    pub fn total(&self) -> usize {
        self.total.load(Ordering::SeqCst)
    }
}

impl SchemaEngine for CountingEngine {
    fn compile(
        &self,
        strategy: &ConstructionStrategy,
        source: &SchemaSource,
    ) -> EngineResult<ValidatorHandle> {
        *self.compilations.lock().entry(strategy.kind).or_insert(0) += 1;
        self.total.fetch_add(1, Ordering::SeqCst);
        self.inner.compile(strategy, source)
    }
}

/// Validator that answers every document the same way
#[derive(Debug)]
pub struct FixedValidator {
    pub kind: SchemaKind,
    pub outcome: Result<(), EngineFailure>,
}

impl Validator for FixedValidator {
    fn kind(&self) -> SchemaKind {
        self.kind
    }

    fn validate(&self, _document: &Document) -> Result<(), EngineFailure> {
        self.outcome.clone()
    }
}

pub fn fixed_validator(kind: SchemaKind, outcome: Result<(), EngineFailure>) -> ValidatorHandle {
    Arc::new(FixedValidator { kind, outcome })
}
