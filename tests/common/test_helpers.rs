use std::path::PathBuf;
use std::sync::{Arc, Once};

use url::Url;

use validate_markup::{
    Config, Document, ResourceFetcher, ResourceResolver, SchemaEngine, Syntax, ValidationPipeline,
    ValidatorCache, ValidatorRegistry,
};

static TRACING: Once = Once::new();

/// Route library logs to the test output, filtered by `RUST_LOG`
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Test fixture paths
pub struct TestFixtures {
    pub fixtures_dir: PathBuf,
}

impl TestFixtures {
    pub fn new() -> Self {
        let fixtures_dir = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
            .join("tests")
            .join("fixtures");

        Self { fixtures_dir }
    }

    pub fn schemas_dir(&self) -> PathBuf {
        self.fixtures_dir.join("schemas")
    }

    pub fn documents_dir(&self) -> PathBuf {
        self.fixtures_dir.join("documents")
    }

    pub fn schema(&self, name: &str) -> PathBuf {
        self.schemas_dir().join(name)
    }

    pub fn document(&self, name: &str) -> PathBuf {
        self.documents_dir().join(name)
    }

    pub fn schema_url(&self, name: &str) -> Url {
        Url::from_file_path(self.schema(name)).unwrap()
    }

    pub fn document_url(&self, name: &str) -> Url {
        Url::from_file_path(self.document(name)).unwrap()
    }

    pub fn schema_bytes(&self, name: &str) -> Vec<u8> {
        std::fs::read(self.schema(name)).unwrap()
    }

    /// Open a fixture document as XML
    pub async fn open(&self, name: &str) -> Arc<Document> {
        Arc::new(
            Document::open(&self.document(name), Syntax::Xml)
                .await
                .unwrap(),
        )
    }
}

impl Default for TestFixtures {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse an in-memory document located at `file:///docs/<name>`
pub fn document_at(name: &str, xml: &str) -> Arc<Document> {
    let location = Url::parse("file:///docs/").unwrap().join(name).unwrap();
    Arc::new(Document::parse(xml, Some(location)).unwrap())
}

/// Pipeline over the given engine and fetcher with a cache of `capacity`
pub fn pipeline_with(
    engine: Arc<dyn SchemaEngine>,
    fetcher: Arc<dyn ResourceFetcher>,
    capacity: usize,
) -> ValidationPipeline {
    ValidationPipeline::new(
        ValidatorRegistry::new(engine),
        Arc::new(ValidatorCache::new(capacity)),
        ResourceResolver::new(fetcher),
        Config::default(),
    )
}

/// Pipeline reading schemas from disk, with stylesheet grammars from the fixtures
pub fn fixture_pipeline() -> ValidationPipeline {
    let mut config = Config::default();
    config.stylesheets.schema_dir = Some(TestFixtures::new().schemas_dir());
    ValidationPipeline::from_config(config).unwrap()
}

pub const BOOK_RNG: &str = r#"<element name="book" xmlns="http://relaxng.org/ns/structure/1.0">
  <element name="title"><text/></element>
  <oneOrMore><element name="chapter"><text/></element></oneOrMore>
</element>"#;

pub const VALID_BOOK: &str = r#"<?xml-model href="book.rng"?>
<book><title>T</title><chapter>C</chapter></book>"#;
