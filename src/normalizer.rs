//! Reduces every validator failure to [`ErrorDetail`] or [`Unresolved`].

use crate::engine::EngineFailure;
use crate::error::{ErrorDetail, Unresolved};
use crate::libxml2::LibXml2Wrapper;
use crate::registry::{ConstructionStrategy, namespaces};

/// A failure after normalization
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Normalized {
    Invalid(ErrorDetail),
    Unresolved(Unresolved),
}

#[derive(Default)]
pub struct ErrorNormalizer {
    wrapper: LibXml2Wrapper,
}

impl ErrorNormalizer {
    pub fn new() -> Self {
        Self {
            wrapper: LibXml2Wrapper::new(),
        }
    }

    /// Normalize the failure of the schema `reference`, compiled with `strategy`.
    ///
    /// Native diagnostics keep their line and column. For an SVRL report the
    /// message is the text of the first failure in the report, while the
    /// position comes from the accompanying error log entry.
    pub fn normalize(
        &self,
        strategy: &ConstructionStrategy,
        reference: &str,
        failure: EngineFailure,
    ) -> Normalized {
        match failure {
            EngineFailure::Diagnostics(diagnostics) => {
                Normalized::Invalid(match diagnostics.into_iter().next() {
                    Some(first) => ErrorDetail::with_position(
                        first.report.unwrap_or(first.message),
                        first.line,
                        first.column,
                    ),
                    None => generic_detail(strategy),
                })
            }
            EngineFailure::Report { svrl, diagnostic } => {
                let message = self
                    .schematron_message(&svrl)
                    .or_else(|| diagnostic.as_ref().map(|d| d.message.clone()));
                Normalized::Invalid(match message {
                    Some(message) => ErrorDetail::with_position(
                        message,
                        diagnostic.as_ref().and_then(|d| d.line),
                        diagnostic.as_ref().and_then(|d| d.column),
                    ),
                    None => generic_detail(strategy),
                })
            }
            EngineFailure::Resource { uri, details } => Normalized::Unresolved(Unresolved {
                reference: uri,
                reason: details,
            }),
            EngineFailure::Internal { details } => Normalized::Unresolved(Unresolved {
                reference: reference.to_string(),
                reason: details,
            }),
        }
    }

    /// Text of the first failed assertion or successful report in an SVRL document
    pub fn schematron_message(&self, svrl: &str) -> Option<String> {
        let report = self.wrapper.parse_document(svrl.as_bytes(), None).ok()?;
        self.wrapper
            .xpath_string(
                &report,
                "normalize-space((//svrl:failed-assert/svrl:text | //svrl:successful-report/svrl:text)[1])",
                &[("svrl", namespaces::SVRL)],
            )
            .filter(|message| !message.is_empty())
    }
}

fn generic_detail(strategy: &ConstructionStrategy) -> ErrorDetail {
    ErrorDetail::new(format!(
        "Document does not conform to its {} schema",
        strategy.kind
    ))
}
