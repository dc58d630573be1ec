//! Task agents. Each one turns resolved contexts into one structured payload
//! and never calls generation when there is no context to work from.

mod qa;
mod risk;
mod summary;

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;

use clausewise_core::error::{Error, ServiceError};
use clausewise_core::traits::{GenerationRequest, GenerationService};
use clausewise_hybrid::ResolvedContext;
use clausewise_llm::ServiceGuard;

pub use qa::{Citation, QaAgent, QaAnswer};
pub use risk::{Risk, RiskAgent, RiskReport, Severity};
pub use summary::{ContractSummary, SummaryAgent};

/// Generation calls whose reply must parse into a typed value. A reply that
/// does not parse counts as a failed attempt and goes through the retry
/// policy like any other service error.
#[derive(Clone)]
pub struct StructuredGenerator {
    service: Arc<dyn GenerationService>,
    guard: ServiceGuard,
}

impl StructuredGenerator {
    pub fn new(service: Arc<dyn GenerationService>, guard: ServiceGuard) -> Self {
        Self { service, guard }
    }

    pub async fn generate<T: DeserializeOwned>(&self, request: &GenerationRequest) -> Result<T, ServiceError> {
        self.generate_with(request, |value| serde_json::from_value(value).map_err(|e| e.to_string())).await
    }

    pub async fn generate_with<T, P>(&self, request: &GenerationRequest, parse: P) -> Result<T, ServiceError>
    where
        P: Fn(Value) -> Result<T, String>,
    {
        let service = self.service.as_ref();
        let parse = &parse;
        self.guard
            .call(&request.purpose, move || async move {
                let value = service.generate(request).await?;
                parse(value).map_err(|e| ServiceError::Malformed(format!("{} reply: {}", request.purpose, e)))
            })
            .await
    }
}

pub(crate) fn generation_error(purpose: &str, err: ServiceError) -> Error {
    Error::Generation(format!("{} agent: {}", purpose, err))
}

/// Contexts rendered for a prompt, each headed by its page.
pub(crate) fn format_context(contexts: &[ResolvedContext]) -> String {
    contexts
        .iter()
        .map(|c| format!("[Page {}]\n{}", c.parent.page_number, c.parent.text))
        .collect::<Vec<_>>()
        .join("\n\n---\n\n")
}

pub(crate) fn source_pages(contexts: &[ResolvedContext]) -> Vec<u32> {
    let mut pages: Vec<u32> = contexts.iter().map(|c| c.parent.page_number).collect();
    pages.sort_unstable();
    pages.dedup();
    pages
}

/// Page of the first context whose text contains `quote`.
pub(crate) fn locate_page(quote: &str, contexts: &[ResolvedContext]) -> Option<u32> {
    let quote = quote.trim();
    if quote.is_empty() {
        return None;
    }
    contexts.iter().find(|c| c.parent.text.contains(quote)).map(|c| c.parent.page_number)
}


#[cfg(test)]
mod tests {
    use super::test_support::context;
    use super::*;

    #[test]
    fn context_block_names_pages() {
        let block = format_context(&[context(2, "Fees.", 0.9), context(5, "Notice.", 0.4)]);
        assert_eq!(block, "[Page 2]\nFees.\n\n---\n\n[Page 5]\nNotice.");
    }

    #[test]
    fn pages_are_sorted_and_unique() {
        let ctx = [context(3, "a", 1.0), context(1, "b", 1.0), context(3, "c", 1.0)];
        assert_eq!(source_pages(&ctx), vec![1, 3]);
    }

    #[test]
    fn quotes_are_located_by_substring() {
        let ctx = [context(1, "Fees are due monthly.", 1.0), context(4, "Either party may terminate.", 1.0)];
        assert_eq!(locate_page("  may terminate ", &ctx), Some(4));
        assert_eq!(locate_page("arbitration", &ctx), None);
        assert_eq!(locate_page("", &ctx), None);
    }
}
