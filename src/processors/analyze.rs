//! Glossary extraction via the injected analyzer capability.

use crate::pipeline::{Item, ItemPatch, ProcessorError, RunContext};
use crate::processors::Processor;
use crate::providers::{AnalysisTask, Analyzer};
use async_trait::async_trait;
use std::sync::Arc;

/// Upper bound on the text handed to the analyzer.
const ANALYSIS_INPUT_LIMIT: usize = 4000;

/// Produces a business glossary from the cleaned text.
///
/// The processor is only registered when an analyzer capability exists; a provider
/// failure degrades to an empty glossary instead of aborting the item.
pub struct AnalyzeProcessor {
    analyzer: Arc<dyn Analyzer>,
}

impl AnalyzeProcessor {
    /// Build the processor around an analyzer capability.
    pub fn new(analyzer: Arc<dyn Analyzer>) -> Self {
        Self { analyzer }
    }
}

#[async_trait]
impl Processor for AnalyzeProcessor {
    fn name(&self) -> &'static str {
        "analyze"
    }

    fn order(&self) -> i32 {
        50
    }

    async fn process(&self, item: &Item, _ctx: &RunContext) -> Result<ItemPatch, ProcessorError> {
        let text = item.clean_text.as_deref().unwrap_or_default();
        if text.is_empty() {
            return Ok(ItemPatch {
                business_glossary: Some(String::new()),
                ..ItemPatch::default()
            });
        }

        let truncated: String = text.chars().take(ANALYSIS_INPUT_LIMIT).collect();
        let glossary = match self
            .analyzer
            .analyze(&truncated, AnalysisTask::BusinessGlossary)
            .await
        {
            Ok(output) => output,
            Err(err) => {
                tracing::warn!(
                    file_name = %item.file_name,
                    error = %err,
                    "Glossary analysis failed; continuing without it"
                );
                String::new()
            }
        };

        Ok(ItemPatch {
            business_glossary: Some(glossary),
            ..ItemPatch::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::ProviderError;
    use std::sync::Mutex;

    struct CapturingAnalyzer(Mutex<Vec<String>>);

    #[async_trait]
    impl Analyzer for CapturingAnalyzer {
        async fn analyze(&self, text: &str, _task: AnalysisTask) -> Result<String, ProviderError> {
            self.0.lock().unwrap().push(text.to_string());
            Ok("{\"术语\": \"定义\"}".into())
        }
    }

    struct FailingAnalyzer;

    #[async_trait]
    impl Analyzer for FailingAnalyzer {
        async fn analyze(&self, _text: &str, _task: AnalysisTask) -> Result<String, ProviderError> {
            Err(ProviderError::MalformedResponse("nope".into()))
        }
    }

    #[tokio::test]
    async fn empty_input_yields_empty_glossary() {
        let processor = AnalyzeProcessor::new(Arc::new(FailingAnalyzer));
        let patch = processor
            .process(&Item::default(), &RunContext::new())
            .await
            .unwrap();
        assert_eq!(patch.business_glossary.as_deref(), Some(""));
    }

    #[tokio::test]
    async fn long_input_is_truncated() {
        let analyzer = Arc::new(CapturingAnalyzer(Mutex::new(Vec::new())));
        let processor = AnalyzeProcessor::new(analyzer.clone());
        let item = Item {
            clean_text: Some("x".repeat(10_000)),
            ..Item::default()
        };
        let patch = processor.process(&item, &RunContext::new()).await.unwrap();
        assert!(patch.business_glossary.unwrap().contains("术语"));

        let seen = analyzer.0.lock().unwrap();
        assert_eq!(seen[0].chars().count(), ANALYSIS_INPUT_LIMIT);
    }

    #[tokio::test]
    async fn provider_failure_does_not_abort() {
        let processor = AnalyzeProcessor::new(Arc::new(FailingAnalyzer));
        let item = Item {
            clean_text: Some("some text".into()),
            ..Item::default()
        };
        let patch = processor.process(&item, &RunContext::new()).await.unwrap();
        assert_eq!(patch.business_glossary.as_deref(), Some(""));
    }
}
