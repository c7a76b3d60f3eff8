//! Pipeline - the fixed request graph
//!
//! router → domain extraction (concurrent, one branch per routed domain)
//! → merge → filter detection → fuzzy matching → generation → validation

pub mod fuzzy;
pub mod state;

pub use fuzzy::{FuzzyMatcher, ValueSource};
pub use state::{
    ColumnSelection, DomainOutput, FilterDecision, FilterSpec, MatchedFilter, PipelineState, SubquestionEntry,
};

use crate::config::FuzzyConfig;
use crate::error::AssistantResult;
use crate::knowledge::KnowledgeBase;
use crate::llm::{ChatModel, DomainExtractor, FilterDetector, QueryRouter, SqlGenerator, SqlValidator};
use futures::future::try_join_all;
use std::sync::Arc;

pub struct Pipeline {
    router: QueryRouter,
    extractor: DomainExtractor,
    filter_detector: FilterDetector,
    fuzzy: Option<FuzzyMatcher>,
    generator: SqlGenerator,
    validator: SqlValidator,
}

impl Pipeline {
    /// `router_model` answers the routing call, `model` every other stage
    pub fn new(knowledge: Arc<KnowledgeBase>, router_model: Arc<dyn ChatModel>, model: Arc<dyn ChatModel>) -> Self {
        tracing::info!(router = router_model.name(), model = model.name(), "Building pipeline");
        Self {
            router: QueryRouter::new(router_model),
            extractor: DomainExtractor::new(model.clone(), knowledge),
            filter_detector: FilterDetector::new(model.clone()),
            fuzzy: None,
            generator: SqlGenerator::new(model.clone()),
            validator: SqlValidator::new(model),
        }
    }

    /// Resolve filter values against stored column values
    pub fn with_value_source(mut self, source: Arc<dyn ValueSource>, config: &FuzzyConfig) -> Self {
        self.fuzzy = Some(FuzzyMatcher::new(source, config));
        self
    }

    /// Run one question through the graph. Parse failures degrade the state;
    /// only transport errors from a model call abort the request.
    pub async fn run(&self, question: &str) -> AssistantResult<PipelineState> {
        let mut state = PipelineState::new(question);

        state.routed = self.router.route(question).await?;
        let labels: Vec<&str> = state.routed.iter().map(|d| d.as_str()).collect();
        tracing::info!("Routed request to {:?} agents", labels);
        if state.routed.is_empty() {
            tracing::warn!("No agent can answer the question, skipping generation");
            return Ok(state);
        }

        let branches = state.routed.iter().map(|&domain| self.extractor.extract(question, domain));
        state.domain_outputs = try_join_all(branches).await?;

        state.merged_columns = state::merge_columns(&state.domain_outputs);
        let columns = state::render_columns(&state.merged_columns);
        tracing::debug!(columns = state.merged_columns.len(), "Merged column selections");

        state.filter_decision = self.filter_detector.detect(question, &columns).await?;
        state.matched_filters = match (&state.filter_decision, &self.fuzzy) {
            (FilterDecision::Yes(filters), Some(matcher)) => matcher.resolve(filters).await,
            (decision, _) => decision
                .filters()
                .iter()
                .map(|filter| MatchedFilter {
                    filter: filter.clone(),
                    values: fuzzy::split_values(&filter.value),
                })
                .collect(),
        };
        let filters = state::render_filters(&state.matched_filters);

        state.draft_sql = self.generator.generate(question, &columns, &filters).await?;
        state.final_sql = self
            .validator
            .validate(question, &columns, &filters, &state.draft_sql)
            .await?;
        Ok(state)
    }
}
