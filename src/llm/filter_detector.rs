//! Filter Detector - decides whether the query needs WHERE filters
//!
//! A reply that cannot be parsed is treated as "no filters": the request
//! continues and the generator works from the question text alone.

use crate::error::AssistantResult;
use crate::llm::chat_client::ChatModel;
use crate::llm::extract::{extract_or_default, strip_think_block, Literal, Shape};
use crate::llm::prompts;
use crate::pipeline::state::{FilterDecision, FilterSpec};
use std::sync::Arc;

pub struct FilterDetector {
    model: Arc<dyn ChatModel>,
}

impl FilterDetector {
    pub fn new(model: Arc<dyn ChatModel>) -> Self {
        Self { model }
    }

    /// `columns` is the rendered merged column selection
    pub async fn detect(&self, question: &str, columns: &str) -> AssistantResult<FilterDecision> {
        tracing::info!("Checking the need for filter");
        let prompt = prompts::FILTER_CHECK.render(&[("columns", columns), ("query", question)]);
        let reply = self.model.complete(&prompt).await?;
        Ok(parse_filter_decision(&strip_think_block(&reply)))
    }
}

/// `["yes", [table, column, value], ...]` or `["no"]`. Entries shorter than
/// three cells are dropped; "yes" with no usable entry means no filters.
pub fn parse_filter_decision(reply: &str) -> FilterDecision {
    let items: Vec<Literal> = extract_or_default("filter_check", reply, Shape::TaggedList, |lit| match lit {
        Literal::List(items) => Some(items),
        _ => None,
    });

    let mut items = items.into_iter();
    let tag = items.next().map(|t| t.to_text().trim().to_ascii_lowercase());
    if tag.as_deref() != Some("yes") {
        return FilterDecision::No;
    }

    let filters: Vec<FilterSpec> = items
        .filter_map(|entry| {
            let cells = entry.as_list()?;
            if cells.len() < 3 {
                tracing::warn!(entry = ?entry, "Dropping filter entry without table, column and value");
                return None;
            }
            let value = cells[2..]
                .iter()
                .map(Literal::to_text)
                .filter(|v| !v.is_empty())
                .collect::<Vec<_>>()
                .join(", ");
            Some(FilterSpec {
                table_name: cells[0].to_text().trim().to_string(),
                column_name: cells[1].to_text().trim().to_string(),
                value,
            })
        })
        .filter(|f| !f.table_name.is_empty() && !f.column_name.is_empty() && !f.value.is_empty())
        .collect();

    if filters.is_empty() {
        FilterDecision::No
    } else {
        FilterDecision::Yes(filters)
    }
}
