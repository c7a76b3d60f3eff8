//! Per-request pipeline state and the transient records the stages exchange

use crate::knowledge::Domain;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// A fragment of the user question mapped to one table
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubquestionEntry {
    pub subquestion: String,
    pub table_name: String,
}

/// A column picked for one subquestion, with the model's rationale
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ColumnSelection {
    pub table_name: String,
    pub column_name: String,
    pub rationale: String,
}

/// WHERE-clause candidate as phrased by the user
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterSpec {
    pub table_name: String,
    pub column_name: String,
    pub value: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "decision", content = "filters", rename_all = "lowercase")]
pub enum FilterDecision {
    #[default]
    No,
    Yes(Vec<FilterSpec>),
}

impl FilterDecision {
    pub fn filters(&self) -> &[FilterSpec] {
        match self {
            FilterDecision::No => &[],
            FilterDecision::Yes(filters) => filters,
        }
    }

    pub fn is_required(&self) -> bool {
        !self.filters().is_empty()
    }
}

/// Filter whose value was resolved against the stored column values
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchedFilter {
    pub filter: FilterSpec,
    /// Stored values to filter on; the requested literals when nothing matched
    pub values: Vec<String>,
}

/// What one domain branch produced
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainOutput {
    pub domain: Domain,
    pub subquestions: Vec<SubquestionEntry>,
    pub columns: Vec<ColumnSelection>,
}

/// Everything a request accumulates on its way through the graph
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct PipelineState {
    pub question: String,
    pub routed: Vec<Domain>,
    pub domain_outputs: Vec<DomainOutput>,
    pub merged_columns: Vec<ColumnSelection>,
    pub filter_decision: FilterDecision,
    pub matched_filters: Vec<MatchedFilter>,
    pub draft_sql: String,
    pub final_sql: String,
}

impl PipelineState {
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            ..Default::default()
        }
    }

    pub fn output(&self, domain: Domain) -> Option<&DomainOutput> {
        self.domain_outputs.iter().find(|o| o.domain == domain)
    }
}

/// Flatten the domain outputs, dropping exact (table, column, rationale)
/// repeats and keeping first-seen order.
pub fn merge_columns(outputs: &[DomainOutput]) -> Vec<ColumnSelection> {
    let mut seen = HashSet::new();
    let mut merged = Vec::new();
    for selection in outputs.iter().flat_map(|o| &o.columns) {
        if seen.insert(selection) {
            merged.push(selection.clone());
        }
    }
    merged
}

/// Rows handed to the filter, generation and validation prompts
pub fn render_columns(columns: &[ColumnSelection]) -> String {
    let rows: Vec<[String; 3]> = columns
        .iter()
        .map(|c| {
            [
                format!("name of table:{}", c.table_name),
                c.column_name.clone(),
                c.rationale.clone(),
            ]
        })
        .collect();
    serde_json::to_string_pretty(&rows).unwrap_or_default()
}

/// Filter block for the generation and validation prompts; empty when no filters apply
pub fn render_filters(filters: &[MatchedFilter]) -> String {
    if filters.is_empty() {
        return String::new();
    }
    let rows: Vec<[String; 3]> = filters
        .iter()
        .map(|m| {
            [
                m.filter.table_name.clone(),
                m.filter.column_name.clone(),
                m.values.join(", "),
            ]
        })
        .collect();
    serde_json::to_string_pretty(&rows).unwrap_or_default()
}
