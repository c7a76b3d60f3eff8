//! Domain Extractor - subquestions and column selections for one domain
//!
//! Two chained calls per domain: the question is split into subquestions
//! mapped to the domain's tables, then each subquestion gets its columns.

use crate::error::AssistantResult;
use crate::knowledge::{Domain, KnowledgeBase};
use crate::llm::chat_client::ChatModel;
use crate::llm::extract::{extract_or_default, Literal, Shape};
use crate::llm::prompts;
use crate::pipeline::state::{ColumnSelection, DomainOutput, SubquestionEntry};
use std::sync::Arc;

pub struct DomainExtractor {
    model: Arc<dyn ChatModel>,
    knowledge: Arc<KnowledgeBase>,
}

impl DomainExtractor {
    pub fn new(model: Arc<dyn ChatModel>, knowledge: Arc<KnowledgeBase>) -> Self {
        Self { model, knowledge }
    }

    pub async fn extract(&self, question: &str, domain: Domain) -> AssistantResult<DomainOutput> {
        tracing::info!(domain = %domain, "Extracting relevant tables and columns");

        let subquestions = self.subquestions(question, domain).await?;
        let mut columns = Vec::new();
        for entry in &subquestions {
            columns.extend(self.select_columns(question, entry).await?);
        }

        tracing::debug!(
            domain = %domain,
            subquestions = subquestions.len(),
            columns = columns.len(),
            "Domain extraction finished"
        );
        Ok(DomainOutput {
            domain,
            subquestions,
            columns,
        })
    }

    /// Subquestion → table mapping, restricted to tables the knowledge base knows
    pub async fn subquestions(&self, question: &str, domain: Domain) -> AssistantResult<Vec<SubquestionEntry>> {
        let tables = self.knowledge.describe_domain(domain);
        let prompt = prompts::SUBQUESTION.render(&[("tables", &tables), ("user_query", question)]);
        let reply = self.model.complete(&prompt).await?;

        let entries = parse_subquestions(&reply)
            .into_iter()
            .filter(|entry| {
                let known = self.knowledge.table(&entry.table_name).is_some();
                if !known {
                    tracing::warn!(table = %entry.table_name, "Model mapped a subquestion to an unknown table");
                }
                known
            })
            .collect();
        Ok(entries)
    }

    /// Columns of the subquestion's table that help answer it
    pub async fn select_columns(&self, question: &str, entry: &SubquestionEntry) -> AssistantResult<Vec<ColumnSelection>> {
        let Some(columns) = self.knowledge.columns_prompt(&entry.table_name) else {
            return Ok(Vec::new());
        };
        let prompt = prompts::COLUMN_SELECTION.render(&[
            ("columns", &columns),
            ("query", &entry.subquestion),
            ("main_question", question),
        ]);
        let reply = self.model.complete(&prompt).await?;
        Ok(parse_column_selection(&reply, &entry.table_name))
    }
}

/// `[[sub, table], [sub1, sub2, table], [[]]]` → entries. The last cell of a
/// row is the table; any cells before it are subquestions for that table.
pub fn parse_subquestions(reply: &str) -> Vec<SubquestionEntry> {
    let rows: Vec<Vec<String>> = extract_or_default("subquestion", reply, Shape::ListOfLists, Literal::into_rows);
    rows.into_iter()
        .filter_map(|mut row| {
            let table_name = row.pop()?.trim().to_string();
            if row.is_empty() || table_name.is_empty() {
                return None;
            }
            Some(SubquestionEntry {
                subquestion: row.join("; "),
                table_name,
            })
        })
        .collect()
}

/// `[[column, rationale], ...]` → selections tagged with `table_name`
pub fn parse_column_selection(reply: &str, table_name: &str) -> Vec<ColumnSelection> {
    let rows: Vec<Vec<String>> = extract_or_default("column_selection", reply, Shape::ListOfLists, Literal::into_rows);
    rows.into_iter()
        .filter_map(|row| {
            let mut cells = row.into_iter();
            let column_name = cells.next()?.trim().to_string();
            if column_name.is_empty() {
                return None;
            }
            Some(ColumnSelection {
                table_name: table_name.to_string(),
                column_name,
                rationale: cells.collect::<Vec<_>>().join(" "),
            })
        })
        .collect()
}
