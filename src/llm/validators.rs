//! SQL Validator - second pass over the drafted query, plus the helpers that
//! turn the reviewed reply into something executable

use crate::error::AssistantResult;
use crate::llm::chat_client::ChatModel;
use crate::llm::extract::strip_think_block;
use crate::llm::prompts;
use regex::Regex;
use std::sync::{Arc, OnceLock};

pub struct SqlValidator {
    model: Arc<dyn ChatModel>,
}

impl SqlValidator {
    pub fn new(model: Arc<dyn ChatModel>) -> Self {
        Self { model }
    }

    /// Returns the confirmed or corrected query text (reasoning removed)
    pub async fn validate(&self, question: &str, columns: &str, filters: &str, draft_sql: &str) -> AssistantResult<String> {
        tracing::info!("Validating and finalizing SQL query");
        let prompt = prompts::SQL_VALIDATION.render(&[
            ("columns", columns),
            ("query", question),
            ("filters", filters),
            ("sql_query", draft_sql),
        ]);
        let reply = self.model.complete(&prompt).await?;
        Ok(strip_think_block(&reply))
    }
}

fn sql_fence() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?is)```sql\s+(.*?)```").expect("valid sql fence pattern"))
}

fn any_fence() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)```(.*?)```").expect("valid fence pattern"))
}

/// SQL inside a ```sql fence, else inside any fence, else the whole reply
pub fn extract_sql_from_output(output: &str) -> String {
    if output.trim().is_empty() {
        return String::new();
    }
    if let Some(caps) = sql_fence().captures(output) {
        return caps[1].trim().to_string();
    }
    if let Some(caps) = any_fence().captures(output) {
        return caps[1].trim().to_string();
    }
    output.trim().to_string()
}

/// Only replies that mention SELECT are worth sending to the warehouse
pub fn looks_executable(output: &str) -> bool {
    output.to_ascii_uppercase().contains("SELECT")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::testing::ScriptedModel;

    #[test]
    fn test_extract_sql_from_output() {
        assert_eq!(
            extract_sql_from_output("The query is valid.\n```SQL\nSELECT * FROM sales_data\n```\nNo changes."),
            "SELECT * FROM sales_data"
        );
        assert_eq!(extract_sql_from_output("```\nSELECT 1;\n```"), "SELECT 1;");
        assert_eq!(extract_sql_from_output("  SELECT 2  "), "SELECT 2");
        assert_eq!(extract_sql_from_output(""), "");
    }

    #[test]
    fn test_looks_executable() {
        assert!(looks_executable("with t as (select 1) select * from t"));
        assert!(!looks_executable("I cannot answer this question."));
    }

    #[tokio::test]
    async fn test_validate_passes_draft() {
        let model = Arc::new(ScriptedModel::new().reply("query validator", "```sql\nSELECT 2\n```"));
        let validator = SqlValidator::new(model.clone());

        let reviewed = validator.validate("q", "[]", "", "SELECT 1").await.unwrap();
        assert_eq!(extract_sql_from_output(&reviewed), "SELECT 2");
        assert!(model.calls()[0].human.contains("**SQL Query to Validate:**  \nSELECT 1"));
    }
}
