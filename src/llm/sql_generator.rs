//! SQL Generator - drafts a PostgreSQL query from the selected columns and filters

use crate::error::AssistantResult;
use crate::llm::chat_client::ChatModel;
use crate::llm::extract::strip_think_block;
use crate::llm::prompts;
use std::sync::Arc;

pub struct SqlGenerator {
    model: Arc<dyn ChatModel>,
}

impl SqlGenerator {
    pub fn new(model: Arc<dyn ChatModel>) -> Self {
        Self { model }
    }

    /// Returns the model's reply with reasoning blocks removed; fences are
    /// kept so the validator sees the draft as written.
    pub async fn generate(&self, question: &str, columns: &str, filters: &str) -> AssistantResult<String> {
        tracing::info!("Generating SQL query");
        let prompt = prompts::SQL_GENERATION.render(&[("columns", columns), ("query", question), ("filters", filters)]);
        let reply = self.model.complete(&prompt).await?;
        Ok(strip_think_block(&reply))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::testing::ScriptedModel;

    #[tokio::test]
    async fn test_generate() {
        let model = Arc::new(ScriptedModel::new().reply(
            "PostGre SQL query generator",
            "<think>join on profit center</think>\n```sql\nSELECT 1\n```",
        ));
        let generator = SqlGenerator::new(model.clone());

        let sql = generator
            .generate("Gross sales?", "[[\"name of table:sales_data\", \"amount\", \"value\"]]", "")
            .await
            .unwrap();
        assert_eq!(sql, "```sql\nSELECT 1\n```");

        let human = &model.calls()[0].human;
        assert!(human.contains("Relevant tables and columns:\n[[\"name of table:sales_data\""));
        assert!(human.contains("Applicable filters:\n\n"));
    }
}
