/// End-to-end tests of the request graph with scripted models
/// Knowledge base is loaded from disk the way the binary does it

use async_trait::async_trait;
use ledger_sql_assistant::assistant::ExecutionOutcome;
use ledger_sql_assistant::config::FuzzyConfig;
use ledger_sql_assistant::llm::{AuditLog, ChatModel, ChatPrompt};
use ledger_sql_assistant::{Assistant, AssistantError, AssistantResult, Domain, KnowledgeBaseFile, Pipeline, ValueSource};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

const KNOWLEDGE_BASE: &str = r#"{
    "brand_master": {
        "table_description": "Brand master data with the owning profit center",
        "columns": [
            {"column_name": "brand_code", "description": "Brand identifier", "sample_values": ["B001", "B002"]},
            {"column_name": "brand_name", "description": "Brand name", "sample_values": ["Aurora"]},
            "profit_center_code: Profit center that owns the brand"
        ]
    },
    "profit_center_hierarchy": {
        "table_description": "Profit center rollups",
        "columns": ["profit_center_code: Profit center identifier"]
    },
    "sales_data": {
        "table_description": "Monthly sales key figures per profit center",
        "columns": [
            {"column_name": "profit_center_code", "description": "Profit center", "sample_values": ["PC_101"]},
            {"column_name": "key_figure", "description": "Metric code such as gross sales", "sample_values": ["KF_101"]},
            {"column_name": "period", "description": "Fiscal period as YYYY-MM", "sample_values": ["2025-01"]},
            {"column_name": "amount", "description": "Metric value", "sample_values": [1200.5]}
        ]
    },
    "income_expense_reporting": {
        "table_description": "Income and expense postings",
        "columns": ["cost_element_code: Cost element"]
    }
}"#;

/// Replies keyed on prompt fragments; records every prompt it sees
struct FakeModel {
    rules: Vec<(Vec<&'static str>, &'static str)>,
    seen: Mutex<Vec<ChatPrompt>>,
}

impl FakeModel {
    fn new(rules: Vec<(Vec<&'static str>, &'static str)>) -> Self {
        Self {
            rules,
            seen: Mutex::new(Vec::new()),
        }
    }

    fn prompts_containing(&self, needle: &str) -> Vec<ChatPrompt> {
        self.seen
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.system.contains(needle) || p.human.contains(needle))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl ChatModel for FakeModel {
    async fn complete(&self, prompt: &ChatPrompt) -> AssistantResult<String> {
        self.seen.lock().unwrap().push(prompt.clone());
        let text = format!("{}\n{}", prompt.system, prompt.human);
        self.rules
            .iter()
            .find(|(needles, _)| needles.iter().all(|n| text.contains(n)))
            .map(|(_, reply)| reply.to_string())
            .ok_or_else(|| AssistantError::llm("unexpected prompt"))
    }

    fn name(&self) -> &str {
        "fake"
    }
}

struct StoredBrands;

#[async_trait]
impl ValueSource for StoredBrands {
    async fn exact_value(&self, table: &str, column: &str, value: &str) -> AssistantResult<Option<String>> {
        let values = self.candidate_values(table, column, value, usize::MAX).await?;
        Ok(values.into_iter().find(|v| v.eq_ignore_ascii_case(value)))
    }

    async fn candidate_values(
        &self,
        table: &str,
        column: &str,
        _value: &str,
        _limit: usize,
    ) -> AssistantResult<Vec<String>> {
        match (table, column) {
            ("brand_master", "brand_code") => Ok(vec!["B001".to_string(), "B002".to_string()]),
            _ => Ok(Vec::new()),
        }
    }
}

fn router_model(reply: &'static str) -> Arc<FakeModel> {
    Arc::new(FakeModel::new(vec![(vec!["intelligent router"], reply)]))
}

fn stage_model() -> Arc<FakeModel> {
    Arc::new(FakeModel::new(vec![
        (
            vec!["subquestion generator", "\"brand_master\": \"Brand master"],
            "Here you go:\n[['Brand B001', 'brand_master'], ['Brand B001', 'profit_center_hierarchy'],]",
        ),
        (
            vec!["subquestion generator", "\"sales_data\": \"Monthly sales"],
            "[[\"Gross sales\", \"for January 2025\", \"sales_data\"]]",
        ),
        (
            vec!["data column selector", "\"brand_code\""],
            "[[\"brand_code\", \"filter on the brand\"], [\"profit_center_code\", \"join key to sales\"]]",
        ),
        (
            vec!["data column selector", "Profit center identifier"],
            "[[\"profit_center_code\", \"join key to sales\"]]",
        ),
        (
            vec!["data column selector", "\"amount\""],
            "[['key_figure', 'gross sales metric'], ['period', 'January 2025'], ['amount', 'value to sum'], ['profit_center_code', 'join key to sales']]",
        ),
        (
            vec!["determine whether filters"],
            "<think>brand and period</think>\n[\"yes\", [\"brand_master\", \"brand_code\", \"b001\"], [\"sales_data\", \"period\", \"2025-01\"]]",
        ),
        (
            vec!["PostGre SQL query generator"],
            "```sql\nSELECT SUM(s.amount) AS gross_sales\nFROM sales_data s\nJOIN brand_master b ON b.profit_center_code = s.profit_center_code\nWHERE b.brand_code = 'B001' AND s.period = '2025-01'\n```",
        ),
        (
            vec!["query validator"],
            "The query is correct.\n```sql\nSELECT SUM(s.amount) AS gross_sales\nFROM sales_data s\nJOIN brand_master b ON b.profit_center_code = s.profit_center_code\nWHERE b.brand_code = 'B001' AND s.period = '2025-01';\n```",
        ),
    ]))
}

fn knowledge_dir() -> TempDir {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("kb.json"), KNOWLEDGE_BASE).unwrap();
    dir
}

#[tokio::test]
async fn test_brand_sales_question_end_to_end() {
    let dir = knowledge_dir();
    let knowledge = Arc::new(KnowledgeBaseFile::new(dir.path().join("kb.json")).load().unwrap());
    assert_eq!(knowledge.len(), 4);

    let model = stage_model();
    let pipeline = Pipeline::new(knowledge, router_model("[\"dim\", \"sales\"]"), model.clone())
        .with_value_source(Arc::new(StoredBrands), &FuzzyConfig::default());
    let assistant = Assistant::new(pipeline, None, AuditLog::new(10));

    let answer = assistant
        .ask("Give me the Gross sales for Brand B001 for January 2025", true)
        .await
        .unwrap();
    let state = &answer.state;

    assert!(state.routed.contains(&Domain::Dim));
    assert!(state.routed.contains(&Domain::Sales));

    let dim = state.output(Domain::Dim).unwrap();
    assert_eq!(dim.subquestions.len(), 2);
    assert!(dim.columns.iter().any(|c| c.table_name == "brand_master"));
    let sales = state.output(Domain::Sales).unwrap();
    assert_eq!(sales.subquestions[0].subquestion, "Gross sales; for January 2025");
    assert!(sales.columns.iter().all(|c| c.table_name == "sales_data"));

    // (profit_center_hierarchy, profit_center_code, join key) and the sales
    // copy differ by table, so nothing collapses across domains here
    assert_eq!(state.merged_columns.len(), 2 + 1 + 4);

    let filters = state.filter_decision.filters();
    assert_eq!(filters.len(), 2);
    assert_eq!(filters[0].value, "b001");
    assert_eq!(state.matched_filters[0].values, vec!["B001".to_string()]);
    // No stored values for period: the literal is kept
    assert_eq!(state.matched_filters[1].values, vec!["2025-01".to_string()]);

    assert!(answer.sql.starts_with("SELECT SUM(s.amount)"));
    assert!(answer.sql.contains("WHERE b.brand_code = 'B001'"));
    assert!(matches!(answer.outcome, ExecutionOutcome::Skipped));

    let generation = model.prompts_containing("PostGre SQL query generator");
    assert_eq!(generation.len(), 1);
    assert!(generation[0].human.contains("\"brand_code\",\n    \"B001\""));
}

#[tokio::test]
async fn test_identical_selections_are_merged_once() {
    let dir = knowledge_dir();
    let knowledge = Arc::new(KnowledgeBaseFile::new(dir.path().join("kb.json")).load().unwrap());

    // Two subquestions land on brand_master and get the same column answer
    let model = Arc::new(FakeModel::new(vec![
        (
            vec!["subquestion generator"],
            "[[\"Brand B001\", \"brand_master\"], [\"Owner of B001\", \"brand_master\"]]",
        ),
        (
            vec!["data column selector"],
            "[[\"brand_code\", \"identifies the brand\"], [\"brand_name\", \"display\"]]",
        ),
        (vec!["determine whether filters"], "[\"no\"]"),
        (vec!["PostGre SQL query generator"], "SELECT brand_code, brand_name FROM brand_master"),
        (vec!["query validator"], "SELECT brand_code, brand_name FROM brand_master"),
    ]));
    let pipeline = Pipeline::new(knowledge, router_model("[\"dim\", \"dim\"]"), model.clone());
    let state = pipeline.run("Brand B001 owner").await.unwrap();

    assert_eq!(state.routed, vec![Domain::Dim]);
    assert_eq!(state.output(Domain::Dim).unwrap().columns.len(), 4);
    let merged: Vec<&str> = state.merged_columns.iter().map(|c| c.column_name.as_str()).collect();
    assert_eq!(merged, vec!["brand_code", "brand_name"]);
    assert_eq!(model.prompts_containing("data column selector").len(), 2);
    assert!(state.matched_filters.is_empty());
}

#[tokio::test]
async fn test_unanswerable_question_produces_no_query() {
    let dir = knowledge_dir();
    let knowledge = Arc::new(KnowledgeBaseFile::new(dir.path().join("kb.json")).load().unwrap());
    let pipeline = Pipeline::new(knowledge, router_model("[]"), stage_model());
    let assistant = Assistant::new(pipeline, None, AuditLog::new(10));

    let answer = assistant.ask("Who won the football match?", true).await.unwrap();
    assert!(answer.routed.is_empty());
    assert!(answer.sql.is_empty());
    match answer.outcome {
        ExecutionOutcome::NoQuery { reason } => assert_eq!(reason, "No query generated"),
        other => panic!("unexpected outcome: {:?}", other),
    }
}

#[tokio::test]
async fn test_malformed_router_reply_is_not_an_error() {
    let dir = knowledge_dir();
    let knowledge = Arc::new(KnowledgeBaseFile::new(dir.path().join("kb.json")).load().unwrap());
    let pipeline = Pipeline::new(knowledge, router_model("agents: dim, sales"), stage_model());

    let state = pipeline.run("Gross sales").await.unwrap();
    assert!(state.routed.is_empty());
    assert!(state.final_sql.is_empty());
}
