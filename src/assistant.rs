//! Assistant - process-wide handle combining the pipeline, the warehouse and
//! the request history. Built once at start-up and shared behind `Arc`.

use crate::config::AssistantConfig;
use crate::error::AssistantResult;
use crate::knowledge::{Domain, KnowledgeBaseFile};
use crate::llm::{extract_sql_from_output, looks_executable, AuditLog, ExecutionStats, OpenAiChatClient};
use crate::pipeline::{Pipeline, PipelineState};
use crate::warehouse::{ResultSet, Warehouse};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;

pub const NO_QUERY_GENERATED: &str = "No query generated";
pub const NO_VALID_SQL: &str = "No valid SQL query was generated";

/// What happened after the SQL was produced
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ExecutionOutcome {
    Rows { result: ResultSet, execution_time_ms: f64 },
    Failed { error: String },
    NoQuery { reason: String },
    /// Execution not requested or no warehouse configured
    Skipped,
}

#[derive(Clone, Debug, Serialize)]
pub struct Answer {
    /// Audit log entry ID
    pub id: String,
    pub question: String,
    pub routed: Vec<Domain>,
    pub draft_sql: String,
    /// Validator reply as returned
    pub validated: String,
    /// SQL extracted from the validator reply
    pub sql: String,
    pub outcome: ExecutionOutcome,
    #[serde(skip)]
    pub state: PipelineState,
}

impl Answer {
    pub fn rows(&self) -> Option<&ResultSet> {
        match &self.outcome {
            ExecutionOutcome::Rows { result, .. } => Some(result),
            _ => None,
        }
    }
}

pub struct Assistant {
    pipeline: Pipeline,
    warehouse: Option<Arc<Warehouse>>,
    audit: AuditLog,
}

impl Assistant {
    pub fn new(pipeline: Pipeline, warehouse: Option<Arc<Warehouse>>, audit: AuditLog) -> Self {
        Self {
            pipeline,
            warehouse,
            audit,
        }
    }

    /// Load the knowledge base and wire the model clients and warehouse
    pub fn from_config(config: &AssistantConfig) -> AssistantResult<Self> {
        let knowledge = Arc::new(KnowledgeBaseFile::new(&config.knowledge_base.path).load()?);

        for (role, llm) in [("router", &config.router_llm), ("pipeline", &config.pipeline_llm)] {
            if llm.api_key.is_none() {
                tracing::warn!(role, model = %llm.model, "No API key configured for model");
            }
        }
        let router_model = Arc::new(OpenAiChatClient::new(&config.router_llm));
        let model = Arc::new(OpenAiChatClient::new(&config.pipeline_llm));
        let mut pipeline = Pipeline::new(knowledge.clone(), router_model, model);

        let warehouse = match &config.database {
            Some(db) => {
                let warehouse = Arc::new(Warehouse::new(db.clone(), knowledge));
                pipeline = pipeline.with_value_source(warehouse.clone(), &config.fuzzy);
                Some(warehouse)
            }
            None => {
                tracing::warn!("No database configured, queries will be generated but not executed");
                None
            }
        };

        Ok(Self::new(pipeline, warehouse, AuditLog::new(config.server.history_size)))
    }

    pub fn audit_log(&self) -> &AuditLog {
        &self.audit
    }

    pub fn can_execute(&self) -> bool {
        self.warehouse.is_some()
    }

    /// Run the pipeline and, when `execute` is set, the resulting query
    pub async fn ask(&self, question: &str, execute: bool) -> AssistantResult<Answer> {
        let state = self.pipeline.run(question).await?;
        let sql = extract_sql_from_output(&state.final_sql);
        let id = self.audit.log(question, &state.routed, &state.draft_sql, &sql);

        let outcome = if sql.is_empty() {
            ExecutionOutcome::NoQuery {
                reason: NO_QUERY_GENERATED.to_string(),
            }
        } else if !looks_executable(&sql) {
            ExecutionOutcome::NoQuery {
                reason: NO_VALID_SQL.to_string(),
            }
        } else {
            match (&self.warehouse, execute) {
                (Some(warehouse), true) => self.execute(&id, warehouse, &sql).await,
                _ => ExecutionOutcome::Skipped,
            }
        };

        Ok(Answer {
            id,
            question: state.question.clone(),
            routed: state.routed.clone(),
            draft_sql: state.draft_sql.clone(),
            validated: state.final_sql.clone(),
            sql,
            outcome,
            state,
        })
    }

    /// Execute the SQL already recorded for history entry `id` again, without
    /// any model call. `None` when the entry is unknown or has aged out.
    pub async fn rerun(&self, id: &str) -> Option<ExecutionOutcome> {
        let entry = self.audit.entry(id)?;
        let sql = entry.final_sql;
        let outcome = if sql.is_empty() {
            ExecutionOutcome::NoQuery {
                reason: NO_QUERY_GENERATED.to_string(),
            }
        } else if !looks_executable(&sql) {
            ExecutionOutcome::NoQuery {
                reason: NO_VALID_SQL.to_string(),
            }
        } else {
            match &self.warehouse {
                Some(warehouse) => self.execute(id, warehouse, &sql).await,
                None => ExecutionOutcome::Skipped,
            }
        };
        Some(outcome)
    }

    async fn execute(&self, id: &str, warehouse: &Warehouse, sql: &str) -> ExecutionOutcome {
        let start = Instant::now();
        let result = warehouse.run_query(sql).await;
        let execution_time_ms = start.elapsed().as_secs_f64() * 1000.0;

        let (stats, outcome) = match result {
            Ok(result) => (
                ExecutionStats {
                    row_count: result.row_count(),
                    execution_time_ms,
                    error: None,
                },
                ExecutionOutcome::Rows {
                    result,
                    execution_time_ms,
                },
            ),
            Err(e) => {
                let error = format!("Error executing SQL: {}", e);
                (
                    ExecutionStats {
                        row_count: 0,
                        execution_time_ms,
                        error: Some(error.clone()),
                    },
                    ExecutionOutcome::Failed { error },
                )
            }
        };
        self.audit.update_execution_stats(id, stats);
        outcome
    }
}
