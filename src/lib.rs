//! Natural-language-to-SQL assistant for a finance warehouse.
//!
//! A question is routed to the dim, sales and expense domains, each routed
//! domain picks its tables and columns, filters are detected and matched to
//! stored values, and a validated PostgreSQL query is generated and run.

pub mod assistant;
pub mod config;
pub mod error;
pub mod knowledge;
pub mod llm;
pub mod pipeline;
pub mod warehouse;
pub mod web;

pub use assistant::{Answer, Assistant, ExecutionOutcome};
pub use config::AssistantConfig;
pub use error::{AssistantError, AssistantResult};
pub use knowledge::{Domain, KnowledgeBase, KnowledgeBaseFile};
pub use llm::ChatModel;
pub use pipeline::{Pipeline, PipelineState, ValueSource};
pub use warehouse::{ResultSet, Warehouse};
