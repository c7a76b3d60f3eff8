//! LLM Module - chat client, prompts, reply parsing and the model-backed stages

pub mod audit_log;
pub mod chat_client;
pub mod extract;
pub mod extractor;
pub mod filter_detector;
pub mod prompts;
pub mod router;
pub mod sql_generator;
pub mod validators;

#[cfg(test)]
pub(crate) mod testing;

pub use audit_log::{AuditLog, AuditLogEntry, ExecutionStats};
pub use chat_client::{ChatModel, OpenAiChatClient};
pub use extract::{extract, extract_or_default, strip_think_block, ExtractError, Literal, Shape};
pub use extractor::DomainExtractor;
pub use filter_detector::FilterDetector;
pub use prompts::{ChatPrompt, PromptTemplate};
pub use router::QueryRouter;
pub use sql_generator::SqlGenerator;
pub use validators::{extract_sql_from_output, looks_executable, SqlValidator};
