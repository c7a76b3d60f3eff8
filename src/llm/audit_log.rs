//! Audit Log - recent questions, the SQL produced for them, and execution stats

use crate::knowledge::Domain;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Arc, RwLock};

/// Audit log entry
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AuditLogEntry {
    /// Entry ID
    pub id: String,

    /// Question as asked
    pub question: String,

    /// Domains the router picked
    pub routed: Vec<Domain>,

    /// Generator output before validation
    pub draft_sql: String,

    /// Query handed to the warehouse (empty when none was produced)
    pub final_sql: String,

    /// Execution stats (if executed)
    pub execution: Option<ExecutionStats>,

    /// Seconds since the epoch
    pub timestamp: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExecutionStats {
    pub row_count: usize,
    pub execution_time_ms: f64,
    pub error: Option<String>,
}

/// In-memory ring of the most recent requests
#[derive(Clone)]
pub struct AuditLog {
    entries: Arc<RwLock<VecDeque<AuditLogEntry>>>,
    max_entries: usize,
}

impl AuditLog {
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: Arc::new(RwLock::new(VecDeque::new())),
            max_entries: max_entries.max(1),
        }
    }

    /// Record a request; returns the entry ID
    pub fn log(&self, question: &str, routed: &[Domain], draft_sql: &str, final_sql: &str) -> String {
        let id = uuid::Uuid::new_v4().to_string();
        let entry = AuditLogEntry {
            id: id.clone(),
            question: question.to_string(),
            routed: routed.to_vec(),
            draft_sql: draft_sql.to_string(),
            final_sql: final_sql.to_string(),
            execution: None,
            timestamp: now_timestamp(),
        };

        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.push_back(entry);
        while entries.len() > self.max_entries {
            entries.pop_front();
        }
        id
    }

    pub fn update_execution_stats(&self, entry_id: &str, stats: ExecutionStats) {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        if let Some(entry) = entries.iter_mut().find(|e| e.id == entry_id) {
            entry.execution = Some(stats);
        }
    }

    /// Newest first
    pub fn entries(&self) -> Vec<AuditLogEntry> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries.iter().rev().cloned().collect()
    }

    pub fn entry(&self, entry_id: &str) -> Option<AuditLogEntry> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries.iter().find(|e| e.id == entry_id).cloned()
    }
}

impl Default for AuditLog {
    fn default() -> Self {
        Self::new(200)
    }
}

fn now_timestamp() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ring_evicts_oldest() {
        let log = AuditLog::new(2);
        log.log("first", &[Domain::Sales], "", "SELECT 1");
        log.log("second", &[], "", "");
        log.log("third", &[Domain::Dim, Domain::Expense], "", "SELECT 3");

        let questions: Vec<String> = log.entries().into_iter().map(|e| e.question).collect();
        assert_eq!(questions, vec!["third".to_string(), "second".to_string()]);
    }

    #[test]
    fn test_update_execution_stats() {
        let log = AuditLog::default();
        let id = log.log("q", &[Domain::Sales], "SELECT 1", "SELECT 1");
        log.update_execution_stats(
            &id,
            ExecutionStats {
                row_count: 3,
                execution_time_ms: 1.5,
                error: None,
            },
        );

        let entry = log.entry(&id).unwrap();
        assert_eq!(entry.execution.unwrap().row_count, 3);
        assert!(log.entry("missing").is_none());
    }
}
