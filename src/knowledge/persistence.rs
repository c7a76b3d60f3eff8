//! Knowledge base file loader (JSON on disk)

use crate::error::{AssistantError, AssistantResult};
use crate::knowledge::{ColumnMetadata, DomainCatalog, KnowledgeBase, TableMetadata};
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// On-disk shape: `{table_name: {"table_description": str, "columns": [...]}}`
#[derive(Deserialize)]
struct StoredTable {
    table_description: String,
    #[serde(default)]
    columns: Vec<ColumnMetadata>,
}

/// Loader for the knowledge base file
pub struct KnowledgeBaseFile {
    path: PathBuf,
}

impl KnowledgeBaseFile {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Load the knowledge base with the default domain catalog
    pub fn load(&self) -> AssistantResult<KnowledgeBase> {
        self.load_with_catalog(DomainCatalog::default())
    }

    pub fn load_with_catalog(&self, catalog: DomainCatalog) -> AssistantResult<KnowledgeBase> {
        let path_display = self.path.display().to_string();
        let content = fs::read_to_string(&self.path).map_err(|e| {
            AssistantError::knowledge_base_with_path(format!("Failed to read knowledge base: {}", e), &path_display)
        })?;

        let stored: HashMap<String, StoredTable> = serde_json::from_str(&content).map_err(|e| {
            AssistantError::knowledge_base_with_path(format!("Failed to parse knowledge base: {}", e), &path_display)
        })?;

        let tables = stored
            .into_iter()
            .map(|(table_name, table)| TableMetadata {
                table_name,
                description: table.table_description,
                columns: table.columns,
            })
            .collect::<Vec<_>>();

        tracing::info!(path = %path_display, tables = tables.len(), "Loaded knowledge base");
        Ok(KnowledgeBase::with_catalog(tables, catalog))
    }
}
