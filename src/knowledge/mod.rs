//! Knowledge Base - table and column metadata used to ground the prompts
//!
//! Loaded once at start-up and shared read-only across requests.

pub mod persistence;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

pub use persistence::KnowledgeBaseFile;

/// Partition of the table catalog by analytical purpose
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Domain {
    Dim,
    Sales,
    Expense,
}

impl Domain {
    pub const ALL: [Domain; 3] = [Domain::Dim, Domain::Sales, Domain::Expense];

    pub fn as_str(&self) -> &'static str {
        match self {
            Domain::Dim => "dim",
            Domain::Sales => "sales",
            Domain::Expense => "expense",
        }
    }

    /// Parse a router label; tolerant of case and surrounding whitespace
    pub fn parse(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "dim" => Some(Domain::Dim),
            "sales" => Some(Domain::Sales),
            "expense" => Some(Domain::Expense),
            _ => None,
        }
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Column descriptor as stored in the knowledge base
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawColumn")]
pub struct ColumnMetadata {
    pub column_name: String,
    pub description: String,
    pub sample_values: Vec<String>,
}

/// Older knowledge base exports store a column as one "name: description" string.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawColumn {
    Described {
        column_name: String,
        #[serde(default)]
        description: String,
        #[serde(default)]
        sample_values: Vec<serde_json::Value>,
    },
    Text(String),
}

impl From<RawColumn> for ColumnMetadata {
    fn from(raw: RawColumn) -> Self {
        match raw {
            RawColumn::Described {
                column_name,
                description,
                sample_values,
            } => ColumnMetadata {
                column_name,
                description,
                sample_values: sample_values
                    .into_iter()
                    .map(|v| match v {
                        serde_json::Value::String(s) => s,
                        other => other.to_string(),
                    })
                    .collect(),
            },
            RawColumn::Text(text) => match text.split_once(':') {
                Some((name, description)) => ColumnMetadata {
                    column_name: name.trim().to_string(),
                    description: description.trim().to_string(),
                    sample_values: Vec::new(),
                },
                None => ColumnMetadata {
                    column_name: text.trim().to_string(),
                    description: String::new(),
                    sample_values: Vec::new(),
                },
            },
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TableMetadata {
    pub table_name: String,
    pub description: String,
    pub columns: Vec<ColumnMetadata>,
}

impl TableMetadata {
    pub fn column(&self, name: &str) -> Option<&ColumnMetadata> {
        self.columns.iter().find(|c| c.column_name.eq_ignore_ascii_case(name))
    }
}

/// Fixed mapping from domain to the tables it owns
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DomainCatalog {
    pub dim: Vec<String>,
    pub sales: Vec<String>,
    pub expense: Vec<String>,
}

impl DomainCatalog {
    pub fn tables(&self, domain: Domain) -> &[String] {
        match domain {
            Domain::Dim => &self.dim,
            Domain::Sales => &self.sales,
            Domain::Expense => &self.expense,
        }
    }

    pub fn all_tables(&self) -> impl Iterator<Item = &String> {
        self.dim.iter().chain(&self.sales).chain(&self.expense)
    }
}

impl Default for DomainCatalog {
    fn default() -> Self {
        let owned = |names: &[&str]| names.iter().map(|n| n.to_string()).collect();
        Self {
            dim: owned(&[
                "brand_master",
                "cost_center_hierarchy",
                "cost_element_hierarchy",
                "functional_area_hierarchy",
                "functional_area_metric_map",
                "key_figure_metric_map",
                "profit_center_hierarchy",
            ]),
            sales: owned(&["sales_data"]),
            expense: owned(&["income_expense_reporting"]),
        }
    }
}

/// Read-only table catalog
#[derive(Clone, Debug)]
pub struct KnowledgeBase {
    tables: HashMap<String, TableMetadata>,
    catalog: DomainCatalog,
}

impl KnowledgeBase {
    pub fn from_tables(tables: Vec<TableMetadata>) -> Self {
        Self::with_catalog(tables, DomainCatalog::default())
    }

    pub fn with_catalog(tables: Vec<TableMetadata>, catalog: DomainCatalog) -> Self {
        let tables = tables
            .into_iter()
            .map(|t| (t.table_name.clone(), t))
            .collect::<HashMap<_, _>>();

        for name in catalog.all_tables() {
            if !tables.contains_key(name) {
                tracing::warn!(table = %name, "Domain catalog references a table missing from the knowledge base");
            }
        }

        Self { tables, catalog }
    }

    pub fn table(&self, name: &str) -> Option<&TableMetadata> {
        self.tables.get(name)
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn catalog(&self) -> &DomainCatalog {
        &self.catalog
    }

    pub fn has_column(&self, table: &str, column: &str) -> bool {
        self.table(table).and_then(|t| t.column(column)).is_some()
    }

    /// `{table: description}` object for the domain's tables, in catalog order.
    /// Tables absent from the knowledge base are left out.
    pub fn describe_domain(&self, domain: Domain) -> String {
        // serde_json::Map would sort the keys, so the object is written by hand
        let body = self
            .catalog
            .tables(domain)
            .iter()
            .filter_map(|name| self.tables.get(name))
            .map(|table| {
                format!(
                    "  {}: {}",
                    serde_json::Value::String(table.table_name.clone()),
                    serde_json::Value::String(table.description.clone())
                )
            })
            .collect::<Vec<_>>()
            .join(",\n");
        format!("{{\n{}\n}}", body)
    }

    /// Column list of one table as pretty JSON, or `None` for unknown tables
    pub fn columns_prompt(&self, table: &str) -> Option<String> {
        let table = self.tables.get(table)?;
        serde_json::to_string_pretty(&table.columns).ok()
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    fn column(name: &str, description: &str, samples: &[&str]) -> ColumnMetadata {
        ColumnMetadata {
            column_name: name.to_string(),
            description: description.to_string(),
            sample_values: samples.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn finance_knowledge_base() -> KnowledgeBase {
        KnowledgeBase::from_tables(vec![
            TableMetadata {
                table_name: "brand_master".to_string(),
                description: "Maps brand codes to brand names and profit centers".to_string(),
                columns: vec![
                    column("brand_code", "Brand identifier", &["B001", "B002"]),
                    column("brand_name", "Brand display name", &["Aurora", "Zenith"]),
                    column("profit_center_code", "Profit center owning the brand", &["PC_101"]),
                ],
            },
            TableMetadata {
                table_name: "profit_center_hierarchy".to_string(),
                description: "Profit center hierarchy".to_string(),
                columns: vec![column("profit_center_code", "Profit center identifier", &["PC_101"])],
            },
            TableMetadata {
                table_name: "sales_data".to_string(),
                description: "Sales performance metrics by period, version and profit center".to_string(),
                columns: vec![
                    column("profit_center_code", "Profit center of the sale", &["PC_101"]),
                    column("key_figure", "P&L metric code", &["KF_101"]),
                    column("period", "Fiscal period", &["2025-01"]),
                    column("amount", "Metric value", &["1200.50"]),
                ],
            },
            TableMetadata {
                table_name: "income_expense_reporting".to_string(),
                description: "Consolidated revenues and costs".to_string(),
                columns: vec![column("cost_element_code", "Cost element", &["CE_400"])],
            },
        ])
    }
}
