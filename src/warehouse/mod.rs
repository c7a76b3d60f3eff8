//! Warehouse - runs validated queries against PostgreSQL
//!
//! Every call opens its own connection, wraps the statement in a
//! transaction (commit on success, rollback on error) and drops the
//! connection before returning. Connections use TLS unless `sslmode` is
//! `disable`.

pub mod result_set;

pub use result_set::ResultSet;

use crate::config::{DatabaseConfig, SslMode};
use crate::error::{AssistantError, AssistantResult};
use crate::knowledge::KnowledgeBase;
use crate::pipeline::ValueSource;
use async_trait::async_trait;
use postgres_native_tls::MakeTlsConnector;
use std::sync::Arc;
use tokio_postgres::types::ToSql;
use tokio_postgres::{Client, SimpleQueryMessage};

pub struct Warehouse {
    config: DatabaseConfig,
    knowledge: Arc<KnowledgeBase>,
}

impl Warehouse {
    pub fn new(config: DatabaseConfig, knowledge: Arc<KnowledgeBase>) -> Self {
        Self { config, knowledge }
    }

    async fn connect(&self) -> AssistantResult<Client> {
        let tls = tls_connector(self.config.sslmode)?;
        let (client, connection) = tokio_postgres::connect(&self.config.connection_string(), tls).await?;
        tracing::debug!(
            host = %self.config.host,
            dbname = %self.config.dbname,
            sslmode = self.config.sslmode.as_str(),
            "Connected to warehouse"
        );

        // Ends once the client is dropped
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::warn!(error = %e, "PostgreSQL connection error");
            }
        });
        Ok(client)
    }

    /// Execute `sql` and collect the rows of its last result set
    pub async fn run_query(&self, sql: &str) -> AssistantResult<ResultSet> {
        let mut client = self.connect().await?;
        let transaction = client.transaction().await?;

        match transaction.simple_query(sql).await {
            Ok(messages) => {
                transaction.commit().await?;
                let result = collect_rows(messages);
                tracing::info!(rows = result.row_count(), "Query executed");
                Ok(result)
            }
            Err(e) => {
                let error = AssistantError::from(e).with_context(sql);
                tracing::warn!(error = %error, "Query failed, rolling back");
                if let Err(rollback) = transaction.rollback().await {
                    tracing::warn!(error = %rollback, "Rollback failed");
                }
                Err(error)
            }
        }
    }

    /// Execute a parameterised statement and collect its first column as text
    async fn query_text(&self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> AssistantResult<Vec<String>> {
        let mut client = self.connect().await?;
        let transaction = client.transaction().await?;

        match transaction.query(sql, params).await {
            Ok(rows) => {
                transaction.commit().await?;
                Ok(rows.iter().filter_map(|row| row.get::<_, Option<String>>(0)).collect())
            }
            Err(e) => {
                let error = AssistantError::from(e).with_context(sql);
                tracing::warn!(error = %error, "Value lookup failed, rolling back");
                if let Err(rollback) = transaction.rollback().await {
                    tracing::warn!(error = %rollback, "Rollback failed");
                }
                Err(error)
            }
        }
    }

    /// Quoted (table, column) for a column the knowledge base describes
    fn known_column(&self, table: &str, column: &str) -> AssistantResult<(String, String)> {
        self.knowledge
            .table(table)
            .and_then(|t| t.column(column).map(|c| (quote_ident(&t.table_name), quote_ident(&c.column_name))))
            .ok_or_else(|| AssistantError::knowledge_base(format!("Unknown column {}.{} for value lookup", table, column)))
    }
}

/// `require` encrypts without checking the server certificate, as libpq does;
/// `verify-full` checks the chain and the host name
fn tls_connector(mode: SslMode) -> AssistantResult<MakeTlsConnector> {
    let verify = mode.verifies_certificates();
    let connector = native_tls::TlsConnector::builder()
        .danger_accept_invalid_certs(!verify)
        .danger_accept_invalid_hostnames(!verify)
        .build()
        .map_err(|e| AssistantError::database(format!("Failed to build TLS connector: {}", e)))?;
    Ok(MakeTlsConnector::new(connector))
}

fn collect_rows(messages: Vec<SimpleQueryMessage>) -> ResultSet {
    let mut result = ResultSet::default();
    for message in messages {
        match message {
            SimpleQueryMessage::RowDescription(columns) => {
                result = ResultSet::new(columns.iter().map(|c| c.name().to_string()).collect());
            }
            SimpleQueryMessage::Row(row) => {
                if result.columns.is_empty() {
                    result.columns = row.columns().iter().map(|c| c.name().to_string()).collect();
                }
                result
                    .rows
                    .push((0..row.len()).map(|i| row.get(i).map(str::to_string)).collect());
            }
            _ => {}
        }
    }
    result
}

/// Double-quoted identifier with embedded quotes doubled
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

#[async_trait]
impl ValueSource for Warehouse {
    async fn exact_value(&self, table: &str, column: &str, value: &str) -> AssistantResult<Option<String>> {
        let (table, column) = self.known_column(table, column)?;
        let sql = format!(
            "SELECT {col}::text FROM {tbl} WHERE lower({col}::text) = lower($1::text) LIMIT 1",
            col = column,
            tbl = table
        );
        Ok(self.query_text(&sql, &[&value]).await?.into_iter().next())
    }

    /// Values containing (or contained in) the request come first, then the
    /// closest lengths
    async fn candidate_values(
        &self,
        table: &str,
        column: &str,
        value: &str,
        limit: usize,
    ) -> AssistantResult<Vec<String>> {
        let (table, column) = self.known_column(table, column)?;
        let sql = format!(
            "SELECT v FROM (SELECT DISTINCT {col}::text AS v FROM {tbl} WHERE {col} IS NOT NULL) AS stored \
             ORDER BY (strpos(lower(v), lower($1::text)) > 0 OR strpos(lower($1::text), lower(v)) > 0) DESC, \
             abs(length(v) - length($1::text)), v \
             LIMIT $2",
            col = column,
            tbl = table
        );
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        self.query_text(&sql, &[&value, &limit]).await
    }
}
