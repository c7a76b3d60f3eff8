/// Result sets returned by the warehouse, with table and CSV rendering
use crate::error::{AssistantError, AssistantResult};
use serde::{Deserialize, Serialize};
use std::io::Write;

/// Rows of one query, all values in their PostgreSQL text form
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultSet {
    /// Column names
    pub columns: Vec<String>,
    /// `None` is SQL NULL
    pub rows: Vec<Vec<Option<String>>>,
}

impl ResultSet {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// One-line description used in logs and the CLI footer
    pub fn summary(&self) -> String {
        format!(
            "Query returned {} row{}. Columns: [{}]",
            self.rows.len(),
            if self.rows.len() == 1 { "" } else { "s" },
            self.columns.join(", ")
        )
    }

    /// Header row first; NULL becomes an empty field
    pub fn write_csv<W: Write>(&self, writer: W) -> AssistantResult<()> {
        let mut csv_writer = csv::Writer::from_writer(writer);
        csv_writer.write_record(&self.columns)?;
        for row in &self.rows {
            csv_writer.write_record(row.iter().map(|v| v.as_deref().unwrap_or("")))?;
        }
        csv_writer
            .flush()
            .map_err(|e| AssistantError::internal(format!("Failed to flush CSV output: {}", e)))
    }

    pub fn to_csv(&self) -> AssistantResult<String> {
        let mut buffer = Vec::new();
        self.write_csv(&mut buffer)?;
        String::from_utf8(buffer).map_err(|e| AssistantError::internal(format!("CSV output is not UTF-8: {}", e)))
    }

    /// Plain-text grid of at most `max_rows` rows
    pub fn render_table(&self, max_rows: usize) -> String {
        let cell = |v: &Option<String>| v.clone().unwrap_or_else(|| "NULL".to_string());
        let shown: Vec<Vec<String>> = self
            .rows
            .iter()
            .take(max_rows)
            .map(|row| row.iter().map(cell).collect())
            .collect();

        let mut widths: Vec<usize> = self.columns.iter().map(|c| c.chars().count()).collect();
        for row in &shown {
            for (i, value) in row.iter().enumerate() {
                if let Some(width) = widths.get_mut(i) {
                    *width = (*width).max(value.chars().count());
                }
            }
        }

        let separator = format!(
            "+{}+",
            widths.iter().map(|w| "-".repeat(w + 2)).collect::<Vec<_>>().join("+")
        );
        let line = |values: &[String]| {
            let cells: Vec<String> = widths
                .iter()
                .enumerate()
                .map(|(i, w)| format!(" {:<width$} ", values.get(i).map(String::as_str).unwrap_or(""), width = w))
                .collect();
            format!("|{}|", cells.join("|"))
        };

        let mut out = vec![separator.clone(), line(&self.columns), separator.clone()];
        out.extend(shown.iter().map(|row| line(row)));
        out.push(separator);
        if self.rows.len() > max_rows {
            out.push(format!("... {} more rows", self.rows.len() - max_rows));
        }
        out.join("\n")
    }
}
