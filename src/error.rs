/// Unified error type for the assistant
/// Groups failures by the boundary they came from: model providers, the
/// warehouse, the knowledge base file, configuration.
use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum AssistantError {
    /// LLM provider errors: transport failures, non-success status, empty replies
    #[error("LLM error: {message}")]
    Llm {
        message: String,
        provider: Option<String>,
        status: Option<u16>,
    },

    /// Warehouse errors: connectivity, SQL syntax, transaction failures
    #[error("Database error: {message}")]
    Database {
        message: String,
        query: Option<String>,
    },

    /// Knowledge base errors: unreadable or malformed metadata file, unknown tables
    #[error("Knowledge base error: {message}")]
    KnowledgeBase {
        message: String,
        path: Option<String>,
    },

    /// Configuration errors: missing secrets, unparsable values
    #[error("Configuration error: {message}")]
    Config {
        message: String,
        key: Option<String>,
    },

    /// IO errors: config files, CSV export
    #[error("IO error: {message}")]
    Io {
        message: String,
        path: Option<String>,
    },

    /// Internal errors: should never happen, indicates bug
    #[error("Internal error: {message}")]
    Internal {
        message: String,
        context: Option<String>,
    },
}

impl AssistantError {
    pub fn llm(message: impl Into<String>) -> Self {
        Self::Llm {
            message: message.into(),
            provider: None,
            status: None,
        }
    }

    pub fn llm_with_status(message: impl Into<String>, provider: impl Into<String>, status: u16) -> Self {
        Self::Llm {
            message: message.into(),
            provider: Some(provider.into()),
            status: Some(status),
        }
    }

    pub fn database(message: impl Into<String>) -> Self {
        Self::Database {
            message: message.into(),
            query: None,
        }
    }

    pub fn knowledge_base(message: impl Into<String>) -> Self {
        Self::KnowledgeBase {
            message: message.into(),
            path: None,
        }
    }

    pub fn knowledge_base_with_path(message: impl Into<String>, path: impl Into<String>) -> Self {
        Self::KnowledgeBase {
            message: message.into(),
            path: Some(path.into()),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            key: None,
        }
    }

    pub fn config_key(message: impl Into<String>, key: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            key: Some(key.into()),
        }
    }

    pub fn io_with_path(message: impl Into<String>, path: impl Into<String>) -> Self {
        Self::Io {
            message: message.into(),
            path: Some(path.into()),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
            context: None,
        }
    }

    /// Add context to an error
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        match &mut self {
            Self::Llm { provider, .. } => *provider = Some(context.into()),
            Self::Database { query, .. } => *query = Some(context.into()),
            Self::Internal { context: ctx, .. } => *ctx = Some(context.into()),
            _ => {}
        }
        self
    }
}

impl From<anyhow::Error> for AssistantError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal {
            message: err.to_string(),
            context: None,
        }
    }
}

impl From<std::io::Error> for AssistantError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            message: err.to_string(),
            path: None,
        }
    }
}

impl From<reqwest::Error> for AssistantError {
    fn from(err: reqwest::Error) -> Self {
        Self::Llm {
            message: err.to_string(),
            provider: None,
            status: err.status().map(|s| s.as_u16()),
        }
    }
}

impl From<tokio_postgres::Error> for AssistantError {
    fn from(err: tokio_postgres::Error) -> Self {
        // Server-side errors carry the useful part in the DbError body
        let message = match err.as_db_error() {
            Some(db) => format!("{}: {}", db.severity(), db.message()),
            None => err.to_string(),
        };
        Self::Database {
            message,
            query: None,
        }
    }
}

impl From<csv::Error> for AssistantError {
    fn from(err: csv::Error) -> Self {
        Self::Io {
            message: err.to_string(),
            path: None,
        }
    }
}

/// Result type alias for assistant operations
pub type AssistantResult<T> = Result<T, AssistantError>;
