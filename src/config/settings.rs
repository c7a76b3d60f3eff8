/// Assistant configuration
///
/// Loaded from an optional JSON file, then overridden by environment
/// variables (secrets are expected to come from the environment or `.env`).

use crate::error::{AssistantError, AssistantResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct AssistantConfig {
    /// HTTP server
    pub server: ServerConfig,

    /// Warehouse connection; without it queries are generated but not run
    pub database: Option<DatabaseConfig>,

    /// Model used by the router
    pub router_llm: LlmConfig,

    /// Model used by every other stage
    pub pipeline_llm: LlmConfig,

    pub knowledge_base: KnowledgeBaseConfig,

    pub fuzzy: FuzzyConfig,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,

    /// Requests kept in the in-memory history
    pub history_size: usize,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub host: String,
    #[serde(default = "default_db_port")]
    pub port: u16,
    pub user: String,
    #[serde(default)]
    pub password: String,
    pub dbname: String,

    /// Seconds before a connection attempt is abandoned
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: u64,

    #[serde(default)]
    pub sslmode: SslMode,
}

/// TLS policy for warehouse connections, named as in libpq
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SslMode {
    /// Plaintext
    Disable,
    /// TLS when the server offers it
    Prefer,
    /// TLS or no connection; the certificate is not checked
    #[default]
    Require,
    /// TLS with certificate chain and host name checks
    VerifyFull,
}

impl SslMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SslMode::Disable => "disable",
            SslMode::Prefer => "prefer",
            SslMode::Require => "require",
            SslMode::VerifyFull => "verify-full",
        }
    }

    /// Value for the `sslmode` connection parameter; the driver knows no
    /// `verify-full`, the TLS connector does the checking instead
    fn connection_param(&self) -> &'static str {
        match self {
            SslMode::VerifyFull => "require",
            other => other.as_str(),
        }
    }

    pub fn verifies_certificates(&self) -> bool {
        matches!(self, SslMode::VerifyFull)
    }
}

impl std::str::FromStr for SslMode {
    type Err = AssistantError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "disable" => Ok(SslMode::Disable),
            "prefer" => Ok(SslMode::Prefer),
            "require" => Ok(SslMode::Require),
            "verify-full" => Ok(SslMode::VerifyFull),
            other => Err(AssistantError::config_key(
                format!("Unsupported sslmode {:?} (disable, prefer, require, verify-full)", other),
                "DB_SSLMODE",
            )),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// OpenAI-compatible API root, e.g. `https://api.openai.com/v1`
    pub base_url: String,
    pub model: String,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct KnowledgeBaseConfig {
    pub path: PathBuf,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct FuzzyConfig {
    /// Minimum similarity (0.0-1.0) for a stored value to replace the user's text
    pub threshold: f64,

    /// Distinct values fetched per filtered column
    pub max_candidates: usize,
}

fn default_db_port() -> u16 {
    5432
}

fn default_connect_timeout() -> u64 {
    10
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            database: None,
            router_llm: LlmConfig::router_default(),
            pipeline_llm: LlmConfig::default(),
            knowledge_base: KnowledgeBaseConfig::default(),
            fuzzy: FuzzyConfig::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            history_size: 200,
        }
    }
}

impl LlmConfig {
    /// Groq-hosted router model
    pub fn router_default() -> Self {
        Self {
            base_url: "https://api.groq.com/openai/v1".to_string(),
            model: "openai/gpt-oss-20b".to_string(),
            api_key: None,
            temperature: 0.0,
            max_tokens: None,
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o".to_string(),
            api_key: None,
            temperature: 0.0,
            max_tokens: None,
        }
    }
}

impl Default for KnowledgeBaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("kb.json"),
        }
    }
}

impl Default for FuzzyConfig {
    fn default() -> Self {
        Self {
            threshold: 0.6,
            max_candidates: 1000,
        }
    }
}

impl DatabaseConfig {
    /// libpq key/value connection string
    pub fn connection_string(&self) -> String {
        let mut parts = vec![
            format!("host={}", quote_value(&self.host)),
            format!("port={}", self.port),
            format!("user={}", quote_value(&self.user)),
            format!("dbname={}", quote_value(&self.dbname)),
            format!("connect_timeout={}", self.connect_timeout),
            format!("sslmode={}", self.sslmode.connection_param()),
        ];
        if !self.password.is_empty() {
            parts.push(format!("password={}", quote_value(&self.password)));
        }
        parts.join(" ")
    }
}

fn quote_value(value: &str) -> String {
    format!("'{}'", value.replace('\\', "\\\\").replace('\'', "\\'"))
}

impl AssistantConfig {
    /// File (if given) then process environment
    pub fn load(path: Option<&Path>) -> AssistantResult<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> AssistantResult<Self> {
        let display = path.display().to_string();
        let content = std::fs::read_to_string(path)
            .map_err(|e| AssistantError::io_with_path(format!("Failed to read config: {}", e), &display))?;
        serde_json::from_str(&content)
            .map_err(|e| AssistantError::config(format!("Failed to parse config {}: {}", display, e)))
    }

    /// Override settings from `lookup` (normally the process environment)
    pub fn apply_env<F>(&mut self, lookup: F) -> AssistantResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(key) = lookup("GROQ_API_KEY") {
            self.router_llm.api_key = Some(key);
        }
        if let Some(model) = lookup("ROUTER_MODEL") {
            self.router_llm.model = model;
        }
        if let Some(url) = lookup("ROUTER_BASE_URL") {
            self.router_llm.base_url = url;
        }
        if let Some(key) = lookup("OPENAI_API_KEY") {
            self.pipeline_llm.api_key = Some(key);
        }
        if let Some(model) = lookup("PIPELINE_MODEL") {
            self.pipeline_llm.model = model;
        }
        if let Some(url) = lookup("PIPELINE_BASE_URL") {
            self.pipeline_llm.base_url = url;
        }
        if let Some(path) = lookup("KB_PATH") {
            self.knowledge_base.path = PathBuf::from(path);
        }
        if let Some(port) = lookup("PORT") {
            self.server.port = parse_number("PORT", &port)?;
        }

        let sslmode = lookup("DB_SSLMODE").map(|mode| mode.parse::<SslMode>()).transpose()?;
        if let Some(host) = lookup("DB_HOST") {
            let port = match lookup("DB_PORT") {
                Some(port) => parse_number("DB_PORT", &port)?,
                None => self.database.as_ref().map_or_else(default_db_port, |db| db.port),
            };
            let user = lookup("DB_USER")
                .or_else(|| self.database.as_ref().map(|db| db.user.clone()))
                .ok_or_else(|| AssistantError::config_key("DB_HOST is set but DB_USER is missing", "DB_USER"))?;
            let dbname = lookup("DBBASE")
                .or_else(|| self.database.as_ref().map(|db| db.dbname.clone()))
                .ok_or_else(|| AssistantError::config_key("DB_HOST is set but DBBASE is missing", "DBBASE"))?;
            let password = lookup("DB_PASSWORD")
                .or_else(|| self.database.as_ref().map(|db| db.password.clone()))
                .unwrap_or_default();
            let connect_timeout = self
                .database
                .as_ref()
                .map_or_else(default_connect_timeout, |db| db.connect_timeout);
            let sslmode = sslmode
                .or_else(|| self.database.as_ref().map(|db| db.sslmode))
                .unwrap_or_default();
            self.database = Some(DatabaseConfig {
                host,
                port,
                user,
                password,
                dbname,
                connect_timeout,
                sslmode,
            });
        } else if let Some(db) = self.database.as_mut() {
            if let Some(password) = lookup("DB_PASSWORD") {
                db.password = password;
            }
            if let Some(sslmode) = sslmode {
                db.sslmode = sslmode;
            }
        }
        Ok(())
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: default_db_port(),
            user: "postgres".to_string(),
            password: String::new(),
            dbname: "postgres".to_string(),
            connect_timeout: default_connect_timeout(),
            sslmode: SslMode::default(),
        }
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> AssistantResult<T> {
    value
        .trim()
        .parse()
        .map_err(|_| AssistantError::config_key(format!("{} is not a valid number: {:?}", key, value), key))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = AssistantConfig::default();
        assert_eq!(config.server.port, 8080);
        assert!(config.database.is_none());
        assert_eq!(config.pipeline_llm.model, "gpt-4o");
        assert_eq!(config.router_llm.base_url, "https://api.groq.com/openai/v1");
        assert_eq!(config.fuzzy.threshold, 0.6);
    }

    #[test]
    fn test_env_overrides() {
        let mut config = AssistantConfig::default();
        config
            .apply_env(env(&[
                ("GROQ_API_KEY", "gsk"),
                ("OPENAI_API_KEY", "sk"),
                ("DB_HOST", "warehouse.internal"),
                ("DB_USER", "analyst"),
                ("DB_PASSWORD", "p'w"),
                ("DBBASE", "finance"),
                ("PORT", "9000"),
            ]))
            .unwrap();

        assert_eq!(config.router_llm.api_key.as_deref(), Some("gsk"));
        assert_eq!(config.router_llm.model, "openai/gpt-oss-20b");
        assert_eq!(config.pipeline_llm.api_key.as_deref(), Some("sk"));
        assert_eq!(config.server.port, 9000);

        let db = config.database.unwrap();
        assert_eq!(db.port, 5432);
        assert_eq!(
            db.connection_string(),
            "host='warehouse.internal' port=5432 user='analyst' dbname='finance' connect_timeout=10 sslmode=require password='p\\'w'"
        );
    }

    #[test]
    fn test_bad_port_is_config_error() {
        let mut config = AssistantConfig::default();
        let err = config.apply_env(env(&[("PORT", "eighty")])).unwrap_err();
        assert!(matches!(err, AssistantError::Config { key: Some(ref k), .. } if k == "PORT"));
    }

    #[test]
    fn test_db_host_without_user_is_rejected() {
        let mut config = AssistantConfig::default();
        assert!(config.apply_env(env(&[("DB_HOST", "h"), ("DBBASE", "d")])).is_err());
    }

    #[test]
    fn test_from_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("assistant.json");
        std::fs::write(
            &path,
            r#"{
                "database": {"host": "db", "user": "u", "dbname": "finance"},
                "fuzzy": {"threshold": 0.75},
                "knowledge_base": {"path": "/srv/kb.json"}
            }"#,
        )
        .unwrap();

        let config = AssistantConfig::from_file(&path).unwrap();
        let db = config.database.unwrap();
        assert_eq!(db.port, 5432);
        assert_eq!(db.sslmode, SslMode::Require);
        assert_eq!(config.fuzzy.threshold, 0.75);
        assert_eq!(config.fuzzy.max_candidates, 1000);
        assert_eq!(config.knowledge_base.path, PathBuf::from("/srv/kb.json"));
        assert_eq!(config.server.port, 8080);
    }

    #[test]
    fn test_sslmode() {
        let mut config = AssistantConfig::default();
        config
            .apply_env(env(&[
                ("DB_HOST", "db"),
                ("DB_USER", "u"),
                ("DBBASE", "finance"),
                ("DB_SSLMODE", "verify-full"),
            ]))
            .unwrap();
        let db = config.database.as_ref().unwrap();
        assert_eq!(db.sslmode, SslMode::VerifyFull);
        assert!(db.sslmode.verifies_certificates());
        assert!(db.connection_string().contains("sslmode=require"));

        config.apply_env(env(&[("DB_SSLMODE", "disable")])).unwrap();
        let db = config.database.unwrap();
        assert_eq!(db.sslmode, SslMode::Disable);
        assert!(db.connection_string().contains("sslmode=disable"));

        let parsed: DatabaseConfig =
            serde_json::from_str(r#"{"host": "db", "user": "u", "dbname": "d", "sslmode": "prefer"}"#).unwrap();
        assert_eq!(parsed.sslmode, SslMode::Prefer);

        let err = AssistantConfig::default()
            .apply_env(env(&[("DB_SSLMODE", "allow")]))
            .unwrap_err();
        assert!(matches!(err, AssistantError::Config { key: Some(ref k), .. } if k == "DB_SSLMODE"));
    }
}
