//! Configuration management with YAML support

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::error::BootstrapError;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub mongodb: MongoConfig,

    #[serde(default = "default_database")]
    pub database: String,

    #[serde(default = "default_collection")]
    pub collection: String,

    #[serde(default)]
    pub app_user: AppUserConfig,

    #[serde(default)]
    pub on_existing: ExistingPolicy,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoConfig {
    #[serde(default = "default_uri")]
    pub uri: String,

    #[serde(default = "default_app_name")]
    pub app_name: String,
}

/// Application principal created for the chat service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppUserConfig {
    #[serde(default = "default_user_name")]
    pub name: String,

    #[serde(default = "default_auth_database")]
    pub auth_database: String,

    /// Environment variable holding the password
    #[serde(default = "default_password_env")]
    pub password_env: String,

    /// Literal password, takes precedence over `password_env`
    #[serde(default, skip_serializing)]
    pub password: Option<String>,
}

/// What to do when a resource is already present
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExistingPolicy {
    /// Abort on the first duplicate (single-run provisioning)
    #[default]
    Fail,
    /// Create only what is absent
    Skip,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    /// 'pretty' or 'json'
    #[serde(default = "default_log_format")]
    pub format: String,
}

// Default value functions
fn default_uri() -> String {
    "mongodb://localhost:27017".to_string()
}

fn default_app_name() -> String {
    "chat-bootstrap".to_string()
}

fn default_database() -> String {
    "n8n_chat_db".to_string()
}

fn default_collection() -> String {
    "n8n_chat_histories".to_string()
}

fn default_user_name() -> String {
    "n8n_chat_app".to_string()
}

fn default_auth_database() -> String {
    "admin".to_string()
}

fn default_password_env() -> String {
    "CHAT_APP_PASSWORD".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for MongoConfig {
    fn default() -> Self {
        Self {
            uri: default_uri(),
            app_name: default_app_name(),
        }
    }
}

impl Default for AppUserConfig {
    fn default() -> Self {
        Self {
            name: default_user_name(),
            auth_database: default_auth_database(),
            password_env: default_password_env(),
            password: None,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mongodb: MongoConfig::default(),
            database: default_database(),
            collection: default_collection(),
            app_user: AppUserConfig::default(),
            on_existing: ExistingPolicy::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from a YAML file
    /// Searches in order:
    /// 1. Provided path
    /// 2. ./chat-bootstrap.yaml (current directory)
    /// 3. ~/.config/chat-bootstrap/chat-bootstrap.yaml
    ///
    /// `MONGODB_URL` in the environment overrides `mongodb.uri`.
    pub fn load(path: &str) -> Result<Self> {
        let search_paths = vec![
            shellexpand::tilde(path).to_string(),
            "chat-bootstrap.yaml".to_string(),
            shellexpand::tilde("~/.config/chat-bootstrap/chat-bootstrap.yaml").to_string(),
        ];

        let mut config = Config::default();
        for search_path in &search_paths {
            if std::path::Path::new(search_path).exists() {
                let content = std::fs::read_to_string(search_path)?;
                config = serde_yaml::from_str(&content)?;
                break;
            }
        }

        config.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(uri) = lookup("MONGODB_URL").filter(|u| !u.is_empty()) {
            self.mongodb.uri = uri;
        }
    }

    /// Resolve the application password without ever logging it
    pub fn app_password(&self) -> Result<String, BootstrapError> {
        self.resolve_password(|key| std::env::var(key).ok())
    }

    fn resolve_password(
        &self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<String, BootstrapError> {
        if let Some(password) = self.app_user.password.as_ref().filter(|p| !p.is_empty()) {
            return Ok(password.clone());
        }
        lookup(&self.app_user.password_env)
            .filter(|p| !p.is_empty())
            .ok_or_else(|| {
                BootstrapError::Config(format!(
                    "no password for user '{}': set app_user.password or ${}",
                    self.app_user.name, self.app_user.password_env
                ))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.database, "n8n_chat_db");
        assert_eq!(config.collection, "n8n_chat_histories");
        assert_eq!(config.app_user.name, "n8n_chat_app");
        assert_eq!(config.app_user.auth_database, "admin");
        assert_eq!(config.on_existing, ExistingPolicy::Fail);
    }

    #[test]
    fn test_yaml_parsing() {
        let yaml = r#"
mongodb:
  uri: mongodb://db.internal:27017
database: chat_db
app_user:
  name: chat_app
  password_env: CHAT_PW
on_existing: skip
logging:
  format: json
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.mongodb.uri, "mongodb://db.internal:27017");
        assert_eq!(config.mongodb.app_name, "chat-bootstrap");
        assert_eq!(config.database, "chat_db");
        assert_eq!(config.collection, "n8n_chat_histories");
        assert_eq!(config.app_user.name, "chat_app");
        assert_eq!(config.app_user.auth_database, "admin");
        assert_eq!(config.on_existing, ExistingPolicy::Skip);
        assert_eq!(config.logging.format, "json");
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bootstrap.yaml");
        std::fs::write(&path, "collection: other_histories\n").unwrap();

        let config = Config::load(path.to_str().unwrap()).unwrap();
        assert_eq!(config.collection, "other_histories");
        assert_eq!(config.database, "n8n_chat_db");
    }

    #[test]
    fn test_mongodb_url_overrides_uri() {
        let yaml = "mongodb:\n  uri: mongodb://from-file:27017\n";
        let mut config: Config = serde_yaml::from_str(yaml).unwrap();
        config.apply_env_overrides(|key| match key {
            "MONGODB_URL" => Some("mongodb://from-env:27017".to_string()),
            _ => None,
        });
        assert_eq!(config.mongodb.uri, "mongodb://from-env:27017");

        let mut config = Config::default();
        config.apply_env_overrides(|_| None);
        assert_eq!(config.mongodb.uri, "mongodb://localhost:27017");

        config.apply_env_overrides(|_| Some(String::new()));
        assert_eq!(config.mongodb.uri, "mongodb://localhost:27017");
    }

    #[test]
    fn test_password_from_literal() {
        let mut config = Config::default();
        config.app_user.password = Some("literal".to_string());
        let password = config.resolve_password(|_| Some("from-env".to_string()));
        assert_eq!(password.unwrap(), "literal");
    }

    #[test]
    fn test_password_from_env() {
        let config = Config::default();
        let password = config.resolve_password(|key| {
            assert_eq!(key, "CHAT_APP_PASSWORD");
            Some("from-env".to_string())
        });
        assert_eq!(password.unwrap(), "from-env");
    }

    #[test]
    fn test_missing_password_is_config_error() {
        let config = Config::default();
        let err = config.resolve_password(|_| None).unwrap_err();
        assert!(matches!(err, BootstrapError::Config(_)));
        assert!(err.to_string().contains("CHAT_APP_PASSWORD"));

        let err = config.resolve_password(|_| Some(String::new())).unwrap_err();
        assert!(matches!(err, BootstrapError::Config(_)));
    }

    #[test]
    fn test_password_not_serialized() {
        let mut config = Config::default();
        config.app_user.password = Some("hunter2".to_string());
        let yaml = serde_yaml::to_string(&config).unwrap();
        assert!(!yaml.contains("hunter2"));
    }
}
