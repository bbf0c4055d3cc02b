use crate::error::ConfigurationError;
use crate::util;
use std::env;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

fn default_mongodb_uri() -> String {
    env::var("MONGODB_URI").unwrap_or("mongodb://localhost:27017".to_string())
}

fn default_mongodb_db() -> String {
    env::var("MONGODB_DB_NAME").unwrap_or("lingua".to_string())
}

fn default_storage() -> String {
    env::var("STORAGE_BACKEND").unwrap_or("mongodb".to_string())
}

fn default_public_content() -> PathBuf {
    PathBuf::from(env::var("PUBLIC_CONTENT_PATH").unwrap_or("./public".to_string()))
}

fn default_allowed_origins() -> Vec<String> {
    env::var("ALLOWED_ORIGINS")
        .map(|it| {
            it.split(',')
                .map(str::trim)
                .filter(|it| !it.is_empty())
                .map(String::from)
                .collect()
        })
        .unwrap_or_default()
}

fn default_identity() -> IdentityConfig {
    IdentityConfig {
        jwt_secret: env::var("IDENTITY_JWT_SECRET").ok(),
        api_url: default_identity_api_url(),
        api_secret: env::var("IDENTITY_API_SECRET").ok(),
    }
}

fn default_identity_api_url() -> String {
    env::var("IDENTITY_API_URL").unwrap_or("https://api.clerk.com/v1".to_string())
}

fn default_payments() -> PaymentConfig {
    PaymentConfig {
        secret_key: env::var("PAYMENT_SECRET_KEY").ok(),
        api_url: default_payment_api_url(),
        success_url: default_success_url(),
        cancel_url: default_cancel_url(),
    }
}

fn default_payment_api_url() -> String {
    env::var("PAYMENT_API_URL").unwrap_or("https://api.stripe.com/v1".to_string())
}

fn default_success_url() -> String {
    env::var("PAYMENT_SUCCESS_URL").unwrap_or("http://localhost:8000/".to_string())
}

fn default_cancel_url() -> String {
    env::var("PAYMENT_CANCEL_URL").unwrap_or("http://localhost:8000/".to_string())
}

/// Which [`EntityStore`](crate::store::EntityStore) backend the server runs on.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum StorageBackend {
    MongoDb,
    Memory,
}

impl FromStr for StorageBackend {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mongodb" | "mongo" => Ok(StorageBackend::MongoDb),
            "memory" => Ok(StorageBackend::Memory),
            other => Err(ConfigurationError::UnknownStorage(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityConfig {
    /// Secret used to verify identity tokens. Auth routes answer 503 without it.
    #[serde(default)]
    pub jwt_secret: Option<String>,
    #[serde(default = "default_identity_api_url")]
    pub api_url: String,
    /// Backend API secret, needed to delete identity records.
    #[serde(default)]
    pub api_secret: Option<String>,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        default_identity()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentConfig {
    #[serde(default)]
    pub secret_key: Option<String>,
    #[serde(default = "default_payment_api_url")]
    pub api_url: String,
    #[serde(default = "default_success_url")]
    pub success_url: String,
    #[serde(default = "default_cancel_url")]
    pub cancel_url: String,
}

impl Default for PaymentConfig {
    fn default() -> Self {
        default_payments()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(skip)]
    file_path: PathBuf,

    #[serde(default = "default_mongodb_uri")]
    pub mongodb_uri: String,
    #[serde(default = "default_mongodb_db")]
    pub mongodb_db: String,
    #[serde(default = "default_storage")]
    pub storage: String,

    #[serde(default = "default_public_content")]
    pub public_content: PathBuf,

    /// Empty means every origin is allowed.
    #[serde(default = "default_allowed_origins")]
    pub allowed_origins: Vec<String>,

    #[serde(default = "default_identity")]
    pub identity: IdentityConfig,
    #[serde(default = "default_payments")]
    pub payments: PaymentConfig,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            file_path: config_dir().join("settings.yml"),
            mongodb_uri: default_mongodb_uri(),
            mongodb_db: default_mongodb_db(),
            storage: default_storage(),
            public_content: default_public_content(),
            allowed_origins: default_allowed_origins(),
            identity: default_identity(),
            payments: default_payments(),
        }
    }
}

#[inline]
fn config_dir() -> PathBuf {
    PathBuf::from(env::var("CONFIG_DIR").unwrap_or("./config".to_string()))
}

impl Config {
    pub fn load() -> Result<Config, ConfigurationError> {
        let config_file = util::find_first_subpath(
            config_dir(),
            &["settings.yml", "settings.yaml"],
            Path::exists,
        )
        .ok_or_else(|| ConfigurationError::NotFound(config_dir()))?;

        Self::load_from(config_file)
    }

    pub fn load_from(path: impl AsRef<Path>) -> Result<Config, ConfigurationError> {
        let file = File::open(path.as_ref())?;
        let mut config: Config = serde_yaml::from_reader(BufReader::new(file))?;
        config.file_path = path.as_ref().to_path_buf();

        Ok(config)
    }

    pub fn save(&self) -> Result<(), ConfigurationError> {
        if let Some(parent) = self.file_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = File::create(&self.file_path)?;
        let mut out = BufWriter::new(file);
        serde_yaml::to_writer(&mut out, self)?;
        out.flush()?;
        Ok(())
    }

    pub fn storage_backend(&self) -> Result<StorageBackend, ConfigurationError> {
        self.storage.parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_backend_parses() {
        assert_eq!(
            "MongoDB".parse::<StorageBackend>().unwrap(),
            StorageBackend::MongoDb
        );
        assert_eq!(
            " memory ".parse::<StorageBackend>().unwrap(),
            StorageBackend::Memory
        );
        assert!(matches!(
            "sqlite".parse::<StorageBackend>(),
            Err(ConfigurationError::UnknownStorage(_))
        ));
    }

    #[test]
    fn partial_yaml_fills_defaults() {
        let config: Config = serde_yaml::from_str(
            "mongodb_db: school\nstorage: memory\nidentity:\n  jwt_secret: s3cret\n",
        )
        .unwrap();

        assert_eq!(config.mongodb_db, "school");
        assert_eq!(config.storage_backend().unwrap(), StorageBackend::Memory);
        assert_eq!(config.identity.jwt_secret.as_deref(), Some("s3cret"));
        assert!(!config.identity.api_url.is_empty());
        assert!(!config.payments.api_url.is_empty());
    }

    #[test]
    fn saved_config_loads_back() {
        let dir = env::temp_dir().join(format!("lingua-config-{}", uuid::Uuid::new_v4()));
        let mut config = Config::default();
        config.file_path = dir.join("settings.yml");
        config.mongodb_db = "roundtrip".to_string();
        config.save().unwrap();

        let loaded = Config::load_from(dir.join("settings.yml")).unwrap();
        assert_eq!(loaded.mongodb_db, "roundtrip");

        let _ = fs::remove_dir_all(dir);
    }
}
