use std::path::PathBuf;
use thiserror::Error;

use crate::services::ServiceError;
use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("configuration file not found in '{0}'")]
    NotFound(PathBuf),
    #[error("unknown storage backend '{0}'")]
    UnknownStorage(String),
    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum BackendError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("unable to configure CORS: {0}")]
    Cors(#[from] rocket_cors::Error),

    #[error(transparent)]
    Service(#[from] ServiceError),
}
