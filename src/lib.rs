#[macro_use]
extern crate rocket;
#[macro_use]
extern crate serde;
#[macro_use]
extern crate lazy_static;

use std::sync::Arc;

use rocket::http::Method;
use rocket::{Build, Rocket};
use rocket_cors::{AllowedHeaders, AllowedOrigins};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use crate::config::{Config, StorageBackend};
use crate::error::{BackendError, ConfigurationError};
use crate::resp::identity::IdentityVerifier;
use crate::route::mount_api;
use crate::services::Services;
use crate::store::{MemoryStore, MongoStore, SharedStore};

pub mod access;
pub mod config;
pub mod data;
pub mod error;
pub mod membership;
pub mod middleware;
pub mod resp;
pub mod role;
pub mod roster;
pub mod route;
pub mod services;
pub mod store;
pub mod util;

fn load_config() -> Result<Config, ConfigurationError> {
    match Config::load() {
        Ok(c) => {
            tracing::info!("Configuration loaded.");
            Ok(c)
        }
        Err(ConfigurationError::NotFound(dir)) => {
            tracing::warn!(
                "No configuration in '{}', generating one from the environment.",
                dir.display()
            );
            let c = Config::default();
            if let Err(e) = c.save() {
                tracing::warn!("Unable to save generated configuration: {}", e);
            }
            Ok(c)
        }
        Err(other) => {
            tracing::error!("Configuration error: {}", other);
            Err(other)
        }
    }
}

/// Reads the environment and configuration, connects the store and
/// external services, and assembles the server.
pub async fn create(log_level: Option<Level>) -> Result<Rocket<Build>, BackendError> {
    if let Some(l) = log_level {
        let subscriber = FmtSubscriber::builder().with_max_level(l).finish();

        if let Err(err) = tracing::subscriber::set_global_default(subscriber) {
            eprintln!("Unable to set global logger: {}", err);
        };
        if let Err(err) = tracing_log::LogTracer::init() {
            eprintln!("Unable to forward log records: {}", err);
        }
    }

    tracing::info!("Reading .env file...");
    if dotenv::dotenv().is_err() {
        tracing::warn!("Unable to load .env file.");
    }

    tracing::info!("Loading configuration...");
    let c = load_config()?;

    let store: SharedStore = match c.storage_backend()? {
        StorageBackend::MongoDb => {
            Arc::new(MongoStore::connect(&c.mongodb_uri, &c.mongodb_db).await?)
        }
        StorageBackend::Memory => {
            tracing::warn!("Using the in-memory store. Nothing will be persisted.");
            Arc::new(MemoryStore::new())
        }
    };

    let services = Services::from_config(&c)?;

    build(c, store, services)
}

fn cors_options(allowed_origins: &[String]) -> rocket_cors::CorsOptions {
    let allowed_origins = if allowed_origins.is_empty() {
        AllowedOrigins::All
    } else {
        AllowedOrigins::some_exact(allowed_origins)
    };

    rocket_cors::CorsOptions {
        allowed_origins,
        allowed_methods: vec![Method::Get, Method::Put, Method::Post, Method::Delete]
            .into_iter()
            .map(From::from)
            .collect(),
        allowed_headers: AllowedHeaders::All,
        allow_credentials: true,
        ..Default::default()
    }
}

/// Assembles the server around an already connected store.
pub fn build(
    config: Config,
    store: SharedStore,
    services: Services,
) -> Result<Rocket<Build>, BackendError> {
    let verifier = IdentityVerifier::new(config.identity.jwt_secret.as_deref());
    if !verifier.is_configured() {
        tracing::warn!("Identity token secret not set. Authenticated routes answer 503.");
    }

    tracing::info!("Setting up CORS...");
    let cors = cors_options(&config.allowed_origins).to_cors()?;

    let r = rocket::build()
        .manage(verifier)
        .manage(store)
        .manage(services)
        .manage(config)
        .attach(cors);

    Ok(mount_api(r))
}
