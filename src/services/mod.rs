//! Third-party collaborators the API calls out to. Each is optional; routes
//! that need a missing one answer 503.

use std::sync::Arc;

use rocket::http::Status;
use thiserror::Error;

use crate::config::Config;
use crate::resp::problem::{problems, Problem};
use crate::util::non_blank;

pub mod identity;
pub mod payment;

pub use identity::{HttpIdentityDirectory, IdentityDirectory};
pub use payment::{CheckoutSession, Donation, HttpPaymentGateway, PaymentGateway};

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{0} provider is not configured")]
    NotConfigured(&'static str),
    #[error("{service} provider rejected the request ({status}): {detail}")]
    Rejected {
        service: &'static str,
        status: u16,
        detail: String,
    },
    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

impl From<ServiceError> for Problem {
    fn from(e: ServiceError) -> Self {
        match e {
            ServiceError::NotConfigured(service) => problems::not_configured(service),
            other => {
                tracing::error!("External service failed: {}", other);
                Problem::new_untyped(Status::ServiceUnavailable, "Upstream service failed.")
                    .detail("A required external service did not complete the request.")
                    .to_owned()
            }
        }
    }
}

/// External services handed to routes as managed state.
#[derive(Clone, Default)]
pub struct Services {
    pub identity: Option<Arc<dyn IdentityDirectory>>,
    pub payments: Option<Arc<dyn PaymentGateway>>,
}

impl Services {
    /// Builds every client whose credentials are present in `config`.
    pub fn from_config(config: &Config) -> Result<Services, ServiceError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("lingua-backend/", env!("CARGO_PKG_VERSION")))
            .timeout(std::time::Duration::from_secs(15))
            .build()?;

        let identity = match non_blank(config.identity.api_secret.as_deref()) {
            Some(secret) => {
                tracing::info!("Identity directory: {}", config.identity.api_url);
                Some(Arc::new(HttpIdentityDirectory::new(
                    http.clone(),
                    &config.identity.api_url,
                    secret,
                )) as Arc<dyn IdentityDirectory>)
            }
            None => {
                tracing::warn!("Identity directory secret not set. Account deletion is disabled.");
                None
            }
        };

        let payments = match non_blank(config.payments.secret_key.as_deref()) {
            Some(key) => {
                tracing::info!("Payment gateway: {}", config.payments.api_url);
                Some(Arc::new(HttpPaymentGateway::new(http, &config.payments, key))
                    as Arc<dyn PaymentGateway>)
            }
            None => {
                tracing::warn!("Payment secret key not set. Donations are disabled.");
                None
            }
        };

        Ok(Services { identity, payments })
    }

    pub fn identity(&self) -> Result<&Arc<dyn IdentityDirectory>, ServiceError> {
        self.identity
            .as_ref()
            .ok_or(ServiceError::NotConfigured("identity"))
    }

    pub fn payments(&self) -> Result<&Arc<dyn PaymentGateway>, ServiceError> {
        self.payments
            .as_ref()
            .ok_or(ServiceError::NotConfigured("payment"))
    }
}

/// Turns a non-success response into [`ServiceError::Rejected`].
pub(crate) async fn check_response(
    service: &'static str,
    response: reqwest::Response,
) -> Result<reqwest::Response, ServiceError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let detail = response.text().await.unwrap_or_default();
    Err(ServiceError::Rejected {
        service,
        status: status.as_u16(),
        detail,
    })
}
