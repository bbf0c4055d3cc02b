use reqwest::Client;
use rocket::async_trait;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::{check_response, ServiceError};
use crate::config::PaymentConfig;
use crate::resp::problem::{problems, Problem};

fn default_currency() -> String {
    "usd".to_string()
}

/// A one-off donation, amount in the currency's minor unit.
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Donation {
    pub amount: u64,
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(default)]
    pub email: Option<String>,
}

impl Donation {
    pub fn validate(&self) -> Result<(), Problem> {
        let mut invalid = vec![];
        if self.amount == 0 {
            invalid.push("amount");
        }
        if self.currency.len() != 3 || !self.currency.chars().all(|c| c.is_ascii_alphabetic()) {
            invalid.push("currency");
        }
        if let Some(email) = &self.email {
            if !email.contains('@') {
                invalid.push("email");
            }
        }

        if invalid.is_empty() {
            Ok(())
        } else {
            Err(problems::invalid_fields(&invalid))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct CheckoutSession {
    pub id: String,
    pub url: String,
}

/// Hosted checkout provider.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_checkout(&self, donation: &Donation) -> Result<CheckoutSession, ServiceError>;
}

pub struct HttpPaymentGateway {
    client: Client,
    api_url: String,
    secret_key: String,
    success_url: String,
    cancel_url: String,
}

impl HttpPaymentGateway {
    pub fn new(client: Client, config: &PaymentConfig, secret_key: &str) -> HttpPaymentGateway {
        HttpPaymentGateway {
            client,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            secret_key: secret_key.to_string(),
            success_url: config.success_url.clone(),
            cancel_url: config.cancel_url.clone(),
        }
    }

    fn checkout_form(&self, donation: &Donation) -> Vec<(&'static str, String)> {
        let mut form = vec![
            ("mode", "payment".to_string()),
            ("success_url", self.success_url.clone()),
            ("cancel_url", self.cancel_url.clone()),
            ("submit_type", "donate".to_string()),
            ("line_items[0][quantity]", "1".to_string()),
            (
                "line_items[0][price_data][currency]",
                donation.currency.to_ascii_lowercase(),
            ),
            (
                "line_items[0][price_data][unit_amount]",
                donation.amount.to_string(),
            ),
            (
                "line_items[0][price_data][product_data][name]",
                "Donation".to_string(),
            ),
        ];
        if let Some(email) = &donation.email {
            form.push(("customer_email", email.clone()));
        }
        form
    }
}

#[async_trait]
impl PaymentGateway for HttpPaymentGateway {
    #[tracing::instrument(skip(self))]
    async fn create_checkout(&self, donation: &Donation) -> Result<CheckoutSession, ServiceError> {
        let response = self
            .client
            .post(format!("{}/checkout/sessions", self.api_url))
            .bearer_auth(&self.secret_key)
            .form(&self.checkout_form(donation))
            .send()
            .await?;

        let session: CheckoutSession = check_response("payment", response).await?.json().await?;
        tracing::info!("Created checkout session {}", session.id);
        Ok(session)
    }
}
