//! Shared harness for the HTTP tests: an in-memory backed Rocket instance,
//! identity tokens for arbitrary subjects and recording fakes for the
//! external providers.

use std::sync::Arc;

use rocket::async_trait;
use rocket::http::Header;
use rocket::local::asynchronous::Client;
use tokio::sync::Mutex;

use crate::config::Config;
use crate::data::user::User;
use crate::resp::identity::IdentityVerifier;
use crate::role::Role;
use crate::services::{
    CheckoutSession, Donation, IdentityDirectory, PaymentGateway, ServiceError, Services,
};
use crate::store::{MemoryStore, SharedStore, UserStore};

const TEST_SECRET: &str = "lingua-test-secret";

pub struct TestApp {
    pub client: Client,
    pub store: Arc<MemoryStore>,
    verifier: IdentityVerifier,
}

impl TestApp {
    pub async fn new(services: Services) -> TestApp {
        TestApp::with_secret(Some(TEST_SECRET), services).await
    }

    pub async fn without_identity() -> TestApp {
        TestApp::with_secret(None, Services::default()).await
    }

    async fn with_secret(secret: Option<&str>, services: Services) -> TestApp {
        let mut config = Config::default();
        config.identity.jwt_secret = secret.map(String::from);
        config.allowed_origins = vec![];

        let store = Arc::new(MemoryStore::new());
        let shared: SharedStore = store.clone();
        let rocket = crate::build(config, shared, services).expect("valid rocket");

        TestApp {
            client: Client::tracked(rocket).await.expect("valid rocket"),
            store,
            verifier: IdentityVerifier::new(Some(TEST_SECRET)),
        }
    }

    pub fn bearer(&self, subject: &str) -> Header<'static> {
        Header::new(
            "Authorization",
            format!("Bearer {}", self.verifier.mint(subject)),
        )
    }

    /// Provisions an account for `identity` directly in the store.
    pub async fn user(&self, identity: &str, first_name: &str, email: &str, role: Role) -> User {
        let user = User::new(identity, first_name, "Tester", email).with_role(role);
        self.store.insert_user(&user).await.expect("user inserts");
        user
    }
}

#[derive(Default)]
pub struct FakeDirectory {
    deleted: Mutex<Vec<String>>,
}

impl FakeDirectory {
    pub async fn deleted(&self) -> Vec<String> {
        self.deleted.lock().await.clone()
    }
}

#[async_trait]
impl IdentityDirectory for FakeDirectory {
    async fn delete_identity(&self, identity_id: &str) -> Result<(), ServiceError> {
        self.deleted.lock().await.push(identity_id.to_string());
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeGateway {
    amounts: Mutex<Vec<u64>>,
}

impl FakeGateway {
    pub async fn amounts(&self) -> Vec<u64> {
        self.amounts.lock().await.clone()
    }
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    async fn create_checkout(&self, donation: &Donation) -> Result<CheckoutSession, ServiceError> {
        let mut amounts = self.amounts.lock().await;
        amounts.push(donation.amount);
        Ok(CheckoutSession {
            id: format!("cs_test_{}", amounts.len()),
            url: format!("https://pay.example.com/c/cs_test_{}", amounts.len()),
        })
    }
}

pub fn fake_services() -> (Services, Arc<FakeDirectory>, Arc<FakeGateway>) {
    let directory = Arc::new(FakeDirectory::default());
    let gateway = Arc::new(FakeGateway::default());
    let services = Services {
        identity: Some(directory.clone()),
        payments: Some(gateway.clone()),
    };
    (services, directory, gateway)
}
