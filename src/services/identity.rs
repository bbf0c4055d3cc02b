use reqwest::{Client, StatusCode};
use rocket::async_trait;

use super::{check_response, ServiceError};

/// The hosted identity provider's user directory.
#[async_trait]
pub trait IdentityDirectory: Send + Sync {
    /// Removes the identity record. An identity that is already gone counts as deleted.
    async fn delete_identity(&self, identity_id: &str) -> Result<(), ServiceError>;
}

pub struct HttpIdentityDirectory {
    client: Client,
    api_url: String,
    secret: String,
}

impl HttpIdentityDirectory {
    pub fn new(client: Client, api_url: &str, secret: &str) -> HttpIdentityDirectory {
        HttpIdentityDirectory {
            client,
            api_url: api_url.trim_end_matches('/').to_string(),
            secret: secret.to_string(),
        }
    }

    fn user_url(&self, identity_id: &str) -> String {
        format!("{}/users/{}", self.api_url, identity_id)
    }
}

#[async_trait]
impl IdentityDirectory for HttpIdentityDirectory {
    #[tracing::instrument(skip(self))]
    async fn delete_identity(&self, identity_id: &str) -> Result<(), ServiceError> {
        let response = self
            .client
            .delete(self.user_url(identity_id))
            .bearer_auth(&self.secret)
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            tracing::warn!("Identity {} was already removed upstream.", identity_id);
            return Ok(());
        }

        check_response("identity", response).await?;
        tracing::info!("Deleted identity {}", identity_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_url_joins_cleanly() {
        let directory =
            HttpIdentityDirectory::new(Client::new(), "https://id.example.com/v1/", "sk");
        assert_eq!(
            directory.user_url("user_2abc"),
            "https://id.example.com/v1/users/user_2abc"
        );
    }
}
