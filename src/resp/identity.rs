use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use rocket::http::Status;
use rocket::outcome::Outcome::{Error, Success};
use rocket::request::{self, FromRequest, Request};
use serde::{Deserialize, Serialize};

use crate::resp::problem::{problems, Problem};
use crate::util::non_blank;

/// Session cookie the identity provider's frontend SDK sets.
pub static SESSION_COOKIE_NAME: &str = "__session";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityClaims {
    /// Identity provider subject id.
    pub sub: String,
    pub exp: i64,
    #[serde(default)]
    pub iat: Option<i64>,
}

/// Verifies identity tokens issued by the hosted identity provider.
#[derive(Debug, Clone, Default)]
pub struct IdentityVerifier {
    secret: Option<String>,
}

impl IdentityVerifier {
    pub fn new(secret: Option<&str>) -> IdentityVerifier {
        IdentityVerifier {
            secret: non_blank(secret).map(String::from),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.secret.is_some()
    }

    pub fn verify(&self, token: &str) -> Result<IdentityClaims, Problem> {
        let secret = self
            .secret
            .as_ref()
            .ok_or_else(|| problems::not_configured("identity"))?;

        let claims = decode::<IdentityClaims>(
            token,
            &DecodingKey::from_secret(secret.as_bytes()),
            &Validation::new(Algorithm::HS256),
        )?
        .claims;

        if claims.sub.trim().is_empty() {
            return Err(problems::unauthorized("Identity token has no subject."));
        }
        Ok(claims)
    }

    #[cfg(test)]
    pub fn mint(&self, subject: &str) -> String {
        use jsonwebtoken::{encode, EncodingKey, Header};

        let now = chrono::Utc::now().timestamp();
        let claims = IdentityClaims {
            sub: subject.to_string(),
            exp: now + 3600,
            iat: Some(now),
        };
        let secret = self.secret.as_deref().unwrap_or_default();
        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .expect("test token encodes")
    }
}

fn bearer_token<'r>(req: &'r Request<'_>) -> Option<String> {
    if let Some(header) = req.headers().get_one("Authorization") {
        let (scheme, token) = header.split_once(' ')?;
        if scheme.eq_ignore_ascii_case("bearer") && !token.trim().is_empty() {
            return Some(token.trim().to_string());
        }
        return None;
    }

    req.cookies()
        .get(SESSION_COOKIE_NAME)
        .map(|it| it.value().to_string())
}

/// The authenticated caller's identity provider subject. Not necessarily
/// backed by a local account yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub subject: String,
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for Identity {
    type Error = Problem;

    async fn from_request(req: &'r Request<'_>) -> request::Outcome<Self, Self::Error> {
        let verifier = match req.rocket().state::<IdentityVerifier>() {
            Some(it) if it.is_configured() => it,
            _ => {
                tracing::warn!("Identity verification requested but not configured");
                return Error((
                    Status::ServiceUnavailable,
                    problems::not_configured("identity"),
                ));
            }
        };

        let token = match bearer_token(req) {
            Some(it) => it,
            None => {
                return Error((
                    Status::Unauthorized,
                    problems::unauthorized("No identity token."),
                ))
            }
        };

        match verifier.verify(&token) {
            Ok(claims) => {
                tracing::debug!("verified identity token for subject: {}", claims.sub);
                Success(Identity {
                    subject: claims.sub,
                })
            }
            Err(problem) => {
                tracing::debug!("rejected identity token: {}", problem);
                Error((problem.status, problem))
            }
        }
    }
}

pub mod doc {
    use utoipa::openapi::security::*;

    #[derive(Clone, Copy)]
    pub struct BearerAuth;

    impl From<BearerAuth> for SecurityScheme {
        fn from(_: BearerAuth) -> SecurityScheme {
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            )
        }
    }

    impl utoipa::Modify for BearerAuth {
        fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
            let components = openapi.components.get_or_insert_with(Default::default);
            components.add_security_scheme("identity", *self)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minted_token_verifies() {
        let verifier = IdentityVerifier::new(Some("test-secret"));
        let token = verifier.mint("user_2abc");

        let claims = verifier.verify(&token).unwrap();
        assert_eq!(claims.sub, "user_2abc");
    }

    #[test]
    fn wrong_secret_is_unauthorized() {
        let issuer = IdentityVerifier::new(Some("issuer-secret"));
        let verifier = IdentityVerifier::new(Some("other-secret"));

        let problem = verifier.verify(&issuer.mint("user_2abc")).unwrap_err();
        assert_eq!(problem.status, Status::Unauthorized);
    }

    #[test]
    fn expired_token_is_unauthorized() {
        use jsonwebtoken::{encode, EncodingKey, Header};

        let verifier = IdentityVerifier::new(Some("test-secret"));
        let claims = IdentityClaims {
            sub: "user_2abc".into(),
            exp: chrono::Utc::now().timestamp() - 3600,
            iat: None,
        };
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(b"test-secret"),
        )
        .unwrap();

        let problem = verifier.verify(&token).unwrap_err();
        assert_eq!(problem.status, Status::Unauthorized);
        assert_eq!(problem.detail.as_deref(), Some("Expired identity token."));
    }

    #[test]
    fn blank_secret_is_not_configured() {
        let verifier = IdentityVerifier::new(Some("   "));
        assert!(!verifier.is_configured());

        let problem = verifier.verify("anything").unwrap_err();
        assert_eq!(problem.status, Status::ServiceUnavailable);
    }
}
