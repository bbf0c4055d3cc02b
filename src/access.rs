//! Maps a verified identity to an application role and decides whether it may
//! act on a resource.

use rocket::http::Status;
use rocket::outcome::Outcome::{Error, Forward, Success};
use rocket::request::{self, FromRequest, Request};
use uuid::Uuid;

use crate::data::user::db::{problem as user_problem, UserLookup};
use crate::data::user::User;
use crate::resp::identity::Identity;
use crate::resp::problem::{problems, Problem};
use crate::role::Role;
use crate::store::{EntityStore, SharedStore, StoreError, UserStore};

/// The local account behind the current request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Requester {
    pub user_id: Uuid,
    pub role: Role,
}

/// `None` means the identity exists upstream but has no account here.
pub async fn resolve_role(
    store: &dyn EntityStore,
    identity_id: &str,
) -> Result<Option<Requester>, StoreError> {
    let user = store
        .find_user(&UserLookup::IdentityId(identity_id.to_string()))
        .await?;

    Ok(user.map(|it| Requester {
        user_id: it.id,
        role: it.role,
    }))
}

pub fn require_privileged(role: Role) -> Result<(), Problem> {
    if role.is_privileged() {
        Ok(())
    } else {
        Err(problems::forbidden(format!(
            "Requires instructor or admin, not {}.",
            role
        )))
    }
}

pub fn require_admin(role: Role) -> Result<(), Problem> {
    if role == Role::Admin {
        Ok(())
    } else {
        Err(problems::forbidden("Requires admin."))
    }
}

pub fn require_self_or_privileged(
    role: Role,
    target: Uuid,
    requester: Uuid,
) -> Result<(), Problem> {
    if role.is_privileged() || target == requester {
        Ok(())
    } else {
        Err(problems::forbidden("Only the account owner or staff may do this."))
    }
}

/// Loads the target user and checks the requester may access it. A missing
/// target is reported before a denied one.
pub async fn authorize_user(
    store: &dyn EntityStore,
    requester: &Requester,
    lookup: &UserLookup,
) -> Result<User, Problem> {
    let target = match store.find_user(lookup).await? {
        Some(it) => it,
        None => {
            return Err(match lookup {
                UserLookup::Id(id) => user_problem::not_found(*id),
                _ => problems::not_found("User", lookup),
            })
        }
    };

    require_self_or_privileged(requester.role, target.id, requester.user_id)?;
    Ok(target)
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for Requester {
    type Error = Problem;

    async fn from_request(req: &'r Request<'_>) -> request::Outcome<Self, Self::Error> {
        let identity = match req.guard::<Identity>().await {
            Success(it) => it,
            Error(e) => return Error(e),
            Forward(status) => return Forward(status),
        };

        let store = match req.rocket().state::<SharedStore>() {
            Some(it) => it,
            None => {
                tracing::error!("No entity store is managed");
                return Error((Status::InternalServerError, problems::internal()));
            }
        };

        match resolve_role(store.as_ref(), &identity.subject).await {
            Ok(Some(requester)) => {
                tracing::trace!(
                    "resolved {} to user {} ({})",
                    identity.subject,
                    requester.user_id,
                    requester.role
                );
                Success(requester)
            }
            Ok(None) => Error((Status::Unauthorized, user_problem::not_provisioned())),
            Err(e) => {
                let problem = Problem::from(e);
                Error((problem.status, problem))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[test]
    fn privileged_roles() {
        assert!(require_privileged(Role::Admin).is_ok());
        assert!(require_privileged(Role::Instructor).is_ok());
        assert_eq!(
            require_privileged(Role::Student).unwrap_err().status,
            Status::Forbidden
        );
        assert!(require_admin(Role::Instructor).is_err());
    }

    #[test]
    fn self_or_privileged() {
        let me = Uuid::new_v4();
        let other = Uuid::new_v4();

        assert!(require_self_or_privileged(Role::Student, me, me).is_ok());
        assert!(require_self_or_privileged(Role::Instructor, other, me).is_ok());
        assert_eq!(
            require_self_or_privileged(Role::Student, other, me)
                .unwrap_err()
                .status,
            Status::Forbidden
        );
    }

    #[tokio::test]
    async fn unknown_identity_is_not_provisioned() {
        let store = MemoryStore::new();
        let admin = User::new("idp_admin", "Ada", "Admin", "ada@example.com").with_role(Role::Admin);
        store.insert_user(&admin).await.unwrap();

        let resolved = resolve_role(&store, "idp_admin").await.unwrap().unwrap();
        assert_eq!(resolved.user_id, admin.id);
        assert_eq!(resolved.role, Role::Admin);

        assert!(resolve_role(&store, "idp_nobody").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn missing_target_beats_forbidden() {
        let store = MemoryStore::new();
        let student = User::new("idp_s", "Sam", "Student", "sam@example.com");
        let peer = User::new("idp_p", "Pat", "Peer", "pat@example.com");
        store.insert_user(&student).await.unwrap();
        store.insert_user(&peer).await.unwrap();
        let requester = Requester {
            user_id: student.id,
            role: Role::Student,
        };

        let missing = authorize_user(&store, &requester, &UserLookup::Id(Uuid::new_v4()))
            .await
            .unwrap_err();
        assert_eq!(missing.status, Status::NotFound);

        let denied = authorize_user(&store, &requester, &UserLookup::Id(peer.id))
            .await
            .unwrap_err();
        assert_eq!(denied.status, Status::Forbidden);

        let own = authorize_user(
            &store,
            &requester,
            &UserLookup::Email("SAM@example.com".into()),
        )
        .await
        .unwrap();
        assert_eq!(own.id, student.id);
    }
}
