//! Keeps `User::enrolled_classes` and `Class::roster` mirror images of each other.
//!
//! The store has no multi-document transactions, so every operation writes one
//! side and then the other. When the second write fails the first is left in
//! place, the gap is logged with both ids, and the caller gets
//! [`MembershipError::Inconsistent`]. Retrying the same operation repairs it.

use std::fmt::{Display, Formatter};
use std::future::Future;

use thiserror::Error;
use uuid::Uuid;

use crate::data::class::db::problem as class_problem;
use crate::data::class::Class;
use crate::data::user::db::{problem as user_problem, UserLookup};
use crate::data::user::User;
use crate::resp::problem::Problem;
use crate::services::ServiceError;
use crate::store::{ClassStore, EntityStore, StoreError, UserStore};

use rocket::http::Status;

/// Which document of an enrollment edge.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Side {
    User,
    Class,
}

impl Display for Side {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::User => f.write_str("user"),
            Side::Class => f.write_str("class"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Gap {
    /// Only `written` holds the edge (or only it dropped it).
    HalfEdge {
        user: Uuid,
        class: Uuid,
        written: Side,
        cause: String,
    },
    /// Deleting `id` stopped because these counterparts still reference it.
    Cascade {
        deleting: Side,
        id: Uuid,
        dangling: Vec<Uuid>,
        cause: String,
    },
}

impl Display for Gap {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Gap::HalfEdge {
                user,
                class,
                written,
                cause,
            } => write!(
                f,
                "edge user={} class={} only written on the {} side: {}",
                user, class, written, cause
            ),
            Gap::Cascade {
                deleting,
                id,
                dangling,
                cause,
            } => write!(
                f,
                "cascade for {} {} left {} dangling reference(s) {:?}: {}",
                deleting,
                id,
                dangling.len(),
                dangling,
                cause
            ),
        }
    }
}

#[derive(Debug, Error)]
pub enum MembershipError {
    #[error("user {0} doesn't exist")]
    UserNotFound(Uuid),
    #[error("class {0} doesn't exist")]
    ClassNotFound(Uuid),
    #[error("enrollment in class {0} is closed")]
    EnrollmentClosed(Uuid),
    #[error("user {user} is already enrolled in class {class}")]
    AlreadyEnrolled { user: Uuid, class: Uuid },
    #[error("user {user} is not enrolled in class {class}")]
    NotEnrolled { user: Uuid, class: Uuid },
    #[error("membership left inconsistent: {0}")]
    Inconsistent(Gap),

    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Service(#[from] ServiceError),
}

impl From<MembershipError> for Problem {
    fn from(e: MembershipError) -> Self {
        match e {
            MembershipError::UserNotFound(id) => user_problem::not_found(id),
            MembershipError::ClassNotFound(id) => class_problem::not_found(id),
            MembershipError::EnrollmentClosed(id) => class_problem::enrollment_closed(id),
            MembershipError::AlreadyEnrolled { user, class } => {
                Problem::new_untyped(Status::BadRequest, "User is already enrolled.")
                    .insert_str("userId", user)
                    .insert_str("classId", class)
                    .to_owned()
            }
            MembershipError::NotEnrolled { user, class } => {
                Problem::new_untyped(Status::BadRequest, "User is not enrolled.")
                    .insert_str("userId", user)
                    .insert_str("classId", class)
                    .to_owned()
            }
            MembershipError::Inconsistent(_) => Problem::new_untyped(
                Status::InternalServerError,
                "The operation did not fully complete.",
            )
            .detail("Some changes were saved. Retry the request to finish it.")
            .to_owned(),
            MembershipError::Store(e) => e.into(),
            MembershipError::Service(e) => e.into(),
        }
    }
}

fn inconsistent(gap: Gap) -> MembershipError {
    tracing::error!("Consistency gap: {}", gap);
    MembershipError::Inconsistent(gap)
}

async fn find_user(store: &dyn EntityStore, id: Uuid) -> Result<User, MembershipError> {
    store
        .find_user(&UserLookup::Id(id))
        .await?
        .ok_or(MembershipError::UserNotFound(id))
}

async fn find_class(store: &dyn EntityStore, id: Uuid) -> Result<Class, MembershipError> {
    store
        .find_class(id)
        .await?
        .ok_or(MembershipError::ClassNotFound(id))
}

/// Enrolls `user_id` in `class_id`, user side first.
#[tracing::instrument(skip(store))]
pub async fn enroll(
    store: &dyn EntityStore,
    user_id: Uuid,
    class_id: Uuid,
) -> Result<(), MembershipError> {
    let class = find_class(store, class_id).await?;
    if !class.is_enrollment_open {
        return Err(MembershipError::EnrollmentClosed(class_id));
    }

    let user = find_user(store, user_id).await?;
    if user.is_enrolled_in(class_id) {
        if !class.roster.contains(&user_id) {
            tracing::warn!(
                "Repairing roster of class {} missing enrolled user {}",
                class_id,
                user_id
            );
            store.add_to_roster(class_id, user_id).await?;
        }
        return Err(MembershipError::AlreadyEnrolled {
            user: user_id,
            class: class_id,
        });
    }

    if !store.add_enrollment(user_id, class_id).await? {
        return Err(MembershipError::UserNotFound(user_id));
    }

    let cause = match store.add_to_roster(class_id, user_id).await {
        Ok(true) => {
            tracing::info!("Enrolled user {} in class {}", user_id, class_id);
            return Ok(());
        }
        Ok(false) => "class was deleted mid-enrollment".to_string(),
        Err(e) => e.to_string(),
    };

    Err(inconsistent(Gap::HalfEdge {
        user: user_id,
        class: class_id,
        written: Side::User,
        cause,
    }))
}

/// Removes `user_id` from `class_id`. Works on closed classes and on
/// references to classes that no longer exist.
#[tracing::instrument(skip(store))]
pub async fn unenroll(
    store: &dyn EntityStore,
    user_id: Uuid,
    class_id: Uuid,
) -> Result<(), MembershipError> {
    let user = find_user(store, user_id).await?;
    if !user.is_enrolled_in(class_id) {
        return Err(MembershipError::NotEnrolled {
            user: user_id,
            class: class_id,
        });
    }

    if !store.remove_enrollment(user_id, class_id).await? {
        return Err(MembershipError::UserNotFound(user_id));
    }

    match store.remove_from_roster(class_id, user_id).await {
        Ok(_) => {
            tracing::info!("Unenrolled user {} from class {}", user_id, class_id);
            Ok(())
        }
        Err(e) => Err(inconsistent(Gap::HalfEdge {
            user: user_id,
            class: class_id,
            written: Side::User,
            cause: e.to_string(),
        })),
    }
}

/// Pulls the user out of every roster it is on, dropping each class from the
/// user's own set once its roster no longer holds the user. A failed removal
/// leaves that edge on both sides; every removal is attempted regardless.
async fn release_user(store: &dyn EntityStore, user: &User) -> Result<(), MembershipError> {
    let mut dangling = vec![];
    let mut cause = None;

    for &class in &user.enrolled_classes {
        let result = match store.remove_from_roster(class, user.id).await {
            Ok(_) => store.remove_enrollment(user.id, class).await.map(|_| ()),
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            tracing::error!(
                "Unable to release user {} from class {}: {}",
                user.id,
                class,
                e
            );
            dangling.push(class);
            cause.get_or_insert_with(|| e.to_string());
        }
    }

    match cause {
        None => Ok(()),
        Some(cause) => Err(inconsistent(Gap::Cascade {
            deleting: Side::User,
            id: user.id,
            dangling,
            cause,
        })),
    }
}

/// Deletes a user after removing it from every class roster. Returns the user
/// as it was before its enrollments were released.
///
/// `before_delete` runs once the rosters are clean and before the user document
/// is removed. An error from it keeps the document in place with an empty
/// enrolled set, so both sides still agree.
#[tracing::instrument(skip(store, before_delete))]
pub async fn cascade_delete_user<F, Fut>(
    store: &dyn EntityStore,
    user_id: Uuid,
    before_delete: F,
) -> Result<User, MembershipError>
where
    F: FnOnce(User) -> Fut,
    Fut: Future<Output = Result<(), ServiceError>>,
{
    let user = find_user(store, user_id).await?;
    release_user(store, &user).await?;
    before_delete(user.clone()).await?;

    store
        .delete_user(user_id)
        .await?
        .ok_or(MembershipError::UserNotFound(user_id))?;
    tracing::info!(
        "Deleted user {} and cleared {} roster(s)",
        user_id,
        user.enrolled_classes.len()
    );
    Ok(user)
}

/// Deletes a class after removing it from every rostered user's enrolled set.
#[tracing::instrument(skip(store))]
pub async fn cascade_delete_class(
    store: &dyn EntityStore,
    class_id: Uuid,
) -> Result<Class, MembershipError> {
    let class = find_class(store, class_id).await?;

    let mut dangling = vec![];
    let mut cause = None;
    for &user in &class.roster {
        let result = match store.remove_enrollment(user, class_id).await {
            Ok(_) => store.remove_from_roster(class_id, user).await.map(|_| ()),
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            tracing::error!(
                "Unable to remove class {} from user {}: {}",
                class_id,
                user,
                e
            );
            dangling.push(user);
            cause.get_or_insert_with(|| e.to_string());
        }
    }

    if let Some(cause) = cause {
        return Err(inconsistent(Gap::Cascade {
            deleting: Side::Class,
            id: class_id,
            dangling,
            cause,
        }));
    }

    store
        .delete_class(class_id)
        .await?
        .ok_or(MembershipError::ClassNotFound(class_id))?;
    tracing::info!(
        "Deleted class {} and released {} student(s)",
        class_id,
        class.roster.len()
    );
    Ok(class)
}
