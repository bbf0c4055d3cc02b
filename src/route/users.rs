use rocket::http::Status;
use rocket::serde::json::Json;
use rocket::State;
use utoipa::ToSchema;

use crate::access::{self, Requester};
use crate::data::level::ClassLevel;
use crate::data::user::db::problem as user_problem;
use crate::data::user::db::{UserLookup, UserSignupData, UserUpdateData};
use crate::data::user::User;
use crate::membership;
use crate::middleware::paging::Paging;
use crate::resp::identity::Identity;
use crate::resp::problem::{problems, Problem};
use crate::roster::{StudentPage, MAX_QUERY_LEN};
use crate::services::Services;
use crate::store::{SharedStore, UserStore};
use crate::util::{non_blank, parse_id};

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct EnrollmentRequest {
    #[serde(default)]
    pub class_id: Option<String>,
}

impl EnrollmentRequest {
    fn class_id(&self) -> Result<uuid::Uuid, Problem> {
        match non_blank(self.class_id.as_deref()) {
            Some(raw) => parse_id("classId", raw),
            None => Err(problems::invalid_fields(&["classId"])),
        }
    }
}

#[derive(Debug, FromForm)]
pub struct UserQuery<'r> {
    #[field(name = "_id")]
    id: Option<&'r str>,
    email: Option<&'r str>,
    whatsapp: Option<&'r str>,
}

impl UserQuery<'_> {
    fn lookup(&self) -> Result<UserLookup, Problem> {
        if let Some(id) = non_blank(self.id) {
            return Ok(UserLookup::Id(parse_id("_id", id)?));
        }
        if let Some(email) = non_blank(self.email) {
            return Ok(UserLookup::Email(email.to_string()));
        }
        if let Some(phone) = non_blank(self.whatsapp) {
            return Ok(UserLookup::Phone(phone.to_string()));
        }
        Err(problems::invalid_fields(&["_id", "email", "whatsapp"]))
    }
}

async fn load_user(store: &SharedStore, id: uuid::Uuid) -> Result<User, Problem> {
    store
        .find_user(&UserLookup::Id(id))
        .await?
        .ok_or_else(|| user_problem::not_found(id))
}

/// Creates the account for the calling identity.
#[post("/users", format = "json", data = "<signup>")]
#[tracing::instrument(skip(store))]
pub async fn user_create(
    signup: Json<UserSignupData>,
    identity: Result<Identity, Problem>,
    store: &State<SharedStore>,
) -> Result<(Status, Json<User>), Problem> {
    let identity = identity?;
    signup.validate()?;

    let provisioned = store
        .find_user(&UserLookup::IdentityId(identity.subject.clone()))
        .await?;
    if let Some(existing) = provisioned {
        return Err(user_problem::already_provisioned(existing.id));
    }
    if let Some(existing) = store
        .find_user(&UserLookup::Email(signup.email.clone()))
        .await?
    {
        return Err(user_problem::email_taken(existing.id));
    }

    let user = signup.into_inner().into_user(&identity.subject);
    store.insert_user(&user).await?;
    tracing::info!("Created user {} for identity {}", user.id, identity.subject);

    Ok((Status::Created, Json(user)))
}

#[get("/me")]
#[tracing::instrument(skip(store))]
pub async fn user_me(
    requester: Result<Requester, Problem>,
    store: &State<SharedStore>,
) -> Result<Json<User>, Problem> {
    let requester = requester?;
    Ok(Json(load_user(store, requester.user_id).await?))
}

#[get("/user?<query..>")]
#[tracing::instrument(skip(store))]
pub async fn user_get(
    query: UserQuery<'_>,
    requester: Result<Requester, Problem>,
    store: &State<SharedStore>,
) -> Result<Json<User>, Problem> {
    let requester = requester?;
    let lookup = query.lookup()?;

    let user = access::authorize_user(store.inner().as_ref(), &requester, &lookup).await?;
    Ok(Json(user))
}

#[put("/users/<id>", format = "json", data = "<update>")]
#[tracing::instrument(skip(store))]
pub async fn user_update(
    id: &str,
    update: Json<UserUpdateData>,
    requester: Result<Requester, Problem>,
    store: &State<SharedStore>,
) -> Result<Json<User>, Problem> {
    let requester = requester?;
    let id = parse_id("id", id)?;
    let current =
        access::authorize_user(store.inner().as_ref(), &requester, &UserLookup::Id(id)).await?;

    update.validate()?;
    if update.role.is_some() {
        access::require_admin(requester.role)?;
    }
    if update.is_empty() {
        return Ok(Json(current));
    }
    if let Some(email) = &update.email {
        if let Some(existing) = store.find_user(&UserLookup::Email(email.clone())).await? {
            if existing.id != id {
                return Err(user_problem::email_taken(existing.id));
            }
        }
    }

    let updated = store
        .update_user(id, &update)
        .await?
        .ok_or_else(|| user_problem::not_found(id))?;
    Ok(Json(updated))
}

/// Removes the user from every roster, then from the identity provider, then locally.
#[delete("/user/<id>")]
#[tracing::instrument(skip(store, services))]
pub async fn user_delete(
    id: &str,
    requester: Result<Requester, Problem>,
    store: &State<SharedStore>,
    services: &State<Services>,
) -> Result<Status, Problem> {
    access::require_privileged(requester?.role)?;
    let id = parse_id("id", id)?;
    load_user(store, id).await?;
    let directory = services.identity()?.clone();

    membership::cascade_delete_user(store.inner().as_ref(), id, move |user| async move {
        directory.delete_identity(&user.identity_id).await
    })
    .await?;

    Ok(Status::NoContent)
}

#[post("/users/<id>/enroll", format = "json", data = "<request>")]
#[tracing::instrument(skip(store))]
pub async fn user_enroll(
    id: &str,
    request: Json<EnrollmentRequest>,
    requester: Result<Requester, Problem>,
    store: &State<SharedStore>,
) -> Result<(Status, Json<User>), Problem> {
    let requester = requester?;
    let id = parse_id("id", id)?;
    let class_id = request.class_id()?;
    access::authorize_user(store.inner().as_ref(), &requester, &UserLookup::Id(id)).await?;

    membership::enroll(store.inner().as_ref(), id, class_id).await?;
    Ok((Status::Created, Json(load_user(store, id).await?)))
}

#[post("/users/<id>/unenroll", format = "json", data = "<request>")]
#[tracing::instrument(skip(store))]
pub async fn user_unenroll(
    id: &str,
    request: Json<EnrollmentRequest>,
    requester: Result<Requester, Problem>,
    store: &State<SharedStore>,
) -> Result<(Status, Json<User>), Problem> {
    let requester = requester?;
    let id = parse_id("id", id)?;
    let class_id = request.class_id()?;
    access::authorize_user(store.inner().as_ref(), &requester, &UserLookup::Id(id)).await?;

    membership::unenroll(store.inner().as_ref(), id, class_id).await?;
    Ok((Status::Created, Json(load_user(store, id).await?)))
}

#[get("/students-with-classes?<level>&<q>")]
#[tracing::instrument(skip(store))]
pub async fn students_with_classes(
    level: Option<&str>,
    q: Option<&str>,
    paging: Result<Paging, Problem>,
    requester: Result<Requester, Problem>,
    store: &State<SharedStore>,
) -> Result<Json<StudentPage>, Problem> {
    access::require_privileged(requester?.role)?;

    let mut query = paging?.query();
    if let Some(level) = non_blank(level) {
        let level: ClassLevel = level
            .parse()
            .map_err(|_| problems::invalid_fields(&["level"]))?;
        query = query.with_level(level);
    }
    if let Some(text) = q {
        if text.trim().chars().count() > MAX_QUERY_LEN {
            return Err(problems::invalid_fields(&["q"]));
        }
        query = query.with_text(text);
    }

    Ok(Json(store.list_students(&query).await?))
}

///////////////////////
//       TESTS
///////////////////////
