use rocket::http::Status;
use rocket::serde::json::Json;
use rocket::State;
use uuid::Uuid;

use crate::access::{self, Requester};
use crate::data::class::db::problem as class_problem;
use crate::data::class::db::{ClassCreateData, ClassUpdateData};
use crate::data::class::{Class, ClassSummary};
use crate::data::level::ClassLevel;
use crate::membership;
use crate::resp::problem::{problems, Problem};
use crate::store::{ClassStore, SharedStore};
use crate::util::{non_blank, parse_id};

/// Another class this one would duplicate, ignoring `except`.
async fn find_duplicate(
    store: &SharedStore,
    class: &Class,
    except: Option<Uuid>,
) -> Result<Option<Class>, Problem> {
    let similar = store
        .find_similar_classes(class.level, &class.age_group, &class.instructor)
        .await?;

    Ok(similar
        .into_iter()
        .filter(|it| Some(it.id) != except)
        .find(|it| it.duplicates(class)))
}

#[get("/classes?<level>")]
#[tracing::instrument(skip(store))]
pub async fn class_list(
    level: Option<&str>,
    store: &State<SharedStore>,
) -> Result<Json<Vec<ClassSummary>>, Problem> {
    let level = match non_blank(level) {
        Some(raw) => Some(
            raw.parse::<ClassLevel>()
                .map_err(|_| problems::invalid_fields(&["level"]))?,
        ),
        None => None,
    };

    let classes = store.list_classes(level).await?;
    Ok(Json(classes.iter().map(Class::summary).collect()))
}

#[get("/classes/<id>")]
#[tracing::instrument(skip(store))]
pub async fn class_get(
    id: &str,
    requester: Result<Requester, Problem>,
    store: &State<SharedStore>,
) -> Result<Json<Class>, Problem> {
    access::require_privileged(requester?.role)?;
    let id = parse_id("id", id)?;

    store
        .find_class(id)
        .await?
        .map(Json)
        .ok_or_else(|| class_problem::not_found(id))
}

#[post("/classes", format = "json", data = "<data>")]
#[tracing::instrument(skip(store))]
pub async fn class_create(
    data: Json<ClassCreateData>,
    requester: Result<Requester, Problem>,
    store: &State<SharedStore>,
) -> Result<(Status, Json<Class>), Problem> {
    access::require_privileged(requester?.role)?;
    data.validate()?;

    let class = data.into_inner().into_class();
    if let Some(existing) = find_duplicate(store, &class, None).await? {
        tracing::debug!("class duplicates {}", existing.id);
        return Err(class_problem::duplicate_schedule(existing.id));
    }

    store.insert_class(&class).await?;
    tracing::info!("Created class {}", class.id);
    Ok((Status::Created, Json(class)))
}

#[put("/classes/<id>", format = "json", data = "<update>")]
#[tracing::instrument(skip(store))]
pub async fn class_update(
    id: &str,
    update: Json<ClassUpdateData>,
    requester: Result<Requester, Problem>,
    store: &State<SharedStore>,
) -> Result<Json<Class>, Problem> {
    access::require_privileged(requester?.role)?;
    let id = parse_id("id", id)?;
    update.validate()?;

    let mut edited = store
        .find_class(id)
        .await?
        .ok_or_else(|| class_problem::not_found(id))?;
    update.apply(&mut edited);
    if let Some(existing) = find_duplicate(store, &edited, Some(id)).await? {
        return Err(class_problem::duplicate_schedule(existing.id));
    }

    let updated = store
        .update_class(id, &update)
        .await?
        .ok_or_else(|| class_problem::not_found(id))?;
    Ok(Json(updated))
}

/// Drops the class from every rostered student, then deletes it.
#[delete("/classes/<id>")]
#[tracing::instrument(skip(store))]
pub async fn class_delete(
    id: &str,
    requester: Result<Requester, Problem>,
    store: &State<SharedStore>,
) -> Result<Status, Problem> {
    access::require_privileged(requester?.role)?;
    let id = parse_id("id", id)?;

    membership::cascade_delete_class(store.inner().as_ref(), id).await?;
    Ok(Status::NoContent)
}
