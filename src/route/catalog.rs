//! Levels, volunteer applications, translations and donations. None of these
//! touch enrollment.

use std::collections::BTreeMap;

use rocket::http::Status;
use rocket::serde::json::Json;
use rocket::State;

use crate::access::{self, Requester};
use crate::data::catalog::{problem as level_problem, LevelData, LevelInfo};
use crate::data::translation::{Translation, TranslationKey};
use crate::data::volunteer::{
    Volunteer, VolunteerApplication, VolunteerStatus, VolunteerStatusUpdate,
};
use crate::resp::problem::{problems, Problem};
use crate::services::{CheckoutSession, Donation, Services};
use crate::store::{LevelStore, SharedStore, TranslationStore, VolunteerStore};
use crate::util::{non_blank, parse_id};

fn parse_number(raw: &str) -> Result<u32, Problem> {
    raw.trim()
        .parse()
        .map_err(|_| problems::invalid_fields(&["number"]))
}

#[get("/levels")]
#[tracing::instrument(skip(store))]
pub async fn level_list(store: &State<SharedStore>) -> Result<Json<Vec<LevelInfo>>, Problem> {
    Ok(Json(store.list_levels().await?))
}

#[post("/levels", format = "json", data = "<data>")]
#[tracing::instrument(skip(store))]
pub async fn level_create(
    data: Json<LevelData>,
    requester: Result<Requester, Problem>,
    store: &State<SharedStore>,
) -> Result<(Status, Json<LevelInfo>), Problem> {
    access::require_privileged(requester?.role)?;
    data.validate()?;

    if let Some(existing) = store.find_level(data.number).await? {
        return Err(level_problem::number_taken(existing.id));
    }

    let level = data.into_inner().into_level(None);
    store.insert_level(&level).await?;
    Ok((Status::Created, Json(level)))
}

#[put("/levels/<number>", format = "json", data = "<data>")]
#[tracing::instrument(skip(store))]
pub async fn level_update(
    number: &str,
    data: Json<LevelData>,
    requester: Result<Requester, Problem>,
    store: &State<SharedStore>,
) -> Result<Json<LevelInfo>, Problem> {
    access::require_privileged(requester?.role)?;
    let number = parse_number(number)?;
    data.validate()?;

    let current = store
        .find_level(number)
        .await?
        .ok_or_else(|| level_problem::not_found(number))?;
    if data.number != number {
        if let Some(existing) = store.find_level(data.number).await? {
            return Err(level_problem::number_taken(existing.id));
        }
    }

    let level = data.into_inner().into_level(Some(current.id));
    if !store.replace_level(number, &level).await? {
        return Err(level_problem::not_found(number));
    }
    Ok(Json(level))
}

#[delete("/levels/<number>")]
#[tracing::instrument(skip(store))]
pub async fn level_delete(
    number: &str,
    requester: Result<Requester, Problem>,
    store: &State<SharedStore>,
) -> Result<Status, Problem> {
    access::require_privileged(requester?.role)?;
    let number = parse_number(number)?;

    store
        .delete_level(number)
        .await?
        .ok_or_else(|| level_problem::not_found(number))?;
    Ok(Status::NoContent)
}

#[post("/volunteers", format = "json", data = "<application>")]
#[tracing::instrument(skip(store))]
pub async fn volunteer_apply(
    application: Json<VolunteerApplication>,
    store: &State<SharedStore>,
) -> Result<(Status, Json<Volunteer>), Problem> {
    application.validate()?;

    let volunteer = application.into_inner().into_volunteer();
    store.insert_volunteer(&volunteer).await?;
    tracing::info!("Received volunteer application {}", volunteer.id);
    Ok((Status::Created, Json(volunteer)))
}

#[get("/volunteers?<status>")]
#[tracing::instrument(skip(store))]
pub async fn volunteer_list(
    status: Option<&str>,
    requester: Result<Requester, Problem>,
    store: &State<SharedStore>,
) -> Result<Json<Vec<Volunteer>>, Problem> {
    access::require_privileged(requester?.role)?;
    let status = match non_blank(status) {
        Some(raw) => Some(raw.parse::<VolunteerStatus>()?),
        None => None,
    };

    Ok(Json(store.list_volunteers(status).await?))
}

#[put("/volunteers/<id>/status", format = "json", data = "<update>")]
#[tracing::instrument(skip(store))]
pub async fn volunteer_set_status(
    id: &str,
    update: Json<VolunteerStatusUpdate>,
    requester: Result<Requester, Problem>,
    store: &State<SharedStore>,
) -> Result<Json<Volunteer>, Problem> {
    access::require_privileged(requester?.role)?;
    let id = parse_id("id", id)?;

    store
        .set_volunteer_status(id, update.status)
        .await?
        .map(Json)
        .ok_or_else(|| problems::not_found("Volunteer", id))
}

#[delete("/volunteers/<id>")]
#[tracing::instrument(skip(store))]
pub async fn volunteer_delete(
    id: &str,
    requester: Result<Requester, Problem>,
    store: &State<SharedStore>,
) -> Result<Status, Problem> {
    access::require_privileged(requester?.role)?;
    let id = parse_id("id", id)?;

    store
        .delete_volunteer(id)
        .await?
        .ok_or_else(|| problems::not_found("Volunteer", id))?;
    Ok(Status::NoContent)
}

/// Every string of one namespace as a flat `{key: value}` map.
#[get("/translations/<language>/<namespace>")]
#[tracing::instrument(skip(store))]
pub async fn translation_namespace(
    language: &str,
    namespace: &str,
    store: &State<SharedStore>,
) -> Result<Json<BTreeMap<String, String>>, Problem> {
    let strings = store.list_translations(language, namespace).await?;
    Ok(Json(
        strings.into_iter().map(|it| (it.key, it.value)).collect(),
    ))
}

#[put("/translations", format = "json", data = "<translation>")]
#[tracing::instrument(skip(store))]
pub async fn translation_upsert(
    translation: Json<Translation>,
    requester: Result<Requester, Problem>,
    store: &State<SharedStore>,
) -> Result<Json<Translation>, Problem> {
    access::require_privileged(requester?.role)?;
    translation.validate()?;

    store.upsert_translation(&translation).await?;
    Ok(translation)
}

#[delete("/translations/<language>/<namespace>/<key>")]
#[tracing::instrument(skip(store))]
pub async fn translation_delete(
    language: &str,
    namespace: &str,
    key: &str,
    requester: Result<Requester, Problem>,
    store: &State<SharedStore>,
) -> Result<Status, Problem> {
    access::require_privileged(requester?.role)?;
    let id = TranslationKey {
        language: language.to_string(),
        namespace: namespace.to_string(),
        key: key.to_string(),
    };

    if store.delete_translation(&id).await? {
        Ok(Status::NoContent)
    } else {
        Err(problems::not_found(
            "Translation",
            format!("{}/{}/{}", language, namespace, key),
        ))
    }
}

#[post("/donations/checkout", format = "json", data = "<donation>")]
#[tracing::instrument(skip(services))]
pub async fn donation_checkout(
    donation: Json<Donation>,
    services: &State<Services>,
) -> Result<Json<CheckoutSession>, Problem> {
    donation.validate()?;
    let gateway = services.payments()?;

    Ok(Json(gateway.create_checkout(&donation).await?))
}

#[cfg(test)]
mod catalog_endpoints {
    use std::collections::BTreeMap;

    use rocket::http::{ContentType, Status};
    use serde_json::{json, Value};

    use crate::data::volunteer::Volunteer;
    use crate::role::Role;
    use crate::route::testing::{fake_services, TestApp};
    use crate::services::Services;

    #[rocket::async_test]
    async fn level_numbers_are_unique() {
        let app = TestApp::new(Services::default()).await;
        app.user("idp_a", "Ada", "ada@example.com", Role::Admin).await;
        let level = |number: u32| {
            json!({
                "number": number,
                "name": format!("Level {}", number),
                "skills": ["reading"]
            })
            .to_string()
        };

        for number in [1, 2] {
            let response = app
                .client
                .post("/api/v1/levels")
                .header(ContentType::JSON)
                .header(app.bearer("idp_a"))
                .body(level(number))
                .dispatch()
                .await;
            assert_eq!(response.status(), Status::Created);
        }

        let duplicate = app
            .client
            .post("/api/v1/levels")
            .header(ContentType::JSON)
            .header(app.bearer("idp_a"))
            .body(level(2))
            .dispatch()
            .await;
        assert_eq!(duplicate.status(), Status::Conflict);

        let renumbered_onto_taken = app
            .client
            .put("/api/v1/levels/1")
            .header(ContentType::JSON)
            .header(app.bearer("idp_a"))
            .body(level(2))
            .dispatch()
            .await;
        assert_eq!(renumbered_onto_taken.status(), Status::Conflict);

        let renumbered = app
            .client
            .put("/api/v1/levels/2")
            .header(ContentType::JSON)
            .header(app.bearer("idp_a"))
            .body(level(5))
            .dispatch()
            .await;
        assert_eq!(renumbered.status(), Status::Ok);

        let numbers: Vec<u64> = app
            .client
            .get("/api/v1/levels")
            .dispatch()
            .await
            .into_json::<Vec<Value>>()
            .await
            .unwrap()
            .iter()
            .map(|it| it["number"].as_u64().unwrap())
            .collect();
        assert_eq!(numbers, vec![1, 5]);

        let gone = app
            .client
            .delete("/api/v1/levels/2")
            .header(app.bearer("idp_a"))
            .dispatch()
            .await;
        assert_eq!(gone.status(), Status::NotFound);
    }

    #[rocket::async_test]
    async fn volunteer_review_flow() {
        let app = TestApp::new(Services::default()).await;
        app.user("idp_i", "Ivy", "ivy@example.com", Role::Instructor).await;

        let applied = app
            .client
            .post("/api/v1/volunteers")
            .header(ContentType::JSON)
            .body(
                json!({
                    "firstName": "Val",
                    "lastName": "Helper",
                    "email": "val@example.com",
                    "languages": ["pt", "en"]
                })
                .to_string(),
            )
            .dispatch()
            .await;
        assert_eq!(applied.status(), Status::Created);
        let volunteer: Volunteer = applied.into_json().await.unwrap();
        assert_eq!(volunteer.status.as_str(), "pending");

        let anonymous = app.client.get("/api/v1/volunteers").dispatch().await;
        assert_eq!(anonymous.status(), Status::Unauthorized);

        let approved = app
            .client
            .put(format!("/api/v1/volunteers/{}/status", volunteer.id))
            .header(ContentType::JSON)
            .header(app.bearer("idp_i"))
            .body(json!({ "status": "approved" }).to_string())
            .dispatch()
            .await;
        assert_eq!(approved.status(), Status::Ok);

        let pending: Vec<Value> = app
            .client
            .get("/api/v1/volunteers?status=pending")
            .header(app.bearer("idp_i"))
            .dispatch()
            .await
            .into_json()
            .await
            .unwrap();
        assert!(pending.is_empty());

        let bad_status = app
            .client
            .get("/api/v1/volunteers?status=maybe")
            .header(app.bearer("idp_i"))
            .dispatch()
            .await;
        assert_eq!(bad_status.status(), Status::BadRequest);

        let deleted = app
            .client
            .delete(format!("/api/v1/volunteers/{}", volunteer.id))
            .header(app.bearer("idp_i"))
            .dispatch()
            .await;
        assert_eq!(deleted.status(), Status::NoContent);
    }

    #[rocket::async_test]
    async fn translations_are_public_to_read() {
        let app = TestApp::new(Services::default()).await;
        app.user("idp_a", "Ada", "ada@example.com", Role::Admin).await;

        for (key, value) in [("title", "Aulas"), ("title", "Nossas aulas"), ("cta", "Inscreva-se")] {
            let response = app
                .client
                .put("/api/v1/translations")
                .header(ContentType::JSON)
                .header(app.bearer("idp_a"))
                .body(
                    json!({
                        "language": "pt",
                        "namespace": "home",
                        "key": key,
                        "value": value
                    })
                    .to_string(),
                )
                .dispatch()
                .await;
            assert_eq!(response.status(), Status::Ok);
        }

        let strings: BTreeMap<String, String> = app
            .client
            .get("/api/v1/translations/pt/home")
            .dispatch()
            .await
            .into_json()
            .await
            .unwrap();
        assert_eq!(strings.len(), 2);
        assert_eq!(strings["title"], "Nossas aulas");

        let deleted = app
            .client
            .delete("/api/v1/translations/pt/home/cta")
            .header(app.bearer("idp_a"))
            .dispatch()
            .await;
        assert_eq!(deleted.status(), Status::NoContent);

        let missing = app
            .client
            .delete("/api/v1/translations/pt/home/cta")
            .header(app.bearer("idp_a"))
            .dispatch()
            .await;
        assert_eq!(missing.status(), Status::NotFound);
    }

    #[rocket::async_test]
    async fn donations_need_a_payment_provider() {
        let unconfigured = TestApp::new(Services::default()).await;
        let body = json!({ "amount": 2500 }).to_string();

        let response = unconfigured
            .client
            .post("/api/v1/donations/checkout")
            .header(ContentType::JSON)
            .body(body.clone())
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::ServiceUnavailable);

        let (services, _, gateway) = fake_services();
        let app = TestApp::new(services).await;
        let response = app
            .client
            .post("/api/v1/donations/checkout")
            .header(ContentType::JSON)
            .body(body)
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok);
        let session: Value = response.into_json().await.unwrap();
        assert!(session["url"].as_str().unwrap().starts_with("https://"));
        assert_eq!(gateway.amounts().await, vec![2500]);

        let zero = app
            .client
            .post("/api/v1/donations/checkout")
            .header(ContentType::JSON)
            .body(json!({ "amount": 0 }).to_string())
            .dispatch()
            .await;
        assert_eq!(zero.status(), Status::BadRequest);
    }
}
