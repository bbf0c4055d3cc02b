use rocket::http::Status;
use rocket::serde::json::Json;
use rocket::{Build, Request, Rocket, Route};
use utoipa::OpenApi;

pub mod catalog;
pub mod class;
pub mod files;
pub mod users;

#[cfg(test)]
pub(crate) mod testing;

use catalog::*;
use class::*;
use files::*;
use users::*;

use crate::{
    data::{
        catalog::{LevelData, LevelInfo},
        class::db::{ClassCreateData, ClassUpdateData},
        class::{Class, ClassSummary, ScheduleSlot},
        translation::Translation,
        user::db::{UserSignupData, UserUpdateData},
        user::User,
        volunteer::{Volunteer, VolunteerApplication, VolunteerStatus, VolunteerStatusUpdate},
    },
    resp::{identity::doc::BearerAuth, problem::Problem},
    role::Role,
    roster::{StudentPage, StudentWithClasses},
    services::{CheckoutSession, Donation},
};

#[derive(OpenApi)]
#[openapi(
    components(schemas(
        Role,
        User,
        UserSignupData,
        UserUpdateData,
        EnrollmentRequest,
        Class,
        ClassSummary,
        ScheduleSlot,
        ClassCreateData,
        ClassUpdateData,
        StudentPage,
        StudentWithClasses,
        LevelInfo,
        LevelData,
        Volunteer,
        VolunteerApplication,
        VolunteerStatus,
        VolunteerStatusUpdate,
        Translation,
        Donation,
        CheckoutSession,
        Problem
    )),
    modifiers(&BearerAuth)
)]
pub struct ApiDocV1;

#[get("/openapi.json")]
pub fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDocV1::openapi())
}

/// Renders framework-level failures (bad bodies, unknown routes) as problems too.
#[catch(default)]
pub fn problem_catcher(status: Status, req: &Request<'_>) -> Problem {
    Problem::new_untyped(status, status.reason().unwrap_or("Request failed."))
        .instance_uri(req.uri().path().to_string())
        .to_owned()
}

pub fn api_v1() -> Vec<Route> {
    routes![
        openapi_json,
        user_create,
        user_me,
        user_get,
        user_update,
        user_delete,
        user_enroll,
        user_unenroll,
        students_with_classes,
        class_list,
        class_get,
        class_create,
        class_update,
        class_delete,
        level_list,
        level_create,
        level_update,
        level_delete,
        volunteer_apply,
        volunteer_list,
        volunteer_set_status,
        volunteer_delete,
        translation_namespace,
        translation_upsert,
        translation_delete,
        donation_checkout
    ]
}

pub fn mount_api(rocket: Rocket<Build>) -> Rocket<Build> {
    rocket
        .mount("/api/v1", api_v1())
        .mount("/", routes![app, app_path])
        .register("/", catchers![problem_catcher])
}
