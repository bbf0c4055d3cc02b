//! Persistent collections behind object-safe traits so handlers can hold an
//! `Arc<dyn EntityStore>` regardless of backend.
//!
//! Enrollment edits are exposed as four single-sided set operations. They are
//! idempotent (add-if-absent / remove-if-present) and report whether the target
//! document existed; pairing them is [`membership`](crate::membership)'s job.

use std::sync::Arc;

use rocket::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::data::catalog::LevelInfo;
use crate::data::class::db::ClassUpdateData;
use crate::data::class::Class;
use crate::data::level::ClassLevel;
use crate::data::translation::{Translation, TranslationKey};
use crate::data::user::db::{UserLookup, UserUpdateData};
use crate::data::user::User;
use crate::data::volunteer::{Volunteer, VolunteerStatus};
use crate::resp::problem::{problems, Problem};
use crate::roster::{RosterQuery, StudentPage};

pub mod connection;
pub mod memory;
pub mod mongo;

pub use memory::MemoryStore;
pub use mongo::MongoStore;

pub type SharedStore = Arc<dyn EntityStore>;

#[derive(Debug, Error)]
pub enum StoreError {
    /// A unique index rejected the write.
    #[error("duplicate {0}")]
    Duplicate(&'static str),
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("invalid query: {0}")]
    Query(String),

    #[error(transparent)]
    Database(#[from] mongodb::error::Error),
    #[error(transparent)]
    BsonDe(#[from] bson::de::Error),
    #[error(transparent)]
    BsonSer(#[from] bson::ser::Error),
}

impl From<StoreError> for Problem {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Database(e) => Problem::from(e),
            StoreError::Duplicate(what) => {
                Problem::new_untyped(rocket::http::Status::Conflict, "Conflicting record.")
                    .detail(format!("Duplicate {}.", what))
                    .to_owned()
            }
            other => {
                tracing::error!("Store error: {}", other);
                problems::internal()
            }
        }
    }
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn insert_user(&self, user: &User) -> Result<(), StoreError>;
    async fn find_user(&self, lookup: &UserLookup) -> Result<Option<User>, StoreError>;
    async fn update_user(
        &self,
        id: Uuid,
        update: &UserUpdateData,
    ) -> Result<Option<User>, StoreError>;
    async fn delete_user(&self, id: Uuid) -> Result<Option<User>, StoreError>;

    /// Adds `class` to the user's enrolled set. `false` when the user is gone.
    async fn add_enrollment(&self, user: Uuid, class: Uuid) -> Result<bool, StoreError>;
    /// Removes `class` from the user's enrolled set. `false` when the user is gone.
    async fn remove_enrollment(&self, user: Uuid, class: Uuid) -> Result<bool, StoreError>;

    async fn list_students(&self, query: &RosterQuery) -> Result<StudentPage, StoreError>;
}

#[async_trait]
pub trait ClassStore: Send + Sync {
    async fn insert_class(&self, class: &Class) -> Result<(), StoreError>;
    async fn find_class(&self, id: Uuid) -> Result<Option<Class>, StoreError>;
    async fn list_classes(&self, level: Option<ClassLevel>) -> Result<Vec<Class>, StoreError>;
    /// Classes sharing the (level, age group, instructor) triple.
    async fn find_similar_classes(
        &self,
        level: ClassLevel,
        age_group: &str,
        instructor: &str,
    ) -> Result<Vec<Class>, StoreError>;
    async fn update_class(
        &self,
        id: Uuid,
        update: &ClassUpdateData,
    ) -> Result<Option<Class>, StoreError>;
    async fn delete_class(&self, id: Uuid) -> Result<Option<Class>, StoreError>;

    /// Adds `user` to the class roster. `false` when the class is gone.
    async fn add_to_roster(&self, class: Uuid, user: Uuid) -> Result<bool, StoreError>;
    /// Removes `user` from the class roster. `false` when the class is gone.
    async fn remove_from_roster(&self, class: Uuid, user: Uuid) -> Result<bool, StoreError>;
}

#[async_trait]
pub trait LevelStore: Send + Sync {
    async fn list_levels(&self) -> Result<Vec<LevelInfo>, StoreError>;
    async fn find_level(&self, number: u32) -> Result<Option<LevelInfo>, StoreError>;
    async fn insert_level(&self, level: &LevelInfo) -> Result<(), StoreError>;
    async fn replace_level(&self, number: u32, level: &LevelInfo) -> Result<bool, StoreError>;
    async fn delete_level(&self, number: u32) -> Result<Option<LevelInfo>, StoreError>;
}

#[async_trait]
pub trait VolunteerStore: Send + Sync {
    async fn insert_volunteer(&self, volunteer: &Volunteer) -> Result<(), StoreError>;
    async fn list_volunteers(
        &self,
        status: Option<VolunteerStatus>,
    ) -> Result<Vec<Volunteer>, StoreError>;
    async fn set_volunteer_status(
        &self,
        id: Uuid,
        status: VolunteerStatus,
    ) -> Result<Option<Volunteer>, StoreError>;
    async fn delete_volunteer(&self, id: Uuid) -> Result<Option<Volunteer>, StoreError>;
}

#[async_trait]
pub trait TranslationStore: Send + Sync {
    async fn list_translations(
        &self,
        language: &str,
        namespace: &str,
    ) -> Result<Vec<Translation>, StoreError>;
    async fn upsert_translation(&self, translation: &Translation) -> Result<(), StoreError>;
    async fn delete_translation(&self, key: &TranslationKey) -> Result<bool, StoreError>;
}

pub trait EntityStore:
    UserStore + ClassStore + LevelStore + VolunteerStore + TranslationStore
{
}

impl<T> EntityStore for T where
    T: UserStore + ClassStore + LevelStore + VolunteerStore + TranslationStore
{
}
