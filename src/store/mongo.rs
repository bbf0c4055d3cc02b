use bson::{doc, Bson, Document};
use mongodb::error::{ErrorKind, WriteFailure};
use mongodb::options::{
    FindOneAndUpdateOptions, FindOptions, IndexOptions, ReturnDocument, UpdateOptions,
};
use mongodb::{Collection, Database, IndexModel};
use rocket::async_trait;
use rocket::futures::TryStreamExt;
use uuid::Uuid;

use super::connection::mongo_client;
use super::{ClassStore, LevelStore, StoreError, TranslationStore, UserStore, VolunteerStore};
use crate::data::catalog::{LevelInfo, LEVEL_COLLECTION_NAME};
use crate::data::class::db::ClassUpdateData;
use crate::data::class::{Class, CLASS_COLLECTION_NAME};
use crate::data::filter;
use crate::data::level::ClassLevel;
use crate::data::translation::{Translation, TranslationKey, TRANSLATION_COLLECTION_NAME};
use crate::data::user::db::{UserLookup, UserUpdateData};
use crate::data::user::{User, USER_COLLECTION_NAME};
use crate::data::volunteer::{Volunteer, VolunteerStatus, VOLUNTEER_COLLECTION_NAME};
use crate::roster::{RosterQuery, StudentPage, StudentWithClasses};
use crate::util::non_blank;

const DUPLICATE_KEY: i32 = 11000;

fn duplicate_key(e: &mongodb::error::Error) -> bool {
    match e.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(w)) => w.code == DUPLICATE_KEY,
        ErrorKind::Command(c) => c.code == DUPLICATE_KEY,
        _ => false,
    }
}

fn map_duplicate(what: &'static str) -> impl Fn(mongodb::error::Error) -> StoreError {
    move |e| {
        if duplicate_key(&e) {
            StoreError::Duplicate(what)
        } else {
            StoreError::Database(e)
        }
    }
}

fn return_after() -> FindOneAndUpdateOptions {
    FindOneAndUpdateOptions::builder()
        .return_document(ReturnDocument::After)
        .build()
}

fn optional_str(value: Option<&str>) -> Bson {
    non_blank(value).map_or(Bson::Null, |it| Bson::String(it.to_string()))
}

fn user_lookup_filter(lookup: &UserLookup) -> Document {
    match lookup {
        UserLookup::Id(id) => filter::by_id(*id),
        UserLookup::IdentityId(identity) => doc! { "identityId": identity.as_str() },
        UserLookup::Email(email) => doc! { "email": email.trim().to_lowercase() },
        UserLookup::Phone(phone) => doc! { "phone": phone.trim() },
    }
}

fn user_set(update: &UserUpdateData) -> Document {
    let mut set = Document::new();
    if let Some(it) = &update.first_name {
        set.insert("firstName", it.trim());
    }
    if let Some(it) = &update.last_name {
        set.insert("lastName", it.trim());
    }
    if let Some(it) = &update.email {
        set.insert("email", it.trim().to_lowercase());
    }
    if let Some(it) = &update.phone {
        set.insert("phone", optional_str(Some(it.as_str())));
    }
    if let Some(it) = &update.gender {
        set.insert("gender", optional_str(Some(it.as_str())));
    }
    if let Some(age) = update.age {
        set.insert("age", age as i64);
    }
    if let Some(role) = update.role {
        set.insert("role", role);
    }
    set
}

fn class_set(update: &ClassUpdateData) -> Result<Document, StoreError> {
    let mut set = Document::new();
    if let Some(level) = update.level {
        set.insert("level", level);
    }
    if let Some(it) = &update.age_group {
        set.insert("ageGroup", it.trim());
    }
    if let Some(it) = &update.instructor {
        set.insert("instructor", it.trim());
    }
    if let Some(schedule) = &update.schedule {
        set.insert("schedule", bson::to_bson(schedule)?);
    }
    if let Some(open) = update.is_enrollment_open {
        set.insert("isEnrollmentOpen", open);
    }
    if let Some(it) = &update.image {
        set.insert("image", optional_str(Some(it.as_str())));
    }
    Ok(set)
}

fn count_of(value: Option<&Bson>) -> u64 {
    match value {
        Some(Bson::Int32(n)) => *n as u64,
        Some(Bson::Int64(n)) => *n as u64,
        _ => 0,
    }
}

/// Splits the `$facet` output of [`RosterQuery::pipeline`] into items and total.
fn read_student_facet(facet: Document) -> Result<(Vec<StudentWithClasses>, u64), StoreError> {
    let items = match facet.get("items") {
        Some(items) => bson::from_bson::<Vec<StudentWithClasses>>(items.clone())?,
        None => vec![],
    };
    let total = facet
        .get_array("total")
        .ok()
        .and_then(|it| it.first())
        .and_then(Bson::as_document)
        .map_or(0, |it| count_of(it.get("count")));

    Ok((
        items.into_iter().map(StudentWithClasses::normalized).collect(),
        total,
    ))
}

/// Entity store over a MongoDB database. Ids are stored as strings.
#[derive(Debug, Clone)]
pub struct MongoStore {
    db: Database,
}

impl MongoStore {
    pub fn new(db: Database) -> MongoStore {
        MongoStore { db }
    }

    /// Connects through the shared client and prepares indexes.
    pub async fn connect(uri: &str, db_name: &str) -> Result<MongoStore, StoreError> {
        let client = mongo_client(uri).await?;

        tracing::info!("Using MongoDB database: {}", db_name);
        let store = MongoStore::new(client.database(db_name));
        store.db.run_command(doc! { "ping": 1 }, None).await?;
        store.ensure_indexes().await?;

        Ok(store)
    }

    pub async fn ensure_indexes(&self) -> Result<(), StoreError> {
        let unique = || IndexOptions::builder().unique(true).build();
        let index = |keys: Document| IndexModel::builder().keys(keys).options(unique()).build();

        self.users()
            .create_index(index(doc! { "identityId": 1 }), None)
            .await?;
        self.users().create_index(index(doc! { "email": 1 }), None).await?;
        self.levels().create_index(index(doc! { "number": 1 }), None).await?;
        self.translations()
            .create_index(
                index(doc! { "language": 1, "namespace": 1, "key": 1 }),
                None,
            )
            .await?;
        self.classes()
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "level": 1, "ageGroup": 1, "instructor": 1 })
                    .build(),
                None,
            )
            .await?;

        tracing::debug!("MongoDB indexes ensured.");
        Ok(())
    }

    fn users(&self) -> Collection<User> {
        self.db.collection(USER_COLLECTION_NAME)
    }

    fn classes(&self) -> Collection<Class> {
        self.db.collection(CLASS_COLLECTION_NAME)
    }

    fn levels(&self) -> Collection<LevelInfo> {
        self.db.collection(LEVEL_COLLECTION_NAME)
    }

    fn volunteers(&self) -> Collection<Volunteer> {
        self.db.collection(VOLUNTEER_COLLECTION_NAME)
    }

    fn translations(&self) -> Collection<Translation> {
        self.db.collection(TRANSLATION_COLLECTION_NAME)
    }
}

#[async_trait]
impl UserStore for MongoStore {
    async fn insert_user(&self, user: &User) -> Result<(), StoreError> {
        self.users()
            .insert_one(user, None)
            .await
            .map_err(map_duplicate("identityId or email"))?;
        Ok(())
    }

    async fn find_user(&self, lookup: &UserLookup) -> Result<Option<User>, StoreError> {
        Ok(self
            .users()
            .find_one(user_lookup_filter(lookup), None)
            .await?)
    }

    async fn update_user(
        &self,
        id: Uuid,
        update: &UserUpdateData,
    ) -> Result<Option<User>, StoreError> {
        let set = user_set(update);
        if set.is_empty() {
            return self.find_user(&UserLookup::Id(id)).await;
        }

        self.users()
            .find_one_and_update(filter::by_id(id), doc! { "$set": set }, return_after())
            .await
            .map_err(map_duplicate("email"))
    }

    async fn delete_user(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        Ok(self
            .users()
            .find_one_and_delete(filter::by_id(id), None)
            .await?)
    }

    async fn add_enrollment(&self, user: Uuid, class: Uuid) -> Result<bool, StoreError> {
        let result = self
            .users()
            .update_one(
                filter::by_id(user),
                doc! { "$addToSet": { "enrolledClasses": class.to_string() } },
                None,
            )
            .await?;
        Ok(result.matched_count > 0)
    }

    async fn remove_enrollment(&self, user: Uuid, class: Uuid) -> Result<bool, StoreError> {
        let result = self
            .users()
            .update_one(
                filter::by_id(user),
                doc! { "$pull": { "enrolledClasses": class.to_string() } },
                None,
            )
            .await?;
        Ok(result.matched_count > 0)
    }

    async fn list_students(&self, query: &RosterQuery) -> Result<StudentPage, StoreError> {
        let mut cursor = self.users().aggregate(query.pipeline(), None).await?;

        let (items, total) = match cursor.try_next().await? {
            Some(facet) => read_student_facet(facet)?,
            None => (vec![], 0),
        };

        Ok(StudentPage {
            items,
            total,
            page: query.page,
            limit: query.limit,
        })
    }
}

#[async_trait]
impl ClassStore for MongoStore {
    async fn insert_class(&self, class: &Class) -> Result<(), StoreError> {
        self.classes().insert_one(class, None).await?;
        Ok(())
    }

    async fn find_class(&self, id: Uuid) -> Result<Option<Class>, StoreError> {
        Ok(self.classes().find_one(filter::by_id(id), None).await?)
    }

    async fn list_classes(&self, level: Option<ClassLevel>) -> Result<Vec<Class>, StoreError> {
        let filter = level.map(|level| doc! { "level": level });
        let options = FindOptions::builder()
            .sort(doc! { "createdAt": 1, "_id": 1 })
            .build();

        Ok(self
            .classes()
            .find(filter, options)
            .await?
            .try_collect()
            .await?)
    }

    async fn find_similar_classes(
        &self,
        level: ClassLevel,
        age_group: &str,
        instructor: &str,
    ) -> Result<Vec<Class>, StoreError> {
        let filter = doc! {
            "level": level,
            "ageGroup": age_group,
            "instructor": instructor,
        };

        Ok(self
            .classes()
            .find(filter, None)
            .await?
            .try_collect()
            .await?)
    }

    async fn update_class(
        &self,
        id: Uuid,
        update: &ClassUpdateData,
    ) -> Result<Option<Class>, StoreError> {
        let set = class_set(update)?;
        if set.is_empty() {
            return self.find_class(id).await;
        }

        Ok(self
            .classes()
            .find_one_and_update(filter::by_id(id), doc! { "$set": set }, return_after())
            .await?)
    }

    async fn delete_class(&self, id: Uuid) -> Result<Option<Class>, StoreError> {
        Ok(self
            .classes()
            .find_one_and_delete(filter::by_id(id), None)
            .await?)
    }

    async fn add_to_roster(&self, class: Uuid, user: Uuid) -> Result<bool, StoreError> {
        let result = self
            .classes()
            .update_one(
                filter::by_id(class),
                doc! { "$addToSet": { "roster": user.to_string() } },
                None,
            )
            .await?;
        Ok(result.matched_count > 0)
    }

    async fn remove_from_roster(&self, class: Uuid, user: Uuid) -> Result<bool, StoreError> {
        let result = self
            .classes()
            .update_one(
                filter::by_id(class),
                doc! { "$pull": { "roster": user.to_string() } },
                None,
            )
            .await?;
        Ok(result.matched_count > 0)
    }
}

#[async_trait]
impl LevelStore for MongoStore {
    async fn list_levels(&self) -> Result<Vec<LevelInfo>, StoreError> {
        let options = FindOptions::builder().sort(doc! { "number": 1 }).build();
        Ok(self
            .levels()
            .find(None, options)
            .await?
            .try_collect()
            .await?)
    }

    async fn find_level(&self, number: u32) -> Result<Option<LevelInfo>, StoreError> {
        Ok(self
            .levels()
            .find_one(doc! { "number": number as i64 }, None)
            .await?)
    }

    async fn insert_level(&self, level: &LevelInfo) -> Result<(), StoreError> {
        self.levels()
            .insert_one(level, None)
            .await
            .map_err(map_duplicate("level number"))?;
        Ok(())
    }

    async fn replace_level(&self, number: u32, level: &LevelInfo) -> Result<bool, StoreError> {
        let result = self
            .levels()
            .replace_one(doc! { "number": number as i64 }, level, None)
            .await
            .map_err(map_duplicate("level number"))?;
        Ok(result.matched_count > 0)
    }

    async fn delete_level(&self, number: u32) -> Result<Option<LevelInfo>, StoreError> {
        Ok(self
            .levels()
            .find_one_and_delete(doc! { "number": number as i64 }, None)
            .await?)
    }
}

#[async_trait]
impl VolunteerStore for MongoStore {
    async fn insert_volunteer(&self, volunteer: &Volunteer) -> Result<(), StoreError> {
        self.volunteers().insert_one(volunteer, None).await?;
        Ok(())
    }

    async fn list_volunteers(
        &self,
        status: Option<VolunteerStatus>,
    ) -> Result<Vec<Volunteer>, StoreError> {
        let filter = status.map(|status| doc! { "status": status.as_str() });
        let options = FindOptions::builder()
            .sort(doc! { "createdAt": -1, "_id": 1 })
            .build();

        Ok(self
            .volunteers()
            .find(filter, options)
            .await?
            .try_collect()
            .await?)
    }

    async fn set_volunteer_status(
        &self,
        id: Uuid,
        status: VolunteerStatus,
    ) -> Result<Option<Volunteer>, StoreError> {
        Ok(self
            .volunteers()
            .find_one_and_update(
                filter::by_id(id),
                doc! { "$set": { "status": status.as_str() } },
                return_after(),
            )
            .await?)
    }

    async fn delete_volunteer(&self, id: Uuid) -> Result<Option<Volunteer>, StoreError> {
        Ok(self
            .volunteers()
            .find_one_and_delete(filter::by_id(id), None)
            .await?)
    }
}

fn translation_filter(language: &str, namespace: &str, key: &str) -> Document {
    doc! { "language": language, "namespace": namespace, "key": key }
}

#[async_trait]
impl TranslationStore for MongoStore {
    async fn list_translations(
        &self,
        language: &str,
        namespace: &str,
    ) -> Result<Vec<Translation>, StoreError> {
        let options = FindOptions::builder().sort(doc! { "key": 1 }).build();
        Ok(self
            .translations()
            .find(doc! { "language": language, "namespace": namespace }, options)
            .await?
            .try_collect()
            .await?)
    }

    async fn upsert_translation(&self, translation: &Translation) -> Result<(), StoreError> {
        self.translations()
            .update_one(
                translation_filter(
                    &translation.language,
                    &translation.namespace,
                    &translation.key,
                ),
                doc! { "$set": { "value": translation.value.as_str() } },
                UpdateOptions::builder().upsert(true).build(),
            )
            .await?;
        Ok(())
    }

    async fn delete_translation(&self, key: &TranslationKey) -> Result<bool, StoreError> {
        let result = self
            .translations()
            .delete_one(
                translation_filter(&key.language, &key.namespace, &key.key),
                None,
            )
            .await?;
        Ok(result.deleted_count > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::role::Role;

    #[test]
    fn lookup_filters_normalize_input() {
        assert_eq!(
            user_lookup_filter(&UserLookup::Email(" Ada@Example.com ".to_string())),
            doc! { "email": "ada@example.com" }
        );
        let id = Uuid::new_v4();
        assert_eq!(
            user_lookup_filter(&UserLookup::Id(id)),
            doc! { "_id": id.to_string() }
        );
    }

    #[test]
    fn user_set_only_touches_profile_fields() {
        let update = UserUpdateData {
            last_name: Some(" Byron ".to_string()),
            phone: Some(" ".to_string()),
            role: Some(Role::Admin),
            ..Default::default()
        };
        assert_eq!(
            user_set(&update),
            doc! { "lastName": "Byron", "phone": Bson::Null, "role": "admin" }
        );
        assert!(user_set(&UserUpdateData::default()).is_empty());
    }

    #[test]
    fn class_set_keeps_level_shape() {
        let update = ClassUpdateData {
            level: Some(ClassLevel::Conversation),
            is_enrollment_open: Some(false),
            ..Default::default()
        };
        assert_eq!(
            class_set(&update).unwrap(),
            doc! { "level": "conversation", "isEnrollmentOpen": false }
        );
    }

    #[test]
    fn facet_output_is_read() {
        let id = Uuid::new_v4();
        let class = Uuid::new_v4();
        let facet = doc! {
            "items": [{
                "_id": id.to_string(),
                "identityId": "idp_1",
                "firstName": "Ann",
                "lastName": "Adams",
                "email": "ann@example.com",
                "role": "student",
                "enrolledClasses": [class.to_string()],
                "createdAt": "2024-01-01T00:00:00Z",
                "classes": [{
                    "_id": class.to_string(),
                    "level": 3_i32,
                    "ageGroup": "adult",
                    "instructor": "X",
                    "schedule": [{"day": "Mon", "startTime": "10:00", "endTime": "11:00"}],
                    "isEnrollmentOpen": true,
                }],
            }],
            "total": [{ "count": 7_i32 }],
        };

        let (items, total) = read_student_facet(facet).unwrap();
        assert_eq!(total, 7);
        assert_eq!(items[0].id, id);
        assert_eq!(items[0].classes[0].level, ClassLevel::Numeric(3));
        assert_eq!(items[0].classes[0].schedule[0].timezone, "UTC");

        let (items, total) = read_student_facet(doc! { "items": [], "total": [] }).unwrap();
        assert!(items.is_empty());
        assert_eq!(total, 0);
    }
}
