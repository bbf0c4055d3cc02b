use std::collections::{BTreeMap, HashMap, HashSet};

use rocket::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{ClassStore, LevelStore, StoreError, TranslationStore, UserStore, VolunteerStore};
use crate::data::catalog::LevelInfo;
use crate::data::class::db::ClassUpdateData;
use crate::data::class::Class;
use crate::data::level::ClassLevel;
use crate::data::translation::{Translation, TranslationKey};
use crate::data::user::db::{UserLookup, UserUpdateData};
use crate::data::user::User;
use crate::data::volunteer::{Volunteer, VolunteerStatus};
use crate::roster::{RosterQuery, StudentPage, StudentWithClasses};

#[derive(Debug, Default)]
struct Collections {
    users: HashMap<Uuid, User>,
    classes: HashMap<Uuid, Class>,
    levels: BTreeMap<u32, LevelInfo>,
    volunteers: HashMap<Uuid, Volunteer>,
    translations: BTreeMap<TranslationKey, Translation>,

    /// Ids whose enrollment/roster writes fail, for exercising partial failures.
    failing: HashSet<Uuid>,
}

impl Collections {
    fn check_writable(&self, id: Uuid) -> Result<(), StoreError> {
        if self.failing.contains(&id) {
            return Err(StoreError::Unavailable(format!("write to {} failed", id)));
        }
        Ok(())
    }

    fn find_user(&self, lookup: &UserLookup) -> Option<&User> {
        match lookup {
            UserLookup::Id(id) => self.users.get(id),
            UserLookup::IdentityId(identity) => {
                self.users.values().find(|it| &it.identity_id == identity)
            }
            UserLookup::Email(email) => {
                let email = email.trim().to_lowercase();
                self.users.values().find(|it| it.email == email)
            }
            UserLookup::Phone(phone) => self
                .users
                .values()
                .find(|it| it.phone.as_deref() == Some(phone.trim())),
        }
    }
}

/// Entity store kept in process memory. Same semantics as [`MongoStore`](super::MongoStore),
/// including unique identity/email and level numbers.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<Collections>,
}

impl MemoryStore {
    pub fn new() -> MemoryStore {
        MemoryStore::default()
    }

    /// Makes every enrollment or roster write touching `id` fail until
    /// [`heal`](Self::heal) is called.
    #[cfg(test)]
    pub async fn fail_writes_for(&self, id: Uuid) {
        self.inner.write().await.failing.insert(id);
    }

    #[cfg(test)]
    pub async fn heal(&self) {
        self.inner.write().await.failing.clear();
    }

    /// Every user and class, for checking cross-document invariants.
    #[cfg(test)]
    pub async fn snapshot(&self) -> (Vec<User>, Vec<Class>) {
        let inner = self.inner.read().await;
        (
            inner.users.values().cloned().collect(),
            inner.classes.values().cloned().collect(),
        )
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn insert_user(&self, user: &User) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        if inner.find_user(&UserLookup::IdentityId(user.identity_id.clone())).is_some() {
            return Err(StoreError::Duplicate("identityId"));
        }
        if inner.find_user(&UserLookup::Email(user.email.clone())).is_some() {
            return Err(StoreError::Duplicate("email"));
        }
        inner.users.insert(user.id, user.clone());
        Ok(())
    }

    async fn find_user(&self, lookup: &UserLookup) -> Result<Option<User>, StoreError> {
        Ok(self.inner.read().await.find_user(lookup).cloned())
    }

    async fn update_user(
        &self,
        id: Uuid,
        update: &UserUpdateData,
    ) -> Result<Option<User>, StoreError> {
        let mut inner = self.inner.write().await;
        if let Some(email) = &update.email {
            let taken = inner
                .find_user(&UserLookup::Email(email.clone()))
                .map_or(false, |other| other.id != id);
            if taken {
                return Err(StoreError::Duplicate("email"));
            }
        }

        Ok(inner.users.get_mut(&id).map(|user| {
            update.apply(user);
            user.clone()
        }))
    }

    async fn delete_user(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        Ok(self.inner.write().await.users.remove(&id))
    }

    async fn add_enrollment(&self, user: Uuid, class: Uuid) -> Result<bool, StoreError> {
        let mut inner = self.inner.write().await;
        inner.check_writable(user)?;
        Ok(match inner.users.get_mut(&user) {
            Some(it) => {
                it.enrolled_classes.insert(class);
                true
            }
            None => false,
        })
    }

    async fn remove_enrollment(&self, user: Uuid, class: Uuid) -> Result<bool, StoreError> {
        let mut inner = self.inner.write().await;
        inner.check_writable(user)?;
        Ok(match inner.users.get_mut(&user) {
            Some(it) => {
                it.enrolled_classes.remove(&class);
                true
            }
            None => false,
        })
    }

    async fn list_students(&self, query: &RosterQuery) -> Result<StudentPage, StoreError> {
        let inner = self.inner.read().await;
        let students = inner.users.values().map(|user| {
            let classes = user
                .enrolled_classes
                .iter()
                .filter_map(|id| inner.classes.get(id));
            StudentWithClasses::join(user, classes)
        });

        query
            .apply(students)
            .map_err(|e| StoreError::Query(e.to_string()))
    }
}

#[async_trait]
impl ClassStore for MemoryStore {
    async fn insert_class(&self, class: &Class) -> Result<(), StoreError> {
        self.inner
            .write()
            .await
            .classes
            .insert(class.id, class.clone());
        Ok(())
    }

    async fn find_class(&self, id: Uuid) -> Result<Option<Class>, StoreError> {
        Ok(self.inner.read().await.classes.get(&id).cloned())
    }

    async fn list_classes(&self, level: Option<ClassLevel>) -> Result<Vec<Class>, StoreError> {
        let inner = self.inner.read().await;
        let mut classes: Vec<Class> = inner
            .classes
            .values()
            .filter(|it| level.map_or(true, |level| it.level == level))
            .cloned()
            .collect();
        classes.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(classes)
    }

    async fn find_similar_classes(
        &self,
        level: ClassLevel,
        age_group: &str,
        instructor: &str,
    ) -> Result<Vec<Class>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .classes
            .values()
            .filter(|it| {
                it.level == level && it.age_group == age_group && it.instructor == instructor
            })
            .cloned()
            .collect())
    }

    async fn update_class(
        &self,
        id: Uuid,
        update: &ClassUpdateData,
    ) -> Result<Option<Class>, StoreError> {
        let mut inner = self.inner.write().await;
        Ok(inner.classes.get_mut(&id).map(|class| {
            update.apply(class);
            class.clone()
        }))
    }

    async fn delete_class(&self, id: Uuid) -> Result<Option<Class>, StoreError> {
        Ok(self.inner.write().await.classes.remove(&id))
    }

    async fn add_to_roster(&self, class: Uuid, user: Uuid) -> Result<bool, StoreError> {
        let mut inner = self.inner.write().await;
        inner.check_writable(class)?;
        Ok(match inner.classes.get_mut(&class) {
            Some(it) => {
                it.roster.insert(user);
                true
            }
            None => false,
        })
    }

    async fn remove_from_roster(&self, class: Uuid, user: Uuid) -> Result<bool, StoreError> {
        let mut inner = self.inner.write().await;
        inner.check_writable(class)?;
        Ok(match inner.classes.get_mut(&class) {
            Some(it) => {
                it.roster.remove(&user);
                true
            }
            None => false,
        })
    }
}

#[async_trait]
impl LevelStore for MemoryStore {
    async fn list_levels(&self) -> Result<Vec<LevelInfo>, StoreError> {
        Ok(self.inner.read().await.levels.values().cloned().collect())
    }

    async fn find_level(&self, number: u32) -> Result<Option<LevelInfo>, StoreError> {
        Ok(self.inner.read().await.levels.get(&number).cloned())
    }

    async fn insert_level(&self, level: &LevelInfo) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        if inner.levels.contains_key(&level.number) {
            return Err(StoreError::Duplicate("level number"));
        }
        inner.levels.insert(level.number, level.clone());
        Ok(())
    }

    async fn replace_level(&self, number: u32, level: &LevelInfo) -> Result<bool, StoreError> {
        let mut inner = self.inner.write().await;
        if !inner.levels.contains_key(&number) {
            return Ok(false);
        }
        if number != level.number && inner.levels.contains_key(&level.number) {
            return Err(StoreError::Duplicate("level number"));
        }
        inner.levels.remove(&number);
        inner.levels.insert(level.number, level.clone());
        Ok(true)
    }

    async fn delete_level(&self, number: u32) -> Result<Option<LevelInfo>, StoreError> {
        Ok(self.inner.write().await.levels.remove(&number))
    }
}

#[async_trait]
impl VolunteerStore for MemoryStore {
    async fn insert_volunteer(&self, volunteer: &Volunteer) -> Result<(), StoreError> {
        self.inner
            .write()
            .await
            .volunteers
            .insert(volunteer.id, volunteer.clone());
        Ok(())
    }

    async fn list_volunteers(
        &self,
        status: Option<VolunteerStatus>,
    ) -> Result<Vec<Volunteer>, StoreError> {
        let inner = self.inner.read().await;
        let mut volunteers: Vec<Volunteer> = inner
            .volunteers
            .values()
            .filter(|it| status.map_or(true, |status| it.status == status))
            .cloned()
            .collect();
        volunteers.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        Ok(volunteers)
    }

    async fn set_volunteer_status(
        &self,
        id: Uuid,
        status: VolunteerStatus,
    ) -> Result<Option<Volunteer>, StoreError> {
        let mut inner = self.inner.write().await;
        Ok(inner.volunteers.get_mut(&id).map(|it| {
            it.status = status;
            it.clone()
        }))
    }

    async fn delete_volunteer(&self, id: Uuid) -> Result<Option<Volunteer>, StoreError> {
        Ok(self.inner.write().await.volunteers.remove(&id))
    }
}

#[async_trait]
impl TranslationStore for MemoryStore {
    async fn list_translations(
        &self,
        language: &str,
        namespace: &str,
    ) -> Result<Vec<Translation>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .translations
            .values()
            .filter(|it| it.language == language && it.namespace == namespace)
            .cloned()
            .collect())
    }

    async fn upsert_translation(&self, translation: &Translation) -> Result<(), StoreError> {
        self.inner
            .write()
            .await
            .translations
            .insert(translation.id(), translation.clone());
        Ok(())
    }

    async fn delete_translation(&self, key: &TranslationKey) -> Result<bool, StoreError> {
        Ok(self.inner.write().await.translations.remove(key).is_some())
    }
}
