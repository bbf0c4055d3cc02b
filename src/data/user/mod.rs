use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::role::Role;

pub mod db;

pub static USER_COLLECTION_NAME: &str = "users";

/// An account, keyed by the identity provider's subject id.
///
/// `enrolled_classes` mirrors the `roster` of every class it references.
/// Only [`membership`](crate::membership) writes to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[serde(rename = "_id", with = "crate::data::id::string")]
    pub id: Uuid,
    pub identity_id: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub gender: Option<String>,
    #[serde(default)]
    pub age: Option<u32>,
    #[serde(default)]
    pub role: Role,
    #[serde(default, with = "crate::data::id::string_set")]
    pub enrolled_classes: BTreeSet<Uuid>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn new(
        identity_id: impl ToString,
        first_name: impl ToString,
        last_name: impl ToString,
        email: impl ToString,
    ) -> User {
        let id = Uuid::new_v4();
        tracing::debug!("Creating a new user with UUID: {}", id);

        User {
            id,
            identity_id: identity_id.to_string(),
            first_name: first_name.to_string(),
            last_name: last_name.to_string(),
            email: email.to_string().to_lowercase(),
            phone: None,
            gender: None,
            age: None,
            role: Role::Student,
            enrolled_classes: BTreeSet::new(),
            created_at: Utc::now(),
        }
    }

    pub fn with_role(mut self, role: Role) -> User {
        self.role = role;
        self
    }

    pub fn is_enrolled_in(&self, class: Uuid) -> bool {
        self.enrolled_classes.contains(&class)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stored_shape_uses_string_ids() {
        let mut user = User::new("idp_1", "Ada", "Lovelace", "Ada@Example.com");
        let class = Uuid::new_v4();
        user.enrolled_classes.insert(class);

        let doc = bson::to_document(&user).unwrap();
        assert_eq!(doc.get_str("_id").unwrap(), user.id.to_string());
        assert_eq!(doc.get_str("email").unwrap(), "ada@example.com");
        assert_eq!(doc.get_str("role").unwrap(), "student");
        assert_eq!(
            doc.get_array("enrolledClasses").unwrap()[0],
            bson::Bson::String(class.to_string())
        );

        let back: User = bson::from_document(doc).unwrap();
        assert_eq!(back, user);
    }

    #[test]
    fn missing_optional_fields_default() {
        let id = Uuid::new_v4();
        let doc = bson::doc! {
            "_id": id.to_string(),
            "identityId": "idp_2",
            "firstName": "Grace",
            "lastName": "Hopper",
            "email": "grace@example.com",
        };
        let user: User = bson::from_document(doc).unwrap();
        assert_eq!(user.id, id);
        assert_eq!(user.role, Role::Student);
        assert!(user.enrolled_classes.is_empty());
        assert!(user.phone.is_none());
    }
}
