use utoipa::ToSchema;
use uuid::Uuid;

use crate::resp::problem::{problems, Problem};
use crate::role::Role;
use crate::util::non_blank;

use super::User;

pub mod problem {
    use crate::resp::problem::{problems, Problem};
    use uuid::Uuid;

    #[inline]
    pub fn not_found(id: Uuid) -> Problem {
        problems::not_found("User", id)
    }

    #[inline]
    pub fn email_taken(existing: Uuid) -> Problem {
        problems::conflict("Email already registered.", existing)
    }

    #[inline]
    pub fn already_provisioned(existing: Uuid) -> Problem {
        problems::conflict("Identity already has an account.", existing)
    }

    #[inline]
    pub fn not_provisioned() -> Problem {
        problems::unauthorized("Identity has no account. Sign up first.")
    }
}

/// How a single user can be looked up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserLookup {
    Id(Uuid),
    IdentityId(String),
    Email(String),
    Phone(String),
}

impl std::fmt::Display for UserLookup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UserLookup::Id(id) => write!(f, "{}", id),
            UserLookup::IdentityId(it) => write!(f, "identity:{}", it),
            UserLookup::Email(it) => write!(f, "email:{}", it),
            UserLookup::Phone(it) => write!(f, "phone:{}", it),
        }
    }
}

#[derive(Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserSignupData {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub gender: Option<String>,
    #[serde(default)]
    pub age: Option<u32>,
}

impl std::fmt::Debug for UserSignupData {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "UserSignupData:{}", self.email)
    }
}

fn valid_email(email: &str) -> bool {
    match email.trim().split_once('@') {
        Some((local, domain)) => !local.is_empty() && domain.contains('.'),
        None => false,
    }
}

impl UserSignupData {
    pub fn validate(&self) -> Result<(), Problem> {
        let mut invalid = vec![];
        if non_blank(Some(&self.first_name)).is_none() {
            invalid.push("firstName");
        }
        if non_blank(Some(&self.last_name)).is_none() {
            invalid.push("lastName");
        }
        if !valid_email(&self.email) {
            invalid.push("email");
        }
        if matches!(self.age, Some(age) if age > 150) {
            invalid.push("age");
        }

        if invalid.is_empty() {
            Ok(())
        } else {
            Err(problems::invalid_fields(&invalid))
        }
    }

    pub fn into_user(self, identity_id: impl ToString) -> User {
        let mut user = User::new(
            identity_id,
            self.first_name.trim(),
            self.last_name.trim(),
            self.email.trim(),
        );
        user.phone = non_blank(self.phone.as_deref()).map(String::from);
        user.gender = non_blank(self.gender.as_deref()).map(String::from);
        user.age = self.age;
        user
    }
}

/// Partial profile update; absent fields are left untouched.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserUpdateData {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub gender: Option<String>,
    pub age: Option<u32>,
    pub role: Option<Role>,
}

impl UserUpdateData {
    pub fn validate(&self) -> Result<(), Problem> {
        let mut invalid = vec![];
        if matches!(&self.first_name, Some(it) if it.trim().is_empty()) {
            invalid.push("firstName");
        }
        if matches!(&self.last_name, Some(it) if it.trim().is_empty()) {
            invalid.push("lastName");
        }
        if matches!(&self.email, Some(it) if !valid_email(it)) {
            invalid.push("email");
        }
        if matches!(self.age, Some(age) if age > 150) {
            invalid.push("age");
        }

        if invalid.is_empty() {
            Ok(())
        } else {
            Err(problems::invalid_fields(&invalid))
        }
    }

    pub fn is_empty(&self) -> bool {
        self.first_name.is_none()
            && self.last_name.is_none()
            && self.email.is_none()
            && self.phone.is_none()
            && self.gender.is_none()
            && self.age.is_none()
            && self.role.is_none()
    }

    /// Applies the update in place. Never touches `enrolled_classes`.
    pub fn apply(&self, user: &mut User) {
        if let Some(it) = &self.first_name {
            user.first_name = it.trim().to_string();
        }
        if let Some(it) = &self.last_name {
            user.last_name = it.trim().to_string();
        }
        if let Some(it) = &self.email {
            user.email = it.trim().to_lowercase();
        }
        if let Some(it) = &self.phone {
            user.phone = non_blank(Some(it)).map(String::from);
        }
        if let Some(it) = &self.gender {
            user.gender = non_blank(Some(it)).map(String::from);
        }
        if let Some(age) = self.age {
            user.age = Some(age);
        }
        if let Some(role) = self.role {
            user.role = role;
        }
    }
}
