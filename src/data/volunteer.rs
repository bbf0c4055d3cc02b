use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::resp::problem::{problems, Problem};
use crate::util::non_blank;

pub static VOLUNTEER_COLLECTION_NAME: &str = "volunteers";

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum VolunteerStatus {
    Pending,
    Approved,
    Rejected,
}

impl VolunteerStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            VolunteerStatus::Pending => "pending",
            VolunteerStatus::Approved => "approved",
            VolunteerStatus::Rejected => "rejected",
        }
    }
}

impl Default for VolunteerStatus {
    fn default() -> Self {
        VolunteerStatus::Pending
    }
}

impl FromStr for VolunteerStatus {
    type Err = Problem;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(VolunteerStatus::Pending),
            "approved" => Ok(VolunteerStatus::Approved),
            "rejected" => Ok(VolunteerStatus::Rejected),
            _ => Err(problems::invalid_fields(&["status"])),
        }
    }
}

/// A volunteer application. Unrelated to accounts and classes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Volunteer {
    #[serde(rename = "_id", with = "crate::data::id::string")]
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub languages: Vec<String>,
    #[serde(default)]
    pub availability: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub status: VolunteerStatus,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct VolunteerApplication {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub languages: Vec<String>,
    #[serde(default)]
    pub availability: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl VolunteerApplication {
    pub fn validate(&self) -> Result<(), Problem> {
        let mut invalid = vec![];
        if non_blank(Some(&self.first_name)).is_none() {
            invalid.push("firstName");
        }
        if non_blank(Some(&self.last_name)).is_none() {
            invalid.push("lastName");
        }
        if !self.email.contains('@') {
            invalid.push("email");
        }

        if invalid.is_empty() {
            Ok(())
        } else {
            Err(problems::invalid_fields(&invalid))
        }
    }

    pub fn into_volunteer(self) -> Volunteer {
        Volunteer {
            id: Uuid::new_v4(),
            first_name: self.first_name.trim().to_string(),
            last_name: self.last_name.trim().to_string(),
            email: self.email.trim().to_lowercase(),
            phone: non_blank(self.phone.as_deref()).map(String::from),
            languages: self.languages,
            availability: non_blank(self.availability.as_deref()).map(String::from),
            message: non_blank(self.message.as_deref()).map(String::from),
            status: VolunteerStatus::Pending,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct VolunteerStatusUpdate {
    pub status: VolunteerStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn applications_start_pending() {
        let application: VolunteerApplication = serde_json::from_value(serde_json::json!({
            "firstName": "Lin",
            "lastName": "Wei",
            "email": "Lin@Example.com",
            "languages": ["zh", "en"]
        }))
        .unwrap();
        assert!(application.validate().is_ok());

        let volunteer = application.into_volunteer();
        assert_eq!(volunteer.status, VolunteerStatus::Pending);
        assert_eq!(volunteer.email, "lin@example.com");
    }

    #[test]
    fn status_parses_case_insensitively() {
        assert_eq!(
            "Approved".parse::<VolunteerStatus>().unwrap(),
            VolunteerStatus::Approved
        );
        assert!("maybe".parse::<VolunteerStatus>().is_err());
    }
}
