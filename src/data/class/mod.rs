use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::data::level::ClassLevel;

pub mod db;

pub static CLASS_COLLECTION_NAME: &str = "classes";

fn utc() -> String {
    "UTC".to_string()
}

fn true_bool() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleSlot {
    pub day: String,
    pub start_time: String,
    pub end_time: String,
    #[serde(default = "utc")]
    pub timezone: String,
}

impl ScheduleSlot {
    pub fn new(day: impl ToString, start_time: impl ToString, end_time: impl ToString) -> Self {
        ScheduleSlot {
            day: day.to_string(),
            start_time: start_time.to_string(),
            end_time: end_time.to_string(),
            timezone: utc(),
        }
    }

    /// Identity of a slot for duplicate detection; the timezone is not part of it.
    fn key(&self) -> (String, String, String) {
        (
            self.day.trim().to_ascii_lowercase(),
            self.start_time.trim().to_string(),
            self.end_time.trim().to_string(),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Class {
    #[serde(rename = "_id", with = "crate::data::id::string")]
    pub id: Uuid,
    #[schema(value_type = Object)]
    pub level: ClassLevel,
    pub age_group: String,
    pub instructor: String,
    #[serde(default)]
    pub schedule: Vec<ScheduleSlot>,
    /// Mirrors `enrolled_classes` of every user it references.
    #[serde(default, with = "crate::data::id::string_set")]
    pub roster: BTreeSet<Uuid>,
    #[serde(default = "true_bool")]
    pub is_enrollment_open: bool,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

/// What students and public listings see of a class. Never carries the roster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClassSummary {
    #[serde(rename = "_id", with = "crate::data::id::string")]
    pub id: Uuid,
    #[schema(value_type = Object)]
    pub level: ClassLevel,
    pub age_group: String,
    pub instructor: String,
    #[serde(default)]
    pub schedule: Vec<ScheduleSlot>,
    #[serde(default = "true_bool")]
    pub is_enrollment_open: bool,
    #[serde(default)]
    pub image: Option<String>,
}

impl Class {
    pub fn new(
        level: ClassLevel,
        age_group: impl ToString,
        instructor: impl ToString,
        schedule: Vec<ScheduleSlot>,
    ) -> Class {
        Class {
            id: Uuid::new_v4(),
            level,
            age_group: age_group.to_string(),
            instructor: instructor.to_string(),
            schedule,
            roster: BTreeSet::new(),
            is_enrollment_open: true,
            image: None,
            created_at: Utc::now(),
        }
    }

    pub fn summary(&self) -> ClassSummary {
        ClassSummary {
            id: self.id,
            level: self.level,
            age_group: self.age_group.clone(),
            instructor: self.instructor.clone(),
            schedule: self.schedule.clone(),
            is_enrollment_open: self.is_enrollment_open,
            image: self.image.clone(),
        }
    }

    pub fn schedule_set(&self) -> BTreeSet<(String, String, String)> {
        self.schedule.iter().map(ScheduleSlot::key).collect()
    }

    /// Same (level, age group, instructor) and the same slots in any order.
    pub fn duplicates(&self, other: &Class) -> bool {
        self.level == other.level
            && self.age_group.trim() == other.age_group.trim()
            && self.instructor.trim() == other.instructor.trim()
            && self.schedule_set() == other.schedule_set()
    }
}

impl From<&Class> for ClassSummary {
    fn from(class: &Class) -> Self {
        class.summary()
    }
}
