use chrono::NaiveTime;
use serde::Deserialize;
use utoipa::ToSchema;

use super::{Class, ScheduleSlot};
use crate::data::level::ClassLevel;
use crate::resp::problem::{problems, Problem};
use crate::util::non_blank;

pub mod problem {
    use crate::resp::problem::{problems, Problem};
    use rocket::http::Status;
    use uuid::Uuid;

    #[inline]
    pub fn not_found(id: Uuid) -> Problem {
        problems::not_found("Class", id)
    }

    #[inline]
    pub fn duplicate_schedule(existing: Uuid) -> Problem {
        problems::conflict(
            "A class with the same level, age group, instructor and schedule already exists.",
            existing,
        )
    }

    #[inline]
    pub fn enrollment_closed(id: Uuid) -> Problem {
        Problem::new_untyped(Status::Forbidden, "Enrollment is closed.")
            .insert_str("classId", id)
            .to_owned()
    }
}

fn parse_time(value: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(value.trim(), "%H:%M").ok()
}

fn validate_schedule(schedule: &[ScheduleSlot], invalid: &mut Vec<&'static str>) {
    if schedule.is_empty() {
        invalid.push("schedule");
        return;
    }
    for slot in schedule {
        let times = parse_time(&slot.start_time).zip(parse_time(&slot.end_time));
        let ordered = matches!(times, Some((start, end)) if start < end);
        if non_blank(Some(&slot.day)).is_none() || !ordered || slot.timezone.trim().is_empty() {
            invalid.push("schedule");
            return;
        }
    }
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClassCreateData {
    #[schema(value_type = Object)]
    pub level: ClassLevel,
    pub age_group: String,
    pub instructor: String,
    pub schedule: Vec<ScheduleSlot>,
    #[serde(default)]
    pub is_enrollment_open: Option<bool>,
    #[serde(default)]
    pub image: Option<String>,
}

impl ClassCreateData {
    pub fn validate(&self) -> Result<(), Problem> {
        let mut invalid = vec![];
        if non_blank(Some(&self.age_group)).is_none() {
            invalid.push("ageGroup");
        }
        if non_blank(Some(&self.instructor)).is_none() {
            invalid.push("instructor");
        }
        validate_schedule(&self.schedule, &mut invalid);

        if invalid.is_empty() {
            Ok(())
        } else {
            Err(problems::invalid_fields(&invalid))
        }
    }

    pub fn into_class(self) -> Class {
        let mut class = Class::new(
            self.level,
            self.age_group.trim(),
            self.instructor.trim(),
            self.schedule,
        );
        if let Some(open) = self.is_enrollment_open {
            class.is_enrollment_open = open;
        }
        class.image = non_blank(self.image.as_deref()).map(String::from);
        class
    }
}

/// Admin edit of a class. The roster is deliberately absent: it only
/// changes through enrollment.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClassUpdateData {
    #[schema(value_type = Object)]
    pub level: Option<ClassLevel>,
    pub age_group: Option<String>,
    pub instructor: Option<String>,
    pub schedule: Option<Vec<ScheduleSlot>>,
    pub is_enrollment_open: Option<bool>,
    pub image: Option<String>,
}

impl ClassUpdateData {
    pub fn validate(&self) -> Result<(), Problem> {
        let mut invalid = vec![];
        if matches!(&self.age_group, Some(it) if it.trim().is_empty()) {
            invalid.push("ageGroup");
        }
        if matches!(&self.instructor, Some(it) if it.trim().is_empty()) {
            invalid.push("instructor");
        }
        if let Some(schedule) = &self.schedule {
            validate_schedule(schedule, &mut invalid);
        }

        if invalid.is_empty() {
            Ok(())
        } else {
            Err(problems::invalid_fields(&invalid))
        }
    }

    pub fn apply(&self, class: &mut Class) {
        if let Some(level) = self.level {
            class.level = level;
        }
        if let Some(it) = &self.age_group {
            class.age_group = it.trim().to_string();
        }
        if let Some(it) = &self.instructor {
            class.instructor = it.trim().to_string();
        }
        if let Some(schedule) = &self.schedule {
            class.schedule = schedule.clone();
        }
        if let Some(open) = self.is_enrollment_open {
            class.is_enrollment_open = open;
        }
        if let Some(it) = &self.image {
            class.image = non_blank(Some(it)).map(String::from);
        }
    }
}
