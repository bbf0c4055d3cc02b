use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::resp::problem::{problems, Problem};
use crate::util::non_blank;

pub static LEVEL_COLLECTION_NAME: &str = "levels";

pub mod problem {
    use crate::resp::problem::{problems, Problem};
    use uuid::Uuid;

    #[inline]
    pub fn not_found(number: u32) -> Problem {
        problems::not_found("Level", number)
    }

    #[inline]
    pub fn number_taken(existing: Uuid) -> Problem {
        problems::conflict("A level with this number already exists.", existing)
    }
}

/// Catalog metadata for a numbered level. Classes reference the number, not
/// this record, so editing or removing it leaves classes untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LevelInfo {
    #[serde(rename = "_id", with = "crate::data::id::string")]
    pub id: Uuid,
    pub number: u32,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub skills: Vec<String>,
    #[serde(default)]
    pub image: Option<String>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LevelData {
    pub number: u32,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub skills: Vec<String>,
    #[serde(default)]
    pub image: Option<String>,
}

impl LevelData {
    pub fn validate(&self) -> Result<(), Problem> {
        let mut invalid = vec![];
        if self.number == 0 {
            invalid.push("number");
        }
        if non_blank(Some(&self.name)).is_none() {
            invalid.push("name");
        }
        if self.skills.iter().any(|it| it.trim().is_empty()) {
            invalid.push("skills");
        }

        if invalid.is_empty() {
            Ok(())
        } else {
            Err(problems::invalid_fields(&invalid))
        }
    }

    /// Builds the stored record, reusing `id` when replacing an existing level.
    pub fn into_level(self, id: Option<Uuid>) -> LevelInfo {
        LevelInfo {
            id: id.unwrap_or_else(Uuid::new_v4),
            number: self.number,
            name: self.name.trim().to_string(),
            description: self.description.trim().to_string(),
            skills: self.skills.iter().map(|it| it.trim().to_string()).collect(),
            image: non_blank(self.image.as_deref()).map(String::from),
        }
    }
}
