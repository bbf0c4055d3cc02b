use std::fmt;
use std::str::FromStr;

use bson::Bson;
use serde::de::{self, Visitor};
use serde::{Deserializer, Serializer};

pub const CONVERSATION: &str = "conversation";
pub const IELTS: &str = "ielts";

/// Level a class teaches at.
///
/// Stored as a plain number for numbered levels and as a sentinel string for
/// the two tracks, so `{"level": 3}` and `{"level": "ielts"}` are both valid
/// documents.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub enum ClassLevel {
    Numeric(u32),
    Conversation,
    Ielts,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidLevel(pub String);

impl fmt::Display for InvalidLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "'{}' is neither a level number nor one of '{}', '{}'",
            self.0, CONVERSATION, IELTS
        )
    }
}

impl std::error::Error for InvalidLevel {}

impl ClassLevel {
    pub fn number(self) -> Option<u32> {
        match self {
            ClassLevel::Numeric(n) => Some(n),
            _ => None,
        }
    }
}

impl FromStr for ClassLevel {
    type Err = InvalidLevel;

    /// Numeric-looking input becomes a numbered level, anything else must name a track.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if let Ok(n) = trimmed.parse::<u32>() {
            return Ok(ClassLevel::Numeric(n));
        }
        match trimmed.to_ascii_lowercase().as_str() {
            CONVERSATION => Ok(ClassLevel::Conversation),
            IELTS => Ok(ClassLevel::Ielts),
            _ => Err(InvalidLevel(s.to_string())),
        }
    }
}

impl fmt::Display for ClassLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClassLevel::Numeric(n) => write!(f, "{}", n),
            ClassLevel::Conversation => f.write_str(CONVERSATION),
            ClassLevel::Ielts => f.write_str(IELTS),
        }
    }
}

impl From<ClassLevel> for Bson {
    fn from(level: ClassLevel) -> Self {
        match level {
            ClassLevel::Numeric(n) => Bson::Int64(n as i64),
            ClassLevel::Conversation => Bson::String(CONVERSATION.to_string()),
            ClassLevel::Ielts => Bson::String(IELTS.to_string()),
        }
    }
}

impl serde::Serialize for ClassLevel {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            ClassLevel::Numeric(n) => serializer.serialize_i64(*n as i64),
            ClassLevel::Conversation => serializer.serialize_str(CONVERSATION),
            ClassLevel::Ielts => serializer.serialize_str(IELTS),
        }
    }
}

struct ClassLevelVisitor;

impl<'de> Visitor<'de> for ClassLevelVisitor {
    type Value = ClassLevel;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "a level number or one of '{}', '{}'", CONVERSATION, IELTS)
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
        u32::try_from(v)
            .map(ClassLevel::Numeric)
            .map_err(|_| E::custom(format!("level {} out of range", v)))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
        u32::try_from(v)
            .map(ClassLevel::Numeric)
            .map_err(|_| E::custom(format!("level {} out of range", v)))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Self::Value, E> {
        if v.fract() == 0.0 && v >= 0.0 && v <= u32::MAX as f64 {
            Ok(ClassLevel::Numeric(v as u32))
        } else {
            Err(E::custom(format!("level {} is not a whole number", v)))
        }
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
        v.parse().map_err(E::custom)
    }
}

impl<'de> serde::Deserialize<'de> for ClassLevel {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(ClassLevelVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_numbers_and_tracks() {
        assert_eq!("3".parse::<ClassLevel>().unwrap(), ClassLevel::Numeric(3));
        assert_eq!(" 12 ".parse::<ClassLevel>().unwrap(), ClassLevel::Numeric(12));
        assert_eq!(
            "Conversation".parse::<ClassLevel>().unwrap(),
            ClassLevel::Conversation
        );
        assert_eq!("ielts".parse::<ClassLevel>().unwrap(), ClassLevel::Ielts);
        assert!("advanced".parse::<ClassLevel>().is_err());
        assert!("-1".parse::<ClassLevel>().is_err());
    }

    #[test]
    fn json_shape_keeps_numbers_numeric() {
        assert_eq!(serde_json::to_value(ClassLevel::Numeric(3)).unwrap(), json!(3));
        assert_eq!(serde_json::to_value(ClassLevel::Ielts).unwrap(), json!("ielts"));

        let level: ClassLevel = serde_json::from_value(json!(4)).unwrap();
        assert_eq!(level, ClassLevel::Numeric(4));
        let level: ClassLevel = serde_json::from_value(json!("conversation")).unwrap();
        assert_eq!(level, ClassLevel::Conversation);
        let level: ClassLevel = serde_json::from_value(json!("2")).unwrap();
        assert_eq!(level, ClassLevel::Numeric(2));
        assert!(serde_json::from_value::<ClassLevel>(json!(2.5)).is_err());
    }

    #[test]
    fn bson_values_match_storage_shape() {
        assert_eq!(Bson::from(ClassLevel::Numeric(3)), Bson::Int64(3));
        assert_eq!(
            Bson::from(ClassLevel::Conversation),
            Bson::String("conversation".to_string())
        );

        let doc = bson::doc! { "level": 5_i32 };
        let level: ClassLevel = bson::from_bson(doc.get("level").unwrap().clone()).unwrap();
        assert_eq!(level, ClassLevel::Numeric(5));
    }
}
