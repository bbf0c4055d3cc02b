use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::resp::problem::{problems, Problem};

pub static TRANSLATION_COLLECTION_NAME: &str = "translations";

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
pub struct TranslationKey {
    pub language: String,
    pub namespace: String,
    pub key: String,
}

/// One UI string, unique per (language, namespace, key).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Translation {
    pub language: String,
    pub namespace: String,
    pub key: String,
    pub value: String,
}

impl Translation {
    pub fn validate(&self) -> Result<(), Problem> {
        let mut invalid = vec![];
        if !valid_segment(&self.language) {
            invalid.push("language");
        }
        if !valid_segment(&self.namespace) {
            invalid.push("namespace");
        }
        if self.key.trim().is_empty() {
            invalid.push("key");
        }

        if invalid.is_empty() {
            Ok(())
        } else {
            Err(problems::invalid_fields(&invalid))
        }
    }

    pub fn id(&self) -> TranslationKey {
        TranslationKey {
            language: self.language.clone(),
            namespace: self.namespace.clone(),
            key: self.key.clone(),
        }
    }
}

/// Languages and namespaces end up in URLs, so they stay plain.
fn valid_segment(value: &str) -> bool {
    !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn segments_must_be_plain() {
        let mut translation = Translation {
            language: "fa-IR".to_string(),
            namespace: "common".to_string(),
            key: "nav.home".to_string(),
            value: "خانه".to_string(),
        };
        assert!(translation.validate().is_ok());

        translation.namespace = "../etc".to_string();
        translation.key = " ".to_string();
        let problem = translation.validate().unwrap_err();
        assert_eq!(problem.body["fields"], serde_json::json!(["namespace", "key"]));
    }
}
