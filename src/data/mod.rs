pub mod catalog;
pub mod class;
pub mod level;
pub mod translation;
pub mod user;
pub mod volunteer;

/// Filters shared by the MongoDB queries. Ids are stored as strings.
pub mod filter {
    use bson::{doc, Document};
    use uuid::Uuid;

    #[inline]
    pub fn by_id(id: Uuid) -> Document {
        doc! { "_id": id.to_string() }
    }

    #[inline]
    pub fn by_ids<'a>(ids: impl IntoIterator<Item = &'a Uuid>) -> Document {
        let ids: Vec<String> = ids.into_iter().map(Uuid::to_string).collect();
        doc! { "_id": { "$in": ids } }
    }
}

/// Stores ids as their hyphenated string form.
///
/// The raw BSON serializer is not human readable, so a bare [`Uuid`](uuid::Uuid)
/// would land as binary and never match the string filters above.
pub mod id {
    use std::collections::BTreeSet;

    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};
    use uuid::Uuid;

    fn parse<E: Error>(value: &str) -> Result<Uuid, E> {
        Uuid::parse_str(value).map_err(E::custom)
    }

    pub mod string {
        use super::*;

        pub fn serialize<S: Serializer>(id: &Uuid, serializer: S) -> Result<S::Ok, S::Error> {
            serializer.collect_str(&id.hyphenated())
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Uuid, D::Error> {
            let value = String::deserialize(deserializer)?;
            parse(&value)
        }
    }

    pub mod string_set {
        use super::*;

        pub fn serialize<S: Serializer>(
            ids: &BTreeSet<Uuid>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            serializer.collect_seq(ids.iter().map(|it| it.hyphenated().to_string()))
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<BTreeSet<Uuid>, D::Error> {
            Vec::<String>::deserialize(deserializer)?
                .iter()
                .map(|it| parse(it))
                .collect()
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[derive(Debug, PartialEq, Serialize, Deserialize)]
        struct Doc {
            #[serde(rename = "_id", with = "string")]
            id: Uuid,
            #[serde(default, with = "string_set")]
            refs: BTreeSet<Uuid>,
        }

        #[test]
        fn raw_documents_hold_strings() {
            let doc = Doc {
                id: Uuid::new_v4(),
                refs: [Uuid::new_v4()].into_iter().collect(),
            };

            let raw = bson::to_raw_document_buf(&doc).unwrap();
            assert_eq!(raw.get_str("_id").unwrap(), doc.id.to_string());
            let refs = raw.get_array("refs").unwrap();
            assert!(refs.into_iter().all(|it| it.unwrap().as_str().is_some()));

            let back: Doc = bson::from_slice(raw.as_bytes()).unwrap();
            assert_eq!(back, doc);
        }

        #[test]
        fn missing_set_defaults_empty() {
            let id = Uuid::new_v4();
            let back: Doc = bson::from_document(bson::doc! { "_id": id.to_string() }).unwrap();
            assert_eq!(back.id, id);
            assert!(back.refs.is_empty());
        }
    }
}
