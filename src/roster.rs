//! Paginated student listing joined with the classes each student attends.
//!
//! The MongoDB backend runs [`RosterQuery::pipeline`] as a single aggregation;
//! the in-memory backend runs [`RosterQuery::apply`]. Both use the same
//! predicate, sort key and window so `total` always counts distinct students
//! matching every filter.

use std::cmp::Ordering;
use std::collections::BTreeSet;

use bson::{doc, Bson, Document};
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::data::class::{Class, ClassSummary, CLASS_COLLECTION_NAME};
use crate::data::level::ClassLevel;
use crate::data::user::User;
use crate::role::Role;

pub const DEFAULT_LIMIT: u64 = 20;
pub const MAX_LIMIT: u64 = 200;
pub const MAX_QUERY_LEN: usize = 100;

/// User fields searched by the text query.
const USER_SEARCH_FIELDS: [&str; 3] = ["firstName", "lastName", "email"];
/// Joined class fields searched by the text query.
const CLASS_SEARCH_FIELDS: [&str; 2] = ["classes.instructor", "classes.ageGroup"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RosterQuery {
    pub page: u64,
    pub limit: u64,
    pub level: Option<ClassLevel>,
    pub text: Option<String>,
}

impl Default for RosterQuery {
    fn default() -> Self {
        RosterQuery::new(1, DEFAULT_LIMIT as i64)
    }
}

impl RosterQuery {
    /// Clamps `limit` into `1..=MAX_LIMIT` and `page` to at least 1, and low
    /// enough that the skipped row count still fits an `i64`.
    pub fn new(page: i64, limit: i64) -> RosterQuery {
        let limit = limit.clamp(1, MAX_LIMIT as i64);
        let page = page.clamp(1, i64::MAX / limit);

        RosterQuery {
            page: page as u64,
            limit: limit as u64,
            level: None,
            text: None,
        }
    }

    pub fn with_level(mut self, level: ClassLevel) -> RosterQuery {
        self.level = Some(level);
        self
    }

    /// Blank queries are dropped.
    pub fn with_text(mut self, text: impl AsRef<str>) -> RosterQuery {
        let text = text.as_ref().trim();
        self.text = if text.is_empty() {
            None
        } else {
            Some(text.to_string())
        };
        self
    }

    pub fn skip(&self) -> u64 {
        (self.page - 1).saturating_mul(self.limit)
    }

    /// The text query with every regex metacharacter escaped, so it only ever
    /// matches as a literal substring.
    pub fn pattern(&self) -> Option<String> {
        self.text.as_deref().map(regex::escape)
    }

    pub fn matcher(&self) -> Result<Option<Regex>, regex::Error> {
        self.pattern()
            .map(|pattern| RegexBuilder::new(&pattern).case_insensitive(true).build())
            .transpose()
    }

    /// Aggregation over the user collection producing one document
    /// `{items: [..], total: [{count}]}`.
    pub fn pipeline(&self) -> Vec<Document> {
        let mut pipeline = vec![
            doc! { "$match": { "role": Role::Student.as_str() } },
            doc! {
                "$lookup": {
                    "from": CLASS_COLLECTION_NAME,
                    "let": { "enrolled": { "$ifNull": ["$enrolledClasses", []] } },
                    "pipeline": [
                        { "$match": { "$expr": { "$in": ["$_id", "$$enrolled"] } } },
                        {
                            "$project": {
                                "level": 1,
                                "ageGroup": 1,
                                "instructor": 1,
                                "schedule": 1,
                                "isEnrollmentOpen": 1,
                                "image": 1,
                            }
                        },
                    ],
                    "as": "classes",
                }
            },
        ];

        if let Some(pattern) = self.pattern() {
            let regex = doc! { "$regex": pattern, "$options": "i" };
            let clauses: Vec<Bson> = USER_SEARCH_FIELDS
                .iter()
                .chain(CLASS_SEARCH_FIELDS.iter())
                .map(|field| {
                    let mut clause = Document::new();
                    clause.insert(*field, regex.clone());
                    Bson::Document(clause)
                })
                .collect();
            pipeline.push(doc! { "$match": { "$or": clauses } });
        }

        if let Some(level) = self.level {
            pipeline.push(doc! { "$match": { "classes.level": Bson::from(level) } });
        }

        pipeline.push(doc! { "$sort": { "lastName": 1, "firstName": 1, "_id": 1 } });
        let skip = i64::try_from(self.skip()).unwrap_or(i64::MAX);
        pipeline.push(doc! {
            "$facet": {
                "items": [
                    { "$skip": skip },
                    { "$limit": self.limit as i64 },
                ],
                "total": [ { "$count": "count" } ],
            }
        });

        pipeline
    }

    fn matches_text(&self, student: &StudentWithClasses, matcher: Option<&Regex>) -> bool {
        let matcher = match matcher {
            Some(it) => it,
            None => return true,
        };

        matcher.is_match(&student.first_name)
            || matcher.is_match(&student.last_name)
            || matcher.is_match(&student.email)
            || student.classes.iter().any(|class| {
                matcher.is_match(&class.instructor) || matcher.is_match(&class.age_group)
            })
    }

    fn matches_level(&self, student: &StudentWithClasses) -> bool {
        match self.level {
            Some(level) => student.classes.iter().any(|class| class.level == level),
            None => true,
        }
    }

    /// Runs the same filter, sort and window as [`pipeline`](Self::pipeline)
    /// over already joined students.
    pub fn apply(
        &self,
        students: impl IntoIterator<Item = StudentWithClasses>,
    ) -> Result<StudentPage, regex::Error> {
        let matcher = self.matcher()?;

        let mut matching: Vec<StudentWithClasses> = students
            .into_iter()
            .filter(|it| it.role == Role::Student)
            .filter(|it| self.matches_text(it, matcher.as_ref()))
            .filter(|it| self.matches_level(it))
            .collect();
        matching.sort_by(compare_students);

        let total = matching.len() as u64;
        let items = matching
            .into_iter()
            .skip(self.skip() as usize)
            .take(self.limit as usize)
            .collect();

        Ok(StudentPage {
            items,
            total,
            page: self.page,
            limit: self.limit,
        })
    }
}

/// Orders by (lastName, firstName, id); the id makes pages deterministic
/// when names collide.
pub fn compare_students(a: &StudentWithClasses, b: &StudentWithClasses) -> Ordering {
    a.last_name
        .cmp(&b.last_name)
        .then_with(|| a.first_name.cmp(&b.first_name))
        .then_with(|| a.id.to_string().cmp(&b.id.to_string()))
}

/// A student with summaries of the classes they are enrolled in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StudentWithClasses {
    #[serde(rename = "_id", with = "crate::data::id::string")]
    pub id: Uuid,
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
    #[serde(default)]
    pub classes: Vec<ClassSummary>,
}

impl StudentWithClasses {
    /// Joins `user` with whichever of `classes` it is enrolled in.
    pub fn join<'a>(user: &User, classes: impl IntoIterator<Item = &'a Class>) -> Self {
        let classes = classes
            .into_iter()
            .filter(|class| user.enrolled_classes.contains(&class.id))
            .map(Class::summary)
            .collect();

        StudentWithClasses {
            id: user.id,
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            email: user.email.clone(),
            phone: user.phone.clone(),
            gender: user.gender.clone(),
            age: user.age,
            role: user.role,
            enrolled_classes: user.enrolled_classes.clone(),
            classes,
        }
        .normalized()
    }

    /// Join output order is unspecified; fix it so responses are stable.
    pub fn normalized(mut self) -> Self {
        self.classes.sort_by_key(|class| class.id);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct StudentPage {
    pub items: Vec<StudentWithClasses>,
    pub total: u64,
    pub page: u64,
    pub limit: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::class::ScheduleSlot;

    fn student(first: &str, last: &str) -> User {
        User::new(
            format!("idp_{}_{}", first, last),
            first,
            last,
            format!("{}.{}@example.com", first, last).to_lowercase(),
        )
    }

    fn class(level: ClassLevel, instructor: &str) -> Class {
        Class::new(
            level,
            "adult",
            instructor,
            vec![ScheduleSlot::new("Mon", "10:00", "11:00")],
        )
    }

    fn joined(users: &[User], classes: &[Class]) -> Vec<StudentWithClasses> {
        users
            .iter()
            .map(|user| StudentWithClasses::join(user, classes))
            .collect()
    }

    #[test]
    fn limits_are_clamped() {
        let query = RosterQuery::new(0, 0);
        assert_eq!((query.page, query.limit), (1, 1));

        let query = RosterQuery::new(-4, 10_000);
        assert_eq!((query.page, query.limit), (1, MAX_LIMIT));

        let query = RosterQuery::new(3, 25);
        assert_eq!(query.skip(), 50);
    }

    #[test]
    fn huge_pages_keep_a_valid_skip() {
        let query = RosterQuery::new(i64::MAX, MAX_LIMIT as i64);
        assert!(query.skip() <= i64::MAX as u64);

        let pipeline = query.pipeline();
        let facet = pipeline.last().unwrap().get_document("$facet").unwrap();
        let skip = facet.get_array("items").unwrap()[0]
            .as_document()
            .unwrap()
            .get_i64("$skip")
            .unwrap();
        assert!(skip >= 0);

        let beyond = RosterQuery {
            page: u64::MAX,
            ..RosterQuery::new(1, 10)
        };
        let facet = beyond.pipeline().pop().unwrap();
        let items = facet.get_document("$facet").unwrap().get_array("items").unwrap();
        assert_eq!(items[0], Bson::Document(doc! { "$skip": i64::MAX }));

        let page = RosterQuery::new(i64::MAX, 1).apply(vec![]).unwrap();
        assert!(page.items.is_empty());
    }

    #[test]
    fn blank_text_is_ignored() {
        assert_eq!(RosterQuery::default().with_text("   ").text, None);
        assert_eq!(
            RosterQuery::default().with_text(" ada ").text.as_deref(),
            Some("ada")
        );
    }

    #[test]
    fn pages_cover_students_without_overlap() {
        let users = vec![
            student("Eve", "Young"),
            student("Bob", "Adams"),
            student("Ann", "Adams"),
            student("Cid", "Moss"),
            student("Dee", "Baker"),
        ];
        let students = joined(&users, &[]);

        let mut seen = vec![];
        for (page, expected) in [(1, 2), (2, 2), (3, 1)] {
            let result = RosterQuery::new(page, 2).apply(students.clone()).unwrap();
            assert_eq!(result.total, 5);
            assert_eq!(result.items.len(), expected);
            seen.extend(result.items.into_iter().map(|it| it.first_name));
        }

        assert_eq!(seen, vec!["Ann", "Bob", "Dee", "Cid", "Eve"]);
    }

    #[test]
    fn name_collisions_break_ties_by_id() {
        let users = vec![student("Sam", "Lee"), student("Sam", "Lee"), student("Sam", "Lee")];
        let mut ids: Vec<String> = users.iter().map(|it| it.id.to_string()).collect();
        ids.sort();

        let result = RosterQuery::new(1, 10).apply(joined(&users, &[])).unwrap();
        let got: Vec<String> = result.items.iter().map(|it| it.id.to_string()).collect();
        assert_eq!(got, ids);
    }

    #[test]
    fn level_total_counts_students_not_classes() {
        let level3_a = class(ClassLevel::Numeric(3), "X");
        let level3_b = class(ClassLevel::Numeric(3), "Y");
        let ielts = class(ClassLevel::Ielts, "Z");

        let mut both = student("Ann", "Adams");
        both.enrolled_classes.extend([level3_a.id, level3_b.id]);
        let mut one = student("Bob", "Brown");
        one.enrolled_classes.insert(level3_b.id);
        let mut other = student("Cat", "Clark");
        other.enrolled_classes.insert(ielts.id);
        let none = student("Dan", "Doe");

        let classes = vec![level3_a, level3_b, ielts];
        let students = joined(&[both, one, other, none], &classes);

        let result = RosterQuery::new(1, 10)
            .with_level(ClassLevel::Numeric(3))
            .apply(students.clone())
            .unwrap();
        assert_eq!(result.total, 2);
        assert_eq!(result.items[0].classes.len(), 2);

        let result = RosterQuery::new(1, 1)
            .with_level(ClassLevel::Ielts)
            .apply(students)
            .unwrap();
        assert_eq!(result.total, 1);
        assert_eq!(result.items[0].first_name, "Cat");
    }

    #[test]
    fn search_is_literal_and_case_insensitive() {
        let users = vec![student("a.b*", "Literal"), student("aXbYYY", "Pattern")];
        let students = joined(&users, &[]);

        let result = RosterQuery::default().with_text("a.b*").apply(students.clone()).unwrap();
        assert_eq!(result.total, 1);
        assert_eq!(result.items[0].first_name, "a.b*");

        let result = RosterQuery::default().with_text("PATTERN").apply(students).unwrap();
        assert_eq!(result.total, 1);
        assert_eq!(result.items[0].first_name, "aXbYYY");
    }

    #[test]
    fn search_reaches_joined_classes() {
        let taught = class(ClassLevel::Numeric(1), "Mrs. Rahimi");
        let mut user = student("Ann", "Adams");
        user.enrolled_classes.insert(taught.id);
        let students = joined(&[user, student("Bob", "Brown")], &[taught]);

        let result = RosterQuery::default().with_text("rahimi").apply(students).unwrap();
        assert_eq!(result.total, 1);
        assert_eq!(result.items[0].first_name, "Ann");
    }

    #[test]
    fn only_students_are_listed() {
        let users = vec![
            student("Ann", "Adams"),
            student("Ivy", "Instructor").with_role(Role::Instructor),
            student("Al", "Admin").with_role(Role::Admin),
        ];
        let result = RosterQuery::default().apply(joined(&users, &[])).unwrap();
        assert_eq!(result.total, 1);
    }

    #[test]
    fn empty_result_is_not_an_error() {
        let result = RosterQuery::new(4, 10).apply(vec![]).unwrap();
        assert_eq!(result.total, 0);
        assert!(result.items.is_empty());
        assert_eq!((result.page, result.limit), (4, 10));
    }

    #[test]
    fn join_never_carries_rosters() {
        let mut taught = class(ClassLevel::Numeric(2), "X");
        let mut user = student("Ann", "Adams");
        taught.roster.insert(user.id);
        user.enrolled_classes.insert(taught.id);

        let json = serde_json::to_value(StudentWithClasses::join(&user, &[taught])).unwrap();
        assert!(json["classes"][0].get("roster").is_none());
    }

    #[test]
    fn pipeline_escapes_and_filters() {
        let pipeline = RosterQuery::new(2, 10)
            .with_text("a.b*")
            .with_level(ClassLevel::Numeric(3))
            .pipeline();

        assert_eq!(pipeline.len(), 6);
        assert_eq!(
            pipeline[0],
            doc! { "$match": { "role": "student" } }
        );

        let or = pipeline[2]
            .get_document("$match")
            .unwrap()
            .get_array("$or")
            .unwrap();
        assert_eq!(or.len(), 5);
        let first = or[0].as_document().unwrap().get_document("firstName").unwrap();
        assert_eq!(first.get_str("$regex").unwrap(), r"a\.b\*");
        assert_eq!(first.get_str("$options").unwrap(), "i");

        assert_eq!(
            pipeline[3],
            doc! { "$match": { "classes.level": 3_i64 } }
        );

        let facet = pipeline[5].get_document("$facet").unwrap();
        let items = facet.get_array("items").unwrap();
        assert_eq!(items[0], Bson::Document(doc! { "$skip": 10_i64 }));
        assert_eq!(items[1], Bson::Document(doc! { "$limit": 10_i64 }));
    }

    #[test]
    fn pipeline_without_filters_has_no_match_stages() {
        let pipeline = RosterQuery::default().pipeline();
        assert_eq!(pipeline.len(), 4);
        assert!(pipeline[2].contains_key("$sort"));
    }
}
