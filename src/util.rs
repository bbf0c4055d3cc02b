use std::iter::repeat;
use std::path::{Path, PathBuf};

use crate::resp::problem::{problems, Problem};
use uuid::Uuid;

pub fn find_first_subpath<P: AsRef<Path>, F: Fn(&Path) -> bool>(
    root: impl AsRef<Path>,
    subpaths: &[P],
    search: F,
) -> Option<PathBuf> {
    subpaths
        .iter()
        .zip(repeat(root.as_ref()))
        .map(|(b, a)| a.join(b))
        .find(|it: &PathBuf| search(it))
}

/// Parses an id coming from a path segment, query value or body field.
pub fn parse_id(field: &str, raw: &str) -> Result<Uuid, Problem> {
    Uuid::parse_str(raw.trim()).map_err(|_| problems::invalid_fields(&[field]))
}

/// Trims the value and drops it entirely when nothing is left.
pub fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|it| !it.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rocket::http::Status;

    #[test]
    fn parse_id_rejects_garbage() {
        let id = Uuid::new_v4();
        assert_eq!(parse_id("classId", &id.to_string()).unwrap(), id);

        let problem = parse_id("classId", "not-an-id").unwrap_err();
        assert_eq!(problem.status, Status::BadRequest);
        assert_eq!(problem.body["fields"], serde_json::json!(["classId"]));
    }

    #[test]
    fn non_blank_trims() {
        assert_eq!(non_blank(Some("  ada ")), Some("ada"));
        assert_eq!(non_blank(Some("   ")), None);
        assert_eq!(non_blank(None), None);
    }
}
