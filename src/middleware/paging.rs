use rocket::http::Status;
use rocket::request::{FromRequest, Outcome, Request};

use crate::resp::problem::{problems, Problem};
use crate::roster::{RosterQuery, DEFAULT_LIMIT};

/// `?page=&limit=` (or `p`/`l`). Out-of-range numbers are clamped by
/// [`RosterQuery::new`]; anything that isn't an integer is rejected.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct Paging {
    pub page: i64,
    pub limit: i64,
}

impl Default for Paging {
    fn default() -> Self {
        Paging {
            page: 1,
            limit: DEFAULT_LIMIT as i64,
        }
    }
}

impl Paging {
    pub fn query(self) -> RosterQuery {
        RosterQuery::new(self.page, self.limit)
    }
}

fn query_number(request: &Request<'_>, names: &[&str]) -> Result<Option<i64>, ()> {
    for name in names {
        if let Some(value) = request.query_value::<&str>(name) {
            let raw = value.map_err(|_| ())?;
            if raw.trim().is_empty() {
                return Ok(None);
            }
            return raw.trim().parse().map(Some).map_err(|_| ());
        }
    }
    Ok(None)
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for Paging {
    type Error = Problem;

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let defaults = Paging::default();
        let page = query_number(request, &["page", "p"]);
        let limit = query_number(request, &["limit", "l"]);

        let mut invalid = vec![];
        if page.is_err() {
            invalid.push("page");
        }
        if limit.is_err() {
            invalid.push("limit");
        }
        if !invalid.is_empty() {
            return Outcome::Error((Status::BadRequest, problems::invalid_fields(&invalid)));
        }

        Outcome::Success(Paging {
            page: page.ok().flatten().unwrap_or(defaults.page),
            limit: limit.ok().flatten().unwrap_or(defaults.limit),
        })
    }
}
