//! API handlers organized by resource.
//!
//! Handlers enforce the role policy, translate transport input into service calls and
//! wrap results in the response envelope. Query structs shared by several resources live here.

pub mod audit;
pub mod auth;
pub mod content;
pub mod dashboard;
pub mod submissions;
pub mod system;
pub mod taxonomy;
pub mod users;

use std::str::FromStr;

use serde::Deserialize;

use crate::application::{error::AppError, pagination::PageRequest};

#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

impl PageQuery {
    pub fn request(&self) -> PageRequest {
        PageRequest::new(self.page, self.limit)
    }
}

/// Parse an optional query value through `FromStr`; blank counts as absent.
pub(crate) fn parse_opt<T: FromStr>(field: &str, raw: Option<&str>) -> Result<Option<T>, AppError> {
    raw.map(str::trim)
        .filter(|value| !value.is_empty())
        .map(|value| {
            value
                .parse::<T>()
                .map_err(|_| AppError::bad_request(format!("Invalid value for `{field}`: {value}")))
        })
        .transpose()
}
