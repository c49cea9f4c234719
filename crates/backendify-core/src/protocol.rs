//! Backend response dialects and their normalization
//!
//! Backends declare their schema through the response content type:
//!
//! - `application/x-company-v1`: `{"cn", "created_on", "closed_on"?}`
//! - `application/x-company-v2`: `{"company_name", "tin", "dissolved_on"?}`
//!
//! Both are mapped onto [`Company`]. The id is never read from the payload.

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::error::NormalizeError;
use crate::model::Company;

const V1_CONTENT_TYPE: &str = "application/x-company-v1";
const V2_CONTENT_TYPE: &str = "application/x-company-v2";

/// Backend response schema
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    V1,
    V2,
}

impl Dialect {
    /// Detect the dialect from a declared content type (prefix match, so
    /// parameters such as `; charset=utf-8` are accepted)
    pub fn from_content_type(content_type: &str) -> Option<Self> {
        let content_type = content_type.trim().to_ascii_lowercase();

        if content_type.starts_with(V1_CONTENT_TYPE) {
            Some(Dialect::V1)
        } else if content_type.starts_with(V2_CONTENT_TYPE) {
            Some(Dialect::V2)
        } else {
            None
        }
    }
}

// `null` reads as absent. Fields not listed here (`created_on`, `tin`) are
// skipped whatever their type.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct V1Record {
    cn: Option<String>,
    closed_on: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct V2Record {
    company_name: Option<String>,
    dissolved_on: Option<String>,
}

/// Decode a raw backend response into a [`Company`] for `id`, evaluating
/// closure dates against `now`
pub fn normalize(
    content_type: Option<&str>,
    body: &[u8],
    id: &str,
    now: DateTime<Utc>,
) -> Result<Company, NormalizeError> {
    let dialect = content_type
        .and_then(Dialect::from_content_type)
        .ok_or_else(|| {
            NormalizeError::UnsupportedFormat(content_type.unwrap_or("<missing>").to_string())
        })?;

    let (name, closed_on) = match dialect {
        Dialect::V1 => {
            let record: V1Record = serde_json::from_slice(body)?;
            (record.cn.unwrap_or_default(), record.closed_on)
        }
        Dialect::V2 => {
            let record: V2Record = serde_json::from_slice(body)?;
            (record.company_name.unwrap_or_default(), record.dissolved_on)
        }
    };

    let closed_on = closed_on.filter(|date| !date.is_empty());
    let active = !closed_on
        .as_deref()
        .is_some_and(|date| is_closed_before(date, now));

    Ok(Company {
        id: id.to_string(),
        name,
        active,
        active_until: closed_on,
    })
}

/// [`normalize`] against the current wall clock
pub fn normalize_now(
    content_type: Option<&str>,
    body: &[u8],
    id: &str,
) -> Result<Company, NormalizeError> {
    normalize(content_type, body, id, Utc::now())
}

/// Whether `date` is an RFC 3339 timestamp strictly before `now`.
/// Unparseable dates count as not closed.
pub fn is_closed_before(date: &str, now: DateTime<Utc>) -> bool {
    DateTime::parse_from_rfc3339(date)
        .map(|closed| closed.with_timezone(&Utc) < now)
        .unwrap_or(false)
}
