//! In-process backend used when running without real registries

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::json;
use std::collections::HashMap;
use tracing::{debug, info};

use crate::client::{BackendResponse, CompanySource};
use crate::error::ProxyError;

/// Content type served by the mock backend
pub const MOCK_CONTENT_TYPE: &str = "application/x-company-v1";

/// Canned company records: (id, name, closure date)
const MOCK_COMPANIES: &[(&str, &str, Option<&str>)] = &[
    ("1", "Company A", None),
    ("2", "Company B", None),
    ("3", "Company C", Some("2023-07-15T00:00:00Z")),
    ("4", "Company D", Some("2023-08-01T00:00:00Z")),
    ("5", "Company E", None),
    ("6", "Company F", Some("2023-09-01T00:00:00Z")),
    ("7", "Company G", None),
    ("8", "Company H", Some("2023-07-25T00:00:00Z")),
    ("9", "Company I", None),
    ("10", "Company J", None),
];

/// Backend stand-in that answers every origin from a fixed data set in the
/// v1 dialect, and with 404 for unknown ids
pub struct MockBackend {
    companies: HashMap<String, (String, Option<String>)>,
}

impl MockBackend {
    pub fn new() -> Self {
        let companies: HashMap<_, _> = MOCK_COMPANIES
            .iter()
            .map(|(id, name, closed_on)| {
                (
                    id.to_string(),
                    (name.to_string(), closed_on.map(str::to_string)),
                )
            })
            .collect();

        info!("Mock backend serving {} companies", companies.len());
        Self { companies }
    }
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CompanySource for MockBackend {
    async fn get_company(&self, origin: &str, id: &str) -> Result<BackendResponse, ProxyError> {
        debug!("Mock backend lookup for {} (origin {})", id, origin);

        let Some((name, closed_on)) = self.companies.get(id) else {
            return Ok(BackendResponse {
                status: 404,
                content_type: None,
                body: Bytes::new(),
            });
        };

        let mut payload = json!({
            "cn": name,
            "created_on": "2020-01-01T00:00:00Z",
        });
        if let Some(closed_on) = closed_on {
            payload["closed_on"] = json!(closed_on);
        }

        Ok(BackendResponse {
            status: 200,
            content_type: Some(MOCK_CONTENT_TYPE.to_string()),
            body: Bytes::from(payload.to_string()),
        })
    }
}
