//! Session context from request headers.

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use unitpath_core::model::{PracticeMode, SessionContext};

use crate::envelope::ApiError;

pub const STUDENT_HEADER: &str = "x-student-id";
pub const SESSION_HEADER: &str = "x-session-id";
pub const MODE_HEADER: &str = "x-practice-mode";

/// The caller's [`SessionContext`], built from `x-student-id`,
/// `x-session-id` and the optional `x-practice-mode` header.
#[derive(Debug, Clone)]
pub struct Caller(pub SessionContext);

fn header<'a>(parts: &'a Parts, name: &str) -> Option<&'a str> {
    parts
        .headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

fn parse_mode(value: &str) -> Result<PracticeMode, ApiError> {
    match value.to_ascii_lowercase().as_str() {
        "normal" => Ok(PracticeMode::Normal),
        "review" => Ok(PracticeMode::Review),
        "placement_test" | "placement-test" => Ok(PracticeMode::PlacementTest),
        other => Err(ApiError::Rejected(format!(
            "unknown {MODE_HEADER}: {other}"
        ))),
    }
}

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for Caller {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let student = header(parts, STUDENT_HEADER)
            .ok_or_else(|| ApiError::Rejected(format!("missing {STUDENT_HEADER} header")))?;
        let session = header(parts, SESSION_HEADER)
            .ok_or_else(|| ApiError::Rejected(format!("missing {SESSION_HEADER} header")))?;
        let mode = header(parts, MODE_HEADER)
            .map(parse_mode)
            .transpose()?
            .unwrap_or_default();

        Ok(Caller(SessionContext::new(student, session).with_mode(mode)))
    }
}
