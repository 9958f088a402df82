//! Session principal extraction.
//!
//! Authentication happens upstream. The gateway in front of this service
//! forwards the checkout session and the authenticated user as headers:
//!
//! ```text
//!   x-session-id: <cart key>
//!   x-user-id:    <user id>     ──►  Session(SessionUser { .. })
//! ```

use std::ops::Deref;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use checkout_core::SessionUser;

use crate::error::ApiError;

pub const SESSION_HEADER: &str = "x-session-id";
pub const USER_HEADER: &str = "x-user-id";

/// The caller of a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session(pub SessionUser);

impl Deref for Session {
    type Target = SessionUser;

    fn deref(&self) -> &SessionUser {
        &self.0
    }
}

fn header(parts: &Parts, name: &'static str) -> Result<String, ApiError> {
    parts
        .headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or(ApiError::MissingSession(name))
}

impl<S> FromRequestParts<S> for Session
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Session(SessionUser {
            user_id: header(parts, USER_HEADER)?,
            session_id: header(parts, SESSION_HEADER)?,
        }))
    }
}
