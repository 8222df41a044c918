//! Session binding for requests

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::request::Parts,
};
use axum_extra::headers::{Cookie, HeaderMapExt};
use uuid::Uuid;

use super::ApiError;

/// Header carrying the session id
pub const SESSION_HEADER: &str = "x-session-id";

/// Cookie carrying the session id when the header is absent
pub const SESSION_COOKIE: &str = "dockside_session";

/// Session id bound to the request
#[derive(Debug, Clone, Copy)]
pub struct SessionKey(pub Uuid);

#[async_trait]
impl<S> FromRequestParts<S> for SessionKey
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let from_header = parts
            .headers
            .get(SESSION_HEADER)
            .and_then(|h| h.to_str().ok())
            .map(str::to_string);

        let raw = match from_header {
            Some(value) => value,
            None => parts
                .headers
                .typed_get::<Cookie>()
                .and_then(|cookie| cookie.get(SESSION_COOKIE).map(str::to_string))
                .ok_or(ApiError::Unauthorized)?,
        };

        Uuid::parse_str(raw.trim())
            .map(SessionKey)
            .map_err(|_| ApiError::BadRequest(format!("Malformed session id: {:?}", raw)))
    }
}

/// `Set-Cookie` value binding a session
pub fn session_cookie(session_id: Uuid) -> String {
    format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax",
        SESSION_COOKIE, session_id
    )
}

/// `Set-Cookie` value dropping the session binding
pub fn clear_session_cookie() -> String {
    format!("{}=; Path=/; Max-Age=0; HttpOnly; SameSite=Lax", SESSION_COOKIE)
}
