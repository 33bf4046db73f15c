use axum::{extract::FromRequestParts, http::request::Parts};
use uuid::Uuid;

use crate::app_error::AppError;

/// The signed-in panel user.
///
/// The panel's session layer inserts this into the request extensions;
/// handlers that take it reject anonymous requests with 401.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CurrentUser {
    pub user_id: Uuid,
}

impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<CurrentUser>()
            .copied()
            .ok_or(AppError::Unauthorized)
    }
}
