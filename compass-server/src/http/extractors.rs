//! Custom Axum extractors

use std::sync::Arc;

use axum::extract::{FromRequestParts, Path};
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::http::HeaderMap;
use serde::de::DeserializeOwned;

use super::error::ApiError;
use super::server::AppState;
use crate::db::repos::{SessionUser, UserRepo};

/// Signed-in user, resolved from `Authorization: Bearer <token>`
pub struct AuthSession {
    pub user: SessionUser,
    token: String,
}

impl AuthSession {
    pub fn token(&self) -> &str {
        &self.token
    }
}

impl FromRequestParts<Arc<AppState>> for AuthSession {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(&parts.headers).ok_or(ApiError::Unauthorized)?;

        let user = UserRepo::new(&state.pool)
            .authenticate(token)
            .await?
            .ok_or(ApiError::Unauthorized)?;

        Ok(Self {
            user,
            token: token.to_owned(),
        })
    }
}

/// Signed-in user with the admin role
pub struct AdminSession(pub SessionUser);

impl FromRequestParts<Arc<AppState>> for AdminSession {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let session = AuthSession::from_request_parts(parts, state).await?;
        if !session.user.is_admin() {
            tracing::warn!(user = %session.user.email, "admin route refused");
            return Err(ApiError::Forbidden {
                reason: "admin role required".to_owned(),
            });
        }
        Ok(Self(session.user))
    }
}

/// Path parameters with JSON errors instead of axum's plain-text rejection
pub struct ValidPath<T>(pub T);

impl<S, T> FromRequestParts<S> for ValidPath<T>
where
    S: Send + Sync,
    T: DeserializeOwned + Send,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(value) = Path::<T>::from_request_parts(parts, state)
            .await
            .map_err(|rejection| ApiError::BadRequest {
                message: rejection.body_text(),
            })?;
        Ok(Self(value))
    }
}

/// Token from a `Bearer` authorization header. The scheme is case-insensitive.
fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}
