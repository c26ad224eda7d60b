//! Authentication extractors.
//!
//! - [`RequireAdmin`] guards the admin API with a static bearer token.
//! - [`SessionCart`] resolves who owns the cart for the current request.
//!
//! Sign-in itself happens outside this service; it records the user in the
//! session under [`session_keys::CURRENT_USER`].

use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};
use secrecy::ExposeSecret;
use tower_sessions::Session;
use uuid::Uuid;

use crate::error::{AppError, clear_sentry_user, set_sentry_user};
use crate::models::{CartOwner, CurrentUser, session_keys};
use crate::payments::webhook::constant_time_compare;
use crate::state::AppState;

/// Extractor that requires `Authorization: Bearer <ADMIN_API_TOKEN>`.
///
/// Missing credentials are a 401, a wrong token is a 403.
///
/// # Example
///
/// ```rust,ignore
/// async fn admin_handler(_admin: RequireAdmin) -> impl IntoResponse {
///     "ok"
/// }
/// ```
#[derive(Debug, Clone, Copy)]
pub struct RequireAdmin;

impl FromRequestParts<AppState> for RequireAdmin {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| AppError::Unauthorized("missing bearer token".to_string()))?;

        let expected = state.config().admin_api_token.expose_secret();
        if !constant_time_compare(expected, token) {
            tracing::warn!(path = %parts.uri.path(), "Admin request with invalid token");
            return Err(AppError::Forbidden("invalid admin token".to_string()));
        }

        Ok(Self)
    }
}

/// Extractor yielding the owner of the current request's cart.
///
/// A signed-in user owns their cart. Otherwise the visitor gets an
/// anonymous id, generated on first use and kept in the session. When a
/// visitor with an anonymous cart signs in, that cart is merged into the
/// user's cart and the anonymous id is dropped.
#[derive(Debug, Clone)]
pub struct SessionCart(pub CartOwner);

impl FromRequestParts<AppState> for SessionCart {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        // Get the session from extensions (set by SessionManagerLayer)
        let session = parts
            .extensions
            .get::<Session>()
            .cloned()
            .ok_or_else(|| AppError::Internal("session layer missing".to_string()))?;

        let user: Option<CurrentUser> = session
            .get(session_keys::CURRENT_USER)
            .await
            .map_err(session_error)?;
        let anonymous_id: Option<String> = session
            .get(session_keys::ANONYMOUS_CART_ID)
            .await
            .map_err(session_error)?;

        match (user, anonymous_id) {
            (Some(user), Some(anonymous_id)) => {
                set_sentry_user(&user.id, user.email.as_deref());
                state.carts().merge_carts(&anonymous_id, user.id).await?;
                session
                    .remove::<String>(session_keys::ANONYMOUS_CART_ID)
                    .await
                    .map_err(session_error)?;
                Ok(Self(CartOwner::User(user.id)))
            }
            (Some(user), None) => {
                set_sentry_user(&user.id, user.email.as_deref());
                Ok(Self(CartOwner::User(user.id)))
            }
            (None, Some(anonymous_id)) => Ok(Self(CartOwner::Anonymous(anonymous_id))),
            (None, None) => {
                let anonymous_id = Uuid::new_v4().to_string();
                session
                    .insert(session_keys::ANONYMOUS_CART_ID, &anonymous_id)
                    .await
                    .map_err(session_error)?;
                tracing::debug!(anonymous_id = %anonymous_id, "Anonymous cart id issued");
                Ok(Self(CartOwner::Anonymous(anonymous_id)))
            }
        }
    }
}

#[allow(clippy::needless_pass_by_value)]
fn session_error(error: tower_sessions::session::Error) -> AppError {
    AppError::Internal(format!("session error: {error}"))
}

/// Record the signed-in user in the session.
///
/// # Errors
///
/// Returns an error if the session cannot be modified.
pub async fn set_current_user(
    session: &Session,
    user: &CurrentUser,
) -> Result<(), tower_sessions::session::Error> {
    session.insert(session_keys::CURRENT_USER, user).await
}

/// Remove the signed-in user from the session (logout).
///
/// # Errors
///
/// Returns an error if the session cannot be modified.
pub async fn clear_current_user(session: &Session) -> Result<(), tower_sessions::session::Error> {
    session
        .remove::<CurrentUser>(session_keys::CURRENT_USER)
        .await?;
    clear_sentry_user();
    Ok(())
}
