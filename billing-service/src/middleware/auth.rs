//! Caller identity forwarded by the upstream gateway.
//!
//! The gateway authenticates the user and sets `X-User-ID` (and, when known,
//! `X-User-Email`). Organization roles are checked by the handlers.

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use service_core::error::AppError;
use uuid::Uuid;

pub const USER_ID_HEADER: &str = "X-User-ID";
pub const USER_EMAIL_HEADER: &str = "X-User-Email";

#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub email: Option<String>,
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| AppError::Unauthorized(anyhow::anyhow!("Missing X-User-ID header")))?;

        let user_id = Uuid::parse_str(raw.trim())
            .map_err(|_| AppError::Unauthorized(anyhow::anyhow!("Invalid X-User-ID header")))?;

        let email = parts
            .headers
            .get(USER_EMAIL_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| s.to_string());

        tracing::Span::current().record("user_id", tracing::field::display(user_id));

        Ok(AuthUser { user_id, email })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    async fn extract(request: Request<()>) -> Result<AuthUser, AppError> {
        let (mut parts, _) = request.into_parts();
        AuthUser::from_request_parts(&mut parts, &()).await
    }

    #[tokio::test]
    async fn reads_user_and_optional_email() {
        let id = Uuid::new_v4();
        let user = extract(
            Request::builder()
                .header(USER_ID_HEADER, id.to_string())
                .header(USER_EMAIL_HEADER, "owner@example.com")
                .body(())
                .unwrap(),
        )
        .await
        .unwrap();
        assert_eq!(user.user_id, id);
        assert_eq!(user.email.as_deref(), Some("owner@example.com"));
    }

    #[tokio::test]
    async fn missing_or_malformed_id_is_unauthorized() {
        let missing = extract(Request::builder().body(()).unwrap()).await;
        assert!(matches!(missing, Err(AppError::Unauthorized(_))));

        let malformed = extract(
            Request::builder()
                .header(USER_ID_HEADER, "not-a-uuid")
                .body(())
                .unwrap(),
        )
        .await;
        assert!(matches!(malformed, Err(AppError::Unauthorized(_))));
    }
}
