use async_trait::async_trait;
use axum::extract::{Request, State};
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::Response;
use blobgate_types::Identity;

use crate::error::{ServerError, ServerResult};
use crate::state::AppState;

/// Header carrying the caller's identity, set by a trusted front proxy.
pub const USER_ID_HEADER: &str = "x-user-id";

/// What the caller presented.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Credentials {
    UserId(String),
    Anonymous,
}

impl Credentials {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.trim().is_empty())
            .map_or(Self::Anonymous, |v| Self::UserId(v.to_owned()))
    }
}

#[async_trait]
pub trait AuthProvider: Send + Sync {
    async fn authenticate(&self, credentials: &Credentials) -> ServerResult<Identity>;
}

/// Accepts the user-id header as-is.
///
/// The gateway trusts whatever sits in front of it to have authenticated
/// the caller; this provider only rejects missing or unusable identities.
pub struct HeaderAuth;

#[async_trait]
impl AuthProvider for HeaderAuth {
    async fn authenticate(&self, credentials: &Credentials) -> ServerResult<Identity> {
        match credentials {
            Credentials::UserId(id) => Identity::new(id.as_str()).map_err(|e| {
                tracing::debug!(error = %e, "rejected identity");
                ServerError::Unauthorized
            }),
            Credentials::Anonymous => Err(ServerError::Unauthorized),
        }
    }
}

/// Middleware: authenticate the request and attach its [`Identity`].
pub async fn require_identity(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ServerError> {
    let credentials = Credentials::from_headers(request.headers());
    let identity = state.auth.authenticate(&credentials).await?;
    request.extensions_mut().insert(identity);
    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn credentials_from_headers() {
        let mut headers = HeaderMap::new();
        assert_eq!(Credentials::from_headers(&headers), Credentials::Anonymous);

        headers.insert(USER_ID_HEADER, HeaderValue::from_static("   "));
        assert_eq!(Credentials::from_headers(&headers), Credentials::Anonymous);

        headers.insert(USER_ID_HEADER, HeaderValue::from_static("alice"));
        assert_eq!(
            Credentials::from_headers(&headers),
            Credentials::UserId("alice".into())
        );
    }

    #[tokio::test]
    async fn header_auth_accepts_user() {
        let id = HeaderAuth
            .authenticate(&Credentials::UserId("alice".into()))
            .await
            .unwrap();
        assert_eq!(id.as_str(), "alice");
    }

    #[tokio::test]
    async fn header_auth_rejects_anonymous() {
        let err = HeaderAuth
            .authenticate(&Credentials::Anonymous)
            .await
            .unwrap_err();
        assert!(matches!(err, ServerError::Unauthorized));
    }

    #[tokio::test]
    async fn header_auth_rejects_slash() {
        let err = HeaderAuth
            .authenticate(&Credentials::UserId("alice/../bob".into()))
            .await
            .unwrap_err();
        assert!(matches!(err, ServerError::Unauthorized));
    }
}
