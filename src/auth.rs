//! 管理令牌校验与上传密钥签发。

use axum::extract::Extension;
use axum::http::{HeaderMap, header};
use axum::response::Json as JsonResponse;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::ApiError;
use crate::keys::KeyStore;

const BEARER_PREFIX: &str = "Bearer ";

#[derive(Debug)]
pub struct AuthConfig {
    pub admin_token: String,
}

impl AuthConfig {
    /// 校验 `Authorization: Bearer <token>`。
    ///
    /// 缺少请求头（或为空）返回 `MissingToken`，令牌不一致返回 `InvalidToken`。
    /// 未配置管理令牌时任何请求都不予授权。
    pub fn authorize(&self, headers: &HeaderMap) -> Result<(), ApiError> {
        let presented = match headers.get(header::AUTHORIZATION) {
            Some(value) if !value.is_empty() => value.as_bytes(),
            _ => return Err(ApiError::MissingToken),
        };
        let token = presented
            .strip_prefix(BEARER_PREFIX.as_bytes())
            .unwrap_or(presented);
        if self.admin_token.is_empty() || token != self.admin_token.as_bytes() {
            return Err(ApiError::InvalidToken);
        }
        Ok(())
    }
}

#[derive(Serialize)]
pub(crate) struct IssueKeyResponse {
    key: String,
}

/// 签发一次性上传密钥。
pub async fn issue_key(
    Extension(auth): Extension<Arc<AuthConfig>>,
    Extension(keys): Extension<Arc<KeyStore>>,
    headers: HeaderMap,
) -> Result<JsonResponse<IssueKeyResponse>, ApiError> {
    if let Err(err) = auth.authorize(&headers) {
        warn!(reason = err.kind(), "key request rejected");
        return Err(err);
    }

    let key = keys.issue();
    info!(key, outstanding = keys.len(), "issued upload key");
    Ok(JsonResponse(IssueKeyResponse { key }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use std::time::Duration;

    fn auth(token: &str) -> Arc<AuthConfig> {
        Arc::new(AuthConfig {
            admin_token: token.to_string(),
        })
    }

    fn bearer(value: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static(value));
        headers
    }

    #[test]
    fn authorize_distinguishes_missing_and_invalid() {
        let auth = auth("secret");
        assert!(matches!(
            auth.authorize(&HeaderMap::new()),
            Err(ApiError::MissingToken)
        ));
        assert!(matches!(
            auth.authorize(&bearer("")),
            Err(ApiError::MissingToken)
        ));
        assert!(matches!(
            auth.authorize(&bearer("Bearer nope")),
            Err(ApiError::InvalidToken)
        ));
        assert!(matches!(
            auth.authorize(&bearer("Bearer secret ")),
            Err(ApiError::InvalidToken)
        ));
        assert!(auth.authorize(&bearer("Bearer secret")).is_ok());
    }

    #[test]
    fn token_without_scheme_is_compared_verbatim() {
        let auth = auth("secret");
        assert!(auth.authorize(&bearer("secret")).is_ok());
        assert!(matches!(
            auth.authorize(&bearer("Basic secret")),
            Err(ApiError::InvalidToken)
        ));
    }

    #[test]
    fn empty_admin_token_rejects_everything() {
        let auth = auth("");
        assert!(matches!(
            auth.authorize(&bearer("Bearer ")),
            Err(ApiError::InvalidToken)
        ));
    }

    #[tokio::test]
    async fn issue_key_registers_new_key() {
        let keys = Arc::new(KeyStore::new(Duration::ZERO));
        let JsonResponse(response) = issue_key(
            Extension(auth("secret")),
            Extension(keys.clone()),
            bearer("Bearer secret"),
        )
        .await
        .unwrap_or_else(|_| panic!("issue key failed"));

        assert!(keys.contains(&response.key));
        assert_eq!(keys.len(), 1);
    }

    #[tokio::test]
    async fn issue_key_rejects_wrong_token_without_side_effects() {
        let keys = Arc::new(KeyStore::new(Duration::ZERO));
        let result = issue_key(
            Extension(auth("secret")),
            Extension(keys.clone()),
            bearer("Bearer wrong"),
        )
        .await;

        assert!(matches!(result, Err(ApiError::InvalidToken)));
        assert_eq!(keys.len(), 0);
    }
}
