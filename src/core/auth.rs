//! Bearer-token authentication for the public API.
//!
//! Tokens map to user records via the `token:user_id:name,...` list in the
//! settings. Handlers call [`authenticate`] before doing any work.

use std::collections::HashMap;

use axum::http::{header, HeaderMap};

use crate::core::errors::ApiError;
use crate::core::settings::AuthUser;

pub fn authenticate(
    headers: &HeaderMap,
    tokens: &HashMap<String, AuthUser>,
) -> Result<AuthUser, ApiError> {
    let value = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or(ApiError::Unauthorized)?;

    let token = value.strip_prefix("Bearer ").ok_or(ApiError::Unauthorized)?;

    tokens.get(token.trim()).cloned().ok_or(ApiError::Unauthorized)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn table() -> HashMap<String, AuthUser> {
        let mut t = HashMap::new();
        t.insert(
            "tok1".to_string(),
            AuthUser {
                user_id: "u1".to_string(),
                name: "Alice".to_string(),
            },
        );
        t
    }

    #[test]
    fn valid_bearer_token_resolves_user() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer tok1"));
        let user = authenticate(&headers, &table()).unwrap();
        assert_eq!(user.user_id, "u1");
    }

    #[test]
    fn missing_header_is_unauthorized() {
        let headers = HeaderMap::new();
        assert!(matches!(
            authenticate(&headers, &table()),
            Err(ApiError::Unauthorized)
        ));
    }

    #[test]
    fn unknown_token_is_unauthorized() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer nope"));
        assert!(matches!(
            authenticate(&headers, &table()),
            Err(ApiError::Unauthorized)
        ));
    }

    #[test]
    fn non_bearer_scheme_is_unauthorized() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic tok1"));
        assert!(matches!(
            authenticate(&headers, &table()),
            Err(ApiError::Unauthorized)
        ));
    }
}
