//! `Authorization` header parsing.

use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use oidc_bridge_core::{AuthError, AuthResult};
use tracing::warn;

/// An `Authorization` header split into scheme and credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential<'a> {
    pub scheme: &'a str,
    pub token: &'a str,
}

/// Splits a raw header value on its first space.
///
/// Missing or empty values are [`AuthError::MissingHeader`].
pub fn parse_authorization(value: Option<&str>) -> AuthResult<Credential<'_>> {
    let value = value.filter(|v| !v.is_empty()).ok_or(AuthError::MissingHeader)?;
    let (scheme, token) = value.split_once(' ').unwrap_or((value, ""));
    Ok(Credential { scheme, token })
}

/// The bearer token carried by `headers`.
///
/// The scheme must be exactly `Bearer`. A bearer header with no token is
/// rejected as a failed verification.
pub fn bearer_token(headers: &HeaderMap) -> AuthResult<&str> {
    let value = match headers.get(AUTHORIZATION) {
        None => None,
        Some(raw) => Some(raw.to_str().map_err(|_| {
            warn!("Authorization header is not valid ASCII");
            AuthError::UnexpectedScheme
        })?),
    };

    let credential = parse_authorization(value)?;
    if credential.scheme != "Bearer" {
        warn!("Rejected Authorization scheme {:?}", credential.scheme);
        return Err(AuthError::UnexpectedScheme);
    }

    let token = credential.token.trim();
    if token.is_empty() {
        warn!("Bearer header without a token");
        return Err(AuthError::VerificationFailed);
    }

    Ok(token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn test_parse_authorization() {
        assert_eq!(
            parse_authorization(Some("Bearer abc.def")).unwrap(),
            Credential {
                scheme: "Bearer",
                token: "abc.def"
            }
        );
        assert_eq!(
            parse_authorization(Some("Bearer")).unwrap(),
            Credential {
                scheme: "Bearer",
                token: ""
            }
        );
        assert_eq!(parse_authorization(None), Err(AuthError::MissingHeader));
        assert_eq!(parse_authorization(Some("")), Err(AuthError::MissingHeader));
    }

    #[test]
    fn test_missing_header() {
        assert_eq!(
            bearer_token(&HeaderMap::new()),
            Err(AuthError::MissingHeader)
        );
        assert_eq!(bearer_token(&headers("")), Err(AuthError::MissingHeader));
    }

    #[test]
    fn test_unexpected_scheme() {
        assert_eq!(
            bearer_token(&headers("Basic xyz")),
            Err(AuthError::UnexpectedScheme)
        );
        assert_eq!(
            bearer_token(&headers("bearer abc")),
            Err(AuthError::UnexpectedScheme)
        );
        assert_eq!(
            bearer_token(&headers("Token")),
            Err(AuthError::UnexpectedScheme)
        );
    }

    #[test]
    fn test_bearer_token() {
        assert_eq!(bearer_token(&headers("Bearer abc.def.ghi")), Ok("abc.def.ghi"));
        assert_eq!(
            bearer_token(&headers("Bearer ")),
            Err(AuthError::VerificationFailed)
        );
    }
}
