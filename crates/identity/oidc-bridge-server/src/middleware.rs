//! axum integration: authentication middleware, identity extractor and group gate.

use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::{FromRequestParts, Request, State};
use axum::http::{Method, StatusCode};
use axum::http::request::Parts;
use axum::middleware::{Next, from_fn_with_state};
use axum::response::{IntoResponse, Response};
use oidc_bridge_core::AuthError;
use tracing::{debug, error};

use crate::authenticator::CustomAuthenticator;
use crate::identity::VerifiedIdentity;

pub type SharedAuthenticator = Arc<dyn CustomAuthenticator>;

/// An authentication failure rendered as `{"error": "<reason>"}`.
///
/// 401 for missing or invalid credentials, 403 for insufficient groups.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthRejection(pub AuthError);

impl From<AuthError> for AuthRejection {
    fn from(error: AuthError) -> Self {
        Self(error)
    }
}

impl IntoResponse for AuthRejection {
    fn into_response(self) -> Response {
        let status = if self.0.is_unauthorized() {
            StatusCode::UNAUTHORIZED
        } else {
            StatusCode::FORBIDDEN
        };

        (
            status,
            Json(serde_json::json!({
                "error": self.0.to_string()
            })),
        )
            .into_response()
    }
}

/// Authenticates the request and stores the [`VerifiedIdentity`] in its
/// extensions. Failed requests never reach `next`.
pub async fn require_identity(
    State(authenticator): State<SharedAuthenticator>,
    mut request: Request,
    next: Next,
) -> Response {
    let identity = match authenticator.authenticate(request.headers()).await {
        Ok(identity) => identity,
        Err(e) => {
            debug!("Rejected {} {}: {}", request.method(), request.uri().path(), e);
            return AuthRejection(e).into_response();
        }
    };

    request.extensions_mut().insert(identity);
    next.run(request).await
}

/// Answer for a route that reads the identity but is not behind
/// [`require_identity`]. A routing mistake, not a client error.
fn missing_authentication_layer(method: &Method, path: &str) -> Response {
    error!(
        "{} {} needs a VerifiedIdentity but is not behind require_identity",
        method, path
    );
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(serde_json::json!({
            "error": "internal error"
        })),
    )
        .into_response()
}

impl<S> FromRequestParts<S> for VerifiedIdentity
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<VerifiedIdentity>()
            .cloned()
            .ok_or_else(|| missing_authentication_layer(&parts.method, parts.uri.path()))
    }
}

#[derive(Debug, Clone)]
struct RequiredGroups(Arc<[String]>);

async fn check_groups(
    State(RequiredGroups(required)): State<RequiredGroups>,
    request: Request,
    next: Next,
) -> Response {
    let Some(identity) = request.extensions().get::<VerifiedIdentity>() else {
        return missing_authentication_layer(request.method(), request.uri().path());
    };

    if let Err(e) = identity.check_groups(&required) {
        debug!("{} lacks groups {:?}", identity.id(), required);
        return AuthRejection(e).into_response();
    }

    next.run(request).await
}

/// Restricts every route of `router` to identities in all of `groups`.
///
/// The router must end up behind [`require_identity`].
pub fn require_groups<S, I, G>(router: Router<S>, groups: I) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
    I: IntoIterator<Item = G>,
    G: Into<String>,
{
    let required = RequiredGroups(groups.into_iter().map(Into::into).collect());
    router.route_layer(from_fn_with_state(required, check_groups))
}
