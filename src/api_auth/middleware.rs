//! Axum middleware for signed requests.
//!
//! Protected routes get two layers. The signature guard runs first and
//! buffers the body so it can be signed over, then hands the rebuilt request
//! to the permission guard, which checks one permission bit.

use axum::{
    Router,
    body::{Body, to_bytes},
    extract::{Query, State},
    http::{Request, request::Parts},
    middleware::{Next, from_fn_with_state},
    response::Response,
};
use std::sync::Arc;

use super::{
    authenticator::Authenticator,
    error::AuthError,
    models::{AuthenticatedCredential, permissions},
    signer::SignedRequest,
};

/// State for [`signature_middleware`].
#[derive(Clone)]
pub struct SignatureGuard {
    pub auth: Arc<Authenticator>,
    /// Largest body buffered for verification
    pub body_limit: usize,
}

/// State for [`permission_middleware`].
#[derive(Clone)]
pub struct PermissionGuard {
    pub auth: Arc<Authenticator>,
    pub required: i32,
}

/// Verify timestamp, access key and signature.
///
/// On success the caller is available to handlers as an
/// `Extension<AuthenticatedCredential>`.
pub async fn signature_middleware(
    State(guard): State<SignatureGuard>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, AuthError> {
    let (parts, body) = request.into_parts();
    let bytes = to_bytes(body, guard.body_limit).await.map_err(|e| {
        AuthError::invalid_input(format!("Request body could not be read: {}", e)).suggest(
            format!("Keep request bodies under {} bytes", guard.body_limit),
        )
    })?;

    let signed = signed_request_from_parts(&parts, &bytes)?;
    let credential = guard.auth.verify_signature(&signed).await?;

    let mut request = Request::from_parts(parts, Body::from(bytes));
    request
        .extensions_mut()
        .insert(AuthenticatedCredential::from(credential.as_ref()));

    Ok(next.run(request).await)
}

/// Verify the caller's role grants the guard's permission bit.
pub async fn permission_middleware(
    State(guard): State<PermissionGuard>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, AuthError> {
    let (parts, body) = request.into_parts();
    let signed = signed_request_from_parts(&parts, &[])?;
    guard.auth.verify_permission(&signed, guard.required).await?;

    tracing::debug!(
        required = permissions::name(guard.required),
        "[auth] permission granted"
    );
    Ok(next.run(Request::from_parts(parts, body)).await)
}

/// Protect every route of `router` with the signature guard followed by a
/// permission check for `required`.
pub fn guard<S>(
    router: Router<S>,
    auth: Arc<Authenticator>,
    body_limit: usize,
    required: i32,
) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    let permission = PermissionGuard {
        auth: auth.clone(),
        required,
    };
    let signature = SignatureGuard { auth, body_limit };

    // Outer layers run first.
    router
        .route_layer(from_fn_with_state(permission, permission_middleware))
        .route_layer(from_fn_with_state(signature, signature_middleware))
}

/// Collect the signable parts of a request.
///
/// Headers whose value is not visible ASCII are skipped, so a signed header
/// sent that way verifies as absent.
pub fn signed_request_from_parts(parts: &Parts, body: &[u8]) -> Result<SignedRequest, AuthError> {
    let Query(pairs) = Query::<Vec<(String, String)>>::try_from_uri(&parts.uri).map_err(|e| {
        AuthError::invalid_input(format!("Query string could not be parsed: {}", e))
    })?;

    let mut signed = SignedRequest::new().body(body.to_vec());
    for (name, value) in pairs {
        signed.insert_param(&name, value);
    }
    for (name, value) in parts.headers.iter() {
        if let Ok(value) = value.to_str() {
            signed.insert_header(name.as_str(), value);
        }
    }
    Ok(signed)
}
