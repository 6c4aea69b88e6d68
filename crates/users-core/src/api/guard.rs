//! Claim guard middleware
//!
//! Every protected route group is wrapped in [`require_claim`] with its own
//! [`ClaimGuard`]. Routes outside a guard are anonymous.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{HeaderValue, StatusCode, header},
    middleware::Next,
    response::Response,
};
use claimgate_auth_core::{AuthDecision, Claim};
use tracing::{debug, warn};

use super::error_response;
use crate::AuthenticationService;

/// Response header carrying a bearer token minted while serving the request
pub const REFRESHED_TOKEN_HEADER: &str = "x-refreshed-token";

/// Access token of the authenticated caller, stored in request extensions
#[derive(Debug, Clone)]
pub struct AccessToken(pub String);

/// Middleware state: who answers cache misses and which claim is required
#[derive(Clone)]
pub struct ClaimGuard {
    service: Arc<AuthenticationService>,
    required: Option<Claim>,
}

impl ClaimGuard {
    /// Any authenticated caller passes.
    pub fn authenticated(service: Arc<AuthenticationService>) -> Self {
        Self {
            service,
            required: None,
        }
    }

    /// Only callers holding `claim` pass.
    pub fn require(service: Arc<AuthenticationService>, claim: Claim) -> Self {
        Self {
            service,
            required: Some(claim),
        }
    }
}

pub async fn require_claim(
    State(guard): State<ClaimGuard>,
    mut request: Request,
    next: Next,
) -> Response {
    let authorization = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned);

    let outcome = guard
        .service
        .engine()
        .authorize(
            authorization.as_deref(),
            guard.required.as_ref(),
            guard.service.as_ref(),
        )
        .await;

    let mut response = match outcome.decision {
        AuthDecision::Authorized => {
            if let Some(access_token) = outcome.access_token {
                request.extensions_mut().insert(AccessToken(access_token));
            }
            next.run(request).await
        }
        AuthDecision::Unauthenticated => {
            debug!(path = %request.uri().path(), "Rejecting unauthenticated request");
            let mut response =
                error_response(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", "Unauthorized");
            response
                .headers_mut()
                .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
            response
        }
        AuthDecision::Forbidden => {
            debug!(path = %request.uri().path(), "Rejecting request without required claim");
            error_response(StatusCode::FORBIDDEN, "FORBIDDEN", "Forbidden")
        }
    };

    if let Some(refreshed) = outcome.refreshed {
        match HeaderValue::from_str(&refreshed.access_token) {
            Ok(value) => {
                response.headers_mut().insert(REFRESHED_TOKEN_HEADER, value);
            }
            Err(e) => warn!(error = %e, "Refreshed bearer token is not a valid header value"),
        }
    }

    response
}
