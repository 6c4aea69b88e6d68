//! REST API for users-core
//!
//! | Route                     | Access                  |
//! |---------------------------|-------------------------|
//! | `GET /health`             | anonymous               |
//! | `POST /token`             | anonymous               |
//! | `GET /me`                 | authenticated           |
//! | `POST /logout`            | authenticated           |
//! | `GET, POST /users`        | claim `role` = `admin`  |
//! | `DELETE /users/:id`       | claim `role` = `admin`  |
//! | `PUT /users/:id/claims`   | claim `role` = `admin`  |
//! | `PUT /users/:id/active`   | claim `role` = `admin`  |

pub mod guard;

use std::sync::Arc;

use axum::{
    Extension, Json, Router,
    extract::{Path, State},
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::{delete, get, post, put},
};
use claimgate_auth_core::{AccessTokenRequest, Claim, TokenResponse};
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;
use tracing::error;

pub use guard::{AccessToken, ClaimGuard, REFRESHED_TOKEN_HEADER, require_claim};

use crate::{AuthenticationService, CreateUserRequest, Error, User};

type ApiResult<T> = std::result::Result<T, Error>;

/// Claim required by the user administration routes
pub fn admin_claim() -> Claim {
    Claim::new("role", "admin")
}

/// Create the REST API router
pub fn create_router(auth_service: Arc<AuthenticationService>) -> Router {
    let authenticated = Router::new()
        .route("/me", get(me))
        .route("/logout", post(logout))
        .route_layer(middleware::from_fn_with_state(
            ClaimGuard::authenticated(auth_service.clone()),
            require_claim,
        ));

    let admin = Router::new()
        .route("/users", get(list_users).post(create_user))
        .route("/users/:id", delete(delete_user))
        .route("/users/:id/claims", put(update_claims))
        .route("/users/:id/active", put(set_active))
        .route_layer(middleware::from_fn_with_state(
            ClaimGuard::require(auth_service.clone(), admin_claim()),
            require_claim,
        ));

    Router::new()
        .route("/health", get(health))
        .route("/token", post(issue_token))
        .merge(authenticated)
        .merge(admin)
        .layer(TraceLayer::new_for_http())
        .with_state(auth_service)
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    code: String,
    message: String,
}

pub(crate) fn error_response(status: StatusCode, code: &str, message: &str) -> Response {
    let body = ErrorResponse {
        error: ErrorBody {
            code: code.to_string(),
            message: message.to_string(),
        },
    };
    (status, Json(body)).into_response()
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            Error::InvalidCredentials => (StatusCode::UNAUTHORIZED, "INVALID_CREDENTIALS"),
            Error::UserAlreadyExists(_) => (StatusCode::CONFLICT, "USER_EXISTS"),
            Error::UserNotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            Error::Validation(_) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
            Error::Config(_) | Error::Auth(_) | Error::Internal(_) => {
                error!(error = %self, "Request failed");
                return error_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "Internal server error",
                );
            }
        };
        error_response(status, code, &self.to_string())
    }
}

#[derive(Debug, Deserialize)]
struct UpdateClaimsRequest {
    claims: Vec<Claim>,
}

#[derive(Debug, Deserialize)]
struct SetActiveRequest {
    active: bool,
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn issue_token(
    State(service): State<Arc<AuthenticationService>>,
    Json(request): Json<AccessTokenRequest>,
) -> ApiResult<Json<TokenResponse>> {
    Ok(Json(service.authenticate_password(&request).await?))
}

async fn me(
    State(service): State<Arc<AuthenticationService>>,
    Extension(AccessToken(access_token)): Extension<AccessToken>,
) -> ApiResult<Json<User>> {
    service
        .current_user(&access_token)
        .await?
        .map(Json)
        .ok_or(Error::InvalidCredentials)
}

async fn logout(
    State(service): State<Arc<AuthenticationService>>,
    Extension(AccessToken(access_token)): Extension<AccessToken>,
) -> ApiResult<StatusCode> {
    service.logout(&access_token).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_users(
    State(service): State<Arc<AuthenticationService>>,
) -> ApiResult<Json<Vec<User>>> {
    Ok(Json(service.list_users().await?))
}

async fn create_user(
    State(service): State<Arc<AuthenticationService>>,
    Json(request): Json<CreateUserRequest>,
) -> ApiResult<(StatusCode, Json<User>)> {
    let user = service.create_user(request).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

async fn delete_user(
    State(service): State<Arc<AuthenticationService>>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    service.delete_user(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn update_claims(
    State(service): State<Arc<AuthenticationService>>,
    Path(id): Path<String>,
    Json(request): Json<UpdateClaimsRequest>,
) -> ApiResult<Json<User>> {
    Ok(Json(service.update_claims(&id, request.claims).await?))
}

async fn set_active(
    State(service): State<Arc<AuthenticationService>>,
    Path(id): Path<String>,
    Json(request): Json<SetActiveRequest>,
) -> ApiResult<Json<User>> {
    Ok(Json(service.set_active(&id, request.active).await?))
}
