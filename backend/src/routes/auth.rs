use std::sync::Arc;

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};

use edufin_common::{
    LogoutRequest, RefreshRequest, SessionResponse, SigninRequest, SigninResponse, SignupRequest,
    SignupResponse, SuccessResponse,
};

use crate::error::Result;
use crate::extract::ApiJson;
use crate::AppState;

async fn signup(
    State(state): State<Arc<AppState>>,
    ApiJson(request): ApiJson<SignupRequest>,
) -> Result<(StatusCode, Json<SignupResponse>)> {
    let id = state.auth.register(&request).await?;
    Ok((StatusCode::CREATED, Json(SignupResponse { success: true, id })))
}

async fn signin(
    State(state): State<Arc<AppState>>,
    ApiJson(request): ApiJson<SigninRequest>,
) -> Result<Json<SigninResponse>> {
    Ok(Json(state.auth.login(&request).await?))
}

/// Always 200; any token problem reads as anonymous.
async fn session(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Json<SessionResponse> {
    Json(state.auth.session(&headers))
}

async fn logout(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    request: Option<ApiJson<LogoutRequest>>,
) -> Result<Json<SuccessResponse>> {
    let refresh_token = request.and_then(|ApiJson(r)| r.refresh_token);
    state.auth.logout(&headers, refresh_token.as_deref())?;
    Ok(Json(SuccessResponse { success: true }))
}

async fn refresh(
    State(state): State<Arc<AppState>>,
    ApiJson(request): ApiJson<RefreshRequest>,
) -> Result<Json<SigninResponse>> {
    Ok(Json(state.auth.refresh(request.refresh_token.as_deref())?))
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/signup", post(signup))
        .route("/signin", post(signin))
        .route("/session", get(session))
        .route("/logout", post(logout))
        .route("/token/refresh", post(refresh))
        .with_state(state)
}
