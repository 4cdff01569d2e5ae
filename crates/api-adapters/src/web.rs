//! # Axum Router
//!
//! Handlers translate HTTP into [`BoardService`] calls and back. They hold no
//! board logic of their own.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{ConnectInfo, FromRequestParts, State};
use axum::http::header::CONTENT_TYPE;
use axum::http::request::Parts;
use axum::http::{HeaderMap, HeaderName, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use domains::{DomainError, IdentityKey, IdentityResolver, RequestOrigin, VoteAction};
use services::{BoardService, PostRequest, VoteRequest};
use thiserror::Error;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::error;

use crate::dto::{PostBody, PostView, TallyView, VerifyResponse, VoteBody};
use crate::metrics::{Metrics, Operation, Outcome};

pub const CAPTCHA_TOKEN_HEADER: &str = "captcha-token";

pub struct AppState {
    pub board: BoardService,
    pub resolver: Arc<dyn IdentityResolver>,
    /// Only set when a trusted proxy sits in front of the server.
    pub forwarded_header: Option<HeaderName>,
    pub metrics: Metrics,
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("{0}")]
    Malformed(String),

    #[error("Unable to determine client address")]
    UnknownCaller,
}

impl ApiError {
    fn outcome(&self) -> Outcome {
        match self {
            ApiError::Domain(DomainError::BadRequest(_))
            | ApiError::Malformed(_)
            | ApiError::UnknownCaller => Outcome::BadRequest,
            ApiError::Domain(DomainError::Forbidden(_)) => Outcome::Forbidden,
            ApiError::Domain(DomainError::NotFound(_)) => Outcome::NotFound,
            ApiError::Domain(DomainError::Internal(_)) => Outcome::Error,
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::Malformed(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self.outcome() {
            Outcome::BadRequest => StatusCode::BAD_REQUEST,
            Outcome::Forbidden => StatusCode::FORBIDDEN,
            Outcome::NotFound => StatusCode::NOT_FOUND,
            Outcome::Ok | Outcome::Error => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = match self {
            // Details were logged by the service; never echo them.
            ApiError::Domain(DomainError::Internal(_)) => "internal service error".to_string(),
            ApiError::Domain(DomainError::Forbidden(message)) => message,
            other => other.to_string(),
        };
        (status, body).into_response()
    }
}

/// The identity the request acts as.
#[derive(Debug, Clone)]
pub struct Caller(pub IdentityKey);

impl FromRequestParts<Arc<AppState>> for Caller {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let peer = ConnectInfo::<SocketAddr>::from_request_parts(parts, state)
            .await
            .ok()
            .map(|ConnectInfo(addr)| addr.ip());
        let forwarded = state
            .forwarded_header
            .as_ref()
            .and_then(|name| parts.headers.get(name))
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);

        state
            .resolver
            .resolve(&RequestOrigin { peer, forwarded })
            .map(Caller)
            .ok_or(ApiError::UnknownCaller)
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/api/verify", get(verify))
        .route("/api/post", post(create_post))
        .route("/api/vote", post(cast_vote))
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

fn record<T>(state: &AppState, operation: Operation, result: &Result<T, ApiError>) {
    let outcome = match result {
        Ok(_) => Outcome::Ok,
        Err(err) => err.outcome(),
    };
    state.metrics.record(operation, outcome);
}

async fn verify(
    State(state): State<Arc<AppState>>,
    caller: Result<Caller, ApiError>,
) -> Result<Json<VerifyResponse>, ApiError> {
    let result = verify_inner(&state, caller).await;
    record(&state, Operation::Verify, &result);
    result
}

async fn verify_inner(
    state: &AppState,
    caller: Result<Caller, ApiError>,
) -> Result<Json<VerifyResponse>, ApiError> {
    let Caller(identity) = caller?;
    let captcha_required = state.board.verify(&identity).await?;
    Ok(Json(VerifyResponse { captcha_required }))
}

async fn create_post(
    State(state): State<Arc<AppState>>,
    caller: Result<Caller, ApiError>,
    headers: HeaderMap,
    body: Result<Json<PostBody>, JsonRejection>,
) -> Result<Json<Vec<PostView>>, ApiError> {
    let result = create_post_inner(&state, caller, &headers, body).await;
    record(&state, Operation::Post, &result);
    result
}

async fn create_post_inner(
    state: &AppState,
    caller: Result<Caller, ApiError>,
    headers: &HeaderMap,
    body: Result<Json<PostBody>, JsonRejection>,
) -> Result<Json<Vec<PostView>>, ApiError> {
    let Caller(identity) = caller?;
    let Json(body) = body?;
    let reply_to = body
        .reply_to()
        .map_err(|id| ApiError::Malformed(format!("invalid reply id {id}")))?;
    let captcha_token = headers
        .get(CAPTCHA_TOKEN_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);

    let thread = state
        .board
        .post(PostRequest {
            identity,
            captcha_token,
            content: body.post_content,
            reply_to,
        })
        .await?;
    Ok(Json(thread.iter().map(PostView::from).collect()))
}

async fn cast_vote(
    State(state): State<Arc<AppState>>,
    caller: Result<Caller, ApiError>,
    body: Result<Json<VoteBody>, JsonRejection>,
) -> Result<Json<Vec<TallyView>>, ApiError> {
    let result = cast_vote_inner(&state, caller, body).await;
    record(&state, Operation::Vote, &result);
    result
}

async fn cast_vote_inner(
    state: &AppState,
    caller: Result<Caller, ApiError>,
    body: Result<Json<VoteBody>, JsonRejection>,
) -> Result<Json<Vec<TallyView>>, ApiError> {
    let Caller(identity) = caller?;
    let Json(body) = body?;
    let receipt = state
        .board
        .vote(VoteRequest {
            identity,
            post_id: body.post_id,
            action: VoteAction::from_like_flag(body.vote_action),
        })
        .await?;
    Ok(Json(receipt.thread.iter().map(TallyView::from).collect()))
}

async fn healthz() -> &'static str {
    "ok"
}

async fn metrics(State(state): State<Arc<AppState>>) -> Response {
    match state.metrics.render() {
        Ok(text) => (
            [(CONTENT_TYPE, "application/openmetrics-text; version=1.0.0; charset=utf-8")],
            text,
        )
            .into_response(),
        Err(err) => {
            error!(error = %err, "encoding metrics");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
