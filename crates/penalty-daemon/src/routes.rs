//! Axum router and all HTTP handlers for penalty-daemon.
//!
//! `build_router` is the single entry point; `main.rs` calls it and attaches
//! middleware layers. Handlers translate HTTP to [`PenaltyService`] calls and
//! engine errors to statuses; no rules live here.
//!
//! [`PenaltyService`]: penalty_engine::PenaltyService

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use penalty_engine::{EngineError, EngineResult};
use penalty_schemas::{
    DocumentInput, GroupInput, GroupPaymentInfo, GroupView, PaymentInfo, PenaltyGroup,
    PenaltyRecord,
};
use tracing::info;

use crate::{
    api_types::{
        BatchReversalResponse, FailedMember, GroupDeleteResponse, HealthResponse, IdsRequest,
        ItemOutcome, ListQuery, PageResponse, ReverseGroupRequest, TokenResponse,
    },
    error::{error_body, status_for, ApiError, ApiResult},
    state::AppState,
};

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

/// Build the complete application router wired to the given shared state.
///
/// Middleware layers (tracing) are **not** applied here; `main.rs`
/// attaches them after this call so tests can use the bare router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/health", get(health))
        .route("/v1/documents", get(list_documents).post(create_document))
        .route("/v1/documents/batch/get", post(get_documents))
        .route("/v1/documents/batch/update", post(update_documents))
        .route(
            "/v1/documents/:id",
            get(get_document).put(update_document).delete(delete_document),
        )
        .route("/v1/vehicles/:registration/documents", get(search_documents))
        .route("/v1/tokens/:token", get(get_by_token))
        .route("/v1/payments", post(apply_payment))
        .route("/v1/payments/reverse", post(reverse_payments))
        .route("/v1/payments/:id/reverse", post(reverse_payment))
        .route("/v1/groups", get(list_groups).post(create_group))
        .route("/v1/groups/:id", get(get_group).delete(delete_group))
        .route("/v1/groups/:id/payments", post(apply_group_payment))
        .route("/v1/groups/:id/payments/reverse", post(reverse_group_payment))
        .with_state(state)
}

fn outcome<T>(id: String, res: EngineResult<T>) -> ItemOutcome<T> {
    match res {
        Ok(item) => ItemOutcome {
            id,
            status: StatusCode::OK.as_u16(),
            item: Some(item),
            error: None,
        },
        Err(e) => ItemOutcome {
            id,
            status: status_for(&e).as_u16(),
            item: None,
            error: Some(error_body(&e)),
        },
    }
}

// ---------------------------------------------------------------------------
// GET /v1/health
// ---------------------------------------------------------------------------

pub(crate) async fn health(State(st): State<Arc<AppState>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            ok: true,
            service: st.build.service,
            version: st.build.version,
            config_hash: st.config_hash.clone(),
        }),
    )
}

// ---------------------------------------------------------------------------
// Documents
// ---------------------------------------------------------------------------

pub(crate) async fn create_document(
    State(st): State<Arc<AppState>>,
    Json(body): Json<DocumentInput>,
) -> ApiResult<(StatusCode, Json<PenaltyRecord>)> {
    let record = st.service.create_document(body).await?;
    Ok((StatusCode::CREATED, Json(record)))
}

pub(crate) async fn update_document(
    State(st): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<DocumentInput>,
) -> ApiResult<Json<PenaltyRecord>> {
    if body.id != id {
        return Err(EngineError::Validation(format!(
            "body ID {:?} does not match path {id:?}",
            body.id
        ))
        .into());
    }
    Ok(Json(st.service.update_document(body).await?))
}

pub(crate) async fn update_documents(
    State(st): State<Arc<AppState>>,
    Json(body): Json<Vec<DocumentInput>>,
) -> Json<Vec<ItemOutcome<PenaltyRecord>>> {
    let ids: Vec<String> = body.iter().map(|d| d.id.clone()).collect();
    let results = st.service.update_documents(body).await;
    Json(
        ids.into_iter()
            .zip(results)
            .map(|(id, r)| outcome(id, r))
            .collect(),
    )
}

pub(crate) async fn delete_document(
    State(st): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<DocumentInput>,
) -> ApiResult<Json<PenaltyRecord>> {
    Ok(Json(st.service.delete_document(&id, body).await?))
}

pub(crate) async fn get_document(
    State(st): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<PenaltyRecord>> {
    Ok(Json(st.service.get_document(&id).await?))
}

pub(crate) async fn get_documents(
    State(st): State<Arc<AppState>>,
    Json(body): Json<IdsRequest>,
) -> ApiResult<Json<Vec<PenaltyRecord>>> {
    Ok(Json(st.service.get_documents(&body.ids).await?))
}

pub(crate) async fn list_documents(
    State(st): State<Arc<AppState>>,
    Query(q): Query<ListQuery>,
) -> ApiResult<Json<PageResponse<PenaltyRecord>>> {
    let page = st
        .service
        .list_documents(q.since.unwrap_or(0.0), q.cursor(), q.limit)
        .await?;
    Ok(Json(page.into()))
}

pub(crate) async fn search_documents(
    State(st): State<Arc<AppState>>,
    Path(registration): Path<String>,
    Query(q): Query<ListQuery>,
) -> ApiResult<Json<PageResponse<PenaltyRecord>>> {
    let page = st
        .service
        .search_by_registration(&registration, q.cursor(), q.limit)
        .await?;
    Ok(Json(page.into()))
}

pub(crate) async fn get_by_token(
    State(st): State<Arc<AppState>>,
    Path(token): Path<String>,
) -> ApiResult<Json<TokenResponse>> {
    let lookup = st.service.get_by_token(&token).await?;
    Ok(Json(TokenResponse {
        record: lookup.record,
        saved: lookup.saved,
    }))
}

// ---------------------------------------------------------------------------
// Payments
// ---------------------------------------------------------------------------

pub(crate) async fn apply_payment(
    State(st): State<Arc<AppState>>,
    Json(body): Json<PaymentInfo>,
) -> ApiResult<Json<PenaltyRecord>> {
    Ok(Json(st.service.apply_payment(body).await?))
}

pub(crate) async fn reverse_payment(
    State(st): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<PenaltyRecord>> {
    Ok(Json(st.service.reverse_payment(&id).await?))
}

pub(crate) async fn reverse_payments(
    State(st): State<Arc<AppState>>,
    Json(body): Json<IdsRequest>,
) -> Json<BatchReversalResponse> {
    let out = st.service.reverse_payments(&body.ids).await;
    let group = out.group.map(|res| {
        let id = match &res {
            Ok(g) => g.id.clone(),
            Err(EngineError::NotFound(id)) | Err(EngineError::Conflict { id, .. }) => id.clone(),
            Err(_) => String::new(),
        };
        outcome(id, res)
    });
    info!(count = body.ids.len(), cascaded = group.is_some(), "payments/reverse");
    Json(BatchReversalResponse {
        results: body
            .ids
            .into_iter()
            .zip(out.results)
            .map(|(id, r)| outcome(id, r))
            .collect(),
        group,
    })
}

// ---------------------------------------------------------------------------
// Groups
// ---------------------------------------------------------------------------

pub(crate) async fn create_group(
    State(st): State<Arc<AppState>>,
    Json(body): Json<GroupInput>,
) -> ApiResult<(StatusCode, Json<GroupView>)> {
    let view = st.service.create_group(body).await?;
    Ok((StatusCode::CREATED, Json(view)))
}

pub(crate) async fn get_group(
    State(st): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<GroupView>> {
    Ok(Json(st.service.get_group(&id).await?))
}

pub(crate) async fn list_groups(
    State(st): State<Arc<AppState>>,
    Query(q): Query<ListQuery>,
) -> ApiResult<Json<PageResponse<PenaltyGroup>>> {
    let page = st
        .service
        .list_groups(q.since.unwrap_or(0.0), q.cursor(), q.limit)
        .await?;
    Ok(Json(page.into()))
}

pub(crate) async fn apply_group_payment(
    State(st): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<GroupPaymentInfo>,
) -> ApiResult<Json<PenaltyGroup>> {
    Ok(Json(st.service.apply_group_payment(&id, body).await?))
}

pub(crate) async fn reverse_group_payment(
    State(st): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<ReverseGroupRequest>,
) -> ApiResult<Json<PenaltyGroup>> {
    Ok(Json(
        st.service
            .reverse_group_payment(&id, body.penalty_type)
            .await?,
    ))
}

/// 200 when the group and every member were disabled; 503 with the same body
/// when some members failed, so the caller retries the (idempotent) delete.
pub(crate) async fn delete_group(
    State(st): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let deletion = st.service.delete_group(&id).await?;
    let status = if deletion.is_complete() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    let body = GroupDeleteResponse {
        group: deletion.group,
        disabled: deletion.disabled,
        failed: deletion
            .failed
            .into_iter()
            .map(|(id, error)| FailedMember { id, error })
            .collect(),
    };
    Ok((status, Json(body)).into_response())
}
