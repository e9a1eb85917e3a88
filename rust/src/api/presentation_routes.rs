//! Presentation endpoints

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::Json,
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use uuid::Uuid;

use super::{require_session, ApiError};
use crate::app::Services;
use crate::presentation::{
    DeliveryKind, EligiblePeriod, Presentation, PresentationFilter, StockItem,
};

#[derive(Debug, Deserialize)]
pub struct EligibleQuery {
    pub company: String,
    #[serde(default)]
    pub kind: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreatePresentationRequest {
    pub company_code: String,
    pub cronograma: String,
    #[serde(default)]
    pub kind: DeliveryKind,
}

#[derive(Debug, Deserialize)]
pub struct ProcessRequest {
    pub items: Vec<StockItem>,
    #[serde(default)]
    pub original_file: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RectificationBody {
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ResolveBody {
    pub accepted: bool,
    #[serde(default)]
    pub notes: Option<String>,
}

pub fn routes() -> Router<Services> {
    Router::new()
        .route("/api/periods/eligible", get(eligible_periods))
        .route(
            "/api/presentations",
            get(list_presentations).post(create_presentation),
        )
        .route(
            "/api/presentations/:id",
            get(show_presentation).delete(delete_presentation),
        )
        .route("/api/presentations/:id/process", post(process_presentation))
        .route("/api/presentations/monthly/:id/submit", post(submit_monthly))
        .route("/api/presentations/weekly/:id/submit", post(submit_weekly))
        .route(
            "/api/presentations/:id/rectification",
            post(request_rectification),
        )
        .route(
            "/api/presentations/:id/rectification/resolve",
            post(resolve_rectification),
        )
}

async fn eligible_periods(
    State(services): State<Services>,
    headers: HeaderMap,
    Query(query): Query<EligibleQuery>,
) -> Result<Json<Vec<EligiblePeriod>>, ApiError> {
    require_session(&services, &headers).await?;
    let kind = match query.kind.as_deref() {
        Some(raw) => raw.parse::<DeliveryKind>()?,
        None => DeliveryKind::default(),
    };
    Ok(Json(
        services
            .lifecycle
            .eligible_periods(&query.company, kind)
            .await?,
    ))
}

async fn list_presentations(
    State(services): State<Services>,
    headers: HeaderMap,
    Query(filter): Query<PresentationFilter>,
) -> Result<Json<Vec<Presentation>>, ApiError> {
    require_session(&services, &headers).await?;
    Ok(Json(services.lifecycle.list(&filter).await?))
}

async fn create_presentation(
    State(services): State<Services>,
    headers: HeaderMap,
    Json(request): Json<CreatePresentationRequest>,
) -> Result<(StatusCode, Json<Presentation>), ApiError> {
    let session = require_session(&services, &headers).await?;
    let presentation = services
        .lifecycle
        .create(
            &request.company_code,
            &request.cronograma,
            request.kind,
            Some(session.user.user_id),
        )
        .await?;
    Ok((StatusCode::CREATED, Json(presentation)))
}

async fn show_presentation(
    State(services): State<Services>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<Presentation>, ApiError> {
    require_session(&services, &headers).await?;
    Ok(Json(services.lifecycle.show(id).await?))
}

async fn delete_presentation(
    State(services): State<Services>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let session = require_session(&services, &headers).await?;
    services
        .lifecycle
        .delete(id, Some(session.user.user_id))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn process_presentation(
    State(services): State<Services>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(request): Json<ProcessRequest>,
) -> Result<Json<Presentation>, ApiError> {
    let session = require_session(&services, &headers).await?;
    Ok(Json(
        services
            .lifecycle
            .process(
                id,
                request.items,
                request.original_file,
                Some(session.user.user_id),
            )
            .await?,
    ))
}

async fn submit(
    services: Services,
    headers: HeaderMap,
    id: Uuid,
    kind: DeliveryKind,
) -> Result<Json<Presentation>, ApiError> {
    let session = require_session(&services, &headers).await?;
    Ok(Json(
        services
            .coordinator
            .submit(id, kind, Some(session.user.user_id))
            .await?,
    ))
}

async fn submit_monthly(
    State(services): State<Services>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<Presentation>, ApiError> {
    submit(services, headers, id, DeliveryKind::Monthly).await
}

async fn submit_weekly(
    State(services): State<Services>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<Presentation>, ApiError> {
    submit(services, headers, id, DeliveryKind::Weekly).await
}

async fn request_rectification(
    State(services): State<Services>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    body: Option<Json<RectificationBody>>,
) -> Result<Json<Presentation>, ApiError> {
    let session = require_session(&services, &headers).await?;
    let body = body.map(|Json(b)| b).unwrap_or_default();
    Ok(Json(
        services
            .coordinator
            .request_rectification(id, body.reason, Some(session.user.user_id))
            .await?,
    ))
}

async fn resolve_rectification(
    State(services): State<Services>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(body): Json<ResolveBody>,
) -> Result<Json<Presentation>, ApiError> {
    let session = require_session(&services, &headers).await?;
    Ok(Json(
        services
            .lifecycle
            .resolve_rectification(id, body.accepted, body.notes, Some(session.user.user_id))
            .await?,
    ))
}
