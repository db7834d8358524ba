//! REST surface for the maat engine (feature `server`).
//!
//! Routes, mirrored by the `maatd` daemon binary:
//!
//! **Knowledge base:**
//! - `GET    /knowledge?category&skip&limit` — list entries
//! - `POST   /knowledge` — create entry
//! - `GET    /knowledge/categories` — the fixed taxonomy
//! - `GET    /knowledge/stats` — aggregate statistics
//! - `GET    /knowledge/{id}` — single entry
//! - `PUT    /knowledge/{id}` — versioned partial update (409 on conflict)
//! - `DELETE /knowledge/{id}` — soft-deactivation
//! - `POST   /knowledge/search` — ranked hybrid search
//!
//! **Legal AI:**
//! - `POST /legal-ai/consult` — one consultation
//! - `POST /legal-ai/batch-consult` — batch with per-item isolation
//! - `GET  /legal-ai/consultations?user&skip&limit` — history
//!
//! **Health:**
//! - `GET /health` — server status
//!
//! Error mapping: validation → 400, not-found → 404, conflict → 409,
//! timeout → 504, everything else → 500.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;

use crate::category::LegalCategory;
use crate::consult::compose::snippet;
use crate::consult::{ConsultRequest, ConsultationRecord};
use crate::engine::Engine;
use crate::entry::{EntryId, EntryPatch, KnowledgeEntry};
use crate::error::{ClassifyError, ConsultError, GraphError, MaatError, SearchError, StoreError};
use crate::search::{SearchFilters, SearchHit};

/// Build the REST router for an engine.
pub fn router(engine: Arc<Engine>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/knowledge", get(list_knowledge).post(create_knowledge))
        .route("/knowledge/categories", get(categories))
        .route("/knowledge/stats", get(stats))
        .route(
            "/knowledge/{id}",
            get(get_knowledge).put(update_knowledge).delete(delete_knowledge),
        )
        .route("/knowledge/search", post(search_knowledge))
        .route("/legal-ai/consult", post(consult))
        .route("/legal-ai/batch-consult", post(batch_consult))
        .route("/legal-ai/consultations", get(consultations))
        .layer(CorsLayer::permissive())
        .with_state(engine)
}

// ---------------------------------------------------------------------------
// Error mapping
// ---------------------------------------------------------------------------

struct ApiError(MaatError);

impl<E: Into<MaatError>> From<E> for ApiError {
    fn from(e: E) -> Self {
        ApiError(e.into())
    }
}

fn status_for(error: &MaatError) -> StatusCode {
    match error {
        MaatError::Store(StoreError::Validation { .. }) => StatusCode::BAD_REQUEST,
        MaatError::Store(StoreError::NotFound { .. }) => StatusCode::NOT_FOUND,
        MaatError::Store(StoreError::Conflict { .. }) => StatusCode::CONFLICT,
        MaatError::Graph(GraphError::DuplicateRelation { .. }) => StatusCode::CONFLICT,
        MaatError::Graph(_) => StatusCode::BAD_REQUEST,
        MaatError::Search(SearchError::EmptyQuery | SearchError::QueryTooLong { .. }) => {
            StatusCode::BAD_REQUEST
        }
        MaatError::Classify(ClassifyError::EmptyInput | ClassifyError::InputTooLong { .. }) => {
            StatusCode::BAD_REQUEST
        }
        MaatError::Consult(ConsultError::InvalidQuestion { .. }) => StatusCode::BAD_REQUEST,
        MaatError::Consult(ConsultError::Timeout { .. }) => StatusCode::GATEWAY_TIMEOUT,
        MaatError::Import(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        let body = Json(serde_json::json!({ "error": self.0.to_string() }));
        (status, body).into_response()
    }
}

type ApiResult<T> = std::result::Result<T, ApiError>;

fn parse_entry_id(raw: u64) -> ApiResult<EntryId> {
    EntryId::new(raw).ok_or_else(|| ApiError(StoreError::NotFound { id: raw }.into()))
}

// ---------------------------------------------------------------------------
// Knowledge base handlers
// ---------------------------------------------------------------------------

async fn health(State(engine): State<Arc<Engine>>) -> Json<serde_json::Value> {
    let info = engine.info();
    Json(serde_json::json!({
        "status": "ok",
        "entries": info.active_entries,
        "consultations": info.consultations,
    }))
}

#[derive(Debug, Deserialize)]
struct ListParams {
    category: Option<String>,
    #[serde(default)]
    skip: usize,
    limit: Option<usize>,
}

async fn list_knowledge(
    State(engine): State<Arc<Engine>>,
    Query(params): Query<ListParams>,
) -> ApiResult<Json<Vec<KnowledgeEntry>>> {
    let category = match &params.category {
        Some(raw) => Some(LegalCategory::from_id(raw).ok_or_else(|| {
            ApiError(
                StoreError::Validation {
                    message: format!("unknown category: {raw}"),
                }
                .into(),
            )
        })?),
        None => None,
    };
    let limit = params.limit.unwrap_or(20).min(100);
    let entries = engine
        .list_entries(category, params.skip, limit)
        .iter()
        .map(|e| (**e).clone())
        .collect();
    Ok(Json(entries))
}

async fn create_knowledge(
    State(engine): State<Arc<Engine>>,
    Json(draft): Json<crate::entry::EntryDraft>,
) -> ApiResult<(StatusCode, Json<KnowledgeEntry>)> {
    let entry = engine.create_entry(draft)?;
    Ok((StatusCode::CREATED, Json((*entry).clone())))
}

async fn get_knowledge(
    State(engine): State<Arc<Engine>>,
    Path(id): Path<u64>,
) -> ApiResult<Json<KnowledgeEntry>> {
    let id = parse_entry_id(id)?;
    let entry = engine
        .get_entry(id)
        .ok_or_else(|| ApiError(StoreError::NotFound { id: id.get() }.into()))?;
    Ok(Json((*entry).clone()))
}

async fn update_knowledge(
    State(engine): State<Arc<Engine>>,
    Path(id): Path<u64>,
    Json(patch): Json<EntryPatch>,
) -> ApiResult<Json<KnowledgeEntry>> {
    let id = parse_entry_id(id)?;
    let entry = engine.update_entry(id, patch)?;
    Ok(Json((*entry).clone()))
}

async fn delete_knowledge(
    State(engine): State<Arc<Engine>>,
    Path(id): Path<u64>,
) -> ApiResult<Json<serde_json::Value>> {
    let id = parse_entry_id(id)?;
    engine.deactivate_entry(id)?;
    Ok(Json(serde_json::json!({ "message": "知识条目已停用" })))
}

async fn categories() -> Json<serde_json::Value> {
    let categories: Vec<serde_json::Value> = LegalCategory::TAXONOMY
        .iter()
        .map(|c| {
            serde_json::json!({
                "id": c.id(),
                "name": c.name(),
                "description": c.description(),
            })
        })
        .collect();
    Json(serde_json::json!({ "categories": categories }))
}

async fn stats(State(engine): State<Arc<Engine>>) -> Json<crate::store::StoreStats> {
    Json(engine.stats())
}

#[derive(Debug, Deserialize)]
struct SearchBody {
    query: String,
    category: Option<LegalCategory>,
    tags: Option<Vec<String>>,
    limit: Option<usize>,
}

#[derive(Debug, Serialize)]
struct SearchResultView {
    id: u64,
    title: String,
    content: String,
    category: LegalCategory,
    tags: Vec<String>,
    relevance_score: f32,
    lexical_score: f32,
    semantic_score: f32,
}

fn hit_view(engine: &Engine, hit: &SearchHit) -> Option<SearchResultView> {
    let entry = engine.get_entry(hit.entry_id)?;
    Some(SearchResultView {
        id: entry.id.get(),
        title: entry.title.clone(),
        content: snippet(&entry.content, 200),
        category: entry.category,
        tags: entry.tags.iter().cloned().collect(),
        relevance_score: hit.blended_score,
        lexical_score: hit.lexical_score,
        semantic_score: hit.semantic_score,
    })
}

async fn search_knowledge(
    State(engine): State<Arc<Engine>>,
    Json(body): Json<SearchBody>,
) -> ApiResult<Json<Vec<SearchResultView>>> {
    let filters = SearchFilters {
        category: body.category,
        tags: body.tags.unwrap_or_default(),
        boost_category: None,
    };
    let hits = engine.search(&body.query, &filters, body.limit)?;
    let results = hits.iter().filter_map(|h| hit_view(&engine, h)).collect();
    Ok(Json(results))
}

// ---------------------------------------------------------------------------
// Legal AI handlers
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ConsultBody {
    question: String,
    context: Option<String>,
    category: Option<LegalCategory>,
    user: Option<String>,
}

#[derive(Debug, Serialize)]
struct ConsultView {
    consultation_id: u64,
    status: crate::consult::ConsultationStatus,
    answer: String,
    confidence: Option<f32>,
    category: LegalCategory,
    sources: Vec<u64>,
    failure: Option<crate::consult::FailureReason>,
}

impl ConsultView {
    fn from_record(record: &ConsultationRecord) -> Self {
        Self {
            consultation_id: record.id.get(),
            status: record.status,
            answer: record.answer.clone(),
            confidence: record.confidence,
            category: record.category,
            sources: record.sources.iter().map(|s| s.get()).collect(),
            failure: record.failure,
        }
    }
}

async fn consult(
    State(engine): State<Arc<Engine>>,
    Json(body): Json<ConsultBody>,
) -> ApiResult<Json<ConsultView>> {
    let request = ConsultRequest {
        question: body.question,
        context: body.context,
        category: body.category,
        user: body.user.unwrap_or_else(|| "anonymous".into()),
        deadline_ms: None,
    };
    let deadline_ms = engine.config().consult.deadline_ms;
    // Consultation blocks (composition, retries); keep it off the runtime.
    let worker = Arc::clone(&engine);
    let record = tokio::task::spawn_blocking(move || worker.consult(&request))
        .await
        .map_err(|e| {
            ApiError(
                ConsultError::Compose {
                    message: format!("consultation task failed: {e}"),
                }
                .into(),
            )
        })??;
    // Intake and deadline failures surface as HTTP errors; composition
    // failures still return the persisted record with status = failed.
    match record.failure {
        Some(crate::consult::FailureReason::InvalidQuestion) => Err(ApiError(
            ConsultError::InvalidQuestion {
                message: "question is empty or too long".into(),
            }
            .into(),
        )),
        Some(crate::consult::FailureReason::Timeout) => {
            Err(ApiError(ConsultError::Timeout { deadline_ms }.into()))
        }
        _ => Ok(Json(ConsultView::from_record(&record))),
    }
}

#[derive(Debug, Deserialize)]
struct BatchConsultBody {
    questions: Vec<String>,
    batch_id: Option<String>,
    user: Option<String>,
}

async fn batch_consult(
    State(engine): State<Arc<Engine>>,
    Json(body): Json<BatchConsultBody>,
) -> ApiResult<Json<serde_json::Value>> {
    let user = body.user.unwrap_or_else(|| "anonymous".into());
    let requests: Vec<ConsultRequest> = body
        .questions
        .iter()
        .map(|q| ConsultRequest {
            question: q.clone(),
            context: None,
            category: None,
            user: user.clone(),
            deadline_ms: None,
        })
        .collect();
    let total = requests.len();

    let results = tokio::task::spawn_blocking(move || engine.consult_batch(requests))
        .await
        .map_err(|e| {
            ApiError(
                ConsultError::Compose {
                    message: format!("batch task failed: {e}"),
                }
                .into(),
            )
        })?;

    let items: Vec<serde_json::Value> = results
        .iter()
        .enumerate()
        .map(|(index, result)| match result {
            Ok(record) => {
                let mut view = serde_json::to_value(ConsultView::from_record(record))
                    .unwrap_or_default();
                if let Some(obj) = view.as_object_mut() {
                    obj.insert("index".into(), serde_json::json!(index));
                }
                view
            }
            Err(e) => serde_json::json!({ "index": index, "error": e.to_string() }),
        })
        .collect();

    Ok(Json(serde_json::json!({
        "batch_id": body.batch_id,
        "total_questions": total,
        "results": items,
    })))
}

#[derive(Debug, Deserialize)]
struct HistoryParams {
    user: Option<String>,
    #[serde(default)]
    skip: usize,
    limit: Option<usize>,
}

async fn consultations(
    State(engine): State<Arc<Engine>>,
    Query(params): Query<HistoryParams>,
) -> Json<serde_json::Value> {
    let limit = params.limit.unwrap_or(20).min(100);
    let records: Vec<ConsultationRecord> = engine
        .consultations(params.user.as_deref(), params.skip, limit)
        .iter()
        .map(|r| (**r).clone())
        .collect();
    Json(serde_json::json!({
        "consultations": records,
        "total": records.len(),
    }))
}
